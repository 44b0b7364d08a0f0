//! Remote filesystem operations
//!
//! [`FileOperations`] is the contract every backend implements:
//!
//! - [`SftpFileOperations`]: pooled SFTP session over the connection's
//!   handle owner
//! - [`CommandFileOperations`]: one `ssh` subprocess per call
//!
//! [`Timed`] wraps either one and logs per-call latency.

pub mod command;
pub mod path_utils;
pub mod sftp;
pub mod timing;
pub mod types;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FsError;

pub use command::{CommandConnection, CommandConnector, CommandFileOperations, CommandRunner};
pub use sftp::{SftpFileOperations, SftpPrimitives};
pub use timing::Timed;
pub use types::{DirEntry, FileStat, FileType};

/// Follow at most this many links while resolving a file type
pub const MAX_SYMLINK_DEPTH: usize = 16;

/// Upload chunk size
pub const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

#[async_trait]
pub trait FileOperations: Send + Sync {
    /// Stat without following the final link; the link target's kind is
    /// merged into the returned type.
    async fn stat(&self, path: &str) -> Result<FileStat, FsError>;

    /// Entries sorted directories first, without `.` and `..`
    async fn read_directory(&self, path: &str) -> Result<Vec<DirEntry>, FsError>;

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError>;

    /// Create or truncate
    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), FsError>;

    /// Create the directory and any missing parents
    async fn create_directory(&self, path: &str) -> Result<(), FsError>;

    async fn delete(&self, path: &str, recursive: bool) -> Result<(), FsError>;

    async fn rename(&self, old_path: &str, new_path: &str, overwrite: bool)
        -> Result<(), FsError>;

    /// Absolute path of the remote user's home directory
    async fn home_directory(&self) -> Result<String, FsError>;

    /// Stream a local file to `remote_path`, returning bytes written
    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<u64, FsError>;
}

#[async_trait]
impl<T: FileOperations + ?Sized> FileOperations for Arc<T> {
    async fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        (**self).stat(path).await
    }

    async fn read_directory(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        (**self).read_directory(path).await
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
        (**self).read_file(path).await
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        (**self).write_file(path, content).await
    }

    async fn create_directory(&self, path: &str) -> Result<(), FsError> {
        (**self).create_directory(path).await
    }

    async fn delete(&self, path: &str, recursive: bool) -> Result<(), FsError> {
        (**self).delete(path, recursive).await
    }

    async fn rename(
        &self,
        old_path: &str,
        new_path: &str,
        overwrite: bool,
    ) -> Result<(), FsError> {
        (**self).rename(old_path, new_path, overwrite).await
    }

    async fn home_directory(&self) -> Result<String, FsError> {
        (**self).home_directory().await
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<u64, FsError> {
        (**self).upload(local_path, remote_path).await
    }
}
