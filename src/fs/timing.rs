//! Latency logging decorator

use std::future::Future;
use std::path::Path;
use std::time::Instant;

use async_trait::async_trait;
use tracing::info;

use super::{DirEntry, FileOperations, FileStat};
use crate::error::FsError;

/// Logs `{elapsed}ms for {op}` after every call on the wrapped backend.
pub struct Timed<F> {
    inner: F,
}

impl<F> Timed<F> {
    pub fn new(inner: F) -> Self {
        Self { inner }
    }
}

async fn timed<T>(op: &str, fut: impl Future<Output = T>) -> T {
    let start = Instant::now();
    let out = fut.await;
    info!("{}ms for {}", start.elapsed().as_millis(), op);
    out
}

#[async_trait]
impl<F: FileOperations> FileOperations for Timed<F> {
    async fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        timed("stat", self.inner.stat(path)).await
    }

    async fn read_directory(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        timed("read_directory", self.inner.read_directory(path)).await
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
        timed("read_file", self.inner.read_file(path)).await
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        timed("write_file", self.inner.write_file(path, content)).await
    }

    async fn create_directory(&self, path: &str) -> Result<(), FsError> {
        timed("create_directory", self.inner.create_directory(path)).await
    }

    async fn delete(&self, path: &str, recursive: bool) -> Result<(), FsError> {
        timed("delete", self.inner.delete(path, recursive)).await
    }

    async fn rename(
        &self,
        old_path: &str,
        new_path: &str,
        overwrite: bool,
    ) -> Result<(), FsError> {
        timed("rename", self.inner.rename(old_path, new_path, overwrite)).await
    }

    async fn home_directory(&self) -> Result<String, FsError> {
        timed("home_directory", self.inner.home_directory()).await
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<u64, FsError> {
        timed("upload", self.inner.upload(local_path, remote_path)).await
    }
}
