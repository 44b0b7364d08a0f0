//! SFTP backend
//!
//! [`SftpFileOperations`] implements the filesystem algorithms (symlink
//! resolution, `mkdir -p`, recursive delete, guarded rename) on top of the
//! small [`SftpPrimitives`] surface. The primitives are implemented for
//! `russh_sftp`'s client session; tests drive the same algorithms over an
//! in-memory tree.

use std::path::Path;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use russh_sftp::client::error::Error as SftpClientError;
use russh_sftp::client::fs::Metadata;
use russh_sftp::client::SftpSession;
use russh_sftp::protocol::OpenFlags;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use super::path_utils::{join_remote_path, parent_remote_path, resolve_link_target};
use super::types::{is_dot_entry, secs_to_millis, sort_entries};
use super::{DirEntry, FileOperations, FileStat, FileType, MAX_SYMLINK_DEPTH, UPLOAD_CHUNK_SIZE};
use crate::error::FsError;
use crate::ssh::{HandleController, SshError};
use crate::uri::unescape_spaces;

/// Kind of a remote node as reported by the server, before link resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawKind {
    File,
    Directory,
    Symlink,
    Other,
}

/// Attributes as returned by `lstat`/`stat`. Times are in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawAttrs {
    pub kind: RawKind,
    pub size: u64,
    pub atime: u64,
    pub mtime: u64,
}

impl RawAttrs {
    fn file_type(&self) -> FileType {
        match self.kind {
            RawKind::File => FileType::FILE,
            RawKind::Directory => FileType::DIRECTORY,
            RawKind::Symlink => FileType::SYMBOLIC_LINK,
            RawKind::Other => FileType::UNKNOWN,
        }
    }
}

/// The file primitives an SFTP v3 server offers
#[async_trait]
pub trait SftpPrimitives: Send + Sync {
    /// Attributes of the path itself, not following a final link
    async fn lstat(&self, path: &str) -> Result<RawAttrs, FsError>;
    /// Attributes after following links
    async fn stat(&self, path: &str) -> Result<RawAttrs, FsError>;
    async fn read_link(&self, path: &str) -> Result<String, FsError>;
    /// Raw listing; may include `.` and `..`, attributes are link-stats
    async fn read_dir(&self, path: &str) -> Result<Vec<(String, RawAttrs)>, FsError>;
    async fn read(&self, path: &str) -> Result<Vec<u8>, FsError>;
    /// Create or truncate, then write `content`
    async fn write(&self, path: &str, content: &[u8]) -> Result<(), FsError>;
    /// Create or truncate, then copy `reader` in chunks. Returns bytes written.
    async fn write_from(
        &self,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, FsError>;
    async fn create_dir(&self, path: &str) -> Result<(), FsError>;
    async fn remove_file(&self, path: &str) -> Result<(), FsError>;
    async fn remove_dir(&self, path: &str) -> Result<(), FsError>;
    /// Fails when `new_path` exists
    async fn rename(&self, old_path: &str, new_path: &str) -> Result<(), FsError>;
    async fn canonicalize(&self, path: &str) -> Result<String, FsError>;
}

/// Open the SFTP subsystem on a fresh session channel
pub async fn open_sftp(controller: &HandleController) -> Result<SftpSession, SshError> {
    let channel = controller.open_session_channel().await?;

    channel
        .request_subsystem(true, "sftp")
        .await
        .map_err(|e| SshError::ChannelError(format!("Failed to request SFTP subsystem: {}", e)))?;

    SftpSession::new(channel.into_stream())
        .await
        .map_err(|e| SshError::ChannelError(e.to_string()))
}

/// Map SFTP errors, naming the path for the common cases
fn map_sftp_error(err: SftpClientError, path: &str) -> FsError {
    match FsError::from(err) {
        FsError::FileNotFound(_) => FsError::FileNotFound(path.to_string()),
        FsError::NoPermissions(_) => FsError::NoPermissions(path.to_string()),
        other => other,
    }
}

fn raw_attrs(metadata: &Metadata) -> RawAttrs {
    let kind = if metadata.is_dir() {
        RawKind::Directory
    } else if metadata.is_symlink() {
        RawKind::Symlink
    } else if metadata.is_regular() {
        RawKind::File
    } else {
        RawKind::Other
    };

    RawAttrs {
        kind,
        size: metadata.size.unwrap_or(0),
        atime: metadata.atime.map(u64::from).unwrap_or(0),
        mtime: metadata.mtime.map(u64::from).unwrap_or(0),
    }
}

#[async_trait]
impl SftpPrimitives for SftpSession {
    async fn lstat(&self, path: &str) -> Result<RawAttrs, FsError> {
        SftpSession::symlink_metadata(self, path)
            .await
            .map(|m| raw_attrs(&m))
            .map_err(|e| map_sftp_error(e, path))
    }

    async fn stat(&self, path: &str) -> Result<RawAttrs, FsError> {
        SftpSession::metadata(self, path)
            .await
            .map(|m| raw_attrs(&m))
            .map_err(|e| map_sftp_error(e, path))
    }

    async fn read_link(&self, path: &str) -> Result<String, FsError> {
        SftpSession::read_link(self, path)
            .await
            .map_err(|e| map_sftp_error(e, path))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<(String, RawAttrs)>, FsError> {
        let entries = SftpSession::read_dir(self, path)
            .await
            .map_err(|e| map_sftp_error(e, path))?;

        Ok(entries
            .map(|entry| (entry.file_name(), raw_attrs(&entry.metadata())))
            .collect())
    }

    async fn read(&self, path: &str) -> Result<Vec<u8>, FsError> {
        SftpSession::read(self, path)
            .await
            .map_err(|e| map_sftp_error(e, path))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        let mut file = self
            .open_with_flags(path, OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE)
            .await
            .map_err(|e| map_sftp_error(e, path))?;

        file.write_all(content).await?;
        file.shutdown().await?;
        Ok(())
    }

    async fn write_from(
        &self,
        path: &str,
        reader: &mut (dyn AsyncRead + Send + Unpin),
    ) -> Result<u64, FsError> {
        let mut file = self
            .open_with_flags(path, OpenFlags::CREATE | OpenFlags::TRUNCATE | OpenFlags::WRITE)
            .await
            .map_err(|e| map_sftp_error(e, path))?;

        let mut buffer = vec![0u8; UPLOAD_CHUNK_SIZE];
        let mut transferred = 0u64;

        loop {
            let bytes_read = reader.read(&mut buffer).await?;
            if bytes_read == 0 {
                break;
            }
            file.write_all(&buffer[..bytes_read]).await?;
            transferred += bytes_read as u64;
        }

        file.shutdown().await?;
        Ok(transferred)
    }

    async fn create_dir(&self, path: &str) -> Result<(), FsError> {
        SftpSession::create_dir(self, path)
            .await
            .map_err(|e| map_sftp_error(e, path))
    }

    async fn remove_file(&self, path: &str) -> Result<(), FsError> {
        SftpSession::remove_file(self, path)
            .await
            .map_err(|e| map_sftp_error(e, path))
    }

    async fn remove_dir(&self, path: &str) -> Result<(), FsError> {
        SftpSession::remove_dir(self, path)
            .await
            .map_err(|e| map_sftp_error(e, path))
    }

    async fn rename(&self, old_path: &str, new_path: &str) -> Result<(), FsError> {
        SftpSession::rename(self, old_path, new_path)
            .await
            .map_err(|e| map_sftp_error(e, old_path))
    }

    async fn canonicalize(&self, path: &str) -> Result<String, FsError> {
        SftpSession::canonicalize(self, path)
            .await
            .map_err(|e| map_sftp_error(e, path))
    }
}

/// Filesystem operations over one SFTP session
pub struct SftpFileOperations<P> {
    sftp: P,
    home: OnceCell<String>,
}

impl<P: SftpPrimitives> SftpFileOperations<P> {
    pub fn new(sftp: P) -> Self {
        Self {
            sftp,
            home: OnceCell::new(),
        }
    }

    /// Kind of whatever `link` finally points at, without the link bit.
    ///
    /// `depth` counts links followed so far, starting at 1.
    fn link_target_type<'a>(
        &'a self,
        link: String,
        depth: usize,
    ) -> BoxFuture<'a, Result<FileType, FsError>> {
        Box::pin(async move {
            if depth > MAX_SYMLINK_DEPTH {
                return Err(FsError::TooManySymlinks(link));
            }

            let target = resolve_link_target(&link, &self.sftp.read_link(&link).await?);

            match self.sftp.lstat(&target).await {
                Ok(attrs) if attrs.kind == RawKind::Symlink => {
                    self.link_target_type(target, depth + 1).await
                }
                Ok(attrs) => Ok(attrs.file_type()),
                Err(FsError::FileNotFound(_)) => {
                    debug!("Dangling symlink {} -> {}", link, target);
                    Ok(FileType::UNKNOWN)
                }
                Err(e) => Err(e),
            }
        })
    }

    async fn entry_type(&self, path: &str, attrs: &RawAttrs) -> Result<FileType, FsError> {
        if attrs.kind == RawKind::Symlink {
            Ok(FileType::SYMBOLIC_LINK | self.link_target_type(path.to_string(), 1).await?)
        } else {
            Ok(attrs.file_type())
        }
    }

    async fn listing(&self, path: &str) -> Result<Vec<(String, RawAttrs)>, FsError> {
        let mut entries = self.sftp.read_dir(path).await?;
        entries.retain(|(name, _)| !is_dot_entry(name));
        Ok(entries)
    }

    /// Depth-first: files are unlinked as they are met, directories are
    /// emptied and then removed. Links are never followed.
    fn delete_recursive<'a>(&'a self, path: String) -> BoxFuture<'a, Result<(), FsError>> {
        Box::pin(async move {
            for (name, attrs) in self.listing(&path).await? {
                let child = join_remote_path(&path, &name);
                if attrs.kind == RawKind::Directory {
                    self.delete_recursive(child).await?;
                } else {
                    self.sftp.remove_file(&child).await?;
                }
            }
            self.sftp.remove_dir(&path).await
        })
    }
}

#[async_trait]
impl<P: SftpPrimitives> FileOperations for SftpFileOperations<P> {
    async fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        let path = unescape_spaces(path);
        let attrs = self.sftp.lstat(&path).await?;

        Ok(FileStat {
            file_type: self.entry_type(&path, &attrs).await?,
            size: attrs.size,
            ctime: secs_to_millis(attrs.atime),
            mtime: secs_to_millis(attrs.mtime),
        })
    }

    async fn read_directory(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        let path = unescape_spaces(path);
        let raw = self.listing(&path).await?;

        let mut entries = Vec::with_capacity(raw.len());
        for (name, attrs) in raw {
            let child = join_remote_path(&path, &name);
            let file_type = match self.entry_type(&child, &attrs).await {
                Ok(file_type) => file_type,
                Err(e) => {
                    debug!("Could not resolve {}: {}", child, e);
                    attrs.file_type()
                }
            };
            entries.push(DirEntry::new(name, file_type));
        }

        sort_entries(&mut entries);
        Ok(entries)
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
        self.sftp.read(&unescape_spaces(path)).await
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        let path = unescape_spaces(path);
        debug!("Writing {} bytes to {}", content.len(), path);
        self.sftp.write(&path, content).await
    }

    async fn create_directory(&self, path: &str) -> Result<(), FsError> {
        let path = unescape_spaces(path);

        // Walk up to the first existing ancestor
        let mut missing = Vec::new();
        let mut current = path.clone();
        loop {
            match self.sftp.stat(&current).await {
                Ok(attrs) if attrs.kind == RawKind::Directory => break,
                Ok(_) if current == path => return Err(FsError::FileExists(path)),
                Ok(_) => return Err(FsError::FileNotADirectory(current)),
                Err(FsError::FileNotFound(_)) => {
                    let parent = parent_remote_path(&current);
                    missing.push(std::mem::replace(&mut current, parent));
                    if missing.last() == Some(&current) {
                        break;
                    }
                }
                Err(e) => return Err(e),
            }
        }

        for dir in missing.iter().rev() {
            debug!("Creating directory {}", dir);
            self.sftp.create_dir(dir).await?;
        }
        Ok(())
    }

    async fn delete(&self, path: &str, recursive: bool) -> Result<(), FsError> {
        let path = unescape_spaces(path);
        let attrs = self.sftp.lstat(&path).await?;

        if attrs.kind != RawKind::Directory {
            return self.sftp.remove_file(&path).await;
        }

        if recursive {
            info!("Recursively deleting {}", path);
            return self.delete_recursive(path).await;
        }

        if !self.listing(&path).await?.is_empty() {
            return Err(FsError::DirectoryNotEmpty(path));
        }
        self.sftp.remove_dir(&path).await
    }

    async fn rename(
        &self,
        old_path: &str,
        new_path: &str,
        overwrite: bool,
    ) -> Result<(), FsError> {
        let old_path = unescape_spaces(old_path);
        let new_path = unescape_spaces(new_path);

        // A missing source must fail before the target is touched
        self.sftp.lstat(&old_path).await?;
        if old_path == new_path {
            return Ok(());
        }

        let target = match self.sftp.lstat(&new_path).await {
            Ok(attrs) => attrs,
            Err(FsError::FileNotFound(_)) => return self.sftp.rename(&old_path, &new_path).await,
            Err(e) => return Err(e),
        };
        if !overwrite {
            return Err(FsError::FileExists(new_path));
        }
        if target.kind == RawKind::Directory && !self.listing(&new_path).await?.is_empty() {
            return Err(FsError::DirectoryNotEmpty(new_path));
        }

        // SFTP v3 rename never replaces the target, so park it beside the
        // destination until the move has succeeded
        let parked = join_remote_path(
            &parent_remote_path(&new_path),
            &format!(".tsfs-replaced-{}", uuid::Uuid::new_v4().simple()),
        );
        self.sftp.rename(&new_path, &parked).await?;

        if let Err(e) = self.sftp.rename(&old_path, &new_path).await {
            if let Err(restore) = self.sftp.rename(&parked, &new_path).await {
                warn!("Failed to restore {} from {}: {}", new_path, parked, restore);
            }
            return Err(e);
        }

        match target.kind {
            RawKind::Directory => self.sftp.remove_dir(&parked).await,
            _ => self.sftp.remove_file(&parked).await,
        }
    }

    async fn home_directory(&self) -> Result<String, FsError> {
        self.home
            .get_or_try_init(|| self.sftp.canonicalize("."))
            .await
            .cloned()
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<u64, FsError> {
        let remote_path = unescape_spaces(remote_path);
        let mut local_file = tokio::fs::File::open(local_path).await?;

        info!("Uploading {} to {}", local_path.display(), remote_path);
        let transferred = self.sftp.write_from(&remote_path, &mut local_file).await?;
        debug!("Uploaded {} bytes to {}", transferred, remote_path);
        Ok(transferred)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MemoryFs;

    fn ops() -> (MemoryFs, SftpFileOperations<MemoryFs>) {
        let fs = MemoryFs::new();
        (fs.clone(), SftpFileOperations::new(fs))
    }

    #[tokio::test]
    async fn test_stat_scales_times() {
        let (fs, ops) = ops();
        fs.add_file_with_times("/srv/report.csv", b"a,b\n", 1_699_000_000, 1_700_000_000);

        let stat = ops.stat("/srv/report.csv").await.unwrap();
        assert_eq!(stat.file_type, FileType::FILE);
        assert_eq!(stat.size, 4);
        assert_eq!(stat.ctime, 1_699_000_000_000);
        assert_eq!(stat.mtime, 1_700_000_000_000);
    }

    #[tokio::test]
    async fn test_stat_symlink_to_directory() {
        let (fs, ops) = ops();
        fs.add_dir("/srv/releases/42");
        fs.add_symlink("/srv/current", "releases/42");

        let stat = ops.stat("/srv/current").await.unwrap();
        assert_eq!(stat.file_type, FileType::SYMBOLIC_LINK | FileType::DIRECTORY);
    }

    #[tokio::test]
    async fn test_dangling_symlink() {
        let (fs, ops) = ops();
        fs.add_dir("/srv");
        fs.add_symlink("/srv/broken", "/nowhere");

        let stat = ops.stat("/srv/broken").await.unwrap();
        assert_eq!(stat.file_type, FileType::SYMBOLIC_LINK);
    }

    #[tokio::test]
    async fn test_symlink_chain_within_bound() {
        let (fs, ops) = ops();
        fs.add_file("/data/target.txt", b"x");
        let mut previous = "/data/target.txt".to_string();
        for i in 0..MAX_SYMLINK_DEPTH {
            let link = format!("/data/link{}", i);
            fs.add_symlink(&link, &previous);
            previous = link;
        }

        let stat = ops.stat(&previous).await.unwrap();
        assert_eq!(stat.file_type, FileType::SYMBOLIC_LINK | FileType::FILE);
    }

    #[tokio::test]
    async fn test_symlink_loop_is_bounded() {
        let (fs, ops) = ops();
        fs.add_dir("/loop");
        fs.add_symlink("/loop/a", "b");
        fs.add_symlink("/loop/b", "a");

        assert!(matches!(
            ops.stat("/loop/a").await,
            Err(FsError::TooManySymlinks(_))
        ));

        // Listings degrade to the bare link bit instead of failing
        let entries = ops.read_directory("/loop").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.file_type == FileType::SYMBOLIC_LINK));
    }

    #[tokio::test]
    async fn test_read_directory_sorted_without_dot_entries() {
        let (fs, ops) = ops();
        fs.add_file("/home/alice/zeta.txt", b"");
        fs.add_file("/home/alice/Alpha.txt", b"");
        fs.add_dir("/home/alice/projects");
        fs.add_dir("/home/alice/Music");

        let entries = ops.read_directory("/home/alice").await.unwrap();
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Music", "projects", "Alpha.txt", "zeta.txt"]);
    }

    #[tokio::test]
    async fn test_escaped_spaces_reach_server_unescaped() {
        let (fs, ops) = ops();
        fs.add_file("/home/alice/my file.txt", b"content");

        let bytes = ops.read_file("/home/alice/my\\ file.txt").await.unwrap();
        assert_eq!(bytes, b"content");
    }

    #[tokio::test]
    async fn test_write_file_creates_and_truncates() {
        let (fs, ops) = ops();
        fs.add_dir("/tmp");

        ops.write_file("/tmp/a.txt", b"first version").await.unwrap();
        ops.write_file("/tmp/a.txt", b"second").await.unwrap();
        assert_eq!(fs.contents("/tmp/a.txt").unwrap(), b"second");
    }

    #[tokio::test]
    async fn test_create_directory_makes_parents() {
        let (fs, ops) = ops();
        fs.add_dir("/srv");

        ops.create_directory("/srv/a/b/c").await.unwrap();
        assert!(fs.is_dir("/srv/a"));
        assert!(fs.is_dir("/srv/a/b/c"));

        // Idempotent
        ops.create_directory("/srv/a/b/c").await.unwrap();
    }

    #[tokio::test]
    async fn test_create_directory_over_file() {
        let (fs, ops) = ops();
        fs.add_file("/srv/file", b"");

        assert!(matches!(
            ops.create_directory("/srv/file").await,
            Err(FsError::FileExists(_))
        ));
        assert!(matches!(
            ops.create_directory("/srv/file/sub").await,
            Err(FsError::FileNotADirectory(_))
        ));
    }

    #[tokio::test]
    async fn test_delete_non_empty_directory_without_recursive() {
        let (fs, ops) = ops();
        fs.add_file("/srv/data/keep.txt", b"");

        assert!(matches!(
            ops.delete("/srv/data", false).await,
            Err(FsError::DirectoryNotEmpty(_))
        ));
        assert!(fs.exists("/srv/data/keep.txt"));

        fs.add_dir("/srv/empty");
        ops.delete("/srv/empty", false).await.unwrap();
        assert!(!fs.exists("/srv/empty"));
    }

    #[tokio::test]
    async fn test_recursive_delete_order() {
        let (fs, ops) = ops();
        fs.add_file("/d/f1", b"");
        fs.add_file("/d/sub/f2", b"");
        fs.clear_log();

        ops.delete("/d", true).await.unwrap();

        let removals: Vec<String> = fs
            .log()
            .into_iter()
            .filter(|op| op.starts_with("remove"))
            .collect();
        assert_eq!(
            removals,
            vec![
                "remove_file /d/f1",
                "remove_file /d/sub/f2",
                "remove_dir /d/sub",
                "remove_dir /d",
            ]
        );
        assert!(!fs.exists("/d"));
    }

    #[tokio::test]
    async fn test_recursive_delete_does_not_follow_links() {
        let (fs, ops) = ops();
        fs.add_file("/keep/important.txt", b"");
        fs.add_symlink("/d/link", "/keep");

        ops.delete("/d", true).await.unwrap();
        assert!(!fs.exists("/d"));
        assert!(fs.exists("/keep/important.txt"));
    }

    #[tokio::test]
    async fn test_rename_refuses_existing_target() {
        let (fs, ops) = ops();
        fs.add_file("/a.txt", b"a");
        fs.add_file("/b.txt", b"b");

        assert!(matches!(
            ops.rename("/a.txt", "/b.txt", false).await,
            Err(FsError::FileExists(_))
        ));

        ops.rename("/a.txt", "/b.txt", true).await.unwrap();
        assert!(!fs.exists("/a.txt"));
        assert_eq!(fs.contents("/b.txt").unwrap(), b"a");
    }

    #[tokio::test]
    async fn test_rename_missing_source_keeps_target() {
        let (fs, ops) = ops();
        fs.add_file("/b.txt", b"precious");

        assert!(matches!(
            ops.rename("/missing.txt", "/b.txt", true).await,
            Err(FsError::FileNotFound(_))
        ));
        assert_eq!(fs.contents("/b.txt").unwrap(), b"precious");
        assert!(!fs.log().iter().any(|op| op.starts_with("remove")));
    }

    #[tokio::test]
    async fn test_failed_overwrite_restores_target() {
        let (fs, ops) = ops();
        fs.add_dir("/data");
        fs.add_file("/data/a.txt", b"a");
        fs.add_file("/data/b.txt", b"precious");
        fs.fail_renames_from("/data/a.txt");

        assert!(ops.rename("/data/a.txt", "/data/b.txt", true).await.is_err());
        assert_eq!(fs.contents("/data/a.txt").unwrap(), b"a");
        assert_eq!(fs.contents("/data/b.txt").unwrap(), b"precious");
        assert_eq!(fs.names_in("/data"), vec!["a.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_overwrite_leaves_no_parked_copy() {
        let (fs, ops) = ops();
        fs.add_dir("/data");
        fs.add_file("/data/a.txt", b"a");
        fs.add_file("/data/b.txt", b"b");

        ops.rename("/data/a.txt", "/data/b.txt", true).await.unwrap();
        assert_eq!(fs.contents("/data/b.txt").unwrap(), b"a");
        assert_eq!(fs.names_in("/data"), vec!["b.txt"]);
    }

    #[tokio::test]
    async fn test_home_directory_is_cached() {
        let (fs, ops) = ops();

        assert_eq!(ops.home_directory().await.unwrap(), "/home/alice");
        assert_eq!(ops.home_directory().await.unwrap(), "/home/alice");
        let canonicalize_calls = fs
            .log()
            .iter()
            .filter(|op| op.starts_with("canonicalize"))
            .count();
        assert_eq!(canonicalize_calls, 1);
    }

    #[tokio::test]
    async fn test_upload_streams_file() {
        let (fs, ops) = ops();
        fs.add_dir("/upload");

        let local = tempfile::NamedTempFile::new().unwrap();
        let payload: Vec<u8> = (0..200_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(local.path(), &payload).unwrap();

        let written = ops.upload(local.path(), "/upload/blob.bin").await.unwrap();
        assert_eq!(written, payload.len() as u64);
        assert_eq!(fs.contents("/upload/blob.bin").unwrap(), payload);
        assert!(fs.max_write_chunk() <= UPLOAD_CHUNK_SIZE);
    }
}
