//! Subprocess backend
//!
//! Every operation runs one `ssh user@host <command>` through the remote
//! shell; uploads use `scp`. Nothing is kept open between calls, so the
//! pooled "connection" is only a destination that has passed an auth probe.

use std::path::Path;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, info};

use super::types::{secs_to_millis, sort_entries};
use super::{DirEntry, FileOperations, FileStat, FileType, Timed};
use crate::error::FsError;
use crate::ssh::{AuthFailureLevel, Connector, PooledConnection, SshError};
use crate::uri::unescape_spaces;

/// Prints one JSON object per path
const STAT_FORMAT: &str = r#"'{"type": "%F", "size": %s, "ctime": %Z, "mtime": %Y}'"#;

/// Runs commands on a remote destination (`user@host`)
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run `command` in the remote shell and return its stdout.
    ///
    /// A non-zero exit fails with the trimmed stderr as an
    /// [`FsError::Unknown`] message.
    async fn run(
        &self,
        destination: &str,
        command: &str,
        stdin: Option<&[u8]>,
    ) -> Result<Vec<u8>, FsError>;

    /// Copy a local file to `destination:remote_path`
    async fn copy_to(
        &self,
        local_path: &Path,
        destination: &str,
        remote_path: &str,
    ) -> Result<(), FsError>;
}

#[async_trait]
impl<R: CommandRunner + ?Sized> CommandRunner for Arc<R> {
    async fn run(
        &self,
        destination: &str,
        command: &str,
        stdin: Option<&[u8]>,
    ) -> Result<Vec<u8>, FsError> {
        (**self).run(destination, command, stdin).await
    }

    async fn copy_to(
        &self,
        local_path: &Path,
        destination: &str,
        remote_path: &str,
    ) -> Result<(), FsError> {
        (**self).copy_to(local_path, destination, remote_path).await
    }
}

/// Spawns the local `ssh` / `scp` binaries
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    ssh_program: String,
    scp_program: String,
    /// Never prompt on the terminal; failures must surface as stderr
    options: Vec<String>,
}

impl ProcessRunner {
    pub fn new() -> Self {
        Self {
            ssh_program: "ssh".to_string(),
            scp_program: "scp".to_string(),
            options: vec!["-o".to_string(), "BatchMode=yes".to_string()],
        }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new()
    }
}

fn failure(what: &str, status: std::process::ExitStatus, stderr: &[u8]) -> FsError {
    let stderr = String::from_utf8_lossy(stderr).trim().to_string();
    if stderr.is_empty() {
        FsError::Unknown(format!("{}: {}", what, status))
    } else {
        FsError::Unknown(stderr)
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        destination: &str,
        command: &str,
        stdin: Option<&[u8]>,
    ) -> Result<Vec<u8>, FsError> {
        debug!("Running on {}: {}", destination, command);

        let mut child = Command::new(&self.ssh_program)
            .args(&self.options)
            .arg(destination)
            .arg(command)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let (Some(data), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(data).await?;
            // Dropping the pipe sends EOF
        }

        let output = child.wait_with_output().await?;
        if output.status.success() {
            Ok(output.stdout)
        } else {
            Err(failure(command, output.status, &output.stderr))
        }
    }

    async fn copy_to(
        &self,
        local_path: &Path,
        destination: &str,
        remote_path: &str,
    ) -> Result<(), FsError> {
        let target = format!("{}:{}", destination, remote_path);
        debug!("Copying {} to {}", local_path.display(), target);

        let output = Command::new(&self.scp_program)
            .args(&self.options)
            .arg("-q")
            .arg(local_path)
            .arg(&target)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await?;

        if output.status.success() {
            Ok(())
        } else {
            Err(failure("scp", output.status, &output.stderr))
        }
    }
}

/// Quote for a POSIX shell. Backslash-escaped spaces are undone first.
pub fn shell_quote(path: &str) -> String {
    format!("'{}'", unescape_spaces(path).replace('\'', r#"'\''"#))
}

#[derive(Debug, Deserialize)]
struct StatLine {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    size: u64,
    ctime: u64,
    mtime: u64,
}

fn parse_stat_line(line: &str) -> Result<FileStat, FsError> {
    let line: StatLine = serde_json::from_str(line.trim())
        .map_err(|e| FsError::Unknown(format!("unexpected stat output: {}", e)))?;

    let file_type = match line.kind.as_str() {
        "directory" => FileType::DIRECTORY,
        "symbolic link" => FileType::SYMBOLIC_LINK,
        _ => FileType::FILE,
    };

    Ok(FileStat {
        file_type,
        size: line.size,
        ctime: secs_to_millis(line.ctime),
        mtime: secs_to_millis(line.mtime),
    })
}

/// Parse the output of [`stat_command`]: the link's own line, followed by
/// the resolved target's line when the path is a symlink that resolves.
///
/// A link keeps its own times and gains the target's type bits; a dangling
/// link is reported as a bare `SYMBOLIC_LINK`.
pub fn parse_stat_output(stdout: &str) -> Result<FileStat, FsError> {
    let mut lines = stdout.lines().filter(|line| !line.trim().is_empty());
    let first = lines.next().unwrap_or_default();
    let mut stat = parse_stat_line(first)?;

    if stat.file_type == FileType::SYMBOLIC_LINK {
        if let Some(resolved) = lines.next() {
            let target = parse_stat_line(resolved)?;
            stat.file_type |= target.file_type;
            stat.size = target.size;
        }
    }
    Ok(stat)
}

/// `stat` the path itself, then follow it. The follow may fail for a
/// dangling link without failing the command.
fn stat_command(path: &str) -> String {
    let quoted = shell_quote(path);
    format!(
        "stat -c {format} {path} && {{ stat -L -c {format} {path} 2>/dev/null || true; }}",
        format = STAT_FORMAT,
        path = quoted
    )
}

/// Parse `ls -Ap`: one name per line, directories end in `/`
pub fn parse_ls_output(stdout: &str) -> Vec<DirEntry> {
    let mut entries: Vec<DirEntry> = stdout
        .lines()
        .filter(|line| !line.is_empty())
        .map(|line| match line.strip_suffix('/') {
            Some(name) => DirEntry::new(name, FileType::DIRECTORY),
            None => DirEntry::new(line, FileType::FILE),
        })
        .collect();
    sort_entries(&mut entries);
    entries
}

pub struct CommandFileOperations<R> {
    runner: R,
    destination: String,
    home: OnceCell<String>,
}

impl<R: CommandRunner> CommandFileOperations<R> {
    pub fn new(runner: R, destination: impl Into<String>) -> Self {
        Self {
            runner,
            destination: destination.into(),
            home: OnceCell::new(),
        }
    }

    async fn run(&self, command: &str) -> Result<Vec<u8>, FsError> {
        self.runner.run(&self.destination, command, None).await
    }

    async fn run_text(&self, command: &str) -> Result<String, FsError> {
        let stdout = self.run(command).await?;
        Ok(String::from_utf8_lossy(&stdout).into_owned())
    }
}

#[async_trait]
impl<R: CommandRunner> FileOperations for CommandFileOperations<R> {
    async fn stat(&self, path: &str) -> Result<FileStat, FsError> {
        let stdout = self
            .run_text(&stat_command(path))
            .await?;
        parse_stat_output(&stdout)
    }

    async fn read_directory(&self, path: &str) -> Result<Vec<DirEntry>, FsError> {
        let stdout = self.run_text(&format!("ls -Ap {}", shell_quote(path))).await?;
        Ok(parse_ls_output(&stdout))
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
        self.run(&format!("cat {}", shell_quote(path))).await
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), FsError> {
        self.runner
            .run(
                &self.destination,
                &format!("cat > {}", shell_quote(path)),
                Some(content),
            )
            .await
            .map(|_| ())
    }

    async fn create_directory(&self, path: &str) -> Result<(), FsError> {
        // A file in the way must surface as "file already exists"
        let quoted = shell_quote(path);
        self.run(&format!(
            "if [ -e {q} ] && [ ! -d {q} ]; then echo 'mkdir: file already exists' >&2; exit 1; fi; mkdir -p {q}",
            q = quoted
        ))
        .await
        .map(|_| ())
    }

    async fn delete(&self, path: &str, recursive: bool) -> Result<(), FsError> {
        let quoted = shell_quote(path);
        let command = if recursive {
            format!("rm -r {}", quoted)
        } else {
            // rmdir refuses non-empty directories
            format!(
                "if [ -d {q} ] && [ ! -L {q} ]; then rmdir {q}; else rm {q}; fi",
                q = quoted
            )
        };
        self.run(&command).await.map(|_| ())
    }

    async fn rename(
        &self,
        old_path: &str,
        new_path: &str,
        overwrite: bool,
    ) -> Result<(), FsError> {
        let old = shell_quote(old_path);
        let new = shell_quote(new_path);
        let command = if overwrite {
            format!("mv -f {} {}", old, new)
        } else {
            format!(
                "if [ -e {new} ] || [ -L {new} ]; then echo 'mv: file already exists' >&2; exit 1; fi; mv {old} {new}",
                old = old,
                new = new
            )
        };
        self.run(&command).await.map(|_| ())
    }

    async fn home_directory(&self) -> Result<String, FsError> {
        self.home
            .get_or_try_init(|| async {
                let stdout = self.run_text("echo ~").await?;
                Ok::<_, FsError>(stdout.trim().to_string())
            })
            .await
            .cloned()
    }

    async fn upload(&self, local_path: &Path, remote_path: &str) -> Result<u64, FsError> {
        let size = tokio::fs::metadata(local_path).await?.len();
        info!("Uploading {} to {}", local_path.display(), remote_path);
        self.runner
            .copy_to(local_path, &self.destination, &unescape_spaces(remote_path))
            .await?;
        Ok(size)
    }
}

/// Probes `user@host` with `ssh … true` and hands out command-backed
/// connections.
pub struct CommandConnector<R> {
    runner: Arc<R>,
    log_timing: bool,
}

impl<R: CommandRunner + 'static> CommandConnector<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner: Arc::new(runner),
            log_timing: false,
        }
    }

    pub fn with_timing(mut self, log_timing: bool) -> Self {
        self.log_timing = log_timing;
        self
    }
}

#[async_trait]
impl<R: CommandRunner + 'static> Connector for CommandConnector<R> {
    type Connection = CommandConnection;

    async fn connect(&self, host: &str, username: &str) -> Result<CommandConnection, SshError> {
        let destination = format!("{}@{}", username, host);

        if let Err(err) = self.runner.run(&destination, "true", None).await {
            let message = err.to_string();
            return Err(if message.to_lowercase().contains("permission denied") {
                SshError::AuthenticationFailed {
                    level: AuthFailureLevel::classify(Some(&message), username),
                    username: username.to_string(),
                    host: host.to_string(),
                    message,
                }
            } else {
                SshError::ConnectionFailed(message)
            });
        }

        let ops = CommandFileOperations::new(self.runner.clone(), destination.clone());
        let operations: Arc<dyn FileOperations> = if self.log_timing {
            Arc::new(Timed::new(ops))
        } else {
            Arc::new(ops)
        };

        info!("Command backend ready for {}", destination);
        Ok(CommandConnection::new(operations))
    }
}

struct CommandConnectionInner {
    operations: Arc<dyn FileOperations>,
    closed: AtomicBool,
    close_tx: broadcast::Sender<()>,
}

#[derive(Clone)]
pub struct CommandConnection {
    inner: Arc<CommandConnectionInner>,
}

impl CommandConnection {
    fn new(operations: Arc<dyn FileOperations>) -> Self {
        let (close_tx, _) = broadcast::channel(1);
        Self {
            inner: Arc::new(CommandConnectionInner {
                operations,
                closed: AtomicBool::new(false),
                close_tx,
            }),
        }
    }
}

#[async_trait]
impl PooledConnection for CommandConnection {
    fn subscribe_close(&self) -> broadcast::Receiver<()> {
        self.inner.close_tx.subscribe()
    }

    fn is_connected(&self) -> bool {
        !self.inner.closed.load(Ordering::SeqCst)
    }

    fn file_operations(&self) -> Arc<dyn FileOperations> {
        self.inner.operations.clone()
    }

    async fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let _ = self.inner.close_tx.send(());
    }
}
