//! URI-level filesystem facade
//!
//! Every call takes a `ts://tailnet/host/path` URI, obtains the pooled file
//! operations for the host and runs the operation on the resolved path.
//! Errors come back translated into [`FsError`].

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::error::{translate_error, FsError};
use crate::fs::command::ProcessRunner;
use crate::fs::{CommandConnector, DirEntry, FileOperations, FileStat};
use crate::prompt::UsernamePrompt;
use crate::settings::{Backend, HostSettings, JsonSettingsStore};
use crate::ssh::{ConnectionManager, HostConnections, SshConfig, SshConnector};
use crate::uri::{parse, TsUri};

pub struct RemoteFileSystem {
    connections: Arc<dyn HostConnections>,
}

impl RemoteFileSystem {
    pub fn new(connections: Arc<dyn HostConnections>) -> Self {
        Self { connections }
    }

    /// Build the connection manager for the backend chosen in `store`.
    ///
    /// `template` supplies port and auth methods for SSH dials; the command
    /// backend relies on the local `ssh` configuration instead.
    pub fn from_settings(
        store: Arc<JsonSettingsStore>,
        prompt: Arc<dyn UsernamePrompt>,
        template: SshConfig,
    ) -> Self {
        let backend = store.backend();
        let log_timing = store.log_timing();
        let settings: Arc<dyn HostSettings> = store;

        info!("Using {:?} backend (timing: {})", backend, log_timing);
        let connections: Arc<dyn HostConnections> = match backend {
            Backend::Sftp => Arc::new(ConnectionManager::new(
                SshConnector::new(template).with_timing(log_timing),
                settings,
                prompt,
            )),
            Backend::Command => Arc::new(ConnectionManager::new(
                CommandConnector::new(ProcessRunner::new()).with_timing(log_timing),
                settings,
                prompt,
            )),
        };

        Self::new(connections)
    }

    /// File operations for the URI's host plus the path with the home
    /// marker expanded
    async fn resolve(&self, uri: &TsUri) -> Result<(Arc<dyn FileOperations>, String), FsError> {
        let ops = self.connections.file_operations(&uri.host).await?;
        let path = if uri.is_home_relative() {
            let home = ops.home_directory().await?;
            uri.expand_home(&home).resource_path
        } else {
            uri.resource_path.clone()
        };
        Ok((ops, path))
    }

    async fn run<T, F, Fut>(&self, operation: &str, uri: &str, f: F) -> Result<T, FsError>
    where
        F: FnOnce(Arc<dyn FileOperations>, String) -> Fut,
        Fut: Future<Output = Result<T, FsError>>,
    {
        info!("{}: {}", operation, uri);

        let result = async {
            let target = parse(uri)?;
            let (ops, path) = self.resolve(&target).await?;
            f(ops, path).await
        }
        .await;

        result.map_err(|err| translate_error(operation, uri, err))
    }

    pub async fn stat(&self, uri: &str) -> Result<FileStat, FsError> {
        self.run("stat", uri, |ops, path| async move { ops.stat(&path).await })
            .await
    }

    pub async fn read_directory(&self, uri: &str) -> Result<Vec<DirEntry>, FsError> {
        self.run("readDirectory", uri, |ops, path| async move {
            ops.read_directory(&path).await
        })
        .await
    }

    pub async fn read_file(&self, uri: &str) -> Result<Vec<u8>, FsError> {
        self.run("readFile", uri, |ops, path| async move {
            ops.read_file(&path).await
        })
        .await
    }

    pub async fn write_file(&self, uri: &str, content: &[u8]) -> Result<(), FsError> {
        self.run("writeFile", uri, |ops, path| async move {
            ops.write_file(&path, content).await
        })
        .await
    }

    pub async fn create_directory(&self, uri: &str) -> Result<(), FsError> {
        self.run("createDirectory", uri, |ops, path| async move {
            ops.create_directory(&path).await
        })
        .await
    }

    pub async fn delete(&self, uri: &str, recursive: bool) -> Result<(), FsError> {
        self.run("delete", uri, |ops, path| async move {
            ops.delete(&path, recursive).await
        })
        .await
    }

    /// Rename within one host. Differing hosts or tailnets fail with
    /// [`FsError::CrossHost`] before anything is dialed.
    pub async fn rename(
        &self,
        old_uri: &str,
        new_uri: &str,
        overwrite: bool,
    ) -> Result<(), FsError> {
        info!("rename: {} -> {}", old_uri, new_uri);

        let result = async {
            let old = parse(old_uri)?;
            let new = parse(new_uri)?;
            if !old.same_host(&new) {
                return Err(FsError::CrossHost {
                    from: old_uri.to_string(),
                    to: new_uri.to_string(),
                });
            }

            let (ops, old_path) = self.resolve(&old).await?;
            let new_path = if new.is_home_relative() {
                new.expand_home(&ops.home_directory().await?).resource_path
            } else {
                new.resource_path
            };
            ops.rename(&old_path, &new_path, overwrite).await
        }
        .await;

        result.map_err(|err| translate_error("rename", old_uri, err))
    }

    /// Copy a local file to `uri`, returning the bytes sent
    pub async fn upload(&self, local_path: &Path, uri: &str) -> Result<u64, FsError> {
        self.run("upload", uri, |ops, path| async move {
            ops.upload(local_path, &path).await
        })
        .await
    }

    pub async fn home_directory(&self, host: &str) -> Result<String, FsError> {
        info!("homeDirectory: {}", host);
        self.connections
            .home_directory(host)
            .await
            .map_err(|err| translate_error("homeDirectory", host, err))
    }

    pub async fn close(&self, host: &str) {
        self.connections.close_connection(host).await;
    }

    pub async fn close_all(&self) {
        self.connections.close_all().await;
    }
}
