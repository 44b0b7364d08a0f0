//! Pooled SSH connection with its SFTP session

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::info;

use super::client::SshClient;
use super::config::SshConfig;
use super::connection_pool::{Connector, PooledConnection};
use super::error::SshError;
use super::handle_owner::{spawn_handle_owner_task, HandleController};
use crate::fs::sftp::open_sftp;
use crate::fs::{FileOperations, SftpFileOperations, Timed};

/// Dials `username@host` with the template's port and auth methods, then
/// opens the SFTP subsystem.
pub struct SshConnector {
    template: SshConfig,
    log_timing: bool,
}

impl SshConnector {
    pub fn new(template: SshConfig) -> Self {
        Self {
            template,
            log_timing: false,
        }
    }

    /// Wrap every connection's operations in [`Timed`]
    pub fn with_timing(mut self, log_timing: bool) -> Self {
        self.log_timing = log_timing;
        self
    }
}

#[async_trait]
impl Connector for SshConnector {
    type Connection = SshConnection;

    async fn connect(&self, host: &str, username: &str) -> Result<SshConnection, SshError> {
        let config = self.template.for_host(host, username);
        let handle = SshClient::new(config).connect().await?;

        let label = format!("{}@{}", username, host);
        let controller = spawn_handle_owner_task(handle, label.clone());

        let sftp = match open_sftp(&controller).await {
            Ok(sftp) => sftp,
            Err(e) => {
                controller.disconnect().await;
                return Err(e);
            }
        };
        info!("SFTP subsystem opened for {}", label);

        let operations: Arc<dyn FileOperations> = if self.log_timing {
            Arc::new(Timed::new(SftpFileOperations::new(sftp)))
        } else {
            Arc::new(SftpFileOperations::new(sftp))
        };

        Ok(SshConnection {
            inner: Arc::new(ConnectionInner {
                id: uuid::Uuid::new_v4().to_string(),
                host: host.to_string(),
                username: username.to_string(),
                controller,
                operations,
            }),
        })
    }
}

struct ConnectionInner {
    id: String,
    host: String,
    username: String,
    controller: HandleController,
    operations: Arc<dyn FileOperations>,
}

#[derive(Clone)]
pub struct SshConnection {
    inner: Arc<ConnectionInner>,
}

#[async_trait]
impl PooledConnection for SshConnection {
    fn subscribe_close(&self) -> broadcast::Receiver<()> {
        self.inner.controller.subscribe_disconnect()
    }

    fn is_connected(&self) -> bool {
        self.inner.controller.is_connected()
    }

    fn file_operations(&self) -> Arc<dyn FileOperations> {
        self.inner.operations.clone()
    }

    async fn close(&self) {
        info!(
            "Closing connection {} ({}@{})",
            self.inner.id, self.inner.username, self.inner.host
        );
        self.inner.controller.disconnect().await;
    }
}
