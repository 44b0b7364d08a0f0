//! Connection manager
//!
//! Resolves the username for a host, hands out pooled connections and
//! recovers from one authentication failure by asking the user for a
//! different username.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use super::connection_pool::{ConnectionPool, Connector, PooledConnection};
use super::error::SshError;
use crate::error::FsError;
use crate::fs::FileOperations;
use crate::prompt::UsernamePrompt;
use crate::settings::{resolve_username, HostSettings};

/// Re-dials allowed after an authentication failure
pub const MAX_AUTH_RETRIES: usize = 1;

/// Host-addressed access to file operations
#[async_trait]
pub trait HostConnections: Send + Sync {
    async fn file_operations(&self, host: &str) -> Result<Arc<dyn FileOperations>, FsError>;

    async fn close_connection(&self, host: &str);

    async fn close_all(&self);

    /// Home directory of the resolved user on `host`
    async fn home_directory(&self, host: &str) -> Result<String, FsError> {
        self.file_operations(host).await?.home_directory().await
    }
}

pub struct ConnectionManager<C: Connector> {
    pool: ConnectionPool<C>,
    settings: Arc<dyn HostSettings>,
    prompt: Arc<dyn UsernamePrompt>,
}

impl<C: Connector> ConnectionManager<C> {
    pub fn new(
        connector: C,
        settings: Arc<dyn HostSettings>,
        prompt: Arc<dyn UsernamePrompt>,
    ) -> Self {
        Self {
            pool: ConnectionPool::new(connector),
            settings,
            prompt,
        }
    }

    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    /// Pooled connection for the resolved user, without auth recovery
    pub async fn connection(&self, host: &str) -> Result<C::Connection, SshError> {
        let username = resolve_username(self.settings.as_ref(), host);
        self.pool
            .get(host, &username, self.settings.connection_timeout())
            .await
    }

    /// Pooled connection, prompting for a new username once if the server
    /// rejects the resolved one.
    pub async fn connect_with_retry(&self, host: &str) -> Result<C::Connection, FsError> {
        let mut attempted: Vec<String> = Vec::new();
        let mut prompted: Option<String> = None;

        loop {
            // The prompt answer wins even if saving it failed
            let username = prompted
                .take()
                .unwrap_or_else(|| resolve_username(self.settings.as_ref(), host));

            // Timeout is read per dial; settings may change between attempts
            let timeout = self.settings.connection_timeout();
            let err = match self.pool.get(host, &username, timeout).await {
                Ok(conn) => return Ok(conn),
                Err(err) => err,
            };

            let Some(level) = err.auth_level() else {
                return Err(err.into());
            };

            warn!(
                "Authentication failed for {}@{} ({:?}): {}",
                username, host, level, err
            );
            attempted.push(username.clone());
            if attempted.len() > MAX_AUTH_RETRIES {
                return Err(err.into());
            }

            self.prompt.notify_auth_failure(host, &username, level).await;

            let answer = self
                .prompt
                .prompt_for_username(host)
                .await
                .map(|answer| answer.trim().to_string())
                .filter(|answer| !answer.is_empty());

            let Some(answer) = answer else {
                info!("No username entered for {}", host);
                return Err(FsError::UsernameRequired(host.to_string()));
            };

            if let Err(e) = self.settings.set_username_override(host, &answer).await {
                warn!("Failed to save username for {}: {}", host, e);
            }
            info!("Retrying {} as {} (tried {:?})", host, answer, attempted);
            prompted = Some(answer);
        }
    }
}

#[async_trait]
impl<C: Connector> HostConnections for ConnectionManager<C> {
    async fn file_operations(&self, host: &str) -> Result<Arc<dyn FileOperations>, FsError> {
        Ok(self.connect_with_retry(host).await?.file_operations())
    }

    async fn close_connection(&self, host: &str) {
        let username = resolve_username(self.settings.as_ref(), host);
        self.pool.close(host, &username).await;
    }

    async fn close_all(&self) {
        self.pool.close_all().await;
    }
}
