//! SSH Client implementation using russh

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use russh::client::{self, Handle};
use russh::keys::key::PrivateKeyWithHashAlg;
use russh::keys::known_hosts::{check_known_hosts, learn_known_hosts};
use russh::keys::{HashAlg, PublicKey};
use tracing::{debug, info, warn};

use super::agent::{is_agent_available, SshAgentClient};
use super::config::{AuthMethod, SshConfig};
use super::error::{AuthFailureLevel, SshError};

pub struct SshClient {
    config: SshConfig,
}

impl SshClient {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// Connect and authenticate, returning the live handle.
    ///
    /// The caller is expected to bound this with its own deadline.
    pub async fn connect(self) -> Result<Handle<ClientHandler>, SshError> {
        let SshConfig {
            host,
            port,
            username,
            auth_methods,
            keepalive_secs,
            strict_host_key_checking,
        } = self.config;

        info!("Connecting to SSH server at {}:{}", host, port);

        let ssh_config = client::Config {
            inactivity_timeout: None,
            keepalive_interval: Some(Duration::from_secs(keepalive_secs)),
            keepalive_max: 3,
            ..Default::default()
        };

        let banner = Arc::new(Mutex::new(None));
        let handler = ClientHandler {
            host: host.clone(),
            port,
            strict: strict_host_key_checking,
            banner: banner.clone(),
        };

        let mut handle = client::connect(Arc::new(ssh_config), (host.as_str(), port), handler)
            .await
            .map_err(|e| match e {
                SshError::ProtocolError(msg) => SshError::ConnectionFailed(msg),
                other => other,
            })?;

        debug!("SSH handshake completed with {}", host);

        for method in &auth_methods {
            if try_method(&mut handle, method, &username).await? {
                info!("SSH authentication successful for {}@{}", username, host);
                return Ok(handle);
            }
        }

        let banner = banner.lock().clone();
        let level = AuthFailureLevel::classify(banner.as_deref(), &username);
        warn!("All authentication methods rejected for {}@{} ({:?})", username, host, level);

        Err(SshError::AuthenticationFailed {
            level,
            username,
            host,
            message: banner
                .map(|b| b.trim().to_string())
                .unwrap_or_else(|| "Authentication rejected by server".to_string()),
        })
    }
}

/// Try one method. `Ok(false)` means the server said no and the next method
/// may be tried.
async fn try_method(
    handle: &mut Handle<ClientHandler>,
    method: &AuthMethod,
    username: &str,
) -> Result<bool, SshError> {
    match method {
        AuthMethod::None => {
            let result = handle.authenticate_none(username).await?;
            Ok(result.success())
        }
        AuthMethod::Agent => {
            if !is_agent_available() {
                debug!("Skipping agent authentication: no agent socket");
                return Ok(false);
            }
            let mut agent = match SshAgentClient::connect().await {
                Ok(agent) => agent,
                Err(e) => {
                    debug!("Skipping agent authentication: {}", e);
                    return Ok(false);
                }
            };
            agent.authenticate(handle, username).await
        }
        AuthMethod::Key {
            key_path,
            passphrase,
        } => {
            let key = russh::keys::load_secret_key(key_path, passphrase.as_deref())?;
            let key_with_hash = PrivateKeyWithHashAlg::new(Arc::new(key), None);
            let result = handle.authenticate_publickey(username, key_with_hash).await?;
            Ok(result.success())
        }
    }
}

/// Client handler for russh callbacks
///
/// Verifies host keys against `~/.ssh/known_hosts` and keeps the last
/// authentication banner, which is how Tailscale SSH reports unknown users.
pub struct ClientHandler {
    host: String,
    port: u16,
    /// - true: reject hosts missing from known_hosts
    /// - false: learn unknown hosts (changed keys are always rejected)
    strict: bool,
    banner: Arc<Mutex<Option<String>>>,
}

impl client::Handler for ClientHandler {
    type Error = SshError;

    async fn check_server_key(&mut self, server_public_key: &PublicKey) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint(HashAlg::Sha256);

        match check_known_hosts(&self.host, self.port, server_public_key) {
            Ok(true) => {
                debug!("Host key verified for {}:{}", self.host, self.port);
                Ok(true)
            }
            Ok(false) if self.strict => {
                warn!(
                    "Unknown host key for {}:{} (fingerprint: {}). Strict mode enabled, rejecting.",
                    self.host, self.port, fingerprint
                );
                Err(SshError::HostKeyRejected(format!(
                    "unknown host {}:{} ({})",
                    self.host, self.port, fingerprint
                )))
            }
            Ok(false) => {
                info!(
                    "New host {}:{}, adding to known_hosts (fingerprint: {})",
                    self.host, self.port, fingerprint
                );
                if let Err(e) = learn_known_hosts(&self.host, self.port, server_public_key) {
                    warn!("Failed to save host key: {}", e);
                }
                Ok(true)
            }
            Err(russh::keys::Error::KeyChanged { line }) => {
                warn!(
                    "HOST KEY CHANGED for {}:{} (known_hosts line {}), got {}",
                    self.host, self.port, line, fingerprint
                );
                Err(SshError::HostKeyRejected(format!(
                    "key for {}:{} has changed (known_hosts line {})",
                    self.host, self.port, line
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn auth_banner(
        &mut self,
        banner: &str,
        _session: &mut client::Session,
    ) -> Result<(), Self::Error> {
        debug!("Auth banner from {}: {}", self.host, banner.trim());
        *self.banner.lock() = Some(banner.to_string());
        Ok(())
    }
}
