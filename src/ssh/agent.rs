//! SSH Agent authentication
//!
//! Delegates challenge signing to the system agent through russh's
//! [`AgentClient`]. Used as a fallback when a host does not accept `none`
//! authentication (machines without Tailscale SSH enabled).
//!
//! # Platform Support
//! - **Unix/Linux/macOS**: `SSH_AUTH_SOCK` Unix domain socket
//! - **Windows**: `\\\\.\\pipe\\openssh-ssh-agent` named pipe

use std::future::Future;

use russh::client::Handle;
use russh::keys::agent::client::{AgentClient, AgentStream};
use russh::keys::ssh_key;
use russh::{AgentAuthError, CryptoVec, Signer};
use tracing::{debug, info, warn};

use super::client::ClientHandler;
use super::error::SshError;

/// Send-safe [`Signer`] over [`AgentClient`].
///
/// The built-in impl borrows the requested key across an `.await`, which makes
/// the authentication future `!Send`. Cloning the key first avoids that.
struct AgentSigner<'a> {
    agent: &'a mut AgentClient<Box<dyn AgentStream + Send + Unpin + 'static>>,
}

impl Signer for AgentSigner<'_> {
    type Error = AgentAuthError;

    fn auth_publickey_sign(
        &mut self,
        key: &ssh_key::PublicKey,
        hash_alg: Option<ssh_key::HashAlg>,
        to_sign: CryptoVec,
    ) -> impl Future<Output = Result<CryptoVec, Self::Error>> + Send {
        let key_owned = key.clone();
        async move {
            self.agent
                .sign_request(&key_owned, hash_alg, to_sign)
                .await
                .map_err(Into::into)
        }
    }
}

pub struct SshAgentClient {
    agent: AgentClient<Box<dyn AgentStream + Send + Unpin + 'static>>,
}

impl SshAgentClient {
    /// Connect to the system SSH Agent
    pub async fn connect() -> Result<Self, SshError> {
        #[cfg(unix)]
        {
            let agent = AgentClient::connect_env().await.map_err(|e| {
                SshError::AgentNotAvailable(format!(
                    "Failed to connect to SSH Agent: {}. Is SSH_AUTH_SOCK set?",
                    e
                ))
            })?;
            debug!("Connected to SSH Agent via SSH_AUTH_SOCK");
            Ok(Self {
                agent: agent.dynamic(),
            })
        }

        #[cfg(windows)]
        {
            let agent = AgentClient::connect_named_pipe(r"\\.\pipe\openssh-ssh-agent")
                .await
                .map_err(|e| {
                    SshError::AgentNotAvailable(format!(
                        "Failed to connect to SSH Agent via named pipe: {}",
                        e
                    ))
                })?;
            debug!("Connected to SSH Agent via named pipe");
            Ok(Self {
                agent: agent.dynamic(),
            })
        }

        #[cfg(not(any(unix, windows)))]
        {
            Err(SshError::AgentNotAvailable(
                "SSH Agent is not supported on this platform".to_string(),
            ))
        }
    }

    /// Try every agent-held key against the server.
    ///
    /// Returns `Ok(false)` when the server rejected all of them.
    pub async fn authenticate(
        &mut self,
        handle: &mut Handle<ClientHandler>,
        username: &str,
    ) -> Result<bool, SshError> {
        let keys = self
            .agent
            .request_identities()
            .await
            .map_err(|e| SshError::AgentError(format!("Failed to list agent keys: {}", e)))?;

        if keys.is_empty() {
            debug!("SSH Agent has no keys loaded");
            return Ok(false);
        }

        info!("SSH Agent reports {} key(s), attempting authentication", keys.len());

        for key in &keys {
            debug!("Trying agent key: {} ({})", key.algorithm(), key.comment());

            match handle
                .authenticate_publickey_with(
                    username,
                    key.clone(),
                    None,
                    &mut AgentSigner {
                        agent: &mut self.agent,
                    },
                )
                .await
            {
                Ok(result) if result.success() => {
                    info!("SSH Agent authentication succeeded with key: {}", key.comment());
                    return Ok(true);
                }
                Ok(_) => debug!("Key rejected by server: {}", key.comment()),
                Err(e) => warn!("Agent signing error for key {}: {}", key.comment(), e),
            }
        }

        Ok(false)
    }
}

/// Quick check whether an agent looks reachable
pub fn is_agent_available() -> bool {
    #[cfg(unix)]
    {
        std::env::var("SSH_AUTH_SOCK").is_ok()
    }

    #[cfg(windows)]
    {
        true
    }

    #[cfg(not(any(unix, windows)))]
    {
        false
    }
}
