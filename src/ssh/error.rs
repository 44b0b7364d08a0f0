//! SSH Error types

use serde::Serialize;
use thiserror::Error;

/// Why the server refused authentication
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuthFailureLevel {
    /// Credentials were rejected
    ClientAuthentication,
    /// The remote host has no such user
    WrongUser,
}

impl AuthFailureLevel {
    /// Classify an authentication failure from the pre-auth banner.
    ///
    /// Tailscale SSH announces unknown users with a banner like
    /// `tailscale: failed to look up local user "bob"`.
    pub fn classify(banner: Option<&str>, username: &str) -> Self {
        let Some(banner) = banner else {
            return AuthFailureLevel::ClientAuthentication;
        };
        let banner = banner.to_lowercase();
        if banner.contains("failed to look up") && banner.contains(&username.to_lowercase()) {
            AuthFailureLevel::WrongUser
        } else {
            AuthFailureLevel::ClientAuthentication
        }
    }
}

#[derive(Error, Debug, Clone)]
pub enum SshError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Authentication failed for {username}@{host}: {message}")]
    AuthenticationFailed {
        level: AuthFailureLevel,
        username: String,
        host: String,
        message: String,
    },

    #[error("Channel error: {0}")]
    ChannelError(String),

    #[error("SSH protocol error: {0}")]
    ProtocolError(String),

    #[error("Key error: {0}")]
    KeyError(String),

    #[error("Host key rejected: {0}")]
    HostKeyRejected(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error("Disconnected")]
    Disconnected,

    #[error("SSH Agent not available: {0}")]
    AgentNotAvailable(String),

    #[error("SSH Agent error: {0}")]
    AgentError(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl SshError {
    /// The authentication failure level, if this is an authentication failure
    pub fn auth_level(&self) -> Option<AuthFailureLevel> {
        match self {
            SshError::AuthenticationFailed { level, .. } => Some(*level),
            _ => None,
        }
    }
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::ProtocolError(err.to_string())
    }
}

impl From<russh::keys::Error> for SshError {
    fn from(err: russh::keys::Error) -> Self {
        SshError::KeyError(err.to_string())
    }
}

impl From<std::io::Error> for SshError {
    fn from(err: std::io::Error) -> Self {
        SshError::Io(err.to_string())
    }
}

impl Serialize for SshError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
