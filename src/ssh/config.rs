//! SSH Configuration

use serde::{Deserialize, Serialize};

/// SSH connection configuration
///
/// One value is kept as a template by the connector; `host` and `username`
/// are filled in per dial with [`SshConfig::for_host`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshConfig {
    /// Remote host address (tailnet machine name or IP)
    #[serde(default)]
    pub host: String,

    /// SSH port (default: 22)
    #[serde(default = "default_port")]
    pub port: u16,

    /// Username for authentication
    #[serde(default)]
    pub username: String,

    /// Authentication methods, tried in order until one succeeds
    #[serde(default = "default_auth_methods")]
    pub auth_methods: Vec<AuthMethod>,

    /// Keepalive interval in seconds
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,

    /// Strict host key checking (default: false)
    /// - true: reject connections to hosts missing from known_hosts
    /// - false: learn unknown hosts, still reject changed keys
    #[serde(default)]
    pub strict_host_key_checking: bool,
}

/// Authentication methods supported
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuthMethod {
    /// `none` authentication; Tailscale SSH authorizes by tailnet identity
    None,

    /// SSH agent authentication
    Agent,

    /// SSH key authentication
    Key {
        /// Path to private key file
        key_path: String,
        /// Optional passphrase for encrypted keys
        passphrase: Option<String>,
    },
}

impl AuthMethod {
    pub fn key(key_path: impl Into<String>, passphrase: Option<String>) -> Self {
        Self::Key {
            key_path: key_path.into(),
            passphrase,
        }
    }
}

impl SshConfig {
    /// Copy of this template addressed to `username@host`
    pub fn for_host(&self, host: &str, username: &str) -> Self {
        Self {
            host: host.to_string(),
            username: username.to_string(),
            ..self.clone()
        }
    }
}

fn default_port() -> u16 {
    22
}

fn default_keepalive() -> u64 {
    30
}

fn default_auth_methods() -> Vec<AuthMethod> {
    vec![AuthMethod::None, AuthMethod::Agent]
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: default_port(),
            username: String::new(),
            auth_methods: default_auth_methods(),
            keepalive_secs: default_keepalive(),
            strict_host_key_checking: false,
        }
    }
}
