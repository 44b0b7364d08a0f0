//! Username prompt collaborator

use async_trait::async_trait;

use crate::ssh::AuthFailureLevel;

/// Asks the user which account to use on a host after authentication failed.
#[async_trait]
pub trait UsernamePrompt: Send + Sync {
    /// `None` or a blank answer means the user declined
    async fn prompt_for_username(&self, host: &str) -> Option<String>;

    /// Called once per failure, before prompting
    async fn notify_auth_failure(&self, _host: &str, _username: &str, _level: AuthFailureLevel) {}
}

/// Always declines. For headless use.
#[derive(Debug, Default, Clone, Copy)]
pub struct DeclinePrompt;

#[async_trait]
impl UsernamePrompt for DeclinePrompt {
    async fn prompt_for_username(&self, _host: &str) -> Option<String> {
        None
    }
}
