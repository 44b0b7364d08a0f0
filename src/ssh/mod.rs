//! SSH module - connections to tailnet hosts
//!
//! # Features
//! - `none`, agent and key authentication (Tailscale SSH accepts `none`)
//! - Pre-auth banner capture to tell a wrong username from bad credentials
//! - Host key verification via ~/.ssh/known_hosts
//! - Single-flight connection pool keyed by `user@host` (see `connection_pool`)
//! - One interactive username retry on authentication failure (see `manager`)

mod agent;
mod client;
mod config;
pub mod connection;
pub mod connection_pool;
mod error;
mod handle_owner;
pub mod manager;

pub use agent::{is_agent_available, SshAgentClient};
pub use client::{ClientHandler, SshClient};
pub use config::{AuthMethod, SshConfig};
pub use connection::{SshConnection, SshConnector};
pub use connection_pool::{
    pool_key, ConnectionPool, ConnectionPoolStats, Connector, PoolEntryInfo, PooledConnection,
    SlotState,
};
pub use error::{AuthFailureLevel, SshError};
pub use handle_owner::{spawn_handle_owner_task, HandleCommand, HandleController};
pub use manager::{ConnectionManager, HostConnections, MAX_AUTH_RETRIES};
