//! tsfs - remote virtual filesystem for hosts on a tailnet
//!
//! Files are addressed as `ts://{tailnet}/{host}/{path}` and served over
//! pooled SSH connections (SFTP) or, optionally, one `ssh` subprocess per
//! operation.

pub mod error;
pub mod fs;
pub mod prompt;
pub mod provider;
pub mod settings;
pub mod ssh;
pub mod uri;

#[cfg(test)]
mod testing;

pub use error::{translate, translate_error, ErrorKind, FsError, Notice};
pub use fs::{DirEntry, FileOperations, FileStat, FileType};
pub use prompt::{DeclinePrompt, UsernamePrompt};
pub use provider::RemoteFileSystem;
pub use settings::{Backend, HostSettings, JsonSettingsStore, MemorySettings};
pub use ssh::{ConnectionManager, HostConnections, SshConfig};
pub use uri::TsUri;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a `tracing` fmt subscriber filtered by `RUST_LOG` (default `info`).
///
/// Does nothing if a global subscriber is already set.
pub fn init_logging() {
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
