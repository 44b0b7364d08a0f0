//! Host settings
//!
//! Usernames are resolved per host with this priority:
//! 1. per-host override (`hosts.{host}.user`)
//! 2. global default (`defaultUser`)
//! 3. the local OS user
//!
//! Settings file location: `~/.tsfs/config.json` (`%APPDATA%\tsfs` on Windows).

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, warn};

pub const SETTINGS_VERSION: u32 = 1;

pub const DEFAULT_CONNECTION_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Failed to determine config directory")]
    NoConfigDir,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Settings version {found} is newer than supported {supported}")]
    VersionTooNew { found: u32, supported: u32 },
}

/// Which filesystem backend serves remote operations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Pooled SSH connections with an SFTP session each
    #[default]
    Sftp,
    /// One `ssh` subprocess per operation
    Command,
}

/// Settings the connection layer reads and writes
#[async_trait]
pub trait HostSettings: Send + Sync {
    fn username_override(&self, host: &str) -> Option<String>;

    /// Remember `username` for `host`
    async fn set_username_override(&self, host: &str, username: &str) -> Result<(), StorageError>;

    fn default_username(&self) -> Option<String>;

    fn connection_timeout(&self) -> Duration;
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Username to connect to `host` with
pub fn resolve_username(settings: &dyn HostSettings, host: &str) -> String {
    non_empty(settings.username_override(host))
        .or_else(|| non_empty(settings.default_username()))
        .unwrap_or_else(whoami::username)
}

/// Settings kept in memory only
pub struct MemorySettings {
    overrides: RwLock<HashMap<String, String>>,
    default_user: RwLock<Option<String>>,
    timeout: Duration,
}

impl MemorySettings {
    pub fn new() -> Self {
        Self {
            overrides: RwLock::new(HashMap::new()),
            default_user: RwLock::new(None),
            timeout: DEFAULT_CONNECTION_TIMEOUT,
        }
    }

    pub fn with_default_user(self, user: impl Into<String>) -> Self {
        *self.default_user.write() = Some(user.into());
        self
    }

    pub fn with_override(self, host: impl Into<String>, user: impl Into<String>) -> Self {
        self.overrides.write().insert(host.into(), user.into());
        self
    }
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HostSettings for MemorySettings {
    fn username_override(&self, host: &str) -> Option<String> {
        self.overrides.read().get(host).cloned()
    }

    async fn set_username_override(&self, host: &str, username: &str) -> Result<(), StorageError> {
        self.overrides
            .write()
            .insert(host.to_string(), username.to_string());
        Ok(())
    }

    fn default_username(&self) -> Option<String> {
        self.default_user.read().clone()
    }

    fn connection_timeout(&self) -> Duration {
        self.timeout
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// On-disk settings document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsFile {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default)]
    pub hosts: BTreeMap<String, HostEntry>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_user: Option<String>,

    #[serde(default = "default_timeout_ms")]
    pub connection_timeout_ms: u64,

    #[serde(default)]
    pub backend: Backend,

    /// Log per-operation latency
    #[serde(default)]
    pub log_timing: bool,
}

fn default_version() -> u32 {
    SETTINGS_VERSION
}

fn default_timeout_ms() -> u64 {
    DEFAULT_CONNECTION_TIMEOUT.as_millis() as u64
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            version: SETTINGS_VERSION,
            hosts: BTreeMap::new(),
            default_user: None,
            connection_timeout_ms: default_timeout_ms(),
            backend: Backend::default(),
            log_timing: false,
        }
    }
}

/// Settings directory: `~/.tsfs`, or `%APPDATA%\tsfs` on Windows
pub fn config_dir() -> Result<PathBuf, StorageError> {
    #[cfg(windows)]
    {
        if let Some(app_data) = dirs::config_dir() {
            return Ok(app_data.join("tsfs"));
        }
        dirs::home_dir()
            .map(|home| home.join(".tsfs"))
            .ok_or(StorageError::NoConfigDir)
    }

    #[cfg(not(windows))]
    {
        dirs::home_dir()
            .map(|home| home.join(".tsfs"))
            .ok_or(StorageError::NoConfigDir)
    }
}

pub fn settings_file() -> Result<PathBuf, StorageError> {
    Ok(config_dir()?.join("config.json"))
}

/// Settings backed by a JSON file. Every change is written through.
pub struct JsonSettingsStore {
    path: PathBuf,
    state: RwLock<SettingsFile>,
}

impl JsonSettingsStore {
    /// Open the store at the default location
    pub async fn open_default() -> Result<Self, StorageError> {
        Self::open(settings_file()?).await
    }

    /// Open the store at `path`. A missing file yields defaults; a corrupt
    /// one is backed up and replaced by defaults.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        let state = load(&path).await?;
        Ok(Self {
            path,
            state: RwLock::new(state),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn snapshot(&self) -> SettingsFile {
        self.state.read().clone()
    }

    pub fn backend(&self) -> Backend {
        self.state.read().backend
    }

    pub fn log_timing(&self) -> bool {
        self.state.read().log_timing
    }

    /// Apply `change` and write the result to disk
    pub async fn update(&self, change: impl FnOnce(&mut SettingsFile)) -> Result<(), StorageError> {
        let snapshot = {
            let mut state = self.state.write();
            change(&mut state);
            state.clone()
        };
        save(&self.path, &snapshot).await
    }
}

#[async_trait]
impl HostSettings for JsonSettingsStore {
    fn username_override(&self, host: &str) -> Option<String> {
        self.state.read().hosts.get(host).and_then(|h| h.user.clone())
    }

    async fn set_username_override(&self, host: &str, username: &str) -> Result<(), StorageError> {
        debug!("Saving username override for {}", host);
        self.update(|settings| {
            settings.hosts.entry(host.to_string()).or_default().user = Some(username.to_string());
        })
        .await
    }

    fn default_username(&self) -> Option<String> {
        self.state.read().default_user.clone()
    }

    fn connection_timeout(&self) -> Duration {
        Duration::from_millis(self.state.read().connection_timeout_ms)
    }
}

async fn load(path: &Path) -> Result<SettingsFile, StorageError> {
    match fs::read_to_string(path).await {
        Ok(contents) => match serde_json::from_str::<SettingsFile>(&contents) {
            Ok(settings) => {
                if settings.version > SETTINGS_VERSION {
                    return Err(StorageError::VersionTooNew {
                        found: settings.version,
                        supported: SETTINGS_VERSION,
                    });
                }
                Ok(settings)
            }
            Err(e) => {
                warn!("Settings file corrupted: {}", e);
                match backup(path).await {
                    Ok(backup_path) => warn!(
                        "Corrupted settings backed up to {:?}, using defaults",
                        backup_path
                    ),
                    Err(backup_err) => error!("Failed to backup corrupted settings: {}", backup_err),
                }
                Ok(SettingsFile::default())
            }
        },
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(SettingsFile::default()),
        Err(e) => Err(StorageError::Io(e)),
    }
}

/// Write to a temp file first, then rename over the target
async fn save(path: &Path, settings: &SettingsFile) -> Result<(), StorageError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let temp_path = path.with_extension("json.tmp");
    let json = serde_json::to_string_pretty(settings)?;

    let mut file = fs::File::create(&temp_path).await?;
    file.write_all(json.as_bytes()).await?;
    file.sync_all().await?;

    fs::rename(&temp_path, path).await?;
    Ok(())
}

async fn backup(path: &Path) -> Result<PathBuf, StorageError> {
    let backup_path = path.with_extension(format!(
        "json.backup.{}",
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    ));
    fs::copy(path, &backup_path).await?;
    Ok(backup_path)
}
