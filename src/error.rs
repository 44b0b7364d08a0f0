//! Filesystem error vocabulary
//!
//! Every operation exposed by the crate fails with [`FsError`]. Transport
//! errors (`russh`, `russh-sftp`, subprocess stderr, local I/O) are converted
//! into it at the boundary, and whatever still arrives as [`FsError::Unknown`]
//! is classified by [`translate`] on the lowercased message.

use russh_sftp::client::error::Error as SftpClientError;
use russh_sftp::protocol::StatusCode;
use thiserror::Error;
use tracing::error;

use crate::ssh::SshError;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FsError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Permission denied: {0}")]
    NoPermissions(String),

    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("Is a directory: {0}")]
    FileIsADirectory(String),

    #[error("Not a directory: {0}")]
    FileNotADirectory(String),

    #[error("Directory not empty: {0}")]
    DirectoryNotEmpty(String),

    #[error("Remote host unavailable: {0}")]
    Unavailable(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("Username is required to connect to {0}")]
    UsernameRequired(String),

    #[error("Cannot rename across hosts: {from} -> {to}")]
    CrossHost { from: String, to: String },

    #[error("Unsupported scheme: {0}")]
    UnsupportedScheme(String),

    #[error("Invalid URI: {0}")]
    InvalidUri(String),

    #[error("Too many levels of symbolic links: {0}")]
    TooManySymlinks(String),

    #[error("{0}")]
    Unknown(String),
}

/// Discriminant of [`FsError`], for callers that only care about the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    FileNotFound,
    NoPermissions,
    FileExists,
    FileIsADirectory,
    FileNotADirectory,
    DirectoryNotEmpty,
    Unavailable,
    ConnectionTimeout,
    UsernameRequired,
    CrossHost,
    UnsupportedScheme,
    InvalidUri,
    TooManySymlinks,
    Unknown,
}

/// How a front end should surface an error to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Short message naming the problem (not found, permissions, ...)
    Direct,
    /// Suggest checking network / VPN state
    CheckNetwork,
    /// The user cancelled the flow; show nothing or a soft notice
    Silent,
    /// Anything else
    Generic,
}

impl FsError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FsError::FileNotFound(_) => ErrorKind::FileNotFound,
            FsError::NoPermissions(_) => ErrorKind::NoPermissions,
            FsError::FileExists(_) => ErrorKind::FileExists,
            FsError::FileIsADirectory(_) => ErrorKind::FileIsADirectory,
            FsError::FileNotADirectory(_) => ErrorKind::FileNotADirectory,
            FsError::DirectoryNotEmpty(_) => ErrorKind::DirectoryNotEmpty,
            FsError::Unavailable(_) => ErrorKind::Unavailable,
            FsError::ConnectionTimeout(_) => ErrorKind::ConnectionTimeout,
            FsError::UsernameRequired(_) => ErrorKind::UsernameRequired,
            FsError::CrossHost { .. } => ErrorKind::CrossHost,
            FsError::UnsupportedScheme(_) => ErrorKind::UnsupportedScheme,
            FsError::InvalidUri(_) => ErrorKind::InvalidUri,
            FsError::TooManySymlinks(_) => ErrorKind::TooManySymlinks,
            FsError::Unknown(_) => ErrorKind::Unknown,
        }
    }

    pub fn notice(&self) -> Notice {
        match self.kind() {
            ErrorKind::FileNotFound
            | ErrorKind::NoPermissions
            | ErrorKind::FileExists
            | ErrorKind::DirectoryNotEmpty => Notice::Direct,
            ErrorKind::Unavailable | ErrorKind::ConnectionTimeout => Notice::CheckNetwork,
            ErrorKind::UsernameRequired => Notice::Silent,
            _ => Notice::Generic,
        }
    }

    /// Build a typed error of the given kind carrying `detail`.
    ///
    /// `CrossHost` has two endpoints; `detail` fills both.
    pub fn of_kind(kind: ErrorKind, detail: impl Into<String>) -> Self {
        let detail = detail.into();
        match kind {
            ErrorKind::FileNotFound => FsError::FileNotFound(detail),
            ErrorKind::NoPermissions => FsError::NoPermissions(detail),
            ErrorKind::FileExists => FsError::FileExists(detail),
            ErrorKind::FileIsADirectory => FsError::FileIsADirectory(detail),
            ErrorKind::FileNotADirectory => FsError::FileNotADirectory(detail),
            ErrorKind::DirectoryNotEmpty => FsError::DirectoryNotEmpty(detail),
            ErrorKind::Unavailable => FsError::Unavailable(detail),
            ErrorKind::ConnectionTimeout => FsError::ConnectionTimeout(detail),
            ErrorKind::UsernameRequired => FsError::UsernameRequired(detail),
            ErrorKind::CrossHost => FsError::CrossHost {
                from: detail.clone(),
                to: detail,
            },
            ErrorKind::UnsupportedScheme => FsError::UnsupportedScheme(detail),
            ErrorKind::InvalidUri => FsError::InvalidUri(detail),
            ErrorKind::TooManySymlinks => FsError::TooManySymlinks(detail),
            ErrorKind::Unknown => FsError::Unknown(detail),
        }
    }
}

/// Classify a raw transport message.
///
/// Matching is done on the lowercased message, so casing and surrounding
/// text do not matter. Returns `None` when nothing matches.
pub fn translate(message: &str) -> Option<ErrorKind> {
    let message = message.to_lowercase();

    if message.contains("no such file") {
        Some(ErrorKind::FileNotFound)
    } else if message.contains("permission denied") {
        Some(ErrorKind::NoPermissions)
    } else if message.contains("file already exists") {
        Some(ErrorKind::FileExists)
    } else if message.contains("eisdir") || message.contains("is a directory") {
        Some(ErrorKind::FileIsADirectory)
    } else if message.contains("enotdir") || message.contains("not a directory") {
        Some(ErrorKind::FileNotADirectory)
    } else if message.contains("directory not empty") {
        Some(ErrorKind::DirectoryNotEmpty)
    } else if message.contains("no connection")
        || message.contains("connection lost")
        || (message.contains("unable to establish") && message.contains("connection"))
    {
        Some(ErrorKind::Unavailable)
    } else {
        None
    }
}

/// Run an operation's error through the translation table.
///
/// Typed errors pass through unchanged. `Unknown` errors are re-classified by
/// their message; anything still unrecognized is logged at error level and
/// returned as is.
pub fn translate_error(operation: &str, target: &str, err: FsError) -> FsError {
    match err {
        FsError::Unknown(message) => match translate(&message) {
            Some(kind) => FsError::of_kind(kind, message),
            None => {
                error!("{}: {}: {}", operation, target, message);
                FsError::Unknown(message)
            }
        },
        typed => typed,
    }
}

impl From<SftpClientError> for FsError {
    fn from(err: SftpClientError) -> Self {
        match err {
            SftpClientError::Status(status) => {
                let message = status.error_message;
                match status.status_code {
                    StatusCode::NoSuchFile => FsError::FileNotFound(message),
                    StatusCode::PermissionDenied => FsError::NoPermissions(message),
                    StatusCode::NoConnection | StatusCode::ConnectionLost => {
                        FsError::Unavailable(message)
                    }
                    _ => FsError::Unknown(message),
                }
            }
            SftpClientError::Timeout => FsError::Unavailable("connection lost (timeout)".to_string()),
            other => FsError::Unknown(other.to_string()),
        }
    }
}

impl From<SshError> for FsError {
    fn from(err: SshError) -> Self {
        match err {
            SshError::Timeout(msg) => FsError::ConnectionTimeout(msg),
            SshError::Disconnected => FsError::Unavailable("connection lost".to_string()),
            SshError::ConnectionFailed(msg) | SshError::ChannelError(msg) => {
                FsError::Unavailable(format!("unable to establish connection: {}", msg))
            }
            SshError::AuthenticationFailed { .. } => FsError::NoPermissions(err.to_string()),
            other => FsError::Unknown(other.to_string()),
        }
    }
}

impl From<std::io::Error> for FsError {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind as Io;

        match err.kind() {
            Io::NotFound => FsError::FileNotFound(err.to_string()),
            Io::PermissionDenied => FsError::NoPermissions(err.to_string()),
            Io::AlreadyExists => FsError::FileExists(err.to_string()),
            _ => FsError::Unknown(err.to_string()),
        }
    }
}

// Front ends receive errors as plain strings
impl serde::Serialize for FsError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}
