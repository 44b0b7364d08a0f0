//! Virtual URI codec
//!
//! ```text
//! ts://tails-scales/foo/home/amalie
//! |> tailnet:       tails-scales
//! |> host:          foo
//! |> resource_path: /home/amalie
//! ```
//!
//! A first path segment of `~` after the host addresses the remote user's
//! home directory. It parses to the connection-relative marker `.` and is
//! expanded with [`TsUri::expand_home`] once the real home is known.

use std::fmt;
use std::str::FromStr;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, CONTROLS};

use crate::error::FsError;

pub const SCHEME: &str = "ts";

/// Home-directory segment as it appears in a URI
pub const HOME_SEGMENT: &str = "~";

/// Connection-relative marker the home segment parses to
pub const HOME_MARKER: &str = ".";

/// Characters escaped inside a single path segment
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TsUri {
    pub tailnet: String,
    pub host: String,
    pub resource_path: String,
}

impl TsUri {
    pub fn new(
        tailnet: impl Into<String>,
        host: impl Into<String>,
        resource_path: impl Into<String>,
    ) -> Self {
        Self {
            tailnet: tailnet.into(),
            host: host.into(),
            resource_path: resource_path.into(),
        }
    }

    /// True when the path is relative to the remote home directory
    pub fn is_home_relative(&self) -> bool {
        self.resource_path == HOME_MARKER || self.resource_path.starts_with("./")
    }

    /// Replace the home marker with the real home directory.
    ///
    /// Absolute paths are returned unchanged.
    pub fn expand_home(&self, home: &str) -> TsUri {
        let resource_path = if self.resource_path == HOME_MARKER {
            home.to_string()
        } else if let Some(rest) = self.resource_path.strip_prefix("./") {
            format!("{}/{}", home.trim_end_matches('/'), rest)
        } else {
            self.resource_path.clone()
        };

        TsUri {
            tailnet: self.tailnet.clone(),
            host: self.host.clone(),
            resource_path,
        }
    }

    /// Same tailnet and host
    pub fn same_host(&self, other: &TsUri) -> bool {
        self.tailnet == other.tailnet && self.host == other.host
    }
}

/// Parse a `ts://` URI into its addressing triple.
pub fn parse(uri: &str) -> Result<TsUri, FsError> {
    let (scheme, rest) = uri
        .split_once("://")
        .ok_or_else(|| FsError::InvalidUri(uri.to_string()))?;

    if scheme != SCHEME {
        return Err(FsError::UnsupportedScheme(scheme.to_string()));
    }

    // Query and fragment are not part of the address
    let rest = rest.split(['?', '#']).next().unwrap_or_default();

    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };

    // Remove leading slash
    let host_path = path.strip_prefix('/').unwrap_or(path);

    let mut segments = host_path.split('/');
    let host = decode(segments.next().unwrap_or_default(), uri)?;
    if host.is_empty() {
        return Err(FsError::InvalidUri(uri.to_string()));
    }

    let decoded = segments
        .filter(|segment| !segment.is_empty())
        .map(|segment| decode(segment, uri))
        .collect::<Result<Vec<_>, _>>()?;

    let resource_path = match decoded.split_first() {
        Some((first, rest)) if first == HOME_SEGMENT => {
            if rest.is_empty() {
                HOME_MARKER.to_string()
            } else {
                format!("{}/{}", HOME_MARKER, escape_spaces(&rest.join("/")))
            }
        }
        _ => format!("/{}", escape_spaces(&decoded.join("/"))),
    };

    Ok(TsUri {
        tailnet: decode(authority, uri)?,
        host,
        resource_path,
    })
}

/// Render the addressing triple as a `ts://` URI.
///
/// The home marker (`.`, `./rest`, or a literal `~`) is written back as the
/// `~` segment.
pub fn build(uri: &TsUri) -> String {
    let mut out = format!(
        "{}://{}/{}",
        SCHEME,
        utf8_percent_encode(&uri.tailnet, SEGMENT),
        utf8_percent_encode(&uri.host, SEGMENT)
    );

    let path = uri.resource_path.as_str();
    let rest = if path == HOME_MARKER || path == HOME_SEGMENT {
        out.push('/');
        out.push_str(HOME_SEGMENT);
        ""
    } else if let Some(rest) = path.strip_prefix("./").or_else(|| path.strip_prefix("~/")) {
        out.push('/');
        out.push_str(HOME_SEGMENT);
        rest
    } else {
        path
    };

    for segment in rest.split('/').filter(|s| !s.is_empty()) {
        out.push('/');
        out.push_str(&utf8_percent_encode(&unescape_spaces(segment), SEGMENT).to_string());
    }

    out
}

/// Backslash-escape spaces so the path survives a remote shell.
pub fn escape_spaces(path: &str) -> String {
    path.replace(' ', "\\ ")
}

/// Inverse of [`escape_spaces`]
pub fn unescape_spaces(path: &str) -> String {
    path.replace("\\ ", " ")
}

fn decode(segment: &str, uri: &str) -> Result<String, FsError> {
    percent_decode_str(segment)
        .decode_utf8()
        .map(|s| s.into_owned())
        .map_err(|_| FsError::InvalidUri(uri.to_string()))
}

impl fmt::Display for TsUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&build(self))
    }
}

impl FromStr for TsUri {
    type Err = FsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}
