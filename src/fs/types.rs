//! Filesystem data types

use std::cmp::Ordering;

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// File type bit set.
    ///
    /// A symlink is reported as `SYMBOLIC_LINK` combined with the kind of
    /// whatever it resolves to, so a link to a directory is
    /// `SYMBOLIC_LINK | DIRECTORY`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct FileType: u32 {
        const FILE = 1;
        const DIRECTORY = 2;
        const SYMBOLIC_LINK = 64;
    }
}

impl FileType {
    pub const UNKNOWN: FileType = FileType::empty();

    pub fn is_dir(self) -> bool {
        self.contains(FileType::DIRECTORY)
    }

    pub fn is_file(self) -> bool {
        self.contains(FileType::FILE)
    }

    pub fn is_symlink(self) -> bool {
        self.contains(FileType::SYMBOLIC_LINK)
    }
}

/// Stat result. Times are milliseconds since the epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileStat {
    pub file_type: FileType,
    pub size: u64,
    pub ctime: u64,
    pub mtime: u64,
}

/// Directory listing entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirEntry {
    pub name: String,
    pub file_type: FileType,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, file_type: FileType) -> Self {
        Self {
            name: name.into(),
            file_type,
        }
    }
}

/// Remote timestamps arrive in seconds
pub fn secs_to_millis(secs: u64) -> u64 {
    secs.saturating_mul(1000)
}

/// Directories first, then by name ignoring case.
///
/// Names that only differ in case put the lowercase spelling first.
pub fn compare_entries(a: &DirEntry, b: &DirEntry) -> Ordering {
    b.file_type
        .is_dir()
        .cmp(&a.file_type.is_dir())
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| b.name.cmp(&a.name))
}

pub fn sort_entries(entries: &mut [DirEntry]) {
    entries.sort_by(compare_entries);
}

/// `.` and `..` never appear in listings
pub fn is_dot_entry(name: &str) -> bool {
    name == "." || name == ".."
}
