//! Directory listings served by the file server.

use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Join a client-supplied relative path onto `root`, resolving `.` and `..`
/// lexically. `None` if the path climbs above `root` or is absolute.
pub fn join_contained(root: &Path, requested: &str) -> Option<PathBuf> {
    let mut parts = Vec::new();

    for component in Path::new(requested.trim_start_matches('/')).components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    let mut full = root.to_path_buf();
    full.extend(parts);
    Some(full)
}

/// Entry kind in a directory listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirListing {
    pub path: String,
    pub items: Vec<DirEntry>,
    pub count: usize,
}

impl DirListing {
    pub fn new(path: impl Into<String>, mut items: Vec<DirEntry>) -> Self {
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Self {
            path: path.into(),
            count: items.len(),
            items,
        }
    }

    /// Names of plain files, in listing order.
    pub fn file_names(&self) -> impl Iterator<Item = &str> {
        self.items
            .iter()
            .filter(|e| e.kind == EntryKind::File)
            .map(|e| e.name.as_str())
    }
}
