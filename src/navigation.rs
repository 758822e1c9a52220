use serde::{Deserialize, Serialize};

use crate::listing::{ItemKind, LmsItem};

pub const ROOT_ENTRY_ID: &str = "__root__";
pub const ROOT_DISPLAY_NAME: &str = "Files";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathEntry {
    pub id: String,
    pub display_name: String,
    /// Listing path for this folder; `None` means the default listing path.
    pub fetch_path: Option<String>,
}

impl PathEntry {
    pub fn root() -> Self {
        Self {
            id: ROOT_ENTRY_ID.to_string(),
            display_name: ROOT_DISPLAY_NAME.to_string(),
            fetch_path: None,
        }
    }

    pub fn new(
        id: impl Into<String>,
        display_name: impl Into<String>,
        fetch_path: Option<String>,
    ) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            fetch_path,
        }
    }

    /// Breadcrumb for a folder item. `None` for files.
    pub fn from_folder(item: &LmsItem) -> Option<Self> {
        if item.kind != ItemKind::Folder {
            return None;
        }
        Some(Self {
            id: item.id.to_string(),
            display_name: item.display_name.clone(),
            fetch_path: item.contents.as_ref().map(|contents| contents.path.clone()),
        })
    }

    pub fn is_root(&self) -> bool {
        self.id == ROOT_ENTRY_ID
    }
}

/// Ordered path from the root to the current folder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationStack {
    entries: Vec<PathEntry>,
}

impl Default for NavigationStack {
    fn default() -> Self {
        Self::new()
    }
}

impl NavigationStack {
    pub fn new() -> Self {
        Self {
            entries: vec![PathEntry::root()],
        }
    }

    /// Navigate to `entry`.
    ///
    /// Revisiting a folder already on the trail cuts the trail back to it
    /// instead of appending a second copy.
    pub fn push(&mut self, entry: PathEntry) {
        match self.entries.iter().position(|existing| existing.id == entry.id) {
            Some(index) => {
                self.entries.truncate(index + 1);
                self.entries[index] = entry;
            }
            None => self.entries.push(entry),
        }
    }

    pub fn reset(&mut self) {
        self.entries.truncate(1);
        self.entries[0] = PathEntry::root();
    }

    pub fn current(&self) -> &PathEntry {
        // The root entry is never removed.
        &self.entries[self.entries.len() - 1]
    }

    pub fn current_fetch_path(&self, default_path: &str) -> String {
        self.current()
            .fetch_path
            .clone()
            .unwrap_or_else(|| default_path.to_string())
    }

    pub fn is_root(&self) -> bool {
        self.entries.len() == 1
    }

    pub fn entries(&self) -> &[PathEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
