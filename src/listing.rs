use chrono::{DateTime, FixedOffset};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use crate::error::ListingError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    #[default]
    File,
    Folder,
}

/// LMS identifiers come back as numbers from some APIs and strings from others.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    Number(i64),
    Text(String),
}

impl Default for ItemId {
    fn default() -> Self {
        ItemId::Text(String::new())
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemId::Number(value) => write!(f, "{value}"),
            ItemId::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for ItemId {
    fn from(value: i64) -> Self {
        ItemId::Number(value)
    }
}

impl From<&str> for ItemId {
    fn from(value: &str) -> Self {
        ItemId::Text(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderContents {
    pub path: String,
}

/// One entry of a listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LmsItem {
    #[serde(rename = "type", default)]
    pub kind: ItemKind,
    #[serde(default)]
    pub id: ItemId,
    #[serde(default)]
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contents: Option<FolderContents>,
    /// LMS-specific fields, kept so the chosen file round-trips intact.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl LmsItem {
    pub fn file(id: impl Into<ItemId>, display_name: impl Into<String>) -> Self {
        Self {
            kind: ItemKind::File,
            id: id.into(),
            display_name: display_name.into(),
            updated_at: None,
            contents: None,
            extra: Map::new(),
        }
    }

    pub fn folder(
        id: impl Into<ItemId>,
        display_name: impl Into<String>,
        path: impl Into<String>,
    ) -> Self {
        Self {
            kind: ItemKind::Folder,
            id: id.into(),
            display_name: display_name.into(),
            updated_at: None,
            contents: Some(FolderContents { path: path.into() }),
            extra: Map::new(),
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == ItemKind::Folder
    }

    pub fn last_modified(&self) -> Option<DateTime<FixedOffset>> {
        self.updated_at
            .as_deref()
            .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
    }
}

/// Arguments of one listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRequest {
    pub auth_token: String,
    pub path: String,
    pub params: Vec<(String, String)>,
}

impl ListingRequest {
    pub fn new(auth_token: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            auth_token: auth_token.into(),
            path: path.into(),
            params: Vec::new(),
        }
    }
}

/// The backend endpoint that lists files in the LMS.
pub trait ListingApi: Send + Sync {
    fn list_files<'a>(
        &'a self,
        request: &'a ListingRequest,
    ) -> BoxFuture<'a, Result<Vec<LmsItem>, ListingError>>;
}
