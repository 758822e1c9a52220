use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::fs;
use url::Url;

use crate::error::ConfigError;
use crate::logging::LOG_FILE_STEM;
use crate::window::PopupFeatures;

const DEFAULT_RPC_TIMEOUT_MS: u64 = 2_000;
const DEFAULT_AUTH_TIMEOUT_MS: u64 = 10 * 60 * 1_000;
const DEFAULT_CLOSE_POLL_INTERVAL_MS: u64 = 300;
const DEFAULT_LMS_NAME: &str = "Canvas";
const DEFAULT_MISSING_FILES_HELP_LINK: &str =
    "https://community.canvaslms.com/t5/Instructor-Guide/How-do-I-upload-a-file-to-a-course/ta-p/618";

/// Where the listing endpoint lives and where to send the user to authorize it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListFilesApi {
    pub path: String,
    pub auth_url: Url,
}

impl ListFilesApi {
    pub fn new(path: impl Into<String>, auth_url: &str) -> Result<Self, ConfigError> {
        Ok(Self {
            path: path.into(),
            auth_url: Url::parse(auth_url)?,
        })
    }
}

/// Tunables of a picker session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PickerConfig {
    pub rpc_timeout_ms: u64,
    pub auth_timeout_ms: u64,
    pub close_poll_interval_ms: u64,
    pub popup_width: u32,
    pub popup_height: u32,
    pub lms_name: String,
    pub missing_files_help_link: String,
    pub log_file_stem: String,
}

impl Default for PickerConfig {
    fn default() -> Self {
        let popup = PopupFeatures::default();
        Self {
            rpc_timeout_ms: DEFAULT_RPC_TIMEOUT_MS,
            auth_timeout_ms: DEFAULT_AUTH_TIMEOUT_MS,
            close_poll_interval_ms: DEFAULT_CLOSE_POLL_INTERVAL_MS,
            popup_width: popup.width,
            popup_height: popup.height,
            lms_name: DEFAULT_LMS_NAME.to_string(),
            missing_files_help_link: DEFAULT_MISSING_FILES_HELP_LINK.to_string(),
            log_file_stem: LOG_FILE_STEM.to_string(),
        }
    }
}

impl PickerConfig {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }

    pub fn close_poll_interval(&self) -> Duration {
        // A zero interval would spin.
        Duration::from_millis(self.close_poll_interval_ms.max(1))
    }

    pub fn log_file_path(&self) -> Option<PathBuf> {
        crate::logging::log_file_path(&self.log_file_stem)
    }

    pub fn popup_features(&self) -> PopupFeatures {
        PopupFeatures {
            width: self.popup_width,
            height: self.popup_height,
        }
    }

    /// Load settings from `path`. A missing file yields the defaults.
    pub async fn load_from(path: &Path) -> Result<Self, ConfigError> {
        match fs::read(path).await {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Load settings from the default location, falling back to defaults when
    /// there is no home directory.
    pub async fn load() -> Result<Self, ConfigError> {
        match default_settings_path() {
            Some(path) => Self::load_from(&path).await,
            None => Ok(Self::default()),
        }
    }
}

/// `~/.config/lms-file-picker/settings.json`
pub fn default_settings_path() -> Option<PathBuf> {
    let mut path = dirs::home_dir()?;
    path.push(".config");
    path.push("lms-file-picker");
    path.push("settings.json");
    Some(path)
}
