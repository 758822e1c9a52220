use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use url::Url;

/// Something a cross-window message can be posted to.
pub trait MessageTarget: Send + Sync {
    /// Post `message`, delivering it only if the target's origin is `target_origin`.
    fn post_message(&self, message: Value, target_origin: &str) -> Result<(), String>;
}

/// A popup window opened by the picker.
pub trait PopupWindow: MessageTarget {
    fn focus(&self);

    /// Close the window. Closing an already closed window does nothing.
    fn close(&self);

    /// True once the window is gone, whether we closed it or the user did.
    fn is_closed(&self) -> bool;
}

/// Opens popup windows.
pub trait WindowOpener: Send + Sync {
    fn open(
        &self,
        url: &Url,
        name: &str,
        features: &PopupFeatures,
    ) -> Result<Arc<dyn PopupWindow>, String>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupFeatures {
    pub width: u32,
    pub height: u32,
}

impl Default for PopupFeatures {
    fn default() -> Self {
        Self {
            width: 400,
            height: 550,
        }
    }
}

impl PopupFeatures {
    /// Top-left corner that centers the popup on a screen of the given size.
    pub fn centered_position(&self, screen_width: u32, screen_height: u32) -> (u32, u32) {
        (
            screen_width.saturating_sub(self.width) / 2,
            screen_height.saturating_sub(self.height) / 2,
        )
    }

    /// `window.open` style feature string.
    pub fn to_feature_string(&self, screen_width: u32, screen_height: u32) -> String {
        let (left, top) = self.centered_position(screen_width, screen_height);
        format!(
            "left={left},top={top},width={},height={}",
            self.width, self.height
        )
    }
}

/// Origin (`scheme://host[:port]`) of a URL, as compared against message origins.
pub fn origin_of(url: &Url) -> String {
    url.origin().ascii_serialization()
}
