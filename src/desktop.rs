use anyhow::{Context, Result};
use log::{debug, info, warn};
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tauri::plugin::TauriPlugin;
use tauri::{
    AppHandle, Emitter, EventTarget, Listener, Runtime, WebviewUrl, WebviewWindow,
    WebviewWindowBuilder, WindowEvent,
};
use tauri_plugin_log::{Target, TargetKind};
use tokio::fs;
use url::Url;

use crate::api::ApiClient;
use crate::config::PickerConfig;
use crate::logging;
use crate::picker::FilePicker;
use crate::rpc::{MessageBus, MessageEvent};
use crate::view::DialogView;
use crate::window::{origin_of, MessageTarget, PopupFeatures, PopupWindow, WindowOpener};

pub const RPC_REQUEST_EVENT: &str = "lms-picker:rpc-request";
pub const RPC_RESPONSE_EVENT: &str = "lms-picker:rpc-response";
pub const DIALOG_VIEW_EVENT: &str = "lms-picker:view";

const POPUP_TITLE: &str = "Authorize file access";

pub fn log_plugin<R: Runtime>(config: &PickerConfig) -> TauriPlugin<R> {
    let mut log_builder = tauri_plugin_log::Builder::default()
        .level(log::LevelFilter::Info)
        .clear_targets()
        .target(Target::new(TargetKind::Stdout))
        .target(Target::new(TargetKind::Webview));

    if let Some(dir) = logging::log_directory() {
        log_builder = log_builder.target(Target::new(TargetKind::Folder {
            path: dir,
            file_name: Some(config.log_file_stem.clone()),
        }));
    }

    log_builder.build()
}

/// Settings for the desktop picker, falling back to defaults when unset.
pub async fn load_config() -> Result<PickerConfig> {
    PickerConfig::load()
        .await
        .context("failed to load picker settings")
}

pub fn api_client(base_url: &str) -> Result<ApiClient> {
    let base_url =
        Url::parse(base_url).with_context(|| format!("invalid API base URL: {base_url}"))?;
    Ok(ApiClient::new(base_url))
}

/// Opens authorization popups as Tauri webview windows.
pub struct TauriWindowOpener<R: Runtime> {
    app: AppHandle<R>,
    bus: Arc<MessageBus>,
}

impl<R: Runtime> TauriWindowOpener<R> {
    pub fn new(app: AppHandle<R>, bus: Arc<MessageBus>) -> Self {
        Self { app, bus }
    }
}

impl<R: Runtime> WindowOpener for TauriWindowOpener<R> {
    fn open(
        &self,
        url: &Url,
        name: &str,
        features: &PopupFeatures,
    ) -> std::result::Result<Arc<dyn PopupWindow>, String> {
        let window = WebviewWindowBuilder::new(&self.app, name, WebviewUrl::External(url.clone()))
            .title(POPUP_TITLE)
            .inner_size(f64::from(features.width), f64::from(features.height))
            .center()
            .build()
            .map_err(|err| err.to_string())?;

        // Replies from the popup reach the bus stamped with the origin the
        // popup is showing at that moment.
        let bus = Arc::clone(&self.bus);
        let source = window.clone();
        let listener = window.listen(RPC_RESPONSE_EVENT, move |event| {
            let data = match serde_json::from_str::<Value>(event.payload()) {
                Ok(data) => data,
                Err(err) => {
                    warn!("[picker:desktop] unreadable popup reply: {err}");
                    return;
                }
            };
            let origin = match source.url() {
                Ok(url) => origin_of(&url),
                Err(err) => {
                    warn!("[picker:desktop] popup URL unavailable: {err}");
                    return;
                }
            };
            bus.dispatch(MessageEvent::new(origin, data));
        });

        let closed = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&closed);
        let app = self.app.clone();
        window.on_window_event(move |event| {
            if matches!(event, WindowEvent::Destroyed) {
                flag.store(true, Ordering::SeqCst);
                app.unlisten(listener);
            }
        });

        info!("[picker:desktop] opened popup {name}");
        Ok(Arc::new(TauriPopup { window, closed }))
    }
}

pub struct TauriPopup<R: Runtime> {
    window: WebviewWindow<R>,
    closed: Arc<AtomicBool>,
}

impl<R: Runtime> MessageTarget for TauriPopup<R> {
    fn post_message(&self, message: Value, target_origin: &str) -> std::result::Result<(), String> {
        if self.is_closed() {
            return Err("popup window is closed".to_string());
        }
        let current = self.window.url().map_err(|err| err.to_string())?;
        if origin_of(&current) != target_origin {
            // Same as a browser: a message for another origin is dropped.
            debug!(
                "[picker:desktop] popup is on {}, not delivering message for {target_origin}",
                origin_of(&current)
            );
            return Ok(());
        }
        self.window
            .emit_to(
                EventTarget::webview_window(self.window.label()),
                RPC_REQUEST_EVENT,
                message,
            )
            .map_err(|err| err.to_string())
    }
}

impl<R: Runtime> PopupWindow for TauriPopup<R> {
    fn focus(&self) {
        if let Err(err) = self.window.set_focus() {
            warn!("[picker:desktop] failed to focus popup: {err}");
        }
    }

    fn close(&self) {
        if self.is_closed() {
            return;
        }
        if let Err(err) = self.window.close() {
            warn!("[picker:desktop] failed to close popup: {err}");
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Emit the dialog view to the webview every time the picker state changes.
pub fn forward_dialog_view<R: Runtime>(app: AppHandle<R>, picker: &FilePicker, config: PickerConfig) {
    let mut updates = picker.subscribe();
    tauri::async_runtime::spawn(async move {
        loop {
            let view = DialogView::from_snapshot(&updates.borrow_and_update(), &config);
            if let Err(err) = app.emit(DIALOG_VIEW_EVENT, &view) {
                warn!("[picker:desktop] failed to emit dialog view: {err}");
            }
            if updates.changed().await.is_err() {
                debug!("[picker:desktop] picker dropped, stopping view updates");
                break;
            }
        }
    });
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PickerLogFile {
    pub file_name: String,
    pub content: String,
}

#[tauri::command]
pub async fn fetch_picker_logs() -> std::result::Result<PickerLogFile, String> {
    let config = load_config().await.map_err(|err| format!("{err:#}"))?;
    let path = config
        .log_file_path()
        .ok_or_else(|| "Log location unavailable".to_string())?;
    let content = fs::read_to_string(&path)
        .await
        .map_err(|err| format!("Failed to read log file: {err}"))?;
    let file_name = path
        .file_name()
        .and_then(|value| value.to_str())
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}.log", config.log_file_stem));

    Ok(PickerLogFile { file_name, content })
}
