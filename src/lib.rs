pub mod api;
pub mod auth;
pub mod config;
#[cfg(feature = "desktop")]
pub mod desktop;
pub mod error;
pub mod listing;
pub mod logging;
pub mod navigation;
pub mod picker;
pub mod rpc;
pub mod view;
pub mod window;

pub use api::{ApiClient, ApiRequest};
pub use auth::{AuthorizationSession, SessionOptions, SessionPhase};
pub use config::{ListFilesApi, PickerConfig};
pub use error::{ApiError, AuthError, ConfigError, ListingError, RpcError};
pub use listing::{ItemId, ItemKind, ListingApi, ListingRequest, LmsItem};
pub use navigation::{NavigationStack, PathEntry};
pub use picker::{DialogKind, DialogState, FilePicker, PickerSnapshot};
pub use rpc::{MessageBus, MessageEvent, RpcChannel, RpcRequest, RpcResponse};
pub use view::DialogView;
pub use window::{MessageTarget, PopupFeatures, PopupWindow, WindowOpener};
