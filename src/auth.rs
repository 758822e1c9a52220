//! Popup window in which the user grants access to their LMS files.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use log::{debug, info, warn};
use parking_lot::Mutex;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;
use uuid::Uuid;

use crate::config::PickerConfig;
use crate::error::{AuthError, RpcError};
use crate::rpc::{MessageBus, RpcChannel};
use crate::window::{origin_of, PopupFeatures, PopupWindow, WindowOpener};

/// Method the completion page of the popup answers.
pub const AUTHORIZE_METHOD: &str = "authorize";
/// Query parameter carrying the auth token on the popup URL.
pub const AUTHORIZATION_PARAM: &str = "authorization";

pub type AuthOutcome = Result<(), AuthError>;
type SharedOutcome = Shared<BoxFuture<'static, AuthOutcome>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Opening,
    Waiting,
    Completed,
    Failed,
    /// The popup went away (closed by the user or cancelled) before completing.
    Closed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub timeout: Duration,
    pub rpc_timeout: Duration,
    pub close_poll_interval: Duration,
    pub features: PopupFeatures,
}

impl SessionOptions {
    pub fn from_config(config: &PickerConfig) -> Self {
        Self {
            timeout: config.auth_timeout(),
            rpc_timeout: config.rpc_timeout(),
            close_poll_interval: config.close_poll_interval(),
            features: config.popup_features(),
        }
    }
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_config(&PickerConfig::default())
    }
}

struct LiveSession {
    generation: u64,
    window: Arc<dyn PopupWindow>,
    outcome: SharedOutcome,
    cancel: CancellationToken,
    finish: CancellationToken,
}

struct SessionSlot {
    phase: SessionPhase,
    live: Option<LiveSession>,
    next_generation: u64,
}

pub struct AuthorizationSession {
    target_url: Url,
    auth_token: String,
    opener: Arc<dyn WindowOpener>,
    rpc: RpcChannel,
    options: SessionOptions,
    slot: Arc<Mutex<SessionSlot>>,
}

impl AuthorizationSession {
    pub fn new(
        target_url: Url,
        auth_token: impl Into<String>,
        opener: Arc<dyn WindowOpener>,
        bus: Arc<MessageBus>,
        options: SessionOptions,
    ) -> Self {
        let rpc = RpcChannel::new(bus).with_timeout(options.rpc_timeout);
        Self {
            target_url,
            auth_token: auth_token.into(),
            opener,
            rpc,
            options,
            slot: Arc::new(Mutex::new(SessionSlot {
                phase: SessionPhase::Idle,
                live: None,
                next_generation: 0,
            })),
        }
    }

    /// URL the popup is opened at: the authorization URL plus the auth token.
    pub fn popup_url(&self) -> Url {
        let mut url = self.target_url.clone();
        url.query_pairs_mut()
            .append_pair(AUTHORIZATION_PARAM, &self.auth_token);
        url
    }

    pub fn phase(&self) -> SessionPhase {
        self.slot.lock().phase
    }

    pub fn is_open(&self) -> bool {
        self.slot.lock().live.is_some()
    }

    /// Run the authorization flow.
    ///
    /// If a popup is already open it is brought to the front and this call
    /// waits for that popup's outcome instead of opening another one.
    pub async fn start(&self) -> AuthOutcome {
        let outcome = self.begin()?;
        outcome.await
    }

    /// Settle the open session as successful, for when completion is learned
    /// some other way than the popup's reply. Returns whether a session was
    /// open.
    pub fn complete(&self) -> bool {
        let mut slot = self.slot.lock();
        let Some(live) = slot.live.take() else {
            return false;
        };
        info!("[picker:auth] authorization completed externally");
        live.finish.cancel();
        live.window.close();
        slot.phase = SessionPhase::Completed;
        true
    }

    /// Close the popup, failing any pending `start` with [`AuthError::Cancelled`].
    pub fn cancel(&self) {
        let mut slot = self.slot.lock();
        if let Some(live) = slot.live.take() {
            info!("[picker:auth] cancelling authorization");
            live.cancel.cancel();
            live.window.close();
            slot.phase = SessionPhase::Closed;
        }
    }

    fn begin(&self) -> Result<SharedOutcome, AuthError> {
        // Held until the session is registered, so concurrent callers cannot
        // both open a window.
        let mut slot = self.slot.lock();

        if let Some(live) = &slot.live {
            debug!("[picker:auth] authorization window already open, focusing it");
            live.window.focus();
            return Ok(live.outcome.clone());
        }

        slot.phase = SessionPhase::Opening;
        let url = self.popup_url();
        let name = format!("lms-auth-{}", Uuid::new_v4().simple());
        let window = match self.opener.open(&url, &name, &self.options.features) {
            Ok(window) => window,
            Err(reason) => {
                warn!("[picker:auth] failed to open authorization window: {reason}");
                slot.phase = SessionPhase::Failed;
                return Err(AuthError::Open(reason));
            }
        };
        info!("[picker:auth] opened authorization window {name}");

        slot.next_generation += 1;
        let generation = slot.next_generation;
        let cancel = CancellationToken::new();
        let finish = CancellationToken::new();

        let task = tokio::spawn(run_session(SessionTask {
            generation,
            window: Arc::clone(&window),
            origin: origin_of(&self.target_url),
            auth_token: self.auth_token.clone(),
            rpc: self.rpc.clone(),
            timeout: self.options.timeout,
            poll_interval: self.options.close_poll_interval,
            cancel: cancel.clone(),
            finish: finish.clone(),
            slot: Arc::clone(&self.slot),
        }));
        let outcome = async move { task.await.unwrap_or(Err(AuthError::Cancelled)) }
            .boxed()
            .shared();

        slot.live = Some(LiveSession {
            generation,
            window,
            outcome: outcome.clone(),
            cancel,
            finish,
        });
        slot.phase = SessionPhase::Waiting;
        Ok(outcome)
    }
}

impl Drop for AuthorizationSession {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct SessionTask {
    generation: u64,
    window: Arc<dyn PopupWindow>,
    origin: String,
    auth_token: String,
    rpc: RpcChannel,
    timeout: Duration,
    poll_interval: Duration,
    cancel: CancellationToken,
    finish: CancellationToken,
    slot: Arc<Mutex<SessionSlot>>,
}

async fn run_session(task: SessionTask) -> AuthOutcome {
    let outcome = tokio::select! {
        biased;
        _ = task.cancel.cancelled() => Err(AuthError::Cancelled),
        _ = task.finish.cancelled() => Ok(()),
        reply = tokio::time::timeout(task.timeout, wait_for_completion(&task)) => {
            reply.unwrap_or(Err(AuthError::TimedOut))
        }
        _ = wait_until_closed(task.window.as_ref(), task.poll_interval) => Err(AuthError::WindowClosed),
    };

    task.window.close();

    let mut slot = task.slot.lock();
    if slot.live.as_ref().map(|live| live.generation) == Some(task.generation) {
        slot.live = None;
        slot.phase = match &outcome {
            Ok(()) => SessionPhase::Completed,
            Err(AuthError::WindowClosed) | Err(AuthError::Cancelled) => SessionPhase::Closed,
            Err(_) => SessionPhase::Failed,
        };
    }
    drop(slot);

    match &outcome {
        Ok(()) => info!("[picker:auth] authorization completed"),
        Err(err) => warn!("[picker:auth] authorization did not complete: {err}"),
    }
    outcome
}

async fn wait_for_completion(task: &SessionTask) -> AuthOutcome {
    loop {
        let reply = task
            .rpc
            .call(
                task.window.as_ref(),
                &task.origin,
                AUTHORIZE_METHOD,
                vec![json!(task.auth_token)],
            )
            .await;
        match reply {
            Ok(_) => return Ok(()),
            // Nobody on the completion page yet.
            Err(RpcError::Timeout { .. }) => continue,
            Err(RpcError::Post(reason)) => {
                debug!("[picker:auth] popup not reachable yet: {reason}");
                tokio::time::sleep(task.poll_interval).await;
            }
            Err(err) => return Err(err.into()),
        }
    }
}

async fn wait_until_closed(window: &dyn PopupWindow, poll_interval: Duration) {
    let mut ticker = tokio::time::interval(poll_interval);
    loop {
        ticker.tick().await;
        if window.is_closed() {
            return;
        }
    }
}
