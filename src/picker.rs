use log::{debug, info, warn};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::watch;

use crate::auth::{AuthorizationSession, SessionOptions};
use crate::config::{ListFilesApi, PickerConfig};
use crate::error::{AuthError, ListingError};
use crate::listing::{ListingApi, ListingRequest, LmsItem};
use crate::navigation::{NavigationStack, PathEntry};
use crate::rpc::MessageBus;
use crate::window::WindowOpener;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogKind {
    Fetching,
    Fetched,
    Authorizing,
    Error,
}

#[derive(Debug, Clone)]
pub enum DialogState {
    Fetching,
    Fetched { files: Vec<LmsItem> },
    Authorizing,
    Error { error: ListingError },
}

impl DialogState {
    pub fn kind(&self) -> DialogKind {
        match self {
            DialogState::Fetching => DialogKind::Fetching,
            DialogState::Fetched { .. } => DialogKind::Fetched,
            DialogState::Authorizing => DialogKind::Authorizing,
            DialogState::Error { .. } => DialogKind::Error,
        }
    }

    pub fn files(&self) -> Option<&[LmsItem]> {
        match self {
            DialogState::Fetched { files } => Some(files),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ListingError> {
        match self {
            DialogState::Error { error } => Some(error),
            _ => None,
        }
    }
}

/// Everything an observer needs to draw the dialog.
#[derive(Debug, Clone)]
pub struct PickerSnapshot {
    pub dialog: DialogState,
    pub authorization_attempted: bool,
    pub selected_file: Option<LmsItem>,
    pub breadcrumbs: Vec<PathEntry>,
}

impl PickerSnapshot {
    pub fn in_subfolder(&self) -> bool {
        self.breadcrumbs.len() > 1
    }
}

struct PickerState {
    dialog: DialogState,
    authorization_attempted: bool,
    selected_file: Option<LmsItem>,
    navigation: NavigationStack,
    /// Bumped whenever an operation supersedes in-flight fetches.
    generation: u64,
    closed: bool,
}

impl PickerState {
    fn snapshot(&self) -> PickerSnapshot {
        PickerSnapshot {
            dialog: self.dialog.clone(),
            authorization_attempted: self.authorization_attempted,
            selected_file: self.selected_file.clone(),
            breadcrumbs: self.navigation.entries().to_vec(),
        }
    }
}

struct PendingFetch {
    generation: u64,
    request: ListingRequest,
}

pub struct FilePicker {
    auth_token: String,
    list_files_api: ListFilesApi,
    api: Arc<dyn ListingApi>,
    session: AuthorizationSession,
    state: Mutex<PickerState>,
    updates: watch::Sender<PickerSnapshot>,
}

impl FilePicker {
    pub fn new(
        auth_token: impl Into<String>,
        list_files_api: ListFilesApi,
        api: Arc<dyn ListingApi>,
        opener: Arc<dyn WindowOpener>,
        bus: Arc<MessageBus>,
        config: &PickerConfig,
    ) -> Self {
        let auth_token = auth_token.into();
        let session = AuthorizationSession::new(
            list_files_api.auth_url.clone(),
            auth_token.clone(),
            opener,
            bus,
            SessionOptions::from_config(config),
        );
        let state = PickerState {
            dialog: DialogState::Fetching,
            authorization_attempted: false,
            selected_file: None,
            navigation: NavigationStack::new(),
            generation: 0,
            closed: false,
        };
        let (updates, _) = watch::channel(state.snapshot());
        Self {
            auth_token,
            list_files_api,
            api,
            session,
            state: Mutex::new(state),
            updates,
        }
    }

    pub fn snapshot(&self) -> PickerSnapshot {
        self.state.lock().snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<PickerSnapshot> {
        self.updates.subscribe()
    }

    pub fn session(&self) -> &AuthorizationSession {
        &self.session
    }

    pub fn is_fetching(&self) -> bool {
        matches!(self.state.lock().dialog, DialogState::Fetching)
    }

    /// Initial listing when the dialog appears.
    pub async fn start(&self) {
        self.refetch(|_| true).await;
    }

    /// List the current folder again.
    pub async fn reload(&self) {
        self.refetch(|state| !matches!(state.dialog, DialogState::Authorizing))
            .await;
    }

    /// Run the authorization popup and, once it completes, list files again.
    ///
    /// Offered while authorization is required and as the retry action of the
    /// error state. When a later call joins an already open popup, only the
    /// latest caller acts on the shared outcome.
    pub async fn authorize(&self) {
        let generation = {
            let mut state = self.state.lock();
            if state.closed
                || !matches!(
                    state.dialog,
                    DialogState::Authorizing | DialogState::Error { .. }
                )
            {
                debug!("[picker] ignoring authorize request");
                return;
            }
            state.generation += 1;
            state.selected_file = None;
            self.transition(&mut state, DialogState::Authorizing);
            state.generation
        };

        match self.session.start().await {
            Ok(()) => {
                self.refetch(|state| {
                    if state.generation != generation {
                        return false;
                    }
                    state.navigation.reset();
                    true
                })
                .await
            }
            Err(AuthError::Cancelled) => debug!("[picker] authorization cancelled"),
            Err(err) => {
                warn!("[picker] authorization failed: {err}");
                let mut state = self.state.lock();
                if state.closed || state.generation != generation {
                    return;
                }
                state.authorization_attempted = true;
                self.transition(&mut state, DialogState::Authorizing);
            }
        }
    }

    /// The authorization flow finished; close the popup and list files from
    /// the top.
    pub async fn on_auth_complete(&self) {
        if self.state.lock().closed {
            return;
        }
        self.session.complete();
        self.refetch(|state| {
            state.navigation.reset();
            true
        })
        .await;
    }

    /// Navigate to a breadcrumb or folder.
    pub async fn select_breadcrumb(&self, entry: PathEntry) {
        self.refetch(move |state| {
            if matches!(state.dialog, DialogState::Authorizing) {
                return false;
            }
            state.navigation.push(entry);
            true
        })
        .await;
    }

    /// Mark `file` as selected without choosing it.
    pub fn select_file(&self, file: Option<LmsItem>) {
        let mut state = self.state.lock();
        if state.closed || !matches!(state.dialog, DialogState::Fetched { .. }) {
            return;
        }
        state.selected_file = file;
        self.publish(&state);
    }

    /// Act on a double-clicked or confirmed item.
    ///
    /// Folders are navigated into. A file is the user's choice and is
    /// returned to the caller.
    pub async fn use_file(&self, item: Option<LmsItem>) -> Option<LmsItem> {
        let item = item?;
        if let Some(entry) = PathEntry::from_folder(&item) {
            self.select_breadcrumb(entry).await;
            return None;
        }
        if self.state.lock().closed {
            return None;
        }
        info!("[picker] file chosen: {}", item.display_name);
        Some(item)
    }

    /// Choose the currently selected file, if any.
    pub async fn use_selected_file(&self) -> Option<LmsItem> {
        let selected = self.state.lock().selected_file.clone();
        self.use_file(selected).await
    }

    /// The dialog was dismissed. Closes any authorization popup and drops the
    /// results of in-flight fetches.
    pub fn cancel(&self) {
        {
            let mut state = self.state.lock();
            state.closed = true;
            state.generation += 1;
        }
        self.session.cancel();
        info!("[picker] dialog cancelled");
    }

    /// Apply `prepare` and, if it allows, start a fetch of the current folder.
    async fn refetch<F>(&self, prepare: F)
    where
        F: FnOnce(&mut PickerState) -> bool,
    {
        let pending = {
            let mut state = self.state.lock();
            if state.closed || !prepare(&mut state) {
                return;
            }
            self.begin_fetch(&mut state)
        };
        self.finish_fetch(pending).await;
    }

    fn begin_fetch(&self, state: &mut PickerState) -> PendingFetch {
        state.generation += 1;
        state.selected_file = None;
        let path = state
            .navigation
            .current_fetch_path(&self.list_files_api.path);
        debug!("[picker] fetching {path} (generation {})", state.generation);
        self.transition(state, DialogState::Fetching);
        PendingFetch {
            generation: state.generation,
            request: ListingRequest::new(self.auth_token.clone(), path),
        }
    }

    async fn finish_fetch(&self, pending: PendingFetch) {
        let result = self.api.list_files(&pending.request).await;

        let mut state = self.state.lock();
        if state.generation != pending.generation {
            debug!(
                "[picker] discarding stale listing of {}",
                pending.request.path
            );
            return;
        }

        let next = match result {
            Ok(files) => {
                debug!("[picker] listed {} items", files.len());
                DialogState::Fetched { files }
            }
            Err(error) if error.requires_authorization() => {
                info!("[picker] listing requires authorization");
                state.authorization_attempted = false;
                DialogState::Authorizing
            }
            Err(error) => {
                warn!("[picker] listing failed: {error}");
                DialogState::Error { error }
            }
        };
        self.transition(&mut state, next);
    }

    fn transition(&self, state: &mut PickerState, next: DialogState) {
        state.dialog = next;
        self.publish(state);
    }

    fn publish(&self, state: &PickerState) {
        self.updates.send_replace(state.snapshot());
    }
}

impl Drop for FilePicker {
    fn drop(&mut self) {
        self.session.cancel();
    }
}
