use futures_util::future::BoxFuture;
use lms_file_picker::view::ButtonAction;
use lms_file_picker::{
    ApiError, DialogKind, DialogView, FilePicker, ListFilesApi, ListingApi, ListingError,
    ListingRequest, LmsItem, MessageBus, MessageEvent, MessageTarget, PathEntry, PickerConfig,
    PopupFeatures, PopupWindow, RpcResponse, SessionPhase, WindowOpener,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const FILES_PATH: &str = "/api/canvas/files/course123";
const AUTH_URL: &str = "https://lms.example.com/api/canvas/oauth/authorize";
const LMS_ORIGIN: &str = "https://lms.example.com";

type Listing = Result<Vec<LmsItem>, ListingError>;

struct Reply {
    delay: Duration,
    result: Listing,
}

#[derive(Default)]
struct FakeApi {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<String>>,
}

impl FakeApi {
    fn reply(&self, path: &str, result: Listing) -> &Self {
        self.reply_after(path, Duration::ZERO, result)
    }

    fn reply_after(&self, path: &str, delay: Duration, result: Listing) -> &Self {
        self.replies
            .lock()
            .entry(path.to_string())
            .or_default()
            .push_back(Reply { delay, result });
        self
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }
}

impl ListingApi for FakeApi {
    fn list_files<'a>(&'a self, request: &'a ListingRequest) -> BoxFuture<'a, Listing> {
        self.calls.lock().push(request.path.clone());
        let reply = self
            .replies
            .lock()
            .get_mut(&request.path)
            .and_then(VecDeque::pop_front)
            .unwrap_or(Reply {
                delay: Duration::ZERO,
                result: Ok(Vec::new()),
            });
        Box::pin(async move {
            tokio::time::sleep(reply.delay).await;
            reply.result
        })
    }
}

#[derive(Clone, Copy)]
enum PopupScript {
    /// The user closes the popup without finishing.
    Dismiss,
    /// The completion page answers the first request.
    Complete,
    /// The completion page answers the nth request.
    CompleteOnRequest(usize),
    /// Sits on the LMS consent screen.
    Silent,
}

struct ScriptedPopup {
    bus: Arc<MessageBus>,
    script: PopupScript,
    requests: AtomicUsize,
    focused: AtomicUsize,
    closed: AtomicBool,
}

impl MessageTarget for ScriptedPopup {
    fn post_message(&self, message: Value, target_origin: &str) -> Result<(), String> {
        assert_eq!(target_origin, LMS_ORIGIN);
        let count = self.requests.fetch_add(1, Ordering::SeqCst) + 1;
        let answers = match self.script {
            PopupScript::Complete => true,
            PopupScript::CompleteOnRequest(n) => count >= n,
            PopupScript::Dismiss | PopupScript::Silent => false,
        };
        if answers {
            let id = message["id"].as_str().unwrap_or_default().to_string();
            let reply = RpcResponse::success(id, json!(null));
            self.bus.dispatch(MessageEvent::new(LMS_ORIGIN, reply.to_value()));
        }
        Ok(())
    }
}

impl PopupWindow for ScriptedPopup {
    fn focus(&self) {
        self.focused.fetch_add(1, Ordering::SeqCst);
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || matches!(self.script, PopupScript::Dismiss)
    }
}

struct ScriptedOpener {
    bus: Arc<MessageBus>,
    scripts: Mutex<VecDeque<PopupScript>>,
    opened: Mutex<Vec<(Url, Arc<ScriptedPopup>)>>,
}

impl ScriptedOpener {
    fn new(bus: &Arc<MessageBus>, scripts: &[PopupScript]) -> Arc<Self> {
        Arc::new(Self {
            bus: Arc::clone(bus),
            scripts: Mutex::new(scripts.iter().copied().collect()),
            opened: Mutex::new(Vec::new()),
        })
    }

    fn popups(&self) -> Vec<Arc<ScriptedPopup>> {
        self.opened
            .lock()
            .iter()
            .map(|(_, popup)| Arc::clone(popup))
            .collect()
    }
}

impl WindowOpener for ScriptedOpener {
    fn open(
        &self,
        url: &Url,
        _name: &str,
        _features: &PopupFeatures,
    ) -> Result<Arc<dyn PopupWindow>, String> {
        let script = self
            .scripts
            .lock()
            .pop_front()
            .unwrap_or(PopupScript::Silent);
        let popup = Arc::new(ScriptedPopup {
            bus: Arc::clone(&self.bus),
            script,
            requests: AtomicUsize::new(0),
            focused: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        });
        self.opened.lock().push((url.clone(), Arc::clone(&popup)));
        Ok(popup)
    }
}

struct Harness {
    api: Arc<FakeApi>,
    opener: Arc<ScriptedOpener>,
    picker: Arc<FilePicker>,
    config: PickerConfig,
}

impl Harness {
    fn new(api: FakeApi, scripts: &[PopupScript]) -> Self {
        let bus = MessageBus::new();
        let api = Arc::new(api);
        let opener = ScriptedOpener::new(&bus, scripts);
        let config = PickerConfig::default();
        let picker = Arc::new(FilePicker::new(
            "auth-token",
            ListFilesApi::new(FILES_PATH, AUTH_URL).unwrap(),
            Arc::clone(&api) as Arc<dyn ListingApi>,
            Arc::clone(&opener) as Arc<dyn WindowOpener>,
            bus,
            &config,
        ));
        Self {
            api,
            opener,
            picker,
            config,
        }
    }

    fn view(&self) -> DialogView {
        DialogView::from_snapshot(&self.picker.snapshot(), &self.config)
    }
}

fn needs_authorization() -> Listing {
    Err(ApiError::new(Some(400)).into())
}

#[tokio::test(start_paused = true)]
async fn lists_course_files_on_open() {
    let api = FakeApi::default();
    api.reply(FILES_PATH, Ok(vec![LmsItem::file(123, "Test.pdf")]));
    let harness = Harness::new(api, &[]);

    harness.picker.start().await;

    let snapshot = harness.picker.snapshot();
    assert_eq!(snapshot.dialog.kind(), DialogKind::Fetched);
    assert_eq!(snapshot.dialog.files().unwrap()[0].display_name, "Test.pdf");
    assert_eq!(harness.api.calls(), vec![FILES_PATH.to_string()]);
    assert!(harness.opener.popups().is_empty());

    let view = harness.view();
    assert_eq!(view.title, "Select a file");
    assert_eq!(view.buttons[0].action, ButtonAction::Select);
    assert!(view.buttons[0].disabled);
}

#[tokio::test(start_paused = true)]
async fn authorizes_then_lists_files() {
    let api = FakeApi::default();
    api.reply(FILES_PATH, needs_authorization())
        .reply(FILES_PATH, Ok(vec![LmsItem::file(123, "Test.pdf")]));
    let harness = Harness::new(api, &[PopupScript::Complete]);

    harness.picker.start().await;
    assert_eq!(harness.picker.snapshot().dialog.kind(), DialogKind::Authorizing);
    assert_eq!(harness.view().buttons[0].action, ButtonAction::Authorize);

    harness.picker.authorize().await;

    let snapshot = harness.picker.snapshot();
    assert_eq!(snapshot.dialog.kind(), DialogKind::Fetched);
    assert_eq!(snapshot.dialog.files().map(<[LmsItem]>::len), Some(1));
    assert_eq!(harness.picker.session().phase(), SessionPhase::Completed);

    let popups = harness.opener.opened.lock();
    assert_eq!(popups.len(), 1);
    assert_eq!(
        popups[0].0.as_str(),
        "https://lms.example.com/api/canvas/oauth/authorize?authorization=auth-token"
    );
    assert!(popups[0].1.is_closed());
}

#[tokio::test(start_paused = true)]
async fn recovers_after_two_failed_authorizations() {
    let api = FakeApi::default();
    api.reply(FILES_PATH, needs_authorization())
        .reply(FILES_PATH, Ok(vec![LmsItem::file(123, "Test.pdf")]));
    let harness = Harness::new(
        api,
        &[
            PopupScript::Dismiss,
            PopupScript::Dismiss,
            PopupScript::Complete,
        ],
    );
    harness.picker.start().await;

    for _ in 0..2 {
        harness.picker.authorize().await;
        let snapshot = harness.picker.snapshot();
        assert_eq!(snapshot.dialog.kind(), DialogKind::Authorizing);
        assert!(snapshot.authorization_attempted);
        assert_eq!(harness.view().buttons[0].action, ButtonAction::TryAgain);
    }

    harness.picker.authorize().await;

    assert_eq!(harness.opener.popups().len(), 3);
    assert_eq!(harness.picker.snapshot().dialog.kind(), DialogKind::Fetched);
    let view = harness.view();
    assert!(view.message.is_none());
    assert_ne!(view.buttons[0].action, ButtonAction::TryAgain);
}

#[tokio::test(start_paused = true)]
async fn slow_folder_listing_does_not_override_newer_one() {
    let api = FakeApi::default();
    api.reply(
        FILES_PATH,
        Ok(vec![
            LmsItem::folder("a", "Folder A", "a-path"),
            LmsItem::folder("b", "Folder B", "b-path"),
        ]),
    )
    .reply_after(
        "a-path",
        Duration::from_millis(100),
        Ok(vec![LmsItem::file(1, "a.pdf")]),
    )
    .reply_after(
        "b-path",
        Duration::from_millis(10),
        Ok(vec![LmsItem::file(2, "b.pdf")]),
    );
    let harness = Harness::new(api, &[]);
    harness.picker.start().await;

    let slow = tokio::spawn({
        let picker = Arc::clone(&harness.picker);
        async move {
            picker
                .select_breadcrumb(PathEntry::new("a", "Folder A", Some("a-path".to_string())))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(1)).await;
    harness
        .picker
        .select_breadcrumb(PathEntry::new("b", "Folder B", Some("b-path".to_string())))
        .await;
    slow.await.unwrap();

    let snapshot = harness.picker.snapshot();
    assert_eq!(snapshot.dialog.files().unwrap()[0].display_name, "b.pdf");
    assert_eq!(
        snapshot.breadcrumbs.last().map(|entry| entry.display_name.as_str()),
        Some("Folder B")
    );
}

#[tokio::test(start_paused = true)]
async fn authorizing_again_focuses_the_open_popup() {
    let api = FakeApi::default();
    api.reply(FILES_PATH, needs_authorization());
    let harness = Harness::new(api, &[PopupScript::CompleteOnRequest(2)]);
    harness.picker.start().await;

    let spawn_authorize = |picker: &Arc<FilePicker>| {
        let picker = Arc::clone(picker);
        tokio::spawn(async move { picker.authorize().await })
    };
    let first = spawn_authorize(&harness.picker);
    tokio::time::sleep(Duration::from_millis(10)).await;
    let second = spawn_authorize(&harness.picker);
    tokio::time::sleep(Duration::from_millis(10)).await;

    let popups = harness.opener.popups();
    assert_eq!(popups.len(), 1);
    assert_eq!(popups[0].focused.load(Ordering::SeqCst), 1);

    // The popup answers the resent request once the first call times out.
    first.await.unwrap();
    second.await.unwrap();

    assert_eq!(harness.picker.snapshot().dialog.kind(), DialogKind::Fetched);
    assert_eq!(harness.api.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn auth_complete_signal_closes_the_popup() {
    let api = FakeApi::default();
    api.reply(FILES_PATH, needs_authorization())
        .reply(FILES_PATH, Ok(vec![LmsItem::file(123, "Test.pdf")]));
    let harness = Harness::new(api, &[PopupScript::Silent]);
    harness.picker.start().await;

    let pending = tokio::spawn({
        let picker = Arc::clone(&harness.picker);
        async move { picker.authorize().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    harness.picker.on_auth_complete().await;

    assert!(!harness.picker.session().is_open());
    assert_eq!(harness.picker.session().phase(), SessionPhase::Completed);
    assert!(harness.opener.popups()[0].is_closed());
    assert_eq!(harness.picker.snapshot().dialog.kind(), DialogKind::Fetched);

    pending.await.unwrap();
    assert_eq!(harness.api.calls().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn navigating_clears_selection_while_listing_is_pending() {
    let file = LmsItem::file(123, "Test.pdf");
    let api = FakeApi::default();
    api.reply(
        FILES_PATH,
        Ok(vec![file.clone(), LmsItem::folder("a", "Folder A", "a-path")]),
    )
    .reply_after("a-path", Duration::from_millis(100), Ok(Vec::new()));
    let harness = Harness::new(api, &[]);
    harness.picker.start().await;
    harness.picker.select_file(Some(file.clone()));
    assert_eq!(harness.picker.snapshot().selected_file, Some(file));

    let navigation = tokio::spawn({
        let picker = Arc::clone(&harness.picker);
        async move {
            picker
                .select_breadcrumb(PathEntry::new("a", "Folder A", Some("a-path".to_string())))
                .await
        }
    });
    tokio::time::sleep(Duration::from_millis(1)).await;

    let snapshot = harness.picker.snapshot();
    assert_eq!(snapshot.dialog.kind(), DialogKind::Fetching);
    assert!(snapshot.selected_file.is_none());

    navigation.await.unwrap();
    assert_eq!(harness.picker.snapshot().dialog.kind(), DialogKind::Fetched);
}

#[tokio::test(start_paused = true)]
async fn cancelling_the_dialog_closes_the_popup() {
    let api = FakeApi::default();
    api.reply(FILES_PATH, needs_authorization());
    let harness = Harness::new(api, &[PopupScript::Silent]);
    harness.picker.start().await;

    let pending = tokio::spawn({
        let picker = Arc::clone(&harness.picker);
        async move { picker.authorize().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;

    harness.picker.cancel();
    pending.await.unwrap();

    assert!(harness.opener.popups()[0].is_closed());
    assert!(!harness.picker.session().is_open());
    assert_eq!(harness.picker.snapshot().dialog.kind(), DialogKind::Authorizing);

    harness.picker.reload().await;
    assert_eq!(harness.api.calls().len(), 1);
}
