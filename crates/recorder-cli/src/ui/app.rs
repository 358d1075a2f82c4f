use std::collections::{BTreeSet, HashMap, VecDeque};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, unbounded};
use crossterm::{
    event::{self, Event as CEvent, KeyCode, KeyEvent, KeyEventKind, KeyModifiers},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend, widgets::ListState};
use recorder_api::{
    ApiClient, AuthEvent, CancelToken, DownloadOutcome, FixedPicker, SavePicker, Strategies,
    StreamWorker, SubscribedRoom, SystemHandoff,
};
use recorder_types::{ConvertTask, FileEntry, RecordTask};

use crate::config::Settings;
use crate::format::{error_text, parse_room_id, subscribe_error, unsubscribe_error};
use crate::state::ClientState;

use super::poller::{Payload, Poller, Query, Refreshed};
use super::render;

const LOG_CAP: usize = 500;
const PROGRESS_EVERY: Duration = Duration::from_millis(100);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub(crate) enum Tab {
    Records,
    Files,
    Converts,
    Subscriptions,
}

impl Tab {
    pub(crate) const ALL: [Tab; 4] = [Tab::Records, Tab::Files, Tab::Converts, Tab::Subscriptions];

    pub(crate) fn title(self) -> &'static str {
        match self {
            Tab::Records => "Records",
            Tab::Files => "Files",
            Tab::Converts => "Converts",
            Tab::Subscriptions => "Subscriptions",
        }
    }

    pub(crate) fn index(self) -> usize {
        match self {
            Tab::Records => 0,
            Tab::Files => 1,
            Tab::Converts => 2,
            Tab::Subscriptions => 3,
        }
    }

    fn next(self) -> Self {
        Tab::ALL[(self.index() + 1) % Tab::ALL.len()]
    }

    fn prev(self) -> Self {
        Tab::ALL[(self.index() + Tab::ALL.len() - 1) % Tab::ALL.len()]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum LoginField {
    User,
    Pass,
}

#[derive(Debug)]
pub(crate) struct LoginForm {
    pub(crate) user: String,
    pub(crate) pass: String,
    pub(crate) focus: LoginField,
    pub(crate) error: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PromptKind {
    AddRecord,
    Subscribe,
    ConvertFormat { path: String },
    SavePath { path: String },
}

#[derive(Debug)]
pub(crate) struct PromptForm {
    pub(crate) kind: PromptKind,
    pub(crate) input: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum PendingAction {
    DeletePaths(Vec<String>),
    CancelConvert(String),
    Unsubscribe(u64),
    /// `y` converts and deletes the source, `n` converts only.
    Convert { path: String, format: String },
}

#[derive(Debug)]
pub(crate) struct ConfirmDialog {
    pub(crate) title: String,
    pub(crate) body: String,
    pub(crate) action: PendingAction,
}

#[derive(Debug)]
pub(crate) enum Modal {
    Help,
    Logs,
    Login(LoginForm),
    Prompt(PromptForm),
    Confirm(ConfirmDialog),
}

pub(crate) struct DownloadJob {
    pub(crate) name: String,
    pub(crate) received: u64,
    pub(crate) total: Option<u64>,
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
}

#[cfg(test)]
impl DownloadJob {
    pub(crate) fn for_test(name: &str, received: u64, total: Option<u64>) -> Self {
        Self {
            name: name.to_string(),
            received,
            total,
            cancel: CancelToken::new(),
            handle: None,
        }
    }
}

enum DownloadEvent {
    Progress { received: u64, total: Option<u64> },
    Finished(std::result::Result<DownloadOutcome, recorder_api::ApiError>),
}

/// Launch the TUI, spawn the view pollers, and drive the event loop.
pub(crate) fn run_tui(
    api: Arc<ApiClient>,
    settings: Settings,
    mut state: ClientState,
    user: Option<String>,
    log_rx: Receiver<String>,
) -> Result<()> {
    if user.is_some() {
        state.user = user;
    }
    let (done_tx, done_rx) = unbounded::<Refreshed>();
    let pollers = Tab::ALL
        .iter()
        .map(|&tab| Poller::spawn(tab, api.clone(), settings.poll_interval, done_tx.clone()))
        .collect();
    let auth_rx = api.subscribe_auth();

    let mut app = App::new(
        api,
        settings,
        state,
        ClientState::default_path(),
        pollers,
        done_rx,
        auth_rx,
        log_rx,
    );
    app.activate(Tab::Records);

    let mut term = init_terminal()?;
    let result = ui_loop(&mut term, &mut app);

    restore_terminal(&mut term)?;
    app.shutdown();
    result
}

/// In-memory UI state for rendering + interaction.
pub(crate) struct App {
    api: Arc<ApiClient>,
    pub(crate) settings: Settings,
    state: ClientState,
    state_path: Option<PathBuf>,
    pub(crate) tab: Tab,
    pollers: Vec<Poller>,
    refresh_rx: Receiver<Refreshed>,
    auth_rx: Receiver<AuthEvent>,

    pub(crate) records: Vec<RecordTask>,
    pub(crate) records_state: ListState,
    pub(crate) dir: String,
    pub(crate) entries: Vec<FileEntry>,
    pub(crate) files_state: ListState,
    pub(crate) marked: BTreeSet<String>,
    pub(crate) converts: Vec<ConvertTask>,
    pub(crate) converts_state: ListState,
    pub(crate) rooms: Vec<SubscribedRoom>,
    pub(crate) rooms_state: ListState,
    pub(crate) loaded: [bool; 4],
    pub(crate) view_errors: HashMap<Tab, String>,

    pub(crate) status: String,
    pub(crate) modal: Option<Modal>,
    pub(crate) download: Option<DownloadJob>,
    download_tx: Sender<DownloadEvent>,
    download_rx: Receiver<DownloadEvent>,

    pub(crate) logs: VecDeque<String>,
    pub(crate) logs_scroll: usize,
    last_status_snapshot: String,
    log_rx: Receiver<String>,
    pub(crate) list_view_height: usize,
    should_quit: bool,
}

impl App {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        api: Arc<ApiClient>,
        settings: Settings,
        state: ClientState,
        state_path: Option<PathBuf>,
        pollers: Vec<Poller>,
        refresh_rx: Receiver<Refreshed>,
        auth_rx: Receiver<AuthEvent>,
        log_rx: Receiver<String>,
    ) -> Self {
        let (download_tx, download_rx) = unbounded();
        Self {
            api,
            settings,
            state,
            state_path,
            tab: Tab::Records,
            pollers,
            refresh_rx,
            auth_rx,
            records: Vec::new(),
            records_state: ListState::default(),
            dir: String::new(),
            entries: Vec::new(),
            files_state: ListState::default(),
            marked: BTreeSet::new(),
            converts: Vec::new(),
            converts_state: ListState::default(),
            rooms: Vec::new(),
            rooms_state: ListState::default(),
            loaded: [false; 4],
            view_errors: HashMap::new(),
            status: "Ready".into(),
            modal: None,
            download: None,
            download_tx,
            download_rx,
            logs: VecDeque::new(),
            logs_scroll: 0,
            last_status_snapshot: String::new(),
            log_rx,
            list_view_height: 0,
            should_quit: false,
        }
    }

    pub(crate) fn server(&self) -> &str {
        &self.settings.server
    }

    pub(crate) fn user(&self) -> Option<&str> {
        self.state.user.as_deref()
    }

    fn poller_mut(&mut self, tab: Tab) -> Option<&mut Poller> {
        self.pollers.iter_mut().find(|p| p.tab() == tab)
    }

    fn refresh(&mut self, tab: Tab) {
        if let Some(poller) = self.poller_mut(tab) {
            poller.refresh();
        }
    }

    /// Switch views; only the visible view keeps polling.
    pub(crate) fn activate(&mut self, tab: Tab) {
        for poller in &self.pollers {
            poller.set_active(poller.tab() == tab);
        }
        self.tab = tab;
        self.refresh(tab);
    }

    // --- refresh results ---

    fn drain_refreshes(&mut self) {
        while let Ok(msg) = self.refresh_rx.try_recv() {
            self.apply_refresh(msg);
        }
    }

    pub(crate) fn apply_refresh(&mut self, msg: Refreshed) {
        let current = self
            .pollers
            .iter()
            .find(|p| p.tab() == msg.tab)
            .is_some_and(|p| p.is_current(msg.generation));
        if !current {
            tracing::debug!(tab = ?msg.tab, generation = msg.generation, "dropping stale refresh");
            return;
        }
        match msg.result {
            Ok(payload) => {
                self.view_errors.remove(&msg.tab);
                self.loaded[msg.tab.index()] = true;
                self.apply_payload(payload);
            }
            Err(err) => {
                if msg.tab == self.tab {
                    self.status = format!("{} refresh failed: {err}", msg.tab.title());
                }
                self.view_errors.insert(msg.tab, err);
            }
        }
    }

    fn apply_payload(&mut self, payload: Payload) {
        match payload {
            Payload::Records(tasks) => {
                self.records = tasks;
                clamp_selection(&mut self.records_state, self.records.len());
            }
            Payload::Files { dir, entries } => {
                if dir != self.dir {
                    return;
                }
                self.entries = entries;
                let present: BTreeSet<&str> = self.entries.iter().map(|e| e.path()).collect();
                self.marked.retain(|path| present.contains(path.as_str()));
                clamp_selection(&mut self.files_state, self.entries.len());
            }
            Payload::Converts(tasks) => {
                self.converts = tasks;
                clamp_selection(&mut self.converts_state, self.converts.len());
            }
            Payload::Subscriptions(rooms) => {
                self.rooms = rooms;
                clamp_selection(&mut self.rooms_state, self.rooms.len());
            }
        }
    }

    // --- session ---

    fn drain_auth(&mut self) {
        let mut rejected = None;
        while let Ok(AuthEvent::Unauthorized { code }) = self.auth_rx.try_recv() {
            rejected = Some(code);
        }
        if let Some(code) = rejected {
            if !matches!(self.modal, Some(Modal::Login(_))) {
                tracing::info!(code, "session rejected, asking for login");
                self.open_login(None);
            }
        }
    }

    pub(crate) fn open_login(&mut self, error: Option<String>) {
        let user = self.state.user.clone().unwrap_or_default();
        let focus = if user.is_empty() {
            LoginField::User
        } else {
            LoginField::Pass
        };
        self.modal = Some(Modal::Login(LoginForm {
            user,
            pass: String::new(),
            focus,
            error,
        }));
        self.status = "Log in to continue".into();
    }

    fn submit_login(&mut self) {
        let Some(Modal::Login(form)) = self.modal.as_mut() else {
            return;
        };
        let user = form.user.trim().to_string();
        if user.is_empty() {
            form.error = Some("user name is required".into());
            form.focus = LoginField::User;
            return;
        }
        let pass = std::mem::take(&mut form.pass);
        match self.api.login(&user, &pass) {
            Ok(()) => {
                self.modal = None;
                self.state.remember(&self.settings.server, Some(&user));
                self.save_state();
                self.status = format!("Logged in as {user}");
                self.refresh(self.tab);
            }
            Err(err) => {
                let message = if err.is_unauthorized() {
                    "invalid user name or password".to_string()
                } else {
                    error_text(&err)
                };
                if let Some(Modal::Login(form)) = self.modal.as_mut() {
                    form.error = Some(message);
                    form.focus = LoginField::Pass;
                }
            }
        }
    }

    fn logout(&mut self) {
        self.api.logout();
        self.state.user = None;
        self.save_state();
        self.open_login(None);
        self.status = "Logged out".into();
    }

    fn save_state(&self) {
        let Some(path) = self.state_path.as_ref() else {
            return;
        };
        if let Err(err) = self.state.save_to(path) {
            tracing::warn!(error = %format!("{err:#}"), "failed to save client state");
        }
    }

    // --- selection ---

    pub(crate) fn list_len(&self, tab: Tab) -> usize {
        match tab {
            Tab::Records => self.records.len(),
            Tab::Files => self.entries.len(),
            Tab::Converts => self.converts.len(),
            Tab::Subscriptions => self.rooms.len(),
        }
    }

    pub(crate) fn list_state_mut(&mut self, tab: Tab) -> &mut ListState {
        match tab {
            Tab::Records => &mut self.records_state,
            Tab::Files => &mut self.files_state,
            Tab::Converts => &mut self.converts_state,
            Tab::Subscriptions => &mut self.rooms_state,
        }
    }

    fn selected(&self) -> Option<usize> {
        match self.tab {
            Tab::Records => self.records_state.selected(),
            Tab::Files => self.files_state.selected(),
            Tab::Converts => self.converts_state.selected(),
            Tab::Subscriptions => self.rooms_state.selected(),
        }
    }

    fn move_selection(&mut self, delta: isize) {
        let len = self.list_len(self.tab);
        if len == 0 {
            return;
        }
        let state = self.list_state_mut(self.tab);
        let i = state.selected().unwrap_or(0) as isize;
        let ni = (i + delta).clamp(0, len as isize - 1) as usize;
        state.select(Some(ni));
    }

    fn page_step(&self) -> isize {
        self.list_view_height.max(1) as isize
    }

    fn select_edge(&mut self, last: bool) {
        let len = self.list_len(self.tab);
        if len == 0 {
            return;
        }
        let idx = if last { len - 1 } else { 0 };
        self.list_state_mut(self.tab).select(Some(idx));
    }

    fn selected_record(&self) -> Option<&RecordTask> {
        self.records_state.selected().and_then(|i| self.records.get(i))
    }

    fn selected_entry(&self) -> Option<&FileEntry> {
        self.files_state.selected().and_then(|i| self.entries.get(i))
    }

    fn selected_convert(&self) -> Option<&ConvertTask> {
        self.converts_state.selected().and_then(|i| self.converts.get(i))
    }

    fn selected_room(&self) -> Option<&SubscribedRoom> {
        self.rooms_state.selected().and_then(|i| self.rooms.get(i))
    }

    // --- records ---

    fn start_record(&mut self, room_id: u64) {
        match self.api.start_record(room_id) {
            Ok(()) => {
                self.status = format!("Recording started for room {room_id}");
                self.refresh(Tab::Records);
                self.refresh(Tab::Subscriptions);
            }
            Err(err) if err.is_unauthorized() => {}
            Err(err) => self.status = format!("Start failed: {}", error_text(&err)),
        }
    }

    fn toggle_selected_record(&mut self) {
        let Some(task) = self.selected_record() else {
            return;
        };
        let room_id = task.room_id;
        if !task.status.is_recording() {
            self.start_record(room_id);
            return;
        }
        match self.api.stop_record(room_id) {
            Ok(()) => {
                self.status = format!("Recording stopped for room {room_id}");
                self.refresh(Tab::Records);
            }
            Err(err) if err.is_unauthorized() => {}
            Err(err) => self.status = format!("Stop failed: {}", error_text(&err)),
        }
    }

    // --- files ---

    pub(crate) fn enter_dir(&mut self, dir: String) {
        self.dir = dir.trim_matches('/').to_string();
        self.entries.clear();
        self.marked.clear();
        self.files_state.select(None);
        self.loaded[Tab::Files.index()] = false;
        let query = Query::Files {
            dir: self.dir.clone(),
        };
        if let Some(poller) = self.poller_mut(Tab::Files) {
            poller.retarget(query);
        }
        self.status = format!("Entering /{}", self.dir);
    }

    fn go_parent(&mut self) {
        if self.dir.is_empty() {
            self.status = "Already at the top".into();
            return;
        }
        let parent = self
            .dir
            .rsplit_once('/')
            .map(|(head, _)| head.to_string())
            .unwrap_or_default();
        self.enter_dir(parent);
    }

    fn open_selected_entry(&mut self) {
        match self.selected_entry() {
            Some(FileEntry::Directory { path, .. }) => {
                let path = path.clone();
                self.enter_dir(path);
            }
            Some(FileEntry::MediaFile { .. }) => self.start_download(None),
            None => {}
        }
    }

    fn toggle_mark(&mut self) {
        let Some(path) = self.selected_entry().map(|e| e.path().to_string()) else {
            return;
        };
        if !self.marked.remove(&path) {
            self.marked.insert(path);
        }
        self.status = format!("{} marked", self.marked.len());
        self.move_selection(1);
    }

    /// Marked paths if any, otherwise the selected entry.
    fn delete_targets(&self) -> Vec<String> {
        if !self.marked.is_empty() {
            return self.marked.iter().cloned().collect();
        }
        self.selected_entry()
            .map(|e| vec![e.path().to_string()])
            .unwrap_or_default()
    }

    fn ask_delete(&mut self) {
        let paths = self.delete_targets();
        if paths.is_empty() {
            return;
        }
        let body = match paths.as_slice() {
            [single] => format!("Delete {single}?"),
            many => format!("Delete {} items?\n\n{}", many.len(), many.join("\n")),
        };
        self.modal = Some(Modal::Confirm(ConfirmDialog {
            title: "Delete".into(),
            body,
            action: PendingAction::DeletePaths(paths),
        }));
    }

    /// One path is removed directly, several in one batch; the directory is
    /// listed again afterwards.
    pub(crate) fn delete_paths(&mut self, paths: &[String]) {
        let result = match paths {
            [single] => self.api.delete_path(single),
            _ => self.api.delete_files(paths),
        };
        match result {
            Ok(()) => {
                self.status = format!("Deleted {} item(s)", paths.len());
                self.marked.clear();
                self.refresh(Tab::Files);
            }
            Err(err) if err.is_unauthorized() => {}
            Err(err) => self.status = format!("Delete failed: {}", error_text(&err)),
        }
    }

    fn share_selected(&mut self) {
        let Some(FileEntry::MediaFile { path, .. }) = self.selected_entry() else {
            self.status = "Only files can be shared".into();
            return;
        };
        let path = path.clone();
        match self.api.presign(&path) {
            Ok(link) => {
                tracing::info!(path = %path, url = %link.url, "share link issued");
                self.status = format!("Share link: {}", link.url);
            }
            Err(err) if err.is_unauthorized() => {}
            Err(err) => self.status = format!("Share failed: {}", error_text(&err)),
        }
    }

    fn ask_convert(&mut self) {
        let Some(FileEntry::MediaFile { path, format, .. }) = self.selected_entry() else {
            self.status = "Only files can be converted".into();
            return;
        };
        let default = if format.as_deref() == Some("mp4") { "mkv" } else { "mp4" };
        self.modal = Some(Modal::Prompt(PromptForm {
            kind: PromptKind::ConvertFormat { path: path.clone() },
            input: default.to_string(),
        }));
    }

    fn ask_save_path(&mut self) {
        let Some(FileEntry::MediaFile { path, name, .. }) = self.selected_entry() else {
            self.status = "Only files can be downloaded".into();
            return;
        };
        let suggested = self.settings.download_dir.join(name);
        self.modal = Some(Modal::Prompt(PromptForm {
            kind: PromptKind::SavePath { path: path.clone() },
            input: suggested.to_string_lossy().into_owned(),
        }));
    }

    /// Download the selected file. With `dest` the file goes exactly
    /// there; otherwise the stream worker or the system handler is used.
    fn start_download(&mut self, dest: Option<PathBuf>) {
        if self.download.is_some() {
            self.status = "A download is already running (Esc cancels it)".into();
            return;
        }
        let Some(FileEntry::MediaFile { path, name, .. }) = self.selected_entry() else {
            return;
        };
        let path = path.clone();
        let name = name.clone();
        let cancel = CancelToken::new();
        let job_cancel = cancel.clone();

        let api = self.api.clone();
        let download_dir = self.settings.download_dir.clone();
        let tx = self.download_tx.clone();
        let handle = std::thread::spawn(move || {
            let picker = dest.map(FixedPicker::new);
            let worker = StreamWorker::new(download_dir);
            let handoff = SystemHandoff;
            let strategies = Strategies {
                picker: picker.as_ref().map(|p| p as &dyn SavePicker),
                worker: Some(&worker),
                handoff: &handoff,
            };
            let mut last: Option<Instant> = None;
            let mut progress = |received: u64, total: Option<u64>| {
                if last.is_some_and(|at| at.elapsed() < PROGRESS_EVERY) {
                    return;
                }
                last = Some(Instant::now());
                let _ = tx.send(DownloadEvent::Progress { received, total });
            };
            let result = api.download_to_disk(&path, &strategies, &mut progress, &cancel);
            let _ = tx.send(DownloadEvent::Finished(result));
        });
        self.download = Some(DownloadJob {
            name: name.clone(),
            received: 0,
            total: None,
            cancel: job_cancel,
            handle: Some(handle),
        });
        self.status = format!("Downloading {name}");
    }

    /// Cancel a running download and wait briefly so it can remove its
    /// partial output.
    pub(crate) fn shutdown(&mut self) {
        let Some(mut job) = self.download.take() else {
            return;
        };
        job.cancel.cancel();
        let Some(handle) = job.handle.take() else {
            return;
        };
        let deadline = Instant::now() + SHUTDOWN_GRACE;
        while !handle.is_finished() && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(20));
        }
        if handle.is_finished() {
            let _ = handle.join();
        } else {
            tracing::warn!(name = %job.name, "download did not stop before exit");
        }
    }

    fn cancel_download(&mut self) {
        if let Some(job) = self.download.as_ref() {
            job.cancel.cancel();
            self.status = format!("Cancelling {}", job.name);
        }
    }

    fn drain_downloads(&mut self) {
        while let Ok(ev) = self.download_rx.try_recv() {
            match ev {
                DownloadEvent::Progress { received, total } => {
                    if let Some(job) = self.download.as_mut() {
                        job.received = received;
                        job.total = total;
                    }
                }
                DownloadEvent::Finished(result) => {
                    let name = self
                        .download
                        .take()
                        .map(|job| job.name)
                        .unwrap_or_default();
                    self.status = match result {
                        Ok(DownloadOutcome::Saved { path, .. })
                        | Ok(DownloadOutcome::Streamed { path, .. }) => {
                            format!("Saved {}", path.display())
                        }
                        Ok(DownloadOutcome::HandedOff { .. }) => {
                            format!("Handed {name} to the system download handler")
                        }
                        Err(err) if err.is_cancelled() => format!("Download of {name} cancelled"),
                        Err(err) => format!("Download failed: {}", error_text(&err)),
                    };
                }
            }
        }
    }

    // --- converts ---

    fn ask_cancel_convert(&mut self) {
        let Some(task) = self.selected_convert() else {
            return;
        };
        self.modal = Some(Modal::Confirm(ConfirmDialog {
            title: "Cancel conversion".into(),
            body: format!("Cancel conversion task {}?\n\n{}", task.task_id, task.input_path),
            action: PendingAction::CancelConvert(task.task_id.clone()),
        }));
    }

    // --- subscriptions ---

    fn ask_unsubscribe(&mut self) {
        let Some(room) = self.selected_room() else {
            return;
        };
        self.modal = Some(Modal::Confirm(ConfirmDialog {
            title: "Unsubscribe".into(),
            body: format!("Unsubscribe from {} (room {})?", room.info.display_name(), room.info.room_id),
            action: PendingAction::Unsubscribe(room.info.room_id),
        }));
    }

    fn start_selected_room(&mut self) {
        let Some(room) = self.selected_room() else {
            return;
        };
        if room.recording {
            self.status = "Room is already recording".into();
            return;
        }
        let room_id = room.info.room_id;
        self.start_record(room_id);
    }

    // --- modals ---

    fn open_prompt(&mut self, kind: PromptKind) {
        self.modal = Some(Modal::Prompt(PromptForm {
            kind,
            input: String::new(),
        }));
    }

    fn submit_prompt(&mut self) {
        let Some(Modal::Prompt(form)) = self.modal.take() else {
            return;
        };
        let input = form.input.trim().to_string();
        match form.kind {
            PromptKind::AddRecord | PromptKind::Subscribe => {
                let Some(room_id) = parse_room_id(&input) else {
                    self.status = "Enter a valid room id".into();
                    self.modal = Some(Modal::Prompt(form));
                    return;
                };
                if form.kind == PromptKind::AddRecord {
                    self.start_record(room_id);
                } else {
                    self.subscribe(room_id);
                }
            }
            PromptKind::ConvertFormat { path } => {
                if input.is_empty() {
                    self.status = "Enter a target format".into();
                    self.modal = Some(Modal::Prompt(PromptForm {
                        kind: PromptKind::ConvertFormat { path },
                        input,
                    }));
                    return;
                }
                self.modal = Some(Modal::Confirm(ConfirmDialog {
                    title: "Convert".into(),
                    body: format!(
                        "Convert {path} to {input}.\n\nDelete the source file afterwards?\n\ny: convert and delete   n: convert only   Esc: cancel"
                    ),
                    action: PendingAction::Convert { path, format: input },
                }));
            }
            PromptKind::SavePath { .. } => {
                if input.is_empty() {
                    self.status = "Enter a destination".into();
                    self.modal = Some(Modal::Prompt(form));
                    return;
                }
                self.start_download(Some(PathBuf::from(input)));
            }
        }
    }

    fn subscribe(&mut self, room_id: u64) {
        match self.api.subscribe_room(room_id) {
            Ok(()) => {
                self.status = format!("Subscribed to room {room_id}");
                self.refresh(Tab::Subscriptions);
            }
            Err(err) if err.is_unauthorized() => {}
            Err(err) => self.status = subscribe_error(room_id, &err),
        }
    }

    /// Run the confirmed action. `accepted` is the y/n answer.
    pub(crate) fn resolve_confirm(&mut self, accepted: bool) {
        let Some(Modal::Confirm(dialog)) = self.modal.take() else {
            return;
        };
        match dialog.action {
            PendingAction::Convert { path, format } => {
                match self.api.enqueue_convert(&path, &format, accepted) {
                    Ok(()) => {
                        self.status = format!("Queued conversion of {path} to {format}");
                        self.refresh(Tab::Converts);
                    }
                    Err(err) if err.is_unauthorized() => {}
                    Err(err) => self.status = format!("Convert failed: {}", error_text(&err)),
                }
            }
            _ if !accepted => self.status = "Cancelled".into(),
            PendingAction::DeletePaths(paths) => self.delete_paths(&paths),
            PendingAction::CancelConvert(task_id) => match self.api.cancel_convert(&task_id) {
                Ok(()) => {
                    self.status = format!("Cancelled conversion {task_id}");
                    self.refresh(Tab::Converts);
                }
                Err(err) if err.is_unauthorized() => {}
                Err(err) => self.status = format!("Cancel failed: {}", error_text(&err)),
            },
            PendingAction::Unsubscribe(room_id) => match self.api.unsubscribe_room(room_id) {
                Ok(()) => {
                    self.status = format!("Unsubscribed from room {room_id}");
                    self.refresh(Tab::Subscriptions);
                }
                Err(err) if err.is_unauthorized() => {}
                Err(err) => self.status = unsubscribe_error(room_id, &err),
            },
        }
    }

    // --- logs ---

    fn scroll_logs_up(&mut self) {
        let max = self.logs.len().saturating_sub(1);
        self.logs_scroll = (self.logs_scroll + 1).min(max);
    }

    fn scroll_logs_down(&mut self) {
        self.logs_scroll = self.logs_scroll.saturating_sub(1);
    }

    fn push_log_line(&mut self, line: String) {
        if self.logs.len() >= LOG_CAP {
            self.logs.pop_front();
        }
        self.logs.push_back(line);
    }

    fn note_status_change(&mut self) {
        if self.last_status_snapshot == self.status {
            return;
        }
        self.last_status_snapshot = self.status.clone();
        self.push_log_line(self.status.clone());
    }

    fn drain_logs(&mut self) {
        while let Ok(line) = self.log_rx.try_recv() {
            self.push_log_line(line);
        }
    }

    // --- keys ---

    pub(crate) fn handle_key(&mut self, key: KeyEvent) {
        if key.kind != KeyEventKind::Press {
            return;
        }
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }
        match self.modal.as_mut() {
            Some(Modal::Help) => {
                if matches!(key.code, KeyCode::Esc | KeyCode::Char('h') | KeyCode::Char('?') | KeyCode::Char('q')) {
                    self.modal = None;
                }
            }
            Some(Modal::Logs) => match key.code {
                KeyCode::Esc | KeyCode::Char('l') | KeyCode::Char('q') => {
                    self.modal = None;
                    self.logs_scroll = 0;
                }
                KeyCode::Up => self.scroll_logs_up(),
                KeyCode::Down => self.scroll_logs_down(),
                _ => {}
            },
            Some(Modal::Login(form)) => match key.code {
                KeyCode::Esc => {
                    self.modal = None;
                    self.status = "Not logged in (L to log in)".into();
                }
                KeyCode::Tab | KeyCode::BackTab | KeyCode::Up | KeyCode::Down => {
                    form.focus = match form.focus {
                        LoginField::User => LoginField::Pass,
                        LoginField::Pass => LoginField::User,
                    };
                }
                KeyCode::Enter => {
                    if form.focus == LoginField::User {
                        form.focus = LoginField::Pass;
                    } else {
                        self.submit_login();
                    }
                }
                KeyCode::Backspace => {
                    match form.focus {
                        LoginField::User => form.user.pop(),
                        LoginField::Pass => form.pass.pop(),
                    };
                }
                KeyCode::Char(c) => match form.focus {
                    LoginField::User => form.user.push(c),
                    LoginField::Pass => form.pass.push(c),
                },
                _ => {}
            },
            Some(Modal::Prompt(form)) => match key.code {
                KeyCode::Esc => self.modal = None,
                KeyCode::Enter => self.submit_prompt(),
                KeyCode::Backspace => {
                    form.input.pop();
                }
                KeyCode::Char(c) => form.input.push(c),
                _ => {}
            },
            Some(Modal::Confirm(_)) => match key.code {
                KeyCode::Char('y') | KeyCode::Char('Y') => self.resolve_confirm(true),
                KeyCode::Char('n') | KeyCode::Char('N') => self.resolve_confirm(false),
                KeyCode::Esc => {
                    self.modal = None;
                    self.status = "Cancelled".into();
                }
                _ => {}
            },
            None => self.handle_main_key(key),
        }
    }

    fn handle_main_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Char('q') => self.should_quit = true,
            KeyCode::Esc => self.cancel_download(),
            KeyCode::Tab => self.activate(self.tab.next()),
            KeyCode::BackTab => self.activate(self.tab.prev()),
            KeyCode::Char(c @ '1'..='4') => {
                let idx = c as usize - '1' as usize;
                self.activate(Tab::ALL[idx]);
            }
            KeyCode::Up => self.move_selection(-1),
            KeyCode::Down => self.move_selection(1),
            KeyCode::PageUp => self.move_selection(-self.page_step()),
            KeyCode::PageDown => self.move_selection(self.page_step()),
            KeyCode::Home => self.select_edge(false),
            KeyCode::End => self.select_edge(true),
            KeyCode::Char('r') => {
                self.refresh(self.tab);
                self.status = format!("Refreshing {}", self.tab.title());
            }
            KeyCode::Char('l') => self.modal = Some(Modal::Logs),
            KeyCode::Char('h') | KeyCode::Char('?') => self.modal = Some(Modal::Help),
            KeyCode::Char('L') => self.open_login(None),
            KeyCode::Char('O') => self.logout(),
            _ => match self.tab {
                Tab::Records => self.handle_records_key(key.code),
                Tab::Files => self.handle_files_key(key.code),
                Tab::Converts => self.handle_converts_key(key.code),
                Tab::Subscriptions => self.handle_rooms_key(key.code),
            },
        }
    }

    fn handle_records_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('a') => self.open_prompt(PromptKind::AddRecord),
            KeyCode::Char('s') | KeyCode::Enter => self.toggle_selected_record(),
            _ => {}
        }
    }

    fn handle_files_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Enter | KeyCode::Right => self.open_selected_entry(),
            KeyCode::Left | KeyCode::Backspace => self.go_parent(),
            KeyCode::Char(' ') => self.toggle_mark(),
            KeyCode::Char('d') => self.start_download(None),
            KeyCode::Char('D') => self.ask_save_path(),
            KeyCode::Char('x') | KeyCode::Delete => self.ask_delete(),
            KeyCode::Char('c') => self.ask_convert(),
            KeyCode::Char('S') => self.share_selected(),
            _ => {}
        }
    }

    fn handle_converts_key(&mut self, code: KeyCode) {
        if matches!(code, KeyCode::Char('x') | KeyCode::Delete) {
            self.ask_cancel_convert();
        }
    }

    fn handle_rooms_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::Char('a') => self.open_prompt(PromptKind::Subscribe),
            KeyCode::Char('x') | KeyCode::Delete => self.ask_unsubscribe(),
            KeyCode::Char('s') => self.start_selected_room(),
            _ => {}
        }
    }
}

fn clamp_selection(state: &mut ListState, len: usize) {
    if len == 0 {
        state.select(None);
        return;
    }
    let idx = state.selected().unwrap_or(0).min(len - 1);
    state.select(Some(idx));
}

fn ui_loop(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    let tick = Duration::from_millis(50);

    loop {
        app.drain_refreshes();
        app.drain_auth();
        app.drain_downloads();
        app.drain_logs();
        terminal.draw(|f| render::draw(f, app))?;

        if event::poll(tick).context("poll terminal events")? {
            if let CEvent::Key(k) = event::read().context("read terminal event")? {
                app.handle_key(k);
            }
        }
        if app.should_quit {
            return Ok(());
        }

        app.note_status_change();
    }
}

fn init_terminal() -> Result<Terminal<CrosstermBackend<io::Stdout>>> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen).context("enter alternate screen")?;
    let backend = CrosstermBackend::new(stdout);
    let terminal = Terminal::new(backend).context("create terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>) -> Result<()> {
    disable_raw_mode().ok();
    execute!(terminal.backend_mut(), LeaveAlternateScreen).ok();
    terminal.show_cursor().ok();
    Ok(())
}
