// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use chatdesk_api::{PollHandle, ProgressFn};
use chatdesk_app::{
    AppCommand, AppEvent, AppMode, AppState, Candidate, CandidateStatus, ChatMessage,
    Connectivity, MessageSender, ReplyForm, ReportStats, StatusCounts, TabKind, UploadForm,
    UploadSummary, ValidationResult, format_phone_number, whatsapp_link,
};
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs, Wrap};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::Duration;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use tracing::debug;

const STATUS_CLEAR_AFTER: Duration = Duration::from_secs(4);
const PREVIEW_COLUMNS: [&str; 3] = ["phone_number", "name", "surname"];

/// Backend operations the console needs. The binary implements this over
/// the HTTP client; tests script it.
pub trait ConsoleRuntime {
    fn is_online(&mut self) -> bool;
    /// Forward connectivity changes as [`InternalEvent::Connectivity`].
    fn watch_connectivity(&mut self, _tx: Sender<InternalEvent>) -> Result<()> {
        Ok(())
    }
    fn list_all_chats(&mut self) -> Result<Vec<Candidate>>;
    fn list_escalated(&mut self) -> Result<Vec<Candidate>>;
    fn list_candidates(&mut self) -> Result<Vec<Candidate>>;
    fn report_stats(&mut self) -> Result<ReportStats>;
    fn chat_history(&mut self, phone_number: &str) -> Result<Vec<ChatMessage>>;
    fn send_admin_reply(&mut self, phone_number: &str, text: &str) -> Result<()>;
    fn resume_bot(&mut self, phone_number: &str) -> Result<()>;
    fn validate_roster(&mut self, path: &Path) -> Result<ValidationResult>;
    fn upload_roster(&mut self, path: &Path, progress: ProgressFn) -> Result<UploadSummary>;
    fn spawn_upload(&mut self, path: &Path, tx: Sender<InternalEvent>) -> Result<()> {
        let progress_tx = tx.clone();
        let progress: ProgressFn = Arc::new(move |percent| {
            let _ = progress_tx.send(InternalEvent::UploadProgress { percent });
        });
        let result = self
            .upload_roster(path, progress)
            .map_err(|error| error.to_string());
        tx.send(InternalEvent::UploadFinished { result })
            .map_err(|_| anyhow!("upload event channel closed"))?;
        Ok(())
    }
    /// Polls history for one candidate, tagging results with `generation`.
    fn start_history_poll(
        &mut self,
        phone_number: &str,
        generation: u64,
        tx: Sender<InternalEvent>,
    ) -> Result<PollHandle>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    ClearStatus {
        token: u64,
    },
    HistoryPolled {
        generation: u64,
        result: Result<Vec<ChatMessage>, String>,
    },
    UploadProgress {
        percent: u8,
    },
    UploadFinished {
        result: Result<UploadSummary, String>,
    },
    Connectivity {
        online: bool,
    },
}

#[derive(Debug, Default)]
struct UploadUiState {
    form: UploadForm,
    validation: Option<ValidationResult>,
    validated_path: Option<PathBuf>,
    /// Percent sent while an upload is running.
    progress: Option<u8>,
    summary: Option<UploadSummary>,
}

#[derive(Debug, Default)]
struct CandidateList {
    candidates: Vec<Candidate>,
    cursor: usize,
    loaded: bool,
}

impl CandidateList {
    fn replace(&mut self, candidates: Vec<Candidate>) {
        self.candidates = candidates;
        self.cursor = self.cursor.min(self.candidates.len().saturating_sub(1));
        self.loaded = true;
    }

    fn move_cursor(&mut self, delta: isize) {
        if self.candidates.is_empty() {
            self.cursor = 0;
            return;
        }
        let last = self.candidates.len() as isize - 1;
        self.cursor = (self.cursor as isize + delta).clamp(0, last) as usize;
    }

    fn selected(&self) -> Option<&Candidate> {
        self.candidates.get(self.cursor)
    }
}

#[derive(Debug, Default)]
struct ChatPane {
    candidate: Option<Candidate>,
    messages: Vec<ChatMessage>,
    reply: ReplyForm,
    poll: Option<PollHandle>,
    /// Bumped for every new selection; late poll results from older
    /// generations are dropped.
    generation: u64,
    poll_error: Option<String>,
}

impl ChatPane {
    fn stop_poll(&mut self) {
        if let Some(mut poll) = self.poll.take() {
            poll.stop();
        }
    }

    fn close(&mut self) {
        self.stop_poll();
        self.candidate = None;
        self.messages.clear();
        self.reply = ReplyForm::default();
        self.poll_error = None;
    }

    fn accepts(&self, generation: u64) -> bool {
        self.poll
            .as_ref()
            .is_some_and(|poll| poll.is_active() && poll.generation() == generation)
    }
}

#[derive(Debug, Default)]
struct ReportsUiState {
    list: CandidateList,
    counts: StatusCounts,
    stats: Option<ReportStats>,
    stats_error: Option<String>,
}

/// Backend call deferred until the next frame has been drawn, so its
/// "in progress" status is on screen while the call blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingWork {
    Refresh { announce: bool },
    OpenChat,
    SendReply,
    ResumeBot,
}

#[derive(Debug, Default)]
struct ViewData {
    upload: UploadUiState,
    escalation: CandidateList,
    all_chats: CandidateList,
    reports: ReportsUiState,
    chat: ChatPane,
    pending: Option<PendingWork>,
    status_token: u64,
    help_visible: bool,
}

impl ViewData {
    fn list_mut(&mut self, tab: TabKind) -> Option<&mut CandidateList> {
        match tab {
            TabKind::Escalation => Some(&mut self.escalation),
            TabKind::AllChats => Some(&mut self.all_chats),
            TabKind::Reports => Some(&mut self.reports.list),
            TabKind::Upload => None,
        }
    }

    fn list(&self, tab: TabKind) -> Option<&CandidateList> {
        match tab {
            TabKind::Escalation => Some(&self.escalation),
            TabKind::AllChats => Some(&self.all_chats),
            TabKind::Reports => Some(&self.reports.list),
            TabKind::Upload => None,
        }
    }
}

pub fn run_app<R: ConsoleRuntime>(state: &mut AppState, runtime: &mut R) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen).context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::default();
    let (internal_tx, internal_rx) = mpsc::channel();

    if !runtime.is_online() {
        state.connectivity = Connectivity::Offline;
    }
    if let Err(error) = runtime.watch_connectivity(internal_tx.clone()) {
        emit_status(
            state,
            &mut view_data,
            &internal_tx,
            format!("connectivity monitor unavailable: {error}"),
        );
    }
    queue_refresh(state, &mut view_data, &internal_tx, false);

    let mut result = Ok(());
    loop {
        process_internal_events(state, &mut view_data, &internal_tx, &internal_rx);

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }
        if run_pending(state, runtime, &mut view_data, &internal_tx) {
            continue;
        }

        let has_event = match event::poll(Duration::from_millis(120)).context("poll event") {
            Ok(has_event) => has_event,
            Err(error) => {
                result = Err(error);
                break;
            }
        };
        if has_event {
            match event::read().context("read event") {
                Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                    if handle_key_event(state, runtime, &mut view_data, &internal_tx, key) {
                        break;
                    }
                }
                Ok(_) => {}
                Err(error) => {
                    result = Err(error);
                    break;
                }
            }
        }
    }

    view_data.chat.stop_poll();
    disable_raw_mode().context("disable raw mode")?;
    execute!(io::stdout(), terminal::LeaveAlternateScreen).context("leave alternate screen")?;
    result
}

fn process_internal_events(
    state: &mut AppState,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token } if token == view_data.status_token => {
                state.dispatch(AppCommand::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::HistoryPolled { generation, result } => {
                if !view_data.chat.accepts(generation) {
                    debug!(generation, "dropping stale history poll");
                    continue;
                }
                match result {
                    Ok(messages) => {
                        view_data.chat.messages = messages;
                        view_data.chat.poll_error = None;
                    }
                    Err(error) => view_data.chat.poll_error = Some(error),
                }
            }
            InternalEvent::UploadProgress { percent } => {
                if view_data.upload.progress.is_some() {
                    view_data.upload.progress = Some(percent);
                }
            }
            InternalEvent::UploadFinished { result } => {
                view_data.upload.progress = None;
                match result {
                    Ok(summary) => {
                        let headline = summary.headline();
                        view_data.upload.summary = Some(summary);
                        view_data.upload.form = UploadForm::default();
                        view_data.upload.validation = None;
                        view_data.upload.validated_path = None;
                        emit_status(state, view_data, tx, format!("upload complete: {headline}"));
                    }
                    Err(error) => {
                        emit_status(state, view_data, tx, format!("upload failed: {error}"));
                    }
                }
            }
            InternalEvent::Connectivity { online } => {
                let connectivity = if online {
                    Connectivity::Online
                } else {
                    Connectivity::Offline
                };
                let events = state.dispatch(AppCommand::SetConnectivity(connectivity));
                if events
                    .iter()
                    .any(|event| matches!(event, AppEvent::StatusUpdated(_)))
                {
                    bump_status_token(view_data, tx);
                }
            }
        }
    }
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(STATUS_CLEAR_AFTER);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn bump_status_token(view_data: &mut ViewData, internal_tx: &Sender<InternalEvent>) {
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token);
}

fn emit_status(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.dispatch(AppCommand::SetStatus(message.into()));
    bump_status_token(view_data, internal_tx);
}

/// Returns true when the console should exit.
fn handle_key_event<R: ConsoleRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    if ctrl && key.code == KeyCode::Char('q') {
        return true;
    }

    if view_data.help_visible {
        if key.code == KeyCode::Esc || key.code == KeyCode::Char('?') {
            view_data.help_visible = false;
        }
        return false;
    }

    if ctrl && key.code == KeyCode::Char('u') && state.active_tab == TabKind::Upload {
        if state.mode == AppMode::Input {
            state.dispatch(AppCommand::ExitToNav);
        }
        start_upload(state, runtime, view_data, internal_tx);
        return false;
    }
    if ctrl && key.code == KeyCode::Char('r') && state.active_tab == TabKind::Escalation {
        resume_bot(state, view_data, internal_tx);
        return false;
    }

    if state.mode == AppMode::Input {
        handle_input_key(state, runtime, view_data, internal_tx, key);
        return false;
    }

    match key.code {
        KeyCode::Tab | KeyCode::Char('f') => {
            change_tab(state, view_data, internal_tx, AppCommand::NextTab);
        }
        KeyCode::BackTab | KeyCode::Char('b') => {
            change_tab(state, view_data, internal_tx, AppCommand::PrevTab);
        }
        KeyCode::Char(digit @ '1'..='4') => {
            let index = (digit as usize) - ('1' as usize);
            let tab = TabKind::ALL[index];
            change_tab(state, view_data, internal_tx, AppCommand::SelectTab(tab));
        }
        KeyCode::Char('?') => view_data.help_visible = true,
        KeyCode::Char('r') => queue_refresh(state, view_data, internal_tx, true),
        KeyCode::Char('j') | KeyCode::Down => move_cursor(state, view_data, 1),
        KeyCode::Char('k') | KeyCode::Up => move_cursor(state, view_data, -1),
        KeyCode::Char('g') | KeyCode::Home => move_cursor(state, view_data, isize::MIN / 2),
        KeyCode::Char('G') | KeyCode::End => move_cursor(state, view_data, isize::MAX / 2),
        KeyCode::Enter => handle_nav_enter(state, view_data, internal_tx),
        KeyCode::Char('i') => begin_input(state, view_data, internal_tx),
        KeyCode::Esc if state.active_tab.has_chat_view() => view_data.chat.close(),
        _ => {}
    }
    false
}

fn handle_input_key<R: ConsoleRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let buffer = match state.active_tab {
        TabKind::Upload => &mut view_data.upload.form.path_input,
        tab if tab.has_chat_view() => &mut view_data.chat.reply.text,
        _ => {
            state.dispatch(AppCommand::ExitToNav);
            return;
        }
    };
    match key.code {
        KeyCode::Esc => {
            state.dispatch(AppCommand::ExitToNav);
        }
        KeyCode::Backspace => {
            buffer.pop();
        }
        KeyCode::Enter => {
            if state.active_tab == TabKind::Upload {
                state.dispatch(AppCommand::ExitToNav);
                validate_upload(state, runtime, view_data, internal_tx);
            } else {
                send_reply(state, view_data, internal_tx);
            }
        }
        KeyCode::Char(ch) if !key.modifiers.contains(KeyModifiers::CONTROL) => {
            buffer.push(ch);
        }
        _ => {}
    }
}

fn change_tab(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    command: AppCommand,
) {
    let events = state.dispatch(command);
    if events
        .iter()
        .any(|event| matches!(event, AppEvent::TabChanged(_)))
    {
        view_data.chat.close();
        queue_refresh(state, view_data, internal_tx, false);
    }
}

fn queue_work(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    work: PendingWork,
    message: impl Into<String>,
) {
    view_data.pending = Some(work);
    emit_status(state, view_data, internal_tx, message);
}

fn queue_refresh(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    announce: bool,
) {
    let tab = state.active_tab;
    if tab == TabKind::Upload {
        if announce {
            emit_status(state, view_data, internal_tx, format!("{} refreshed", tab.label()));
        }
        return;
    }
    queue_work(
        state,
        view_data,
        internal_tx,
        PendingWork::Refresh { announce },
        format!("loading {}...", tab.label()),
    );
}

/// Runs deferred backend work, if any. Returns true when something ran.
fn run_pending<R: ConsoleRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) -> bool {
    let Some(work) = view_data.pending.take() else {
        return false;
    };
    match work {
        PendingWork::Refresh { announce } => {
            if !refresh_tab(state, runtime, view_data, internal_tx) {
                return true;
            }
            if announce {
                let message = format!("{} refreshed", state.active_tab.label());
                emit_status(state, view_data, internal_tx, message);
            } else {
                state.dispatch(AppCommand::ClearStatus);
            }
        }
        PendingWork::OpenChat => open_chat(state, runtime, view_data, internal_tx),
        PendingWork::SendReply => deliver_reply(state, runtime, view_data, internal_tx),
        PendingWork::ResumeBot => deliver_resume(state, runtime, view_data, internal_tx),
    }
    true
}

/// Returns false when the list failed to load; the error is already shown.
fn refresh_tab<R: ConsoleRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) -> bool {
    let tab = state.active_tab;
    let loaded = match tab {
        TabKind::Upload => return true,
        TabKind::Escalation => runtime.list_escalated().context("load escalations"),
        TabKind::AllChats => runtime.list_all_chats().context("load chats"),
        TabKind::Reports => runtime.list_candidates().context("load candidates"),
    };
    let ok = match loaded {
        Ok(candidates) => {
            if tab == TabKind::Reports {
                view_data.reports.counts = StatusCounts::from_candidates(&candidates);
            }
            if let Some(list) = view_data.list_mut(tab) {
                list.replace(candidates);
            }
            true
        }
        Err(error) => {
            emit_status(state, view_data, internal_tx, format!("{error:#}"));
            false
        }
    };

    if tab == TabKind::Reports {
        match runtime.report_stats() {
            Ok(stats) => {
                view_data.reports.stats = Some(stats);
                view_data.reports.stats_error = None;
            }
            Err(error) => {
                debug!(%error, "report stats unavailable");
                view_data.reports.stats = None;
                view_data.reports.stats_error = Some(error.to_string());
            }
        }
    }
    ok
}

fn move_cursor(state: &AppState, view_data: &mut ViewData, delta: isize) {
    if let Some(list) = view_data.list_mut(state.active_tab) {
        list.move_cursor(delta);
    }
}

fn handle_nav_enter(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    match state.active_tab {
        TabKind::Upload => begin_input(state, view_data, internal_tx),
        tab if tab.has_chat_view() => select_candidate(state, view_data, internal_tx),
        _ => {}
    }
}

fn begin_input(state: &mut AppState, view_data: &mut ViewData, internal_tx: &Sender<InternalEvent>) {
    match state.active_tab {
        TabKind::Upload => {
            if view_data.upload.progress.is_some() {
                emit_status(state, view_data, internal_tx, "upload in progress");
                return;
            }
            state.dispatch(AppCommand::BeginInput);
        }
        tab if tab.has_chat_view() => {
            if view_data.chat.candidate.is_none() {
                emit_status(
                    state,
                    view_data,
                    internal_tx,
                    "select a candidate before replying",
                );
                return;
            }
            state.dispatch(AppCommand::BeginInput);
        }
        _ => {}
    }
}

fn select_candidate(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(candidate) = view_data
        .list(state.active_tab)
        .and_then(CandidateList::selected)
        .cloned()
    else {
        emit_status(state, view_data, internal_tx, "no candidate to select");
        return;
    };

    // At most one poll per chat view: stop the old one before starting.
    view_data.chat.close();
    view_data.chat.generation = view_data.chat.generation.saturating_add(1);
    view_data.chat.reply = ReplyForm::for_candidate(&candidate);
    let message = format!("loading chat with {}...", candidate.display_name());
    view_data.chat.candidate = Some(candidate);
    queue_work(state, view_data, internal_tx, PendingWork::OpenChat, message);
}

fn open_chat<R: ConsoleRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(phone) = view_data
        .chat
        .candidate
        .as_ref()
        .map(|candidate| candidate.phone_number.clone())
    else {
        return;
    };

    match runtime.chat_history(&phone) {
        Ok(messages) => {
            view_data.chat.messages = messages;
            state.dispatch(AppCommand::ClearStatus);
        }
        Err(error) => {
            emit_status(state, view_data, internal_tx, format!("load chat failed: {error}"));
        }
    }
    match runtime.start_history_poll(&phone, view_data.chat.generation, internal_tx.clone()) {
        Ok(handle) => view_data.chat.poll = Some(handle),
        Err(error) => {
            emit_status(state, view_data, internal_tx, format!("polling unavailable: {error}"));
        }
    }
}

fn send_reply(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if let Err(error) = view_data.chat.reply.validate().map(|_| ()) {
        emit_status(state, view_data, internal_tx, error.to_string());
        return;
    }
    if !state.is_online() {
        emit_status(
            state,
            view_data,
            internal_tx,
            "no internet connection; check your network",
        );
        return;
    }
    queue_work(
        state,
        view_data,
        internal_tx,
        PendingWork::SendReply,
        "sending reply...",
    );
}

fn deliver_reply<R: ConsoleRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Ok((phone, text)) = view_data
        .chat
        .reply
        .validate()
        .map(|(phone, text)| (phone.to_owned(), text.to_owned()))
    else {
        return;
    };

    match runtime.send_admin_reply(&phone, &text) {
        Ok(()) => {
            view_data.chat.reply.text.clear();
            state.dispatch(AppCommand::ExitToNav);
            emit_status(state, view_data, internal_tx, "reply sent");
            if let Ok(messages) = runtime.chat_history(&phone) {
                view_data.chat.messages = messages;
            }
        }
        Err(error) => {
            emit_status(state, view_data, internal_tx, format!("reply failed: {error}"));
        }
    }
}

fn resume_bot(
    state: &mut AppState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(name) = view_data
        .chat
        .candidate
        .as_ref()
        .map(|candidate| candidate.display_name().to_owned())
    else {
        emit_status(state, view_data, internal_tx, "select a candidate first");
        return;
    };
    if !state.is_online() {
        emit_status(
            state,
            view_data,
            internal_tx,
            "no internet connection; check your network",
        );
        return;
    }
    let message = format!("resuming bot for {name}...");
    queue_work(state, view_data, internal_tx, PendingWork::ResumeBot, message);
}

fn deliver_resume<R: ConsoleRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(candidate) = view_data.chat.candidate.clone() else {
        return;
    };
    match runtime.resume_bot(&candidate.phone_number) {
        Ok(()) => {
            emit_status(
                state,
                view_data,
                internal_tx,
                format!("bot resumed for {}", candidate.display_name()),
            );
            match runtime.list_escalated() {
                Ok(candidates) => view_data.escalation.replace(candidates),
                Err(error) => {
                    debug!(%error, "escalation reload failed after resume");
                }
            }
        }
        Err(error) => {
            emit_status(state, view_data, internal_tx, format!("resume failed: {error}"));
        }
    }
}

fn validate_upload<R: ConsoleRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    view_data.upload.validation = None;
    view_data.upload.validated_path = None;
    view_data.upload.summary = None;
    let Some(path) = view_data.upload.form.path() else {
        emit_status(state, view_data, internal_tx, "enter a roster file path");
        return;
    };
    match runtime.validate_roster(&path) {
        Ok(result) => {
            let message = if result.is_valid() {
                "file validated successfully"
            } else {
                "file validation failed"
            };
            view_data.upload.validation = Some(result);
            view_data.upload.validated_path = Some(path);
            emit_status(state, view_data, internal_tx, message);
        }
        Err(error) => emit_status(state, view_data, internal_tx, error.to_string()),
    }
}

fn start_upload<R: ConsoleRuntime>(
    state: &mut AppState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    if view_data.upload.progress.is_some() {
        emit_status(state, view_data, internal_tx, "upload already in progress");
        return;
    }
    let current = view_data.upload.form.path();
    let Some(path) = view_data
        .upload
        .validated_path
        .clone()
        .filter(|validated| current.as_ref() == Some(validated))
    else {
        emit_status(
            state,
            view_data,
            internal_tx,
            "select and validate a file before uploading",
        );
        return;
    };
    if !view_data
        .upload
        .validation
        .as_ref()
        .is_some_and(ValidationResult::is_valid)
    {
        emit_status(
            state,
            view_data,
            internal_tx,
            "fix validation errors before uploading",
        );
        return;
    }
    if !state.is_online() {
        emit_status(
            state,
            view_data,
            internal_tx,
            "no internet connection; check your network",
        );
        return;
    }

    view_data.upload.progress = Some(0);
    view_data.upload.summary = None;
    if let Err(error) = runtime.spawn_upload(&path, internal_tx.clone()) {
        view_data.upload.progress = None;
        emit_status(state, view_data, internal_tx, format!("upload failed: {error}"));
    }
}

fn tab_title(tab: TabKind, view_data: &ViewData) -> String {
    match view_data.list(tab) {
        Some(list) if list.loaded => format!("{} ({})", tab.label(), list.candidates.len()),
        _ => tab.label().to_owned(),
    }
}

fn render(frame: &mut ratatui::Frame<'_>, state: &AppState, view_data: &ViewData) {
    let offline_rows = if state.is_online() { 0 } else { 1 };
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(offline_rows),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let selected = TabKind::ALL
        .iter()
        .position(|tab| *tab == state.active_tab)
        .unwrap_or(0);
    let titles = TabKind::ALL
        .iter()
        .map(|tab| tab_title(*tab, view_data))
        .collect::<Vec<String>>();
    let tabs = Tabs::new(titles)
        .block(Block::default().title("chatdesk").borders(Borders::ALL))
        .style(Style::default().fg(Color::White))
        .highlight_style(
            Style::default()
                .fg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
        )
        .select(selected);
    frame.render_widget(tabs, layout[0]);

    if !state.is_online() {
        let banner = Paragraph::new(offline_banner_text())
            .style(Style::default().fg(Color::White).bg(Color::Red));
        frame.render_widget(banner, layout[1]);
    }

    match state.active_tab {
        TabKind::Upload => {
            let body = Paragraph::new(render_upload_text(state, view_data))
                .wrap(Wrap { trim: false })
                .block(Block::default().borders(Borders::ALL).title("upload roster"));
            frame.render_widget(body, layout[2]);
        }
        TabKind::Escalation | TabKind::AllChats => {
            render_chat_tab(frame, layout[2], state, view_data);
        }
        TabKind::Reports => render_reports(frame, layout[2], view_data),
    }

    let status = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(Color::Yellow))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, layout[3]);

    if view_data.help_visible {
        let area = centered_rect(70, 70, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn render_chat_tab(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    state: &AppState,
    view_data: &ViewData,
) {
    let columns = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(35), Constraint::Percentage(65)])
        .split(area);

    let title = match state.active_tab {
        TabKind::Escalation => "escalated",
        _ => "candidates",
    };
    if let Some(list) = view_data.list(state.active_tab) {
        render_candidate_table(frame, columns[0], title, list, false);
    }

    let text = render_chat_text(&view_data.chat, state.mode);
    let inner_height = columns[1].height.saturating_sub(2) as usize;
    let scroll = text.lines().count().saturating_sub(inner_height) as u16;
    let chat = Paragraph::new(text)
        .scroll((scroll, 0))
        .block(Block::default().borders(Borders::ALL).title("conversation"));
    frame.render_widget(chat, columns[1]);
}

fn render_candidate_table(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    title: &str,
    list: &CandidateList,
    with_details: bool,
) {
    let header_labels: &[&str] = if with_details {
        &["name", "phone", "status", "last message", "updated"]
    } else {
        &["name", "phone", "status"]
    };
    let header = Row::new(header_labels.iter().map(|label| Cell::from(*label)))
        .style(Style::default().add_modifier(Modifier::BOLD));

    let rows = list.candidates.iter().enumerate().map(|(index, candidate)| {
        let mut cells = vec![
            Cell::from(candidate.display_name().to_owned()),
            Cell::from(format_phone_number(&candidate.phone_number)),
            Cell::from(status_badge(candidate.status_kind()))
                .style(Style::default().fg(status_color(candidate.status_kind()))),
        ];
        if with_details {
            cells.push(Cell::from(
                candidate.last_message.clone().unwrap_or_default(),
            ));
            cells.push(Cell::from(candidate.last_updated_label()));
        }
        let style = if index == list.cursor {
            Style::default().add_modifier(Modifier::REVERSED)
        } else {
            Style::default()
        };
        Row::new(cells).style(style)
    });

    let widths: Vec<Constraint> = if with_details {
        vec![
            Constraint::Percentage(20),
            Constraint::Percentage(18),
            Constraint::Percentage(12),
            Constraint::Percentage(32),
            Constraint::Percentage(18),
        ]
    } else {
        vec![
            Constraint::Percentage(40),
            Constraint::Percentage(40),
            Constraint::Percentage(20),
        ]
    };

    let block_title = if list.loaded && list.candidates.is_empty() {
        format!("{title}: none found")
    } else {
        title.to_owned()
    };
    let table = Table::new(rows, widths)
        .header(header)
        .block(Block::default().borders(Borders::ALL).title(block_title));
    frame.render_widget(table, area);
}

fn render_reports(frame: &mut ratatui::Frame<'_>, area: Rect, view_data: &ViewData) {
    let stats_text = render_reports_text(&view_data.reports);
    let stats_height = (stats_text.lines().count() as u16).saturating_add(2).min(area.height / 2);
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Length(stats_height), Constraint::Min(3)])
        .split(area);

    let stats = Paragraph::new(stats_text)
        .wrap(Wrap { trim: false })
        .block(Block::default().borders(Borders::ALL).title("overview"));
    frame.render_widget(stats, rows[0]);
    render_candidate_table(frame, rows[1], "candidates", &view_data.reports.list, true);
}

fn render_upload_text(state: &AppState, view_data: &ViewData) -> String {
    let upload = &view_data.upload;
    let editing = state.mode == AppMode::Input && state.active_tab == TabKind::Upload;
    let mut lines = Vec::new();

    let cursor = if editing { "_" } else { "" };
    let path = if upload.form.path_input.is_empty() && !editing {
        "(none; press enter to type a path)".to_owned()
    } else {
        format!("{}{cursor}", upload.form.path_input)
    };
    lines.push(format!("file: {path}"));
    lines.push("accepted: .xlsx .xls .csv up to 10MB".to_owned());
    lines.push("required columns: phone_number, name, surname".to_owned());

    if let Some(validation) = &upload.validation {
        lines.push(String::new());
        if validation.is_valid() {
            lines.push("validation: passed".to_owned());
        } else {
            lines.push("validation: failed".to_owned());
        }
        for error in &validation.errors {
            lines.push(format!("  error: {error}"));
        }
        for warning in &validation.warnings {
            lines.push(format!("  warning: {warning}"));
        }
        if let Some(preview) = &validation.preview
            && !preview.is_empty()
        {
            lines.push(String::new());
            lines.push(format!("preview (first {} rows):", preview.len()));
            lines.push(format!("  {}", PREVIEW_COLUMNS.join(" | ")));
            for row in preview {
                let cells: Vec<String> = PREVIEW_COLUMNS
                    .iter()
                    .map(|column| {
                        let text = row.text(column);
                        if text.trim().is_empty() {
                            "-".to_owned()
                        } else {
                            text
                        }
                    })
                    .collect();
                lines.push(format!("  {}", cells.join(" | ")));
            }
        }
    }

    if let Some(percent) = upload.progress {
        lines.push(String::new());
        lines.push(format!("uploading... {percent}%"));
    }

    if let Some(summary) = &upload.summary {
        lines.push(String::new());
        lines.push(summary.headline());
        let failed = summary.failed_entries();
        if !failed.is_empty() {
            lines.push("failed entries:".to_owned());
            for entry in failed {
                lines.push(format!("  {entry}"));
            }
        }
    }
    lines.join("\n")
}

fn render_chat_text(chat: &ChatPane, mode: AppMode) -> String {
    let Some(candidate) = &chat.candidate else {
        return "select a candidate and press enter to open the conversation".to_owned();
    };
    let mut lines = vec![
        format!(
            "{}  {}  [{}]",
            candidate.display_name(),
            format_phone_number(&candidate.phone_number),
            candidate.status_kind().as_str()
        ),
        whatsapp_link(&candidate.phone_number),
        String::new(),
    ];

    if chat.messages.is_empty() {
        lines.push("no messages yet".to_owned());
    }
    for message in &chat.messages {
        let at = message
            .timestamp
            .as_deref()
            .map(timestamp_label)
            .map(|label| format!("{label} "))
            .unwrap_or_default();
        lines.push(format!("{at}{}: {}", sender_label(message.from), message.text));
    }
    if let Some(error) = &chat.poll_error {
        lines.push(format!("(refresh failed: {error})"));
    }

    lines.push(String::new());
    let reply = if mode == AppMode::Input {
        format!("reply> {}_", chat.reply.text)
    } else if chat.reply.text.is_empty() {
        "reply> (press i to type)".to_owned()
    } else {
        format!("reply> {}", chat.reply.text)
    };
    lines.push(reply);
    lines.join("\n")
}

fn render_reports_text(reports: &ReportsUiState) -> String {
    let counts = reports.counts;
    let mut lines = vec![format!(
        "total {} | escalated {} | completed {} | active {}",
        counts.total, counts.escalated, counts.completed, counts.active
    )];
    match (&reports.stats, &reports.stats_error) {
        (Some(stats), _) => {
            for (title, section) in stats.sections() {
                if section.is_empty() {
                    continue;
                }
                let entries: Vec<String> = section
                    .iter()
                    .map(|(key, value)| format!("{}: {}", key.replace('_', " "), stat_value(value)))
                    .collect();
                lines.push(format!("{title}: {}", entries.join(", ")));
            }
        }
        (None, Some(_)) => lines.push("report statistics unavailable".to_owned()),
        (None, None) => {}
    }
    lines.join("\n")
}

fn stat_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn sender_label(sender: MessageSender) -> &'static str {
    sender.label()
}

fn timestamp_label(raw: &str) -> String {
    match OffsetDateTime::parse(raw.trim(), &Rfc3339) {
        Ok(at) => at
            .format(&format_description!("[hour]:[minute]"))
            .unwrap_or_else(|_| raw.to_owned()),
        Err(_) => raw.to_owned(),
    }
}

fn status_badge(status: CandidateStatus) -> &'static str {
    status.as_str()
}

fn status_color(status: CandidateStatus) -> Color {
    match status {
        CandidateStatus::Escalated => Color::Red,
        CandidateStatus::Completed => Color::Green,
        CandidateStatus::Active => Color::Cyan,
        CandidateStatus::Other => Color::Gray,
    }
}

fn offline_banner_text() -> &'static str {
    "offline: no internet connection; requests are paused until the network returns"
}

fn status_text(state: &AppState, view_data: &ViewData) -> String {
    let mode = match state.mode {
        AppMode::Nav => "NAV",
        AppMode::Input => "INPUT",
    };
    let hints = match (state.mode, state.active_tab) {
        (AppMode::Input, TabKind::Upload) => "enter validate | esc cancel | ctrl+u upload",
        (AppMode::Input, _) => "enter send | esc cancel",
        (AppMode::Nav, TabKind::Upload) => {
            if view_data.upload.progress.is_some() {
                "uploading | tab next | ctrl+q"
            } else {
                "enter/i path | ctrl+u upload | tab next | ? help | ctrl+q"
            }
        }
        (AppMode::Nav, TabKind::Escalation) => {
            "j/k move | enter open | i reply | ctrl+r resume bot | r refresh | ? help | ctrl+q"
        }
        (AppMode::Nav, TabKind::AllChats) => {
            "j/k move | enter open | i reply | r refresh | ? help | ctrl+q"
        }
        (AppMode::Nav, TabKind::Reports) => "j/k move | r refresh | tab next | ? help | ctrl+q",
    };
    match &state.status_line {
        Some(status) => format!("{mode} | {status} | {hints}"),
        None => format!("{mode} | {hints}"),
    }
}

fn help_overlay_text() -> &'static str {
    "tab/f  next tab\n\
     shift+tab/b  previous tab\n\
     1-4  jump to tab\n\
     j/k  move selection\n\
     g/G  first/last row\n\
     enter  open conversation or edit file path\n\
     i  type a reply or file path\n\
     esc  leave input or close conversation\n\
     r  refresh current tab\n\
     ctrl+u  upload validated roster\n\
     ctrl+r  resume bot for selected candidate\n\
     ?  toggle help\n\
     ctrl+q  quit"
}

fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

#[cfg(test)]
mod tests {
    use super::{
        ConsoleRuntime, InternalEvent, ViewData, handle_key_event, help_overlay_text,
        render_chat_text, render_reports_text, render_upload_text, run_pending,
        status_text,
    };
    use anyhow::{Result, anyhow};
    use chatdesk_api::{PollHandle, ProgressFn, poll};
    use chatdesk_app::{
        AppMode, AppState, Candidate, ChatMessage, MessageSender, ReportStats, StatusCounts,
        TabKind, UploadSummary, ValidationResult,
    };
    use chatdesk_testkit::CandidateFaker;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
    use std::path::{Path, PathBuf};
    use std::sync::mpsc;
    use std::time::Duration;

    #[derive(Debug, Default)]
    struct TestRuntime {
        escalated: Vec<Candidate>,
        all_chats: Vec<Candidate>,
        candidates: Vec<Candidate>,
        stats: Option<ReportStats>,
        history: Vec<ChatMessage>,
        validation: ValidationResult,
        upload_result: Option<UploadSummary>,
        sent_replies: Vec<(String, String)>,
        resumed: Vec<String>,
        validated_paths: Vec<PathBuf>,
        uploaded_paths: Vec<PathBuf>,
        poll_generations: Vec<u64>,
    }

    impl ConsoleRuntime for TestRuntime {
        fn is_online(&mut self) -> bool {
            true
        }

        fn list_all_chats(&mut self) -> Result<Vec<Candidate>> {
            Ok(self.all_chats.clone())
        }

        fn list_escalated(&mut self) -> Result<Vec<Candidate>> {
            Ok(self.escalated.clone())
        }

        fn list_candidates(&mut self) -> Result<Vec<Candidate>> {
            Ok(self.candidates.clone())
        }

        fn report_stats(&mut self) -> Result<ReportStats> {
            self.stats
                .clone()
                .ok_or_else(|| anyhow!("server error (500); please try again later"))
        }

        fn chat_history(&mut self, _phone_number: &str) -> Result<Vec<ChatMessage>> {
            Ok(self.history.clone())
        }

        fn send_admin_reply(&mut self, phone_number: &str, text: &str) -> Result<()> {
            self.sent_replies
                .push((phone_number.to_owned(), text.to_owned()));
            Ok(())
        }

        fn resume_bot(&mut self, phone_number: &str) -> Result<()> {
            self.resumed.push(phone_number.to_owned());
            self.escalated
                .retain(|candidate| candidate.phone_number != phone_number);
            Ok(())
        }

        fn validate_roster(&mut self, path: &Path) -> Result<ValidationResult> {
            self.validated_paths.push(path.to_path_buf());
            Ok(self.validation.clone())
        }

        fn upload_roster(&mut self, path: &Path, progress: ProgressFn) -> Result<UploadSummary> {
            self.uploaded_paths.push(path.to_path_buf());
            progress(50);
            progress(100);
            self.upload_result
                .clone()
                .ok_or_else(|| anyhow!("file too large; select a smaller file"))
        }

        fn start_history_poll(
            &mut self,
            _phone_number: &str,
            generation: u64,
            _tx: mpsc::Sender<InternalEvent>,
        ) -> Result<PollHandle> {
            self.poll_generations.push(generation);
            Ok(poll::spawn(
                generation,
                Duration::from_secs(3600),
                || (),
                |_| true,
            ))
        }
    }

    fn candidate(name: &str, phone: &str, status: &str) -> Candidate {
        Candidate {
            name: name.to_owned(),
            phone_number: phone.to_owned(),
            status: status.to_owned(),
            ..Candidate::default()
        }
    }

    fn message(from: MessageSender, text: &str) -> ChatMessage {
        ChatMessage {
            from,
            text: text.to_owned(),
            timestamp: None,
        }
    }

    fn internal_channel() -> (
        mpsc::Sender<super::InternalEvent>,
        mpsc::Receiver<super::InternalEvent>,
    ) {
        mpsc::channel()
    }

    fn pump_internal(
        state: &mut AppState,
        view_data: &mut ViewData,
        tx: &mpsc::Sender<super::InternalEvent>,
        rx: &mpsc::Receiver<super::InternalEvent>,
    ) {
        super::process_internal_events(state, view_data, tx, rx);
    }

    fn press(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn ctrl(ch: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(ch), KeyModifiers::CONTROL)
    }

    fn run_key_script(
        state: &mut AppState,
        runtime: &mut TestRuntime,
        view_data: &mut ViewData,
        tx: &mpsc::Sender<super::InternalEvent>,
        rx: &mpsc::Receiver<super::InternalEvent>,
        keys: &[KeyEvent],
    ) {
        for key in keys {
            let _ = handle_key_event(state, runtime, view_data, tx, *key);
            run_pending(state, runtime, view_data, tx);
            pump_internal(state, view_data, tx, rx);
        }
    }

    fn type_text(text: &str) -> Vec<KeyEvent> {
        text.chars().map(|ch| press(KeyCode::Char(ch))).collect()
    }

    fn escalation_runtime() -> TestRuntime {
        let mut faker = CandidateFaker::new(11);
        TestRuntime {
            escalated: vec![
                faker.candidate_with_status("escalated"),
                faker.candidate_with_status("escalated"),
            ],
            history: faker.conversation(1),
            ..TestRuntime::default()
        }
    }

    #[test]
    fn ctrl_q_quits_from_any_mode() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        let (tx, _rx) = internal_channel();

        state.dispatch(chatdesk_app::AppCommand::BeginInput);
        assert!(handle_key_event(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            ctrl('q')
        ));
    }

    #[test]
    fn tab_keys_cycle_and_load_lists() {
        let mut state = AppState::default();
        let mut runtime = escalation_runtime();
        let mut view_data = ViewData::default();
        let (tx, rx) = internal_channel();

        run_key_script(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            &rx,
            &[press(KeyCode::Tab)],
        );
        assert_eq!(state.active_tab, TabKind::Escalation);
        assert!(view_data.escalation.loaded);
        assert_eq!(view_data.escalation.candidates.len(), 2);

        run_key_script(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            &rx,
            &[press(KeyCode::BackTab), press(KeyCode::Char('4'))],
        );
        assert_eq!(state.active_tab, TabKind::AllChats);
        assert!(view_data.all_chats.loaded);
        assert!(view_data.all_chats.candidates.is_empty());
    }

    #[test]
    fn selecting_candidates_bumps_poll_generation() {
        let mut state = AppState {
            active_tab: TabKind::Escalation,
            ..AppState::default()
        };
        let mut runtime = escalation_runtime();
        let mut view_data = ViewData::default();
        let (tx, rx) = internal_channel();

        run_key_script(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            &rx,
            &[
                press(KeyCode::Char('r')),
                press(KeyCode::Enter),
                press(KeyCode::Char('j')),
                press(KeyCode::Enter),
            ],
        );
        assert_eq!(runtime.poll_generations, vec![1, 2]);
        let selected = view_data.chat.candidate.as_ref().expect("selected candidate");
        assert_eq!(selected.phone_number, runtime.escalated[1].phone_number);
        assert_eq!(view_data.chat.messages.len(), 2);

        tx.send(InternalEvent::HistoryPolled {
            generation: 1,
            result: Ok(vec![message(MessageSender::User, "stale")]),
        })
        .expect("send stale tick");
        pump_internal(&mut state, &mut view_data, &tx, &rx);
        assert_eq!(view_data.chat.messages.len(), 2);

        tx.send(InternalEvent::HistoryPolled {
            generation: 2,
            result: Ok(vec![message(MessageSender::Admin, "fresh")]),
        })
        .expect("send current tick");
        pump_internal(&mut state, &mut view_data, &tx, &rx);
        assert_eq!(
            view_data.chat.messages,
            vec![message(MessageSender::Admin, "fresh")]
        );
    }

    #[test]
    fn leaving_the_tab_stops_polling() {
        let mut state = AppState {
            active_tab: TabKind::Escalation,
            ..AppState::default()
        };
        let mut runtime = escalation_runtime();
        let mut view_data = ViewData::default();
        let (tx, rx) = internal_channel();

        run_key_script(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            &rx,
            &[press(KeyCode::Char('r')), press(KeyCode::Enter)],
        );
        assert!(view_data.chat.poll.is_some());

        run_key_script(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            &rx,
            &[press(KeyCode::Tab)],
        );
        assert_eq!(state.active_tab, TabKind::Reports);
        assert!(view_data.chat.poll.is_none());
        assert!(view_data.chat.candidate.is_none());

        tx.send(InternalEvent::HistoryPolled {
            generation: 1,
            result: Ok(vec![message(MessageSender::User, "late")]),
        })
        .expect("send late tick");
        pump_internal(&mut state, &mut view_data, &tx, &rx);
        assert!(view_data.chat.messages.is_empty());
    }

    #[test]
    fn backend_calls_wait_behind_a_loading_status() {
        let mut state = AppState {
            active_tab: TabKind::Escalation,
            ..AppState::default()
        };
        let mut runtime = escalation_runtime();
        let mut view_data = ViewData::default();
        let (tx, _rx) = internal_channel();

        let _ = handle_key_event(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            press(KeyCode::Char('r')),
        );
        assert_eq!(state.status_line.as_deref(), Some("loading escalation..."));
        assert!(!view_data.escalation.loaded);

        assert!(run_pending(&mut state, &mut runtime, &mut view_data, &tx));
        assert!(view_data.escalation.loaded);
        assert_eq!(state.status_line.as_deref(), Some("escalation refreshed"));
        assert!(!run_pending(&mut state, &mut runtime, &mut view_data, &tx));

        let _ = handle_key_event(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            press(KeyCode::Enter),
        );
        let name = runtime.escalated[0].display_name().to_owned();
        assert_eq!(
            state.status_line,
            Some(format!("loading chat with {name}..."))
        );
        assert!(runtime.poll_generations.is_empty());

        assert!(run_pending(&mut state, &mut runtime, &mut view_data, &tx));
        assert_eq!(runtime.poll_generations, vec![1]);
        assert!(state.status_line.is_none());
    }

    #[test]
    fn reply_flow_validates_and_sends() {
        let mut state = AppState {
            active_tab: TabKind::Escalation,
            ..AppState::default()
        };
        let mut runtime = escalation_runtime();
        let mut view_data = ViewData::default();
        let (tx, rx) = internal_channel();

        run_key_script(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            &rx,
            &[press(KeyCode::Char('i'))],
        );
        assert_eq!(state.mode, AppMode::Nav);
        assert_eq!(
            state.status_line.as_deref(),
            Some("select a candidate before replying")
        );

        run_key_script(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            &rx,
            &[
                press(KeyCode::Char('r')),
                press(KeyCode::Enter),
                press(KeyCode::Char('i')),
                press(KeyCode::Enter),
            ],
        );
        assert_eq!(state.status_line.as_deref(), Some("enter a message to send"));
        assert!(runtime.sent_replies.is_empty());

        let mut keys = type_text("on it");
        keys.push(press(KeyCode::Enter));
        run_key_script(&mut state, &mut runtime, &mut view_data, &tx, &rx, &keys);
        assert_eq!(
            runtime.sent_replies,
            vec![(runtime.escalated[0].phone_number.clone(), "on it".to_owned())]
        );
        assert_eq!(state.mode, AppMode::Nav);
        assert!(view_data.chat.reply.text.is_empty());
        assert_eq!(state.status_line.as_deref(), Some("reply sent"));
    }

    #[test]
    fn offline_blocks_replies() {
        let mut state = AppState {
            active_tab: TabKind::Escalation,
            ..AppState::default()
        };
        let mut runtime = escalation_runtime();
        let mut view_data = ViewData::default();
        let (tx, rx) = internal_channel();

        run_key_script(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            &rx,
            &[press(KeyCode::Char('r')), press(KeyCode::Enter)],
        );
        tx.send(InternalEvent::Connectivity { online: false })
            .expect("send connectivity");
        pump_internal(&mut state, &mut view_data, &tx, &rx);
        assert!(!state.is_online());

        let mut keys = vec![press(KeyCode::Char('i'))];
        keys.extend(type_text("hi"));
        keys.push(press(KeyCode::Enter));
        run_key_script(&mut state, &mut runtime, &mut view_data, &tx, &rx, &keys);
        assert!(runtime.sent_replies.is_empty());
        assert!(
            status_text(&state, &view_data).contains("no internet connection"),
            "status: {}",
            status_text(&state, &view_data)
        );
    }

    #[test]
    fn resume_bot_reloads_escalations() {
        let mut state = AppState {
            active_tab: TabKind::Escalation,
            ..AppState::default()
        };
        let mut runtime = escalation_runtime();
        let first = runtime.escalated[0].clone();
        let mut view_data = ViewData::default();
        let (tx, rx) = internal_channel();

        run_key_script(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            &rx,
            &[ctrl('r')],
        );
        assert_eq!(state.status_line.as_deref(), Some("select a candidate first"));

        run_key_script(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            &rx,
            &[press(KeyCode::Char('r')), press(KeyCode::Enter), ctrl('r')],
        );
        assert_eq!(runtime.resumed, vec![first.phone_number.clone()]);
        assert_eq!(view_data.escalation.candidates.len(), 1);
        assert_eq!(
            state.status_line,
            Some(format!("bot resumed for {}", first.display_name()))
        );
    }

    #[test]
    fn upload_requires_a_valid_validated_file() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime {
            validation: ValidationResult::invalid("Missing required columns: surname"),
            ..TestRuntime::default()
        };
        let mut view_data = ViewData::default();
        let (tx, rx) = internal_channel();

        run_key_script(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            &rx,
            &[ctrl('u')],
        );
        assert_eq!(
            state.status_line.as_deref(),
            Some("select and validate a file before uploading")
        );

        let mut keys = vec![press(KeyCode::Enter)];
        keys.extend(type_text("roster.xlsx"));
        keys.push(press(KeyCode::Enter));
        keys.push(ctrl('u'));
        run_key_script(&mut state, &mut runtime, &mut view_data, &tx, &rx, &keys);

        assert_eq!(runtime.validated_paths, vec![PathBuf::from("roster.xlsx")]);
        assert!(runtime.uploaded_paths.is_empty());
        assert_eq!(
            state.status_line.as_deref(),
            Some("fix validation errors before uploading")
        );
        let text = render_upload_text(&state, &view_data);
        assert!(text.contains("validation: failed"));
        assert!(text.contains("error: Missing required columns: surname"));
    }

    #[test]
    fn upload_reports_summary_and_resets_form() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime {
            upload_result: Some(UploadSummary {
                success: true,
                added: 3,
                skipped: 1,
                failed: Some(vec![serde_json::json!("15550000000")]),
                error: None,
            }),
            ..TestRuntime::default()
        };
        let mut view_data = ViewData::default();
        let (tx, rx) = internal_channel();

        let mut keys = vec![press(KeyCode::Char('i'))];
        keys.extend(type_text("roster.csv"));
        keys.push(press(KeyCode::Enter));
        keys.push(ctrl('u'));
        run_key_script(&mut state, &mut runtime, &mut view_data, &tx, &rx, &keys);

        assert_eq!(runtime.uploaded_paths, vec![PathBuf::from("roster.csv")]);
        assert!(view_data.upload.progress.is_none());
        assert!(view_data.upload.form.path_input.is_empty());
        assert_eq!(
            state.status_line.as_deref(),
            Some("upload complete: Added: 3 | Skipped: 1 | Failed: 1")
        );
        let text = render_upload_text(&state, &view_data);
        assert!(text.contains("failed entries:"));
        assert!(text.contains("15550000000"));
    }

    #[test]
    fn upload_failure_keeps_validated_file() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        let (tx, rx) = internal_channel();

        let mut keys = vec![press(KeyCode::Char('i'))];
        keys.extend(type_text("big.xlsx"));
        keys.push(press(KeyCode::Enter));
        keys.push(ctrl('u'));
        run_key_script(&mut state, &mut runtime, &mut view_data, &tx, &rx, &keys);

        assert_eq!(
            state.status_line.as_deref(),
            Some("upload failed: file too large; select a smaller file")
        );
        assert!(view_data.upload.progress.is_none());
        assert_eq!(
            view_data.upload.validated_path,
            Some(PathBuf::from("big.xlsx"))
        );
    }

    #[test]
    fn stale_status_clear_is_ignored() {
        let mut state = AppState::default();
        let mut view_data = ViewData::default();
        let (tx, rx) = internal_channel();

        super::emit_status(&mut state, &mut view_data, &tx, "first");
        let first = view_data.status_token;
        super::emit_status(&mut state, &mut view_data, &tx, "second");

        tx.send(InternalEvent::ClearStatus { token: first })
            .expect("send stale clear");
        pump_internal(&mut state, &mut view_data, &tx, &rx);
        assert_eq!(state.status_line.as_deref(), Some("second"));

        tx.send(InternalEvent::ClearStatus {
            token: view_data.status_token,
        })
        .expect("send clear");
        pump_internal(&mut state, &mut view_data, &tx, &rx);
        assert!(state.status_line.is_none());
    }

    #[test]
    fn chat_text_shows_contact_and_times() {
        let mut view_data = ViewData::default();
        assert!(render_chat_text(&view_data.chat, AppMode::Nav).contains("select a candidate"));

        view_data.chat.candidate = Some(candidate("Jane", "15551234567", "escalated"));
        view_data.chat.messages = vec![ChatMessage {
            from: MessageSender::User,
            text: "need help".to_owned(),
            timestamp: Some("2026-03-04T10:15:00Z".to_owned()),
        }];
        view_data.chat.reply.text = "typing".to_owned();

        let text = render_chat_text(&view_data.chat, AppMode::Input);
        assert!(text.contains("Jane  +1 5551 234567  [escalated]"), "{text}");
        assert!(text.contains("https://wa.me/15551234567"));
        assert!(text.contains("10:15 user: need help"));
        assert!(text.ends_with("reply> typing_"));
    }

    #[test]
    fn reports_text_lists_counts_and_stats() -> Result<()> {
        let mut view_data = ViewData::default();
        let mut faker = CandidateFaker::new(9);
        view_data.reports.counts = StatusCounts::from_candidates(&[
            faker.candidate_with_status("escalated"),
            faker.candidate_with_status("completed"),
        ]);
        view_data.reports.stats = Some(serde_json::from_str(
            r#"{"summary":{"total_candidates":2,"top_source":"referral"}}"#,
        )?);

        let text = render_reports_text(&view_data.reports);
        assert!(text.starts_with("total 2 | escalated 1 | completed 1 | active 0"));
        assert!(text.contains("summary: top source: referral, total candidates: 2"));

        view_data.reports.stats = None;
        view_data.reports.stats_error = Some("server error (500)".to_owned());
        assert!(render_reports_text(&view_data.reports).contains("unavailable"));
        Ok(())
    }

    #[test]
    fn reports_tab_tolerates_missing_stats() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime {
            candidates: vec![CandidateFaker::new(3).candidate_with_status("active")],
            ..TestRuntime::default()
        };
        let mut view_data = ViewData::default();
        let (tx, rx) = internal_channel();

        run_key_script(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            &rx,
            &[press(KeyCode::Char('3'))],
        );
        assert_eq!(state.active_tab, TabKind::Reports);
        assert_eq!(view_data.reports.counts.active, 1);
        assert!(view_data.reports.stats.is_none());
        assert!(view_data.reports.stats_error.is_some());
    }

    #[test]
    fn help_toggles_and_swallows_keys() {
        let mut state = AppState::default();
        let mut runtime = TestRuntime::default();
        let mut view_data = ViewData::default();
        let (tx, rx) = internal_channel();

        run_key_script(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            &rx,
            &[press(KeyCode::Char('?')), press(KeyCode::Tab)],
        );
        assert!(view_data.help_visible);
        assert_eq!(state.active_tab, TabKind::Upload);
        assert!(help_overlay_text().contains("ctrl+u"));

        run_key_script(
            &mut state,
            &mut runtime,
            &mut view_data,
            &tx,
            &rx,
            &[press(KeyCode::Esc)],
        );
        assert!(!view_data.help_visible);
    }
}
