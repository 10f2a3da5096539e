// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use crossterm::event::{
    self, DisableMouseCapture, EnableMouseCapture, Event as TerminalEvent, KeyCode, KeyEvent,
    KeyModifiers, MouseButton, MouseEvent, MouseEventKind,
};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use crossterm::{execute, terminal};
use rackview_app::forms::FormPayload;
use rackview_app::history::Travel;
use rackview_app::loader::{ERROR_GLYPH, LOADING_GLYPH, LoadRequest, MISSING_GLYPH};
use rackview_app::modals::{
    AnnotationEditor, AnnotationLoad, ChartBuilder, Dismissal, Modal, SaveSearchDialog,
    ServerDetails,
};
use rackview_app::query::{ORDER, QueryParams, SORT};
use rackview_app::rows::{DisplayRow, ExpandedServers, RowGroup};
use rackview_app::{
    AnnotationKind, AnnotationRecord, CategoryId, ChartId, ColumnDataResponse, ColumnId, Command,
    Event, FieldCatalog, Hostname, InventoryState, SERVER_COLUMN, SavedChart, SavedSearch,
    SearchId, ServerPage, Theme, TriState,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table};
use std::collections::{BTreeSet, VecDeque};
use std::io;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread;
use std::time::{Duration, Instant};
use time::{Date, OffsetDateTime};
use tracing::{debug, warn};

const PAGE_SIZES: [usize; 4] = [25, 50, 100, 200];
const COLUMN_WINDOW: usize = 8;
const HALF_PAGE_ROWS: isize = 10;
const FULL_PAGE_ROWS: isize = 20;
const SUGGESTION_LIMIT: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TuiOptions {
    pub status_clear: Duration,
}

impl Default for TuiOptions {
    fn default() -> Self {
        Self {
            status_clear: Duration::from_secs(4),
        }
    }
}

/// Side effects the UI loop asks for. Everything here may block; column
/// loads go through [`AppRuntime::spawn_column_load`] so an implementation
/// can move them off the UI thread.
pub trait AppRuntime {
    fn load_page(&mut self, query: &QueryParams) -> Result<ServerPage>;
    fn load_columns(&mut self, request: &LoadRequest) -> Result<ColumnDataResponse>;
    fn list_charts(&mut self, app_name: &str) -> Result<Vec<SavedChart>>;
    fn delete_chart(&mut self, id: ChartId) -> Result<()>;
    fn load_annotation(&mut self, host: &Hostname, kind: AnnotationKind)
    -> Result<AnnotationRecord>;
    fn list_searches(&mut self) -> Result<Vec<SavedSearch>>;
    fn delete_search(&mut self, id: SearchId) -> Result<()>;
    fn submit_form(&mut self, payload: &FormPayload) -> Result<String>;
    fn save_expanded(&mut self, expanded: &ExpandedServers) -> Result<()>;
    fn save_query(&mut self, query: &QueryParams) -> Result<()>;
    fn save_theme(&mut self, theme: Theme) -> Result<()>;
    fn open_url(&mut self, url: &str) -> Result<()>;
    fn write_file(&mut self, name: &str, contents: &str) -> Result<PathBuf>;
    fn spawn_column_load(&mut self, request: LoadRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let event = match self.load_columns(&request) {
            Ok(response) => InternalEvent::ColumnsLoaded { request, response },
            Err(error) => InternalEvent::ColumnsFailed {
                request,
                message: format!("{error:#}"),
            },
        };
        tx.send(event)
            .map_err(|_| anyhow!("column event channel closed"))?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum InternalEvent {
    ClearStatus {
        token: u64,
    },
    ColumnsLoaded {
        request: LoadRequest,
        response: ColumnDataResponse,
    },
    ColumnsFailed {
        request: LoadRequest,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum Focus {
    #[default]
    Table,
    Panel,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct TableUiState {
    selected_row: usize,
    selected_col: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
struct FilterInputUiState {
    visible: bool,
    column: Option<ColumnId>,
    text: String,
    suggestion: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
struct PanelUiState {
    cursor: usize,
}

#[derive(Debug, Clone, PartialEq, Default)]
struct ViewData {
    focus: Focus,
    table: TableUiState,
    panel: PanelUiState,
    filter_input: FilterInputUiState,
    tag_cursor: usize,
    help_visible: bool,
    alert: Option<String>,
    status_token: u64,
    status_clear: Duration,
}

impl ViewData {
    fn new(options: TuiOptions) -> Self {
        Self {
            status_clear: options.status_clear,
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableCommand {
    MoveRow(isize),
    MoveColumn(isize),
    JumpFirstRow,
    JumpLastRow,
    JumpFirstColumn,
    JumpLastColumn,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum PanelEntry {
    SelectAll,
    Category(CategoryId),
    Column(ColumnId),
}

#[derive(Debug, Clone, PartialEq)]
enum ModalAction {
    Dispatch(Command),
    Alert(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Palette {
    text: Color,
    accent: Color,
    muted: Color,
    selection: Color,
    status: Color,
    alert: Color,
}

impl Palette {
    const fn for_theme(theme: Theme) -> Self {
        match theme {
            Theme::Dark => Self {
                text: Color::White,
                accent: Color::Cyan,
                muted: Color::DarkGray,
                selection: Color::DarkGray,
                status: Color::Yellow,
                alert: Color::LightRed,
            },
            Theme::Light => Self {
                text: Color::Black,
                accent: Color::Blue,
                muted: Color::Gray,
                selection: Color::LightBlue,
                status: Color::Magenta,
                alert: Color::Red,
            },
        }
    }
}

pub fn run_app<R: AppRuntime>(
    state: &mut InventoryState,
    runtime: &mut R,
    options: TuiOptions,
) -> Result<()> {
    enable_raw_mode().context("enable raw mode")?;
    let mut stdout = io::stdout();
    execute!(stdout, terminal::EnterAlternateScreen, EnableMouseCapture)
        .context("enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("create terminal")?;

    let mut view_data = ViewData::new(options);
    let (internal_tx, internal_rx) = mpsc::channel();

    load_initial(state, runtime, &mut view_data, &internal_tx);

    let mut result = Ok(());
    loop {
        process_internal_events(state, runtime, &mut view_data, &internal_tx, &internal_rx);

        if let Err(error) = terminal.draw(|frame| render(frame, state, &view_data)) {
            result = Err(error).context("draw frame");
            break;
        }

        match next_terminal_event() {
            Ok(Some(TerminalEvent::Key(key))) => {
                if handle_key_event(state, runtime, &mut view_data, &internal_tx, key) {
                    break;
                }
            }
            Ok(Some(TerminalEvent::Mouse(mouse))) => {
                let screen = terminal
                    .size()
                    .map(|size| Rect::new(0, 0, size.width, size.height))
                    .context("read terminal size");
                match screen {
                    Ok(screen) => handle_mouse_event(
                        state,
                        runtime,
                        &mut view_data,
                        &internal_tx,
                        mouse,
                        screen,
                    ),
                    Err(error) => {
                        result = Err(error);
                        break;
                    }
                }
            }
            Ok(_) => {}
            Err(error) => {
                result = Err(error);
                break;
            }
        }
    }

    disable_raw_mode().context("disable raw mode")?;
    execute!(
        io::stdout(),
        DisableMouseCapture,
        terminal::LeaveAlternateScreen
    )
    .context("leave alternate screen")?;
    result
}

fn next_terminal_event() -> Result<Option<TerminalEvent>> {
    if !event::poll(Duration::from_millis(120)).context("poll event")? {
        return Ok(None);
    }
    event::read().map(Some).context("read event")
}

fn load_initial<R: AppRuntime>(
    state: &mut InventoryState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    run_command(state, runtime, view_data, internal_tx, Command::Reload);
}

fn process_internal_events<R: AppRuntime>(
    state: &mut InventoryState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    rx: &Receiver<InternalEvent>,
) {
    while let Ok(event) = rx.try_recv() {
        match event {
            InternalEvent::ClearStatus { token }
                if token == view_data.status_token && view_data.alert.is_none() =>
            {
                run_command(state, runtime, view_data, tx, Command::ClearStatus);
            }
            InternalEvent::ClearStatus { .. } => {}
            InternalEvent::ColumnsLoaded { request, response } => {
                run_command(
                    state,
                    runtime,
                    view_data,
                    tx,
                    Command::ColumnsLoaded {
                        request,
                        response,
                        at: Instant::now(),
                    },
                );
            }
            InternalEvent::ColumnsFailed { request, message } => {
                warn!(request = request.id, error = %message, "column load failed");
                run_command(
                    state,
                    runtime,
                    view_data,
                    tx,
                    Command::ColumnsFailed { request, message },
                );
            }
        }
    }
}

fn run_command<R: AppRuntime>(
    state: &mut InventoryState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    command: Command,
) {
    let events = state.dispatch(command);
    apply_events(state, runtime, view_data, tx, events);
}

fn apply_events<R: AppRuntime>(
    state: &mut InventoryState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    events: Vec<Event>,
) {
    let mut queue = VecDeque::from(events);
    while let Some(event) = queue.pop_front() {
        queue.extend(handle_app_event(state, runtime, view_data, tx, event));
    }
}

/// Carries out one state event and returns whatever the resulting
/// command produced.
fn handle_app_event<R: AppRuntime>(
    state: &mut InventoryState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    event: Event,
) -> Vec<Event> {
    match event {
        Event::QueryReplaced(query) => {
            persist(runtime.save_query(&query), "save query");
            Vec::new()
        }
        Event::Navigate(query) => navigate(state, runtime, view_data, tx, query),
        Event::FiltersChanged(tags) => {
            view_data.tag_cursor = view_data.tag_cursor.min(tags.len().saturating_sub(1));
            Vec::new()
        }
        Event::ColumnsChanged(_) | Event::ModalOpened | Event::ModalClosed => {
            clamp_table_cursor(state, view_data);
            Vec::new()
        }
        Event::LoadColumns(request) => {
            debug!(
                request = request.id,
                columns = request.columns.len(),
                "spawning column load"
            );
            if let Err(error) = runtime.spawn_column_load(request, tx.clone()) {
                emit_status(state, view_data, tx, format!("column load failed: {error:#}"));
            }
            Vec::new()
        }
        Event::ColumnsPainted(columns) => {
            debug!(count = columns.len(), "columns painted");
            Vec::new()
        }
        Event::ExpandedChanged(expanded) => {
            persist(runtime.save_expanded(&expanded), "save expanded servers");
            clamp_table_cursor(state, view_data);
            Vec::new()
        }
        Event::FetchCharts { app_name } => {
            let result = runtime.list_charts(&app_name).map_err(error_text);
            state.dispatch(Command::ChartsListed(result))
        }
        Event::DeleteChart(id) => {
            let result = runtime.delete_chart(id).map_err(error_text);
            state.dispatch(Command::ChartDeleted { id, result })
        }
        Event::FetchAnnotation { host, kind } => {
            let result = runtime.load_annotation(&host, kind).map_err(error_text);
            state.dispatch(Command::AnnotationLoaded(result))
        }
        Event::FetchSearches => {
            let result = runtime.list_searches().map_err(error_text);
            state.dispatch(Command::SearchesListed(result))
        }
        Event::DeleteSearch(id) => {
            let result = runtime.delete_search(id).map_err(error_text);
            state.dispatch(Command::SearchDeleted { id, result })
        }
        Event::SubmitForm(payload) => {
            let kind = payload.kind();
            let result = runtime.submit_form(&payload).map_err(error_text);
            state.dispatch(Command::FormSubmitted { kind, result })
        }
        Event::OpenUrl(url) => {
            match runtime.open_url(&url) {
                Ok(()) => emit_status(state, view_data, tx, format!("opened {url}")),
                Err(error) => emit_alert(state, view_data, format!("{error:#}")),
            }
            Vec::new()
        }
        Event::WriteFile { name, contents } => {
            match runtime.write_file(&name, &contents) {
                Ok(path) => emit_status(state, view_data, tx, format!("saved {}", path.display())),
                Err(error) => emit_alert(state, view_data, format!("{error:#}")),
            }
            Vec::new()
        }
        Event::ThemeChanged(theme) => {
            persist(runtime.save_theme(theme), "save theme");
            Vec::new()
        }
        Event::Alert(message) => {
            emit_alert(state, view_data, message);
            Vec::new()
        }
        Event::StatusUpdated(_) => {
            bump_status_token(view_data, tx);
            Vec::new()
        }
        Event::StatusCleared => Vec::new(),
    }
}

fn navigate<R: AppRuntime>(
    state: &mut InventoryState,
    runtime: &mut R,
    view_data: &mut ViewData,
    tx: &Sender<InternalEvent>,
    query: QueryParams,
) -> Vec<Event> {
    debug!(query = %query.to_query_string(), "navigating");
    match runtime.load_page(&query) {
        Ok(page) => {
            let events = state.dispatch(Command::PageLoaded {
                query,
                page,
                at: Instant::now(),
            });
            persist(runtime.save_query(state.query()), "save query");
            clamp_table_cursor(state, view_data);
            events
        }
        Err(error) => {
            warn!(error = %format!("{error:#}"), "listing load failed");
            emit_status(state, view_data, tx, format!("load failed: {error:#}"));
            Vec::new()
        }
    }
}

fn persist(result: Result<()>, what: &str) {
    if let Err(error) = result {
        warn!(error = %format!("{error:#}"), "{what} failed");
    }
}

fn error_text(error: anyhow::Error) -> String {
    format!("{error:#}")
}

fn schedule_status_clear(internal_tx: &Sender<InternalEvent>, token: u64, after: Duration) {
    let sender = internal_tx.clone();
    thread::spawn(move || {
        thread::sleep(after);
        let _ = sender.send(InternalEvent::ClearStatus { token });
    });
}

fn bump_status_token(view_data: &mut ViewData, internal_tx: &Sender<InternalEvent>) {
    view_data.status_token = view_data.status_token.saturating_add(1);
    schedule_status_clear(internal_tx, view_data.status_token, view_data.status_clear);
}

fn emit_status(
    state: &mut InventoryState,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    message: impl Into<String>,
) {
    state.status_line = Some(message.into());
    bump_status_token(view_data, internal_tx);
}

/// Alerts stay up until the next key press; pending clears are invalidated.
fn emit_alert(state: &mut InventoryState, view_data: &mut ViewData, message: String) {
    state.status_line = Some(message.clone());
    view_data.status_token = view_data.status_token.saturating_add(1);
    view_data.alert = Some(message);
}

fn handle_mouse_event<R: AppRuntime>(
    state: &mut InventoryState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    mouse: MouseEvent,
    screen: Rect,
) {
    if mouse.kind != MouseEventKind::Down(MouseButton::Left) {
        return;
    }
    let Some(modal) = state.modal() else {
        return;
    };
    let area = modal_area(modal, screen);
    if !rect_contains(area, mouse.column, mouse.row) {
        run_command(
            state,
            runtime,
            view_data,
            internal_tx,
            Command::DismissModal(Dismissal::Backdrop),
        );
    }
}

fn rect_contains(area: Rect, column: u16, row: u16) -> bool {
    column >= area.x && column < area.right() && row >= area.y && row < area.bottom()
}

fn handle_key_event<R: AppRuntime>(
    state: &mut InventoryState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    if key.code == KeyCode::Char('q') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return true;
    }

    if view_data.alert.take().is_some() {
        run_command(state, runtime, view_data, internal_tx, Command::ClearStatus);
        return false;
    }

    if view_data.help_visible {
        if key.code == KeyCode::Esc || key.code == KeyCode::Char('?') {
            view_data.help_visible = false;
        }
        return false;
    }

    if view_data.filter_input.visible {
        handle_filter_input_key(state, runtime, view_data, internal_tx, key);
        return false;
    }

    if state.modal().is_some() {
        handle_modal_key(state, runtime, view_data, internal_tx, key);
        return false;
    }

    if view_data.focus == Focus::Panel {
        handle_panel_key(state, runtime, view_data, internal_tx, key);
        return false;
    }

    if handle_table_key(state, runtime, view_data, internal_tx, key) {
        return false;
    }

    let command = match (key.code, key.modifiers) {
        (KeyCode::Char('?'), _) => {
            view_data.help_visible = true;
            None
        }
        (KeyCode::Tab, _) => {
            view_data.focus = Focus::Panel;
            None
        }
        (KeyCode::Char(' '), _) => {
            toggle_selected_row(state, runtime, view_data, internal_tx);
            None
        }
        (KeyCode::Enter, _) | (KeyCode::Char('i'), KeyModifiers::NONE) => {
            selected_host(state, view_data).map(Command::OpenServerDetails)
        }
        (KeyCode::Char('x'), KeyModifiers::NONE) => Some(Command::CollapseAll),
        (KeyCode::Char('f'), KeyModifiers::NONE) => {
            open_filter_input(state, view_data);
            None
        }
        (KeyCode::Char('['), _) => {
            view_data.tag_cursor = view_data.tag_cursor.saturating_sub(1);
            None
        }
        (KeyCode::Char(']'), _) => {
            let last = state.filters().tags().len().saturating_sub(1);
            view_data.tag_cursor = (view_data.tag_cursor + 1).min(last);
            None
        }
        (KeyCode::Char('-'), _) | (KeyCode::Delete, _) => state
            .filters()
            .tags()
            .get(view_data.tag_cursor)
            .map(|tag| Command::RemoveFilter {
                column: tag.column.clone(),
                term: tag.term.clone(),
            }),
        (KeyCode::Char('p'), KeyModifiers::NONE) => Some(Command::ApplyFilters),
        (KeyCode::Char('P'), _) => Some(Command::ClearFilters),
        (KeyCode::Char('>'), _) => Some(Command::GoToPage(state.page() + 1)),
        (KeyCode::Char('<'), _) => Some(Command::GoToPage(state.page().saturating_sub(1))),
        (KeyCode::Char('z'), KeyModifiers::NONE) => Some(Command::SetPageSize(next_page_size(
            state.query().page_size(),
        ))),
        (KeyCode::Char('s'), KeyModifiers::NONE) => {
            selected_column(state, view_data).map(Command::SortBy)
        }
        (KeyCode::Char('v'), KeyModifiers::NONE) => Some(Command::ToggleView),
        (KeyCode::Char('t'), KeyModifiers::NONE) => Some(Command::ToggleTheme),
        (KeyCode::Char('c'), KeyModifiers::NONE) => Some(Command::OpenChartBuilder),
        (KeyCode::Char('m'), KeyModifiers::NONE) => {
            selected_host(state, view_data).map(|host| Command::OpenAnnotation {
                host,
                kind: AnnotationKind::Discrepancy,
            })
        }
        (KeyCode::Char('M'), _) => {
            selected_host(state, view_data).map(|host| Command::OpenAnnotation {
                host,
                kind: AnnotationKind::Group,
            })
        }
        (KeyCode::Char('w'), KeyModifiers::NONE) => Some(Command::OpenSaveSearch),
        (KeyCode::Char('r'), KeyModifiers::CONTROL) => Some(Command::RefreshColumns {
            at: Instant::now(),
        }),
        (KeyCode::Char('r'), KeyModifiers::NONE) => Some(Command::Reload),
        (KeyCode::Char('H'), _) => Some(Command::Travel(Travel::Back)),
        (KeyCode::Char('L'), _) => Some(Command::Travel(Travel::Forward)),
        _ => None,
    };

    if let Some(command) = command {
        run_command(state, runtime, view_data, internal_tx, command);
    }
    false
}

fn handle_table_key<R: AppRuntime>(
    state: &mut InventoryState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) -> bool {
    let Some(command) = table_command_for_key(key) else {
        return false;
    };
    apply_table_command(state, view_data, command);
    if let Some(offset) = scroll_for_selection(state, view_data.table.selected_col) {
        run_command(
            state,
            runtime,
            view_data,
            internal_tx,
            Command::SetScrollLeft(offset),
        );
    }
    true
}

fn table_command_for_key(key: KeyEvent) -> Option<TableCommand> {
    match (key.code, key.modifiers) {
        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => Some(TableCommand::MoveRow(1)),
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => Some(TableCommand::MoveRow(-1)),
        (KeyCode::Char('h'), _) | (KeyCode::Left, _) => Some(TableCommand::MoveColumn(-1)),
        (KeyCode::Char('l'), _) | (KeyCode::Right, _) => Some(TableCommand::MoveColumn(1)),
        (KeyCode::Char('d'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            Some(TableCommand::MoveRow(HALF_PAGE_ROWS))
        }
        (KeyCode::Char('u'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            Some(TableCommand::MoveRow(-HALF_PAGE_ROWS))
        }
        (KeyCode::PageDown, _) => Some(TableCommand::MoveRow(FULL_PAGE_ROWS)),
        (KeyCode::PageUp, _) => Some(TableCommand::MoveRow(-FULL_PAGE_ROWS)),
        (KeyCode::Char('g'), _) => Some(TableCommand::JumpFirstRow),
        (KeyCode::Char('G'), _) => Some(TableCommand::JumpLastRow),
        (KeyCode::Char('^'), _) => Some(TableCommand::JumpFirstColumn),
        (KeyCode::Char('$'), _) => Some(TableCommand::JumpLastColumn),
        _ => None,
    }
}

fn apply_table_command(state: &InventoryState, view_data: &mut ViewData, command: TableCommand) {
    let row_count = state.display_rows().len();
    let column_count = state.columns().visible_columns().len();
    let table = &mut view_data.table;
    match command {
        TableCommand::MoveRow(delta) => table.selected_row = step(table.selected_row, delta, row_count),
        TableCommand::MoveColumn(delta) => {
            table.selected_col = step(table.selected_col, delta, column_count);
        }
        TableCommand::JumpFirstRow => table.selected_row = 0,
        TableCommand::JumpLastRow => table.selected_row = row_count.saturating_sub(1),
        TableCommand::JumpFirstColumn => table.selected_col = 0,
        TableCommand::JumpLastColumn => table.selected_col = column_count.saturating_sub(1),
    }
}

fn step(current: usize, delta: isize, len: usize) -> usize {
    current
        .saturating_add_signed(delta)
        .min(len.saturating_sub(1))
}

fn clamp_table_cursor(state: &InventoryState, view_data: &mut ViewData) {
    let row_count = state.display_rows().len();
    let column_count = state.columns().visible_columns().len();
    view_data.table.selected_row = view_data
        .table
        .selected_row
        .min(row_count.saturating_sub(1));
    view_data.table.selected_col = view_data
        .table
        .selected_col
        .min(column_count.saturating_sub(1));
}

/// New horizontal offset that keeps the selected column on screen, if the
/// current one does not.
fn scroll_for_selection(state: &InventoryState, selected_col: usize) -> Option<u16> {
    let visible = state.columns().visible_columns();
    let column = visible.get(selected_col)?;
    if column.as_str() == SERVER_COLUMN {
        return None;
    }
    let position = visible[..selected_col]
        .iter()
        .filter(|column| column.as_str() != SERVER_COLUMN)
        .count();
    let current = usize::from(state.scroll_left());
    let next = if position < current {
        position
    } else if position >= current + COLUMN_WINDOW {
        position + 1 - COLUMN_WINDOW
    } else {
        return None;
    };
    Some(u16::try_from(next).unwrap_or(u16::MAX))
}

/// Visible columns actually drawn with their visible index. The server
/// column stays pinned; the rest scroll by `scroll_left` columns.
fn drawn_columns(state: &InventoryState) -> Vec<(usize, ColumnId)> {
    let offset = usize::from(state.scroll_left());
    let mut scrolled = 0;
    state
        .columns()
        .visible_columns()
        .into_iter()
        .enumerate()
        .filter(|(_, column)| {
            if column.as_str() == SERVER_COLUMN {
                return true;
            }
            scrolled += 1;
            scrolled > offset && scrolled <= offset + COLUMN_WINDOW
        })
        .collect()
}

fn selected_group(state: &InventoryState, view_data: &ViewData) -> Option<usize> {
    match state.display_rows().get(view_data.table.selected_row)? {
        DisplayRow::Primary { group } | DisplayRow::Detail { group, .. } => Some(*group),
    }
}

fn selected_host(state: &InventoryState, view_data: &ViewData) -> Option<Hostname> {
    let group = selected_group(state, view_data)?;
    state
        .rows()
        .groups()
        .get(group)
        .map(|group| group.row.hostname.clone())
}

fn selected_column(state: &InventoryState, view_data: &ViewData) -> Option<ColumnId> {
    state
        .columns()
        .visible_columns()
        .get(view_data.table.selected_col)
        .cloned()
}

fn toggle_selected_row<R: AppRuntime>(
    state: &mut InventoryState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let Some(group) = selected_group(state, view_data) else {
        return;
    };
    let Some(row) = state.rows().groups().get(group) else {
        return;
    };
    let host = row.row.hostname.clone();
    if !row.is_expandable() {
        emit_status(
            state,
            view_data,
            internal_tx,
            format!("{host} has a single instance"),
        );
        return;
    }
    run_command(state, runtime, view_data, internal_tx, Command::ToggleRow(host));
    if let Some(index) = state.rows().first_row_of(state.expanded(), group) {
        view_data.table.selected_row = index;
    }
}

fn next_page_size(current: usize) -> usize {
    PAGE_SIZES
        .iter()
        .copied()
        .find(|size| *size > current)
        .unwrap_or(PAGE_SIZES[0])
}

fn open_filter_input(state: &InventoryState, view_data: &mut ViewData) {
    let Some(column) = selected_column(state, view_data) else {
        return;
    };
    view_data.filter_input = FilterInputUiState {
        visible: true,
        column: Some(column),
        text: String::new(),
        suggestion: None,
    };
}

fn handle_filter_input_key<R: AppRuntime>(
    state: &mut InventoryState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let input = &mut view_data.filter_input;
    match (key.code, key.modifiers) {
        (KeyCode::Esc, _) => view_data.filter_input = FilterInputUiState::default(),
        (KeyCode::Enter, _) => submit_filter_input(state, runtime, view_data, internal_tx),
        (KeyCode::Backspace, _) => {
            input.text.pop();
            input.suggestion = None;
        }
        (KeyCode::Down, _) => {
            let count = input
                .column
                .as_ref()
                .map(|column| filter_suggestions(state, column.as_str(), &input.text).len())
                .unwrap_or_default();
            if count > 0 {
                input.suggestion = Some(input.suggestion.map_or(0, |index| (index + 1).min(count - 1)));
            }
        }
        (KeyCode::Up, _) => {
            input.suggestion = match input.suggestion {
                Some(0) | None => None,
                Some(index) => Some(index - 1),
            };
        }
        (KeyCode::Char(ch), modifiers)
            if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT =>
        {
            input.text.push(ch);
            input.suggestion = None;
        }
        _ => {}
    }
}

/// A picked suggestion becomes an exact-match filter; typed text is split
/// into free-text terms.
fn submit_filter_input<R: AppRuntime>(
    state: &mut InventoryState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
) {
    let input = std::mem::take(&mut view_data.filter_input);
    let Some(column) = input.column else {
        return;
    };
    let picked = input.suggestion.and_then(|index| {
        filter_suggestions(state, column.as_str(), &input.text)
            .into_iter()
            .nth(index)
    });
    let command = match picked {
        Some(value) => Command::SelectListValue { column, value },
        None if input.text.trim().is_empty() => return,
        None => Command::AddFilter {
            column,
            raw: input.text,
        },
    };
    run_command(state, runtime, view_data, internal_tx, command);
}

/// Distinct on-page values of a list-backed column that contain the typed
/// text.
fn filter_suggestions(state: &InventoryState, column: &str, text: &str) -> Vec<String> {
    let is_list = state
        .catalog()
        .field(column)
        .is_some_and(|field| field.list_id.is_some());
    if !is_list {
        return Vec::new();
    }
    let needle = text.trim().to_uppercase();
    let values: BTreeSet<String> = state
        .rows()
        .groups()
        .iter()
        .flat_map(|group| {
            state
                .cell_text(group, column)
                .split(" | ")
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
        .filter(|value| {
            !value.is_empty()
                && !value.starts_with('>')
                && ![MISSING_GLYPH, LOADING_GLYPH, ERROR_GLYPH].contains(&value.as_str())
                && value.to_uppercase().contains(&needle)
        })
        .collect();
    values.into_iter().collect()
}

fn panel_entries(state: &InventoryState) -> Vec<PanelEntry> {
    let mut entries = vec![PanelEntry::SelectAll];
    for node in state.categories().nodes() {
        entries.push(PanelEntry::Category(node.id.clone()));
        if state.categories().is_expanded(node.id.as_str()) {
            entries.extend(node.children.iter().cloned().map(PanelEntry::Column));
        }
    }
    entries
}

fn handle_panel_key<R: AppRuntime>(
    state: &mut InventoryState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    let entries = panel_entries(state);
    let selected = entries.get(view_data.panel.cursor).cloned();
    let at = Instant::now();

    let command = match (key.code, key.modifiers) {
        (KeyCode::Tab, _) | (KeyCode::Esc, _) => {
            view_data.focus = Focus::Table;
            None
        }
        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => {
            view_data.panel.cursor = step(view_data.panel.cursor, 1, entries.len());
            None
        }
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => {
            view_data.panel.cursor = step(view_data.panel.cursor, -1, entries.len());
            None
        }
        (KeyCode::Char('a'), KeyModifiers::NONE) => Some(Command::SelectAll { visible: true, at }),
        (KeyCode::Char('A'), _) => Some(Command::SelectAll { visible: false, at }),
        (KeyCode::Enter, _) | (KeyCode::Char('o'), _) => match selected {
            Some(PanelEntry::Category(id)) => Some(Command::ToggleCategoryExpanded(id)),
            Some(entry) => check_entry(state, entry, at),
            None => None,
        },
        (KeyCode::Char(' '), _) => selected.and_then(|entry| check_entry(state, entry, at)),
        _ => None,
    };

    if let Some(command) = command {
        run_command(state, runtime, view_data, internal_tx, command);
    }
    let len = panel_entries(state).len();
    view_data.panel.cursor = view_data.panel.cursor.min(len.saturating_sub(1));
}

fn check_entry(state: &InventoryState, entry: PanelEntry, at: Instant) -> Option<Command> {
    match entry {
        PanelEntry::SelectAll => Some(Command::SelectAll {
            visible: state.columns().select_all_state() != TriState::Checked,
            at,
        }),
        PanelEntry::Category(id) => Some(Command::ToggleCategory { id, at }),
        PanelEntry::Column(column) => {
            let visible = !state.columns().is_visible(column.as_str());
            Some(Command::SetColumnVisible {
                column,
                visible,
                at,
            })
        }
    }
}

fn handle_modal_key<R: AppRuntime>(
    state: &mut InventoryState,
    runtime: &mut R,
    view_data: &mut ViewData,
    internal_tx: &Sender<InternalEvent>,
    key: KeyEvent,
) {
    if key.code == KeyCode::Esc {
        run_command(
            state,
            runtime,
            view_data,
            internal_tx,
            Command::DismissModal(Dismissal::Escape),
        );
        return;
    }

    let action = match state.modal_mut() {
        Some(Modal::ChartBuilder(builder)) => chart_builder_key(builder, key),
        Some(Modal::Annotation(editor)) => annotation_key(editor, key),
        Some(Modal::ServerDetails(details)) => server_details_key(details, key),
        Some(Modal::SaveSearch(dialog)) => save_search_key(dialog, key),
        None => None,
    };

    match action {
        Some(ModalAction::Dispatch(command)) => {
            run_command(state, runtime, view_data, internal_tx, command);
        }
        Some(ModalAction::Alert(message)) => emit_alert(state, view_data, message),
        None => {}
    }
}

fn chart_builder_key(builder: &mut ChartBuilder, key: KeyEvent) -> Option<ModalAction> {
    if builder.is_dropdown_open() {
        return match (key.code, key.modifiers) {
            (KeyCode::Char('j'), _) | (KeyCode::Down, _) => {
                builder.move_saved_cursor(1);
                None
            }
            (KeyCode::Char('k'), _) | (KeyCode::Up, _) => {
                builder.move_saved_cursor(-1);
                None
            }
            (KeyCode::Enter, _) => Some(ModalAction::Dispatch(Command::OpenSavedChart)),
            (KeyCode::Char('d'), KeyModifiers::NONE) | (KeyCode::Delete, _) => {
                Some(ModalAction::Dispatch(Command::DeleteSavedChart))
            }
            (KeyCode::Char('o'), _) => {
                builder.toggle_dropdown();
                None
            }
            _ => None,
        };
    }

    match (key.code, key.modifiers) {
        (KeyCode::Char('j'), _) | (KeyCode::Down, _) => builder.focus_next(),
        (KeyCode::Char('k'), _) | (KeyCode::Up, _) => builder.focus_prev(),
        (KeyCode::Char('l'), _) | (KeyCode::Right, _) => builder.cycle_field(true),
        (KeyCode::Char('h'), _) | (KeyCode::Left, _) => builder.cycle_field(false),
        (KeyCode::Char('t'), KeyModifiers::NONE) => builder.cycle_type(true),
        (KeyCode::Char('T'), _) => builder.cycle_type(false),
        (KeyCode::Char('+'), _) | (KeyCode::Char('a'), KeyModifiers::NONE) => {
            if let Err(error) = builder.add_selector() {
                return Some(ModalAction::Alert(format!("{error:#}")));
            }
        }
        (KeyCode::Char('-'), _) | (KeyCode::Char('x'), KeyModifiers::NONE) => {
            if let Err(error) = builder.remove_selector(builder.focus()) {
                return Some(ModalAction::Alert(format!("{error:#}")));
            }
        }
        (KeyCode::Char('o'), _) => builder.toggle_dropdown(),
        (KeyCode::Enter, _) => return Some(ModalAction::Dispatch(Command::SubmitChart)),
        _ => {}
    }
    None
}

fn annotation_key(editor: &mut AnnotationEditor, key: KeyEvent) -> Option<ModalAction> {
    if *editor.load_state() != AnnotationLoad::Ready {
        return None;
    }
    match (key.code, key.modifiers) {
        (KeyCode::Tab, _) | (KeyCode::Down, _) => editor.focus_next(),
        (KeyCode::BackTab, _) | (KeyCode::Up, _) => editor.focus_prev(),
        (KeyCode::Left, _) => editor.cycle_choice(false),
        (KeyCode::Right, _) => editor.cycle_choice(true),
        (KeyCode::Enter, _) => return Some(ModalAction::Dispatch(Command::SaveAnnotation)),
        (KeyCode::Char('s'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            return Some(ModalAction::Dispatch(Command::SaveAnnotation));
        }
        (KeyCode::Char('x'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            return Some(ModalAction::Dispatch(Command::ClearAnnotation));
        }
        (KeyCode::Backspace, _) => editor.backspace(),
        (KeyCode::Char(ch), modifiers)
            if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT =>
        {
            editor.insert_char(ch);
        }
        _ => {}
    }
    None
}

fn server_details_key(details: &mut ServerDetails, key: KeyEvent) -> Option<ModalAction> {
    match (key.code, key.modifiers) {
        (KeyCode::Down, _) => details.scroll_by(1),
        (KeyCode::Up, _) => details.scroll_by(-1),
        (KeyCode::PageDown, _) => details.scroll_by(FULL_PAGE_ROWS),
        (KeyCode::PageUp, _) => details.scroll_by(-FULL_PAGE_ROWS),
        (KeyCode::Char('e'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            return Some(ModalAction::Dispatch(Command::ExportDetails { date: today() }));
        }
        (KeyCode::Char('u'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            details.set_filter("");
        }
        (KeyCode::Backspace, _) => details.pop_filter(),
        (KeyCode::Char(ch), modifiers)
            if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT =>
        {
            details.push_filter(ch);
        }
        _ => {}
    }
    None
}

fn save_search_key(dialog: &mut SaveSearchDialog, key: KeyEvent) -> Option<ModalAction> {
    match (key.code, key.modifiers) {
        (KeyCode::Down, _) => dialog.move_cursor(1),
        (KeyCode::Up, _) => dialog.move_cursor(-1),
        (KeyCode::Enter, _) => return Some(ModalAction::Dispatch(Command::SaveSearch)),
        (KeyCode::Char('o'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            return Some(ModalAction::Dispatch(Command::OpenSavedSearch));
        }
        (KeyCode::Char('d'), modifiers) if modifiers.contains(KeyModifiers::CONTROL) => {
            return Some(ModalAction::Dispatch(Command::DeleteSavedSearch));
        }
        (KeyCode::Backspace, _) => dialog.backspace(),
        (KeyCode::Char(ch), modifiers)
            if modifiers.is_empty() || modifiers == KeyModifiers::SHIFT =>
        {
            dialog.push_char(ch);
        }
        _ => {}
    }
    None
}

fn today() -> Date {
    OffsetDateTime::now_utc().date()
}

fn render(frame: &mut ratatui::Frame<'_>, state: &InventoryState, view_data: &ViewData) {
    let palette = Palette::for_theme(state.theme());
    let layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(1),
            Constraint::Length(3),
        ])
        .split(frame.area());

    let header = Paragraph::new(header_text(state))
        .style(Style::default().fg(palette.text))
        .block(
            Block::default()
                .title(state.settings().app_name.as_str())
                .borders(Borders::ALL),
        );
    frame.render_widget(header, layout[0]);

    let tags = Paragraph::new(tag_bar_line(state, view_data, &palette))
        .block(Block::default().title("filters").borders(Borders::ALL));
    frame.render_widget(tags, layout[1]);

    if view_data.focus == Focus::Panel {
        let body = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Min(1), Constraint::Length(36)])
            .split(layout[2]);
        render_table(frame, body[0], state, view_data, &palette);
        let panel = Paragraph::new(panel_text(state, view_data))
            .style(Style::default().fg(palette.text))
            .block(
                Block::default()
                    .title("columns")
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(palette.accent)),
            );
        frame.render_widget(panel, body[1]);
    } else {
        render_table(frame, layout[2], state, view_data, &palette);
    }

    let status_color = if view_data.alert.is_some() {
        palette.alert
    } else {
        palette.status
    };
    let status = Paragraph::new(status_text(state, view_data))
        .style(Style::default().fg(status_color))
        .block(Block::default().borders(Borders::ALL));
    frame.render_widget(status, layout[3]);

    if view_data.filter_input.visible {
        let area = centered_rect(50, 40, frame.area());
        frame.render_widget(Clear, area);
        let input = Paragraph::new(filter_input_text(state, view_data)).block(
            Block::default()
                .title("add filter")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(palette.accent)),
        );
        frame.render_widget(input, area);
    }

    if let Some(modal) = state.modal() {
        let area = modal_area(modal, frame.area());
        frame.render_widget(Clear, area);
        let body = Paragraph::new(modal_text(modal, state.catalog()))
            .style(Style::default().fg(palette.text))
            .block(
                Block::default()
                    .title(modal.title())
                    .borders(Borders::ALL)
                    .border_style(Style::default().fg(palette.accent)),
            );
        frame.render_widget(body, area);
    }

    if view_data.help_visible {
        let area = centered_rect(80, 72, frame.area());
        frame.render_widget(Clear, area);
        let help = Paragraph::new(help_overlay_text())
            .block(Block::default().title("help").borders(Borders::ALL));
        frame.render_widget(help, area);
    }
}

fn header_text(state: &InventoryState) -> String {
    format!(
        "page {}/{} | {} servers | {} per page | view {} | theme {}",
        state.page(),
        state.page_count(),
        state.total(),
        state.query().page_size(),
        state.view_mode().as_str(),
        state.theme().as_str()
    )
}

fn tag_bar_line(state: &InventoryState, view_data: &ViewData, palette: &Palette) -> Line<'static> {
    let tags = state.filters().tags();
    if tags.is_empty() {
        return Line::from(Span::styled(
            "no filters (f adds one on the selected column)",
            Style::default().fg(palette.muted),
        ));
    }
    let mut spans = Vec::with_capacity(tags.len() * 2);
    for (index, tag) in tags.iter().enumerate() {
        let style = if index == view_data.tag_cursor {
            Style::default()
                .fg(palette.accent)
                .add_modifier(Modifier::BOLD | Modifier::REVERSED)
        } else {
            Style::default().fg(palette.accent)
        };
        spans.push(Span::styled(format!(" {} ", tag.label()), style));
        spans.push(Span::raw(" "));
    }
    Line::from(spans)
}

fn render_table(
    frame: &mut ratatui::Frame<'_>,
    area: Rect,
    state: &InventoryState,
    view_data: &ViewData,
    palette: &Palette,
) {
    let block = Block::default()
        .title(table_title(state))
        .borders(Borders::ALL);
    if state.rows().groups().is_empty() {
        let empty = Paragraph::new("no servers match the current filters")
            .style(Style::default().fg(palette.muted))
            .block(block);
        frame.render_widget(empty, area);
        return;
    }

    let columns = drawn_columns(state);
    let widths = vec![Constraint::Min(8); columns.len().max(1)];
    let header = Row::new(columns.iter().map(|(_, column)| {
        Cell::from(header_label(state, column.as_str())).style(
            Style::default()
                .fg(palette.text)
                .add_modifier(Modifier::BOLD),
        )
    }));

    let groups = state.rows().groups();
    let rows = state
        .display_rows()
        .into_iter()
        .enumerate()
        .filter_map(|(row_index, row)| {
            let selected_row = row_index == view_data.table.selected_row;
            let (group, instance) = match row {
                DisplayRow::Primary { group } => (groups.get(group)?, None),
                DisplayRow::Detail { group, instance } => (groups.get(group)?, Some(instance)),
            };
            let cells = columns
                .iter()
                .map(|(position, column)| {
                    let text = match instance {
                        None => primary_cell_text(state, group, column.as_str()),
                        Some(instance) => {
                            detail_cell_text(state, group, instance, column.as_str())
                        }
                    };
                    let mut style = Style::default().fg(palette.text);
                    if instance.is_some() {
                        style = style.fg(palette.muted);
                    }
                    if selected_row {
                        style = style.bg(palette.selection);
                    }
                    if selected_row && *position == view_data.table.selected_col {
                        style = Style::default()
                            .fg(Color::Black)
                            .bg(palette.accent)
                            .add_modifier(Modifier::BOLD);
                    }
                    Cell::from(text).style(style)
                })
                .collect::<Vec<_>>();
            Some(Row::new(cells))
        });

    let table = Table::new(rows, widths)
        .header(header)
        .column_spacing(1)
        .block(block);
    frame.render_widget(table, area);
}

fn table_title(state: &InventoryState) -> String {
    let loading = state
        .columns()
        .visible_columns()
        .iter()
        .filter(|column| state.loader().is_loading(column.as_str()))
        .count();
    let expanded = state.expanded().len();
    let mut title = format!("servers ({})", state.rows().groups().len());
    if expanded > 0 {
        title.push_str(&format!(" | {expanded} expanded"));
    }
    if loading > 0 {
        title.push_str(&format!(" | loading {loading} {LOADING_GLYPH}"));
    }
    title
}

fn header_label(state: &InventoryState, column: &str) -> String {
    let mut label = state.catalog().display_name(column).to_owned();
    if state.query().get(SORT) == Some(column) {
        label.push_str(if state.query().get(ORDER) == Some("desc") {
            " ▼"
        } else {
            " ▲"
        });
    }
    if state.loader().error_message(column).is_some() {
        label.push(' ');
        label.push_str(ERROR_GLYPH);
    }
    label
}

fn primary_cell_text(state: &InventoryState, group: &RowGroup, column: &str) -> String {
    let text = state.cell_text(group, column);
    if column != SERVER_COLUMN {
        return text;
    }
    if !group.is_expandable() {
        return format!("  {text}");
    }
    let marker = if state.expanded().contains(group.row.hostname.as_str()) {
        "▾"
    } else {
        "▸"
    };
    format!("{marker} {text} ({})", group.row.instance_count)
}

fn detail_cell_text(
    state: &InventoryState,
    group: &RowGroup,
    instance: usize,
    column: &str,
) -> String {
    let text = state.detail_text(group, instance, column);
    if column != SERVER_COLUMN {
        return text;
    }
    if instance == 0 {
        format!("▾ {} {text}", group.row.hostname)
    } else {
        format!("  └ {text}")
    }
}

fn panel_text(state: &InventoryState, view_data: &ViewData) -> String {
    panel_entries(state)
        .iter()
        .enumerate()
        .map(|(index, entry)| {
            let prefix = if index == view_data.panel.cursor {
                "> "
            } else {
                "  "
            };
            format!("{prefix}{}", panel_entry_text(state, entry))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn panel_entry_text(state: &InventoryState, entry: &PanelEntry) -> String {
    match entry {
        PanelEntry::SelectAll => {
            format!("{} select all", state.columns().select_all_state().glyph())
        }
        PanelEntry::Category(id) => {
            let categories = state.categories();
            let marker = if categories.is_expanded(id.as_str()) {
                "▾"
            } else {
                "▸"
            };
            let name = categories
                .node(id.as_str())
                .map(|node| node.name.as_str())
                .unwrap_or(id.as_str());
            format!(
                "{marker} {} {name}",
                categories.state(id.as_str(), state.columns()).glyph()
            )
        }
        PanelEntry::Column(column) => {
            let columns = state.columns();
            let mark = if columns.is_locked(column.as_str()) {
                "[#]"
            } else if columns.is_visible(column.as_str()) {
                "[x]"
            } else {
                "[ ]"
            };
            format!(
                "    {mark} {}",
                state.catalog().display_name(column.as_str())
            )
        }
    }
}

fn status_text(state: &InventoryState, view_data: &ViewData) -> String {
    let mode = if view_data.alert.is_some() {
        "ALERT"
    } else if state.modal().is_some() || view_data.filter_input.visible {
        "DIALOG"
    } else if view_data.focus == Focus::Panel {
        "COLUMNS"
    } else {
        "NAV"
    };
    let hints = key_hints(state, view_data);
    match &state.status_line {
        Some(status) => format!("{mode} | {status} | {hints}"),
        None => format!("{mode} | {hints}"),
    }
}

fn key_hints(state: &InventoryState, view_data: &ViewData) -> &'static str {
    if view_data.alert.is_some() {
        return "any key dismiss";
    }
    if view_data.filter_input.visible {
        return "type terms | down/up pick | enter add | esc cancel";
    }
    match state.modal() {
        Some(Modal::ChartBuilder(builder)) if builder.is_dropdown_open() => {
            "j/k pick | enter open | d delete | o close list | esc close"
        }
        Some(Modal::ChartBuilder(_)) => {
            "j/k chart | h/l field | t type | +/- add/remove | o saved | enter open | esc close"
        }
        Some(Modal::Annotation(editor)) if editor.kind() == AnnotationKind::Discrepancy => {
            "tab field | enter save | ctrl+x clear | esc close"
        }
        Some(Modal::Annotation(_)) => "tab field | left/right choose | enter save | esc close",
        Some(Modal::ServerDetails(_)) => "type filter | up/down scroll | ctrl+e export | esc close",
        Some(Modal::SaveSearch(_)) => {
            "type name | enter save | up/down pick | ctrl+o open | ctrl+d delete | esc close"
        }
        None if view_data.focus == Focus::Panel => {
            "j/k move | space check | enter expand | a/A all/none | tab table"
        }
        None => "j/k/h/l | space expand | enter details | f filter | p apply | tab columns | ? help | ctrl+q",
    }
}

fn filter_input_text(state: &InventoryState, view_data: &ViewData) -> String {
    let input = &view_data.filter_input;
    let Some(column) = &input.column else {
        return String::new();
    };
    let mut lines = vec![
        format!("column: {}", state.catalog().display_name(column.as_str())),
        format!("terms: {}", input.text),
        String::new(),
    ];
    let suggestions = filter_suggestions(state, column.as_str(), &input.text);
    if suggestions.is_empty() {
        lines.push("comma or space separated; quotes are ignored".to_owned());
    } else {
        let start = input
            .suggestion
            .unwrap_or_default()
            .saturating_sub(SUGGESTION_LIMIT - 1);
        for (index, value) in suggestions
            .iter()
            .enumerate()
            .skip(start)
            .take(SUGGESTION_LIMIT)
        {
            let prefix = if Some(index) == input.suggestion {
                "> "
            } else {
                "  "
            };
            lines.push(format!("{prefix}{value}"));
        }
    }
    lines.join("\n")
}

fn modal_area(modal: &Modal, screen: Rect) -> Rect {
    match modal {
        Modal::ChartBuilder(_) => centered_rect(70, 60, screen),
        Modal::Annotation(_) => centered_rect(64, 60, screen),
        Modal::ServerDetails(_) => centered_rect(80, 80, screen),
        Modal::SaveSearch(_) => centered_rect(60, 56, screen),
    }
}

fn modal_text(modal: &Modal, catalog: &FieldCatalog) -> String {
    match modal {
        Modal::ChartBuilder(builder) => chart_builder_text(builder, catalog),
        Modal::Annotation(editor) => annotation_text(editor),
        Modal::ServerDetails(details) => server_details_text(details),
        Modal::SaveSearch(dialog) => save_search_text(dialog),
    }
}

fn chart_builder_text(builder: &ChartBuilder, catalog: &FieldCatalog) -> String {
    let mut lines = Vec::new();
    for (index, selector) in builder.selectors().iter().enumerate() {
        let prefix = if index == builder.focus() { "> " } else { "  " };
        let field = builder
            .selected_field(index)
            .map(|key| catalog.display_name(key.as_str()))
            .unwrap_or("(pick a field)");
        lines.push(format!(
            "{prefix}chart {}: {field} [{}]",
            index + 1,
            selector.chart_type.label()
        ));
    }
    lines.push(String::new());
    if builder.is_dropdown_open() {
        lines.push("saved views:".to_owned());
        if builder.saved().is_empty() {
            lines.push("  (none)".to_owned());
        }
        for (index, chart) in builder.saved().iter().enumerate() {
            let prefix = if index == builder.saved_cursor() {
                "> "
            } else {
                "  "
            };
            lines.push(format!("{prefix}{}", chart.name));
        }
    } else {
        lines.push(format!(
            "{} saved views (o to browse)",
            builder.saved().len()
        ));
    }
    lines.join("\n")
}

fn annotation_text(editor: &AnnotationEditor) -> String {
    match editor.load_state() {
        AnnotationLoad::Loading => return format!("loading annotation {LOADING_GLYPH}"),
        AnnotationLoad::Failed(message) => {
            return format!("could not load annotation: {message}\n\nesc close");
        }
        AnnotationLoad::Ready => {}
    }

    let mut lines = Vec::new();
    for (index, field) in editor.fields().into_iter().enumerate() {
        let prefix = if index == editor.focus() { "> " } else { "  " };
        let value = editor.value(field);
        if field.is_choice() {
            lines.push(format!("{prefix}{}: < {value} >", field.label()));
        } else {
            lines.push(format!("{prefix}{}: {value}", field.label()));
        }
    }
    if editor.kind() == AnnotationKind::Group {
        lines.push(String::new());
        lines.push(format!("shown as: {}", editor.group().display_status()));
    }
    if editor.kind() == AnnotationKind::Discrepancy && !editor.history().is_empty() {
        lines.push(String::new());
        lines.push("history:".to_owned());
        for entry in editor.history() {
            lines.push(format!(
                "  {} {}: {} -> {}",
                entry.date, entry.user, entry.comment, entry.assigned_to
            ));
        }
    }
    lines.join("\n")
}

fn server_details_text(details: &ServerDetails) -> String {
    let mut lines = vec![format!("filter: {}", details.filter()), String::new()];
    let mut body = Vec::new();
    for section in details.visible_sections() {
        body.push(format!("[{}]", section.name));
        for field in section.fields {
            body.push(format!("  {}: {}", field.label, field.value));
        }
    }
    if body.is_empty() {
        lines.push("(no fields match)".to_owned());
    } else {
        lines.extend(body.into_iter().skip(details.scroll()));
    }
    lines.join("\n")
}

fn save_search_text(dialog: &SaveSearchDialog) -> String {
    let mut lines = vec![
        format!("name: {}", dialog.name()),
        String::new(),
        "saved searches:".to_owned(),
    ];
    if dialog.searches().is_empty() {
        lines.push("  (none yet)".to_owned());
    }
    for (index, search) in dialog.searches().iter().enumerate() {
        let prefix = if index == dialog.cursor() { "> " } else { "  " };
        lines.push(format!("{prefix}{}", search.name));
    }
    lines.join("\n")
}

fn help_overlay_text() -> &'static str {
    "global: ctrl+q quit | ? help | any key dismisses an alert\n\
nav: j/k/h/l g/G ^/$ ctrl+d/u pgup/pgdn | space expand | x collapse all | enter/i details\n\
filters: f add on column | [/] pick tag | - remove tag | p apply | P clear\n\
listing: </> page | z page size | s sort | v flat/grouped | r reload | ctrl+r refetch columns\n\
history: H back | L forward (expanded rows come back with the listing)\n\
tools: c charts | m annotate | M group status | w saved searches | t theme | tab columns\n\
columns: j/k move | space check | enter expand category | a/A all/none | tab/esc back\n\
charts: j/k chart | h/l field | t/T type | +/- add/remove | o saved views | enter open\n\
annotation: tab/shift+tab field | left/right choose | enter or ctrl+s save | ctrl+x clear\n\
details: type to filter | up/down scroll | ctrl+e export json\n\
saved searches: type name | enter save | up/down pick | ctrl+o open | ctrl+d delete\n\
dialogs: esc or click outside to close"
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
