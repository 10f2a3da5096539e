// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use std::collections::BTreeMap;
use std::time::Instant;
use time::Date;
use tracing::{debug, warn};

use crate::categories::CategoryTree;
use crate::columns::ColumnVisibility;
use crate::filters::{FilterSet, FilterTag, page_query, page_size_query};
use crate::forms::{FormKind, FormPayload};
use crate::history::{NavigationHistory, Travel};
use crate::ids::{CategoryId, ChartId, ColumnId, Hostname, SearchId};
use crate::loader::{
    CellPaint, LazyColumnLoader, LoadRequest, MISSING_GLYPH, PageContext,
};
use crate::modals::{
    AnnotationEditor, ChartBuilder, Dismissal, Modal, SaveSearchDialog, ServerDetails,
    saved_chart_url,
};
use crate::model::{
    AnnotationKind, AnnotationRecord, ColumnDataResponse, FieldCatalog, SERVER_COLUMN,
    SavedChart, SavedSearch, ServerPage, Theme, ViewMode,
};
use crate::query::{ORDER, PAGE, QueryParams, SCROLL_LEFT, SORT, VIEW};
use crate::rows::{DisplayRow, ExpandedServers, RowGroup, ServerRows};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingSettings {
    pub app_name: String,
    pub permanent_filter: Option<String>,
}

impl Default for ListingSettings {
    fn default() -> Self {
        Self {
            app_name: "inventory".to_owned(),
            permanent_filter: None,
        }
    }
}

/// Everything the inventory list page knows. The UI layer reads it by
/// reference and changes it only through [`InventoryState::dispatch`].
#[derive(Debug, Clone)]
pub struct InventoryState {
    settings: ListingSettings,
    catalog: FieldCatalog,
    query: QueryParams,
    filters: FilterSet,
    columns: ColumnVisibility,
    categories: CategoryTree,
    loader: LazyColumnLoader,
    rows: ServerRows,
    total: usize,
    expanded: ExpandedServers,
    history: NavigationHistory,
    modal: Option<Modal>,
    scroll_left: u16,
    theme: Theme,
    pub status_line: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Reload,
    /// Reloads the previous or next listing; expanded rows replay on arrival.
    Travel(Travel),
    PageLoaded {
        query: QueryParams,
        page: ServerPage,
        at: Instant,
    },
    AddFilter {
        column: ColumnId,
        raw: String,
    },
    SelectListValue {
        column: ColumnId,
        value: String,
    },
    RemoveFilter {
        column: ColumnId,
        term: String,
    },
    ApplyFilters,
    ClearFilters,
    SetPageSize(usize),
    GoToPage(usize),
    SortBy(ColumnId),
    ToggleView,
    SetColumnVisible {
        column: ColumnId,
        visible: bool,
        at: Instant,
    },
    SelectAll {
        visible: bool,
        at: Instant,
    },
    ToggleCategory {
        id: CategoryId,
        at: Instant,
    },
    ToggleCategoryExpanded(CategoryId),
    ColumnsLoaded {
        request: LoadRequest,
        response: ColumnDataResponse,
        at: Instant,
    },
    ColumnsFailed {
        request: LoadRequest,
        message: String,
    },
    RefreshColumns {
        at: Instant,
    },
    RestoreExpanded(ExpandedServers),
    ToggleRow(Hostname),
    CollapseAll,
    SetScrollLeft(u16),
    OpenChartBuilder,
    ChartsListed(Result<Vec<SavedChart>, String>),
    SubmitChart,
    OpenSavedChart,
    DeleteSavedChart,
    ChartDeleted {
        id: ChartId,
        result: Result<(), String>,
    },
    OpenAnnotation {
        host: Hostname,
        kind: AnnotationKind,
    },
    AnnotationLoaded(Result<AnnotationRecord, String>),
    SaveAnnotation,
    ClearAnnotation,
    OpenServerDetails(Hostname),
    ExportDetails {
        date: Date,
    },
    OpenSaveSearch,
    SearchesListed(Result<Vec<SavedSearch>, String>),
    SaveSearch,
    OpenSavedSearch,
    DeleteSavedSearch,
    SearchDeleted {
        id: SearchId,
        result: Result<(), String>,
    },
    FormSubmitted {
        kind: FormKind,
        result: Result<String, String>,
    },
    DismissModal(Dismissal),
    ThemeLoaded(Theme),
    ToggleTheme,
    ClearStatus,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// History replace: the query changed without a page load.
    QueryReplaced(QueryParams),
    /// Full navigation: the runtime loads this listing and reports back with
    /// [`Command::PageLoaded`].
    Navigate(QueryParams),
    FiltersChanged(Vec<FilterTag>),
    ColumnsChanged(Vec<ColumnId>),
    LoadColumns(LoadRequest),
    ColumnsPainted(Vec<ColumnId>),
    ExpandedChanged(ExpandedServers),
    ModalOpened,
    ModalClosed,
    FetchCharts { app_name: String },
    DeleteChart(ChartId),
    FetchAnnotation { host: Hostname, kind: AnnotationKind },
    FetchSearches,
    DeleteSearch(SearchId),
    SubmitForm(FormPayload),
    OpenUrl(String),
    WriteFile { name: String, contents: String },
    ThemeChanged(Theme),
    Alert(String),
    StatusUpdated(String),
    StatusCleared,
}

impl InventoryState {
    pub fn new(catalog: FieldCatalog, query: QueryParams, settings: ListingSettings) -> Self {
        let columns = ColumnVisibility::from_catalog(&catalog);
        let categories = CategoryTree::from_catalog(&catalog);
        let mut state = Self {
            settings,
            catalog,
            query: QueryParams::new(),
            filters: FilterSet::new(),
            columns,
            categories,
            loader: LazyColumnLoader::default(),
            rows: ServerRows::default(),
            total: 0,
            expanded: ExpandedServers::new(),
            history: NavigationHistory::new(),
            modal: None,
            scroll_left: 0,
            theme: Theme::default(),
            status_line: None,
        };
        state.restore_query(query);
        state
    }

    pub fn settings(&self) -> &ListingSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn columns(&self) -> &ColumnVisibility {
        &self.columns
    }

    pub fn categories(&self) -> &CategoryTree {
        &self.categories
    }

    pub fn history(&self) -> &NavigationHistory {
        &self.history
    }

    pub fn loader(&self) -> &LazyColumnLoader {
        &self.loader
    }

    pub fn rows(&self) -> &ServerRows {
        &self.rows
    }

    pub fn expanded(&self) -> &ExpandedServers {
        &self.expanded
    }

    pub fn modal(&self) -> Option<&Modal> {
        self.modal.as_ref()
    }

    /// Text entry and cursor movement inside a modal go straight to the
    /// controller; anything with side effects goes through `dispatch`.
    pub fn modal_mut(&mut self) -> Option<&mut Modal> {
        self.modal.as_mut()
    }

    pub fn scroll_left(&self) -> u16 {
        self.scroll_left
    }

    pub fn theme(&self) -> Theme {
        self.theme
    }

    pub fn view_mode(&self) -> ViewMode {
        ViewMode::parse(self.query.get(VIEW))
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn page(&self) -> usize {
        self.query.page()
    }

    pub fn page_count(&self) -> usize {
        let page_size = self.query.page_size().max(1);
        self.total.div_ceil(page_size).max(1)
    }

    pub fn display_rows(&self) -> Vec<DisplayRow> {
        self.rows.display_rows(&self.expanded)
    }

    /// Text of a primary-row cell: lazily loaded value when requested,
    /// otherwise the eagerly rendered one.
    pub fn cell_text(&self, group: &RowGroup, column: &str) -> String {
        let host = group.row.hostname.as_str();
        if column == SERVER_COLUMN {
            return host.to_owned();
        }
        match self.loader.paint(column, host) {
            CellPaint::Unrequested => group
                .row
                .cells
                .get(column)
                .filter(|value| !value.is_empty())
                .cloned()
                .unwrap_or_else(|| MISSING_GLYPH.to_owned()),
            paint => paint.text(),
        }
    }

    /// Text of a detail-row cell. The server column carries the `i/n`
    /// badge; other columns read the instance value filled for that column.
    pub fn detail_text(&self, group: &RowGroup, instance: usize, column: &str) -> String {
        let Some(detail) = group.details().get(instance) else {
            return String::new();
        };
        if column == SERVER_COLUMN {
            return detail.badge().to_owned();
        }
        if let Some(text) =
            self.loader
                .instance_text(column, group.row.hostname.as_str(), instance)
        {
            return text;
        }
        detail.value(column).unwrap_or_default().to_owned()
    }

    pub fn dispatch(&mut self, command: Command) -> Vec<Event> {
        match command {
            Command::Reload => vec![Event::Navigate(self.query.clone())],
            Command::Travel(travel) => match self.history.begin(travel) {
                Some(target) => vec![Event::Navigate(target)],
                None => {
                    let message = match travel {
                        Travel::Back => "no earlier listing",
                        Travel::Forward => "no later listing",
                    };
                    vec![self.set_status(message)]
                }
            },
            Command::PageLoaded { query, page, at } => self.page_loaded(query, page, at),
            Command::AddFilter { column, raw } => {
                let result = self.filters.add_terms(column.as_str(), &raw);
                self.filters_mutated(column, result)
            }
            Command::SelectListValue { column, value } => {
                let result = self.filters.add_exact(column.as_str(), &value);
                self.filters_mutated(column, result)
            }
            Command::RemoveFilter { column, term } => {
                let changed = self.filters.remove_term(column.as_str(), &term);
                if changed.is_empty() {
                    return Vec::new();
                }
                for column in &changed {
                    self.filters.write_column(&mut self.query, column.as_str());
                }
                vec![
                    Event::QueryReplaced(self.query.clone()),
                    Event::FiltersChanged(self.filters.tags()),
                ]
            }
            Command::ApplyFilters => vec![Event::Navigate(self.filters.apply_query(
                &self.query,
                &self.catalog,
                self.scroll_left,
            ))],
            Command::ClearFilters => vec![Event::Navigate(self.filters.clear_query(
                &self.query,
                &self.catalog,
                self.scroll_left,
            ))],
            Command::SetPageSize(page_size) => {
                if page_size == 0 {
                    return vec![self.alert("page size must be positive -- pick a size and retry")];
                }
                vec![Event::Navigate(page_size_query(&self.query, page_size))]
            }
            Command::GoToPage(page) => {
                let page = page.clamp(1, self.page_count());
                if page == self.page() {
                    return Vec::new();
                }
                vec![Event::Navigate(page_query(&self.query, page))]
            }
            Command::SortBy(column) => {
                let mut next = self.query.clone();
                let order = if self.query.get(SORT) == Some(column.as_str())
                    && self.query.get(ORDER) != Some("desc")
                {
                    "desc"
                } else {
                    "asc"
                };
                next.set(SORT, column.as_str());
                next.set(ORDER, order);
                next.delete(PAGE);
                vec![Event::Navigate(next)]
            }
            Command::ToggleView => {
                let mut next = self.query.clone();
                match self.view_mode() {
                    ViewMode::Grouped => next.set(VIEW, ViewMode::Flat.as_str()),
                    ViewMode::Flat => next.delete(VIEW),
                }
                vec![Event::Navigate(next)]
            }
            Command::SetColumnVisible {
                column,
                visible,
                at,
            } => match self.columns.set_visible(column.as_str(), visible) {
                Ok(true) => self.columns_mutated(vec![column], at),
                Ok(false) => Vec::new(),
                Err(error) => vec![self.alert(&format!("{error:#}"))],
            },
            Command::SelectAll { visible, at } => {
                let changed = self.columns.select_all(visible);
                self.columns_mutated(changed, at)
            }
            Command::ToggleCategory { id, at } => {
                let checked = self.categories.next_checked(id.as_str(), &self.columns);
                match self
                    .categories
                    .toggle(id.as_str(), checked, &mut self.columns)
                {
                    Ok(changed) => self.columns_mutated(changed, at),
                    Err(error) => vec![self.alert(&format!("{error:#}"))],
                }
            }
            Command::ToggleCategoryExpanded(id) => {
                match self
                    .categories
                    .toggle_expanded(id.as_str(), &mut self.query)
                {
                    Ok(_) => vec![Event::QueryReplaced(self.query.clone())],
                    Err(error) => vec![self.alert(&format!("{error:#}"))],
                }
            }
            Command::ColumnsLoaded {
                request,
                response,
                at,
            } => {
                if let Some(error) = response.error.clone() {
                    return self.columns_failed(&request, &error);
                }
                let outcome = self.loader.complete(&request, &response, at);
                if outcome.applied.is_empty() {
                    return Vec::new();
                }
                vec![Event::ColumnsPainted(outcome.applied)]
            }
            Command::ColumnsFailed { request, message } => {
                self.columns_failed(&request, &message)
            }
            Command::RefreshColumns { at } => {
                self.loader.clear_cache(None);
                let mut events = vec![self.set_status("column cache cleared")];
                events.extend(self.load_columns(self.columns.visible_columns(), at));
                events
            }
            Command::RestoreExpanded(expanded) => {
                self.expanded = expanded;
                self.rows.replay(&self.expanded);
                Vec::new()
            }
            Command::ToggleRow(host) => self.toggle_row(&host),
            Command::CollapseAll => {
                if self.expanded.is_empty() {
                    return Vec::new();
                }
                self.expanded.clear();
                vec![Event::ExpandedChanged(self.expanded.clone())]
            }
            Command::SetScrollLeft(offset) => {
                self.scroll_left = offset;
                Vec::new()
            }
            Command::OpenChartBuilder => {
                let builder = ChartBuilder::new(
                    &self.catalog,
                    self.settings.app_name.clone(),
                    self.settings.permanent_filter.clone(),
                );
                let mut events = self.open_modal(Modal::ChartBuilder(builder));
                events.push(Event::FetchCharts {
                    app_name: self.settings.app_name.clone(),
                });
                events
            }
            Command::ChartsListed(result) => {
                let Some(Modal::ChartBuilder(builder)) = self.modal.as_mut() else {
                    return Vec::new();
                };
                match result {
                    Ok(charts) => {
                        builder.set_saved(charts);
                        Vec::new()
                    }
                    Err(error) => vec![self.set_status(&format!("Error loading views: {error}"))],
                }
            }
            Command::SubmitChart => {
                let Some(Modal::ChartBuilder(builder)) = self.modal.as_ref() else {
                    return Vec::new();
                };
                match builder.submit(&self.query) {
                    Ok(url) => {
                        let mut events = vec![Event::OpenUrl(url)];
                        events.extend(self.close_modal());
                        events
                    }
                    Err(error) => vec![self.alert(&format!("{error:#}"))],
                }
            }
            Command::OpenSavedChart => {
                let Some(Modal::ChartBuilder(builder)) = self.modal.as_mut() else {
                    return Vec::new();
                };
                let Some(chart) = builder.selected_saved() else {
                    return Vec::new();
                };
                let url = saved_chart_url(builder.app_name(), chart);
                builder.close_dropdown();
                vec![Event::OpenUrl(url)]
            }
            Command::DeleteSavedChart => match self.modal.as_ref() {
                Some(Modal::ChartBuilder(builder)) => builder
                    .selected_saved()
                    .map(|chart| vec![Event::DeleteChart(chart.id)])
                    .unwrap_or_default(),
                _ => Vec::new(),
            },
            Command::ChartDeleted { id, result } => match result {
                Ok(()) => {
                    if let Some(Modal::ChartBuilder(builder)) = self.modal.as_mut() {
                        builder.remove_saved(id);
                    }
                    vec![self.set_status("chart deleted")]
                }
                Err(error) => vec![self.alert(&format!("Error deleting chart: {error}"))],
            },
            Command::OpenAnnotation { host, kind } => {
                let editor = AnnotationEditor::new(host.clone(), kind);
                let mut events = self.open_modal(Modal::Annotation(editor));
                events.push(Event::FetchAnnotation { host, kind });
                events
            }
            Command::AnnotationLoaded(result) => {
                let Some(Modal::Annotation(editor)) = self.modal.as_mut() else {
                    return Vec::new();
                };
                match result {
                    Ok(AnnotationRecord::Discrepancy(record)) => editor.load_discrepancy(record),
                    Ok(AnnotationRecord::Group(record)) => editor.load_group(record),
                    Err(error) => {
                        warn!(host = %editor.host(), error = %error, "annotation load failed");
                        editor.fail(error);
                    }
                }
                Vec::new()
            }
            Command::SaveAnnotation => self.submit_annotation(false),
            Command::ClearAnnotation => self.submit_annotation(true),
            Command::OpenServerDetails(host) => {
                let Some(group) = self.rows.group(host.as_str()) else {
                    return vec![self.alert(&format!("server {host} is not on this page"))];
                };
                let values = self.detail_values(group);
                let details = ServerDetails::new(&self.catalog, host, &values);
                self.open_modal(Modal::ServerDetails(details))
            }
            Command::ExportDetails { date } => {
                let Some(Modal::ServerDetails(details)) = self.modal.as_ref() else {
                    return Vec::new();
                };
                match details.export_json() {
                    Ok(contents) => vec![Event::WriteFile {
                        name: details.export_file_name(date),
                        contents,
                    }],
                    Err(error) => vec![self.alert(&format!("{error:#}"))],
                }
            }
            Command::OpenSaveSearch => {
                let mut events = self.open_modal(Modal::SaveSearch(SaveSearchDialog::default()));
                events.push(Event::FetchSearches);
                events
            }
            Command::SearchesListed(result) => {
                let Some(Modal::SaveSearch(dialog)) = self.modal.as_mut() else {
                    return Vec::new();
                };
                match result {
                    Ok(searches) => {
                        dialog.set_searches(searches);
                        Vec::new()
                    }
                    Err(error) => {
                        vec![self.set_status(&format!("Error loading saved searches: {error}"))]
                    }
                }
            }
            Command::SaveSearch => {
                let Some(Modal::SaveSearch(dialog)) = self.modal.as_ref() else {
                    return Vec::new();
                };
                match dialog.payload(&self.query, self.filters.tags()) {
                    Ok(payload) => vec![Event::SubmitForm(payload)],
                    Err(error) => vec![self.alert(&format!("{error:#}"))],
                }
            }
            Command::OpenSavedSearch => {
                let Some(Modal::SaveSearch(dialog)) = self.modal.as_ref() else {
                    return Vec::new();
                };
                let Some(search) = dialog.selected() else {
                    return Vec::new();
                };
                let target = QueryParams::parse(search.url.split_once('?').map_or(
                    search.url.as_str(),
                    |(_, query)| query,
                ));
                let mut events = self.close_modal();
                events.push(Event::Navigate(target));
                events
            }
            Command::DeleteSavedSearch => match self.modal.as_ref() {
                Some(Modal::SaveSearch(dialog)) => dialog
                    .selected()
                    .map(|search| vec![Event::DeleteSearch(search.id)])
                    .unwrap_or_default(),
                _ => Vec::new(),
            },
            Command::SearchDeleted { id, result } => match result {
                Ok(()) => {
                    if let Some(Modal::SaveSearch(dialog)) = self.modal.as_mut() {
                        dialog.remove(id);
                    }
                    vec![self.set_status("search deleted")]
                }
                Err(error) => vec![self.alert(&format!("Error deleting search: {error}"))],
            },
            Command::FormSubmitted { kind, result } => match result {
                Ok(message) => {
                    let message = if message.is_empty() {
                        format!("{} saved", kind.title())
                    } else {
                        message
                    };
                    let mut events = self.close_modal();
                    events.push(self.set_status(&message));
                    if kind != FormKind::SaveSearch {
                        events.push(Event::Navigate(self.query.clone()));
                    }
                    events
                }
                Err(error) => vec![self.alert(&format!("Error: {error}"))],
            },
            Command::DismissModal(how) => {
                let Some(modal) = self.modal.as_mut() else {
                    return Vec::new();
                };
                if modal.dismiss(how) {
                    self.close_modal()
                } else {
                    Vec::new()
                }
            }
            Command::ThemeLoaded(theme) => {
                self.theme = theme;
                Vec::new()
            }
            Command::ToggleTheme => {
                self.theme = self.theme.toggled();
                vec![
                    Event::ThemeChanged(self.theme),
                    self.set_status(&format!("{} theme", self.theme.as_str())),
                ]
            }
            Command::ClearStatus => {
                self.status_line = None;
                vec![Event::StatusCleared]
            }
        }
    }

    /// Reads page state out of a freshly navigated query. `scrollLeft` is
    /// consumed here and stripped.
    fn restore_query(&mut self, mut query: QueryParams) -> bool {
        let mut stripped = false;
        if let Some(raw) = query.get(SCROLL_LEFT) {
            self.scroll_left = raw.trim().parse().unwrap_or(0);
            query.delete(SCROLL_LEFT);
            stripped = true;
        }
        self.filters = FilterSet::from_query(&query);
        self.columns = ColumnVisibility::from_catalog(&self.catalog);
        self.columns.restore_from_query(&query);
        self.categories.restore_from_query(&query);
        self.query = query;
        stripped
    }

    fn page_loaded(&mut self, query: QueryParams, page: ServerPage, at: Instant) -> Vec<Event> {
        let mut events = Vec::new();
        let previous = self.query.clone();
        if self.restore_query(query) {
            events.push(Event::QueryReplaced(self.query.clone()));
        }
        self.history.arrive(&previous, &self.query);
        self.total = page.total;
        self.rows = ServerRows::new(page.rows);
        self.rows.replay(&self.expanded);
        self.loader
            .set_context(PageContext::from_query(&self.query, self.rows.hostnames()));
        debug!(
            rows = self.rows.groups().len(),
            total = self.total,
            page = self.page(),
            "listing page loaded"
        );
        events.push(Event::FiltersChanged(self.filters.tags()));
        events.extend(self.load_columns(self.columns.visible_columns(), at));
        events
    }

    fn filters_mutated(
        &mut self,
        column: ColumnId,
        result: anyhow::Result<Vec<String>>,
    ) -> Vec<Event> {
        match result {
            Ok(added) if added.is_empty() => Vec::new(),
            Ok(_) => {
                self.filters.write_column(&mut self.query, column.as_str());
                vec![
                    Event::QueryReplaced(self.query.clone()),
                    Event::FiltersChanged(self.filters.tags()),
                ]
            }
            Err(error) => vec![self.alert(&format!("{error:#}"))],
        }
    }

    fn columns_mutated(&mut self, changed: Vec<ColumnId>, at: Instant) -> Vec<Event> {
        if changed.is_empty() {
            return Vec::new();
        }
        self.columns.write_query(&mut self.query);
        let shown: Vec<ColumnId> = changed
            .iter()
            .filter(|column| self.columns.is_visible(column.as_str()))
            .cloned()
            .collect();
        let mut events = vec![
            Event::QueryReplaced(self.query.clone()),
            Event::ColumnsChanged(changed),
        ];
        events.extend(self.load_columns(shown, at));
        events
    }

    /// Columns some row already carries need no fetch.
    fn is_lazy(&self, column: &str) -> bool {
        column != SERVER_COLUMN
            && !self
                .rows
                .groups()
                .iter()
                .any(|group| group.row.cells.contains_key(column))
    }

    fn load_columns(&mut self, columns: Vec<ColumnId>, at: Instant) -> Vec<Event> {
        if self.rows.groups().is_empty() {
            return Vec::new();
        }
        let lazy: Vec<ColumnId> = columns
            .into_iter()
            .filter(|column| self.is_lazy(column.as_str()))
            .collect();
        if lazy.is_empty() {
            return Vec::new();
        }
        let plan = self.loader.plan(&lazy, at);
        let mut events = Vec::new();
        if !plan.from_cache.is_empty() {
            events.push(Event::ColumnsPainted(plan.from_cache));
        }
        if let Some(request) = plan.request {
            events.push(Event::LoadColumns(request));
        }
        events
    }

    fn columns_failed(&mut self, request: &LoadRequest, message: &str) -> Vec<Event> {
        let outcome = self.loader.fail(request, message);
        if outcome.applied.is_empty() {
            return Vec::new();
        }
        vec![self.set_status(&format!("column load failed: {message}"))]
    }

    fn toggle_row(&mut self, host: &Hostname) -> Vec<Event> {
        let Some(group) = self.rows.group_mut(host.as_str()) else {
            return Vec::new();
        };
        if !group.is_expandable() {
            return Vec::new();
        }
        if !self.expanded.contains(host.as_str())
            && let Err(error) = group.ensure_details()
        {
            warn!(host = %host, error = %format!("{error:#}"), "instance data unreadable");
            return vec![self.alert(&format!("{error:#}"))];
        }
        self.expanded.toggle(host.as_str());
        vec![Event::ExpandedChanged(self.expanded.clone())]
    }

    fn detail_values(&self, group: &RowGroup) -> BTreeMap<ColumnId, String> {
        let mut values = group.row.cells.clone();
        values.insert(ColumnId::from(SERVER_COLUMN), group.row.hostname.to_string());
        for field in self.catalog.fields() {
            if let CellPaint::Value(value) =
                self.loader.paint(field.key.as_str(), group.row.hostname.as_str())
            {
                values.insert(field.key.clone(), value.text().to_owned());
            }
        }
        values
    }

    fn submit_annotation(&mut self, clear: bool) -> Vec<Event> {
        let Some(Modal::Annotation(editor)) = self.modal.as_ref() else {
            return Vec::new();
        };
        let payload = if clear {
            editor.clear_payload()
        } else {
            editor.payload()
        };
        match payload {
            Ok(payload) => vec![Event::SubmitForm(payload)],
            Err(error) => vec![self.alert(&format!("{error:#}"))],
        }
    }

    fn open_modal(&mut self, modal: Modal) -> Vec<Event> {
        self.modal = Some(modal);
        vec![Event::ModalOpened]
    }

    fn close_modal(&mut self) -> Vec<Event> {
        if self.modal.take().is_none() {
            return Vec::new();
        }
        vec![Event::ModalClosed]
    }

    fn alert(&mut self, message: &str) -> Event {
        self.status_line = Some(message.to_owned());
        Event::Alert(message.to_owned())
    }

    fn set_status(&mut self, message: &str) -> Event {
        self.status_line = Some(message.to_owned());
        Event::StatusUpdated(message.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::{Command, Event, InventoryState, ListingSettings};
    use crate::forms::{FormKind, FormPayload};
    use crate::history::Travel;
    use crate::loader::LoadRequest;
    use crate::modals::{Dismissal, Modal};
    use crate::model::{
        AnnotationKind, AnnotationRecord, Category, ColumnDataResponse, FieldCatalog, FieldMeta,
        GroupAnnotation, HostPayload, ServerPage, ServerRow,
    };
    use crate::query::QueryParams;
    use crate::rows::DisplayRow;
    use crate::{CategoryId, ColumnId, Hostname};
    use serde_json::{Map, Value, json};
    use std::collections::BTreeMap;
    use std::time::{Duration, Instant};

    fn field(key: &str, category: &str, checked: bool, disabled: bool) -> FieldMeta {
        FieldMeta {
            key: ColumnId::from(key),
            display_name: key.to_uppercase(),
            input_name: key.to_owned(),
            list_id: None,
            category: CategoryId::from(category),
            checked,
            checked_disabled: disabled,
        }
    }

    fn catalog() -> FieldCatalog {
        FieldCatalog::new(
            vec![
                field("server", "general", true, true),
                field("hostname", "general", false, false),
                field("env", "general", true, false),
                field("cpu", "hardware", true, false),
                field("ram", "hardware", false, false),
            ],
            vec![
                Category {
                    id: CategoryId::from("general"),
                    name: "General".to_owned(),
                },
                Category {
                    id: CategoryId::from("hardware"),
                    name: "Hardware".to_owned(),
                },
            ],
        )
    }

    fn row(host: &str, instances: usize) -> ServerRow {
        let instance_json: Vec<Value> = (0..instances)
            .map(|i| {
                json!({
                    "constant_fields": {"env": "PROD"},
                    "variable_fields": {"ip": format!("10.0.0.{i}")}
                })
            })
            .collect();
        let mut cells = BTreeMap::new();
        cells.insert(ColumnId::from("env"), "PROD".to_owned());
        ServerRow {
            hostname: Hostname::from(host),
            cells,
            instance_count: instances,
            instances_json: Value::Array(instance_json).to_string(),
        }
    }

    fn page(rows: Vec<ServerRow>) -> ServerPage {
        ServerPage {
            total: rows.len(),
            rows,
            page: 1,
            page_size: 50,
        }
    }

    fn state(query: &str) -> InventoryState {
        InventoryState::new(
            catalog(),
            QueryParams::parse(query),
            ListingSettings::default(),
        )
    }

    fn load_request(events: &[Event]) -> Option<LoadRequest> {
        events.iter().find_map(|event| match event {
            Event::LoadColumns(request) => Some(request.clone()),
            _ => None,
        })
    }

    fn response(column: &str, hosts: &[&str]) -> ColumnDataResponse {
        let mut data = BTreeMap::new();
        for host in hosts {
            let mut instance = Map::new();
            instance.insert(column.to_owned(), Value::from("8"));
            data.insert(
                Hostname::from(*host),
                HostPayload {
                    instances: vec![instance],
                    ..HostPayload::default()
                },
            );
        }
        ColumnDataResponse { data, error: None }
    }

    #[test]
    fn hostname_filter_then_apply() {
        let mut state = state("?env=PROD&page_size=50");
        let events = state.dispatch(Command::AddFilter {
            column: ColumnId::from("hostname"),
            raw: "prod1, prod2".to_owned(),
        });
        let labels: Vec<String> = state.filters().tags().iter().map(|tag| tag.label()).collect();
        assert_eq!(labels, vec!["ENV: PROD", "HOSTNAME: PROD1", "HOSTNAME: PROD2"]);
        assert!(matches!(events[0], Event::QueryReplaced(_)));
        assert_eq!(state.query().get("hostname"), Some("PROD1,PROD2"));

        let events = state.dispatch(Command::ApplyFilters);
        let [Event::Navigate(target)] = events.as_slice() else {
            panic!("expected navigation, got {events:?}");
        };
        assert!(
            target
                .to_query_string()
                .contains("hostname=PROD1,PROD2&env=PROD&page_size=50"),
            "{}",
            target.to_query_string()
        );
    }

    #[test]
    fn filter_cap_is_an_alert_without_mutation() {
        let mut state = state("");
        let raw: Vec<String> = (0..151).map(|i| format!("h{i}")).collect();
        let events = state.dispatch(Command::AddFilter {
            column: ColumnId::from("hostname"),
            raw: raw.join(","),
        });
        assert!(matches!(events.as_slice(), [Event::Alert(message)] if message.contains("151")));
        assert!(state.filters().is_empty());
        assert!(state.query().is_empty());
    }

    #[test]
    fn removing_sort_drops_order() {
        let mut state = state("sort=cpu&order=asc&env=PROD");
        state.dispatch(Command::RemoveFilter {
            column: ColumnId::from("sort"),
            term: "CPU".to_owned(),
        });
        assert_eq!(state.query().get("sort"), None);
        assert_eq!(state.query().get("order"), None);
        assert_eq!(state.query().get("env"), Some("PROD"));
        assert_eq!(state.filters().tags().len(), 1);
    }

    #[test]
    fn scroll_left_is_restored_and_stripped() {
        let mut state = state("");
        let events = state.dispatch(Command::PageLoaded {
            query: QueryParams::parse("env=PROD&scrollLeft=12"),
            page: page(Vec::new()),
            at: Instant::now(),
        });
        assert_eq!(state.scroll_left(), 12);
        assert!(!state.query().contains("scrollLeft"));
        assert!(matches!(events[0], Event::QueryReplaced(_)));
    }

    #[test]
    fn page_load_fetches_only_lazy_visible_columns() {
        let start = Instant::now();
        let mut state = state("visible_columns=env,cpu");
        let events = state.dispatch(Command::PageLoaded {
            query: state.query().clone(),
            page: page(vec![row("WEB01", 1), row("WEB02", 1)]),
            at: start,
        });
        let request = load_request(&events).expect("cpu needs a fetch");
        assert_eq!(request.columns, vec![ColumnId::from("cpu")]);
        assert_eq!(request.query().get("hostnames"), Some("WEB01,WEB02"));

        let painted = state.dispatch(Command::ColumnsLoaded {
            request,
            response: response("cpu", &["WEB01"]),
            at: start,
        });
        assert_eq!(painted, vec![Event::ColumnsPainted(vec![ColumnId::from("cpu")])]);
        let groups = state.rows().groups();
        assert_eq!(state.cell_text(&groups[0], "cpu"), "8");
        assert_eq!(state.cell_text(&groups[1], "cpu"), "-");
        assert_eq!(state.cell_text(&groups[0], "env"), "PROD");

        let next = QueryParams::parse("visible_columns=env,cpu,ram&page=2");
        let events = state.dispatch(Command::PageLoaded {
            query: next,
            page: page(vec![row("WEB03", 1)]),
            at: start + Duration::from_secs(60),
        });
        assert!(events.contains(&Event::ColumnsPainted(vec![ColumnId::from("cpu")])));
        let request = load_request(&events).expect("ram needs a fetch");
        assert_eq!(request.query().get("columns"), Some("ram"));
    }

    #[test]
    fn failed_load_paints_error_and_allows_retry() {
        let start = Instant::now();
        let mut state = state("visible_columns=cpu");
        let events = state.dispatch(Command::PageLoaded {
            query: state.query().clone(),
            page: page(vec![row("WEB01", 1)]),
            at: start,
        });
        let request = load_request(&events).expect("cpu fetch");
        let events = state.dispatch(Command::ColumnsFailed {
            request,
            message: "HTTP 500".to_owned(),
        });
        assert!(matches!(events.as_slice(), [Event::StatusUpdated(message)] if message.contains("HTTP 500")));
        let group = &state.rows().groups()[0];
        assert_eq!(state.cell_text(group, "cpu"), "!");

        let events = state.dispatch(Command::SetColumnVisible {
            column: ColumnId::from("ram"),
            visible: true,
            at: start,
        });
        let request = load_request(&events).expect("ram fetch");
        assert_eq!(request.columns, vec![ColumnId::from("ram")]);
        assert_eq!(state.query().get("visible_columns"), Some("server,cpu,ram"));
    }

    #[test]
    fn category_toggle_persists_visible_columns() {
        let mut state = state("");
        state.dispatch(Command::ToggleCategory {
            id: CategoryId::from("hardware"),
            at: Instant::now(),
        });
        assert!(state.columns().is_visible("ram"));
        assert_eq!(
            state.query().get("visible_columns"),
            Some("server,env,cpu,ram")
        );
        state.dispatch(Command::ToggleCategoryExpanded(CategoryId::from("hardware")));
        assert_eq!(state.query().get("cat_hardware"), Some("true"));
    }

    #[test]
    fn row_toggle_persists_and_rejects_single_instance() {
        let mut state = state("");
        state.dispatch(Command::PageLoaded {
            query: QueryParams::new(),
            page: page(vec![row("WEB01", 2), row("WEB02", 1)]),
            at: Instant::now(),
        });
        let events = state.dispatch(Command::ToggleRow(Hostname::from("WEB01")));
        assert!(matches!(events.as_slice(), [Event::ExpandedChanged(set)] if set.contains("WEB01")));
        assert_eq!(state.display_rows().len(), 3);

        let group = &state.rows().groups()[0];
        assert_eq!(state.detail_text(group, 1, "server"), "2/2");
        assert_eq!(state.detail_text(group, 1, "env"), "PROD");

        assert!(state.dispatch(Command::ToggleRow(Hostname::from("WEB02"))).is_empty());
        state.dispatch(Command::CollapseAll);
        assert_eq!(state.display_rows().len(), 2);
    }

    #[test]
    fn detail_cells_keep_their_column_when_another_is_hidden() {
        let catalog = FieldCatalog::new(
            vec![
                field("server", "general", true, true),
                field("env", "general", true, false),
                field("os", "general", true, false),
                field("site", "general", true, false),
            ],
            vec![Category {
                id: CategoryId::from("general"),
                name: "General".to_owned(),
            }],
        );
        let mut state = InventoryState::new(catalog, QueryParams::new(), ListingSettings::default());
        let instance = json!({
            "constant_fields": {"env": "PROD", "os": "RHEL8", "site": "PAR"},
            "variable_fields": {}
        });
        let mut cells = BTreeMap::new();
        for (column, value) in [("env", "PROD"), ("os", "RHEL8"), ("site", "PAR")] {
            cells.insert(ColumnId::from(column), value.to_owned());
        }
        let web = ServerRow {
            hostname: Hostname::from("WEB01"),
            cells,
            instance_count: 2,
            instances_json: Value::Array(vec![instance.clone(), instance]).to_string(),
        };
        state.dispatch(Command::PageLoaded {
            query: QueryParams::new(),
            page: page(vec![web]),
            at: Instant::now(),
        });
        state.dispatch(Command::ToggleRow(Hostname::from("WEB01")));
        state.dispatch(Command::SetColumnVisible {
            column: ColumnId::from("env"),
            visible: false,
            at: Instant::now(),
        });

        let group = &state.rows().groups()[0];
        let shown: Vec<(String, String)> = state
            .columns()
            .visible_columns()
            .iter()
            .map(|column| {
                (
                    column.to_string(),
                    state.detail_text(group, 0, column.as_str()),
                )
            })
            .collect();
        assert_eq!(
            shown,
            vec![
                ("server".to_owned(), "1/2".to_owned()),
                ("os".to_owned(), "RHEL8".to_owned()),
                ("site".to_owned(), "PAR".to_owned()),
            ]
        );
    }

    fn paged(rows: Vec<ServerRow>, page: usize) -> ServerPage {
        ServerPage {
            rows,
            total: 2,
            page,
            page_size: 1,
        }
    }

    #[test]
    fn going_back_reloads_the_previous_listing_with_rows_still_expanded() {
        let first = QueryParams::parse("page_size=1");
        let mut state = state("page_size=1");
        state.dispatch(Command::PageLoaded {
            query: first.clone(),
            page: paged(vec![row("WEB01", 2)], 1),
            at: Instant::now(),
        });
        assert!(!state.history().can_go(Travel::Back));
        state.dispatch(Command::ToggleRow(Hostname::from("WEB01")));

        let events = state.dispatch(Command::GoToPage(2));
        let [Event::Navigate(second)] = events.as_slice() else {
            panic!("expected navigation, got {events:?}");
        };
        state.dispatch(Command::PageLoaded {
            query: second.clone(),
            page: paged(vec![row("DB01", 3)], 2),
            at: Instant::now(),
        });
        assert_eq!(state.display_rows(), vec![DisplayRow::Primary { group: 0 }]);

        let events = state.dispatch(Command::Travel(Travel::Back));
        assert_eq!(events, vec![Event::Navigate(first.clone())]);
        state.dispatch(Command::PageLoaded {
            query: first.clone(),
            page: paged(vec![row("WEB01", 2)], 1),
            at: Instant::now(),
        });
        assert_eq!(state.query(), &first);
        assert!(state.expanded().contains("WEB01"));
        assert_eq!(
            state.display_rows(),
            vec![
                DisplayRow::Detail {
                    group: 0,
                    instance: 0
                },
                DisplayRow::Detail {
                    group: 0,
                    instance: 1
                },
            ]
        );
        assert!(!state.history().can_go(Travel::Back));
        assert!(state.history().can_go(Travel::Forward));

        let events = state.dispatch(Command::Travel(Travel::Forward));
        assert!(matches!(events.as_slice(), [Event::Navigate(next)] if next.page() == 2));
    }

    #[test]
    fn going_back_without_history_reports_status() {
        let mut state = state("");
        let events = state.dispatch(Command::Travel(Travel::Back));
        assert_eq!(
            events,
            vec![Event::StatusUpdated("no earlier listing".to_owned())]
        );
    }

    #[test]
    fn chart_builder_submits_and_closes() {
        let mut state = state("env=PROD&page=2");
        state.dispatch(Command::OpenChartBuilder);
        let Some(Modal::ChartBuilder(builder)) = state.modal_mut() else {
            panic!("chart builder should be open");
        };
        builder.set_field(0, "cpu").expect("cpu option");
        let events = state.dispatch(Command::SubmitChart);
        assert_eq!(
            events,
            vec![
                Event::OpenUrl("/inventory/charts/?env=PROD&fields=cpu&types=pie".to_owned()),
                Event::ModalClosed,
            ]
        );
        assert!(state.modal().is_none());
    }

    #[test]
    fn annotation_round_trip_through_events() {
        let mut state = state("");
        let events = state.dispatch(Command::OpenAnnotation {
            host: Hostname::from("WEB01"),
            kind: AnnotationKind::Group,
        });
        assert!(events.contains(&Event::FetchAnnotation {
            host: Hostname::from("WEB01"),
            kind: AnnotationKind::Group
        }));
        state.dispatch(Command::AnnotationLoaded(Ok(AnnotationRecord::Group(
            GroupAnnotation {
                status: "custom".to_owned(),
                ..GroupAnnotation::default()
            },
        ))));
        let events = state.dispatch(Command::SaveAnnotation);
        assert_eq!(
            events,
            vec![Event::Alert("Please enter a custom status".to_owned())]
        );
        assert!(state.modal().is_some());

        let events = state.dispatch(Command::FormSubmitted {
            kind: FormKind::GroupAnnotation,
            result: Ok("Annotation saved".to_owned()),
        });
        assert_eq!(
            events,
            vec![
                Event::ModalClosed,
                Event::StatusUpdated("Annotation saved".to_owned()),
                Event::Navigate(state.query().clone()),
            ]
        );
    }

    #[test]
    fn save_search_requires_filters() {
        let mut state = state("");
        state.dispatch(Command::OpenSaveSearch);
        let events = state.dispatch(Command::SaveSearch);
        assert!(matches!(events.as_slice(), [Event::Alert(message)] if message.starts_with("No filters are selected")));

        let mut state = InventoryState::new(
            catalog(),
            QueryParams::parse("env=PROD"),
            ListingSettings::default(),
        );
        state.dispatch(Command::OpenSaveSearch);
        if let Some(Modal::SaveSearch(dialog)) = state.modal_mut() {
            for ch in "prod".chars() {
                dialog.push_char(ch);
            }
        }
        let events = state.dispatch(Command::SaveSearch);
        assert!(matches!(events.as_slice(), [Event::SubmitForm(FormPayload::SaveSearch(_))]));
    }

    #[test]
    fn escape_closes_modal_and_theme_toggles() {
        let mut state = state("");
        state.dispatch(Command::OpenSaveSearch);
        assert_eq!(
            state.dispatch(Command::DismissModal(Dismissal::Escape)),
            vec![Event::ModalClosed]
        );
        assert!(state.dispatch(Command::DismissModal(Dismissal::Escape)).is_empty());

        let events = state.dispatch(Command::ToggleTheme);
        assert_eq!(events[0], Event::ThemeChanged(crate::Theme::Dark));
    }
}
