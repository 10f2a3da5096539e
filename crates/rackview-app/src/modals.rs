// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Dialog controllers. At most one is open at a time; the owning state
//! decides what closing means for each of them.

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use time::Date;

use crate::filters::FilterTag;
use crate::forms::{
    DiscrepancyAnnotationInput, FormPayload, GroupAnnotationInput, SaveSearchInput,
};
use crate::ids::{ChartId, ColumnId, Hostname, SearchId};
use crate::loader::MISSING_GLYPH;
use crate::model::{
    AnnotationHistoryEntry, AnnotationKind, CUSTOM_STATUS, ChartType, DiscrepancyAnnotation,
    FieldCatalog, FieldMeta, GROUP_PRIORITIES, GROUP_STATUSES, GroupAnnotation, SavedChart,
    SavedSearch, value_text,
};
use crate::query::{CATEGORY_PREFIX, PAGE, PAGE_SIZE, QueryParams, VISIBLE_COLUMNS};

pub const MAX_CHARTS: usize = 4;
pub const CHART_FIELDS_KEY: &str = "fields";
pub const CHART_TYPES_KEY: &str = "types";
pub const PERMANENT_FILTER_KEY: &str = "permanentfilter";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dismissal {
    Escape,
    Backdrop,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Modal {
    ChartBuilder(ChartBuilder),
    Annotation(AnnotationEditor),
    ServerDetails(ServerDetails),
    SaveSearch(SaveSearchDialog),
}

impl Modal {
    pub fn title(&self) -> String {
        match self {
            Self::ChartBuilder(_) => "Chart builder".to_owned(),
            Self::Annotation(editor) => format!("Annotation: {}", editor.host()),
            Self::ServerDetails(details) => format!("Server Details: {}", details.host()),
            Self::SaveSearch(_) => "Saved searches".to_owned(),
        }
    }

    /// Whether this dismissal closes the modal. Escape first folds an open
    /// saved-chart dropdown and leaves the builder up.
    pub fn dismiss(&mut self, how: Dismissal) -> bool {
        if let Self::ChartBuilder(builder) = self
            && builder.is_dropdown_open()
        {
            builder.close_dropdown();
            return how == Dismissal::Backdrop;
        }
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartSelector {
    pub field: Option<usize>,
    pub chart_type: ChartType,
}

impl Default for ChartSelector {
    fn default() -> Self {
        Self {
            field: None,
            chart_type: ChartType::Pie,
        }
    }
}

/// Field/type selector rows plus the saved-chart dropdown.
///
/// `field` indexes into [`field_options`], which is sorted by
/// upper-cased display name so the order is stable for a given catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct ChartBuilder {
    app_name: String,
    permanent_filter: Option<String>,
    options: Vec<ColumnId>,
    selectors: Vec<ChartSelector>,
    focus: usize,
    saved: Vec<SavedChart>,
    dropdown_open: bool,
    saved_cursor: usize,
}

pub fn field_options(catalog: &FieldCatalog) -> Vec<&FieldMeta> {
    let mut fields: Vec<&FieldMeta> = catalog.fields().iter().collect();
    fields.sort_by_key(|field| field.display_name.to_uppercase());
    fields
}

impl ChartBuilder {
    pub fn new(
        catalog: &FieldCatalog,
        app_name: impl Into<String>,
        permanent_filter: Option<String>,
    ) -> Self {
        Self {
            app_name: app_name.into(),
            permanent_filter,
            options: field_options(catalog)
                .into_iter()
                .map(|field| field.key.clone())
                .collect(),
            selectors: vec![ChartSelector::default()],
            focus: 0,
            saved: Vec::new(),
            dropdown_open: false,
            saved_cursor: 0,
        }
    }

    pub fn options(&self) -> &[ColumnId] {
        &self.options
    }

    pub fn selectors(&self) -> &[ChartSelector] {
        &self.selectors
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn focus_next(&mut self) {
        self.focus = (self.focus + 1).min(self.selectors.len() - 1);
    }

    pub fn focus_prev(&mut self) {
        self.focus = self.focus.saturating_sub(1);
    }

    pub fn add_selector(&mut self) -> Result<usize> {
        if self.selectors.len() >= MAX_CHARTS {
            bail!("Maximum {MAX_CHARTS} charts allowed");
        }
        self.selectors.push(ChartSelector::default());
        self.focus = self.selectors.len() - 1;
        Ok(self.selectors.len())
    }

    /// Removes a selector; the rest shift up. The last one always stays.
    pub fn remove_selector(&mut self, index: usize) -> Result<()> {
        if self.selectors.len() <= 1 {
            bail!("at least one chart is required -- pick a field instead of removing it");
        }
        if index >= self.selectors.len() {
            bail!("no chart #{} to remove", index + 1);
        }
        self.selectors.remove(index);
        self.focus = self.focus.min(self.selectors.len() - 1);
        Ok(())
    }

    pub fn set_field(&mut self, index: usize, column: &str) -> Result<()> {
        let Some(option) = self.options.iter().position(|key| key.as_str() == column) else {
            bail!("unknown chart field {column:?}");
        };
        let Some(selector) = self.selectors.get_mut(index) else {
            bail!("no chart #{}", index + 1);
        };
        selector.field = Some(option);
        Ok(())
    }

    pub fn set_type(&mut self, index: usize, chart_type: ChartType) -> Result<()> {
        let Some(selector) = self.selectors.get_mut(index) else {
            bail!("no chart #{}", index + 1);
        };
        selector.chart_type = chart_type;
        Ok(())
    }

    pub fn cycle_field(&mut self, forward: bool) {
        let len = self.options.len();
        let Some(selector) = self.selectors.get_mut(self.focus) else {
            return;
        };
        if len == 0 {
            return;
        }
        selector.field = Some(match (selector.field, forward) {
            (None, true) => 0,
            (None, false) => len - 1,
            (Some(current), true) => (current + 1) % len,
            (Some(current), false) => (current + len - 1) % len,
        });
    }

    pub fn cycle_type(&mut self, forward: bool) {
        let Some(selector) = self.selectors.get_mut(self.focus) else {
            return;
        };
        let all = ChartType::ALL;
        let current = all
            .iter()
            .position(|chart_type| *chart_type == selector.chart_type)
            .unwrap_or(0);
        let next = if forward {
            (current + 1) % all.len()
        } else {
            (current + all.len() - 1) % all.len()
        };
        selector.chart_type = all[next];
    }

    pub fn selected_field(&self, index: usize) -> Option<&ColumnId> {
        let option = self.selectors.get(index)?.field?;
        self.options.get(option)
    }

    /// `fields`/`types` pairs in selector order. Selectors without a field
    /// are left out; the first one must have a field.
    pub fn form_entries(&self) -> Result<Vec<(&'static str, String)>> {
        if self.selected_field(0).is_none() {
            bail!("the first chart needs a field -- pick one and retry");
        }
        let mut entries = Vec::with_capacity(self.selectors.len() * 2);
        for (index, selector) in self.selectors.iter().enumerate() {
            let Some(field) = self.selected_field(index) else {
                continue;
            };
            entries.push((CHART_FIELDS_KEY, field.to_string()));
            entries.push((CHART_TYPES_KEY, selector.chart_type.as_str().to_owned()));
        }
        Ok(entries)
    }

    /// Chart page path for the current listing filters.
    pub fn submit(&self, current: &QueryParams) -> Result<String> {
        let entries = self.form_entries()?;
        let mut params = current.clone();
        for key in [VISIBLE_COLUMNS, PAGE_SIZE, PAGE] {
            params.delete(key);
        }
        let category_flag = format!("{CATEGORY_PREFIX}cat");
        params.retain(|key, _| !key.starts_with(&category_flag));
        for (key, value) in entries {
            params.append(key, value);
        }
        if let Some(filter) = &self.permanent_filter {
            params.append(PERMANENT_FILTER_KEY, filter.clone());
        }
        Ok(charts_path(&self.app_name, &params))
    }

    pub fn is_dropdown_open(&self) -> bool {
        self.dropdown_open
    }

    pub fn toggle_dropdown(&mut self) {
        self.dropdown_open = !self.dropdown_open;
    }

    pub fn close_dropdown(&mut self) {
        self.dropdown_open = false;
    }

    pub fn set_saved(&mut self, charts: Vec<SavedChart>) {
        self.saved = charts;
        self.saved_cursor = self.saved_cursor.min(self.saved.len().saturating_sub(1));
    }

    pub fn saved(&self) -> &[SavedChart] {
        &self.saved
    }

    pub fn saved_cursor(&self) -> usize {
        self.saved_cursor
    }

    pub fn move_saved_cursor(&mut self, delta: isize) {
        if self.saved.is_empty() {
            return;
        }
        let last = self.saved.len() - 1;
        self.saved_cursor = self.saved_cursor.saturating_add_signed(delta).min(last);
    }

    pub fn selected_saved(&self) -> Option<&SavedChart> {
        self.saved.get(self.saved_cursor)
    }

    pub fn remove_saved(&mut self, id: ChartId) {
        self.saved.retain(|chart| chart.id != id);
        self.saved_cursor = self.saved_cursor.min(self.saved.len().saturating_sub(1));
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }
}

fn charts_path(app_name: &str, params: &QueryParams) -> String {
    format!("/{app_name}/charts/?{}", params.to_query_string())
}

/// Chart page path for a saved chart: its fields, then its types, then every
/// other stored filter.
pub fn saved_chart_url(app_name: &str, chart: &SavedChart) -> String {
    let mut params = QueryParams::new();
    for key in [CHART_FIELDS_KEY, CHART_TYPES_KEY] {
        match chart.filters.get(key) {
            Some(Value::Array(values)) => {
                for value in values {
                    params.append(key, value_text(value));
                }
            }
            Some(value) => params.append(key, value_text(value)),
            None => {}
        }
    }
    for (key, value) in &chart.filters {
        if key == CHART_FIELDS_KEY || key == CHART_TYPES_KEY {
            continue;
        }
        params.append(key, filter_value_text(value));
    }
    charts_path(app_name, &params)
}

fn filter_value_text(value: &Value) -> String {
    match value {
        Value::Array(values) => values.iter().map(value_text).collect::<Vec<_>>().join(","),
        other => value_text(other),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationLoad {
    Loading,
    Ready,
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnnotationField {
    Comment,
    AssignedTo,
    Status,
    CustomStatus,
    Notes,
    Priority,
}

impl AnnotationField {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Comment => "Comment",
            Self::AssignedTo => "Assigned to",
            Self::Status => "Status",
            Self::CustomStatus => "Custom status",
            Self::Notes => "Notes",
            Self::Priority => "Priority",
        }
    }

    pub const fn is_choice(self) -> bool {
        matches!(self, Self::Status | Self::Priority)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationEditor {
    host: Hostname,
    kind: AnnotationKind,
    load: AnnotationLoad,
    discrepancy: DiscrepancyAnnotation,
    group: GroupAnnotation,
    focus: usize,
}

impl AnnotationEditor {
    pub fn new(host: Hostname, kind: AnnotationKind) -> Self {
        Self {
            host,
            kind,
            load: AnnotationLoad::Loading,
            discrepancy: DiscrepancyAnnotation::default(),
            group: GroupAnnotation {
                status: GROUP_STATUSES[0].0.to_owned(),
                priority: "normal".to_owned(),
                ..GroupAnnotation::default()
            },
            focus: 0,
        }
    }

    pub fn host(&self) -> &Hostname {
        &self.host
    }

    pub fn kind(&self) -> AnnotationKind {
        self.kind
    }

    pub fn load_state(&self) -> &AnnotationLoad {
        &self.load
    }

    pub fn load_discrepancy(&mut self, record: DiscrepancyAnnotation) {
        self.discrepancy = record;
        self.load = AnnotationLoad::Ready;
    }

    /// Blank status or priority fall back to the form defaults.
    pub fn load_group(&mut self, record: GroupAnnotation) {
        let defaults = Self::new(self.host.clone(), AnnotationKind::Group).group;
        self.group = GroupAnnotation {
            status: if record.status.is_empty() {
                defaults.status
            } else {
                record.status
            },
            priority: if record.priority.is_empty() {
                defaults.priority
            } else {
                record.priority
            },
            ..record
        };
        self.load = AnnotationLoad::Ready;
        self.focus = self.focus.min(self.fields().len() - 1);
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        self.load = AnnotationLoad::Failed(message.into());
    }

    pub fn history(&self) -> &[AnnotationHistoryEntry] {
        &self.discrepancy.history
    }

    pub fn discrepancy(&self) -> &DiscrepancyAnnotation {
        &self.discrepancy
    }

    pub fn group(&self) -> &GroupAnnotation {
        &self.group
    }

    /// Editable fields in form order. The custom status only shows while
    /// the status is `custom`.
    pub fn fields(&self) -> Vec<AnnotationField> {
        match self.kind {
            AnnotationKind::Discrepancy => {
                vec![AnnotationField::Comment, AnnotationField::AssignedTo]
            }
            AnnotationKind::Group => {
                let mut fields = vec![AnnotationField::Status];
                if self.group.status == CUSTOM_STATUS {
                    fields.push(AnnotationField::CustomStatus);
                }
                fields.extend([AnnotationField::Notes, AnnotationField::Priority]);
                fields
            }
        }
    }

    pub fn value(&self, field: AnnotationField) -> &str {
        match field {
            AnnotationField::Comment => &self.discrepancy.comment,
            AnnotationField::AssignedTo => &self.discrepancy.assigned_to,
            AnnotationField::Status => label_for(&GROUP_STATUSES, &self.group.status),
            AnnotationField::CustomStatus => &self.group.custom_status,
            AnnotationField::Notes => &self.group.notes,
            AnnotationField::Priority => label_for(&GROUP_PRIORITIES, &self.group.priority),
        }
    }

    pub fn focus(&self) -> usize {
        self.focus
    }

    pub fn focused(&self) -> Option<AnnotationField> {
        self.fields().get(self.focus).copied()
    }

    pub fn focus_next(&mut self) {
        self.focus = (self.focus + 1) % self.fields().len();
    }

    pub fn focus_prev(&mut self) {
        let len = self.fields().len();
        self.focus = (self.focus + len - 1) % len;
    }

    fn text_mut(&mut self, field: AnnotationField) -> Option<&mut String> {
        match field {
            AnnotationField::Comment => Some(&mut self.discrepancy.comment),
            AnnotationField::AssignedTo => Some(&mut self.discrepancy.assigned_to),
            AnnotationField::CustomStatus => Some(&mut self.group.custom_status),
            AnnotationField::Notes => Some(&mut self.group.notes),
            AnnotationField::Status | AnnotationField::Priority => None,
        }
    }

    pub fn insert_char(&mut self, ch: char) {
        if let Some(field) = self.focused()
            && let Some(text) = self.text_mut(field)
        {
            text.push(ch);
        }
    }

    pub fn backspace(&mut self) {
        if let Some(field) = self.focused()
            && let Some(text) = self.text_mut(field)
        {
            text.pop();
        }
    }

    /// Steps a choice field. Leaving `custom` clears the custom label.
    pub fn cycle_choice(&mut self, forward: bool) {
        match self.focused() {
            Some(AnnotationField::Status) => {
                self.group.status = cycle(&GROUP_STATUSES, &self.group.status, forward);
                if self.group.status != CUSTOM_STATUS {
                    self.group.custom_status.clear();
                }
            }
            Some(AnnotationField::Priority) => {
                self.group.priority = cycle(&GROUP_PRIORITIES, &self.group.priority, forward);
            }
            _ => {}
        }
    }

    pub fn payload(&self) -> Result<FormPayload> {
        let payload = match self.kind {
            AnnotationKind::Discrepancy => {
                FormPayload::DiscrepancyAnnotation(DiscrepancyAnnotationInput {
                    host: self.host.clone(),
                    comment: self.discrepancy.comment.clone(),
                    assigned_to: self.discrepancy.assigned_to.clone(),
                })
            }
            AnnotationKind::Group => FormPayload::GroupAnnotation(GroupAnnotationInput {
                host: self.host.clone(),
                annotation: self.group.clone(),
            }),
        };
        payload.validate()?;
        Ok(payload)
    }

    pub fn clear_payload(&self) -> Result<FormPayload> {
        if self.kind != AnnotationKind::Discrepancy {
            bail!("group annotations cannot be cleared -- edit the fields and save instead");
        }
        Ok(FormPayload::DiscrepancyAnnotation(
            DiscrepancyAnnotationInput::cleared(self.host.clone()),
        ))
    }
}

fn label_for<'a>(choices: &'a [(&'static str, &'static str)], value: &'a str) -> &'a str {
    choices
        .iter()
        .find(|(candidate, _)| *candidate == value)
        .map(|(_, label)| *label)
        .unwrap_or(value)
}

fn cycle(choices: &[(&str, &str)], current: &str, forward: bool) -> String {
    let len = choices.len();
    let next = match choices.iter().position(|(value, _)| *value == current) {
        None => 0,
        Some(index) if forward => (index + 1) % len,
        Some(index) => (index + len - 1) % len,
    };
    choices[next].0.to_owned()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailField {
    pub column: ColumnId,
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailSection {
    pub name: String,
    pub fields: Vec<DetailField>,
}

/// Every known value of one host, grouped by category.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerDetails {
    host: Hostname,
    sections: Vec<DetailSection>,
    export: Vec<(String, String)>,
    filter: String,
    scroll: usize,
}

impl ServerDetails {
    pub fn new(
        catalog: &FieldCatalog,
        host: Hostname,
        values: &BTreeMap<ColumnId, String>,
    ) -> Self {
        let mut sections: Vec<DetailSection> = Vec::new();
        let mut export = Vec::new();
        for field in catalog.fields() {
            let Some(value) = values.get(field.key.as_str()) else {
                continue;
            };
            export.push((field.display_name.clone(), value.clone()));
            if value.is_empty() || value == MISSING_GLYPH {
                continue;
            }
            let name = catalog
                .category(field.category.as_str())
                .map(|category| category.name.clone())
                .unwrap_or_else(|| field.category.to_string());
            let entry = DetailField {
                column: field.key.clone(),
                label: field.display_name.clone(),
                value: value.clone(),
            };
            match sections.iter_mut().find(|section| section.name == name) {
                Some(section) => section.fields.push(entry),
                None => sections.push(DetailSection {
                    name,
                    fields: vec![entry],
                }),
            }
        }
        Self {
            host,
            sections,
            export,
            filter: String::new(),
            scroll: 0,
        }
    }

    pub fn host(&self) -> &Hostname {
        &self.host
    }

    pub fn filter(&self) -> &str {
        &self.filter
    }

    pub fn set_filter(&mut self, filter: impl Into<String>) {
        self.filter = filter.into();
        self.scroll = 0;
    }

    pub fn push_filter(&mut self, ch: char) {
        self.filter.push(ch);
        self.scroll = 0;
    }

    pub fn pop_filter(&mut self) {
        self.filter.pop();
        self.scroll = 0;
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn scroll_by(&mut self, delta: isize) {
        self.scroll = self.scroll.saturating_add_signed(delta);
    }

    /// Sections with at least one field whose label or value contains the
    /// filter, compared case-insensitively.
    pub fn visible_sections(&self) -> Vec<DetailSection> {
        let needle = self.filter.trim().to_lowercase();
        self.sections
            .iter()
            .filter_map(|section| {
                let fields: Vec<DetailField> = section
                    .fields
                    .iter()
                    .filter(|field| {
                        needle.is_empty()
                            || field.label.to_lowercase().contains(&needle)
                            || field.value.to_lowercase().contains(&needle)
                    })
                    .cloned()
                    .collect();
                (!fields.is_empty()).then(|| DetailSection {
                    name: section.name.clone(),
                    fields,
                })
            })
            .collect()
    }

    /// `{display name: value}` for every value the host has, pretty printed.
    pub fn export_json(&self) -> Result<String> {
        let map = self
            .export
            .iter()
            .map(|(label, value)| (label.clone(), Value::from(value.as_str())))
            .collect::<Map<_, _>>();
        serde_json::to_string_pretty(&Value::Object(map))
            .with_context(|| format!("serialize details for {}", self.host))
    }

    pub fn export_file_name(&self, date: Date) -> String {
        format!(
            "{}_{:04}-{:02}-{:02}.json",
            self.host,
            date.year(),
            u8::from(date.month()),
            date.day()
        )
    }
}

/// Name entry plus the existing saved searches it is checked against.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SaveSearchDialog {
    name: String,
    searches: Vec<SavedSearch>,
    cursor: usize,
}

impl SaveSearchDialog {
    pub fn new(searches: Vec<SavedSearch>) -> Self {
        Self {
            name: String::new(),
            searches,
            cursor: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn push_char(&mut self, ch: char) {
        self.name.push(ch);
    }

    pub fn backspace(&mut self) {
        self.name.pop();
    }

    pub fn searches(&self) -> &[SavedSearch] {
        &self.searches
    }

    pub fn set_searches(&mut self, searches: Vec<SavedSearch>) {
        self.searches = searches;
        self.cursor = self.cursor.min(self.searches.len().saturating_sub(1));
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn move_cursor(&mut self, delta: isize) {
        if self.searches.is_empty() {
            return;
        }
        let last = self.searches.len() - 1;
        self.cursor = self.cursor.saturating_add_signed(delta).min(last);
    }

    pub fn selected(&self) -> Option<&SavedSearch> {
        self.searches.get(self.cursor)
    }

    pub fn remove(&mut self, id: SearchId) {
        self.searches.retain(|search| search.id != id);
        self.cursor = self.cursor.min(self.searches.len().saturating_sub(1));
    }

    pub fn payload(&self, query: &QueryParams, tags: Vec<FilterTag>) -> Result<FormPayload> {
        let payload = FormPayload::SaveSearch(SaveSearchInput {
            name: self.name.trim().to_owned(),
            query: query.clone(),
            tags,
            existing_names: self
                .searches
                .iter()
                .map(|search| search.name.clone())
                .collect(),
        });
        payload.validate()?;
        Ok(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::{
        AnnotationEditor, AnnotationField, ChartBuilder, Dismissal, MAX_CHARTS, Modal,
        SaveSearchDialog, ServerDetails, saved_chart_url,
    };
    use crate::filters::FilterTag;
    use crate::forms::FormPayload;
    use crate::model::{
        AnnotationKind, Category, ChartType, FieldCatalog, FieldMeta, GroupAnnotation, SavedChart,
        SavedSearch,
    };
    use crate::query::QueryParams;
    use crate::{CategoryId, ChartId, ColumnId, Hostname, SearchId};
    use anyhow::Result;
    use serde_json::json;
    use std::collections::BTreeMap;
    use time::{Date, Month};

    fn field(key: &str, name: &str, category: &str) -> FieldMeta {
        FieldMeta {
            key: ColumnId::from(key),
            display_name: name.to_owned(),
            input_name: key.to_owned(),
            list_id: None,
            category: CategoryId::from(category),
            checked: true,
            checked_disabled: false,
        }
    }

    fn catalog() -> FieldCatalog {
        FieldCatalog::new(
            vec![
                field("server", "Server", "general"),
                field("os", "os", "general"),
                field("cpu", "CPU", "hardware"),
                field("ram", "Memory", "hardware"),
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

    #[test]
    fn chart_options_sort_by_upper_display_name() {
        let builder = ChartBuilder::new(&catalog(), "inventory", None);
        let keys: Vec<&str> = builder.options().iter().map(ColumnId::as_str).collect();
        assert_eq!(keys, vec!["cpu", "ram", "os", "server"]);
    }

    #[test]
    fn chart_selector_limits() -> Result<()> {
        let mut builder = ChartBuilder::new(&catalog(), "inventory", None);
        for expected in 2..=MAX_CHARTS {
            assert_eq!(builder.add_selector()?, expected);
        }
        let error = builder.add_selector().expect_err("fifth selector");
        assert_eq!(error.to_string(), "Maximum 4 charts allowed");

        builder.set_field(3, "cpu")?;
        builder.remove_selector(1)?;
        assert_eq!(builder.selectors().len(), 3);
        assert_eq!(
            builder.selected_field(2).map(ColumnId::as_str),
            Some("cpu"),
            "later selectors shift up"
        );
        builder.remove_selector(0)?;
        builder.remove_selector(0)?;
        builder
            .remove_selector(0)
            .expect_err("last selector stays");
        Ok(())
    }

    #[test]
    fn chart_submit_strips_listing_state() -> Result<()> {
        let mut builder =
            ChartBuilder::new(&catalog(), "inventory", Some("active".to_owned()));
        builder
            .submit(&QueryParams::new())
            .expect_err("first selector needs a field");

        builder.set_field(0, "os")?;
        builder.add_selector()?;
        builder.add_selector()?;
        builder.set_field(2, "cpu")?;
        builder.set_type(2, ChartType::Bar)?;

        let current = QueryParams::parse(
            "env=PROD&visible_columns=os,cpu&page_size=50&page=3&cat_cat1=true&sort=os",
        );
        assert_eq!(
            builder.submit(&current)?,
            "/inventory/charts/?env=PROD&sort=os&fields=os&types=pie&fields=cpu&types=bar&permanentfilter=active"
        );
        Ok(())
    }

    #[test]
    fn saved_chart_url_orders_fields_then_types() {
        let chart = SavedChart {
            id: ChartId::new(7),
            name: "by os".to_owned(),
            filters: serde_json::from_value(json!({
                "env": "PROD",
                "types": ["pie", "bar"],
                "fields": ["os", "cpu"]
            }))
            .expect("filters map"),
        };
        assert_eq!(
            saved_chart_url("inventory", &chart),
            "/inventory/charts/?fields=os&fields=cpu&types=pie&types=bar&env=PROD"
        );
    }

    #[test]
    fn escape_closes_dropdown_before_modal() {
        let mut builder = ChartBuilder::new(&catalog(), "inventory", None);
        builder.toggle_dropdown();
        let mut modal = Modal::ChartBuilder(builder);
        assert!(!modal.dismiss(Dismissal::Escape));
        assert!(modal.dismiss(Dismissal::Escape));

        let mut dialog = Modal::SaveSearch(SaveSearchDialog::default());
        assert!(dialog.dismiss(Dismissal::Backdrop));
    }

    #[test]
    fn group_editor_shows_custom_field_only_for_custom() -> Result<()> {
        let mut editor = AnnotationEditor::new(Hostname::from("WEB01"), AnnotationKind::Group);
        editor.load_group(GroupAnnotation::default());
        assert_eq!(editor.group().status, "production");
        assert_eq!(editor.group().priority, "normal");
        assert!(!editor.fields().contains(&AnnotationField::CustomStatus));

        for _ in 0..5 {
            editor.cycle_choice(true);
        }
        assert_eq!(editor.group().status, "custom");
        assert!(editor.fields().contains(&AnnotationField::CustomStatus));

        let error = editor.payload().expect_err("empty custom status");
        assert_eq!(error.to_string(), "Please enter a custom status");

        editor.focus_next();
        assert_eq!(editor.focused(), Some(AnnotationField::CustomStatus));
        for ch in "rack move".chars() {
            editor.insert_char(ch);
        }
        assert!(matches!(editor.payload()?, FormPayload::GroupAnnotation(_)));
        editor.clear_payload().expect_err("group cannot be cleared");
        Ok(())
    }

    #[test]
    fn discrepancy_editor_edits_text_fields() -> Result<()> {
        let mut editor =
            AnnotationEditor::new(Hostname::from("WEB01"), AnnotationKind::Discrepancy);
        editor.insert_char('x');
        editor.insert_char('y');
        editor.backspace();
        editor.focus_next();
        editor.insert_char('b');
        assert_eq!(editor.value(AnnotationField::Comment), "x");
        assert_eq!(editor.value(AnnotationField::AssignedTo), "b");
        let FormPayload::DiscrepancyAnnotation(cleared) = editor.clear_payload()? else {
            panic!("expected discrepancy payload");
        };
        assert!(cleared.comment.is_empty());
        Ok(())
    }

    #[test]
    fn server_details_group_filter_and_export() -> Result<()> {
        let mut values = BTreeMap::new();
        values.insert(ColumnId::from("server"), "WEB01".to_owned());
        values.insert(ColumnId::from("os"), "RHEL8".to_owned());
        values.insert(ColumnId::from("cpu"), String::new());
        values.insert(ColumnId::from("ram"), "64 GB".to_owned());
        let mut details = ServerDetails::new(&catalog(), Hostname::from("WEB01"), &values);

        let names: Vec<String> = details
            .visible_sections()
            .into_iter()
            .map(|section| section.name)
            .collect();
        assert_eq!(names, vec!["General", "Hardware"]);

        details.set_filter("GB");
        let sections = details.visible_sections();
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].fields[0].label, "Memory");

        assert_eq!(
            details.export_json()?,
            "{\n  \"Server\": \"WEB01\",\n  \"os\": \"RHEL8\",\n  \"CPU\": \"\",\n  \"Memory\": \"64 GB\"\n}"
        );
        let date = Date::from_calendar_date(2026, Month::March, 4)?;
        assert_eq!(details.export_file_name(date), "WEB01_2026-03-04.json");
        Ok(())
    }

    #[test]
    fn save_search_dialog_validates_against_existing() {
        let mut dialog = SaveSearchDialog::new(vec![SavedSearch {
            id: SearchId::new(1),
            name: "prod".to_owned(),
            url: "env=PROD".to_owned(),
        }]);
        for ch in "prod".chars() {
            dialog.push_char(ch);
        }
        let tags = vec![FilterTag {
            column: ColumnId::from("env"),
            term: "PROD".to_owned(),
        }];
        let query = QueryParams::parse("env=PROD");
        dialog
            .payload(&query, tags.clone())
            .expect_err("duplicate name");
        dialog.push_char('2');
        assert!(dialog.payload(&query, tags).is_ok());

        dialog.remove(SearchId::new(1));
        assert!(dialog.searches().is_empty());
    }
}
