// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::ids::*;

/// Hostname column: always visible, always loaded, and the one filter
/// column that also splits on whitespace and semicolons.
pub const SERVER_COLUMN: &str = "server";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ViewMode {
    Flat,
    #[default]
    Grouped,
}

impl ViewMode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flat => "flat",
            Self::Grouped => "grouped",
        }
    }

    /// Only an explicit `flat` selects flat mode; anything else is grouped.
    pub fn parse(value: Option<&str>) -> Self {
        match value {
            Some("flat") => Self::Flat,
            _ => Self::Grouped,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Light => "light",
            Self::Dark => "dark",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "light" => Some(Self::Light),
            "dark" => Some(Self::Dark),
            _ => None,
        }
    }

    pub const fn toggled(self) -> Self {
        match self {
            Self::Light => Self::Dark,
            Self::Dark => Self::Light,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChartType {
    Pie,
    Bar,
    Doughnut,
    Line,
}

impl ChartType {
    pub const ALL: [Self; 4] = [Self::Pie, Self::Bar, Self::Doughnut, Self::Line];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pie => "pie",
            Self::Bar => "bar",
            Self::Doughnut => "doughnut",
            Self::Line => "line",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pie" => Some(Self::Pie),
            "bar" => Some(Self::Bar),
            "doughnut" => Some(Self::Doughnut),
            "line" => Some(Self::Line),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pie => "Pie Chart",
            Self::Bar => "Bar Chart",
            Self::Doughnut => "Donut Chart",
            Self::Line => "Line Chart",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriState {
    Checked,
    Unchecked,
    Indeterminate,
}

impl TriState {
    /// Derives a parent state from its children's checked count.
    pub const fn from_counts(checked: usize, total: usize) -> Self {
        if total > 0 && checked == total {
            Self::Checked
        } else if checked == 0 {
            Self::Unchecked
        } else {
            Self::Indeterminate
        }
    }

    pub const fn glyph(self) -> &'static str {
        match self {
            Self::Checked => "[x]",
            Self::Unchecked => "[ ]",
            Self::Indeterminate => "[-]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldMeta {
    pub key: ColumnId,
    pub display_name: String,
    pub input_name: String,
    pub list_id: Option<String>,
    pub category: CategoryId,
    pub checked: bool,
    pub checked_disabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Category {
    pub id: CategoryId,
    pub name: String,
}

#[derive(Debug, Deserialize)]
struct FieldMetaWire {
    displayname: String,
    #[serde(default)]
    inputname: String,
    #[serde(default)]
    listid: Option<String>,
    #[serde(default)]
    selectionsection: String,
    #[serde(default, deserialize_with = "loose_bool")]
    ischecked: bool,
    #[serde(default, deserialize_with = "loose_bool")]
    ischeckeddisabled: bool,
}

fn loose_bool<'de, D>(deserializer: D) -> std::result::Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(flag) => flag,
        Value::String(text) => matches!(text.trim().to_ascii_lowercase().as_str(), "true" | "1"),
        Value::Number(number) => number.as_i64().is_some_and(|n| n != 0),
        _ => false,
    })
}

/// Field metadata in declaration order, plus the categories that group the
/// column checkboxes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FieldCatalog {
    fields: Vec<FieldMeta>,
    categories: Vec<Category>,
}

impl FieldCatalog {
    pub fn new(fields: Vec<FieldMeta>, mut categories: Vec<Category>) -> Self {
        for field in &fields {
            if !categories.iter().any(|category| category.id == field.category) {
                categories.push(Category {
                    id: field.category.clone(),
                    name: field.category.to_string(),
                });
            }
        }
        Self { fields, categories }
    }

    pub fn from_value(value: &Value) -> Result<Self> {
        let Some(raw_fields) = value.get("fields").and_then(Value::as_object) else {
            bail!("field metadata has no `fields` object -- check the inventory endpoint");
        };

        let mut fields = Vec::with_capacity(raw_fields.len());
        for (key, raw) in raw_fields {
            let wire: FieldMetaWire = serde_json::from_value(raw.clone())
                .with_context(|| format!("decode field metadata for {key}"))?;
            fields.push(FieldMeta {
                key: ColumnId::new(key.clone()),
                display_name: wire.displayname,
                input_name: if wire.inputname.is_empty() {
                    key.clone()
                } else {
                    wire.inputname
                },
                list_id: wire.listid.filter(|id| !id.is_empty()),
                category: CategoryId::new(wire.selectionsection),
                checked: wire.ischecked,
                checked_disabled: wire.ischeckeddisabled,
            });
        }

        let categories = value
            .get("categories")
            .and_then(Value::as_object)
            .map(|raw| {
                raw.iter()
                    .map(|(id, name)| Category {
                        id: CategoryId::new(id.clone()),
                        name: match name {
                            Value::String(text) => text.clone(),
                            other => other
                                .get("name")
                                .and_then(Value::as_str)
                                .unwrap_or(id)
                                .to_owned(),
                        },
                    })
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self::new(fields, categories))
    }

    /// Wire form served by the inventory backend.
    pub fn to_value(&self) -> Value {
        let mut fields = Map::new();
        for field in &self.fields {
            let mut entry = Map::new();
            entry.insert("displayname".into(), Value::from(field.display_name.clone()));
            entry.insert("inputname".into(), Value::from(field.input_name.clone()));
            if let Some(list_id) = &field.list_id {
                entry.insert("listid".into(), Value::from(list_id.clone()));
            }
            entry.insert(
                "selectionsection".into(),
                Value::from(field.category.to_string()),
            );
            entry.insert("ischecked".into(), Value::from(field.checked));
            entry.insert("ischeckeddisabled".into(), Value::from(field.checked_disabled));
            fields.insert(field.key.to_string(), Value::Object(entry));
        }
        let categories = self
            .categories
            .iter()
            .map(|category| (category.id.to_string(), Value::from(category.name.clone())))
            .collect::<Map<_, _>>();

        let mut root = Map::new();
        root.insert("fields".into(), Value::Object(fields));
        root.insert("categories".into(), Value::Object(categories));
        Value::Object(root)
    }

    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    pub fn categories(&self) -> &[Category] {
        &self.categories
    }

    pub fn field(&self, key: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|field| field.key.as_str() == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.field(key).is_some()
    }

    pub fn position(&self, key: &str) -> Option<usize> {
        self.fields.iter().position(|field| field.key.as_str() == key)
    }

    pub fn display_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.field(key)
            .map(|field| field.display_name.as_str())
            .unwrap_or(key)
    }

    pub fn category(&self, id: &str) -> Option<&Category> {
        self.categories
            .iter()
            .find(|category| category.id.as_str() == id)
    }

    pub fn children<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a FieldMeta> + 'a {
        self.fields
            .iter()
            .filter(move |field| field.category.as_str() == category)
    }

    /// Listbox-backed columns; their filter parameter is set rather than appended.
    pub fn list_columns(&self) -> impl Iterator<Item = &FieldMeta> {
        self.fields.iter().filter(|field| field.list_id.is_some())
    }
}

/// One primary row of the listing page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerRow {
    pub hostname: Hostname,
    #[serde(default)]
    pub cells: BTreeMap<ColumnId, String>,
    #[serde(default)]
    pub instance_count: usize,
    /// Embedded `[{constant_fields, variable_fields}]` used to fill detail rows.
    #[serde(default)]
    pub instances_json: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ServerPage {
    #[serde(default)]
    pub rows: Vec<ServerRow>,
    #[serde(default)]
    pub total: usize,
    #[serde(default = "default_page")]
    pub page: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
}

const fn default_page() -> usize {
    1
}

const fn default_page_size() -> usize {
    crate::query::DEFAULT_PAGE_SIZE
}

impl ServerPage {
    pub fn page_count(&self) -> usize {
        if self.page_size == 0 {
            return 1;
        }
        self.total.div_ceil(self.page_size).max(1)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct InstanceFields {
    #[serde(default)]
    pub constant_fields: Map<String, Value>,
    #[serde(default)]
    pub variable_fields: Map<String, Value>,
}

/// Per-host payload of the column-data endpoint.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct HostPayload {
    #[serde(default)]
    pub instances: Vec<Map<String, Value>>,
    #[serde(default)]
    pub constant_fields: Map<String, Value>,
    #[serde(default)]
    pub variable_fields: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ColumnDataResponse {
    #[serde(default)]
    pub data: BTreeMap<Hostname, HostPayload>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

const VARIABLE_PREVIEW_LIMIT: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    Flat(String),
    Constant(String),
    Variable { count: usize, preview: String },
}

impl ColumnValue {
    /// Summarizes distinct per-instance values the way the backend does:
    /// more than five collapse to `>count`, otherwise they are joined with ` | `.
    pub fn variable_from(values: &[String]) -> Self {
        let mut distinct: Vec<&str> = Vec::new();
        for value in values {
            if !distinct.contains(&value.as_str()) {
                distinct.push(value);
            }
        }
        let preview = if distinct.len() > VARIABLE_PREVIEW_LIMIT {
            format!(">{}", distinct.len())
        } else {
            distinct.join(" | ")
        };
        Self::Variable {
            count: distinct.len(),
            preview,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Flat(value) | Self::Constant(value) => value,
            Self::Variable { preview, .. } => preview,
        }
    }
}

/// One host's value for a column plus the per-instance values behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellValue {
    pub value: ColumnValue,
    pub instances: Vec<String>,
}

pub type ColumnData = BTreeMap<Hostname, CellValue>;

/// Renders a scalar JSON value the way the page template would.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(text) => text.clone(),
        Value::Bool(flag) => flag.to_string(),
        Value::Number(number) => number.to_string(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedChart {
    pub id: ChartId,
    pub name: String,
    #[serde(default)]
    pub filters: Map<String, Value>,
}

/// A saved filter set; `url` is the listing query it restores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavedSearch {
    pub id: SearchId,
    pub name: String,
    #[serde(default)]
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AnnotationHistoryEntry {
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub user: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub assigned_to: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DiscrepancyAnnotation {
    #[serde(default)]
    pub comment: String,
    #[serde(default)]
    pub assigned_to: String,
    #[serde(default)]
    pub history: Vec<AnnotationHistoryEntry>,
}

pub const CUSTOM_STATUS: &str = "custom";

/// `(value, label)` pairs accepted by the group annotation endpoint.
pub const GROUP_STATUSES: [(&str, &str); 6] = [
    ("production", "In Production"),
    ("maintenance", "Under Maintenance"),
    ("upgrade_needed", "Needs Upgrade"),
    ("decommission", "To Decommission"),
    ("monitoring", "Under Monitoring"),
    (CUSTOM_STATUS, "Custom"),
];

pub const GROUP_PRIORITIES: [(&str, &str); 4] = [
    ("low", "Low"),
    ("normal", "Normal"),
    ("high", "High"),
    ("critical", "Critical"),
];

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupAnnotation {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub custom_status: String,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub priority: String,
}

impl GroupAnnotation {
    /// Custom label when set, otherwise the status choice label.
    pub fn display_status(&self) -> &str {
        if self.status == CUSTOM_STATUS && !self.custom_status.is_empty() {
            return &self.custom_status;
        }
        GROUP_STATUSES
            .iter()
            .find(|(value, _)| *value == self.status)
            .map(|(_, label)| *label)
            .unwrap_or(&self.status)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum AnnotationKind {
    #[default]
    Discrepancy,
    Group,
}

impl AnnotationKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Discrepancy => "discrepancies",
            Self::Group => "serversgroups",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "discrepancies" => Some(Self::Discrepancy),
            "serversgroups" => Some(Self::Group),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationRecord {
    Discrepancy(DiscrepancyAnnotation),
    Group(GroupAnnotation),
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MutationResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

impl MutationResponse {
    pub fn failure_text(&self) -> String {
        self.error
            .clone()
            .or_else(|| self.message.clone())
            .unwrap_or_else(|| "unknown error".to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::{ColumnValue, FieldCatalog, ServerPage, TriState, ViewMode};
    use anyhow::Result;
    use serde_json::json;

    #[test]
    fn tri_state_from_counts() {
        assert_eq!(TriState::from_counts(0, 5), TriState::Unchecked);
        assert_eq!(TriState::from_counts(5, 5), TriState::Checked);
        assert_eq!(TriState::from_counts(2, 5), TriState::Indeterminate);
        assert_eq!(TriState::from_counts(0, 0), TriState::Unchecked);
    }

    #[test]
    fn view_mode_only_flat_is_flat() {
        assert_eq!(ViewMode::parse(Some("flat")), ViewMode::Flat);
        assert_eq!(ViewMode::parse(Some("grouped")), ViewMode::Grouped);
        assert_eq!(ViewMode::parse(Some("other")), ViewMode::Grouped);
        assert_eq!(ViewMode::parse(None), ViewMode::Grouped);
    }

    #[test]
    fn catalog_keeps_declaration_order_and_loose_flags() -> Result<()> {
        let raw = json!({
            "fields": {
                "server": {"displayname": "Server", "selectionsection": "cat1", "ischecked": "True", "ischeckeddisabled": true},
                "env": {"displayname": "Environment", "selectionsection": "cat1", "listid": "env-list"},
                "cpu": {"displayname": "CPU", "selectionsection": "cat2", "ischecked": 1}
            },
            "categories": {"cat1": "General"}
        });
        let catalog = FieldCatalog::from_value(&raw)?;

        let keys: Vec<&str> = catalog.fields().iter().map(|f| f.key.as_str()).collect();
        assert_eq!(keys, vec!["server", "env", "cpu"]);
        let server = catalog.field("server").expect("server field");
        assert!(server.checked);
        assert!(server.checked_disabled);
        assert_eq!(server.input_name, "server");
        assert!(catalog.field("cpu").expect("cpu field").checked);
        assert_eq!(catalog.list_columns().count(), 1);

        let category_names: Vec<&str> =
            catalog.categories().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(category_names, vec!["General", "cat2"]);
        Ok(())
    }

    #[test]
    fn catalog_without_fields_is_rejected() {
        let error = FieldCatalog::from_value(&json!({"categories": {}}))
            .expect_err("missing fields should fail");
        assert!(error.to_string().contains("fields"));
    }

    #[test]
    fn catalog_round_trips_through_wire_form() -> Result<()> {
        let raw = json!({
            "fields": {"ram": {"displayname": "RAM", "selectionsection": "hw", "ischecked": true}},
            "categories": {"hw": "Hardware"}
        });
        let catalog = FieldCatalog::from_value(&raw)?;
        assert_eq!(FieldCatalog::from_value(&catalog.to_value())?, catalog);
        Ok(())
    }

    #[test]
    fn variable_preview_collapses_past_five() {
        let few: Vec<String> = ["a", "b", "a"].iter().map(|s| s.to_string()).collect();
        assert_eq!(
            ColumnValue::variable_from(&few),
            ColumnValue::Variable {
                count: 2,
                preview: "a | b".to_owned()
            }
        );

        let many: Vec<String> = (0..7).map(|i| format!("v{i}")).collect();
        assert_eq!(
            ColumnValue::variable_from(&many),
            ColumnValue::Variable {
                count: 7,
                preview: ">7".to_owned()
            }
        );
    }

    #[test]
    fn page_count_rounds_up() {
        let page = ServerPage {
            rows: Vec::new(),
            total: 101,
            page: 1,
            page_size: 50,
        };
        assert_eq!(page.page_count(), 3);
    }
}
