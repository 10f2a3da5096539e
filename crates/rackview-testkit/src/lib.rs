// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, bail};
use rackview_app::forms::{
    DiscrepancyAnnotationInput, FormPayload, GroupAnnotationInput, SaveSearchInput,
};
use rackview_app::loader::EMPTY_INSTANCE_GLYPH;
use rackview_app::query::{ORDER, PAGE_SIZE, QueryParams, SORT, VIEW, is_reserved_key};
use rackview_app::{
    AnnotationHistoryEntry, Category, CategoryId, ChartId, ColumnDataResponse, ColumnId,
    ColumnValue, DiscrepancyAnnotation, FieldCatalog, FieldMeta, GroupAnnotation, HostPayload,
    Hostname, SERVER_COLUMN, SavedChart, SavedSearch, SearchId, ServerPage, ServerRow, ViewMode,
};
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;

const ROLES: [&str; 8] = ["WEB", "DB", "APP", "CACHE", "MQ", "LB", "BATCH", "AUTH"];
const ENVIRONMENTS: [&str; 4] = ["PROD", "PREPROD", "UAT", "DEV"];
const OPERATING_SYSTEMS: [&str; 5] = ["RHEL8", "RHEL9", "UBUNTU22", "UBUNTU24", "WIN2022"];
const LOCATIONS: [&str; 4] = ["PARIS-DC1", "PARIS-DC2", "LONDON-DC1", "FRANKFURT-DC1"];
const OWNERS: [&str; 6] = [
    "PLATFORM", "PAYMENTS", "SEARCH", "IDENTITY", "DATA", "MESSAGING",
];
const CPU_COUNTS: [&str; 4] = ["4", "8", "16", "32"];
const RAM_SIZES: [&str; 5] = ["16", "32", "64", "128", "256"];
const DISK_SIZES: [&str; 4] = ["100", "250", "500", "1000"];

/// `(key, display name, category, list id, checked, locked)` in page order.
const FIELDS: [(&str, &str, &str, Option<&str>, bool, bool); 11] = [
    (SERVER_COLUMN, "Server", "general", None, true, true),
    ("env", "Environment", "general", Some("env-list"), true, false),
    ("os", "Operating System", "general", Some("os-list"), true, false),
    ("location", "Location", "site", Some("location-list"), true, false),
    ("rack", "Rack", "site", None, false, false),
    ("owner", "Owner", "site", None, false, false),
    ("cpu", "CPU", "hardware", None, true, false),
    ("ram", "RAM (GB)", "hardware", None, false, false),
    ("disk", "Disk (GB)", "hardware", None, false, false),
    ("ip", "IP Address", "network", None, false, false),
    ("vlan", "VLAN", "network", None, false, false),
];

const CATEGORIES: [(&str, &str); 4] = [
    ("general", "General"),
    ("site", "Location"),
    ("hardware", "Hardware"),
    ("network", "Network"),
];

/// Columns rendered with the listing page; everything else is lazy.
const EAGER_COLUMNS: [&str; 2] = ["env", "os"];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);

        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn bool(&mut self) -> bool {
        (self.next_u64() & 1) == 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeInstance {
    pub ip: String,
    pub vlan: String,
    pub cpu: String,
    pub ram: String,
    pub disk: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FakeServer {
    pub hostname: Hostname,
    pub env: String,
    pub os: String,
    pub location: String,
    pub rack: String,
    pub owner: String,
    pub instances: Vec<FakeInstance>,
}

impl FakeServer {
    /// Value of `column` on one instance; server-level columns repeat on
    /// every instance.
    pub fn value(&self, column: &str, instance: usize) -> String {
        let Some(fields) = self.instances.get(instance) else {
            return String::new();
        };
        match column {
            SERVER_COLUMN => self.hostname.to_string(),
            "env" => self.env.clone(),
            "os" => self.os.clone(),
            "location" => self.location.clone(),
            "rack" => self.rack.clone(),
            "owner" => self.owner.clone(),
            "cpu" => fields.cpu.clone(),
            "ram" => fields.ram.clone(),
            "disk" => fields.disk.clone(),
            "ip" => fields.ip.clone(),
            "vlan" => fields.vlan.clone(),
            _ => String::new(),
        }
    }

    pub fn values(&self, column: &str) -> Vec<String> {
        (0..self.instances.len())
            .map(|instance| self.value(column, instance))
            .collect()
    }

    pub fn is_consistent(&self, column: &str) -> bool {
        let values = self.values(column);
        values.windows(2).all(|pair| pair[0] == pair[1])
    }

    fn summary(&self, column: &str) -> ColumnValue {
        let values = self.values(column);
        if self.is_consistent(column) {
            ColumnValue::Constant(values.into_iter().next().unwrap_or_default())
        } else {
            ColumnValue::variable_from(&values)
        }
    }

    /// Listing row: eager cells plus the embedded per-instance payload.
    pub fn row(&self) -> ServerRow {
        let mut cells = BTreeMap::new();
        for column in EAGER_COLUMNS {
            cells.insert(ColumnId::from(column), self.summary(column).text().to_owned());
        }
        let instances: Vec<Value> = (0..self.instances.len())
            .map(|instance| {
                let mut constant_fields = Map::new();
                let mut variable_fields = Map::new();
                for column in EAGER_COLUMNS {
                    let value = Value::from(self.value(column, instance));
                    if self.is_consistent(column) {
                        constant_fields.insert(column.to_owned(), value);
                    } else {
                        variable_fields.insert(column.to_owned(), value);
                    }
                }
                json!({
                    "constant_fields": constant_fields,
                    "variable_fields": variable_fields,
                })
            })
            .collect();
        ServerRow {
            hostname: self.hostname.clone(),
            cells,
            instance_count: self.instances.len(),
            instances_json: Value::Array(instances).to_string(),
        }
    }

    /// One flat-mode row per instance.
    pub fn flat_rows(&self) -> Vec<ServerRow> {
        (0..self.instances.len())
            .map(|instance| {
                let cells = EAGER_COLUMNS
                    .iter()
                    .map(|column| (ColumnId::from(*column), self.value(column, instance)))
                    .collect();
                ServerRow {
                    hostname: self.hostname.clone(),
                    cells,
                    instance_count: 1,
                    instances_json: String::from("[]"),
                }
            })
            .collect()
    }

    /// Column-data payload for the requested columns.
    pub fn payload(&self, columns: &[&str]) -> HostPayload {
        let mut payload = HostPayload::default();
        for instance in 0..self.instances.len() {
            let mut entry = Map::new();
            for column in columns {
                let value = self.value(column, instance);
                let value = if value.is_empty() {
                    EMPTY_INSTANCE_GLYPH.to_owned()
                } else {
                    value
                };
                entry.insert((*column).to_owned(), Value::from(value));
            }
            payload.instances.push(entry);
        }
        for column in columns {
            match self.summary(column) {
                ColumnValue::Variable { count, preview } => {
                    payload.variable_fields.insert(
                        (*column).to_owned(),
                        json!({"count": count, "preview": preview}),
                    );
                }
                other => {
                    payload
                        .constant_fields
                        .insert((*column).to_owned(), Value::from(other.text()));
                }
            }
        }
        payload
    }
}

#[derive(Debug, Clone)]
pub struct InventoryFaker {
    rng: DeterministicRng,
    seed: u64,
}

impl InventoryFaker {
    pub fn new(seed: u64) -> Self {
        let normalized = if seed == 0 { 1 } else { seed };
        Self {
            rng: DeterministicRng::new(normalized),
            seed: normalized,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn int_n(&mut self, n: usize) -> usize {
        self.rng.int_n(n)
    }

    /// Hostnames are unique per index: role cycles, the counter advances
    /// once per full cycle.
    pub fn server(&mut self, index: usize) -> FakeServer {
        let role = ROLES[index % ROLES.len()];
        let hostname = Hostname::new(format!("{role}{:02}", index / ROLES.len() + 1));
        let instance_count = 1 + self.rng.int_n(4);
        let cpu = self.pick(&CPU_COUNTS).to_owned();
        let disk = self.pick(&DISK_SIZES).to_owned();
        let subnet = 10 + self.rng.int_n(200);
        let vlan = format!("{}", 100 + self.rng.int_n(20));
        let uniform_ram = self.rng.bool();
        let base_ram = self.pick(&RAM_SIZES).to_owned();

        let instances = (0..instance_count)
            .map(|instance| FakeInstance {
                ip: format!("10.{subnet}.{}.{}", index % 250, instance + 10),
                vlan: vlan.clone(),
                cpu: cpu.clone(),
                ram: if uniform_ram {
                    base_ram.clone()
                } else {
                    self.pick(&RAM_SIZES).to_owned()
                },
                disk: if instance == 0 { disk.clone() } else { String::new() },
            })
            .collect();

        FakeServer {
            hostname,
            env: self.pick(&ENVIRONMENTS).to_owned(),
            os: self.pick(&OPERATING_SYSTEMS).to_owned(),
            location: self.pick(&LOCATIONS).to_owned(),
            rack: format!("R{:02}", 1 + self.rng.int_n(40)),
            owner: self.pick(&OWNERS).to_owned(),
            instances,
        }
    }

    pub fn servers(&mut self, count: usize) -> Vec<FakeServer> {
        (0..count).map(|index| self.server(index)).collect()
    }

    fn pick<'a>(&mut self, values: &'a [&'a str]) -> &'a str {
        values[self.rng.int_n(values.len())]
    }
}

pub fn catalog() -> FieldCatalog {
    let fields = FIELDS
        .iter()
        .map(|(key, display, category, list_id, checked, locked)| FieldMeta {
            key: ColumnId::from(*key),
            display_name: (*display).to_owned(),
            input_name: (*key).to_owned(),
            list_id: list_id.map(str::to_owned),
            category: CategoryId::from(*category),
            checked: *checked,
            checked_disabled: *locked,
        })
        .collect();
    let categories = CATEGORIES
        .iter()
        .map(|(id, name)| Category {
            id: CategoryId::from(*id),
            name: (*name).to_owned(),
        })
        .collect();
    FieldCatalog::new(fields, categories)
}

pub fn eager_columns() -> &'static [&'static str] {
    &EAGER_COLUMNS
}

/// In-memory inventory backend: listing, column data, saved charts and
/// searches, and both annotation kinds.
#[derive(Debug, Clone)]
pub struct DemoInventory {
    catalog: FieldCatalog,
    servers: Vec<FakeServer>,
    charts: Vec<SavedChart>,
    searches: Vec<SavedSearch>,
    discrepancies: BTreeMap<Hostname, DiscrepancyAnnotation>,
    groups: BTreeMap<Hostname, GroupAnnotation>,
    next_search_id: i64,
    app_name: String,
}

impl DemoInventory {
    pub fn new(seed: u64, count: usize) -> Self {
        let servers = InventoryFaker::new(seed).servers(count);
        let charts = vec![
            SavedChart {
                id: ChartId::new(1),
                name: "OS by environment".to_owned(),
                filters: json!({"fields": ["os", "env"], "types": ["pie", "bar"]})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            },
            SavedChart {
                id: ChartId::new(2),
                name: "Production locations".to_owned(),
                filters: json!({"fields": ["location"], "types": ["doughnut"], "env": "PROD"})
                    .as_object()
                    .cloned()
                    .unwrap_or_default(),
            },
        ];
        Self {
            catalog: catalog(),
            servers,
            charts,
            searches: Vec::new(),
            discrepancies: BTreeMap::new(),
            groups: BTreeMap::new(),
            next_search_id: 1,
            app_name: "inventory".to_owned(),
        }
    }

    pub fn catalog(&self) -> &FieldCatalog {
        &self.catalog
    }

    pub fn servers(&self) -> &[FakeServer] {
        &self.servers
    }

    pub fn server(&self, host: &str) -> Option<&FakeServer> {
        self.servers
            .iter()
            .find(|server| server.hostname.as_str() == host)
    }

    /// Filters, sorts and paginates the way the listing view does.
    pub fn page(&self, query: &QueryParams) -> ServerPage {
        let mut matching: Vec<&FakeServer> = self
            .servers
            .iter()
            .filter(|server| self.matches(server, query))
            .collect();

        if let Some(column) = query.get(SORT)
            && self.catalog.contains(column)
        {
            matching.sort_by_key(|server| server.value(column, 0));
            if query.get(ORDER) == Some("desc") {
                matching.reverse();
            }
        }

        let page_size = query.page_size();
        let total = match ViewMode::parse(query.get(VIEW)) {
            ViewMode::Grouped => matching.len(),
            ViewMode::Flat => matching.iter().map(|server| server.instances.len()).sum(),
        };
        let page_count = total.div_ceil(page_size).max(1);
        let page = query.page().min(page_count);
        let rows: Vec<ServerRow> = match ViewMode::parse(query.get(VIEW)) {
            ViewMode::Grouped => matching.iter().map(|server| server.row()).collect(),
            ViewMode::Flat => matching
                .iter()
                .flat_map(|server| server.flat_rows())
                .collect(),
        };
        ServerPage {
            rows: rows
                .into_iter()
                .skip((page - 1) * page_size)
                .take(page_size)
                .collect(),
            total,
            page,
            page_size,
        }
    }

    fn matches(&self, server: &FakeServer, query: &QueryParams) -> bool {
        for (key, value) in query.iter() {
            if is_reserved_key(key) || key == SORT || key == ORDER || key == PAGE_SIZE {
                continue;
            }
            if let Some(column) = key.strip_suffix("_inconsistent") {
                if value == "true" && server.is_consistent(column) {
                    return false;
                }
                continue;
            }
            if !self.catalog.contains(key) {
                continue;
            }
            let values = server.values(key);
            let hit = value
                .split(',')
                .map(str::trim)
                .filter(|term| !term.is_empty())
                .any(|term| match term.strip_prefix('@') {
                    Some(exact) => values.iter().any(|value| value.eq_ignore_ascii_case(exact)),
                    None => {
                        let needle = term.to_uppercase();
                        values
                            .iter()
                            .any(|value| value.to_uppercase().contains(&needle))
                    }
                });
            if !hit {
                return false;
            }
        }
        true
    }

    /// Answers a column-data query: `hostnames` and `columns` as csv.
    pub fn column_data(&self, query: &QueryParams) -> ColumnDataResponse {
        let columns: Vec<&str> = query
            .get("columns")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|column| !column.is_empty())
            .collect();
        if let Some(unknown) = columns.iter().find(|column| !self.catalog.contains(column)) {
            return ColumnDataResponse {
                data: BTreeMap::new(),
                error: Some(format!("unknown column {unknown}")),
            };
        }
        let data = query
            .get("hostnames")
            .unwrap_or_default()
            .split(',')
            .filter_map(|host| self.server(host.trim()))
            .map(|server| (server.hostname.clone(), server.payload(&columns)))
            .collect();
        ColumnDataResponse { data, error: None }
    }

    pub fn app_name(&self) -> &str {
        &self.app_name
    }

    pub fn saved_charts(&self) -> Vec<SavedChart> {
        self.charts.clone()
    }

    pub fn delete_chart(&mut self, id: ChartId) -> Result<()> {
        let before = self.charts.len();
        self.charts.retain(|chart| chart.id != id);
        if before == self.charts.len() {
            bail!("chart {id} not found");
        }
        Ok(())
    }

    pub fn saved_searches(&self) -> Vec<SavedSearch> {
        self.searches.clone()
    }

    pub fn save_search(&mut self, input: &SaveSearchInput) -> Result<String> {
        input.validate()?;
        let id = SearchId::new(self.next_search_id);
        self.next_search_id += 1;
        self.searches.push(SavedSearch {
            id,
            name: input.name.trim().to_owned(),
            url: format!("/{}/?{}", self.app_name, input.query.to_query_string()),
        });
        Ok("Search saved successfully".to_owned())
    }

    pub fn delete_search(&mut self, id: SearchId) -> Result<()> {
        let before = self.searches.len();
        self.searches.retain(|search| search.id != id);
        if before == self.searches.len() {
            bail!("search {id} not found");
        }
        Ok(())
    }

    pub fn discrepancy(&self, host: &str) -> DiscrepancyAnnotation {
        self.discrepancies.get(host).cloned().unwrap_or_default()
    }

    pub fn save_discrepancy(&mut self, input: &DiscrepancyAnnotationInput) -> Result<String> {
        input.validate()?;
        let entry = self.discrepancies.entry(input.host.clone()).or_default();
        entry.history.insert(
            0,
            AnnotationHistoryEntry {
                date: fixture_datetime().to_owned(),
                user: "demo".to_owned(),
                comment: input.comment.clone(),
                assigned_to: input.assigned_to.clone(),
            },
        );
        entry.comment = input.comment.clone();
        entry.assigned_to = input.assigned_to.clone();
        Ok("Annotation saved".to_owned())
    }

    pub fn group_annotation(&self, host: &str) -> GroupAnnotation {
        self.groups.get(host).cloned().unwrap_or_default()
    }

    pub fn save_group(&mut self, input: &GroupAnnotationInput) -> Result<String> {
        input.validate()?;
        self.groups.insert(input.host.clone(), input.normalized());
        Ok("Group annotation saved".to_owned())
    }

    pub fn submit(&mut self, payload: &FormPayload) -> Result<String> {
        match payload {
            FormPayload::SaveSearch(input) => self.save_search(input),
            FormPayload::DiscrepancyAnnotation(input) => self.save_discrepancy(input),
            FormPayload::GroupAnnotation(input) => self.save_group(input),
        }
    }
}

pub fn temp_db_path() -> Result<(tempfile::TempDir, PathBuf)> {
    let dir = tempfile::tempdir().context("create temp dir")?;
    let db_path = dir.path().join("rackview.db");
    Ok((dir, db_path))
}

pub fn fixture_datetime() -> &'static str {
    "2026-02-19T12:34:56Z"
}
