// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! On-demand column loading for the rows of the current page.
//!
//! The loader never performs I/O. [`LazyColumnLoader::plan`] decides what
//! can be painted from cache and what must be fetched, and hands back a
//! [`LoadRequest`]; whoever runs the request reports back through
//! [`LazyColumnLoader::complete`] or [`LazyColumnLoader::fail`]. Every
//! fetched column carries a sequence number so a response that lost a race
//! against a newer request for the same column is dropped.

use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::cache::ColumnCache;
use crate::ids::{ColumnId, Hostname};
use crate::model::{
    CellValue, ColumnData, ColumnDataResponse, ColumnValue, HostPayload, SERVER_COLUMN, ViewMode,
    value_text,
};
use crate::query::{PAGE, PAGE_SIZE, QueryParams, VIEW, VISIBLE_COLUMNS};

pub const MISSING_GLYPH: &str = "-";
pub const EMPTY_INSTANCE_GLYPH: &str = "--";
pub const LOADING_GLYPH: &str = "…";
pub const ERROR_GLYPH: &str = "!";

/// What a column load is scoped to: the rows on screen and the query that
/// produced them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PageContext {
    pub hostnames: Vec<Hostname>,
    pub page: usize,
    pub page_size: usize,
    pub view_mode: ViewMode,
    pub filters: QueryParams,
}

impl PageContext {
    pub fn from_query(params: &QueryParams, hostnames: Vec<Hostname>) -> Self {
        let mut filters = params.clone();
        for key in [PAGE, PAGE_SIZE, VISIBLE_COLUMNS, VIEW] {
            filters.delete(key);
        }
        Self {
            hostnames,
            page: params.page(),
            page_size: params.page_size(),
            view_mode: ViewMode::parse(params.get(VIEW)),
            filters,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadRequest {
    pub id: u64,
    pub columns: Vec<ColumnId>,
    sequences: BTreeMap<ColumnId, u64>,
    pub context: PageContext,
}

impl LoadRequest {
    /// Query string for the column-data endpoint.
    pub fn query(&self) -> QueryParams {
        let mut params = QueryParams::new();
        let hostnames = self
            .context
            .hostnames
            .iter()
            .map(Hostname::as_str)
            .collect::<Vec<_>>()
            .join(",");
        let columns = self
            .columns
            .iter()
            .map(ColumnId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        params.append("hostnames", hostnames);
        params.append("columns", columns);
        params.append(PAGE, self.context.page.to_string());
        params.append(PAGE_SIZE, self.context.page_size.to_string());
        params.append("view_mode", self.context.view_mode.as_str());
        for (key, value) in self.context.filters.iter() {
            params.append(key, value);
        }
        params
    }

    pub fn sequence(&self, column: &str) -> Option<u64> {
        self.sequences.get(column).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadPlan {
    pub from_cache: Vec<ColumnId>,
    pub request: Option<LoadRequest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LoadOutcome {
    pub applied: Vec<ColumnId>,
    pub stale: Vec<ColumnId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ColumnPaint {
    Loading,
    Loaded(ColumnData),
    Failed(String),
}

/// How one cell should be drawn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellPaint<'a> {
    /// Column was never requested; the row's eager value applies.
    Unrequested,
    Loading,
    Value(&'a ColumnValue),
    Missing,
    Error(&'a str),
}

impl CellPaint<'_> {
    pub fn text(&self) -> String {
        match self {
            Self::Unrequested => String::new(),
            Self::Loading => LOADING_GLYPH.to_owned(),
            Self::Value(value) if value.text().is_empty() => MISSING_GLYPH.to_owned(),
            Self::Value(value) => value.text().to_owned(),
            Self::Missing => MISSING_GLYPH.to_owned(),
            Self::Error(_) => ERROR_GLYPH.to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LazyColumnLoader {
    cache: ColumnCache,
    context: PageContext,
    loaded: BTreeSet<ColumnId>,
    loading: BTreeSet<ColumnId>,
    sequences: BTreeMap<ColumnId, u64>,
    paints: BTreeMap<ColumnId, ColumnPaint>,
    next_request_id: u64,
}

impl Default for LazyColumnLoader {
    fn default() -> Self {
        Self::new(PageContext::default())
    }
}

impl LazyColumnLoader {
    pub fn new(context: PageContext) -> Self {
        let mut loaded = BTreeSet::new();
        loaded.insert(ColumnId::from(SERVER_COLUMN));
        Self {
            cache: ColumnCache::default(),
            context,
            loaded,
            loading: BTreeSet::new(),
            sequences: BTreeMap::new(),
            paints: BTreeMap::new(),
            next_request_id: 0,
        }
    }

    pub fn context(&self) -> &PageContext {
        &self.context
    }

    /// Switches to a new page of rows. Loaded/loading marks and paints are
    /// dropped so visible columns load again for the new rows; in-flight
    /// responses for the old page become stale. The cache is kept.
    pub fn set_context(&mut self, context: PageContext) {
        if context == self.context {
            return;
        }
        debug!(
            rows = context.hostnames.len(),
            page = context.page,
            "column loader context changed"
        );
        self.context = context;
        self.loaded.retain(|column| column.as_str() == SERVER_COLUMN);
        for column in std::mem::take(&mut self.loading) {
            self.bump_sequence(&column);
        }
        self.paints.clear();
    }

    pub fn is_loaded(&self, column: &str) -> bool {
        self.loaded.contains(column)
    }

    pub fn is_loading(&self, column: &str) -> bool {
        self.loading.contains(column)
    }

    pub fn cache(&self) -> &ColumnCache {
        &self.cache
    }

    /// Partitions `columns` into skipped, served-from-cache and to-fetch.
    pub fn plan(&mut self, columns: &[ColumnId], now: Instant) -> LoadPlan {
        let mut plan = LoadPlan::default();
        let mut fetch = Vec::new();

        for column in columns {
            if self.loaded.contains(column) || self.loading.contains(column) {
                continue;
            }
            if fetch.contains(column) || plan.from_cache.contains(column) {
                continue;
            }
            if let Some(data) = self.cache.get(column.as_str(), now) {
                self.paints
                    .insert(column.clone(), ColumnPaint::Loaded(data.clone()));
                self.loaded.insert(column.clone());
                plan.from_cache.push(column.clone());
                continue;
            }
            fetch.push(column.clone());
        }

        if !plan.from_cache.is_empty() {
            debug!(columns = ?plan.from_cache, "columns served from cache");
        }
        if fetch.is_empty() {
            return plan;
        }

        let mut sequences = BTreeMap::new();
        for column in &fetch {
            let sequence = self.bump_sequence(column);
            sequences.insert(column.clone(), sequence);
            self.loading.insert(column.clone());
            self.paints.insert(column.clone(), ColumnPaint::Loading);
        }
        self.next_request_id = self.next_request_id.saturating_add(1);
        info!(request = self.next_request_id, columns = ?fetch, "fetching columns");
        plan.request = Some(LoadRequest {
            id: self.next_request_id,
            columns: fetch,
            sequences,
            context: self.context.clone(),
        });
        plan
    }

    fn bump_sequence(&mut self, column: &ColumnId) -> u64 {
        let sequence = self.sequences.entry(column.clone()).or_insert(0);
        *sequence = sequence.saturating_add(1);
        *sequence
    }

    fn is_current(&self, request: &LoadRequest, column: &ColumnId) -> bool {
        request.sequence(column.as_str()).is_some()
            && request.sequence(column.as_str()) == self.sequences.get(column).copied()
    }

    /// Applies a response. A body carrying `error` is handled as a failure.
    pub fn complete(
        &mut self,
        request: &LoadRequest,
        response: &ColumnDataResponse,
        now: Instant,
    ) -> LoadOutcome {
        if let Some(error) = response.error.as_deref() {
            return self.fail(request, error);
        }

        let mut outcome = LoadOutcome::default();
        for column in &request.columns {
            if !self.is_current(request, column) {
                outcome.stale.push(column.clone());
                continue;
            }
            let data = extract_column(&response.data, column.as_str(), request.context.view_mode);
            self.cache.insert(column.clone(), data.clone(), now);
            self.paints.insert(column.clone(), ColumnPaint::Loaded(data));
            self.loading.remove(column);
            self.loaded.insert(column.clone());
            outcome.applied.push(column.clone());
        }
        if !outcome.stale.is_empty() {
            debug!(request = request.id, columns = ?outcome.stale, "discarded stale column data");
        }
        outcome
    }

    /// Clears the loading mark and paints an error into the request's
    /// columns. Nothing is cached.
    pub fn fail(&mut self, request: &LoadRequest, message: &str) -> LoadOutcome {
        let mut outcome = LoadOutcome::default();
        for column in &request.columns {
            if !self.is_current(request, column) {
                outcome.stale.push(column.clone());
                continue;
            }
            self.loading.remove(column);
            self.paints
                .insert(column.clone(), ColumnPaint::Failed(message.to_owned()));
            outcome.applied.push(column.clone());
        }
        warn!(request = request.id, columns = ?outcome.applied, error = message, "column load failed");
        outcome
    }

    /// Forgets cached data for one column or all of them; the affected
    /// columns load again on the next request.
    pub fn clear_cache(&mut self, column: Option<&str>) {
        self.cache.clear(column);
        match column {
            Some(column) => {
                if column != SERVER_COLUMN {
                    self.loaded.remove(column);
                }
            }
            None => self.loaded.retain(|column| column.as_str() == SERVER_COLUMN),
        }
    }

    pub fn paint(&self, column: &str, hostname: &str) -> CellPaint<'_> {
        match self.paints.get(column) {
            None => CellPaint::Unrequested,
            Some(ColumnPaint::Loading) => CellPaint::Loading,
            Some(ColumnPaint::Failed(message)) => CellPaint::Error(message),
            Some(ColumnPaint::Loaded(data)) => match data.get(hostname) {
                Some(cell) => CellPaint::Value(&cell.value),
                None => CellPaint::Missing,
            },
        }
    }

    /// Detail-row value: `instance` is zero-based. `None` leaves the
    /// populated detail cell as it is.
    pub fn instance_text(&self, column: &str, hostname: &str, instance: usize) -> Option<String> {
        let Some(ColumnPaint::Loaded(data)) = self.paints.get(column) else {
            return None;
        };
        let value = data.get(hostname)?.instances.get(instance)?;
        Some(if value.is_empty() {
            EMPTY_INSTANCE_GLYPH.to_owned()
        } else {
            value.clone()
        })
    }

    pub fn error_message(&self, column: &str) -> Option<&str> {
        match self.paints.get(column) {
            Some(ColumnPaint::Failed(message)) => Some(message),
            _ => None,
        }
    }
}

/// Pulls one column out of a column-data response.
pub fn extract_column(
    payloads: &BTreeMap<Hostname, HostPayload>,
    column: &str,
    view_mode: ViewMode,
) -> ColumnData {
    let mut data = ColumnData::new();
    for (hostname, payload) in payloads {
        let instances: Vec<String> = payload
            .instances
            .iter()
            .map(|instance| instance_value(instance, column))
            .collect();
        let value = match view_mode {
            ViewMode::Flat => {
                let Some(first) = instances.first() else {
                    continue;
                };
                ColumnValue::Flat(first.clone())
            }
            ViewMode::Grouped => {
                if let Some(value) = payload.constant_fields.get(column) {
                    ColumnValue::Constant(value_text(value))
                } else if let Some(value) = payload.variable_fields.get(column) {
                    variable_value(value)
                } else if let Some(first) = instances.first() {
                    ColumnValue::Constant(first.clone())
                } else {
                    continue;
                }
            }
        };
        data.insert(hostname.clone(), CellValue { value, instances });
    }
    data
}

fn instance_value(instance: &Map<String, Value>, column: &str) -> String {
    instance.get(column).map(value_text).unwrap_or_default()
}

fn variable_value(value: &Value) -> ColumnValue {
    match value {
        Value::Object(summary) => ColumnValue::Variable {
            count: summary
                .get("count")
                .and_then(Value::as_u64)
                .and_then(|count| usize::try_from(count).ok())
                .unwrap_or(0),
            preview: summary.get("preview").map(value_text).unwrap_or_default(),
        },
        other => ColumnValue::Variable {
            count: 0,
            preview: value_text(other),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::{CellPaint, LazyColumnLoader, PageContext, extract_column};
    use crate::model::{ColumnDataResponse, ColumnValue, HostPayload, ViewMode};
    use crate::query::QueryParams;
    use crate::{ColumnId, Hostname};
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn context() -> PageContext {
        PageContext::from_query(
            &QueryParams::parse("env=PROD&page=2&page_size=25&visible_columns=server,cpu"),
            vec![Hostname::from("WEB01"), Hostname::from("WEB02")],
        )
    }

    fn columns(names: &[&str]) -> Vec<ColumnId> {
        names.iter().map(|name| ColumnId::from(*name)).collect()
    }

    fn response(value: serde_json::Value) -> ColumnDataResponse {
        serde_json::from_value(value).expect("valid column-data response")
    }

    fn grouped_response() -> ColumnDataResponse {
        response(json!({
            "data": {
                "WEB01": {
                    "instances": [{"cpu": "8", "ram": "64", "os": "RHEL8"}, {"cpu": "8", "ram": "32", "os": "RHEL9"}],
                    "constant_fields": {"cpu": "8"},
                    "variable_fields": {"ram": {"count": 2, "preview": "64 | 32"}}
                },
                "WEB02": {
                    "instances": [{"cpu": "4", "ram": "", "os": "RHEL9"}],
                    "constant_fields": {},
                    "variable_fields": {}
                }
            }
        }))
    }

    #[test]
    fn request_query_is_scoped_to_page() {
        let mut loader = LazyColumnLoader::new(context());
        let plan = loader.plan(&columns(&["cpu"]), Instant::now());
        let request = plan.request.expect("cpu needs a fetch");
        assert_eq!(
            request.query().to_query_string(),
            "hostnames=WEB01,WEB02&columns=cpu&page=2&page_size=25&view_mode=grouped&env=PROD"
        );
    }

    #[test]
    fn server_column_is_always_loaded() {
        let mut loader = LazyColumnLoader::new(context());
        let plan = loader.plan(&columns(&["server"]), Instant::now());
        assert!(plan.request.is_none());
        assert!(plan.from_cache.is_empty());
    }

    #[test]
    fn cached_column_skips_fetch() {
        let start = Instant::now();
        let mut loader = LazyColumnLoader::new(context());
        let plan = loader.plan(&columns(&["cpu"]), start);
        let request = plan.request.expect("first load fetches");
        loader.complete(&request, &grouped_response(), start);

        loader.set_context(PageContext {
            page: 3,
            ..context()
        });
        assert!(!loader.is_loaded("cpu"));

        let plan = loader.plan(&columns(&["cpu", "ram"]), start + Duration::from_secs(60));
        assert_eq!(plan.from_cache, columns(&["cpu"]));
        let request = plan.request.expect("ram is not cached");
        assert_eq!(request.columns, columns(&["ram"]));
        assert_eq!(request.query().get("columns"), Some("ram"));
    }

    #[test]
    fn expired_cache_fetches_again() {
        let start = Instant::now();
        let mut loader = LazyColumnLoader::new(context());
        let request = loader
            .plan(&columns(&["cpu"]), start)
            .request
            .expect("first load fetches");
        loader.complete(&request, &grouped_response(), start);
        loader.set_context(PageContext {
            page: 3,
            ..context()
        });

        let plan = loader.plan(&columns(&["cpu"]), start + Duration::from_secs(5 * 60));
        assert!(plan.from_cache.is_empty());
        assert!(plan.request.is_some());
    }

    #[test]
    fn loading_column_is_not_planned_twice() {
        let mut loader = LazyColumnLoader::new(context());
        let now = Instant::now();
        assert!(loader.plan(&columns(&["cpu"]), now).request.is_some());
        assert!(loader.is_loading("cpu"));
        assert_eq!(loader.paint("cpu", "WEB01"), CellPaint::Loading);

        let plan = loader.plan(&columns(&["cpu", "cpu"]), now);
        assert!(plan.request.is_none());
    }

    #[test]
    fn grouped_values_paint_cells() {
        let mut loader = LazyColumnLoader::new(context());
        let now = Instant::now();
        let request = loader
            .plan(&columns(&["cpu", "ram", "os", "disk"]), now)
            .request
            .expect("fetch");
        let outcome = loader.complete(&request, &grouped_response(), now);
        assert_eq!(outcome.applied.len(), 4);
        assert!(!loader.is_loading("cpu"));
        assert!(loader.is_loaded("cpu"));

        assert_eq!(loader.paint("cpu", "WEB01").text(), "8");
        assert_eq!(loader.paint("ram", "WEB01").text(), "64 | 32");
        assert_eq!(loader.paint("os", "WEB01").text(), "RHEL8");
        assert_eq!(loader.paint("ram", "WEB02").text(), "-");
        assert_eq!(loader.paint("disk", "WEB01").text(), "-");
        assert_eq!(loader.paint("cpu", "WEB99"), CellPaint::Missing);
        assert_eq!(
            loader.instance_text("ram", "WEB01", 1).as_deref(),
            Some("32")
        );
        assert_eq!(
            loader.instance_text("ram", "WEB02", 0).as_deref(),
            Some("--")
        );
    }

    #[test]
    fn flat_mode_takes_first_instance() {
        let data = extract_column(&grouped_response().data, "os", ViewMode::Flat);
        let web01 = data.get("WEB01").expect("WEB01 present");
        assert_eq!(web01.value, ColumnValue::Flat("RHEL8".to_owned()));
        assert_eq!(web01.instances, vec!["RHEL8", "RHEL9"]);

        let mut payloads = grouped_response().data;
        payloads.insert(Hostname::from("EMPTY"), HostPayload::default());
        let data = extract_column(&payloads, "os", ViewMode::Flat);
        assert!(!data.contains_key("EMPTY"));
    }

    #[test]
    fn failure_marks_error_and_allows_retry() {
        let mut loader = LazyColumnLoader::new(context());
        let now = Instant::now();
        let request = loader.plan(&columns(&["cpu"]), now).request.expect("fetch");
        loader.fail(&request, "HTTP 500");

        assert!(!loader.is_loading("cpu"));
        assert!(!loader.is_loaded("cpu"));
        assert_eq!(loader.paint("cpu", "WEB01"), CellPaint::Error("HTTP 500"));
        assert_eq!(loader.paint("cpu", "WEB01").text(), "!");
        assert!(loader.cache().is_empty());

        assert!(loader.plan(&columns(&["cpu"]), now).request.is_some());
    }

    #[test]
    fn error_body_is_a_failure() {
        let mut loader = LazyColumnLoader::new(context());
        let now = Instant::now();
        let request = loader.plan(&columns(&["cpu"]), now).request.expect("fetch");
        loader.complete(&request, &response(json!({"error": "bad filter"})), now);
        assert_eq!(loader.error_message("cpu"), Some("bad filter"));
    }

    #[test]
    fn stale_response_is_discarded() {
        let mut loader = LazyColumnLoader::new(context());
        let now = Instant::now();
        let old = loader.plan(&columns(&["cpu"]), now).request.expect("fetch");

        loader.set_context(PageContext {
            page: 3,
            ..context()
        });
        let new = loader.plan(&columns(&["cpu"]), now).request.expect("refetch");

        let outcome = loader.complete(&old, &grouped_response(), now);
        assert_eq!(outcome.stale, columns(&["cpu"]));
        assert!(loader.is_loading("cpu"));
        assert!(loader.cache().is_empty());

        let outcome = loader.fail(&old, "late failure");
        assert!(outcome.applied.is_empty());
        assert_eq!(loader.paint("cpu", "WEB01"), CellPaint::Loading);

        let outcome = loader.complete(&new, &grouped_response(), now);
        assert_eq!(outcome.applied, columns(&["cpu"]));
    }

    #[test]
    fn clear_cache_forces_reload() {
        let mut loader = LazyColumnLoader::new(context());
        let now = Instant::now();
        let request = loader.plan(&columns(&["cpu"]), now).request.expect("fetch");
        loader.complete(&request, &grouped_response(), now);

        loader.clear_cache(Some("cpu"));
        assert!(loader.plan(&columns(&["cpu"]), now).request.is_some());
    }
}
