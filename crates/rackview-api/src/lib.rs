// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Blocking client for the inventory backend. Reads are plain GETs; every
//! mutation carries the CSRF token and the session cookie.

use anyhow::{Context, Result, anyhow, bail};
use rackview_app::csrf::{self, CSRF_HEADER};
use rackview_app::forms::{
    DiscrepancyAnnotationInput, FormPayload, GroupAnnotationInput, SaveSearchInput,
};
use rackview_app::loader::LoadRequest;
use rackview_app::query::QueryParams;
use rackview_app::{
    AnnotationKind, AnnotationRecord, ChartId, ColumnDataResponse, DiscrepancyAnnotation,
    FieldCatalog, GroupAnnotation, MutationResponse, SavedChart, SavedSearch, SearchId,
    ServerPage, Theme,
};
use reqwest::StatusCode;
use reqwest::blocking::{Client as HttpClient, RequestBuilder, Response};
use reqwest::header::{COOKIE, REFERER};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

pub const GLOBAL_PREFERENCES: &str = "global";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub base_url: String,
    pub inventory_path: String,
    pub timeout: Duration,
    pub csrf_token: Option<String>,
    pub cookie: Option<String>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            inventory_path: "inventory".to_owned(),
            timeout: DEFAULT_TIMEOUT,
            csrf_token: None,
            cookie: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Client {
    base_url: String,
    inventory_path: String,
    timeout: Duration,
    cookie: Option<String>,
    csrf_token: String,
    http: HttpClient,
}

impl Client {
    pub fn new(options: ClientOptions) -> Result<Self> {
        let base_url = options.base_url.trim().trim_end_matches('/').to_owned();
        if base_url.is_empty() {
            bail!("server.base_url must not be empty -- set it in the config file and retry");
        }
        let parsed = Url::parse(&base_url)
            .with_context(|| format!("server.base_url {base_url:?} is not a valid URL"))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            bail!(
                "server.base_url {base_url:?} must use http or https -- fix the scheme and retry"
            );
        }
        let inventory_path = options.inventory_path.trim().trim_matches('/').to_owned();
        if inventory_path.is_empty() {
            bail!("server.inventory_path must not be empty -- set it (e.g. \"inventory\") and retry");
        }

        let http = HttpClient::builder()
            .timeout(options.timeout)
            .build()
            .context("build HTTP client")?;

        let cookie = options.cookie.filter(|cookie| !cookie.trim().is_empty());
        let csrf_token = options
            .csrf_token
            .filter(|token| !token.trim().is_empty())
            .or_else(|| {
                cookie
                    .as_deref()
                    .and_then(|header| csrf::cookie_value(header, csrf::CSRF_COOKIE))
            })
            .unwrap_or_default();

        Ok(Self {
            base_url,
            inventory_path,
            timeout: options.timeout,
            cookie,
            csrf_token,
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn inventory_path(&self) -> &str {
        &self.inventory_path
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn csrf_token(&self) -> &str {
        &self.csrf_token
    }

    /// Fills in the CSRF token from the listing page's meta tag when neither
    /// the config nor the cookie supplied one.
    pub fn resolve_csrf(&mut self) -> Result<()> {
        if !self.csrf_token.is_empty() {
            return Ok(());
        }
        let url = self.inventory_url("")?;
        let response = self
            .authorized(self.http.get(url))
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;
        let html = success_body(response)?;
        self.csrf_token = csrf::csrf_token(self.cookie.as_deref(), Some(&html));
        Ok(())
    }

    pub fn fields(&self) -> Result<FieldCatalog> {
        let value: Value = self.get_json(self.inventory_url("api/fields/")?, "field metadata")?;
        FieldCatalog::from_value(&value)
    }

    pub fn servers(&self, query: &QueryParams) -> Result<ServerPage> {
        let url = with_query(self.inventory_url("api/servers/")?, query);
        let page: ServerPage = self.get_json(url, "server listing")?;
        debug!(rows = page.rows.len(), total = page.total, "server listing fetched");
        Ok(page)
    }

    /// An `error` in the payload is returned as data; only transport and
    /// decode failures are `Err`.
    pub fn column_data(&self, request: &LoadRequest) -> Result<ColumnDataResponse> {
        let url = with_query(self.inventory_url("api/column-data/")?, &request.query());
        debug!(
            request = request.id,
            columns = request.columns.len(),
            hosts = request.context.hostnames.len(),
            "fetching column data"
        );
        self.get_json(url, "column data")
    }

    pub fn theme(&self) -> Result<Option<Theme>> {
        let mut url = self.endpoint("common/api/preferences/")?;
        url.query_pairs_mut().append_pair("app", GLOBAL_PREFERENCES);
        let response: PreferencesResponse = self.get_json(url, "preferences")?;
        if !response.success {
            bail!("preferences request was rejected by the server");
        }
        Ok(response
            .settings
            .get("theme")
            .and_then(Value::as_str)
            .and_then(Theme::parse))
    }

    pub fn put_theme(&self, theme: Theme) -> Result<()> {
        let url = self.endpoint("common/api/preferences/update/")?;
        let body = json!({
            "app_name": GLOBAL_PREFERENCES,
            "key": "theme",
            "value": theme.as_str(),
        });
        self.mutate(self.post(url).json(&body), "save theme")?;
        Ok(())
    }

    pub fn list_charts(&self, app_name: &str) -> Result<Vec<SavedChart>> {
        let mut url = self.endpoint("common/api/charts/list/")?;
        url.query_pairs_mut().append_pair("app", app_name);
        let response: ChartsResponse = self.get_json(url, "saved charts")?;
        if !response.success {
            bail!(
                "{}",
                response
                    .error
                    .unwrap_or_else(|| "saved charts request failed".to_owned())
            );
        }
        Ok(response.charts)
    }

    pub fn delete_chart(&self, id: ChartId) -> Result<()> {
        let url = self.endpoint(&format!("common/api/charts/{id}/delete/"))?;
        self.mutate(self.post(url), "delete chart")?;
        info!(chart = %id, "saved chart deleted");
        Ok(())
    }

    pub fn annotation(&self, host: &str, kind: AnnotationKind) -> Result<AnnotationRecord> {
        match kind {
            AnnotationKind::Discrepancy => self.discrepancy(host).map(AnnotationRecord::Discrepancy),
            AnnotationKind::Group => self.group_annotation(host).map(AnnotationRecord::Group),
        }
    }

    pub fn discrepancy(&self, host: &str) -> Result<DiscrepancyAnnotation> {
        let url = self.annotation_url(AnnotationKind::Discrepancy, host)?;
        self.get_json(url, "discrepancy annotation")
    }

    pub fn group_annotation(&self, host: &str) -> Result<GroupAnnotation> {
        let url = self.annotation_url(AnnotationKind::Group, host)?;
        self.get_json(url, "group annotation")
    }

    pub fn save_discrepancy(&self, input: &DiscrepancyAnnotationInput) -> Result<String> {
        let url = self.annotation_url(AnnotationKind::Discrepancy, input.host.as_str())?;
        self.mutate(self.post(url).form(&input.form_fields()), "save annotation")
    }

    pub fn save_group(&self, input: &GroupAnnotationInput) -> Result<String> {
        let url = self.annotation_url(AnnotationKind::Group, input.host.as_str())?;
        self.mutate(
            self.post(url).json(&input.normalized()),
            "save group annotation",
        )
    }

    pub fn list_searches(&self) -> Result<Vec<SavedSearch>> {
        let response: SearchesResponse =
            self.get_json(self.inventory_url("api/saved_searches/")?, "saved searches")?;
        if !response.success {
            bail!(
                "{}",
                response
                    .error
                    .unwrap_or_else(|| "saved searches request failed".to_owned())
            );
        }
        Ok(response.searches)
    }

    pub fn save_search(&self, input: &SaveSearchInput) -> Result<String> {
        let url = self.inventory_url("save_search/")?;
        let form = [
            ("search_name", input.name.trim().to_owned()),
            ("filters", input.filters_json()),
            ("tags", input.tags_json()),
        ];
        self.mutate(self.post(url).form(&form), "save search")
    }

    pub fn delete_search(&self, id: SearchId) -> Result<()> {
        let url = self.inventory_url(&format!("delete_search/{id}/"))?;
        self.mutate(self.post(url), "delete search")?;
        info!(search = %id, "saved search deleted");
        Ok(())
    }

    pub fn submit_form(&self, payload: &FormPayload) -> Result<String> {
        match payload {
            FormPayload::SaveSearch(input) => self.save_search(input),
            FormPayload::DiscrepancyAnnotation(input) => self.save_discrepancy(input),
            FormPayload::GroupAnnotation(input) => self.save_group(input),
        }
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        let raw = format!("{}/{}", self.base_url, path.trim_start_matches('/'));
        Url::parse(&raw).with_context(|| format!("build request URL {raw}"))
    }

    fn inventory_url(&self, rest: &str) -> Result<Url> {
        self.endpoint(&format!("{}/{rest}", self.inventory_path))
    }

    fn annotation_url(&self, kind: AnnotationKind, host: &str) -> Result<Url> {
        let mut url = self.endpoint(&format!("{}/annotation/", kind.as_str()))?;
        url.path_segments_mut()
            .map_err(|()| anyhow!("server.base_url cannot carry a path"))?
            .pop_if_empty()
            .push(host)
            .push("");
        Ok(url)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match &self.cookie {
            Some(cookie) => builder.header(COOKIE, cookie),
            None => builder,
        }
    }

    fn post(&self, url: Url) -> RequestBuilder {
        if self.csrf_token.is_empty() {
            warn!(url = %url, "sending mutation without a csrf token");
        }
        self.authorized(self.http.post(url))
            .header(CSRF_HEADER, &self.csrf_token)
            .header(REFERER, format!("{}/{}/", self.base_url, self.inventory_path))
    }

    fn get_json<T: DeserializeOwned>(&self, url: Url, what: &str) -> Result<T> {
        let response = self
            .authorized(self.http.get(url))
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            warn!(status = status.as_u16(), what, "request failed");
            return Err(clean_error_response(status, &body));
        }
        response.json().with_context(|| format!("decode {what}"))
    }

    fn mutate(&self, builder: RequestBuilder, what: &str) -> Result<String> {
        let response = builder
            .send()
            .map_err(|error| connection_error(&self.base_url, error))?;
        let status = response.status();
        let body = response.text().unwrap_or_default();
        if !status.is_success() {
            warn!(status = status.as_u16(), what, "mutation failed");
            return Err(clean_error_response(status, &body));
        }
        let parsed: MutationResponse = serde_json::from_str(&body)
            .with_context(|| format!("decode {what} response"))?;
        if !parsed.success {
            bail!("{}", parsed.failure_text());
        }
        Ok(parsed.message.unwrap_or_default())
    }
}

fn with_query(mut url: Url, query: &QueryParams) -> Url {
    if !query.is_empty() {
        url.set_query(Some(&query.to_query_string()));
    }
    url
}

fn success_body(response: Response) -> Result<String> {
    let status = response.status();
    let body = response.text().context("read response body")?;
    if !status.is_success() {
        return Err(clean_error_response(status, &body));
    }
    Ok(body)
}

fn connection_error(base_url: &str, error: reqwest::Error) -> anyhow::Error {
    anyhow!(
        "cannot reach {} -- check server.base_url and your network ({})",
        base_url,
        error
    )
}

fn clean_error_response(status: StatusCode, body: &str) -> anyhow::Error {
    if let Ok(parsed) = serde_json::from_str::<MutationResponse>(body) {
        let text = parsed.error.or(parsed.message).unwrap_or_default();
        if !text.is_empty() {
            return anyhow!("server error ({}): {}", status.as_u16(), text);
        }
    }

    if status == StatusCode::FORBIDDEN {
        return anyhow!(
            "server returned 403 -- check server.cookie and server.csrf_token in the config"
        );
    }

    if body.len() < 100 && !body.contains('{') && !body.contains('<') {
        return anyhow!("server error ({}): {}", status.as_u16(), body.trim());
    }

    anyhow!("server returned {}", status.as_u16())
}

#[derive(Debug, Deserialize)]
struct PreferencesResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    settings: Map<String, Value>,
}

#[derive(Debug, Deserialize)]
struct ChartsResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    charts: Vec<SavedChart>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SearchesResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    searches: Vec<SavedSearch>,
    #[serde(default)]
    error: Option<String>,
}
