// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use rackview_api::{ClientOptions, DEFAULT_TIMEOUT};
use rackview_app::query::{DEFAULT_PAGE_SIZE, PAGE_SIZE, QueryParams, VIEW};
use rackview_app::{ListingSettings, ViewMode};
use rackview_tui::TuiOptions;
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_VERSION: i64 = 1;
const DEFAULT_BASE_URL: &str = "http://localhost:8000";
const DEFAULT_INVENTORY_PATH: &str = "inventory";
const DEFAULT_SESSION: &str = "default";
const DEFAULT_RETENTION_DAYS: i64 = 30;
const DEFAULT_LOG_LEVEL: &str = "info";
const MAX_PAGE_SIZE: i64 = 1000;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub server: Server,
    #[serde(default)]
    pub ui: Ui,
    #[serde(default)]
    pub storage: Storage,
    #[serde(default)]
    pub logging: Logging,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            server: Server::default(),
            ui: Ui::default(),
            storage: Storage::default(),
            logging: Logging::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub base_url: Option<String>,
    pub inventory_path: Option<String>,
    pub app_name: Option<String>,
    pub permanent_filter: Option<String>,
    pub timeout: Option<String>,
    pub csrf_token: Option<String>,
    pub cookie: Option<String>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            base_url: Some(DEFAULT_BASE_URL.to_owned()),
            inventory_path: Some(DEFAULT_INVENTORY_PATH.to_owned()),
            app_name: None,
            permanent_filter: None,
            timeout: Some("10s".to_owned()),
            csrf_token: None,
            cookie: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Ui {
    pub page_size: Option<i64>,
    pub view: Option<String>,
    pub status_clear: Option<String>,
}

impl Default for Ui {
    fn default() -> Self {
        Self {
            page_size: Some(50),
            view: Some(ViewMode::Grouped.as_str().to_owned()),
            status_clear: Some("4s".to_owned()),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Storage {
    pub db_path: Option<String>,
    pub session: Option<String>,
    pub retention_days: Option<i64>,
}

impl Default for Storage {
    fn default() -> Self {
        Self {
            db_path: None,
            session: Some(DEFAULT_SESSION.to_owned()),
            retention_days: Some(DEFAULT_RETENTION_DAYS),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Logging {
    pub level: Option<String>,
    pub file: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("RACKVIEW_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set RACKVIEW_CONFIG_PATH to the config file")
        })?;

        let app_dir = config_root.join(rackview_store::APP_NAME);
        fs::create_dir_all(&app_dir)
            .with_context(|| format!("create config directory {}", app_dir.display()))?;
        Ok(app_dir.join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} is not versioned. Add `version = 1` and put values under [server], [ui], [storage], and [logging]",
                    path.display()
                )
            })?;

        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1. Run `rackview --print-example-config` for the current layout",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(db_path) = &self.storage.db_path {
            rackview_store::validate_db_path(db_path)?;
        }

        if let Some(timeout) = &self.server.timeout
            && parse_duration(timeout)? <= Duration::ZERO
        {
            bail!(
                "server.timeout in {} must be positive, got {}",
                path.display(),
                timeout
            );
        }

        if let Some(status_clear) = &self.ui.status_clear
            && parse_duration(status_clear)? <= Duration::ZERO
        {
            bail!(
                "ui.status_clear in {} must be positive, got {}",
                path.display(),
                status_clear
            );
        }

        if let Some(page_size) = self.ui.page_size
            && !(1..=MAX_PAGE_SIZE).contains(&page_size)
        {
            bail!(
                "ui.page_size in {} must be between 1 and {MAX_PAGE_SIZE}, got {}",
                path.display(),
                page_size
            );
        }

        if let Some(view) = &self.ui.view
            && view != ViewMode::Flat.as_str()
            && view != ViewMode::Grouped.as_str()
        {
            bail!(
                "ui.view in {} must be \"flat\" or \"grouped\", got {:?}",
                path.display(),
                view
            );
        }

        if let Some(days) = self.storage.retention_days
            && days < 0
        {
            bail!(
                "storage.retention_days in {} must be non-negative, got {}",
                path.display(),
                days
            );
        }

        if let Some(session) = &self.storage.session
            && session.trim().is_empty()
        {
            bail!(
                "storage.session in {} must not be empty -- pick a name and retry",
                path.display()
            );
        }

        Ok(())
    }

    pub fn db_path(&self) -> Result<PathBuf> {
        match &self.storage.db_path {
            Some(path) => Ok(PathBuf::from(path)),
            None => rackview_store::default_db_path(),
        }
    }

    pub fn base_url(&self) -> &str {
        self.server
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/')
    }

    pub fn inventory_path(&self) -> &str {
        self.server
            .inventory_path
            .as_deref()
            .unwrap_or(DEFAULT_INVENTORY_PATH)
            .trim_matches('/')
    }

    pub fn timeout(&self) -> Result<Duration> {
        match &self.server.timeout {
            Some(raw) => parse_duration(raw),
            None => Ok(DEFAULT_TIMEOUT),
        }
    }

    pub fn client_options(&self) -> Result<ClientOptions> {
        Ok(ClientOptions {
            base_url: self.base_url().to_owned(),
            inventory_path: self.inventory_path().to_owned(),
            timeout: self.timeout()?,
            csrf_token: self.server.csrf_token.clone(),
            cookie: self.server.cookie.clone(),
        })
    }

    /// The app name defaults to the inventory path, which is what the
    /// chart pages are mounted under.
    pub fn listing_settings(&self) -> ListingSettings {
        let app_name = self
            .server
            .app_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.inventory_path())
            .to_owned();
        ListingSettings {
            app_name,
            permanent_filter: self
                .server
                .permanent_filter
                .clone()
                .filter(|filter| !filter.trim().is_empty()),
        }
    }

    pub fn page_size(&self) -> usize {
        self.ui
            .page_size
            .and_then(|size| usize::try_from(size).ok())
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }

    pub fn view_mode(&self) -> ViewMode {
        ViewMode::parse(self.ui.view.as_deref())
    }

    /// Query used when neither `--url` nor a stored session supplies one.
    pub fn default_query(&self) -> QueryParams {
        let mut query = QueryParams::new();
        if self.page_size() != DEFAULT_PAGE_SIZE {
            query.set(PAGE_SIZE, self.page_size().to_string());
        }
        if self.view_mode() == ViewMode::Flat {
            query.set(VIEW, ViewMode::Flat.as_str());
        }
        query
    }

    pub fn tui_options(&self) -> Result<TuiOptions> {
        let status_clear = match &self.ui.status_clear {
            Some(raw) => parse_duration(raw)?,
            None => TuiOptions::default().status_clear,
        };
        Ok(TuiOptions { status_clear })
    }

    pub fn session_name(&self) -> &str {
        self.storage
            .session
            .as_deref()
            .map(str::trim)
            .unwrap_or(DEFAULT_SESSION)
    }

    pub fn retention_days(&self) -> i64 {
        self.storage
            .retention_days
            .unwrap_or(DEFAULT_RETENTION_DAYS)
    }

    pub fn log_level(&self) -> Option<&str> {
        self.logging
            .level
            .as_deref()
            .map(str::trim)
            .filter(|level| !level.is_empty())
    }

    pub fn log_file(&self) -> Result<PathBuf> {
        if let Some(file) = &self.logging.file {
            return Ok(PathBuf::from(file));
        }
        let data_root = dirs::data_local_dir().ok_or_else(|| {
            anyhow!("cannot resolve data directory; set [logging].file to a writable log path")
        })?;
        Ok(data_root
            .join(rackview_store::APP_NAME)
            .join("rackview.log"))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# rackview config\n# Place this file at: {}\n\nversion = 1\n\n[server]\nbase_url = \"{}\"\ninventory_path = \"{}\"\n# Chart pages live under /<app_name>/charts/; defaults to inventory_path\n# app_name = \"inventory\"\n# Appended to chart URLs as permanentfilter=<value>\n# permanent_filter = \"\"\ntimeout = \"10s\"\n# Session cookie copied from the browser; csrftoken is read from it\n# cookie = \"sessionid=...; csrftoken=...\"\n# csrf_token = \"\"\n\n[ui]\npage_size = {}\nview = \"grouped\"\nstatus_clear = \"4s\"\n\n[storage]\n# Optional. Default is platform data dir (for example ~/.local/share/rackview/rackview.db)\n# db_path = \"/absolute/path/to/rackview.db\"\nsession = \"{}\"\nretention_days = {}\n\n[logging]\nlevel = \"{}\"\n# file = \"/absolute/path/to/rackview.log\"\n",
            path.display(),
            DEFAULT_BASE_URL,
            DEFAULT_INVENTORY_PATH,
            DEFAULT_PAGE_SIZE,
            DEFAULT_SESSION,
            DEFAULT_RETENTION_DAYS,
            DEFAULT_LOG_LEVEL,
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    if let Some(value) = raw.strip_suffix("ms") {
        let millis: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_millis(millis));
    }
    if let Some(value) = raw.strip_suffix('s') {
        let secs: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(secs));
    }
    if let Some(value) = raw.strip_suffix('m') {
        let mins: u64 = value
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))?;
        return Ok(Duration::from_secs(mins * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 5s)")
}
