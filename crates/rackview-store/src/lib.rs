// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Local persistence for one terminal browsing session: which servers are
//! expanded, the last listing query, and a handful of user settings.

use anyhow::{Context, Result, anyhow, bail};
use rackview_app::query::QueryParams;
use rackview_app::rows::ExpandedServers;
use rackview_app::{Hostname, Theme};
use rusqlite::{Connection, OptionalExtension, params};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

pub const APP_NAME: &str = "rackview";

const REQUIRED_SCHEMA: &[(&str, &[&str])] = &[
    ("settings", &["key", "value", "updated_at"]),
    (
        "sessions",
        &[
            "session_id",
            "expanded_hosts",
            "last_query",
            "created_at",
            "updated_at",
        ],
    ),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingKey {
    Theme,
}

impl SettingKey {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Theme => "ui.theme",
        }
    }
}

/// Stable identity of a browsing session: the same backend and listing seen
/// from the same named session always maps to the same row.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionId(String);

impl SessionId {
    pub fn derive(base_url: &str, inventory_path: &str, name: &str) -> Self {
        let material = format!(
            "{}\n{}\n{}",
            base_url.trim_end_matches('/'),
            inventory_path.trim_matches('/'),
            name
        );
        Self(checksum_sha256(material.as_bytes()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_db_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open database at {}", path.display()))?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory database")?;
        configure_connection(&conn)?;
        Ok(Self { conn })
    }

    pub fn raw_connection(&self) -> &Connection {
        &self.conn
    }

    pub fn bootstrap(&self) -> Result<()> {
        if has_user_tables(&self.conn)? {
            validate_schema(&self.conn)?;
        } else {
            self.conn
                .execute_batch(include_str!("sql/schema.sql"))
                .context("create schema")?;
        }
        Ok(())
    }

    pub fn theme(&self) -> Result<Option<Theme>> {
        let Some(raw) = self.get_setting_raw(SettingKey::Theme.as_str())? else {
            return Ok(None);
        };
        match Theme::parse(&raw) {
            Some(theme) => Ok(Some(theme)),
            None => {
                warn!(value = %raw, "ignoring unknown stored theme");
                Ok(None)
            }
        }
    }

    pub fn put_theme(&self, theme: Theme) -> Result<()> {
        self.put_setting_raw(SettingKey::Theme.as_str(), theme.as_str())
    }

    /// Creates the session row if needed and bumps its timestamp.
    pub fn touch_session(&self, session: &SessionId) -> Result<()> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO sessions (session_id, created_at, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(session_id) DO UPDATE SET
                  updated_at = excluded.updated_at
                ",
                params![session.as_str(), now, now],
            )
            .context("touch session")?;
        Ok(())
    }

    /// Expanded hosts for the session. An unreadable value restores nothing
    /// rather than blocking startup.
    pub fn load_expanded(&self, session: &SessionId) -> Result<ExpandedServers> {
        let raw = self
            .conn
            .query_row(
                "SELECT expanded_hosts FROM sessions WHERE session_id = ?",
                params![session.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .context("read expanded servers")?;
        let Some(raw) = raw else {
            return Ok(ExpandedServers::new());
        };
        match serde_json::from_str::<Vec<Hostname>>(&raw) {
            Ok(hosts) => Ok(ExpandedServers::from_hosts(hosts)),
            Err(error) => {
                warn!(error = %error, "discarding unreadable expanded server list");
                Ok(ExpandedServers::new())
            }
        }
    }

    pub fn save_expanded(&self, session: &SessionId, expanded: &ExpandedServers) -> Result<()> {
        let encoded = serde_json::to_string(expanded).context("encode expanded servers")?;
        self.touch_session(session)?;
        self.conn
            .execute(
                "UPDATE sessions SET expanded_hosts = ?, updated_at = ? WHERE session_id = ?",
                params![encoded, now_rfc3339()?, session.as_str()],
            )
            .context("save expanded servers")?;
        debug!(count = expanded.len(), "expanded servers saved");
        Ok(())
    }

    pub fn last_query(&self, session: &SessionId) -> Result<Option<QueryParams>> {
        let raw = self
            .conn
            .query_row(
                "SELECT last_query FROM sessions WHERE session_id = ?",
                params![session.as_str()],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .context("read last query")?;
        Ok(raw
            .filter(|query| !query.is_empty())
            .map(|query| QueryParams::parse(&query)))
    }

    pub fn save_last_query(&self, session: &SessionId, query: &QueryParams) -> Result<()> {
        self.touch_session(session)?;
        self.conn
            .execute(
                "UPDATE sessions SET last_query = ?, updated_at = ? WHERE session_id = ?",
                params![query.to_query_string(), now_rfc3339()?, session.as_str()],
            )
            .context("save last query")?;
        Ok(())
    }

    pub fn clear_session(&self, session: &SessionId) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM sessions WHERE session_id = ?",
                params![session.as_str()],
            )
            .context("clear session")?;
        Ok(())
    }

    /// Drops sessions idle longer than `max_age_days`. Zero or negative keeps
    /// everything.
    pub fn prune_sessions(&self, max_age_days: i64) -> Result<usize> {
        if max_age_days <= 0 {
            return Ok(0);
        }
        let cutoff = OffsetDateTime::now_utc()
            .checked_sub(Duration::days(max_age_days))
            .ok_or_else(|| anyhow!("session retention is too large: {max_age_days} days"))?
            .format(&Rfc3339)
            .context("format session cutoff")?;
        let removed = self
            .conn
            .execute(
                "DELETE FROM sessions WHERE updated_at < ?",
                params![cutoff],
            )
            .context("prune idle sessions")?;
        if removed > 0 {
            debug!(removed, "pruned idle sessions");
        }
        Ok(removed)
    }

    pub fn session_count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .context("count sessions")?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn get_setting_raw(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("read setting {key}"))
    }

    fn put_setting_raw(&self, key: &str, value: &str) -> Result<()> {
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO settings (key, value, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                  value = excluded.value,
                  updated_at = excluded.updated_at
                ",
                params![key, value, now],
            )
            .with_context(|| format!("upsert setting {key}"))?;
        Ok(())
    }
}

pub fn default_db_path() -> Result<PathBuf> {
    if let Some(override_path) = env::var_os("RACKVIEW_DB_PATH") {
        return Ok(PathBuf::from(override_path));
    }

    let data_root = dirs::data_local_dir().ok_or_else(|| {
        anyhow!("cannot resolve data directory; set RACKVIEW_DB_PATH to a writable database path")
    })?;

    let app_dir = data_root.join(APP_NAME);
    fs::create_dir_all(&app_dir)
        .with_context(|| format!("create data directory {}", app_dir.display()))?;
    Ok(app_dir.join("rackview.db"))
}

pub fn validate_db_path(path: &str) -> Result<()> {
    if path.is_empty() {
        bail!("database path must not be empty");
    }
    if path == ":memory:" {
        return Ok(());
    }

    if let Some(index) = path.find("://")
        && index > 0
    {
        let scheme = &path[..index];
        if scheme.chars().all(char::is_alphabetic) {
            bail!(
                "database path {path:?} looks like a URI ({scheme}://); pass a filesystem path instead"
            );
        }
    }

    if path.starts_with("file:") {
        bail!("database path {path:?} uses file: URI syntax; pass a plain filesystem path");
    }

    if path.contains('?') {
        bail!(
            "database path {path:?} contains '?'; remove query parameters and use a plain file path"
        );
    }

    Ok(())
}

fn has_user_tables(conn: &Connection) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "
            SELECT COUNT(*)
            FROM sqlite_master
            WHERE type = 'table'
              AND name NOT LIKE 'sqlite_%'
            ",
            [],
            |row| row.get(0),
        )
        .context("count user tables")?;
    Ok(count > 0)
}

fn validate_schema(conn: &Connection) -> Result<()> {
    for (table, required_columns) in REQUIRED_SCHEMA {
        let columns = table_columns(conn, table)?;
        if columns.is_empty() {
            bail!(
                "database is missing required table `{table}`; point RACKVIEW_DB_PATH at a rackview database"
            );
        }

        let missing: Vec<&str> = required_columns
            .iter()
            .copied()
            .filter(|column| !columns.contains(*column))
            .collect();
        if !missing.is_empty() {
            bail!(
                "table `{table}` is missing required columns: {}; delete the session database and restart",
                missing.join(", ")
            );
        }
    }
    Ok(())
}

fn table_columns(conn: &Connection, table: &str) -> Result<BTreeSet<String>> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({table})"))
        .with_context(|| format!("inspect columns for {table}"))?;
    let rows = stmt
        .query_map([], |row| row.get::<_, String>(1))
        .with_context(|| format!("query column info for {table}"))?;

    rows.collect::<rusqlite::Result<BTreeSet<_>>>()
        .with_context(|| format!("collect columns for {table}"))
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA foreign_keys = ON;
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format current timestamp")
}

fn checksum_sha256(data: &[u8]) -> String {
    let digest = Sha256::digest(data);
    let mut output = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write as _;
        let _ = write!(&mut output, "{byte:02x}");
    }
    output
}
