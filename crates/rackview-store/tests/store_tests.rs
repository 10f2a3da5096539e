// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::Result;
use rackview_app::query::QueryParams;
use rackview_app::rows::ExpandedServers;
use rackview_app::{Hostname, Theme};
use rackview_store::{SessionId, Store, validate_db_path};
use rackview_testkit::temp_db_path;

fn session() -> SessionId {
    SessionId::derive("https://inventory.example.com/", "inventory", "default")
}

#[test]
fn validate_db_path_rejects_uri_forms() {
    assert!(validate_db_path("").is_err());
    assert!(validate_db_path("file:test.db").is_err());
    assert!(validate_db_path("https://example.com/db.sqlite").is_err());
    assert!(validate_db_path("db.sqlite?mode=ro").is_err());
    assert!(validate_db_path(":memory:").is_ok());
    assert!(validate_db_path("/tmp/rackview.db").is_ok());
}

#[test]
fn session_ids_are_stable_and_scoped() {
    let left = SessionId::derive("https://inventory.example.com/", "/inventory/", "default");
    let right = SessionId::derive("https://inventory.example.com", "inventory", "default");
    assert_eq!(left, right);
    assert_eq!(left.as_str().len(), 64);

    let other = SessionId::derive("https://inventory.example.com", "inventory", "second");
    assert_ne!(left, other);
}

#[test]
fn bootstrap_is_idempotent() -> Result<()> {
    let (_dir, path) = temp_db_path()?;
    {
        let store = Store::open(&path)?;
        store.bootstrap()?;
        store.put_theme(Theme::Dark)?;
    }
    let store = Store::open(&path)?;
    store.bootstrap()?;
    assert_eq!(store.theme()?, Some(Theme::Dark));
    Ok(())
}

#[test]
fn bootstrap_rejects_foreign_database() -> Result<()> {
    let store = Store::open_memory()?;
    store
        .raw_connection()
        .execute_batch("CREATE TABLE projects (id INTEGER PRIMARY KEY);")?;
    let error = store.bootstrap().expect_err("foreign schema should fail");
    assert!(error.to_string().contains("settings"));
    Ok(())
}

#[test]
fn bootstrap_rejects_schema_missing_required_column() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    store.raw_connection().execute_batch(
        "
        DROP TABLE sessions;
        CREATE TABLE sessions (
          session_id TEXT PRIMARY KEY,
          created_at TEXT NOT NULL,
          updated_at TEXT NOT NULL
        );
        ",
    )?;
    let error = store.bootstrap().expect_err("missing columns should fail");
    let message = error.to_string();
    assert!(message.contains("expanded_hosts"), "message: {message}");
    assert!(message.contains("last_query"), "message: {message}");
    Ok(())
}

#[test]
fn theme_defaults_to_none_and_ignores_garbage() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    assert_eq!(store.theme()?, None);

    store.put_theme(Theme::Light)?;
    assert_eq!(store.theme()?, Some(Theme::Light));

    store.raw_connection().execute(
        "UPDATE settings SET value = 'neon' WHERE key = 'ui.theme'",
        [],
    )?;
    assert_eq!(store.theme()?, None);
    Ok(())
}

#[test]
fn expanded_servers_round_trip_in_order() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    let session = session();

    assert!(store.load_expanded(&session)?.is_empty());

    let expanded =
        ExpandedServers::from_hosts(["WEB02", "DB01", "WEB01"].map(Hostname::from));
    store.save_expanded(&session, &expanded)?;
    assert_eq!(store.load_expanded(&session)?, expanded);

    store.save_expanded(&session, &ExpandedServers::new())?;
    assert!(store.load_expanded(&session)?.is_empty());
    Ok(())
}

#[test]
fn corrupt_expanded_value_restores_nothing() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    let session = session();
    store.touch_session(&session)?;
    store.raw_connection().execute(
        "UPDATE sessions SET expanded_hosts = '{not json' WHERE session_id = ?",
        [session.as_str()],
    )?;
    assert!(store.load_expanded(&session)?.is_empty());
    Ok(())
}

#[test]
fn sessions_are_isolated() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    let first = session();
    let second = SessionId::derive("https://inventory.example.com", "inventory", "other");

    store.save_expanded(&first, &ExpandedServers::from_hosts([Hostname::from("WEB01")]))?;
    assert!(store.load_expanded(&second)?.is_empty());

    store.clear_session(&first)?;
    assert!(store.load_expanded(&first)?.is_empty());
    assert_eq!(store.session_count()?, 0);
    Ok(())
}

#[test]
fn last_query_round_trip() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    let session = session();
    assert_eq!(store.last_query(&session)?, None);

    let query = QueryParams::parse("server=WEB01,DB02&page_size=100&visible_columns=server,cpu");
    store.save_last_query(&session, &query)?;
    assert_eq!(store.last_query(&session)?, Some(query));

    store.save_last_query(&session, &QueryParams::new())?;
    assert_eq!(store.last_query(&session)?, None);
    Ok(())
}

#[test]
fn prune_drops_only_idle_sessions() -> Result<()> {
    let store = Store::open_memory()?;
    store.bootstrap()?;
    let fresh = session();
    let stale = SessionId::derive("https://inventory.example.com", "inventory", "stale");
    store.touch_session(&fresh)?;
    store.touch_session(&stale)?;
    store.raw_connection().execute(
        "UPDATE sessions SET updated_at = '2000-01-01T00:00:00Z' WHERE session_id = ?",
        [stale.as_str()],
    )?;

    assert_eq!(store.prune_sessions(0)?, 0);
    assert_eq!(store.prune_sessions(30)?, 1);
    assert_eq!(store.session_count()?, 1);
    Ok(())
}
