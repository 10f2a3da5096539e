// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Tracing subscriber setup for the `rackview` binary.
//!
//! Filter priority, highest first: `RACKVIEW_LOG`, `RUST_LOG`, the
//! `[logging] level` config value, then `-v`/`-q`. The terminal is in
//! raw mode while the UI runs, so interactive sessions log to a file.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
}

impl Verbosity {
    pub const fn from_flags(verbose: bool, quiet: bool) -> Self {
        if verbose {
            Self::Verbose
        } else if quiet {
            Self::Quiet
        } else {
            Self::Normal
        }
    }

    pub const fn default_level(self) -> Level {
        match self {
            Self::Quiet => Level::ERROR,
            Self::Normal => Level::INFO,
            Self::Verbose => Level::DEBUG,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    Stderr,
    File(PathBuf),
}

pub fn init_subscriber(
    verbosity: Verbosity,
    config_level: Option<&str>,
    target: LogTarget,
) -> Result<()> {
    let filter = build_env_filter(
        std::env::var("RACKVIEW_LOG").ok().as_deref(),
        std::env::var("RUST_LOG").ok().as_deref(),
        config_level,
        verbosity,
    );

    match target {
        LogTarget::Stderr => tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .without_time()
                    .compact(),
            )
            .try_init()
            .context("install stderr log subscriber")?,
        LogTarget::File(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent)
                    .with_context(|| format!("create log directory {}", parent.display()))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| {
                    format!(
                        "open log file {} -- set [logging].file to a writable path",
                        path.display()
                    )
                })?;
            tracing_subscriber::registry()
                .with(filter)
                .with(
                    fmt::layer()
                        .with_writer(Mutex::new(file))
                        .with_ansi(false)
                        .with_target(true),
                )
                .try_init()
                .context("install file log subscriber")?;
        }
    }
    Ok(())
}

/// Unparseable directives fall through to the next source instead of
/// failing startup.
fn build_env_filter(
    rackview_log: Option<&str>,
    rust_log: Option<&str>,
    config_level: Option<&str>,
    verbosity: Verbosity,
) -> EnvFilter {
    for directives in [rackview_log, rust_log, config_level].into_iter().flatten() {
        if let Ok(filter) = EnvFilter::try_new(directives) {
            return filter;
        }
    }

    let level = verbosity.default_level();
    let directive = if verbosity == Verbosity::Verbose {
        format!("{level},rackview=debug")
    } else {
        level.to_string()
    };
    EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new(level.as_str()))
}
