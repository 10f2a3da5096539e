// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod logging;
mod runtime;

use anyhow::{Context, Result, anyhow};
use config::Config;
use logging::{LogTarget, Verbosity};
use rackview_api::Client;
use rackview_app::query::QueryParams;
use rackview_app::{Command, InventoryState, Theme};
use rackview_store::{SessionId, Store};
use rackview_testkit::DemoInventory;
use runtime::{DemoRuntime, HttpRuntime, SessionStore};
use std::env;
use std::path::PathBuf;
use tracing::{info, warn};
use url::Url;

const DEMO_SEED: u64 = 42;
const DEMO_SERVERS: usize = 120;
const DEMO_BASE_URL: &str = "demo";

fn main() {
    if let Err(error) = run() {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let options = parse_cli_args(env::args().skip(1), Config::default_path()?)?;
    if options.show_help {
        print_help();
        return Ok(());
    }

    if options.print_config_path {
        println!("{}", options.config_path.display());
        return Ok(());
    }

    if options.print_example {
        print!("{}", Config::example_config(&options.config_path));
        return Ok(());
    }

    let config = Config::load(&options.config_path).with_context(|| {
        format!(
            "load config {}; run `rackview --print-example-config` to generate a v1 template",
            options.config_path.display()
        )
    })?;

    let db_path = if options.demo {
        PathBuf::from(":memory:")
    } else {
        config.db_path()?
    };
    if options.print_db_path {
        println!("{}", db_path.display());
        return Ok(());
    }

    let target = if options.check_only {
        LogTarget::Stderr
    } else {
        LogTarget::File(config.log_file()?)
    };
    logging::init_subscriber(
        Verbosity::from_flags(options.verbose, options.quiet),
        config.log_level(),
        target,
    )?;

    let store = Store::open(&db_path).with_context(|| {
        format!(
            "open database {} -- if this path is wrong, set [storage].db_path or RACKVIEW_DB_PATH",
            db_path.display()
        )
    })?;
    store.bootstrap()?;
    let pruned = store.prune_sessions(config.retention_days())?;
    if pruned > 0 {
        info!(pruned, "dropped idle sessions");
    }

    let export_dir = env::current_dir().context("resolve working directory for exports")?;

    if options.demo {
        let inventory = DemoInventory::new(DEMO_SEED, DEMO_SERVERS);
        let session = SessionId::derive(DEMO_BASE_URL, config.inventory_path(), config.session_name());
        if options.check_only {
            info!(servers = inventory.servers().len(), "demo inventory ready");
            return Ok(());
        }
        let mut state = prepare_state(
            &store,
            &session,
            inventory.catalog().clone(),
            options.url.as_deref(),
            &config,
            None,
        )?;
        let mut runtime = DemoRuntime::new(
            inventory,
            SessionStore::new(&store, session),
            export_dir,
        );
        return rackview_tui::run_app(&mut state, &mut runtime, config.tui_options()?);
    }

    let mut client = Client::new(config.client_options()?).with_context(|| {
        format!(
            "invalid [server] config in {}; fix base_url/inventory_path/timeout values",
            options.config_path.display()
        )
    })?;
    let catalog = client.fields().context("fetch field catalog")?;
    if client.csrf_token().is_empty()
        && let Err(error) = client.resolve_csrf()
    {
        warn!(error = %format!("{error:#}"), "no CSRF token; saves will be rejected");
    }
    if options.check_only {
        info!(
            base_url = client.base_url(),
            fields = catalog.fields().len(),
            "backend reachable"
        );
        return Ok(());
    }

    let backend_theme = match client.theme() {
        Ok(theme) => theme,
        Err(error) => {
            warn!(error = %format!("{error:#}"), "theme preference unavailable; using cached value");
            None
        }
    };
    let session = SessionId::derive(
        client.base_url(),
        client.inventory_path(),
        config.session_name(),
    );
    let mut state = prepare_state(
        &store,
        &session,
        catalog,
        options.url.as_deref(),
        &config,
        backend_theme,
    )?;
    let mut runtime = HttpRuntime::new(client, SessionStore::new(&store, session), export_dir);
    rackview_tui::run_app(&mut state, &mut runtime, config.tui_options()?)
}

/// Builds the listing state and replays what the session stored last time.
fn prepare_state(
    store: &Store,
    session: &SessionId,
    catalog: rackview_app::FieldCatalog,
    url_arg: Option<&str>,
    config: &Config,
    backend_theme: Option<Theme>,
) -> Result<InventoryState> {
    store.touch_session(session)?;
    let query = initial_query(url_arg, store.last_query(session)?, config)?;
    let theme = match backend_theme {
        Some(theme) => {
            store.put_theme(theme)?;
            theme
        }
        None => store.theme()?.unwrap_or_default(),
    };

    let mut state = InventoryState::new(catalog, query, config.listing_settings());
    state.dispatch(Command::RestoreExpanded(store.load_expanded(session)?));
    state.dispatch(Command::ThemeLoaded(theme));
    Ok(state)
}

/// `--url` wins over the stored query, which wins over config defaults.
fn initial_query(
    url_arg: Option<&str>,
    stored: Option<QueryParams>,
    config: &Config,
) -> Result<QueryParams> {
    if let Some(raw) = url_arg {
        return parse_url_arg(raw);
    }
    Ok(stored.unwrap_or_else(|| config.default_query()))
}

/// Accepts a full listing URL, a `?query`, or a bare query string.
fn parse_url_arg(raw: &str) -> Result<QueryParams> {
    let raw = raw.trim();
    if raw.contains("://") {
        let url = Url::parse(raw).with_context(|| format!("--url {raw:?} is not a valid URL"))?;
        return Ok(QueryParams::parse(url.query().unwrap_or_default()));
    }
    Ok(QueryParams::parse(raw.trim_start_matches('?')))
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct CliOptions {
    config_path: PathBuf,
    print_config_path: bool,
    print_db_path: bool,
    demo: bool,
    print_example: bool,
    check_only: bool,
    show_help: bool,
    url: Option<String>,
    verbose: bool,
    quiet: bool,
}

fn parse_cli_args<I, S>(args: I, default_config_path: PathBuf) -> Result<CliOptions>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut options = CliOptions {
        config_path: default_config_path,
        print_config_path: false,
        print_db_path: false,
        demo: false,
        print_example: false,
        check_only: false,
        show_help: false,
        url: None,
        verbose: false,
        quiet: false,
    };

    let mut iter = args.into_iter();
    while let Some(arg) = iter.next() {
        match arg.as_ref() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--config requires a file path"))?;
                options.config_path = PathBuf::from(value.as_ref());
            }
            "--url" => {
                let value = iter
                    .next()
                    .ok_or_else(|| anyhow!("--url requires a listing URL or query string"))?;
                options.url = Some(value.as_ref().to_owned());
            }
            "--print-config-path" => {
                options.print_config_path = true;
            }
            "--print-path" => {
                options.print_db_path = true;
            }
            "--print-example-config" => {
                options.print_example = true;
            }
            "--demo" => {
                options.demo = true;
            }
            "--check" => {
                options.check_only = true;
            }
            "--verbose" | "-v" => {
                options.verbose = true;
            }
            "--quiet" | "-q" => {
                options.quiet = true;
            }
            "--help" | "-h" => {
                options.show_help = true;
            }
            unknown => {
                return Err(anyhow!(
                    "unknown argument {unknown:?}; run with --help to see supported options"
                ));
            }
        }
    }

    Ok(options)
}

fn print_help() {
    println!("rackview - server inventory browser");
    println!("  --config <path>          Use a specific config path");
    println!("  --url <url|query>        Open a listing URL or query string");
    println!("  --print-config-path      Print resolved config path");
    println!("  --print-path             Print resolved database path");
    println!("  --print-example-config   Print a v1 config template");
    println!("  --demo                   Browse a generated inventory (in-memory)");
    println!("  --check                  Validate config, database and backend reachability");
    println!("  -v, --verbose            Log at debug level");
    println!("  -q, --quiet              Log errors only");
    println!("  --help                   Show this help");
}

#[cfg(test)]
mod tests {
    use super::{CliOptions, Config, initial_query, parse_cli_args, parse_url_arg, prepare_state};
    use anyhow::Result;
    use rackview_app::query::QueryParams;
    use rackview_app::rows::ExpandedServers;
    use rackview_app::{Hostname, Theme};
    use rackview_store::{SessionId, Store};
    use rackview_testkit::DemoInventory;
    use std::fs;
    use std::path::PathBuf;

    fn default_options_path() -> PathBuf {
        PathBuf::from("/tmp/rackview-config.toml")
    }

    fn load_config(contents: &str) -> Result<Config> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        fs::write(&path, contents)?;
        Config::load(&path)
    }

    #[test]
    fn parse_cli_args_defaults_to_provided_config_path() -> Result<()> {
        let options = parse_cli_args(Vec::<String>::new(), default_options_path())?;
        assert_eq!(
            options,
            CliOptions {
                config_path: default_options_path(),
                print_config_path: false,
                print_db_path: false,
                demo: false,
                print_example: false,
                check_only: false,
                show_help: false,
                url: None,
                verbose: false,
                quiet: false,
            }
        );
        Ok(())
    }

    #[test]
    fn parse_cli_args_sets_config_path_override() -> Result<()> {
        let options = parse_cli_args(
            vec!["--config", "/custom/config.toml"],
            default_options_path(),
        )?;
        assert_eq!(options.config_path, PathBuf::from("/custom/config.toml"));
        Ok(())
    }

    #[test]
    fn parse_cli_args_errors_for_missing_values() {
        let error = parse_cli_args(vec!["--config"], default_options_path())
            .expect_err("missing config value should fail");
        assert!(error.to_string().contains("--config requires a file path"));

        let error = parse_cli_args(vec!["--url"], default_options_path())
            .expect_err("missing url value should fail");
        assert!(error.to_string().contains("--url requires"));
    }

    #[test]
    fn parse_cli_args_errors_for_unknown_argument() {
        let error = parse_cli_args(vec!["--wat"], default_options_path())
            .expect_err("unknown arg should fail");
        let message = error.to_string();
        assert!(message.contains("unknown argument"));
        assert!(message.contains("--help"));
    }

    #[test]
    fn parse_cli_args_sets_flags() -> Result<()> {
        let options = parse_cli_args(
            vec!["--demo", "-v", "--check", "--url", "?env=PROD"],
            default_options_path(),
        )?;
        assert!(options.demo);
        assert!(options.verbose);
        assert!(!options.quiet);
        assert!(options.check_only);
        assert!(!options.print_example);
        assert_eq!(options.url.as_deref(), Some("?env=PROD"));
        Ok(())
    }

    #[test]
    fn url_arg_accepts_full_urls_and_bare_queries() -> Result<()> {
        let expected = QueryParams::parse("env=PROD&page=2");
        assert_eq!(
            parse_url_arg("https://inv.example.com/inventory/?env=PROD&page=2")?,
            expected
        );
        assert_eq!(parse_url_arg("?env=PROD&page=2")?, expected);
        assert_eq!(parse_url_arg("env=PROD&page=2")?, expected);
        assert!(parse_url_arg("https://inv.example.com/inventory/")?.is_empty());
        assert!(parse_url_arg("http://[bad").is_err());
        Ok(())
    }

    #[test]
    fn initial_query_prefers_url_then_session_then_config() -> Result<()> {
        let config = load_config("version = 1\n[ui]\npage_size = 100\nview = \"flat\"\n")?;
        let stored = Some(QueryParams::parse("os=Ubuntu"));

        let query = initial_query(Some("env=UAT"), stored.clone(), &config)?;
        assert_eq!(query, QueryParams::parse("env=UAT"));

        let query = initial_query(None, stored, &config)?;
        assert_eq!(query, QueryParams::parse("os=Ubuntu"));

        let query = initial_query(None, None, &config)?;
        assert_eq!(query.get("page_size"), Some("100"));
        assert_eq!(query.get("view"), Some("flat"));
        Ok(())
    }

    #[test]
    fn prepare_state_restores_session_and_caches_backend_theme() -> Result<()> {
        let config = load_config("version = 1\n")?;
        let store = Store::open_memory()?;
        store.bootstrap()?;
        let session = SessionId::derive("demo", "inventory", "default");
        store.save_expanded(
            &session,
            &ExpandedServers::from_hosts([Hostname::from("WEB01")]),
        )?;
        store.save_last_query(&session, &QueryParams::parse("env=PROD"))?;

        let inventory = DemoInventory::new(3, 5);
        let state = prepare_state(
            &store,
            &session,
            inventory.catalog().clone(),
            None,
            &config,
            Some(Theme::Dark),
        )?;
        assert_eq!(state.theme(), Theme::Dark);
        assert!(state.expanded().contains("WEB01"));
        assert_eq!(state.query().get("env"), Some("PROD"));
        assert_eq!(store.theme()?, Some(Theme::Dark));
        assert_eq!(store.session_count()?, 1);
        Ok(())
    }

    #[test]
    fn prepare_state_falls_back_to_cached_theme() -> Result<()> {
        let config = load_config("version = 1\n")?;
        let store = Store::open_memory()?;
        store.bootstrap()?;
        store.put_theme(Theme::Dark)?;
        let session = SessionId::derive("demo", "inventory", "default");

        let inventory = DemoInventory::new(3, 5);
        let state = prepare_state(
            &store,
            &session,
            inventory.catalog().clone(),
            None,
            &config,
            None,
        )?;
        assert_eq!(state.theme(), Theme::Dark);
        assert!(state.expanded().is_empty());
        Ok(())
    }
}
