// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use rackview_api::Client;
use rackview_app::forms::FormPayload;
use rackview_app::loader::LoadRequest;
use rackview_app::query::QueryParams;
use rackview_app::rows::ExpandedServers;
use rackview_app::{
    AnnotationKind, AnnotationRecord, ChartId, ColumnDataResponse, Hostname, SavedChart,
    SavedSearch, SearchId, ServerPage, Theme,
};
use rackview_store::{SessionId, Store};
use rackview_testkit::DemoInventory;
use rackview_tui::{AppRuntime, InternalEvent};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::mpsc::Sender;
use std::thread;
use tracing::{debug, info, warn};
use url::Url;

/// Per-session persistence shared by both runtimes.
pub struct SessionStore<'a> {
    store: &'a Store,
    session: SessionId,
}

impl<'a> SessionStore<'a> {
    pub fn new(store: &'a Store, session: SessionId) -> Self {
        Self { store, session }
    }

    fn save_expanded(&self, expanded: &ExpandedServers) -> Result<()> {
        self.store.save_expanded(&self.session, expanded)
    }

    fn save_query(&self, query: &QueryParams) -> Result<()> {
        self.store.save_last_query(&self.session, query)
    }

    fn save_theme(&self, theme: Theme) -> Result<()> {
        self.store.put_theme(theme)
    }
}

fn write_export(dir: &Path, name: &str, contents: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir)
        .with_context(|| format!("create export directory {}", dir.display()))?;
    let path = dir.join(name);
    fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    info!(path = %path.display(), "details exported");
    Ok(path)
}

pub struct HttpRuntime<'a> {
    client: Client,
    session: SessionStore<'a>,
    export_dir: PathBuf,
    launch_browser: bool,
}

impl<'a> HttpRuntime<'a> {
    pub fn new(client: Client, session: SessionStore<'a>, export_dir: PathBuf) -> Self {
        Self {
            client,
            session,
            export_dir,
            launch_browser: true,
        }
    }

    /// Resolves a page-relative URL against the backend base URL.
    fn absolute_url(&self, url: &str) -> Result<Url> {
        let base = Url::parse(&format!("{}/", self.client.base_url()))
            .with_context(|| format!("parse base url {}", self.client.base_url()))?;
        base.join(url.trim_start_matches('/'))
            .with_context(|| format!("resolve {url} against {base}"))
    }
}

impl AppRuntime for HttpRuntime<'_> {
    fn load_page(&mut self, query: &QueryParams) -> Result<ServerPage> {
        self.client.servers(query)
    }

    fn load_columns(&mut self, request: &LoadRequest) -> Result<ColumnDataResponse> {
        self.client.column_data(request)
    }

    fn list_charts(&mut self, app_name: &str) -> Result<Vec<SavedChart>> {
        self.client.list_charts(app_name)
    }

    fn delete_chart(&mut self, id: ChartId) -> Result<()> {
        self.client.delete_chart(id)
    }

    fn load_annotation(
        &mut self,
        host: &Hostname,
        kind: AnnotationKind,
    ) -> Result<AnnotationRecord> {
        self.client.annotation(host.as_str(), kind)
    }

    fn list_searches(&mut self) -> Result<Vec<SavedSearch>> {
        self.client.list_searches()
    }

    fn delete_search(&mut self, id: SearchId) -> Result<()> {
        self.client.delete_search(id)
    }

    fn submit_form(&mut self, payload: &FormPayload) -> Result<String> {
        payload.validate()?;
        self.client.submit_form(payload)
    }

    fn save_expanded(&mut self, expanded: &ExpandedServers) -> Result<()> {
        self.session.save_expanded(expanded)
    }

    fn save_query(&mut self, query: &QueryParams) -> Result<()> {
        self.session.save_query(query)
    }

    /// Caches locally first so the next start has the right palette even
    /// when the backend rejects the update.
    fn save_theme(&mut self, theme: Theme) -> Result<()> {
        self.session.save_theme(theme)?;
        self.client.put_theme(theme)
    }

    fn open_url(&mut self, url: &str) -> Result<()> {
        let absolute = self.absolute_url(url)?;
        info!(url = %absolute, "opening chart page");
        if !self.launch_browser {
            return Ok(());
        }
        let opener = if cfg!(target_os = "macos") {
            "open"
        } else {
            "xdg-open"
        };
        Command::new(opener)
            .arg(absolute.as_str())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .with_context(|| format!("launch {opener} for {absolute}"))?;
        Ok(())
    }

    fn write_file(&mut self, name: &str, contents: &str) -> Result<PathBuf> {
        write_export(&self.export_dir, name, contents)
    }

    fn spawn_column_load(&mut self, request: LoadRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let client = self.client.clone();
        debug!(request = request.id, "column load on worker thread");
        thread::Builder::new()
            .name(format!("column-load-{}", request.id))
            .spawn(move || {
                let event = match client.column_data(&request) {
                    Ok(response) => InternalEvent::ColumnsLoaded { request, response },
                    Err(error) => InternalEvent::ColumnsFailed {
                        request,
                        message: format!("{error:#}"),
                    },
                };
                if tx.send(event).is_err() {
                    warn!("column result dropped; UI loop already exited");
                }
            })
            .map_err(|error| anyhow!("spawn column load thread: {error}"))?;
        Ok(())
    }
}

/// In-process backend for `--demo`. Mutations land in the fake inventory
/// and vanish on exit; UI state still goes through the session store.
pub struct DemoRuntime<'a> {
    inventory: DemoInventory,
    session: SessionStore<'a>,
    export_dir: PathBuf,
}

impl<'a> DemoRuntime<'a> {
    pub fn new(inventory: DemoInventory, session: SessionStore<'a>, export_dir: PathBuf) -> Self {
        Self {
            inventory,
            session,
            export_dir,
        }
    }
}

impl AppRuntime for DemoRuntime<'_> {
    fn load_page(&mut self, query: &QueryParams) -> Result<ServerPage> {
        Ok(self.inventory.page(query))
    }

    fn load_columns(&mut self, request: &LoadRequest) -> Result<ColumnDataResponse> {
        Ok(self.inventory.column_data(&request.query()))
    }

    fn list_charts(&mut self, _app_name: &str) -> Result<Vec<SavedChart>> {
        Ok(self.inventory.saved_charts())
    }

    fn delete_chart(&mut self, id: ChartId) -> Result<()> {
        self.inventory.delete_chart(id)
    }

    fn load_annotation(
        &mut self,
        host: &Hostname,
        kind: AnnotationKind,
    ) -> Result<AnnotationRecord> {
        Ok(match kind {
            AnnotationKind::Discrepancy => {
                AnnotationRecord::Discrepancy(self.inventory.discrepancy(host.as_str()))
            }
            AnnotationKind::Group => {
                AnnotationRecord::Group(self.inventory.group_annotation(host.as_str()))
            }
        })
    }

    fn list_searches(&mut self) -> Result<Vec<SavedSearch>> {
        Ok(self.inventory.saved_searches())
    }

    fn delete_search(&mut self, id: SearchId) -> Result<()> {
        self.inventory.delete_search(id)
    }

    fn submit_form(&mut self, payload: &FormPayload) -> Result<String> {
        self.inventory.submit(payload)
    }

    fn save_expanded(&mut self, expanded: &ExpandedServers) -> Result<()> {
        self.session.save_expanded(expanded)
    }

    fn save_query(&mut self, query: &QueryParams) -> Result<()> {
        self.session.save_query(query)
    }

    fn save_theme(&mut self, theme: Theme) -> Result<()> {
        self.session.save_theme(theme)
    }

    fn open_url(&mut self, url: &str) -> Result<()> {
        info!(url, "demo mode has no chart pages; not opening");
        Ok(())
    }

    fn write_file(&mut self, name: &str, contents: &str) -> Result<PathBuf> {
        write_export(&self.export_dir, name, contents)
    }
}
