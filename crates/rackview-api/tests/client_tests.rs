// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow};
use rackview_api::{Client, ClientOptions};
use rackview_app::forms::{DiscrepancyAnnotationInput, FormPayload, GroupAnnotationInput};
use rackview_app::loader::{LazyColumnLoader, PageContext};
use rackview_app::query::QueryParams;
use rackview_app::{ColumnId, GroupAnnotation, Hostname, Theme};
use rackview_testkit::DemoInventory;
use std::io::Read;
use std::thread;
use std::time::{Duration, Instant};
use tiny_http::{Header, Method, Request, Response, Server};

fn json_response(body: impl Into<String>) -> Response<std::io::Cursor<Vec<u8>>> {
    Response::from_string(body.into())
        .with_status_code(200)
        .with_header(
            Header::from_bytes("Content-Type", "application/json")
                .expect("valid content type header"),
        )
}

fn header(request: &Request, name: &'static str) -> Option<String> {
    request
        .headers()
        .iter()
        .find(|header| header.field.equiv(name))
        .map(|header| header.value.as_str().to_owned())
}

fn body(request: &mut Request) -> String {
    let mut body = String::new();
    request
        .as_reader()
        .read_to_string(&mut body)
        .expect("request body should be readable");
    body
}

fn mock_server() -> Result<(Server, String)> {
    let server =
        Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
    let addr = format!("http://{}", server.server_addr());
    Ok((server, addr))
}

fn client(addr: &str) -> Result<Client> {
    Client::new(ClientOptions {
        base_url: addr.to_owned(),
        timeout: Duration::from_secs(2),
        cookie: Some("sessionid=abc; csrftoken=tok123".to_owned()),
        ..ClientOptions::default()
    })
}

#[test]
fn unreachable_backend_error_is_actionable() {
    let client = Client::new(ClientOptions {
        base_url: "http://127.0.0.1:1".to_owned(),
        timeout: Duration::from_millis(50),
        ..ClientOptions::default()
    })
    .expect("client should initialize");

    let error = client.fields().expect_err("fields should fail");
    assert!(error.to_string().contains("server.base_url"));
}

#[test]
fn fields_and_servers_decode() -> Result<()> {
    let (server, addr) = mock_server()?;
    let inventory = DemoInventory::new(11, 12);
    let catalog_body = inventory.catalog().to_value().to_string();
    let page_body = serde_json::to_string(&inventory.page(&QueryParams::parse("env=PROD")))?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("fields request expected");
        assert_eq!(request.url(), "/inventory/api/fields/");
        assert_eq!(
            header(&request, "Cookie").as_deref(),
            Some("sessionid=abc; csrftoken=tok123")
        );
        request
            .respond(json_response(catalog_body))
            .expect("response should succeed");

        let request = server.recv().expect("servers request expected");
        assert_eq!(request.url(), "/inventory/api/servers/?env=PROD");
        request
            .respond(json_response(page_body))
            .expect("response should succeed");
    });

    let client = client(&addr)?;
    let catalog = client.fields()?;
    assert_eq!(&catalog, inventory.catalog());
    let page = client.servers(&QueryParams::parse("env=PROD"))?;
    assert_eq!(page, inventory.page(&QueryParams::parse("env=PROD")));

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn column_data_sends_scoped_query() -> Result<()> {
    let (server, addr) = mock_server()?;
    let inventory = DemoInventory::new(3, 4);
    let hosts: Vec<Hostname> = inventory
        .servers()
        .iter()
        .map(|server| server.hostname.clone())
        .collect();

    let mut loader = LazyColumnLoader::new(PageContext::from_query(
        &QueryParams::parse("env=PROD&page_size=25"),
        hosts,
    ));
    let plan = loader.plan(&[ColumnId::from("cpu")], Instant::now());
    let request = plan.request.expect("cpu needs a fetch");
    let expected = inventory.column_data(&request.query());
    let response_body = serde_json::to_string(&expected)?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("column data request expected");
        let url = request.url().to_owned();
        assert!(url.starts_with("/inventory/api/column-data/?hostnames=WEB01,DB01,APP01,CACHE01"));
        assert!(url.contains("&columns=cpu&"));
        assert!(url.contains("view_mode=grouped"));
        assert!(url.ends_with("&env=PROD"));
        request
            .respond(json_response(response_body))
            .expect("response should succeed");
    });

    let response = client(&addr)?.column_data(&request)?;
    assert_eq!(response, expected);

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn discrepancy_save_posts_form_with_csrf() -> Result<()> {
    let (server, addr) = mock_server()?;

    let handle = thread::spawn(move || {
        let mut request = server.recv().expect("save request expected");
        assert_eq!(*request.method(), Method::Post);
        assert_eq!(request.url(), "/discrepancies/annotation/WEB01/");
        assert_eq!(header(&request, "X-CSRFToken").as_deref(), Some("tok123"));
        assert_eq!(
            header(&request, "Content-Type").as_deref(),
            Some("application/x-www-form-urlencoded")
        );
        assert_eq!(body(&mut request), "comment=disk+full&assigned_to=ops%26infra");
        request
            .respond(json_response(r#"{"success": true, "message": "Annotation saved"}"#))
            .expect("response should succeed");
    });

    let message = client(&addr)?.submit_form(&FormPayload::DiscrepancyAnnotation(
        DiscrepancyAnnotationInput {
            host: Hostname::from("WEB01"),
            comment: "disk full".to_owned(),
            assigned_to: "ops&infra".to_owned(),
        },
    ))?;
    assert_eq!(message, "Annotation saved");

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn group_save_posts_json_and_surfaces_failure() -> Result<()> {
    let (server, addr) = mock_server()?;

    let handle = thread::spawn(move || {
        let mut request = server.recv().expect("save request expected");
        assert_eq!(request.url(), "/serversgroups/annotation/DB01/");
        let payload: serde_json::Value =
            serde_json::from_str(&body(&mut request)).expect("json body");
        assert_eq!(payload["status"], "maintenance");
        assert_eq!(payload["custom_status"], "");
        request
            .respond(
                json_response(r#"{"success": false, "message": "Error saving: locked"}"#)
                    .with_status_code(400),
            )
            .expect("response should succeed");
    });

    let error = client(&addr)?
        .save_group(&GroupAnnotationInput {
            host: Hostname::from("DB01"),
            annotation: GroupAnnotation {
                status: "maintenance".to_owned(),
                custom_status: "stale label".to_owned(),
                notes: String::new(),
                priority: "high".to_owned(),
            },
        })
        .expect_err("save should fail");
    assert_eq!(error.to_string(), "server error (400): Error saving: locked");

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn charts_and_theme_round_trip() -> Result<()> {
    let (server, addr) = mock_server()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("charts request expected");
        assert_eq!(request.url(), "/common/api/charts/list/?app=inventory");
        request
            .respond(json_response(
                r#"{"success": true, "charts": [{"id": 7, "name": "OS", "filters": {"fields": ["os"], "types": ["pie"]}}]}"#,
            ))
            .expect("response should succeed");

        let request = server.recv().expect("delete request expected");
        assert_eq!(request.url(), "/common/api/charts/7/delete/");
        assert_eq!(header(&request, "X-CSRFToken").as_deref(), Some("tok123"));
        request
            .respond(json_response(r#"{"success": true}"#))
            .expect("response should succeed");

        let request = server.recv().expect("preferences request expected");
        assert_eq!(request.url(), "/common/api/preferences/?app=global");
        request
            .respond(json_response(r#"{"success": true, "settings": {"theme": "dark"}}"#))
            .expect("response should succeed");

        let mut request = server.recv().expect("preference update expected");
        assert_eq!(request.url(), "/common/api/preferences/update/");
        let payload: serde_json::Value =
            serde_json::from_str(&body(&mut request)).expect("json body");
        assert_eq!(payload["app_name"], "global");
        assert_eq!(payload["value"], "light");
        request
            .respond(json_response(r#"{"success": true}"#))
            .expect("response should succeed");
    });

    let client = client(&addr)?;
    let charts = client.list_charts("inventory")?;
    assert_eq!(charts.len(), 1);
    assert_eq!(charts[0].name, "OS");
    client.delete_chart(charts[0].id)?;
    assert_eq!(client.theme()?, Some(Theme::Dark));
    client.put_theme(Theme::Light)?;

    handle.join().expect("server thread should join");
    Ok(())
}

#[test]
fn csrf_token_falls_back_to_meta_tag() -> Result<()> {
    let (server, addr) = mock_server()?;

    let handle = thread::spawn(move || {
        let request = server.recv().expect("page request expected");
        assert_eq!(request.url(), "/inventory/");
        request
            .respond(
                Response::from_string(r#"<html><head><meta name="csrf-token" content="meta-tok"></head></html>"#)
                    .with_status_code(200),
            )
            .expect("response should succeed");
    });

    let mut client = Client::new(ClientOptions {
        base_url: addr,
        timeout: Duration::from_secs(2),
        ..ClientOptions::default()
    })?;
    assert_eq!(client.csrf_token(), "");
    client.resolve_csrf()?;
    assert_eq!(client.csrf_token(), "meta-tok");
    // Already resolved: no second request.
    client.resolve_csrf()?;

    handle.join().expect("server thread should join");
    Ok(())
}
