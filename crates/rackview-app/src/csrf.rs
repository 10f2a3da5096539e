// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use tracing::warn;
use url::form_urlencoded;

pub const CSRF_COOKIE: &str = "csrftoken";
pub const CSRF_META: &str = "csrf-token";
pub const CSRF_HEADER: &str = "X-CSRFToken";

/// Value of `name` in a `Cookie` header, percent-decoded.
pub fn cookie_value(header: &str, name: &str) -> Option<String> {
    header.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        (key.trim() == name).then(|| percent_decode(value.trim()))
    })
}

fn percent_decode(raw: &str) -> String {
    let escaped = raw.replace('+', "%2B").replace('&', "%26");
    form_urlencoded::parse(format!("v={escaped}").as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .unwrap_or_default()
}

/// `content` of `<meta name="csrf-token" content="...">` in an HTML page.
pub fn meta_token(html: &str) -> Option<String> {
    let mut rest = html;
    while let Some(start) = rest.find("<meta") {
        let tag_start = &rest[start..];
        let end = tag_start.find('>')?;
        let tag = &tag_start[..end];
        if attribute(tag, "name").as_deref() == Some(CSRF_META) {
            return attribute(tag, "content");
        }
        rest = &tag_start[end..];
    }
    None
}

fn attribute(tag: &str, name: &str) -> Option<String> {
    let mut rest = tag;
    loop {
        let index = rest.find(name)?;
        let preceded_by_space = rest[..index]
            .chars()
            .next_back()
            .is_some_and(char::is_whitespace);
        let after = rest[index + name.len()..].trim_start();
        rest = &rest[index + name.len()..];
        if !preceded_by_space {
            continue;
        }
        let Some(value) = after.strip_prefix('=') else {
            continue;
        };
        let value = value.trim_start();
        let quote = value.chars().next()?;
        if quote == '"' || quote == '\'' {
            let body = &value[1..];
            return body.find(quote).map(|end| body[..end].to_owned());
        }
        let end = value
            .find(|ch: char| ch.is_whitespace() || ch == '/')
            .unwrap_or(value.len());
        return Some(value[..end].to_owned());
    }
}

/// Cookie first, then the page's meta tag. A missing token is logged and
/// comes back empty so the request still goes out and the backend rejects it.
pub fn csrf_token(cookie_header: Option<&str>, html: Option<&str>) -> String {
    if let Some(token) = cookie_header.and_then(|header| cookie_value(header, CSRF_COOKIE)) {
        return token;
    }
    if let Some(token) = html.and_then(meta_token) {
        return token;
    }
    warn!("csrf token not found in cookie or page");
    String::new()
}
