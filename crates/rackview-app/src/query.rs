// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Ordered query-parameter list with `URLSearchParams`-style semantics.
//!
//! The inventory page keeps all of its client state in the query string, so
//! this type is both the persisted form of the state and the navigation
//! target handed to the front end.

use url::form_urlencoded;

pub const PAGE: &str = "page";
pub const PAGE_SIZE: &str = "page_size";
pub const VISIBLE_COLUMNS: &str = "visible_columns";
pub const SCROLL_LEFT: &str = "scrollLeft";
pub const VIEW: &str = "view";
pub const SORT: &str = "sort";
pub const ORDER: &str = "order";
pub const CATEGORY_PREFIX: &str = "cat_";
pub const INCONSISTENT_SUFFIX: &str = "_inconsistent";

pub const DEFAULT_PAGE_SIZE: usize = 50;

/// Keys that carry page state rather than filter terms.
pub fn is_reserved_key(key: &str) -> bool {
    matches!(key, PAGE | PAGE_SIZE | VISIBLE_COLUMNS | SCROLL_LEFT | VIEW)
        || key.starts_with(CATEGORY_PREFIX)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryParams {
    pairs: Vec<(String, String)>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `a=1&b=2`, with or without a leading `?`.
    pub fn parse(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        let pairs = form_urlencoded::parse(query.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        Self { pairs }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(candidate, _)| candidate == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn get_all<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.pairs
            .iter()
            .filter(move |(candidate, _)| candidate == key)
            .map(|(_, value)| value.as_str())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.pairs.iter().any(|(candidate, _)| candidate == key)
    }

    /// Replaces the first occurrence in place and drops the rest, or appends.
    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.pairs.iter().position(|(candidate, _)| candidate == key) {
            Some(index) => {
                self.pairs[index].1 = value;
                let mut seen = 0_usize;
                self.pairs.retain(|(candidate, _)| {
                    if candidate != key {
                        return true;
                    }
                    seen += 1;
                    seen == 1
                });
            }
            None => self.pairs.push((key.to_owned(), value)),
        }
    }

    pub fn append(&mut self, key: &str, value: impl Into<String>) {
        self.pairs.push((key.to_owned(), value.into()));
    }

    pub fn delete(&mut self, key: &str) {
        self.pairs.retain(|(candidate, _)| candidate != key);
    }

    pub fn retain(&mut self, mut keep: impl FnMut(&str, &str) -> bool) {
        self.pairs.retain(|(key, value)| keep(key, value));
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs
            .iter()
            .map(|(key, value)| (key.as_str(), value.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|(key, _)| key.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Serializes without the leading `?`. Commas stay literal so csv
    /// parameters remain readable in the address bar.
    pub fn to_query_string(&self) -> String {
        self.pairs
            .iter()
            .map(|(key, value)| format!("{}={}", encode_component(key), encode_component(value)))
            .collect::<Vec<_>>()
            .join("&")
    }

    pub fn page(&self) -> usize {
        self.get(PAGE)
            .and_then(|value| value.trim().parse::<usize>().ok())
            .filter(|page| *page > 0)
            .unwrap_or(1)
    }

    pub fn page_size(&self) -> usize {
        self.get(PAGE_SIZE)
            .and_then(|value| value.trim().parse::<usize>().ok())
            .filter(|size| *size > 0)
            .unwrap_or(DEFAULT_PAGE_SIZE)
    }
}

fn encode_component(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace("%2C", ",")
}

impl FromIterator<(String, String)> for QueryParams {
    fn from_iter<T: IntoIterator<Item = (String, String)>>(iter: T) -> Self {
        Self {
            pairs: iter.into_iter().collect(),
        }
    }
}
