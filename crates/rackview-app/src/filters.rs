// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

//! Filter tags: column → ordered, normalized term list, mirrored into the
//! query string.

use anyhow::{Result, bail};

use crate::ids::ColumnId;
use crate::model::{FieldCatalog, SERVER_COLUMN};
use crate::query::{
    self, INCONSISTENT_SUFFIX, ORDER, PAGE, PAGE_SIZE, QueryParams, SCROLL_LEFT, SORT,
    VISIBLE_COLUMNS,
};

pub const FILTER_LIMIT: usize = 150;

/// Listbox selections are stored as exact-match terms with this prefix.
pub const EXACT_PREFIX: char = '@';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterTag {
    pub column: ColumnId,
    pub term: String,
}

impl FilterTag {
    pub fn label(&self) -> String {
        format!("{}: {}", self.column.as_str().to_uppercase(), self.term)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilterSet {
    entries: Vec<(ColumnId, Vec<String>)>,
}

/// Splits raw input into upper-cased, quote-free, deduplicated terms.
pub fn normalize_terms(column: &str, raw: &str) -> Vec<String> {
    let mut cleaned = raw.trim().to_uppercase().replace(['\'', '"'], "");
    if column == SERVER_COLUMN {
        cleaned = cleaned
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(",")
            .replace(';', ",");
    }

    let mut terms: Vec<String> = Vec::new();
    for term in cleaned.split(',').map(str::trim) {
        if !term.is_empty() && !terms.iter().any(|existing| existing == term) {
            terms.push(term.to_owned());
        }
    }
    terms
}

pub fn is_paired(column: &str) -> bool {
    matches!(column, SORT | ORDER)
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads every non-reserved parameter as a csv filter column.
    pub fn from_query(params: &QueryParams) -> Self {
        let mut set = Self::new();
        for (key, value) in params.iter() {
            if query::is_reserved_key(key) {
                continue;
            }
            let terms: Vec<String> = value
                .split(',')
                .map(|term| term.trim().to_uppercase())
                .filter(|term| !term.is_empty())
                .collect();
            for term in terms {
                set.push_unique(key, term);
            }
        }
        set
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|(_, terms)| terms.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn terms(&self, column: &str) -> Option<&[String]> {
        self.entries
            .iter()
            .find(|(candidate, _)| candidate.as_str() == column)
            .map(|(_, terms)| terms.as_slice())
    }

    pub fn contains(&self, column: &str, term: &str) -> bool {
        self.terms(column)
            .is_some_and(|terms| terms.iter().any(|existing| existing == term))
    }

    pub fn columns(&self) -> impl Iterator<Item = &ColumnId> {
        self.entries.iter().map(|(column, _)| column)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnId, &[String])> {
        self.entries
            .iter()
            .map(|(column, terms)| (column, terms.as_slice()))
    }

    /// Tags in store order; always exactly the stored terms.
    pub fn tags(&self) -> Vec<FilterTag> {
        self.entries
            .iter()
            .flat_map(|(column, terms)| {
                terms.iter().map(move |term| FilterTag {
                    column: column.clone(),
                    term: term.clone(),
                })
            })
            .collect()
    }

    /// Adds free-text input. Returns the terms that were new; rejects the
    /// whole batch without mutation when it would pass [`FILTER_LIMIT`].
    pub fn add_terms(&mut self, column: &str, raw: &str) -> Result<Vec<String>> {
        let fresh: Vec<String> = normalize_terms(column, raw)
            .into_iter()
            .filter(|term| !self.contains(column, term))
            .collect();
        self.admit(column, fresh)
    }

    /// Adds an exact-match term from a listbox selection.
    pub fn add_exact(&mut self, column: &str, value: &str) -> Result<Vec<String>> {
        let value = value.trim().to_uppercase();
        if value.is_empty() {
            return Ok(Vec::new());
        }
        let term = format!("{EXACT_PREFIX}{value}");
        if self.contains(column, &term) {
            return Ok(Vec::new());
        }
        self.admit(column, vec![term])
    }

    fn admit(&mut self, column: &str, fresh: Vec<String>) -> Result<Vec<String>> {
        if fresh.is_empty() {
            return Ok(fresh);
        }
        let target = self.total() + fresh.len();
        if target > FILTER_LIMIT {
            let plural = if fresh.len() > 1 { "s" } else { "" };
            bail!(
                "Adding {} filter{plural} would exceed the limit of {FILTER_LIMIT} filters ({target}) -- remove some filters and retry",
                fresh.len()
            );
        }
        for term in &fresh {
            self.push_unique(column, term.clone());
        }
        Ok(fresh)
    }

    /// Removes one term. Returns every column whose parameter changed:
    /// `sort` and `order` always go together.
    pub fn remove_term(&mut self, column: &str, term: &str) -> Vec<ColumnId> {
        if is_paired(column) {
            let before = self.entries.len();
            self.entries
                .retain(|(candidate, _)| !is_paired(candidate.as_str()));
            if before == self.entries.len() {
                return Vec::new();
            }
            return vec![ColumnId::from(SORT), ColumnId::from(ORDER)];
        }

        let Some(index) = self
            .entries
            .iter()
            .position(|(candidate, _)| candidate.as_str() == column)
        else {
            return Vec::new();
        };
        let terms = &mut self.entries[index].1;
        let before = terms.len();
        terms.retain(|existing| existing != term);
        if terms.len() == before {
            return Vec::new();
        }
        if terms.is_empty() {
            self.entries.remove(index);
        }
        vec![ColumnId::from(column)]
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    fn push_unique(&mut self, column: &str, term: String) {
        match self
            .entries
            .iter_mut()
            .find(|(candidate, _)| candidate.as_str() == column)
        {
            Some((_, terms)) => {
                if !terms.contains(&term) {
                    terms.push(term);
                }
            }
            None => self.entries.push((ColumnId::from(column), vec![term])),
        }
    }

    /// History-replace sync for one column: set its csv or delete it.
    pub fn write_column(&self, params: &mut QueryParams, column: &str) {
        match self.terms(column) {
            Some(terms) if !terms.is_empty() => params.set(column, terms.join(",")),
            _ => params.delete(column),
        }
    }

    /// Navigation target for "apply": filters in catalog order, then the
    /// page-state parameters carried from the current query.
    pub fn apply_query(
        &self,
        current: &QueryParams,
        catalog: &FieldCatalog,
        scroll_left: u16,
    ) -> QueryParams {
        let mut ordered: Vec<(usize, usize, &ColumnId, &[String])> = self
            .entries
            .iter()
            .enumerate()
            .map(|(index, (column, terms))| {
                let rank = catalog.position(column.as_str()).unwrap_or(usize::MAX);
                (rank, index, column, terms.as_slice())
            })
            .collect();
        ordered.sort_by_key(|(rank, index, _, _)| (*rank, *index));

        let mut next = QueryParams::new();
        for (_, _, column, terms) in ordered {
            let mut normalized: Vec<String> = Vec::with_capacity(terms.len());
            for term in terms {
                let upper = term.to_uppercase();
                if !normalized.contains(&upper) {
                    normalized.push(upper);
                }
            }
            if !normalized.is_empty() {
                next.set(column.as_str(), normalized.join(","));
            }
        }

        if let Some(visible) = current.get(VISIBLE_COLUMNS)
            && !visible.is_empty()
        {
            next.append(VISIBLE_COLUMNS, visible);
        }
        next.set(PAGE_SIZE, current.page_size().to_string());

        for (key, value) in current.iter() {
            if key.starts_with(query::CATEGORY_PREFIX) || key == SORT || key == ORDER {
                next.set(key, value);
            }
        }
        next.set(SCROLL_LEFT, scroll_left.to_string());
        next
    }

    /// Navigation target for "clear": drop every filter parameter and the
    /// sort, keep columns, page size and category flags.
    pub fn clear_query(
        &self,
        current: &QueryParams,
        catalog: &FieldCatalog,
        scroll_left: u16,
    ) -> QueryParams {
        let mut next = current.clone();
        for field in catalog.fields() {
            next.delete(&field.input_name);
        }
        for column in self.columns() {
            next.delete(column.as_str());
        }
        next.retain(|key, _| !key.ends_with(INCONSISTENT_SUFFIX));
        next.delete(PAGE);
        next.delete(SORT);
        next.delete(ORDER);
        next.set(SCROLL_LEFT, scroll_left.to_string());
        next
    }
}

pub fn page_size_query(current: &QueryParams, page_size: usize) -> QueryParams {
    let mut next = current.clone();
    next.set(PAGE_SIZE, page_size.to_string());
    next.delete(PAGE);
    next
}

pub fn page_query(current: &QueryParams, page: usize) -> QueryParams {
    let mut next = current.clone();
    next.set(PAGE, page.max(1).to_string());
    next
}
