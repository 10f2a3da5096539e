// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::warn;

use crate::ids::{ColumnId, Hostname};
use crate::model::{InstanceFields, ServerRow, value_text};

/// Hosts whose detail rows are shown. Keyed by hostname so membership
/// survives paging; scoped to one browsing session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExpandedServers {
    hosts: Vec<Hostname>,
}

impl ExpandedServers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_hosts(hosts: impl IntoIterator<Item = Hostname>) -> Self {
        let mut set = Self::new();
        for host in hosts {
            set.insert(host);
        }
        set
    }

    pub fn contains(&self, host: &str) -> bool {
        self.hosts.iter().any(|candidate| candidate.as_str() == host)
    }

    pub fn insert(&mut self, host: Hostname) -> bool {
        if self.contains(host.as_str()) {
            return false;
        }
        self.hosts.push(host);
        true
    }

    pub fn remove(&mut self, host: &str) -> bool {
        let before = self.hosts.len();
        self.hosts.retain(|candidate| candidate.as_str() != host);
        before != self.hosts.len()
    }

    /// Returns whether the host is expanded afterwards.
    pub fn toggle(&mut self, host: &str) -> bool {
        if self.remove(host) {
            return false;
        }
        self.hosts.push(Hostname::from(host));
        true
    }

    pub fn clear(&mut self) {
        self.hosts.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn hosts(&self) -> &[Hostname] {
        &self.hosts
    }
}

/// One sub-instance of an expanded host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetailRow {
    /// Hostname, `i/n` badge, constant values, then variable values.
    pub cells: Vec<String>,
    values: BTreeMap<ColumnId, String>,
}

impl DetailRow {
    pub fn badge(&self) -> &str {
        self.cells.get(1).map(String::as_str).unwrap_or_default()
    }

    /// Value filled for `column`, wherever it sits in the positional cells.
    pub fn value(&self, column: &str) -> Option<&str> {
        self.values.get(column).map(String::as_str)
    }
}

/// A primary row plus its lazily built detail rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowGroup {
    pub row: ServerRow,
    details: Option<Vec<DetailRow>>,
}

impl RowGroup {
    pub fn new(row: ServerRow) -> Self {
        Self { row, details: None }
    }

    pub fn is_expandable(&self) -> bool {
        self.row.instance_count > 1
    }

    pub fn is_populated(&self) -> bool {
        self.details.is_some()
    }

    pub fn details(&self) -> &[DetailRow] {
        self.details.as_deref().unwrap_or(&[])
    }

    /// Parses the embedded instance payload once. A malformed payload leaves
    /// the group untouched.
    pub fn ensure_details(&mut self) -> Result<()> {
        if self.details.is_some() {
            return Ok(());
        }
        let details = detail_cells(&self.row)?;
        self.details = Some(details);
        Ok(())
    }
}

/// Builds detail rows: hostname, `i/n` badge, every constant value in
/// declared order, then every variable value. Each value also stays keyed by
/// its column so hidden columns never shift what a cell shows.
pub fn detail_cells(row: &ServerRow) -> Result<Vec<DetailRow>> {
    let instances: Vec<InstanceFields> = serde_json::from_str(&row.instances_json)
        .with_context(|| format!("parse instance data for {}", row.hostname))?;
    let total = instances.len();
    Ok(instances
        .iter()
        .enumerate()
        .map(|(index, instance)| {
            let mut cells = Vec::with_capacity(
                2 + instance.constant_fields.len() + instance.variable_fields.len(),
            );
            cells.push(row.hostname.to_string());
            cells.push(instance_badge(index, total));
            let mut values = BTreeMap::new();
            for (column, value) in instance
                .constant_fields
                .iter()
                .chain(instance.variable_fields.iter())
            {
                let text = value_text(value);
                values.insert(ColumnId::from(column.as_str()), text.clone());
                cells.push(text);
            }
            DetailRow { cells, values }
        })
        .collect())
}

pub fn instance_badge(index: usize, total: usize) -> String {
    format!("{}/{total}", index + 1)
}

/// Recovers a zero-based instance index from an `N/total` badge.
pub fn badge_index(badge: &str) -> Option<usize> {
    let (number, _) = badge.trim().split_once('/')?;
    number.parse::<usize>().ok()?.checked_sub(1)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayRow {
    Primary { group: usize },
    Detail { group: usize, instance: usize },
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ServerRows {
    groups: Vec<RowGroup>,
}

impl ServerRows {
    pub fn new(rows: Vec<ServerRow>) -> Self {
        Self {
            groups: rows.into_iter().map(RowGroup::new).collect(),
        }
    }

    pub fn groups(&self) -> &[RowGroup] {
        &self.groups
    }

    pub fn hostnames(&self) -> Vec<Hostname> {
        self.groups
            .iter()
            .map(|group| group.row.hostname.clone())
            .collect()
    }

    pub fn group(&self, host: &str) -> Option<&RowGroup> {
        self.groups
            .iter()
            .find(|group| group.row.hostname.as_str() == host)
    }

    pub fn group_mut(&mut self, host: &str) -> Option<&mut RowGroup> {
        self.groups
            .iter_mut()
            .find(|group| group.row.hostname.as_str() == host)
    }

    /// Populates detail rows for every expanded host on this page. Hosts
    /// whose payload fails to parse stay collapsed for display.
    pub fn replay(&mut self, expanded: &ExpandedServers) {
        for group in &mut self.groups {
            if !expanded.contains(group.row.hostname.as_str()) || !group.is_expandable() {
                continue;
            }
            if let Err(error) = group.ensure_details() {
                warn!(host = %group.row.hostname, error = %format!("{error:#}"), "skipping expanded host");
            }
        }
    }

    /// Rows in display order. An expanded, populated host shows its detail
    /// rows in place of the primary row.
    pub fn display_rows(&self, expanded: &ExpandedServers) -> Vec<DisplayRow> {
        let mut rows = Vec::with_capacity(self.groups.len());
        for (index, group) in self.groups.iter().enumerate() {
            if expanded.contains(group.row.hostname.as_str()) && group.is_populated() {
                rows.extend(
                    (0..group.details().len())
                        .map(|instance| DisplayRow::Detail {
                            group: index,
                            instance,
                        }),
                );
            } else {
                rows.push(DisplayRow::Primary { group: index });
            }
        }
        rows
    }

    /// First display row belonging to `group`, primary or detail.
    pub fn first_row_of(&self, expanded: &ExpandedServers, group: usize) -> Option<usize> {
        self.display_rows(expanded).iter().position(|row| match row {
            DisplayRow::Primary { group: index } | DisplayRow::Detail { group: index, .. } => {
                *index == group
            }
        })
    }
}
