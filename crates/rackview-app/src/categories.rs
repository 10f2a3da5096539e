// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use std::collections::BTreeSet;

use crate::columns::ColumnVisibility;
use crate::ids::{CategoryId, ColumnId};
use crate::model::{FieldCatalog, TriState};
use crate::query::{CATEGORY_PREFIX, QueryParams};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryNode {
    pub id: CategoryId,
    pub name: String,
    pub children: Vec<ColumnId>,
}

/// Category checkboxes over the column visibility map. Check state is
/// always computed from the children; only the expand flag is stored.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CategoryTree {
    nodes: Vec<CategoryNode>,
    expanded: BTreeSet<CategoryId>,
}

pub fn category_key(id: &str) -> String {
    format!("{CATEGORY_PREFIX}{id}")
}

impl CategoryTree {
    pub fn from_catalog(catalog: &FieldCatalog) -> Self {
        let nodes = catalog
            .categories()
            .iter()
            .map(|category| CategoryNode {
                id: category.id.clone(),
                name: category.name.clone(),
                children: catalog
                    .children(category.id.as_str())
                    .map(|field| field.key.clone())
                    .collect(),
            })
            .filter(|node| !node.children.is_empty())
            .collect();
        Self {
            nodes,
            expanded: BTreeSet::new(),
        }
    }

    /// `cat_<id>=true` expands; absent or anything else collapses.
    pub fn restore_from_query(&mut self, params: &QueryParams) {
        self.expanded = self
            .nodes
            .iter()
            .filter(|node| params.get(&category_key(node.id.as_str())) == Some("true"))
            .map(|node| node.id.clone())
            .collect();
    }

    pub fn nodes(&self) -> &[CategoryNode] {
        &self.nodes
    }

    pub fn node(&self, id: &str) -> Option<&CategoryNode> {
        self.nodes.iter().find(|node| node.id.as_str() == id)
    }

    pub fn state(&self, id: &str, visibility: &ColumnVisibility) -> TriState {
        let Some(node) = self.node(id) else {
            return TriState::Unchecked;
        };
        let checked = node
            .children
            .iter()
            .filter(|column| visibility.is_visible(column.as_str()))
            .count();
        TriState::from_counts(checked, node.children.len())
    }

    /// Target for a click: clear when every enabled child is visible,
    /// otherwise check. Locked children never count, so a category that can
    /// only ever be indeterminate still clears.
    pub fn next_checked(&self, id: &str, visibility: &ColumnVisibility) -> bool {
        let Some(node) = self.node(id) else {
            return false;
        };
        let mut enabled = node
            .children
            .iter()
            .filter(|column| !visibility.is_locked(column.as_str()))
            .peekable();
        if enabled.peek().is_none() {
            return self.state(id, visibility) != TriState::Checked;
        }
        !enabled.all(|column| visibility.is_visible(column.as_str()))
    }

    /// Sets every unlocked child to `checked`. Returns the children whose
    /// visibility changed so the caller can run their own change handling.
    pub fn toggle(
        &self,
        id: &str,
        checked: bool,
        visibility: &mut ColumnVisibility,
    ) -> Result<Vec<ColumnId>> {
        let Some(node) = self.node(id) else {
            bail!("unknown category {id:?}");
        };
        let mut changed = Vec::new();
        for column in &node.children {
            if visibility.is_locked(column.as_str()) {
                continue;
            }
            if visibility.set_visible(column.as_str(), checked)? {
                changed.push(column.clone());
            }
        }
        Ok(changed)
    }

    pub fn is_expanded(&self, id: &str) -> bool {
        self.expanded.contains(id)
    }

    /// Flips the expand flag and mirrors it into `cat_<id>`.
    pub fn toggle_expanded(&mut self, id: &str, params: &mut QueryParams) -> Result<bool> {
        let Some(node) = self.node(id) else {
            bail!("unknown category {id:?}");
        };
        let id = node.id.clone();
        let expanded = if self.expanded.remove(id.as_str()) {
            false
        } else {
            self.expanded.insert(id.clone());
            true
        };
        params.set(&category_key(id.as_str()), expanded.to_string());
        Ok(expanded)
    }
}
