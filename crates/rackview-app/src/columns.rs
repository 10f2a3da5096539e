// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, bail};
use std::collections::{BTreeMap, BTreeSet};

use crate::ids::ColumnId;
use crate::model::{FieldCatalog, SERVER_COLUMN, TriState};
use crate::query::{QueryParams, VISIBLE_COLUMNS};

/// Explicit visibility map over the catalog's columns. Checkbox rendering,
/// the select-all state and category states are all derived from it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnVisibility {
    order: Vec<ColumnId>,
    visible: BTreeMap<ColumnId, bool>,
    locked: BTreeSet<ColumnId>,
}

impl ColumnVisibility {
    pub fn from_catalog(catalog: &FieldCatalog) -> Self {
        let mut visibility = Self::default();
        for field in catalog.fields() {
            let always = field.key.as_str() == SERVER_COLUMN;
            visibility.order.push(field.key.clone());
            visibility
                .visible
                .insert(field.key.clone(), field.checked || always);
            if field.checked_disabled || always {
                visibility.locked.insert(field.key.clone());
            }
        }
        visibility
    }

    /// Applies a `visible_columns` parameter if present. Locked columns keep
    /// their catalog state. Unknown names are ignored.
    pub fn restore_from_query(&mut self, params: &QueryParams) -> bool {
        let Some(raw) = params.get(VISIBLE_COLUMNS).filter(|raw| !raw.trim().is_empty()) else {
            return false;
        };
        let wanted: BTreeSet<&str> = raw.split(',').map(str::trim).collect();
        for column in &self.order {
            if self.locked.contains(column) {
                continue;
            }
            self.visible
                .insert(column.clone(), wanted.contains(column.as_str()));
        }
        true
    }

    pub fn columns(&self) -> &[ColumnId] {
        &self.order
    }

    pub fn is_visible(&self, column: &str) -> bool {
        self.visible.get(column).copied().unwrap_or(false)
    }

    pub fn is_locked(&self, column: &str) -> bool {
        self.locked.contains(column)
    }

    /// Returns whether the column's state changed.
    pub fn set_visible(&mut self, column: &str, visible: bool) -> Result<bool> {
        let Some(current) = self.visible.get_mut(column) else {
            bail!("unknown column {column:?} -- pick a column from the field list");
        };
        if *current == visible {
            return Ok(false);
        }
        if self.locked.contains(column) {
            bail!("column {column:?} cannot be toggled");
        }
        *current = visible;
        Ok(true)
    }

    /// Sets every unlocked column; returns the columns that changed.
    pub fn select_all(&mut self, visible: bool) -> Vec<ColumnId> {
        let mut changed = Vec::new();
        for column in &self.order {
            if self.locked.contains(column) {
                continue;
            }
            if let Some(current) = self.visible.get_mut(column)
                && *current != visible
            {
                *current = visible;
                changed.push(column.clone());
            }
        }
        changed
    }

    /// Visible columns in catalog order.
    pub fn visible_columns(&self) -> Vec<ColumnId> {
        self.order
            .iter()
            .filter(|column| self.is_visible(column.as_str()))
            .cloned()
            .collect()
    }

    pub fn select_all_state(&self) -> TriState {
        let checked = self
            .order
            .iter()
            .filter(|column| self.is_visible(column.as_str()))
            .count();
        TriState::from_counts(checked, self.order.len())
    }

    pub fn write_query(&self, params: &mut QueryParams) {
        let csv = self
            .visible_columns()
            .iter()
            .map(ColumnId::as_str)
            .collect::<Vec<_>>()
            .join(",");
        params.set(VISIBLE_COLUMNS, csv);
    }
}

#[cfg(test)]
mod tests {
    use super::ColumnVisibility;
    use crate::model::{FieldCatalog, FieldMeta, TriState};
    use crate::query::QueryParams;
    use crate::{CategoryId, ColumnId};
    use anyhow::Result;

    fn field(key: &str, checked: bool, disabled: bool) -> FieldMeta {
        FieldMeta {
            key: ColumnId::from(key),
            display_name: key.to_uppercase(),
            input_name: key.to_owned(),
            list_id: None,
            category: CategoryId::from("cat1"),
            checked,
            checked_disabled: disabled,
        }
    }

    fn sample() -> ColumnVisibility {
        let catalog = FieldCatalog::new(
            vec![
                field("server", true, true),
                field("env", true, false),
                field("cpu", false, false),
                field("ram", false, false),
            ],
            Vec::new(),
        );
        ColumnVisibility::from_catalog(&catalog)
    }

    fn names(columns: &[ColumnId]) -> Vec<&str> {
        columns.iter().map(ColumnId::as_str).collect()
    }

    #[test]
    fn initial_state_follows_catalog() {
        let visibility = sample();
        assert_eq!(names(&visibility.visible_columns()), vec!["server", "env"]);
        assert_eq!(visibility.select_all_state(), TriState::Indeterminate);
    }

    #[test]
    fn set_visible_rejects_unknown_and_locked() -> Result<()> {
        let mut visibility = sample();
        assert!(visibility.set_visible("cpu", true)?);
        assert!(!visibility.set_visible("cpu", true)?);
        visibility
            .set_visible("gpu", true)
            .expect_err("unknown column should fail");
        visibility
            .set_visible("server", false)
            .expect_err("locked column should fail");
        assert!(visibility.is_visible("server"));
        Ok(())
    }

    #[test]
    fn select_all_skips_locked_columns() {
        let mut visibility = sample();
        let changed = visibility.select_all(true);
        assert_eq!(names(&changed), vec!["cpu", "ram"]);
        assert_eq!(visibility.select_all_state(), TriState::Checked);

        visibility.select_all(false);
        assert_eq!(names(&visibility.visible_columns()), vec!["server"]);
        assert_eq!(visibility.select_all_state(), TriState::Indeterminate);
    }

    #[test]
    fn visible_columns_round_trip_through_query() -> Result<()> {
        let mut visibility = sample();
        visibility.set_visible("env", false)?;
        visibility.set_visible("ram", true)?;

        let mut params = QueryParams::parse("env=PROD");
        visibility.write_query(&mut params);
        assert_eq!(params.get("visible_columns"), Some("server,ram"));

        let reloaded_params = QueryParams::parse(&params.to_query_string());
        let mut reloaded = sample();
        assert!(reloaded.restore_from_query(&reloaded_params));
        assert_eq!(reloaded.visible_columns(), visibility.visible_columns());
        Ok(())
    }

    #[test]
    fn restore_without_parameter_keeps_defaults() {
        let mut visibility = sample();
        assert!(!visibility.restore_from_query(&QueryParams::parse("visible_columns=")));
        assert_eq!(names(&visibility.visible_columns()), vec!["server", "env"]);
    }
}
