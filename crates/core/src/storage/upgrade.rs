//! Pure functions for calculating schema upgrade plans (Functional Core).
//!
//! The registry feeds the current catalog and the desired config in and
//! applies the resulting plan through the engine's upgrade handle.

use std::collections::BTreeSet;

use super::{DatabaseConfig, TableSchema};

/// Current state of an existing table, as seen during an upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableState {
    pub indexes: BTreeSet<String>,
}

/// Planned change for one configured table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpgradePlan {
    /// Table doesn't exist, create it together with all its indexes.
    CreateTable { name: String, schema: TableSchema },
    /// Table exists, some indexes are missing.
    AddIndexes { name: String, indexes: Vec<String> },
    /// Table is up to date.
    NoChanges { name: String },
}

impl UpgradePlan {
    /// Returns true if applying this plan touches the catalog.
    pub fn has_changes(&self) -> bool {
        !matches!(self, UpgradePlan::NoChanges { .. })
    }
}

/// Pure function: calculate what one table needs to reach its desired state.
pub fn plan_table_upgrade(
    name: &str,
    current: Option<&TableState>,
    desired: &TableSchema,
) -> UpgradePlan {
    match current {
        None => UpgradePlan::CreateTable {
            name: name.to_string(),
            schema: desired.clone(),
        },
        Some(state) => {
            let indexes: Vec<String> = desired
                .indexes
                .iter()
                .filter(|index| !state.indexes.contains(*index))
                .cloned()
                .collect();

            if indexes.is_empty() {
                UpgradePlan::NoChanges {
                    name: name.to_string(),
                }
            } else {
                UpgradePlan::AddIndexes {
                    name: name.to_string(),
                    indexes,
                }
            }
        }
    }
}

/// Pure function: plan every table of `config` against the current catalog.
///
/// Tables that exist in the catalog but not in the config are left alone.
pub fn plan_upgrade<F>(config: &DatabaseConfig, current: F) -> Vec<UpgradePlan>
where
    F: Fn(&str) -> Option<TableState>,
{
    config
        .tables
        .iter()
        .map(|(name, schema)| plan_table_upgrade(name, current(name).as_ref(), schema))
        .collect()
}

/// Pure function: format a plan for logs.
pub fn format_upgrade_plan(plan: &UpgradePlan) -> Vec<String> {
    match plan {
        UpgradePlan::CreateTable { name, schema } => {
            let mut lines = vec![format!("+ Create table: {name}")];
            lines.push(format!("  Key path: {}", schema.key_path));
            if schema.auto_increment {
                lines.push("  Auto increment".to_string());
            }
            for index in &schema.indexes {
                lines.push(format!("  + Index: {index}"));
            }
            lines
        }
        UpgradePlan::AddIndexes { name, indexes } => {
            let mut lines = vec![format!("~ Update table: {name}")];
            for index in indexes {
                lines.push(format!("  + Add index: {index}"));
            }
            lines
        }
        UpgradePlan::NoChanges { name } => vec![format!("= Table '{name}' is up to date")],
    }
}
