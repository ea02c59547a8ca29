use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::Key;

/// Access mode of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionMode {
    #[serde(rename = "readonly")]
    ReadOnly,
    #[serde(rename = "readwrite")]
    ReadWrite,
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionMode::ReadOnly => write!(f, "readonly"),
            TransactionMode::ReadWrite => write!(f, "readwrite"),
        }
    }
}

/// What happened to a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Added,
    Updated,
    Deleted,
    Cleared,
}

/// Notification published after a committed write.
///
/// Delivered to every connection of the same database, so independent
/// consumers can react to each other's writes without polling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub database: String,
    pub table: String,
    pub kind: ChangeKind,
    /// `None` for [`ChangeKind::Cleared`].
    pub key: Option<Key>,
    pub occurred_at: DateTime<Utc>,
}

impl ChangeEvent {
    pub fn new(
        database: impl Into<String>,
        table: impl Into<String>,
        kind: ChangeKind,
        key: Option<Key>,
    ) -> Self {
        Self {
            database: database.into(),
            table: table.into(),
            kind,
            key,
            occurred_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_display() {
        assert_eq!(TransactionMode::ReadOnly.to_string(), "readonly");
        assert_eq!(TransactionMode::ReadWrite.to_string(), "readwrite");
    }

    #[test]
    fn test_mode_serde_names() {
        let json = serde_json::to_string(&TransactionMode::ReadWrite).unwrap();
        assert_eq!(json, "\"readwrite\"");
        let mode: TransactionMode = serde_json::from_str("\"readonly\"").unwrap();
        assert_eq!(mode, TransactionMode::ReadOnly);
    }

    #[test]
    fn test_change_event_serializes_key() {
        let event = ChangeEvent::new("app", "users", ChangeKind::Added, Some(Key::from(1)));
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["kind"], "added");
        assert_eq!(json["key"], 1);
    }
}
