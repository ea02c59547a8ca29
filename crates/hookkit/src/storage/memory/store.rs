//! Record storage for one in-memory table.

use std::collections::BTreeMap;
use std::ops::Bound;

use hookkit_core::storage::{
    ChangeKind, Key, KeyPath, Record, Result, StorageError, TableSchema,
};

/// Reverses one write when a transaction rolls back.
#[derive(Debug)]
pub(super) enum Undo {
    /// Put `previous` back under `key` (or remove the key if `None`).
    Restore { key: Key, previous: Option<Record> },
    /// Restore every record removed by a clear.
    Clear { records: BTreeMap<Key, Record> },
    /// Restore the key generator.
    KeyGenerator { next_key: u64 },
}

/// Largest key the generator hands out. Every integer up to it is exact as
/// an `f64`.
const MAX_GENERATED_KEY: u64 = 1 << 53;

/// A committed write, reported back so the transaction can publish it.
pub(super) type Change = (ChangeKind, Option<Key>);

/// Records of one table, ordered by key.
#[derive(Debug)]
pub(super) struct ObjectStore {
    table: String,
    key_path: KeyPath,
    auto_increment: bool,
    records: BTreeMap<Key, Record>,
    next_key: u64,
}

impl ObjectStore {
    pub(super) fn new(table: &str, schema: &TableSchema) -> Self {
        Self {
            table: table.to_string(),
            key_path: schema.key_path.clone(),
            auto_increment: schema.auto_increment,
            records: BTreeMap::new(),
            next_key: 1,
        }
    }

    pub(super) fn key_path(&self) -> &KeyPath {
        &self.key_path
    }

    pub(super) fn len(&self) -> u64 {
        self.records.len() as u64
    }

    pub(super) fn get(&self, key: &Key) -> Option<Record> {
        self.records.get(key).cloned()
    }

    pub(super) fn contains(&self, key: &Key) -> bool {
        self.records.contains_key(key)
    }

    /// First record at or after the start, or strictly after `after`.
    pub(super) fn next_entry(&self, after: Option<&Key>) -> Option<(Key, Record)> {
        let lower = match after {
            Some(key) => Bound::Excluded(key),
            None => Bound::Unbounded,
        };
        self.records
            .range::<Key, _>((lower, Bound::Unbounded))
            .next()
            .map(|(key, record)| (key.clone(), record.clone()))
    }

    /// Inserts a new record, failing on an existing key.
    pub(super) fn add(&mut self, mut record: Record, undo: &mut Vec<Undo>) -> Result<(Key, Change)> {
        let key = self.resolve_key(&mut record, undo)?;
        if self.records.contains_key(&key) {
            return Err(StorageError::DuplicateKey {
                table: self.table.clone(),
                key: key.to_string(),
            });
        }
        self.records.insert(key.clone(), record);
        undo.push(Undo::Restore {
            key: key.clone(),
            previous: None,
        });
        Ok((key.clone(), (ChangeKind::Added, Some(key))))
    }

    /// Inserts or replaces a record.
    pub(super) fn put(&mut self, mut record: Record, undo: &mut Vec<Undo>) -> Result<(Key, Change)> {
        let key = self.resolve_key(&mut record, undo)?;
        let previous = self.records.insert(key.clone(), record);
        let kind = if previous.is_some() {
            ChangeKind::Updated
        } else {
            ChangeKind::Added
        };
        undo.push(Undo::Restore {
            key: key.clone(),
            previous,
        });
        Ok((key.clone(), (kind, Some(key))))
    }

    /// Removes a record. Returns `None` if nothing was stored under `key`.
    pub(super) fn delete(&mut self, key: &Key, undo: &mut Vec<Undo>) -> Option<Change> {
        let previous = self.records.remove(key)?;
        undo.push(Undo::Restore {
            key: key.clone(),
            previous: Some(previous),
        });
        Some((ChangeKind::Deleted, Some(key.clone())))
    }

    pub(super) fn clear(&mut self, undo: &mut Vec<Undo>) -> Change {
        let records = std::mem::take(&mut self.records);
        undo.push(Undo::Clear { records });
        (ChangeKind::Cleared, None)
    }

    pub(super) fn rollback(&mut self, undo: Undo) {
        match undo {
            Undo::Restore {
                key,
                previous: Some(record),
            } => {
                self.records.insert(key, record);
            }
            Undo::Restore {
                key,
                previous: None,
            } => {
                self.records.remove(&key);
            }
            Undo::Clear { records } => self.records = records,
            Undo::KeyGenerator { next_key } => self.next_key = next_key,
        }
    }

    /// Finds the key of a record, generating one when the table auto-increments.
    fn resolve_key(&mut self, record: &mut Record, undo: &mut Vec<Undo>) -> Result<Key> {
        if let Some(key) = self.key_path.extract(record) {
            // Explicit numeric keys push the generator past them.
            if let (true, Key::Number(n)) = (self.auto_increment, &key) {
                if *n >= self.next_key as f64 {
                    undo.push(Undo::KeyGenerator {
                        next_key: self.next_key,
                    });
                    self.next_key = if *n >= MAX_GENERATED_KEY as f64 {
                        MAX_GENERATED_KEY + 1
                    } else {
                        n.floor() as u64 + 1
                    };
                }
            }
            return Ok(key);
        }

        if !self.auto_increment {
            return Err(StorageError::MissingKey {
                table: self.table.clone(),
                key_path: self.key_path.to_string(),
            });
        }

        if self.next_key > MAX_GENERATED_KEY {
            return Err(StorageError::ConstraintError(format!(
                "key generator of {} is exhausted",
                self.table
            )));
        }

        let key = Key::from(self.next_key);
        self.key_path.inject(record, &key)?;
        undo.push(Undo::KeyGenerator {
            next_key: self.next_key,
        });
        self.next_key += 1;
        Ok(key)
    }
}
