//! Shallow merge used by partial updates.
//!
//! Pure function: top-level fields of the patch replace the same fields of the
//! existing record. Nested objects are replaced wholesale, not deep-merged.

use serde_json::Value;

use super::{Record, Result, StorageError};

/// Merges `patch` over `existing` and returns the merged record.
///
/// Both values must be JSON objects.
pub fn shallow_merge(existing: &Record, patch: &Record) -> Result<Record> {
    let (Value::Object(base), Value::Object(changes)) = (existing, patch) else {
        return Err(StorageError::InvalidRecord(
            "partial updates require object records".to_string(),
        ));
    };

    let mut merged = base.clone();
    for (field, value) in changes {
        merged.insert(field.clone(), value.clone());
    }
    Ok(Value::Object(merged))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_patch_overrides_fields() {
        let existing = json!({"id": 1, "name": "old", "age": 30});
        let merged = shallow_merge(&existing, &json!({"name": "new"})).unwrap();
        assert_eq!(merged, json!({"id": 1, "name": "new", "age": 30}));
    }

    #[test]
    fn test_nested_objects_are_replaced() {
        let existing = json!({"id": 1, "prefs": {"theme": "dark", "lang": "en"}});
        let merged = shallow_merge(&existing, &json!({"prefs": {"theme": "light"}})).unwrap();
        assert_eq!(merged, json!({"id": 1, "prefs": {"theme": "light"}}));
    }

    #[test]
    fn test_empty_patch_is_identity() {
        let existing = json!({"id": 1});
        assert_eq!(shallow_merge(&existing, &json!({})).unwrap(), existing);
    }

    #[test]
    fn test_non_object_patch_is_rejected() {
        let result = shallow_merge(&json!({"id": 1}), &json!([1, 2]));
        assert!(matches!(result, Err(StorageError::InvalidRecord(_))));
    }
}
