use std::{env, path::Path};

use hookkit_core::queue::{ExecutionMode, QueueConfig, DEFAULT_CONCURRENCY};
use hookkit_core::storage::{DatabaseConfig, Result, StorageError};

use crate::storage::memory::CHANGE_CHANNEL_CAPACITY;

/// Runtime settings loaded from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Queue execution mode (default: sequential)
    pub queue_mode: ExecutionMode,
    /// Change events buffered per database (default: 100)
    pub change_channel_capacity: usize,
}

impl Settings {
    /// Load settings from environment variables.
    ///
    /// Environment variables:
    /// - `HOOKKIT_QUEUE_MODE` - `sequential` or `parallel` (default: sequential)
    /// - `HOOKKIT_QUEUE_CONCURRENCY` - Tasks at once in parallel mode (default: 4)
    /// - `HOOKKIT_CHANGE_CHANNEL_CAPACITY` - Change events per database (default: 100)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Same as [`from_env`](Self::from_env), reading values through `lookup`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let concurrency = lookup("HOOKKIT_QUEUE_CONCURRENCY")
            .and_then(|v| v.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(DEFAULT_CONCURRENCY);

        let queue_mode = match lookup("HOOKKIT_QUEUE_MODE")
            .and_then(|v| v.parse::<ExecutionMode>().ok())
            .unwrap_or(ExecutionMode::Sequential)
        {
            ExecutionMode::Parallel { .. } => ExecutionMode::Parallel { concurrency },
            ExecutionMode::Sequential => ExecutionMode::Sequential,
        };

        Self {
            queue_mode,
            change_channel_capacity: lookup("HOOKKIT_CHANGE_CHANNEL_CAPACITY")
                .and_then(|v| v.parse().ok())
                .filter(|n: &usize| *n > 0)
                .unwrap_or(CHANGE_CHANNEL_CAPACITY),
        }
    }

    pub fn queue_config(&self) -> QueueConfig {
        QueueConfig {
            mode: self.queue_mode,
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_env()
    }
}

/// Reads and validates a database schema from a JSON file.
pub fn load_database_config(path: &Path) -> Result<DatabaseConfig> {
    let json = std::fs::read_to_string(path).map_err(|e| {
        StorageError::InvalidConfig(format!("{}: {e}", path.display()))
    })?;
    DatabaseConfig::from_json_str(&json)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_default_values() {
        let settings = settings(&[]);
        assert_eq!(settings.queue_mode, ExecutionMode::Sequential);
        assert_eq!(settings.change_channel_capacity, 100);
        assert_eq!(settings.queue_config(), QueueConfig::default());
    }

    #[test]
    fn test_parallel_mode_uses_concurrency() {
        let settings = settings(&[
            ("HOOKKIT_QUEUE_MODE", "parallel"),
            ("HOOKKIT_QUEUE_CONCURRENCY", "8"),
        ]);
        assert_eq!(settings.queue_config().concurrency_limit(), 8);
    }

    #[test]
    fn test_invalid_values_fall_back() {
        let settings = settings(&[
            ("HOOKKIT_QUEUE_MODE", "turbo"),
            ("HOOKKIT_QUEUE_CONCURRENCY", "0"),
            ("HOOKKIT_CHANGE_CHANNEL_CAPACITY", "lots"),
        ]);
        assert_eq!(settings.queue_mode, ExecutionMode::Sequential);
        assert_eq!(settings.change_channel_capacity, 100);

        let parallel = Settings::from_lookup(|name| match name {
            "HOOKKIT_QUEUE_MODE" => Some("parallel".to_string()),
            "HOOKKIT_QUEUE_CONCURRENCY" => Some("0".to_string()),
            _ => None,
        });
        assert_eq!(parallel.queue_config().concurrency_limit(), DEFAULT_CONCURRENCY);
    }

    #[test]
    fn test_load_database_config_missing_file() {
        let result = load_database_config(Path::new("/nonexistent/schema.json"));
        assert!(matches!(result, Err(StorageError::InvalidConfig(_))));
    }

    #[test]
    fn test_load_database_config_from_file() {
        let path = env::temp_dir().join(format!("hookkit-schema-{}.json", std::process::id()));
        std::fs::write(
            &path,
            r#"{"name": "app", "version": 1, "tables": {"users": {"keyPath": "id"}}}"#,
        )
        .unwrap();

        let config = load_database_config(&path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(config.name, "app");
        assert!(config.tables.contains_key("users"));
    }
}
