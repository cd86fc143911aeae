//! Runner configuration.

use serde::{Deserialize, Serialize};

/// Tunables for a [`crate::runner::MigrationRunner`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerOptions {
    /// Schema the physical tables live in.
    pub schema: String,
    /// Upper bound on rows touched per backfill batch.
    pub backfill_batch_size: i64,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            schema: "public".to_string(),
            backfill_batch_size: 1000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RunnerOptions::default();
        assert_eq!(options.schema, "public");
        assert_eq!(options.backfill_batch_size, 1000);
    }

    #[test]
    fn test_partial_config_falls_back_to_defaults() {
        let options: RunnerOptions = serde_json::from_str(r#"{"schema": "app"}"#).unwrap();
        assert_eq!(options.schema, "app");
        assert_eq!(options.backfill_batch_size, 1000);
    }
}
