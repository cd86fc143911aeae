//! Interface to the external state catalog.
//!
//! The catalog persists which migrations exist and what phase each is in;
//! the engine only talks to it through this trait. The catalog's schema
//! must also expose a `latest_version(schema text)` SQL function, which the
//! triggers consult to tell old-version writes from latest-version writes.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Phase of a migration as tracked by the state catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MigrationState {
    Pending,
    Started,
    Completing,
    Completed,
    RollingBack,
    RolledBack,
}

impl MigrationState {
    /// Terminal states accept no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MigrationState::Completed | MigrationState::RolledBack)
    }

    /// Whether the driver may move a migration from `self` to `to`.
    pub fn can_transition_to(&self, to: MigrationState) -> bool {
        use MigrationState::*;
        matches!(
            (self, to),
            (Pending, Started)
                | (Started, Completing)
                | (Completing, Completed)
                | (Started, RollingBack)
                | (RollingBack, RolledBack)
        )
    }
}

/// One row of the catalog's migration history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRecord {
    pub name: String,
    pub state: MigrationState,
    pub applied_at: DateTime<Utc>,
}

/// The engine's view of the state catalog. Implementations own
/// persistence, idempotence and concurrency for their own rows.
#[async_trait]
pub trait StateCatalog: Send + Sync {
    /// Name of the schema the catalog lives in.
    fn schema(&self) -> &str;

    async fn start_migration(&self, name: &str) -> Result<()>;

    async fn complete_migration(&self, name: &str) -> Result<()>;

    async fn rollback_migration(&self, name: &str) -> Result<()>;

    /// Name of the latest started migration, if any.
    async fn latest_version(&self) -> Result<Option<String>>;

    /// Name of the migration preceding the latest one; its version schema
    /// is retired when the latest migration completes.
    async fn previous_version(&self) -> Result<Option<String>>;

    /// The full migration history, oldest first.
    async fn history(&self) -> Result<Vec<MigrationRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lifecycle_transitions() {
        use MigrationState::*;

        assert!(Pending.can_transition_to(Started));
        assert!(Started.can_transition_to(Completing));
        assert!(Started.can_transition_to(RollingBack));
        assert!(Completing.can_transition_to(Completed));
        assert!(RollingBack.can_transition_to(RolledBack));

        assert!(!Pending.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(RollingBack));
        assert!(!RolledBack.can_transition_to(Started));

        assert!(Completed.is_terminal());
        assert!(RolledBack.is_terminal());
        assert!(!Started.is_terminal());
    }
}
