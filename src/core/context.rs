//! Shared state available to every mutating core operation.

use crate::config::settings::PolicySettings;
use crate::core::locks::KeyedLocks;
use crate::core::notify::Outbox;
use sea_orm::DatabaseConnection;

/// Everything a core operation needs besides its arguments: the database, the keyed
/// lock registry, the policy settings, and the notification outbox. Cheap to clone.
#[derive(Debug, Clone)]
pub struct AppContext {
    /// Database connection for all database operations
    pub database: DatabaseConnection,
    pub locks: KeyedLocks,
    pub settings: PolicySettings,
    pub outbox: Outbox,
}

impl AppContext {
    #[must_use]
    pub fn new(database: DatabaseConnection, settings: PolicySettings, outbox: Outbox) -> Self {
        Self {
            database,
            locks: KeyedLocks::new(),
            settings,
            outbox,
        }
    }
}
