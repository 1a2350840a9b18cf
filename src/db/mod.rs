//! Database module providing connection management, migrations, and queries.

pub mod keys;

use std::time::Duration;

use sea_orm::{ConnectOptions, Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use tracing::info;

use crate::config::DatabaseConfig;
use crate::error::{AppError, AppResult};
use crate::migration::Migrator;

/// Database connection pool wrapper.
///
/// `DatabaseConnection` is already a pool; this type carries the query methods
/// (`impl DbPool` blocks in the submodules) and is cheap to clone.
#[derive(Clone)]
pub struct DbPool {
    conn: DatabaseConnection,
}

impl DbPool {
    /// Connect using the given database settings.
    pub async fn new(config: &DatabaseConfig) -> AppResult<Self> {
        let mut options = ConnectOptions::new(config.url.clone());
        options
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .connect_timeout(Duration::from_secs(10))
            .acquire_timeout(Duration::from_secs(10))
            .sqlx_logging(false);

        let conn = Database::connect(options)
            .await
            .map_err(|e| AppError::StorageUnavailable(format!("Failed to connect: {}", e)))?;

        Ok(DbPool { conn })
    }

    /// Get access to the connection for executing queries.
    pub fn connection(&self) -> &DatabaseConnection {
        &self.conn
    }

    /// Apply all pending migrations.
    pub async fn run_migrations(&self) -> AppResult<()> {
        Migrator::up(&self.conn, None)
            .await
            .map_err(|e| AppError::StorageUnavailable(format!("Migration failed: {}", e)))?;
        info!("Database migrations complete");
        Ok(())
    }

    /// Check that the database answers.
    pub async fn ping(&self) -> AppResult<()> {
        self.conn.ping().await?;
        Ok(())
    }
}

/// In-memory SQLite pool for tests.
///
/// A single connection keeps the in-memory database alive for the pool's lifetime.
#[cfg(test)]
pub(crate) async fn test_pool() -> DbPool {
    test_pool_with_connections(1).await
}

/// In-memory SQLite pool whose connections all see the same database.
///
/// sqlx opens every `sqlite::memory:` pool as its own named shared-cache
/// database, so concurrent queries here really run on different connections.
#[cfg(test)]
pub(crate) async fn test_pool_with_connections(max_connections: u32) -> DbPool {
    let pool = DbPool::new(&DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        max_connections,
        min_connections: 1,
    })
    .await
    .expect("failed to open in-memory database");
    pool.run_migrations().await.expect("failed to migrate");
    pool
}
