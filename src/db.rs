//! Pool setup and the `domain_ranking` schema migrations.

use crate::{IngestError, IngestResult};
use sqlx::migrate::{Migrate, Migrator};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Connection;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_MIGRATIONS_DIR: &str = "./migrations";

/// Open a bounded pool and make sure the server answers.
pub async fn connect(url: &str, max_connections: u32) -> IngestResult<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(30))
        .connect(url)
        .await?;

    pool.acquire().await?.ping().await?;
    tracing::debug!(max_connections, "database reachable");
    Ok(pool)
}

/// Migration actions of the `migrate` binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrateAction {
    /// Apply everything pending.
    Up,
    /// Revert the most recently applied migration.
    Down,
    /// Revert everything, then apply everything.
    Reset,
}

impl FromStr for MigrateAction {
    type Err = IngestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(MigrateAction::Up),
            "down" => Ok(MigrateAction::Down),
            "reset" => Ok(MigrateAction::Reset),
            other => Err(IngestError::Config(format!(
                "unknown migrate action '{other}' (expected up, down or reset)"
            ))),
        }
    }
}

/// Run `action` against `pool` with the migrations found in `dir`.
pub async fn migrate(pool: &PgPool, dir: &Path, action: MigrateAction) -> IngestResult<()> {
    let migrator = Migrator::new(dir).await?;
    match action {
        MigrateAction::Up => {
            migrator.run(pool).await?;
            tracing::info!("migrations applied");
        }
        MigrateAction::Down => match previous_version(pool).await? {
            Some(target) => {
                migrator.undo(pool, target).await?;
                tracing::info!(target, "rolled back one migration");
            }
            None => tracing::info!("no applied migrations to roll back"),
        },
        MigrateAction::Reset => {
            migrator.undo(pool, 0).await?;
            tracing::info!("all migrations reverted");
            migrator.run(pool).await?;
            tracing::info!("migrations applied");
        }
    }
    Ok(())
}

/// Version to undo down to so that exactly the latest migration is reverted.
/// `None` when nothing is applied.
async fn previous_version(pool: &PgPool) -> IngestResult<Option<i64>> {
    let mut conn = pool.acquire().await?;
    conn.ensure_migrations_table().await?;
    let mut applied: Vec<i64> = conn
        .list_applied_migrations()
        .await?
        .into_iter()
        .map(|m| m.version)
        .collect();
    applied.sort_unstable();
    Ok(step_back_target(&applied))
}

fn step_back_target(applied: &[i64]) -> Option<i64> {
    match applied {
        [] => None,
        [.., prev, _latest] => Some(*prev),
        [_only] => Some(0),
    }
}
