use sqlx::migrate::{MigrateError, Migrator};

use crate::DbPool;

pub static MIGRATOR: Migrator = sqlx::migrate!("../../migrations");

pub async fn run_pending(pool: &DbPool) -> Result<(), MigrateError> {
    MIGRATOR.run(pool).await?;
    tracing::debug!(
        event_name = "db.migrations.applied",
        correlation_id = "bootstrap",
        known = MIGRATOR.iter().count(),
    );
    Ok(())
}
