use chrono::Utc;
use sqlx::Row;

use autoresponder_core::domain::{SuppressionKey, SuppressionWindow};
use autoresponder_core::store::{StoreError, SuppressionRepository};

use super::database_error;
use crate::DbPool;

pub struct SqlSuppressionRepository {
    pool: DbPool,
}

impl SqlSuppressionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl SuppressionRepository for SqlSuppressionRepository {
    async fn find_by_key(
        &self,
        key: &SuppressionKey,
    ) -> Result<Option<SuppressionWindow>, StoreError> {
        let row = sqlx::query(
            "SELECT suppression_key, suppress_until
             FROM suppression_window
             WHERE suppression_key = ?",
        )
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        row.map(|row| {
            Ok(SuppressionWindow {
                key: SuppressionKey(row.try_get("suppression_key").map_err(database_error)?),
                suppress_until: row.try_get("suppress_until").map_err(database_error)?,
            })
        })
        .transpose()
    }

    async fn save(&self, window: SuppressionWindow) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO suppression_window (suppression_key, suppress_until, created_at)
             VALUES (?, ?, ?)
             ON CONFLICT(suppression_key) DO UPDATE SET
                suppress_until = excluded.suppress_until",
        )
        .bind(window.key.as_str())
        .bind(window.suppress_until)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(())
    }

    async fn remove(&self, key: &SuppressionKey) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM suppression_window WHERE suppression_key = ?")
            .bind(key.as_str())
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<SuppressionKey>, StoreError> {
        let rows =
            sqlx::query("SELECT suppression_key FROM suppression_window ORDER BY suppression_key")
                .fetch_all(&self.pool)
                .await
                .map_err(database_error)?;

        rows.into_iter()
            .map(|row| {
                row.try_get::<String, _>("suppression_key")
                    .map(SuppressionKey)
                    .map_err(database_error)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use autoresponder_core::domain::{PersonId, SuppressionKey, SuppressionWindow};
    use autoresponder_core::lifecycle::LifecycleManager;
    use autoresponder_core::store::SuppressionRepository;
    use autoresponder_core::testing::{fixed_clock, ScriptedPlatform};

    use super::SqlSuppressionRepository;
    use crate::repositories::{setup_pool, sql_config_store};

    fn key(recipient: &str) -> SuppressionKey {
        SuppressionKey::new(&PersonId::new("OWNER"), &PersonId::new(recipient))
    }

    #[tokio::test]
    async fn sql_suppression_repo_round_trip_and_overwrite() {
        let pool = setup_pool().await;
        let repo = SqlSuppressionRepository::new(pool.clone());

        repo.save(SuppressionWindow { key: key("S-1"), suppress_until: 1_000 })
            .await
            .expect("save");
        repo.save(SuppressionWindow { key: key("S-1"), suppress_until: 2_000 })
            .await
            .expect("overwrite");

        let found = repo.find_by_key(&key("S-1")).await.expect("find");
        assert_eq!(found, Some(SuppressionWindow { key: key("S-1"), suppress_until: 2_000 }));
        assert_eq!(repo.list_keys().await.expect("list"), vec![key("S-1")]);

        repo.remove(&key("S-1")).await.expect("remove");
        assert_eq!(repo.find_by_key(&key("S-1")).await.expect("find"), None);

        pool.close().await;
    }

    #[tokio::test]
    async fn sweep_against_sqlite_removes_only_due_windows() {
        let pool = setup_pool().await;
        let store = sql_config_store(pool.clone());
        let clock = fixed_clock();
        let now = clock.now_value();

        store
            .suppressions
            .save(SuppressionWindow {
                key: key("EXPIRED"),
                suppress_until: (now - Duration::minutes(1)).timestamp(),
            })
            .await
            .expect("save expired");
        store
            .suppressions
            .save(SuppressionWindow {
                key: key("LIVE"),
                suppress_until: (now + Duration::minutes(30)).timestamp(),
            })
            .await
            .expect("save live");

        let manager =
            LifecycleManager::new(Arc::new(ScriptedPlatform::new()), store.clone(), Arc::new(clock));
        let report = manager.sweep_suppressions().await.expect("sweep");

        assert_eq!(report.removed, vec![key("EXPIRED").to_string()]);
        assert_eq!(store.suppressions.list_keys().await.expect("list"), vec![key("LIVE")]);

        pool.close().await;
    }
}
