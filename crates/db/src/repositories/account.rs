use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use sqlx::{sqlite::SqliteRow, Row};

use autoresponder_core::domain::account::SuppressionSetting;
use autoresponder_core::domain::{PersonId, TokenPair, UserConfig};
use autoresponder_core::store::{AccountRepository, StoreError};

use super::database_error;
use crate::DbPool;

pub struct SqlAccountRepository {
    pool: DbPool,
}

impl SqlAccountRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AccountRepository for SqlAccountRepository {
    async fn find_by_id(&self, id: &PersonId) -> Result<Option<UserConfig>, StoreError> {
        let row = sqlx::query(
            "SELECT
                id,
                access_token,
                refresh_token,
                primary_id,
                primary_email,
                primary_enabled,
                auto_response,
                mention_all_enabled,
                suppression_minutes,
                response_enabled
             FROM account_config
             WHERE id = ?",
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(database_error)?;

        row.map(account_from_row).transpose()
    }

    async fn save(&self, account: UserConfig) -> Result<(), StoreError> {
        let now = Utc::now().to_rfc3339();
        sqlx::query(
            "INSERT INTO account_config (
                id,
                access_token,
                refresh_token,
                primary_id,
                primary_email,
                primary_enabled,
                auto_response,
                mention_all_enabled,
                suppression_minutes,
                response_enabled,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                primary_id = excluded.primary_id,
                primary_email = excluded.primary_email,
                primary_enabled = excluded.primary_enabled,
                auto_response = excluded.auto_response,
                mention_all_enabled = excluded.mention_all_enabled,
                suppression_minutes = excluded.suppression_minutes,
                response_enabled = excluded.response_enabled,
                updated_at = excluded.updated_at",
        )
        .bind(account.id.as_str())
        .bind(account.tokens.access_token.expose_secret())
        .bind(account.tokens.refresh_token.expose_secret())
        .bind(account.primary_id.as_ref().map(PersonId::as_str))
        .bind(&account.primary_email)
        .bind(account.primary_enabled)
        .bind(&account.auto_response)
        .bind(account.mention_all_enabled)
        .bind(account.suppression.as_stored())
        .bind(account.response_enabled)
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(database_error)?;

        Ok(())
    }

    async fn remove(&self, id: &PersonId) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM account_config WHERE id = ?")
            .bind(id.as_str())
            .execute(&self.pool)
            .await
            .map_err(database_error)?;
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<PersonId>, StoreError> {
        let rows = sqlx::query("SELECT id FROM account_config ORDER BY id ASC")
            .fetch_all(&self.pool)
            .await
            .map_err(database_error)?;

        rows.into_iter()
            .map(|row| row.try_get::<String, _>("id").map(PersonId).map_err(database_error))
            .collect()
    }
}

fn account_from_row(row: SqliteRow) -> Result<UserConfig, StoreError> {
    let secret = |column: &str| -> Result<SecretString, StoreError> {
        row.try_get::<String, _>(column).map(SecretString::from).map_err(database_error)
    };
    let tokens =
        TokenPair { access_token: secret("access_token")?, refresh_token: secret("refresh_token")? };

    Ok(UserConfig {
        id: PersonId(row.try_get("id").map_err(database_error)?),
        tokens,
        primary_id: row
            .try_get::<Option<String>, _>("primary_id")
            .map_err(database_error)?
            .filter(|value| !value.is_empty())
            .map(PersonId),
        primary_email: row.try_get("primary_email").map_err(database_error)?,
        primary_enabled: row.try_get("primary_enabled").map_err(database_error)?,
        auto_response: row.try_get("auto_response").map_err(database_error)?,
        mention_all_enabled: row.try_get("mention_all_enabled").map_err(database_error)?,
        suppression: SuppressionSetting::parse(
            &row.try_get::<String, _>("suppression_minutes").map_err(database_error)?,
        ),
        response_enabled: row.try_get("response_enabled").map_err(database_error)?,
    })
}
