use std::collections::HashMap;

use tokio::sync::RwLock;

use crate::domain::{PersonId, SuppressionKey, SuppressionWindow, UserConfig};

use super::{AccountRepository, StoreError, SuppressionRepository};

#[derive(Default)]
pub struct InMemoryAccountRepository {
    accounts: RwLock<HashMap<String, UserConfig>>,
}

#[async_trait::async_trait]
impl AccountRepository for InMemoryAccountRepository {
    async fn find_by_id(&self, id: &PersonId) -> Result<Option<UserConfig>, StoreError> {
        let accounts = self.accounts.read().await;
        Ok(accounts.get(&id.0).cloned())
    }

    async fn save(&self, account: UserConfig) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        accounts.insert(account.id.0.clone(), account);
        Ok(())
    }

    async fn remove(&self, id: &PersonId) -> Result<(), StoreError> {
        let mut accounts = self.accounts.write().await;
        accounts.remove(&id.0);
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<PersonId>, StoreError> {
        let accounts = self.accounts.read().await;
        let mut ids: Vec<PersonId> = accounts.keys().cloned().map(PersonId).collect();
        ids.sort();
        Ok(ids)
    }
}

#[derive(Default)]
pub struct InMemorySuppressionRepository {
    windows: RwLock<HashMap<String, SuppressionWindow>>,
}

#[async_trait::async_trait]
impl SuppressionRepository for InMemorySuppressionRepository {
    async fn find_by_key(
        &self,
        key: &SuppressionKey,
    ) -> Result<Option<SuppressionWindow>, StoreError> {
        let windows = self.windows.read().await;
        Ok(windows.get(&key.0).cloned())
    }

    async fn save(&self, window: SuppressionWindow) -> Result<(), StoreError> {
        let mut windows = self.windows.write().await;
        windows.insert(window.key.0.clone(), window);
        Ok(())
    }

    async fn remove(&self, key: &SuppressionKey) -> Result<(), StoreError> {
        let mut windows = self.windows.write().await;
        windows.remove(&key.0);
        Ok(())
    }

    async fn list_keys(&self) -> Result<Vec<SuppressionKey>, StoreError> {
        let windows = self.windows.read().await;
        let mut keys: Vec<SuppressionKey> = windows.keys().cloned().map(SuppressionKey).collect();
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{PersonId, SuppressionKey, SuppressionWindow, TokenPair, UserConfig};
    use crate::store::{
        AccountRepository, InMemoryAccountRepository, InMemorySuppressionRepository,
        SuppressionRepository,
    };

    #[tokio::test]
    async fn in_memory_account_repo_round_trip() {
        let repo = InMemoryAccountRepository::default();
        let account = UserConfig::onboarded(
            PersonId::new("P-1"),
            TokenPair { access_token: "a".to_owned().into(), refresh_token: "r".to_owned().into() },
        );

        repo.save(account).await.expect("save account");
        let found = repo.find_by_id(&PersonId::new("P-1")).await.expect("find account");
        assert!(found.is_some());
        assert_eq!(repo.list_ids().await.expect("list"), vec![PersonId::new("P-1")]);

        repo.remove(&PersonId::new("P-1")).await.expect("remove");
        assert!(repo.find_by_id(&PersonId::new("P-1")).await.expect("find").is_none());
    }

    #[tokio::test]
    async fn in_memory_suppression_repo_upsert_replaces_window() {
        let repo = InMemorySuppressionRepository::default();
        let key = SuppressionKey("a-b".to_owned());

        repo.save(SuppressionWindow { key: key.clone(), suppress_until: 10 }).await.expect("save");
        repo.save(SuppressionWindow { key: key.clone(), suppress_until: 20 }).await.expect("save");

        let found = repo.find_by_key(&key).await.expect("find");
        assert_eq!(found.map(|window| window.suppress_until), Some(20));
        assert_eq!(repo.list_keys().await.expect("list").len(), 1);
    }
}
