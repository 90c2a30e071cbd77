//! Persistence seam for the two config namespaces: onboarded accounts and
//! active suppression windows. Both are read fresh on every decision.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{PersonId, SuppressionKey, SuppressionWindow, UserConfig};

pub mod memory;

pub use memory::{InMemoryAccountRepository, InMemorySuppressionRepository};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("stored record could not be decoded: {0}")]
    Decode(String),
}

#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_by_id(&self, id: &PersonId) -> Result<Option<UserConfig>, StoreError>;
    async fn save(&self, account: UserConfig) -> Result<(), StoreError>;
    async fn remove(&self, id: &PersonId) -> Result<(), StoreError>;
    async fn list_ids(&self) -> Result<Vec<PersonId>, StoreError>;
}

#[async_trait]
pub trait SuppressionRepository: Send + Sync {
    async fn find_by_key(
        &self,
        key: &SuppressionKey,
    ) -> Result<Option<SuppressionWindow>, StoreError>;
    async fn save(&self, window: SuppressionWindow) -> Result<(), StoreError>;
    async fn remove(&self, key: &SuppressionKey) -> Result<(), StoreError>;
    async fn list_keys(&self) -> Result<Vec<SuppressionKey>, StoreError>;
}

#[derive(Clone)]
pub struct ConfigStore {
    pub accounts: Arc<dyn AccountRepository>,
    pub suppressions: Arc<dyn SuppressionRepository>,
}

impl ConfigStore {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        suppressions: Arc<dyn SuppressionRepository>,
    ) -> Self {
        Self { accounts, suppressions }
    }

    pub fn in_memory() -> Self {
        Self {
            accounts: Arc::new(InMemoryAccountRepository::default()),
            suppressions: Arc::new(InMemorySuppressionRepository::default()),
        }
    }
}
