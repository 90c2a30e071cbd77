use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::account::PersonId;

/// Sweeps treat windows ending within this margin as already expired.
pub const SWEEP_LOOKAHEAD_MINUTES: i64 = 5;

/// `responderId-recipientId`
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SuppressionKey(pub String);

impl SuppressionKey {
    pub fn new(responder: &PersonId, recipient: &PersonId) -> Self {
        Self(format!("{}-{}", responder.0, recipient.0))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SuppressionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuppressionWindow {
    pub key: SuppressionKey,
    /// Epoch seconds.
    pub suppress_until: i64,
}

impl SuppressionWindow {
    pub fn starting_at(key: SuppressionKey, now: DateTime<Utc>, minutes: i64) -> Self {
        Self { key, suppress_until: (now + Duration::minutes(minutes)).timestamp() }
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.suppress_until > now.timestamp()
    }

    pub fn is_due_for_sweep(&self, now: DateTime<Utc>) -> bool {
        self.suppress_until <= (now + Duration::minutes(SWEEP_LOOKAHEAD_MINUTES)).timestamp()
    }
}
