//! Respond-or-skip decision for a verified inbound event.
//!
//! Checks run in [`CHECK_ORDER`] and the first failing check names the skip
//! reason. Every lookup failure resolves to a skip.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::domain::{InboundEvent, PersonId, SuppressionKey, UserConfig};
use crate::platform::Clock;
use crate::store::ConfigStore;

const MENTION_ALL_GROUP: &str = "all";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SkipReason {
    NotAMessage,
    MissingSender,
    SelfOriginated,
    NotMentioned,
    Suppressed,
    ResponseDisabled,
    AccountNotFound,
    StoreUnavailable,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotAMessage => "not_a_message",
            Self::MissingSender => "missing_sender",
            Self::SelfOriginated => "self_originated",
            Self::NotMentioned => "not_mentioned",
            Self::Suppressed => "suppressed",
            Self::ResponseDisabled => "response_disabled",
            Self::AccountNotFound => "account_not_found",
            Self::StoreUnavailable => "store_unavailable",
        }
    }
}

#[derive(Clone, Debug)]
pub enum Decision {
    Respond(UserConfig),
    Skip(SkipReason),
}

impl Decision {
    pub fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Respond(_) => None,
            Self::Skip(reason) => Some(*reason),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Check {
    Origin,
    Mention,
    Suppression,
    ResponseEnabled,
}

pub const CHECK_ORDER: [Check; 4] =
    [Check::Origin, Check::Mention, Check::Suppression, Check::ResponseEnabled];

#[derive(Clone)]
pub struct EventQualifier {
    store: ConfigStore,
    clock: Arc<dyn Clock>,
}

impl EventQualifier {
    pub fn new(store: ConfigStore, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    pub async fn qualify(&self, event: &InboundEvent) -> Decision {
        let decision = self.evaluate(event).await;
        if let Decision::Skip(reason) = &decision {
            info!(
                event_name = "webhook.qualify.skipped",
                correlation_id = %event.id,
                account_id = %event.created_by,
                reason = reason.as_str(),
                "event skipped"
            );
        }
        decision
    }

    async fn evaluate(&self, event: &InboundEvent) -> Decision {
        if !event.is_new_message() {
            return Decision::Skip(SkipReason::NotAMessage);
        }
        let Some(sender) = event.data.person_id.as_ref() else {
            return Decision::Skip(SkipReason::MissingSender);
        };

        // Loaded at most once, by whichever check first needs it.
        let mut account = None;
        for check in CHECK_ORDER {
            let outcome = match check {
                Check::Origin => check_origin(event, sender),
                Check::Mention => self.check_mention(event, &mut account).await,
                Check::Suppression => self.check_suppression(event, sender).await,
                Check::ResponseEnabled => self.check_response_enabled(event, &mut account).await,
            };
            if let Err(reason) = outcome {
                return Decision::Skip(reason);
            }
        }

        match account {
            Some(account) => Decision::Respond(account),
            None => Decision::Skip(SkipReason::AccountNotFound),
        }
    }

    async fn check_mention(
        &self,
        event: &InboundEvent,
        account: &mut Option<UserConfig>,
    ) -> Result<(), SkipReason> {
        if !event.is_group_room() {
            return Ok(());
        }
        if event.data.mentioned_people.contains(&event.created_by) {
            return Ok(());
        }
        if !event.data.mentioned_groups.iter().any(|group| group == MENTION_ALL_GROUP) {
            return Err(SkipReason::NotMentioned);
        }

        let owner = self.load_account(event, account).await?;
        if owner.mention_all_enabled {
            Ok(())
        } else {
            Err(SkipReason::NotMentioned)
        }
    }

    async fn check_suppression(
        &self,
        event: &InboundEvent,
        sender: &PersonId,
    ) -> Result<(), SkipReason> {
        let key = SuppressionKey::new(&event.created_by, sender);
        match self.store.suppressions.find_by_key(&key).await {
            Ok(Some(window)) if window.is_active_at(self.clock.now()) => {
                debug!(
                    event_name = "webhook.qualify.suppression_active",
                    correlation_id = %event.id,
                    suppression_key = %key,
                    suppress_until = window.suppress_until,
                );
                Err(SkipReason::Suppressed)
            }
            Ok(_) => Ok(()),
            Err(error) => {
                warn!(
                    event_name = "webhook.qualify.suppression_lookup_failed",
                    correlation_id = %event.id,
                    suppression_key = %key,
                    error = %error,
                    "suppression state unknown, not responding"
                );
                Err(SkipReason::StoreUnavailable)
            }
        }
    }

    async fn check_response_enabled(
        &self,
        event: &InboundEvent,
        account: &mut Option<UserConfig>,
    ) -> Result<(), SkipReason> {
        let owner = self.load_account(event, account).await?;
        if owner.response_enabled {
            Ok(())
        } else {
            Err(SkipReason::ResponseDisabled)
        }
    }

    async fn load_account<'a>(
        &self,
        event: &InboundEvent,
        slot: &'a mut Option<UserConfig>,
    ) -> Result<&'a UserConfig, SkipReason> {
        if slot.is_none() {
            let loaded = match self.store.accounts.find_by_id(&event.created_by).await {
                Ok(Some(account)) => account,
                Ok(None) => return Err(SkipReason::AccountNotFound),
                Err(error) => {
                    warn!(
                        event_name = "webhook.qualify.account_lookup_failed",
                        correlation_id = %event.id,
                        account_id = %event.created_by,
                        error = %error,
                        "account lookup failed, not responding"
                    );
                    return Err(SkipReason::StoreUnavailable);
                }
            };
            *slot = Some(loaded);
        }
        slot.as_ref().ok_or(SkipReason::AccountNotFound)
    }
}

fn check_origin(event: &InboundEvent, sender: &PersonId) -> Result<(), SkipReason> {
    if &event.created_by == sender {
        Err(SkipReason::SelfOriginated)
    } else {
        Ok(())
    }
}
