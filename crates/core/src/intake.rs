//! Post-acknowledgment processing of one webhook notification: signature,
//! qualification, dispatch.

use std::sync::Arc;

use tracing::{info, warn};

use crate::dispatch::{DispatchError, DispatchReport, ResponseDispatcher};
use crate::domain::InboundEvent;
use crate::platform::{Clock, MessagingPlatform};
use crate::qualify::{Decision, EventQualifier, SkipReason};
use crate::store::ConfigStore;
use crate::webhook::{verify_signature, VerifyError};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IntakeOutcome {
    Rejected(VerifyError),
    Skipped(SkipReason),
    Responded(DispatchReport),
    Failed(DispatchError),
}

#[derive(Clone)]
pub struct IntakePipeline {
    qualifier: EventQualifier,
    dispatcher: ResponseDispatcher,
}

impl IntakePipeline {
    pub fn new(
        platform: Arc<dyn MessagingPlatform>,
        store: ConfigStore,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            qualifier: EventQualifier::new(store.clone(), clock.clone()),
            dispatcher: ResponseDispatcher::new(platform, store, clock),
        }
    }

    /// `raw_body` must be the exact bytes the signature was computed over.
    pub async fn process(
        &self,
        event: &InboundEvent,
        raw_body: &[u8],
        signature: Option<&str>,
    ) -> IntakeOutcome {
        if let Err(error) = verify_signature(raw_body, &event.created_by, signature) {
            warn!(
                event_name = "webhook.intake.signature_rejected",
                correlation_id = %event.id,
                account_id = %event.created_by,
                header_present = signature.is_some(),
                "dropping notification"
            );
            return IntakeOutcome::Rejected(error);
        }

        let account = match self.qualifier.qualify(event).await {
            Decision::Respond(account) => account,
            Decision::Skip(reason) => return IntakeOutcome::Skipped(reason),
        };

        match self.dispatcher.dispatch(event, &account).await {
            Ok(report) => {
                info!(
                    event_name = "webhook.intake.completed",
                    correlation_id = %event.id,
                    account_id = %account.id,
                    suppression = ?report.suppression,
                    digest = ?report.digest,
                );
                IntakeOutcome::Responded(report)
            }
            Err(error) => IntakeOutcome::Failed(error),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Duration;

    use super::{IntakeOutcome, IntakePipeline};
    use crate::dispatch::DigestOutcome;
    use crate::domain::{PersonId, SuppressionKey};
    use crate::qualify::SkipReason;
    use crate::store::ConfigStore;
    use crate::testing::{
        account, fixed_clock, message_envelope, FixedClock, ScriptedPlatform, AUTO_RESPONSE,
        OWNER_ID, PRIMARY_ID, SENDER_ID,
    };
    use crate::webhook::{compute_signature, verify_envelope, VerifyError};

    struct Harness {
        platform: Arc<ScriptedPlatform>,
        store: ConfigStore,
        clock: FixedClock,
        pipeline: IntakePipeline,
    }

    async fn harness(owner: crate::domain::UserConfig) -> Harness {
        let platform = Arc::new(ScriptedPlatform::new().with_message_context());
        let store = ConfigStore::in_memory();
        store.accounts.save(owner).await.expect("seed");
        let clock = fixed_clock();
        let pipeline = IntakePipeline::new(platform.clone(), store.clone(), Arc::new(clock.clone()));
        Harness { platform, store, clock, pipeline }
    }

    async fn deliver(harness: &Harness, envelope: &serde_json::Value) -> IntakeOutcome {
        let body = serde_json::to_vec(envelope).expect("body");
        let signature = compute_signature(&body, &PersonId::new(OWNER_ID)).expect("signature");
        let event = verify_envelope(envelope).expect("valid envelope");
        harness.pipeline.process(&event, &body, Some(&signature)).await
    }

    #[tokio::test]
    async fn direct_message_gets_one_response_and_a_window() {
        let harness = harness(account(true)).await;

        let outcome = deliver(&harness, &message_envelope("direct")).await;

        assert!(matches!(outcome, IntakeOutcome::Responded(_)));
        let sent = harness.platform.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].recipient, PersonId::new(SENDER_ID));
        assert_eq!(sent[0].markdown, AUTO_RESPONSE);

        let key = SuppressionKey::new(&PersonId::new(OWNER_ID), &PersonId::new(SENDER_ID));
        let window = harness.store.suppressions.find_by_key(&key).await.expect("read");
        assert_eq!(
            window.map(|window| window.suppress_until),
            Some((harness.clock.now_value() + Duration::minutes(10)).timestamp())
        );
    }

    #[tokio::test]
    async fn second_message_within_window_is_suppressed() {
        let harness = harness(account(true)).await;

        deliver(&harness, &message_envelope("direct")).await;
        harness.clock.advance(Duration::minutes(3));
        let outcome = deliver(&harness, &message_envelope("direct")).await;

        assert_eq!(outcome, IntakeOutcome::Skipped(SkipReason::Suppressed));
        assert_eq!(harness.platform.sent().len(), 1);
    }

    #[tokio::test]
    async fn unmentioned_group_message_sends_nothing() {
        let harness = harness(account(true)).await;

        let outcome = deliver(&harness, &message_envelope("group")).await;

        assert_eq!(outcome, IntakeOutcome::Skipped(SkipReason::NotMentioned));
        assert!(harness.platform.sent().is_empty());
    }

    #[tokio::test]
    async fn primary_disabled_means_auto_response_only() {
        let harness = harness(account(true)).await;

        let outcome = deliver(&harness, &message_envelope("direct")).await;

        let IntakeOutcome::Responded(report) = outcome else {
            panic!("expected a response, got {outcome:?}");
        };
        assert_eq!(report.digest, DigestOutcome::Disabled);
        assert!(harness.platform.sent_to(PRIMARY_ID).is_empty());
    }

    #[tokio::test]
    async fn bad_signature_stops_before_dispatch() {
        let harness = harness(account(true)).await;
        let envelope = message_envelope("direct");
        let body = serde_json::to_vec(&envelope).expect("body");
        let event = verify_envelope(&envelope).expect("valid envelope");
        let forged = compute_signature(&body, &PersonId::new("SOMEBODY-ELSE-ENTIRELY"))
            .expect("signature");

        let forged_outcome = harness.pipeline.process(&event, &body, Some(&forged)).await;
        let missing_outcome = harness.pipeline.process(&event, &body, None).await;

        assert_eq!(forged_outcome, IntakeOutcome::Rejected(VerifyError::SignatureMismatch));
        assert_eq!(missing_outcome, IntakeOutcome::Rejected(VerifyError::SignatureMismatch));
        assert!(harness.platform.sent().is_empty());
    }

    #[tokio::test]
    async fn signature_covers_raw_bytes_not_reserialized_json() {
        let harness = harness(account(true)).await;
        let envelope = message_envelope("direct");
        // Same JSON value, different byte layout.
        let pretty = serde_json::to_vec_pretty(&envelope).expect("body");
        let compact = serde_json::to_vec(&envelope).expect("body");
        let signature =
            compute_signature(&pretty, &PersonId::new(OWNER_ID)).expect("signature");
        let event = verify_envelope(&envelope).expect("valid envelope");

        assert!(matches!(
            harness.pipeline.process(&event, &pretty, Some(&signature)).await,
            IntakeOutcome::Responded(_)
        ));
        assert_eq!(
            harness.pipeline.process(&event, &compact, Some(&signature)).await,
            IntakeOutcome::Rejected(VerifyError::SignatureMismatch)
        );
    }
}
