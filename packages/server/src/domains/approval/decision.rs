//! Decision state machine: turns a validated OTP into a committed decision.
//!
//! `Created → Pending → {Approved, Rejected, OnHold}`. The decision write is
//! the one operation with a real concurrency contract: a version-checked
//! update retried exactly once on conflict, never locked.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::common::ApprovalError;
use crate::domains::approval::correlation::{CommentState, CorrelationRegistry};
use crate::domains::approval::events::ApprovalAction;
use crate::domains::approval::models::Decision;
use crate::domains::approval::otp::OtpOutcome;
use crate::kernel::traits::{ApprovalStore, BaseChatService, MessageCorrelation, ResendMappingStore};

pub struct DecisionStateMachine {
    approvals: Arc<dyn ApprovalStore>,
    resend_mappings: Arc<dyn ResendMappingStore>,
    chat: Arc<dyn BaseChatService>,
    messages: Arc<dyn MessageCorrelation>,
    correlation: Arc<CorrelationRegistry>,
}

impl DecisionStateMachine {
    pub fn new(
        approvals: Arc<dyn ApprovalStore>,
        resend_mappings: Arc<dyn ResendMappingStore>,
        chat: Arc<dyn BaseChatService>,
        messages: Arc<dyn MessageCorrelation>,
        correlation: Arc<CorrelationRegistry>,
    ) -> Self {
        Self {
            approvals,
            resend_mappings,
            chat,
            messages,
            correlation,
        }
    }

    /// React to an OTP validation outcome for `phone`'s active challenge.
    pub async fn handle_outcome(
        &self,
        phone: &str,
        approval_id: Uuid,
        outcome: OtpOutcome,
    ) -> Result<(), ApprovalError> {
        match outcome {
            OtpOutcome::Valid => self.commit_decision(phone, approval_id).await,
            OtpOutcome::Denied => self.offer_resend(phone, approval_id).await,
            OtpOutcome::InvalidRetry { remaining } => {
                warn!(phone, remaining, "invalid OTP, prompting retry");
                if let Err(e) = self.chat.send_retry_prompt(phone).await {
                    warn!(phone, error = %e, "failed to send retry prompt");
                }
                Ok(())
            }
            OtpOutcome::Expired => {
                // No outbound message: the user may have abandoned the flow.
                warn!(phone, %approval_id, "OTP expired");
                Ok(())
            }
            OtpOutcome::NotFound => {
                warn!(phone, %approval_id, "no valid OTP found");
                Ok(())
            }
        }
    }

    /// Commit the cached action as the terminal decision.
    async fn commit_decision(&self, phone: &str, approval_id: Uuid) -> Result<(), ApprovalError> {
        let Some(action) = self.correlation.cached_action(approval_id) else {
            // Lost correlation: the OTP is consumed but the decision stays
            // unset, requiring manual recovery.
            warn!(%approval_id, "no cached action for validated OTP");
            return Ok(());
        };

        let Some(decision) = action.decision() else {
            warn!(%approval_id, ?action, "cached action commits no decision");
            return Ok(());
        };

        self.persist_decision(approval_id, decision).await?;
        info!(%approval_id, ?decision, "approval decision committed");

        if action.wants_comment() {
            self.request_comment(phone, approval_id, action).await;
        }

        self.correlation.end_challenge(phone);
        self.correlation.remove_action(approval_id);
        Ok(())
    }

    /// Version-checked write with a single re-read-and-retry on conflict.
    async fn persist_decision(
        &self,
        approval_id: Uuid,
        decision: Decision,
    ) -> Result<(), ApprovalError> {
        let request = self.approvals.get(approval_id).await?;
        match self
            .approvals
            .update_decision(approval_id, decision, request.version)
            .await
        {
            Ok(()) => Ok(()),
            Err(ApprovalError::Conflict(_)) => {
                info!(%approval_id, "optimistic conflict on decision write, retrying once");
                let current = self.approvals.get(approval_id).await?;
                self.approvals
                    .update_decision(approval_id, decision, current.version)
                    .await
            }
            Err(e) => Err(e),
        }
    }

    async fn request_comment(&self, phone: &str, approval_id: Uuid, action: ApprovalAction) {
        let state = match action {
            ApprovalAction::Reject(_) => CommentState::AwaitingRejectionComment,
            _ => CommentState::AwaitingHoldComment,
        };
        self.correlation.await_comment(phone, state);

        match self.approvals.get(approval_id).await {
            Ok(request) => match self.chat.send_comment_request(phone, &request).await {
                Ok(Some(message_id)) => self.messages.record(&message_id, approval_id),
                Ok(None) => warn!(%approval_id, "comment request accepted without a message id"),
                Err(e) => warn!(%approval_id, error = %e, "failed to send comment request"),
            },
            Err(e) => warn!(%approval_id, error = %e, "approval vanished before comment request"),
        }
    }

    /// Denied challenge: release the phone's correlation entry and offer a
    /// fresh OTP through a resend button.
    async fn offer_resend(&self, phone: &str, approval_id: Uuid) -> Result<(), ApprovalError> {
        self.correlation.end_challenge(phone);

        let mapping = self.resend_mappings.create(approval_id, phone).await?;
        info!(%approval_id, mapping_id = %mapping.id, "created resend mapping");

        let request = self.approvals.get(approval_id).await?;
        match self
            .chat
            .send_resend_offer(phone, mapping.id, &request)
            .await
        {
            Ok(Some(message_id)) => self.messages.record(&message_id, approval_id),
            Ok(None) => warn!(%approval_id, "resend offer accepted without a message id"),
            Err(e) => warn!(phone, error = %e, "failed to send resend offer"),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::{
        approval_fixture, InMemoryApprovalStore, InMemoryResendMappingStore, SpyChatService,
    };
    use crate::domains::approval::correlation::InMemoryMessageCorrelation;

    const PHONE: &str = "+212600000000";

    struct Harness {
        machine: DecisionStateMachine,
        approvals: Arc<InMemoryApprovalStore>,
        resend_mappings: Arc<InMemoryResendMappingStore>,
        chat: Arc<SpyChatService>,
        correlation: Arc<CorrelationRegistry>,
    }

    fn harness() -> Harness {
        let approvals = Arc::new(InMemoryApprovalStore::new());
        let resend_mappings = Arc::new(InMemoryResendMappingStore::new());
        let chat = Arc::new(SpyChatService::new());
        let messages = Arc::new(InMemoryMessageCorrelation::new());
        let correlation = Arc::new(CorrelationRegistry::new());
        let machine = DecisionStateMachine::new(
            approvals.clone(),
            resend_mappings.clone(),
            chat.clone(),
            messages,
            correlation.clone(),
        );
        Harness {
            machine,
            approvals,
            resend_mappings,
            chat,
            correlation,
        }
    }

    #[tokio::test]
    async fn valid_outcome_commits_cached_action_and_releases_state() {
        let h = harness();
        let request = h.approvals.seed(approval_fixture()).await;

        h.correlation.begin_challenge(PHONE, request.id);
        h.correlation
            .cache_action(request.id, ApprovalAction::Approve(request.id));

        h.machine
            .handle_outcome(PHONE, request.id, OtpOutcome::Valid)
            .await
            .unwrap();

        let updated = h.approvals.get(request.id).await.unwrap();
        assert_eq!(updated.decision, Decision::Approved);
        assert_eq!(updated.version, request.version + 1);
        assert_eq!(h.correlation.active_approval(PHONE), None);
        assert_eq!(h.correlation.cached_action(request.id), None);
        // Approve commits without a comment request.
        assert!(h.chat.comment_requests().is_empty());
    }

    #[tokio::test]
    async fn rejected_decision_requests_a_comment() {
        let h = harness();
        let request = h.approvals.seed(approval_fixture()).await;

        h.correlation.begin_challenge(PHONE, request.id);
        h.correlation
            .cache_action(request.id, ApprovalAction::Reject(request.id));

        h.machine
            .handle_outcome(PHONE, request.id, OtpOutcome::Valid)
            .await
            .unwrap();

        let updated = h.approvals.get(request.id).await.unwrap();
        assert_eq!(updated.decision, Decision::Rejected);
        assert_eq!(h.chat.comment_requests(), vec![PHONE.to_string()]);
        assert_eq!(
            h.correlation.comment_state(PHONE),
            Some(CommentState::AwaitingRejectionComment)
        );
    }

    #[tokio::test]
    async fn conflict_is_retried_once_with_fresh_version() {
        let h = harness();
        let request = h.approvals.seed(approval_fixture()).await;
        h.approvals.force_conflicts(1);

        h.correlation.begin_challenge(PHONE, request.id);
        h.correlation
            .cache_action(request.id, ApprovalAction::Hold(request.id));

        h.machine
            .handle_outcome(PHONE, request.id, OtpOutcome::Valid)
            .await
            .unwrap();

        assert_eq!(
            h.approvals.get(request.id).await.unwrap().decision,
            Decision::OnHold
        );
    }

    #[tokio::test]
    async fn second_conflict_surfaces_as_error() {
        let h = harness();
        let request = h.approvals.seed(approval_fixture()).await;
        h.approvals.force_conflicts(2);

        h.correlation.begin_challenge(PHONE, request.id);
        h.correlation
            .cache_action(request.id, ApprovalAction::Approve(request.id));

        let result = h
            .machine
            .handle_outcome(PHONE, request.id, OtpOutcome::Valid)
            .await;
        assert!(matches!(result, Err(ApprovalError::Conflict(_))));
    }

    #[tokio::test]
    async fn lost_action_cache_leaves_decision_unset() {
        let h = harness();
        let request = h.approvals.seed(approval_fixture()).await;
        h.correlation.begin_challenge(PHONE, request.id);

        h.machine
            .handle_outcome(PHONE, request.id, OtpOutcome::Valid)
            .await
            .unwrap();

        assert_eq!(
            h.approvals.get(request.id).await.unwrap().decision,
            approval_fixture().decision
        );
    }

    #[tokio::test]
    async fn denied_outcome_offers_resend_and_releases_phone() {
        let h = harness();
        let request = h.approvals.seed(approval_fixture()).await;
        h.correlation.begin_challenge(PHONE, request.id);

        h.machine
            .handle_outcome(PHONE, request.id, OtpOutcome::Denied)
            .await
            .unwrap();

        assert_eq!(h.correlation.active_approval(PHONE), None);
        assert_eq!(h.resend_mappings.count(), 1);
        assert_eq!(h.chat.resend_offers(), vec![PHONE.to_string()]);
    }

    #[tokio::test]
    async fn invalid_retry_prompts_and_leaves_state_untouched() {
        let h = harness();
        let request = h.approvals.seed(approval_fixture()).await;
        h.correlation.begin_challenge(PHONE, request.id);
        h.correlation
            .cache_action(request.id, ApprovalAction::Approve(request.id));

        h.machine
            .handle_outcome(PHONE, request.id, OtpOutcome::InvalidRetry { remaining: 2 })
            .await
            .unwrap();

        assert_eq!(h.chat.retry_prompts(), vec![PHONE.to_string()]);
        assert_eq!(h.correlation.active_approval(PHONE), Some(request.id));
        assert!(h.correlation.cached_action(request.id).is_some());
    }

    #[tokio::test]
    async fn expired_and_not_found_send_nothing() {
        let h = harness();
        let request = h.approvals.seed(approval_fixture()).await;

        h.machine
            .handle_outcome(PHONE, request.id, OtpOutcome::Expired)
            .await
            .unwrap();
        h.machine
            .handle_outcome(PHONE, request.id, OtpOutcome::NotFound)
            .await
            .unwrap();

        assert!(h.chat.calls().is_empty());
    }
}
