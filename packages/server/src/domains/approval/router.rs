//! Webhook event router.
//!
//! Stateless per-event dispatcher: classifies inbound events (status vs.
//! message, button vs. text, reply-comment vs. OTP entry) and drives the OTP
//! lifecycle, resend cycle and decision machine. Every downstream failure is
//! absorbed and logged here; the webhook acknowledgment never reflects
//! processing failure, since provider redelivery would duplicate side
//! effects.

use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::common::phone::to_local_format;
use crate::common::ApprovalError;
use crate::domains::approval::decision::DecisionStateMachine;
use crate::domains::approval::events::{ApprovalAction, InboundEvent, WebhookPayload};
use crate::domains::approval::otp::OtpLifecycleManager;
use crate::domains::approval::resend::ResendCycleManager;
use crate::kernel::ServerDeps;

pub struct WebhookEventRouter {
    deps: ServerDeps,
    otp: OtpLifecycleManager,
    decisions: DecisionStateMachine,
    resend: ResendCycleManager,
}

impl WebhookEventRouter {
    pub fn new(deps: ServerDeps) -> Self {
        let otp = OtpLifecycleManager::new(deps.otps.clone());
        let decisions = DecisionStateMachine::new(
            deps.approvals.clone(),
            deps.resend_mappings.clone(),
            deps.chat.clone(),
            deps.messages.clone(),
            deps.correlation.clone(),
        );
        let resend = ResendCycleManager::new(
            deps.approvals.clone(),
            deps.otps.clone(),
            deps.resend_mappings.clone(),
            deps.sms.clone(),
            deps.correlation.clone(),
        );
        Self {
            deps,
            otp,
            decisions,
            resend,
        }
    }

    /// Entry point for one delivered webhook payload. Never returns an error:
    /// everything downstream is absorbed locally.
    pub async fn process_payload(&self, payload: WebhookPayload) {
        let phone_number_id = payload.phone_number_id().map(str::to_string);

        for event in payload.events() {
            self.mark_read(phone_number_id.as_deref(), &event).await;
            if let Err(e) = self.process_event(event).await {
                error!(error = %e, "error processing webhook event");
            }
        }
    }

    async fn process_event(&self, event: InboundEvent) -> Result<(), ApprovalError> {
        match event {
            InboundEvent::Status { message_id, status } => {
                info!(?message_id, ?status, "message status update");
                Ok(())
            }
            InboundEvent::Button {
                from,
                payload,
                reply_to,
                ..
            } => self.handle_button(&from, &payload, reply_to.as_deref()).await,
            InboundEvent::Text {
                from,
                body,
                reply_to,
                ..
            } => self.handle_text(&from, &body, reply_to.as_deref()).await,
            InboundEvent::Unsupported { kind } => {
                debug!(kind, "unhandled message type");
                Ok(())
            }
        }
    }

    /// Best-effort read receipt for inbound messages.
    async fn mark_read(&self, phone_number_id: Option<&str>, event: &InboundEvent) {
        let message_id = match event {
            InboundEvent::Button { message_id, .. } | InboundEvent::Text { message_id, .. } => {
                message_id.as_str()
            }
            _ => return,
        };
        let Some(phone_number_id) = phone_number_id else {
            warn!("cannot mark message as read - missing phone_number_id");
            return;
        };
        if let Err(e) = self.deps.chat.mark_message_read(phone_number_id, message_id).await {
            debug!(message_id, error = %e, "failed to mark message as read");
        }
    }

    // -----------------------------------------------------------------------
    // Buttons
    // -----------------------------------------------------------------------

    async fn handle_button(
        &self,
        phone: &str,
        payload: &str,
        reply_to: Option<&str>,
    ) -> Result<(), ApprovalError> {
        info!(phone, payload, "processing button message");

        let Some(action) = ApprovalAction::parse(payload) else {
            warn!(payload, "unrecognized button payload");
            return Ok(());
        };

        // The reply thread is authoritative for which approval this button
        // belongs to; a button from a stale or foreign thread is dropped
        // without side effects.
        let Some(reply_to) = reply_to else {
            warn!(phone, "button message without reply context");
            return Ok(());
        };
        let Some(approval_id) = self.deps.messages.resolve(reply_to) else {
            warn!(reply_to, "no approval found for replied-to message id");
            return Ok(());
        };

        self.handle_action(action, phone, approval_id).await
    }

    /// Action processor: cache the action, issue and deliver an OTP, and
    /// record correlation. Resend taps go through the resend cycle instead.
    async fn handle_action(
        &self,
        action: ApprovalAction,
        phone: &str,
        approval_id: Uuid,
    ) -> Result<(), ApprovalError> {
        if let ApprovalAction::Resend(_) = action {
            return self.resend.handle_resend(phone, approval_id).await;
        }

        let request = self.deps.approvals.get(approval_id).await?;
        self.deps.correlation.cache_action(approval_id, action);

        let code = self.otp.issue(phone, &request).await?;

        if let Err(e) = self.deliver_challenge(phone, &code).await {
            // Compensate: no dangling challenge, no correlation entries. The
            // user retries the whole action from scratch.
            warn!(phone, error = %e, "OTP delivery failed, clearing challenge");
            self.otp.clear(phone).await?;
            self.deps.correlation.remove_action(approval_id);
            return Ok(());
        }

        self.deps.correlation.begin_challenge(phone, approval_id);
        if action.wants_comment() {
            let state = match action {
                ApprovalAction::Reject(_) => {
                    super::correlation::CommentState::AwaitingRejectionComment
                }
                _ => super::correlation::CommentState::AwaitingHoldComment,
            };
            self.deps.correlation.await_comment(phone, state);
        }
        info!(phone, %approval_id, "OTP issued and correlation recorded");
        Ok(())
    }

    async fn deliver_challenge(&self, phone: &str, code: &str) -> Result<(), ApprovalError> {
        self.deps
            .sms
            .send_otp_sms(&to_local_format(phone), code)
            .await
            .map_err(|e| ApprovalError::Transport(e.to_string()))?;
        self.deps
            .chat
            .send_challenge_notice(phone)
            .await
            .map_err(|e| ApprovalError::Transport(e.to_string()))?;
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Texts
    // -----------------------------------------------------------------------

    /// Classification priority is fixed and must not be reordered: a threaded
    /// reply is unconditionally a comment, even when the sender also has an
    /// active OTP challenge. Only context-free texts are considered as OTP
    /// input, and only while the phone has an outstanding challenge.
    async fn handle_text(
        &self,
        phone: &str,
        body: &str,
        reply_to: Option<&str>,
    ) -> Result<(), ApprovalError> {
        if body.is_empty() || phone == "+" {
            return Ok(());
        }
        info!(phone, "processing text message");

        if let Some(reply_to) = reply_to {
            return self.handle_comment(phone, body, reply_to).await;
        }

        if self.deps.correlation.active_approval(phone).is_some() {
            return self.handle_otp_entry(phone, body).await;
        }

        warn!(phone, "unhandled text message: not a reply and not awaiting OTP");
        Ok(())
    }

    async fn handle_otp_entry(&self, phone: &str, body: &str) -> Result<(), ApprovalError> {
        // Present while the phone has an outstanding challenge; checked by
        // the caller.
        let Some(approval_id) = self.deps.correlation.active_approval(phone) else {
            return Ok(());
        };

        let outcome = self.otp.validate(phone, body).await?;
        info!(phone, ?outcome, "OTP validation outcome");
        self.decisions.handle_outcome(phone, approval_id, outcome).await
    }

    /// Comment capture: resolve the approval from the reply thread and store
    /// the free-text body. Resolution failures drop the comment with a
    /// warning; there is no retry queue.
    async fn handle_comment(
        &self,
        phone: &str,
        body: &str,
        reply_to: &str,
    ) -> Result<(), ApprovalError> {
        let Some(approval_id) = self.deps.messages.resolve(reply_to) else {
            warn!(reply_to, "no approval found for comment reply thread");
            return Ok(());
        };

        match self.deps.approvals.update_comment(approval_id, body).await {
            Ok(()) => {
                self.deps.correlation.clear_comment_awaiter(phone);
                info!(%approval_id, "comment saved");
                Ok(())
            }
            Err(ApprovalError::NotFound(what)) => {
                warn!(%approval_id, what, "approval request not found for comment");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
