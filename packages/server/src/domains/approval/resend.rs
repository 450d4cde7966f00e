//! Resend cycle: retire a stale OTP and issue a replacement without losing
//! the pending action.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::common::phone::to_local_format;
use crate::common::ApprovalError;
use crate::domains::approval::correlation::CorrelationRegistry;
use crate::domains::approval::models::OtpStatus;
use crate::domains::approval::otp::OtpLifecycleManager;
use crate::kernel::traits::{ApprovalStore, BaseSmsService, OtpStore, ResendMappingStore};

pub struct ResendCycleManager {
    approvals: Arc<dyn ApprovalStore>,
    otps: Arc<dyn OtpStore>,
    resend_mappings: Arc<dyn ResendMappingStore>,
    sms: Arc<dyn BaseSmsService>,
    correlation: Arc<CorrelationRegistry>,
    otp_manager: OtpLifecycleManager,
}

impl ResendCycleManager {
    pub fn new(
        approvals: Arc<dyn ApprovalStore>,
        otps: Arc<dyn OtpStore>,
        resend_mappings: Arc<dyn ResendMappingStore>,
        sms: Arc<dyn BaseSmsService>,
        correlation: Arc<CorrelationRegistry>,
    ) -> Self {
        let otp_manager = OtpLifecycleManager::new(otps.clone());
        Self {
            approvals,
            otps,
            resend_mappings,
            sms,
            correlation,
            otp_manager,
        }
    }

    /// Handle a `RESEND_<approval>` button tap: expire the current live
    /// challenge (explicit supersession, never a silent overwrite),
    /// re-establish correlation, keep the cached action, and deliver a brand
    /// new code. The stale challenge is usually `Denied` since the resend
    /// offer follows attempt exhaustion, but a still-`Pending` one is
    /// superseded the same way.
    pub async fn handle_resend(&self, phone: &str, approval_id: Uuid) -> Result<(), ApprovalError> {
        let Some(stale) = self.otps.latest_active(phone).await? else {
            warn!(phone, %approval_id, "no live challenge to resend");
            return Ok(());
        };

        self.otps
            .update_status(stale.id, OtpStatus::Expired)
            .await?;
        info!(phone, challenge_id = %stale.id, "expired stale OTP for resend");

        self.correlation.begin_challenge(phone, approval_id);
        // The action cached when the original button was tapped still commits
        // the eventual decision; re-write it idempotently.
        self.correlation.preserve_action(approval_id);

        let request = self.approvals.get(stale.approval_id).await?;
        let code = self.otp_manager.issue(phone, &request).await?;

        if let Err(e) = self.sms.send_otp_sms(&to_local_format(phone), &code).await {
            warn!(phone, error = %e, "failed to deliver resent OTP, clearing challenge");
            self.otp_manager.clear(phone).await?;
            self.correlation.end_challenge(phone);
            return Err(ApprovalError::Transport(e.to_string()));
        }

        let mapping = self.resend_mappings.create(approval_id, phone).await?;
        info!(phone, %approval_id, mapping_id = %mapping.id, "resent OTP");
        Ok(())
    }
}
