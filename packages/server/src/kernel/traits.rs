// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic. The OTP
// lifecycle, resend cycle and decision machine are domain code that uses
// these traits, so tests can substitute deterministic in-memory fakes.

use anyhow::Result;
use async_trait::async_trait;
use uuid::Uuid;

use crate::common::ApprovalError;
use crate::domains::approval::models::{
    ApprovalRequest, Decision, OtpChallenge, OtpStatus, ResendMapping,
};

// =============================================================================
// Persistence
// =============================================================================

#[async_trait]
pub trait ApprovalStore: Send + Sync {
    async fn get(&self, id: Uuid) -> Result<ApprovalRequest, ApprovalError>;

    async fn insert(&self, request: &ApprovalRequest) -> Result<ApprovalRequest, ApprovalError>;

    /// Direct comment write; not a decision transition, no version check.
    async fn update_comment(&self, id: Uuid, comment: &str) -> Result<(), ApprovalError>;

    /// Version-checked decision write. Fails with `ApprovalError::Conflict`
    /// when `expected_version` no longer matches the persisted row.
    async fn update_decision(
        &self,
        id: Uuid,
        decision: Decision,
        expected_version: i32,
    ) -> Result<(), ApprovalError>;
}

#[async_trait]
pub trait OtpStore: Send + Sync {
    async fn insert(&self, challenge: &OtpChallenge) -> Result<(), ApprovalError>;

    /// Most recent `Pending` challenge for a recipient ("most recent wins").
    async fn latest_pending(&self, recipient: &str) -> Result<Option<OtpChallenge>, ApprovalError>;

    /// Most recent `Pending` or `Denied` challenge; `Expired` rows are
    /// retired and invisible to validation.
    async fn latest_active(&self, recipient: &str) -> Result<Option<OtpChallenge>, ApprovalError>;

    async fn update_attempts(&self, id: Uuid, attempts: i32) -> Result<(), ApprovalError>;

    async fn update_status(&self, id: Uuid, status: OtpStatus) -> Result<(), ApprovalError>;

    /// Successful validation deletes the row; `NotFound` afterwards is the
    /// (intentional) signal that the code was consumed.
    async fn delete(&self, id: Uuid) -> Result<(), ApprovalError>;

    async fn delete_for_recipient(&self, recipient: &str) -> Result<(), ApprovalError>;
}

#[async_trait]
pub trait ResendMappingStore: Send + Sync {
    async fn create(
        &self,
        approval_id: Uuid,
        recipient: &str,
    ) -> Result<ResendMapping, ApprovalError>;

    async fn get(&self, id: Uuid) -> Result<Option<ResendMapping>, ApprovalError>;
}

// =============================================================================
// Chat transport (WhatsApp template messages)
// =============================================================================

/// Outbound chat messages. Every send is best-effort, at-most-once; sends
/// that open a reply thread return the provider message id so the caller can
/// record it for thread correlation (None when the provider accepted the
/// message but returned no id).
#[async_trait]
pub trait BaseChatService: Send + Sync {
    /// Interactive approval request with Approve / Reject / Hold buttons.
    async fn send_approval_request(
        &self,
        phone: &str,
        request: &ApprovalRequest,
    ) -> Result<Option<String>>;

    /// "Your code is on its way" notice accompanying the SMS OTP.
    async fn send_challenge_notice(&self, phone: &str) -> Result<Option<String>>;

    /// Prompt after a wrong-but-not-exhausted code.
    async fn send_retry_prompt(&self, phone: &str) -> Result<Option<String>>;

    /// Offer a fresh OTP after denial; the button carries `RESEND_<approval>`.
    async fn send_resend_offer(
        &self,
        phone: &str,
        mapping_id: Uuid,
        request: &ApprovalRequest,
    ) -> Result<Option<String>>;

    /// Ask for the follow-up comment after a reject / hold decision.
    async fn send_comment_request(
        &self,
        phone: &str,
        request: &ApprovalRequest,
    ) -> Result<Option<String>>;

    /// Mark an inbound message as read. Failures are logged, never fatal.
    async fn mark_message_read(&self, phone_number_id: &str, message_id: &str) -> Result<()>;
}

// =============================================================================
// SMS fallback transport
// =============================================================================

#[async_trait]
pub trait BaseSmsService: Send + Sync {
    /// Deliver the OTP code. `local_number` is already reformatted to the
    /// gateway's local dialing convention.
    async fn send_otp_sms(&self, local_number: &str, code: &str) -> Result<()>;
}

// =============================================================================
// Message correlation store
// =============================================================================

/// provider message id → approval id, used to resolve reply-threaded events.
pub trait MessageCorrelation: Send + Sync {
    fn record(&self, message_id: &str, approval_id: Uuid);
    fn resolve(&self, message_id: &str) -> Option<Uuid>;
}
