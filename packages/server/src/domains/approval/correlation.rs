//! Process-local correlation state.
//!
//! Three concurrent maps link transport-level identifiers (phone numbers,
//! provider message ids) to in-flight approvals. Entries are removed by
//! whichever operation consumes them; there is no TTL sweep, so an approval
//! abandoned mid-challenge leaks its entry until process restart. That is an
//! accepted limitation: OTPs expire in minutes and none of this state needs
//! to survive a restart.

use std::collections::HashMap;
use std::sync::RwLock;

use uuid::Uuid;

use crate::domains::approval::events::ApprovalAction;
use crate::kernel::traits::MessageCorrelation;

/// What kind of follow-up comment a phone number owes after its decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommentState {
    AwaitingRejectionComment,
    AwaitingHoldComment,
}

/// Ephemeral key→value maps for the OTP/decision flow. Shared via `Arc` so
/// tests can inspect and seed state deterministically.
#[derive(Debug, Default)]
pub struct CorrelationRegistry {
    /// phone → approval id, present exactly while that phone has an
    /// unresolved OTP challenge outstanding.
    otp_approvals: RwLock<HashMap<String, Uuid>>,
    /// approval id → the action the OTP, once validated, will commit.
    action_cache: RwLock<HashMap<Uuid, ApprovalAction>>,
    /// phone → awaited-comment tag.
    comment_awaiters: RwLock<HashMap<String, CommentState>>,
}

impl CorrelationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // --- otp_approvals -----------------------------------------------------

    pub fn begin_challenge(&self, phone: &str, approval_id: Uuid) {
        self.otp_approvals
            .write()
            .expect("otp_approvals lock poisoned")
            .insert(phone.to_string(), approval_id);
    }

    pub fn active_approval(&self, phone: &str) -> Option<Uuid> {
        self.otp_approvals
            .read()
            .expect("otp_approvals lock poisoned")
            .get(phone)
            .copied()
    }

    pub fn end_challenge(&self, phone: &str) -> Option<Uuid> {
        self.otp_approvals
            .write()
            .expect("otp_approvals lock poisoned")
            .remove(phone)
    }

    // --- action_cache ------------------------------------------------------

    pub fn cache_action(&self, approval_id: Uuid, action: ApprovalAction) {
        self.action_cache
            .write()
            .expect("action_cache lock poisoned")
            .insert(approval_id, action);
    }

    pub fn cached_action(&self, approval_id: Uuid) -> Option<ApprovalAction> {
        self.action_cache
            .read()
            .expect("action_cache lock poisoned")
            .get(&approval_id)
            .copied()
    }

    /// Idempotent re-write used by the resend cycle: re-inserts the existing
    /// cached action under the write lock so a concurrently-read value is
    /// never lost, and a missing entry stays missing.
    pub fn preserve_action(&self, approval_id: Uuid) {
        let mut cache = self
            .action_cache
            .write()
            .expect("action_cache lock poisoned");
        if let Some(action) = cache.get(&approval_id).copied() {
            cache.insert(approval_id, action);
        }
    }

    pub fn remove_action(&self, approval_id: Uuid) -> Option<ApprovalAction> {
        self.action_cache
            .write()
            .expect("action_cache lock poisoned")
            .remove(&approval_id)
    }

    // --- comment_awaiters --------------------------------------------------

    pub fn await_comment(&self, phone: &str, state: CommentState) {
        self.comment_awaiters
            .write()
            .expect("comment_awaiters lock poisoned")
            .insert(phone.to_string(), state);
    }

    pub fn comment_state(&self, phone: &str) -> Option<CommentState> {
        self.comment_awaiters
            .read()
            .expect("comment_awaiters lock poisoned")
            .get(phone)
            .copied()
    }

    pub fn clear_comment_awaiter(&self, phone: &str) -> Option<CommentState> {
        self.comment_awaiters
            .write()
            .expect("comment_awaiters lock poisoned")
            .remove(phone)
    }
}

/// In-memory provider-message-id → approval-id store. Same lifetime rules as
/// the registry maps: lost on restart, no sweep.
#[derive(Debug, Default)]
pub struct InMemoryMessageCorrelation {
    mappings: RwLock<HashMap<String, Uuid>>,
}

impl InMemoryMessageCorrelation {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MessageCorrelation for InMemoryMessageCorrelation {
    fn record(&self, message_id: &str, approval_id: Uuid) {
        self.mappings
            .write()
            .expect("message mappings lock poisoned")
            .insert(message_id.to_string(), approval_id);
    }

    fn resolve(&self, message_id: &str) -> Option<Uuid> {
        self.mappings
            .read()
            .expect("message mappings lock poisoned")
            .get(message_id)
            .copied()
    }
}
