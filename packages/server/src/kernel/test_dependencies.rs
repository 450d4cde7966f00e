// Test dependencies - in-memory fakes and spies for the kernel traits
//
// Deterministic substitutes for the Postgres stores and the chat/SMS
// transports, so domain logic and webhook flows can be exercised without a
// database or network. Also used by the integration tests under tests/.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::common::ApprovalError;
use crate::domains::approval::models::{
    ApprovalRequest, Decision, OtpChallenge, OtpStatus, ResendMapping,
};
use crate::kernel::stores::RESEND_MAPPING_TTL_MINUTES;
use crate::kernel::traits::{
    ApprovalStore, BaseChatService, BaseSmsService, OtpStore, ResendMappingStore,
};

/// A pending approval request with one approver, ready to seed into a store.
pub fn approval_fixture() -> ApprovalRequest {
    ApprovalRequest {
        id: Uuid::new_v4(),
        object_type: "invoice".to_string(),
        object_id: "INV-2024-0042".to_string(),
        object_label: "Invoice INV-2024-0042".to_string(),
        origin: "erp".to_string(),
        requester: "finance-bot".to_string(),
        data: None,
        approvers: vec!["+212600000000".to_string()],
        comment: None,
        callback_url: None,
        metadata: None,
        decision: Decision::Pending,
        requested_at: Utc::now(),
        last_reminder_at: None,
        reminder_count: 0,
        version: 0,
    }
}

// =============================================================================
// In-memory approval store
// =============================================================================

pub struct InMemoryApprovalStore {
    rows: Mutex<HashMap<Uuid, ApprovalRequest>>,
    /// Remaining number of decision writes to fail with `Conflict`.
    forced_conflicts: Mutex<u32>,
}

impl InMemoryApprovalStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(HashMap::new()),
            forced_conflicts: Mutex::new(0),
        }
    }

    /// Insert a row directly and hand it back for assertions.
    pub async fn seed(&self, request: ApprovalRequest) -> ApprovalRequest {
        self.rows
            .lock()
            .unwrap()
            .insert(request.id, request.clone());
        request
    }

    /// Make the next `n` decision writes fail with an optimistic conflict.
    pub fn force_conflicts(&self, n: u32) {
        *self.forced_conflicts.lock().unwrap() = n;
    }
}

#[async_trait]
impl ApprovalStore for InMemoryApprovalStore {
    async fn get(&self, id: Uuid) -> Result<ApprovalRequest, ApprovalError> {
        self.rows
            .lock()
            .unwrap()
            .get(&id)
            .cloned()
            .ok_or_else(|| ApprovalError::NotFound(format!("approval request {id}")))
    }

    async fn insert(&self, request: &ApprovalRequest) -> Result<ApprovalRequest, ApprovalError> {
        self.rows
            .lock()
            .unwrap()
            .insert(request.id, request.clone());
        Ok(request.clone())
    }

    async fn update_comment(&self, id: Uuid, comment: &str) -> Result<(), ApprovalError> {
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| ApprovalError::NotFound(format!("approval request {id}")))?;
        row.comment = Some(comment.to_string());
        Ok(())
    }

    async fn update_decision(
        &self,
        id: Uuid,
        decision: Decision,
        expected_version: i32,
    ) -> Result<(), ApprovalError> {
        {
            let mut forced = self.forced_conflicts.lock().unwrap();
            if *forced > 0 {
                *forced -= 1;
                return Err(ApprovalError::Conflict(id));
            }
        }
        let mut rows = self.rows.lock().unwrap();
        let row = rows
            .get_mut(&id)
            .ok_or_else(|| ApprovalError::NotFound(format!("approval request {id}")))?;
        if row.version != expected_version {
            return Err(ApprovalError::Conflict(id));
        }
        row.decision = decision;
        row.version += 1;
        Ok(())
    }
}

// =============================================================================
// In-memory OTP store
// =============================================================================

/// Insertion-ordered challenge store; `latest_*` picks the last matching row
/// so "most recent wins" holds even when two rows share a timestamp.
pub struct InMemoryOtpStore {
    rows: Mutex<Vec<OtpChallenge>>,
}

impl InMemoryOtpStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }

    pub fn challenges_for(&self, recipient: &str) -> Vec<OtpChallenge> {
        self.rows
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.recipient == recipient)
            .cloned()
            .collect()
    }

    /// Push every challenge for `recipient` past its TTL.
    pub fn expire_all(&self, recipient: &str) {
        let cutoff = Utc::now() - Duration::minutes(1);
        for c in self.rows.lock().unwrap().iter_mut() {
            if c.recipient == recipient {
                c.expires_at = cutoff;
            }
        }
    }
}

#[async_trait]
impl OtpStore for InMemoryOtpStore {
    async fn insert(&self, challenge: &OtpChallenge) -> Result<(), ApprovalError> {
        self.rows.lock().unwrap().push(challenge.clone());
        Ok(())
    }

    async fn latest_pending(&self, recipient: &str) -> Result<Option<OtpChallenge>, ApprovalError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| c.recipient == recipient && c.status == OtpStatus::Pending)
            .cloned())
    }

    async fn latest_active(&self, recipient: &str) -> Result<Option<OtpChallenge>, ApprovalError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|c| {
                c.recipient == recipient
                    && matches!(c.status, OtpStatus::Pending | OtpStatus::Denied)
            })
            .cloned())
    }

    async fn update_attempts(&self, id: Uuid, attempts: i32) -> Result<(), ApprovalError> {
        for c in self.rows.lock().unwrap().iter_mut() {
            if c.id == id {
                c.invalid_attempts = attempts;
            }
        }
        Ok(())
    }

    async fn update_status(&self, id: Uuid, status: OtpStatus) -> Result<(), ApprovalError> {
        for c in self.rows.lock().unwrap().iter_mut() {
            if c.id == id {
                c.status = status;
            }
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), ApprovalError> {
        self.rows.lock().unwrap().retain(|c| c.id != id);
        Ok(())
    }

    async fn delete_for_recipient(&self, recipient: &str) -> Result<(), ApprovalError> {
        self.rows.lock().unwrap().retain(|c| c.recipient != recipient);
        Ok(())
    }
}

// =============================================================================
// In-memory resend mapping store
// =============================================================================

pub struct InMemoryResendMappingStore {
    rows: Mutex<Vec<ResendMapping>>,
}

impl InMemoryResendMappingStore {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
        }
    }

    pub fn count(&self) -> usize {
        self.rows.lock().unwrap().len()
    }
}

#[async_trait]
impl ResendMappingStore for InMemoryResendMappingStore {
    async fn create(
        &self,
        approval_id: Uuid,
        recipient: &str,
    ) -> Result<ResendMapping, ApprovalError> {
        let mapping = ResendMapping {
            id: Uuid::new_v4(),
            approval_id,
            recipient: recipient.to_string(),
            expires_at: Utc::now() + Duration::minutes(RESEND_MAPPING_TTL_MINUTES),
        };
        self.rows.lock().unwrap().push(mapping.clone());
        Ok(mapping)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ResendMapping>, ApprovalError> {
        Ok(self
            .rows
            .lock()
            .unwrap()
            .iter()
            .find(|m| m.id == id)
            .cloned())
    }
}

// =============================================================================
// Spy chat service
// =============================================================================

/// One recorded outbound chat call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatCall {
    ApprovalRequest { phone: String },
    ChallengeNotice { phone: String },
    RetryPrompt { phone: String },
    ResendOffer { phone: String, mapping_id: Uuid },
    CommentRequest { phone: String },
    MarkRead { message_id: String },
}

/// Records every send and answers with synthetic provider message ids
/// (`wamid.out-0`, `wamid.out-1`, ...) so thread correlation can be asserted.
pub struct SpyChatService {
    calls: Arc<Mutex<Vec<ChatCall>>>,
    next_message_id: AtomicUsize,
    fail_next: AtomicBool,
}

impl SpyChatService {
    pub fn new() -> Self {
        Self {
            calls: Arc::new(Mutex::new(Vec::new())),
            next_message_id: AtomicUsize::new(0),
            fail_next: AtomicBool::new(false),
        }
    }

    /// Make the next send (any kind) fail.
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// All recorded calls, read receipts included.
    pub fn calls(&self) -> Vec<ChatCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn approval_requests(&self) -> Vec<String> {
        self.phones(|c| match c {
            ChatCall::ApprovalRequest { phone } => Some(phone.clone()),
            _ => None,
        })
    }

    pub fn challenge_notices(&self) -> Vec<String> {
        self.phones(|c| match c {
            ChatCall::ChallengeNotice { phone } => Some(phone.clone()),
            _ => None,
        })
    }

    pub fn retry_prompts(&self) -> Vec<String> {
        self.phones(|c| match c {
            ChatCall::RetryPrompt { phone } => Some(phone.clone()),
            _ => None,
        })
    }

    pub fn resend_offers(&self) -> Vec<String> {
        self.phones(|c| match c {
            ChatCall::ResendOffer { phone, .. } => Some(phone.clone()),
            _ => None,
        })
    }

    pub fn comment_requests(&self) -> Vec<String> {
        self.phones(|c| match c {
            ChatCall::CommentRequest { phone } => Some(phone.clone()),
            _ => None,
        })
    }

    fn phones(&self, pick: impl Fn(&ChatCall) -> Option<String>) -> Vec<String> {
        self.calls.lock().unwrap().iter().filter_map(pick).collect()
    }

    fn record(&self, call: ChatCall) -> Result<Option<String>> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("chat provider unavailable"));
        }
        self.calls.lock().unwrap().push(call);
        let n = self.next_message_id.fetch_add(1, Ordering::SeqCst);
        Ok(Some(format!("wamid.out-{n}")))
    }
}

#[async_trait]
impl BaseChatService for SpyChatService {
    async fn send_approval_request(
        &self,
        phone: &str,
        _request: &ApprovalRequest,
    ) -> Result<Option<String>> {
        self.record(ChatCall::ApprovalRequest {
            phone: phone.to_string(),
        })
    }

    async fn send_challenge_notice(&self, phone: &str) -> Result<Option<String>> {
        self.record(ChatCall::ChallengeNotice {
            phone: phone.to_string(),
        })
    }

    async fn send_retry_prompt(&self, phone: &str) -> Result<Option<String>> {
        self.record(ChatCall::RetryPrompt {
            phone: phone.to_string(),
        })
    }

    async fn send_resend_offer(
        &self,
        phone: &str,
        mapping_id: Uuid,
        _request: &ApprovalRequest,
    ) -> Result<Option<String>> {
        self.record(ChatCall::ResendOffer {
            phone: phone.to_string(),
            mapping_id,
        })
    }

    async fn send_comment_request(
        &self,
        phone: &str,
        _request: &ApprovalRequest,
    ) -> Result<Option<String>> {
        self.record(ChatCall::CommentRequest {
            phone: phone.to_string(),
        })
    }

    async fn mark_message_read(&self, _phone_number_id: &str, message_id: &str) -> Result<()> {
        self.calls.lock().unwrap().push(ChatCall::MarkRead {
            message_id: message_id.to_string(),
        });
        Ok(())
    }
}

// =============================================================================
// Spy SMS service
// =============================================================================

pub struct SpySmsService {
    sent: Arc<Mutex<Vec<(String, String)>>>,
    fail_next: AtomicBool,
}

impl SpySmsService {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
            fail_next: AtomicBool::new(false),
        }
    }

    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// `(local_number, code)` pairs in send order.
    pub fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseSmsService for SpySmsService {
    async fn send_otp_sms(&self, local_number: &str, code: &str) -> Result<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(anyhow!("sms gateway unavailable"));
        }
        self.sent
            .lock()
            .unwrap()
            .push((local_number.to_string(), code.to_string()));
        Ok(())
    }
}
