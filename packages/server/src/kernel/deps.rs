//! Server dependencies for the approval flow (using traits for testability)
//!
//! Central dependency container handed to the router and the domain
//! managers. All external services sit behind trait abstractions so tests
//! can run the full flow over in-memory fakes.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use bulksms::BulkSmsService;
use uuid::Uuid;
use whatsapp::{ApprovalSummary, WhatsAppService};

use crate::domains::approval::correlation::CorrelationRegistry;
use crate::domains::approval::models::ApprovalRequest;
use crate::kernel::traits::{
    ApprovalStore, BaseChatService, BaseSmsService, MessageCorrelation, OtpStore,
    ResendMappingStore,
};

// =============================================================================
// WhatsAppService Adapter (implements BaseChatService trait)
// =============================================================================

/// Wrapper around WhatsAppService that implements the BaseChatService trait
pub struct WhatsAppAdapter(pub Arc<WhatsAppService>);

impl WhatsAppAdapter {
    pub fn new(service: Arc<WhatsAppService>) -> Self {
        Self(service)
    }
}

#[async_trait]
impl BaseChatService for WhatsAppAdapter {
    async fn send_approval_request(
        &self,
        phone: &str,
        request: &ApprovalRequest,
    ) -> Result<Option<String>> {
        let summary = ApprovalSummary {
            approval_id: &request.id.to_string(),
            origin: &request.origin,
            requester: &request.requester,
            object_type: &request.object_type,
            object_id: &request.object_id,
            object_label: &request.object_label,
        };
        let response = self
            .0
            .send_approval_request(phone, &summary)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(response.message_id().map(str::to_string))
    }

    async fn send_challenge_notice(&self, phone: &str) -> Result<Option<String>> {
        let response = self
            .0
            .send_otp_notice(phone)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(response.message_id().map(str::to_string))
    }

    async fn send_retry_prompt(&self, phone: &str) -> Result<Option<String>> {
        let response = self
            .0
            .send_retry_prompt(phone)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(response.message_id().map(str::to_string))
    }

    async fn send_resend_offer(
        &self,
        phone: &str,
        _mapping_id: Uuid,
        request: &ApprovalRequest,
    ) -> Result<Option<String>> {
        let payload = format!("RESEND_{}", request.id);
        let response = self
            .0
            .send_resend_offer(phone, &payload)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(response.message_id().map(str::to_string))
    }

    async fn send_comment_request(
        &self,
        phone: &str,
        request: &ApprovalRequest,
    ) -> Result<Option<String>> {
        let response = self
            .0
            .send_comment_request(phone, &request.object_id)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))?;
        Ok(response.message_id().map(str::to_string))
    }

    // The configured endpoint is already bound to one business number, so
    // the webhook's phone_number_id is accepted only as a cross-check input.
    async fn mark_message_read(&self, _phone_number_id: &str, message_id: &str) -> Result<()> {
        self.0
            .mark_message_read(message_id)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))
    }
}

// =============================================================================
// BulkSmsService Adapter (implements BaseSmsService trait)
// =============================================================================

/// Wrapper around BulkSmsService that implements the BaseSmsService trait
pub struct BulkSmsAdapter(pub Arc<BulkSmsService>);

impl BulkSmsAdapter {
    pub fn new(service: Arc<BulkSmsService>) -> Self {
        Self(service)
    }
}

#[async_trait]
impl BaseSmsService for BulkSmsAdapter {
    async fn send_otp_sms(&self, local_number: &str, code: &str) -> Result<()> {
        let message = format!("Your OTP code is: {}", code);
        self.0
            .send_sms(local_number, &message)
            .await
            .map_err(|e| anyhow::anyhow!("{}", e))
    }
}

// =============================================================================
// ServerDeps
// =============================================================================

/// Dependencies accessible to the router and domain managers
#[derive(Clone)]
pub struct ServerDeps {
    pub approvals: Arc<dyn ApprovalStore>,
    pub otps: Arc<dyn OtpStore>,
    pub resend_mappings: Arc<dyn ResendMappingStore>,
    pub chat: Arc<dyn BaseChatService>,
    pub sms: Arc<dyn BaseSmsService>,
    pub messages: Arc<dyn MessageCorrelation>,
    /// In-process correlation maps for the OTP/decision flow
    pub correlation: Arc<CorrelationRegistry>,
}

impl ServerDeps {
    pub fn new(
        approvals: Arc<dyn ApprovalStore>,
        otps: Arc<dyn OtpStore>,
        resend_mappings: Arc<dyn ResendMappingStore>,
        chat: Arc<dyn BaseChatService>,
        sms: Arc<dyn BaseSmsService>,
        messages: Arc<dyn MessageCorrelation>,
        correlation: Arc<CorrelationRegistry>,
    ) -> Self {
        Self {
            approvals,
            otps,
            resend_mappings,
            chat,
            sms,
            messages,
            correlation,
        }
    }
}
