//! Postgres implementations of the persistence traits, delegating to the
//! model-level queries.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::common::ApprovalError;
use crate::domains::approval::models::{
    ApprovalRequest, Decision, OtpChallenge, OtpStatus, ResendMapping,
};
use crate::kernel::traits::{ApprovalStore, OtpStore, ResendMappingStore};

/// How long a resend offer stays bindable to its (approval, phone) pair.
pub const RESEND_MAPPING_TTL_MINUTES: i64 = 10;

pub struct PgApprovalStore {
    pool: PgPool,
}

impl PgApprovalStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ApprovalStore for PgApprovalStore {
    async fn get(&self, id: Uuid) -> Result<ApprovalRequest, ApprovalError> {
        ApprovalRequest::find_by_id(id, &self.pool)
            .await?
            .ok_or_else(|| ApprovalError::NotFound(format!("approval request {}", id)))
    }

    async fn insert(&self, request: &ApprovalRequest) -> Result<ApprovalRequest, ApprovalError> {
        Ok(request.insert(&self.pool).await?)
    }

    async fn update_comment(&self, id: Uuid, comment: &str) -> Result<(), ApprovalError> {
        let affected = ApprovalRequest::update_comment(id, comment, &self.pool).await?;
        if affected == 0 {
            return Err(ApprovalError::NotFound(format!("approval request {}", id)));
        }
        Ok(())
    }

    async fn update_decision(
        &self,
        id: Uuid,
        decision: Decision,
        expected_version: i32,
    ) -> Result<(), ApprovalError> {
        let affected =
            ApprovalRequest::update_decision(id, decision, expected_version, &self.pool).await?;
        if affected == 0 {
            return Err(ApprovalError::Conflict(id));
        }
        Ok(())
    }
}

pub struct PgOtpStore {
    pool: PgPool,
}

impl PgOtpStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OtpStore for PgOtpStore {
    async fn insert(&self, challenge: &OtpChallenge) -> Result<(), ApprovalError> {
        challenge.insert(&self.pool).await?;
        Ok(())
    }

    async fn latest_pending(&self, recipient: &str) -> Result<Option<OtpChallenge>, ApprovalError> {
        Ok(OtpChallenge::latest_pending(recipient, &self.pool).await?)
    }

    async fn latest_active(&self, recipient: &str) -> Result<Option<OtpChallenge>, ApprovalError> {
        Ok(OtpChallenge::latest_active(recipient, &self.pool).await?)
    }

    async fn update_attempts(&self, id: Uuid, attempts: i32) -> Result<(), ApprovalError> {
        Ok(OtpChallenge::update_attempts(id, attempts, &self.pool).await?)
    }

    async fn update_status(&self, id: Uuid, status: OtpStatus) -> Result<(), ApprovalError> {
        Ok(OtpChallenge::update_status(id, status, &self.pool).await?)
    }

    async fn delete(&self, id: Uuid) -> Result<(), ApprovalError> {
        Ok(OtpChallenge::delete(id, &self.pool).await?)
    }

    async fn delete_for_recipient(&self, recipient: &str) -> Result<(), ApprovalError> {
        Ok(OtpChallenge::delete_for_recipient(recipient, &self.pool).await?)
    }
}

pub struct PgResendMappingStore {
    pool: PgPool,
}

impl PgResendMappingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResendMappingStore for PgResendMappingStore {
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
        Ok(mapping.insert(&self.pool).await?)
    }

    async fn get(&self, id: Uuid) -> Result<Option<ResendMapping>, ApprovalError> {
        Ok(ResendMapping::find_by_id(id, &self.pool).await?)
    }
}
