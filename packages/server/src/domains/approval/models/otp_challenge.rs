use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::approval_request::Decision;

/// Status of an issued OTP challenge.
///
/// Successful validation is represented by row deletion, not a status value;
/// a challenge that no longer exists answers `NotFound` on validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum OtpStatus {
    Pending,
    Denied,
    Expired,
}

/// OTP challenge model - SQL persistence layer
///
/// At most one `Pending` challenge per recipient is the intended design, but
/// uniqueness is not enforced at write time; "most recent wins" is pinned by
/// the `latest_*` queries ordering on `created_at DESC`.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct OtpChallenge {
    pub id: Uuid,
    pub recipient: String,
    pub code: String,
    pub decision_snapshot: Decision,
    pub status: OtpStatus,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub invalid_attempts: i32,
    pub approval_id: Uuid,
}

impl OtpChallenge {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Insert new challenge
    pub async fn insert(&self, pool: &PgPool) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO otp_challenges (
                id,
                recipient,
                code,
                decision_snapshot,
                status,
                created_at,
                expires_at,
                invalid_attempts,
                approval_id
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             RETURNING *",
        )
        .bind(self.id)
        .bind(&self.recipient)
        .bind(&self.code)
        .bind(self.decision_snapshot)
        .bind(self.status)
        .bind(self.created_at)
        .bind(self.expires_at)
        .bind(self.invalid_attempts)
        .bind(self.approval_id)
        .fetch_one(pool)
        .await
    }

    /// Most recent `Pending` challenge for a recipient
    pub async fn latest_pending(
        recipient: &str,
        pool: &PgPool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM otp_challenges
             WHERE recipient = $1 AND status = 'pending'
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(recipient)
        .fetch_optional(pool)
        .await
    }

    /// Most recent live challenge for a recipient: `Pending` or `Denied`.
    /// `Expired` rows are retired and never considered by validation.
    pub async fn latest_active(
        recipient: &str,
        pool: &PgPool,
    ) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "SELECT * FROM otp_challenges
             WHERE recipient = $1 AND status IN ('pending', 'denied')
             ORDER BY created_at DESC
             LIMIT 1",
        )
        .bind(recipient)
        .fetch_optional(pool)
        .await
    }

    /// Persist the invalid-attempt counter
    pub async fn update_attempts(id: Uuid, attempts: i32, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE otp_challenges SET invalid_attempts = $2 WHERE id = $1")
            .bind(id)
            .bind(attempts)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Transition the status (Denied on exhaustion, Expired on resend supersession)
    pub async fn update_status(id: Uuid, status: OtpStatus, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE otp_challenges SET status = $2 WHERE id = $1")
            .bind(id)
            .bind(status)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Delete a single challenge (successful validation)
    pub async fn delete(id: Uuid, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM otp_challenges WHERE id = $1")
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Delete every challenge for a recipient (delivery-failure compensation)
    pub async fn delete_for_recipient(recipient: &str, pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM otp_challenges WHERE recipient = $1")
            .bind(recipient)
            .execute(pool)
            .await?;
        Ok(())
    }
}
