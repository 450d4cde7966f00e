use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Binds a resend offer back to its (approval, phone) pair without
/// re-exposing the OTP itself. Not garbage-collected here; an external TTL
/// sweep is assumed.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ResendMapping {
    pub id: Uuid,
    pub approval_id: Uuid,
    pub recipient: String,
    pub expires_at: DateTime<Utc>,
}

impl ResendMapping {
    /// Insert new mapping
    pub async fn insert(&self, pool: &PgPool) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO resend_mappings (id, approval_id, recipient, expires_at)
             VALUES ($1, $2, $3, $4)
             RETURNING *",
        )
        .bind(self.id)
        .bind(self.approval_id)
        .bind(&self.recipient)
        .bind(self.expires_at)
        .fetch_one(pool)
        .await
    }

    /// Find mapping by ID
    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM resend_mappings WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }
}
