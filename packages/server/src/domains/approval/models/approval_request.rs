use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

/// Decision state of an approval request.
///
/// `Created → Pending → {Approved, Rejected, OnHold}`; the last three are
/// terminal. `Pending` is entered once the challenge message has been
/// dispatched to at least one approver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "text", rename_all = "snake_case")]
pub enum Decision {
    Created,
    Pending,
    Approved,
    Rejected,
    OnHold,
}

impl Decision {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Decision::Approved | Decision::Rejected | Decision::OnHold)
    }
}

/// Approval request model - SQL persistence layer
///
/// The `version` column is the optimistic-conflict counter guarding the
/// decision write. Rows are never deleted by this service.
#[derive(sqlx::FromRow, Debug, Clone)]
pub struct ApprovalRequest {
    pub id: Uuid,
    pub object_type: String,
    pub object_id: String,
    pub object_label: String,
    pub origin: String,
    pub requester: String,
    pub data: Option<String>,
    pub approvers: Vec<String>,
    pub comment: Option<String>,
    pub callback_url: Option<String>,
    pub metadata: Option<String>,
    pub decision: Decision,
    pub requested_at: DateTime<Utc>,
    pub last_reminder_at: Option<DateTime<Utc>>,
    pub reminder_count: i32,
    pub version: i32,
}

impl ApprovalRequest {
    /// Find approval request by ID
    pub async fn find_by_id(id: Uuid, pool: &PgPool) -> Result<Option<Self>, sqlx::Error> {
        sqlx::query_as::<_, Self>("SELECT * FROM approval_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Insert new approval request
    pub async fn insert(&self, pool: &PgPool) -> Result<Self, sqlx::Error> {
        sqlx::query_as::<_, Self>(
            "INSERT INTO approval_requests (
                id,
                object_type,
                object_id,
                object_label,
                origin,
                requester,
                data,
                approvers,
                comment,
                callback_url,
                metadata,
                decision,
                requested_at,
                reminder_count,
                version
             )
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
             RETURNING *",
        )
        .bind(self.id)
        .bind(&self.object_type)
        .bind(&self.object_id)
        .bind(&self.object_label)
        .bind(&self.origin)
        .bind(&self.requester)
        .bind(&self.data)
        .bind(&self.approvers)
        .bind(&self.comment)
        .bind(&self.callback_url)
        .bind(&self.metadata)
        .bind(self.decision)
        .bind(self.requested_at)
        .bind(self.reminder_count)
        .bind(self.version)
        .fetch_one(pool)
        .await
    }

    /// Write the follow-up comment. A direct persistence update, not a
    /// decision transition, so no version check.
    pub async fn update_comment(id: Uuid, comment: &str, pool: &PgPool) -> Result<u64, sqlx::Error> {
        let result = sqlx::query("UPDATE approval_requests SET comment = $2 WHERE id = $1")
            .bind(id)
            .bind(comment)
            .execute(pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// Version-checked decision write. Returns the number of affected rows;
    /// zero means the expected version no longer matches (optimistic conflict).
    pub async fn update_decision(
        id: Uuid,
        decision: Decision,
        expected_version: i32,
        pool: &PgPool,
    ) -> Result<u64, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE approval_requests
             SET decision = $2, version = version + 1
             WHERE id = $1 AND version = $3",
        )
        .bind(id)
        .bind(decision)
        .bind(expected_version)
        .execute(pool)
        .await?;
        Ok(result.rows_affected())
    }
}
