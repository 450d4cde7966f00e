use thiserror::Error;
use uuid::Uuid;

/// Error taxonomy for the approval flow.
///
/// `NotFound` is always non-fatal: the router logs it and aborts the flow
/// silently from the user's perspective. `Conflict` surfaces only after the
/// single optimistic retry. `Transport` triggers compensating cleanup of
/// just-created state (e.g. clearing a freshly issued OTP).
#[derive(Error, Debug)]
pub enum ApprovalError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("version conflict updating approval {0}")]
    Conflict(Uuid),

    #[error("outbound transport failure: {0}")]
    Transport(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}
