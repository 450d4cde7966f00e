//! OTP lifecycle: issuance, validation, expiry and retry limits.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::rngs::OsRng;
use rand::Rng;
use tracing::{info, warn};
use uuid::Uuid;

use crate::common::ApprovalError;
use crate::domains::approval::models::{ApprovalRequest, OtpChallenge, OtpStatus};
use crate::kernel::traits::OtpStore;

pub const OTP_LENGTH: usize = 6;
pub const OTP_TTL_MINUTES: i64 = 5;
pub const MAX_INVALID_ATTEMPTS: i32 = 3;

/// Outcome of a validation attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OtpOutcome {
    /// Correct code before expiry; the challenge row has been deleted.
    Valid,
    /// Wrong code; `remaining` attempts left before denial.
    InvalidRetry { remaining: i32 },
    /// Three wrong codes, or a challenge already denied.
    Denied,
    /// The code (right or wrong) arrived after the TTL.
    Expired,
    /// No live challenge for this recipient.
    NotFound,
}

pub struct OtpLifecycleManager {
    otps: Arc<dyn OtpStore>,
}

impl OtpLifecycleManager {
    pub fn new(otps: Arc<dyn OtpStore>) -> Self {
        Self { otps }
    }

    /// Generate a code of `length` digits drawn uniformly from 0-9 using the
    /// OS CSPRNG.
    pub fn generate_code(length: usize) -> String {
        let mut rng = OsRng;
        (0..length)
            .map(|_| char::from(b'0' + rng.gen_range(0..10u8)))
            .collect()
    }

    /// Issue a fresh challenge for `recipient` and return the plaintext code
    /// for transport. Uniqueness of pending challenges is not enforced at
    /// write time; a duplicate is logged and the new row wins at validation
    /// through the most-recent-first query.
    pub async fn issue(
        &self,
        recipient: &str,
        request: &ApprovalRequest,
    ) -> Result<String, ApprovalError> {
        if self.otps.latest_pending(recipient).await?.is_some() {
            warn!(
                recipient,
                approval_id = %request.id,
                "pending OTP already exists for recipient; issuing a superseding one"
            );
        }

        let code = Self::generate_code(OTP_LENGTH);
        let now = Utc::now();
        let challenge = OtpChallenge {
            id: Uuid::new_v4(),
            recipient: recipient.to_string(),
            code: code.clone(),
            decision_snapshot: request.decision,
            status: OtpStatus::Pending,
            created_at: now,
            expires_at: now + Duration::minutes(OTP_TTL_MINUTES),
            invalid_attempts: 0,
            approval_id: request.id,
        };
        self.otps.insert(&challenge).await?;
        info!(recipient, approval_id = %request.id, "issued OTP challenge");
        Ok(code)
    }

    /// Validate a presented code against the recipient's most recent live
    /// challenge. Expiry checks always precede attempt-counter mutation, so a
    /// user racing against the TTL is never penalized with a burnt attempt.
    pub async fn validate(
        &self,
        recipient: &str,
        presented: &str,
    ) -> Result<OtpOutcome, ApprovalError> {
        let now = Utc::now();

        let Some(challenge) = self.otps.latest_active(recipient).await? else {
            return Ok(OtpOutcome::NotFound);
        };

        // A denied challenge stays denied; repeated submissions never re-enter
        // the pending state.
        if challenge.status == OtpStatus::Denied {
            return Ok(OtpOutcome::Denied);
        }

        if challenge.code != presented {
            if challenge.is_expired(now) {
                // Expired before the wrong attempt: no mutation.
                return Ok(OtpOutcome::Expired);
            }

            let attempts = challenge.invalid_attempts + 1;
            self.otps.update_attempts(challenge.id, attempts).await?;

            if attempts >= MAX_INVALID_ATTEMPTS {
                self.otps
                    .update_status(challenge.id, OtpStatus::Denied)
                    .await?;
                info!(recipient, "OTP denied after too many invalid attempts");
                return Ok(OtpOutcome::Denied);
            }

            return Ok(OtpOutcome::InvalidRetry {
                remaining: MAX_INVALID_ATTEMPTS - attempts,
            });
        }

        // Correct code: valid only while unexpired and still pending.
        if !challenge.is_expired(now) && challenge.status == OtpStatus::Pending {
            self.otps.delete(challenge.id).await?;
            return Ok(OtpOutcome::Valid);
        }

        Ok(OtpOutcome::Expired)
    }

    /// Remove every challenge for a recipient. Used when outbound delivery of
    /// the challenge itself fails, so no dangling `Pending` row survives that
    /// the user can never satisfy.
    pub async fn clear(&self, recipient: &str) -> Result<(), ApprovalError> {
        self.otps.delete_for_recipient(recipient).await
    }
}
