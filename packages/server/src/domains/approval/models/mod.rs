pub mod approval_request;
pub mod otp_challenge;
pub mod resend_mapping;

pub use approval_request::{ApprovalRequest, Decision};
pub use otp_challenge::{OtpChallenge, OtpStatus};
pub use resend_mapping::ResendMapping;
