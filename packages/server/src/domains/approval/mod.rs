// Approval domain: OTP lifecycle, correlation, decision state machine and
// the webhook event router that ties them together.

pub mod correlation;
pub mod decision;
pub mod dispatch;
pub mod events;
pub mod models;
pub mod otp;
pub mod resend;
pub mod router;

pub use correlation::{CommentState, CorrelationRegistry, InMemoryMessageCorrelation};
pub use decision::DecisionStateMachine;
pub use dispatch::{ApprovalDispatcher, SubmitApprovalRequest};
pub use events::{ApprovalAction, InboundEvent, WebhookPayload};
pub use otp::{OtpLifecycleManager, OtpOutcome};
pub use resend::ResendCycleManager;
pub use router::WebhookEventRouter;
