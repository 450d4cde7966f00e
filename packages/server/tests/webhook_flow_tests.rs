//! End-to-end webhook flows: button tap → OTP → decision, exercised through
//! the event router with in-memory stores and spy transports.

use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use approval_core::domains::approval::models::{Decision, OtpStatus};
use approval_core::domains::approval::{
    ApprovalDispatcher, CorrelationRegistry, InMemoryMessageCorrelation, SubmitApprovalRequest,
    WebhookEventRouter, WebhookPayload,
};
use approval_core::kernel::test_dependencies::{
    InMemoryApprovalStore, InMemoryOtpStore, InMemoryResendMappingStore, SpyChatService,
    SpySmsService,
};
use approval_core::kernel::{ApprovalStore, MessageCorrelation, ServerDeps};

const PHONE: &str = "+212600000000";
const WIRE_PHONE: &str = "212600000000";

// ============================================================================
// Test Helpers
// ============================================================================

struct Harness {
    router: WebhookEventRouter,
    dispatcher: ApprovalDispatcher,
    approvals: Arc<InMemoryApprovalStore>,
    otps: Arc<InMemoryOtpStore>,
    resend_mappings: Arc<InMemoryResendMappingStore>,
    chat: Arc<SpyChatService>,
    sms: Arc<SpySmsService>,
    messages: Arc<InMemoryMessageCorrelation>,
    correlation: Arc<CorrelationRegistry>,
}

fn harness() -> Harness {
    let approvals = Arc::new(InMemoryApprovalStore::new());
    let otps = Arc::new(InMemoryOtpStore::new());
    let resend_mappings = Arc::new(InMemoryResendMappingStore::new());
    let chat = Arc::new(SpyChatService::new());
    let sms = Arc::new(SpySmsService::new());
    let messages = Arc::new(InMemoryMessageCorrelation::new());
    let correlation = Arc::new(CorrelationRegistry::new());

    let deps = ServerDeps::new(
        approvals.clone(),
        otps.clone(),
        resend_mappings.clone(),
        chat.clone(),
        sms.clone(),
        messages.clone(),
        correlation.clone(),
    );
    let router = WebhookEventRouter::new(deps);
    let dispatcher = ApprovalDispatcher::new(approvals.clone(), chat.clone(), messages.clone());

    Harness {
        router,
        dispatcher,
        approvals,
        otps,
        resend_mappings,
        chat,
        sms,
        messages,
        correlation,
    }
}

fn submission() -> SubmitApprovalRequest {
    serde_json::from_value(json!({
        "object_type": "invoice",
        "object_id": "INV-2024-0042",
        "object_label": "Invoice INV-2024-0042",
        "origin": "erp",
        "requester": "finance-bot",
        "approvers": [PHONE],
    }))
    .unwrap()
}

fn message_payload(message: serde_json::Value) -> WebhookPayload {
    serde_json::from_value(json!({
        "entry": [{
            "changes": [{
                "value": {
                    "metadata": { "phone_number_id": "104560000000000" },
                    "messages": [message]
                }
            }]
        }]
    }))
    .unwrap()
}

fn button_tap(payload: &str, reply_to: &str) -> WebhookPayload {
    message_payload(json!({
        "id": format!("wamid.in-{}", Uuid::new_v4()),
        "from": WIRE_PHONE,
        "type": "button",
        "button": { "payload": payload, "text": "tap" },
        "context": { "id": reply_to }
    }))
}

fn plain_text(body: &str) -> WebhookPayload {
    message_payload(json!({
        "id": format!("wamid.in-{}", Uuid::new_v4()),
        "from": WIRE_PHONE,
        "type": "text",
        "text": { "body": body }
    }))
}

fn reply_text(body: &str, reply_to: &str) -> WebhookPayload {
    message_payload(json!({
        "id": format!("wamid.in-{}", Uuid::new_v4()),
        "from": WIRE_PHONE,
        "type": "text",
        "text": { "body": body },
        "context": { "id": reply_to }
    }))
}

/// Submit a request and tap the given decision button, leaving the approver
/// mid-challenge. Returns (approval id, prompt message id).
async fn submit_and_tap(h: &Harness, action_prefix: &str) -> (Uuid, String) {
    let (request, notified) = h.dispatcher.submit(submission()).await.unwrap();
    assert_eq!(notified, 1);
    let prompt_id = "wamid.out-0".to_string();
    assert_eq!(h.messages.resolve(&prompt_id), Some(request.id));

    let payload = format!("{}_{}", action_prefix, request.id);
    h.router.process_payload(button_tap(&payload, &prompt_id)).await;
    (request.id, prompt_id)
}

fn current_code(h: &Harness) -> String {
    h.otps
        .challenges_for(PHONE)
        .iter()
        .rev()
        .find(|c| c.status == OtpStatus::Pending)
        .map(|c| c.code.clone())
        .expect("no pending challenge")
}

fn wrong_code(h: &Harness) -> &'static str {
    if current_code(h) == "111111" {
        "222222"
    } else {
        "111111"
    }
}

// ============================================================================
// Flows
// ============================================================================

#[tokio::test]
async fn approve_button_then_valid_code_commits_approval() {
    let h = harness();
    let (approval_id, _) = submit_and_tap(&h, "APPROVE").await;

    // Challenge is live: SMS in local dialing format plus a chat notice.
    assert_eq!(h.sms.sent().len(), 1);
    assert_eq!(h.sms.sent()[0].0, "0600000000");
    assert_eq!(h.chat.challenge_notices(), vec![PHONE.to_string()]);
    assert_eq!(h.correlation.active_approval(PHONE), Some(approval_id));

    let code = current_code(&h);
    h.router.process_payload(plain_text(&code)).await;

    let updated = h.approvals.get(approval_id).await.unwrap();
    assert_eq!(updated.decision, Decision::Approved);
    // Challenge consumed, correlation fully released.
    assert!(h.otps.challenges_for(PHONE).is_empty());
    assert_eq!(h.correlation.active_approval(PHONE), None);
    assert!(h.correlation.cached_action(approval_id).is_none());
    // Approve never asks for a comment.
    assert!(h.chat.comment_requests().is_empty());
}

#[tokio::test]
async fn reject_flow_collects_the_follow_up_comment() {
    let h = harness();
    let (approval_id, _) = submit_and_tap(&h, "REJECT").await;

    let code = current_code(&h);
    h.router.process_payload(plain_text(&code)).await;

    let updated = h.approvals.get(approval_id).await.unwrap();
    assert_eq!(updated.decision, Decision::Rejected);
    assert_eq!(h.chat.comment_requests(), vec![PHONE.to_string()]);

    // Sends so far: prompt (out-0), challenge notice (out-1), comment
    // request (out-2); the comment request opened a new reply thread.
    assert_eq!(h.messages.resolve("wamid.out-2"), Some(approval_id));

    h.router
        .process_payload(reply_text("Budget exceeded for Q3", "wamid.out-2"))
        .await;

    let updated = h.approvals.get(approval_id).await.unwrap();
    assert_eq!(updated.comment.as_deref(), Some("Budget exceeded for Q3"));
    assert_eq!(h.correlation.comment_state(PHONE), None);
}

#[tokio::test]
async fn three_wrong_codes_deny_and_offer_a_resend() {
    let h = harness();
    let (approval_id, _) = submit_and_tap(&h, "APPROVE").await;
    let wrong = wrong_code(&h);

    h.router.process_payload(plain_text(wrong)).await;
    h.router.process_payload(plain_text(wrong)).await;
    assert_eq!(h.chat.retry_prompts().len(), 2);

    h.router.process_payload(plain_text(wrong)).await;

    assert_eq!(h.chat.resend_offers(), vec![PHONE.to_string()]);
    assert_eq!(h.resend_mappings.count(), 1);
    assert_eq!(h.correlation.active_approval(PHONE), None);
    // Decision untouched by the failed challenge.
    assert_eq!(
        h.approvals.get(approval_id).await.unwrap().decision,
        Decision::Pending
    );
}

#[tokio::test]
async fn resend_button_recovers_a_denied_challenge() {
    let h = harness();
    let (approval_id, _) = submit_and_tap(&h, "APPROVE").await;
    let wrong = wrong_code(&h);
    for _ in 0..3 {
        h.router.process_payload(plain_text(wrong)).await;
    }

    // Sends: prompt (out-0), challenge notice (out-1), two retry prompts
    // (out-2, out-3), resend offer (out-4).
    let offer_id = "wamid.out-4";
    assert_eq!(h.messages.resolve(offer_id), Some(approval_id));

    let payload = format!("RESEND_{}", approval_id);
    h.router.process_payload(button_tap(&payload, offer_id)).await;

    // Fresh pending challenge, denied one retired, second SMS delivered.
    assert_eq!(h.sms.sent().len(), 2);
    assert_eq!(h.correlation.active_approval(PHONE), Some(approval_id));

    let code = current_code(&h);
    h.router.process_payload(plain_text(&code)).await;

    // The action cached at the original tap survives the resend cycle.
    assert_eq!(
        h.approvals.get(approval_id).await.unwrap().decision,
        Decision::Approved
    );
}

#[tokio::test]
async fn threaded_reply_beats_otp_entry_for_text_classification() {
    let h = harness();
    let (approval_id, prompt_id) = submit_and_tap(&h, "APPROVE").await;

    // Mid-challenge, but the text is a threaded reply: treat as a comment.
    h.router
        .process_payload(reply_text("please expedite", &prompt_id))
        .await;

    let updated = h.approvals.get(approval_id).await.unwrap();
    assert_eq!(updated.comment.as_deref(), Some("please expedite"));
    // The challenge is untouched and still valid afterwards.
    assert_eq!(h.correlation.active_approval(PHONE), Some(approval_id));
    let code = current_code(&h);
    h.router.process_payload(plain_text(&code)).await;
    assert_eq!(
        h.approvals.get(approval_id).await.unwrap().decision,
        Decision::Approved
    );
}

#[tokio::test]
async fn failed_challenge_delivery_rolls_back_the_action() {
    let h = harness();
    let (request, _) = h.dispatcher.submit(submission()).await.unwrap();
    h.sms.fail_next();

    let payload = format!("APPROVE_{}", request.id);
    h.router
        .process_payload(button_tap(&payload, "wamid.out-0"))
        .await;

    // No dangling state: the approver re-taps from scratch.
    assert!(h.otps.challenges_for(PHONE).is_empty());
    assert_eq!(h.correlation.active_approval(PHONE), None);
    assert!(h.correlation.cached_action(request.id).is_none());
    assert!(h.chat.challenge_notices().is_empty());
}

#[tokio::test]
async fn button_from_unresolvable_thread_is_dropped() {
    let h = harness();
    let (request, _) = h.dispatcher.submit(submission()).await.unwrap();

    let payload = format!("APPROVE_{}", request.id);
    h.router
        .process_payload(button_tap(&payload, "wamid.unknown-thread"))
        .await;

    assert!(h.otps.challenges_for(PHONE).is_empty());
    assert!(h.sms.sent().is_empty());
    assert_eq!(h.correlation.active_approval(PHONE), None);
}

#[tokio::test]
async fn text_without_challenge_or_thread_is_ignored() {
    let h = harness();
    h.dispatcher.submit(submission()).await.unwrap();

    h.router.process_payload(plain_text("123456")).await;

    assert!(h.sms.sent().is_empty());
    assert!(h.chat.retry_prompts().is_empty());
}

#[tokio::test]
async fn expired_code_entry_leaves_the_decision_pending() {
    let h = harness();
    let (approval_id, _) = submit_and_tap(&h, "APPROVE").await;
    let code = current_code(&h);
    h.otps.expire_all(PHONE);

    h.router.process_payload(plain_text(&code)).await;

    assert_eq!(
        h.approvals.get(approval_id).await.unwrap().decision,
        Decision::Pending
    );
    assert!(h.chat.retry_prompts().is_empty());
    assert!(h.chat.resend_offers().is_empty());
}
