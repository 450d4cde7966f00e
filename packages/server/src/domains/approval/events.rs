//! Inbound webhook envelope and its normalization.
//!
//! The provider delivers events with no session context; everything here is
//! wire-shape decoding. Button payloads are decoded exactly once into a
//! tagged [`ApprovalAction`] so nothing downstream re-parses prefixes.

use serde::Deserialize;
use uuid::Uuid;

use crate::common::phone::normalize_msisdn;
use crate::domains::approval::models::Decision;

// ---------------------------------------------------------------------------
// Provider envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookChange {
    pub value: ChangeValue,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub metadata: Option<ChangeMetadata>,
    #[serde(default)]
    pub messages: Vec<InboundMessage>,
    #[serde(default)]
    pub statuses: Vec<StatusUpdate>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeMetadata {
    #[serde(default)]
    pub phone_number_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub button: Option<ButtonContent>,
    #[serde(default)]
    pub text: Option<TextContent>,
    #[serde(default)]
    pub context: Option<MessageContext>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ButtonContent {
    #[serde(default)]
    pub payload: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TextContent {
    #[serde(default)]
    pub body: Option<String>,
}

/// Reply-thread context: the id of the outbound message this one replies to.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageContext {
    #[serde(default)]
    pub id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StatusUpdate {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
}

// ---------------------------------------------------------------------------
// Normalized events
// ---------------------------------------------------------------------------

/// A single classified inbound event, ready for the router.
#[derive(Debug, Clone)]
pub enum InboundEvent {
    /// Delivery/read receipt. No user action; never enters correlation logic.
    Status {
        message_id: Option<String>,
        status: Option<String>,
    },
    /// Quick-reply button tap.
    Button {
        message_id: String,
        from: String,
        payload: String,
        reply_to: Option<String>,
    },
    /// Free-text message. `reply_to` carries the reply-thread id when the
    /// text is a threaded reply.
    Text {
        message_id: String,
        from: String,
        body: String,
        reply_to: Option<String>,
    },
    /// Message kinds this core does not handle (media, reactions, ...).
    Unsupported { kind: String },
}

impl WebhookPayload {
    /// Provider phone-number id of the receiving business number, needed to
    /// mark inbound messages as read.
    pub fn phone_number_id(&self) -> Option<&str> {
        self.entry
            .first()
            .and_then(|e| e.changes.first())
            .and_then(|c| c.value.metadata.as_ref())
            .and_then(|m| m.phone_number_id.as_deref())
    }

    /// Flatten the envelope into classified events. Sender numbers are
    /// normalized to canonical `+<digits>` form here, once.
    pub fn events(&self) -> Vec<InboundEvent> {
        let mut events = Vec::new();
        for entry in &self.entry {
            for change in &entry.changes {
                for status in &change.value.statuses {
                    events.push(InboundEvent::Status {
                        message_id: status.id.clone(),
                        status: status.status.clone(),
                    });
                }
                for message in &change.value.messages {
                    events.push(normalize_message(message));
                }
            }
        }
        events
    }
}

fn normalize_message(message: &InboundMessage) -> InboundEvent {
    let from = message
        .from
        .as_deref()
        .map(normalize_msisdn)
        .unwrap_or_default();
    let reply_to = message.context.as_ref().and_then(|c| c.id.clone());

    match message.kind.as_str() {
        "button" => {
            let payload = message
                .button
                .as_ref()
                .and_then(|b| b.payload.clone())
                .unwrap_or_default();
            InboundEvent::Button {
                message_id: message.id.clone(),
                from,
                payload,
                reply_to,
            }
        }
        "text" => {
            let body = message
                .text
                .as_ref()
                .and_then(|t| t.body.clone())
                .unwrap_or_default()
                .trim()
                .to_string();
            InboundEvent::Text {
                message_id: message.id.clone(),
                from,
                body,
                reply_to,
            }
        }
        other => InboundEvent::Unsupported {
            kind: other.to_string(),
        },
    }
}

// ---------------------------------------------------------------------------
// Button actions
// ---------------------------------------------------------------------------

/// A decoded button action. The embedded id comes from the button payload
/// (`APPROVE_<id>`, `REJECT_<id>`, `ATTENTE_<id>`, `RESEND_<id>`); the router
/// treats the reply-thread resolution as authoritative for routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalAction {
    Approve(Uuid),
    Reject(Uuid),
    Hold(Uuid),
    Resend(Uuid),
}

impl ApprovalAction {
    pub fn parse(payload: &str) -> Option<Self> {
        let (prefix, rest) = payload.split_once('_')?;
        let id = Uuid::parse_str(rest).ok()?;
        match prefix {
            "APPROVE" => Some(ApprovalAction::Approve(id)),
            "REJECT" => Some(ApprovalAction::Reject(id)),
            "ATTENTE" => Some(ApprovalAction::Hold(id)),
            "RESEND" => Some(ApprovalAction::Resend(id)),
            _ => None,
        }
    }

    pub fn approval_id(&self) -> Uuid {
        match self {
            ApprovalAction::Approve(id)
            | ApprovalAction::Reject(id)
            | ApprovalAction::Hold(id)
            | ApprovalAction::Resend(id) => *id,
        }
    }

    /// Terminal decision this action commits once the OTP validates.
    /// `Resend` never commits anything.
    pub fn decision(&self) -> Option<Decision> {
        match self {
            ApprovalAction::Approve(_) => Some(Decision::Approved),
            ApprovalAction::Reject(_) => Some(Decision::Rejected),
            ApprovalAction::Hold(_) => Some(Decision::OnHold),
            ApprovalAction::Resend(_) => None,
        }
    }

    /// Reject and hold decisions require a follow-up free-text comment.
    pub fn wants_comment(&self) -> bool {
        matches!(self, ApprovalAction::Reject(_) | ApprovalAction::Hold(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_action_payloads() {
        let id = Uuid::new_v4();
        assert_eq!(
            ApprovalAction::parse(&format!("APPROVE_{}", id)),
            Some(ApprovalAction::Approve(id))
        );
        assert_eq!(
            ApprovalAction::parse(&format!("REJECT_{}", id)),
            Some(ApprovalAction::Reject(id))
        );
        assert_eq!(
            ApprovalAction::parse(&format!("ATTENTE_{}", id)),
            Some(ApprovalAction::Hold(id))
        );
        assert_eq!(
            ApprovalAction::parse(&format!("RESEND_{}", id)),
            Some(ApprovalAction::Resend(id))
        );
    }

    #[test]
    fn rejects_unknown_or_malformed_payloads() {
        assert_eq!(ApprovalAction::parse("NOPE_123"), None);
        assert_eq!(ApprovalAction::parse("APPROVE_not-a-uuid"), None);
        assert_eq!(ApprovalAction::parse("garbage"), None);
    }

    #[test]
    fn maps_actions_to_decisions() {
        let id = Uuid::new_v4();
        assert_eq!(ApprovalAction::Approve(id).decision(), Some(Decision::Approved));
        assert_eq!(ApprovalAction::Reject(id).decision(), Some(Decision::Rejected));
        assert_eq!(ApprovalAction::Hold(id).decision(), Some(Decision::OnHold));
        assert_eq!(ApprovalAction::Resend(id).decision(), None);
        assert!(ApprovalAction::Reject(id).wants_comment());
        assert!(ApprovalAction::Hold(id).wants_comment());
        assert!(!ApprovalAction::Approve(id).wants_comment());
    }

    #[test]
    fn flattens_envelope_and_normalizes_sender() {
        let payload: WebhookPayload = serde_json::from_value(serde_json::json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "metadata": { "phone_number_id": "10012" },
                        "messages": [{
                            "id": "wamid.in-1",
                            "from": "212600000000",
                            "type": "text",
                            "text": { "body": " 123456 " }
                        }]
                    }
                }]
            }]
        }))
        .unwrap();

        assert_eq!(payload.phone_number_id(), Some("10012"));
        let events = payload.events();
        assert_eq!(events.len(), 1);
        match &events[0] {
            InboundEvent::Text { from, body, reply_to, .. } => {
                assert_eq!(from, "+212600000000");
                assert_eq!(body, "123456");
                assert!(reply_to.is_none());
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn status_payloads_classify_as_status_events() {
        let payload: WebhookPayload = serde_json::from_value(serde_json::json!({
            "entry": [{
                "changes": [{
                    "value": {
                        "statuses": [{ "id": "wamid.out-1", "status": "delivered" }]
                    }
                }]
            }]
        }))
        .unwrap();

        let events = payload.events();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], InboundEvent::Status { .. }));
    }
}
