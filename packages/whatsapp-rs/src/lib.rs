// WhatsApp Cloud API client for approval template messages.
// https://developers.facebook.com/docs/whatsapp/cloud-api/guides/send-message-templates

pub mod models;

use reqwest::{header, Client};
use serde_json::{json, Value};

use crate::models::SendMessageResponse;

#[derive(Debug, Clone)]
pub struct WhatsAppOptions {
    /// Full messages endpoint, e.g. https://graph.facebook.com/v19.0/<phone_number_id>/messages
    pub api_url: String,
    pub api_token: String,
}

/// Summary of an approval request rendered into the interactive template.
#[derive(Debug, Clone)]
pub struct ApprovalSummary<'a> {
    pub approval_id: &'a str,
    pub origin: &'a str,
    pub requester: &'a str,
    pub object_type: &'a str,
    pub object_id: &'a str,
    pub object_label: &'a str,
}

#[derive(Debug, Clone)]
pub struct WhatsAppService {
    options: WhatsAppOptions,
    client: Client,
}

impl WhatsAppService {
    pub fn new(options: WhatsAppOptions) -> Self {
        Self {
            options,
            client: Client::new(),
        }
    }

    fn base_request_body(&self, recipient: &str, template_name: &str) -> Value {
        json!({
            "messaging_product": "whatsapp",
            "to": recipient,
            "type": "template",
            "template": {
                "name": template_name,
                "language": { "code": "fr" }
            }
        })
    }

    fn text_parameter(value: &str) -> Value {
        json!({ "type": "text", "text": value })
    }

    fn quick_reply_button(index: &str, payload: &str) -> Value {
        json!({
            "type": "button",
            "sub_type": "quick_reply",
            "index": index,
            "parameters": [{ "type": "payload", "payload": payload }]
        })
    }

    async fn post_template(&self, body: Value) -> Result<SendMessageResponse, &'static str> {
        let res = self
            .client
            .post(&self.options.api_url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.options.api_token))
            .json(&body)
            .send()
            .await;

        match res {
            Ok(response) => {
                let status = response.status();
                if !status.is_success() {
                    let error_body = response.text().await.unwrap_or_default();
                    eprintln!("WhatsApp error ({}): {}", status, error_body);
                    return Err("WhatsApp returned an error");
                }
                match response.json::<SendMessageResponse>().await {
                    Ok(data) => Ok(data),
                    Err(e) => {
                        eprintln!("Failed to parse WhatsApp response: {}", e);
                        Err("Error parsing send response")
                    }
                }
            }
            Err(e) => {
                eprintln!("Request to WhatsApp failed: {}", e);
                Err("Error sending message")
            }
        }
    }

    /// Send the interactive approval template with Approve / Reject / Hold
    /// quick-reply buttons. Button payloads carry the action prefix plus the
    /// approval id so the webhook can route the tap back to the request.
    pub async fn send_approval_request(
        &self,
        recipient: &str,
        summary: &ApprovalSummary<'_>,
    ) -> Result<SendMessageResponse, &'static str> {
        let mut body = self.base_request_body(recipient, "generic_approval");
        body["template"]["components"] = json!([
            {
                "type": "header",
                "parameters": [Self::text_parameter(summary.origin)]
            },
            {
                "type": "body",
                "parameters": [
                    Self::text_parameter(summary.requester),
                    Self::text_parameter(summary.object_type),
                    Self::text_parameter(summary.object_id),
                    Self::text_parameter(summary.object_label),
                ]
            },
            Self::quick_reply_button("0", &format!("APPROVE_{}", summary.approval_id)),
            Self::quick_reply_button("1", &format!("REJECT_{}", summary.approval_id)),
            Self::quick_reply_button("2", &format!("ATTENTE_{}", summary.approval_id)),
        ]);
        self.post_template(body).await
    }

    /// Notify the approver that an OTP code is on its way over SMS.
    pub async fn send_otp_notice(&self, recipient: &str) -> Result<SendMessageResponse, &'static str> {
        let mut body = self.base_request_body(recipient, "envoieotp");
        body["template"]["components"] = json!([
            { "type": "header" },
            { "type": "body" },
        ]);
        self.post_template(body).await
    }

    /// Ask the approver to try entering the code again.
    pub async fn send_retry_prompt(&self, recipient: &str) -> Result<SendMessageResponse, &'static str> {
        let mut body = self.base_request_body(recipient, "retry");
        body["template"]["components"] = json!([
            { "type": "header" },
            { "type": "body" },
        ]);
        self.post_template(body).await
    }

    /// Offer a fresh OTP through a single quick-reply button after the
    /// previous challenge was denied.
    pub async fn send_resend_offer(
        &self,
        recipient: &str,
        resend_payload: &str,
    ) -> Result<SendMessageResponse, &'static str> {
        let mut body = self.base_request_body(recipient, "resendit");
        body["template"]["components"] = json!([
            { "type": "header" },
            { "type": "body" },
            Self::quick_reply_button("0", resend_payload),
        ]);
        self.post_template(body).await
    }

    /// Ask for a free-text follow-up comment after a reject / hold decision.
    pub async fn send_comment_request(
        &self,
        recipient: &str,
        object_id: &str,
    ) -> Result<SendMessageResponse, &'static str> {
        let mut body = self.base_request_body(recipient, "traitement");
        body["template"]["components"] = json!([
            {
                "type": "header",
                "parameters": [Self::text_parameter(object_id)]
            },
            { "type": "body" },
        ]);
        self.post_template(body).await
    }

    /// Mark an inbound message as read so the sender sees the blue ticks.
    /// Read receipts go to the same messages endpoint as sends; the Cloud API
    /// identifies the message by id alone.
    pub async fn mark_message_read(&self, message_id: &str) -> Result<(), &'static str> {
        let body = json!({
            "messaging_product": "whatsapp",
            "status": "read",
            "message_id": message_id,
        });

        let res = self
            .client
            .post(&self.options.api_url)
            .header(header::AUTHORIZATION, format!("Bearer {}", self.options.api_token))
            .json(&body)
            .send()
            .await;

        match res {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => {
                eprintln!("WhatsApp mark-read failed: {}", response.status());
                Err("WhatsApp returned an error")
            }
            Err(e) => {
                eprintln!("Request to WhatsApp failed: {}", e);
                Err("Error marking message as read")
            }
        }
    }
}
