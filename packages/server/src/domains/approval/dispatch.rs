//! Approval dispatch: accept a new approval request and broadcast the
//! interactive prompt to every listed approver.

use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::common::phone::normalize_msisdn;
use crate::common::ApprovalError;
use crate::domains::approval::models::{ApprovalRequest, Decision};
use crate::kernel::{ApprovalStore, BaseChatService, MessageCorrelation};

/// Inbound submission body. `approvers` are accepted in any loose phone
/// format and normalized before dispatch.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitApprovalRequest {
    pub object_type: String,
    pub object_id: String,
    pub object_label: String,
    pub origin: String,
    pub requester: String,
    #[serde(default)]
    pub data: Option<String>,
    pub approvers: Vec<String>,
    #[serde(default)]
    pub callback_url: Option<String>,
    #[serde(default)]
    pub metadata: Option<String>,
}

pub struct ApprovalDispatcher {
    approvals: Arc<dyn ApprovalStore>,
    chat: Arc<dyn BaseChatService>,
    messages: Arc<dyn MessageCorrelation>,
}

impl ApprovalDispatcher {
    pub fn new(
        approvals: Arc<dyn ApprovalStore>,
        chat: Arc<dyn BaseChatService>,
        messages: Arc<dyn MessageCorrelation>,
    ) -> Self {
        Self {
            approvals,
            chat,
            messages,
        }
    }

    /// Persist the request as `Created`, fan out the interactive prompt, and
    /// promote to `Pending` once at least one approver was reached. Each
    /// outbound message id is recorded so button taps resolve back to this
    /// request via the reply thread.
    pub async fn submit(
        &self,
        submission: SubmitApprovalRequest,
    ) -> Result<(ApprovalRequest, usize), ApprovalError> {
        let request = ApprovalRequest {
            id: Uuid::new_v4(),
            object_type: submission.object_type,
            object_id: submission.object_id,
            object_label: submission.object_label,
            origin: submission.origin,
            requester: submission.requester,
            data: submission.data,
            approvers: submission
                .approvers
                .iter()
                .map(|a| normalize_msisdn(a))
                .collect(),
            comment: None,
            callback_url: submission.callback_url,
            metadata: submission.metadata,
            decision: Decision::Created,
            requested_at: Utc::now(),
            last_reminder_at: None,
            reminder_count: 0,
            version: 0,
        };
        let request = self.approvals.insert(&request).await?;

        let mut notified = 0;
        for approver in &request.approvers {
            match self.chat.send_approval_request(approver, &request).await {
                Ok(message_id) => {
                    notified += 1;
                    if let Some(message_id) = message_id {
                        self.messages.record(&message_id, request.id);
                    }
                }
                Err(e) => {
                    warn!(approver, request_id = %request.id, error = %e,
                        "failed to notify approver");
                }
            }
        }

        if notified > 0 {
            self.approvals
                .update_decision(request.id, Decision::Pending, request.version)
                .await?;
        }
        info!(request_id = %request.id, notified, "approval request dispatched");

        let request = self.approvals.get(request.id).await?;
        Ok((request, notified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::approval::correlation::InMemoryMessageCorrelation;
    use crate::kernel::test_dependencies::{InMemoryApprovalStore, SpyChatService};

    fn submission(approvers: Vec<&str>) -> SubmitApprovalRequest {
        SubmitApprovalRequest {
            object_type: "invoice".to_string(),
            object_id: "INV-2024-0042".to_string(),
            object_label: "Invoice INV-2024-0042".to_string(),
            origin: "erp".to_string(),
            requester: "finance-bot".to_string(),
            data: None,
            approvers: approvers.into_iter().map(String::from).collect(),
            callback_url: None,
            metadata: None,
        }
    }

    #[tokio::test]
    async fn submit_normalizes_approvers_and_promotes_to_pending() {
        let approvals = Arc::new(InMemoryApprovalStore::new());
        let chat = Arc::new(SpyChatService::new());
        let messages = Arc::new(InMemoryMessageCorrelation::new());
        let dispatcher =
            ApprovalDispatcher::new(approvals.clone(), chat.clone(), messages.clone());

        let (request, notified) = dispatcher
            .submit(submission(vec!["212 600 000 000", "+212611111111"]))
            .await
            .unwrap();

        assert_eq!(notified, 2);
        assert_eq!(request.decision, Decision::Pending);
        assert_eq!(
            request.approvers,
            vec!["+212600000000".to_string(), "+212611111111".to_string()]
        );
        assert_eq!(
            chat.approval_requests(),
            vec!["+212600000000".to_string(), "+212611111111".to_string()]
        );
        // Each outbound prompt is resolvable back to the request.
        assert_eq!(messages.resolve("wamid.out-0"), Some(request.id));
        assert_eq!(messages.resolve("wamid.out-1"), Some(request.id));
    }

    #[tokio::test]
    async fn submit_with_unreachable_approver_stays_created() {
        let approvals = Arc::new(InMemoryApprovalStore::new());
        let chat = Arc::new(SpyChatService::new());
        let messages = Arc::new(InMemoryMessageCorrelation::new());
        let dispatcher =
            ApprovalDispatcher::new(approvals.clone(), chat.clone(), messages.clone());
        chat.fail_next();

        let (request, notified) = dispatcher
            .submit(submission(vec!["+212600000000"]))
            .await
            .unwrap();

        assert_eq!(notified, 0);
        assert_eq!(request.decision, Decision::Created);
    }
}
