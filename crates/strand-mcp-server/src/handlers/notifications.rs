use async_trait::async_trait;
use tracing::{debug, info};

use strand_mcp_json_rpc::JsonRpcNotification;
use strand_mcp_protocol::{CancelledNotificationParams, McpResult, ProgressNotificationParams};

use super::{NotificationHandler, parse_params};
use crate::metadata::TransportMetadata;

/// `notifications/initialized`
pub struct InitializedHandler;

#[async_trait]
impl NotificationHandler for InitializedHandler {
    async fn invoke(&self, _notification: JsonRpcNotification, metadata: &TransportMetadata) -> McpResult<()> {
        debug!(server = %metadata.server_name(), "Client initialized");
        Ok(())
    }
}

/// `notifications/progress`
pub struct ProgressHandler;

#[async_trait]
impl NotificationHandler for ProgressHandler {
    async fn invoke(&self, notification: JsonRpcNotification, _metadata: &TransportMetadata) -> McpResult<()> {
        let params: ProgressNotificationParams = parse_params(notification.params)?;
        info!(
            token = %params.progress_token,
            progress = params.progress,
            total = ?params.total,
            message = ?params.message,
            "Progress update"
        );
        Ok(())
    }
}

/// `notifications/cancelled`: flags the named in-flight request.
pub struct CancelledHandler;

#[async_trait]
impl NotificationHandler for CancelledHandler {
    async fn invoke(&self, notification: JsonRpcNotification, metadata: &TransportMetadata) -> McpResult<()> {
        let params: CancelledNotificationParams = parse_params(notification.params)?;
        let found = metadata
            .cancellations()
            .cancel(metadata.cancellation_scope(), &params.request_id);
        info!(
            request_id = %params.request_id,
            reason = ?params.reason,
            found,
            "Cancellation requested"
        );
        Ok(())
    }
}
