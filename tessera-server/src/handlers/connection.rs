//! Connection-scope message handlers
//!
//! Handles: Attach, Ping

use tracing::{debug, info};

use tessera_protocol::{ErrorCode, Response, PROTOCOL_VERSION};

use super::{HandlerContext, HandlerResult};

impl HandlerContext {
    /// Handle Attach - validate protocol version and claim the attach name
    pub fn handle_attach(&self, client_name: String, protocol_version: u32) -> HandlerResult {
        info!(
            "Client {} attaching as {:?} with protocol version {}",
            self.client_id, client_name, protocol_version
        );

        if protocol_version != PROTOCOL_VERSION {
            return HandlerContext::error(
                ErrorCode::ProtocolMismatch,
                format!(
                    "Protocol version mismatch: client={}, server={}",
                    protocol_version, PROTOCOL_VERSION
                ),
            );
        }

        if client_name.is_empty() {
            return HandlerContext::error(ErrorCode::InvalidOperation, "empty client name");
        }

        if !self.registry.set_client_name(self.client_id, &client_name) {
            return HandlerContext::error(
                ErrorCode::NameInUse,
                format!("client name {} is already attached", client_name),
            );
        }

        HandlerResult::Response(Response::Attached {
            server_version: env!("CARGO_PKG_VERSION").to_string(),
            protocol_version: PROTOCOL_VERSION,
        })
    }

    /// Handle Ping - keep-alive heartbeat
    pub fn handle_ping(&self) -> HandlerResult {
        debug!("Received Ping from {}, sending Pong", self.client_id);
        HandlerResult::Response(Response::Pong)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{attached_context, join_peer, response};
    use tessera_protocol::PROTOCOL_VERSION;

    #[tokio::test]
    async fn test_attach_success() {
        let client = attached_context("bootstrap").await;
        let result = client
            .ctx
            .handle_attach("alice".into(), PROTOCOL_VERSION);

        match response(result) {
            Response::Attached {
                protocol_version, ..
            } => assert_eq!(protocol_version, PROTOCOL_VERSION),
            other => panic!("Expected Attached, got {}", other.type_name()),
        }

        assert_eq!(
            client.ctx.registry.client_name(client.ctx.client_id).as_deref(),
            Some("alice")
        );
    }

    #[tokio::test]
    async fn test_attach_version_mismatch() {
        let client = attached_context("bootstrap").await;
        let result = client.ctx.handle_attach("alice".into(), 9999);

        match response(result) {
            Response::Error { code, message } => {
                assert_eq!(code, ErrorCode::ProtocolMismatch);
                assert!(message.contains("9999"));
            }
            other => panic!("Expected Error, got {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn test_attach_duplicate_name() {
        let client = attached_context("alice").await;
        let peer = join_peer(&client.ctx, "bootstrap");

        let result = peer.ctx.handle_attach("alice".into(), PROTOCOL_VERSION);
        match response(result) {
            Response::Error { code, .. } => assert_eq!(code, ErrorCode::NameInUse),
            other => panic!("Expected Error, got {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn test_ping() {
        let client = attached_context("alice").await;
        match response(client.ctx.handle_ping()) {
            Response::Pong => {}
            other => panic!("Expected Pong, got {}", other.type_name()),
        }
    }
}
