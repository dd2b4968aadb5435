//! Channel operation handlers
//!
//! Handles: Send, AddConsumer, RemoveConsumer. Data multicast preserves
//! send order per sender: sends are serialized under the session lock and
//! each consumer's connection is an ordered stream.

use tracing::debug;

use tessera_protocol::{ChannelEvent, ErrorCode, Event, Response};

use super::{EventOut, EventTarget, HandlerContext, HandlerResult};

impl HandlerContext {
    /// Handle Send - multicast data to every consumer
    pub async fn handle_send(
        &self,
        session: u16,
        channel: String,
        sender: String,
        data: Vec<u8>,
    ) -> HandlerResult {
        if let Some(err) = self.verify_actor(&sender) {
            return err;
        }

        let manager = self.session_manager.read().await;
        let target = match manager.get(session) {
            Some(target) => target,
            None => {
                return Self::error(ErrorCode::SessionNotFound, format!("session {}", session))
            }
        };
        if !target.has_client(&sender) {
            return Self::error(
                ErrorCode::PermissionDenied,
                format!("{} is not in {}", sender, target.name()),
            );
        }

        let entry = match target.channel(&channel) {
            Ok(entry) => entry,
            Err(e) => return Self::error_from(&e),
        };
        let consumers = entry.consumer_names();
        drop(manager);

        debug!(
            "{} sent {} bytes to {} ({} consumers)",
            sender,
            data.len(),
            channel,
            consumers.len()
        );

        let delivered = consumers.len();
        let events = if consumers.is_empty() {
            Vec::new()
        } else {
            vec![EventOut {
                session,
                target: EventTarget::Clients(consumers),
                event: Event::Channel(ChannelEvent {
                    channel,
                    sender,
                    data,
                }),
            }]
        };

        HandlerResult::ResponseWithEvents {
            response: Response::Sent { delivered },
            events,
        }
    }

    /// Handle AddConsumer - register the client for deliveries
    pub async fn handle_add_consumer(
        &self,
        session: u16,
        channel: String,
        client: String,
    ) -> HandlerResult {
        if let Some(err) = self.verify_actor(&client) {
            return err;
        }

        let mut manager = self.session_manager.write().await;
        let target = match manager.get_mut(session) {
            Some(target) => target,
            None => {
                return Self::error(ErrorCode::SessionNotFound, format!("session {}", session))
            }
        };
        if !target.has_client(&client) {
            return Self::error(
                ErrorCode::PermissionDenied,
                format!("{} is not in {}", client, target.name()),
            );
        }

        match target.channel_mut(&channel) {
            Ok(entry) => {
                if entry.add_consumer(&client) {
                    HandlerResult::Response(Response::ConsumerAdded)
                } else {
                    Self::error(
                        ErrorCode::NameInUse,
                        format!("{} already consumes {}", client, channel),
                    )
                }
            }
            Err(e) => Self::error_from(&e),
        }
    }

    /// Handle RemoveConsumer - unregister the client
    pub async fn handle_remove_consumer(
        &self,
        session: u16,
        channel: String,
        client: String,
    ) -> HandlerResult {
        if let Some(err) = self.verify_actor(&client) {
            return err;
        }

        let mut manager = self.session_manager.write().await;
        let target = match manager.get_mut(session) {
            Some(target) => target,
            None => {
                return Self::error(ErrorCode::SessionNotFound, format!("session {}", session))
            }
        };

        match target.channel_mut(&channel) {
            Ok(entry) => {
                if entry.remove_consumer(&client) {
                    HandlerResult::Response(Response::ConsumerRemoved)
                } else {
                    Self::error(
                        ErrorCode::ClientNotFound,
                        format!("{} does not consume {}", client, channel),
                    )
                }
            }
            Err(e) => Self::error_from(&e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{
        attached_context, join_peer, response, response_and_events, TestClient,
    };
    use tessera_protocol::{ObjectType, RESERVED_SESSION};

    async fn channel_fixture() -> (TestClient, TestClient, u16) {
        let alice = attached_context("alice").await;
        let bob = join_peer(&alice.ctx, "bob");

        let bound = response(
            alice
                .ctx
                .handle_bind(RESERVED_SESSION, "whiteboard".into())
                .await,
        );
        let session = match bound {
            Response::Bound { session } => session.number,
            other => panic!("Expected Bound, got {}", other.type_name()),
        };

        alice.ctx.handle_join(session, "alice".into()).await;
        bob.ctx.handle_join(session, "bob".into()).await;
        alice
            .ctx
            .handle_create(session, ObjectType::Channel, "ticker".into(), "alice".into())
            .await;

        (alice, bob, session)
    }

    #[tokio::test]
    async fn test_send_reaches_consumers() {
        let (alice, bob, session) = channel_fixture().await;
        bob.ctx
            .handle_add_consumer(session, "ticker".into(), "bob".into())
            .await;

        let (resp, events) = response_and_events(
            alice
                .ctx
                .handle_send(session, "ticker".into(), "alice".into(), vec![1, 2, 3])
                .await,
        );

        match resp {
            Response::Sent { delivered } => assert_eq!(delivered, 1),
            other => panic!("Expected Sent, got {}", other.type_name()),
        }
        assert_eq!(events[0].target, EventTarget::Clients(vec!["bob".into()]));
        match &events[0].event {
            Event::Channel(ev) => {
                assert_eq!(ev.sender, "alice");
                assert_eq!(ev.data, vec![1, 2, 3]);
            }
            other => panic!("Expected channel event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_send_with_no_consumers() {
        let (alice, _bob, session) = channel_fixture().await;

        let (resp, events) = response_and_events(
            alice
                .ctx
                .handle_send(session, "ticker".into(), "alice".into(), vec![7])
                .await,
        );
        match resp {
            Response::Sent { delivered } => assert_eq!(delivered, 0),
            other => panic!("Expected Sent, got {}", other.type_name()),
        }
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_consumer_rejected() {
        let (_alice, bob, session) = channel_fixture().await;

        bob.ctx
            .handle_add_consumer(session, "ticker".into(), "bob".into())
            .await;
        match response(
            bob.ctx
                .handle_add_consumer(session, "ticker".into(), "bob".into())
                .await,
        ) {
            Response::Error { code, .. } => assert_eq!(code, ErrorCode::NameInUse),
            other => panic!("Expected Error, got {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn test_remove_consumer() {
        let (alice, bob, session) = channel_fixture().await;
        bob.ctx
            .handle_add_consumer(session, "ticker".into(), "bob".into())
            .await;

        let resp = response(
            bob.ctx
                .handle_remove_consumer(session, "ticker".into(), "bob".into())
                .await,
        );
        assert!(matches!(resp, Response::ConsumerRemoved));

        // Sends now deliver to nobody
        let (resp, _) = response_and_events(
            alice
                .ctx
                .handle_send(session, "ticker".into(), "alice".into(), vec![9])
                .await,
        );
        match resp {
            Response::Sent { delivered } => assert_eq!(delivered, 0),
            other => panic!("Expected Sent, got {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn test_send_unknown_channel() {
        let (alice, _bob, session) = channel_fixture().await;

        match response(
            alice
                .ctx
                .handle_send(session, "missing".into(), "alice".into(), vec![])
                .await,
        ) {
            Response::Error { code, .. } => assert_eq!(code, ErrorCode::ObjectNotFound),
            other => panic!("Expected Error, got {}", other.type_name()),
        }
    }
}
