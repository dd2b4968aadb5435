//! Token operation handlers
//!
//! Handles: Grab, Give, GiveResponse, Release, RequestToken, Test,
//! ListHolders. All mutations run under the session manager's write lock,
//! so operations on one token are linearized.

use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use tessera_protocol::{
    ErrorCode, Event, Response, TokenEvent, TokenEventKind, TokenStatus,
};

use crate::session::{GiveOutcome, Session, TokenError};

use super::{EventOut, EventTarget, HandlerContext, HandlerResult};

impl HandlerContext {
    fn token_error(err: &TokenError) -> HandlerResult {
        let code = match err {
            TokenError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            TokenError::ClientNotGrabbing(_) => ErrorCode::ClientNotGrabbing,
            TokenError::ClientNotReleased(_) => ErrorCode::ClientNotReleased,
        };
        Self::error(code, err.to_string())
    }

    fn require_member(session: &Session, client: &str) -> Option<HandlerResult> {
        if session.has_client(client) {
            None
        } else {
            Some(Self::error(
                ErrorCode::PermissionDenied,
                format!("{} is not in {}", client, session.name()),
            ))
        }
    }

    /// Handle Grab - take or share ownership
    pub async fn handle_grab(
        &self,
        session: u16,
        token: String,
        client: String,
        exclusive: bool,
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
        if let Some(err) = Self::require_member(target, &client) {
            return err;
        }

        // First reference creates the token implicitly
        let entry = target.ensure_token(&token);

        match entry.grab(&client, exclusive) {
            Ok(status) => {
                debug!("{} grabbed {} ({})", client, token, status);
                HandlerResult::ResponseWithEvents {
                    response: Response::TokenStatus { status },
                    events: vec![EventOut {
                        session,
                        target: EventTarget::Session,
                        event: Event::Token(TokenEvent {
                            token,
                            kind: TokenEventKind::Grabbed,
                            actor: client,
                            recipient: None,
                            status,
                        }),
                    }],
                }
            }
            Err(e) => Self::token_error(&e),
        }
    }

    /// Handle Release - drop ownership
    pub async fn handle_release(
        &self,
        session: u16,
        token: String,
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

        let entry = target.ensure_token(&token);

        match entry.release(&client) {
            Ok(status) => {
                debug!("{} released {} ({})", client, token, status);
                HandlerResult::ResponseWithEvents {
                    response: Response::TokenStatus { status },
                    events: vec![EventOut {
                        session,
                        target: EventTarget::Session,
                        event: Event::Token(TokenEvent {
                            token,
                            kind: TokenEventKind::Released,
                            actor: client,
                            recipient: None,
                            status,
                        }),
                    }],
                }
            }
            Err(e) => Self::token_error(&e),
        }
    }

    /// Handle RequestToken - ask current holders to release or give
    ///
    /// A pure notification: holder state is unchanged.
    pub async fn handle_request_token(
        &self,
        session: u16,
        token: String,
        client: String,
    ) -> HandlerResult {
        if let Some(err) = self.verify_actor(&client) {
            return err;
        }

        let manager = self.session_manager.read().await;
        let target = match manager.get(session) {
            Some(target) => target,
            None => {
                return Self::error(ErrorCode::SessionNotFound, format!("session {}", session))
            }
        };

        let entry = match target.token(&token) {
            Ok(entry) => entry,
            Err(e) => return Self::error_from(&e),
        };
        let status = entry.status();
        let holders = entry.holder_names();

        let events = if holders.is_empty() {
            Vec::new()
        } else {
            vec![EventOut {
                session,
                target: EventTarget::Clients(holders),
                event: Event::Token(TokenEvent {
                    token,
                    kind: TokenEventKind::Requested,
                    actor: client,
                    recipient: None,
                    status,
                }),
            }]
        };

        HandlerResult::ResponseWithEvents {
            response: Response::TokenStatus { status },
            events,
        }
    }

    /// Handle Give - start a handoff to a named recipient
    pub async fn handle_give(
        &self,
        session: u16,
        token: String,
        client: String,
        recipient: String,
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
        if let Some(err) = Self::require_member(target, &recipient) {
            return err;
        }

        let entry = target.ensure_token(&token);

        let deadline = Instant::now() + Duration::from_millis(self.config.token.give_timeout_ms);
        match entry.give(&client, &recipient, deadline) {
            Ok(status) => {
                info!("{} giving {} to {}", client, token, recipient);
                HandlerResult::ResponseWithEvents {
                    response: Response::TokenStatus { status },
                    events: vec![EventOut {
                        session,
                        target: EventTarget::Clients(vec![recipient.clone()]),
                        event: Event::Token(TokenEvent {
                            token,
                            kind: TokenEventKind::Given,
                            actor: client,
                            recipient: Some(recipient),
                            status,
                        }),
                    }],
                }
            }
            Err(e) => Self::token_error(&e),
        }
    }

    /// Handle GiveResponse - the recipient's answer (fire-and-forget)
    pub async fn handle_give_response(
        &self,
        session: u16,
        token: String,
        recipient: String,
        accept: bool,
    ) -> HandlerResult {
        if let Some(err) = self.verify_actor(&recipient) {
            return err;
        }

        let mut manager = self.session_manager.write().await;
        let target = match manager.get_mut(session) {
            Some(target) => target,
            None => return HandlerResult::NoResponse,
        };
        let entry = match target.token_mut(&token) {
            Ok(entry) => entry,
            Err(_) => return HandlerResult::NoResponse,
        };

        match entry.resolve_give(&recipient, accept) {
            Some(GiveOutcome::Accepted { giver }) => {
                info!("{} accepted {} from {}", recipient, token, giver);
                HandlerResult::Events(vec![EventOut {
                    session,
                    target: EventTarget::Session,
                    event: Event::Token(TokenEvent {
                        token,
                        kind: TokenEventKind::Grabbed,
                        actor: recipient,
                        recipient: None,
                        status: TokenStatus::Grabbed,
                    }),
                }])
            }
            Some(GiveOutcome::Declined { giver }) => {
                info!("{} declined {} from {}", recipient, token, giver);
                HandlerResult::Events(vec![EventOut {
                    session,
                    target: EventTarget::Clients(vec![giver.clone()]),
                    event: Event::Token(TokenEvent {
                        token,
                        kind: TokenEventKind::Released,
                        actor: giver,
                        recipient: None,
                        status: TokenStatus::NotInUse,
                    }),
                }])
            }
            None => {
                // Stale answer: the give already resolved or timed out
                warn!(
                    "Dropping stale give response for {} from {}",
                    token, recipient
                );
                HandlerResult::NoResponse
            }
        }
    }

    /// Handle Test - read the derived status
    pub async fn handle_test(&self, session: u16, token: String) -> HandlerResult {
        let manager = self.session_manager.read().await;
        let target = match manager.get(session) {
            Some(target) => target,
            None => {
                return Self::error(ErrorCode::SessionNotFound, format!("session {}", session))
            }
        };

        match target.token(&token) {
            Ok(entry) => HandlerResult::Response(Response::TokenStatus {
                status: entry.status(),
            }),
            Err(e) => Self::error_from(&e),
        }
    }

    /// Handle ListHolders - sorted holder snapshot
    pub async fn handle_list_holders(&self, session: u16, token: String) -> HandlerResult {
        let manager = self.session_manager.read().await;
        let target = match manager.get(session) {
            Some(target) => target,
            None => {
                return Self::error(ErrorCode::SessionNotFound, format!("session {}", session))
            }
        };

        match target.token(&token) {
            Ok(entry) => HandlerResult::Response(Response::HolderList {
                names: entry.holder_names(),
            }),
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

    /// Session with a token, alice and bob joined
    async fn token_fixture() -> (TestClient, TestClient, u16) {
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
            .handle_create(session, ObjectType::Token, "baton".into(), "alice".into())
            .await;

        (alice, bob, session)
    }

    fn status_of(resp: Response) -> TokenStatus {
        match resp {
            Response::TokenStatus { status } => status,
            other => panic!("Expected TokenStatus, got {}", other.type_name()),
        }
    }

    fn code_of(resp: Response) -> ErrorCode {
        match resp {
            Response::Error { code, .. } => code,
            other => panic!("Expected Error, got {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn test_grab_release_regrab_scenario() {
        let (alice, bob, session) = token_fixture().await;

        // A grabs exclusively
        let resp = response(
            alice
                .ctx
                .handle_grab(session, "baton".into(), "alice".into(), true)
                .await,
        );
        assert_eq!(status_of(resp), TokenStatus::Grabbed);

        // B fails
        let resp = response(
            bob.ctx
                .handle_grab(session, "baton".into(), "bob".into(), true)
                .await,
        );
        assert_eq!(code_of(resp), ErrorCode::PermissionDenied);

        // A releases
        let resp = response(
            alice
                .ctx
                .handle_release(session, "baton".into(), "alice".into())
                .await,
        );
        assert_eq!(status_of(resp), TokenStatus::NotInUse);

        // B succeeds
        let resp = response(
            bob.ctx
                .handle_grab(session, "baton".into(), "bob".into(), true)
                .await,
        );
        assert_eq!(status_of(resp), TokenStatus::Grabbed);
    }

    #[tokio::test]
    async fn test_grab_emits_session_event() {
        let (alice, _bob, session) = token_fixture().await;

        let (_, events) = response_and_events(
            alice
                .ctx
                .handle_grab(session, "baton".into(), "alice".into(), false)
                .await,
        );
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].target, EventTarget::Session);
        match &events[0].event {
            Event::Token(ev) => {
                assert_eq!(ev.kind, TokenEventKind::Grabbed);
                assert_eq!(ev.status, TokenStatus::Inhibited);
            }
            other => panic!("Expected token event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_release_not_holding() {
        let (alice, _bob, session) = token_fixture().await;

        let resp = response(
            alice
                .ctx
                .handle_release(session, "baton".into(), "alice".into())
                .await,
        );
        assert_eq!(code_of(resp), ErrorCode::ClientNotGrabbing);
    }

    #[tokio::test]
    async fn test_grab_creates_token_implicitly() {
        let (alice, _bob, session) = token_fixture().await;

        // First reference brings the token into being
        let resp = response(
            alice
                .ctx
                .handle_grab(session, "fresh".into(), "alice".into(), true)
                .await,
        );
        assert_eq!(status_of(resp), TokenStatus::Grabbed);

        let resp = response(alice.ctx.handle_test(session, "fresh".into()).await);
        assert_eq!(status_of(resp), TokenStatus::Grabbed);
    }

    #[tokio::test]
    async fn test_release_on_fresh_token_not_grabbing() {
        let (alice, _bob, session) = token_fixture().await;

        let resp = response(
            alice
                .ctx
                .handle_release(session, "fresh".into(), "alice".into())
                .await,
        );
        assert_eq!(code_of(resp), ErrorCode::ClientNotGrabbing);
    }

    #[tokio::test]
    async fn test_test_unknown_token() {
        let (alice, _bob, session) = token_fixture().await;

        let resp = response(alice.ctx.handle_test(session, "never-referenced".into()).await);
        assert_eq!(code_of(resp), ErrorCode::ObjectNotFound);
    }

    #[tokio::test]
    async fn test_grab_requires_membership() {
        let (alice, _bob, session) = token_fixture().await;
        let carol = join_peer(&alice.ctx, "carol");

        let resp = response(
            carol
                .ctx
                .handle_grab(session, "baton".into(), "carol".into(), true)
                .await,
        );
        assert_eq!(code_of(resp), ErrorCode::PermissionDenied);
    }

    #[tokio::test]
    async fn test_request_notifies_holders_only() {
        let (alice, bob, session) = token_fixture().await;
        alice
            .ctx
            .handle_grab(session, "baton".into(), "alice".into(), true)
            .await;

        let (resp, events) = response_and_events(
            bob.ctx
                .handle_request_token(session, "baton".into(), "bob".into())
                .await,
        );
        assert_eq!(status_of(resp), TokenStatus::Grabbed);
        assert_eq!(events.len(), 1);
        assert_eq!(
            events[0].target,
            EventTarget::Clients(vec!["alice".into()])
        );
        match &events[0].event {
            Event::Token(ev) => assert_eq!(ev.kind, TokenEventKind::Requested),
            other => panic!("Expected token event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_request_with_no_holders_emits_nothing() {
        let (alice, _bob, session) = token_fixture().await;

        let (resp, events) = response_and_events(
            alice
                .ctx
                .handle_request_token(session, "baton".into(), "alice".into())
                .await,
        );
        assert_eq!(status_of(resp), TokenStatus::NotInUse);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_give_targets_recipient() {
        let (alice, _bob, session) = token_fixture().await;
        alice
            .ctx
            .handle_grab(session, "baton".into(), "alice".into(), true)
            .await;

        let (resp, events) = response_and_events(
            alice
                .ctx
                .handle_give(session, "baton".into(), "alice".into(), "bob".into())
                .await,
        );
        assert_eq!(status_of(resp), TokenStatus::Giving);
        assert_eq!(events[0].target, EventTarget::Clients(vec!["bob".into()]));
        match &events[0].event {
            Event::Token(ev) => {
                assert_eq!(ev.kind, TokenEventKind::Given);
                assert_eq!(ev.recipient.as_deref(), Some("bob"));
            }
            other => panic!("Expected token event, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_give_blocks_all_grabs_until_resolution() {
        let (alice, bob, session) = token_fixture().await;
        alice
            .ctx
            .handle_grab(session, "baton".into(), "alice".into(), true)
            .await;
        alice
            .ctx
            .handle_give(session, "baton".into(), "alice".into(), "bob".into())
            .await;

        // test() reports Giving; grabs by both parties fail
        let resp = response(alice.ctx.handle_test(session, "baton".into()).await);
        assert_eq!(status_of(resp), TokenStatus::Giving);

        let resp = response(
            alice
                .ctx
                .handle_grab(session, "baton".into(), "alice".into(), true)
                .await,
        );
        assert_eq!(code_of(resp), ErrorCode::PermissionDenied);
        let resp = response(
            bob.ctx
                .handle_grab(session, "baton".into(), "bob".into(), true)
                .await,
        );
        assert_eq!(code_of(resp), ErrorCode::PermissionDenied);

        // Recipient accepts; now grabbed by bob
        let result = bob
            .ctx
            .handle_give_response(session, "baton".into(), "bob".into(), true)
            .await;
        assert!(matches!(result, HandlerResult::Events(_)));

        let resp = response(alice.ctx.handle_test(session, "baton".into()).await);
        assert_eq!(status_of(resp), TokenStatus::Grabbed);

        let resp = response(alice.ctx.handle_list_holders(session, "baton".into()).await);
        match resp {
            Response::HolderList { names } => assert_eq!(names, vec!["bob"]),
            other => panic!("Expected HolderList, got {}", other.type_name()),
        }
    }

    #[tokio::test]
    async fn test_give_decline_notifies_giver() {
        let (alice, bob, session) = token_fixture().await;
        alice
            .ctx
            .handle_grab(session, "baton".into(), "alice".into(), true)
            .await;
        alice
            .ctx
            .handle_give(session, "baton".into(), "alice".into(), "bob".into())
            .await;

        let result = bob
            .ctx
            .handle_give_response(session, "baton".into(), "bob".into(), false)
            .await;
        match result {
            HandlerResult::Events(events) => {
                assert_eq!(events[0].target, EventTarget::Clients(vec!["alice".into()]));
                match &events[0].event {
                    Event::Token(ev) => {
                        assert_eq!(ev.kind, TokenEventKind::Released);
                        assert_eq!(ev.status, TokenStatus::NotInUse);
                    }
                    other => panic!("Expected token event, got {:?}", other),
                }
            }
            _ => panic!("Expected events"),
        }

        let resp = response(alice.ctx.handle_test(session, "baton".into()).await);
        assert_eq!(status_of(resp), TokenStatus::NotInUse);
    }

    #[tokio::test]
    async fn test_stale_give_response_dropped() {
        let (alice, bob, session) = token_fixture().await;
        alice
            .ctx
            .handle_grab(session, "baton".into(), "alice".into(), true)
            .await;

        // No give in flight
        let result = bob
            .ctx
            .handle_give_response(session, "baton".into(), "bob".into(), true)
            .await;
        assert!(matches!(result, HandlerResult::NoResponse));
    }

    #[tokio::test]
    async fn test_give_to_non_member() {
        let (alice, _bob, session) = token_fixture().await;
        alice
            .ctx
            .handle_grab(session, "baton".into(), "alice".into(), true)
            .await;

        let resp = response(
            alice
                .ctx
                .handle_give(session, "baton".into(), "alice".into(), "carol".into())
                .await,
        );
        assert_eq!(code_of(resp), ErrorCode::PermissionDenied);
    }
}
