//! Session membership and object lifecycle handlers
//!
//! Handles: Join, Leave, Invite, Expel, ListClients, Create, Destroy,
//! Exists.

use tracing::info;

use tessera_protocol::{
    ErrorCode, Event, ObjectType, Response, SessionEvent, SessionEventKind,
};

use super::{EventOut, EventTarget, HandlerContext, HandlerResult};

impl HandlerContext {
    /// Handle Join - add the client to the session's membership
    pub async fn handle_join(&self, session: u16, client: String) -> HandlerResult {
        if let Some(err) = self.verify_actor(&client) {
            return err;
        }

        let mut manager = self.session_manager.write().await;
        let target = match manager.get_mut(session) {
            Some(target) => target,
            None => {
                return HandlerContext::error(
                    ErrorCode::SessionNotFound,
                    format!("session {}", session),
                )
            }
        };

        if let Err(e) = target.join(&client) {
            return Self::error_from(&e);
        }
        let info = target.to_info();
        let name = target.name().to_string();
        drop(manager);

        self.registry.attach_to_session(self.client_id, session);
        info!("{} joined session {}", client, name);

        HandlerResult::ResponseWithEvents {
            response: Response::Joined { session: info },
            events: vec![EventOut {
                session,
                target: EventTarget::SessionExceptSelf,
                event: Event::Session(SessionEvent {
                    session: name,
                    kind: SessionEventKind::Joined,
                    client,
                }),
            }],
        }
    }

    /// Handle Leave - remove the client, scrubbing its holdings
    pub async fn handle_leave(&self, session: u16, client: String) -> HandlerResult {
        if let Some(err) = self.verify_actor(&client) {
            return err;
        }

        let mut manager = self.session_manager.write().await;
        let target = match manager.get_mut(session) {
            Some(target) => target,
            None => {
                return HandlerContext::error(
                    ErrorCode::SessionNotFound,
                    format!("session {}", session),
                )
            }
        };

        if let Err(e) = target.leave(&client) {
            return Self::error_from(&e);
        }
        let name = target.name().to_string();
        let scrub_events = target.scrub_client(&client);
        drop(manager);

        self.registry.detach_from_session(self.client_id, session);
        info!("{} left session {}", client, name);

        let mut events: Vec<EventOut> = scrub_events
            .into_iter()
            .map(|event| EventOut {
                session,
                target: EventTarget::Session,
                event,
            })
            .collect();
        events.push(EventOut {
            session,
            target: EventTarget::SessionExceptSelf,
            event: Event::Session(SessionEvent {
                session: name,
                kind: SessionEventKind::Left,
                client,
            }),
        });

        HandlerResult::ResponseWithEvents {
            response: Response::Left,
            events,
        }
    }

    /// Handle Invite - deliver an invitation to a connected client
    pub async fn handle_invite(
        &self,
        session: u16,
        client: String,
        invitee: String,
    ) -> HandlerResult {
        if let Some(err) = self.verify_actor(&client) {
            return err;
        }

        let manager = self.session_manager.read().await;
        let target = match manager.get(session) {
            Some(target) => target,
            None => {
                return HandlerContext::error(
                    ErrorCode::SessionNotFound,
                    format!("session {}", session),
                )
            }
        };

        if !target.has_client(&client) {
            return HandlerContext::error(
                ErrorCode::PermissionDenied,
                format!("{} is not in {}", client, target.name()),
            );
        }
        let name = target.name().to_string();
        drop(manager);

        if self.registry.lookup_name(&invitee).is_none() {
            return HandlerContext::error(
                ErrorCode::ClientNotFound,
                format!("{} is not connected", invitee),
            );
        }

        HandlerResult::ResponseWithEvents {
            response: Response::Invited,
            events: vec![EventOut {
                session,
                target: EventTarget::Clients(vec![invitee.clone()]),
                event: Event::Session(SessionEvent {
                    session: name,
                    kind: SessionEventKind::Invited,
                    client: invitee,
                }),
            }],
        }
    }

    /// Handle Expel - forcibly remove another client from the session
    pub async fn handle_expel(
        &self,
        session: u16,
        client: String,
        target_client: String,
    ) -> HandlerResult {
        if let Some(err) = self.verify_actor(&client) {
            return err;
        }

        let mut manager = self.session_manager.write().await;
        let target = match manager.get_mut(session) {
            Some(target) => target,
            None => {
                return HandlerContext::error(
                    ErrorCode::SessionNotFound,
                    format!("session {}", session),
                )
            }
        };

        if !target.has_client(&client) {
            return HandlerContext::error(
                ErrorCode::PermissionDenied,
                format!("{} is not in {}", client, target.name()),
            );
        }
        if let Err(e) = target.leave(&target_client) {
            return Self::error_from(&e);
        }
        let name = target.name().to_string();
        let scrub_events = target.scrub_client(&target_client);
        drop(manager);

        if let Some(id) = self.registry.lookup_name(&target_client) {
            self.registry.detach_from_session(id, session);
        }
        info!("{} expelled {} from {}", client, target_client, name);

        let mut events: Vec<EventOut> = scrub_events
            .into_iter()
            .map(|event| EventOut {
                session,
                target: EventTarget::Session,
                event,
            })
            .collect();
        // The expelled client is already detached, so target it by name
        // alongside the remaining members
        let expelled_event = Event::Session(SessionEvent {
            session: name,
            kind: SessionEventKind::Expelled,
            client: target_client.clone(),
        });
        events.push(EventOut {
            session,
            target: EventTarget::Session,
            event: expelled_event.clone(),
        });
        events.push(EventOut {
            session,
            target: EventTarget::Clients(vec![target_client]),
            event: expelled_event,
        });

        HandlerResult::ResponseWithEvents {
            response: Response::Expelled,
            events,
        }
    }

    /// Handle ListClients - sorted membership snapshot
    pub async fn handle_list_clients(&self, session: u16) -> HandlerResult {
        let manager = self.session_manager.read().await;
        match manager.get(session) {
            Some(target) => HandlerResult::Response(Response::ClientList {
                names: target.client_names(),
            }),
            None => HandlerContext::error(
                ErrorCode::SessionNotFound,
                format!("session {}", session),
            ),
        }
    }

    /// Handle Create - create a token, channel, or byte array
    pub async fn handle_create(
        &self,
        session: u16,
        object_type: ObjectType,
        name: String,
        client: String,
    ) -> HandlerResult {
        if let Some(err) = self.verify_actor(&client) {
            return err;
        }

        let mut manager = self.session_manager.write().await;
        let target = match manager.get_mut(session) {
            Some(target) => target,
            None => {
                return HandlerContext::error(
                    ErrorCode::SessionNotFound,
                    format!("session {}", session),
                )
            }
        };

        if !target.has_client(&client) {
            return HandlerContext::error(
                ErrorCode::PermissionDenied,
                format!("{} is not in {}", client, target.name()),
            );
        }

        let created = match object_type {
            ObjectType::Token => target.create_token(&name),
            ObjectType::Channel => target.create_channel(&name),
            ObjectType::ByteArray => target.create_byte_array(&name),
            _ => {
                return HandlerContext::error(
                    ErrorCode::InvalidOperation,
                    format!("cannot create a {:?}", object_type),
                )
            }
        };

        match created {
            Ok(()) => HandlerResult::Response(Response::Created),
            Err(e) => Self::error_from(&e),
        }
    }

    /// Handle Destroy - remove an object, force-removing holders/consumers
    pub async fn handle_destroy(
        &self,
        session: u16,
        object_type: ObjectType,
        name: String,
        client: String,
    ) -> HandlerResult {
        if let Some(err) = self.verify_actor(&client) {
            return err;
        }

        let mut manager = self.session_manager.write().await;
        let target = match manager.get_mut(session) {
            Some(target) => target,
            None => {
                return HandlerContext::error(
                    ErrorCode::SessionNotFound,
                    format!("session {}", session),
                )
            }
        };

        if !target.has_client(&client) {
            return HandlerContext::error(
                ErrorCode::PermissionDenied,
                format!("{} is not in {}", client, target.name()),
            );
        }

        let destroyed = match object_type {
            ObjectType::Token => target.destroy_token(&name),
            ObjectType::Channel => target.destroy_channel(&name).map(|_| Vec::new()),
            ObjectType::ByteArray => target.destroy_byte_array(&name).map(|_| Vec::new()),
            _ => {
                return HandlerContext::error(
                    ErrorCode::InvalidOperation,
                    format!("cannot destroy a {:?}", object_type),
                )
            }
        };

        match destroyed {
            Ok(expulsions) => HandlerResult::ResponseWithEvents {
                response: Response::Destroyed,
                events: expulsions
                    .into_iter()
                    .map(|event| EventOut {
                        session,
                        target: EventTarget::Session,
                        event,
                    })
                    .collect(),
            },
            Err(e) => Self::error_from(&e),
        }
    }

    /// Handle Exists - existence probe
    pub async fn handle_exists(
        &self,
        session: u16,
        object_type: ObjectType,
        name: String,
    ) -> HandlerResult {
        let manager = self.session_manager.read().await;
        let target = match manager.get(session) {
            Some(target) => target,
            None => {
                return HandlerContext::error(
                    ErrorCode::SessionNotFound,
                    format!("session {}", session),
                )
            }
        };

        let exists = match object_type {
            ObjectType::Token => target.has_token(&name),
            ObjectType::Channel => target.has_channel(&name),
            ObjectType::ByteArray => target.has_byte_array(&name),
            _ => {
                return HandlerContext::error(
                    ErrorCode::InvalidOperation,
                    format!("cannot probe a {:?}", object_type),
                )
            }
        };

        HandlerResult::Response(Response::Exists { exists })
    }
}
