//! Registry name-service handlers
//!
//! Handles: Bind, Unbind, Lookup, ListBindings. Registry frames ride on the
//! reserved session number; anything else is an invalid operation.

use tracing::info;

use tessera_protocol::{
    ErrorCode, Event, Response, SessionEvent, SessionEventKind, RESERVED_SESSION,
};

use super::{EventOut, EventTarget, HandlerContext, HandlerResult};

impl HandlerContext {
    fn reject_scoped(session: u16) -> Option<HandlerResult> {
        if session != RESERVED_SESSION {
            Some(HandlerContext::error(
                ErrorCode::InvalidOperation,
                format!("registry request on session {}", session),
            ))
        } else {
            None
        }
    }

    /// Handle Bind - create a session under a registry name
    pub async fn handle_bind(&self, session: u16, name: String) -> HandlerResult {
        if let Some(err) = Self::reject_scoped(session) {
            return err;
        }

        let mut manager = self.session_manager.write().await;
        match manager.bind(&name) {
            Ok(session) => {
                info!("Bound session {} as number {}", name, session.number());
                HandlerResult::Response(Response::Bound {
                    session: session.to_info(),
                })
            }
            Err(e) => Self::error_from(&e),
        }
    }

    /// Handle Unbind - destroy the bound session, expelling members
    pub async fn handle_unbind(&self, session: u16, name: String) -> HandlerResult {
        if let Some(err) = Self::reject_scoped(session) {
            return err;
        }

        let mut manager = self.session_manager.write().await;
        let removed = match manager.unbind(&name) {
            Ok(removed) => removed,
            Err(e) => return Self::error_from(&e),
        };
        drop(manager);

        info!("Unbound session {} (number {})", name, removed.number());

        // Detach members now; the event targets them by name, so delivery
        // does not depend on the session index we just tore down
        let members = removed.client_names();
        for member in &members {
            if let Some(id) = self.registry.lookup_name(member) {
                self.registry.detach_from_session(id, removed.number());
            }
        }

        let events = vec![EventOut {
            session: removed.number(),
            target: EventTarget::Clients(members),
            event: Event::Session(SessionEvent {
                session: name,
                kind: SessionEventKind::Destroyed,
                client: String::new(),
            }),
        }];

        HandlerResult::ResponseWithEvents {
            response: Response::Unbound,
            events,
        }
    }

    /// Handle Lookup - resolve a bound name
    pub async fn handle_lookup(&self, session: u16, name: String) -> HandlerResult {
        if let Some(err) = Self::reject_scoped(session) {
            return err;
        }

        let manager = self.session_manager.read().await;
        match manager.get_by_name(&name) {
            Some(session) => HandlerResult::Response(Response::Binding {
                session: session.to_info(),
            }),
            None => HandlerContext::error(ErrorCode::NotBound, name),
        }
    }

    /// Handle ListBindings - sorted bound names
    pub async fn handle_list_bindings(&self, session: u16) -> HandlerResult {
        if let Some(err) = Self::reject_scoped(session) {
            return err;
        }

        let manager = self.session_manager.read().await;
        HandlerResult::Response(Response::BindingList {
            names: manager.list_names(),
        })
    }
}
