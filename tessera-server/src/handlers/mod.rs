//! Message handlers for client requests
//!
//! Routes each decoded `Request` to the appropriate handler and produces a
//! `Response` for the connection loop to send, plus any events to fan out.

mod bytearray;
mod channel;
mod connection;
mod naming;
mod session;
mod token;

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, warn};

use tessera_protocol::{ErrorCode, Event, Frame, Request, Response};
use tessera_utils::TesseraError;

use crate::config::ServerConfig;
use crate::registry::{ClientId, ClientRegistry};
use crate::session::SessionManager;

/// Where an event goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventTarget {
    /// Every client attached to the session
    Session,
    /// Every client attached to the session except the originator
    SessionExceptSelf,
    /// Specific clients by attach name (token holders, a give recipient)
    Clients(Vec<String>),
}

/// An event scheduled for delivery after the handler returns
#[derive(Debug, Clone, PartialEq)]
pub struct EventOut {
    pub session: u16,
    pub target: EventTarget,
    pub event: Event,
}

/// Result of handling a message
pub enum HandlerResult {
    /// Single response to send back to the client
    Response(Response),
    /// Response to client plus events to fan out
    ResponseWithEvents {
        response: Response,
        events: Vec<EventOut>,
    },
    /// No response (fire-and-forget messages and undecodable frames)
    NoResponse,
    /// No response, but events to fan out (give resolution)
    Events(Vec<EventOut>),
}

/// Context for message handlers
///
/// Provides access to all server state needed to handle client requests.
pub struct HandlerContext {
    /// Authoritative session and object state
    pub session_manager: Arc<RwLock<SessionManager>>,
    /// Client connection registry for tracking and fan-out
    pub registry: Arc<ClientRegistry>,
    /// Server configuration (read-only)
    pub config: Arc<ServerConfig>,
    /// The client making this request
    pub client_id: ClientId,
}

impl HandlerContext {
    pub fn new(
        session_manager: Arc<RwLock<SessionManager>>,
        registry: Arc<ClientRegistry>,
        config: Arc<ServerConfig>,
        client_id: ClientId,
    ) -> Self {
        Self {
            session_manager,
            registry,
            config,
            client_id,
        }
    }

    /// Route a reassembled frame to the appropriate handler
    pub async fn route_frame(&self, frame: Frame) -> HandlerResult {
        let request = match Request::from_frame(&frame) {
            Ok(request) => request,
            Err(e) => {
                // Protocol violation: cannot be attributed to a caller, so
                // it is logged here and never surfaced
                warn!("Dropping undecodable frame from {}: {}", self.client_id, e);
                return HandlerResult::NoResponse;
            }
        };

        debug!(
            client = %self.client_id,
            msg = request.type_name(),
            session = frame.header.session_number,
            "Routing request"
        );

        let session = frame.header.session_number;
        let object_type = frame.header.object_type;

        match request {
            // Connection handlers
            Request::Attach {
                client_name,
                protocol_version,
            } => self.handle_attach(client_name, protocol_version),

            Request::Ping => self.handle_ping(),

            // Registry handlers
            Request::Bind { name } => self.handle_bind(session, name).await,
            Request::Unbind { name } => self.handle_unbind(session, name).await,
            Request::Lookup { name } => self.handle_lookup(session, name).await,
            Request::ListBindings => self.handle_list_bindings(session).await,

            // Session membership handlers
            Request::Join { client } => self.handle_join(session, client).await,
            Request::Leave { client } => self.handle_leave(session, client).await,
            Request::Invite { client, invitee } => {
                self.handle_invite(session, client, invitee).await
            }
            Request::Expel { client, target } => self.handle_expel(session, client, target).await,
            Request::ListClients => self.handle_list_clients(session).await,

            // Object lifecycle handlers
            Request::Create { name, client } => {
                self.handle_create(session, object_type, name, client).await
            }
            Request::Destroy { name, client } => {
                self.handle_destroy(session, object_type, name, client)
                    .await
            }
            Request::Exists { name } => self.handle_exists(session, object_type, name).await,

            // Token handlers
            Request::Grab {
                token,
                client,
                exclusive,
            } => self.handle_grab(session, token, client, exclusive).await,

            Request::Give {
                token,
                client,
                recipient,
            } => self.handle_give(session, token, client, recipient).await,

            Request::GiveResponse {
                token,
                recipient,
                accept,
            } => {
                self.handle_give_response(session, token, recipient, accept)
                    .await
            }

            Request::Release { token, client } => {
                self.handle_release(session, token, client).await
            }

            Request::RequestToken { token, client } => {
                self.handle_request_token(session, token, client).await
            }

            Request::Test { token } => self.handle_test(session, token).await,

            Request::ListHolders { token } => self.handle_list_holders(session, token).await,

            // Channel handlers
            Request::Send {
                channel,
                sender,
                data,
            } => self.handle_send(session, channel, sender, data).await,

            Request::AddConsumer { channel, client } => {
                self.handle_add_consumer(session, channel, client).await
            }

            Request::RemoveConsumer { channel, client } => {
                self.handle_remove_consumer(session, channel, client).await
            }

            // ByteArray handlers
            Request::SetValue {
                array,
                client,
                value,
            } => self.handle_set_value(session, array, client, value).await,
        }
    }

    /// Create an error response
    pub fn error(code: ErrorCode, message: impl Into<String>) -> HandlerResult {
        HandlerResult::Response(Response::Error {
            code,
            message: message.into(),
        })
    }

    /// Map a state error onto its wire error code
    pub fn error_from(err: &TesseraError) -> HandlerResult {
        let code = match err {
            TesseraError::PermissionDenied(_) => ErrorCode::PermissionDenied,
            TesseraError::ClientNotGrabbing(_) => ErrorCode::ClientNotGrabbing,
            TesseraError::ClientNotReleased(_) => ErrorCode::ClientNotReleased,
            TesseraError::SessionNotFound(_) => ErrorCode::SessionNotFound,
            TesseraError::ObjectNotFound(_) => ErrorCode::ObjectNotFound,
            TesseraError::ClientNotFound(_) => ErrorCode::ClientNotFound,
            TesseraError::NameInUse(_) => ErrorCode::NameInUse,
            TesseraError::NotBound(_) => ErrorCode::NotBound,
            TesseraError::ProtocolMismatch { .. } => ErrorCode::ProtocolMismatch,
            _ => ErrorCode::InternalError,
        };
        Self::error(code, err.to_string())
    }

    /// Verify that the request's claimed actor is this connection's attach
    /// name; mutating on someone else's behalf is denied
    pub fn verify_actor(&self, claimed: &str) -> Option<HandlerResult> {
        match self.registry.client_name(self.client_id) {
            Some(name) if name == claimed => None,
            Some(name) => Some(Self::error(
                ErrorCode::PermissionDenied,
                format!("connection is attached as {}, not {}", name, claimed),
            )),
            None => Some(Self::error(
                ErrorCode::InvalidOperation,
                "connection has not attached",
            )),
        }
    }
}

impl From<Response> for HandlerResult {
    fn from(msg: Response) -> Self {
        HandlerResult::Response(msg)
    }
}

/// Fan scheduled events out through the client registry
///
/// `originator` is excluded from SessionExceptSelf targets. Delivery is
/// non-blocking throughout: a slow client drops events rather than stalling
/// whichever loop is delivering them.
pub fn deliver_events(
    registry: &ClientRegistry,
    originator: Option<ClientId>,
    events: Vec<EventOut>,
) {
    for out in events {
        let frame = match out.event.to_frame(out.session) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Failed to encode event frame: {}", e);
                continue;
            }
        };

        match out.target {
            EventTarget::Session => {
                registry.broadcast_to_session(out.session, frame, None);
            }
            EventTarget::SessionExceptSelf => {
                registry.broadcast_to_session(out.session, frame, originator);
            }
            EventTarget::Clients(names) => {
                for name in names {
                    registry.try_send_to_named(&name, frame.clone());
                }
            }
        }
    }
}
