//! Byte array operation handlers
//!
//! Handles: SetValue. The server copy is authoritative; every session
//! member observes the change through a ValueChanged event.

use tracing::debug;

use tessera_protocol::{ByteArrayEvent, ErrorCode, Event, Response};

use super::{EventOut, EventTarget, HandlerContext, HandlerResult};

impl HandlerContext {
    /// Handle SetValue - replace the replicated value and fan out the change
    pub async fn handle_set_value(
        &self,
        session: u16,
        array: String,
        client: String,
        value: Vec<u8>,
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

        let entry = match target.byte_array_mut(&array) {
            Ok(entry) => entry,
            Err(e) => return Self::error_from(&e),
        };

        let new_value = entry.set_value(value);
        debug!("{} set {} to {} bytes", client, array, new_value.len());

        HandlerResult::ResponseWithEvents {
            response: Response::ValueSet,
            events: vec![EventOut {
                session,
                target: EventTarget::Session,
                event: Event::ByteArray(ByteArrayEvent {
                    array,
                    client,
                    value: new_value,
                }),
            }],
        }
    }
}
