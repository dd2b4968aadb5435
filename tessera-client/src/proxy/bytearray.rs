//! Byte array proxy

use std::sync::Arc;

use tessera_protocol::{ObjectType, Request, Response};
use tessera_utils::Result;

use crate::connection::Connection;
use crate::events::ByteArrayListener;

use super::unexpected;

/// Proxy for a replicated shared byte buffer
///
/// The server copy is authoritative; local replicas follow it by
/// subscribing a listener for ValueChanged events.
pub struct ByteArrayProxy {
    conn: Arc<Connection>,
    session: u16,
    name: String,
}

impl ByteArrayProxy {
    pub(crate) fn new(conn: Arc<Connection>, session: u16, name: &str) -> Self {
        Self {
            conn,
            session,
            name: name.to_string(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn client(&self) -> String {
        self.conn.client_name().to_string()
    }

    /// Replace the replicated value
    pub async fn set_value(&self, value: Vec<u8>) -> Result<()> {
        let request = Request::SetValue {
            array: self.name.clone(),
            client: self.client(),
            value,
        };
        match self.conn.round_trip(self.session, &request).await? {
            Response::ValueSet => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Destroy the byte array
    pub async fn destroy(&self) -> Result<()> {
        let request = Request::Destroy {
            name: self.name.clone(),
            client: self.client(),
        };
        match self
            .conn
            .round_trip_for(self.session, ObjectType::ByteArray, &request)
            .await?
        {
            Response::Destroyed => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn ByteArrayListener>) {
        self.conn
            .listeners()
            .add_byte_array_listener(&self.name, listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn ByteArrayListener>) -> bool {
        self.conn
            .listeners()
            .remove_byte_array_listener(&self.name, listener)
    }
}
