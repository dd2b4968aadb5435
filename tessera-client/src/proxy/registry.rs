//! Registry name-service proxy

use std::sync::Arc;

use tessera_protocol::{Request, Response, SessionInfo, RESERVED_SESSION};
use tessera_utils::Result;

use crate::connection::Connection;

use super::unexpected;

/// Proxy for the server-scoped registry of session names
pub struct RegistryProxy {
    conn: Arc<Connection>,
}

impl RegistryProxy {
    pub fn new(conn: Arc<Connection>) -> Self {
        Self { conn }
    }

    /// Bind a name, creating its session
    pub async fn bind(&self, name: &str) -> Result<SessionInfo> {
        let request = Request::Bind { name: name.into() };
        match self.conn.round_trip(RESERVED_SESSION, &request).await? {
            Response::Bound { session } => Ok(session),
            other => Err(unexpected(&other)),
        }
    }

    /// Unbind a name, destroying its session
    pub async fn unbind(&self, name: &str) -> Result<()> {
        let request = Request::Unbind { name: name.into() };
        match self.conn.round_trip(RESERVED_SESSION, &request).await? {
            Response::Unbound => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Resolve a bound name
    pub async fn lookup(&self, name: &str) -> Result<SessionInfo> {
        let request = Request::Lookup { name: name.into() };
        match self.conn.round_trip(RESERVED_SESSION, &request).await? {
            Response::Binding { session } => Ok(session),
            other => Err(unexpected(&other)),
        }
    }

    /// Bound session names, sorted
    pub async fn list(&self) -> Result<Vec<String>> {
        match self
            .conn
            .round_trip(RESERVED_SESSION, &Request::ListBindings)
            .await?
        {
            Response::BindingList { names } => Ok(names),
            other => Err(unexpected(&other)),
        }
    }
}
