//! Session membership proxy and object factory

use std::sync::Arc;

use tessera_protocol::{ObjectType, Request, Response};
use tessera_utils::Result;

use crate::connection::Connection;
use crate::events::SessionListener;

use super::{
    unexpected, ByteArrayProxy, ChannelProxy, RegistryProxy, TokenProxy,
};

/// A joined session: the scope all object proxies hang off
pub struct SessionHandle {
    conn: Arc<Connection>,
    name: String,
    number: u16,
}

impl SessionHandle {
    /// Bind a new session under `name` and join it
    pub async fn bind(conn: Arc<Connection>, name: &str) -> Result<Self> {
        let info = RegistryProxy::new(Arc::clone(&conn)).bind(name).await?;
        Self::join_number(conn, name, info.number).await
    }

    /// Look up an existing session by name and join it
    pub async fn join(conn: Arc<Connection>, name: &str) -> Result<Self> {
        let info = RegistryProxy::new(Arc::clone(&conn)).lookup(name).await?;
        Self::join_number(conn, name, info.number).await
    }

    async fn join_number(conn: Arc<Connection>, name: &str, number: u16) -> Result<Self> {
        let request = Request::Join {
            client: conn.client_name().to_string(),
        };
        match conn.round_trip(number, &request).await? {
            Response::Joined { .. } => Ok(Self {
                conn,
                name: name.to_string(),
                number,
            }),
            other => Err(unexpected(&other)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wire-level session number scoping this session's frames
    pub fn number(&self) -> u16 {
        self.number
    }

    /// The attach name this handle acts as
    pub fn client(&self) -> &str {
        self.conn.client_name()
    }

    pub fn connection(&self) -> &Arc<Connection> {
        &self.conn
    }

    /// Leave the session, releasing every held object
    pub async fn leave(&self) -> Result<()> {
        let request = Request::Leave {
            client: self.client().to_string(),
        };
        match self.conn.round_trip(self.number, &request).await? {
            Response::Left => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Invite another connected client into the session
    pub async fn invite(&self, invitee: &str) -> Result<()> {
        let request = Request::Invite {
            client: self.client().to_string(),
            invitee: invitee.into(),
        };
        match self.conn.round_trip(self.number, &request).await? {
            Response::Invited => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Forcibly remove another client from the session
    pub async fn expel(&self, target: &str) -> Result<()> {
        let request = Request::Expel {
            client: self.client().to_string(),
            target: target.into(),
        };
        match self.conn.round_trip(self.number, &request).await? {
            Response::Expelled => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Joined client names, sorted
    pub async fn client_names(&self) -> Result<Vec<String>> {
        match self
            .conn
            .round_trip(self.number, &Request::ListClients)
            .await?
        {
            Response::ClientList { names } => Ok(names),
            other => Err(unexpected(&other)),
        }
    }

    // ==================== Object factories ====================

    /// Proxy for a token; the token itself springs into being on first
    /// grab
    pub fn token(&self, name: &str) -> TokenProxy {
        TokenProxy::new(Arc::clone(&self.conn), self.number, name)
    }

    /// Explicitly create a token and return its proxy
    pub async fn create_token(&self, name: &str) -> Result<TokenProxy> {
        self.create(ObjectType::Token, name).await?;
        Ok(self.token(name))
    }

    pub fn channel(&self, name: &str) -> ChannelProxy {
        ChannelProxy::new(Arc::clone(&self.conn), self.number, name)
    }

    pub async fn create_channel(&self, name: &str) -> Result<ChannelProxy> {
        self.create(ObjectType::Channel, name).await?;
        Ok(self.channel(name))
    }

    pub fn byte_array(&self, name: &str) -> ByteArrayProxy {
        ByteArrayProxy::new(Arc::clone(&self.conn), self.number, name)
    }

    pub async fn create_byte_array(&self, name: &str) -> Result<ByteArrayProxy> {
        self.create(ObjectType::ByteArray, name).await?;
        Ok(self.byte_array(name))
    }

    /// Probe whether a named object exists
    pub async fn object_exists(&self, kind: ObjectType, name: &str) -> Result<bool> {
        let request = Request::Exists { name: name.into() };
        match self
            .conn
            .round_trip_for(self.number, kind, &request)
            .await?
        {
            Response::Exists { exists } => Ok(exists),
            other => Err(unexpected(&other)),
        }
    }

    async fn create(&self, kind: ObjectType, name: &str) -> Result<()> {
        let request = Request::Create {
            name: name.into(),
            client: self.client().to_string(),
        };
        match self
            .conn
            .round_trip_for(self.number, kind, &request)
            .await?
        {
            Response::Created => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    // ==================== Listeners ====================

    pub fn add_session_listener(&self, listener: Arc<dyn SessionListener>) {
        self.conn.listeners().add_session_listener(listener);
    }

    pub fn remove_session_listener(&self, listener: &Arc<dyn SessionListener>) -> bool {
        self.conn.listeners().remove_session_listener(listener)
    }
}
