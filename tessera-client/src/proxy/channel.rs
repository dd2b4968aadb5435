//! Channel proxy

use std::sync::Arc;

use tokio::sync::mpsc;

use tessera_protocol::{ChannelEvent, ObjectType, Request, Response};
use tessera_utils::Result;

use crate::connection::Connection;
use crate::events::ChannelConsumer;

use super::unexpected;

/// Proxy for an ordered multicast data pipe
pub struct ChannelProxy {
    conn: Arc<Connection>,
    session: u16,
    name: String,
}

impl ChannelProxy {
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

    /// Multicast data to every consumer; returns how many received it
    pub async fn send(&self, data: Vec<u8>) -> Result<usize> {
        let request = Request::Send {
            channel: self.name.clone(),
            sender: self.client(),
            data,
        };
        match self.conn.round_trip(self.session, &request).await? {
            Response::Sent { delivered } => Ok(delivered),
            other => Err(unexpected(&other)),
        }
    }

    /// Register this client as a consumer and subscribe the callback
    pub async fn add_consumer(&self, consumer: Arc<dyn ChannelConsumer>) -> Result<()> {
        let request = Request::AddConsumer {
            channel: self.name.clone(),
            client: self.client(),
        };
        match self.conn.round_trip(self.session, &request).await? {
            Response::ConsumerAdded => {
                self.conn
                    .listeners()
                    .add_channel_consumer(&self.name, consumer);
                Ok(())
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Register as a consumer and receive deliveries through a queue
    ///
    /// The queued alternative to a callback consumer: awaiting the
    /// receiver is the channel's receive operation.
    pub async fn subscribe(&self) -> Result<mpsc::UnboundedReceiver<ChannelEvent>> {
        struct QueueConsumer(mpsc::UnboundedSender<ChannelEvent>);
        impl ChannelConsumer for QueueConsumer {
            fn on_data(&self, event: &ChannelEvent) {
                self.0.send(event.clone()).ok();
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        self.add_consumer(Arc::new(QueueConsumer(tx))).await?;
        Ok(rx)
    }

    /// Unregister this client and drop the callback
    pub async fn remove_consumer(&self, consumer: &Arc<dyn ChannelConsumer>) -> Result<()> {
        let request = Request::RemoveConsumer {
            channel: self.name.clone(),
            client: self.client(),
        };
        match self.conn.round_trip(self.session, &request).await? {
            Response::ConsumerRemoved => {
                self.conn
                    .listeners()
                    .remove_channel_consumer(&self.name, consumer);
                Ok(())
            }
            other => Err(unexpected(&other)),
        }
    }

    /// Destroy the channel
    pub async fn destroy(&self) -> Result<()> {
        let request = Request::Destroy {
            name: self.name.clone(),
            client: self.client(),
        };
        match self
            .conn
            .round_trip_for(self.session, ObjectType::Channel, &request)
            .await?
        {
            Response::Destroyed => Ok(()),
            other => Err(unexpected(&other)),
        }
    }
}
