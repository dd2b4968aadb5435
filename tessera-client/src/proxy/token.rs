//! Token proxy
//!
//! Every mutating call round-trips through the correlation engine; the
//! proxy keeps only the last status the server reported, for cheap local
//! queries between calls.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tessera_protocol::{
    ObjectType, Request, Response, TokenEventKind, TokenStatus,
};
use tessera_utils::Result;

use crate::connection::Connection;
use crate::events::TokenListener;

use super::unexpected;

/// Proxy for a distributed ownership marker
pub struct TokenProxy {
    conn: Arc<Connection>,
    session: u16,
    name: String,
    last_status: Mutex<Option<TokenStatus>>,
}

impl TokenProxy {
    pub(crate) fn new(conn: Arc<Connection>, session: u16, name: &str) -> Self {
        Self {
            conn,
            session,
            name: name.to_string(),
            last_status: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn client(&self) -> String {
        self.conn.client_name().to_string()
    }

    fn record(&self, status: TokenStatus) -> TokenStatus {
        *self.last_status.lock().expect("status cache poisoned") = Some(status);
        status
    }

    async fn status_call(&self, request: Request) -> Result<TokenStatus> {
        match self.conn.round_trip(self.session, &request).await? {
            Response::TokenStatus { status } => Ok(self.record(status)),
            other => Err(unexpected(&other)),
        }
    }

    /// Take ownership; `exclusive` demands sole possession
    pub async fn grab(&self, exclusive: bool) -> Result<TokenStatus> {
        self.status_call(Request::Grab {
            token: self.name.clone(),
            client: self.client(),
            exclusive,
        })
        .await
    }

    /// Drop ownership
    pub async fn release(&self) -> Result<TokenStatus> {
        self.status_call(Request::Release {
            token: self.name.clone(),
            client: self.client(),
        })
        .await
    }

    /// Ask current holders to voluntarily release or give
    pub async fn request(&self) -> Result<TokenStatus> {
        self.status_call(Request::RequestToken {
            token: self.name.clone(),
            client: self.client(),
        })
        .await
    }

    /// Hand the token to a named recipient
    ///
    /// The handoff stays indeterminate until the recipient answers its
    /// Given event or the server's give timeout reverts it.
    pub async fn give(&self, recipient: &str) -> Result<TokenStatus> {
        self.status_call(Request::Give {
            token: self.name.clone(),
            client: self.client(),
            recipient: recipient.into(),
        })
        .await
    }

    /// Accept a handoff offered to this client (call from a Given
    /// listener). Fire-and-forget: the outcome arrives as a Grabbed event.
    pub async fn accept_give(&self) -> Result<()> {
        self.give_response(true).await
    }

    /// Decline a handoff offered to this client
    pub async fn decline_give(&self) -> Result<()> {
        self.give_response(false).await
    }

    async fn give_response(&self, accept: bool) -> Result<()> {
        let request = Request::GiveResponse {
            token: self.name.clone(),
            recipient: self.client(),
            accept,
        };
        self.conn.fire_and_forget(self.session, &request).await
    }

    /// Read the authoritative status from the server
    pub async fn test(&self) -> Result<TokenStatus> {
        self.status_call(Request::Test {
            token: self.name.clone(),
        })
        .await
    }

    /// The status last reported by the server, without a round trip
    pub fn last_status(&self) -> Option<TokenStatus> {
        *self.last_status.lock().expect("status cache poisoned")
    }

    /// Snapshot of holder names, sorted
    pub async fn list_holder_names(&self) -> Result<Vec<String>> {
        let request = Request::ListHolders {
            token: self.name.clone(),
        };
        match self.conn.round_trip(self.session, &request).await? {
            Response::HolderList { names } => Ok(names),
            other => Err(unexpected(&other)),
        }
    }

    /// Destroy the token, force-removing all holders
    pub async fn destroy(&self) -> Result<()> {
        let request = Request::Destroy {
            name: self.name.clone(),
            client: self.client(),
        };
        match self
            .conn
            .round_trip_for(self.session, ObjectType::Token, &request)
            .await?
        {
            Response::Destroyed => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    /// Subscribe a listener to a set of event kinds for this token
    pub fn add_listener(&self, kinds: HashSet<TokenEventKind>, listener: Arc<dyn TokenListener>) {
        self.conn
            .listeners()
            .add_token_listener(&self.name, kinds, listener);
    }

    /// Subscribe a listener to every event kind
    pub fn add_listener_all(&self, listener: Arc<dyn TokenListener>) {
        self.add_listener(TokenEventKind::ALL.into_iter().collect(), listener);
    }

    pub fn remove_listener(&self, listener: &Arc<dyn TokenListener>) -> bool {
        self.conn
            .listeners()
            .remove_token_listener(&self.name, listener)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::{SinkExt, StreamExt};
    use tempfile::tempdir;
    use tokio::net::UnixListener;
    use tokio_util::codec::Framed;

    use crate::config::ClientConfig;
    use tessera_protocol::{FrameCodec, PROTOCOL_VERSION};

    /// Server answering Attach then scripting token replies
    async fn token_server(listener: UnixListener) {
        let (stream, _) = listener.accept().await.unwrap();
        let mut framed = Framed::new(stream, FrameCodec::new());

        while let Some(Ok(frame)) = framed.next().await {
            let request = Request::from_frame(&frame).unwrap();
            let response = match request {
                Request::Attach { .. } => Response::Attached {
                    server_version: "test".into(),
                    protocol_version: PROTOCOL_VERSION,
                },
                Request::Grab { exclusive, .. } => Response::TokenStatus {
                    status: if exclusive {
                        TokenStatus::Grabbed
                    } else {
                        TokenStatus::Inhibited
                    },
                },
                Request::Release { .. } => Response::TokenStatus {
                    status: TokenStatus::NotInUse,
                },
                Request::ListHolders { .. } => Response::HolderList {
                    names: vec!["alice".into()],
                },
                _ => Response::Pong,
            };
            let reply = response.reply_frame(&frame.header).unwrap();
            framed.send(reply).await.unwrap();
        }
    }

    async fn proxy_fixture(dir: &tempfile::TempDir) -> TokenProxy {
        let path = dir.path().join("test.sock");
        let listener = UnixListener::bind(&path).unwrap();
        tokio::spawn(token_server(listener));

        let conn = Connection::connect(
            path.to_str().unwrap(),
            "alice",
            ClientConfig {
                request_timeout_ms: 500,
                keepalive_interval_ms: 60_000,
                ..ClientConfig::default()
            },
        )
        .await
        .unwrap();

        TokenProxy::new(conn, 2, "baton")
    }

    #[tokio::test]
    async fn test_grab_updates_status_mirror() {
        let dir = tempdir().unwrap();
        let proxy = proxy_fixture(&dir).await;

        assert_eq!(proxy.last_status(), None);

        let status = proxy.grab(true).await.unwrap();
        assert_eq!(status, TokenStatus::Grabbed);
        assert_eq!(proxy.last_status(), Some(TokenStatus::Grabbed));

        let status = proxy.release().await.unwrap();
        assert_eq!(status, TokenStatus::NotInUse);
        assert_eq!(proxy.last_status(), Some(TokenStatus::NotInUse));
    }

    #[tokio::test]
    async fn test_list_holder_names() {
        let dir = tempdir().unwrap();
        let proxy = proxy_fixture(&dir).await;

        let names = proxy.list_holder_names().await.unwrap();
        assert_eq!(names, vec!["alice"]);
    }
}
