//! Client Connection Registry
//!
//! Tracks connected clients, their attach names, and their session
//! memberships, enabling targeted event delivery and per-session fan-out.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use tessera_protocol::Frame;

/// Unique client identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId(u64);

impl ClientId {
    /// Create a ClientId from a raw value (mainly for testing)
    #[cfg(test)]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Get the raw value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Client({})", self.0)
    }
}

/// Entry for a connected client
pub struct ClientEntry {
    /// Channel for sending frames to this client's writer loop
    pub sender: mpsc::Sender<Frame>,
    /// Attach name, set once the handshake completes
    pub name: Option<String>,
    /// Session numbers this client has joined
    pub sessions: HashSet<u16>,
}

impl std::fmt::Debug for ClientEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientEntry")
            .field("name", &self.name)
            .field("sessions", &self.sessions)
            .field("sender_closed", &self.sender.is_closed())
            .finish()
    }
}

/// Registry tracking all connected clients
///
/// Thread-safe for concurrent access from multiple connection tasks.
pub struct ClientRegistry {
    /// Client ID -> Client entry
    clients: DashMap<ClientId, ClientEntry>,
    /// Session number -> Set of client IDs (reverse index for fan-out)
    session_clients: DashMap<u16, HashSet<ClientId>>,
    /// Attach name -> Client ID (for holder-targeted events)
    names: DashMap<String, ClientId>,
    /// Counter for generating unique client IDs
    next_client_id: AtomicU64,
}

impl Default for ClientRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientRegistry {
    pub fn new() -> Self {
        Self {
            clients: DashMap::new(),
            session_clients: DashMap::new(),
            names: DashMap::new(),
            next_client_id: AtomicU64::new(1),
        }
    }

    // ==================== Client Management ====================

    /// Register a new client connection
    ///
    /// Returns the assigned ClientId for this connection.
    pub fn register_client(&self, sender: mpsc::Sender<Frame>) -> ClientId {
        let id = ClientId(self.next_client_id.fetch_add(1, Ordering::SeqCst));

        self.clients.insert(
            id,
            ClientEntry {
                sender,
                name: None,
                sessions: HashSet::new(),
            },
        );
        debug!("Registered client {}", id);

        id
    }

    /// Record the attach name for a client
    ///
    /// Fails (returns false) if the name is taken by another live client.
    pub fn set_client_name(&self, client_id: ClientId, name: &str) -> bool {
        if let Some(existing) = self.names.get(name) {
            if *existing != client_id {
                return false;
            }
        }

        if let Some(mut entry) = self.clients.get_mut(&client_id) {
            if let Some(old) = entry.name.replace(name.to_string()) {
                self.names.remove(&old);
            }
            self.names.insert(name.to_string(), client_id);
            true
        } else {
            false
        }
    }

    /// Get the attach name of a client
    pub fn client_name(&self, client_id: ClientId) -> Option<String> {
        self.clients.get(&client_id)?.name.clone()
    }

    /// Find a client by attach name
    pub fn lookup_name(&self, name: &str) -> Option<ClientId> {
        self.names.get(name).map(|r| *r)
    }

    /// Unregister a client connection
    ///
    /// Removes the client from the registry and cleans up session and name
    /// associations. Returns the entry's name and joined sessions so the
    /// caller can run state cleanup.
    pub fn unregister_client(&self, client_id: ClientId) -> Option<(Option<String>, Vec<u16>)> {
        let (_, entry) = self.clients.remove(&client_id)?;

        for session in &entry.sessions {
            self.remove_client_from_session_index(client_id, *session);
        }
        if let Some(name) = &entry.name {
            self.names.remove(name);
        }
        debug!("Unregistered client {}", client_id);

        Some((entry.name, entry.sessions.into_iter().collect()))
    }

    /// Get the number of connected clients
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    // ==================== Session Association ====================

    /// Record that a client joined a session
    pub fn attach_to_session(&self, client_id: ClientId, session: u16) -> bool {
        let mut entry = match self.clients.get_mut(&client_id) {
            Some(entry) => entry,
            None => return false,
        };
        entry.sessions.insert(session);

        self.session_clients
            .entry(session)
            .or_default()
            .insert(client_id);

        debug!("Client {} attached to session {}", client_id, session);
        true
    }

    /// Record that a client left a session
    pub fn detach_from_session(&self, client_id: ClientId, session: u16) -> bool {
        let mut entry = match self.clients.get_mut(&client_id) {
            Some(entry) => entry,
            None => return false,
        };
        if !entry.sessions.remove(&session) {
            return false;
        }
        drop(entry);

        self.remove_client_from_session_index(client_id, session);
        debug!("Client {} detached from session {}", client_id, session);
        true
    }

    /// Sessions a client has joined
    pub fn client_sessions(&self, client_id: ClientId) -> Vec<u16> {
        self.clients
            .get(&client_id)
            .map(|e| e.sessions.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Get the number of clients attached to a session
    pub fn session_client_count(&self, session: u16) -> usize {
        self.session_clients
            .get(&session)
            .map(|set| set.len())
            .unwrap_or(0)
    }

    /// Helper to remove a client from the session index
    fn remove_client_from_session_index(&self, client_id: ClientId, session: u16) {
        if let Some(mut clients) = self.session_clients.get_mut(&session) {
            clients.remove(&client_id);
            if clients.is_empty() {
                drop(clients); // Release the lock before removing
                self.session_clients.remove(&session);
            }
        }
    }

    // ==================== Frame Delivery ====================

    /// Send a frame to a specific client (non-blocking)
    ///
    /// Returns `true` if the frame was queued. A closed channel means the
    /// client disconnected and it is unregistered; a full channel means the
    /// client is slow to consume and the frame is dropped with a warning.
    pub fn try_send_to_client(&self, client_id: ClientId, frame: Frame) -> bool {
        let sender = match self.clients.get(&client_id) {
            Some(entry) => entry.sender.clone(),
            None => return false,
        };

        match sender.try_send(frame) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Closed(_)) => {
                warn!("Client {} channel closed, removing from registry", client_id);
                self.unregister_client(client_id);
                false
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!("Client {} channel full, frame dropped", client_id);
                false
            }
        }
    }

    /// Send a frame to a client identified by attach name (non-blocking)
    pub fn try_send_to_named(&self, name: &str, frame: Frame) -> bool {
        match self.lookup_name(name) {
            Some(id) => self.try_send_to_client(id, frame),
            None => false,
        }
    }

    /// Broadcast a frame to all clients attached to a session, optionally
    /// excluding one (usually the originator)
    ///
    /// Returns the number of clients that successfully received the frame.
    pub fn broadcast_to_session(
        &self,
        session: u16,
        frame: Frame,
        except: Option<ClientId>,
    ) -> usize {
        let client_ids: Vec<ClientId> = match self.session_clients.get(&session) {
            Some(clients) => clients
                .iter()
                .copied()
                .filter(|id| Some(*id) != except)
                .collect(),
            None => return 0,
        };

        if client_ids.is_empty() {
            return 0;
        }

        debug!(
            "Broadcasting to {} clients in session {}",
            client_ids.len(),
            session
        );

        let mut success_count = 0;
        for client_id in client_ids {
            if self.try_send_to_client(client_id, frame.clone()) {
                success_count += 1;
            }
        }
        success_count
    }
}
