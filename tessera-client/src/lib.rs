//! tessera-client: Client library for the tessera shared-object toolkit
//!
//! Applications connect to a session server, attach under a client name,
//! and work with shared objects through typed proxies. Every proxy call is
//! executed on the server-side twin and reported back; the correlation
//! engine makes that round trip feel synchronous while unsolicited events
//! arrive on the same connection.

pub mod config;
pub mod connection;
pub mod correlation;
pub mod events;
pub mod proxy;

pub use config::ClientConfig;
pub use connection::Connection;
pub use correlation::{Correlator, SlotState};
pub use events::{
    ByteArrayListener, ChannelConsumer, ListenerRegistry, SessionListener, TokenListener,
};
pub use proxy::{ByteArrayProxy, ChannelProxy, RegistryProxy, SessionHandle, TokenProxy};
