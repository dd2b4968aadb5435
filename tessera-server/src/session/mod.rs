//! Authoritative session state: membership and the shared-object tables

mod bytearray;
mod channel;
mod manager;
mod session;
mod token;

pub use bytearray::ByteArray;
pub use channel::Channel;
pub use manager::SessionManager;
pub use session::{ExpiredGive, Session};
pub use token::{GiveOutcome, PendingGive, Token, TokenError};
