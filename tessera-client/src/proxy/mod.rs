//! Typed proxies for server-side shared objects
//!
//! A proxy marshals each call into a frame, round-trips it through the
//! correlation engine, and unpacks the reply. Mutations always execute on
//! the remote twin; the proxy mirrors only the last reported state.

mod bytearray;
mod channel;
mod registry;
mod session;
mod token;

pub use bytearray::ByteArrayProxy;
pub use channel::ChannelProxy;
pub use registry::RegistryProxy;
pub use session::SessionHandle;
pub use token::TokenProxy;

use tessera_protocol::Response;
use tessera_utils::TesseraError;

/// A reply of the wrong shape for the request that produced it
pub(crate) fn unexpected(response: &Response) -> TesseraError {
    TesseraError::protocol(format!("unexpected response: {}", response.type_name()))
}
