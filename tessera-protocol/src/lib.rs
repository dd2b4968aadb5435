//! tessera-protocol: Shared wire definitions for client-server communication
//!
//! This crate defines the fixed-layout frame header, payload fragmentation,
//! the length-prefixed codec, and all request/response/event body types
//! exchanged between tessera clients and the session server.

pub mod codec;
pub mod frame;
pub mod messages;
pub mod types;

// Re-export main types at crate root
pub use codec::{CodecError, FrameCodec, MAX_FRAME_SIZE};
pub use frame::{
    defragment, fragment, Action, Defragmenter, Frame, FrameError, FrameHeader, ObjectType,
    EVENT_THREAD, FRAME_VERSION, HEADER_LEN, RESERVED_SESSION,
};
pub use messages::{ErrorCode, Event, Request, Response};
pub use types::{
    ByteArrayEvent, ChannelEvent, HoldMode, SessionEvent, SessionEventKind, SessionInfo,
    TokenEvent, TokenEventKind, TokenStatus,
};

/// Current protocol version, carried in every Attach exchange
pub const PROTOCOL_VERSION: u32 = 1;
