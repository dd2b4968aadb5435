//! Request, response, and event bodies
//!
//! Bodies ride as bincode payloads behind the fixed frame header. The
//! header's action is derived from the body on encode and verified against
//! it on decode, so the reader loop can route replies, events, and
//! fragments without deserializing anything.

use serde::{Deserialize, Serialize};

use crate::codec::CodecError;
use crate::frame::{Action, Frame, FrameHeader, ObjectType, EVENT_THREAD};
use crate::types::{
    ByteArrayEvent, ChannelEvent, SessionEvent, SessionInfo, TokenEvent, TokenStatus,
};

/// Messages sent from client to server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Request {
    /// Initial connection handshake
    Attach {
        client_name: String,
        protocol_version: u32,
    },

    /// Keep-alive probe
    Ping,

    // ==================== Registry ====================
    /// Bind a session name, creating the session
    Bind { name: String },

    /// Unbind (and destroy) a session
    Unbind { name: String },

    /// Look up a bound session by name
    Lookup { name: String },

    /// List bound session names
    ListBindings,

    // ==================== Session membership ====================
    /// Join the session addressed by the frame's session number
    Join { client: String },

    /// Leave the session
    Leave { client: String },

    /// Invite another client into the session
    Invite { client: String, invitee: String },

    /// Expel a client from the session
    Expel { client: String, target: String },

    /// List joined client names
    ListClients,

    // ==================== Object lifecycle ====================
    //
    // The object kind comes from the frame header's object type.
    /// Create a named object in the session
    Create { name: String, client: String },

    /// Destroy a named object, force-removing holders/consumers
    Destroy { name: String, client: String },

    /// Test whether a named object exists
    Exists { name: String },

    // ==================== Token ====================
    /// Take or share ownership of a token
    Grab {
        token: String,
        client: String,
        exclusive: bool,
    },

    /// Give the token away to a named recipient
    Give {
        token: String,
        client: String,
        recipient: String,
    },

    /// Recipient's answer to a Given event (fire-and-forget)
    GiveResponse {
        token: String,
        recipient: String,
        accept: bool,
    },

    /// Drop ownership of a token
    Release { token: String, client: String },

    /// Ask current holders to voluntarily release or give
    RequestToken { token: String, client: String },

    /// Read the derived token status
    Test { token: String },

    /// Snapshot of current holder names, sorted
    ListHolders { token: String },

    // ==================== Channel ====================
    /// Multicast data to every consumer of the channel
    Send {
        channel: String,
        sender: String,
        data: Vec<u8>,
    },

    /// Register the client as a consumer
    AddConsumer { channel: String, client: String },

    /// Unregister the client as a consumer
    RemoveConsumer { channel: String, client: String },

    // ==================== ByteArray ====================
    /// Replace the replicated value
    SetValue {
        array: String,
        client: String,
        value: Vec<u8>,
    },
}

impl Request {
    /// The action code this request carries in its frame header
    pub fn action(&self) -> Action {
        match self {
            Request::Attach { .. } => Action::Attach,
            Request::Ping => Action::Ping,
            Request::Bind { .. } => Action::Bind,
            Request::Unbind { .. } => Action::Unbind,
            Request::Lookup { .. } => Action::Lookup,
            Request::ListBindings => Action::ListBindings,
            Request::Join { .. } => Action::Join,
            Request::Leave { .. } => Action::Leave,
            Request::Invite { .. } => Action::Invite,
            Request::Expel { .. } => Action::Expel,
            Request::ListClients => Action::ListClients,
            Request::Create { .. } => Action::Create,
            Request::Destroy { .. } => Action::Destroy,
            Request::Exists { .. } => Action::Exists,
            Request::Grab { .. } => Action::Grab,
            Request::Give { .. } => Action::Give,
            Request::GiveResponse { .. } => Action::GiveResponse,
            Request::Release { .. } => Action::Release,
            Request::RequestToken { .. } => Action::Request,
            Request::Test { .. } => Action::Test,
            Request::ListHolders { .. } => Action::ListHolders,
            Request::Send { .. } => Action::Send,
            Request::AddConsumer { .. } => Action::AddConsumer,
            Request::RemoveConsumer { .. } => Action::RemoveConsumer,
            Request::SetValue { .. } => Action::SetValue,
        }
    }

    /// The object type this request carries in its frame header
    ///
    /// Connection-scope requests (Attach, Ping) and membership requests ride
    /// as Session frames; registry requests as Registry frames; the rest
    /// name their kind. Lifecycle requests (Create/Destroy/Exists) rely on
    /// the caller passing the kind explicitly via [`Request::to_frame_for`].
    pub fn object_type(&self) -> ObjectType {
        match self {
            Request::Attach { .. }
            | Request::Ping
            | Request::Join { .. }
            | Request::Leave { .. }
            | Request::Invite { .. }
            | Request::Expel { .. }
            | Request::ListClients
            | Request::Create { .. }
            | Request::Destroy { .. }
            | Request::Exists { .. } => ObjectType::Session,
            Request::Bind { .. }
            | Request::Unbind { .. }
            | Request::Lookup { .. }
            | Request::ListBindings => ObjectType::Registry,
            Request::Grab { .. }
            | Request::Give { .. }
            | Request::GiveResponse { .. }
            | Request::Release { .. }
            | Request::RequestToken { .. }
            | Request::Test { .. }
            | Request::ListHolders { .. } => ObjectType::Token,
            Request::Send { .. }
            | Request::AddConsumer { .. }
            | Request::RemoveConsumer { .. } => ObjectType::Channel,
            Request::SetValue { .. } => ObjectType::ByteArray,
        }
    }

    /// Return the message type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Request::Attach { .. } => "Attach",
            Request::Ping => "Ping",
            Request::Bind { .. } => "Bind",
            Request::Unbind { .. } => "Unbind",
            Request::Lookup { .. } => "Lookup",
            Request::ListBindings => "ListBindings",
            Request::Join { .. } => "Join",
            Request::Leave { .. } => "Leave",
            Request::Invite { .. } => "Invite",
            Request::Expel { .. } => "Expel",
            Request::ListClients => "ListClients",
            Request::Create { .. } => "Create",
            Request::Destroy { .. } => "Destroy",
            Request::Exists { .. } => "Exists",
            Request::Grab { .. } => "Grab",
            Request::Give { .. } => "Give",
            Request::GiveResponse { .. } => "GiveResponse",
            Request::Release { .. } => "Release",
            Request::RequestToken { .. } => "RequestToken",
            Request::Test { .. } => "Test",
            Request::ListHolders { .. } => "ListHolders",
            Request::Send { .. } => "Send",
            Request::AddConsumer { .. } => "AddConsumer",
            Request::RemoveConsumer { .. } => "RemoveConsumer",
            Request::SetValue { .. } => "SetValue",
        }
    }

    /// Encode into a frame addressed at a session, with this request's
    /// natural object type
    pub fn to_frame(&self, session_number: u16, thread_id: u32) -> Result<Frame, CodecError> {
        self.to_frame_for(session_number, thread_id, self.object_type())
    }

    /// Encode into a frame with an explicit object type (lifecycle requests
    /// addressing tokens, channels, or byte arrays)
    pub fn to_frame_for(
        &self,
        session_number: u16,
        thread_id: u32,
        object_type: ObjectType,
    ) -> Result<Frame, CodecError> {
        let payload = bincode::serialize(self)?;
        let header = FrameHeader::new(session_number, thread_id, object_type, self.action());
        Ok(Frame::new(header, payload.into()))
    }

    /// Decode from a reassembled frame, verifying the header's action
    /// matches the body
    pub fn from_frame(frame: &Frame) -> Result<Self, CodecError> {
        let request: Request = bincode::deserialize(&frame.payload)?;
        if request.action() != frame.header.action {
            return Err(CodecError::HeaderMismatch {
                header: frame.header.action,
                body: request.type_name(),
            });
        }
        Ok(request)
    }
}

/// Messages sent from server to client in answer to a request
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Response {
    /// Connection accepted
    Attached {
        server_version: String,
        protocol_version: u32,
    },

    /// Keep-alive answer
    Pong,

    /// Session bound and created
    Bound { session: SessionInfo },

    /// Session unbound and destroyed
    Unbound,

    /// Lookup result
    Binding { session: SessionInfo },

    /// Bound session names, sorted
    BindingList { names: Vec<String> },

    /// Joined the session
    Joined { session: SessionInfo },

    /// Left the session
    Left,

    /// Invitation delivered
    Invited,

    /// Target expelled
    Expelled,

    /// Joined client names, sorted
    ClientList { names: Vec<String> },

    /// Object created
    Created,

    /// Object destroyed
    Destroyed,

    /// Existence probe result
    Exists { exists: bool },

    /// Resulting token status for grab/give/release/request/test
    TokenStatus { status: TokenStatus },

    /// Holder names, sorted
    HolderList { names: Vec<String> },

    /// Channel data accepted; number of consumers it was delivered to
    Sent { delivered: usize },

    /// Consumer registered
    ConsumerAdded,

    /// Consumer unregistered
    ConsumerRemoved,

    /// Byte array value replaced
    ValueSet,

    /// Error response
    Error { code: ErrorCode, message: String },
}

impl Response {
    /// Return the message type name for logging
    pub fn type_name(&self) -> &'static str {
        match self {
            Response::Attached { .. } => "Attached",
            Response::Pong => "Pong",
            Response::Bound { .. } => "Bound",
            Response::Unbound => "Unbound",
            Response::Binding { .. } => "Binding",
            Response::BindingList { .. } => "BindingList",
            Response::Joined { .. } => "Joined",
            Response::Left => "Left",
            Response::Invited => "Invited",
            Response::Expelled => "Expelled",
            Response::ClientList { .. } => "ClientList",
            Response::Created => "Created",
            Response::Destroyed => "Destroyed",
            Response::Exists { .. } => "Exists",
            Response::TokenStatus { .. } => "TokenStatus",
            Response::HolderList { .. } => "HolderList",
            Response::Sent { .. } => "Sent",
            Response::ConsumerAdded => "ConsumerAdded",
            Response::ConsumerRemoved => "ConsumerRemoved",
            Response::ValueSet => "ValueSet",
            Response::Error { .. } => "Error",
        }
    }

    /// Encode into the reply frame for a request, echoing its correlation
    /// key
    pub fn reply_frame(&self, request_header: &FrameHeader) -> Result<Frame, CodecError> {
        let payload = bincode::serialize(self)?;
        Ok(Frame::new(request_header.reply_to(), payload.into()))
    }

    /// Decode from a reply frame
    pub fn from_frame(frame: &Frame) -> Result<Self, CodecError> {
        Ok(bincode::deserialize(&frame.payload)?)
    }
}

/// Unsolicited server-initiated deliveries
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Event {
    Session(SessionEvent),
    Token(TokenEvent),
    Channel(ChannelEvent),
    ByteArray(ByteArrayEvent),
}

impl Event {
    /// The object type this event carries in its frame header
    pub fn object_type(&self) -> ObjectType {
        match self {
            Event::Session(_) => ObjectType::Session,
            Event::Token(_) => ObjectType::Token,
            Event::Channel(_) => ObjectType::Channel,
            Event::ByteArray(_) => ObjectType::ByteArray,
        }
    }

    /// Encode into an event frame for a session
    pub fn to_frame(&self, session_number: u16) -> Result<Frame, CodecError> {
        let payload = bincode::serialize(self)?;
        let header = FrameHeader::new(
            session_number,
            EVENT_THREAD,
            self.object_type(),
            Action::Event,
        );
        Ok(Frame::new(header, payload.into()))
    }

    /// Decode from an event frame
    pub fn from_frame(frame: &Frame) -> Result<Self, CodecError> {
        Ok(bincode::deserialize(&frame.payload)?)
    }
}

/// Error codes for protocol errors
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ErrorCode {
    /// Holder-state conflict: the operation violates grab/give invariants
    PermissionDenied,
    /// Release by a client that is not a holder
    ClientNotGrabbing,
    /// Release could not clear a pending give
    ClientNotReleased,
    SessionNotFound,
    ObjectNotFound,
    ClientNotFound,
    NameInUse,
    NotBound,
    ProtocolMismatch,
    InvalidOperation,
    InternalError,
}
