//! Frame header layout and payload fragmentation
//!
//! Every unit on the wire is a fixed 9-byte big-endian header followed by an
//! opaque payload. Payload length is carried by the transport codec's length
//! prefix, never by the header itself.

use std::collections::HashMap;

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Frame header version byte
pub const FRAME_VERSION: u8 = 1;

/// Encoded header length in bytes: version(1) + session(2) + thread(4) +
/// object type(1) + action(1)
pub const HEADER_LEN: usize = 9;

/// Session number for connection-scope and registry-scope frames.
///
/// Session number 0 never appears on the wire (the frame would be invalid);
/// real sessions are numbered from 2.
pub const RESERVED_SESSION: u16 = 1;

/// Thread id used by server-initiated event frames, which correlate to no
/// caller.
pub const EVENT_THREAD: u32 = 0;

/// Frame-level error
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("Truncated header: {0} bytes")]
    TruncatedHeader(usize),

    #[error("Unknown object type tag: {0}")]
    UnknownObjectType(u8),

    #[error("Unknown action tag: {0}")]
    UnknownAction(u8),

    #[error("Invalid frame: version={version}, session={session}")]
    InvalidFrame { version: u8, session: u16 },
}

/// Kind of shared object a frame addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ObjectType {
    Session = 1,
    Token = 2,
    Channel = 3,
    ByteArray = 4,
    Registry = 5,
}

impl ObjectType {
    pub fn from_u8(tag: u8) -> Result<Self, FrameError> {
        match tag {
            1 => Ok(Self::Session),
            2 => Ok(Self::Token),
            3 => Ok(Self::Channel),
            4 => Ok(Self::ByteArray),
            5 => Ok(Self::Registry),
            other => Err(FrameError::UnknownObjectType(other)),
        }
    }
}

/// Action code carried by every frame
///
/// `Reply` tags a frame as the answer to an outstanding request (matched by
/// thread id), `Event` tags an unsolicited server-initiated delivery, and
/// `Fragment` is the reserved marker for an intermediate chunk of an
/// oversized payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Action {
    Reply = 1,
    Event = 2,
    Fragment = 3,

    // Connection scope
    Attach = 4,
    Ping = 5,

    // Object lifecycle
    Create = 6,
    Destroy = 7,
    Exists = 8,

    // Session membership
    Join = 9,
    Leave = 10,
    Invite = 11,
    Expel = 12,
    ListClients = 13,

    // Token
    Grab = 14,
    Give = 15,
    GiveResponse = 16,
    Release = 17,
    Request = 18,
    Test = 19,
    ListHolders = 20,

    // Channel
    Send = 21,
    AddConsumer = 22,
    RemoveConsumer = 23,

    // ByteArray
    SetValue = 24,

    // Registry
    Bind = 25,
    Unbind = 26,
    Lookup = 27,
    ListBindings = 28,
}

impl Action {
    pub fn from_u8(tag: u8) -> Result<Self, FrameError> {
        match tag {
            1 => Ok(Self::Reply),
            2 => Ok(Self::Event),
            3 => Ok(Self::Fragment),
            4 => Ok(Self::Attach),
            5 => Ok(Self::Ping),
            6 => Ok(Self::Create),
            7 => Ok(Self::Destroy),
            8 => Ok(Self::Exists),
            9 => Ok(Self::Join),
            10 => Ok(Self::Leave),
            11 => Ok(Self::Invite),
            12 => Ok(Self::Expel),
            13 => Ok(Self::ListClients),
            14 => Ok(Self::Grab),
            15 => Ok(Self::Give),
            16 => Ok(Self::GiveResponse),
            17 => Ok(Self::Release),
            18 => Ok(Self::Request),
            19 => Ok(Self::Test),
            20 => Ok(Self::ListHolders),
            21 => Ok(Self::Send),
            22 => Ok(Self::AddConsumer),
            23 => Ok(Self::RemoveConsumer),
            24 => Ok(Self::SetValue),
            25 => Ok(Self::Bind),
            26 => Ok(Self::Unbind),
            27 => Ok(Self::Lookup),
            28 => Ok(Self::ListBindings),
            other => Err(FrameError::UnknownAction(other)),
        }
    }
}

/// Fixed-layout frame header, immutable once sent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub version: u8,
    pub session_number: u16,
    pub thread_id: u32,
    pub object_type: ObjectType,
    pub action: Action,
}

impl FrameHeader {
    pub fn new(
        session_number: u16,
        thread_id: u32,
        object_type: ObjectType,
        action: Action,
    ) -> Self {
        Self {
            version: FRAME_VERSION,
            session_number,
            thread_id,
            object_type,
            action,
        }
    }

    /// Header for the reply to a request frame: same session, same thread id
    pub fn reply_to(&self) -> Self {
        Self {
            version: FRAME_VERSION,
            session_number: self.session_number,
            thread_id: self.thread_id,
            object_type: self.object_type,
            action: Action::Reply,
        }
    }

    /// Header for an intermediate fragment of this frame's payload
    pub fn fragment(&self) -> Self {
        Self {
            action: Action::Fragment,
            ..*self
        }
    }

    /// A frame is valid only if version and session number are non-zero.
    ///
    /// Object type and action are enforced by construction; a zero tag never
    /// decodes. Invalid frames are discarded by the reader loop with no
    /// reply.
    pub fn is_valid(&self) -> bool {
        self.version != 0 && self.session_number != 0
    }

    /// Encode as fixed-width network byte order
    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_u8(self.version);
        dst.put_u16(self.session_number);
        dst.put_u32(self.thread_id);
        dst.put_u8(self.object_type as u8);
        dst.put_u8(self.action as u8);
    }

    /// Decode from the front of a buffer
    pub fn decode(src: &mut impl Buf) -> Result<Self, FrameError> {
        if src.remaining() < HEADER_LEN {
            return Err(FrameError::TruncatedHeader(src.remaining()));
        }
        let version = src.get_u8();
        let session_number = src.get_u16();
        let thread_id = src.get_u32();
        let object_type = ObjectType::from_u8(src.get_u8())?;
        let action = Action::from_u8(src.get_u8())?;
        Ok(Self {
            version,
            session_number,
            thread_id,
            object_type,
            action,
        })
    }
}

/// One header-plus-payload unit exchanged over a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Bytes,
}

impl Frame {
    pub fn new(header: FrameHeader, payload: Bytes) -> Self {
        Self { header, payload }
    }

    /// Split this frame into wire frames no larger than `chunk_size`.
    ///
    /// Intermediate chunks carry `Action::Fragment`; the final chunk carries
    /// the true action, which triggers reassembly on the receiving side.
    pub fn into_wire_frames(self, chunk_size: usize) -> Vec<Frame> {
        if self.payload.len() <= chunk_size {
            return vec![self];
        }

        let chunks = fragment(self.payload, chunk_size);
        let last = chunks.len() - 1;
        chunks
            .into_iter()
            .enumerate()
            .map(|(i, chunk)| {
                let header = if i == last {
                    self.header
                } else {
                    self.header.fragment()
                };
                Frame::new(header, chunk)
            })
            .collect()
    }
}

/// Split a payload into ordered chunks of `chunk_size` bytes; the final
/// chunk holds the remainder. Zero-length payloads produce no chunks.
pub fn fragment(payload: Bytes, chunk_size: usize) -> Vec<Bytes> {
    assert!(chunk_size > 0, "chunk size must be non-zero");

    let mut chunks = Vec::with_capacity(payload.len().div_ceil(chunk_size));
    let mut offset = 0;
    while offset < payload.len() {
        let end = usize::min(offset + chunk_size, payload.len());
        chunks.push(payload.slice(offset..end));
        offset = end;
    }
    chunks
}

/// Reassemble chunks by concatenation in supplied order.
///
/// Does not validate chunk boundaries: callers must guarantee ordered,
/// complete delivery, which holds for a reliable in-order stream transport.
pub fn defragment<I>(chunks: I) -> Bytes
where
    I: IntoIterator<Item = Bytes>,
{
    let mut out = BytesMut::new();
    for chunk in chunks {
        out.extend_from_slice(&chunk);
    }
    out.freeze()
}

/// Per-connection reassembly of fragmented payloads.
///
/// Partial payloads are keyed by (session number, thread id); fragments of
/// one payload arrive contiguously per key because each sender writes its
/// chunks back-to-back and the stream preserves order.
#[derive(Debug, Default)]
pub struct Defragmenter {
    partial: HashMap<(u16, u32), BytesMut>,
}

impl Defragmenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one wire frame; returns a complete frame once the final chunk
    /// (any non-Fragment action) arrives.
    pub fn push(&mut self, frame: Frame) -> Option<Frame> {
        let key = (frame.header.session_number, frame.header.thread_id);

        if frame.header.action == Action::Fragment {
            self.partial
                .entry(key)
                .or_default()
                .extend_from_slice(&frame.payload);
            return None;
        }

        match self.partial.remove(&key) {
            Some(mut buf) => {
                buf.extend_from_slice(&frame.payload);
                Some(Frame::new(frame.header, buf.freeze()))
            }
            None => Some(frame),
        }
    }

    /// Number of in-flight partial payloads (for diagnostics)
    pub fn pending(&self) -> usize {
        self.partial.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header() -> FrameHeader {
        FrameHeader::new(2, 7, ObjectType::Token, Action::Grab)
    }

    #[test]
    fn test_header_roundtrip() {
        let mut buf = BytesMut::new();
        header().encode(&mut buf);
        assert_eq!(buf.len(), HEADER_LEN);

        let decoded = FrameHeader::decode(&mut buf).unwrap();
        assert_eq!(decoded, header());
    }

    #[test]
    fn test_header_network_byte_order() {
        let mut buf = BytesMut::new();
        FrameHeader::new(0x0102, 0x0A0B0C0D, ObjectType::Session, Action::Attach)
            .encode(&mut buf);

        assert_eq!(buf[0], FRAME_VERSION);
        assert_eq!(&buf[1..3], &[0x01, 0x02]);
        assert_eq!(&buf[3..7], &[0x0A, 0x0B, 0x0C, 0x0D]);
    }

    #[test]
    fn test_header_truncated() {
        let mut buf = BytesMut::new();
        buf.put_slice(&[1, 0, 2]);
        assert!(matches!(
            FrameHeader::decode(&mut buf),
            Err(FrameError::TruncatedHeader(3))
        ));
    }

    #[test]
    fn test_header_unknown_tags() {
        let mut buf = BytesMut::new();
        buf.put_u8(1);
        buf.put_u16(2);
        buf.put_u32(7);
        buf.put_u8(0); // object type 0 never decodes
        buf.put_u8(14);
        assert!(matches!(
            FrameHeader::decode(&mut buf),
            Err(FrameError::UnknownObjectType(0))
        ));

        let mut buf = BytesMut::new();
        buf.put_u8(1);
        buf.put_u16(2);
        buf.put_u32(7);
        buf.put_u8(2);
        buf.put_u8(200);
        assert!(matches!(
            FrameHeader::decode(&mut buf),
            Err(FrameError::UnknownAction(200))
        ));
    }

    #[test]
    fn test_validity() {
        assert!(header().is_valid());

        let mut zero_session = header();
        zero_session.session_number = 0;
        assert!(!zero_session.is_valid());

        let mut zero_version = header();
        zero_version.version = 0;
        assert!(!zero_version.is_valid());
    }

    #[test]
    fn test_reply_header_keeps_correlation_key() {
        let reply = header().reply_to();
        assert_eq!(reply.thread_id, 7);
        assert_eq!(reply.session_number, 2);
        assert_eq!(reply.action, Action::Reply);
    }

    #[test]
    fn test_fragment_empty_payload() {
        assert!(fragment(Bytes::new(), 16).is_empty());
    }

    #[test]
    fn test_fragment_smaller_than_chunk() {
        let chunks = fragment(Bytes::from_static(b"abc"), 16);
        assert_eq!(chunks.len(), 1);
        assert_eq!(&chunks[0][..], b"abc");
    }

    #[test]
    fn test_fragment_exact_multiple() {
        let chunks = fragment(Bytes::from(vec![0u8; 32]), 16);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].len(), 16);
        assert_eq!(chunks[1].len(), 16);
    }

    #[test]
    fn test_fragment_1000_bytes_chunk_248() {
        // 4 chunks of 248 bytes and 1 chunk of 8 bytes
        let payload: Bytes = (0..1000u32).map(|i| i as u8).collect::<Vec<_>>().into();
        let chunks = fragment(payload.clone(), 248);

        assert_eq!(chunks.len(), 5);
        for chunk in &chunks[..4] {
            assert_eq!(chunk.len(), 248);
        }
        assert_eq!(chunks[4].len(), 8);

        assert_eq!(defragment(chunks), payload);
    }

    #[test]
    fn test_defragment_roundtrip() {
        for (len, chunk) in [(0usize, 8usize), (1, 8), (7, 8), (8, 8), (9, 8), (4096, 100)] {
            let payload: Bytes = (0..len).map(|i| i as u8).collect::<Vec<_>>().into();
            assert_eq!(defragment(fragment(payload.clone(), chunk)), payload);
        }
    }

    #[test]
    fn test_into_wire_frames_small_payload_untouched() {
        let frame = Frame::new(header(), Bytes::from_static(b"tiny"));
        let frames = frame.clone().into_wire_frames(64);
        assert_eq!(frames, vec![frame]);
    }

    #[test]
    fn test_into_wire_frames_marks_intermediates() {
        let frame = Frame::new(header(), Bytes::from(vec![9u8; 100]));
        let frames = frame.into_wire_frames(40);

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].header.action, Action::Fragment);
        assert_eq!(frames[1].header.action, Action::Fragment);
        assert_eq!(frames[2].header.action, Action::Grab);
        assert_eq!(frames[2].payload.len(), 20);
    }

    #[test]
    fn test_defragmenter_reassembles() {
        let frame = Frame::new(header(), Bytes::from(vec![3u8; 100]));
        let mut defrag = Defragmenter::new();

        let mut out = None;
        for wire in frame.clone().into_wire_frames(33) {
            assert!(out.is_none());
            out = defrag.push(wire);
        }

        let out = out.expect("final chunk completes the payload");
        assert_eq!(out, frame);
        assert_eq!(defrag.pending(), 0);
    }

    #[test]
    fn test_defragmenter_interleaved_threads() {
        let a = Frame::new(
            FrameHeader::new(2, 1, ObjectType::Channel, Action::Send),
            Bytes::from(vec![0xAA; 64]),
        );
        let b = Frame::new(
            FrameHeader::new(2, 2, ObjectType::Channel, Action::Send),
            Bytes::from(vec![0xBB; 64]),
        );

        let mut defrag = Defragmenter::new();
        let a_wire = a.clone().into_wire_frames(32);
        let b_wire = b.clone().into_wire_frames(32);

        // Interleave chunks from two callers; per-thread order is preserved
        assert!(defrag.push(a_wire[0].clone()).is_none());
        assert!(defrag.push(b_wire[0].clone()).is_none());
        assert_eq!(defrag.push(a_wire[1].clone()), Some(a));
        assert_eq!(defrag.push(b_wire[1].clone()), Some(b));
    }

    #[test]
    fn test_defragmenter_passthrough_unfragmented() {
        let frame = Frame::new(header(), Bytes::from_static(b"whole"));
        let mut defrag = Defragmenter::new();
        assert_eq!(defrag.push(frame.clone()), Some(frame));
    }
}
