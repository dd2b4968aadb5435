//! Frame codec for socket framing
//!
//! Each wire unit is a u32 length prefix followed by the fixed 9-byte
//! header and the payload. A frame that fails header validation is logged
//! and skipped without killing the decoder: a malformed frame is a protocol
//! violation, not a connection fault.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::frame::{Frame, FrameError, FrameHeader, HEADER_LEN};

/// Maximum frame size (16 MB)
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Codec error
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame error: {0}")]
    Frame(#[from] FrameError),

    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("Header action {header:?} does not match body {body}")]
    HeaderMismatch {
        header: crate::frame::Action,
        body: &'static str,
    },
}

/// Codec for [`Frame`], used identically on both ends of a connection
#[derive(Debug, Default)]
pub struct FrameCodec;

impl FrameCodec {
    pub fn new() -> Self {
        Self
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            // Need at least 4 bytes for length prefix
            if src.len() < 4 {
                return Ok(None);
            }

            // Peek at length without consuming
            let len = u32::from_be_bytes([src[0], src[1], src[2], src[3]]) as usize;

            if len > MAX_FRAME_SIZE {
                return Err(CodecError::FrameTooLarge {
                    size: len,
                    max: MAX_FRAME_SIZE,
                });
            }

            // Check if we have the full frame
            if src.len() < 4 + len {
                src.reserve(4 + len - src.len());
                return Ok(None);
            }

            // Consume length prefix and frame bytes
            src.advance(4);
            let mut data = src.split_to(len);

            let header = match FrameHeader::decode(&mut data) {
                Ok(header) => header,
                Err(e) => {
                    // Discard and keep reading; see module docs
                    warn!("Discarding malformed frame: {}", e);
                    continue;
                }
            };

            if !header.is_valid() {
                warn!(
                    version = header.version,
                    session = header.session_number,
                    "Discarding invalid frame"
                );
                continue;
            }

            return Ok(Some(Frame::new(header, data.freeze())));
        }
    }
}

impl Encoder<Frame> for FrameCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Frame, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let len = HEADER_LEN + item.payload.len();

        if len > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                size: len,
                max: MAX_FRAME_SIZE,
            });
        }

        dst.reserve(4 + len);
        dst.put_u32(len as u32);
        item.header.encode(dst);
        dst.put_slice(&item.payload);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Action, ObjectType};
    use bytes::Bytes;

    fn frame(payload: &'static [u8]) -> Frame {
        Frame::new(
            FrameHeader::new(2, 9, ObjectType::Token, Action::Grab),
            Bytes::from_static(payload),
        )
    }

    #[test]
    fn test_frame_roundtrip() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        let original = frame(b"holder state");
        codec.encode(original.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, original);
        assert!(buf.is_empty());
    }

    #[test]
    fn test_empty_payload_roundtrip() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        let original = frame(b"");
        codec.encode(original.clone(), &mut buf).unwrap();

        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, original);
    }

    #[test]
    fn test_partial_frame() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        codec.encode(frame(b"partial"), &mut buf).unwrap();

        // Split buffer to simulate partial read
        let mut partial = buf.split_to(6);
        assert!(codec.decode(&mut partial).unwrap().is_none());

        // Add rest of frame
        partial.unsplit(buf);
        assert!(codec.decode(&mut partial).unwrap().is_some());
    }

    #[test]
    fn test_frame_too_large_on_decode() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();
        buf.put_u32((MAX_FRAME_SIZE + 1) as u32);

        let result = codec.decode(&mut buf);
        assert!(matches!(result, Err(CodecError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_malformed_frame_skipped() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        // A frame whose action tag is unknown
        buf.put_u32(HEADER_LEN as u32);
        buf.put_u8(1);
        buf.put_u16(2);
        buf.put_u32(5);
        buf.put_u8(2);
        buf.put_u8(255);

        // Followed by a well-formed frame
        let good = frame(b"after the bad one");
        codec.encode(good.clone(), &mut buf).unwrap();

        // The decoder skips the malformed frame and yields the good one
        let decoded = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(decoded, good);
    }

    #[test]
    fn test_zero_session_frame_discarded() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        // Structurally sound header with session number 0
        buf.put_u32(HEADER_LEN as u32);
        buf.put_u8(1);
        buf.put_u16(0);
        buf.put_u32(5);
        buf.put_u8(2);
        buf.put_u8(14);

        assert!(codec.decode(&mut buf).unwrap().is_none());
        assert!(buf.is_empty());
    }

    #[test]
    fn test_multiple_frames_in_buffer() {
        let mut codec = FrameCodec::new();
        let mut buf = BytesMut::new();

        let frames = [frame(b"one"), frame(b"two"), frame(b"three")];
        for f in &frames {
            codec.encode(f.clone(), &mut buf).unwrap();
        }

        for f in &frames {
            let decoded = codec.decode(&mut buf).unwrap().unwrap();
            assert_eq!(&decoded, f);
        }
        assert!(codec.decode(&mut buf).unwrap().is_none());
    }
}
