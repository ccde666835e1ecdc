//! Length-prefixed framing.
//!
//! Frame layout (2-byte header + payload):
//!
//! ```text
//! +-------------+-------------------+
//! | payload_len | payload           |
//! |   2 bytes   | payload_len bytes |
//! +-------------+-------------------+
//! ```
//!
//! The length prefix is big-endian and counts payload bytes only. A frame
//! with `payload_len == 0` is valid and carries an empty payload.

use crate::error::ProtocolError;
use crate::MAX_FRAME_PAYLOAD;
use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Size of the length prefix in bytes.
pub const LENGTH_PREFIX_SIZE: usize = 2;

/// Encodes a payload into a length-prefixed frame.
pub fn encode_frame(payload: &[u8]) -> Result<BytesMut, ProtocolError> {
    if payload.len() > MAX_FRAME_PAYLOAD {
        return Err(ProtocolError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_PAYLOAD,
        });
    }

    let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + payload.len());
    buf.put_u16(payload.len() as u16);
    buf.put_slice(payload);
    Ok(buf)
}

/// Decodes one frame from the front of `buf`.
///
/// Returns `Some(payload)` if a complete frame was consumed, or `None` if
/// more data is needed. Every 16-bit length is within bounds, so decoding
/// itself cannot fail.
pub fn decode_frame(buf: &mut BytesMut) -> Option<Bytes> {
    if buf.len() < LENGTH_PREFIX_SIZE {
        return None;
    }

    let payload_len = u16::from_be_bytes([buf[0], buf[1]]) as usize;
    if buf.len() < LENGTH_PREFIX_SIZE + payload_len {
        return None;
    }

    buf.advance(LENGTH_PREFIX_SIZE);
    Some(buf.split_to(payload_len).freeze())
}

/// Incremental frame decoder over a byte stream.
///
/// Socket reads are appended with [`extend`](Self::extend); complete frames
/// are drained with [`next_frame`](Self::next_frame). Bytes of an unfinished
/// frame stay buffered until the rest arrives, so a command split across TCP
/// segments is never handed out in pieces.
pub struct FrameDecoder {
    buffer: BytesMut,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
        }
    }

    /// Appends raw bytes read from the stream.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Returns the next complete frame payload, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        decode_frame(&mut self.buffer)
    }

    /// Returns the number of bytes currently buffered.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Returns whether the buffer ends in an unfinished frame.
    ///
    /// Checked at connection close to distinguish a clean EOF from a peer
    /// that died mid-frame.
    pub fn has_partial(&self) -> bool {
        !self.buffer.is_empty()
    }

    /// Discards all buffered data.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_frame_roundtrip() {
        let payload = br#"{"command":"subscribe","topic":"sensors"}"#;
        let mut encoded = encode_frame(payload).unwrap();

        assert_eq!(encoded.len(), LENGTH_PREFIX_SIZE + payload.len());
        assert_eq!(&encoded[..2], &(payload.len() as u16).to_be_bytes());

        let decoded = decode_frame(&mut encoded).unwrap();
        assert_eq!(&decoded[..], payload);
        assert!(encoded.is_empty());
    }

    #[test]
    fn test_empty_payload() {
        let mut encoded = encode_frame(b"").unwrap();
        assert_eq!(&encoded[..], &[0, 0]);

        let decoded = decode_frame(&mut encoded).unwrap();
        assert!(decoded.is_empty());
    }

    #[test]
    fn test_frame_too_large() {
        let huge = vec![0u8; MAX_FRAME_PAYLOAD + 1];
        let result = encode_frame(&huge);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { .. })));
    }

    #[test]
    fn test_max_size_payload() {
        let payload = vec![0xAB; MAX_FRAME_PAYLOAD];
        let mut encoded = encode_frame(&payload).unwrap();
        let decoded = decode_frame(&mut encoded).unwrap();
        assert_eq!(decoded.len(), MAX_FRAME_PAYLOAD);
    }

    #[test]
    fn test_incomplete_header() {
        let mut buf = BytesMut::from(&[0x00][..]);
        assert!(decode_frame(&mut buf).is_none());
        // The lone byte stays buffered.
        assert_eq!(buf.len(), 1);
    }

    #[test]
    fn test_incomplete_payload() {
        let mut buf = BytesMut::from(&[0x00, 0x05, b'a', b'b'][..]);
        assert!(decode_frame(&mut buf).is_none());
        assert_eq!(buf.len(), 4);
    }

    #[test]
    fn test_multiple_frames_in_buffer() {
        let mut buf = BytesMut::new();
        buf.extend_from_slice(&encode_frame(b"first").unwrap());
        buf.extend_from_slice(&encode_frame(b"second").unwrap());

        assert_eq!(&decode_frame(&mut buf).unwrap()[..], b"first");
        assert_eq!(&decode_frame(&mut buf).unwrap()[..], b"second");
        assert!(decode_frame(&mut buf).is_none());
    }

    #[test]
    fn test_decoder_byte_by_byte() {
        let encoded = encode_frame(b"hello").unwrap();
        let mut decoder = FrameDecoder::new();

        for (i, byte) in encoded.iter().enumerate() {
            decoder.extend(&[*byte]);
            if i < encoded.len() - 1 {
                assert!(decoder.next_frame().is_none());
                assert!(decoder.has_partial());
            }
        }

        let frame = decoder.next_frame().unwrap();
        assert_eq!(&frame[..], b"hello");
        assert!(!decoder.has_partial());
    }

    #[test]
    fn test_decoder_coalesced_frames() {
        // Two frames arriving in one read must come out as two payloads.
        let mut data = encode_frame(b"one").unwrap();
        data.extend_from_slice(&encode_frame(b"two").unwrap());

        let mut decoder = FrameDecoder::new();
        decoder.extend(&data);

        assert_eq!(&decoder.next_frame().unwrap()[..], b"one");
        assert_eq!(&decoder.next_frame().unwrap()[..], b"two");
        assert!(decoder.next_frame().is_none());
    }

    #[test]
    fn test_decoder_buffered_and_clear() {
        let mut decoder = FrameDecoder::new();
        assert_eq!(decoder.buffered(), 0);
        assert!(!decoder.has_partial());

        decoder.extend(&[0x00, 0x09, b'x']);
        assert_eq!(decoder.buffered(), 3);
        assert!(decoder.has_partial());

        decoder.clear();
        assert_eq!(decoder.buffered(), 0);
        assert!(!decoder.has_partial());
    }

    proptest! {
        #[test]
        fn prop_roundtrip_arbitrary_payload(payload in proptest::collection::vec(any::<u8>(), 0..=2048)) {
            let mut encoded = encode_frame(&payload).unwrap();
            let decoded = decode_frame(&mut encoded).unwrap();
            prop_assert_eq!(&decoded[..], &payload[..]);
            prop_assert!(encoded.is_empty());
        }

        #[test]
        fn prop_split_point_never_corrupts(
            payload in proptest::collection::vec(any::<u8>(), 0..=512),
            split in 0usize..=514,
        ) {
            let encoded = encode_frame(&payload).unwrap();
            let split = split.min(encoded.len());

            let mut decoder = FrameDecoder::new();
            decoder.extend(&encoded[..split]);
            if split < encoded.len() {
                prop_assert!(decoder.next_frame().is_none());
            }
            decoder.extend(&encoded[split..]);

            let frame = decoder.next_frame().unwrap();
            prop_assert_eq!(&frame[..], &payload[..]);
            prop_assert!(!decoder.has_partial());
        }
    }
}
