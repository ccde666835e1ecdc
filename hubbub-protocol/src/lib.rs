//! # hubbub-protocol
//!
//! Wire protocol implementation for the hubbub message broker.
//!
//! This crate provides:
//! - Length-prefixed framing (2-byte big-endian prefix)
//! - The one-byte encoding handshake
//! - Command messages serialized in three interchangeable wire formats
//!   (JSON, XML attributes, bincode)
//! - Protocol error types

pub mod codec;
pub mod error;
pub mod frame;
pub mod message;

pub use codec::{decode_payload, encode_message, encode_payload};
pub use error::ProtocolError;
pub use frame::{decode_frame, encode_frame, FrameDecoder, LENGTH_PREFIX_SIZE};
pub use message::{Message, SubscriptionEntry, WireFormat};

/// Default port for the hubbub broker.
pub const DEFAULT_PORT: u16 = 5000;

/// Maximum frame payload size (the largest length the 2-byte prefix can carry).
pub const MAX_FRAME_PAYLOAD: usize = u16::MAX as usize;
