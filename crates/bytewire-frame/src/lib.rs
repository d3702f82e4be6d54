//! Checksummed framing for unreliable byte streams.
//!
//! Every frame on the wire looks like:
//! - An optional start-of-frame marker byte
//! - Big-endian id, length and type fields (1 to 4 bytes each)
//! - An optional header checksum
//! - The payload, followed by its own checksum when non-empty
//!
//! The [`Parser`] consumes bytes one at a time and resynchronizes on its
//! own after corruption or a stall. The [`Composer`] writes frames through
//! a small transmit buffer so payloads of any length stream out in chunks.

pub mod checksum;
pub mod codec;
pub mod composer;
pub mod config;
pub mod error;
pub mod parser;
pub mod reader;
pub mod sink;

pub use checksum::{Checksum, ChecksumKind};
pub use codec::{encode_frame, encode_header, wire_size, Header, Message};
pub use composer::{Composer, OpenFrame};
pub use config::{
    FrameConfig, DEFAULT_MAX_RX_PAYLOAD, DEFAULT_PARSER_TIMEOUT_TICKS, DEFAULT_SOF_BYTE,
    DEFAULT_TX_BUFFER_LEN,
};
pub use error::{ErrorKind, FrameError, ProtocolError, Result};
pub use parser::{ParseEvent, Parser, ParserState};
pub use reader::FrameReader;
pub use sink::{IoSink, Sink};
