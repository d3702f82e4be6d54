//! Typed, integrity-checked messages over unreliable byte streams.
//!
//! bytewire frames messages for links that drop, duplicate or corrupt bytes
//! (UARTs, radio links, raw sockets): each frame carries an id, a type tag
//! and checksums, and the receiver resynchronizes on its own after damage.
//!
//! # Crate Structure
//!
//! - [`frame`]: checksums, wire codec, byte-at-a-time parser and composer
//! - [`engine`]: listener dispatch, query/response correlation and timeouts
//! - [`logging`]: `tracing` subscriber setup (behind `logging` feature)

/// Re-export frame types.
pub mod frame {
    pub use bytewire_frame::*;
}

/// Re-export engine types.
pub mod engine {
    pub use bytewire_engine::*;
}

#[cfg(feature = "logging")]
pub mod logging;

pub use bytewire_engine::{Engine, EngineConfig, EngineError, IdListener, Listen};
pub use bytewire_frame::{ChecksumKind, FrameConfig, Message};
