use crate::parser::ParserState;

/// Errors that can occur while configuring, encoding, or streaming frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The frame configuration is unusable.
    #[error("invalid frame config: {0}")]
    InvalidConfig(String),

    /// The payload does not fit the configured length field.
    #[error("payload too large ({size} bytes, max {max})")]
    PayloadTooLarge { size: usize, max: usize },

    /// A header value does not fit its configured field width.
    #[error("{field} value {value:#x} does not fit in {width} byte(s)")]
    FieldOverflow {
        field: &'static str,
        value: u32,
        width: usize,
    },

    /// Payload bytes were written with no frame open for composition.
    #[error("no frame is being composed")]
    NotComposing,

    /// More payload was written than the frame header declared.
    #[error("payload overrun ({attempted} bytes written, {declared} declared)")]
    PayloadOverrun { declared: usize, attempted: usize },

    /// The frame was closed before its declared payload was written.
    #[error("incomplete payload ({written} of {declared} bytes written)")]
    IncompletePayload { declared: usize, written: usize },

    /// An I/O error occurred while reading or writing frames.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The byte source reached EOF.
    #[error("connection closed")]
    ConnectionClosed,
}

pub type Result<T> = std::result::Result<T, FrameError>;

/// Problems detected on the inbound byte stream.
///
/// These never abort anything: the parser resynchronizes and the error is
/// handed to whoever observes the stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("header checksum mismatch (received {expected:#x}, computed {computed:#x})")]
    HeaderChecksumMismatch { expected: u32, computed: u32 },

    #[error("body checksum mismatch (received {expected:#x}, computed {computed:#x})")]
    BodyChecksumMismatch { expected: u32, computed: u32 },

    #[error("parser timed out in state {state:?}")]
    ParserTimeout { state: ParserState },

    #[error("payload of {len} bytes exceeds receive capacity {capacity}")]
    OversizePayload { len: usize, capacity: usize },

    #[error("unhandled message (id {id:#x}, type {msg_type:#x})")]
    UnhandledMessage { id: u32, msg_type: u32 },
}

impl ProtocolError {
    /// The tag passed to error hooks.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::HeaderChecksumMismatch { .. } => ErrorKind::HeaderChecksumMismatch,
            ProtocolError::BodyChecksumMismatch { .. } => ErrorKind::BodyChecksumMismatch,
            ProtocolError::ParserTimeout { .. } => ErrorKind::ParserTimeout,
            ProtocolError::OversizePayload { .. } => ErrorKind::OversizePayload,
            ProtocolError::UnhandledMessage { .. } => ErrorKind::UnhandledMessage,
        }
    }
}

/// Error-kind tag delivered to an error hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ParserTimeout,
    HeaderChecksumMismatch,
    BodyChecksumMismatch,
    OversizePayload,
    UnhandledMessage,
    RegistrationFailed,
}
