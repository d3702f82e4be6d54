use std::sync::Arc;

use bytes::{BufMut, BytesMut};

use crate::checksum::Checksum;
use crate::codec::Message;
use crate::config::FrameConfig;
use crate::error::ProtocolError;

/// Where the parser is within the current frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParserState {
    AwaitingStart,
    ReadingId,
    ReadingLength,
    ReadingType,
    ReadingHeaderChecksum,
    ReadingPayload,
    ReadingPayloadChecksum,
}

/// Outcome of feeding the parser a byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseEvent {
    /// A complete frame passed every check.
    Message(Message),
    /// The stream was corrupt or stalled; the parser has already recovered.
    Error(ProtocolError),
}

/// Byte-at-a-time frame decoder.
///
/// Feed bytes with [`Parser::accept_byte`] and call [`Parser::tick`]
/// periodically so a stalled partial frame is eventually dropped.
#[derive(Debug)]
pub struct Parser {
    config: FrameConfig,
    checksum: Arc<dyn Checksum>,
    state: ParserState,
    idle_ticks: u32,
    /// Bytes collected for the current field or payload.
    count: usize,
    /// Big-endian accumulator for the field being read.
    field: u32,
    /// Running checksum over the header, then over the payload.
    acc: u32,
    id: u32,
    len: usize,
    msg_type: u32,
    discard: bool,
    buf: BytesMut,
}

impl Parser {
    /// Create a parser using the checksum named in the config.
    pub fn new(config: FrameConfig) -> Self {
        let checksum = Arc::new(config.checksum);
        Self::with_checksum(config, checksum)
    }

    /// Create a parser with an explicit (possibly custom) checksum.
    pub fn with_checksum(config: FrameConfig, checksum: Arc<dyn Checksum>) -> Self {
        let buf = BytesMut::with_capacity(config.max_rx_payload);
        Self {
            config,
            checksum,
            state: ParserState::AwaitingStart,
            idle_ticks: 0,
            count: 0,
            field: 0,
            acc: 0,
            id: 0,
            len: 0,
            msg_type: 0,
            discard: false,
            buf,
        }
    }

    /// Current state.
    pub fn state(&self) -> ParserState {
        self.state
    }

    /// Ticks since the last accepted byte (saturates at the timeout).
    pub fn idle_ticks(&self) -> u32 {
        self.idle_ticks
    }

    /// Parser configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// Drop any partial frame and wait for the next one.
    pub fn reset(&mut self) {
        self.state = ParserState::AwaitingStart;
        self.discard = false;
        self.buf.clear();
    }

    /// Advance the idle counter; resets a stalled partial frame.
    pub fn tick(&mut self) -> Option<ProtocolError> {
        let limit = self.config.parser_timeout_ticks;
        if limit == 0 {
            return None;
        }
        if self.idle_ticks < limit {
            self.idle_ticks += 1;
        }
        if self.idle_ticks >= limit && self.state != ParserState::AwaitingStart {
            let state = self.state;
            self.reset();
            tracing::trace!(?state, "parser stalled, dropping partial frame");
            return Some(ProtocolError::ParserTimeout { state });
        }
        None
    }

    /// Feed one byte.
    pub fn accept_byte(&mut self, byte: u8) -> Option<ParseEvent> {
        self.idle_ticks = 0;

        if self.state == ParserState::AwaitingStart {
            match self.config.sof_byte {
                Some(sof) => {
                    if byte == sof {
                        self.begin_frame();
                    }
                    return None;
                }
                // Without a marker every byte after a frame starts the next one.
                None => self.begin_frame(),
            }
        }

        match self.state {
            ParserState::AwaitingStart => None,
            ParserState::ReadingId => {
                self.acc = self.checksum.add(self.acc, byte);
                if self.collect(byte, self.config.id_width) {
                    self.id = self.field;
                    self.enter(ParserState::ReadingLength);
                }
                None
            }
            ParserState::ReadingLength => {
                self.acc = self.checksum.add(self.acc, byte);
                if self.collect(byte, self.config.len_width) {
                    self.len = self.field as usize;
                    self.enter(ParserState::ReadingType);
                }
                None
            }
            ParserState::ReadingType => {
                self.acc = self.checksum.add(self.acc, byte);
                if !self.collect(byte, self.config.type_width) {
                    return None;
                }
                self.msg_type = self.field;
                if self.checksum.width() > 0 {
                    self.enter(ParserState::ReadingHeaderChecksum);
                    None
                } else {
                    self.header_complete()
                }
            }
            ParserState::ReadingHeaderChecksum => {
                if !self.collect(byte, self.checksum.width()) {
                    return None;
                }
                let computed = self.checksum.finalize(self.acc);
                if computed != self.field {
                    let expected = self.field;
                    self.reset();
                    return Some(ParseEvent::Error(ProtocolError::HeaderChecksumMismatch {
                        expected,
                        computed,
                    }));
                }
                self.header_complete()
            }
            ParserState::ReadingPayload => {
                if !self.discard {
                    self.acc = self.checksum.add(self.acc, byte);
                    self.buf.put_u8(byte);
                }
                self.count += 1;
                if self.count < self.len {
                    return None;
                }
                if self.checksum.width() > 0 {
                    self.enter(ParserState::ReadingPayloadChecksum);
                    None
                } else if self.discard {
                    self.reset();
                    None
                } else {
                    self.finish()
                }
            }
            ParserState::ReadingPayloadChecksum => {
                if !self.collect(byte, self.checksum.width()) {
                    return None;
                }
                if self.discard {
                    // Already reported as oversize when the header arrived.
                    self.reset();
                    return None;
                }
                let computed = self.checksum.finalize(self.acc);
                if computed == self.field {
                    self.finish()
                } else {
                    let expected = self.field;
                    self.reset();
                    Some(ParseEvent::Error(ProtocolError::BodyChecksumMismatch {
                        expected,
                        computed,
                    }))
                }
            }
        }
    }

    fn begin_frame(&mut self) {
        self.acc = self.checksum.start();
        if let Some(sof) = self.config.sof_byte {
            self.acc = self.checksum.add(self.acc, sof);
        }
        self.discard = false;
        self.buf.clear();
        self.enter(ParserState::ReadingId);
    }

    fn enter(&mut self, state: ParserState) {
        self.state = state;
        self.count = 0;
        self.field = 0;
    }

    /// Shift `byte` into the field accumulator; true once `width` bytes are in.
    fn collect(&mut self, byte: u8, width: usize) -> bool {
        self.field = (self.field << 8) | u32::from(byte);
        self.count += 1;
        self.count == width
    }

    fn header_complete(&mut self) -> Option<ParseEvent> {
        if self.len == 0 {
            return self.finish();
        }

        self.enter(ParserState::ReadingPayload);
        self.acc = self.checksum.start();
        if self.len > self.config.max_rx_payload {
            self.discard = true;
            return Some(ParseEvent::Error(ProtocolError::OversizePayload {
                len: self.len,
                capacity: self.config.max_rx_payload,
            }));
        }
        self.buf.reserve(self.len);
        None
    }

    fn finish(&mut self) -> Option<ParseEvent> {
        let msg = Message {
            id: self.id,
            msg_type: self.msg_type,
            payload: self.buf.split().freeze(),
            is_response: false,
        };
        self.reset();
        Some(ParseEvent::Message(msg))
    }
}
