use std::sync::Arc;

use bytes::{BufMut, BytesMut};

use crate::checksum::Checksum;
use crate::codec::{encode_header, put_checksum, Header};
use crate::config::FrameConfig;
use crate::error::{FrameError, Result};
use crate::sink::Sink;

/// Progress of the frame currently being composed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFrame {
    pub id: u32,
    pub declared: usize,
    pub written: usize,
    acc: u32,
}

/// Serializes outbound frames through a fixed-size transmit buffer.
///
/// The buffer is handed to the [`Sink`] whenever it fills, so payloads
/// larger than the buffer stream out in chunks. Only one frame can be open
/// at a time; callers serialize access.
#[derive(Debug)]
pub struct Composer {
    config: FrameConfig,
    checksum: Arc<dyn Checksum>,
    buf: BytesMut,
    next_id: u32,
    open: Option<OpenFrame>,
}

impl Composer {
    /// Create a composer using the checksum named in the config.
    pub fn new(config: FrameConfig) -> Self {
        let checksum = Arc::new(config.checksum);
        Self::with_checksum(config, checksum)
    }

    /// Create a composer with an explicit (possibly custom) checksum.
    pub fn with_checksum(config: FrameConfig, checksum: Arc<dyn Checksum>) -> Self {
        let buf = BytesMut::with_capacity(config.tx_buffer_len);
        Self {
            config,
            checksum,
            buf,
            next_id: 0,
            open: None,
        }
    }

    /// Composer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    /// The frame being composed, if any.
    pub fn open_frame(&self) -> Option<&OpenFrame> {
        self.open.as_ref()
    }

    /// True while a frame is between [`Composer::begin`] and [`Composer::close`].
    pub fn is_open(&self) -> bool {
        self.open.is_some()
    }

    /// The id the next non-response frame will carry.
    pub fn peek_id(&self) -> u32 {
        let mut id = self.next_id & self.config.id_mask();
        if self.config.peer_bit {
            id |= self.config.id_peer_bit();
        }
        id
    }

    /// Pass over the id [`Composer::peek_id`] would return.
    pub fn skip_id(&mut self) {
        self.next_id = self.next_id.wrapping_add(1);
    }

    /// Write the header of a new frame into the transmit buffer.
    ///
    /// Nothing reaches the sink until the buffer fills or the frame closes.
    /// `fresh_id` advances the id counter; pass `false` for responses.
    pub fn begin(&mut self, header: &Header, fresh_id: bool) -> Result<()> {
        debug_assert!(self.open.is_none(), "frame already open");

        self.buf.clear();
        encode_header(&self.config, self.checksum.as_ref(), header, &mut self.buf)?;
        if fresh_id {
            self.next_id = self.next_id.wrapping_add(1);
        }
        self.open = Some(OpenFrame {
            id: header.id,
            declared: header.len,
            written: 0,
            acc: self.checksum.start(),
        });
        Ok(())
    }

    /// Append payload bytes, flushing each time the buffer fills.
    pub fn write_payload(&mut self, data: &[u8], sink: &mut dyn Sink) -> Result<()> {
        let mut frame = self.open.ok_or(FrameError::NotComposing)?;
        let attempted = frame.written + data.len();
        if attempted > frame.declared {
            return Err(FrameError::PayloadOverrun {
                declared: frame.declared,
                attempted,
            });
        }

        let cap = self.config.tx_buffer_len;
        let mut rest = data;
        while !rest.is_empty() {
            if self.buf.len() >= cap {
                flush(&mut self.buf, sink)?;
            }
            let room = cap - self.buf.len();
            let (chunk, tail) = rest.split_at(room.min(rest.len()));
            frame.acc = chunk
                .iter()
                .fold(frame.acc, |acc, &b| self.checksum.add(acc, b));
            self.buf.put_slice(chunk);
            frame.written += chunk.len();
            self.open = Some(frame);
            rest = tail;
        }
        if self.buf.len() >= cap {
            flush(&mut self.buf, sink)?;
        }
        Ok(())
    }

    /// Append the payload checksum and flush whatever is left.
    ///
    /// A frame with an empty payload carries no payload checksum.
    pub fn close(&mut self, sink: &mut dyn Sink) -> Result<()> {
        let frame = self.open.ok_or(FrameError::NotComposing)?;
        if frame.written != frame.declared {
            return Err(FrameError::IncompletePayload {
                declared: frame.declared,
                written: frame.written,
            });
        }
        self.open = None;

        let width = self.checksum.width();
        if frame.declared > 0 && width > 0 {
            if self.config.tx_buffer_len - self.buf.len() < width {
                flush(&mut self.buf, sink)?;
            }
            let value = self.checksum.finalize(frame.acc);
            put_checksum(self.checksum.as_ref(), value, &mut self.buf);
        }
        if !self.buf.is_empty() {
            flush(&mut self.buf, sink)?;
        }
        Ok(())
    }

    /// Drop the open frame and anything still buffered.
    pub fn abort(&mut self) {
        self.open = None;
        self.buf.clear();
    }
}

fn flush(buf: &mut BytesMut, sink: &mut dyn Sink) -> Result<()> {
    tracing::trace!(len = buf.len(), "flushing tx buffer");
    sink.send_bytes(&buf[..])?;
    buf.clear();
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;

    use super::*;
    use crate::checksum::ChecksumKind;
    use crate::codec::encode_frame;

    #[derive(Default)]
    struct Chunks(Vec<Vec<u8>>);

    impl Sink for Chunks {
        fn send_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
            self.0.push(bytes.to_vec());
            Ok(())
        }
    }

    impl Chunks {
        fn joined(&self) -> Vec<u8> {
            self.0.concat()
        }
    }

    fn crc16_config(tx_buffer_len: usize) -> FrameConfig {
        FrameConfig {
            sof_byte: Some(0xAA),
            checksum: ChecksumKind::Crc16,
            tx_buffer_len,
            ..FrameConfig::default()
        }
    }

    fn send(composer: &mut Composer, sink: &mut Chunks, msg_type: u32, payload: &[u8]) -> u32 {
        let id = composer.peek_id();
        let header = Header {
            id,
            len: payload.len(),
            msg_type,
        };
        composer.begin(&header, true).unwrap();
        composer.write_payload(payload, sink).unwrap();
        composer.close(sink).unwrap();
        id
    }

    #[test]
    fn whole_frame_matches_one_shot_encoding() {
        let cfg = crc16_config(128);
        let mut composer = Composer::new(cfg.clone());
        let mut sink = Chunks::default();

        let id = send(&mut composer, &mut sink, 0x22, b"Hello, bytewire\0");

        let mut expected = BytesMut::new();
        encode_frame(&cfg, &cfg.checksum, id, 0x22, b"Hello, bytewire\0", &mut expected).unwrap();
        assert_eq!(sink.0.len(), 1);
        assert_eq!(sink.joined(), expected.to_vec());
        assert!(!composer.is_open());
    }

    #[test]
    fn large_payload_streams_in_buffer_sized_chunks() {
        let cfg = crc16_config(10);
        let mut composer = Composer::new(cfg.clone());
        let mut sink = Chunks::default();
        let payload: Vec<u8> = (0..45).collect();

        let id = send(&mut composer, &mut sink, 3, &payload);

        let mut expected = BytesMut::new();
        encode_frame(&cfg, &cfg.checksum, id, 3, &payload, &mut expected).unwrap();
        assert_eq!(sink.joined(), expected.to_vec());
        assert!(sink.0.iter().all(|chunk| chunk.len() <= 10));
        assert!(sink.0.len() > 1);
    }

    #[test]
    fn checksum_flushes_first_when_it_does_not_fit() {
        // header (7) + 2 payload bytes leaves 1 byte for a 2-byte checksum.
        let cfg = crc16_config(10);
        let mut composer = Composer::new(cfg.clone());
        let mut sink = Chunks::default();

        send(&mut composer, &mut sink, 1, b"ab");

        assert_eq!(sink.0.len(), 2);
        assert_eq!(sink.0[0].len(), 9);
        assert_eq!(sink.0[1].len(), 2);
    }

    #[test]
    fn header_filling_the_buffer_exactly() {
        let cfg = crc16_config(7);
        let mut composer = Composer::new(cfg.clone());
        let mut sink = Chunks::default();

        let id = send(&mut composer, &mut sink, 1, b"abcdefghij");

        let mut expected = BytesMut::new();
        encode_frame(&cfg, &cfg.checksum, id, 1, b"abcdefghij", &mut expected).unwrap();
        assert_eq!(sink.joined(), expected.to_vec());
    }

    #[test]
    fn empty_payload_sends_header_only() {
        let cfg = crc16_config(64);
        let mut composer = Composer::new(cfg.clone());
        let mut sink = Chunks::default();

        send(&mut composer, &mut sink, 1, b"");
        assert_eq!(sink.joined().len(), cfg.header_len(&cfg.checksum));
    }

    #[test]
    fn multipart_pieces_produce_same_bytes() {
        let cfg = crc16_config(8);
        let mut whole = Composer::new(cfg.clone());
        let mut parts = Composer::new(cfg);
        let mut a = Chunks::default();
        let mut b = Chunks::default();

        send(&mut whole, &mut a, 5, b"split across calls");

        let header = Header {
            id: parts.peek_id(),
            len: 18,
            msg_type: 5,
        };
        parts.begin(&header, true).unwrap();
        parts.write_payload(b"split ", &mut b).unwrap();
        parts.write_payload(b"across", &mut b).unwrap();
        assert_eq!(parts.open_frame().map(|f| f.written), Some(12));
        parts.write_payload(b" calls", &mut b).unwrap();
        parts.close(&mut b).unwrap();

        assert_eq!(a.joined(), b.joined());
    }

    #[test]
    fn ids_carry_peer_bit_and_wrap() {
        let cfg = FrameConfig {
            peer_bit: true,
            ..FrameConfig::default()
        };
        let mut composer = Composer::new(cfg);
        let mut sink = Chunks::default();

        assert_eq!(send(&mut composer, &mut sink, 0, b""), 0x80);
        assert_eq!(send(&mut composer, &mut sink, 0, b""), 0x81);
        for _ in 2..128 {
            send(&mut composer, &mut sink, 0, b"");
        }
        // 7 id bits wrap back to zero.
        assert_eq!(composer.peek_id(), 0x80);
    }

    #[test]
    fn response_does_not_advance_counter() {
        let mut composer = Composer::new(FrameConfig::default());
        let mut sink = Chunks::default();
        let header = Header {
            id: 0x42,
            len: 0,
            msg_type: 1,
        };
        composer.begin(&header, false).unwrap();
        composer.close(&mut sink).unwrap();
        assert_eq!(sink.joined()[1], 0x42);
        assert_eq!(composer.peek_id(), 0);
    }

    #[test]
    fn skipped_id_is_never_sent() {
        let mut composer = Composer::new(FrameConfig::default());
        let mut sink = Chunks::default();
        composer.skip_id();
        assert_eq!(composer.peek_id(), 1);
        assert_eq!(send(&mut composer, &mut sink, 0, b""), 1);
        assert_eq!(sink.joined()[1], 1);
        assert_eq!(composer.peek_id(), 2);
    }

    #[test]
    fn overrun_is_rejected_without_writing() {
        let mut composer = Composer::new(crc16_config(64));
        let mut sink = Chunks::default();
        let header = Header {
            id: 0,
            len: 3,
            msg_type: 1,
        };
        composer.begin(&header, true).unwrap();
        let err = composer.write_payload(b"abcd", &mut sink).unwrap_err();
        assert!(matches!(
            err,
            FrameError::PayloadOverrun {
                declared: 3,
                attempted: 4
            }
        ));
        assert_eq!(composer.open_frame().map(|f| f.written), Some(0));
    }

    #[test]
    fn close_before_declared_length_keeps_frame_open() {
        let mut composer = Composer::new(crc16_config(64));
        let mut sink = Chunks::default();
        let header = Header {
            id: 0,
            len: 3,
            msg_type: 1,
        };
        composer.begin(&header, true).unwrap();
        composer.write_payload(b"ab", &mut sink).unwrap();
        assert!(matches!(
            composer.close(&mut sink),
            Err(FrameError::IncompletePayload {
                declared: 3,
                written: 2
            })
        ));
        assert!(composer.is_open());

        composer.write_payload(b"c", &mut sink).unwrap();
        composer.close(&mut sink).unwrap();
        assert!(!composer.is_open());
    }

    #[test]
    fn writes_without_open_frame_fail() {
        let mut composer = Composer::new(FrameConfig::default());
        let mut sink = Chunks::default();
        assert!(matches!(
            composer.write_payload(b"x", &mut sink),
            Err(FrameError::NotComposing)
        ));
        assert!(matches!(
            composer.close(&mut sink),
            Err(FrameError::NotComposing)
        ));
    }

    #[test]
    fn abort_discards_buffered_bytes() {
        let mut composer = Composer::new(crc16_config(64));
        let mut sink = Chunks::default();
        let header = Header {
            id: 0,
            len: 2,
            msg_type: 1,
        };
        composer.begin(&header, true).unwrap();
        composer.write_payload(b"a", &mut sink).unwrap();
        composer.abort();

        assert!(!composer.is_open());
        assert!(sink.0.is_empty());
        send(&mut composer, &mut sink, 1, b"");
        assert_eq!(sink.0.len(), 1);
    }
}
