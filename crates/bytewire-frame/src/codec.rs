use bytes::{BufMut, Bytes, BytesMut};

use crate::checksum::Checksum;
use crate::config::{field_max, FrameConfig};
use crate::error::{FrameError, Result};

/// A decoded message, or one about to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Frame id, including the peer-origin bit.
    pub id: u32,
    /// Application type tag.
    pub msg_type: u32,
    /// The message payload.
    pub payload: Bytes,
    /// Outbound only: reuse `id` instead of allocating a fresh one.
    pub is_response: bool,
}

impl Message {
    /// Create a new outbound message; its id is assigned when sent.
    pub fn new(msg_type: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            id: 0,
            msg_type,
            payload: payload.into(),
            is_response: false,
        }
    }

    /// Create a response that reuses the id of the message it answers.
    pub fn response(id: u32, msg_type: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            id,
            msg_type,
            payload: payload.into(),
            is_response: true,
        }
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    /// True when the message carries no payload.
    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Header fields of one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub id: u32,
    pub len: usize,
    pub msg_type: u32,
}

impl Header {
    /// Reject values that do not fit the configured field widths.
    pub fn check(&self, config: &FrameConfig) -> Result<()> {
        if self.len > config.max_len_value() {
            return Err(FrameError::PayloadTooLarge {
                size: self.len,
                max: config.max_len_value(),
            });
        }
        if self.msg_type > config.max_type_value() {
            return Err(FrameError::FieldOverflow {
                field: "type",
                value: self.msg_type,
                width: config.type_width,
            });
        }
        if self.id > field_max(config.id_width) {
            return Err(FrameError::FieldOverflow {
                field: "id",
                value: self.id,
                width: config.id_width,
            });
        }
        Ok(())
    }
}

/// Append a frame header to `dst`.
///
/// Wire format (widths from [`FrameConfig`], all fields big-endian):
/// ```text
/// ┌───────┬──────┬────────┬──────┬─────────────┐
/// │ SOF?  │ ID   │ LENGTH │ TYPE │ HEAD CKSUM? │
/// └───────┴──────┴────────┴──────┴─────────────┘
/// ```
/// The header checksum covers every preceding header byte, SOF included.
pub fn encode_header(
    config: &FrameConfig,
    checksum: &dyn Checksum,
    header: &Header,
    dst: &mut BytesMut,
) -> Result<()> {
    header.check(config)?;

    let start = dst.len();
    dst.reserve(config.header_len(checksum));
    if let Some(sof) = config.sof_byte {
        dst.put_u8(sof);
    }
    dst.put_uint(u64::from(header.id), config.id_width);
    dst.put_uint(header.len as u64, config.len_width);
    dst.put_uint(u64::from(header.msg_type), config.type_width);

    let width = checksum.width();
    if width > 0 {
        let value = checksum.compute(&dst[start..]);
        dst.put_uint(u64::from(value), width);
    }
    Ok(())
}

/// Append a finalized checksum value to `dst`.
pub fn put_checksum(checksum: &dyn Checksum, value: u32, dst: &mut BytesMut) {
    let width = checksum.width();
    if width > 0 {
        dst.put_uint(u64::from(value), width);
    }
}

/// Encode a complete frame in one buffer.
///
/// Empty payloads get no payload checksum.
pub fn encode_frame(
    config: &FrameConfig,
    checksum: &dyn Checksum,
    id: u32,
    msg_type: u32,
    payload: &[u8],
    dst: &mut BytesMut,
) -> Result<()> {
    let header = Header {
        id,
        len: payload.len(),
        msg_type,
    };
    encode_header(config, checksum, &header, dst)?;
    if !payload.is_empty() {
        dst.put_slice(payload);
        put_checksum(checksum, checksum.compute(payload), dst);
    }
    Ok(())
}

/// Total bytes a frame with `payload_len` bytes of payload occupies on the wire.
pub fn wire_size(config: &FrameConfig, checksum: &dyn Checksum, payload_len: usize) -> usize {
    let tail = if payload_len > 0 { checksum.width() } else { 0 };
    config.header_len(checksum) + payload_len + tail
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checksum::ChecksumKind;

    fn crc16_config() -> FrameConfig {
        FrameConfig {
            sof_byte: Some(0xAA),
            checksum: ChecksumKind::Crc16,
            ..FrameConfig::default()
        }
    }

    #[test]
    fn header_layout() {
        let cfg = crc16_config();
        let mut buf = BytesMut::new();
        let header = Header {
            id: 0x05,
            len: 16,
            msg_type: 0x22,
        };
        encode_header(&cfg, &cfg.checksum, &header, &mut buf).unwrap();

        assert_eq!(buf.len(), 7);
        assert_eq!(&buf[..5], &[0xAA, 0x05, 0x00, 0x10, 0x22]);
        let cksum = ChecksumKind::Crc16.compute(&buf[..5]);
        assert_eq!(&buf[5..], &(cksum as u16).to_be_bytes());
    }

    #[test]
    fn frame_without_checksum_or_sof() {
        let cfg = FrameConfig {
            sof_byte: None,
            checksum: ChecksumKind::None,
            ..FrameConfig::default()
        };
        let mut buf = BytesMut::new();
        encode_frame(&cfg, &cfg.checksum, 7, 3, b"hi", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0x07, 0x00, 0x02, 0x03, b'h', b'i']);
    }

    #[test]
    fn empty_payload_has_no_tail() {
        let cfg = crc16_config();
        let mut buf = BytesMut::new();
        encode_frame(&cfg, &cfg.checksum, 1, 1, b"", &mut buf).unwrap();
        assert_eq!(buf.len(), cfg.header_len(&cfg.checksum));
        assert_eq!(buf.len(), wire_size(&cfg, &cfg.checksum, 0));
    }

    #[test]
    fn wide_fields_are_big_endian() {
        let cfg = FrameConfig {
            id_width: 4,
            len_width: 4,
            type_width: 2,
            sof_byte: None,
            checksum: ChecksumKind::None,
            ..FrameConfig::default()
        };
        let mut buf = BytesMut::new();
        encode_frame(&cfg, &cfg.checksum, 0x8000_0102, 0xBEEF, b"x", &mut buf).unwrap();
        assert_eq!(
            buf.as_ref(),
            &[0x80, 0x00, 0x01, 0x02, 0x00, 0x00, 0x00, 0x01, 0xBE, 0xEF, b'x']
        );
    }

    #[test]
    fn rejects_payload_over_length_field() {
        let cfg = FrameConfig {
            len_width: 1,
            ..FrameConfig::default()
        };
        let mut buf = BytesMut::new();
        let err = encode_frame(&cfg, &cfg.checksum, 0, 0, &[0u8; 256], &mut buf).unwrap_err();
        assert!(matches!(
            err,
            FrameError::PayloadTooLarge { size: 256, max: 255 }
        ));
        assert!(buf.is_empty());
    }

    #[test]
    fn rejects_type_over_field() {
        let cfg = FrameConfig::default();
        let mut buf = BytesMut::new();
        let err = encode_frame(&cfg, &cfg.checksum, 0, 0x100, b"", &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::FieldOverflow { field: "type", .. }));
    }

    #[test]
    fn message_constructors() {
        let msg = Message::new(3, Bytes::from_static(b"abc"));
        assert!(!msg.is_response);
        assert_eq!(msg.len(), 3);

        let resp = Message::response(0x81, 4, Bytes::new());
        assert!(resp.is_response);
        assert_eq!(resp.id, 0x81);
        assert!(resp.is_empty());
    }
}
