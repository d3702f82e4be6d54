use serde::{Deserialize, Serialize};

use crate::checksum::{Checksum, ChecksumKind};
use crate::error::{FrameError, Result};

/// Default receive capacity: 1 KiB.
pub const DEFAULT_MAX_RX_PAYLOAD: usize = 1024;

/// Default transmit scratch buffer: 128 bytes.
pub const DEFAULT_TX_BUFFER_LEN: usize = 128;

/// Default start-of-frame marker.
pub const DEFAULT_SOF_BYTE: u8 = 0x01;

/// Default parser stall threshold in ticks.
pub const DEFAULT_PARSER_TIMEOUT_TICKS: u32 = 10;

/// Wire layout and buffer sizing. Both peers must agree on the layout fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameConfig {
    /// Width of the frame id field in bytes (1..=4).
    pub id_width: usize,
    /// Width of the payload length field in bytes (1..=4).
    pub len_width: usize,
    /// Width of the type tag field in bytes (1..=4).
    pub type_width: usize,
    /// Start-of-frame marker, or `None` to run without one.
    pub sof_byte: Option<u8>,
    /// Checksum used for both the header and the payload.
    pub checksum: ChecksumKind,
    /// Ticks without input after which a partial frame is dropped. 0 disables.
    pub parser_timeout_ticks: u32,
    /// Largest payload the parser will store.
    pub max_rx_payload: usize,
    /// Size of the transmit scratch buffer; larger payloads go out in chunks.
    pub tx_buffer_len: usize,
    /// This side's peer-origin bit. The two ends of a link must differ.
    pub peer_bit: bool,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            id_width: 1,
            len_width: 2,
            type_width: 1,
            sof_byte: Some(DEFAULT_SOF_BYTE),
            checksum: ChecksumKind::default(),
            parser_timeout_ticks: DEFAULT_PARSER_TIMEOUT_TICKS,
            max_rx_payload: DEFAULT_MAX_RX_PAYLOAD,
            tx_buffer_len: DEFAULT_TX_BUFFER_LEN,
            peer_bit: false,
        }
    }
}

impl FrameConfig {
    /// Check field widths and buffer sizes against the chosen checksum width.
    pub fn validate(&self, checksum: &dyn Checksum) -> Result<()> {
        for (name, width) in [
            ("id_width", self.id_width),
            ("len_width", self.len_width),
            ("type_width", self.type_width),
        ] {
            if !(1..=4).contains(&width) {
                return Err(FrameError::InvalidConfig(format!(
                    "{name} must be between 1 and 4 bytes, got {width}"
                )));
            }
        }

        if !matches!(checksum.width(), 0 | 1 | 2 | 4) {
            return Err(FrameError::InvalidConfig(format!(
                "checksum width must be 0, 1, 2 or 4 bytes, got {}",
                checksum.width()
            )));
        }

        if self.max_rx_payload == 0 {
            return Err(FrameError::InvalidConfig(
                "max_rx_payload must be non-zero".to_string(),
            ));
        }

        let header = self.header_len(checksum);
        if self.tx_buffer_len < header {
            return Err(FrameError::InvalidConfig(format!(
                "tx_buffer_len {} cannot hold a {header}-byte header",
                self.tx_buffer_len
            )));
        }
        Ok(())
    }

    /// Bytes from the start marker through the header checksum.
    pub fn header_len(&self, checksum: &dyn Checksum) -> usize {
        usize::from(self.sof_byte.is_some())
            + self.id_width
            + self.len_width
            + self.type_width
            + checksum.width()
    }

    /// Largest payload length the length field can carry.
    pub fn max_len_value(&self) -> usize {
        usize::try_from(field_max(self.len_width)).unwrap_or(usize::MAX)
    }

    /// Largest type tag the type field can carry.
    pub fn max_type_value(&self) -> u32 {
        field_max(self.type_width)
    }

    /// Mask covering the id bits below the peer-origin bit.
    pub fn id_mask(&self) -> u32 {
        field_max(self.id_width) >> 1
    }

    /// The peer-origin bit position within the id field.
    pub fn id_peer_bit(&self) -> u32 {
        1 << (self.id_width * 8 - 1)
    }
}

/// All-ones value for a field of `width` bytes.
pub(crate) fn field_max(width: usize) -> u32 {
    if width >= 4 {
        u32::MAX
    } else {
        (1u32 << (width * 8)) - 1
    }
}
