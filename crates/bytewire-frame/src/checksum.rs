//! Pluggable checksums.
//!
//! Every algorithm is a start/add/finalize triple over a `u32` accumulator.
//! The same algorithm protects the header and, independently, the payload.
//! Finalized values go on the wire big-endian in [`Checksum::width`] bytes.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A running checksum algorithm.
pub trait Checksum: fmt::Debug + Send + Sync {
    /// Number of bytes the finalized value occupies on the wire (0, 1, 2 or 4).
    fn width(&self) -> usize;

    /// Initial accumulator value.
    fn start(&self) -> u32;

    /// Feed one byte into the accumulator.
    fn add(&self, acc: u32, byte: u8) -> u32;

    /// Turn the accumulator into the value sent on the wire.
    fn finalize(&self, acc: u32) -> u32;

    /// Checksum a whole slice in one go.
    fn compute(&self, bytes: &[u8]) -> u32 {
        let acc = bytes
            .iter()
            .fold(self.start(), |acc, &byte| self.add(acc, byte));
        self.finalize(acc)
    }
}

/// Built-in checksum algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumKind {
    /// No checksum fields on the wire.
    None,
    /// Inverted 8-bit XOR of all bytes.
    #[default]
    Xor,
    /// CRC-8/MAXIM (Dallas 1-Wire).
    Crc8,
    /// CRC-16/ARC.
    Crc16,
    /// CRC-32 (ISO-HDLC, as used by zlib).
    Crc32,
}

impl Checksum for ChecksumKind {
    fn width(&self) -> usize {
        match self {
            ChecksumKind::None => 0,
            ChecksumKind::Xor | ChecksumKind::Crc8 => 1,
            ChecksumKind::Crc16 => 2,
            ChecksumKind::Crc32 => 4,
        }
    }

    fn start(&self) -> u32 {
        match self {
            ChecksumKind::Crc32 => 0xFFFF_FFFF,
            _ => 0,
        }
    }

    fn add(&self, acc: u32, byte: u8) -> u32 {
        match self {
            ChecksumKind::None => acc,
            ChecksumKind::Xor => acc ^ u32::from(byte),
            ChecksumKind::Crc8 => u32::from(CRC8_TABLE[((acc as u8) ^ byte) as usize]),
            ChecksumKind::Crc16 => {
                (acc >> 8) ^ u32::from(CRC16_TABLE[((acc ^ u32::from(byte)) & 0xFF) as usize])
            }
            ChecksumKind::Crc32 => {
                (acc >> 8) ^ CRC32_TABLE[((acc ^ u32::from(byte)) & 0xFF) as usize]
            }
        }
    }

    fn finalize(&self, acc: u32) -> u32 {
        match self {
            ChecksumKind::None => 0,
            ChecksumKind::Xor => !acc & 0xFF,
            ChecksumKind::Crc8 => acc & 0xFF,
            ChecksumKind::Crc16 => acc & 0xFFFF,
            ChecksumKind::Crc32 => !acc,
        }
    }
}

impl fmt::Display for ChecksumKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChecksumKind::None => "none",
            ChecksumKind::Xor => "xor",
            ChecksumKind::Crc8 => "crc8",
            ChecksumKind::Crc16 => "crc16",
            ChecksumKind::Crc32 => "crc32",
        };
        f.write_str(name)
    }
}

// Reflected polynomials.
const CRC8_POLY: u8 = 0x8C;
const CRC16_POLY: u16 = 0xA001;
const CRC32_POLY: u32 = 0xEDB8_8320;

static CRC8_TABLE: [u8; 256] = crc8_table();
static CRC16_TABLE: [u16; 256] = crc16_table();
static CRC32_TABLE: [u32; 256] = crc32_table();

const fn crc8_table() -> [u8; 256] {
    let mut table = [0u8; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC8_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const fn crc16_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u16;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC16_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

const fn crc32_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC32_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}
