//! Property-based tests for the wire format.
//!
//! - Any message within capacity survives compose → parse unchanged
//! - A single damaged payload byte is always caught
//! - Arbitrary garbage ahead of a frame never hides or duplicates it

use std::io;
use std::sync::{Arc, Mutex};

use bytewire::frame::{ErrorKind, Sink};
use bytewire::{ChecksumKind, Engine, EngineConfig, FrameConfig, Listen, Message};
use proptest::prelude::*;

#[derive(Clone, Default)]
struct Wire(Arc<Mutex<Vec<u8>>>);

impl Wire {
    fn take(&self) -> Vec<u8> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

impl Sink for Wire {
    fn send_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.0.lock().unwrap().extend_from_slice(bytes);
        Ok(())
    }
}

type Seen = Arc<Mutex<Vec<Message>>>;
type Errors = Arc<Mutex<Vec<ErrorKind>>>;

fn receiver(frame: FrameConfig) -> (Engine, Seen, Errors) {
    let seen = Seen::default();
    let errors = Errors::default();
    let record = Arc::clone(&seen);
    let hook = Arc::clone(&errors);
    let mut engine = Engine::new(EngineConfig::with_frame(frame), Wire::default())
        .unwrap()
        .with_error_hook(move |kind| hook.lock().unwrap().push(kind));
    engine
        .add_generic_listener(move |_, msg| {
            record.lock().unwrap().push(msg.clone());
            Listen::Stay
        })
        .unwrap();
    (engine, seen, errors)
}

fn sender(frame: FrameConfig) -> (Engine, Wire) {
    let wire = Wire::default();
    let engine = Engine::new(EngineConfig::with_frame(frame), wire.clone()).unwrap();
    (engine, wire)
}

fn checksum_strategy() -> impl Strategy<Value = ChecksumKind> {
    prop_oneof![
        Just(ChecksumKind::None),
        Just(ChecksumKind::Xor),
        Just(ChecksumKind::Crc8),
        Just(ChecksumKind::Crc16),
        Just(ChecksumKind::Crc32),
    ]
}

fn verifying_checksum_strategy() -> impl Strategy<Value = ChecksumKind> {
    prop_oneof![
        Just(ChecksumKind::Xor),
        Just(ChecksumKind::Crc8),
        Just(ChecksumKind::Crc16),
        Just(ChecksumKind::Crc32),
    ]
}

// Layouts with room for a 255-byte payload; transmit buffers from barely
// fitting a header up to larger than any frame.
fn config_strategy() -> impl Strategy<Value = FrameConfig> {
    (
        1usize..=4,
        1usize..=4,
        1usize..=4,
        proptest::option::of(any::<u8>()),
        checksum_strategy(),
        17usize..=300,
    )
        .prop_map(
            |(id_width, len_width, type_width, sof_byte, checksum, tx_buffer_len)| FrameConfig {
                id_width,
                len_width,
                type_width,
                sof_byte,
                checksum,
                tx_buffer_len,
                ..FrameConfig::default()
            },
        )
}

proptest! {
    #[test]
    fn prop_round_trip(
        config in config_strategy(),
        msg_type in any::<u32>(),
        payload in proptest::collection::vec(any::<u8>(), 0..=255),
    ) {
        let msg_type = msg_type & config.max_type_value();
        let (mut tx, wire) = sender(config.clone());
        let (mut rx, seen, errors) = receiver(FrameConfig { peer_bit: true, ..config });

        let id = tx.send(msg_type, &payload).unwrap();
        rx.accept(&wire.take());

        let seen = seen.lock().unwrap();
        prop_assert_eq!(seen.len(), 1);
        prop_assert_eq!(seen[0].id, id);
        prop_assert_eq!(seen[0].msg_type, msg_type);
        prop_assert_eq!(seen[0].payload.as_ref(), payload.as_slice());
        prop_assert!(errors.lock().unwrap().is_empty());
    }

    #[test]
    fn prop_payload_damage_is_detected(
        checksum in verifying_checksum_strategy(),
        payload in proptest::collection::vec(any::<u8>(), 1..=64),
        index in any::<prop::sample::Index>(),
        mask in 1u8..=255,
    ) {
        let config = FrameConfig {
            checksum,
            sof_byte: Some(0xAA),
            ..FrameConfig::default()
        };
        let header_len = config.header_len(&checksum);
        let (mut tx, wire) = sender(config.clone());
        let (mut rx, seen, errors) = receiver(config);

        tx.send(1, &payload).unwrap();
        let mut bytes = wire.take();
        bytes[header_len + index.index(payload.len())] ^= mask;
        rx.accept(&bytes);

        prop_assert!(seen.lock().unwrap().is_empty());
        prop_assert_eq!(
            errors.lock().unwrap().clone(),
            vec![ErrorKind::BodyChecksumMismatch]
        );
    }

    #[test]
    fn prop_garbage_prefix_never_hides_a_frame(
        garbage in proptest::collection::vec(any::<u8>(), 0..=64),
        payload in proptest::collection::vec(any::<u8>(), 0..=32),
    ) {
        let config = FrameConfig {
            checksum: ChecksumKind::Crc16,
            sof_byte: Some(0xAA),
            ..FrameConfig::default()
        };
        let ticks = config.parser_timeout_ticks;
        let (mut tx, wire) = sender(config.clone());
        let (mut rx, seen, _) = receiver(config);

        rx.accept(&garbage);
        // An idle gap before the real frame lets a dangling partial frame expire.
        for _ in 0..ticks {
            rx.tick();
        }
        seen.lock().unwrap().clear();

        tx.send(0x42, &payload).unwrap();
        rx.accept(&wire.take());

        let seen = seen.lock().unwrap();
        prop_assert_eq!(seen.len(), 1);
        prop_assert_eq!(seen[0].msg_type, 0x42);
        prop_assert_eq!(seen[0].payload.as_ref(), payload.as_slice());
    }
}
