//! Two engines wired back to back through in-memory queues.
//!
//! Run with:
//!   cargo run --example loopback --features logging
//!
//! Shows a query and its response, a corrupted frame being dropped, and a
//! query that times out because nobody answers it.

use std::io;
use std::sync::{Arc, Mutex};

use bytewire::logging::{init_logging, LogFormat, LogLevel};
use bytewire::{ChecksumKind, Engine, EngineConfig, FrameConfig, IdListener, Listen};

const MSG_PING: u32 = 0x10;
const MSG_PONG: u32 = 0x11;
const MSG_NOBODY: u32 = 0x20;

type Queue = Arc<Mutex<Vec<u8>>>;

fn endpoint(peer_bit: bool, outbox: &Queue) -> Result<Engine, Box<dyn std::error::Error>> {
    let config = EngineConfig::with_frame(FrameConfig {
        checksum: ChecksumKind::Crc16,
        sof_byte: Some(0xAA),
        peer_bit,
        ..FrameConfig::default()
    });
    let outbox = Arc::clone(outbox);
    let engine = Engine::new(config, move |bytes: &[u8]| -> io::Result<()> {
        outbox
            .lock()
            .map_err(|_| io::Error::other("outbox poisoned"))?
            .extend_from_slice(bytes);
        Ok(())
    })?
    .with_error_hook(move |kind| eprintln!("[peer {}] error: {kind:?}", u8::from(peer_bit)));
    Ok(engine)
}

fn deliver(queue: &Queue, to: &mut Engine) {
    let bytes = std::mem::take(&mut *queue.lock().unwrap_or_else(|e| e.into_inner()));
    to.accept(&bytes);
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging(LogFormat::Text, LogLevel::Debug);

    let a_to_b = Queue::default();
    let b_to_a = Queue::default();
    let mut a = endpoint(false, &a_to_b)?;
    let mut b = endpoint(true, &b_to_a)?;

    b.add_type_listener(MSG_PING, |engine, msg| {
        eprintln!("[peer 1] ping {:?}", String::from_utf8_lossy(&msg.payload));
        if let Err(e) = engine.respond(msg.id, MSG_PONG, b"pong") {
            eprintln!("[peer 1] respond failed: {e}");
        }
        Listen::Stay
    })?;

    // 1. Query and response.
    a.query(
        MSG_PING,
        b"ping",
        IdListener::new(|_, msg| {
            eprintln!(
                "[peer 0] response to {:#04x}: {:?}",
                msg.id,
                String::from_utf8_lossy(&msg.payload)
            );
            Listen::Close
        })
        .timeout(5),
    )?;
    deliver(&a_to_b, &mut b);
    deliver(&b_to_a, &mut a);

    // 2. A frame damaged in transit is reported and dropped.
    a.send(MSG_PING, b"damaged")?;
    if let Some(byte) = a_to_b.lock().unwrap_or_else(|e| e.into_inner()).last_mut() {
        *byte ^= 0xFF;
    }
    deliver(&a_to_b, &mut b);

    // 3. Nobody answers this one; the listener expires after 3 ticks.
    a.query(
        MSG_NOBODY,
        b"anyone?",
        IdListener::new(|_, _| Listen::Close)
            .timeout(3)
            .on_timeout(|_| eprintln!("[peer 0] query timed out")),
    )?;
    deliver(&a_to_b, &mut b);
    for _ in 0..3 {
        a.tick();
        b.tick();
    }

    Ok(())
}
