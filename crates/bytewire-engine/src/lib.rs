//! Listener dispatch, response correlation and timeouts on top of
//! `bytewire-frame`.
//!
//! An [`Engine`] is one end of a framed link. Feed it received bytes and
//! call [`Engine::tick`] at a steady rate; it verifies frames, routes them to
//! registered listeners and expires listeners nobody answered.

pub mod config;
pub mod engine;
pub mod error;
pub mod listener;
pub mod lock;

pub use config::{EngineConfig, DEFAULT_MAX_LISTENERS};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use listener::{Handler, IdListener, Listen, ListenerId, ListenerTable, TimeoutHandler};
pub use lock::{SharedTxLock, TxLock};
