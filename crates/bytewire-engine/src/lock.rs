use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// External transmit exclusivity.
///
/// Claimed before a frame header is written and released once the frame
/// is closed or aborted. Claiming never blocks.
pub trait TxLock: Send {
    /// Take the lock if it is free.
    fn try_claim(&self) -> bool;

    /// Give the lock back.
    fn release(&self);
}

/// A lock several engines can share when they write to one transport.
#[derive(Debug, Clone, Default)]
pub struct SharedTxLock {
    held: Arc<AtomicBool>,
}

impl SharedTxLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// True while some holder has claimed the lock.
    pub fn is_held(&self) -> bool {
        self.held.load(Ordering::Acquire)
    }
}

impl TxLock for SharedTxLock {
    fn try_claim(&self) -> bool {
        self.held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    fn release(&self) {
        self.held.store(false, Ordering::Release);
    }
}
