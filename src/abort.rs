//! Cancellation for asynchronous fetches.
//!
//! A fetch superseded by fast scrolling or a sort change must not write
//! stale results over fresher ones, so every async path takes an
//! [`AbortSignal`] and calls [`AbortSignal::check`] after each await
//! before touching shared caches.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::error::{Result, VgridError};

/// Owner side of a cancellation pair. Dropping the controller does not
/// abort; cancellation is always explicit.
#[derive(Debug, Default)]
pub struct AbortController {
    flag: Arc<AtomicBool>,
}

impl AbortController {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Observer handle to pass into fetches.
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            flag: Arc::clone(&self.flag),
        }
    }

    /// Flip the pair to aborted. Idempotent.
    pub fn abort(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// Observer side of a cancellation pair.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    flag: Arc<AtomicBool>,
}

impl AbortSignal {
    /// A signal that never aborts, for callers without cancellation.
    #[must_use]
    pub fn never() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// The per-await checkpoint.
    ///
    /// # Errors
    ///
    /// `Aborted` once the owning controller has aborted.
    pub fn check(&self) -> Result<()> {
        if self.is_aborted() {
            return Err(VgridError::Aborted);
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::float_cmp,
    clippy::panic
)]
mod tests {
    use super::*;

    #[test]
    fn signal_follows_controller() {
        let controller = AbortController::new();
        let signal = controller.signal();
        assert!(signal.check().is_ok());

        controller.abort();
        assert!(signal.is_aborted());
        assert_eq!(signal.check().unwrap_err(), VgridError::Aborted);

        // Idempotent.
        controller.abort();
        assert!(signal.is_aborted());
    }

    #[test]
    fn never_signal_stays_live() {
        let signal = AbortSignal::never();
        assert!(!signal.is_aborted());
        assert!(signal.check().is_ok());
    }
}
