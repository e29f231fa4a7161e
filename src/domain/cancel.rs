//! Cooperative cancellation.
//!
//! A [`CancellationToken`] is polled at loop boundaries (before each page,
//! thread, record and channel). It never interrupts an in-flight request.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Shared stop flag plus the out-of-band triggers that can also request a stop.
///
/// Clones share the same flag, so a signal handler holding one clone can stop
/// work running against another.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    sentinel: Option<PathBuf>,
    env_toggle: Option<String>,
}

impl CancellationToken {
    /// A token that only stops when [`cancel`](Self::cancel) is called.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also treat the existence of `path` as a stop request.
    #[must_use]
    pub fn with_sentinel(mut self, path: impl Into<PathBuf>) -> Self {
        self.sentinel = Some(path.into());
        self
    }

    /// Also treat `name=1` in the environment as a stop request.
    #[must_use]
    pub fn with_env_toggle(mut self, name: impl Into<String>) -> Self {
        self.env_toggle = Some(name.into());
        self
    }

    /// Request a stop.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Whether any trigger has requested a stop.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        if self.flag.load(Ordering::SeqCst) {
            return true;
        }

        if let Some(name) = &self.env_toggle {
            if std::env::var(name).is_ok_and(|v| v == "1") {
                return true;
            }
        }

        self.sentinel.as_ref().is_some_and(|p| p.exists())
    }
}
