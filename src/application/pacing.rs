//! Pauses between requests.
//!
//! All sleeping goes through [`Pacer`] so retry backoff and rate-limit pauses
//! can be observed in tests without waiting.

use std::time::{Duration, Instant};

use crate::domain::CancellationToken;

/// Granularity at which a blocking pause re-checks for cancellation.
const PAUSE_SLICE: Duration = Duration::from_millis(100);

pub trait Pacer {
    fn pause(&self, duration: Duration);
}

impl<P: Pacer + ?Sized> Pacer for &P {
    fn pause(&self, duration: Duration) {
        (**self).pause(duration);
    }
}

/// Sleeps the current thread, waking early once a stop is requested.
#[derive(Debug, Clone, Default)]
pub struct BlockingPacer {
    cancel: CancellationToken,
}

impl BlockingPacer {
    #[must_use]
    pub const fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }
}

impl Pacer for BlockingPacer {
    fn pause(&self, duration: Duration) {
        let deadline = Instant::now() + duration;
        loop {
            if self.cancel.is_cancelled() {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            std::thread::sleep(PAUSE_SLICE.min(deadline - now));
        }
    }
}
