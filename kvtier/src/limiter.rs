//! Wall-clock bandwidth cap shared by reads and writes.

use std::num::NonZeroU64;
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use tracing::trace;

/// Transfer direction, carried for diagnostics. Both directions charge the
/// same allowance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Read,
    Write,
}

struct Window {
    epoch_second: u64,
    consumed: u64,
}

/// Caps the number of bytes transferred per wall-clock second.
///
/// The allowance refills in full at every second boundary. A saturated
/// caller sleeps until the boundary and retries; waiters race for the fresh
/// allowance, there is no queueing or fairness. Call
/// [`await_allowance`](Self::await_allowance) only from threads that may
/// block.
pub struct RateLimiter {
    bytes_per_second: u64,
    window: Mutex<Window>,
}

impl RateLimiter {
    pub fn new(bytes_per_second: NonZeroU64) -> Self {
        Self {
            bytes_per_second: bytes_per_second.get(),
            window: Mutex::new(Window {
                epoch_second: 0,
                consumed: 0,
            }),
        }
    }

    /// Blocks until `bytes` can be charged against the current second's
    /// allowance, then charges them.
    ///
    /// A single call larger than the per-second limit never returns.
    pub fn await_allowance(&self, bytes: u64, direction: Direction) {
        loop {
            let now = SystemTime::now()
                .duration_since(SystemTime::UNIX_EPOCH)
                .expect("system clock is before the unix epoch");
            let epoch_second = now.as_secs();
            {
                let mut window = self.window.lock().unwrap();
                if window.epoch_second < epoch_second {
                    window.epoch_second = epoch_second;
                    window.consumed = 0;
                }
                if window.consumed.saturating_add(bytes) <= self.bytes_per_second {
                    window.consumed += bytes;
                    return;
                }
                trace!(
                    ?direction,
                    bytes,
                    consumed = window.consumed,
                    limit = self.bytes_per_second,
                    "rate limit saturated, waiting for the next second"
                );
            }
            std::thread::sleep(Duration::from_secs(epoch_second + 1) - now);
        }
    }
}
