use futures::lock::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
struct ThrottleState {
    last: Option<Instant>,
    pending: u64,
}

/// Shared minimum-delay gate with cumulative staggering. A burst of N
/// concurrent `acquire` calls is released roughly `delay_ms` apart instead
/// of all at once; the spacing grows with the number of callers still
/// waiting.
#[derive(Debug, Default)]
pub struct AsyncThrottle {
    delay_ms: AtomicU64,
    state: Mutex<ThrottleState>,
}

impl AsyncThrottle {
    pub fn new() -> Self {
        AsyncThrottle::default()
    }

    pub fn delay_ms(&self) -> u64 {
        self.delay_ms.load(Ordering::Relaxed)
    }

    pub fn set_delay_ms(&self, value: u64) {
        self.delay_ms.store(value, Ordering::Relaxed);
    }

    /// Resolve after this caller's share of the stagger window has elapsed.
    /// The timestamp is advanced up front; the pending count only drops once
    /// a caller actually waited out its delay.
    pub async fn acquire(&self) {
        let wait = {
            let mut state = self.state.lock().await;
            state.pending += 1;

            let now = Instant::now();
            let budget = self.delay_ms().saturating_mul(state.pending);
            let target = state.last.map(|last| last + Duration::from_millis(budget));

            state.last = Some(now);
            target.filter(|target| *target > now).map(|target| target - now)
        };

        if let Some(remaining) = wait {
            tokio::time::sleep(remaining).await;
            let mut state = self.state.lock().await;
            state.pending = state.pending.saturating_sub(1);
        }
    }
}
