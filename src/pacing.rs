//! Call pacing for external services.
//!
//! One [`Pacer`] is shared by every call to a given service. It enforces a
//! minimum interval between calls, honours back-off hints reported by the
//! service, and performs the single long cool-down taken after a
//! rate-limit response.
//!
//! All timing goes through `tokio::time`, so tests running with a paused
//! clock observe the sleeps without waiting for them.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Default)]
struct PacerState {
    last_call: Option<Instant>,
    defer_until: Option<Instant>,
}

#[derive(Debug)]
pub struct Pacer {
    service: String,
    min_interval: Duration,
    cooldown: Duration,
    state: Mutex<PacerState>,
    cooldowns: AtomicU32,
}

impl Pacer {
    pub fn new(service: impl Into<String>, min_interval: Duration, cooldown: Duration) -> Self {
        Self {
            service: service.into(),
            min_interval,
            cooldown,
            state: Mutex::new(PacerState::default()),
            cooldowns: AtomicU32::new(0),
        }
    }

    /// A pacer that never sleeps between calls.
    pub fn unpaced(service: impl Into<String>) -> Self {
        Self::new(service, Duration::ZERO, Duration::ZERO)
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Wait until the next call is allowed, then claim the slot.
    pub async fn wait(&self) {
        let mut state = self.state.lock().await;
        let mut ready = state
            .last_call
            .map(|last| last + self.min_interval)
            .unwrap_or_else(Instant::now);
        if let Some(defer) = state.defer_until {
            ready = ready.max(defer);
        }
        if ready > Instant::now() {
            debug!(service = %self.service, wait_ms = (ready - Instant::now()).as_millis() as u64, "pacing");
            tokio::time::sleep_until(ready).await;
        }
        state.last_call = Some(Instant::now());
        state.defer_until = None;
    }

    /// Record a service back-off hint: no call before `delay` has passed.
    pub async fn defer(&self, delay: Duration) {
        let until = Instant::now() + delay;
        let mut state = self.state.lock().await;
        state.defer_until = Some(state.defer_until.map_or(until, |d| d.max(until)));
    }

    /// Sleep once after a rate-limit response. Uses the service hint if
    /// present, the configured cool-down otherwise. Returns the time slept.
    pub async fn cool_down(&self, hint: Option<Duration>) -> Duration {
        let delay = hint.unwrap_or(self.cooldown);
        self.cooldowns.fetch_add(1, Ordering::Relaxed);
        warn!(service = %self.service, secs = delay.as_secs(), "rate limited, cooling down");
        tokio::time::sleep(delay).await;
        delay
    }

    /// Cool-downs taken so far.
    pub fn cooldowns(&self) -> u32 {
        self.cooldowns.load(Ordering::Relaxed)
    }
}
