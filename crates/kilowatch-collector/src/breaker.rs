//! Per-device circuit breaker
//!
//! Breakers are keyed by device address, not by sub-resource: a PDU that
//! stops answering fails for all of its outlets at once, and one cooling
//! period should cover the whole device.

use dashmap::DashMap;
use tracing::{debug, warn};

/// Breaker thresholds
#[derive(Debug, Clone)]
pub struct BreakerSettings {
    /// Consecutive failures that open the breaker
    pub fail_threshold: u32,
    /// Poll cycles to skip once open
    pub cooldown_cycles: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            fail_threshold: 5,
            cooldown_cycles: 3,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct BreakerState {
    streak: u32,
    cooldown: u32,
}

/// Point-in-time view of one device's breaker
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BreakerSnapshot {
    /// Consecutive failures since the last success or trip
    pub streak: u32,
    /// Skip cycles remaining
    pub cooldown: u32,
}

/// Breaker state for every known device
#[derive(Debug)]
pub struct BreakerBoard {
    settings: BreakerSettings,
    states: DashMap<String, BreakerState>,
}

impl BreakerBoard {
    /// Create an empty board
    pub fn new(settings: BreakerSettings) -> Self {
        Self {
            settings,
            states: DashMap::new(),
        }
    }

    /// Whether `addr` may be polled this cycle.
    ///
    /// A cooling-down device is refused and consumes one cooldown cycle;
    /// call this exactly once per device per cycle.
    pub fn admit(&self, addr: &str) -> bool {
        let mut state = self.states.entry(addr.to_string()).or_default();
        if state.cooldown > 0 {
            state.cooldown -= 1;
            debug!(addr, remaining = state.cooldown, "breaker open, skipping device");
            false
        } else {
            true
        }
    }

    /// A poll for `addr` succeeded; the failure streak ends.
    pub fn record_success(&self, addr: &str) {
        if let Some(mut state) = self.states.get_mut(addr) {
            state.streak = 0;
        }
    }

    /// A poll for `addr` failed after exhausting its retries.
    ///
    /// Reaching the threshold opens the breaker and resets the streak, so
    /// the device is not re-tripped the moment cooldown expires.
    pub fn record_failure(&self, addr: &str) {
        let mut state = self.states.entry(addr.to_string()).or_default();
        state.streak += 1;
        if state.streak >= self.settings.fail_threshold {
            state.cooldown = self.settings.cooldown_cycles;
            state.streak = 0;
            warn!(
                addr,
                cooldown_cycles = self.settings.cooldown_cycles,
                "failure threshold reached, breaker opened"
            );
        }
    }

    /// Current streak and cooldown for `addr`
    pub fn snapshot(&self, addr: &str) -> BreakerSnapshot {
        self.states
            .get(addr)
            .map(|state| BreakerSnapshot {
                streak: state.streak,
                cooldown: state.cooldown,
            })
            .unwrap_or_default()
    }
}
