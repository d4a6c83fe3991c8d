//! Timer-driven fill engine
//!
//! Fires on a fixed 50ms wall-clock cadence regardless of the negotiated
//! sample rate; the byte volume per tick comes from elapsed real time times
//! the configured bytes-per-second. Fractional positions are kept in a
//! fixed-point accumulator scaled by the millisecond tick frequency, so no
//! precision is lost across ticks.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::stream::Device;

/// Fixed cadence of the tick engine.
pub const TICK_PERIOD: Duration = Duration::from_millis(50);

/// Fixed-point scale: fractional positions are byte counts times the
/// millisecond tick frequency.
pub const TICK_SCALE: u64 = 1000;

/// Fractional position state owned by the tick engine.
///
/// `irq_pos` accumulates `delta_ms * bytes_per_second`; real byte counts are
/// recovered by floor-difference so remainders carry over to the next tick
/// instead of being discarded.
#[derive(Debug, Clone, Copy, Default)]
pub struct TickState {
    last_tick: Option<Instant>,
    irq_pos: u64,
}

impl TickState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the firing timestamp. Called from trigger(start).
    pub fn arm(&mut self, now: Instant) {
        self.last_tick = Some(now);
    }

    pub fn disarm(&mut self) {
        self.last_tick = None;
    }

    pub fn last_tick(&self) -> Option<Instant> {
        self.last_tick
    }

    pub fn set_last_tick(&mut self, now: Instant) {
        self.last_tick = Some(now);
    }

    /// Reset the accumulator. Done on configure while the device is idle.
    pub fn reset_position(&mut self) {
        self.irq_pos = 0;
    }

    pub fn irq_pos(&self) -> u64 {
        self.irq_pos
    }

    /// Advance the accumulator by `delta_ms` of real time at `bps` and
    /// return `(bytes to emit, periods crossed)`.
    ///
    /// The accumulator wraps modulo `period_frac` once per crossing, which
    /// preserves the fractional remainder exactly: splitting a given total
    /// delta across any number of ticks yields the same final position.
    pub fn advance(&mut self, delta_ms: u64, bps: u32, period_frac: u64) -> (usize, u64) {
        if delta_ms == 0 {
            return (0, 0);
        }

        let last_pos = self.irq_pos / TICK_SCALE;
        self.irq_pos += delta_ms * bps as u64;
        let count = (self.irq_pos / TICK_SCALE - last_pos) as usize;

        let mut periods = 0;
        if period_frac > 0 && self.irq_pos >= period_frac {
            periods = self.irq_pos / period_frac;
            self.irq_pos %= period_frac;
        }

        (count, periods)
    }
}

/// Handle to the spawned tick task.
///
/// Armed from trigger(start); the task rearms itself every TICK_PERIOD and
/// is disarmed exactly once, from trigger(stop). A fire that lands after
/// stop is a no-op because the device checks its running flag first.
pub struct TickEngine {
    handle: JoinHandle<()>,
}

impl TickEngine {
    pub fn spawn(device: Arc<Device>) -> Self {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(TICK_PERIOD);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                device.timer_fire(Instant::now());
            }
        });
        Self { handle }
    }

    pub fn disarm(self) {
        self.handle.abort();
    }
}

impl Drop for TickEngine {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
