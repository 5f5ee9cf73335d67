//! Playout clock shared by both adapters
//!
//! Extrapolates the position from the last known anchor while running, so
//! position queries never need a round trip to the backend.

use tokio::time::Instant;

use crate::model::clamp_position;

/// Backward corrections smaller than this are treated as reporting jitter
const JITTER_TOLERANCE_SECS: f64 = 0.1;
/// Jumps larger than this are always accepted (seeks made elsewhere)
const JUMP_THRESHOLD_SECS: f64 = 2.0;

#[derive(Clone, Debug)]
pub struct PlayoutClock {
    position: f64,
    anchor: Instant,
    running: bool,
    duration: f64,
}

impl Default for PlayoutClock {
    fn default() -> Self {
        Self {
            position: 0.0,
            anchor: Instant::now(),
            running: false,
            duration: 0.0,
        }
    }
}

impl PlayoutClock {
    pub fn position(&self) -> f64 {
        let position = if self.running {
            self.position + self.anchor.elapsed().as_secs_f64()
        } else {
            self.position
        };
        clamp_position(position, self.duration)
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Seconds until the clock reaches the end of the track
    pub fn remaining(&self) -> f64 {
        (self.duration - self.position()).max(0.0)
    }

    pub fn set_duration(&mut self, duration: f64) {
        self.rebase();
        self.duration = duration.max(0.0);
    }

    pub fn set_position(&mut self, position: f64) {
        self.position = clamp_position(position, self.duration);
        self.anchor = Instant::now();
    }

    pub fn start(&mut self) {
        if !self.running {
            self.rebase();
            self.running = true;
        }
    }

    pub fn stop(&mut self) {
        if self.running {
            self.rebase();
            self.running = false;
        }
    }

    /// Reconcile with a position reported by the backend.
    ///
    /// Small backward corrections while running are ignored so the clock never
    /// visibly stutters; state changes and large jumps always win.
    pub fn sync(&mut self, reported: f64, running: bool) {
        let diff = reported - self.position();

        let state_changed = self.running != running;
        let significant_jump = diff.abs() > JUMP_THRESHOLD_SECS;
        let was_stopped = !self.running;
        let acceptable_sync = diff >= -JITTER_TOLERANCE_SECS;

        if state_changed || significant_jump || was_stopped || acceptable_sync {
            self.set_position(reported);
        }
        self.running = running;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn rebase(&mut self) {
        self.position = self.position();
        self.anchor = Instant::now();
    }
}
