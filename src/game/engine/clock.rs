use bevy::prelude::*;

/// Authoritative time source of one game instance.
///
/// The tick advances exactly once per frame before any other system runs.
/// Simulation timing is expressed in ticks; `time_ms` is only used for
/// reporting and may jump when synchronized with the server.
#[derive(Resource, Debug, Clone)]
pub struct Clock {
    tick: u64,
    tick_rate: f64,
    offset_ms: f64,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new(60.0)
    }
}

impl Clock {
    pub fn new(tick_rate: f64) -> Self {
        Self { tick: 0, tick_rate, offset_ms: 0.0 }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn tick_rate(&self) -> f64 {
        self.tick_rate
    }

    pub fn advance(&mut self) {
        self.tick += 1;
    }

    pub fn ticks_since(&self, tick: u64) -> u64 {
        self.tick.saturating_sub(tick)
    }

    /// Milliseconds of simulated time, including the server offset.
    pub fn time_ms(&self) -> f64 {
        self.tick as f64 * 1000.0 / self.tick_rate + self.offset_ms
    }

    /// Align `time_ms` with the server's clock: `time` is the server's
    /// current time and `time_zero` its match start.
    pub fn synchronize(&mut self, time_zero: f64, time: f64) {
        let local = self.tick as f64 * 1000.0 / self.tick_rate;
        self.offset_ms = (time - time_zero) - local;
        debug!("[CLOCK] Synchronized: offset {:.1}ms at tick {}", self.offset_ms, self.tick);
    }
}

pub fn advance_clock(mut clock: ResMut<Clock>) {
    clock.advance();
}
