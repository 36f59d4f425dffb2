//! Per-phase tick timings. Only compiled with the `profiling` feature.

use std::time::Duration;

/// Per-phase timing from the most recent tick.
#[derive(Debug, Clone, Default)]
pub struct TickProfile {
    pub gravity: Duration,
    pub pressure: Duration,
    pub flow: Duration,
    pub redistribution: Duration,
    pub movement: Duration,
    pub total: Duration,
    /// Tick counter after the tick.
    pub tick: u32,
}

impl TickProfile {
    /// Returns the name and duration of the slowest phase.
    pub fn bottleneck_phase(&self) -> (&'static str, Duration) {
        let phases = [
            ("gravity", self.gravity),
            ("pressure", self.pressure),
            ("flow", self.flow),
            ("redistribution", self.redistribution),
            ("movement", self.movement),
        ];
        phases
            .into_iter()
            .max_by_key(|(_, d)| *d)
            .unwrap_or(("gravity", Duration::ZERO))
    }
}
