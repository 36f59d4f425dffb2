//! Shared test helpers for integration tests and benchmarks.
//!
//! Gated behind `#[cfg(any(test, feature = "test-utils"))]` so these helpers
//! are available in unit tests, integration tests, and benchmarks (via the
//! `test-utils` feature).

use crate::engine::EngineConfig;
use crate::fixed::SimFixed;
use crate::grid::{PLAIN_FLUID, RHO_SIZE};
use crate::state::{SimulationDescription, SimulationState};

pub fn fixed(v: f64) -> SimFixed {
    SimFixed::from_f64(v)
}

/// Gravity used by the standard scenarios.
pub fn gravity() -> SimFixed {
    fixed(0.1)
}

/// Heavy water (`.`), light air (` `) and a mid-weight oil (`o`).
pub fn standard_rho() -> [SimFixed; RHO_SIZE] {
    let mut rho = [SimFixed::zero(); RHO_SIZE];
    rho[b' ' as usize] = fixed(0.01);
    rho[PLAIN_FLUID as usize] = SimFixed::from_int(1000);
    rho[b'o' as usize] = SimFixed::from_int(50);
    rho
}

/// A walled tank with a block of water over air and a pillar in the middle.
pub const TANK: [&str; 10] = [
    "##################",
    "#                #",
    "#  .......       #",
    "#  .......       #",
    "#  .......   oo  #",
    "#       ##   oo  #",
    "#       ##       #",
    "#       ##       #",
    "#                #",
    "##################",
];

pub fn description(rows: &[&str]) -> SimulationDescription {
    SimulationDescription::from_rows(gravity(), standard_rho(), rows)
        .unwrap_or_else(|e| panic!("bad fixture rows: {e}"))
}

/// Start state for `rows` with the standard gravity and densities.
pub fn state(rows: &[&str]) -> SimulationState {
    SimulationState::from_description(&description(rows))
        .unwrap_or_else(|e| panic!("bad fixture state: {e}"))
}

pub fn tank_state() -> SimulationState {
    state(&TANK)
}

pub fn config(threads: usize, seed: u64) -> EngineConfig {
    EngineConfig { threads, seed }
}

/// Count of every cell kind, for conservation checks.
pub fn kind_histogram(state: &SimulationState) -> [usize; RHO_SIZE] {
    let mut counts = [0; RHO_SIZE];
    for &kind in &state.field {
        counts[kind as usize] += 1;
    }
    counts
}
