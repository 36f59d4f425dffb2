//! Fluxgrid Core -- a 2-D incompressible fluid simulation on a cell grid.
//!
//! The engine relaxes pressure into per-edge velocity capacity, resolves that
//! capacity into realized flow with repeated augmenting passes, and moves
//! particles probabilistically along the result. All numeric roles are
//! generic: pressure, velocity and flow can each be `f32`, `f64` or any
//! fixed-point layout.
//!
//! # Five-Phase Tick
//!
//! Each call to [`engine::FluidEngine::step`] runs:
//!
//! 1. **Gravity** -- add `g` to downward velocity (row-parallel on the pool).
//! 2. **Pressure** -- convert pressure differences into velocity capacity.
//! 3. **Flow** -- augmenting passes until no pass commits flow.
//! 4. **Redistribution** -- spent kinetic energy back into pressure.
//! 5. **Movement** -- randomized chained relocation of particles.
//!
//! # Key Types
//!
//! - [`fixed::FixedPoint`] -- wrapping arithmetic over the `fixed` crate's
//!   signed types; [`fixed::Fixed`] and [`fixed::FastFixed`] pick the store width.
//! - [`scalar::Scalar`] -- the numeric abstraction the engine is generic over.
//! - [`state::SimulationState`] -- canonical, type-independent snapshot.
//! - [`engine::FluidEngine`] -- one concrete instantiation of the engine.
//! - [`registry::EngineRegistry`] -- maps numeric type descriptors to boxed
//!   [`engine::Simulation`]s.
//! - [`pool::TaskPool`] -- fixed worker pool with typed task handles.

pub mod engine;
pub mod fixed;
pub mod grid;
pub mod numeric;
pub mod pool;
#[cfg(feature = "profiling")]
pub mod profiling;
mod propagate;
pub mod registry;
pub mod rng;
pub mod scalar;
pub mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
