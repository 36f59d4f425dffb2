//! The fluid engine and its five-phase tick.
//!
//! Each call to [`FluidEngine::step`] runs, in order:
//!
//! 1. **Gravity**: add `g` to the downward velocity of every fluid cell that
//!    has fluid below it. Row-parallel on the [`TaskPool`] when configured.
//! 2. **Pressure**: push pressure differences into velocity capacity,
//!    draining opposing capacity at the neighbour first.
//! 3. **Flow**: repeated augmenting passes until a pass commits no flow.
//! 4. **Redistribution**: cap velocity at the realized flow and turn the
//!    spent kinetic energy back into pressure.
//! 5. **Movement**: probabilistic chained relocation of particles.
//!
//! Every phase finishes before the next begins. Only phase 1 uses the pool.

use std::sync::Arc;

use crate::fixed::SimFixed;
use crate::grid::{self, Cell, Direction, Grid, Matrix, PLAIN_FLUID};
use crate::pool::{PoolError, TaskHandle, TaskPool};
use crate::rng::{DEFAULT_SEED, SimRng};
use crate::scalar::Scalar;
use crate::state::SimulationState;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Errors raised while building or ticking an engine.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// Pressure had to be spread over a cell with no open neighbours.
    #[error("cell ({row}, {col}) has no open neighbours to spread pressure over")]
    IsolatedCell { row: usize, col: usize },
    /// Realized flow ended above the velocity capacity it was bounded by.
    #[error("flow exceeds velocity capacity at ({row}, {col}) going {direction}")]
    FlowExceedsCapacity {
        row: usize,
        col: usize,
        direction: Direction,
    },
    #[error("no density for fluid kind {kind:?}")]
    MissingDensity { kind: char },
    #[error("state holds {cells} cells, expected {height}x{width}")]
    DimensionMismatch {
        height: usize,
        width: usize,
        cells: usize,
    },
    #[error(transparent)]
    Pool(#[from] PoolError),
}

// ---------------------------------------------------------------------------
// Configuration and reporting
// ---------------------------------------------------------------------------

/// Construction options shared by every engine instantiation.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EngineConfig {
    /// Worker threads for the gravity phase. `0` and `1` run inline.
    pub threads: usize,
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            seed: DEFAULT_SEED,
        }
    }
}

/// Diagnostics from the most recent tick.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickReport {
    /// At least one particle moved.
    pub moved: bool,
    /// Augmenting passes run by the flow phase, including the final empty one.
    pub flow_passes: usize,
    /// Net pressure added across the grid by the pressure and
    /// redistribution phases.
    pub pressure_delta: f64,
}

// ---------------------------------------------------------------------------
// Simulation trait
// ---------------------------------------------------------------------------

/// Type-erased engine surface, implemented by every instantiation.
pub trait Simulation {
    /// Run one tick. Returns whether any particle moved.
    fn step(&mut self) -> Result<bool, SimError>;

    /// Number of ticks on which something moved.
    fn tick_count(&self) -> u32;

    /// Snapshot the full state.
    fn state(&self) -> SimulationState;

    fn render_field(&self) -> String;

    fn last_report(&self) -> &TickReport;
}

// ---------------------------------------------------------------------------
// FluidEngine
// ---------------------------------------------------------------------------

/// Fluid engine with pressure type `P`, velocity type `V` and flow type `VF`.
#[derive(Debug)]
pub struct FluidEngine<P, V, VF> {
    grid: Grid<P, V, VF>,
    rng: SimRng,
    tick_count: u32,
    pool: Option<TaskPool>,
    /// Per-row gravity masks. Walls never move, so these are built once.
    gravity_masks: Vec<Arc<[bool]>>,
    last_report: TickReport,

    #[cfg(feature = "profiling")]
    last_profile: Option<crate::profiling::TickProfile>,
}

impl<P: Scalar, V: Scalar, VF: Scalar> FluidEngine<P, V, VF> {
    pub fn new(state: &SimulationState, config: &EngineConfig) -> Result<Self, SimError> {
        let grid = Grid::from_state(state)?;
        let pool = if config.threads > 1 {
            Some(TaskPool::new(config.threads)?)
        } else {
            None
        };
        let gravity_masks = grid.gravity_masks();
        log::debug!(
            "engine ready: {}x{} grid, {} worker thread(s), seed {}",
            grid.height,
            grid.width,
            config.threads.max(1),
            config.seed
        );

        Ok(Self {
            grid,
            rng: SimRng::new(config.seed),
            tick_count: state.tick_count,
            pool,
            gravity_masks,
            last_report: TickReport::default(),
            #[cfg(feature = "profiling")]
            last_profile: None,
        })
    }

    /// Run one tick. Increments the tick counter when something moved.
    pub fn step(&mut self) -> Result<bool, SimError> {
        #[cfg(feature = "profiling")]
        let step_start = std::time::Instant::now();

        // Phase 1: gravity.
        #[cfg(feature = "profiling")]
        let phase_start = std::time::Instant::now();
        self.apply_gravity()?;
        #[cfg(feature = "profiling")]
        let gravity_dur = phase_start.elapsed();

        // Phase 2: pressure-driven momentum transfer.
        #[cfg(feature = "profiling")]
        let phase_start = std::time::Instant::now();
        let mut pressure_delta = self.apply_pressure()?;
        #[cfg(feature = "profiling")]
        let pressure_dur = phase_start.elapsed();

        // Phase 3: flow propagation.
        #[cfg(feature = "profiling")]
        let phase_start = std::time::Instant::now();
        let flow_passes = self.propagate_flows();
        #[cfg(feature = "profiling")]
        let flow_dur = phase_start.elapsed();

        // Phase 4: kinetic energy back into pressure.
        #[cfg(feature = "profiling")]
        let phase_start = std::time::Instant::now();
        pressure_delta += self.redistribute_energy()?;
        #[cfg(feature = "profiling")]
        let redistribution_dur = phase_start.elapsed();

        // Phase 5: particle movement.
        #[cfg(feature = "profiling")]
        let phase_start = std::time::Instant::now();
        let moved = self.move_particles();
        #[cfg(feature = "profiling")]
        let movement_dur = phase_start.elapsed();

        if moved {
            self.tick_count += 1;
        }
        self.last_report = TickReport {
            moved,
            flow_passes,
            pressure_delta: pressure_delta.to_f64(),
        };
        log::debug!(
            "tick {}: moved={moved} flow_passes={flow_passes} pressure_delta={pressure_delta}",
            self.tick_count
        );

        #[cfg(feature = "profiling")]
        {
            self.last_profile = Some(crate::profiling::TickProfile {
                gravity: gravity_dur,
                pressure: pressure_dur,
                flow: flow_dur,
                redistribution: redistribution_dur,
                movement: movement_dur,
                total: step_start.elapsed(),
                tick: self.tick_count,
            });
        }

        Ok(moved)
    }

    pub fn tick_count(&self) -> u32 {
        self.tick_count
    }

    pub fn state(&self) -> SimulationState {
        self.grid.to_state(self.tick_count)
    }

    pub fn render_field(&self) -> String {
        self.grid.render_field()
    }

    pub fn last_report(&self) -> &TickReport {
        &self.last_report
    }

    /// Timing breakdown of the most recent tick.
    #[cfg(feature = "profiling")]
    pub fn last_profile(&self) -> Option<&crate::profiling::TickProfile> {
        self.last_profile.as_ref()
    }

    // -----------------------------------------------------------------------
    // Phase 1: gravity
    // -----------------------------------------------------------------------

    fn apply_gravity(&mut self) -> Result<(), SimError> {
        let g: V = self.grid.gravity.cast();
        let down = Direction::Down.index();

        let Some(pool) = &self.pool else {
            for (row, mask) in self.gravity_masks.iter().enumerate() {
                for (col, _) in mask.iter().enumerate().filter(|(_, open)| **open) {
                    self.grid.velocity[(row, col)][down] += g;
                }
            }
            return Ok(());
        };

        let handles: Vec<_> = self
            .gravity_masks
            .iter()
            .enumerate()
            .map(|(row, mask)| {
                let mut values = self.grid.velocity.take_row(row);
                let mask = Arc::clone(mask);
                pool.submit(move || {
                    for (cell, _) in values.iter_mut().zip(mask.iter()).filter(|(_, open)| **open) {
                        cell[down] += g;
                    }
                    values
                })
            })
            .collect();
        pool.wait_all();

        restore_rows(
            &mut self.grid.velocity,
            handles.into_iter().map(TaskHandle::wait),
        )
    }

    // -----------------------------------------------------------------------
    // Phase 2: pressure
    // -----------------------------------------------------------------------

    fn apply_pressure(&mut self) -> Result<P, SimError> {
        let grid = &mut self.grid;
        grid.old_p.clone_from(&grid.p);
        let mut total = P::zero();

        for cell in grid::cells(grid.height, grid.width) {
            if grid.is_wall(cell) {
                continue;
            }
            for dir in Direction::ALL {
                let Some(next) = grid.open_neighbour(cell, dir) else {
                    continue;
                };
                if !(grid.old_p[next] < grid.old_p[cell]) {
                    continue;
                }

                let mut force = grid.old_p[cell] - grid.old_p[next];
                let rho_next = grid.density(next);
                let back = dir.opposite().index();
                let contr = grid.velocity[next][back];
                let carried: P = (contr * rho_next.cast::<V>()).cast();
                if carried >= force {
                    grid.velocity[next][back] = contr - (force / rho_next.cast::<P>()).cast::<V>();
                    continue;
                }

                force -= carried;
                grid.velocity[next][back] = V::zero();
                let rho_here = grid.density(cell);
                grid.velocity[cell][dir.index()] += (force / rho_here.cast::<P>()).cast::<V>();
                let share = spread(grid, cell, force)?;
                grid.p[cell] -= share;
                total -= share;
            }
        }
        Ok(total)
    }

    // -----------------------------------------------------------------------
    // Phase 3: flow
    // -----------------------------------------------------------------------

    /// Returns the number of passes run.
    fn propagate_flows(&mut self) -> usize {
        let grid = &mut self.grid;
        grid.flow.fill([VF::zero(); 4]);
        let one = SimFixed::from_int(1);

        let mut passes = 0;
        loop {
            grid.ut += 2;
            passes += 1;
            let mut committed = false;
            for cell in grid::cells(grid.height, grid.width) {
                if grid.is_wall(cell) || grid.last_use[cell] == grid.ut {
                    continue;
                }
                if grid.propagate_flow(cell, one).amount > SimFixed::zero() {
                    committed = true;
                }
            }
            if !committed {
                return passes;
            }
        }
    }

    // -----------------------------------------------------------------------
    // Phase 4: redistribution
    // -----------------------------------------------------------------------

    fn redistribute_energy(&mut self) -> Result<P, SimError> {
        let grid = &mut self.grid;
        let damping = P::from_f64(0.8);
        let mut total = P::zero();

        for cell in grid::cells(grid.height, grid.width) {
            if grid.is_wall(cell) {
                continue;
            }
            for dir in Direction::ALL {
                let d = dir.index();
                let old_v = grid.velocity[cell][d];
                if !(old_v > V::zero()) {
                    continue;
                }
                let new_v: V = grid.flow[cell][d].cast();
                if new_v > old_v {
                    return Err(SimError::FlowExceedsCapacity {
                        row: cell.0,
                        col: cell.1,
                        direction: dir,
                    });
                }
                grid.velocity[cell][d] = new_v;

                let mut force: P = ((old_v - new_v) * grid.density(cell).cast::<V>()).cast();
                if grid.field[cell] == PLAIN_FLUID {
                    force *= damping;
                }
                let target = grid.open_neighbour(cell, dir).unwrap_or(cell);
                let share = spread(grid, target, force)?;
                grid.p[target] += share;
                total += share;
            }
        }
        Ok(total)
    }

    // -----------------------------------------------------------------------
    // Phase 5: movement
    // -----------------------------------------------------------------------

    fn move_particles(&mut self) -> bool {
        let grid = &mut self.grid;
        let rng = &mut self.rng;
        grid.ut += 2;

        let mut moved = false;
        for cell in grid::cells(grid.height, grid.width) {
            if grid.is_wall(cell) || grid.last_use[cell] == grid.ut {
                continue;
            }
            if rng.fraction() < grid.move_probability(cell) {
                moved |= grid.propagate_move(cell, true, rng);
            } else {
                grid.propagate_stop(cell, true);
            }
        }
        moved
    }
}

/// Put back rows handed out with [`Matrix::take_row`], in row order.
///
/// Every row is restored even when a task failed: lost rows are reset to
/// defaults so the matrix keeps its shape. The first failure is returned.
fn restore_rows<T, I>(matrix: &mut Matrix<T>, results: I) -> Result<(), SimError>
where
    T: Default + Clone,
    I: IntoIterator<Item = Result<Vec<T>, PoolError>>,
{
    let mut outcome = Ok(());
    for (row, result) in results.into_iter().enumerate() {
        match result {
            Ok(values) => matrix.restore_row(row, values),
            Err(e) => {
                log::error!("gravity task for row {row} failed: {e}");
                matrix.reset_row(row);
                if outcome.is_ok() {
                    outcome = Err(e.into());
                }
            }
        }
    }
    outcome
}

/// `force` divided by the open-neighbour count of `cell`.
fn spread<P: Scalar, V, VF>(grid: &Grid<P, V, VF>, cell: Cell, force: P) -> Result<P, SimError> {
    match grid.dirs[cell] {
        0 => Err(SimError::IsolatedCell {
            row: cell.0,
            col: cell.1,
        }),
        dirs => Ok(force / P::from_int(i64::from(dirs))),
    }
}

impl<P: Scalar, V: Scalar, VF: Scalar> Simulation for FluidEngine<P, V, VF> {
    fn step(&mut self) -> Result<bool, SimError> {
        FluidEngine::step(self)
    }

    fn tick_count(&self) -> u32 {
        FluidEngine::tick_count(self)
    }

    fn state(&self) -> SimulationState {
        FluidEngine::state(self)
    }

    fn render_field(&self) -> String {
        FluidEngine::render_field(self)
    }

    fn last_report(&self) -> &TickReport {
        FluidEngine::last_report(self)
    }
}
