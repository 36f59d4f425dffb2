//! Canonical simulation snapshot and state hashing.
//!
//! [`SimulationState`] is independent of the numeric types an engine runs
//! with: every real value is stored as [`SimFixed`]. It seeds engines, is read
//! back after ticks, and is what the persistence layer writes and reads.

use crate::engine::SimError;
use crate::fixed::SimFixed;
use crate::grid::{self, Direction, RHO_SIZE, WALL};

// ---------------------------------------------------------------------------
// Description
// ---------------------------------------------------------------------------

/// A freshly loaded scenario: gravity, density table and field layout.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationDescription {
    pub gravity: SimFixed,
    pub rho: [SimFixed; RHO_SIZE],
    pub height: usize,
    pub width: usize,
    /// Row-major cell kinds.
    pub field: Vec<u8>,
}

impl SimulationDescription {
    /// Build from text rows of equal length.
    pub fn from_rows(
        gravity: SimFixed,
        rho: [SimFixed; RHO_SIZE],
        rows: &[&str],
    ) -> Result<Self, SimError> {
        let height = rows.len();
        let width = rows.first().map_or(0, |r| r.len());
        let field: Vec<u8> = rows.iter().flat_map(|r| r.bytes()).collect();
        if field.len() != height * width {
            return Err(SimError::DimensionMismatch {
                height,
                width,
                cells: field.len(),
            });
        }
        Ok(Self {
            gravity,
            rho,
            height,
            width,
            field,
        })
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Full persisted state of a run. All per-cell vectors are row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    pub height: usize,
    pub width: usize,
    pub gravity: SimFixed,
    pub rho: [SimFixed; RHO_SIZE],
    /// Generation counter.
    pub generation: u32,
    /// Ticks on which at least one particle moved.
    pub tick_count: u32,
    pub field: Vec<u8>,
    pub pressure: Vec<SimFixed>,
    /// Velocity capacity per cell, in [`Direction::ALL`] order.
    pub velocity: Vec<[SimFixed; 4]>,
    /// Non-wall orthogonal neighbour count per cell.
    pub dirs: Vec<u32>,
    pub last_use: Vec<u32>,
}

impl SimulationState {
    /// Start state for a description: zero pressure and velocity, neighbour
    /// counts computed once from the wall layout.
    pub fn from_description(desc: &SimulationDescription) -> Result<Self, SimError> {
        let cells = desc.height * desc.width;
        if desc.field.len() != cells {
            return Err(SimError::DimensionMismatch {
                height: desc.height,
                width: desc.width,
                cells: desc.field.len(),
            });
        }

        let is_open = |row: usize, col: usize| desc.field[row * desc.width + col] != WALL;
        let dirs = grid::cells(desc.height, desc.width)
            .map(|(row, col)| {
                if !is_open(row, col) {
                    return 0;
                }
                Direction::ALL
                    .into_iter()
                    .filter(|dir| {
                        let (dr, dc) = dir.delta();
                        match (row.checked_add_signed(dr), col.checked_add_signed(dc)) {
                            (Some(r), Some(c)) if r < desc.height && c < desc.width => {
                                is_open(r, c)
                            }
                            _ => false,
                        }
                    })
                    .count() as u32
            })
            .collect();

        let state = Self {
            height: desc.height,
            width: desc.width,
            gravity: desc.gravity,
            rho: desc.rho,
            generation: 0,
            tick_count: 0,
            field: desc.field.clone(),
            pressure: vec![SimFixed::zero(); cells],
            velocity: vec![[SimFixed::zero(); 4]; cells],
            dirs,
            last_use: vec![0; cells],
        };
        state.validate()?;
        Ok(state)
    }

    /// Check that every per-cell vector matches the dimensions and that every
    /// fluid kind present has a non-zero density.
    pub fn validate(&self) -> Result<(), SimError> {
        let cells = self.height * self.width;
        let lengths = [
            self.field.len(),
            self.pressure.len(),
            self.velocity.len(),
            self.dirs.len(),
            self.last_use.len(),
        ];
        if let Some(&bad) = lengths.iter().find(|&&len| len != cells) {
            return Err(SimError::DimensionMismatch {
                height: self.height,
                width: self.width,
                cells: bad,
            });
        }

        let mut seen = [false; RHO_SIZE];
        for &kind in &self.field {
            if kind == WALL || seen[kind as usize] {
                continue;
            }
            seen[kind as usize] = true;
            if self.rho[kind as usize] == SimFixed::zero() {
                return Err(SimError::MissingDensity {
                    kind: char::from(kind),
                });
            }
        }
        Ok(())
    }

    /// The field as text, one line per row.
    pub fn render_field(&self) -> String {
        grid::render_rows(self.width, self.field.iter().copied())
    }

    /// FNV-1a hash over every persisted field.
    pub fn state_hash(&self) -> u64 {
        let mut h = StateHash::new();
        h.write_u64(self.height as u64);
        h.write_u64(self.width as u64);
        h.write_u32(self.tick_count);
        h.write_u32(self.generation);
        h.write_fixed(self.gravity);
        for &density in &self.rho {
            h.write_fixed(density);
        }
        for i in 0..self.field.len() {
            h.write(&[self.field[i]]);
            h.write_fixed(self.pressure[i]);
            h.write_u32(self.dirs[i]);
            h.write_u32(self.last_use[i]);
            for &v in &self.velocity[i] {
                h.write_fixed(v);
            }
        }
        h.finish()
    }
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// Incremental FNV-1a hasher for determinism checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    pub fn write_u32(&mut self, v: u32) {
        self.write(&v.to_le_bytes());
    }

    /// Feed the raw value of a [`SimFixed`].
    pub fn write_fixed(&mut self, v: SimFixed) {
        self.write(&v.raw().to_le_bytes());
    }

    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::PLAIN_FLUID;

    fn rho() -> [SimFixed; RHO_SIZE] {
        let mut rho = [SimFixed::zero(); RHO_SIZE];
        rho[PLAIN_FLUID as usize] = SimFixed::from_int(1);
        rho[b' ' as usize] = SimFixed::from_f64(0.01);
        rho
    }

    fn state(rows: &[&str]) -> SimulationState {
        let desc = SimulationDescription::from_rows(SimFixed::from_f64(0.1), rho(), rows).unwrap();
        SimulationState::from_description(&desc).unwrap()
    }

    #[test]
    fn dirs_count_open_neighbours() {
        let s = state(&["#####", "#. .#", "#.#.#", "#####"]);
        let at = |r: usize, c: usize| s.dirs[r * s.width + c];
        assert_eq!(at(0, 0), 0);
        assert_eq!(at(1, 1), 2);
        assert_eq!(at(1, 2), 2);
        assert_eq!(at(1, 3), 2);
        assert_eq!(at(2, 1), 1);
        assert_eq!(at(2, 3), 1);
    }

    #[test]
    fn isolated_cell_has_no_dirs() {
        let s = state(&["###", "#.#", "###"]);
        assert_eq!(s.dirs[4], 0);
    }

    #[test]
    fn grid_edge_counts_as_wall() {
        let s = state(&["..", ".."]);
        assert!(s.dirs.iter().all(|&d| d == 2));
    }

    #[test]
    fn ragged_rows_rejected() {
        let err = SimulationDescription::from_rows(SimFixed::zero(), rho(), &["###", "##"]);
        assert!(matches!(err, Err(SimError::DimensionMismatch { .. })));
    }

    #[test]
    fn missing_density_rejected() {
        let desc =
            SimulationDescription::from_rows(SimFixed::zero(), rho(), &["####", "#.x#", "####"])
                .unwrap();
        let err = SimulationState::from_description(&desc).unwrap_err();
        assert!(matches!(err, SimError::MissingDensity { kind: 'x' }));
    }

    #[test]
    fn validate_catches_short_vectors() {
        let mut s = state(&["###", "#.#", "###"]);
        s.pressure.pop();
        assert!(matches!(s.validate(), Err(SimError::DimensionMismatch { cells: 8, .. })));
    }

    #[test]
    fn render_field_one_line_per_row() {
        let s = state(&["###", "#.#", "###"]);
        assert_eq!(s.render_field(), "###\n#.#\n###\n");
    }

    #[test]
    fn hash_tracks_every_field() {
        let base = state(&["####", "#..#", "####"]);
        let h = base.state_hash();
        assert_eq!(h, base.clone().state_hash());

        let mut changed = base.clone();
        changed.pressure[5] = SimFixed::from_raw(1);
        assert_ne!(changed.state_hash(), h);

        let mut changed = base.clone();
        changed.last_use[5] = 3;
        assert_ne!(changed.state_hash(), h);

        let mut changed = base;
        changed.tick_count = 1;
        assert_ne!(changed.state_hash(), h);
    }

    #[test]
    fn state_hash_deterministic() {
        let mut h1 = StateHash::new();
        h1.write_u64(42);
        h1.write_u32(7);

        let mut h2 = StateHash::new();
        h2.write_u64(42);
        h2.write_u32(7);

        assert_eq!(h1.finish(), h2.finish());
    }
}
