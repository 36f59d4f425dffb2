//! Grid state: per-cell kinds, pressure, velocity capacity, realized flow and
//! visitation markers.
//!
//! Storage is row-indexed ([`Matrix`]) so that whole rows can be handed to
//! pool workers during the gravity phase. The wall topology is fixed at
//! construction: particles only ever swap between two non-wall cells.

use std::ops::{Index, IndexMut};
use std::sync::Arc;

use crate::engine::SimError;
use crate::fixed::SimFixed;
use crate::scalar::Scalar;
use crate::state::SimulationState;

/// Cell kind of an impassable cell.
pub const WALL: u8 = b'#';

/// Cell kind whose kinetic energy is damped on redistribution.
pub const PLAIN_FLUID: u8 = b'.';

/// Number of entries in the density table (one per cell-kind byte).
pub const RHO_SIZE: usize = 256;

/// `(row, col)` coordinate.
pub type Cell = (usize, usize);

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// One of the four cardinal directions.
///
/// [`Direction::ALL`] is the canonical iteration order, also used for the
/// four velocity components of every cell and the persisted layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    /// Position of this direction in [`Direction::ALL`].
    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Direction::Up => 0,
            Direction::Down => 1,
            Direction::Left => 2,
            Direction::Right => 3,
        }
    }

    #[inline]
    pub const fn opposite(self) -> Self {
        match self {
            Direction::Up => Direction::Down,
            Direction::Down => Direction::Up,
            Direction::Left => Direction::Right,
            Direction::Right => Direction::Left,
        }
    }

    /// `(row, col)` offset of the neighbour in this direction.
    #[inline]
    pub const fn delta(self) -> (isize, isize) {
        match self {
            Direction::Up => (-1, 0),
            Direction::Down => (1, 0),
            Direction::Left => (0, -1),
            Direction::Right => (0, 1),
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Matrix
// ---------------------------------------------------------------------------

/// Row-indexed `height x width` storage.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix<T> {
    width: usize,
    rows: Vec<Vec<T>>,
}

impl<T: Clone> Matrix<T> {
    pub fn filled(height: usize, width: usize, value: T) -> Self {
        Self {
            width,
            rows: vec![vec![value; width]; height],
        }
    }

    /// Build from row-major values. `values.len()` must equal
    /// `height * width`.
    pub fn from_row_major(height: usize, width: usize, values: &[T]) -> Option<Self> {
        if values.len() != height * width {
            return None;
        }
        let rows = if width == 0 {
            vec![Vec::new(); height]
        } else {
            values.chunks(width).map(<[T]>::to_vec).collect()
        };
        Some(Self { width, rows })
    }

    pub fn fill(&mut self, value: T) {
        for row in &mut self.rows {
            row.fill(value.clone());
        }
    }
}

impl<T> Matrix<T> {
    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn row(&self, row: usize) -> &[T] {
        &self.rows[row]
    }

    /// Move a row out, leaving it empty until [`restore_row`](Self::restore_row).
    pub fn take_row(&mut self, row: usize) -> Vec<T> {
        std::mem::take(&mut self.rows[row])
    }

    pub fn restore_row(&mut self, row: usize, values: Vec<T>) {
        debug_assert_eq!(values.len(), self.width);
        self.rows[row] = values;
    }

    /// Refill a taken row with defaults when its values were lost.
    pub fn reset_row(&mut self, row: usize)
    where
        T: Default + Clone,
    {
        self.rows[row] = vec![T::default(); self.width];
    }

    /// All values in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.rows.iter().flatten()
    }
}

impl<T> Index<Cell> for Matrix<T> {
    type Output = T;

    #[inline]
    fn index(&self, (row, col): Cell) -> &T {
        &self.rows[row][col]
    }
}

impl<T> IndexMut<Cell> for Matrix<T> {
    #[inline]
    fn index_mut(&mut self, (row, col): Cell) -> &mut T {
        &mut self.rows[row][col]
    }
}

// ---------------------------------------------------------------------------
// Grid
// ---------------------------------------------------------------------------

/// Mutable field state of one engine instantiation.
///
/// `P` is the pressure type, `V` the velocity-capacity type and `VF` the
/// realized-flow type.
#[derive(Debug, Clone)]
pub struct Grid<P, V, VF> {
    pub(crate) height: usize,
    pub(crate) width: usize,
    pub(crate) gravity: SimFixed,
    pub(crate) rho: [SimFixed; RHO_SIZE],
    pub(crate) field: Matrix<u8>,
    pub(crate) p: Matrix<P>,
    pub(crate) old_p: Matrix<P>,
    pub(crate) velocity: Matrix<[V; 4]>,
    pub(crate) flow: Matrix<[VF; 4]>,
    pub(crate) dirs: Matrix<u32>,
    pub(crate) last_use: Matrix<u32>,
    /// Generation counter.
    pub(crate) ut: u32,
}

impl<P: Scalar, V: Scalar, VF: Scalar> Grid<P, V, VF> {
    /// Load a snapshot, converting every stored value into the working types.
    pub fn from_state(state: &SimulationState) -> Result<Self, SimError> {
        state.validate()?;
        let (height, width) = (state.height, state.width);
        let mismatch = || SimError::DimensionMismatch {
            height,
            width,
            cells: state.field.len(),
        };

        let pressure: Vec<P> = state.pressure.iter().map(|v| v.cast()).collect();
        let velocity: Vec<[V; 4]> = state
            .velocity
            .iter()
            .map(|cell| cell.map(|v| v.cast()))
            .collect();

        let p = Matrix::from_row_major(height, width, &pressure).ok_or_else(mismatch)?;
        Ok(Self {
            height,
            width,
            gravity: state.gravity,
            rho: state.rho,
            field: Matrix::from_row_major(height, width, &state.field).ok_or_else(mismatch)?,
            old_p: p.clone(),
            p,
            velocity: Matrix::from_row_major(height, width, &velocity).ok_or_else(mismatch)?,
            flow: Matrix::filled(height, width, [VF::zero(); 4]),
            dirs: Matrix::from_row_major(height, width, &state.dirs).ok_or_else(mismatch)?,
            last_use: Matrix::from_row_major(height, width, &state.last_use)
                .ok_or_else(mismatch)?,
            ut: state.generation,
        })
    }

    /// Snapshot into the canonical type-independent form.
    pub fn to_state(&self, tick_count: u32) -> SimulationState {
        SimulationState {
            height: self.height,
            width: self.width,
            gravity: self.gravity,
            rho: self.rho,
            generation: self.ut,
            tick_count,
            field: self.field.iter().copied().collect(),
            pressure: self.p.iter().map(|v| v.cast()).collect(),
            velocity: self
                .velocity
                .iter()
                .map(|cell| cell.map(|v| v.cast()))
                .collect(),
            dirs: self.dirs.iter().copied().collect(),
            last_use: self.last_use.iter().copied().collect(),
        }
    }
}

impl<P, V, VF> Grid<P, V, VF> {
    /// Whether `cell` is a wall. Out-of-bounds coordinates never reach here.
    #[inline]
    pub fn is_wall(&self, cell: Cell) -> bool {
        self.field[cell] == WALL
    }

    /// Neighbour of `cell` in `dir`, if it lies inside the grid.
    #[inline]
    pub fn neighbour(&self, (row, col): Cell, dir: Direction) -> Option<Cell> {
        let (dr, dc) = dir.delta();
        let row = row.checked_add_signed(dr)?;
        let col = col.checked_add_signed(dc)?;
        (row < self.height && col < self.width).then_some((row, col))
    }

    /// Neighbour of `cell` in `dir` if it is inside the grid and not a wall.
    #[inline]
    pub fn open_neighbour(&self, cell: Cell, dir: Direction) -> Option<Cell> {
        self.neighbour(cell, dir).filter(|&n| !self.is_wall(n))
    }

    /// Density of the kind currently occupying `cell`.
    #[inline]
    pub fn density(&self, cell: Cell) -> SimFixed {
        self.rho[self.field[cell] as usize]
    }

    /// One mask per row: `true` where gravity applies (the cell and the cell
    /// below are both non-wall).
    pub fn gravity_masks(&self) -> Vec<Arc<[bool]>> {
        (0..self.height)
            .map(|row| {
                (0..self.width)
                    .map(|col| {
                        !self.is_wall((row, col))
                            && self.open_neighbour((row, col), Direction::Down).is_some()
                    })
                    .collect()
            })
            .collect()
    }

    /// Exchange the particle contents of two cells: kind, pressure and all
    /// four velocity components. Neighbour counts stay with the position.
    pub fn swap_contents(&mut self, a: Cell, b: Cell) {
        let kind = self.field[a];
        self.field[a] = self.field[b];
        self.field[b] = kind;

        swap_cells(&mut self.p, a, b);
        swap_cells(&mut self.velocity, a, b);
    }

    /// The field as text, one line per row.
    pub fn render_field(&self) -> String {
        render_rows(self.width, self.field.iter().copied())
    }
}

/// Row-major iterator over every coordinate of a `height x width` grid.
pub fn cells(height: usize, width: usize) -> impl Iterator<Item = Cell> {
    (0..height).flat_map(move |row| (0..width).map(move |col| (row, col)))
}

fn swap_cells<T>(matrix: &mut Matrix<T>, (ar, ac): Cell, (br, bc): Cell) {
    if ar == br {
        matrix.rows[ar].swap(ac, bc);
    } else {
        let (lo, hi) = if ar < br { (ar, br) } else { (br, ar) };
        let (head, tail) = matrix.rows.split_at_mut(hi);
        let (lo_col, hi_col) = if ar < br { (ac, bc) } else { (bc, ac) };
        std::mem::swap(&mut head[lo][lo_col], &mut tail[0][hi_col]);
    }
}

/// Render row-major kind bytes as lines of `width` characters.
pub(crate) fn render_rows(width: usize, kinds: impl Iterator<Item = u8>) -> String {
    let mut out = String::new();
    let mut col = 0;
    for kind in kinds {
        out.push(char::from(kind));
        col += 1;
        if col == width {
            out.push('\n');
            col = 0;
        }
    }
    out
}
