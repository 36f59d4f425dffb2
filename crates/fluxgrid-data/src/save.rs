//! Binary run-state persistence.
//!
//! Layout, all integers little-endian:
//!
//! | field            | type        |
//! |------------------|-------------|
//! | tick count       | `u32`       |
//! | height           | `u64`       |
//! | width            | `u64`       |
//! | gravity          | `i64` raw   |
//! | generation       | `u32`       |
//! | density table    | 256 x `i64` |
//! | cells, row-major | see below   |
//!
//! Each cell: kind `u8`, pressure `i64`, dirs `u32`, last use `u32`, then four
//! `i64` velocities in up, down, left, right order.
//!
//! Raw values carry `frac_bits` fractional bits. That count is not stored, so
//! reader and writer must agree on it.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use fluxgrid_core::engine::SimError;
use fluxgrid_core::fixed::SimFixed;
use fluxgrid_core::grid::RHO_SIZE;
use fluxgrid_core::state::SimulationState;

/// Largest grid a save file may describe.
pub const MAX_CELLS: u64 = 1 << 26;

/// Cells reserved up front when reading; larger grids grow as they are read.
const RESERVE_CELLS: usize = 1 << 16;

/// Errors from writing or reading a saved state.
#[derive(Debug, thiserror::Error)]
pub enum SaveError {
    #[error("save data ended early")]
    Truncated,

    #[error("implausible grid size {height}x{width}")]
    Dimensions { height: u64, width: u64 },

    #[error("fraction bits {0} out of range, expected at most 64")]
    FracBits(u32),

    #[error("value {value} does not fit a 64-bit raw with {frac_bits} fraction bits")]
    OutOfRange { value: SimFixed, frac_bits: u32 },

    #[error("saved state is inconsistent: {0}")]
    Invalid(#[from] SimError),

    #[error(transparent)]
    Io(io::Error),
}

impl From<io::Error> for SaveError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            SaveError::Truncated
        } else {
            SaveError::Io(e)
        }
    }
}

fn check_frac_bits(frac_bits: u32) -> Result<(), SaveError> {
    if frac_bits > 64 {
        return Err(SaveError::FracBits(frac_bits));
    }
    Ok(())
}

/// Raw value of `v` re-expressed with `frac_bits` fractional bits.
fn to_raw(v: SimFixed, frac_bits: u32) -> Result<i64, SaveError> {
    let raw = v.raw() as i128;
    let k = SimFixed::FRAC_BITS;
    let scaled = if frac_bits >= k {
        raw << (frac_bits - k)
    } else {
        raw >> (k - frac_bits)
    };
    i64::try_from(scaled).map_err(|_| SaveError::OutOfRange { value: v, frac_bits })
}

/// Every fixed-point value stored in a save, in file order.
fn stored_values(state: &SimulationState) -> impl Iterator<Item = SimFixed> + '_ {
    std::iter::once(state.gravity)
        .chain(state.rho.iter().copied())
        .chain(
            state
                .pressure
                .iter()
                .zip(&state.velocity)
                .flat_map(|(&p, v)| std::iter::once(p).chain(v.iter().copied())),
        )
}

fn from_raw(raw: i64, frac_bits: u32) -> SimFixed {
    SimFixed::from_scaled(raw as i128, frac_bits)
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Serialize `state` into `out`.
pub fn write_state<W: Write>(
    out: &mut W,
    state: &SimulationState,
    frac_bits: u32,
) -> Result<(), SaveError> {
    check_frac_bits(frac_bits)?;
    state.validate()?;
    // Nothing is written unless every value fits.
    for v in stored_values(state) {
        to_raw(v, frac_bits)?;
    }

    out.write_all(&state.tick_count.to_le_bytes())?;
    out.write_all(&(state.height as u64).to_le_bytes())?;
    out.write_all(&(state.width as u64).to_le_bytes())?;
    out.write_all(&to_raw(state.gravity, frac_bits)?.to_le_bytes())?;
    out.write_all(&state.generation.to_le_bytes())?;
    for &density in &state.rho {
        out.write_all(&to_raw(density, frac_bits)?.to_le_bytes())?;
    }

    for i in 0..state.field.len() {
        out.write_all(&[state.field[i]])?;
        out.write_all(&to_raw(state.pressure[i], frac_bits)?.to_le_bytes())?;
        out.write_all(&state.dirs[i].to_le_bytes())?;
        out.write_all(&state.last_use[i].to_le_bytes())?;
        for &v in &state.velocity[i] {
            out.write_all(&to_raw(v, frac_bits)?.to_le_bytes())?;
        }
    }
    Ok(())
}

/// Write `state` to `<dir>/<tick_count>`, creating `dir` if needed.
pub fn save_to_dir(
    dir: &Path,
    state: &SimulationState,
    frac_bits: u32,
) -> Result<PathBuf, SaveError> {
    fs::create_dir_all(dir)?;
    let path = dir.join(state.tick_count.to_string());
    let mut out = BufWriter::new(File::create(&path)?);
    write_state(&mut out, state, frac_bits)?;
    out.flush()?;
    log::info!("saved tick {} to {}", state.tick_count, path.display());
    Ok(path)
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

fn read_array<const N: usize, R: Read>(input: &mut R) -> Result<[u8; N], SaveError> {
    let mut buf = [0u8; N];
    input.read_exact(&mut buf)?;
    Ok(buf)
}

fn read_u32<R: Read>(input: &mut R) -> Result<u32, SaveError> {
    Ok(u32::from_le_bytes(read_array(input)?))
}

fn read_u64<R: Read>(input: &mut R) -> Result<u64, SaveError> {
    Ok(u64::from_le_bytes(read_array(input)?))
}

fn read_fixed<R: Read>(input: &mut R, frac_bits: u32) -> Result<SimFixed, SaveError> {
    Ok(from_raw(i64::from_le_bytes(read_array(input)?), frac_bits))
}

/// Deserialize a state whose raw values carry `frac_bits` fractional bits.
pub fn read_state<R: Read>(input: &mut R, frac_bits: u32) -> Result<SimulationState, SaveError> {
    check_frac_bits(frac_bits)?;

    let tick_count = read_u32(input)?;
    let height = read_u64(input)?;
    let width = read_u64(input)?;
    let cells = height
        .checked_mul(width)
        .filter(|&c| c <= MAX_CELLS)
        .ok_or(SaveError::Dimensions { height, width })?;
    let gravity = read_fixed(input, frac_bits)?;
    let generation = read_u32(input)?;

    let mut rho = [SimFixed::zero(); RHO_SIZE];
    for density in &mut rho {
        *density = read_fixed(input, frac_bits)?;
    }

    let cells = cells as usize;
    let reserve = cells.min(RESERVE_CELLS);
    let mut field = Vec::with_capacity(reserve);
    let mut pressure = Vec::with_capacity(reserve);
    let mut dirs = Vec::with_capacity(reserve);
    let mut last_use = Vec::with_capacity(reserve);
    let mut velocity = Vec::with_capacity(reserve);
    for _ in 0..cells {
        field.push(read_array::<1, _>(input)?[0]);
        pressure.push(read_fixed(input, frac_bits)?);
        dirs.push(read_u32(input)?);
        last_use.push(read_u32(input)?);
        let mut v = [SimFixed::zero(); 4];
        for component in &mut v {
            *component = read_fixed(input, frac_bits)?;
        }
        velocity.push(v);
    }

    let state = SimulationState {
        height: height as usize,
        width: width as usize,
        gravity,
        rho,
        generation,
        tick_count,
        field,
        pressure,
        velocity,
        dirs,
        last_use,
    };
    state.validate()?;
    Ok(state)
}

/// Read a state file written by [`save_to_dir`].
pub fn load_state_file(path: &Path, frac_bits: u32) -> Result<SimulationState, SaveError> {
    let mut input = BufReader::new(File::open(path)?);
    let state = read_state(&mut input, frac_bits)?;
    log::info!(
        "loaded {}x{} state at tick {} from {}",
        state.height,
        state.width,
        state.tick_count,
        path.display()
    );
    Ok(state)
}
