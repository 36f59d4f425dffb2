//! Numeric type descriptors chosen at startup.
//!
//! A [`NumericType`] names one concrete scalar layout (`double`, `float`,
//! `fixed(N,K)`, `fast_fixed(N,K)`). Descriptors are parsed from config and
//! command-line strings and resolved to engine instantiations by the
//! registry.

use std::fmt;
use std::str::FromStr;

/// Bit widths a fixed-point store may have.
pub const FIXED_WIDTHS: [u32; 4] = [8, 16, 32, 64];

/// Errors from parsing a descriptor string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NumericTypeError {
    #[error("unknown numeric type '{0}'")]
    Unknown(String),
    #[error("malformed numeric type '{0}', expected e.g. fixed(32,16)")]
    Malformed(String),
    #[error("unsupported fixed-point width {bits}, expected one of 8, 16, 32, 64")]
    InvalidWidth { bits: u32 },
    #[error("fractional bits {frac} exceed width {bits}")]
    InvalidFraction { bits: u32, frac: u32 },
}

/// A concrete scalar layout for pressure, velocity or flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum NumericType {
    Double,
    Float,
    Fixed { bits: u32, frac: u32 },
    FastFixed { bits: u32, frac: u32 },
}

impl NumericType {
    /// Build a validated `fixed(bits, frac)` descriptor.
    pub fn fixed(bits: u32, frac: u32) -> Result<Self, NumericTypeError> {
        check_layout(bits, frac)?;
        Ok(Self::Fixed { bits, frac })
    }

    /// Build a validated `fast_fixed(bits, frac)` descriptor.
    pub fn fast_fixed(bits: u32, frac: u32) -> Result<Self, NumericTypeError> {
        check_layout(bits, frac)?;
        Ok(Self::FastFixed { bits, frac })
    }
}

impl Default for NumericType {
    fn default() -> Self {
        Self::Fixed { bits: 32, frac: 16 }
    }
}

fn check_layout(bits: u32, frac: u32) -> Result<(), NumericTypeError> {
    if !FIXED_WIDTHS.contains(&bits) {
        return Err(NumericTypeError::InvalidWidth { bits });
    }
    if frac > bits {
        return Err(NumericTypeError::InvalidFraction { bits, frac });
    }
    Ok(())
}

impl fmt::Display for NumericType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Double => write!(f, "double"),
            Self::Float => write!(f, "float"),
            Self::Fixed { bits, frac } => write!(f, "fixed({bits},{frac})"),
            Self::FastFixed { bits, frac } => write!(f, "fast_fixed({bits},{frac})"),
        }
    }
}

impl FromStr for NumericType {
    type Err = NumericTypeError;

    /// Accepts `double`, `float`, `fixed(N,K)` and `fast_fixed(N,K)` in any
    /// case, with optional whitespace around the arguments.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_ascii_lowercase();

        match normalized.as_str() {
            "double" => return Ok(Self::Double),
            "float" => return Ok(Self::Float),
            _ => {}
        }

        let Some((name, rest)) = normalized.split_once('(') else {
            return Err(NumericTypeError::Unknown(s.to_string()));
        };
        let args = rest
            .strip_suffix(')')
            .ok_or_else(|| NumericTypeError::Malformed(s.to_string()))?;
        let (bits, frac) = args
            .split_once(',')
            .ok_or_else(|| NumericTypeError::Malformed(s.to_string()))?;
        let bits: u32 = bits
            .parse()
            .map_err(|_| NumericTypeError::Malformed(s.to_string()))?;
        let frac: u32 = frac
            .parse()
            .map_err(|_| NumericTypeError::Malformed(s.to_string()))?;

        match name {
            "fixed" => Self::fixed(bits, frac),
            "fast_fixed" => Self::fast_fixed(bits, frac),
            _ => Err(NumericTypeError::Unknown(s.to_string())),
        }
    }
}

impl TryFrom<String> for NumericType {
    type Error = NumericTypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<NumericType> for String {
    fn from(value: NumericType) -> Self {
        value.to_string()
    }
}
