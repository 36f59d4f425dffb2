//! The [`Scalar`] abstraction the engine is generic over.
//!
//! Pressure, velocity and flow may each be `f32`, `f64` or any fixed-point
//! layout. Mixed-type expressions go through [`Scalar::cast`], which routes
//! via [`Repr`] so that fixed-to-fixed conversion keeps the exact shift
//! semantics of [`FixedPoint::from_scaled`].

use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use crate::fixed::{Backing, FixedPoint, Store};

/// Type-neutral value used when converting between scalar types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Repr {
    Float(f64),
    Fixed { raw: i128, frac: u32 },
}

/// Real-number type usable for pressure, velocity and flow fields.
pub trait Scalar:
    Copy
    + Default
    + PartialOrd
    + fmt::Debug
    + fmt::Display
    + Send
    + Sync
    + 'static
    + Add<Output = Self>
    + Sub<Output = Self>
    + Mul<Output = Self>
    + Div<Output = Self>
    + Neg<Output = Self>
    + AddAssign
    + SubAssign
    + MulAssign
    + DivAssign
{
    fn from_int(v: i64) -> Self;

    fn from_f64(v: f64) -> Self;

    fn to_f64(self) -> f64;

    fn repr(self) -> Repr;

    fn from_repr(repr: Repr) -> Self;

    #[inline]
    fn zero() -> Self {
        Self::default()
    }

    /// Convert into another scalar type.
    #[inline]
    fn cast<T: Scalar>(self) -> T {
        T::from_repr(self.repr())
    }

    /// The smaller of two values; `self` wins ties and unordered pairs.
    #[inline]
    fn min_of(self, other: Self) -> Self {
        if other < self { other } else { self }
    }
}

impl<F: Backing> Scalar for FixedPoint<F> {
    #[inline]
    fn from_int(v: i64) -> Self {
        FixedPoint::from_int(v)
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        FixedPoint::from_f64(v)
    }

    #[inline]
    fn to_f64(self) -> f64 {
        FixedPoint::to_f64(self)
    }

    #[inline]
    fn repr(self) -> Repr {
        Repr::Fixed {
            raw: self.raw().widen(),
            frac: Self::FRAC_BITS,
        }
    }

    #[inline]
    fn from_repr(repr: Repr) -> Self {
        match repr {
            Repr::Float(v) => FixedPoint::from_f64(v),
            Repr::Fixed { raw, frac } => FixedPoint::from_scaled(raw, frac),
        }
    }
}

impl Scalar for f64 {
    #[inline]
    fn from_int(v: i64) -> Self {
        v as f64
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self
    }

    #[inline]
    fn repr(self) -> Repr {
        Repr::Float(self)
    }

    #[inline]
    fn from_repr(repr: Repr) -> Self {
        match repr {
            Repr::Float(v) => v,
            Repr::Fixed { raw, frac } => raw as f64 / (1u128 << frac) as f64,
        }
    }
}

impl Scalar for f32 {
    #[inline]
    fn from_int(v: i64) -> Self {
        v as f32
    }

    #[inline]
    fn from_f64(v: f64) -> Self {
        v as f32
    }

    #[inline]
    fn to_f64(self) -> f64 {
        self as f64
    }

    #[inline]
    fn repr(self) -> Repr {
        Repr::Float(self as f64)
    }

    #[inline]
    fn from_repr(repr: Repr) -> Self {
        match repr {
            Repr::Float(v) => v as f32,
            Repr::Fixed { raw, frac } => raw as f32 / (1u128 << frac) as f32,
        }
    }
}
