//! Scaled-integer real numbers for deterministic simulation math.
//!
//! A [`FixedPoint<F>`] wraps a signed type from the `fixed` crate and gives it
//! the simulation's arithmetic rules. Two families are exposed:
//!
//! - [`Fixed<N, K>`] stores exactly `N` bits (`FixedI8` .. `FixedI64`).
//! - [`FastFixed<N, K>`] widens anything above 8 bits to `FixedI64`, trading
//!   memory for register-width arithmetic.
//!
//! Nothing saturates or clamps: every operator uses the `wrapping_*` form, so
//! overflow wraps in the store width in every build profile. Conversion
//! between layouts floors extra fractional bits. Conversion from floats
//! truncates toward zero. Division by a raw zero panics.

use std::fmt;
use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use fixed::traits::{Fixed as FixedNum, FixedSigned};
use fixed::types::extra::*;
use fixed::{FixedI8, FixedI16, FixedI32, FixedI64};

// ---------------------------------------------------------------------------
// Raw stores
// ---------------------------------------------------------------------------

/// Signed integer holding the raw bits of a fixed-point number.
pub trait Store: Copy + Eq + Ord + Default + fmt::Debug + Send + Sync + 'static {
    /// Sign-extend into the wide intermediate.
    fn widen(self) -> i128;

    /// Keep the low bits of `v` that fit the store.
    fn wrap(v: i128) -> Self;

    /// Truncate toward zero; out-of-range values saturate.
    fn from_f64_trunc(v: f64) -> Self;
}

macro_rules! impl_store {
    ($($t:ty),*) => {$(
        impl Store for $t {
            #[inline]
            fn widen(self) -> i128 {
                self as i128
            }

            #[inline]
            fn wrap(v: i128) -> Self {
                v as $t
            }

            #[inline]
            fn from_f64_trunc(v: f64) -> Self {
                v as $t
            }
        }
    )*};
}

impl_store!(i8, i16, i32, i64);

/// A signed `fixed` crate type usable as the backing of [`FixedPoint`].
pub trait Backing: FixedSigned + Send + Sync + 'static {
    type Raw: Store;

    fn from_raw(raw: Self::Raw) -> Self;

    fn to_raw(self) -> Self::Raw;
}

impl<F> Backing for F
where
    F: FixedSigned + Send + Sync + 'static,
    F::Bits: Store,
{
    type Raw = F::Bits;

    #[inline]
    fn from_raw(raw: F::Bits) -> Self {
        F::from_bits(raw)
    }

    #[inline]
    fn to_raw(self) -> F::Bits {
        self.to_bits()
    }
}

// ---------------------------------------------------------------------------
// Layouts
// ---------------------------------------------------------------------------

/// Type-level `(N, K)` pair, used to pick a backing type.
pub struct Layout<const N: u32, const K: u32>;

/// Backing type holding exactly `N` bits.
pub trait ExactLayout {
    type Backing: Backing;
}

/// Backing type holding at least `N` bits in a native-efficient width.
pub trait FastLayout {
    type Backing: Backing;
}

macro_rules! layouts {
    ($n:literal, $exact:ident, $fast:ident; $($k:literal => $frac:ident),* $(,)?) => {$(
        impl ExactLayout for Layout<$n, $k> {
            type Backing = $exact<$frac>;
        }
        impl FastLayout for Layout<$n, $k> {
            type Backing = $fast<$frac>;
        }
    )*};
}

layouts!(8, FixedI8, FixedI8;
    0 => U0, 1 => U1, 2 => U2, 3 => U3, 4 => U4, 5 => U5, 6 => U6, 7 => U7,
    8 => U8
);
layouts!(16, FixedI16, FixedI64;
    0 => U0, 1 => U1, 2 => U2, 3 => U3, 4 => U4, 5 => U5, 6 => U6, 7 => U7,
    8 => U8, 9 => U9, 10 => U10, 11 => U11, 12 => U12, 13 => U13, 14 => U14, 15 => U15,
    16 => U16
);
layouts!(32, FixedI32, FixedI64;
    0 => U0, 1 => U1, 2 => U2, 3 => U3, 4 => U4, 5 => U5, 6 => U6, 7 => U7,
    8 => U8, 9 => U9, 10 => U10, 11 => U11, 12 => U12, 13 => U13, 14 => U14, 15 => U15,
    16 => U16, 17 => U17, 18 => U18, 19 => U19, 20 => U20, 21 => U21, 22 => U22, 23 => U23,
    24 => U24, 25 => U25, 26 => U26, 27 => U27, 28 => U28, 29 => U29, 30 => U30, 31 => U31,
    32 => U32
);
layouts!(64, FixedI64, FixedI64;
    0 => U0, 1 => U1, 2 => U2, 3 => U3, 4 => U4, 5 => U5, 6 => U6, 7 => U7,
    8 => U8, 9 => U9, 10 => U10, 11 => U11, 12 => U12, 13 => U13, 14 => U14, 15 => U15,
    16 => U16, 17 => U17, 18 => U18, 19 => U19, 20 => U20, 21 => U21, 22 => U22, 23 => U23,
    24 => U24, 25 => U25, 26 => U26, 27 => U27, 28 => U28, 29 => U29, 30 => U30, 31 => U31,
    32 => U32, 33 => U33, 34 => U34, 35 => U35, 36 => U36, 37 => U37, 38 => U38, 39 => U39,
    40 => U40, 41 => U41, 42 => U42, 43 => U43, 44 => U44, 45 => U45, 46 => U46, 47 => U47,
    48 => U48, 49 => U49, 50 => U50, 51 => U51, 52 => U52, 53 => U53, 54 => U54, 55 => U55,
    56 => U56, 57 => U57, 58 => U58, 59 => U59, 60 => U60, 61 => U61, 62 => U62, 63 => U63,
    64 => U64
);

/// Fixed-point number with an exactly `N`-bit store and `K` fractional bits.
pub type Fixed<const N: u32, const K: u32> = FixedPoint<<Layout<N, K> as ExactLayout>::Backing>;

/// Fixed-point number with a word-sized store for `N > 8`.
pub type FastFixed<const N: u32, const K: u32> = FixedPoint<<Layout<N, K> as FastLayout>::Backing>;

/// Canonical Q48.16 type used for gravity, densities, random fractions and
/// persisted state.
pub type SimFixed = Fixed<64, 16>;

// ---------------------------------------------------------------------------
// FixedPoint
// ---------------------------------------------------------------------------

/// A real number backed by the `fixed` crate type `F`.
///
/// Ordering and equality compare raw values.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct FixedPoint<F>(F);

impl<F: Backing> FixedPoint<F> {
    /// Number of fractional bits.
    pub const FRAC_BITS: u32 = F::FRAC_NBITS;

    /// Wrap a raw scaled integer without scaling it.
    #[inline]
    pub fn from_raw(raw: F::Raw) -> Self {
        Self(F::from_raw(raw))
    }

    /// The raw scaled integer.
    #[inline]
    pub fn raw(self) -> F::Raw {
        self.0.to_raw()
    }

    /// The backing `fixed` value.
    #[inline]
    pub fn inner(self) -> F {
        self.0
    }

    #[inline]
    pub fn zero() -> Self {
        Self(F::ZERO)
    }

    #[inline]
    pub fn from_int(v: i64) -> Self {
        Self(F::wrapping_from_num(v))
    }

    /// Scale by `2^K` and truncate toward zero.
    #[inline]
    pub fn from_f64(v: f64) -> Self {
        Self::from_raw(F::Raw::from_f64_trunc(v * Self::scale()))
    }

    #[inline]
    pub fn from_f32(v: f32) -> Self {
        Self::from_f64(v as f64)
    }

    /// Re-scale a raw value carrying `frac` fractional bits into this type.
    ///
    /// Fewer target bits: arithmetic right shift, low bits discarded. More
    /// target bits: narrow into the store first, then shift left.
    pub fn from_scaled(raw: i128, frac: u32) -> Self {
        let k = Self::FRAC_BITS;
        let shifted = if frac > k { raw >> (frac - k) } else { raw };
        let narrowed = F::Raw::wrap(shifted).widen();
        let widened = if k > frac {
            narrowed << (k - frac)
        } else {
            narrowed
        };
        Self::from_raw(F::Raw::wrap(widened))
    }

    /// Convert into another layout. Extra fractional bits are floored and
    /// the integer part wraps.
    #[inline]
    pub fn convert<G: Backing>(self) -> FixedPoint<G> {
        FixedPoint(G::wrapping_from_num(self.0))
    }

    #[inline]
    pub fn to_f64(self) -> f64 {
        self.0.to_num()
    }

    #[inline]
    pub fn to_f32(self) -> f32 {
        self.0.to_num()
    }

    /// Integer part, rounded toward negative infinity.
    #[inline]
    pub fn to_int(self) -> i64 {
        self.0.wrapping_to_num()
    }

    #[inline]
    pub fn abs(self) -> Self {
        Self(self.0.wrapping_abs())
    }

    #[inline]
    fn scale() -> f64 {
        (1u128 << Self::FRAC_BITS) as f64
    }
}

// ---------------------------------------------------------------------------
// Arithmetic
// ---------------------------------------------------------------------------

impl<F: Backing> Add for FixedPoint<F> {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Self) -> Self {
        Self(self.0.wrapping_add(rhs.0))
    }
}

impl<F: Backing> Sub for FixedPoint<F> {
    type Output = Self;

    #[inline]
    fn sub(self, rhs: Self) -> Self {
        Self(self.0.wrapping_sub(rhs.0))
    }
}

impl<F: Backing> Mul for FixedPoint<F> {
    type Output = Self;

    #[inline]
    fn mul(self, rhs: Self) -> Self {
        Self(self.0.wrapping_mul(rhs.0))
    }
}

impl<F: Backing> Div for FixedPoint<F> {
    type Output = Self;

    #[inline]
    fn div(self, rhs: Self) -> Self {
        assert!(rhs.0 != F::ZERO, "fixed-point division by zero");
        Self(self.0.wrapping_div(rhs.0))
    }
}

impl<F: Backing> Neg for FixedPoint<F> {
    type Output = Self;

    #[inline]
    fn neg(self) -> Self {
        Self(self.0.wrapping_neg())
    }
}

macro_rules! impl_assign {
    ($($trait:ident :: $method:ident => $op:tt),*) => {$(
        impl<F: Backing> $trait for FixedPoint<F> {
            #[inline]
            fn $method(&mut self, rhs: Self) {
                *self = *self $op rhs;
            }
        }
    )*};
}

impl_assign!(
    AddAssign::add_assign => +,
    SubAssign::sub_assign => -,
    MulAssign::mul_assign => *,
    DivAssign::div_assign => /
);

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

impl<F: Backing> fmt::Display for FixedPoint<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl<F: Backing> fmt::Debug for FixedPoint<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FixedPoint")
            .field("value", &self.0)
            .field("raw", &self.raw())
            .field("frac_bits", &Self::FRAC_BITS)
            .finish()
    }
}
