//! Exact rationals with a floating-point escape hatch.
//!
//! Arithmetic stays exact while it fits in `i64`; anything that overflows or
//! touches a float degrades to `Number::Float`.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

/// Reduced fraction with a positive denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    num: i64,
    den: i64,
}

impl Rational {
    pub const ZERO: Rational = Rational { num: 0, den: 1 };
    pub const ONE: Rational = Rational { num: 1, den: 1 };

    pub fn new(num: i64, den: i64) -> Option<Self> {
        Self::from_i128(num as i128, den as i128)
    }

    pub fn integer(n: i64) -> Self {
        Self { num: n, den: 1 }
    }

    pub(crate) fn from_i128(num: i128, den: i128) -> Option<Self> {
        if den == 0 {
            return None;
        }
        let (mut num, mut den) = if den < 0 { (-num, -den) } else { (num, den) };
        let g = gcd_i128(num, den);
        if g > 1 {
            num /= g;
            den /= g;
        }
        Some(Self {
            num: i64::try_from(num).ok()?,
            den: i64::try_from(den).ok()?,
        })
    }

    pub fn num(&self) -> i64 {
        self.num
    }

    pub fn den(&self) -> i64 {
        self.den
    }

    pub fn is_integer(&self) -> bool {
        self.den == 1
    }

    pub fn to_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }

    pub fn checked_add(self, other: Self) -> Option<Self> {
        let num = self.num as i128 * other.den as i128 + other.num as i128 * self.den as i128;
        Self::from_i128(num, self.den as i128 * other.den as i128)
    }

    pub fn checked_mul(self, other: Self) -> Option<Self> {
        Self::from_i128(
            self.num as i128 * other.num as i128,
            self.den as i128 * other.den as i128,
        )
    }

    pub fn checked_div(self, other: Self) -> Option<Self> {
        Self::from_i128(
            self.num as i128 * other.den as i128,
            self.den as i128 * other.num as i128,
        )
    }

    pub fn checked_neg(self) -> Option<Self> {
        Self::from_i128(-(self.num as i128), self.den as i128)
    }

    pub fn checked_pow(self, exp: i64) -> Option<Self> {
        let base = if exp < 0 {
            Self::ONE.checked_div(self)?
        } else {
            self
        };
        let mut result = Self::ONE;
        let mut square = base;
        let mut remaining = exp.unsigned_abs();
        while remaining > 0 {
            if remaining & 1 == 1 {
                result = result.checked_mul(square)?;
            }
            remaining >>= 1;
            if remaining > 0 {
                square = square.checked_mul(square)?;
            }
        }
        Some(result)
    }
}

pub(crate) fn gcd_i128(a: i128, b: i128) -> i128 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Exact `k`-th root of a non-negative integer, if there is one.
pub(crate) fn exact_root(n: i64, k: u32) -> Option<i64> {
    if n < 0 || k == 0 {
        return None;
    }
    if n < 2 || k == 1 {
        return Some(n);
    }
    let guess = (n as f64).powf(1.0 / k as f64).round() as i64;
    (guess.saturating_sub(1)..=guess.saturating_add(1))
        .filter(|c| *c >= 0)
        .find(|c| (*c as i128).checked_pow(k) == Some(n as i128))
}

/// Split `n` into `(s, r)` with `n = s^2 * r` and `r` square-free.
pub(crate) fn extract_square(n: i64) -> (i64, i64) {
    if n <= 1 || n > 1_000_000_000_000 {
        return (1, n);
    }
    let mut outside = 1i64;
    let mut inside = n;
    let mut f = 2i64;
    while f * f <= inside {
        while inside % (f * f) == 0 {
            inside /= f * f;
            outside *= f;
        }
        f += 1;
    }
    (outside, inside)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Rational(Rational),
    Float(f64),
}

impl Number {
    pub const ZERO: Number = Number::Rational(Rational::ZERO);
    pub const ONE: Number = Number::Rational(Rational::ONE);

    pub fn int(n: i64) -> Self {
        Number::Rational(Rational::integer(n))
    }

    pub fn ratio(num: i64, den: i64) -> Option<Self> {
        Rational::new(num, den).map(Number::Rational)
    }

    pub fn to_f64(self) -> f64 {
        match self {
            Number::Rational(r) => r.to_f64(),
            Number::Float(f) => f,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Number::Rational(r) => r.num == 0,
            Number::Float(f) => *f == 0.0,
        }
    }

    pub fn is_one(&self) -> bool {
        matches!(self, Number::Rational(r) if r.num == 1 && r.den == 1)
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Number::Rational(r) => r.num < 0,
            Number::Float(f) => *f < 0.0,
        }
    }

    pub fn is_float(&self) -> bool {
        matches!(self, Number::Float(_))
    }

    pub fn as_rational(&self) -> Option<Rational> {
        match self {
            Number::Rational(r) => Some(*r),
            Number::Float(_) => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Number::Rational(r) if r.is_integer() => Some(r.num),
            _ => None,
        }
    }

    pub fn abs(self) -> Self {
        if self.is_negative() {
            -self
        } else {
            self
        }
    }

    /// `self / other`, or `None` when dividing by an exact zero.
    pub fn checked_div(self, other: Self) -> Option<Self> {
        match (self, other) {
            (_, Number::Rational(b)) if b.num == 0 => None,
            (Number::Rational(a), Number::Rational(b)) => Some(
                a.checked_div(b)
                    .map(Number::Rational)
                    .unwrap_or_else(|| Number::Float(a.to_f64() / b.to_f64())),
            ),
            (a, b) => Some(Number::Float(a.to_f64() / b.to_f64())),
        }
    }

    /// Integer power. `None` for `0` raised to a negative power.
    pub fn pow_int(self, exp: i64) -> Option<Self> {
        match self {
            Number::Rational(r) => {
                if r.num == 0 && exp < 0 {
                    return None;
                }
                Some(
                    r.checked_pow(exp)
                        .map(Number::Rational)
                        .unwrap_or_else(|| Number::Float(r.to_f64().powf(exp as f64))),
                )
            }
            Number::Float(f) => Some(Number::Float(f.powf(exp as f64))),
        }
    }

    pub(crate) fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Number::Rational(a), Number::Rational(b)) => {
                (a.num as i128 * b.den as i128).cmp(&(b.num as i128 * a.den as i128))
            }
            (a, b) => a.to_f64().total_cmp(&b.to_f64()),
        }
    }
}

impl Add for Number {
    type Output = Number;

    fn add(self, other: Number) -> Number {
        match (self, other) {
            (Number::Rational(a), Number::Rational(b)) => a
                .checked_add(b)
                .map(Number::Rational)
                .unwrap_or_else(|| Number::Float(a.to_f64() + b.to_f64())),
            (a, b) => Number::Float(a.to_f64() + b.to_f64()),
        }
    }
}

impl Sub for Number {
    type Output = Number;

    fn sub(self, other: Number) -> Number {
        self + (-other)
    }
}

impl Mul for Number {
    type Output = Number;

    fn mul(self, other: Number) -> Number {
        match (self, other) {
            (Number::Rational(a), Number::Rational(b)) => a
                .checked_mul(b)
                .map(Number::Rational)
                .unwrap_or_else(|| Number::Float(a.to_f64() * b.to_f64())),
            (a, b) => Number::Float(a.to_f64() * b.to_f64()),
        }
    }
}

impl Neg for Number {
    type Output = Number;

    fn neg(self) -> Number {
        match self {
            Number::Rational(r) => r
                .checked_neg()
                .map(Number::Rational)
                .unwrap_or_else(|| Number::Float(-r.to_f64())),
            Number::Float(f) => Number::Float(-f),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Rational(r) if r.den == 1 => write!(f, "{}", r.num),
            Number::Rational(r) => write!(f, "{}/{}", r.num, r.den),
            Number::Float(x) if x.is_finite() && x.fract() == 0.0 && x.abs() < 1e16 => {
                write!(f, "{:.1}", x)
            }
            Number::Float(x) => write!(f, "{}", x),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rationals_reduce_and_normalize_sign() {
        let r = Rational::new(6, -8).unwrap();
        assert_eq!((r.num(), r.den()), (-3, 4));
        assert!(Rational::new(1, 0).is_none());
    }

    #[test]
    fn overflow_degrades_to_float() {
        let big = Number::int(i64::MAX);
        match big + Number::int(1) {
            Number::Float(f) => assert!(f > 9.2e18),
            other => panic!("expected float, got {other:?}"),
        }
    }

    #[test]
    fn display_forms() {
        assert_eq!(Number::ratio(3, 2).unwrap().to_string(), "3/2");
        assert_eq!(Number::int(-4).to_string(), "-4");
        assert_eq!(Number::Float(2.0).to_string(), "2.0");
        assert_eq!(Number::Float(0.25).to_string(), "0.25");
    }

    #[test]
    fn zero_to_negative_power_is_undefined() {
        assert_eq!(Number::ZERO.pow_int(-1), None);
        assert_eq!(
            Number::ratio(2, 3).unwrap().pow_int(-2),
            Number::ratio(9, 4)
        );
    }

    #[test]
    fn roots_and_square_factors() {
        assert_eq!(exact_root(27, 3), Some(3));
        assert_eq!(exact_root(26, 3), None);
        assert_eq!(extract_square(12), (2, 3));
        assert_eq!(extract_square(49), (7, 1));
        assert_eq!(extract_square(7), (1, 7));
    }
}
