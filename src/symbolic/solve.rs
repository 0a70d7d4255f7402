//! Equation solving.
//!
//! Polynomials (after clearing denominators) are solved exactly up to degree
//! two, with rational roots peeled off first and a numeric fallback for the
//! irreducible remainder. Other equations are inverted through a single
//! occurrence of the unknown where possible, and otherwise scanned
//! numerically on a fixed interval.

use std::ops::{Add, Div, Mul, Sub};

use super::calculus::diff;
use super::expr::{Constant, Expr, Func};
use super::number::{extract_square, Number, Rational};
use super::poly::{as_polynomial, expand};
use super::MathError;

/// Rational root candidates are only enumerated for coefficients up to this size.
const MAX_RATIONAL_ROOT_COEFF: i128 = 1_000_000_000;

const SCAN_MIN: f64 = -100.0;
const SCAN_MAX: f64 = 100.0;
const SCAN_STEPS: usize = 4000;

const MAX_INVERSION_DEPTH: usize = 6;

/// Solve `e = 0` for `var`. Roots are unique, real ones sorted ascending.
pub fn solve(e: &Expr, var: &str) -> Result<Vec<Expr>, MathError> {
    let roots = solve_at(e, var, 0)?;

    let is_float = |e: &Expr| e.as_number().is_some_and(|n| n.is_float());
    let mut unique: Vec<Expr> = Vec::new();
    for root in roots {
        if e.substitute(var, &root).is_undefined() {
            continue;
        }
        let duplicate = unique.iter().any(|seen| {
            if *seen == root {
                return true;
            }
            // Numeric roots from different paths may differ in the last bits.
            (is_float(seen) || is_float(&root))
                && matches!((seen.evaluate(), root.evaluate()), (Some(a), Some(b)) if (a - b).abs() < 1e-9)
        });
        if !duplicate {
            unique.push(root);
        }
    }

    // Stable: real roots ascending, then everything else in discovery order.
    unique.sort_by(|a, b| match (a.evaluate(), b.evaluate()) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => std::cmp::Ordering::Equal,
    });
    Ok(unique)
}

fn solve_at(e: &Expr, var: &str, depth: usize) -> Result<Vec<Expr>, MathError> {
    if !e.contains_symbol(var) {
        return Ok(Vec::new());
    }

    if let Some(coeffs) = as_polynomial(e, var) {
        return solve_polynomial(coeffs);
    }
    if let Some(cleared) = clear_denominators(e, var) {
        if let Some(coeffs) = as_polynomial(&cleared, var) {
            return solve_polynomial(coeffs);
        }
    }

    if depth < MAX_INVERSION_DEPTH {
        if let Some(roots) = solve_by_inversion(e, var, depth)? {
            return Ok(roots);
        }
    }

    let others: Vec<String> = e.free_symbols().into_iter().filter(|s| s != var).collect();
    if !others.is_empty() {
        return Err(MathError::Unsupported(format!(
            "cannot solve for {} with free symbols {}",
            var,
            others.join(", ")
        )));
    }
    Ok(scan_real_roots(e, var))
}

/// Multiply through by every denominator containing `var`.
fn clear_denominators(e: &Expr, var: &str) -> Option<Expr> {
    let expanded = expand(e);
    let terms = match &expanded {
        Expr::Add(items) => items.clone(),
        other => vec![other.clone()],
    };

    let mut denominators: Vec<(Expr, i64)> = Vec::new();
    for term in &terms {
        let factors = match term {
            Expr::Mul(items) => items.clone(),
            other => vec![other.clone()],
        };
        for factor in factors {
            let Expr::Pow(base, exp) = factor else {
                continue;
            };
            let Some(k) = exp.as_number().and_then(|n| n.as_integer()) else {
                continue;
            };
            if k >= 0 || !base.contains_symbol(var) {
                continue;
            }
            match denominators.iter_mut().find(|(b, _)| *b == *base) {
                Some(entry) => entry.1 = entry.1.max(-k),
                None => denominators.push((*base, -k)),
            }
        }
    }
    if denominators.is_empty() {
        return None;
    }

    let multiplier = Expr::mul(
        denominators
            .into_iter()
            .map(|(b, k)| Expr::pow(b, Expr::int(k)))
            .collect(),
    );
    let cleared = Expr::add(
        terms
            .into_iter()
            .map(|t| Expr::mul(vec![t, multiplier.clone()]))
            .collect(),
    );
    Some(expand(&cleared))
}

// ── Polynomials ────────────────────────────────────────────────────────

fn solve_polynomial(mut coeffs: Vec<Expr>) -> Result<Vec<Expr>, MathError> {
    let mut roots = Vec::new();

    while coeffs.len() > 1 && coeffs[0].is_zero() {
        roots.push(Expr::zero());
        coeffs.remove(0);
    }

    let rationals: Option<Vec<Rational>> = coeffs
        .iter()
        .map(|c| c.as_number().and_then(|n| n.as_rational()))
        .collect();
    if let Some(mut exact) = rationals {
        for r in peel_rational_roots(&mut exact) {
            roots.push(Expr::Num(Number::Rational(r)));
        }
        coeffs = exact.into_iter().map(|r| Expr::Num(Number::Rational(r))).collect();
    }

    match coeffs.len() {
        0 | 1 => {}
        2 => roots.push(coeffs[0].clone().neg().div(coeffs[1].clone())),
        3 => roots.extend(quadratic_roots(&coeffs[2], &coeffs[1], &coeffs[0])),
        _ => {
            let numeric: Option<Vec<f64>> = coeffs
                .iter()
                .map(|c| c.as_number().map(|n| n.to_f64()))
                .collect();
            let Some(numeric) = numeric else {
                return Err(MathError::Unsupported(format!(
                    "no closed form for a degree {} polynomial with symbolic coefficients",
                    coeffs.len() - 1
                )));
            };
            roots.extend(numeric_polynomial_roots(&numeric));
        }
    }
    Ok(roots)
}

fn quadratic_roots(a: &Expr, b: &Expr, c: &Expr) -> Vec<Expr> {
    let discriminant = expand(&Expr::add(vec![
        Expr::pow(b.clone(), Expr::int(2)),
        Expr::mul(vec![Expr::int(-4), a.clone(), c.clone()]),
    ]));
    let root = sqrt_outside_squares(discriminant);
    let two_a = Expr::mul(vec![Expr::int(2), a.clone()]);
    let minus_b = b.clone().neg();

    [root.clone().neg(), root]
        .into_iter()
        .map(|r| expand(&Expr::add(vec![minus_b.clone(), r]).div(two_a.clone())))
        .collect()
}

/// `sqrt(d)` with the square part of a numeric coefficient moved outside,
/// so `sqrt(4*a)` becomes `2*sqrt(a)`.
fn sqrt_outside_squares(d: Expr) -> Expr {
    let (coeff, body) = d.split_coefficient();
    let Some(r) = coeff.as_rational() else {
        return d.sqrt();
    };
    let Some(num) = r.num().checked_abs() else {
        return d.sqrt();
    };
    if body.is_one() {
        return d.sqrt();
    }

    let (num_out, num_in) = extract_square(num);
    let (den_out, den_in) = extract_square(r.den());
    if num_out == 1 && den_out == 1 {
        return d.sqrt();
    }
    match (
        Number::ratio(num_out, den_out),
        Number::ratio(r.num().signum() * num_in, den_in),
    ) {
        (Some(outside), Some(inside)) => Expr::mul(vec![
            Expr::Num(outside),
            Expr::mul(vec![Expr::Num(inside), body]).sqrt(),
        ]),
        _ => d.sqrt(),
    }
}

/// Remove every rational root from `coeffs` (lowest degree first) by
/// synthetic division and return them, with multiplicity.
fn peel_rational_roots(coeffs: &mut Vec<Rational>) -> Vec<Rational> {
    let mut found = Vec::new();
    let Some(scaled) = integer_coefficients(coeffs) else {
        return found;
    };
    let (Some(&a0), Some(&an)) = (scaled.first(), scaled.last()) else {
        return found;
    };
    if a0 == 0 || a0.abs() > MAX_RATIONAL_ROOT_COEFF || an.abs() > MAX_RATIONAL_ROOT_COEFF {
        return found;
    }

    for p in divisors(a0.unsigned_abs()) {
        for q in divisors(an.unsigned_abs()) {
            for sign in [1i128, -1] {
                let Some(candidate) = Rational::from_i128(sign * p as i128, q as i128) else {
                    continue;
                };
                while coeffs.len() > 1 && evaluate_exact(coeffs, candidate) == Some(Rational::ZERO) {
                    match synthetic_division(coeffs, candidate) {
                        Some(quotient) => *coeffs = quotient,
                        None => break,
                    }
                    found.push(candidate);
                }
            }
        }
    }
    found
}

fn integer_coefficients(coeffs: &[Rational]) -> Option<Vec<i128>> {
    let mut lcm: i128 = 1;
    for c in coeffs {
        let den = c.den() as i128;
        lcm = lcm.checked_mul(den / super::number::gcd_i128(lcm, den))?;
    }
    coeffs
        .iter()
        .map(|c| (c.num() as i128).checked_mul(lcm / c.den() as i128))
        .collect()
}

fn divisors(n: u128) -> Vec<u128> {
    let mut small = Vec::new();
    let mut large = Vec::new();
    let mut d = 1u128;
    while d * d <= n {
        if n % d == 0 {
            small.push(d);
            if d != n / d {
                large.push(n / d);
            }
        }
        d += 1;
    }
    small.extend(large.into_iter().rev());
    small
}

fn evaluate_exact(coeffs: &[Rational], x: Rational) -> Option<Rational> {
    coeffs
        .iter()
        .rev()
        .try_fold(Rational::ZERO, |acc, c| acc.checked_mul(x)?.checked_add(*c))
}

fn synthetic_division(coeffs: &[Rational], root: Rational) -> Option<Vec<Rational>> {
    let n = coeffs.len() - 1;
    let mut quotient = vec![Rational::ZERO; n];
    let mut carry = Rational::ZERO;
    for k in (1..=n).rev() {
        carry = coeffs[k].checked_add(carry.checked_mul(root)?)?;
        quotient[k - 1] = carry;
    }
    Some(quotient)
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Complex {
    re: f64,
    im: f64,
}

impl Complex {
    fn new(re: f64, im: f64) -> Self {
        Self { re, im }
    }

    fn norm(self) -> f64 {
        self.re.hypot(self.im)
    }
}

impl Add for Complex {
    type Output = Complex;
    fn add(self, o: Complex) -> Complex {
        Complex::new(self.re + o.re, self.im + o.im)
    }
}

impl Sub for Complex {
    type Output = Complex;
    fn sub(self, o: Complex) -> Complex {
        Complex::new(self.re - o.re, self.im - o.im)
    }
}

impl Mul for Complex {
    type Output = Complex;
    fn mul(self, o: Complex) -> Complex {
        Complex::new(self.re * o.re - self.im * o.im, self.re * o.im + self.im * o.re)
    }
}

impl Div for Complex {
    type Output = Complex;
    fn div(self, o: Complex) -> Complex {
        let d = o.re * o.re + o.im * o.im;
        Complex::new(
            (self.re * o.re + self.im * o.im) / d,
            (self.im * o.re - self.re * o.im) / d,
        )
    }
}

/// All roots of a numeric polynomial via Durand-Kerner iteration.
fn numeric_polynomial_roots(coeffs: &[f64]) -> Vec<Expr> {
    let n = coeffs.len() - 1;
    let lead = coeffs[n];
    let monic: Vec<f64> = coeffs.iter().map(|c| c / lead).collect();
    let eval = |z: Complex| {
        monic
            .iter()
            .rev()
            .fold(Complex::new(0.0, 0.0), |acc, c| acc * z + Complex::new(*c, 0.0))
    };

    let seed = Complex::new(0.4, 0.9);
    let mut roots: Vec<Complex> = Vec::with_capacity(n);
    let mut z = Complex::new(1.0, 0.0);
    for _ in 0..n {
        roots.push(z);
        z = z * seed;
    }

    for _ in 0..1000 {
        let mut delta = 0.0f64;
        for i in 0..n {
            let mut denom = Complex::new(1.0, 0.0);
            for (j, other) in roots.iter().enumerate() {
                if i != j {
                    denom = denom * (roots[i] - *other);
                }
            }
            let step = eval(roots[i]) / denom;
            roots[i] = roots[i] - step;
            delta = delta.max(step.norm());
        }
        if delta < 1e-14 {
            break;
        }
    }

    roots
        .into_iter()
        .map(|r| {
            let scale = 1.0 + r.norm();
            let re = snap(r.re);
            if r.im.abs() < 1e-9 * scale {
                Expr::Num(Number::Float(re))
            } else {
                Expr::add(vec![
                    Expr::Num(Number::Float(re)),
                    Expr::mul(vec![Expr::Num(Number::Float(snap(r.im))), Expr::Const(Constant::I)]),
                ])
            }
        })
        .collect()
}

fn snap(x: f64) -> f64 {
    if (x - x.round()).abs() < 1e-10 {
        x.round() + 0.0
    } else {
        x
    }
}

// ── Inversion ──────────────────────────────────────────────────────────

/// Solve `lhs = rhs` by undoing the outermost operation around the single
/// term containing `var`. `Ok(None)` when the shape does not allow it.
fn solve_by_inversion(e: &Expr, var: &str, depth: usize) -> Result<Option<Vec<Expr>>, MathError> {
    let terms = match expand(e) {
        Expr::Add(items) => items,
        other => vec![other],
    };
    let (dependent, constant): (Vec<Expr>, Vec<Expr>) =
        terms.into_iter().partition(|t| t.contains_symbol(var));
    if dependent.len() != 1 {
        return Ok(None);
    }
    let rhs = Expr::add(constant).neg();

    let Some(branches) = invert(&dependent[0], rhs, var) else {
        return Ok(None);
    };

    let mut roots = Vec::new();
    for (inner, value) in branches {
        if inner == Expr::sym(var) {
            roots.push(value);
        } else {
            roots.extend(solve_at(&inner.sub(value), var, depth + 1)?);
        }
    }
    Ok(Some(roots))
}

/// Equations `inner = value` equivalent to `term = rhs`.
fn invert(term: &Expr, rhs: Expr, var: &str) -> Option<Vec<(Expr, Expr)>> {
    let real = rhs.evaluate();
    let pi = || Expr::Const(Constant::Pi);

    match term {
        Expr::Mul(factors) => {
            let (constant, dependent): (Vec<Expr>, Vec<Expr>) =
                factors.iter().cloned().partition(|f| !f.contains_symbol(var));
            if constant.is_empty() || dependent.is_empty() {
                return None;
            }
            Some(vec![(Expr::mul(dependent), rhs.div(Expr::mul(constant)))])
        }
        Expr::Func(f, inner) => {
            let inner = (**inner).clone();
            let branches = match f {
                Func::Exp => {
                    if real.is_some_and(|v| v <= 0.0) {
                        return Some(Vec::new());
                    }
                    vec![Expr::func(Func::Log, rhs)]
                }
                Func::Log => vec![Expr::func(Func::Exp, rhs)],
                Func::Sin | Func::Cos if real.is_some_and(|v| v.abs() > 1.0) => return Some(Vec::new()),
                Func::Sin => {
                    let principal = Expr::func(Func::Asin, rhs);
                    vec![principal.clone(), pi().sub(principal)]
                }
                Func::Cos => {
                    let principal = Expr::func(Func::Acos, rhs);
                    vec![
                        principal.clone(),
                        Expr::mul(vec![Expr::int(2), pi()]).sub(principal),
                    ]
                }
                Func::Tan => vec![Expr::func(Func::Atan, rhs)],
                _ => return None,
            };
            Some(branches.into_iter().map(|v| (inner.clone(), v)).collect())
        }
        Expr::Pow(base, exp) if !exp.contains_symbol(var) => {
            let n = exp.as_number()?.as_rational()?;
            let even_power = n.num() % 2 == 0;
            if (even_power || n.den() % 2 == 0) && real.is_some_and(|v| v < 0.0) {
                return Some(Vec::new());
            }
            let root = Expr::pow(rhs, Expr::Num(Number::ONE.checked_div(Number::Rational(n))?));
            let mut branches = vec![((**base).clone(), root.clone())];
            if even_power {
                branches.insert(0, ((**base).clone(), root.neg()));
            }
            Some(branches)
        }
        Expr::Pow(base, exp) if !base.contains_symbol(var) => {
            if real.is_some_and(|v| v <= 0.0) {
                return Some(Vec::new());
            }
            let value = match exact_log(base, &rhs) {
                Some(k) => Expr::int(k),
                None => Expr::func(Func::Log, rhs).div(Expr::func(Func::Log, (**base).clone())),
            };
            Some(vec![((**exp).clone(), value)])
        }
        _ => None,
    }
}

/// `k` with `base^k == value` for integer `base > 1` and small `|k|`.
fn exact_log(base: &Expr, value: &Expr) -> Option<i64> {
    let b = base.as_number()?;
    b.as_integer().filter(|b| *b > 1)?;
    let v = value.as_number()?;
    (-64..=64).find(|k| b.pow_int(*k) == Some(v))
}

// ── Numeric scan ───────────────────────────────────────────────────────

/// Real roots of `e` on a fixed interval by sign changes and bisection.
fn scan_real_roots(e: &Expr, var: &str) -> Vec<Expr> {
    let f = |x: f64| e.evaluate_at(var, x).filter(|v| v.is_finite());
    let slope = diff(e, var);
    let step = (SCAN_MAX - SCAN_MIN) / SCAN_STEPS as f64;

    let mut roots: Vec<f64> = Vec::new();
    let mut push = |x: f64| {
        if roots.last().map_or(true, |last| (x - last).abs() > step / 2.0) {
            roots.push(x);
        }
    };

    for i in 0..SCAN_STEPS {
        let lo = SCAN_MIN + step * i as f64;
        let hi = lo + step;
        let (Some(f_lo), Some(f_hi)) = (f(lo), f(hi)) else {
            continue;
        };
        if f_lo == 0.0 {
            push(lo);
            continue;
        }
        if f_lo.signum() == f_hi.signum() {
            continue;
        }

        let (mut a, mut b, mut fa) = (lo, hi, f_lo);
        for _ in 0..200 {
            let mid = 0.5 * (a + b);
            let Some(fm) = f(mid) else {
                break;
            };
            if fm == 0.0 {
                a = mid;
                b = mid;
                break;
            }
            if fm.signum() == fa.signum() {
                a = mid;
                fa = fm;
            } else {
                b = mid;
            }
        }
        let root = 0.5 * (a + b);

        // A sign change across a pole is not a root.
        let residual = f(root).map(f64::abs).unwrap_or(f64::INFINITY);
        let tolerance = 1e-6 * (1.0 + slope.evaluate_at(var, root).map_or(0.0, f64::abs));
        if residual <= tolerance {
            push(snap(root));
        }
    }

    roots
        .into_iter()
        .map(|r| Expr::Num(Number::Float(r)))
        .collect()
}
