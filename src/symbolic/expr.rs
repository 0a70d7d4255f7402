//! Expression tree and canonicalizing constructors.
//!
//! Every `Expr` built through `Expr::add`, `Expr::mul`, `Expr::pow` and
//! `Expr::func` is kept in canonical form: sums and products are flat,
//! numeric parts are folded into a single leading coefficient, like terms and
//! equal bases are combined, and operands are sorted. Structural equality on
//! canonical trees is therefore a usable (if incomplete) notion of equality.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use super::number::{exact_root, extract_square, Number, Rational};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Constant {
    Pi,
    E,
    I,
}

impl Constant {
    pub fn name(&self) -> &'static str {
        match self {
            Constant::Pi => "pi",
            Constant::E => "E",
            Constant::I => "I",
        }
    }

    fn value(&self) -> Option<f64> {
        match self {
            Constant::Pi => Some(std::f64::consts::PI),
            Constant::E => Some(std::f64::consts::E),
            Constant::I => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Func {
    Sin,
    Cos,
    Tan,
    Asin,
    Acos,
    Atan,
    Sinh,
    Cosh,
    Tanh,
    Exp,
    Log,
    Abs,
    Sign,
}

impl Func {
    pub fn name(&self) -> &'static str {
        match self {
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Tan => "tan",
            Func::Asin => "asin",
            Func::Acos => "acos",
            Func::Atan => "atan",
            Func::Sinh => "sinh",
            Func::Cosh => "cosh",
            Func::Tanh => "tanh",
            Func::Exp => "exp",
            Func::Log => "log",
            Func::Abs => "Abs",
            Func::Sign => "sign",
        }
    }

    pub fn from_name(name: &str) -> Option<Func> {
        Some(match name {
            "sin" => Func::Sin,
            "cos" => Func::Cos,
            "tan" => Func::Tan,
            "asin" | "arcsin" => Func::Asin,
            "acos" | "arccos" => Func::Acos,
            "atan" | "arctan" => Func::Atan,
            "sinh" => Func::Sinh,
            "cosh" => Func::Cosh,
            "tanh" => Func::Tanh,
            "exp" => Func::Exp,
            "log" | "ln" => Func::Log,
            "Abs" | "abs" => Func::Abs,
            "sign" => Func::Sign,
            _ => return None,
        })
    }

    pub fn eval(&self, x: f64) -> f64 {
        match self {
            Func::Sin => x.sin(),
            Func::Cos => x.cos(),
            Func::Tan => x.tan(),
            Func::Asin => x.asin(),
            Func::Acos => x.acos(),
            Func::Atan => x.atan(),
            Func::Sinh => x.sinh(),
            Func::Cosh => x.cosh(),
            Func::Tanh => x.tanh(),
            Func::Exp => x.exp(),
            Func::Log => x.ln(),
            Func::Abs => x.abs(),
            Func::Sign => {
                if x == 0.0 {
                    0.0
                } else {
                    x.signum()
                }
            }
        }
    }

    /// `f(-x) = -f(x)`
    fn is_odd(&self) -> bool {
        matches!(
            self,
            Func::Sin | Func::Tan | Func::Asin | Func::Atan | Func::Sinh | Func::Tanh | Func::Sign
        )
    }

    /// `f(-x) = f(x)`
    fn is_even(&self) -> bool {
        matches!(self, Func::Cos | Func::Cosh | Func::Abs)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(Number),
    Sym(String),
    Const(Constant),
    Add(Vec<Expr>),
    Mul(Vec<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Func(Func, Box<Expr>),
}

/// Products that produce new products while combining are re-flattened at
/// most this many times.
const MAX_MUL_PASSES: usize = 4;

impl Expr {
    pub fn int(n: i64) -> Expr {
        Expr::Num(Number::int(n))
    }

    pub fn ratio(num: i64, den: i64) -> Expr {
        Number::ratio(num, den)
            .map(Expr::Num)
            .unwrap_or(Expr::Pow(Box::new(Expr::int(0)), Box::new(Expr::int(-1))))
    }

    pub fn zero() -> Expr {
        Expr::int(0)
    }

    pub fn one() -> Expr {
        Expr::int(1)
    }

    pub fn sym(name: impl Into<String>) -> Expr {
        Expr::Sym(name.into())
    }

    pub fn as_number(&self) -> Option<Number> {
        match self {
            Expr::Num(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Num(n) if n.is_zero())
    }

    pub fn is_one(&self) -> bool {
        matches!(self, Expr::Num(n) if n.is_one())
    }

    pub fn neg(self) -> Expr {
        Expr::mul(vec![Expr::int(-1), self])
    }

    pub fn sub(self, other: Expr) -> Expr {
        Expr::add(vec![self, other.neg()])
    }

    pub fn div(self, other: Expr) -> Expr {
        Expr::mul(vec![self, Expr::pow(other, Expr::int(-1))])
    }

    pub fn sqrt(self) -> Expr {
        Expr::pow(self, Expr::ratio(1, 2))
    }

    // ── Canonical constructors ─────────────────────────────────────────

    pub fn add(terms: Vec<Expr>) -> Expr {
        let mut constant = Number::ZERO;
        let mut collected: Vec<(Expr, Number)> = Vec::new();

        for term in flatten(terms, |e| matches!(e, Expr::Add(_))) {
            if let Expr::Num(n) = term {
                constant = constant + n;
                continue;
            }
            let (coeff, body) = term.split_coefficient();
            match collected.iter_mut().find(|(b, _)| *b == body) {
                Some(entry) => entry.1 = entry.1 + coeff,
                None => collected.push((body, coeff)),
            }
        }

        let mut out: Vec<Expr> = collected
            .into_iter()
            .filter(|(_, c)| !c.is_zero())
            .map(|(body, coeff)| Expr::with_coefficient(coeff, body))
            .collect();
        if !constant.is_zero() {
            out.push(Expr::Num(constant));
        }

        match out.len() {
            0 => Expr::zero(),
            1 => out.remove(0),
            _ => {
                out.sort_by(compare_terms);
                Expr::Add(out)
            }
        }
    }

    pub fn mul(factors: Vec<Expr>) -> Expr {
        Self::mul_pass(factors, 0)
    }

    fn mul_pass(factors: Vec<Expr>, pass: usize) -> Expr {
        let mut coeff = Number::ONE;
        let mut powers: Vec<(Expr, Expr)> = Vec::new();

        for factor in flatten(factors, |e| matches!(e, Expr::Mul(_))) {
            if let Expr::Num(n) = factor {
                coeff = coeff * n;
                continue;
            }
            let (base, exp) = factor.split_power();
            match powers.iter_mut().find(|(b, _)| *b == base) {
                Some(entry) => entry.1 = Expr::add(vec![entry.1.clone(), exp]),
                None => powers.push((base, exp)),
            }
        }

        if coeff.is_zero() && !powers.iter().any(|(b, e)| is_undefined_power(b, e)) {
            return Expr::zero();
        }

        let mut rest = Vec::with_capacity(powers.len());
        let mut reflatten = false;
        for (base, exp) in powers {
            match Expr::pow(base, exp) {
                Expr::Num(n) => coeff = coeff * n,
                combined @ Expr::Mul(_) => {
                    reflatten = true;
                    rest.push(combined);
                }
                other => rest.push(other),
            }
        }

        if reflatten && pass < MAX_MUL_PASSES {
            let mut all = Vec::with_capacity(rest.len() + 1);
            all.push(Expr::Num(coeff));
            all.extend(rest);
            return Self::mul_pass(all, pass + 1);
        }

        if coeff.is_zero() && !rest.iter().any(Expr::is_undefined) {
            return Expr::zero();
        }

        // A numeric coefficient times a single sum distributes over it.
        if rest.len() == 1 && !coeff.is_one() {
            if let Expr::Add(terms) = &rest[0] {
                return Expr::add(
                    terms
                        .iter()
                        .map(|t| Expr::mul(vec![Expr::Num(coeff), t.clone()]))
                        .collect(),
                );
            }
        }

        rest.sort_by(compare_factors);
        if rest.is_empty() {
            return Expr::Num(coeff);
        }
        if coeff.is_one() {
            if rest.len() == 1 {
                return rest.remove(0);
            }
            return Expr::Mul(rest);
        }
        rest.insert(0, Expr::Num(coeff));
        Expr::Mul(rest)
    }

    pub fn pow(base: Expr, exp: Expr) -> Expr {
        if exp.is_zero() {
            return Expr::one();
        }
        if exp.is_one() {
            return base;
        }
        if base.is_one() {
            return Expr::one();
        }

        match (&base, &exp) {
            (Expr::Num(b), Expr::Num(e)) => {
                if let Some(value) = pow_numbers(*b, *e) {
                    return value;
                }
            }
            (Expr::Const(Constant::E), _) => return Expr::func(Func::Exp, exp),
            (Expr::Const(Constant::I), Expr::Num(e)) => {
                if let Some(k) = e.as_integer() {
                    return match k.rem_euclid(4) {
                        0 => Expr::one(),
                        1 => Expr::Const(Constant::I),
                        2 => Expr::int(-1),
                        _ => Expr::Mul(vec![Expr::int(-1), Expr::Const(Constant::I)]),
                    };
                }
            }
            (Expr::Pow(inner_base, inner_exp), Expr::Num(e)) if e.as_integer().is_some() => {
                return Expr::pow(
                    (**inner_base).clone(),
                    Expr::mul(vec![(**inner_exp).clone(), exp.clone()]),
                );
            }
            (Expr::Mul(factors), Expr::Num(e)) if e.as_integer().is_some() => {
                return Expr::mul(
                    factors
                        .iter()
                        .map(|f| Expr::pow(f.clone(), exp.clone()))
                        .collect(),
                );
            }
            (Expr::Func(Func::Exp, arg), _) => {
                return Expr::func(Func::Exp, Expr::mul(vec![(**arg).clone(), exp.clone()]));
            }
            _ => {}
        }

        Expr::Pow(Box::new(base), Box::new(exp))
    }

    pub fn func(f: Func, arg: Expr) -> Expr {
        if let Expr::Num(Number::Float(x)) = arg {
            return Expr::Num(Number::Float(f.eval(x)));
        }

        if arg.is_zero() {
            match f {
                Func::Cos | Func::Cosh | Func::Exp => return Expr::one(),
                Func::Acos => return half_pi(),
                Func::Log | Func::Abs => {}
                _ => return Expr::zero(),
            }
        }

        match (f, &arg) {
            (Func::Log, a) if a.is_one() => return Expr::zero(),
            (Func::Log, Expr::Const(Constant::E)) => return Expr::one(),
            (Func::Log, Expr::Func(Func::Exp, inner)) => return (**inner).clone(),
            (Func::Exp, Expr::Func(Func::Log, inner)) => return (**inner).clone(),
            (Func::Sin, Expr::Const(Constant::Pi)) => return Expr::zero(),
            (Func::Cos, Expr::Const(Constant::Pi)) => return Expr::int(-1),
            (Func::Tan, Expr::Const(Constant::Pi)) => return Expr::zero(),
            (Func::Exp, a) if a.is_one() => return Expr::Const(Constant::E),
            (Func::Acos, a) if a.is_one() => return Expr::zero(),
            (Func::Asin, a) if a.is_one() => return half_pi(),
            (Func::Atan, a) if a.is_one() => {
                return Expr::Mul(vec![Expr::ratio(1, 4), Expr::Const(Constant::Pi)]);
            }
            (Func::Abs, Expr::Num(n)) => return Expr::Num(n.abs()),
            (Func::Sign, Expr::Num(n)) => {
                return Expr::int(if n.is_negative() { -1 } else { 1 });
            }
            _ => {}
        }

        if f.is_odd() || f.is_even() {
            let (coeff, _) = arg.split_coefficient();
            if coeff.is_negative() {
                let flipped = Expr::func(f, arg.clone().neg());
                return if f.is_odd() { flipped.neg() } else { flipped };
            }
        }

        Expr::Func(f, Box::new(arg))
    }

    // ── Decomposition helpers ──────────────────────────────────────────

    /// `(c, body)` such that `self == c * body`.
    pub fn split_coefficient(&self) -> (Number, Expr) {
        match self {
            Expr::Num(n) => (*n, Expr::one()),
            Expr::Mul(factors) => match factors.first() {
                Some(Expr::Num(n)) => {
                    let mut rest = factors[1..].to_vec();
                    let body = if rest.len() == 1 {
                        rest.remove(0)
                    } else {
                        Expr::Mul(rest)
                    };
                    (*n, body)
                }
                _ => (Number::ONE, self.clone()),
            },
            _ => (Number::ONE, self.clone()),
        }
    }

    /// `(base, exponent)` such that `self == base ** exponent`.
    pub fn split_power(&self) -> (Expr, Expr) {
        match self {
            Expr::Pow(base, exp) => ((**base).clone(), (**exp).clone()),
            _ => (self.clone(), Expr::one()),
        }
    }

    /// Rebuild `coeff * body` without re-running canonicalization.
    pub(crate) fn with_coefficient(coeff: Number, body: Expr) -> Expr {
        if coeff.is_one() {
            return body;
        }
        match body {
            Expr::Mul(mut factors) => {
                factors.insert(0, Expr::Num(coeff));
                Expr::Mul(factors)
            }
            other if other.is_one() => Expr::Num(coeff),
            other => Expr::Mul(vec![Expr::Num(coeff), other]),
        }
    }

    // ── Queries ────────────────────────────────────────────────────────

    pub fn contains_symbol(&self, name: &str) -> bool {
        match self {
            Expr::Sym(s) => s == name,
            Expr::Num(_) | Expr::Const(_) => false,
            Expr::Add(items) | Expr::Mul(items) => items.iter().any(|e| e.contains_symbol(name)),
            Expr::Pow(b, e) => b.contains_symbol(name) || e.contains_symbol(name),
            Expr::Func(_, arg) => arg.contains_symbol(name),
        }
    }

    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Sym(s) => {
                out.insert(s.clone());
            }
            Expr::Num(_) | Expr::Const(_) => {}
            Expr::Add(items) | Expr::Mul(items) => {
                items.iter().for_each(|e| e.collect_symbols(out));
            }
            Expr::Pow(b, e) => {
                b.collect_symbols(out);
                e.collect_symbols(out);
            }
            Expr::Func(_, arg) => arg.collect_symbols(out),
        }
    }

    pub fn has_symbols(&self) -> bool {
        !self.free_symbols().is_empty()
    }

    /// Whether the tree contains a division by an exact zero.
    pub fn is_undefined(&self) -> bool {
        match self {
            Expr::Pow(b, e) => is_undefined_power(b, e) || b.is_undefined() || e.is_undefined(),
            Expr::Add(items) | Expr::Mul(items) => items.iter().any(Expr::is_undefined),
            Expr::Func(_, arg) => arg.is_undefined(),
            _ => false,
        }
    }

    /// Replace every occurrence of symbol `name` with `value`.
    pub fn substitute(&self, name: &str, value: &Expr) -> Expr {
        match self {
            Expr::Sym(s) if s == name => value.clone(),
            Expr::Num(_) | Expr::Sym(_) | Expr::Const(_) => self.clone(),
            Expr::Add(items) => Expr::add(items.iter().map(|e| e.substitute(name, value)).collect()),
            Expr::Mul(items) => Expr::mul(items.iter().map(|e| e.substitute(name, value)).collect()),
            Expr::Pow(b, e) => Expr::pow(b.substitute(name, value), e.substitute(name, value)),
            Expr::Func(f, arg) => Expr::func(*f, arg.substitute(name, value)),
        }
    }

    /// Numeric value, if the expression has no free symbols and is real.
    pub fn evaluate(&self) -> Option<f64> {
        self.evaluate_with(&|_| None)
    }

    /// Numeric value with `name` bound to `x`.
    pub fn evaluate_at(&self, name: &str, x: f64) -> Option<f64> {
        self.evaluate_with(&|s| (s == name).then_some(x))
    }

    fn evaluate_with(&self, bind: &dyn Fn(&str) -> Option<f64>) -> Option<f64> {
        let value = match self {
            Expr::Num(n) => n.to_f64(),
            Expr::Sym(s) => bind(s)?,
            Expr::Const(c) => c.value()?,
            Expr::Add(items) => items
                .iter()
                .map(|e| e.evaluate_with(bind))
                .sum::<Option<f64>>()?,
            Expr::Mul(items) => items
                .iter()
                .map(|e| e.evaluate_with(bind))
                .product::<Option<f64>>()?,
            Expr::Pow(b, e) => b.evaluate_with(bind)?.powf(e.evaluate_with(bind)?),
            Expr::Func(f, arg) => f.eval(arg.evaluate_with(bind)?),
        };
        (!value.is_nan()).then_some(value)
    }

    /// Total degree in symbols, used for ordering terms.
    pub(crate) fn degree(&self) -> f64 {
        match self {
            Expr::Sym(_) => 1.0,
            Expr::Pow(b, e) => match (&**b, e.as_number()) {
                (Expr::Sym(_), Some(n)) => n.to_f64(),
                _ => 0.0,
            },
            Expr::Mul(items) => items.iter().map(Expr::degree).sum(),
            _ => 0.0,
        }
    }
}

fn half_pi() -> Expr {
    Expr::Mul(vec![Expr::ratio(1, 2), Expr::Const(Constant::Pi)])
}

fn is_undefined_power(base: &Expr, exp: &Expr) -> bool {
    base.is_zero() && exp.as_number().is_some_and(|n| n.is_negative())
}

fn flatten(items: Vec<Expr>, nested: impl Fn(&Expr) -> bool) -> Vec<Expr> {
    let mut out = Vec::with_capacity(items.len());
    for item in items {
        if nested(&item) {
            match item {
                Expr::Add(inner) | Expr::Mul(inner) => out.extend(inner),
                other => out.push(other),
            }
        } else {
            out.push(item);
        }
    }
    out
}

/// Evaluate `b ** e` for numeric operands when the result stays exact (or
/// either side is a float). `None` leaves the power unevaluated.
fn pow_numbers(base: Number, exp: Number) -> Option<Expr> {
    if let Some(k) = exp.as_integer() {
        return base.pow_int(k).map(Expr::Num);
    }
    if base.is_float() || exp.is_float() {
        let value = base.to_f64().powf(exp.to_f64());
        return (!value.is_nan()).then_some(Expr::Num(Number::Float(value)));
    }

    let b = base.as_rational()?;
    let e = exp.as_rational()?;
    if b.num() == 0 {
        return if e.num() > 0 { Some(Expr::zero()) } else { None };
    }
    if b.num() < 0 {
        if e.den() != 2 {
            return None;
        }
        // (-a)^(p/2) = I^p * a^(p/2)
        let positive = Number::Rational(b).abs();
        return Some(Expr::mul(vec![
            Expr::pow(Expr::Const(Constant::I), Expr::int(e.num())),
            Expr::pow(Expr::Num(positive), Expr::Num(exp)),
        ]));
    }

    let q = u32::try_from(e.den()).ok()?;
    if let (Some(rn), Some(rd)) = (exact_root(b.num(), q), exact_root(b.den(), q)) {
        let root = Rational::new(rn, rd)?;
        return Number::Rational(root).pow_int(e.num()).map(Expr::Num);
    }

    if q == 2 {
        // b^(p/2) = b^k * sqrt(b) with k = (p - 1) / 2, and
        // sqrt(n/d) = (s/d) * sqrt(r) where n*d = s^2 * r.
        let radicand = i64::try_from(b.num() as i128 * b.den() as i128).ok()?;
        let (outside, inside) = extract_square(radicand);
        if outside == 1 && b.den() == 1 && e.num() == 1 {
            return None;
        }
        let k = (e.num() - 1).div_euclid(2);
        let scale = Number::Rational(b).pow_int(k)? * Number::ratio(outside, b.den())?;
        let root = Expr::Pow(Box::new(Expr::int(inside)), Box::new(Expr::ratio(1, 2)));
        let root = if inside == 1 { Expr::one() } else { root };
        return Some(Expr::mul(vec![Expr::Num(scale), root]));
    }

    None
}

// ── Ordering ───────────────────────────────────────────────────────────

fn factor_class(e: &Expr) -> u8 {
    match e {
        Expr::Num(_) => 0,
        Expr::Pow(b, _) if matches!(**b, Expr::Num(_)) => 1,
        Expr::Const(_) => 2,
        Expr::Sym(_) => 3,
        Expr::Pow(b, _) if matches!(**b, Expr::Sym(_)) => 3,
        Expr::Func(..) => 4,
        _ => 5,
    }
}

fn sort_name(e: &Expr) -> String {
    match e {
        Expr::Pow(b, _) => b.to_string(),
        other => other.to_string(),
    }
}

fn compare_factors(a: &Expr, b: &Expr) -> Ordering {
    factor_class(a)
        .cmp(&factor_class(b))
        .then_with(|| sort_name(a).cmp(&sort_name(b)))
        .then_with(|| a.to_string().cmp(&b.to_string()))
}

fn compare_terms(a: &Expr, b: &Expr) -> Ordering {
    let is_num = |e: &Expr| matches!(e, Expr::Num(_));
    is_num(a)
        .cmp(&is_num(b))
        .then_with(|| {
            let (_, body_a) = a.split_coefficient();
            let (_, body_b) = b.split_coefficient();
            body_b
                .degree()
                .total_cmp(&body_a.degree())
                .then_with(|| body_a.to_string().cmp(&body_b.to_string()))
        })
}
