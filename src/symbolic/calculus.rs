//! Symbolic differentiation and a rule-based integrator.

use super::expr::{Constant, Expr, Func};
use super::poly::{as_polynomial, expand, linear_coeffs};

/// Nested substitutions and integrations by parts give up past this depth.
const MAX_INTEGRATION_DEPTH: usize = 8;

/// Derivative of `e` with respect to `var`.
pub fn diff(e: &Expr, var: &str) -> Expr {
    match e {
        Expr::Num(_) | Expr::Const(_) => Expr::zero(),
        Expr::Sym(s) => {
            if s == var {
                Expr::one()
            } else {
                Expr::zero()
            }
        }
        Expr::Add(terms) => Expr::add(terms.iter().map(|t| diff(t, var)).collect()),
        Expr::Mul(factors) => {
            let mut terms = Vec::with_capacity(factors.len());
            for (i, factor) in factors.iter().enumerate() {
                let d = diff(factor, var);
                if d.is_zero() {
                    continue;
                }
                let mut product: Vec<Expr> = factors
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, f)| f.clone())
                    .collect();
                product.push(d);
                terms.push(Expr::mul(product));
            }
            Expr::add(terms)
        }
        Expr::Pow(base, exp) => diff_pow(base, exp, var),
        Expr::Func(f, arg) => {
            let inner = diff(arg, var);
            if inner.is_zero() {
                return Expr::zero();
            }
            Expr::mul(vec![outer_derivative(*f, arg), inner])
        }
    }
}

fn diff_pow(base: &Expr, exp: &Expr, var: &str) -> Expr {
    let base_has = base.contains_symbol(var);
    let exp_has = exp.contains_symbol(var);
    let here = Expr::pow(base.clone(), exp.clone());

    match (base_has, exp_has) {
        (false, false) => Expr::zero(),
        // d/dx u^n = n u^(n-1) u'
        (true, false) => Expr::mul(vec![
            exp.clone(),
            Expr::pow(base.clone(), Expr::add(vec![exp.clone(), Expr::int(-1)])),
            diff(base, var),
        ]),
        // d/dx a^v = a^v ln(a) v'
        (false, true) => Expr::mul(vec![
            here,
            Expr::func(Func::Log, base.clone()),
            diff(exp, var),
        ]),
        // d/dx u^v = u^v (v' ln u + v u'/u)
        (true, true) => Expr::mul(vec![
            here,
            Expr::add(vec![
                Expr::mul(vec![diff(exp, var), Expr::func(Func::Log, base.clone())]),
                Expr::mul(vec![exp.clone(), diff(base, var), Expr::pow(base.clone(), Expr::int(-1))]),
            ]),
        ]),
    }
}

/// `f'(u)` for the chain rule.
fn outer_derivative(f: Func, u: &Expr) -> Expr {
    let u = u.clone();
    let one_minus_u2 = || Expr::add(vec![Expr::one(), Expr::pow(u.clone(), Expr::int(2)).neg()]);
    match f {
        Func::Sin => Expr::func(Func::Cos, u),
        Func::Cos => Expr::func(Func::Sin, u).neg(),
        Func::Tan => Expr::add(vec![Expr::pow(Expr::func(Func::Tan, u), Expr::int(2)), Expr::one()]),
        Func::Asin => Expr::pow(one_minus_u2(), Expr::ratio(-1, 2)),
        Func::Acos => Expr::pow(one_minus_u2(), Expr::ratio(-1, 2)).neg(),
        Func::Atan => Expr::pow(
            Expr::add(vec![Expr::pow(u, Expr::int(2)), Expr::one()]),
            Expr::int(-1),
        ),
        Func::Sinh => Expr::func(Func::Cosh, u),
        Func::Cosh => Expr::func(Func::Sinh, u),
        Func::Tanh => Expr::add(vec![
            Expr::one(),
            Expr::pow(Expr::func(Func::Tanh, u), Expr::int(2)).neg(),
        ]),
        Func::Exp => Expr::func(Func::Exp, u),
        Func::Log => Expr::pow(u, Expr::int(-1)),
        Func::Abs => Expr::func(Func::Sign, u),
        Func::Sign => Expr::zero(),
    }
}

/// Antiderivative of `e` with respect to `var`, without the constant.
///
/// `None` when no rule applies.
pub fn integrate(e: &Expr, var: &str) -> Option<Expr> {
    integrate_at(e, var, 0)
}

fn integrate_at(e: &Expr, var: &str, depth: usize) -> Option<Expr> {
    if depth > MAX_INTEGRATION_DEPTH {
        return None;
    }
    let x = Expr::sym(var);

    if !e.contains_symbol(var) {
        return Some(Expr::mul(vec![e.clone(), x]));
    }

    match e {
        Expr::Sym(_) => Some(Expr::mul(vec![Expr::ratio(1, 2), Expr::pow(x, Expr::int(2))])),
        Expr::Add(terms) => {
            let parts = terms
                .iter()
                .map(|t| integrate_at(t, var, depth))
                .collect::<Option<Vec<_>>>()?;
            Some(Expr::add(parts))
        }
        Expr::Mul(factors) => integrate_product(e, factors, var, depth),
        Expr::Pow(base, exp) => integrate_power(e, base, exp, var, depth),
        Expr::Func(f, arg) => integrate_function(*f, arg, var)
            .or_else(|| substitute_and_integrate(e, var, depth)),
        Expr::Num(_) | Expr::Const(_) => None,
    }
}

fn integrate_product(e: &Expr, factors: &[Expr], var: &str, depth: usize) -> Option<Expr> {
    let (constant, dependent): (Vec<Expr>, Vec<Expr>) =
        factors.iter().cloned().partition(|f| !f.contains_symbol(var));
    if !constant.is_empty() {
        let inner = integrate_at(&Expr::mul(dependent), var, depth)?;
        return Some(Expr::mul(vec![Expr::mul(constant), inner]));
    }

    let expanded = expand(e);
    if matches!(expanded, Expr::Add(_)) && expanded != *e {
        return integrate_at(&expanded, var, depth);
    }

    integrate_by_parts(factors, var, depth).or_else(|| substitute_and_integrate(e, var, depth))
}

/// `∫ p·g = p·G - ∫ p'·G` for polynomial `p`, or `∫ p·log(u) = P·log(u) - ∫ P·u'/u`.
fn integrate_by_parts(factors: &[Expr], var: &str, depth: usize) -> Option<Expr> {
    for (i, g) in factors.iter().enumerate() {
        let rest: Vec<Expr> = factors
            .iter()
            .enumerate()
            .filter(|(j, _)| *j != i)
            .map(|(_, f)| f.clone())
            .collect();
        let p = Expr::mul(rest);
        let Some(coeffs) = as_polynomial(&p, var) else {
            continue;
        };
        if coeffs.len() < 2 {
            continue;
        }

        if is_cyclic_integrand(g, var) {
            let big_g = integrate_at(g, var, depth + 1)?;
            let remainder = integrate_at(
                &Expr::mul(vec![diff(&p, var), big_g.clone()]),
                var,
                depth + 1,
            )?;
            return Some(Expr::add(vec![Expr::mul(vec![p, big_g]), remainder.neg()]));
        }

        if let Expr::Func(Func::Log, u) = g {
            let big_p = integrate_at(&p, var, depth + 1)?;
            let remainder = integrate_at(
                &expand(&Expr::mul(vec![
                    big_p.clone(),
                    diff(u, var),
                    Expr::pow((**u).clone(), Expr::int(-1)),
                ])),
                var,
                depth + 1,
            )?;
            return Some(Expr::add(vec![
                Expr::mul(vec![big_p, g.clone()]),
                remainder.neg(),
            ]));
        }
    }
    None
}

/// Factors whose repeated antiderivatives stay the same shape.
fn is_cyclic_integrand(g: &Expr, var: &str) -> bool {
    let linear_in_var = |u: &Expr| {
        linear_coeffs(u, var).is_some_and(|(a, _)| !a.is_zero())
    };
    match g {
        Expr::Func(Func::Exp | Func::Sin | Func::Cos | Func::Sinh | Func::Cosh, arg) => {
            linear_in_var(arg)
        }
        Expr::Pow(base, exp) => !base.contains_symbol(var) && linear_in_var(exp),
        _ => false,
    }
}

fn integrate_power(e: &Expr, base: &Expr, exp: &Expr, var: &str, depth: usize) -> Option<Expr> {
    if !exp.contains_symbol(var) {
        if let Some((a, _)) = linear_coeffs(base, var).filter(|(a, _)| !a.is_zero()) {
            if exp.as_number().is_some_and(|n| n.as_integer() == Some(-1)) {
                // ∫ 1/(a x + b) = log(a x + b) / a
                return Some(Expr::func(Func::Log, base.clone()).div(a));
            }
            let raised = Expr::add(vec![exp.clone(), Expr::one()]);
            return Some(
                Expr::pow(base.clone(), raised.clone()).div(Expr::mul(vec![a, raised])),
            );
        }

        if let Some(result) = integrate_reciprocal_quadratic(base, exp, var) {
            return Some(result);
        }

        let expanded = expand(e);
        if expanded != *e {
            return integrate_at(&expanded, var, depth);
        }
    } else if !base.contains_symbol(var) {
        // ∫ c^(a x + b) = c^(a x + b) / (a log c)
        if let Some((a, _)) = linear_coeffs(exp, var).filter(|(a, _)| !a.is_zero()) {
            let log_base = match base {
                Expr::Const(Constant::E) => Expr::one(),
                other => Expr::func(Func::Log, other.clone()),
            };
            return Some(e.clone().div(Expr::mul(vec![a, log_base])));
        }
    }

    substitute_and_integrate(e, var, depth)
}

/// `∫ 1/(a x² + c) = atan(x·sqrt(a/c)) / sqrt(a·c)` for positive numbers `a`, `c`.
fn integrate_reciprocal_quadratic(base: &Expr, exp: &Expr, var: &str) -> Option<Expr> {
    if exp.as_number()?.as_integer()? != -1 {
        return None;
    }
    let coeffs = as_polynomial(base, var)?;
    if coeffs.len() != 3 || !coeffs[1].is_zero() {
        return None;
    }
    let c = coeffs[0].as_number()?;
    let a = coeffs[2].as_number()?;
    if a.is_negative() || c.is_negative() || a.is_zero() || c.is_zero() {
        return None;
    }

    let (a, c) = (Expr::Num(a), Expr::Num(c));
    let scale = a.clone().div(c.clone()).sqrt();
    Some(
        Expr::func(Func::Atan, Expr::mul(vec![Expr::sym(var), scale]))
            .div(Expr::mul(vec![a, c]).sqrt()),
    )
}

fn integrate_function(f: Func, arg: &Expr, var: &str) -> Option<Expr> {
    let (a, _) = linear_coeffs(arg, var).filter(|(a, _)| !a.is_zero())?;
    let u = arg.clone();
    let sqrt_one_minus_u2 = || {
        Expr::add(vec![Expr::one(), Expr::pow(u.clone(), Expr::int(2)).neg()]).sqrt()
    };

    let antiderivative = match f {
        Func::Sin => Expr::func(Func::Cos, u).neg(),
        Func::Cos => Expr::func(Func::Sin, u),
        Func::Tan => Expr::func(Func::Log, Expr::func(Func::Cos, u)).neg(),
        Func::Exp => Expr::func(Func::Exp, u),
        Func::Sinh => Expr::func(Func::Cosh, u),
        Func::Cosh => Expr::func(Func::Sinh, u),
        Func::Tanh => Expr::func(Func::Log, Expr::func(Func::Cosh, u)),
        Func::Log => Expr::add(vec![
            Expr::mul(vec![u.clone(), Expr::func(Func::Log, u.clone())]),
            u.neg(),
        ]),
        Func::Asin => Expr::add(vec![
            Expr::mul(vec![u.clone(), Expr::func(Func::Asin, u.clone())]),
            sqrt_one_minus_u2(),
        ]),
        Func::Acos => Expr::add(vec![
            Expr::mul(vec![u.clone(), Expr::func(Func::Acos, u.clone())]),
            sqrt_one_minus_u2().neg(),
        ]),
        Func::Atan => Expr::add(vec![
            Expr::mul(vec![u.clone(), Expr::func(Func::Atan, u.clone())]),
            Expr::mul(vec![
                Expr::ratio(-1, 2),
                Expr::func(
                    Func::Log,
                    Expr::add(vec![Expr::pow(u, Expr::int(2)), Expr::one()]),
                ),
            ]),
        ]),
        Func::Abs | Func::Sign => return None,
    };
    Some(antiderivative.div(a))
}

/// Try `∫ f(g(x)) g'(x) dx = ∫ f(u) du` for each sub-expression `g` of `e`.
fn substitute_and_integrate(e: &Expr, var: &str, depth: usize) -> Option<Expr> {
    let fresh = format!("_u{}", depth);
    let x = Expr::sym(var);

    for candidate in substitution_candidates(e) {
        if candidate == x || !candidate.contains_symbol(var) {
            continue;
        }
        let du = diff(&candidate, var);
        if du.is_zero() {
            continue;
        }

        let quotient = expand(&e.clone().div(du));
        let in_u = replace(&quotient, &candidate, &Expr::sym(fresh.as_str()));
        if in_u.contains_symbol(var) {
            continue;
        }
        if let Some(result) = integrate_at(&in_u, &fresh, depth + 1) {
            return Some(result.substitute(&fresh, &candidate));
        }
    }
    None
}

fn substitution_candidates(e: &Expr) -> Vec<Expr> {
    let mut out = Vec::new();
    let factors: Vec<&Expr> = match e {
        Expr::Mul(items) => items.iter().collect(),
        other => vec![other],
    };
    for factor in factors {
        match factor {
            Expr::Func(_, arg) => {
                out.push((**arg).clone());
                out.push(factor.clone());
            }
            Expr::Pow(base, _) => {
                out.push((**base).clone());
                if let Expr::Func(_, arg) = &**base {
                    out.push((**arg).clone());
                }
            }
            _ => {}
        }
    }
    out.dedup();
    out
}

/// Structurally replace `target` with `with` everywhere in `e`.
fn replace(e: &Expr, target: &Expr, with: &Expr) -> Expr {
    if e == target {
        return with.clone();
    }
    match e {
        Expr::Add(items) => Expr::add(items.iter().map(|i| replace(i, target, with)).collect()),
        Expr::Mul(items) => Expr::mul(items.iter().map(|i| replace(i, target, with)).collect()),
        Expr::Pow(b, x) => {
            // x^4 is (x^2)^2 when replacing x^2.
            if let (Expr::Pow(tb, _), Some(n), Some(m)) = (
                target,
                x.as_number().and_then(|n| n.as_integer()),
                target_integer_exponent(target),
            ) {
                if tb == b && m != 0 && n % m == 0 {
                    return Expr::pow(with.clone(), Expr::int(n / m));
                }
            }
            Expr::pow(replace(b, target, with), replace(x, target, with))
        }
        Expr::Func(f, arg) => Expr::func(*f, replace(arg, target, with)),
        _ => e.clone(),
    }
}

fn target_integer_exponent(target: &Expr) -> Option<i64> {
    match target {
        Expr::Pow(_, exp) => exp.as_number()?.as_integer(),
        _ => None,
    }
}
