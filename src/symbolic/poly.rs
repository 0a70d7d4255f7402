//! Expansion and polynomial views of expressions.

use super::expr::Expr;

/// Largest integer power of a sum that `expand` multiplies out.
const MAX_EXPAND_POWER: i64 = 32;

/// Largest degree recognized by `as_polynomial`.
const MAX_DEGREE: i64 = 64;

/// Distribute products over sums and multiply out small integer powers.
pub fn expand(e: &Expr) -> Expr {
    match e {
        Expr::Add(terms) => Expr::add(terms.iter().map(expand).collect()),
        Expr::Mul(factors) => {
            let mut acc = vec![Expr::one()];
            for factor in factors {
                acc = distribute(&acc, &terms_of(expand(factor)));
            }
            Expr::add(acc)
        }
        Expr::Pow(base, exp) => {
            let base = expand(base);
            let exp = expand(exp);
            let n = exp.as_number().and_then(|n| n.as_integer());
            match (&base, n) {
                (Expr::Add(terms), Some(n)) if (2..=MAX_EXPAND_POWER).contains(&n) => {
                    let mut acc = terms.clone();
                    for _ in 1..n {
                        acc = terms_of(Expr::add(distribute(&acc, terms)));
                    }
                    Expr::add(acc)
                }
                _ => Expr::pow(base, exp),
            }
        }
        Expr::Func(f, arg) => Expr::func(*f, expand(arg)),
        _ => e.clone(),
    }
}

fn terms_of(e: Expr) -> Vec<Expr> {
    match e {
        Expr::Add(terms) => terms,
        other => vec![other],
    }
}

/// Pairwise products of two term lists.
fn distribute(left: &[Expr], right: &[Expr]) -> Vec<Expr> {
    let mut out = Vec::with_capacity(left.len() * right.len());
    for a in left {
        for b in right {
            out.push(Expr::mul(vec![a.clone(), b.clone()]));
        }
    }
    out
}

/// Coefficients of `e` as a polynomial in `var`, lowest degree first.
///
/// `None` when `e` is not a polynomial in `var` (negative or fractional
/// powers, `var` inside a function, ...). Coefficients never contain `var`.
pub fn as_polynomial(e: &Expr, var: &str) -> Option<Vec<Expr>> {
    let mut coeffs: Vec<Vec<Expr>> = Vec::new();
    for term in terms_of(expand(e)) {
        let (coeff, degree) = split_term(&term, var)?;
        if coeffs.len() <= degree {
            coeffs.resize_with(degree + 1, Vec::new);
        }
        coeffs[degree].push(coeff);
    }

    let mut out: Vec<Expr> = coeffs.into_iter().map(Expr::add).collect();
    while out.len() > 1 && out.last().is_some_and(Expr::is_zero) {
        out.pop();
    }
    if out.is_empty() {
        out.push(Expr::zero());
    }
    Some(out)
}

fn split_term(term: &Expr, var: &str) -> Option<(Expr, usize)> {
    if !term.contains_symbol(var) {
        return Some((term.clone(), 0));
    }
    match term {
        Expr::Mul(factors) => {
            let mut degree = 0;
            let mut rest = Vec::with_capacity(factors.len());
            for factor in factors {
                if factor.contains_symbol(var) {
                    degree += power_of_var(factor, var)?;
                } else {
                    rest.push(factor.clone());
                }
            }
            Some((Expr::mul(rest), degree))
        }
        other => Some((Expr::one(), power_of_var(other, var)?)),
    }
}

fn power_of_var(e: &Expr, var: &str) -> Option<usize> {
    match e {
        Expr::Sym(s) if s == var => Some(1),
        Expr::Pow(base, exp) if matches!(&**base, Expr::Sym(s) if s == var) => {
            let k = exp.as_number()?.as_integer()?;
            if (0..=MAX_DEGREE).contains(&k) {
                usize::try_from(k).ok()
            } else {
                None
            }
        }
        _ => None,
    }
}

/// `(a, b)` with `u == a*var + b`, when `u` is at most linear in `var`.
pub fn linear_coeffs(u: &Expr, var: &str) -> Option<(Expr, Expr)> {
    let coeffs = as_polynomial(u, var)?;
    match coeffs.len() {
        1 => Some((Expr::zero(), coeffs[0].clone())),
        2 => Some((coeffs[1].clone(), coeffs[0].clone())),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::parse::parse;

    fn expanded(s: &str) -> String {
        expand(&parse(s).unwrap()).to_string()
    }

    #[test]
    fn expands_products_and_powers() {
        assert_eq!(expanded("(x + 1)**2"), "x**2 + 2*x + 1");
        assert_eq!(expanded("(x - 1)*(x + 1)"), "x**2 - 1");
        assert_eq!(expanded("x*(x + y)"), "x**2 + x*y");
    }

    #[test]
    fn polynomial_coefficients() {
        let coeffs = as_polynomial(&parse("3*x**2 - 2*x + a").unwrap(), "x").unwrap();
        let printed: Vec<String> = coeffs.iter().map(|c| c.to_string()).collect();
        assert_eq!(printed, vec!["a", "-2", "3"]);
    }

    #[test]
    fn non_polynomials_are_rejected() {
        assert!(as_polynomial(&parse("sin(x) + 1").unwrap(), "x").is_none());
        assert!(as_polynomial(&parse("1/x").unwrap(), "x").is_none());
        assert!(as_polynomial(&parse("sqrt(x)").unwrap(), "x").is_none());
    }

    #[test]
    fn linear_coefficients() {
        let (a, b) = linear_coeffs(&parse("2*x + 3").unwrap(), "x").unwrap();
        assert_eq!((a.to_string(), b.to_string()), ("2".to_string(), "3".to_string()));
        assert!(linear_coeffs(&parse("x**2").unwrap(), "x").is_none());
    }
}
