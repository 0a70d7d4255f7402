//! Printing in the conventional computer-algebra string form:
//! `x**2 + 2*x + 1`, `sqrt(2)/2`, `-sin(x)`, `3*x/(2*y)`.

use std::fmt;

use super::expr::Expr;
use super::number::Number;

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Num(n) => write!(f, "{}", n),
            Expr::Sym(s) => f.write_str(s),
            Expr::Const(c) => f.write_str(c.name()),
            Expr::Func(func, arg) => write!(f, "{}({})", func.name(), arg),
            Expr::Add(terms) => fmt_add(self, terms, f),
            Expr::Mul(_) => fmt_mul(self, f),
            Expr::Pow(base, exp) => fmt_pow(base, exp, f),
        }
    }
}

fn fmt_add(whole: &Expr, terms: &[Expr], f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut ordered: Vec<&Expr> = terms.iter().collect();
    // Purely numeric sums read better with the rational part first: `1 + sqrt(2)`.
    if !whole.has_symbols() {
        ordered.sort_by_key(|t| !matches!(t, Expr::Num(_)));
    }

    for (i, term) in ordered.into_iter().enumerate() {
        let (coeff, _) = term.split_coefficient();
        if i == 0 {
            write!(f, "{}", term)?;
        } else if coeff.is_negative() {
            write!(f, " - {}", term.clone().neg())?;
        } else {
            write!(f, " + {}", term)?;
        }
    }
    Ok(())
}

fn fmt_mul(whole: &Expr, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let (coeff, body) = whole.split_coefficient();
    let factors = match body {
        Expr::Mul(items) => items,
        other if other.is_one() => Vec::new(),
        other => vec![other],
    };

    let mut numer = Vec::new();
    let mut denom = Vec::new();
    match coeff.abs() {
        Number::Rational(r) => {
            if r.num() != 1 {
                numer.push(r.num().to_string());
            }
            if r.den() != 1 {
                denom.push(r.den().to_string());
            }
        }
        float => numer.push(float.to_string()),
    }

    for factor in &factors {
        match factor {
            Expr::Pow(base, exp) if exp.as_number().is_some_and(|n| n.is_negative()) => {
                let flipped = Expr::pow((**base).clone(), (**exp).clone().neg());
                denom.push(factor_str(&flipped));
            }
            other => numer.push(factor_str(other)),
        }
    }

    if coeff.is_negative() {
        f.write_str("-")?;
    }
    if numer.is_empty() {
        f.write_str("1")?;
    } else {
        f.write_str(&numer.join("*"))?;
    }
    match denom.len() {
        0 => Ok(()),
        1 => write!(f, "/{}", denom[0]),
        _ => write!(f, "/({})", denom.join("*")),
    }
}

fn fmt_pow(base: &Expr, exp: &Expr, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if let Some(r) = exp.as_number().and_then(|n| n.as_rational()) {
        match (r.num(), r.den()) {
            (1, 2) => return write!(f, "sqrt({})", base),
            (-1, 2) => return write!(f, "1/sqrt({})", base),
            (-1, 1) => return write!(f, "1/{}", base_str(base)),
            _ => {}
        }
    }
    write!(f, "{}**{}", base_str(base), exp_str(exp))
}

fn factor_str(e: &Expr) -> String {
    match e {
        Expr::Add(_) => format!("({})", e),
        other => other.to_string(),
    }
}

fn base_str(base: &Expr) -> String {
    let wrap = match base {
        Expr::Add(_) | Expr::Mul(_) | Expr::Pow(..) => true,
        Expr::Num(n) => n.is_negative() || n.as_rational().is_some_and(|r| !r.is_integer()),
        _ => false,
    };
    if wrap {
        format!("({})", base)
    } else {
        base.to_string()
    }
}

fn exp_str(exp: &Expr) -> String {
    let plain = match exp {
        Expr::Sym(_) | Expr::Const(_) | Expr::Func(..) => true,
        Expr::Num(n) => !n.is_negative() && n.as_rational().map_or(true, |r| r.is_integer()),
        _ => false,
    };
    if plain {
        exp.to_string()
    } else {
        format!("({})", exp)
    }
}
