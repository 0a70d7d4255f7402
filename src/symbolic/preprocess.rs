//! Normalization of loosely written math (`2x^2 + 3(x+1)`, `15%`) into
//! parser syntax.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::expr::Func;

static DIGIT_LETTER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d)([A-Za-z])").unwrap());
static CALL_OR_GROUP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([A-Za-z_][A-Za-z0-9_]*|\d|\))\s*\(").unwrap());
/// A trailing operand turns `%` into the remainder operator.
static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+(?:\.\d+)?)%(\s*[0-9A-Za-z_(.])?").unwrap());
static WORD_OF: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\bof\b").unwrap());

/// Rewrite common notation into parser syntax:
/// `^` to `**`, `2x` to `2*x`, `x(` to `x*(` (function calls are left alone),
/// `15%` to `(15/100)`, and whitespace removed. `%` between two operands is
/// left for the parser as a remainder.
pub fn preprocess_math(expr: &str) -> String {
    let expr = expr.replace('^', "**");
    let expr = DIGIT_LETTER.replace_all(&expr, "$1*$2");
    let expr = CALL_OR_GROUP.replace_all(&expr, |caps: &Captures| {
        let head = &caps[1];
        if head == "sqrt" || Func::from_name(head).is_some() {
            format!("{}(", head)
        } else {
            format!("{}*(", head)
        }
    });
    let expr = PERCENT.replace_all(&expr, |caps: &Captures| match caps.get(2) {
        Some(operand) => format!("{}%{}", &caps[1], operand.as_str()),
        None => format!("({}/100)", &caps[1]),
    });
    expr.chars().filter(|c| !c.is_whitespace()).collect()
}

/// `15% of 200` reads as `15% * 200`.
pub(crate) fn replace_of(expr: &str) -> String {
    WORD_OF.replace_all(expr, "*").into_owned()
}

/// `printf("%.{precision}g")`: fixed or scientific notation, whichever is
/// shorter for the exponent, with trailing zeros removed.
pub fn format_general(value: f64, precision: usize) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }

    let precision = precision.max(1);
    let sci = format!("{:.*e}", precision - 1, value);
    let (mantissa, exponent) = sci.split_once('e').unwrap_or((sci.as_str(), "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if exponent < -4 || exponent >= precision as i32 {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!(
            "{}e{}{:02}",
            trim_fraction(mantissa),
            sign,
            exponent.unsigned_abs()
        )
    } else {
        let decimals = (precision as i32 - 1 - exponent).max(0) as usize;
        trim_fraction(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrites_loose_notation() {
        assert_eq!(preprocess_math("2x^2 + 3x"), "2*x**2+3*x");
        assert_eq!(preprocess_math("x(x + 1)"), "x*(x+1)");
        assert_eq!(preprocess_math("(a+b)(a-b)"), "(a+b)*(a-b)");
        assert_eq!(preprocess_math("2 (3)"), "2*(3)");
        assert_eq!(preprocess_math("15%"), "(15/100)");
        assert_eq!(preprocess_math("12.5% * 8"), "(12.5/100)*8");
        assert_eq!(preprocess_math("5 % 3"), "5%3");
        assert_eq!(preprocess_math("10%(4)"), "10%(4)");
    }

    #[test]
    fn function_calls_are_not_split() {
        assert_eq!(preprocess_math("sin(x) + sqrt(4)"), "sin(x)+sqrt(4)");
        assert_eq!(preprocess_math("2sin(x)"), "2*sin(x)");
        assert_eq!(preprocess_math("log (x)"), "log(x)");
    }

    #[test]
    fn of_is_a_whole_word() {
        assert_eq!(replace_of("15% of 200"), "15% * 200");
        assert_eq!(replace_of("often"), "often");
    }

    #[test]
    fn general_format() {
        assert_eq!(format_general(2.0 / 3.0, 6), "0.666667");
        assert_eq!(format_general(1234567.0, 6), "1.23457e+06");
        assert_eq!(format_general(0.0001234, 6), "0.0001234");
        assert_eq!(format_general(0.00001234, 6), "1.234e-05");
        assert_eq!(format_general(-2.5, 6), "-2.5");
        assert_eq!(format_general(100000.0, 6), "100000");
    }
}
