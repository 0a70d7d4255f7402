//! Infix expression parser.
//!
//! Grammar (`**` and `^` are both exponentiation, right associative):
//!
//! ```text
//! sum     := product (('+' | '-') product)*
//! product := unary (('*' | '/' | '%') unary | unary)*   juxtaposition multiplies
//! unary   := ('+' | '-') unary | power
//! power   := primary ('**' unary)?
//! primary := number | name | name '(' args ')' | '(' sum ')'
//! ```
//!
//! `%` is a numeric remainder with the sign of the divisor and applies to the
//! product accumulated so far.

use super::expr::{Constant, Expr, Func};
use super::number::{Number, Rational};
use super::MathError;

const MAX_DEPTH: usize = 256;

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(Number),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Pow,
    LParen,
    RParen,
    Comma,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Num(n) => n.to_string(),
            Token::Ident(s) => s.clone(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Star => "*".into(),
            Token::Slash => "/".into(),
            Token::Percent => "%".into(),
            Token::Pow => "**".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
            Token::Comma => ",".into(),
        }
    }
}

/// Parse an expression string.
pub fn parse(input: &str) -> Result<Expr, MathError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(MathError::Parse("empty expression".to_string()));
    }
    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.sum()?;
    match parser.peek() {
        None => Ok(expr),
        Some(tok) => Err(MathError::Parse(format!(
            "unexpected '{}' at token {}",
            tok.describe(),
            parser.pos + 1
        ))),
    }
}

fn tokenize(input: &str) -> Result<Vec<Token>, MathError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let (number, next) = read_number(&chars, i)?;
                tokens.push(Token::Num(number));
                i = next;
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Pow);
                i += 2;
            }
            '^' => {
                tokens.push(Token::Pow);
                i += 1;
            }
            '+' | '-' | '*' | '/' | '%' | '(' | ')' | ',' => {
                tokens.push(match c {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '%' => Token::Percent,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    _ => Token::Comma,
                });
                i += 1;
            }
            other => {
                return Err(MathError::Parse(format!("unexpected character '{}'", other)));
            }
        }
    }

    Ok(tokens)
}

fn read_number(chars: &[char], start: usize) -> Result<(Number, usize), MathError> {
    let mut i = start;
    let mut is_float = false;

    while i < chars.len() && chars[i].is_ascii_digit() {
        i += 1;
    }
    if i < chars.len() && chars[i] == '.' {
        is_float = true;
        i += 1;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
    }
    // Exponent only when digits follow, so `2e` stays `2*e`.
    if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
        let mut j = i + 1;
        if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
            j += 1;
        }
        if j < chars.len() && chars[j].is_ascii_digit() {
            is_float = true;
            i = j;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
    }

    let text: String = chars[start..i].iter().collect();
    if text == "." {
        return Err(MathError::Parse("unexpected character '.'".to_string()));
    }

    let number = if is_float {
        text.parse::<f64>()
            .map(Number::Float)
            .map_err(|_| MathError::Parse(format!("invalid number '{}'", text)))?
    } else {
        match text.parse::<i64>() {
            Ok(n) => Number::int(n),
            Err(_) => text
                .parse::<f64>()
                .map(Number::Float)
                .map_err(|_| MathError::Parse(format!("invalid number '{}'", text)))?,
        }
    };
    Ok((number, i))
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: Token) -> Result<(), MathError> {
        match self.next() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(MathError::Parse(format!(
                "expected '{}', found '{}'",
                expected.describe(),
                tok.describe()
            ))),
            None => Err(MathError::Parse(format!(
                "expected '{}', found end of input",
                expected.describe()
            ))),
        }
    }

    fn enter(&mut self) -> Result<(), MathError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(MathError::Parse("expression nested too deeply".to_string()));
        }
        Ok(())
    }

    fn sum(&mut self) -> Result<Expr, MathError> {
        self.enter()?;
        let mut terms = vec![self.product()?];
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    terms.push(self.product()?);
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    terms.push(self.product()?.neg());
                }
                _ => break,
            }
        }
        self.depth -= 1;
        Ok(Expr::add(terms))
    }

    fn product(&mut self) -> Result<Expr, MathError> {
        let mut factors = vec![self.unary()?];
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    factors.push(self.unary()?);
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let divisor = self.unary()?;
                    factors.push(Expr::pow(divisor, Expr::int(-1)));
                }
                Some(Token::Percent) => {
                    self.pos += 1;
                    let dividend = Expr::mul(std::mem::take(&mut factors));
                    let divisor = self.unary()?;
                    factors.push(remainder(dividend, divisor)?);
                }
                Some(Token::Num(_)) | Some(Token::Ident(_)) | Some(Token::LParen) => {
                    factors.push(self.unary()?);
                }
                _ => break,
            }
        }
        Ok(Expr::mul(factors))
    }

    fn unary(&mut self) -> Result<Expr, MathError> {
        self.enter()?;
        let result = match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                self.unary().map(Expr::neg)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        };
        self.depth -= 1;
        result
    }

    fn power(&mut self) -> Result<Expr, MathError> {
        let base = self.primary()?;
        if self.peek() == Some(&Token::Pow) {
            self.pos += 1;
            let exp = self.unary()?;
            return Ok(Expr::pow(base, exp));
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, MathError> {
        match self.next() {
            Some(Token::Num(n)) => Ok(Expr::Num(n)),
            Some(Token::LParen) => {
                let inner = self.sum()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(Token::Ident(name)) => self.identifier(name),
            Some(tok) => Err(MathError::Parse(format!(
                "unexpected '{}'",
                tok.describe()
            ))),
            None => Err(MathError::Parse("unexpected end of input".to_string())),
        }
    }

    fn identifier(&mut self, name: String) -> Result<Expr, MathError> {
        match name.as_str() {
            "pi" => return Ok(Expr::Const(Constant::Pi)),
            "E" => return Ok(Expr::Const(Constant::E)),
            "I" => return Ok(Expr::Const(Constant::I)),
            _ => {}
        }

        let is_call = name == "sqrt" || Func::from_name(&name).is_some();
        if !is_call {
            return Ok(Expr::Sym(name));
        }
        if self.peek() != Some(&Token::LParen) {
            return Err(MathError::Parse(format!("expected '(' after '{}'", name)));
        }
        self.pos += 1;

        let mut args = vec![self.sum()?];
        while self.peek() == Some(&Token::Comma) {
            self.pos += 1;
            args.push(self.sum()?);
        }
        self.expect(Token::RParen)?;

        let arity_error = |expected: &str| {
            MathError::Parse(format!("{}() takes {} argument(s)", name, expected))
        };

        if name == "sqrt" {
            return match <[Expr; 1]>::try_from(args) {
                Ok([arg]) => Ok(arg.sqrt()),
                Err(_) => Err(arity_error("1")),
            };
        }

        let func = Func::from_name(&name).ok_or_else(|| arity_error("1"))?;
        match (func, args.len()) {
            (_, 1) => Ok(Expr::func(func, args.remove(0))),
            (Func::Log, 2) => {
                let base = args.remove(1);
                let value = args.remove(0);
                Ok(Expr::func(Func::Log, value).div(Expr::func(Func::Log, base)))
            }
            (Func::Log, _) => Err(arity_error("1 or 2")),
            _ => Err(arity_error("1")),
        }
    }
}

/// `a % b` for numbers, taking the sign of `b`.
fn remainder(a: Expr, b: Expr) -> Result<Expr, MathError> {
    let (Some(x), Some(y)) = (a.as_number(), b.as_number()) else {
        return Err(MathError::Unsupported(
            "'%' is only defined for numbers".to_string(),
        ));
    };
    if y.is_zero() {
        return Err(MathError::DivisionByZero);
    }

    let exact = match (x.as_rational(), y.as_rational()) {
        (Some(p), Some(q)) => rational_remainder(p, q),
        _ => None,
    };
    Ok(Expr::Num(match exact {
        Some(r) => Number::Rational(r),
        None => {
            let (x, y) = (x.to_f64(), y.to_f64());
            Number::Float(x - y * (x / y).floor())
        }
    }))
}

fn rational_remainder(p: Rational, q: Rational) -> Option<Rational> {
    let ratio = p.checked_div(q)?;
    let floor = Rational::integer(ratio.num().div_euclid(ratio.den()));
    p.checked_add(q.checked_mul(floor)?.checked_neg()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(s: &str) -> String {
        parse(s).unwrap().to_string()
    }

    #[test]
    fn precedence_and_associativity() {
        assert_eq!(p("2 + 3 * 4"), "14");
        assert_eq!(p("2**3**2"), "512");
        assert_eq!(p("-x**2"), "-x**2");
        assert_eq!(p("x^2 + 1"), "x**2 + 1");
        assert_eq!(p("(1 + 2) / 4"), "3/4");
    }

    #[test]
    fn percent_sign_is_remainder() {
        assert_eq!(p("5 % 3"), "2");
        assert_eq!(p("-7 % 3"), "2");
        assert_eq!(p("7 % -3"), "-2");
        assert_eq!(p("2 * 7 % 4"), "2");
        assert_eq!(p("7/2 % 1"), "1/2");
        assert_eq!(p("7.5 % 2"), "1.5");
        assert_eq!(parse("5 % 0"), Err(MathError::DivisionByZero));
        assert!(matches!(parse("x % 2"), Err(MathError::Unsupported(_))));
    }

    #[test]
    fn juxtaposition_multiplies() {
        assert_eq!(p("2x"), "2*x");
        assert_eq!(p("3(x + 1)"), "3*x + 3");
    }

    #[test]
    fn floats_and_exponent_notation() {
        assert_eq!(parse("1.5").unwrap(), Expr::Num(Number::Float(1.5)));
        assert_eq!(parse("2e3").unwrap(), Expr::Num(Number::Float(2000.0)));
        assert_eq!(p("2e"), "2*e");
    }

    #[test]
    fn functions_and_constants() {
        assert_eq!(p("sqrt(8)"), "2*sqrt(2)");
        assert_eq!(p("sin(pi)"), "0");
        assert_eq!(p("ln(E)"), "1");
        assert_eq!(p("log(x, 2)"), "log(x)/log(2)");
    }

    #[test]
    fn reports_malformed_input() {
        assert!(matches!(parse(""), Err(MathError::Parse(_))));
        assert!(matches!(parse("2 +"), Err(MathError::Parse(_))));
        assert!(matches!(parse("(x"), Err(MathError::Parse(_))));
        assert!(matches!(parse("sin x"), Err(MathError::Parse(_))));
        assert!(matches!(parse("x $ 2"), Err(MathError::Parse(_))));
        assert!(matches!(parse("sqrt(1, 2)"), Err(MathError::Parse(_))));
    }

    #[test]
    fn deep_nesting_is_rejected() {
        let input = format!("{}x{}", "(".repeat(400), ")".repeat(400));
        assert!(matches!(parse(&input), Err(MathError::Parse(_))));
    }
}
