//! Dense matrices of expressions.

use std::fmt;

use serde_json::Value;

use super::expr::Expr;
use super::number::Number;
use super::parse::parse;
use super::poly::expand;
use super::MathError;

/// Cofactor expansion is exponential; symbolic matrices larger than this are refused.
const MAX_SYMBOLIC_SIZE: usize = 8;

#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    /// Row-major.
    data: Vec<Expr>,
}

impl Matrix {
    pub fn new(rows: usize, cols: usize, data: Vec<Expr>) -> Result<Self, MathError> {
        if rows == 0 || cols == 0 || data.len() != rows * cols {
            return Err(MathError::InvalidMatrix(format!(
                "expected {}x{} entries, got {}",
                rows,
                cols,
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    /// Build from a JSON array of rows. A flat array is a column vector.
    /// Entries may be numbers or expression strings.
    pub fn from_json(value: &Value) -> Result<Self, MathError> {
        let Value::Array(items) = value else {
            return Err(MathError::InvalidMatrix(
                "matrix must be a list of rows".to_string(),
            ));
        };
        if items.is_empty() {
            return Err(MathError::InvalidMatrix("matrix is empty".to_string()));
        }

        if !items.iter().any(Value::is_array) {
            let data = items.iter().map(entry).collect::<Result<Vec<_>, _>>()?;
            return Self::new(data.len(), 1, data);
        }

        let mut data = Vec::new();
        let mut cols = None;
        for row in items {
            let Value::Array(cells) = row else {
                return Err(MathError::InvalidMatrix(
                    "mixed rows and scalars".to_string(),
                ));
            };
            match cols {
                None => cols = Some(cells.len()),
                Some(n) if n != cells.len() => {
                    return Err(MathError::InvalidMatrix(
                        "rows have different lengths".to_string(),
                    ));
                }
                Some(_) => {}
            }
            for cell in cells {
                data.push(entry(cell)?);
            }
        }
        Self::new(items.len(), cols.unwrap_or(0), data)
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn get(&self, row: usize, col: usize) -> &Expr {
        &self.data[row * self.cols + col]
    }

    pub fn transpose(&self) -> Matrix {
        let mut data = Vec::with_capacity(self.data.len());
        for c in 0..self.cols {
            for r in 0..self.rows {
                data.push(self.get(r, c).clone());
            }
        }
        Matrix {
            rows: self.cols,
            cols: self.rows,
            data,
        }
    }

    pub fn multiply(&self, other: &Matrix) -> Result<Matrix, MathError> {
        if self.cols != other.rows {
            return Err(MathError::ShapeMismatch(
                self.rows,
                self.cols,
                other.rows,
                other.cols,
            ));
        }
        let mut data = Vec::with_capacity(self.rows * other.cols);
        for r in 0..self.rows {
            for c in 0..other.cols {
                let terms = (0..self.cols)
                    .map(|k| Expr::mul(vec![self.get(r, k).clone(), other.get(k, c).clone()]))
                    .collect();
                data.push(expand(&Expr::add(terms)));
            }
        }
        Ok(Matrix {
            rows: self.rows,
            cols: other.cols,
            data,
        })
    }

    pub fn determinant(&self) -> Result<Expr, MathError> {
        self.require_square()?;
        if let Some(numbers) = self.numeric_entries() {
            return Ok(Expr::Num(numeric_determinant(self.rows, numbers)));
        }
        self.require_symbolic_size()?;
        Ok(expand(&cofactor_determinant(self.rows, &self.data)))
    }

    pub fn inverse(&self) -> Result<Matrix, MathError> {
        self.require_square()?;
        let n = self.rows;

        if let Some(numbers) = self.numeric_entries() {
            let inverse = numeric_inverse(n, numbers).ok_or(MathError::Singular)?;
            return Ok(Matrix {
                rows: n,
                cols: n,
                data: inverse.into_iter().map(Expr::Num).collect(),
            });
        }

        self.require_symbolic_size()?;
        let det = expand(&cofactor_determinant(n, &self.data));
        if det.is_zero() {
            return Err(MathError::Singular);
        }
        let mut data = Vec::with_capacity(n * n);
        for r in 0..n {
            for c in 0..n {
                // adj(A)[r][c] is the (c, r) cofactor.
                let minor = minor(n, &self.data, c, r);
                let mut cofactor = cofactor_determinant(n - 1, &minor);
                if (r + c) % 2 == 1 {
                    cofactor = cofactor.neg();
                }
                data.push(expand(&cofactor).div(det.clone()));
            }
        }
        Ok(Matrix {
            rows: n,
            cols: n,
            data,
        })
    }

    fn require_square(&self) -> Result<(), MathError> {
        if self.rows != self.cols {
            return Err(MathError::NotSquare {
                rows: self.rows,
                cols: self.cols,
            });
        }
        Ok(())
    }

    fn require_symbolic_size(&self) -> Result<(), MathError> {
        if self.rows > MAX_SYMBOLIC_SIZE {
            return Err(MathError::Unsupported(format!(
                "symbolic matrices larger than {0}x{0}",
                MAX_SYMBOLIC_SIZE
            )));
        }
        Ok(())
    }

    fn numeric_entries(&self) -> Option<Vec<Number>> {
        self.data.iter().map(Expr::as_number).collect()
    }
}

fn entry(value: &Value) -> Result<Expr, MathError> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Expr::int(i)),
            None => n
                .as_f64()
                .map(|f| Expr::Num(Number::Float(f)))
                .ok_or_else(|| MathError::InvalidMatrix(format!("bad number {}", n))),
        },
        Value::String(s) => parse(s),
        other => Err(MathError::InvalidMatrix(format!(
            "unsupported entry {}",
            other
        ))),
    }
}

fn minor(n: usize, data: &[Expr], skip_row: usize, skip_col: usize) -> Vec<Expr> {
    let mut out = Vec::with_capacity((n - 1) * (n - 1));
    for r in (0..n).filter(|r| *r != skip_row) {
        for c in (0..n).filter(|c| *c != skip_col) {
            out.push(data[r * n + c].clone());
        }
    }
    out
}

fn cofactor_determinant(n: usize, data: &[Expr]) -> Expr {
    match n {
        0 => Expr::one(),
        1 => data[0].clone(),
        2 => Expr::add(vec![
            Expr::mul(vec![data[0].clone(), data[3].clone()]),
            Expr::mul(vec![data[1].clone(), data[2].clone()]).neg(),
        ]),
        _ => {
            let terms = (0..n)
                .filter(|c| !data[*c].is_zero())
                .map(|c| {
                    let term = Expr::mul(vec![
                        data[c].clone(),
                        cofactor_determinant(n - 1, &minor(n, data, 0, c)),
                    ]);
                    if c % 2 == 1 {
                        term.neg()
                    } else {
                        term
                    }
                })
                .collect();
            Expr::add(terms)
        }
    }
}

/// Gaussian elimination with exact rational arithmetic where possible.
fn numeric_determinant(n: usize, mut m: Vec<Number>) -> Number {
    let mut det = Number::ONE;
    for col in 0..n {
        let Some(pivot_row) = (col..n).find(|r| !m[r * n + col].is_zero()) else {
            return Number::ZERO;
        };
        if pivot_row != col {
            for c in 0..n {
                m.swap(pivot_row * n + c, col * n + c);
            }
            det = -det;
        }
        let pivot = m[col * n + col];
        det = det * pivot;
        for r in col + 1..n {
            let Some(factor) = m[r * n + col].checked_div(pivot) else {
                return Number::ZERO;
            };
            for c in col..n {
                m[r * n + c] = m[r * n + c] - factor * m[col * n + c];
            }
        }
    }
    det
}

/// Gauss-Jordan elimination. `None` when the matrix is singular.
fn numeric_inverse(n: usize, mut m: Vec<Number>) -> Option<Vec<Number>> {
    let mut inv: Vec<Number> = (0..n * n)
        .map(|i| if i / n == i % n { Number::ONE } else { Number::ZERO })
        .collect();

    for col in 0..n {
        let pivot_row = (col..n).find(|r| !m[r * n + col].is_zero())?;
        if pivot_row != col {
            for c in 0..n {
                m.swap(pivot_row * n + c, col * n + c);
                inv.swap(pivot_row * n + c, col * n + c);
            }
        }

        let pivot = m[col * n + col];
        for c in 0..n {
            m[col * n + c] = m[col * n + c].checked_div(pivot)?;
            inv[col * n + c] = inv[col * n + c].checked_div(pivot)?;
        }

        for r in (0..n).filter(|r| *r != col) {
            let factor = m[r * n + col];
            if factor.is_zero() {
                continue;
            }
            for c in 0..n {
                m[r * n + c] = m[r * n + c] - factor * m[col * n + c];
                inv[r * n + c] = inv[r * n + c] - factor * inv[col * n + c];
            }
        }
    }
    Some(inv)
}

impl fmt::Display for Matrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Matrix([")?;
        for r in 0..self.rows {
            if r > 0 {
                f.write_str(", ")?;
            }
            f.write_str("[")?;
            for c in 0..self.cols {
                if c > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{}", self.get(r, c))?;
            }
            f.write_str("]")?;
        }
        f.write_str("])")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn m(value: Value) -> Matrix {
        Matrix::from_json(&value).unwrap()
    }

    #[test]
    fn determinant_and_inverse() {
        let a = m(json!([[1, 2], [3, 4]]));
        assert_eq!(a.determinant().unwrap().to_string(), "-2");
        assert_eq!(
            a.inverse().unwrap().to_string(),
            "Matrix([[-2, 1], [3/2, -1/2]])"
        );
    }

    #[test]
    fn transpose_and_multiply() {
        let a = m(json!([[1, 2, 3], [4, 5, 6]]));
        assert_eq!(a.transpose().to_string(), "Matrix([[1, 4], [2, 5], [3, 6]])");

        let product = a.multiply(&a.transpose()).unwrap();
        assert_eq!(product.to_string(), "Matrix([[14, 32], [32, 77]])");
    }

    #[test]
    fn flat_list_is_a_column_vector() {
        let v = m(json!([1, 2, 3]));
        assert_eq!((v.rows(), v.cols()), (3, 1));
        assert_eq!(v.to_string(), "Matrix([[1], [2], [3]])");
    }

    #[test]
    fn symbolic_entries() {
        let a = m(json!([["a", "b"], ["c", "d"]]));
        assert_eq!(a.determinant().unwrap().to_string(), "a*d - b*c");

        let r = m(json!([["cos(t)", "-sin(t)"], ["sin(t)", "cos(t)"]]));
        let det = r.determinant().unwrap();
        let value = det.evaluate_at("t", 0.4).unwrap();
        assert!((value - 1.0).abs() < 1e-12);
    }

    #[test]
    fn errors() {
        assert_eq!(
            m(json!([[1, 2], [2, 4]])).inverse(),
            Err(MathError::Singular)
        );
        assert_eq!(
            m(json!([[1, 2, 3]])).determinant(),
            Err(MathError::NotSquare { rows: 1, cols: 3 })
        );
        assert_eq!(
            m(json!([[1, 2]])).multiply(&m(json!([[1, 2]]))),
            Err(MathError::ShapeMismatch(1, 2, 1, 2))
        );
        assert!(matches!(
            Matrix::from_json(&json!([[1, 2], [3]])),
            Err(MathError::InvalidMatrix(_))
        ));
        assert!(matches!(
            Matrix::from_json(&json!([])),
            Err(MathError::InvalidMatrix(_))
        ));
    }
}
