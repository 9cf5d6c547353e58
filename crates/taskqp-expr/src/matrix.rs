//! Dense matrices of symbolic expressions.

use std::collections::{BTreeSet, HashMap, HashSet};

use nalgebra::DMatrix;
use taskqp_core::EvalError;

use crate::expr::Expr;
use crate::symbol::Symbol;

/// A dense, row-major matrix of [`Expr`].
///
/// Column vectors are `n x 1` matrices. Shapes with zero rows or columns are
/// valid and compose normally under [`row_join`](Self::row_join) and
/// [`vstack`](Self::vstack).
#[derive(Clone, Debug)]
pub struct ExprMatrix {
    rows: usize,
    cols: usize,
    data: Vec<Expr>,
}

impl ExprMatrix {
    /// Build from row-major data.
    ///
    /// # Panics
    ///
    /// Panics if `data.len() != rows * cols`.
    pub fn from_row_major(rows: usize, cols: usize, data: Vec<Expr>) -> Self {
        assert_eq!(data.len(), rows * cols, "data length must equal rows * cols");
        Self { rows, cols, data }
    }

    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self::from_row_major(rows, cols, vec![Expr::zero(); rows * cols])
    }

    pub fn identity(n: usize) -> Self {
        let mut m = Self::zeros(n, n);
        for i in 0..n {
            m.set(i, i, Expr::one());
        }
        m
    }

    /// Square matrix with `entries` on the diagonal.
    pub fn diag(entries: &[Expr]) -> Self {
        let n = entries.len();
        let mut m = Self::zeros(n, n);
        for (i, e) in entries.iter().enumerate() {
            m.set(i, i, e.clone());
        }
        m
    }

    /// Column vector from entries.
    pub fn column(entries: Vec<Expr>) -> Self {
        let n = entries.len();
        Self::from_row_major(n, 1, entries)
    }

    /// Constant matrix from a numeric one.
    pub fn from_dmatrix(m: &DMatrix<f64>) -> Self {
        let (rows, cols) = m.shape();
        let data = (0..rows)
            .flat_map(|r| (0..cols).map(move |c| (r, c)))
            .map(|(r, c)| Expr::constant(m[(r, c)]))
            .collect();
        Self::from_row_major(rows, cols, data)
    }

    pub const fn nrows(&self) -> usize {
        self.rows
    }

    pub const fn ncols(&self) -> usize {
        self.cols
    }

    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of entries.
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, row: usize, col: usize) -> &Expr {
        assert!(row < self.rows && col < self.cols, "index out of bounds");
        &self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: Expr) {
        assert!(row < self.rows && col < self.cols, "index out of bounds");
        self.data[row * self.cols + col] = value;
    }

    /// Entries in row-major order.
    pub fn iter(&self) -> impl Iterator<Item = &Expr> {
        self.data.iter()
    }

    pub fn map(&self, f: impl Fn(&Expr) -> Expr) -> Self {
        Self::from_row_major(self.rows, self.cols, self.data.iter().map(f).collect())
    }

    /// Sub-matrix starting at `(row, col)` with the given shape.
    pub fn block(&self, row: usize, col: usize, nrows: usize, ncols: usize) -> Self {
        assert!(row + nrows <= self.rows && col + ncols <= self.cols, "block out of bounds");
        let data = (row..row + nrows)
            .flat_map(|r| (col..col + ncols).map(move |c| (r, c)))
            .map(|(r, c)| self.get(r, c).clone())
            .collect();
        Self::from_row_major(nrows, ncols, data)
    }

    // -----------------------------------------------------------------------
    // Block assembly
    // -----------------------------------------------------------------------

    /// Horizontal concatenation `[self | other]`.
    pub fn row_join(&self, other: &Self) -> Self {
        assert_eq!(self.rows, other.rows, "row_join requires equal row counts");
        let cols = self.cols + other.cols;
        let mut data = Vec::with_capacity(self.rows * cols);
        for r in 0..self.rows {
            data.extend_from_slice(&self.data[r * self.cols..(r + 1) * self.cols]);
            data.extend_from_slice(&other.data[r * other.cols..(r + 1) * other.cols]);
        }
        Self::from_row_major(self.rows, cols, data)
    }

    /// Vertical concatenation `[self; other]`.
    pub fn vstack(&self, other: &Self) -> Self {
        assert_eq!(self.cols, other.cols, "vstack requires equal column counts");
        let mut data = self.data.clone();
        data.extend_from_slice(&other.data);
        Self::from_row_major(self.rows + other.rows, self.cols, data)
    }

    /// Reinterpret with a new shape, keeping row-major order.
    pub fn reshape(&self, rows: usize, cols: usize) -> Self {
        Self::from_row_major(rows, cols, self.data.clone())
    }

    pub fn transpose(&self) -> Self {
        let data = (0..self.cols)
            .flat_map(|c| (0..self.rows).map(move |r| (r, c)))
            .map(|(r, c)| self.get(r, c).clone())
            .collect();
        Self::from_row_major(self.cols, self.rows, data)
    }

    // -----------------------------------------------------------------------
    // Arithmetic
    // -----------------------------------------------------------------------

    pub fn add(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a + b)
    }

    pub fn sub(&self, other: &Self) -> Self {
        self.zip_with(other, |a, b| a - b)
    }

    pub fn scale(&self, factor: &Expr) -> Self {
        self.map(|e| e * factor)
    }

    fn zip_with(&self, other: &Self, f: impl Fn(&Expr, &Expr) -> Expr) -> Self {
        assert_eq!(self.shape(), other.shape(), "element-wise op requires equal shapes");
        let data = self.data.iter().zip(&other.data).map(|(a, b)| f(a, b)).collect();
        Self::from_row_major(self.rows, self.cols, data)
    }

    /// Matrix product.
    pub fn matmul(&self, other: &Self) -> Self {
        assert_eq!(self.cols, other.rows, "matmul requires self.cols == other.rows");
        let mut data = Vec::with_capacity(self.rows * other.cols);
        for r in 0..self.rows {
            for c in 0..other.cols {
                let entry: Expr = (0..self.cols)
                    .map(|k| self.get(r, k) * other.get(k, c))
                    .sum();
                data.push(entry);
            }
        }
        Self::from_row_major(self.rows, other.cols, data)
    }

    /// Euclidean (Frobenius) norm over all entries.
    pub fn norm(&self) -> Expr {
        self.data.iter().map(Expr::square).sum::<Expr>().sqrt()
    }

    // -----------------------------------------------------------------------
    // Analysis
    // -----------------------------------------------------------------------

    /// Jacobian of a column vector with respect to `wrt`.
    ///
    /// Row `i`, column `j` is `d self[i] / d wrt[j]`.
    pub fn jacobian(&self, wrt: &[Symbol]) -> Self {
        assert!(self.cols == 1 || self.rows == 0, "jacobian requires a column vector");
        let mut data = Vec::with_capacity(self.rows * wrt.len());
        // One memo per variable, shared across rows so common subtrees are
        // differentiated once.
        let mut memos: Vec<HashMap<usize, Expr>> = vec![HashMap::new(); wrt.len()];
        for e in &self.data {
            for (sym, memo) in wrt.iter().zip(memos.iter_mut()) {
                data.push(e.diff_memo(sym, memo));
            }
        }
        Self::from_row_major(self.rows, wrt.len(), data)
    }

    /// Free symbols across all entries, sorted by name.
    pub fn free_symbols(&self) -> BTreeSet<Symbol> {
        let mut out = BTreeSet::new();
        let mut visited = HashSet::new();
        for e in &self.data {
            e.collect_symbols(&mut out, &mut visited);
        }
        out
    }

    /// Evaluate every entry with values keyed by symbol name.
    pub fn eval(&self, values: &HashMap<String, f64>) -> Result<DMatrix<f64>, EvalError> {
        let lookup = |s: &Symbol| values.get(s.name()).copied();
        let mut memo = HashMap::new();
        let mut out = DMatrix::zeros(self.rows, self.cols);
        for r in 0..self.rows {
            for c in 0..self.cols {
                out[(r, c)] = self.get(r, c).eval_memo(&lookup, &mut memo)?;
            }
        }
        Ok(out)
    }
}
