//! Scalar symbolic expressions.
//!
//! An [`Expr`] is an immutable, reference-counted node in an expression DAG.
//! Sub-expressions are shared by pointer, so building forward kinematics by
//! repeated matrix products stays linear in memory, and every traversal
//! (differentiation, evaluation, compilation) memoizes on node identity.
//!
//! Constructors fold constants and drop neutral elements, which keeps
//! Jacobians of sparse expressions sparse.

// Exact comparisons against 0 and 1 are how neutral elements are detected.
#![allow(clippy::float_cmp)]

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::ops;
use std::sync::Arc;

use taskqp_core::EvalError;

use crate::symbol::Symbol;

/// Expression node. Children are shared [`Expr`] handles.
#[derive(Debug)]
pub(crate) enum Node {
    Const(f64),
    Symbol(Symbol),
    Add(Expr, Expr),
    Mul(Expr, Expr),
    Neg(Expr),
    Div(Expr, Expr),
    Powf(Expr, f64),
    Sqrt(Expr),
    Sin(Expr),
    Cos(Expr),
}

/// A scalar symbolic expression over named [`Symbol`]s.
#[derive(Clone)]
pub struct Expr(Arc<Node>);

/// Division with `0 / x == 0` for every `x`, including zero.
///
/// This is the limit taken by the derivative of a Euclidean norm at the
/// origin, where both the numerator and the norm vanish.
#[inline]
pub(crate) fn div_zero_safe(num: f64, den: f64) -> f64 {
    if num == 0.0 { 0.0 } else { num / den }
}

impl Expr {
    fn from_node(node: Node) -> Self {
        Self(Arc::new(node))
    }

    pub(crate) fn node(&self) -> &Node {
        &self.0
    }

    /// Identity of the underlying node, used for memoization.
    pub(crate) fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as usize
    }

    // -----------------------------------------------------------------------
    // Leaves
    // -----------------------------------------------------------------------

    pub fn constant(value: f64) -> Self {
        Self::from_node(Node::Const(value))
    }

    pub fn zero() -> Self {
        Self::constant(0.0)
    }

    pub fn one() -> Self {
        Self::constant(1.0)
    }

    pub fn symbol(symbol: &Symbol) -> Self {
        Self::from_node(Node::Symbol(symbol.clone()))
    }

    /// The constant value, if this expression is a constant leaf.
    pub fn as_const(&self) -> Option<f64> {
        match self.node() {
            Node::Const(v) => Some(*v),
            _ => None,
        }
    }

    /// The symbol, if this expression is a symbol leaf.
    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self.node() {
            Node::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_const() == Some(0.0)
    }

    pub fn is_one(&self) -> bool {
        self.as_const() == Some(1.0)
    }

    // -----------------------------------------------------------------------
    // Simplifying constructors
    // -----------------------------------------------------------------------

    fn add_expr(a: &Self, b: &Self) -> Self {
        match (a.as_const(), b.as_const()) {
            (Some(x), Some(y)) => Self::constant(x + y),
            (Some(x), _) if x == 0.0 => b.clone(),
            (_, Some(y)) if y == 0.0 => a.clone(),
            _ => Self::from_node(Node::Add(a.clone(), b.clone())),
        }
    }

    fn mul_expr(a: &Self, b: &Self) -> Self {
        match (a.as_const(), b.as_const()) {
            (Some(x), Some(y)) => Self::constant(x * y),
            (Some(x), _) if x == 0.0 => Self::zero(),
            (_, Some(y)) if y == 0.0 => Self::zero(),
            (Some(x), _) if x == 1.0 => b.clone(),
            (_, Some(y)) if y == 1.0 => a.clone(),
            (Some(x), _) if x == -1.0 => Self::neg_expr(b),
            (_, Some(y)) if y == -1.0 => Self::neg_expr(a),
            _ => Self::from_node(Node::Mul(a.clone(), b.clone())),
        }
    }

    fn neg_expr(a: &Self) -> Self {
        match a.node() {
            Node::Const(v) => Self::constant(-v),
            Node::Neg(inner) => inner.clone(),
            _ => Self::from_node(Node::Neg(a.clone())),
        }
    }

    fn sub_expr(a: &Self, b: &Self) -> Self {
        if b.is_zero() {
            return a.clone();
        }
        if a.is_zero() {
            return Self::neg_expr(b);
        }
        match (a.as_const(), b.as_const()) {
            (Some(x), Some(y)) => Self::constant(x - y),
            _ => Self::add_expr(a, &Self::neg_expr(b)),
        }
    }

    fn div_expr(a: &Self, b: &Self) -> Self {
        match (a.as_const(), b.as_const()) {
            (Some(x), Some(y)) => Self::constant(div_zero_safe(x, y)),
            (Some(x), _) if x == 0.0 => Self::zero(),
            (_, Some(y)) if y == 1.0 => a.clone(),
            _ => Self::from_node(Node::Div(a.clone(), b.clone())),
        }
    }

    /// `self` raised to a constant power.
    pub fn powf(&self, exponent: f64) -> Self {
        if exponent == 0.0 {
            return Self::one();
        }
        if exponent == 1.0 {
            return self.clone();
        }
        match self.as_const() {
            Some(v) => Self::constant(v.powf(exponent)),
            None => Self::from_node(Node::Powf(self.clone(), exponent)),
        }
    }

    pub fn square(&self) -> Self {
        Self::mul_expr(self, self)
    }

    pub fn sqrt(&self) -> Self {
        match self.as_const() {
            Some(v) => Self::constant(v.sqrt()),
            None => Self::from_node(Node::Sqrt(self.clone())),
        }
    }

    pub fn sin(&self) -> Self {
        match self.as_const() {
            Some(v) => Self::constant(v.sin()),
            None => Self::from_node(Node::Sin(self.clone())),
        }
    }

    pub fn cos(&self) -> Self {
        match self.as_const() {
            Some(v) => Self::constant(v.cos()),
            None => Self::from_node(Node::Cos(self.clone())),
        }
    }

    // -----------------------------------------------------------------------
    // Analysis
    // -----------------------------------------------------------------------

    /// Symbolic partial derivative with respect to `wrt`.
    pub fn diff(&self, wrt: &Symbol) -> Self {
        let mut memo = HashMap::new();
        self.diff_memo(wrt, &mut memo)
    }

    pub(crate) fn diff_memo(&self, wrt: &Symbol, memo: &mut HashMap<usize, Self>) -> Self {
        if let Some(d) = memo.get(&self.id()) {
            return d.clone();
        }
        let d = match self.node() {
            Node::Const(_) => Self::zero(),
            Node::Symbol(s) => {
                if s == wrt {
                    Self::one()
                } else {
                    Self::zero()
                }
            }
            Node::Add(a, b) => Self::add_expr(&a.diff_memo(wrt, memo), &b.diff_memo(wrt, memo)),
            Node::Mul(a, b) => {
                let da = a.diff_memo(wrt, memo);
                let db = b.diff_memo(wrt, memo);
                Self::add_expr(&Self::mul_expr(&da, b), &Self::mul_expr(a, &db))
            }
            Node::Neg(a) => Self::neg_expr(&a.diff_memo(wrt, memo)),
            Node::Div(a, b) => {
                // (a/b)' = a'/b - a b' / b^2
                let da = a.diff_memo(wrt, memo);
                let db = b.diff_memo(wrt, memo);
                let first = Self::div_expr(&da, b);
                let second = Self::div_expr(&Self::mul_expr(a, &db), &b.square());
                Self::sub_expr(&first, &second)
            }
            Node::Powf(a, n) => {
                let da = a.diff_memo(wrt, memo);
                if da.is_zero() {
                    Self::zero()
                } else {
                    Self::mul_expr(&Self::mul_expr(&Self::constant(*n), &a.powf(n - 1.0)), &da)
                }
            }
            Node::Sqrt(a) => {
                let da = a.diff_memo(wrt, memo);
                Self::div_expr(&da, &Self::mul_expr(&Self::constant(2.0), self))
            }
            Node::Sin(a) => Self::mul_expr(&a.cos(), &a.diff_memo(wrt, memo)),
            Node::Cos(a) => Self::neg_expr(&Self::mul_expr(&a.sin(), &a.diff_memo(wrt, memo))),
        };
        memo.insert(self.id(), d.clone());
        d
    }

    /// Free symbols actually appearing in this expression, sorted by name.
    pub fn free_symbols(&self) -> BTreeSet<Symbol> {
        let mut out = BTreeSet::new();
        let mut visited = std::collections::HashSet::new();
        self.collect_symbols(&mut out, &mut visited);
        out
    }

    pub(crate) fn collect_symbols(
        &self,
        out: &mut BTreeSet<Symbol>,
        visited: &mut std::collections::HashSet<usize>,
    ) {
        if !visited.insert(self.id()) {
            return;
        }
        match self.node() {
            Node::Const(_) => {}
            Node::Symbol(s) => {
                out.insert(s.clone());
            }
            Node::Add(a, b) | Node::Mul(a, b) | Node::Div(a, b) => {
                a.collect_symbols(out, visited);
                b.collect_symbols(out, visited);
            }
            Node::Neg(a) | Node::Powf(a, _) | Node::Sqrt(a) | Node::Sin(a) | Node::Cos(a) => {
                a.collect_symbols(out, visited);
            }
        }
    }

    /// Evaluate numerically, looking up every symbol through `lookup`.
    ///
    /// A symbol for which `lookup` returns `None` is an error, never zero.
    pub fn eval_with<F>(&self, lookup: &F) -> Result<f64, EvalError>
    where
        F: Fn(&Symbol) -> Option<f64>,
    {
        let mut memo = HashMap::new();
        self.eval_memo(lookup, &mut memo)
    }

    /// Evaluate with values keyed by symbol name.
    pub fn eval(&self, values: &HashMap<String, f64>) -> Result<f64, EvalError> {
        self.eval_with(&|s: &Symbol| values.get(s.name()).copied())
    }

    pub(crate) fn eval_memo<F>(
        &self,
        lookup: &F,
        memo: &mut HashMap<usize, f64>,
    ) -> Result<f64, EvalError>
    where
        F: Fn(&Symbol) -> Option<f64>,
    {
        if let Some(v) = memo.get(&self.id()) {
            return Ok(*v);
        }
        let v = match self.node() {
            Node::Const(v) => *v,
            Node::Symbol(s) => {
                lookup(s).ok_or_else(|| EvalError::MissingObservable(s.name().to_string()))?
            }
            Node::Add(a, b) => a.eval_memo(lookup, memo)? + b.eval_memo(lookup, memo)?,
            Node::Mul(a, b) => a.eval_memo(lookup, memo)? * b.eval_memo(lookup, memo)?,
            Node::Neg(a) => -a.eval_memo(lookup, memo)?,
            Node::Div(a, b) => {
                div_zero_safe(a.eval_memo(lookup, memo)?, b.eval_memo(lookup, memo)?)
            }
            Node::Powf(a, n) => a.eval_memo(lookup, memo)?.powf(*n),
            Node::Sqrt(a) => a.eval_memo(lookup, memo)?.sqrt(),
            Node::Sin(a) => a.eval_memo(lookup, memo)?.sin(),
            Node::Cos(a) => a.eval_memo(lookup, memo)?.cos(),
        };
        memo.insert(self.id(), v);
        Ok(v)
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Self::constant(value)
    }
}

impl From<&Symbol> for Expr {
    fn from(symbol: &Symbol) -> Self {
        Self::symbol(symbol)
    }
}

impl From<Symbol> for Expr {
    fn from(symbol: Symbol) -> Self {
        Self::from_node(Node::Symbol(symbol))
    }
}

// ---------------------------------------------------------------------------
// Operators
// ---------------------------------------------------------------------------

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $ctor:ident) => {
        impl ops::$trait<Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::$ctor(&self, &rhs)
            }
        }
        impl ops::$trait<&Expr> for Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::$ctor(&self, rhs)
            }
        }
        impl ops::$trait<Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::$ctor(self, &rhs)
            }
        }
        impl ops::$trait<&Expr> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::$ctor(self, rhs)
            }
        }
        impl ops::$trait<f64> for Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::$ctor(&self, &Expr::constant(rhs))
            }
        }
        impl ops::$trait<f64> for &Expr {
            type Output = Expr;
            fn $method(self, rhs: f64) -> Expr {
                Expr::$ctor(self, &Expr::constant(rhs))
            }
        }
        impl ops::$trait<Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::$ctor(&Expr::constant(self), &rhs)
            }
        }
        impl ops::$trait<&Expr> for f64 {
            type Output = Expr;
            fn $method(self, rhs: &Expr) -> Expr {
                Expr::$ctor(&Expr::constant(self), rhs)
            }
        }
    };
}

impl_binary_op!(Add, add, add_expr);
impl_binary_op!(Sub, sub, sub_expr);
impl_binary_op!(Mul, mul, mul_expr);
impl_binary_op!(Div, div, div_expr);

impl ops::Neg for Expr {
    type Output = Self;
    fn neg(self) -> Self {
        Self::neg_expr(&self)
    }
}

impl ops::Neg for &Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::neg_expr(self)
    }
}

impl std::iter::Sum for Expr {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::zero(), |acc, e| acc + e)
    }
}

// ---------------------------------------------------------------------------
// Formatting
// ---------------------------------------------------------------------------

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.node() {
            Node::Const(v) => write!(f, "{v}"),
            Node::Symbol(s) => write!(f, "{s}"),
            Node::Add(a, b) => write!(f, "({a} + {b})"),
            Node::Mul(a, b) => write!(f, "{a}*{b}"),
            Node::Neg(a) => write!(f, "-{a}"),
            Node::Div(a, b) => write!(f, "{a}/({b})"),
            Node::Powf(a, n) => write!(f, "({a})^{n}"),
            Node::Sqrt(a) => write!(f, "sqrt({a})"),
            Node::Sin(a) => write!(f, "sin({a})"),
            Node::Cos(a) => write!(f, "cos({a})"),
        }
    }
}

impl fmt::Debug for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Expr({self})")
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
