//! Compilation of expression matrices into flat evaluation tapes.
//!
//! A [`CompiledFunction`] is built once from an [`ExprMatrix`] and then
//! evaluated every control cycle. Its parameters are exactly the matrix's
//! free symbols (sorted by name), so evaluation cost scales with what the
//! matrix depends on, not with the size of the global observable state.
//!
//! Shared sub-expressions compile to a single tape slot.

use std::collections::{HashMap, HashSet};

use nalgebra::DMatrix;
use taskqp_core::EvalError;

use crate::expr::{Expr, Node, div_zero_safe};
use crate::matrix::ExprMatrix;
use crate::symbol::Symbol;

/// One tape instruction. Operands are indices of earlier slots.
#[derive(Debug, Clone, Copy)]
enum Instr {
    Const(f64),
    Input(usize),
    Add(usize, usize),
    Mul(usize, usize),
    Neg(usize),
    Div(usize, usize),
    Powf(usize, f64),
    Sqrt(usize),
    Sin(usize),
    Cos(usize),
}

/// A matrix expression compiled for repeated numeric evaluation.
#[derive(Debug, Clone)]
pub struct CompiledFunction {
    inputs: Vec<Symbol>,
    tape: Vec<Instr>,
    outputs: Vec<usize>,
    rows: usize,
    cols: usize,
}

impl CompiledFunction {
    /// Compile `matrix`. Parameters are its free symbols in name order.
    pub fn compile(matrix: &ExprMatrix) -> Self {
        let inputs: Vec<Symbol> = matrix.free_symbols().into_iter().collect();
        let input_index: HashMap<Symbol, usize> = inputs
            .iter()
            .enumerate()
            .map(|(i, s)| (s.clone(), i))
            .collect();

        let mut builder = TapeBuilder {
            input_index: &input_index,
            tape: Vec::new(),
            slots: HashMap::new(),
            constants: HashMap::new(),
        };
        let outputs = matrix.iter().map(|e| builder.emit(e)).collect();

        Self {
            inputs,
            tape: builder.tape,
            outputs,
            rows: matrix.nrows(),
            cols: matrix.ncols(),
        }
    }

    /// Parameters of this function, in the order `eval_slice` expects them.
    pub fn symbols(&self) -> &[Symbol] {
        &self.inputs
    }

    /// Parameter names, in order.
    pub fn symbol_names(&self) -> Vec<&str> {
        self.inputs.iter().map(Symbol::name).collect()
    }

    pub const fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    /// Number of tape instructions (after sharing).
    pub fn tape_len(&self) -> usize {
        self.tape.len()
    }

    /// Evaluate with arguments in [`symbols`](Self::symbols) order.
    pub fn eval_slice(&self, args: &[f64]) -> Result<DMatrix<f64>, EvalError> {
        if args.len() != self.inputs.len() {
            return Err(EvalError::ArityMismatch {
                expected: self.inputs.len(),
                got: args.len(),
            });
        }
        let mut slots: Vec<f64> = Vec::with_capacity(self.tape.len());
        for instr in &self.tape {
            let v = match *instr {
                Instr::Const(v) => v,
                Instr::Input(i) => args[i],
                Instr::Add(a, b) => slots[a] + slots[b],
                Instr::Mul(a, b) => slots[a] * slots[b],
                Instr::Neg(a) => -slots[a],
                Instr::Div(a, b) => div_zero_safe(slots[a], slots[b]),
                Instr::Powf(a, n) => f64::powf(slots[a], n),
                Instr::Sqrt(a) => f64::sqrt(slots[a]),
                Instr::Sin(a) => f64::sin(slots[a]),
                Instr::Cos(a) => f64::cos(slots[a]),
            };
            slots.push(v);
        }
        Ok(DMatrix::from_fn(self.rows, self.cols, |r, c| {
            slots[self.outputs[r * self.cols + c]]
        }))
    }

    /// Evaluate, selecting exactly this function's parameters from `values`.
    ///
    /// A parameter absent from `values` is an error.
    pub fn eval_map(&self, values: &HashMap<String, f64>) -> Result<DMatrix<f64>, EvalError> {
        let args = self
            .inputs
            .iter()
            .map(|s| {
                values
                    .get(s.name())
                    .copied()
                    .ok_or_else(|| EvalError::MissingObservable(s.name().to_string()))
            })
            .collect::<Result<Vec<f64>, _>>()?;
        self.eval_slice(&args)
    }
}

struct TapeBuilder<'a> {
    input_index: &'a HashMap<Symbol, usize>,
    tape: Vec<Instr>,
    /// Node identity -> slot.
    slots: HashMap<usize, usize>,
    /// Constant bit pattern -> slot.
    constants: HashMap<u64, usize>,
}

impl TapeBuilder<'_> {
    fn push(&mut self, instr: Instr) -> usize {
        self.tape.push(instr);
        self.tape.len() - 1
    }

    fn emit(&mut self, e: &Expr) -> usize {
        if let Some(&slot) = self.slots.get(&e.id()) {
            return slot;
        }
        let slot = match e.node() {
            Node::Const(v) => {
                let bits = v.to_bits();
                if let Some(&slot) = self.constants.get(&bits) {
                    slot
                } else {
                    let slot = self.push(Instr::Const(*v));
                    self.constants.insert(bits, slot);
                    slot
                }
            }
            Node::Symbol(s) => {
                // Every free symbol was collected up front.
                let index = self.input_index[s];
                self.push(Instr::Input(index))
            }
            Node::Add(a, b) => {
                let (a, b) = (self.emit(a), self.emit(b));
                self.push(Instr::Add(a, b))
            }
            Node::Mul(a, b) => {
                let (a, b) = (self.emit(a), self.emit(b));
                self.push(Instr::Mul(a, b))
            }
            Node::Div(a, b) => {
                let (a, b) = (self.emit(a), self.emit(b));
                self.push(Instr::Div(a, b))
            }
            Node::Neg(a) => {
                let a = self.emit(a);
                self.push(Instr::Neg(a))
            }
            Node::Powf(a, n) => {
                let a = self.emit(a);
                self.push(Instr::Powf(a, *n))
            }
            Node::Sqrt(a) => {
                let a = self.emit(a);
                self.push(Instr::Sqrt(a))
            }
            Node::Sin(a) => {
                let a = self.emit(a);
                self.push(Instr::Sin(a))
            }
            Node::Cos(a) => {
                let a = self.emit(a);
                self.push(Instr::Cos(a))
            }
        };
        self.slots.insert(e.id(), slot);
        slot
    }
}

/// Symbols referenced by any of `functions`, without duplicates.
pub fn union_symbols<'a>(functions: impl IntoIterator<Item = &'a CompiledFunction>) -> Vec<Symbol> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for f in functions {
        for s in f.symbols() {
            if seen.insert(s.clone()) {
                out.push(s.clone());
            }
        }
    }
    out.sort();
    out
}
