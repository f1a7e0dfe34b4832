//! Symbolic expressions over SSA values.
//!
//! A [`SymExpr`] describes how a value is computed from constants, opaque SSA
//! values and affine recurrences. Arithmetic is two's complement on `i128`; all
//! constructors here keep expressions in a canonical form so that structurally
//! equal expressions denote the same value:
//!
//! - sums are flattened, like terms are combined and terms with a zero coefficient
//!   dropped, and terms are sorted
//! - a sum with no terms is a constant, a sum of a single term with coefficient one
//!   and no constant is that term
//! - products are flattened and sorted and never contain constants
//!
//! Folding that depends on loop structure (merging recurrences, absorbing
//! invariant terms into a recurrence's start) lives in
//! [`ScalarEvolution`](crate::analysis::scev::ScalarEvolution).

use std::fmt;

use crate::{
    analysis::ssa::{mask_bits, SsaVarId},
    utils::graph::NodeId,
};

/// A symbolic expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SymExpr {
    /// A known constant.
    Constant(i128),
    /// An SSA value nothing more is known about.
    Value(SsaVarId),
    /// The low `bits` bits of `operand`, read as an unsigned number.
    ZeroExtend {
        /// Expression being extended.
        operand: Box<SymExpr>,
        /// Width of the source value.
        bits: u32,
    },
    /// Product of at least two non-constant factors.
    Product(Vec<SymExpr>),
    /// `constant + Σ coefficient * term`.
    Sum {
        /// Constant part.
        constant: i128,
        /// Non-constant terms with their coefficients.
        terms: Vec<(SymExpr, i128)>,
    },
    /// Affine recurrence of the loop headed by `header`: `start` on the first
    /// iteration, increased by `step` on every following one.
    AddRec {
        /// Value on the first iteration.
        start: Box<SymExpr>,
        /// Increment per iteration.
        step: Box<SymExpr>,
        /// Header of the loop the recurrence belongs to.
        header: NodeId,
    },
}

impl SymExpr {
    /// The constant zero.
    pub const ZERO: SymExpr = SymExpr::Constant(0);

    /// Returns the constant value of the expression, if it is one.
    #[must_use]
    pub const fn as_constant(&self) -> Option<i128> {
        match self {
            Self::Constant(c) => Some(*c),
            _ => None,
        }
    }

    /// Returns `true` for the constant zero.
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        matches!(self, Self::Constant(0))
    }

    /// Returns `(start, step, header)` for a recurrence.
    #[must_use]
    pub fn as_add_rec(&self) -> Option<(&SymExpr, &SymExpr, NodeId)> {
        match self {
            Self::AddRec {
                start,
                step,
                header,
            } => Some((start, step, *header)),
            _ => None,
        }
    }

    /// Splits the expression into its constant part and its weighted terms.
    #[must_use]
    pub fn linear_terms(&self) -> (i128, Vec<(SymExpr, i128)>) {
        match self {
            Self::Constant(c) => (*c, Vec::new()),
            Self::Sum { constant, terms } => (*constant, terms.clone()),
            other => (0, vec![(other.clone(), 1)]),
        }
    }

    /// Builds the canonical expression for `constant + Σ coefficient * term`.
    ///
    /// Terms that are themselves sums or constants are flattened.
    #[must_use]
    pub fn from_terms(constant: i128, terms: Vec<(SymExpr, i128)>) -> SymExpr {
        let mut constant = constant;
        let mut flat: Vec<(SymExpr, i128)> = Vec::with_capacity(terms.len());
        for (term, coefficient) in terms {
            match term {
                Self::Constant(c) => constant = constant.wrapping_add(c.wrapping_mul(coefficient)),
                Self::Sum {
                    constant: inner,
                    terms: inner_terms,
                } => {
                    constant = constant.wrapping_add(inner.wrapping_mul(coefficient));
                    flat.extend(
                        inner_terms
                            .into_iter()
                            .map(|(t, k)| (t, k.wrapping_mul(coefficient))),
                    );
                }
                other => flat.push((other, coefficient)),
            }
        }

        flat.sort_by(|a, b| a.0.cmp(&b.0));
        let mut combined: Vec<(SymExpr, i128)> = Vec::with_capacity(flat.len());
        for (term, coefficient) in flat {
            match combined.last_mut() {
                Some((last, k)) if *last == term => *k = k.wrapping_add(coefficient),
                _ => combined.push((term, coefficient)),
            }
        }
        combined.retain(|(_, k)| *k != 0);

        match combined.len() {
            0 => Self::Constant(constant),
            1 if constant == 0 && combined[0].1 == 1 => combined.remove(0).0,
            _ => Self::Sum {
                constant,
                terms: combined,
            },
        }
    }

    /// Multiplies the expression by a constant.
    #[must_use]
    pub fn scale(&self, factor: i128) -> SymExpr {
        match (self, factor) {
            (_, 0) => Self::ZERO,
            (_, 1) => self.clone(),
            (Self::Constant(c), k) => Self::Constant(c.wrapping_mul(k)),
            (Self::Sum { constant, terms }, k) => Self::from_terms(
                constant.wrapping_mul(k),
                terms
                    .iter()
                    .map(|(t, c)| (t.clone(), c.wrapping_mul(k)))
                    .collect(),
            ),
            (Self::AddRec {
                start,
                step,
                header,
            }, k) => Self::AddRec {
                start: Box::new(start.scale(k)),
                step: Box::new(step.scale(k)),
                header: *header,
            },
            (other, k) => Self::from_terms(0, vec![(other.clone(), k)]),
        }
    }

    /// Returns `-self`.
    #[must_use]
    pub fn neg(&self) -> SymExpr {
        self.scale(-1)
    }

    /// Reads the low `bits` bits of the expression as an unsigned number.
    ///
    /// Constants are folded.
    #[must_use]
    pub fn zext(&self, bits: u32) -> SymExpr {
        match self.as_constant() {
            Some(c) => Self::Constant(((c as u128) & mask_bits(bits)) as i128),
            None => Self::ZeroExtend {
                operand: Box::new(self.clone()),
                bits,
            },
        }
    }

    /// Builds the canonical product of non-constant factors.
    ///
    /// Nested products are flattened. Returns the single factor for a one-element list.
    #[must_use]
    pub fn product(factors: Vec<SymExpr>) -> SymExpr {
        let mut flat = Vec::with_capacity(factors.len());
        for factor in factors {
            match factor {
                Self::Product(inner) => flat.extend(inner),
                other => flat.push(other),
            }
        }
        flat.sort();
        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Self::Product(flat)
        }
    }

    /// Returns `true` if `var` occurs anywhere in the expression.
    #[must_use]
    pub fn contains_value(&self, var: SsaVarId) -> bool {
        let mut found = false;
        self.visit(&mut |e| {
            if *e == Self::Value(var) {
                found = true;
            }
        });
        found
    }

    /// Returns every opaque value the expression refers to.
    #[must_use]
    pub fn values(&self) -> Vec<SsaVarId> {
        let mut values = Vec::new();
        self.visit(&mut |e| {
            if let Self::Value(v) = e {
                if !values.contains(v) {
                    values.push(*v);
                }
            }
        });
        values
    }

    /// Calls `f` on this expression and every subexpression, parents first.
    pub fn visit<F: FnMut(&SymExpr)>(&self, f: &mut F) {
        f(self);
        match self {
            Self::Constant(_) | Self::Value(_) => {}
            Self::ZeroExtend { operand, .. } => operand.visit(f),
            Self::Product(factors) => factors.iter().for_each(|e| e.visit(f)),
            Self::Sum { terms, .. } => terms.iter().for_each(|(e, _)| e.visit(f)),
            Self::AddRec { start, step, .. } => {
                start.visit(f);
                step.visit(f);
            }
        }
    }
}

impl fmt::Display for SymExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Constant(c) => write!(f, "{}", c),
            Self::Value(v) => write!(f, "{}", v),
            Self::ZeroExtend { operand, bits } => write!(f, "zext.i{}({})", bits, operand),
            Self::Product(factors) => {
                write!(f, "(")?;
                for (i, factor) in factors.iter().enumerate() {
                    if i > 0 {
                        write!(f, " * ")?;
                    }
                    write!(f, "{}", factor)?;
                }
                write!(f, ")")
            }
            Self::Sum { constant, terms } => {
                write!(f, "(")?;
                if *constant != 0 {
                    write!(f, "{}", constant)?;
                }
                for (i, (term, k)) in terms.iter().enumerate() {
                    if i > 0 || *constant != 0 {
                        write!(f, " + ")?;
                    }
                    if *k == 1 {
                        write!(f, "{}", term)?;
                    } else {
                        write!(f, "{} * {}", k, term)?;
                    }
                }
                write!(f, ")")
            }
            Self::AddRec {
                start,
                step,
                header,
            } => write!(f, "{{{},+,{}}}<{}>", start, step, header),
        }
    }
}
