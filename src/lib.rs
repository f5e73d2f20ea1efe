//! A term-rewriting kernel for a Mathematica-style surface language.
//!
//! Expression trees — atoms and `head[leaf, …]` compounds — are repeatedly
//! rewritten using definitions attached to symbols until a fixed point is
//! reached. The crate provides the expression data model, the numeric tower,
//! the pattern compiler and matcher, the rewrite engine, the attribute-driven
//! evaluator, and the concurrency primitives underneath them.
//!
//! The surface-syntax parser and the REPL front end are host collaborators;
//! see [`ExpressionParser`] for the seam.

pub mod atoms;
pub mod concurrent;
pub mod error;
pub mod eval;
pub mod expr;
pub mod format;
pub mod hash;
pub mod numeric;
pub mod pattern;
pub mod sort;
pub mod symbol;
pub mod symbolic;

pub use error::{EvalError, Interrupt, Result};
pub use eval::{
    evaluate, rule_add, DefaultOutput, EvalConfig, Evaluation, NoOutput, Output, TestOutput,
};
pub use expr::{Expr, ExprRef, Expression, Kind};
pub use symbol::table::{Definitions, Symbols};
pub use symbol::{Attributes, RuleKind, SymbolRef};

/// The surface-syntax parser, supplied by the host. The kernel consumes
/// expression trees only.
pub trait ExpressionParser {
    type Error;

    fn parse(&self, text: &str) -> std::result::Result<ExprRef, Self::Error>;
}

/// Interns (creating if needed) a symbol by full name.
pub fn define_symbol(definitions: &Definitions, full_name: &str) -> SymbolRef {
    definitions.lookup(full_name)
}

/// Stores the attribute set on a symbol, recomputing its dispatch class.
pub fn attributes_set(sym: &SymbolRef, attributes: Attributes) -> Result<()> {
    sym.set_attributes(attributes)
}
