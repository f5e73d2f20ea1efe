//! Sequence views the matcher runs over.
//!
//! The same matcher tree works on expression leaves and on the character
//! view of a string extent; the view decides what an "item" is, how literal
//! comparisons work, and what a multi-item capture looks like.

use std::sync::Arc;

use crate::atoms::Str;
use crate::expr::{self, Expr, ExprRef, Expression};
use crate::symbol::SymbolRef;

/// How a multi-item capture is packaged when bound to a variable.
#[derive(Clone)]
pub enum CaptureMode {
    /// Multi-item captures wrap in `Sequence[…]`.
    Sequence(SymbolRef),
    /// Under a `Flat` head, multi-item captures wrap in the head itself;
    /// with `OneIdentity` a single item stays bare.
    Flat {
        head: SymbolRef,
        one_identity: bool,
    },
    /// String captures are substring views sharing the extent.
    Chars,
}

pub trait MatchSeq {
    fn len(&self) -> usize;

    /// Boxed item at `i` (packed slices and characters materialize).
    fn item(&self, i: usize) -> ExprRef;

    /// Structural comparison of item `i` against a literal.
    fn same_at(&self, i: usize, literal: &Expr, ignore_case: bool) -> bool;

    /// Whether item `i`'s head equals the given head expression. Character
    /// sequences have no heads to constrain.
    fn head_matches_at(&self, i: usize, head: &Expr) -> bool {
        head_matches(&self.item(i), head)
    }

    /// Package `[begin, end)` for variable binding.
    fn capture(&self, begin: usize, end: usize, mode: &CaptureMode) -> ExprRef;

    /// Word boundary before item `i` (string views only).
    fn word_boundary(&self, _i: usize) -> bool {
        false
    }

    /// Compare a literal character run starting at `begin` (string views
    /// only; expression views never match string literals as runs).
    fn literal_run(&self, _begin: usize, _literal: &Str, _ignore_case: bool) -> bool {
        false
    }
}

pub(crate) fn wrap_items(items: Vec<ExprRef>, mode: &CaptureMode) -> ExprRef {
    match mode {
        CaptureMode::Sequence(seq) => {
            if items.len() == 1 {
                items.into_iter().next().expect("one item")
            } else {
                expr::expression(expr::symbol(Arc::clone(seq)), items)
            }
        }
        CaptureMode::Flat { head, one_identity } => {
            if items.len() == 1 && *one_identity {
                items.into_iter().next().expect("one item")
            } else {
                expr::expression(expr::symbol(Arc::clone(head)), items)
            }
        }
        CaptureMode::Chars => unreachable!("character capture handled by the view"),
    }
}

/// View over the leaves of an expression.
pub struct LeafSeq<'a> {
    expr: &'a Expression,
}

impl<'a> LeafSeq<'a> {
    pub fn new(expr: &'a Expression) -> LeafSeq<'a> {
        LeafSeq { expr }
    }
}

impl MatchSeq for LeafSeq<'_> {
    fn len(&self) -> usize {
        self.expr.size()
    }

    fn item(&self, i: usize) -> ExprRef {
        self.expr.leaf(i)
    }

    fn same_at(&self, i: usize, literal: &Expr, _ignore_case: bool) -> bool {
        self.expr.leaf(i).same(literal)
    }

    fn capture(&self, begin: usize, end: usize, mode: &CaptureMode) -> ExprRef {
        wrap_items((begin..end).map(|i| self.expr.leaf(i)).collect(), mode)
    }
}

/// View over a single expression, for matching an item in isolation
/// (rule left-hand sides, heads of compounds).
pub struct SingleSeq<'a> {
    item: &'a ExprRef,
}

impl<'a> SingleSeq<'a> {
    pub fn new(item: &'a ExprRef) -> SingleSeq<'a> {
        SingleSeq { item }
    }
}

impl MatchSeq for SingleSeq<'_> {
    fn len(&self) -> usize {
        1
    }

    fn item(&self, _i: usize) -> ExprRef {
        Arc::clone(self.item)
    }

    fn same_at(&self, _i: usize, literal: &Expr, _ignore_case: bool) -> bool {
        self.item.same(literal)
    }

    fn capture(&self, begin: usize, end: usize, mode: &CaptureMode) -> ExprRef {
        if begin == end {
            wrap_items(Vec::new(), mode)
        } else {
            Arc::clone(self.item)
        }
    }
}

/// Character view over a string extent.
pub struct CharSeq<'a> {
    s: &'a Str,
}

impl<'a> CharSeq<'a> {
    pub fn new(s: &'a Str) -> CharSeq<'a> {
        CharSeq { s }
    }
}

impl MatchSeq for CharSeq<'_> {
    fn len(&self) -> usize {
        self.s.len()
    }

    fn item(&self, i: usize) -> ExprRef {
        expr::string_value(self.s.substr(i, i + 1))
    }

    fn same_at(&self, i: usize, literal: &Expr, ignore_case: bool) -> bool {
        match literal {
            Expr::String(text) if text.len() == 1 => {
                let a = self.s.char_at(i);
                let b = text.char_at(0);
                if ignore_case {
                    a.eq_ignore_case(&b)
                } else {
                    a == b
                }
            }
            _ => false,
        }
    }

    fn head_matches_at(&self, _i: usize, _head: &Expr) -> bool {
        false
    }

    fn capture(&self, begin: usize, end: usize, _mode: &CaptureMode) -> ExprRef {
        expr::string_value(self.s.substr(begin, end))
    }

    fn word_boundary(&self, i: usize) -> bool {
        self.s.word_boundary_at(i)
    }

    fn literal_run(&self, begin: usize, literal: &Str, ignore_case: bool) -> bool {
        chars_match_literal(self.s, begin, literal, ignore_case)
    }
}

/// Compare a literal string against characters `[begin, begin + len)`.
pub fn chars_match_literal(
    seq: &Str,
    begin: usize,
    literal: &Str,
    ignore_case: bool,
) -> bool {
    if begin + literal.len() > seq.len() {
        return false;
    }
    (0..literal.len()).all(|j| {
        let a = seq.char_at(begin + j);
        let b = literal.char_at(j);
        if ignore_case {
            a.eq_ignore_case(&b)
        } else {
            a == b
        }
    })
}

/// Canonical head name of an atom, for `Blank[h]` constraints.
pub fn atom_head_name(item: &Expr) -> &'static str {
    match item {
        Expr::MachineInteger(_) | Expr::BigInteger(_) => "Integer",
        Expr::BigRational(_) => "Rational",
        Expr::MachineReal(_) | Expr::BigReal(_) => "Real",
        Expr::MachineComplex(_) | Expr::BigComplex(_) => "Complex",
        Expr::String(_) => "String",
        Expr::Symbol(_) => "Symbol",
        Expr::Expression(_) => unreachable!("expressions carry their own head"),
    }
}

/// Whether `item`'s head equals the given head expression.
pub fn head_matches(item: &Expr, head: &Expr) -> bool {
    match item {
        Expr::Expression(e) => e.head().same(head),
        _ => head.is_system(atom_head_name(item)),
    }
}
