//! The expression data model.
//!
//! An expression is either an atom or `head[leaf₁, …, leafₙ]`. Values are
//! immutable and shared through reference-counted handles; "mutation" always
//! builds a new expression. The kind tag is the single source of truth for
//! downcasts.

mod construct;
pub mod slice;

pub use construct::*;
pub use slice::{Slice, SliceIter, TypeMask, MAX_TINY_SIZE, MIN_PACKED_SIZE};

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use num_complex::Complex64;
use once_cell::sync::OnceCell;

use crate::atoms::{BigComplexAtom, BigIntegerAtom, BigRationalAtom, BigRealAtom, Str};
use crate::hash::{
    hash_combine, hash_machine_real, hash_pair, SEED_EXPRESSION, SEED_MACHINE_COMPLEX,
    SEED_MACHINE_INTEGER,
};
use crate::symbol::{Symbol, SymbolRef};

/// Discriminating kind tag; the bit positions define the type-mask layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Kind {
    MachineInteger = 0,
    BigInteger = 1,
    BigRational = 2,
    MachineReal = 3,
    BigReal = 4,
    MachineComplex = 5,
    BigComplex = 6,
    String = 7,
    Symbol = 8,
    Expression = 9,
}

pub enum Expr {
    MachineInteger(i64),
    BigInteger(BigIntegerAtom),
    BigRational(BigRationalAtom),
    MachineReal(f64),
    BigReal(BigRealAtom),
    MachineComplex(Complex64),
    BigComplex(BigComplexAtom),
    String(Str),
    Symbol(SymbolRef),
    Expression(Expression),
}

pub type ExprRef = Arc<Expr>;

/// Idempotently populated per-expression caches. Two racing threads may both
/// compute; the first result is retained and both are equivalent.
#[derive(Default)]
pub struct ExpressionCache {
    pub matcher: OnceCell<Arc<crate::pattern::compile::CompiledPattern>>,
    pub string_matcher: OnceCell<Arc<crate::pattern::compile::CompiledPattern>>,
    pub symbolic: OnceCell<Option<crate::symbolic::SymbolicForm>>,
    pub slot_function: OnceCell<Arc<crate::pattern::rewrite::SlotFunction>>,
}

const MASK_INIT: u32 = 1 << 31;
const MASK_EXACT: u32 = 1 << 30;

pub struct Expression {
    head: ExprRef,
    slice: Slice,
    mask: AtomicU32,
    hash: OnceCell<u64>,
    cache: OnceCell<Arc<ExpressionCache>>,
}

impl Expression {
    pub fn new(head: ExprRef, slice: Slice) -> Expression {
        Expression {
            head,
            slice,
            mask: AtomicU32::new(0),
            hash: OnceCell::new(),
            cache: OnceCell::new(),
        }
    }

    pub fn head(&self) -> &ExprRef {
        &self.head
    }

    pub fn size(&self) -> usize {
        self.slice.len()
    }

    pub fn leaf(&self, i: usize) -> ExprRef {
        self.slice.leaf(i)
    }

    pub fn slice(&self) -> &Slice {
        &self.slice
    }

    pub fn leaves(&self) -> SliceIter<'_> {
        self.slice.iter()
    }

    /// The head symbol, when the head is a plain symbol.
    pub fn head_symbol(&self) -> Option<&SymbolRef> {
        match self.head.as_ref() {
            Expr::Symbol(s) => Some(s),
            _ => None,
        }
    }

    /// The cached type mask; computed exactly on first query.
    pub fn type_mask(&self) -> TypeMask {
        let raw = self.mask.load(Ordering::Acquire);
        if raw & MASK_INIT != 0 {
            return TypeMask {
                bits: (raw & 0xffff) as u16,
                exact: raw & MASK_EXACT != 0,
            };
        }
        let mask = self.slice.compute_mask();
        self.store_mask(mask);
        mask
    }

    /// Seeds the mask cache with a possibly conservative superset.
    pub fn init_type_mask(&self, mask: TypeMask) {
        self.store_mask(mask);
    }

    fn store_mask(&self, mask: TypeMask) {
        let mut raw = MASK_INIT | mask.bits as u32;
        if mask.exact {
            raw |= MASK_EXACT;
        }
        self.mask.store(raw, Ordering::Release);
    }

    /// The exact mask, scanning if the cached one is conservative.
    pub fn exact_type_mask(&self) -> TypeMask {
        let mask = self.type_mask();
        if mask.exact {
            mask
        } else {
            let exact = self.slice.compute_mask();
            self.store_mask(exact);
            exact
        }
    }

    pub fn hash(&self) -> u64 {
        *self.hash.get_or_init(|| {
            let mut h = hash_combine(SEED_EXPRESSION, self.size() as u64);
            h = hash_combine(h, self.head.hash());
            for leaf in self.leaves() {
                h = hash_combine(h, leaf.hash());
            }
            h
        })
    }

    pub fn same(&self, other: &Expression) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        if self.size() != other.size() || !self.head.same(&other.head) {
            return false;
        }
        match (self.slice.as_packed_ints(), other.slice.as_packed_ints()) {
            (Some(a), Some(b)) => return a == b,
            _ => {}
        }
        (0..self.size()).all(|i| self.leaf(i).same(&other.leaf(i)))
    }

    pub fn cache(&self) -> &ExpressionCache {
        self.cache.get_or_init(|| Arc::new(ExpressionCache::default()))
    }

    /// A new expression over `[begin, end)` of this one's leaves, with the
    /// storage strategy re-chosen for the new size.
    pub fn slice_range(&self, head: ExprRef, begin: usize, end: usize) -> Expression {
        let end = end.min(self.size());
        let begin = begin.min(end);
        let slice = match &self.slice {
            Slice::PackedInt(v) if end - begin >= MIN_PACKED_SIZE => {
                Slice::PackedInt(Arc::new(v[begin..end].to_vec()))
            }
            Slice::PackedReal(v) if end - begin >= MIN_PACKED_SIZE => {
                Slice::PackedReal(Arc::new(v[begin..end].to_vec()))
            }
            _ => Slice::from_leaves((begin..end).map(|i| self.leaf(i)).collect()),
        };
        Expression::new(head, slice)
    }

    /// Dense reference vector for consumers that need uniform random access.
    pub fn materialize(&self) -> Vec<ExprRef> {
        self.slice.materialize().into_owned()
    }

    /// True when this is `head_name[… n leaves …]` with a System head.
    pub fn has_form(&self, head_name: &str, n: usize) -> bool {
        self.size() == n
            && self
                .head_symbol()
                .is_some_and(|s| is_system_symbol(s, head_name))
    }
}

impl std::fmt::Debug for Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}[", self.head)?;
        for (i, leaf) in self.leaves().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", leaf)?;
        }
        write!(f, "]")
    }
}

/// Whether `sym` is the System symbol with the given short name.
pub fn is_system_symbol(sym: &Symbol, short: &str) -> bool {
    sym.name().strip_prefix("System`") == Some(short)
}

/// Heads whose expressions are pattern constructs: such expressions have no
/// match hash, because structurally unequal subjects can still match them.
const PATTERN_HEADS: &[&str] = &[
    "Blank",
    "BlankSequence",
    "BlankNullSequence",
    "Pattern",
    "Alternatives",
    "Repeated",
    "RepeatedNull",
    "Except",
    "OptionsPattern",
    "Optional",
    "Condition",
    "PatternTest",
    "Verbatim",
    "HoldPattern",
    "Shortest",
    "Longest",
    "OptionValue",
    "StringExpression",
];

impl Expr {
    pub fn kind(&self) -> Kind {
        match self {
            Expr::MachineInteger(_) => Kind::MachineInteger,
            Expr::BigInteger(_) => Kind::BigInteger,
            Expr::BigRational(_) => Kind::BigRational,
            Expr::MachineReal(_) => Kind::MachineReal,
            Expr::BigReal(_) => Kind::BigReal,
            Expr::MachineComplex(_) => Kind::MachineComplex,
            Expr::BigComplex(_) => Kind::BigComplex,
            Expr::String(_) => Kind::String,
            Expr::Symbol(_) => Kind::Symbol,
            Expr::Expression(_) => Kind::Expression,
        }
    }

    /// Structural equality; bit-exact on inexact kinds (`SameQ`).
    pub fn same(&self, other: &Expr) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        match (self, other) {
            (Expr::MachineInteger(a), Expr::MachineInteger(b)) => a == b,
            (Expr::BigInteger(a), Expr::BigInteger(b)) => a == b,
            (Expr::BigRational(a), Expr::BigRational(b)) => a == b,
            (Expr::MachineReal(a), Expr::MachineReal(b)) => a.to_bits() == b.to_bits(),
            (Expr::BigReal(a), Expr::BigReal(b)) => a.same(b),
            (Expr::MachineComplex(a), Expr::MachineComplex(b)) => {
                a.re.to_bits() == b.re.to_bits() && a.im.to_bits() == b.im.to_bits()
            }
            (Expr::BigComplex(a), Expr::BigComplex(b)) => a == b,
            (Expr::String(a), Expr::String(b)) => a.same(b),
            (Expr::Symbol(a), Expr::Symbol(b)) => Arc::ptr_eq(a, b),
            (Expr::Expression(a), Expr::Expression(b)) => a.same(b),
            _ => false,
        }
    }

    /// Stable structural hash. `same(a, b)` implies `hash(a) == hash(b)`.
    pub fn hash(&self) -> u64 {
        match self {
            Expr::MachineInteger(v) => hash_pair(SEED_MACHINE_INTEGER, *v as u64),
            Expr::BigInteger(v) => v.hash(),
            Expr::BigRational(v) => v.hash(),
            Expr::MachineReal(v) => hash_machine_real(*v),
            Expr::BigReal(v) => v.hash(),
            Expr::MachineComplex(v) => hash_combine(
                hash_combine(SEED_MACHINE_COMPLEX, hash_machine_real(v.re)),
                hash_machine_real(v.im),
            ),
            Expr::BigComplex(v) => v.hash(),
            Expr::String(v) => v.hash(),
            Expr::Symbol(v) => v.hash(),
            Expr::Expression(v) => v.hash(),
        }
    }

    /// A hash usable to veto rule application: `None` when this is (or
    /// contains) a pattern construct, otherwise equal to `hash()`.
    pub fn match_hash(&self) -> Option<u64> {
        match self {
            Expr::Expression(e) => {
                if let Some(head_sym) = e.head_symbol() {
                    let short = head_sym.name().strip_prefix("System`");
                    if let Some(short) = short {
                        if PATTERN_HEADS.contains(&short) {
                            return None;
                        }
                    }
                }
                let mut h = hash_combine(SEED_EXPRESSION, e.size() as u64);
                h = hash_combine(h, e.head().match_hash()?);
                for leaf in e.leaves() {
                    h = hash_combine(h, leaf.match_hash()?);
                }
                Some(h)
            }
            _ => Some(self.hash()),
        }
    }

    pub fn as_expression(&self) -> Option<&Expression> {
        match self {
            Expr::Expression(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&SymbolRef> {
        match self {
            Expr::Symbol(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_string(&self) -> Option<&Str> {
        match self {
            Expr::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_machine_integer(&self) -> Option<i64> {
        match self {
            Expr::MachineInteger(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_number(&self) -> bool {
        matches!(
            self.kind(),
            Kind::MachineInteger
                | Kind::BigInteger
                | Kind::BigRational
                | Kind::MachineReal
                | Kind::BigReal
                | Kind::MachineComplex
                | Kind::BigComplex
        )
    }

    /// Inexact kinds: machine/big reals and machine complex.
    pub fn is_inexact(&self) -> bool {
        matches!(
            self.kind(),
            Kind::MachineReal | Kind::BigReal | Kind::MachineComplex
        )
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::MachineInteger(0))
    }

    pub fn is_one(&self) -> bool {
        matches!(self, Expr::MachineInteger(1))
    }

    pub fn is_minus_one(&self) -> bool {
        matches!(self, Expr::MachineInteger(-1))
    }

    pub fn is_system(&self, short: &str) -> bool {
        match self {
            Expr::Symbol(s) => is_system_symbol(s, short),
            _ => false,
        }
    }

    pub fn is_true(&self) -> bool {
        self.is_system("True")
    }

    /// `Sequence[…]` detection for splicing.
    pub fn is_sequence(&self) -> bool {
        match self {
            Expr::Expression(e) => e
                .head_symbol()
                .is_some_and(|s| is_system_symbol(s, "Sequence")),
            _ => false,
        }
    }

    pub fn is_negative(&self) -> bool {
        match self {
            Expr::MachineInteger(v) => *v < 0,
            Expr::BigInteger(v) => v.is_negative(),
            Expr::BigRational(v) => v.is_negative(),
            Expr::MachineReal(v) => *v < 0.0,
            Expr::BigReal(v) => v.is_negative(),
            Expr::Expression(e) => {
                e.size() >= 1
                    && e.head_symbol().is_some_and(|s| is_system_symbol(s, "Times"))
                    && e.leaf(0).is_negative()
            }
            _ => false,
        }
    }

    /// Whether a numeric value can be computed: numbers, and expressions
    /// whose head is a numeric function over numeric leaves.
    pub fn is_numeric(&self) -> bool {
        match self {
            Expr::Expression(e) => {
                e.head_symbol().is_some_and(|s| {
                    s.has_attribute(crate::symbol::Attributes::NUMERIC_FUNCTION)
                }) && e.leaves().all(|l| l.is_numeric())
            }
            Expr::Symbol(s) => s.has_attribute(crate::symbol::Attributes::CONSTANT),
            _ => self.is_number(),
        }
    }

    pub fn round_to_f64(&self) -> Option<f64> {
        match self {
            Expr::MachineInteger(v) => Some(*v as f64),
            Expr::BigInteger(v) => Some(v.to_f64()),
            Expr::BigRational(v) => Some(v.to_f64()),
            Expr::MachineReal(v) => Some(*v),
            Expr::BigReal(v) => Some(v.as_f64()),
            _ => None,
        }
    }
}

impl std::fmt::Display for Expr {
    /// The raw structural form (`head[leaf, …]`), independent of format
    /// rules. The `format` module produces the user-facing rendering.
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Expr::MachineInteger(v) => write!(f, "{}", v),
            Expr::BigInteger(v) => write!(f, "{}", v.value),
            Expr::BigRational(v) => write!(f, "{}/{}", v.value.numer(), v.value.denom()),
            Expr::MachineReal(v) => write!(f, "{}", crate::format::format_f64(*v)),
            Expr::BigReal(v) => write!(f, "{}", v.to_decimal_string()),
            Expr::MachineComplex(v) => {
                write!(
                    f,
                    "Complex[{}, {}]",
                    crate::format::format_f64(v.re),
                    crate::format::format_f64(v.im)
                )
            }
            Expr::BigComplex(v) => write!(f, "Complex[{}/{}, {}/{}]",
                v.re.numer(), v.re.denom(), v.im.numer(), v.im.denom()),
            Expr::String(v) => write!(f, "\"{}\"", v),
            Expr::Symbol(v) => write!(f, "{}", v.short_name()),
            Expr::Expression(e) => {
                write!(f, "{}[", e.head())?;
                for (i, leaf) in e.leaves().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", leaf)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl std::fmt::Debug for Expr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for Expr {}

impl std::hash::Hash for Expr {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(Expr::hash(self));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr;

    #[test]
    fn kind_tags_agree_with_variants() {
        assert_eq!(expr::integer_i64(3).kind(), Kind::MachineInteger);
        assert_eq!(expr::real(1.5).kind(), Kind::MachineReal);
        assert_eq!(expr::string("x").kind(), Kind::String);
    }

    #[test]
    fn structural_equality_implies_hash_equality() {
        let a = expr::integer_i64(42);
        let b = expr::integer_i64(42);
        assert!(a.same(&b));
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn expression_hash_is_cached_and_stable() {
        let sym = Symbol::create("Global`f");
        let e1 = expr::expression(
            expr::symbol(Arc::clone(&sym)),
            vec![expr::integer_i64(1), expr::integer_i64(2)],
        );
        let e2 = expr::expression(
            expr::symbol(sym),
            vec![expr::integer_i64(1), expr::integer_i64(2)],
        );
        assert!(e1.same(&e2));
        assert_eq!(e1.hash(), e2.hash());
    }

    #[test]
    fn type_mask_is_lazy_and_exact() {
        let sym = Symbol::create("Global`f");
        let e = expr::expression(
            expr::symbol(sym),
            vec![expr::integer_i64(1), expr::real(2.0)],
        );
        let e = e.as_expression().expect("expression");
        let mask = e.type_mask();
        assert!(mask.exact);
        assert!(mask.contains(Kind::MachineInteger));
        assert!(mask.contains(Kind::MachineReal));
        assert!(!mask.contains(Kind::String));
    }

    #[test]
    fn match_hash_absent_for_patterns() {
        let blank_sym = Symbol::create("System`Blank");
        let blank = expr::expression(expr::symbol(blank_sym), vec![]);
        assert!(blank.match_hash().is_none());

        let f = Symbol::create("Global`f");
        let wrapping = expr::expression(expr::symbol(f), vec![blank]);
        assert!(wrapping.match_hash().is_none());
    }

    #[test]
    fn match_hash_equals_hash_for_literals() {
        let f = Symbol::create("Global`f");
        let e = expr::expression(expr::symbol(f), vec![expr::integer_i64(7)]);
        assert_eq!(e.match_hash(), Some(e.hash()));
    }

    #[test]
    fn slice_range_rechooses_strategy() {
        let f = Symbol::create("Global`f");
        let head = expr::symbol(Arc::clone(&f));
        let e = expr::expression(Arc::clone(&head), (0..20).map(expr::integer_i64).collect());
        let e = e.as_expression().expect("expression");
        let sub = e.slice_range(head, 2, 5);
        assert_eq!(sub.size(), 3);
        assert!(sub.leaf(0).same(&expr::integer_i64(2)));
        assert!(matches!(sub.slice(), Slice::Tiny(_)));
    }

    #[test]
    fn negative_times_is_negative() {
        let times = Symbol::create("System`Times");
        let e = expr::expression(
            expr::symbol(times),
            vec![expr::integer_i64(-2), expr::integer_i64(3)],
        );
        assert!(e.is_negative());
    }
}
