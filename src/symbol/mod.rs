//! Symbols and their mutable state.
//!
//! Symbols are globally interned by full name and compared by identity.
//! Everything else about a symbol — attributes, rule tables, messages — is
//! mutable state guarded per symbol. Attribute reads sit on the evaluator's
//! hot path, so they live in an atomic alongside a precomputed dispatch
//! class; the rest sits behind an `RwLock`.

pub mod table;

use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::Arc;

use bitflags::bitflags;
use once_cell::sync::OnceCell;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::error::{EvalError, Result};
use crate::eval::Evaluation;
use crate::expr::{Expr, ExprRef, Expression};
use crate::hash::{hash_bytes, SEED_SYMBOL};
use crate::pattern::compile::CompiledPattern;
use crate::pattern::rewrite::CompiledRewrite;
use crate::pattern::size::MatchSize;
use crate::sort::PatternSortKey;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Attributes: u32 {
        // pattern matching
        const ORDERLESS         = 1 << 0;
        const FLAT              = 1 << 1;
        const ONE_IDENTITY      = 1 << 2;
        const LISTABLE          = 1 << 3;
        // calculus
        const CONSTANT          = 1 << 4;
        const NUMERIC_FUNCTION  = 1 << 5;
        // read/write
        const PROTECTED         = 1 << 6;
        const LOCKED            = 1 << 7;
        const READ_PROTECTED    = 1 << 8;
        // evaluation hold
        const HOLD_FIRST        = 1 << 9;
        const HOLD_REST         = 1 << 10;
        const HOLD_ALL          = 1 << 11;
        const HOLD_ALL_COMPLETE = 1 << 12;
        // numeric hold
        const N_HOLD_FIRST      = 1 << 13;
        const N_HOLD_REST       = 1 << 14;
        const N_HOLD_ALL        = 1 << 15;
        // misc
        const SEQUENCE_HOLD     = 1 << 16;
        const TEMPORARY         = 1 << 17;
        const STUB              = 1 << 18;
    }
}

impl Attributes {
    const HOLD_MASK: Attributes = Attributes::HOLD_FIRST
        .union(Attributes::HOLD_REST)
        .union(Attributes::HOLD_ALL)
        .union(Attributes::HOLD_ALL_COMPLETE);

    /// The hold attributes are mutually exclusive.
    pub fn hold_mode_valid(&self) -> bool {
        self.intersection(Attributes::HOLD_MASK).bits().count_ones() <= 1
    }
}

/// Index into the evaluator's table of precompiled leaf-evaluation
/// strategies, derived from the full attribute set on every store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DispatchClass {
    None = 0,
    HoldFirst,
    HoldRest,
    HoldAll,
    HoldAllComplete,
    ListableNumericFunction,
    Dynamic,
}

impl DispatchClass {
    pub fn pick(attributes: Attributes) -> DispatchClass {
        if attributes == Attributes::empty() {
            DispatchClass::None
        } else if attributes == Attributes::HOLD_FIRST {
            DispatchClass::HoldFirst
        } else if attributes == Attributes::HOLD_REST {
            DispatchClass::HoldRest
        } else if attributes == Attributes::HOLD_ALL {
            DispatchClass::HoldAll
        } else if attributes == Attributes::HOLD_ALL_COMPLETE {
            DispatchClass::HoldAllComplete
        } else if attributes == Attributes::LISTABLE | Attributes::NUMERIC_FUNCTION {
            DispatchClass::ListableNumericFunction
        } else {
            DispatchClass::Dynamic
        }
    }

    fn from_u8(v: u8) -> DispatchClass {
        match v {
            0 => DispatchClass::None,
            1 => DispatchClass::HoldFirst,
            2 => DispatchClass::HoldRest,
            3 => DispatchClass::HoldAll,
            4 => DispatchClass::HoldAllComplete,
            5 => DispatchClass::ListableNumericFunction,
            _ => DispatchClass::Dynamic,
        }
    }
}

/// A built-in evaluator attached to a symbol; consulted before down rules.
/// Returns `Ok(None)` when the built-in declines to rewrite.
pub type BuiltinFn = fn(&Expression, &Evaluation) -> Result<Option<ExprRef>>;

pub struct Symbol {
    name: String,
    /// Byte offset of the short name (after the last `` ` ``).
    short: usize,
    attributes: AtomicU32,
    dispatch: AtomicU8,
    state: RwLock<SymbolState>,
}

pub type SymbolRef = Arc<Symbol>;

impl Symbol {
    pub(crate) fn create(name: &str) -> SymbolRef {
        let short = name.rfind('`').map(|i| i + 1).unwrap_or(0);
        Arc::new(Symbol {
            name: name.to_string(),
            short,
            attributes: AtomicU32::new(0),
            dispatch: AtomicU8::new(DispatchClass::None as u8),
            state: RwLock::new(SymbolState::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn short_name(&self) -> &str {
        &self.name[self.short..]
    }

    pub fn hash(&self) -> u64 {
        hash_bytes(SEED_SYMBOL, self.name.as_bytes())
    }

    pub fn attributes(&self) -> Attributes {
        Attributes::from_bits_truncate(self.attributes.load(Ordering::SeqCst))
    }

    /// Stores the attribute set and recomputes the dispatch class.
    pub fn set_attributes(&self, attributes: Attributes) -> Result<()> {
        if !attributes.hold_mode_valid() {
            return Err(EvalError::TypeMismatch(format!(
                "conflicting hold attributes on {}",
                self.name
            )));
        }
        self.attributes.store(attributes.bits(), Ordering::SeqCst);
        self.dispatch
            .store(DispatchClass::pick(attributes) as u8, Ordering::SeqCst);
        Ok(())
    }

    pub fn add_attributes(&self, extra: Attributes) -> Result<()> {
        self.set_attributes(self.attributes() | extra)
    }

    pub fn has_attribute(&self, attribute: Attributes) -> bool {
        self.attributes().contains(attribute)
    }

    pub fn dispatch_class(&self) -> DispatchClass {
        DispatchClass::from_u8(self.dispatch.load(Ordering::SeqCst))
    }

    pub fn state(&self) -> parking_lot::RwLockReadGuard<'_, SymbolState> {
        self.state.read()
    }

    pub fn state_mut(&self) -> parking_lot::RwLockWriteGuard<'_, SymbolState> {
        self.state.write()
    }

    pub fn own_value(&self) -> Option<ExprRef> {
        self.state.read().own_value.clone()
    }

    pub fn set_own_value(&self, value: Option<ExprRef>) {
        self.state.write().own_value = value;
    }

    pub fn builtin(&self) -> Option<BuiltinFn> {
        self.state.read().builtin
    }

    pub fn set_builtin(&self, f: BuiltinFn) {
        self.state.write().builtin = Some(f);
    }

    pub fn lookup_message(&self, tag: &str) -> Option<String> {
        self.state.read().messages.get(tag).cloned()
    }

    pub fn set_message(&self, tag: &str, template: &str) {
        self.state
            .write()
            .messages
            .insert(tag.to_string(), template.to_string());
    }
}

impl std::fmt::Debug for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Symbol({})", self.name)
    }
}

/// The category a rule is filed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleKind {
    Own,
    Down,
    Up,
    Sub,
    Format,
    N,
    Default,
}

/// A rewrite rule: pattern, right-hand side, and the match metadata the
/// tables use to order and prune.
pub struct Rule {
    pub pattern: ExprRef,
    pub rhs: ExprRef,
    pub key: PatternSortKey,
    pub size: MatchSize,
    /// Set when the pattern has no wildcards: a subject whose hash differs
    /// cannot match, so the rule is skipped without running the matcher.
    pub match_hash: Option<u64>,
    matcher: OnceCell<Arc<CompiledPattern>>,
    rewrite: OnceCell<Arc<CompiledRewrite>>,
}

impl Rule {
    pub fn new(pattern: ExprRef, rhs: ExprRef) -> Rule {
        let key = crate::sort::pattern_sort_key(&pattern);
        let size = crate::pattern::size::rule_subject_size(&pattern);
        let match_hash = pattern.match_hash();
        Rule {
            pattern,
            rhs,
            key,
            size,
            match_hash,
            matcher: OnceCell::new(),
            rewrite: OnceCell::new(),
        }
    }

    /// The compiled matcher, built on first use. Racing threads may both
    /// compile; one result is retained and both are equivalent.
    pub fn matcher(&self) -> Result<Arc<CompiledPattern>> {
        if let Some(m) = self.matcher.get() {
            return Ok(Arc::clone(m));
        }
        let compiled = Arc::new(crate::pattern::compile::compile_pattern(&self.pattern)?);
        Ok(Arc::clone(self.matcher.get_or_init(|| compiled)))
    }

    pub fn rewrite(&self, matcher: &CompiledPattern) -> Arc<CompiledRewrite> {
        Arc::clone(self.rewrite.get_or_init(|| {
            Arc::new(crate::pattern::rewrite::compile_rewrite(
                &self.rhs,
                matcher.variables(),
            ))
        }))
    }
}

impl std::fmt::Debug for Rule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Rule({:?} -> {:?})", self.pattern, self.rhs)
    }
}

/// An ordered rule table: more specific patterns first.
#[derive(Debug, Default)]
pub struct RuleTable {
    rules: Vec<Arc<Rule>>,
}

impl RuleTable {
    /// Inserts keeping specificity order. A rule whose pattern is
    /// structurally identical to an existing one replaces it.
    pub fn add(&mut self, rule: Arc<Rule>) {
        if let Some(existing) = self
            .rules
            .iter_mut()
            .find(|r| r.pattern.same(&rule.pattern))
        {
            *existing = rule;
            return;
        }
        let at = self
            .rules
            .partition_point(|r| r.key <= rule.key);
        self.rules.insert(at, rule);
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    /// Rules in application order, pruned by subject size and match hash.
    pub fn candidates(&self, size: usize, subject_hash: u64) -> Vec<Arc<Rule>> {
        self.rules
            .iter()
            .filter(|r| r.size.contains(size))
            .filter(|r| match r.match_hash {
                Some(h) => h == subject_hash,
                None => true,
            })
            .cloned()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<Rule>> {
        self.rules.iter()
    }
}

/// The mutable per-symbol state.
#[derive(Debug, Default)]
pub struct SymbolState {
    pub own_value: Option<ExprRef>,
    pub down_rules: RuleTable,
    pub up_rules: RuleTable,
    pub sub_rules: RuleTable,
    pub n_rules: RuleTable,
    pub format_rules: RuleTable,
    pub default_rules: RuleTable,
    pub messages: FxHashMap<String, String>,
    pub options: Vec<(SymbolRef, ExprRef)>,
    pub builtin: Option<BuiltinFn>,
}

impl SymbolState {
    pub fn table(&self, kind: RuleKind) -> &RuleTable {
        match kind {
            RuleKind::Own | RuleKind::Down => &self.down_rules,
            RuleKind::Up => &self.up_rules,
            RuleKind::Sub => &self.sub_rules,
            RuleKind::Format => &self.format_rules,
            RuleKind::N => &self.n_rules,
            RuleKind::Default => &self.default_rules,
        }
    }

    pub fn table_mut(&mut self, kind: RuleKind) -> &mut RuleTable {
        match kind {
            RuleKind::Own | RuleKind::Down => &mut self.down_rules,
            RuleKind::Up => &mut self.up_rules,
            RuleKind::Sub => &mut self.sub_rules,
            RuleKind::Format => &mut self.format_rules,
            RuleKind::N => &mut self.n_rules,
            RuleKind::Default => &mut self.default_rules,
        }
    }
}

/// Looks through an expression leaf to the symbol that owns the relevant
/// up-rule table: a symbol itself, or the head symbol of a compound leaf.
pub fn lookup_name(expr: &Expr) -> Option<SymbolRef> {
    match expr {
        Expr::Symbol(s) => Some(Arc::clone(s)),
        Expr::Expression(e) => match e.head().as_ref() {
            Expr::Symbol(s) => Some(Arc::clone(s)),
            _ => None,
        },
        _ => None,
    }
}
