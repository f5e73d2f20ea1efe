//! Lowering pattern expressions to matcher trees.
//!
//! Compilation assigns every `Pattern[x, …]` variable a contiguous slot
//! (repeated occurrences share one), attaches match-size bounds to every
//! node, and rejects malformed patterns up front. String patterns compile
//! through a separate entry that admits only the character-level constructs.

use std::sync::Arc;

use tracing::debug;

use crate::atoms::Str;
use crate::error::{EvalError, Result};
use crate::expr::{Expr, ExprRef};
use crate::pattern::size::MatchSize;
use crate::symbol::SymbolRef;

/// Slot assignment for pattern variables, in first-appearance order.
#[derive(Debug, Default)]
pub struct VariableTable {
    symbols: Vec<SymbolRef>,
}

impl VariableTable {
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn slot_of(&self, sym: &SymbolRef) -> Option<usize> {
        self.symbols.iter().position(|s| Arc::ptr_eq(s, sym))
    }

    pub fn symbols(&self) -> &[SymbolRef] {
        &self.symbols
    }

    fn intern(&mut self, sym: &SymbolRef) -> usize {
        match self.slot_of(sym) {
            Some(slot) => slot,
            None => {
                self.symbols.push(Arc::clone(sym));
                self.symbols.len() - 1
            }
        }
    }
}

pub struct Matcher {
    pub size: MatchSize,
    pub node: Node,
}

pub enum Node {
    /// Structurally equal single item.
    Literal(ExprRef),
    /// A run of characters (string patterns only).
    StringLiteral(Str),
    Blank {
        head: Option<ExprRef>,
    },
    BlankSequence {
        head: Option<ExprRef>,
        can_be_empty: bool,
    },
    Bind {
        slot: usize,
        pattern: Box<Matcher>,
    },
    /// One item that must be an expression: head and leaf sequence match.
    Compound {
        head: Box<Matcher>,
        leaves: Vec<Matcher>,
        /// Set when the pattern head is a literal symbol; drives the
        /// Orderless/Flat behavior read at match time.
        head_symbol: Option<SymbolRef>,
    },
    Alternatives(Vec<Matcher>),
    Repeated {
        pattern: Box<Matcher>,
        min: u64,
        max: Option<u64>,
    },
    Except {
        forbidden: Box<Matcher>,
        accept: Box<Matcher>,
    },
    Test {
        pattern: Box<Matcher>,
        test: ExprRef,
    },
    Condition {
        pattern: Box<Matcher>,
        condition: ExprRef,
    },
    Optional {
        pattern: Box<Matcher>,
        default: Option<ExprRef>,
        /// Slots bound inside `pattern`, filled from the default when the
        /// optional consumes nothing.
        slots: Vec<usize>,
    },
    Options {
        limit: Option<SymbolRef>,
    },
    Verbatim(ExprRef),
    /// Concatenation (string patterns).
    Concat(Vec<Matcher>),
    WordBoundary,
    Shortest(Box<Matcher>),
    Longest(Box<Matcher>),
}

pub struct CompiledPattern {
    pub root: Matcher,
    variables: VariableTable,
}

impl CompiledPattern {
    pub fn variables(&self) -> &VariableTable {
        &self.variables
    }

    pub fn n_slots(&self) -> usize {
        self.variables.len()
    }

    pub fn might_match(&self, n_items: usize) -> bool {
        self.root.size.contains(n_items)
    }
}

fn system_head<'a>(expr: &'a Expr) -> Option<(&'a crate::expr::Expression, &'a str)> {
    let e = expr.as_expression()?;
    let head = e.head_symbol()?;
    let short = head.name().strip_prefix("System`")?;
    Some((e, short))
}

/// Compiles an expression pattern.
pub fn compile_pattern(pattern: &ExprRef) -> Result<CompiledPattern> {
    debug!(pattern = %pattern, "compiling expression pattern");
    let mut variables = VariableTable::default();
    let root = compile_node(pattern, &mut variables)?;
    Ok(CompiledPattern { root, variables })
}

fn compile_node(pattern: &ExprRef, vars: &mut VariableTable) -> Result<Matcher> {
    // wildcard-free subtrees match purely structurally
    if pattern.match_hash().is_some() {
        return Ok(Matcher {
            size: MatchSize::exactly(1),
            node: Node::Literal(Arc::clone(pattern)),
        });
    }

    let (e, short) = match system_head(pattern) {
        Some(pair) => pair,
        None => return compile_compound(pattern, vars),
    };

    let matcher = match short {
        "Blank" => match e.size() {
            0 => blank(None),
            1 => blank(Some(e.leaf(0))),
            n => return Err(EvalError::PatternError(format!("Blank with {} arguments", n))),
        },
        "BlankSequence" | "BlankNullSequence" => {
            let can_be_empty = short == "BlankNullSequence";
            let head = match e.size() {
                0 => None,
                1 => Some(e.leaf(0)),
                n => {
                    return Err(EvalError::PatternError(format!(
                        "{} with {} arguments",
                        short, n
                    )))
                }
            };
            Matcher {
                size: MatchSize::at_least(if can_be_empty { 0 } else { 1 }),
                node: Node::BlankSequence { head, can_be_empty },
            }
        }
        "Pattern" => {
            if e.size() != 2 {
                return Err(EvalError::PatternError(
                    "Pattern requires a name and a pattern".into(),
                ));
            }
            let name = e.leaf(0);
            let sym = match name.as_symbol() {
                Some(s) => Arc::clone(s),
                None => {
                    return Err(EvalError::PatternError(format!(
                        "pattern name {} is not a symbol",
                        name
                    )))
                }
            };
            let slot = vars.intern(&sym);
            let pattern = Box::new(compile_node(&e.leaf(1), vars)?);
            Matcher {
                size: pattern.size,
                node: Node::Bind { slot, pattern },
            }
        }
        "Alternatives" => {
            let mut alternatives = Vec::with_capacity(e.size());
            for leaf in e.leaves() {
                alternatives.push(compile_node(&leaf, vars)?);
            }
            let size = alternatives
                .iter()
                .map(|m| m.size)
                .reduce(|a, b| a.union(&b))
                .unwrap_or(MatchSize::exactly(1));
            Matcher {
                size,
                node: Node::Alternatives(alternatives),
            }
        }
        "Repeated" | "RepeatedNull" => {
            let base_min = if short == "RepeatedNull" { 0 } else { 1 };
            if e.size() == 0 || e.size() > 2 {
                return Err(EvalError::PatternError(format!(
                    "{} requires one or two arguments",
                    short
                )));
            }
            let pattern = Box::new(compile_node(&e.leaf(0), vars)?);
            let (min, max) = if e.size() == 2 {
                repetition_spec(&e.leaf(1), base_min)?
            } else {
                (base_min, None)
            };
            let per = pattern.size;
            let size = MatchSize::between(
                min * per.min().max(1),
                match max {
                    Some(m) => m.saturating_mul(per.max()),
                    None => crate::pattern::size::MATCH_MAX,
                },
            );
            Matcher {
                size,
                node: Node::Repeated { pattern, min, max },
            }
        }
        "Except" => match e.size() {
            1 => {
                let forbidden = Box::new(compile_node(&e.leaf(0), vars)?);
                let accept = Box::new(blank(None));
                Matcher {
                    size: MatchSize::exactly(1),
                    node: Node::Except { forbidden, accept },
                }
            }
            2 => {
                let forbidden = Box::new(compile_node(&e.leaf(0), vars)?);
                let accept = Box::new(compile_node(&e.leaf(1), vars)?);
                Matcher {
                    size: accept.size,
                    node: Node::Except { forbidden, accept },
                }
            }
            n => {
                return Err(EvalError::PatternError(format!(
                    "Except with {} arguments",
                    n
                )))
            }
        },
        "PatternTest" => {
            if e.size() != 2 {
                return Err(EvalError::PatternError("PatternTest requires two arguments".into()));
            }
            let pattern = Box::new(compile_node(&e.leaf(0), vars)?);
            Matcher {
                size: pattern.size,
                node: Node::Test {
                    pattern,
                    test: e.leaf(1),
                },
            }
        }
        "Condition" => {
            if e.size() != 2 {
                return Err(EvalError::PatternError("Condition requires two arguments".into()));
            }
            let pattern = Box::new(compile_node(&e.leaf(0), vars)?);
            Matcher {
                size: pattern.size,
                node: Node::Condition {
                    pattern,
                    condition: e.leaf(1),
                },
            }
        }
        "Optional" => {
            if e.size() == 0 || e.size() > 2 {
                return Err(EvalError::PatternError("Optional requires one or two arguments".into()));
            }
            let before = vars.len();
            let pattern = Box::new(compile_node(&e.leaf(0), vars)?);
            let slots = (before..vars.len()).collect();
            let default = if e.size() == 2 { Some(e.leaf(1)) } else { None };
            Matcher {
                size: MatchSize::between(0, pattern.size.max()),
                node: Node::Optional {
                    pattern,
                    default,
                    slots,
                },
            }
        }
        "OptionsPattern" => {
            let limit = match e.size() {
                0 => None,
                1 => e.leaf(0).as_symbol().map(Arc::clone),
                n => {
                    return Err(EvalError::PatternError(format!(
                        "OptionsPattern with {} arguments",
                        n
                    )))
                }
            };
            Matcher {
                size: MatchSize::at_least(0),
                node: Node::Options { limit },
            }
        }
        "Verbatim" => {
            if e.size() != 1 {
                return Err(EvalError::PatternError("Verbatim requires one argument".into()));
            }
            Matcher {
                size: MatchSize::exactly(1),
                node: Node::Verbatim(e.leaf(0)),
            }
        }
        "HoldPattern" => {
            if e.size() != 1 {
                return Err(EvalError::PatternError("HoldPattern requires one argument".into()));
            }
            compile_node(&e.leaf(0), vars)?
        }
        "Shortest" | "Longest" => {
            if e.size() == 0 || e.size() > 2 {
                return Err(EvalError::PatternError(format!(
                    "{} requires one argument",
                    short
                )));
            }
            let inner = Box::new(compile_node(&e.leaf(0), vars)?);
            let size = inner.size;
            Matcher {
                size,
                node: if short == "Shortest" {
                    Node::Shortest(inner)
                } else {
                    Node::Longest(inner)
                },
            }
        }
        _ => return compile_compound(pattern, vars),
    };

    Ok(matcher)
}

fn blank(head: Option<ExprRef>) -> Matcher {
    Matcher {
        size: MatchSize::exactly(1),
        node: Node::Blank { head },
    }
}

/// `Repeated[p, n]`, `Repeated[p, {n}]`, `Repeated[p, {m, n}]`.
fn repetition_spec(spec: &ExprRef, base_min: u64) -> Result<(u64, Option<u64>)> {
    if let Expr::MachineInteger(n) = spec.as_ref() {
        if *n >= 0 {
            return Ok((base_min, Some(*n as u64)));
        }
    }
    if let Some(list) = spec.as_expression() {
        if list.head().is_system("List") {
            let ints: Vec<i64> = list
                .leaves()
                .filter_map(|l| l.as_machine_integer())
                .collect();
            match (list.size(), ints.len()) {
                (1, 1) if ints[0] >= 0 => return Ok((ints[0] as u64, Some(ints[0] as u64))),
                (2, 2) if ints[0] >= 0 && ints[1] >= ints[0] => {
                    return Ok((ints[0] as u64, Some(ints[1] as u64)))
                }
                _ => {}
            }
        }
    }
    Err(EvalError::PatternError(format!(
        "invalid repetition specification {}",
        spec
    )))
}

fn compile_compound(pattern: &ExprRef, vars: &mut VariableTable) -> Result<Matcher> {
    let e = match pattern.as_expression() {
        Some(e) => e,
        None => {
            // an atom containing no pattern constructs was handled above;
            // reaching here means a bare symbol used as a pattern
            return Ok(Matcher {
                size: MatchSize::exactly(1),
                node: Node::Literal(Arc::clone(pattern)),
            });
        }
    };

    let head = Box::new(compile_node(e.head(), vars)?);
    let head_symbol = e.head_symbol().map(Arc::clone);

    let mut leaves = Vec::with_capacity(e.size());
    for leaf in e.leaves() {
        leaves.push(compile_node(&leaf, vars)?);
    }

    // Under a Flat head a blank generalizes to a sub-sequence capture
    // (wrapped in the head when it binds). The shortest split is tried
    // first, which is what makes `f[x_, y_]` on flat `f[a, b, c]` give
    // `x -> a` rather than `x -> f[a, b]`.
    if let Some(sym) = &head_symbol {
        if sym.has_attribute(crate::symbol::Attributes::FLAT) {
            leaves = leaves.into_iter().map(flat_generalize).collect();
        }
    }

    // Orderless subjects are matched most-specific-pattern-first; the
    // compiled order is the match order.
    if let Some(sym) = &head_symbol {
        if sym.has_attribute(crate::symbol::Attributes::ORDERLESS) {
            let mut keyed: Vec<(crate::sort::PatternSortKey, usize)> = e
                .leaves()
                .enumerate()
                .map(|(i, leaf)| (crate::sort::pattern_sort_key(&leaf), i))
                .collect();
            keyed.sort();
            let mut reordered = Vec::with_capacity(leaves.len());
            let mut taken: Vec<Option<Matcher>> = leaves.into_iter().map(Some).collect();
            for (_, i) in keyed {
                if let Some(m) = taken[i].take() {
                    reordered.push(m);
                }
            }
            leaves = reordered;
        }
    }

    Ok(Matcher {
        size: MatchSize::exactly(1),
        node: Node::Compound {
            head,
            leaves,
            head_symbol,
        },
    })
}

fn flat_generalize(m: Matcher) -> Matcher {
    match m.node {
        Node::Blank { head } => {
            let inner = Matcher {
                size: MatchSize::at_least(1),
                node: Node::BlankSequence {
                    head,
                    can_be_empty: false,
                },
            };
            Matcher {
                size: MatchSize::at_least(1),
                node: Node::Shortest(Box::new(inner)),
            }
        }
        Node::Bind { slot, pattern } => {
            let pattern = Box::new(flat_generalize(*pattern));
            Matcher {
                size: pattern.size,
                node: Node::Bind { slot, pattern },
            }
        }
        node => Matcher { size: m.size, node },
    }
}

/// Compiles a string pattern over the character-level construct subset.
pub fn compile_string_pattern(pattern: &ExprRef) -> Result<CompiledPattern> {
    debug!(pattern = %pattern, "compiling string pattern");
    let mut variables = VariableTable::default();
    let root = compile_string_node(pattern, &mut variables)?;
    Ok(CompiledPattern { root, variables })
}

fn compile_string_node(pattern: &ExprRef, vars: &mut VariableTable) -> Result<Matcher> {
    match pattern.as_ref() {
        Expr::String(s) => {
            return Ok(Matcher {
                size: MatchSize::exactly(s.len() as u64),
                node: Node::StringLiteral(s.clone()),
            })
        }
        Expr::Symbol(sym) => {
            if crate::expr::is_system_symbol(sym, "WordBoundary") {
                return Ok(Matcher {
                    size: MatchSize::exactly(0),
                    node: Node::WordBoundary,
                });
            }
            return Err(EvalError::StringPatternError(format!(
                "{} is not a string pattern",
                sym.short_name()
            )));
        }
        _ => {}
    }

    let (e, short) = system_head(pattern).ok_or_else(|| {
        EvalError::StringPatternError(format!("{} is not a string pattern", pattern))
    })?;

    let matcher = match short {
        "StringExpression" => {
            let mut parts = Vec::with_capacity(e.size());
            for leaf in e.leaves() {
                parts.push(compile_string_node(&leaf, vars)?);
            }
            let size = parts
                .iter()
                .map(|m| m.size)
                .fold(MatchSize::exactly(0), |a, b| a.add(&b));
            Matcher {
                size,
                node: Node::Concat(parts),
            }
        }
        "Blank" => {
            if e.size() != 0 {
                return Err(EvalError::StringPatternError(
                    "head constraints are not valid in string patterns".into(),
                ));
            }
            blank(None)
        }
        "BlankSequence" | "BlankNullSequence" => {
            if e.size() != 0 {
                return Err(EvalError::StringPatternError(
                    "head constraints are not valid in string patterns".into(),
                ));
            }
            let can_be_empty = short == "BlankNullSequence";
            Matcher {
                size: MatchSize::at_least(if can_be_empty { 0 } else { 1 }),
                node: Node::BlankSequence {
                    head: None,
                    can_be_empty,
                },
            }
        }
        "Pattern" => {
            if e.size() != 2 {
                return Err(EvalError::PatternError(
                    "Pattern requires a name and a pattern".into(),
                ));
            }
            let sym = match e.leaf(0).as_symbol() {
                Some(s) => Arc::clone(s),
                None => {
                    return Err(EvalError::PatternError(format!(
                        "pattern name {} is not a symbol",
                        e.leaf(0)
                    )))
                }
            };
            let slot = vars.intern(&sym);
            let inner = Box::new(compile_string_node(&e.leaf(1), vars)?);
            Matcher {
                size: inner.size,
                node: Node::Bind {
                    slot,
                    pattern: inner,
                },
            }
        }
        "Alternatives" => {
            let mut alternatives = Vec::with_capacity(e.size());
            for leaf in e.leaves() {
                alternatives.push(compile_string_node(&leaf, vars)?);
            }
            let size = alternatives
                .iter()
                .map(|m| m.size)
                .reduce(|a, b| a.union(&b))
                .unwrap_or(MatchSize::exactly(1));
            Matcher {
                size,
                node: Node::Alternatives(alternatives),
            }
        }
        "Repeated" | "RepeatedNull" => {
            if e.size() != 1 {
                return Err(EvalError::StringPatternError(
                    "counted repetition is not supported in string patterns".into(),
                ));
            }
            let min = if short == "RepeatedNull" { 0 } else { 1 };
            let pattern = Box::new(compile_string_node(&e.leaf(0), vars)?);
            let size = MatchSize::at_least(min * pattern.size.min().max(1));
            Matcher {
                size,
                node: Node::Repeated {
                    pattern,
                    min,
                    max: None,
                },
            }
        }
        "Except" => {
            if e.size() == 0 || e.size() > 2 {
                return Err(EvalError::StringPatternError(format!(
                    "Except with {} arguments",
                    e.size()
                )));
            }
            let forbidden = Box::new(compile_string_node(&e.leaf(0), vars)?);
            let accept = if e.size() == 2 {
                Box::new(compile_string_node(&e.leaf(1), vars)?)
            } else {
                Box::new(blank(None))
            };
            Matcher {
                size: accept.size,
                node: Node::Except { forbidden, accept },
            }
        }
        "PatternTest" => {
            if e.size() != 2 {
                return Err(EvalError::PatternError("PatternTest requires two arguments".into()));
            }
            let pattern = Box::new(compile_string_node(&e.leaf(0), vars)?);
            Matcher {
                size: pattern.size,
                node: Node::Test {
                    pattern,
                    test: e.leaf(1),
                },
            }
        }
        "Condition" => {
            if e.size() != 2 {
                return Err(EvalError::PatternError("Condition requires two arguments".into()));
            }
            let pattern = Box::new(compile_string_node(&e.leaf(0), vars)?);
            Matcher {
                size: pattern.size,
                node: Node::Condition {
                    pattern,
                    condition: e.leaf(1),
                },
            }
        }
        "Shortest" | "Longest" => {
            if e.size() != 1 {
                return Err(EvalError::PatternError(format!(
                    "{} requires one argument",
                    short
                )));
            }
            let inner = Box::new(compile_string_node(&e.leaf(0), vars)?);
            let size = inner.size;
            Matcher {
                size,
                node: if short == "Shortest" {
                    Node::Shortest(inner)
                } else {
                    Node::Longest(inner)
                },
            }
        }
        other => {
            return Err(EvalError::StringPatternError(format!(
                "{} is only valid in expression patterns",
                other
            )))
        }
    };

    Ok(matcher)
}
