//! Right-hand-side rewriting.
//!
//! A rule's rhs is compiled once into a directive tree that mirrors its
//! expression structure: substitute a captured slot, substitute an option
//! value, reuse the literal subtree, descend, or raise on a reference known
//! unsatisfiable at compile time. Application is a single recursive
//! traversal that shares unchanged subtrees.

use std::sync::Arc;

use crate::error::{EvalError, Result};
use crate::expr::{self, Expr, ExprRef};
use crate::pattern::compile::VariableTable;
use crate::pattern::match_state::Match;
use crate::symbol::SymbolRef;

pub enum RewriteNode {
    /// Reuse the rhs literal reference directly.
    Copy,
    /// Substitute the match's i-th slot.
    Slot(usize),
    /// Substitute the options value for the named key.
    OptionValue(SymbolRef),
    /// Recurse into children.
    Descend {
        head: Box<RewriteNode>,
        leaves: Vec<RewriteNode>,
    },
}

pub struct CompiledRewrite {
    node: RewriteNode,
}

/// Option values visible during one rewrite application: the rules captured
/// by `OptionsPattern`, falling back to the head symbol's declared options.
pub struct OptionContext<'a> {
    pub matched: &'a [(SymbolRef, ExprRef)],
    pub head: Option<&'a SymbolRef>,
}

impl OptionContext<'_> {
    pub const EMPTY: OptionContext<'static> = OptionContext {
        matched: &[],
        head: None,
    };

    fn lookup(&self, name: &SymbolRef) -> Option<ExprRef> {
        for (key, value) in self.matched {
            if Arc::ptr_eq(key, name) {
                return Some(Arc::clone(value));
            }
        }
        let head = self.head?;
        let state = head.state();
        for (key, value) in &state.options {
            if Arc::ptr_eq(key, name) {
                return Some(Arc::clone(value));
            }
        }
        None
    }
}

pub fn compile_rewrite(rhs: &ExprRef, vars: &VariableTable) -> CompiledRewrite {
    CompiledRewrite {
        node: compile_node(rhs, vars),
    }
}

fn compile_node(expr: &ExprRef, vars: &VariableTable) -> RewriteNode {
    match expr.as_ref() {
        Expr::Symbol(sym) => match vars.slot_of(sym) {
            Some(slot) => RewriteNode::Slot(slot),
            None => RewriteNode::Copy,
        },
        Expr::Expression(e) => {
            if e.has_form("OptionValue", 1) {
                if let Some(name) = e.leaf(0).as_symbol() {
                    return RewriteNode::OptionValue(Arc::clone(name));
                }
            }
            let head = compile_node(e.head(), vars);
            let leaves: Vec<RewriteNode> = e.leaves().map(|l| compile_node(&l, vars)).collect();
            let all_copy = matches!(head, RewriteNode::Copy)
                && leaves.iter().all(|n| matches!(n, RewriteNode::Copy));
            if all_copy {
                RewriteNode::Copy
            } else {
                RewriteNode::Descend {
                    head: Box::new(head),
                    leaves,
                }
            }
        }
        _ => RewriteNode::Copy,
    }
}

impl CompiledRewrite {
    /// Produces the substituted expression; unchanged subtrees are shared.
    pub fn apply(
        &self,
        rhs: &ExprRef,
        binding: &Match,
        options: &OptionContext<'_>,
    ) -> Result<ExprRef> {
        apply_node(&self.node, rhs, binding, options)
    }
}

fn apply_node(
    node: &RewriteNode,
    expr: &ExprRef,
    binding: &Match,
    options: &OptionContext<'_>,
) -> Result<ExprRef> {
    match node {
        RewriteNode::Copy => Ok(Arc::clone(expr)),
        RewriteNode::Slot(i) => match binding.slot(*i) {
            Some(value) => Ok(Arc::clone(value)),
            // a variable bound in an untaken alternative stays symbolic
            None => Ok(Arc::clone(expr)),
        },
        RewriteNode::OptionValue(name) => match options.lookup(name) {
            Some(value) => Ok(value),
            None => Ok(Arc::clone(expr)),
        },
        RewriteNode::Descend { head, leaves } => {
            let e = expr
                .as_expression()
                .ok_or_else(|| EvalError::PatternError("rewrite shape mismatch".into()))?;
            let new_head = apply_node(head, e.head(), binding, options)?;
            let mut new_leaves = Vec::with_capacity(e.size());
            for (i, leaf_node) in leaves.iter().enumerate() {
                new_leaves.push(apply_node(leaf_node, &e.leaf(i), binding, options)?);
            }
            Ok(expr::expression(new_head, new_leaves))
        }
    }
}

/// Replaces bound pattern variables by their captures, leaving everything
/// else untouched. Used to evaluate `Condition` bodies during matching.
pub fn substitute_variables(expr: &ExprRef, vars: &VariableTable, binding: &Match) -> ExprRef {
    match expr.as_ref() {
        Expr::Symbol(sym) => match vars.slot_of(sym).and_then(|i| binding.slot(i)) {
            Some(value) => Arc::clone(value),
            None => Arc::clone(expr),
        },
        Expr::Expression(e) => {
            let new_head = substitute_variables(e.head(), vars, binding);
            let mut changed = !Arc::ptr_eq(&new_head, e.head());
            let mut leaves = Vec::with_capacity(e.size());
            for leaf in e.leaves() {
                let new_leaf = substitute_variables(&leaf, vars, binding);
                changed = changed || !Arc::ptr_eq(&new_leaf, &leaf);
                leaves.push(new_leaf);
            }
            if changed {
                expr::expression(new_head, leaves)
            } else {
                Arc::clone(expr)
            }
        }
        _ => Arc::clone(expr),
    }
}

/// A compiled pure-function body: `Slot[k]` references lowered to argument
/// indices. References beyond the declared parameter list are diagnosed at
/// compile time; out-of-range references against the actual argument count
/// surface at application time.
pub struct SlotFunction {
    body: ExprRef,
    node: SlotNode,
    max_slot: usize,
}

enum SlotNode {
    Copy,
    Arg(usize),
    /// Known unsatisfiable at compile time (named-parameter form).
    Illegal(ExprRef),
    Descend {
        head: Box<SlotNode>,
        leaves: Vec<SlotNode>,
    },
}

impl SlotFunction {
    /// Compiles `body`; `params` is the named-parameter list of
    /// `Function[{x, …}, body]`, or `None` for the `#`-form.
    pub fn compile(body: &ExprRef, params: Option<&[SymbolRef]>) -> SlotFunction {
        let mut max_slot = 0usize;
        let node = compile_slot_node(body, params, &mut max_slot);
        SlotFunction {
            body: Arc::clone(body),
            node,
            max_slot,
        }
    }

    pub fn apply(&self, args: &[ExprRef]) -> Result<ExprRef> {
        if self.max_slot > args.len() {
            return Err(EvalError::ArgumentCount {
                expected: self.max_slot,
                got: args.len(),
            });
        }
        apply_slot_node(&self.node, &self.body, args)
    }
}

fn compile_slot_node(
    expr: &ExprRef,
    params: Option<&[SymbolRef]>,
    max_slot: &mut usize,
) -> SlotNode {
    match expr.as_ref() {
        Expr::Symbol(sym) => {
            if let Some(params) = params {
                if let Some(i) = params.iter().position(|p| Arc::ptr_eq(p, sym)) {
                    *max_slot = (*max_slot).max(i + 1);
                    return SlotNode::Arg(i);
                }
            }
            SlotNode::Copy
        }
        Expr::Expression(e) => {
            if e.has_form("Slot", 1) {
                match e.leaf(0).as_machine_integer() {
                    Some(k) if k >= 1 => {
                        if let Some(params) = params {
                            if (k as usize) > params.len() {
                                return SlotNode::Illegal(Arc::clone(expr));
                            }
                        }
                        *max_slot = (*max_slot).max(k as usize);
                        return SlotNode::Arg(k as usize - 1);
                    }
                    _ => return SlotNode::Illegal(Arc::clone(expr)),
                }
            }
            let head = compile_slot_node(e.head(), params, max_slot);
            let leaves: Vec<SlotNode> = e
                .leaves()
                .map(|l| compile_slot_node(&l, params, max_slot))
                .collect();
            let all_copy = matches!(head, SlotNode::Copy)
                && leaves.iter().all(|n| matches!(n, SlotNode::Copy));
            if all_copy {
                SlotNode::Copy
            } else {
                SlotNode::Descend {
                    head: Box::new(head),
                    leaves,
                }
            }
        }
        _ => SlotNode::Copy,
    }
}

fn apply_slot_node(node: &SlotNode, expr: &ExprRef, args: &[ExprRef]) -> Result<ExprRef> {
    match node {
        SlotNode::Copy => Ok(Arc::clone(expr)),
        SlotNode::Arg(i) => args.get(*i).cloned().ok_or(EvalError::ArgumentCount {
            expected: i + 1,
            got: args.len(),
        }),
        SlotNode::Illegal(reference) => Err(EvalError::PatternError(format!(
            "slot reference {} cannot be filled",
            reference
        ))),
        SlotNode::Descend { head, leaves } => {
            let e = expr
                .as_expression()
                .ok_or_else(|| EvalError::PatternError("slot body shape mismatch".into()))?;
            let new_head = apply_slot_node(head, e.head(), args)?;
            let mut new_leaves = Vec::with_capacity(e.size());
            for (i, leaf_node) in leaves.iter().enumerate() {
                new_leaves.push(apply_slot_node(leaf_node, &e.leaf(i), args)?);
            }
            Ok(expr::expression(new_head, new_leaves))
        }
    }
}
