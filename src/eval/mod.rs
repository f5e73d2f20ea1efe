//! The fixed-point evaluator.
//!
//! `evaluate` rewrites an expression until nothing changes: head first, then
//! leaves under the head's hold mode, sequence splicing, listable threading,
//! Orderless canonicalization, Flat absorption, and finally the rule tables
//! in up/sub/down/own order, with built-in handlers consulted before down
//! rules. Recursion depth is bounded; the interrupt flag is polled at every
//! entry and after each rule application.

pub mod builtins;
pub mod output;

pub use output::{DefaultOutput, NoOutput, Output, TestOutput};

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use rayon::prelude::*;
use tracing::{debug, trace, warn};

use crate::error::{EvalError, Interrupt, Result};
use crate::expr::{self, slice::kind_bit, Expr, ExprRef, Expression, Kind};
use crate::pattern::rewrite::OptionContext;
use crate::symbol::table::{Definitions, Symbols};
use crate::symbol::{lookup_name, Attributes, Rule, RuleKind, SymbolRef};

#[derive(Debug, Clone, Copy)]
pub struct EvalConfig {
    pub recursion_limit: usize,
    pub catch_interrupts: bool,
    /// Fan listable threading out over the work-stealing pool.
    pub parallelize: bool,
}

impl Default for EvalConfig {
    fn default() -> EvalConfig {
        EvalConfig {
            recursion_limit: 512,
            catch_interrupts: true,
            parallelize: false,
        }
    }
}

/// One evaluation context: definitions, configuration, interrupt state and
/// the output sink. Shareable across threads for parallel threading.
pub struct Evaluation {
    definitions: Arc<Definitions>,
    pub config: EvalConfig,
    depth: AtomicUsize,
    interrupt: Arc<AtomicU8>,
    deadline: Option<Instant>,
    output: Arc<dyn Output>,
}

impl Evaluation {
    pub fn new(definitions: Arc<Definitions>, output: Arc<dyn Output>) -> Evaluation {
        Evaluation::with_config(definitions, output, EvalConfig::default())
    }

    pub fn with_config(
        definitions: Arc<Definitions>,
        output: Arc<dyn Output>,
        config: EvalConfig,
    ) -> Evaluation {
        Evaluation {
            definitions,
            config,
            depth: AtomicUsize::new(0),
            interrupt: Arc::new(AtomicU8::new(0)),
            deadline: None,
            output,
        }
    }

    pub fn definitions(&self) -> &Definitions {
        &self.definitions
    }

    pub fn symbols(&self) -> &Symbols {
        self.definitions.symbols()
    }

    /// The interrupt cell; hosts store a flag from another thread to abort.
    pub fn interrupt_cell(&self) -> Arc<AtomicU8> {
        Arc::clone(&self.interrupt)
    }

    pub fn raise_interrupt(&self, interrupt: Interrupt) {
        self.interrupt.store(interrupt.flag(), Ordering::SeqCst);
    }

    pub fn set_deadline(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    /// Cooperative check, at least once per evaluate call.
    fn poll(&self) -> Result<()> {
        if self.config.catch_interrupts {
            if let Some(interrupt) = Interrupt::from_flag(self.interrupt.load(Ordering::Relaxed)) {
                return Err(EvalError::Interrupted(interrupt));
            }
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(EvalError::Interrupted(Interrupt::Timeout));
            }
        }
        Ok(())
    }

    /// Emits a diagnostic through the output sink. The template comes from
    /// the symbol's message table, falling back to `General`; `` `k` ``
    /// placeholders substitute the output-formatted arguments.
    pub fn message(&self, name: &SymbolRef, tag: &str, args: &[ExprRef]) {
        let template = name
            .lookup_message(tag)
            .or_else(|| self.symbols().general.lookup_message(tag));
        let template = match template {
            Some(t) => t,
            None => return,
        };
        let mut text = template;
        for (i, arg) in args.iter().enumerate() {
            let placeholder = format!("`{}`", i + 1);
            if let Some(at) = text.find(&placeholder) {
                text.replace_range(at..at + placeholder.len(), &self.format_output(arg));
            }
        }
        self.output.write(name.short_name(), tag, &text);
    }

    pub fn format_output(&self, expr: &ExprRef) -> String {
        crate::format::format_output(expr, self)
    }
}

/// `Default[f]`, filled into empty `Optional` captures under `f`.
pub fn default_value(sym: &SymbolRef) -> Option<ExprRef> {
    sym.state()
        .default_rules
        .iter()
        .next()
        .map(|rule| Arc::clone(&rule.rhs))
}

/// Registers a rule (or own value) on a symbol.
pub fn rule_add(sym: &SymbolRef, kind: RuleKind, pattern: ExprRef, rhs: ExprRef) {
    if kind == RuleKind::Own {
        sym.set_own_value(Some(rhs));
        return;
    }
    let rule = Arc::new(Rule::new(pattern, rhs));
    sym.state_mut().table_mut(kind).add(rule);
}

struct DepthGuard<'a> {
    evaluation: &'a Evaluation,
}

impl<'a> DepthGuard<'a> {
    fn enter(evaluation: &'a Evaluation) -> Result<DepthGuard<'a>> {
        let depth = evaluation.depth.fetch_add(1, Ordering::Relaxed) + 1;
        if depth > evaluation.config.recursion_limit {
            evaluation.depth.fetch_sub(1, Ordering::Relaxed);
            return Err(EvalError::RecursionLimit(evaluation.config.recursion_limit));
        }
        Ok(DepthGuard { evaluation })
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.evaluation.depth.fetch_sub(1, Ordering::Relaxed);
    }
}

/// Evaluates to a fixed point.
pub fn evaluate(expr: &ExprRef, evaluation: &Evaluation) -> Result<ExprRef> {
    evaluation.poll()?;
    let _guard = DepthGuard::enter(evaluation)?;

    let mut current = Arc::clone(expr);
    loop {
        evaluation.poll()?;
        match evaluate_once(&current, evaluation)? {
            Some(next) => current = next,
            None => return Ok(current),
        }
    }
}

/// One evaluation step; `None` means `expr` is already a fixed point.
fn evaluate_once(expr: &ExprRef, evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    match expr.as_ref() {
        Expr::Symbol(sym) => Ok(sym.own_value().filter(|v| !v.same(expr))),
        Expr::Expression(e) => evaluate_expression(expr, e, evaluation),
        _ => Ok(None),
    }
}

/// Kinds whose values can change under evaluation.
const ACTIVE_MASK: u16 = (1 << (Kind::Symbol as u16)) | (1 << (Kind::Expression as u16));

fn evaluate_expression(
    original: &ExprRef,
    e: &Expression,
    evaluation: &Evaluation,
) -> Result<Option<ExprRef>> {
    // Step 1: head fixed point
    let head = evaluate(e.head(), evaluation)?;
    let head_changed = !Arc::ptr_eq(&head, e.head());

    let head_sym = head.as_symbol().map(Arc::clone);
    let attrs = head_sym
        .as_ref()
        .map(|s| s.attributes())
        .unwrap_or(Attributes::empty());

    // Step 2: hold partitioning; HoldAllComplete short-circuits everything
    if attrs.contains(Attributes::HOLD_ALL_COMPLETE) {
        return Ok(if head_changed {
            Some(expr::expression(head, e.materialize()))
        } else {
            None
        });
    }

    let n = e.size();
    let (eval_begin, eval_end) = if attrs.contains(Attributes::HOLD_FIRST) {
        (1.min(n), n)
    } else if attrs.contains(Attributes::HOLD_REST) {
        (0, 1.min(n))
    } else if attrs.contains(Attributes::HOLD_ALL) {
        (0, 0)
    } else {
        (0, n)
    };

    let evaluated = evaluate_leaves(e, eval_begin, eval_end, evaluation)?;

    let mut changed = head_changed || evaluated.is_some();
    let mut current: ExprRef = if changed {
        let mut leaves = e.materialize();
        if let Some(replacements) = evaluated {
            for (i, leaf) in replacements {
                leaves[i] = leaf;
            }
        }
        expr::expression(head, leaves)
    } else {
        Arc::clone(original)
    };

    // Step 3: sequence splicing
    if !attrs.contains(Attributes::SEQUENCE_HOLD) {
        if let Some(e) = current.as_expression() {
            if let Some(spliced) = splice_sequences(e) {
                current = spliced;
                changed = true;
            }
        }
    }

    // Step 4: listable threading
    if attrs.contains(Attributes::LISTABLE) {
        if let Some(e) = current.as_expression() {
            match thread_listable(&current, e, evaluation)? {
                ThreadOutcome::Threaded(out) => return Ok(Some(out)),
                ThreadOutcome::Mismatch => {
                    // message emitted; the expression is not rewritten
                    return Ok(if changed { Some(current) } else { None });
                }
                ThreadOutcome::NotApplicable => {}
            }
        }
    }

    // Step 5: Orderless canonicalization
    if attrs.contains(Attributes::ORDERLESS) {
        if let Some(e) = current.as_expression() {
            if let Some(sorted) = sort_leaves(e) {
                current = sorted;
                changed = true;
            }
        }
    }

    // Step 6: Flat absorption
    if attrs.contains(Attributes::FLAT) {
        if let (Some(e), Some(sym)) = (current.as_expression(), head_sym.as_ref()) {
            if let Some(flat) = flatten_head(e, sym) {
                current = flat;
                changed = true;
            }
        }
    }

    // Step 7: OneIdentity affects pattern matching, not the loop itself.

    // Step 8: rule application
    evaluation.poll()?;
    if let Some(result) = apply_rules(&current, head_sym.as_ref(), evaluation)? {
        evaluation.poll()?;
        return Ok(Some(result));
    }

    Ok(if changed { Some(current) } else { None })
}

type LeafChanges = Option<Vec<(usize, ExprRef)>>;

fn evaluate_leaves(
    e: &Expression,
    begin: usize,
    end: usize,
    evaluation: &Evaluation,
) -> Result<LeafChanges> {
    if begin >= end {
        return Ok(None);
    }
    // nothing to do when no leaf kind can change under evaluation
    if !e.type_mask().intersects(ACTIVE_MASK) {
        return Ok(None);
    }

    let changes: Vec<(usize, ExprRef)> = if evaluation.config.parallelize && end - begin > 1 {
        (begin..end)
            .into_par_iter()
            .map(|i| -> Result<Option<(usize, ExprRef)>> {
                let leaf = e.leaf(i);
                if kind_bit(leaf.kind()) & ACTIVE_MASK == 0 {
                    return Ok(None);
                }
                let value = evaluate(&leaf, evaluation)?;
                Ok(if Arc::ptr_eq(&value, &leaf) {
                    None
                } else {
                    Some((i, value))
                })
            })
            .collect::<Result<Vec<_>>>()?
            .into_iter()
            .flatten()
            .collect()
    } else {
        let mut out = Vec::new();
        for i in begin..end {
            let leaf = e.leaf(i);
            if kind_bit(leaf.kind()) & ACTIVE_MASK == 0 {
                continue;
            }
            let value = evaluate(&leaf, evaluation)?;
            if !Arc::ptr_eq(&value, &leaf) {
                out.push((i, value));
            }
        }
        out
    };

    Ok(if changes.is_empty() {
        None
    } else {
        Some(changes)
    })
}

/// Splices `Sequence[…]` leaves in place. `None` when nothing changed.
pub fn splice_sequences(e: &Expression) -> Option<ExprRef> {
    if !e.type_mask().intersects(kind_bit(Kind::Expression)) {
        return None;
    }
    if !e.leaves().any(|l| l.is_sequence()) {
        return None;
    }
    let mut leaves = Vec::with_capacity(e.size());
    for leaf in e.leaves() {
        if leaf.is_sequence() {
            if let Some(seq) = leaf.as_expression() {
                leaves.extend(seq.leaves());
            }
        } else {
            leaves.push(leaf);
        }
    }
    Some(expr::expression(Arc::clone(e.head()), leaves))
}

enum ThreadOutcome {
    NotApplicable,
    Mismatch,
    Threaded(ExprRef),
}

/// Listable threading over `List` leaves: all lists must share one length.
fn thread_listable(
    original: &ExprRef,
    e: &Expression,
    evaluation: &Evaluation,
) -> Result<ThreadOutcome> {
    let symbols = evaluation.symbols();
    let list_of = |leaf: &ExprRef| -> Option<usize> {
        let le = leaf.as_expression()?;
        let head = le.head_symbol()?;
        if Arc::ptr_eq(head, &symbols.list) {
            Some(le.size())
        } else {
            None
        }
    };

    let mut dim: Option<usize> = None;
    for leaf in e.leaves() {
        if let Some(len) = list_of(&leaf) {
            match dim {
                None => dim = Some(len),
                Some(d) if d != len => {
                    evaluation.message(&symbols.thread, "tdlen", &[Arc::clone(original)]);
                    return Ok(ThreadOutcome::Mismatch);
                }
                _ => {}
            }
        }
    }
    let dim = match dim {
        Some(d) => d,
        None => return Ok(ThreadOutcome::NotApplicable),
    };

    debug!(head = %e.head(), dim, "threading listable head over lists");

    let mut rows: Vec<ExprRef> = Vec::with_capacity(dim);
    let build_row = |j: usize| -> ExprRef {
        let mut row = Vec::with_capacity(e.size());
        for leaf in e.leaves() {
            match list_of(&leaf) {
                Some(_) => {
                    let le = leaf.as_expression().expect("list leaf");
                    row.push(le.leaf(j));
                }
                None => row.push(Arc::clone(&leaf)),
            }
        }
        expr::expression(Arc::clone(e.head()), row)
    };

    if evaluation.config.parallelize && dim > 1 {
        // explicit fan-out: evaluate each slot on the pool and join
        let results: Result<Vec<ExprRef>> = (0..dim)
            .into_par_iter()
            .map(|j| evaluate(&build_row(j), evaluation))
            .collect();
        rows.extend(results?);
    } else {
        for j in 0..dim {
            rows.push(build_row(j));
        }
    }

    Ok(ThreadOutcome::Threaded(expr::expression(
        expr::symbol(Arc::clone(&symbols.list)),
        rows,
    )))
}

/// Orderless canonical sort. `None` when already sorted.
fn sort_leaves(e: &Expression) -> Option<ExprRef> {
    let n = e.size();
    if n < 2 {
        return None;
    }
    let mut sorted = true;
    let mut prev = e.leaf(0);
    for i in 1..n {
        let leaf = e.leaf(i);
        if crate::sort::canonical_cmp(&prev, &leaf) == std::cmp::Ordering::Greater {
            sorted = false;
            break;
        }
        prev = leaf;
    }
    if sorted {
        return None;
    }
    let mut leaves = e.materialize();
    leaves.sort_by(|a, b| crate::sort::canonical_cmp(a, b));
    Some(expr::expression(Arc::clone(e.head()), leaves))
}

/// Flat absorption: nested applications of the same head splice in place.
fn flatten_head(e: &Expression, head_sym: &SymbolRef) -> Option<ExprRef> {
    if !e.type_mask().intersects(kind_bit(Kind::Expression)) {
        return None;
    }
    let nested = |leaf: &ExprRef| {
        leaf.as_expression()
            .and_then(|le| le.head_symbol())
            .is_some_and(|s| Arc::ptr_eq(s, head_sym))
    };
    if !e.leaves().any(|l| nested(&l)) {
        return None;
    }
    let mut leaves = Vec::with_capacity(e.size());
    for leaf in e.leaves() {
        if nested(&leaf) {
            if let Some(le) = leaf.as_expression() {
                leaves.extend(le.leaves());
            }
        } else {
            leaves.push(leaf);
        }
    }
    Some(expr::expression(Arc::clone(e.head()), leaves))
}

/// Steps 8a–8c: up values, sub values, built-in handler, down values.
fn apply_rules(
    current: &ExprRef,
    head_sym: Option<&SymbolRef>,
    evaluation: &Evaluation,
) -> Result<Option<ExprRef>> {
    let e = match current.as_expression() {
        Some(e) => e,
        None => return Ok(None),
    };

    // a. UpValues for each leaf's lookup symbol
    for leaf in e.leaves() {
        if let Some(sym) = lookup_name(&leaf) {
            let rules = {
                let state = sym.state();
                if state.up_rules.is_empty() {
                    continue;
                }
                state.up_rules.candidates(e.size(), current.hash())
            };
            if let Some(result) = demote(apply_rule_list(&rules, current, evaluation), current, evaluation)? {
                trace!(symbol = sym.name(), "up value fired");
                return Ok(Some(result));
            }
        }
    }

    // b. SubValues when the head is itself compound
    if let Some(head_expr) = e.head().as_expression() {
        if let Some(f) = head_expr.head_symbol() {
            let rules = {
                let state = f.state();
                state.sub_rules.candidates(e.size(), current.hash())
            };
            if let Some(result) = demote(apply_rule_list(&rules, current, evaluation), current, evaluation)? {
                trace!(symbol = f.name(), "sub value fired");
                return Ok(Some(result));
            }
        }
        // pure functions apply here: Function[…][args]
        if head_expr
            .head_symbol()
            .is_some_and(|s| Arc::ptr_eq(s, &evaluation.symbols().function))
        {
            if let Some(result) =
                demote(builtins::apply_function(head_expr, e, evaluation), current, evaluation)?
            {
                return Ok(Some(result));
            }
        }
    }

    // c. DownValues: built-in handler first
    if let Some(sym) = head_sym {
        if let Some(builtin) = sym.builtin() {
            if let Some(result) = demote(builtin(e, evaluation), current, evaluation)? {
                trace!(symbol = sym.name(), "builtin fired");
                return Ok(Some(result));
            }
        }
        let rules = {
            let state = sym.state();
            state.down_rules.candidates(e.size(), current.hash())
        };
        if let Some(result) = demote(apply_rule_list(&rules, current, evaluation), current, evaluation)? {
            trace!(symbol = sym.name(), "down value fired");
            return Ok(Some(result));
        }
    }

    Ok(None)
}

/// First matching rule wins; its rhs is rewritten with the captures.
fn apply_rule_list(
    rules: &[Arc<Rule>],
    subject: &ExprRef,
    evaluation: &Evaluation,
) -> Result<Option<ExprRef>> {
    for rule in rules {
        let matcher = match rule.matcher() {
            Ok(m) => m,
            Err(err) => {
                warn!(pattern = %rule.pattern, error = %err, "skipping malformed rule");
                continue;
            }
        };
        if let Some(binding) = crate::pattern::matcher::match_rule(&matcher, subject, evaluation)? {
            let rewrite = rule.rewrite(&matcher);
            let head = subject.as_expression().and_then(|e| e.head_symbol());
            let options = OptionContext {
                matched: binding.options(),
                head,
            };
            let result = rewrite.apply(&rule.rhs, &binding, &options)?;
            return Ok(Some(result));
        }
    }
    Ok(None)
}

/// Errors that correspond to user-visible messages are reported through the
/// output sink; the failing step then simply declines to rewrite. Fatal
/// errors propagate.
fn demote(
    result: Result<Option<ExprRef>>,
    subject: &ExprRef,
    evaluation: &Evaluation,
) -> Result<Option<ExprRef>> {
    match result {
        Err(EvalError::DivisionByZero) => {
            let symbols = evaluation.symbols();
            evaluation.message(&symbols.power, "infy", &[Arc::clone(subject)]);
            Ok(None)
        }
        Err(EvalError::NumericException(text)) => {
            let symbols = evaluation.symbols();
            evaluation.message(&symbols.general, "nmtd", &[expr::string(&text)]);
            Ok(None)
        }
        Err(err @ (EvalError::RecursionLimit(_) | EvalError::Interrupted(_))) => Err(err),
        Err(err) => {
            warn!(error = %err, "step failed; returning the expression unevaluated");
            Ok(None)
        }
        ok => ok,
    }
}
