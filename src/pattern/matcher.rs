//! The sequence-matching engine.
//!
//! Matching runs left to right. A variable-size matcher enumerates feasible
//! lengths — greedy from the maximum by default, reversed under `Shortest` —
//! and retries the continuation at each trial length, unwinding captured
//! slots through the match object's mark stack. `Orderless` heads enumerate
//! candidate assignments with each subject leaf tried at most once per
//! pattern; `Flat` heads wrap multi-leaf captures in the head symbol.

use std::sync::Arc;

use crate::atoms::Str;
use crate::error::Result;
use crate::eval::Evaluation;
use crate::expr::{self, ExprRef};
use crate::pattern::compile::{CompiledPattern, Matcher, Node};
use crate::pattern::match_state::{Match, MatchState};
use crate::pattern::sequence::{CaptureMode, CharSeq, LeafSeq, MatchSeq, SingleSeq};
use crate::pattern::size::MatchSize;
use crate::symbol::Attributes;

/// Matches a compiled pattern against a whole expression (rule application).
pub fn match_rule(
    compiled: &CompiledPattern,
    subject: &ExprRef,
    evaluation: &Evaluation,
) -> Result<Option<Match>> {
    let mut st = MatchState::new(compiled.variables(), evaluation);
    let seq = SingleSeq::new(subject);
    let mode = sequence_mode(evaluation);
    if match_part(&compiled.root, &seq, 0, 1, &mode, &mut st)? {
        Ok(Some(st.binding))
    } else {
        Ok(None)
    }
}

/// Anchored whole-string match.
pub fn match_string(
    compiled: &CompiledPattern,
    subject: &Str,
    evaluation: &Evaluation,
    ignore_case: bool,
) -> Result<Option<Match>> {
    if !compiled.root.size.contains(subject.len()) {
        return Ok(None);
    }
    let mut st = MatchState::new(compiled.variables(), evaluation);
    st.ignore_case = ignore_case;
    let seq = CharSeq::new(subject);
    if match_part(
        &compiled.root,
        &seq,
        0,
        subject.len(),
        &CaptureMode::Chars,
        &mut st,
    )? {
        Ok(Some(st.binding))
    } else {
        Ok(None)
    }
}

/// Unanchored search: the first `(begin, end)` window the pattern matches,
/// scanning windows left to right, longest end first.
pub fn string_search(
    compiled: &CompiledPattern,
    subject: &Str,
    evaluation: &Evaluation,
    ignore_case: bool,
) -> Result<Option<(usize, usize, Match)>> {
    let n = subject.len();
    let seq = CharSeq::new(subject);
    for begin in 0..=n {
        let max_len = (n - begin).min(clamp_len(compiled.root.size.max()));
        let min_len = compiled.root.size.min() as usize;
        if min_len > n - begin {
            continue;
        }
        for len in (min_len..=max_len).rev() {
            let mut st = MatchState::new(compiled.variables(), evaluation);
            st.ignore_case = ignore_case;
            if match_part(
                &compiled.root,
                &seq,
                begin,
                begin + len,
                &CaptureMode::Chars,
                &mut st,
            )? {
                return Ok(Some((begin, begin + len, st.binding)));
            }
        }
    }
    Ok(None)
}

fn sequence_mode(evaluation: &Evaluation) -> CaptureMode {
    CaptureMode::Sequence(Arc::clone(&evaluation.definitions().symbols().sequence))
}

fn clamp_len(size: u64) -> usize {
    size.min(usize::MAX as u64) as usize
}

fn rest_size(pats: &[Matcher]) -> MatchSize {
    pats.iter()
        .map(|m| m.size)
        .fold(MatchSize::exactly(0), |a, b| a.add(&b))
}

fn prefers_shortest(m: &Matcher) -> bool {
    match &m.node {
        Node::Shortest(_) => true,
        Node::Longest(_) => false,
        Node::Bind { pattern, .. } => prefers_shortest(pattern),
        _ => false,
    }
}

/// Matches a pattern list against `[begin, end)`, consuming it entirely.
pub(crate) fn match_sequence<S: MatchSeq>(
    pats: &[Matcher],
    seq: &S,
    begin: usize,
    end: usize,
    mode: &CaptureMode,
    st: &mut MatchState<'_>,
) -> Result<bool> {
    let (first, rest) = match pats.split_first() {
        Some(split) => split,
        None => return Ok(begin == end),
    };

    let avail = end - begin;
    let tail = rest_size(rest);

    let mut lo = first.size.min() as usize;
    let mut hi = clamp_len(first.size.max()).min(avail);
    // the remainder must be feasible for the rest of the patterns
    hi = hi.min(avail.saturating_sub(tail.min() as usize));
    if (tail.max() as usize) < avail {
        lo = lo.max(avail - clamp_len(tail.max()));
    }
    if lo > hi {
        return Ok(false);
    }

    let lengths: Vec<usize> = if prefers_shortest(first) {
        (lo..=hi).collect()
    } else {
        (lo..=hi).rev().collect()
    };

    for len in lengths {
        let mark = st.binding.mark();
        if match_part(first, seq, begin, begin + len, mode, st)?
            && match_sequence(rest, seq, begin + len, end, mode, st)?
        {
            return Ok(true);
        }
        st.binding.backtrack(mark);
    }
    Ok(false)
}

/// Matches one matcher against exactly `[begin, end)`.
pub(crate) fn match_part<S: MatchSeq>(
    m: &Matcher,
    seq: &S,
    begin: usize,
    end: usize,
    mode: &CaptureMode,
    st: &mut MatchState<'_>,
) -> Result<bool> {
    let len = end - begin;
    if !m.size.contains(len) {
        return Ok(false);
    }

    match &m.node {
        Node::Literal(lit) => Ok(len == 1 && seq.same_at(begin, lit, st.ignore_case)),

        Node::StringLiteral(lit) => {
            Ok(len == lit.len() && seq.literal_run(begin, lit, st.ignore_case))
        }

        Node::Blank { head } => Ok(len == 1
            && match head {
                Some(h) => seq.head_matches_at(begin, h),
                None => true,
            }),

        Node::BlankSequence { head, .. } => Ok(match head {
            Some(h) => (begin..end).all(|i| seq.head_matches_at(i, h)),
            None => true,
        }),

        Node::Bind { slot, pattern } => {
            let mark = st.binding.mark();
            if !match_part(pattern, seq, begin, end, mode, st)? {
                return Ok(false);
            }
            let value = seq.capture(begin, end, mode);
            if st.binding.assign(*slot, value) {
                Ok(true)
            } else {
                st.binding.backtrack(mark);
                Ok(false)
            }
        }

        Node::Compound {
            head,
            leaves,
            head_symbol: _,
        } => {
            if len != 1 {
                return Ok(false);
            }
            let item = seq.item(begin);
            let item_expr = match item.as_expression() {
                Some(e) => e,
                None => return Ok(false),
            };

            let mark = st.binding.mark();
            let head_seq = SingleSeq::new(item_expr.head());
            if !match_part(head, &head_seq, 0, 1, mode, st)? {
                st.binding.backtrack(mark);
                return Ok(false);
            }

            // Orderless and Flat are read off the subject's actual head
            let subject_head = item_expr.head_symbol().map(Arc::clone);
            let (orderless, inner_mode) = match &subject_head {
                Some(sym) => {
                    let attrs = sym.attributes();
                    let inner = if attrs.contains(Attributes::FLAT) {
                        CaptureMode::Flat {
                            head: Arc::clone(sym),
                            one_identity: attrs.contains(Attributes::ONE_IDENTITY),
                        }
                    } else {
                        sequence_mode(st.evaluation)
                    };
                    (attrs.contains(Attributes::ORDERLESS), inner)
                }
                None => (false, sequence_mode(st.evaluation)),
            };

            let saved_context = st.context_head.take();
            st.context_head = subject_head;

            let leaf_seq = LeafSeq::new(item_expr);
            let matched = if orderless && !leaves.is_empty() {
                let mut used = vec![false; item_expr.size()];
                match_orderless(leaves, &leaf_seq, &mut used, &inner_mode, st)?
            } else {
                match_sequence(leaves, &leaf_seq, 0, item_expr.size(), &inner_mode, st)?
            };

            st.context_head = saved_context;
            if !matched {
                st.binding.backtrack(mark);
            }
            Ok(matched)
        }

        Node::Alternatives(alternatives) => {
            for alt in alternatives {
                if !alt.size.contains(len) {
                    continue;
                }
                let mark = st.binding.mark();
                if match_part(alt, seq, begin, end, mode, st)? {
                    return Ok(true);
                }
                st.binding.backtrack(mark);
            }
            Ok(false)
        }

        Node::Repeated { pattern, min, max } => {
            match_repeated(pattern, seq, begin, end, 0, *min, *max, mode, st)
        }

        Node::Except { forbidden, accept } => {
            if forbidden.size.contains(len) {
                let mark = st.binding.mark();
                let hit = match_part(forbidden, seq, begin, end, mode, st)?;
                st.binding.backtrack(mark);
                if hit {
                    return Ok(false);
                }
            }
            match_part(accept, seq, begin, end, mode, st)
        }

        Node::Test { pattern, test } => {
            let mark = st.binding.mark();
            if !match_part(pattern, seq, begin, end, mode, st)? {
                return Ok(false);
            }
            let captured = seq.capture(begin, end, mode);
            let call = expr::expr1(Arc::clone(test), captured);
            let verdict = crate::eval::evaluate(&call, st.evaluation)?;
            if verdict.is_true() {
                Ok(true)
            } else {
                st.binding.backtrack(mark);
                Ok(false)
            }
        }

        Node::Condition { pattern, condition } => {
            let mark = st.binding.mark();
            if !match_part(pattern, seq, begin, end, mode, st)? {
                return Ok(false);
            }
            let substituted = crate::pattern::rewrite::substitute_variables(
                condition,
                st.variables,
                &st.binding,
            );
            let verdict = crate::eval::evaluate(&substituted, st.evaluation)?;
            if verdict.is_true() {
                Ok(true)
            } else {
                st.binding.backtrack(mark);
                Ok(false)
            }
        }

        Node::Optional {
            pattern,
            default,
            slots,
        } => {
            if len > 0 {
                return match_part(pattern, seq, begin, end, mode, st);
            }
            let value = match default {
                Some(d) => Arc::clone(d),
                None => match st
                    .context_head
                    .as_ref()
                    .and_then(|h| crate::eval::default_value(h))
                {
                    Some(d) => d,
                    None => return Ok(false),
                },
            };
            let mark = st.binding.mark();
            for slot in slots {
                if !st.binding.assign(*slot, Arc::clone(&value)) {
                    st.binding.backtrack(mark);
                    return Ok(false);
                }
            }
            Ok(true)
        }

        Node::Options { limit: _ } => {
            let mark = st.binding.mark();
            for i in begin..end {
                if !record_option(&seq.item(i), st) {
                    st.binding.backtrack(mark);
                    return Ok(false);
                }
            }
            Ok(true)
        }

        Node::Verbatim(lit) => Ok(len == 1 && seq.same_at(begin, lit, st.ignore_case)),

        Node::Concat(parts) => match_sequence(parts, seq, begin, end, mode, st),

        Node::WordBoundary => Ok(len == 0 && seq.word_boundary(begin)),

        Node::Shortest(inner) | Node::Longest(inner) => {
            match_part(inner, seq, begin, end, mode, st)
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn match_repeated<S: MatchSeq>(
    pattern: &Matcher,
    seq: &S,
    begin: usize,
    end: usize,
    done: u64,
    min: u64,
    max: Option<u64>,
    mode: &CaptureMode,
    st: &mut MatchState<'_>,
) -> Result<bool> {
    if begin == end {
        return Ok(done >= min);
    }
    if let Some(m) = max {
        if done == m {
            return Ok(false);
        }
    }

    let avail = end - begin;
    let child_min = (pattern.size.min() as usize).max(1);
    let child_max = clamp_len(pattern.size.max()).min(avail);
    if child_min > child_max {
        return Ok(false);
    }

    for len in (child_min..=child_max).rev() {
        let mark = st.binding.mark();
        if match_part(pattern, seq, begin, begin + len, mode, st)?
            && match_repeated(pattern, seq, begin + len, end, done + 1, min, max, mode, st)?
        {
            return Ok(true);
        }
        st.binding.backtrack(mark);
    }
    Ok(false)
}

/// An option leaf: `name -> value`, `name :> value`, or a list of them.
fn record_option(item: &ExprRef, st: &mut MatchState<'_>) -> bool {
    let mut pairs = Vec::new();
    if !crate::pattern::options::collect_option_rules(item, st.evaluation.definitions(), &mut pairs)
    {
        return false;
    }
    for (name, value) in pairs {
        st.binding.push_option(name, value);
    }
    true
}

/// Orderless assignment: patterns in compiled (most-specific-first) order,
/// each subject leaf tried at most once per pattern.
fn match_orderless<S: MatchSeq>(
    pats: &[Matcher],
    seq: &S,
    used: &mut Vec<bool>,
    mode: &CaptureMode,
    st: &mut MatchState<'_>,
) -> Result<bool> {
    let (first, rest) = match pats.split_first() {
        Some(split) => split,
        None => return Ok(used.iter().all(|u| *u)),
    };

    if first.size.fixed() == Some(1) {
        for i in 0..used.len() {
            if used[i] {
                continue;
            }
            let mark = st.binding.mark();
            if match_part(first, seq, i, i + 1, mode, st)? {
                used[i] = true;
                if match_orderless(rest, seq, used, mode, st)? {
                    return Ok(true);
                }
                used[i] = false;
            }
            st.binding.backtrack(mark);
        }
        return Ok(false);
    }

    // variable-size pattern: choose a subset of the free leaves
    let free: Vec<usize> = (0..used.len()).filter(|i| !used[*i]).collect();

    if rest.is_empty() {
        if !first.size.contains(free.len()) {
            return Ok(false);
        }
        let sub = SubsetSeq { base: seq, indices: &free };
        let mark = st.binding.mark();
        if match_part(first, &sub, 0, free.len(), mode, st)? {
            for i in &free {
                used[*i] = true;
            }
            return Ok(true);
        }
        st.binding.backtrack(mark);
        return Ok(false);
    }

    // bounded subset enumeration keeps the worst case in check
    if free.len() > 16 {
        let sub = SubsetSeq { base: seq, indices: &free };
        let all = match_sequence(pats, &sub, 0, free.len(), mode, st)?;
        if all {
            for i in &free {
                used[*i] = true;
            }
        }
        return Ok(all);
    }

    let lo = first.size.min() as usize;
    let hi = clamp_len(first.size.max()).min(free.len());
    let sizes: Vec<usize> = if prefers_shortest(first) {
        (lo..=hi).collect()
    } else {
        (lo..=hi).rev().collect()
    };
    for k in sizes {
        let mut chosen: Vec<usize> = Vec::with_capacity(k);
        if try_subsets(first, rest, seq, used, &free, k, 0, &mut chosen, mode, st)? {
            return Ok(true);
        }
    }
    Ok(false)
}

#[allow(clippy::too_many_arguments)]
fn try_subsets<S: MatchSeq>(
    first: &Matcher,
    rest: &[Matcher],
    seq: &S,
    used: &mut Vec<bool>,
    free: &[usize],
    k: usize,
    from: usize,
    chosen: &mut Vec<usize>,
    mode: &CaptureMode,
    st: &mut MatchState<'_>,
) -> Result<bool> {
    if chosen.len() == k {
        let mark = st.binding.mark();
        let sub = SubsetSeq { base: seq, indices: chosen };
        if match_part(first, &sub, 0, k, mode, st)? {
            for i in chosen.iter() {
                used[*i] = true;
            }
            if match_orderless(rest, seq, used, mode, st)? {
                return Ok(true);
            }
            for i in chosen.iter() {
                used[*i] = false;
            }
        }
        st.binding.backtrack(mark);
        return Ok(false);
    }
    for idx in from..free.len() {
        chosen.push(free[idx]);
        if try_subsets(first, rest, seq, used, free, k, idx + 1, chosen, mode, st)? {
            return Ok(true);
        }
        chosen.pop();
    }
    Ok(false)
}

/// A re-indexed view over selected items of a base sequence, in order.
struct SubsetSeq<'a, S: MatchSeq> {
    base: &'a S,
    indices: &'a [usize],
}

impl<S: MatchSeq> MatchSeq for SubsetSeq<'_, S> {
    fn len(&self) -> usize {
        self.indices.len()
    }

    fn item(&self, i: usize) -> ExprRef {
        self.base.item(self.indices[i])
    }

    fn same_at(&self, i: usize, literal: &crate::expr::Expr, ignore_case: bool) -> bool {
        self.base.same_at(self.indices[i], literal, ignore_case)
    }

    fn head_matches_at(&self, i: usize, head: &crate::expr::Expr) -> bool {
        self.base.head_matches_at(self.indices[i], head)
    }

    fn capture(&self, begin: usize, end: usize, mode: &CaptureMode) -> ExprRef {
        let items: Vec<ExprRef> = (begin..end).map(|i| self.item(i)).collect();
        crate::pattern::sequence::wrap_items(items, mode)
    }
}
