//! The match object: captured slots with O(1) unwind.
//!
//! Slots are indexed by the compiled variable table. Assignment pushes the
//! slot index onto a fixed-slot stack; backtracking pops back to a saved
//! mark, clearing slots in reverse assignment order. Matched option rules
//! ride along and roll back with the same mark.

use crate::concurrent::pool;
use crate::eval::Evaluation;
use crate::expr::ExprRef;
use crate::symbol::SymbolRef;

pub struct Match {
    slots: Vec<Option<ExprRef>>,
    fixed: Vec<usize>,
    options: Vec<(SymbolRef, ExprRef)>,
}

/// A saved unwind point.
#[derive(Debug, Clone, Copy)]
pub struct Mark {
    fixed: usize,
    options: usize,
}

impl Match {
    pub fn new(n_slots: usize) -> Match {
        let mut slots = pool::acquire_slot_buffer();
        slots.resize(n_slots, None);
        let fixed = pool::acquire_index_buffer();
        Match {
            slots,
            fixed,
            options: Vec::new(),
        }
    }

    pub fn n_slots(&self) -> usize {
        self.slots.len()
    }

    pub fn n_fixed(&self) -> usize {
        self.fixed.len()
    }

    pub fn slot(&self, i: usize) -> Option<&ExprRef> {
        self.slots.get(i).and_then(|s| s.as_ref())
    }

    /// Binds slot `i`. A second binding of the same slot must be
    /// structurally equal to the first; otherwise the match fails.
    pub fn assign(&mut self, i: usize, value: ExprRef) -> bool {
        match &self.slots[i] {
            Some(existing) => existing.same(&value),
            None => {
                self.slots[i] = Some(value);
                self.fixed.push(i);
                true
            }
        }
    }

    pub fn push_option(&mut self, name: SymbolRef, value: ExprRef) {
        self.options.push((name, value));
    }

    pub fn options(&self) -> &[(SymbolRef, ExprRef)] {
        &self.options
    }

    pub fn mark(&self) -> Mark {
        Mark {
            fixed: self.fixed.len(),
            options: self.options.len(),
        }
    }

    /// Unbinds everything assigned after `mark`, newest first.
    pub fn backtrack(&mut self, mark: Mark) {
        while self.fixed.len() > mark.fixed {
            let slot = self.fixed.pop().expect("fixed stack underflow");
            self.slots[slot] = None;
        }
        self.options.truncate(mark.options);
    }

    pub fn reset(&mut self) {
        self.backtrack(Mark {
            fixed: 0,
            options: 0,
        });
    }
}

impl Drop for Match {
    fn drop(&mut self) {
        pool::release_slot_buffer(std::mem::take(&mut self.slots));
        pool::release_index_buffer(std::mem::take(&mut self.fixed));
    }
}

/// Everything the matcher threads through a match attempt.
pub struct MatchState<'a> {
    pub evaluation: &'a Evaluation,
    pub variables: &'a crate::pattern::compile::VariableTable,
    pub binding: Match,
    /// Case-insensitive character equality for string patterns.
    pub ignore_case: bool,
    /// Head symbol of the compound currently being matched; supplies
    /// `Default[f]` values for empty `Optional` captures.
    pub context_head: Option<SymbolRef>,
}

impl<'a> MatchState<'a> {
    pub fn new(
        variables: &'a crate::pattern::compile::VariableTable,
        evaluation: &'a Evaluation,
    ) -> MatchState<'a> {
        MatchState {
            evaluation,
            variables,
            binding: Match::new(variables.len()),
            ignore_case: false,
            context_head: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr;

    #[test]
    fn assignment_and_backtracking() {
        let mut m = Match::new(3);
        let mark = m.mark();
        assert!(m.assign(0, expr::integer_i64(1)));
        assert!(m.assign(2, expr::integer_i64(2)));
        assert_eq!(m.n_fixed(), 2);
        assert!(m.slot(0).is_some());

        m.backtrack(mark);
        assert_eq!(m.n_fixed(), 0);
        assert!(m.slot(0).is_none());
        assert!(m.slot(2).is_none());
    }

    #[test]
    fn rebinding_requires_structural_equality() {
        let mut m = Match::new(1);
        assert!(m.assign(0, expr::integer_i64(7)));
        assert!(m.assign(0, expr::integer_i64(7)));
        assert!(!m.assign(0, expr::integer_i64(8)));
        // failed rebind leaves the original binding in place
        assert!(m.slot(0).expect("bound").same(&expr::integer_i64(7)));
    }

    #[test]
    fn partial_backtrack_unwinds_newest_first() {
        let mut m = Match::new(3);
        assert!(m.assign(0, expr::integer_i64(1)));
        let mark = m.mark();
        assert!(m.assign(1, expr::integer_i64(2)));
        assert!(m.assign(2, expr::integer_i64(3)));
        m.backtrack(mark);
        assert!(m.slot(0).is_some());
        assert!(m.slot(1).is_none());
        assert!(m.slot(2).is_none());
    }
}
