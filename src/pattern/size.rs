//! Match-size intervals.
//!
//! Every matcher knows how many sequence items it can consume; outer
//! matchers use the bounds to prune infeasible splits before recursing.

use crate::expr::Expr;

pub const MATCH_MAX: u64 = u64::MAX >> 2; // safe for additions

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchSize {
    min: u64,
    max: u64,
}

impl MatchSize {
    pub fn exactly(n: u64) -> MatchSize {
        MatchSize { min: n, max: n }
    }

    pub fn at_least(n: u64) -> MatchSize {
        MatchSize {
            min: n,
            max: MATCH_MAX,
        }
    }

    pub fn between(min: u64, max: u64) -> MatchSize {
        MatchSize { min, max }
    }

    pub fn min(&self) -> u64 {
        self.min
    }

    pub fn max(&self) -> u64 {
        self.max
    }

    pub fn contains(&self, n: usize) -> bool {
        let n = n as u64;
        n >= self.min && n <= self.max
    }

    /// `Some(n)` when the interval is a single finite size.
    pub fn fixed(&self) -> Option<usize> {
        if self.min == self.max {
            Some(self.min as usize)
        } else {
            None
        }
    }

    pub fn add(&self, other: &MatchSize) -> MatchSize {
        MatchSize {
            min: self.min + other.min,
            max: if self.max == MATCH_MAX || other.max == MATCH_MAX {
                MATCH_MAX
            } else {
                self.max + other.max
            },
        }
    }

    pub fn union(&self, other: &MatchSize) -> MatchSize {
        MatchSize {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

/// How many sequence items a pattern expression can consume, before
/// compilation. Mirrors the compiled matcher's bounds; rule tables use it
/// to prune without compiling.
pub fn pattern_match_size(expr: &Expr) -> MatchSize {
    let e = match expr.as_expression() {
        Some(e) => e,
        None => return MatchSize::exactly(1),
    };
    let head_name = e
        .head_symbol()
        .and_then(|s| s.name().strip_prefix("System`"));

    match head_name {
        Some("Blank") => MatchSize::exactly(1),
        Some("BlankSequence") => MatchSize::at_least(1),
        Some("BlankNullSequence") => MatchSize::at_least(0),
        Some("OptionsPattern") => MatchSize::at_least(0),
        Some("Pattern") if e.size() == 2 => pattern_match_size(&e.leaf(1)),
        Some("Alternatives") => {
            let n = e.size();
            if n == 0 {
                return MatchSize::exactly(1);
            }
            let mut size = pattern_match_size(&e.leaf(0));
            for i in 1..n {
                size = size.union(&pattern_match_size(&e.leaf(i)));
            }
            size
        }
        Some("Repeated") => MatchSize::at_least(1),
        Some("RepeatedNull") => MatchSize::at_least(0),
        Some("Except") => MatchSize::at_least(0),
        Some("Optional") => MatchSize::at_least(0),
        Some("Shortest") | Some("Longest") if e.size() >= 1 && e.size() <= 2 => {
            pattern_match_size(&e.leaf(0))
        }
        Some("PatternTest") | Some("Condition") if e.size() == 2 => {
            pattern_match_size(&e.leaf(0))
        }
        _ => MatchSize::exactly(1),
    }
}

/// Size bounds a rule imposes on the leaf count of its subject. Patterns
/// like `f[x_, y_]` only match two-leaf subjects; wrappers look through to
/// the wrapped pattern; bare blanks and atoms impose nothing.
pub fn rule_subject_size(pattern: &Expr) -> MatchSize {
    let e = match pattern.as_expression() {
        Some(e) => e,
        None => return MatchSize::at_least(0),
    };
    let head_name = e
        .head_symbol()
        .and_then(|s| s.name().strip_prefix("System`"));

    match head_name {
        Some("Condition") | Some("PatternTest") if e.size() == 2 => {
            rule_subject_size(&e.leaf(0))
        }
        Some("Pattern") if e.size() == 2 => rule_subject_size(&e.leaf(1)),
        Some("HoldPattern") if e.size() == 1 => rule_subject_size(&e.leaf(0)),
        Some(
            "Blank" | "BlankSequence" | "BlankNullSequence" | "Alternatives" | "Repeated"
            | "RepeatedNull" | "Except" | "Optional" | "OptionsPattern" | "Verbatim"
            | "Shortest" | "Longest" | "Pattern" | "Condition" | "PatternTest" | "HoldPattern",
        ) => MatchSize::at_least(0),
        _ => leaf_match_size(e),
    }
}

/// Total consumption of an expression's leaves, viewed as a pattern
/// sequence.
pub fn leaf_match_size(e: &crate::expr::Expression) -> MatchSize {
    let mut size = MatchSize::exactly(0);
    for leaf in e.leaves() {
        size = size.add(&pattern_match_size(&leaf));
    }
    size
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr;
    use crate::symbol::Symbol;

    fn pattern(head: &str, leaves: Vec<crate::expr::ExprRef>) -> crate::expr::ExprRef {
        expr::expression(expr::symbol(Symbol::create(&format!("System`{}", head))), leaves)
    }

    #[test]
    fn blanks_have_the_documented_bounds() {
        assert_eq!(pattern_match_size(&pattern("Blank", vec![])), MatchSize::exactly(1));
        assert_eq!(
            pattern_match_size(&pattern("BlankSequence", vec![])),
            MatchSize::at_least(1)
        );
        assert_eq!(
            pattern_match_size(&pattern("BlankNullSequence", vec![])),
            MatchSize::at_least(0)
        );
    }

    #[test]
    fn alternatives_take_the_union() {
        let alt = pattern(
            "Alternatives",
            vec![pattern("Blank", vec![]), pattern("BlankSequence", vec![])],
        );
        let size = pattern_match_size(&alt);
        assert_eq!(size.min(), 1);
        assert_eq!(size.max(), MATCH_MAX);
    }

    #[test]
    fn literals_consume_one() {
        assert_eq!(
            pattern_match_size(&expr::integer_i64(5)),
            MatchSize::exactly(1)
        );
    }

    #[test]
    fn addition_saturates_at_unbounded() {
        let a = MatchSize::exactly(2);
        let b = MatchSize::at_least(1);
        let sum = a.add(&b);
        assert_eq!(sum.min(), 3);
        assert_eq!(sum.max(), MATCH_MAX);
        assert!(sum.fixed().is_none());
    }
}
