//! Canonical ordering and pattern specificity keys.
//!
//! Orderless heads sort their leaves by a canonical order: numbers first (by
//! value), then strings, then symbols and monomials, then general
//! expressions. Products carry a monomial interpretation — `Times[x, y^2]`
//! orders as the monomial `{x: 1, y: 2}` — shared between canonicalization
//! and pattern keys.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::expr::{Expr, Expression};

/// The monomial interpretation of a product, mapping symbol names to
/// integer degrees. `None` when the expression has no monomial reading.
pub fn monomial_of(expr: &Expr) -> Option<BTreeMap<String, i64>> {
    let mut map = BTreeMap::new();
    match expr {
        Expr::Symbol(s) => {
            map.insert(s.name().to_string(), 1);
            Some(map)
        }
        Expr::Expression(e) => {
            let head = e.head_symbol()?;
            if crate::expr::is_system_symbol(head, "Power") && e.size() == 2 {
                let var = e.leaf(0);
                let exp = e.leaf(1);
                if let (Expr::Symbol(s), Expr::MachineInteger(n)) = (var.as_ref(), exp.as_ref()) {
                    map.insert(s.name().to_string(), *n);
                    return Some(map);
                }
                None
            } else if crate::expr::is_system_symbol(head, "Times") {
                let mut any = false;
                for leaf in e.leaves() {
                    if leaf.is_number() {
                        continue;
                    }
                    let part = monomial_of(&leaf)?;
                    for (name, degree) in part {
                        *map.entry(name).or_insert(0) += degree;
                        any = true;
                    }
                }
                if any {
                    Some(map)
                } else {
                    None
                }
            } else {
                None
            }
        }
        _ => None,
    }
}

fn monomial_cmp(a: &BTreeMap<String, i64>, b: &BTreeMap<String, i64>) -> Ordering {
    let mut ia = a.iter();
    let mut ib = b.iter();
    loop {
        match (ia.next(), ib.next()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some((na, da)), Some((nb, db))) => {
                match na.cmp(nb).then(da.cmp(db)) {
                    Ordering::Equal => {}
                    other => return other,
                }
            }
        }
    }
}

fn class_rank(expr: &Expr) -> u8 {
    match expr {
        _ if expr.is_number() => 0,
        Expr::String(_) => 1,
        Expr::Symbol(_) => 2,
        _ => 3,
    }
}

/// Total canonical order over expressions.
pub fn canonical_cmp(a: &Expr, b: &Expr) -> Ordering {
    let (ra, rb) = (class_rank(a), class_rank(b));

    if ra == 0 && rb == 0 {
        return match crate::numeric::compare(a, b) {
            Some(Ordering::Equal) | None => {
                // exact sorts before inexact at equal value
                (a.is_inexact() as u8)
                    .cmp(&(b.is_inexact() as u8))
                    .then_with(|| a.hash().cmp(&b.hash()))
            }
            Some(order) => order,
        };
    }

    // monomials interleave symbols and products
    if ra >= 2 && rb >= 2 {
        if let (Some(ma), Some(mb)) = (monomial_of(a), monomial_of(b)) {
            match monomial_cmp(&ma, &mb) {
                Ordering::Equal => {}
                other => return other,
            }
            return structural_cmp(a, b);
        }
    }

    match ra.cmp(&rb) {
        Ordering::Equal => match (a, b) {
            (Expr::String(x), Expr::String(y)) => x.utf8().cmp(&y.utf8()),
            (Expr::Symbol(x), Expr::Symbol(y)) => x.name().cmp(y.name()),
            (Expr::Expression(x), Expr::Expression(y)) => expression_cmp(x, y),
            _ => Ordering::Equal,
        },
        other => other,
    }
}

fn structural_cmp(a: &Expr, b: &Expr) -> Ordering {
    match (a, b) {
        (Expr::Symbol(_), Expr::Expression(_)) => Ordering::Less,
        (Expr::Expression(_), Expr::Symbol(_)) => Ordering::Greater,
        (Expr::Expression(x), Expr::Expression(y)) => expression_cmp(x, y),
        _ => canonical_cmp(a, b),
    }
}

fn expression_cmp(a: &Expression, b: &Expression) -> Ordering {
    canonical_cmp(a.head(), b.head())
        .then_with(|| a.size().cmp(&b.size()))
        .then_with(|| {
            for i in 0..a.size() {
                match canonical_cmp(&a.leaf(i), &b.leaf(i)) {
                    Ordering::Equal => {}
                    other => return other,
                }
            }
            Ordering::Equal
        })
}

/// Specificity key for rule ordering. Lower keys are more specific and are
/// tried first. The leading components follow the lexicographic tuple of the
/// rule tables: structural kind, head size, pattern-test presence,
/// condition presence.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct PatternSortKey {
    /// 0 literal, 1 compound-with-patterns, 2 fixed-head blank,
    /// 3 generic blank, 4 blank-sequence, 5 blank-null-sequence,
    /// 6 alternatives, 7 malformed.
    pub class: u8,
    pub head_size: u32,
    /// 0 when a pattern test or binding wraps the pattern.
    pub pattern_test: u8,
    /// 0 when a condition guards the pattern.
    pub condition: u8,
    /// 0 by default; 1 for `Optional` wrappers.
    pub optional: u8,
    /// Classes of leaf patterns, a lexicographic tiebreak for compounds.
    pub leaf_classes: Vec<u8>,
    /// Deterministic final tiebreak.
    pub tiebreak: u64,
}

impl PatternSortKey {
    fn literal(expr: &Expr) -> PatternSortKey {
        PatternSortKey {
            class: 0,
            head_size: 0,
            pattern_test: 1,
            condition: 1,
            optional: 0,
            leaf_classes: Vec::new(),
            tiebreak: expr.hash(),
        }
    }

    fn of_class(class: u8, expr: &Expr) -> PatternSortKey {
        PatternSortKey {
            class,
            head_size: 0,
            pattern_test: 1,
            condition: 1,
            optional: 0,
            leaf_classes: Vec::new(),
            tiebreak: expr.hash(),
        }
    }
}

pub fn pattern_sort_key(expr: &Expr) -> PatternSortKey {
    let e = match expr.as_expression() {
        Some(e) => e,
        None => return PatternSortKey::literal(expr),
    };

    let head_name = e
        .head_symbol()
        .and_then(|s| s.name().strip_prefix("System`"));

    match head_name {
        Some("Blank") => PatternSortKey::of_class(if e.size() > 0 { 2 } else { 3 }, expr),
        Some("BlankSequence") => PatternSortKey::of_class(4, expr),
        Some("BlankNullSequence") => PatternSortKey::of_class(5, expr),
        Some("Alternatives") => PatternSortKey::of_class(6, expr),
        Some("Pattern") => {
            if e.size() != 2 {
                PatternSortKey::of_class(7, expr)
            } else {
                let mut key = pattern_sort_key(&e.leaf(1));
                key.pattern_test = 0;
                key
            }
        }
        Some("PatternTest") => {
            if e.size() != 2 {
                PatternSortKey::of_class(7, expr)
            } else {
                let mut key = pattern_sort_key(&e.leaf(0));
                key.pattern_test = 0;
                key
            }
        }
        Some("Condition") => {
            if e.size() != 2 {
                PatternSortKey::of_class(7, expr)
            } else {
                let mut key = pattern_sort_key(&e.leaf(0));
                key.condition = 0;
                key
            }
        }
        Some("Optional") => {
            if e.size() == 0 || e.size() > 2 {
                PatternSortKey::of_class(7, expr)
            } else {
                let mut key = pattern_sort_key(&e.leaf(0));
                key.optional = 1;
                key
            }
        }
        _ => {
            // a compound: pure literal when no pattern construct occurs
            if expr.match_hash().is_some() {
                PatternSortKey::literal(expr)
            } else {
                let leaf_classes = e
                    .leaves()
                    .map(|leaf| pattern_sort_key(&leaf).class)
                    .collect();
                PatternSortKey {
                    class: 1,
                    head_size: e.size() as u32,
                    pattern_test: 1,
                    condition: 1,
                    optional: 0,
                    leaf_classes,
                    tiebreak: expr.hash(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr;
    use crate::symbol::Symbol;
    use std::sync::Arc;

    fn sym(name: &str) -> crate::symbol::SymbolRef {
        Symbol::create(name)
    }

    fn blank() -> crate::expr::ExprRef {
        expr::expression(expr::symbol(sym("System`Blank")), vec![])
    }

    #[test]
    fn numbers_sort_before_symbols() {
        let x = expr::symbol(sym("Global`x"));
        let two = expr::integer_i64(2);
        assert_eq!(canonical_cmp(&two, &x), Ordering::Less);
        assert_eq!(canonical_cmp(&x, &two), Ordering::Greater);
    }

    #[test]
    fn numbers_sort_by_value_across_kinds() {
        let half = expr::rational(num_bigint::BigInt::from(1), num_bigint::BigInt::from(2))
            .expect("denom");
        let one = expr::integer_i64(1);
        assert_eq!(canonical_cmp(&half, &one), Ordering::Less);
    }

    #[test]
    fn monomials_interleave_symbols_and_products() {
        let x = expr::symbol(sym("Global`x"));
        let y = expr::symbol(sym("Global`y"));
        let times = expr::symbol(sym("System`Times"));
        // 2 x sorts with monomial {x: 1}, after x itself but before y
        let two_x = expr::expression(Arc::clone(&times), vec![expr::integer_i64(2), Arc::clone(&x)]);
        assert_eq!(canonical_cmp(&x, &two_x), Ordering::Less);
        assert_eq!(canonical_cmp(&two_x, &y), Ordering::Less);
    }

    #[test]
    fn power_contributes_degree() {
        let y = sym("Global`y");
        let power = expr::symbol(sym("System`Power"));
        let y_sq = expr::expression(
            power,
            vec![expr::symbol(Arc::clone(&y)), expr::integer_i64(2)],
        );
        let m = monomial_of(&y_sq).expect("monomial");
        assert_eq!(m.get("Global`y"), Some(&2));
        // y < y^2
        assert_eq!(
            canonical_cmp(&expr::symbol(y), &y_sq),
            Ordering::Less
        );
    }

    #[test]
    fn literal_sorts_before_blank() {
        let lit = expr::integer_i64(1);
        assert!(pattern_sort_key(&lit) < pattern_sort_key(&blank()));
    }

    #[test]
    fn blank_kinds_order_by_generality() {
        let fixed = expr::expression(
            expr::symbol(sym("System`Blank")),
            vec![expr::symbol(sym("System`Integer"))],
        );
        let generic = blank();
        let seq = expr::expression(expr::symbol(sym("System`BlankSequence")), vec![]);
        let null_seq = expr::expression(expr::symbol(sym("System`BlankNullSequence")), vec![]);
        let keys = [
            pattern_sort_key(&fixed),
            pattern_sort_key(&generic),
            pattern_sort_key(&seq),
            pattern_sort_key(&null_seq),
        ];
        for pair in keys.windows(2) {
            assert!(pair[0] < pair[1], "expected {:?} < {:?}", pair[0], pair[1]);
        }
    }

    #[test]
    fn condition_makes_a_pattern_more_specific() {
        let f = sym("Global`f");
        let plain = expr::expression(expr::symbol(Arc::clone(&f)), vec![blank()]);
        let guarded = expr::expression(
            expr::symbol(sym("System`Condition")),
            vec![plain.clone(), expr::symbol(sym("System`True"))],
        );
        assert!(pattern_sort_key(&guarded) < pattern_sort_key(&plain));
    }

    #[test]
    fn literal_call_sorts_before_pattern_call() {
        let f = sym("Global`f");
        let lit_call = expr::expression(expr::symbol(Arc::clone(&f)), vec![expr::integer_i64(1)]);
        let pat_call = expr::expression(expr::symbol(f), vec![blank()]);
        assert!(pattern_sort_key(&lit_call) < pattern_sort_key(&pat_call));
    }
}
