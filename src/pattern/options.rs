//! Option-rule processing.
//!
//! An options run is a sequence of `name -> value` / `name :> value` rules,
//! possibly nested in lists. `OptionsPattern` consumes such a run into the
//! match; builtins that take options (`NumberForm`) parse runs through the
//! same helper.

use std::sync::Arc;

use crate::expr::{Expr, ExprRef};
use crate::symbol::table::Definitions;
use crate::symbol::SymbolRef;

/// Flattens one option leaf into `(name, value)` pairs. Returns `false`
/// when the leaf is not an option rule (or list of option rules).
pub fn collect_option_rules(
    item: &ExprRef,
    definitions: &Definitions,
    out: &mut Vec<(SymbolRef, ExprRef)>,
) -> bool {
    let e = match item.as_expression() {
        Some(e) => e,
        None => return false,
    };
    let head = match e.head_symbol() {
        Some(s) => s,
        None => return false,
    };

    if crate::expr::is_system_symbol(head, "List") {
        return e
            .leaves()
            .all(|leaf| collect_option_rules(&leaf, definitions, out));
    }

    let is_rule = crate::expr::is_system_symbol(head, "Rule")
        || crate::expr::is_system_symbol(head, "RuleDelayed");
    if !is_rule || e.size() != 2 {
        return false;
    }

    let name = match option_name(&e.leaf(0), definitions) {
        Some(name) => name,
        None => return false,
    };
    out.push((name, e.leaf(1)));
    true
}

/// Option keys are symbols, or strings naming a System symbol.
pub fn option_name(expr: &ExprRef, definitions: &Definitions) -> Option<SymbolRef> {
    match expr.as_ref() {
        Expr::Symbol(s) => Some(Arc::clone(s)),
        Expr::String(s) => Some(definitions.lookup(&format!("System`{}", s.utf8()))),
        _ => None,
    }
}

/// First value bound to `name` in a pair list.
pub fn lookup(pairs: &[(SymbolRef, ExprRef)], name: &SymbolRef) -> Option<ExprRef> {
    pairs
        .iter()
        .find(|(key, _)| Arc::ptr_eq(key, name))
        .map(|(_, value)| Arc::clone(value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr;
    use crate::symbol::table::Definitions;

    fn rule(defs: &Definitions, name: &str, value: ExprRef) -> ExprRef {
        expr::expression(
            expr::symbol(defs.lookup("System`Rule")),
            vec![expr::symbol(defs.lookup(name)), value],
        )
    }

    #[test]
    fn flat_and_nested_rules_collect() {
        let defs = Definitions::new();
        let nested = expr::expression(
            expr::symbol(defs.lookup("System`List")),
            vec![rule(&defs, "System`NumberPoint", expr::string("."))],
        );
        let mut out = Vec::new();
        assert!(collect_option_rules(
            &rule(&defs, "System`SignPadding", expr::symbol(defs.lookup("System`True"))),
            &defs,
            &mut out
        ));
        assert!(collect_option_rules(&nested, &defs, &mut out));
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].0.short_name(), "SignPadding");
        assert_eq!(out[1].0.short_name(), "NumberPoint");
    }

    #[test]
    fn string_keys_resolve_to_system_symbols() {
        let defs = Definitions::new();
        let name = option_name(&expr::string("DigitBlock"), &defs).expect("resolves");
        assert_eq!(name.name(), "System`DigitBlock");
    }

    #[test]
    fn non_rules_are_rejected() {
        let defs = Definitions::new();
        let mut out = Vec::new();
        assert!(!collect_option_rules(&expr::integer_i64(3), &defs, &mut out));
        assert!(out.is_empty());
    }
}
