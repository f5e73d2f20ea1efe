//! Output formatting: box construction and box-to-text rendering.
//!
//! Formatted output is a tree of box expressions: `RowBox` concatenates,
//! `SuperscriptBox[a, b]` renders as `a^b`, `StyleBox` applies
//! presentational options (`ShowStringCharacters` is the one the text
//! renderer honors). Per-symbol format rules are consulted before generic
//! box construction.

pub mod number_form;

use std::sync::Arc;

use crate::eval::Evaluation;
use crate::expr::{self, Expr, ExprRef};

/// Machine reals print with an explicit decimal point: `6.`, `1.5`.
pub fn format_f64(x: f64) -> String {
    if !x.is_finite() {
        return if x.is_nan() {
            "Indeterminate".to_string()
        } else if x > 0.0 {
            "Infinity".to_string()
        } else {
            "-Infinity".to_string()
        };
    }
    let text = x.to_string();
    if text.contains('.') || text.contains('e') || text.contains('E') {
        text
    } else {
        format!("{}.", text)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct StyleBoxOptions {
    pub show_string_characters: bool,
}

impl Default for StyleBoxOptions {
    fn default() -> StyleBoxOptions {
        StyleBoxOptions {
            show_string_characters: false,
        }
    }
}

/// Builds the box form of an expression. Format rules attached to the
/// relevant symbol run first; the generic layout is `head[arg, …]` as a
/// `RowBox`, with `Power` rendered as a superscript.
pub fn make_boxes(expr: &ExprRef, evaluation: &Evaluation) -> ExprRef {
    let symbols = evaluation.symbols();

    // per-symbol format rules take precedence
    if let Some(formatted) = apply_format_rules(expr, evaluation) {
        return make_boxes(&formatted, evaluation);
    }

    match expr.as_ref() {
        Expr::MachineInteger(_)
        | Expr::BigInteger(_)
        | Expr::BigRational(_)
        | Expr::MachineReal(_)
        | Expr::BigReal(_)
        | Expr::MachineComplex(_)
        | Expr::BigComplex(_) => expr::string(&format!("{}", expr)),
        Expr::Symbol(sym) => expr::string(sym.short_name()),
        Expr::String(_) => Arc::clone(expr),
        Expr::Expression(e) => {
            // NumberForm[x, opts…] renders through the options machinery
            if e.head_symbol()
                .is_some_and(|s| Arc::ptr_eq(s, &symbols.number_form))
                && e.size() >= 1
            {
                if let Some(text) = number_form::render(e, evaluation) {
                    return expr::string(&text);
                }
            }

            if e.has_form("Power", 2) {
                return expr::expr2(
                    expr::symbol(Arc::clone(&symbols.superscript_box)),
                    make_boxes(&e.leaf(0), evaluation),
                    make_boxes(&e.leaf(1), evaluation),
                );
            }

            let mut parts: Vec<ExprRef> = Vec::with_capacity(2 * e.size() + 3);
            parts.push(make_boxes(e.head(), evaluation));
            parts.push(expr::string("["));
            for (i, leaf) in e.leaves().enumerate() {
                if i > 0 {
                    parts.push(expr::string(", "));
                }
                parts.push(make_boxes(&leaf, evaluation));
            }
            parts.push(expr::string("]"));
            expr::expr1(
                expr::symbol(Arc::clone(&symbols.row_box)),
                expr::expression(expr::symbol(Arc::clone(&symbols.list)), parts),
            )
        }
    }
}

fn apply_format_rules(expr: &ExprRef, evaluation: &Evaluation) -> Option<ExprRef> {
    let name = match expr.as_ref() {
        Expr::Symbol(sym) => Arc::clone(sym),
        Expr::Expression(e) => Arc::clone(e.head_symbol()?),
        _ => return None,
    };
    let rules = {
        let state = name.state();
        if state.format_rules.is_empty() {
            return None;
        }
        let size = expr.as_expression().map(|e| e.size()).unwrap_or(0);
        state.format_rules.candidates(size, expr.hash())
    };
    for rule in rules {
        let matcher = rule.matcher().ok()?;
        if let Ok(Some(binding)) =
            crate::pattern::matcher::match_rule(&matcher, expr, evaluation)
        {
            let rewrite = rule.rewrite(&matcher);
            let options = crate::pattern::rewrite::OptionContext {
                matched: binding.options(),
                head: Some(&name),
            };
            if let Ok(result) = rewrite.apply(&rule.rhs, &binding, &options) {
                if let Ok(evaluated) = crate::eval::evaluate(&result, evaluation) {
                    return Some(evaluated);
                }
                return Some(result);
            }
        }
    }
    None
}

/// Renders a box tree to plain text.
pub fn boxes_to_text(boxes: &ExprRef, options: &StyleBoxOptions, evaluation: &Evaluation) -> String {
    match boxes.as_ref() {
        Expr::String(s) => {
            if options.show_string_characters {
                format!("\"{}\"", s)
            } else {
                s.utf8()
            }
        }
        Expr::Expression(e) => {
            if e.head_symbol()
                .is_some_and(|s| crate::expr::is_system_symbol(s, "StyleBox"))
                && e.size() >= 1
            {
                let mut modified = *options;
                for i in 1..e.size() {
                    let leaf = e.leaf(i);
                    if let Some(rule) = leaf.as_expression() {
                        if rule.has_form("Rule", 2)
                            && rule.leaf(0).is_system("ShowStringCharacters")
                        {
                            modified.show_string_characters = rule.leaf(1).is_true();
                        }
                    }
                }
                return boxes_to_text(&e.leaf(0), &modified, evaluation);
            }

            if e.has_form("RowBox", 1) {
                if let Some(list) = e.leaf(0).as_expression() {
                    if list.head().is_system("List") {
                        let mut out = String::new();
                        for leaf in list.leaves() {
                            out.push_str(&boxes_to_text(&leaf, options, evaluation));
                        }
                        return out;
                    }
                }
            }

            if e.has_form("SuperscriptBox", 2) {
                return format!(
                    "{}^{}",
                    boxes_to_text(&e.leaf(0), options, evaluation),
                    boxes_to_text(&e.leaf(1), options, evaluation)
                );
            }

            // not a box: fall back to the structural form
            format!("{}", boxes)
        }
        other => format!("{}", other),
    }
}

/// The output-formatted form used by message substitution and hosts.
pub fn format_output(expr: &ExprRef, evaluation: &Evaluation) -> String {
    let boxes = make_boxes(expr, evaluation);
    boxes_to_text(&boxes, &StyleBoxOptions::default(), evaluation)
}
