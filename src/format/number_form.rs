//! `NumberForm` option processing and rendering.
//!
//! The recognized option keys form a closed set; unknown keys are ignored
//! with a warning. Rendering splits a number's text into sign, integer and
//! fractional parts and applies digit blocking, separators, padding and
//! sign decoration.

use std::sync::Arc;

use tracing::warn;

use crate::eval::Evaluation;
use crate::expr::{Expr, ExprRef, Expression};
use crate::pattern::options::collect_option_rules;
use crate::symbol::SymbolRef;

#[derive(Debug, Clone, PartialEq)]
pub enum DigitBlock {
    Size(usize),
    Infinity,
}

#[derive(Debug, Clone)]
pub struct NumberFormOptions {
    pub digit_block: DigitBlock,
    pub exponent_function: Option<ExprRef>,
    pub exponent_step: i64,
    pub number_format: Option<ExprRef>,
    pub number_multiplier: String,
    /// Padding characters for the integer and fractional parts.
    pub number_padding: (String, String),
    pub number_point: String,
    /// Grouping separators for the integer and fractional parts.
    pub number_separator: (String, String),
    /// Decoration for negative and positive numbers.
    pub number_signs: (String, String),
    pub sign_padding: bool,
}

impl Default for NumberFormOptions {
    fn default() -> NumberFormOptions {
        NumberFormOptions {
            digit_block: DigitBlock::Infinity,
            exponent_function: None,
            exponent_step: 1,
            number_format: None,
            number_multiplier: "×".to_string(),
            number_padding: (String::new(), String::new()),
            number_point: ".".to_string(),
            number_separator: (",".to_string(), " ".to_string()),
            number_signs: ("-".to_string(), String::new()),
            sign_padding: false,
        }
    }
}

fn string_of(expr: &ExprRef) -> Option<String> {
    expr.as_string().map(|s| s.utf8())
}

fn string_pair(expr: &ExprRef) -> Option<(String, String)> {
    let e = expr.as_expression()?;
    if !e.head().is_system("List") || e.size() != 2 {
        return None;
    }
    Some((string_of(&e.leaf(0))?, string_of(&e.leaf(1))?))
}

/// Parses a `NumberForm` options run. Unknown keys warn through the output
/// sink and are otherwise ignored.
pub fn parse_options(
    leaves: &[ExprRef],
    evaluation: &Evaluation,
    context: &ExprRef,
) -> NumberFormOptions {
    let mut pairs: Vec<(SymbolRef, ExprRef)> = Vec::new();
    for leaf in leaves {
        if !collect_option_rules(leaf, evaluation.definitions(), &mut pairs) {
            warn!(option = %leaf, "malformed NumberForm option");
        }
    }

    let mut options = NumberFormOptions::default();
    for (key, value) in pairs {
        match key.short_name() {
            "DigitBlock" => {
                options.digit_block = match value.as_ref() {
                    Expr::MachineInteger(n) if *n > 0 => DigitBlock::Size(*n as usize),
                    Expr::Symbol(s) if crate::expr::is_system_symbol(s, "Infinity") => {
                        DigitBlock::Infinity
                    }
                    _ => {
                        warn!(value = %value, "invalid DigitBlock value");
                        continue;
                    }
                };
            }
            "ExponentFunction" => options.exponent_function = Some(value),
            "ExponentStep" => {
                if let Some(n) = value.as_machine_integer() {
                    options.exponent_step = n;
                }
            }
            "NumberFormat" => options.number_format = Some(value),
            "NumberMultiplier" => {
                if let Some(s) = string_of(&value) {
                    options.number_multiplier = s;
                }
            }
            "NumberPadding" => {
                if let Some(pair) = string_pair(&value) {
                    options.number_padding = pair;
                }
            }
            "NumberPoint" => {
                if let Some(s) = string_of(&value) {
                    options.number_point = s;
                }
            }
            "NumberSeparator" => {
                if let Some(pair) = string_pair(&value) {
                    options.number_separator = pair;
                }
            }
            "NumberSigns" => {
                if let Some(pair) = string_pair(&value) {
                    options.number_signs = pair;
                }
            }
            "SignPadding" => options.sign_padding = value.is_true(),
            _ => {
                evaluation.message(
                    &evaluation.symbols().general,
                    "optx",
                    &[
                        crate::expr::symbol(Arc::clone(&key)),
                        Arc::clone(context),
                    ],
                );
            }
        }
    }
    options
}

/// Renders `NumberForm[x, opts…]`; `None` when `x` is not a plain number.
pub fn render(e: &Expression, evaluation: &Evaluation) -> Option<String> {
    let value = e.leaf(0);
    let context: ExprRef = crate::expr::expression(Arc::clone(e.head()), e.materialize());
    let option_leaves: Vec<ExprRef> = (1..e.size())
        .map(|i| e.leaf(i))
        // a digit count spec `NumberForm[x, n]` is accepted and ignored here
        .filter(|l| l.as_machine_integer().is_none())
        .collect();
    let options = parse_options(&option_leaves, evaluation, &context);

    let text = match value.as_ref() {
        Expr::MachineInteger(v) => v.to_string(),
        Expr::BigInteger(v) => v.value.to_string(),
        Expr::MachineReal(v) => crate::format::format_f64(*v),
        Expr::BigReal(v) => v.to_decimal_string(),
        _ => return None,
    };
    Some(decorate(&text, &options))
}

fn decorate(text: &str, options: &NumberFormOptions) -> String {
    let (negative, unsigned) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };
    let (int_part, frac_part) = match unsigned.split_once('.') {
        Some((i, f)) => (i, Some(f)),
        None => (unsigned, None),
    };

    let int_grouped = match options.digit_block {
        DigitBlock::Infinity => int_part.to_string(),
        DigitBlock::Size(block) => group_integer(int_part, block, &options.number_separator.0),
    };
    let frac_grouped = frac_part.map(|f| match options.digit_block {
        DigitBlock::Infinity => f.to_string(),
        DigitBlock::Size(block) => group_fraction(f, block, &options.number_separator.1),
    });

    let mut body = String::new();
    body.push_str(&int_grouped);
    if let Some(frac) = frac_grouped {
        body.push_str(&options.number_point);
        body.push_str(&frac);
        body.push_str(&options.number_padding.1);
    }

    let sign = if negative {
        &options.number_signs.0
    } else {
        &options.number_signs.1
    };
    let pad = &options.number_padding.0;
    if options.sign_padding {
        // sign first, then the integer padding
        format!("{}{}{}", sign, pad, body)
    } else {
        format!("{}{}{}", pad, sign, body)
    }
}

fn group_integer(digits: &str, block: usize, separator: &str) -> String {
    let chars: Vec<char> = digits.chars().collect();
    let mut out = String::new();
    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i) % block == 0 {
            out.push_str(separator);
        }
        out.push(*c);
    }
    out
}

fn group_fraction(digits: &str, block: usize, separator: &str) -> String {
    let mut out = String::new();
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && i % block == 0 {
            out.push_str(separator);
        }
        out.push(c);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::{Evaluation, TestOutput};
    use crate::expr;
    use crate::symbol::table::Definitions;

    fn evaluation_with_sink() -> (Evaluation, Arc<TestOutput>) {
        let sink = Arc::new(TestOutput::new());
        let ev = Evaluation::new(Definitions::new(), Arc::clone(&sink) as Arc<dyn crate::eval::Output>);
        (ev, sink)
    }

    fn rule(ev: &Evaluation, key: &str, value: ExprRef) -> ExprRef {
        expr::expr2(
            expr::symbol(Arc::clone(&ev.symbols().rule)),
            expr::symbol(ev.definitions().system(key)),
            value,
        )
    }

    #[test]
    fn digit_blocks_group_from_the_right() {
        assert_eq!(group_integer("1234567", 3, ","), "1,234,567");
        assert_eq!(group_fraction("1234567", 3, " "), "123 456 7");
    }

    #[test]
    fn options_parse_and_apply() {
        let (ev, _sink) = evaluation_with_sink();
        let context = expr::integer_i64(0);
        let opts = parse_options(
            &[
                rule(&ev, "DigitBlock", expr::integer_i64(3)),
                rule(&ev, "NumberPoint", expr::string(",")),
            ],
            &ev,
            &context,
        );
        assert_eq!(opts.digit_block, DigitBlock::Size(3));
        assert_eq!(decorate("1234.5", &opts), "1,234,5");
    }

    #[test]
    fn unknown_keys_warn_and_are_ignored() {
        let (ev, sink) = evaluation_with_sink();
        let context = expr::integer_i64(0);
        let bogus = expr::expr2(
            expr::symbol(Arc::clone(&ev.symbols().rule)),
            expr::symbol(ev.definitions().system("NoSuchOption")),
            expr::integer_i64(1),
        );
        let opts = parse_options(&[bogus], &ev, &context);
        assert_eq!(opts.digit_block, DigitBlock::Infinity);
        assert!(sink.contains("General", "optx"));
    }

    #[test]
    fn negative_numbers_take_the_negative_sign() {
        let mut opts = NumberFormOptions::default();
        opts.number_signs = ("(".to_string(), "+".to_string());
        assert_eq!(decorate("-42", &opts), "(42");
        assert_eq!(decorate("42", &opts), "+42");
    }
}
