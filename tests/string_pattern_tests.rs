//! String pattern matching over the character-sequence views.

mod common;

use common::kernel;
use symbolon::atoms::Str;
use symbolon::error::EvalError;
use symbolon::expr::{self, Expr, ExprRef};
use symbolon::pattern::{compile_string_pattern, matcher};

fn system(k: &common::Kernel, short: &str) -> ExprRef {
    k.system(short)
}

fn string_expression(k: &common::Kernel, parts: Vec<ExprRef>) -> ExprRef {
    expr::expression(system(k, "StringExpression"), parts)
}

fn captured(binding: &symbolon::pattern::Match, slot: usize) -> String {
    match binding.slot(slot).expect("bound slot").as_ref() {
        Expr::String(s) => s.utf8(),
        other => panic!("expected a string capture, got {}", other),
    }
}

#[test]
fn literal_patterns_anchor_to_the_whole_string() {
    let k = kernel();
    let pattern = compile_string_pattern(&expr::string("abc")).expect("compiles");
    let subject = Str::new("abc");
    assert!(matcher::match_string(&pattern, &subject, &k.evaluation, false)
        .expect("no error")
        .is_some());

    let longer = Str::new("abcd");
    assert!(matcher::match_string(&pattern, &longer, &k.evaluation, false)
        .expect("no error")
        .is_none());
}

#[test]
fn concatenation_with_binding_captures_substrings() {
    let k = kernel();
    // "pre" ~~ x__ compiled from StringExpression["pre", Pattern[x, BlankSequence[]]]
    let pattern_expr = string_expression(
        &k,
        vec![
            expr::string("pre"),
            expr::expression(
                system(&k, "Pattern"),
                vec![
                    k.global("x"),
                    expr::expression(system(&k, "BlankSequence"), vec![]),
                ],
            ),
        ],
    );
    let pattern = compile_string_pattern(&pattern_expr).expect("compiles");
    let subject = Str::new("prefix");
    let binding = matcher::match_string(&pattern, &subject, &k.evaluation, false)
        .expect("no error")
        .expect("matches");
    assert_eq!(captured(&binding, 0), "fix");
}

#[test]
fn captures_share_the_subject_extent() {
    let k = kernel();
    let pattern_expr = string_expression(
        &k,
        vec![
            expr::string("ab"),
            expr::expression(
                system(&k, "Pattern"),
                vec![
                    k.global("tail"),
                    expr::expression(system(&k, "BlankNullSequence"), vec![]),
                ],
            ),
        ],
    );
    let pattern = compile_string_pattern(&pattern_expr).expect("compiles");
    let subject = Str::new("abcde");
    let binding = matcher::match_string(&pattern, &subject, &k.evaluation, false)
        .expect("no error")
        .expect("matches");
    match binding.slot(0).expect("bound").as_ref() {
        Expr::String(s) => {
            assert_eq!(s.utf8(), "cde");
            assert!(s.shares_extent(&subject));
        }
        other => panic!("expected string, got {}", other),
    }
}

#[test]
fn case_insensitive_matching() {
    let k = kernel();
    let pattern = compile_string_pattern(&expr::string("Hello")).expect("compiles");
    let subject = Str::new("hello");
    assert!(matcher::match_string(&pattern, &subject, &k.evaluation, false)
        .expect("no error")
        .is_none());
    assert!(matcher::match_string(&pattern, &subject, &k.evaluation, true)
        .expect("no error")
        .is_some());
}

#[test]
fn search_finds_the_leftmost_window() {
    let k = kernel();
    let pattern = compile_string_pattern(&expr::string("an")).expect("compiles");
    let subject = Str::new("banana");
    let (begin, end, _) = matcher::string_search(&pattern, &subject, &k.evaluation, false)
        .expect("no error")
        .expect("found");
    assert_eq!((begin, end), (1, 3));
}

#[test]
fn word_boundary_is_zero_width() {
    let k = kernel();
    // WordBoundary ~~ "cat"
    let pattern_expr = string_expression(
        &k,
        vec![system(&k, "WordBoundary"), expr::string("cat")],
    );
    let pattern = compile_string_pattern(&pattern_expr).expect("compiles");

    let hit = Str::new("a cat");
    let found = matcher::string_search(&pattern, &hit, &k.evaluation, false)
        .expect("no error")
        .expect("found");
    assert_eq!((found.0, found.1), (2, 5));

    // inside a word there is no boundary before "cat"
    let miss = Str::new("concat");
    assert!(matcher::string_search(&pattern, &miss, &k.evaluation, false)
        .expect("no error")
        .is_none());
}

#[test]
fn alternatives_and_repetition_work_over_characters() {
    let k = kernel();
    // Repeated["a" | "b"] over the whole subject
    let alt = expr::expression(
        system(&k, "Alternatives"),
        vec![expr::string("a"), expr::string("b")],
    );
    let repeated = expr::expression(system(&k, "Repeated"), vec![alt]);
    let pattern = compile_string_pattern(&repeated).expect("compiles");

    assert!(matcher::match_string(&pattern, &Str::new("abba"), &k.evaluation, false)
        .expect("no error")
        .is_some());
    assert!(matcher::match_string(&pattern, &Str::new("abca"), &k.evaluation, false)
        .expect("no error")
        .is_none());
}

#[test]
fn grapheme_clusters_count_as_single_characters() {
    let k = kernel();
    // one blank consumes one character even when it spans two scalars
    let blank = expr::expression(system(&k, "Blank"), vec![]);
    let pattern_expr = string_expression(&k, vec![blank, expr::string("x")]);
    let pattern = compile_string_pattern(&pattern_expr).expect("compiles");

    let subject = Str::new("e\u{0301}x"); // é as base + combining accent
    assert_eq!(subject.len(), 2);
    assert!(matcher::match_string(&pattern, &subject, &k.evaluation, false)
        .expect("no error")
        .is_some());
}

#[test]
fn expression_only_constructs_are_rejected() {
    let k = kernel();
    let options = expr::expression(system(&k, "OptionsPattern"), vec![]);
    assert!(matches!(
        compile_string_pattern(&options),
        Err(EvalError::StringPatternError(_))
    ));

    let verbatim = expr::expression(system(&k, "Verbatim"), vec![expr::integer_i64(1)]);
    assert!(matches!(
        compile_string_pattern(&verbatim),
        Err(EvalError::StringPatternError(_))
    ));
}
