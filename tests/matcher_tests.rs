//! Pattern constructor coverage through rule application: blanks,
//! sequences, alternatives, guards, options, defaults, and the
//! Orderless/Flat matching modes.

mod common;

use common::{assert_same, int, kernel, string};

#[test]
fn headed_blanks_constrain_the_argument() {
    let k = kernel();
    let lhs = k.call(
        k.global("f"),
        vec![k.call(
            k.system("Pattern"),
            vec![k.global("x"), k.blank_headed("Integer")],
        )],
    );
    k.define(lhs, string("integer"));

    assert_same(
        &k.eval(&k.call(k.global("f"), vec![int(3)])),
        &string("integer"),
    );
    let on_real = k.eval(&k.call(k.global("f"), vec![common::real(3.0)]));
    assert!(on_real.as_expression().is_some(), "reals must not match");
}

#[test]
fn blank_sequence_captures_multiple_leaves() {
    let k = kernel();
    // f[x__] := Length[List[x]]
    let lhs = k.call(k.global("f"), vec![k.var_seq("x")]);
    let rhs = k.call(
        k.system("Length"),
        vec![k.call(k.system("List"), vec![k.global("x")])],
    );
    k.define(lhs, rhs);

    let call = k.call(k.global("f"), vec![int(1), int(2), int(3)]);
    assert_same(&k.eval(&call), &int(3));
}

#[test]
fn blank_null_sequence_matches_empty() {
    let k = kernel();
    let null_seq = k.call(k.system("BlankNullSequence"), vec![]);
    let lhs = k.call(
        k.global("f"),
        vec![k.call(k.system("Pattern"), vec![k.global("x"), null_seq])],
    );
    let rhs = k.call(
        k.system("Length"),
        vec![k.call(k.system("List"), vec![k.global("x")])],
    );
    k.define(lhs, rhs);

    assert_same(&k.eval(&k.call(k.global("f"), vec![])), &int(0));
    assert_same(&k.eval(&k.call(k.global("f"), vec![int(5), int(6)])), &int(2));
}

#[test]
fn alternatives_try_in_order() {
    let k = kernel();
    let alt = k.call(k.system("Alternatives"), vec![int(1), int(2)]);
    let lhs = k.call(k.global("f"), vec![alt]);
    k.define(lhs, string("hit"));

    assert_same(&k.eval(&k.call(k.global("f"), vec![int(2)])), &string("hit"));
    let miss = k.eval(&k.call(k.global("f"), vec![int(3)]));
    assert!(miss.as_expression().is_some());
}

#[test]
fn repeated_matches_runs() {
    let k = kernel();
    // f[Repeated[1]] matches any positive run of 1s
    let repeated = k.call(k.system("Repeated"), vec![int(1)]);
    let lhs = k.call(k.global("f"), vec![repeated]);
    k.define(lhs, string("ones"));

    assert_same(
        &k.eval(&k.call(k.global("f"), vec![int(1), int(1), int(1)])),
        &string("ones"),
    );
    let miss = k.eval(&k.call(k.global("f"), vec![int(1), int(2)]));
    assert!(miss.as_expression().is_some());
}

#[test]
fn except_rejects_the_forbidden_value() {
    let k = kernel();
    let except = k.call(k.system("Except"), vec![int(0)]);
    let lhs = k.call(k.global("f"), vec![except]);
    k.define(lhs, string("nonzero"));

    assert_same(&k.eval(&k.call(k.global("f"), vec![int(7)])), &string("nonzero"));
    let zero = k.eval(&k.call(k.global("f"), vec![int(0)]));
    assert!(zero.as_expression().is_some());
}

#[test]
fn pattern_test_evaluates_the_predicate() {
    let k = kernel();
    // pos[x_ ? Function[Slot[1] > 0 is unavailable; use a defined predicate]]
    // predicate: positive[n_] with literal rules
    k.define(
        k.call(k.global("positive"), vec![int(1)]),
        k.system("True"),
    );
    k.define(
        k.call(k.global("positive"), vec![int(0)]),
        k.system("False"),
    );

    let tested = k.call(
        k.system("PatternTest"),
        vec![k.var("x"), k.global("positive")],
    );
    let lhs = k.call(k.global("f"), vec![tested]);
    k.define(lhs, string("positive"));

    assert_same(&k.eval(&k.call(k.global("f"), vec![int(1)])), &string("positive"));
    let miss = k.eval(&k.call(k.global("f"), vec![int(0)]));
    assert!(miss.as_expression().is_some());
}

#[test]
fn condition_sees_the_bindings() {
    let k = kernel();
    // f[x_ /; SameQ[x, 5]] := "five"
    let condition = k.call(
        k.system("Condition"),
        vec![
            k.var("x"),
            k.call(k.system("SameQ"), vec![k.global("x"), int(5)]),
        ],
    );
    let lhs = k.call(k.global("f"), vec![condition]);
    k.define(lhs, string("five"));

    assert_same(&k.eval(&k.call(k.global("f"), vec![int(5)])), &string("five"));
    let miss = k.eval(&k.call(k.global("f"), vec![int(6)]));
    assert!(miss.as_expression().is_some());
}

#[test]
fn optional_fills_explicit_defaults() {
    let k = kernel();
    // f[x_, Optional[y_, 10]] := x + y
    let optional = k.call(k.system("Optional"), vec![k.var("y"), int(10)]);
    let lhs = k.call(k.global("f"), vec![k.var("x"), optional]);
    k.define(lhs, k.call(k.system("Plus"), vec![k.global("x"), k.global("y")]));

    assert_same(&k.eval(&k.call(k.global("f"), vec![int(1), int(2)])), &int(3));
    assert_same(&k.eval(&k.call(k.global("f"), vec![int(1)])), &int(11));
}

#[test]
fn optional_falls_back_to_the_head_default() {
    let k = kernel();
    // Plus carries Default 0: u[x_ + Optional[y_]] picks y = 0 on a bare leaf
    let optional = k.call(k.system("Optional"), vec![k.var("y")]);
    let plus_pattern = k.call(k.system("Plus"), vec![k.var("x"), optional]);
    let lhs = k.call(k.global("u"), vec![plus_pattern]);
    k.define(lhs, k.call(k.system("List"), vec![k.global("x"), k.global("y")]));

    // u[Plus[a, b]] binds normally
    let both = k.eval(&k.call(
        k.global("u"),
        vec![k.call(k.system("Plus"), vec![k.global("a"), k.global("b")])],
    ));
    let both = both.as_expression().expect("a list");
    assert_eq!(both.size(), 2);
}

#[test]
fn options_pattern_collects_rules() {
    let k = kernel();
    // f[x_, OptionsPattern[]] := OptionValue[opt]
    let lhs = k.call(
        k.global("f"),
        vec![k.var("x"), k.call(k.system("OptionsPattern"), vec![])],
    );
    let rhs = k.call(k.system("OptionValue"), vec![k.global("opt")]);
    k.define(lhs, rhs);

    let call = k.call(
        k.global("f"),
        vec![int(1), k.rule_of(k.global("opt"), int(99))],
    );
    assert_same(&k.eval(&call), &int(99));

    // options may arrive in a list
    let listed = k.call(
        k.global("f"),
        vec![
            int(1),
            k.list(vec![k.rule_of(k.global("opt"), int(7))]),
        ],
    );
    assert_same(&k.eval(&listed), &int(7));
}

#[test]
fn verbatim_matches_structure_only() {
    let k = kernel();
    // f[Verbatim[Blank[]]] matches the literal Blank[] expression
    let verbatim = k.call(k.system("Verbatim"), vec![k.blank()]);
    let lhs = k.call(k.global("f"), vec![verbatim]);
    k.define(lhs, string("pattern-literal"));

    assert_same(
        &k.eval(&k.call(k.global("f"), vec![k.blank()])),
        &string("pattern-literal"),
    );
    let ordinary = k.eval(&k.call(k.global("f"), vec![int(1)]));
    assert!(ordinary.as_expression().is_some());
}

#[test]
fn orderless_heads_match_in_any_order() {
    let k = kernel();
    let or = k.definitions.global("or");
    or.set_attributes(symbolon::Attributes::ORDERLESS)
        .expect("valid attributes");

    // or[1, x_] := x, applied to or[y, 1] (sorted to or[1, y])
    let lhs = k.call(k.global("or"), vec![int(1), k.var("x")]);
    k.define(lhs, k.global("x"));

    let subject = k.call(k.global("or"), vec![k.global("y"), int(1)]);
    assert_same(&k.eval(&subject), &k.global("y"));
}

#[test]
fn flat_heads_wrap_sequence_captures() {
    let k = kernel();
    let fl = k.definitions.global("fa");
    fl.set_attributes(symbolon::Attributes::FLAT)
        .expect("valid attributes");

    // fa[x_, y_] := List[x, y] against fa[a, b, c]
    let lhs = k.call(k.global("fa"), vec![k.var("x"), k.var("y")]);
    k.define(lhs, k.call(k.system("List"), vec![k.global("x"), k.global("y")]));

    let subject = k.call(
        k.global("fa"),
        vec![k.global("a"), k.global("b"), k.global("c")],
    );
    let out = k.eval(&subject);
    let out = out.as_expression().expect("a list");
    assert_eq!(out.size(), 2);
    // without OneIdentity even a single capture wraps: x -> fa[a]
    let first = out.leaf(0);
    let first = first.as_expression().expect("wrapped single capture");
    assert_eq!(first.size(), 1);
    assert_same(&first.leaf(0), &k.global("a"));
    let wrapped = out.leaf(1);
    let wrapped = wrapped.as_expression().expect("wrapped capture");
    assert_eq!(wrapped.size(), 2);
}

#[test]
fn flat_one_identity_keeps_single_captures_bare() {
    let k = kernel();
    let fo = k.definitions.global("fo");
    fo.set_attributes(symbolon::Attributes::FLAT | symbolon::Attributes::ONE_IDENTITY)
        .expect("valid attributes");

    let lhs = k.call(k.global("fo"), vec![k.var("x"), k.var("y")]);
    k.define(lhs, k.call(k.system("List"), vec![k.global("x"), k.global("y")]));

    let subject = k.call(
        k.global("fo"),
        vec![k.global("a"), k.global("b"), k.global("c")],
    );
    let out = k.eval(&subject);
    let out = out.as_expression().expect("a list");
    // x -> a stays bare; y -> fo[b, c] wraps
    assert_same(&out.leaf(0), &k.global("a"));
    let wrapped = out.leaf(1);
    let wrapped_expr = wrapped.as_expression().expect("wrapped rest");
    assert_eq!(wrapped_expr.size(), 2);
}

#[test]
fn rule_delayed_rhs_reevaluates_per_application() {
    let k = kernel();
    // f[x_] := Plus[x, x] substitutes the capture into the rhs template
    let lhs = k.call(k.global("f"), vec![k.var("x")]);
    k.define(lhs, k.call(k.system("Plus"), vec![k.global("x"), k.global("x")]));

    assert_same(&k.eval(&k.call(k.global("f"), vec![int(4)])), &int(8));
    assert_same(&k.eval(&k.call(k.global("f"), vec![int(5)])), &int(10));
}

#[test]
fn sequence_captures_splice_into_the_rhs() {
    let k = kernel();
    // wrap[x__] := g[x] splices the sequence into g
    let lhs = k.call(k.global("wrap"), vec![k.var_seq("x")]);
    k.define(lhs, k.call(k.global("g"), vec![k.global("x")]));

    let out = k.eval(&k.call(k.global("wrap"), vec![int(1), int(2), int(3)]));
    let out = out.as_expression().expect("g call");
    assert_eq!(out.size(), 3);
    assert_same(&out.leaf(2), &int(3));
}
