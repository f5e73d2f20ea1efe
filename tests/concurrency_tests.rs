//! Concurrency behavior: shared definitions across evaluating threads,
//! parallel listable threading, and racing rule-table writers.

mod common;

use std::sync::Arc;
use std::thread;

use common::{assert_same, int, kernel};
use symbolon::eval::{EvalConfig, Evaluation, NoOutput};
use symbolon::expr::ExprRef;
use symbolon::{evaluate, Definitions};

#[test]
fn shared_definitions_evaluate_from_many_threads() {
    let k = kernel();
    // square[x_] := x * x
    let lhs = k.call(k.global("square"), vec![k.var("x")]);
    let rhs = k.call(k.system("Times"), vec![k.global("x"), k.global("x")]);
    k.define(lhs, rhs);

    let definitions = Arc::clone(&k.definitions);
    let mut handles = Vec::new();
    for t in 0..8i64 {
        let definitions = Arc::clone(&definitions);
        handles.push(thread::spawn(move || {
            let evaluation = Evaluation::new(Arc::clone(&definitions), Arc::new(NoOutput));
            for i in 0..200i64 {
                let n = t * 1000 + i;
                let call = symbolon::expr::expression(
                    symbolon::expr::symbol(definitions.global("square")),
                    vec![int(n)],
                );
                let out = evaluate(&call, &evaluation).expect("evaluates");
                assert!(out.same(&int(n * n)));
            }
        }));
    }
    for handle in handles {
        handle.join().expect("worker");
    }
}

#[test]
fn parallel_listable_threading_matches_sequential() {
    let definitions = Definitions::new();
    let sequential = Evaluation::new(Arc::clone(&definitions), Arc::new(NoOutput));
    let parallel = Evaluation::with_config(
        Arc::clone(&definitions),
        Arc::new(NoOutput),
        EvalConfig {
            parallelize: true,
            ..EvalConfig::default()
        },
    );

    let list = |values: Vec<ExprRef>| {
        symbolon::expr::expression(
            symbolon::expr::symbol(definitions.system("List")),
            values,
        )
    };
    let sum = symbolon::expr::expression(
        symbolon::expr::symbol(definitions.system("Plus")),
        vec![
            list((0..64).map(int).collect()),
            list((1000..1064).map(int).collect()),
        ],
    );

    let a = evaluate(&sum, &sequential).expect("sequential");
    let b = evaluate(&sum, &parallel).expect("parallel");
    assert!(a.same(&b));
    let out = a.as_expression().expect("a list");
    assert_eq!(out.size(), 64);
    assert_same(&out.leaf(0), &int(1000));
    assert_same(&out.leaf(63), &int(1126));
}

#[test]
fn racing_definitions_serialize_per_symbol() {
    let definitions = Definitions::new();
    let f = definitions.global("racer");

    let mut handles = Vec::new();
    for t in 0..4i64 {
        let definitions = Arc::clone(&definitions);
        let f = Arc::clone(&f);
        handles.push(thread::spawn(move || {
            let evaluation = Evaluation::new(Arc::clone(&definitions), Arc::new(NoOutput));
            for i in 0..100i64 {
                // racer[k] := k * t  — distinct literal patterns per writer
                let lhs = symbolon::expr::expression(
                    symbolon::expr::symbol(Arc::clone(&f)),
                    vec![int(t * 1000 + i)],
                );
                symbolon::rule_add(
                    &f,
                    symbolon::RuleKind::Down,
                    lhs.clone(),
                    int(t),
                );
                // concurrent readers must always see a consistent table
                let out = evaluate(&lhs, &evaluation).expect("evaluates");
                assert!(out.same(&int(t)));
            }
        }));
    }
    for handle in handles {
        handle.join().expect("worker");
    }

    // every writer's rules landed
    assert_eq!(f.state().down_rules.len(), 400);
}

#[test]
fn repeated_evaluations_are_deterministic_across_threads() {
    let k = kernel();
    let lhs = k.call(k.global("h"), vec![k.var("x"), k.var("y")]);
    k.define(
        lhs,
        k.call(k.system("Plus"), vec![k.global("x"), k.global("y")]),
    );
    let subject = k.call(
        k.global("h"),
        vec![
            k.call(k.system("Plus"), vec![int(1), int(2)]),
            int(10),
        ],
    );

    let expected = k.eval(&subject);
    let definitions = Arc::clone(&k.definitions);
    let subject_shared = subject.clone();
    let mut handles = Vec::new();
    for _ in 0..4 {
        let definitions = Arc::clone(&definitions);
        let subject = subject_shared.clone();
        let expected = expected.clone();
        handles.push(thread::spawn(move || {
            let evaluation = Evaluation::new(definitions, Arc::new(NoOutput));
            for _ in 0..50 {
                let out = evaluate(&subject, &evaluation).expect("evaluates");
                assert!(out.same(&expected));
            }
        }));
    }
    for handle in handles {
        handle.join().expect("worker");
    }
}
