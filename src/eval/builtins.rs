//! Built-in handlers attached to System symbols.
//!
//! A handler runs before the symbol's down rules and declines with
//! `Ok(None)` when the arguments stay symbolic. Arithmetic folds
//! short-circuit on the slice type mask: an all-machine-real or all-integer
//! sum never touches the generic tower.

use std::sync::Arc;

use num_bigint::BigInt;
use tracing::trace;

use crate::atoms::Precision;
use crate::error::{EvalError, Result};
use crate::expr::{self, slice::kind_bit, Expr, ExprRef, Expression, Kind};
use crate::eval::{evaluate, rule_add, Evaluation};
use crate::symbol::{lookup_name, Attributes, RuleKind, SymbolRef};

pub fn register(definitions: &crate::symbol::table::Definitions) {
    let set = |name: &str, f: crate::symbol::BuiltinFn| {
        definitions.system(name).set_builtin(f);
    };
    set("Plus", builtin_plus);
    set("Times", builtin_times);
    set("Power", builtin_power);
    set("Minus", builtin_minus);
    set("Subtract", builtin_subtract);
    set("Range", builtin_range);
    set("Set", builtin_set);
    set("SetDelayed", builtin_set_delayed);
    set("UpSet", builtin_up_set);
    set("UpSetDelayed", builtin_up_set_delayed);
    set("SameQ", builtin_same_q);
    set("Equal", builtin_equal);
    set("Head", builtin_head);
    set("Length", builtin_length);
    set("Attributes", builtin_attributes);
    set("N", builtin_n);
    set("Expand", builtin_expand);
    set("Thread", builtin_thread);
}

const INT_MASK: u16 = (1 << (Kind::MachineInteger as u16)) | (1 << (Kind::BigInteger as u16));

fn builtin_plus(e: &Expression, evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    match e.size() {
        0 => return Ok(Some(Arc::clone(&evaluation.symbols().zero))),
        1 => return Ok(Some(e.leaf(0))),
        _ => {}
    }

    let mask = e.exact_type_mask();

    // all machine reals: straight machine sum, packed or boxed
    if mask.bits == kind_bit(Kind::MachineReal) {
        let sum = match e.slice().as_packed_reals() {
            Some(values) => values.iter().sum(),
            None => e.leaves().fold(0.0, |acc, leaf| {
                acc + leaf.round_to_f64().unwrap_or(0.0)
            }),
        };
        return Ok(Some(expr::real(sum)));
    }

    // all integers: machine accumulation spilling to a big integer
    if mask.bits & !INT_MASK == 0 {
        let mut machine: i64 = 0;
        let mut big: Option<BigInt> = None;
        if let Some(values) = e.slice().as_packed_ints() {
            for v in values {
                accumulate_int(&mut machine, &mut big, *v);
            }
        } else {
            for leaf in e.leaves() {
                match leaf.as_ref() {
                    Expr::MachineInteger(v) => accumulate_int(&mut machine, &mut big, *v),
                    Expr::BigInteger(v) => {
                        let acc = big.get_or_insert_with(|| BigInt::from(0));
                        *acc += &v.value;
                    }
                    _ => unreachable!("integer mask with non-integer leaf"),
                }
            }
        }
        return Ok(Some(match big {
            Some(acc) => expr::integer_big(acc + BigInt::from(machine)),
            None => expr::integer_i64(machine),
        }));
    }

    // a machine real somewhere: machine sum over the numeric leaves,
    // symbolic leaves carried along
    if mask.intersects(kind_bit(Kind::MachineReal))
        && !mask.intersects(kind_bit(Kind::MachineComplex) | kind_bit(Kind::BigComplex))
    {
        let mut sum = 0.0;
        let mut symbolics: Vec<ExprRef> = Vec::new();
        for leaf in e.leaves() {
            match leaf.round_to_f64() {
                Some(v) => sum += v,
                None => symbolics.push(leaf),
            }
        }
        if symbolics.is_empty() {
            return Ok(Some(expr::real(sum)));
        }
        // nothing folds with a single numeric leaf; rebuilding would loop
        if e.size() - symbolics.len() < 2 {
            return Ok(None);
        }
        let mut leaves = vec![expr::real(sum)];
        leaves.extend(symbolics);
        return Ok(Some(expr::expression(Arc::clone(e.head()), leaves)));
    }

    fold_numeric(e, evaluation, crate::numeric::add, FoldIdentity::Zero)
}

fn accumulate_int(machine: &mut i64, big: &mut Option<BigInt>, v: i64) {
    match big {
        Some(acc) => *acc += v,
        None => match machine.checked_add(v) {
            Some(next) => *machine = next,
            None => {
                *big = Some(BigInt::from(*machine) + v);
                *machine = 0;
            }
        },
    }
}

fn builtin_times(e: &Expression, evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    match e.size() {
        0 => return Ok(Some(Arc::clone(&evaluation.symbols().one))),
        1 => return Ok(Some(e.leaf(0))),
        _ => {}
    }
    fold_numeric(e, evaluation, crate::numeric::mul, FoldIdentity::One)
}

#[derive(PartialEq)]
enum FoldIdentity {
    Zero,
    One,
}

/// Combines all numeric leaves with the given tower operation, keeping the
/// symbolic tail. Declines when fewer than two leaves fold and no identity
/// element drops out.
fn fold_numeric(
    e: &Expression,
    evaluation: &Evaluation,
    op: fn(&Expr, &Expr) -> Option<ExprRef>,
    identity: FoldIdentity,
) -> Result<Option<ExprRef>> {
    let mut combined: Option<ExprRef> = None;
    let mut numeric_count = 0usize;
    let mut symbolics: Vec<ExprRef> = Vec::new();

    for leaf in e.leaves() {
        if leaf.is_number() {
            numeric_count += 1;
            combined = Some(match combined {
                None => leaf,
                Some(acc) => match op(&acc, &leaf) {
                    Some(v) => v,
                    None => return Ok(None),
                },
            });
        } else {
            symbolics.push(leaf);
        }
    }

    let combined = match combined {
        Some(c) => c,
        None => return Ok(None),
    };

    let is_identity = match identity {
        FoldIdentity::Zero => combined.is_zero(),
        FoldIdentity::One => combined.is_one(),
    };

    // an exact zero annihilates a product
    if identity == FoldIdentity::One && crate::numeric::is_exact_zero(&combined) {
        return Ok(Some(Arc::clone(&evaluation.symbols().zero)));
    }

    if symbolics.is_empty() {
        return Ok(Some(combined));
    }
    if numeric_count < 2 && !is_identity {
        return Ok(None);
    }

    if is_identity {
        return Ok(Some(match symbolics.len() {
            1 => symbolics.into_iter().next().expect("one leaf"),
            _ => expr::expression(Arc::clone(e.head()), symbolics),
        }));
    }

    let mut leaves = vec![combined];
    leaves.extend(symbolics);
    Ok(Some(expr::expression(Arc::clone(e.head()), leaves)))
}

fn builtin_power(e: &Expression, evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    if e.size() != 2 {
        return Ok(None);
    }
    let base = e.leaf(0);
    let exp = e.leaf(1);

    if exp.is_zero() {
        if base.is_zero() {
            // 0^0 stays indeterminate
            return Ok(None);
        }
        return Ok(Some(Arc::clone(&evaluation.symbols().one)));
    }
    if exp.is_one() {
        return Ok(Some(base));
    }

    if let Some(k) = exp.as_machine_integer() {
        return crate::numeric::pow_integer(&base, k);
    }

    // inexact base with real exponent: machine power
    if let (Some(b), Some(x)) = (base.round_to_f64(), exp.round_to_f64()) {
        if base.is_inexact() || exp.is_inexact() {
            let v = b.powf(x);
            if v.is_nan() {
                return Err(EvalError::NumericException(
                    "power is not real-valued".into(),
                ));
            }
            return Ok(Some(expr::real(v)));
        }
    }

    Ok(None)
}

fn builtin_minus(e: &Expression, evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    if e.size() != 1 {
        return Ok(None);
    }
    let x = e.leaf(0);
    if let Some(negated) = crate::numeric::neg(&x) {
        return Ok(Some(negated));
    }
    let symbols = evaluation.symbols();
    Ok(Some(expr::expr2(
        expr::symbol(Arc::clone(&symbols.times)),
        Arc::clone(&symbols.minus_one),
        x,
    )))
}

fn builtin_subtract(e: &Expression, evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    if e.size() != 2 {
        return Ok(None);
    }
    let symbols = evaluation.symbols();
    Ok(Some(expr::expr2(
        expr::symbol(Arc::clone(&symbols.plus)),
        e.leaf(0),
        expr::expr2(
            expr::symbol(Arc::clone(&symbols.times)),
            Arc::clone(&symbols.minus_one),
            e.leaf(1),
        ),
    )))
}

const RANGE_LIMIT: usize = 10_000_000;

fn builtin_range(e: &Expression, evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    let one = Arc::clone(&evaluation.symbols().one);
    let (imin, imax, di) = match e.size() {
        1 => (one.clone(), e.leaf(0), one),
        2 => (e.leaf(0), e.leaf(1), one),
        3 => (e.leaf(0), e.leaf(1), e.leaf(2)),
        _ => return Ok(None),
    };

    let list_head = expr::symbol(Arc::clone(&evaluation.symbols().list));

    // machine-integer domain packs directly
    if let (Some(a), Some(b), Some(d)) = (
        imin.as_machine_integer(),
        imax.as_machine_integer(),
        di.as_machine_integer(),
    ) {
        if d == 0 {
            return Err(EvalError::DivisionByZero);
        }
        let mut values: Vec<i64> = Vec::new();
        let mut x = a;
        while (d > 0 && x <= b) || (d < 0 && x >= b) {
            values.push(x);
            if values.len() > RANGE_LIMIT {
                return Ok(None);
            }
            x = match x.checked_add(d) {
                Some(next) => next,
                None => break,
            };
        }
        trace!(len = values.len(), "packed integer range");
        return Ok(Some(expr::expression_slice(
            list_head,
            expr::Slice::packed_ints(values),
        )));
    }

    // a real endpoint makes the whole range machine real
    let reals = (
        imin.round_to_f64(),
        imax.round_to_f64(),
        di.round_to_f64(),
    );
    if let (Some(a), Some(b), Some(d)) = reals {
        if imin.is_inexact() || imax.is_inexact() || di.is_inexact() {
            if d == 0.0 {
                return Err(EvalError::DivisionByZero);
            }
            let mut values: Vec<f64> = Vec::new();
            let mut x = a;
            while (d > 0.0 && x <= b) || (d < 0.0 && x >= b) {
                values.push(x);
                if values.len() > RANGE_LIMIT {
                    return Ok(None);
                }
                x += d;
            }
            return Ok(Some(expr::expression_slice(
                list_head,
                expr::Slice::packed_reals(values),
            )));
        }
    }

    // exact non-machine domain: general tower stepping
    if imin.is_number() && imax.is_number() && di.is_number() {
        let mut values: Vec<ExprRef> = Vec::new();
        let mut x = imin;
        loop {
            let cmp = crate::numeric::compare(&x, &imax);
            let keep = match (cmp, di.is_negative()) {
                (Some(std::cmp::Ordering::Greater), false) => false,
                (Some(std::cmp::Ordering::Less), true) => false,
                (Some(_), _) => true,
                (None, _) => false,
            };
            if !keep {
                break;
            }
            values.push(Arc::clone(&x));
            if values.len() > RANGE_LIMIT {
                return Ok(None);
            }
            x = match crate::numeric::add(&x, &di) {
                Some(next) => next,
                None => break,
            };
        }
        return Ok(Some(expr::expression(list_head, values)));
    }

    Ok(None)
}

/// Shared by `Set`/`SetDelayed`: files the rule by the shape of the lhs.
fn assign(
    lhs: &ExprRef,
    rhs: &ExprRef,
    evaluation: &Evaluation,
) -> Result<bool> {
    match lhs.as_ref() {
        Expr::Symbol(sym) => {
            if sym.has_attribute(Attributes::PROTECTED) {
                evaluation.message(
                    &evaluation.symbols().set,
                    "wrsym",
                    &[Arc::clone(lhs)],
                );
                return Ok(false);
            }
            sym.set_own_value(Some(Arc::clone(rhs)));
            Ok(true)
        }
        Expr::Expression(le) => match le.head().as_ref() {
            Expr::Symbol(f) => {
                if f.has_attribute(Attributes::PROTECTED) {
                    evaluation.message(
                        &evaluation.symbols().set,
                        "wrsym",
                        &[expr::symbol(Arc::clone(f))],
                    );
                    return Ok(false);
                }
                rule_add(f, RuleKind::Down, Arc::clone(lhs), Arc::clone(rhs));
                Ok(true)
            }
            Expr::Expression(he) => match he.head().as_ref() {
                Expr::Symbol(f) => {
                    rule_add(f, RuleKind::Sub, Arc::clone(lhs), Arc::clone(rhs));
                    Ok(true)
                }
                _ => Ok(false),
            },
            _ => Ok(false),
        },
        _ => Ok(false),
    }
}

fn builtin_set(e: &Expression, evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    if e.size() != 2 {
        return Ok(None);
    }
    let lhs = e.leaf(0);
    let rhs = e.leaf(1);
    assign(&lhs, &rhs, evaluation)?;
    Ok(Some(rhs))
}

fn builtin_set_delayed(e: &Expression, evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    if e.size() != 2 {
        return Ok(None);
    }
    let lhs = e.leaf(0);
    let rhs = e.leaf(1);
    assign(&lhs, &rhs, evaluation)?;
    Ok(Some(Arc::clone(&evaluation.symbols().null_expr)))
}

fn up_assign(e: &Expression) -> bool {
    let lhs = e.leaf(0);
    let rhs = e.leaf(1);
    let le = match lhs.as_expression() {
        Some(le) => le,
        None => return false,
    };
    let mut any = false;
    for leaf in le.leaves() {
        if let Some(sym) = lookup_name(&leaf) {
            rule_add(&sym, RuleKind::Up, Arc::clone(&lhs), Arc::clone(&rhs));
            any = true;
        }
    }
    any
}

fn builtin_up_set(e: &Expression, _evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    if e.size() != 2 {
        return Ok(None);
    }
    up_assign(e);
    Ok(Some(e.leaf(1)))
}

fn builtin_up_set_delayed(e: &Expression, evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    if e.size() != 2 {
        return Ok(None);
    }
    up_assign(e);
    Ok(Some(Arc::clone(&evaluation.symbols().null_expr)))
}

fn bool_expr(value: bool, evaluation: &Evaluation) -> ExprRef {
    if value {
        Arc::clone(&evaluation.symbols().true_expr)
    } else {
        Arc::clone(&evaluation.symbols().false_expr)
    }
}

fn builtin_same_q(e: &Expression, evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    if e.size() < 2 {
        return Ok(Some(bool_expr(true, evaluation)));
    }
    let first = e.leaf(0);
    let all_same = (1..e.size()).all(|i| first.same(&e.leaf(i)));
    Ok(Some(bool_expr(all_same, evaluation)))
}

fn builtin_equal(e: &Expression, evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    if e.size() != 2 {
        return Ok(None);
    }
    let a = e.leaf(0);
    let b = e.leaf(1);
    if let Some(verdict) = crate::numeric::equals(&a, &b) {
        return Ok(Some(bool_expr(verdict, evaluation)));
    }
    match (a.as_ref(), b.as_ref()) {
        // strings are concrete values
        (Expr::String(_), Expr::String(_)) => Ok(Some(bool_expr(a.same(&b), evaluation))),
        // anything else decides only on structural identity; distinct
        // symbolic values stay an open equation
        _ => {
            if a.same(&b) {
                Ok(Some(bool_expr(true, evaluation)))
            } else {
                Ok(None)
            }
        }
    }
}

fn builtin_head(e: &Expression, evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    if e.size() != 1 {
        return Ok(None);
    }
    let symbols = evaluation.symbols();
    let x = e.leaf(0);
    Ok(Some(match x.as_ref() {
        Expr::Expression(inner) => Arc::clone(inner.head()),
        atom => expr::symbol(Arc::clone(match atom.kind() {
            Kind::MachineInteger | Kind::BigInteger => &symbols.integer,
            Kind::BigRational => &symbols.rational,
            Kind::MachineReal | Kind::BigReal => &symbols.real,
            Kind::MachineComplex | Kind::BigComplex => &symbols.complex,
            Kind::String => &symbols.string,
            Kind::Symbol => &symbols.symbol,
            Kind::Expression => unreachable!("handled above"),
        })),
    }))
}

fn builtin_length(e: &Expression, _evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    if e.size() != 1 {
        return Ok(None);
    }
    let len = e
        .leaf(0)
        .as_expression()
        .map(|inner| inner.size())
        .unwrap_or(0);
    Ok(Some(expr::integer_i64(len as i64)))
}

const ATTRIBUTE_NAMES: &[(Attributes, &str)] = &[
    (Attributes::CONSTANT, "Constant"),
    (Attributes::FLAT, "Flat"),
    (Attributes::HOLD_ALL, "HoldAll"),
    (Attributes::HOLD_ALL_COMPLETE, "HoldAllComplete"),
    (Attributes::HOLD_FIRST, "HoldFirst"),
    (Attributes::HOLD_REST, "HoldRest"),
    (Attributes::LISTABLE, "Listable"),
    (Attributes::LOCKED, "Locked"),
    (Attributes::N_HOLD_ALL, "NHoldAll"),
    (Attributes::N_HOLD_FIRST, "NHoldFirst"),
    (Attributes::N_HOLD_REST, "NHoldRest"),
    (Attributes::NUMERIC_FUNCTION, "NumericFunction"),
    (Attributes::ONE_IDENTITY, "OneIdentity"),
    (Attributes::ORDERLESS, "Orderless"),
    (Attributes::PROTECTED, "Protected"),
    (Attributes::READ_PROTECTED, "ReadProtected"),
    (Attributes::SEQUENCE_HOLD, "SequenceHold"),
    (Attributes::STUB, "Stub"),
    (Attributes::TEMPORARY, "Temporary"),
];

fn builtin_attributes(e: &Expression, evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    if e.size() != 1 {
        return Ok(None);
    }
    let sym = match e.leaf(0).as_symbol() {
        Some(s) => Arc::clone(s),
        None => return Ok(None),
    };
    let attrs = sym.attributes();
    let names: Vec<ExprRef> = ATTRIBUTE_NAMES
        .iter()
        .filter(|(bit, _)| attrs.contains(*bit))
        .map(|(_, name)| expr::symbol(evaluation.definitions().system(name)))
        .collect();
    Ok(Some(expr::expression(
        expr::symbol(Arc::clone(&evaluation.symbols().list)),
        names,
    )))
}

fn builtin_n(e: &Expression, evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    let prec = match e.size() {
        1 => Precision::MACHINE,
        2 => match e.leaf(1).as_machine_integer() {
            Some(digits) if digits > 0 => Precision::from_decimals(digits as f64),
            _ => return Ok(None),
        },
        _ => return Ok(None),
    };
    n_value(&e.leaf(0), prec, evaluation)
}

fn n_value(x: &ExprRef, prec: Precision, evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    // already at the requested kind of precision
    match x.as_ref() {
        Expr::MachineReal(_) | Expr::MachineComplex(_) if prec.is_machine() => {
            return Ok(Some(Arc::clone(x)))
        }
        Expr::BigReal(v) if !prec.is_machine() && v.prec.bits >= prec.bits => {
            return Ok(Some(Arc::clone(x)))
        }
        _ => {}
    }

    if let Some(inner) = x.as_expression() {
        // n rules attached to the head fire first
        if let Some(head_sym) = inner.head_symbol() {
            let rules = {
                let state = head_sym.state();
                state.n_rules.candidates(inner.size(), x.hash())
            };
            if !rules.is_empty() {
                if let Some(result) = super::apply_rule_list(&rules, x, evaluation)? {
                    return Ok(Some(evaluate(&result, evaluation)?));
                }
            }

            // map N over the leaves, honoring the numeric hold attributes
            let attrs = head_sym.attributes();
            let n = inner.size();
            let (begin, end) = if attrs.contains(Attributes::N_HOLD_ALL) {
                (0, 0)
            } else if attrs.contains(Attributes::N_HOLD_FIRST) {
                (1.min(n), n)
            } else if attrs.contains(Attributes::N_HOLD_REST) {
                (0, 1.min(n))
            } else {
                (0, n)
            };
            let mut leaves = inner.materialize();
            let mut changed = false;
            for (i, leaf) in leaves.iter_mut().enumerate() {
                if i < begin || i >= end {
                    continue;
                }
                if let Some(v) = n_value(leaf, prec, evaluation)? {
                    if !Arc::ptr_eq(&v, leaf) {
                        *leaf = v;
                        changed = true;
                    }
                }
            }
            if changed {
                let rebuilt = expr::expression(Arc::clone(inner.head()), leaves);
                return Ok(Some(evaluate(&rebuilt, evaluation)?));
            }
        }
    }

    // numeric tail through the symbolic form
    if let Some(form) = crate::symbolic::symbolic_form(x) {
        if let Some(value) = form.evalf(prec)? {
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn builtin_expand(e: &Expression, evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    if e.size() != 1 {
        return Ok(None);
    }
    let x = e.leaf(0);
    match expand_expr(&x, evaluation)? {
        Some(out) => Ok(Some(out)),
        // Expand is the identity on anything without product structure
        None => Ok(Some(x)),
    }
}

fn expand_expr(x: &ExprRef, evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    if let Some(form) = crate::symbolic::symbolic_form(x) {
        let expanded = form.expand();
        if expanded != form {
            let rebuilt = expanded.to_expr(evaluation.symbols());
            return Ok(Some(evaluate(&rebuilt, evaluation)?));
        }
        return Ok(None);
    }

    // no algebraic reading at this level: recurse into the leaves
    let e = match x.as_expression() {
        Some(e) => e,
        None => return Ok(None),
    };
    let mut leaves = e.materialize();
    let mut changed = false;
    for leaf in leaves.iter_mut() {
        if let Some(v) = expand_expr(leaf, evaluation)? {
            *leaf = v;
            changed = true;
        }
    }
    if changed {
        let rebuilt = expr::expression(Arc::clone(e.head()), leaves);
        Ok(Some(evaluate(&rebuilt, evaluation)?))
    } else {
        Ok(None)
    }
}

fn builtin_thread(e: &Expression, evaluation: &Evaluation) -> Result<Option<ExprRef>> {
    if e.size() != 1 {
        return Ok(None);
    }
    let inner = e.leaf(0);
    let inner_expr = match inner.as_expression() {
        Some(x) => x,
        None => return Ok(None),
    };
    match super::thread_listable(&inner, inner_expr, evaluation)? {
        super::ThreadOutcome::Threaded(out) => Ok(Some(out)),
        super::ThreadOutcome::NotApplicable => Ok(Some(inner)),
        super::ThreadOutcome::Mismatch => Ok(None),
    }
}

/// `Function[body][args…]` / `Function[{params…}, body][args…]`.
pub(crate) fn apply_function(
    function: &Expression,
    call: &Expression,
    _evaluation: &Evaluation,
) -> Result<Option<ExprRef>> {
    let args = call.materialize();
    match function.size() {
        1 => {
            let body = function.leaf(0);
            let compiled = Arc::clone(function.cache().slot_function.get_or_init(|| {
                Arc::new(crate::pattern::rewrite::SlotFunction::compile(&body, None))
            }));
            Ok(Some(compiled.apply(&args)?))
        }
        2 => {
            let params_expr = function.leaf(0);
            let params: Vec<SymbolRef> = match params_expr.as_ref() {
                Expr::Symbol(s) => vec![Arc::clone(s)],
                Expr::Expression(list) if list.head().is_system("List") => {
                    let mut out = Vec::with_capacity(list.size());
                    for leaf in list.leaves() {
                        match leaf.as_symbol() {
                            Some(s) => out.push(Arc::clone(s)),
                            None => {
                                return Err(EvalError::PatternError(format!(
                                    "function parameter {} is not a symbol",
                                    leaf
                                )))
                            }
                        }
                    }
                    out
                }
                _ => return Ok(None),
            };
            let body = function.leaf(1);
            let compiled = Arc::clone(function.cache().slot_function.get_or_init(|| {
                Arc::new(crate::pattern::rewrite::SlotFunction::compile(
                    &body,
                    Some(&params),
                ))
            }));
            Ok(Some(compiled.apply(&args)?))
        }
        _ => Ok(None),
    }
}
