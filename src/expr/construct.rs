//! Construction primitives.
//!
//! These are the only way values enter the tree, and they enforce the
//! canonical forms: integers demote to the machine kind when they fit,
//! rationals with denominator 1 demote to integers, complex values with a
//! vanishing imaginary part demote to their real part.

use std::sync::Arc;

use num_bigint::BigInt;
use num_complex::Complex64;
use num_rational::BigRational;
use num_traits::{ToPrimitive, Zero};

use crate::atoms::{BigComplexAtom, BigIntegerAtom, BigRationalAtom, BigRealAtom, Str};
use crate::error::{EvalError, Result};
use crate::expr::{Expr, ExprRef, Expression, Slice};
use crate::symbol::SymbolRef;

pub fn integer_i64(value: i64) -> ExprRef {
    Arc::new(Expr::MachineInteger(value))
}

/// Big integers in machine range demote, so equal values share a kind.
pub fn integer_big(value: BigInt) -> ExprRef {
    match value.to_i64() {
        Some(v) => integer_i64(v),
        None => Arc::new(Expr::BigInteger(BigIntegerAtom::new(value))),
    }
}

/// Reduced ratio; a denominator of 1 demotes to an integer kind.
pub fn rational_value(value: BigRational) -> ExprRef {
    if value.denom().to_i64() == Some(1) {
        integer_big(value.numer().clone())
    } else {
        Arc::new(Expr::BigRational(BigRationalAtom::new(value)))
    }
}

pub fn rational(numer: BigInt, denom: BigInt) -> Result<ExprRef> {
    if denom.is_zero() {
        return Err(EvalError::DivisionByZero);
    }
    Ok(rational_value(BigRational::new(numer, denom)))
}

pub fn real(value: f64) -> ExprRef {
    Arc::new(Expr::MachineReal(value))
}

pub fn big_real(value: BigRealAtom) -> ExprRef {
    Arc::new(Expr::BigReal(value))
}

/// Machine complex; a zero imaginary part demotes to a machine real.
pub fn machine_complex(re: f64, im: f64) -> ExprRef {
    if im == 0.0 {
        real(re)
    } else {
        Arc::new(Expr::MachineComplex(Complex64::new(re, im)))
    }
}

/// Exact complex from rationals; a zero imaginary part demotes.
pub fn complex_rational(re: BigRational, im: BigRational) -> ExprRef {
    if im.is_zero() {
        rational_value(re)
    } else {
        Arc::new(Expr::BigComplex(BigComplexAtom::new(re, im)))
    }
}

pub fn string(text: &str) -> ExprRef {
    Arc::new(Expr::String(Str::new(text)))
}

pub fn string_value(value: Str) -> ExprRef {
    Arc::new(Expr::String(value))
}

pub fn symbol(sym: SymbolRef) -> ExprRef {
    Arc::new(Expr::Symbol(sym))
}

/// General construction; picks the storage strategy by size and content.
pub fn expression(head: ExprRef, leaves: Vec<ExprRef>) -> ExprRef {
    Arc::new(Expr::Expression(Expression::new(
        head,
        Slice::from_leaves(leaves),
    )))
}

pub fn expression_slice(head: ExprRef, slice: Slice) -> ExprRef {
    Arc::new(Expr::Expression(Expression::new(head, slice)))
}

pub fn expr0(head: ExprRef) -> ExprRef {
    expression(head, vec![])
}

pub fn expr1(head: ExprRef, a: ExprRef) -> ExprRef {
    expression(head, vec![a])
}

pub fn expr2(head: ExprRef, a: ExprRef, b: ExprRef) -> ExprRef {
    expression(head, vec![a, b])
}

pub fn expr3(head: ExprRef, a: ExprRef, b: ExprRef, c: ExprRef) -> ExprRef {
    expression(head, vec![a, b, c])
}
