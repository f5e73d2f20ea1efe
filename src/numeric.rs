//! The numeric tower.
//!
//! Binary arithmetic is closed over the seven numeric kinds. Each operation
//! computes in the join kind of its operands: exact kinds widen upward
//! (integer → rational), inexact kinds are contagious (a machine operand
//! makes the result machine), complex kinds absorb reals. Machine-integer
//! arithmetic uses checked primitives and promotes to big integers on
//! overflow; rationals re-canonicalize after every operation and demote when
//! the denominator collapses to 1.

use std::cmp::Ordering;

use num_bigint::BigInt;
use num_complex::Complex64;
use num_rational::BigRational;
use num_traits::{Pow, Zero};

use crate::atoms::{BigRealAtom, Precision};
use crate::error::{EvalError, Result};
use crate::expr::{self, Expr, ExprRef};

/// The arithmetic paths, from narrowest to widest join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Path {
    Integer,
    Rational,
    BigReal,
    MachineReal,
    ExactComplex,
    MachineComplex,
}

fn join_path(a: &Expr, b: &Expr) -> Option<Path> {
    if !a.is_number() || !b.is_number() {
        return None;
    }
    let has = |f: fn(&Expr) -> bool| f(a) || f(b);
    let complex = has(|x| matches!(x, Expr::MachineComplex(_) | Expr::BigComplex(_)));
    let machine_inexact = has(|x| matches!(x, Expr::MachineReal(_) | Expr::MachineComplex(_)));
    let big_real = has(|x| matches!(x, Expr::BigReal(_)));
    let rational = has(|x| matches!(x, Expr::BigRational(_)));

    Some(if complex {
        if machine_inexact || big_real {
            Path::MachineComplex
        } else {
            Path::ExactComplex
        }
    } else if machine_inexact {
        Path::MachineReal
    } else if big_real {
        Path::BigReal
    } else if rational {
        Path::Rational
    } else {
        Path::Integer
    })
}

fn to_bigint(x: &Expr) -> BigInt {
    match x {
        Expr::MachineInteger(v) => BigInt::from(*v),
        Expr::BigInteger(v) => v.value.clone(),
        _ => unreachable!("integer path with non-integer operand"),
    }
}

fn to_rational(x: &Expr) -> BigRational {
    match x {
        Expr::MachineInteger(v) => BigRational::from_integer(BigInt::from(*v)),
        Expr::BigInteger(v) => BigRational::from_integer(v.value.clone()),
        Expr::BigRational(v) => v.value.clone(),
        _ => unreachable!("rational path with wider operand"),
    }
}

fn to_f64(x: &Expr) -> f64 {
    x.round_to_f64().unwrap_or(f64::NAN)
}

fn to_c64(x: &Expr) -> Complex64 {
    match x {
        Expr::MachineComplex(v) => *v,
        Expr::BigComplex(v) => v.to_complex64(),
        _ => Complex64::new(to_f64(x), 0.0),
    }
}

fn to_exact_complex(x: &Expr) -> (BigRational, BigRational) {
    match x {
        Expr::BigComplex(v) => (v.re.clone(), v.im.clone()),
        _ => (to_rational(x), BigRational::zero()),
    }
}

fn to_big_real(x: &Expr, prec: Precision) -> BigRealAtom {
    match x {
        Expr::BigReal(v) => v.clone(),
        Expr::MachineInteger(v) => BigRealAtom::from_i64(*v, prec),
        Expr::BigInteger(v) => BigRealAtom::from_bigint(&v.value, prec),
        Expr::BigRational(v) => BigRealAtom::from_rational(&v.value, prec),
        _ => unreachable!("big-real path with machine operand"),
    }
}

fn big_real_prec(a: &Expr, b: &Expr) -> Precision {
    match (a, b) {
        (Expr::BigReal(x), Expr::BigReal(y)) => x.prec.min(y.prec),
        (Expr::BigReal(x), _) => x.prec,
        (_, Expr::BigReal(y)) => y.prec,
        _ => Precision::MACHINE,
    }
}

/// Addition in the join kind. `None` when either operand is not a number.
pub fn add(a: &Expr, b: &Expr) -> Option<ExprRef> {
    // machine-integer fast path with overflow promotion
    if let (Expr::MachineInteger(x), Expr::MachineInteger(y)) = (a, b) {
        return Some(match x.checked_add(*y) {
            Some(r) => expr::integer_i64(r),
            None => expr::integer_big(BigInt::from(*x) + BigInt::from(*y)),
        });
    }

    Some(match join_path(a, b)? {
        Path::Integer => expr::integer_big(to_bigint(a) + to_bigint(b)),
        Path::Rational => expr::rational_value(to_rational(a) + to_rational(b)),
        Path::MachineReal => expr::real(to_f64(a) + to_f64(b)),
        Path::BigReal => {
            let prec = big_real_prec(a, b);
            expr::big_real(to_big_real(a, prec).add(&to_big_real(b, prec)))
        }
        Path::ExactComplex => {
            let (ar, ai) = to_exact_complex(a);
            let (br, bi) = to_exact_complex(b);
            expr::complex_rational(ar + br, ai + bi)
        }
        Path::MachineComplex => {
            let c = to_c64(a) + to_c64(b);
            expr::machine_complex(c.re, c.im)
        }
    })
}

/// Multiplication in the join kind.
pub fn mul(a: &Expr, b: &Expr) -> Option<ExprRef> {
    if let (Expr::MachineInteger(x), Expr::MachineInteger(y)) = (a, b) {
        return Some(match x.checked_mul(*y) {
            Some(r) => expr::integer_i64(r),
            None => expr::integer_big(BigInt::from(*x) * BigInt::from(*y)),
        });
    }

    Some(match join_path(a, b)? {
        Path::Integer => expr::integer_big(to_bigint(a) * to_bigint(b)),
        Path::Rational => expr::rational_value(to_rational(a) * to_rational(b)),
        Path::MachineReal => expr::real(to_f64(a) * to_f64(b)),
        Path::BigReal => {
            let prec = big_real_prec(a, b);
            expr::big_real(to_big_real(a, prec).mul(&to_big_real(b, prec)))
        }
        Path::ExactComplex => {
            let (ar, ai) = to_exact_complex(a);
            let (br, bi) = to_exact_complex(b);
            let re = &ar * &br - &ai * &bi;
            let im = &ar * &bi + &ai * &br;
            expr::complex_rational(re, im)
        }
        Path::MachineComplex => {
            let c = to_c64(a) * to_c64(b);
            expr::machine_complex(c.re, c.im)
        }
    })
}

pub fn neg(a: &Expr) -> Option<ExprRef> {
    Some(match a {
        Expr::MachineInteger(v) => match v.checked_neg() {
            Some(r) => expr::integer_i64(r),
            None => expr::integer_big(-BigInt::from(*v)),
        },
        Expr::BigInteger(v) => expr::integer_big(-v.value.clone()),
        Expr::BigRational(v) => expr::rational_value(-v.value.clone()),
        Expr::MachineReal(v) => expr::real(-v),
        Expr::BigReal(v) => expr::big_real(v.neg()),
        Expr::MachineComplex(v) => expr::machine_complex(-v.re, -v.im),
        Expr::BigComplex(v) => expr::complex_rational(-v.re.clone(), -v.im.clone()),
        _ => return None,
    })
}

/// Integer powers by the join rules; negative exponents go through the
/// reciprocal and report division by zero on a zero base.
pub fn pow_integer(base: &Expr, exp: i64) -> Result<Option<ExprRef>> {
    if exp == 0 {
        return Ok(Some(expr::integer_i64(1)));
    }
    if exp < 0 {
        let positive = match pow_integer(base, -exp)? {
            Some(v) => v,
            None => return Ok(None),
        };
        return reciprocal(&positive).map(Some);
    }

    let result = match base {
        Expr::MachineInteger(_) | Expr::BigInteger(_) => {
            let exp = match u32::try_from(exp) {
                Ok(e) => e,
                Err(_) => return Ok(None),
            };
            Some(expr::integer_big(Pow::pow(to_bigint(base), exp)))
        }
        Expr::BigRational(v) => {
            let exp = match i32::try_from(exp) {
                Ok(e) => e,
                Err(_) => return Ok(None),
            };
            Some(expr::rational_value(v.value.clone().pow(exp)))
        }
        Expr::MachineReal(v) => Some(expr::real(v.powi(exp.clamp(i32::MIN as i64, i32::MAX as i64) as i32))),
        Expr::BigReal(v) => {
            // square-and-multiply over the tower multiply
            let mut acc = BigRealAtom::from_i64(1, v.prec);
            let mut sq = v.clone();
            let mut e = exp as u64;
            while e > 0 {
                if e & 1 == 1 {
                    acc = acc.mul(&sq);
                }
                sq = sq.mul(&sq);
                e >>= 1;
            }
            Some(expr::big_real(acc))
        }
        Expr::MachineComplex(v) => {
            let exp = match i32::try_from(exp) {
                Ok(e) => e,
                Err(_) => return Ok(None),
            };
            let c = v.powi(exp);
            Some(expr::machine_complex(c.re, c.im))
        }
        Expr::BigComplex(_) => {
            if exp > 1024 {
                return Ok(None);
            }
            let mut acc: ExprRef = expr::integer_i64(1);
            for _ in 0..exp {
                acc = match mul(&acc, base) {
                    Some(v) => v,
                    None => return Ok(None),
                };
            }
            Some(acc)
        }
        _ => None,
    };
    Ok(result)
}

/// Multiplicative inverse. Exact zero is a division-by-zero error; an
/// inexact zero produces an infinity the caller reports.
pub fn reciprocal(a: &Expr) -> Result<ExprRef> {
    match a {
        Expr::MachineInteger(0) => Err(EvalError::DivisionByZero),
        Expr::MachineInteger(v) => expr::rational(BigInt::from(1), BigInt::from(*v)),
        Expr::BigInteger(v) => expr::rational(BigInt::from(1), v.value.clone()),
        Expr::BigRational(v) => {
            expr::rational(v.value.denom().clone(), v.value.numer().clone())
        }
        Expr::MachineReal(v) => {
            if *v == 0.0 {
                Err(EvalError::DivisionByZero)
            } else {
                Ok(expr::real(1.0 / v))
            }
        }
        Expr::BigReal(v) => {
            if v.is_zero() {
                Err(EvalError::DivisionByZero)
            } else {
                Ok(expr::big_real(
                    BigRealAtom::from_i64(1, v.prec).div(v),
                ))
            }
        }
        Expr::MachineComplex(v) => {
            let c = Complex64::new(1.0, 0.0) / v;
            Ok(expr::machine_complex(c.re, c.im))
        }
        Expr::BigComplex(v) => {
            let norm = &v.re * &v.re + &v.im * &v.im;
            if norm.is_zero() {
                return Err(EvalError::DivisionByZero);
            }
            Ok(expr::complex_rational(&v.re / &norm, -(&v.im / &norm)))
        }
        _ => Err(EvalError::TypeMismatch("reciprocal of a non-number".into())),
    }
}

/// The numeric `Equal` predicate: exact operands compare exactly; once an
/// inexact operand is involved, equal means a relative difference of at most
/// `2^-(p - 7)` where `p` is the smaller operand precision.
pub fn equals(a: &Expr, b: &Expr) -> Option<bool> {
    if !a.is_number() || !b.is_number() {
        return None;
    }

    let exact = |x: &Expr| {
        matches!(
            x,
            Expr::MachineInteger(_) | Expr::BigInteger(_) | Expr::BigRational(_)
        )
    };

    if exact(a) && exact(b) {
        return Some(to_rational(a) == to_rational(b));
    }

    let complex = |x: &Expr| matches!(x, Expr::MachineComplex(_) | Expr::BigComplex(_));
    if complex(a) || complex(b) {
        let x = to_c64(a);
        let y = to_c64(b);
        let p = min_precision(a, b);
        return Some(approx_eq(x.re, y.re, p) && approx_eq(x.im, y.im, p));
    }

    let p = min_precision(a, b);
    Some(approx_eq(to_f64(a), to_f64(b), p))
}

fn min_precision(a: &Expr, b: &Expr) -> u32 {
    let prec = |x: &Expr| match x {
        Expr::BigReal(v) => v.prec.bits,
        _ => Precision::MACHINE.bits,
    };
    prec(a).min(prec(b))
}

fn approx_eq(x: f64, y: f64, prec_bits: u32) -> bool {
    if x == y {
        return true;
    }
    let scale = x.abs().max(y.abs());
    if scale == 0.0 {
        return true;
    }
    // comparisons run in machine arithmetic, so cap the precision there
    let p = prec_bits.min(Precision::MACHINE.bits);
    (x - y).abs() / scale <= (2f64).powi(-((p as i32) - 7))
}

/// Numeric ordering across kinds, used by canonical sorting.
pub fn compare(a: &Expr, b: &Expr) -> Option<Ordering> {
    if !a.is_number() || !b.is_number() {
        return None;
    }
    let exact = |x: &Expr| {
        matches!(
            x,
            Expr::MachineInteger(_) | Expr::BigInteger(_) | Expr::BigRational(_)
        )
    };
    if exact(a) && exact(b) {
        return Some(to_rational(a).cmp(&to_rational(b)));
    }
    // complex values order by real part, then imaginary part
    let x = to_c64(a);
    let y = to_c64(b);
    match x.re.partial_cmp(&y.re) {
        Some(Ordering::Equal) => x.im.partial_cmp(&y.im),
        other => other,
    }
}

/// Whether the value is an exact zero (used by `Times` annihilation).
pub fn is_exact_zero(x: &Expr) -> bool {
    match x {
        Expr::MachineInteger(0) => true,
        Expr::BigRational(v) => v.value.is_zero(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr;

    #[test]
    fn machine_addition_promotes_on_overflow() {
        let a = expr::integer_i64(i64::MAX);
        let b = expr::integer_i64(1);
        let sum = add(&a, &b).expect("numbers");
        assert!(matches!(sum.as_ref(), Expr::BigInteger(_)));
        let expected = BigInt::from(i64::MAX) + 1;
        match sum.as_ref() {
            Expr::BigInteger(v) => assert_eq!(v.value, expected),
            _ => panic!("expected big integer"),
        }
    }

    #[test]
    fn integer_plus_rational_widens_to_rational() {
        let a = expr::integer_i64(1);
        let b = expr::rational(BigInt::from(1), BigInt::from(2)).expect("denom");
        let sum = add(&a, &b).expect("numbers");
        match sum.as_ref() {
            Expr::BigRational(v) => {
                assert_eq!(v.value, BigRational::new(BigInt::from(3), BigInt::from(2)))
            }
            other => panic!("expected rational, got {}", other),
        }
    }

    #[test]
    fn rational_sum_demotes_when_denominator_cancels() {
        let a = expr::rational(BigInt::from(1), BigInt::from(2)).expect("denom");
        let b = expr::rational(BigInt::from(1), BigInt::from(2)).expect("denom");
        let sum = add(&a, &b).expect("numbers");
        assert!(matches!(sum.as_ref(), Expr::MachineInteger(1)));
    }

    #[test]
    fn machine_real_is_contagious() {
        let a = expr::real(1.0);
        let b = expr::integer_i64(2);
        let sum = add(&a, &b).expect("numbers");
        assert!(matches!(sum.as_ref(), Expr::MachineReal(v) if *v == 3.0));
    }

    #[test]
    fn big_real_arithmetic_takes_minimum_precision() {
        let a = expr::big_real(
            BigRealAtom::from_f64(2.0, Precision::from_decimals(30.0)).expect("finite"),
        );
        let b = expr::big_real(
            BigRealAtom::from_f64(3.0, Precision::from_decimals(20.0)).expect("finite"),
        );
        let prod = mul(&a, &b).expect("numbers");
        match prod.as_ref() {
            Expr::BigReal(v) => {
                assert_eq!(v.prec.bits, Precision::from_decimals(20.0).bits);
                assert!((v.as_f64() - 6.0).abs() < 1e-12);
            }
            other => panic!("expected big real, got {}", other),
        }
    }

    #[test]
    fn exact_complex_multiplication() {
        let i = expr::complex_rational(
            BigRational::from_integer(BigInt::from(0)),
            BigRational::from_integer(BigInt::from(1)),
        );
        let sq = mul(&i, &i).expect("numbers");
        assert!(matches!(sq.as_ref(), Expr::MachineInteger(-1)));
    }

    #[test]
    fn integer_powers() {
        let two = expr::integer_i64(2);
        let p = pow_integer(&two, 10).expect("no error").expect("computed");
        assert!(matches!(p.as_ref(), Expr::MachineInteger(1024)));

        let inv = pow_integer(&two, -2).expect("no error").expect("computed");
        match inv.as_ref() {
            Expr::BigRational(v) => {
                assert_eq!(v.value, BigRational::new(BigInt::from(1), BigInt::from(4)))
            }
            other => panic!("expected rational, got {}", other),
        }
    }

    #[test]
    fn zero_reciprocal_is_division_by_zero() {
        assert!(matches!(
            reciprocal(&expr::integer_i64(0)),
            Err(EvalError::DivisionByZero)
        ));
    }

    #[test]
    fn tolerant_equality_for_inexact() {
        let a = expr::real(0.1 + 0.2);
        let b = expr::real(0.3);
        assert!(!a.same(&b));
        assert_eq!(equals(&a, &b), Some(true));

        let c = expr::real(0.31);
        assert_eq!(equals(&a, &c), Some(false));
    }

    #[test]
    fn exact_equality_is_exact() {
        let a = expr::rational(BigInt::from(1), BigInt::from(3)).expect("denom");
        let b = expr::rational(BigInt::from(2), BigInt::from(6)).expect("denom");
        assert_eq!(equals(&a, &b), Some(true));
        assert_eq!(equals(&a, &expr::integer_i64(1)), Some(false));
    }

    #[test]
    fn numeric_compare_crosses_kinds() {
        let half = expr::rational(BigInt::from(1), BigInt::from(2)).expect("denom");
        assert_eq!(
            compare(&half, &expr::real(0.75)),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare(&expr::integer_i64(2), &expr::integer_i64(2)),
            Some(Ordering::Equal)
        );
    }
}
