//! The symbolic-form shadow.
//!
//! Expressions and atoms cache an optional algebraic handle used by
//! `Expand` and `N`: a normal form over rational-coefficient sums, products
//! and powers, with complex values built from rational parts. The cache
//! contract is the point: `None` means "no algebraic reading exists", the
//! form is computed lazily and immutable once computed.

use std::sync::Arc;

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::ToPrimitive;

use crate::atoms::{BigRealAtom, Precision};
use crate::error::{EvalError, Result};
use crate::expr::{self, Expr, ExprRef};
use crate::symbol::table::Symbols;
use crate::symbol::SymbolRef;

#[derive(Debug, Clone)]
pub enum SymbolicForm {
    Integer(BigInt),
    Rational(BigRational),
    Real(f64),
    BigReal(BigRealAtom),
    Complex { re: BigRational, im: BigRational },
    Symbol(SymbolRef),
    Add(Vec<SymbolicForm>),
    Mul(Vec<SymbolicForm>),
    Pow(Box<SymbolicForm>, Box<SymbolicForm>),
}

impl PartialEq for SymbolicForm {
    fn eq(&self, other: &Self) -> bool {
        use SymbolicForm::*;
        match (self, other) {
            (Integer(a), Integer(b)) => a == b,
            (Rational(a), Rational(b)) => a == b,
            (Real(a), Real(b)) => a.to_bits() == b.to_bits(),
            (BigReal(a), BigReal(b)) => a.same(b),
            (Complex { re: ar, im: ai }, Complex { re: br, im: bi }) => ar == br && ai == bi,
            (Symbol(a), Symbol(b)) => Arc::ptr_eq(a, b),
            (Add(a), Add(b)) | (Mul(a), Mul(b)) => a == b,
            (Pow(ab, ae), Pow(bb, be)) => ab == bb && ae == be,
            _ => false,
        }
    }
}

/// Complex construction from rational parts.
pub fn complex_from_rationals(re: BigRational, im: BigRational) -> SymbolicForm {
    SymbolicForm::Complex { re, im }
}

/// The algebraic reading of an expression, or `None` when there is none.
/// Expression nodes cache the result.
pub fn symbolic_form(expr: &ExprRef) -> Option<SymbolicForm> {
    match expr.as_ref() {
        Expr::Expression(e) => e
            .cache()
            .symbolic
            .get_or_init(|| compute_form(expr))
            .clone(),
        _ => compute_form(expr),
    }
}

fn compute_form(expr: &ExprRef) -> Option<SymbolicForm> {
    match expr.as_ref() {
        Expr::MachineInteger(v) => Some(SymbolicForm::Integer(BigInt::from(*v))),
        Expr::BigInteger(v) => Some(SymbolicForm::Integer(v.value.clone())),
        Expr::BigRational(v) => Some(SymbolicForm::Rational(v.value.clone())),
        Expr::MachineReal(v) => Some(SymbolicForm::Real(*v)),
        Expr::BigReal(v) => Some(SymbolicForm::BigReal(v.clone())),
        Expr::BigComplex(v) => Some(complex_from_rationals(v.re.clone(), v.im.clone())),
        Expr::MachineComplex(_) => None,
        Expr::Symbol(s) => Some(SymbolicForm::Symbol(Arc::clone(s))),
        Expr::String(_) => None,
        Expr::Expression(e) => {
            let head = e.head_symbol()?;
            let short = head.name().strip_prefix("System`")?;
            match short {
                "Plus" => {
                    let terms = e
                        .leaves()
                        .map(|l| symbolic_form(&l))
                        .collect::<Option<Vec<_>>>()?;
                    Some(SymbolicForm::Add(terms))
                }
                "Times" => {
                    let factors = e
                        .leaves()
                        .map(|l| symbolic_form(&l))
                        .collect::<Option<Vec<_>>>()?;
                    Some(SymbolicForm::Mul(factors))
                }
                "Power" if e.size() == 2 => {
                    let base = symbolic_form(&e.leaf(0))?;
                    let exp = symbolic_form(&e.leaf(1))?;
                    Some(SymbolicForm::Pow(Box::new(base), Box::new(exp)))
                }
                _ => None,
            }
        }
    }
}

impl SymbolicForm {
    /// Distributes products over sums and multiplies out small integer
    /// powers of sums.
    pub fn expand(&self) -> SymbolicForm {
        match self {
            SymbolicForm::Add(terms) => {
                let mut out = Vec::new();
                for term in terms {
                    match term.expand() {
                        SymbolicForm::Add(inner) => out.extend(inner),
                        other => out.push(other),
                    }
                }
                SymbolicForm::Add(out)
            }
            SymbolicForm::Mul(factors) => {
                // distribute pairwise over expanded factors
                let mut acc: Vec<SymbolicForm> = vec![];
                let mut started = false;
                for factor in factors {
                    let f = factor.expand();
                    let f_terms = match f {
                        SymbolicForm::Add(ts) => ts,
                        other => vec![other],
                    };
                    if !started {
                        acc = f_terms;
                        started = true;
                    } else {
                        let mut next = Vec::with_capacity(acc.len() * f_terms.len());
                        for a in &acc {
                            for b in &f_terms {
                                next.push(mul_pair(a, b));
                            }
                        }
                        acc = next;
                    }
                }
                if acc.len() == 1 {
                    acc.into_iter().next().expect("one term")
                } else {
                    SymbolicForm::Add(acc)
                }
            }
            SymbolicForm::Pow(base, exp) => {
                if let SymbolicForm::Integer(n) = exp.as_ref() {
                    if let (Some(k), SymbolicForm::Add(_)) = (n.to_u32(), base.expand()) {
                        if k >= 1 && k <= 16 {
                            let expanded_base = base.expand();
                            let mut acc = expanded_base.clone();
                            for _ in 1..k {
                                acc = SymbolicForm::Mul(vec![acc, expanded_base.clone()]).expand();
                            }
                            return acc;
                        }
                    }
                }
                SymbolicForm::Pow(Box::new(base.expand()), exp.clone())
            }
            other => other.clone(),
        }
    }

    /// Numeric evaluation at the requested precision. `Ok(None)` when a
    /// free symbol blocks evaluation; domain failures raise a numeric
    /// exception the evaluator demotes to a message.
    pub fn evalf(&self, prec: Precision) -> Result<Option<ExprRef>> {
        if prec.is_machine() {
            return self.eval_machine();
        }
        self.eval_big(prec)
    }

    fn eval_machine(&self) -> Result<Option<ExprRef>> {
        Ok(match self.eval_c64()? {
            Some((re, im)) => Some(expr::machine_complex(re, im)),
            None => None,
        })
    }

    fn eval_c64(&self) -> Result<Option<(f64, f64)>> {
        let finite = |x: f64| -> Result<f64> {
            if x.is_finite() {
                Ok(x)
            } else {
                Err(EvalError::NumericException("value out of range".into()))
            }
        };
        match self {
            SymbolicForm::Integer(v) => Ok(Some((finite(v.to_f64().unwrap_or(f64::INFINITY))?, 0.0))),
            SymbolicForm::Rational(v) => Ok(Some((finite(v.to_f64().unwrap_or(f64::NAN))?, 0.0))),
            SymbolicForm::Real(v) => Ok(Some((*v, 0.0))),
            SymbolicForm::BigReal(v) => Ok(Some((v.as_f64(), 0.0))),
            SymbolicForm::Complex { re, im } => Ok(Some((
                re.to_f64().unwrap_or(f64::NAN),
                im.to_f64().unwrap_or(f64::NAN),
            ))),
            SymbolicForm::Symbol(_) => Ok(None),
            SymbolicForm::Add(terms) => {
                let mut re = 0.0;
                let mut im = 0.0;
                for term in terms {
                    match term.eval_c64()? {
                        Some((tr, ti)) => {
                            re += tr;
                            im += ti;
                        }
                        None => return Ok(None),
                    }
                }
                Ok(Some((finite(re)?, finite(im)?)))
            }
            SymbolicForm::Mul(factors) => {
                let mut re = 1.0;
                let mut im = 0.0;
                for factor in factors {
                    match factor.eval_c64()? {
                        Some((fr, fi)) => {
                            let nr = re * fr - im * fi;
                            let ni = re * fi + im * fr;
                            re = nr;
                            im = ni;
                        }
                        None => return Ok(None),
                    }
                }
                Ok(Some((finite(re)?, finite(im)?)))
            }
            SymbolicForm::Pow(base, exp) => {
                let b = match base.eval_c64()? {
                    Some(v) => v,
                    None => return Ok(None),
                };
                let e = match exp.eval_c64()? {
                    Some(v) => v,
                    None => return Ok(None),
                };
                if b.1 == 0.0 && e.1 == 0.0 {
                    let v = b.0.powf(e.0);
                    if v.is_nan() {
                        return Err(EvalError::NumericException(
                            "power is not real-valued".into(),
                        ));
                    }
                    Ok(Some((finite(v)?, 0.0)))
                } else {
                    let c = num_complex::Complex64::new(b.0, b.1)
                        .powc(num_complex::Complex64::new(e.0, e.1));
                    Ok(Some((finite(c.re)?, finite(c.im)?)))
                }
            }
        }
    }

    fn eval_big(&self, prec: Precision) -> Result<Option<ExprRef>> {
        Ok(self.eval_big_real(prec)?.map(expr::big_real))
    }

    fn eval_big_real(&self, prec: Precision) -> Result<Option<BigRealAtom>> {
        match self {
            SymbolicForm::Integer(v) => Ok(Some(BigRealAtom::from_bigint(v, prec))),
            SymbolicForm::Rational(v) => Ok(Some(BigRealAtom::from_rational(v, prec))),
            SymbolicForm::Real(v) => Ok(BigRealAtom::from_f64(*v, prec)),
            SymbolicForm::BigReal(v) => Ok(Some(v.clone())),
            SymbolicForm::Add(terms) => {
                let mut acc = BigRealAtom::from_i64(0, prec);
                for term in terms {
                    match term.eval_big_real(prec)? {
                        Some(v) => acc = acc.add(&v),
                        None => return Ok(None),
                    }
                }
                Ok(Some(acc))
            }
            SymbolicForm::Mul(factors) => {
                let mut acc = BigRealAtom::from_i64(1, prec);
                for factor in factors {
                    match factor.eval_big_real(prec)? {
                        Some(v) => acc = acc.mul(&v),
                        None => return Ok(None),
                    }
                }
                Ok(Some(acc))
            }
            SymbolicForm::Pow(base, exp) => {
                let b = match base.eval_big_real(prec)? {
                    Some(v) => v,
                    None => return Ok(None),
                };
                if let SymbolicForm::Integer(n) = exp.as_ref() {
                    if let Some(k) = n.to_i64() {
                        if k >= 0 {
                            let mut acc = BigRealAtom::from_i64(1, prec);
                            let mut sq = b;
                            let mut e = k as u64;
                            while e > 0 {
                                if e & 1 == 1 {
                                    acc = acc.mul(&sq);
                                }
                                sq = sq.mul(&sq);
                                e >>= 1;
                            }
                            return Ok(Some(acc));
                        }
                    }
                }
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Converts back to an expression tree.
    pub fn to_expr(&self, symbols: &Symbols) -> ExprRef {
        match self {
            SymbolicForm::Integer(v) => expr::integer_big(v.clone()),
            SymbolicForm::Rational(v) => expr::rational_value(v.clone()),
            SymbolicForm::Real(v) => expr::real(*v),
            SymbolicForm::BigReal(v) => expr::big_real(v.clone()),
            SymbolicForm::Complex { re, im } => expr::complex_rational(re.clone(), im.clone()),
            SymbolicForm::Symbol(s) => expr::symbol(Arc::clone(s)),
            SymbolicForm::Add(terms) => expr::expression(
                expr::symbol(Arc::clone(&symbols.plus)),
                terms.iter().map(|t| t.to_expr(symbols)).collect(),
            ),
            SymbolicForm::Mul(factors) => expr::expression(
                expr::symbol(Arc::clone(&symbols.times)),
                factors.iter().map(|t| t.to_expr(symbols)).collect(),
            ),
            SymbolicForm::Pow(base, exp) => expr::expr2(
                expr::symbol(Arc::clone(&symbols.power)),
                base.to_expr(symbols),
                exp.to_expr(symbols),
            ),
        }
    }
}

fn mul_pair(a: &SymbolicForm, b: &SymbolicForm) -> SymbolicForm {
    let mut factors = Vec::new();
    match a {
        SymbolicForm::Mul(fs) => factors.extend(fs.iter().cloned()),
        other => factors.push(other.clone()),
    }
    match b {
        SymbolicForm::Mul(fs) => factors.extend(fs.iter().cloned()),
        other => factors.push(other.clone()),
    }
    SymbolicForm::Mul(factors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Symbol;

    fn sym_form(name: &str) -> SymbolicForm {
        SymbolicForm::Symbol(Symbol::create(name))
    }

    #[test]
    fn product_of_sums_distributes() {
        // (x + 1)(y + 2) -> four terms
        let x = sym_form("Global`x");
        let y = sym_form("Global`y");
        let one = SymbolicForm::Integer(BigInt::from(1));
        let two = SymbolicForm::Integer(BigInt::from(2));
        let product = SymbolicForm::Mul(vec![
            SymbolicForm::Add(vec![x, one]),
            SymbolicForm::Add(vec![y, two]),
        ]);
        match product.expand() {
            SymbolicForm::Add(terms) => assert_eq!(terms.len(), 4),
            other => panic!("expected a sum, got {:?}", other),
        }
    }

    #[test]
    fn small_powers_of_sums_multiply_out() {
        let x = sym_form("Global`x");
        let one = SymbolicForm::Integer(BigInt::from(1));
        let sq = SymbolicForm::Pow(
            Box::new(SymbolicForm::Add(vec![x, one])),
            Box::new(SymbolicForm::Integer(BigInt::from(2))),
        );
        match sq.expand() {
            SymbolicForm::Add(terms) => assert_eq!(terms.len(), 4),
            other => panic!("expected a sum, got {:?}", other),
        }
    }

    #[test]
    fn machine_evalf_folds_arithmetic() {
        let form = SymbolicForm::Add(vec![
            SymbolicForm::Integer(BigInt::from(1)),
            SymbolicForm::Rational(BigRational::new(BigInt::from(1), BigInt::from(2))),
        ]);
        let v = form
            .evalf(Precision::MACHINE)
            .expect("no exception")
            .expect("numeric");
        assert!(matches!(v.as_ref(), Expr::MachineReal(x) if (*x - 1.5).abs() < 1e-15));
    }

    #[test]
    fn high_precision_evalf_returns_big_reals() {
        let form = SymbolicForm::Rational(BigRational::new(BigInt::from(1), BigInt::from(3)));
        let prec = Precision::from_decimals(40.0);
        let v = form.evalf(prec).expect("no exception").expect("numeric");
        match v.as_ref() {
            Expr::BigReal(r) => {
                assert_eq!(r.prec.bits, prec.bits);
                assert!((r.as_f64() - 1.0 / 3.0).abs() < 1e-15);
            }
            other => panic!("expected big real, got {}", other),
        }
    }

    #[test]
    fn free_symbols_block_evalf() {
        let form = SymbolicForm::Add(vec![
            sym_form("Global`x"),
            SymbolicForm::Integer(BigInt::from(1)),
        ]);
        assert!(form.evalf(Precision::MACHINE).expect("no exception").is_none());
    }

    #[test]
    fn negative_root_raises_numeric_exception() {
        let form = SymbolicForm::Pow(
            Box::new(SymbolicForm::Integer(BigInt::from(-1))),
            Box::new(SymbolicForm::Rational(BigRational::new(
                BigInt::from(1),
                BigInt::from(2),
            ))),
        );
        assert!(matches!(
            form.evalf(Precision::MACHINE),
            Err(EvalError::NumericException(_))
        ));
    }
}
