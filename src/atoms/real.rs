//! Arbitrary-precision real atom.
//!
//! Backed by a binary big-float with an explicit [`Precision`]. Arithmetic
//! results inherit the minimum precision of the operands; the hash chops the
//! value to machine width first so that the hash-equality law holds across
//! precisions.

use dashu::float::FBig;
use dashu::integer::{IBig, UBig};
use num_bigint::BigInt;
use num_rational::BigRational;

use crate::atoms::precision::Precision;
use crate::hash::{hash_machine_real, hash_pair, SEED_BIG_REAL};

#[derive(Debug, Clone)]
pub struct BigRealAtom {
    pub value: FBig,
    pub prec: Precision,
}

pub(crate) fn ibig_from_bigint(value: &BigInt) -> IBig {
    let (sign, bytes) = value.to_bytes_le();
    let magnitude = IBig::from(UBig::from_le_bytes(&bytes));
    match sign {
        num_bigint::Sign::Minus => -magnitude,
        _ => magnitude,
    }
}

impl BigRealAtom {
    pub fn new(value: FBig, prec: Precision) -> BigRealAtom {
        let value = value.with_precision(prec.bits as usize).value();
        BigRealAtom { value, prec }
    }

    /// Converts a machine real. Returns `None` for NaN and infinities, which
    /// have no big-real form.
    pub fn from_f64(x: f64, prec: Precision) -> Option<BigRealAtom> {
        let value = FBig::try_from(x).ok()?;
        Some(BigRealAtom::new(value, prec))
    }

    pub fn from_bigint(value: &BigInt, prec: Precision) -> BigRealAtom {
        BigRealAtom::new(FBig::from(ibig_from_bigint(value)), prec)
    }

    pub fn from_i64(value: i64, prec: Precision) -> BigRealAtom {
        BigRealAtom::new(FBig::from(IBig::from(value)), prec)
    }

    pub fn from_rational(value: &BigRational, prec: Precision) -> BigRealAtom {
        let num = FBig::from(ibig_from_bigint(value.numer()))
            .with_precision(prec.bits as usize)
            .value();
        let den = FBig::from(ibig_from_bigint(value.denom()));
        BigRealAtom::new(num / den, prec)
    }

    pub fn as_f64(&self) -> f64 {
        self.value.to_f64().value()
    }

    /// Bit-exact comparison used by `SameQ`.
    pub fn same(&self, other: &BigRealAtom) -> bool {
        self.value == other.value
    }

    pub fn hash(&self) -> u64 {
        hash_pair(SEED_BIG_REAL, hash_machine_real(self.as_f64()))
    }

    pub fn is_negative(&self) -> bool {
        self.value.sign() == dashu::base::Sign::Negative && !self.value.repr().is_zero()
    }

    pub fn is_zero(&self) -> bool {
        self.value.repr().is_zero()
    }

    pub fn add(&self, other: &BigRealAtom) -> BigRealAtom {
        let prec = self.prec.min(other.prec);
        BigRealAtom::new(&self.value + &other.value, prec)
    }

    pub fn mul(&self, other: &BigRealAtom) -> BigRealAtom {
        let prec = self.prec.min(other.prec);
        BigRealAtom::new(&self.value * &other.value, prec)
    }

    pub fn div(&self, other: &BigRealAtom) -> BigRealAtom {
        let prec = self.prec.min(other.prec);
        BigRealAtom::new(&self.value / &other.value, prec)
    }

    pub fn neg(&self) -> BigRealAtom {
        BigRealAtom {
            value: -self.value.clone(),
            prec: self.prec,
        }
    }

    /// Decimal rendering for boxes and message formatting.
    pub fn to_decimal_string(&self) -> String {
        self.value.to_decimal().value().to_string()
    }
}

impl PartialEq for BigRealAtom {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}
