//! Arbitrary-precision rational atom.
//!
//! Always reduced, denominator strictly positive. A denominator of 1 never
//! reaches this carrier: [`crate::expr::rational`] demotes it to an integer
//! kind on construction.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::ToPrimitive;

use crate::hash::{hash_bytes, SEED_BIG_RATIONAL};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigRationalAtom {
    pub value: BigRational,
}

impl BigRationalAtom {
    /// Wraps an already-reduced ratio. `BigRational::new` reduces and
    /// normalizes the denominator sign, so every path through here holds
    /// the invariants.
    pub fn new(value: BigRational) -> BigRationalAtom {
        debug_assert!(value.denom() > &BigInt::from(0));
        BigRationalAtom { value }
    }

    pub fn hash(&self) -> u64 {
        let (_, num_bytes) = self.value.numer().to_bytes_le();
        let (_, den_bytes) = self.value.denom().to_bytes_le();
        let seed = if self.is_negative() {
            SEED_BIG_RATIONAL ^ 0x5a5a
        } else {
            SEED_BIG_RATIONAL
        };
        hash_bytes(hash_bytes(seed, &num_bytes), &den_bytes)
    }

    pub fn is_negative(&self) -> bool {
        self.value.numer().sign() == num_bigint::Sign::Minus
    }

    pub fn to_f64(&self) -> f64 {
        self.value.to_f64().unwrap_or(f64::NAN)
    }
}
