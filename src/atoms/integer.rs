//! Arbitrary-precision integer atom.
//!
//! Machine integers live directly in the expression sum as `i64`; this
//! carrier only exists for values outside the machine range. Construction
//! goes through [`crate::expr::integer`], which demotes in-range values, so
//! two structurally equal integers always share a kind.

use num_bigint::BigInt;
use num_traits::ToPrimitive;
use once_cell::sync::OnceCell;

use crate::hash::{hash_bytes, SEED_BIG_INTEGER};

#[derive(Debug)]
pub struct BigIntegerAtom {
    pub value: BigInt,
    hash: OnceCell<u64>,
}

impl BigIntegerAtom {
    pub fn new(value: BigInt) -> BigIntegerAtom {
        BigIntegerAtom {
            value,
            hash: OnceCell::new(),
        }
    }

    /// Structural hash, computed once and cached.
    pub fn hash(&self) -> u64 {
        *self.hash.get_or_init(|| {
            let (sign, bytes) = self.value.to_bytes_le();
            hash_bytes(SEED_BIG_INTEGER ^ sign_seed(sign), &bytes)
        })
    }

    pub fn is_negative(&self) -> bool {
        self.value.sign() == num_bigint::Sign::Minus
    }

    pub fn to_f64(&self) -> f64 {
        self.value.to_f64().unwrap_or(f64::INFINITY)
    }
}

fn sign_seed(sign: num_bigint::Sign) -> u64 {
    match sign {
        num_bigint::Sign::Minus => 0x5a5a,
        _ => 0,
    }
}

impl Clone for BigIntegerAtom {
    fn clone(&self) -> Self {
        BigIntegerAtom::new(self.value.clone())
    }
}

impl PartialEq for BigIntegerAtom {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl Eq for BigIntegerAtom {}
