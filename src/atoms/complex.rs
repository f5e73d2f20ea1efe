//! Exact complex atom.
//!
//! Machine complex values live in the expression sum as a pair of doubles;
//! this carrier holds the exact form: rational real and imaginary parts, as
//! produced by the symbolic-form layer's complex construction.

use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::Zero;

use crate::atoms::rational::BigRationalAtom;
use crate::hash::{hash_combine, SEED_BIG_COMPLEX};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BigComplexAtom {
    pub re: BigRational,
    pub im: BigRational,
}

impl BigComplexAtom {
    /// A complex value with a zero imaginary part is not complex; callers
    /// construct through [`crate::expr::complex`], which demotes first.
    pub fn new(re: BigRational, im: BigRational) -> BigComplexAtom {
        debug_assert!(!im.is_zero());
        BigComplexAtom { re, im }
    }

    pub fn from_integers(re: i64, im: i64) -> BigComplexAtom {
        BigComplexAtom {
            re: BigRational::from_integer(BigInt::from(re)),
            im: BigRational::from_integer(BigInt::from(im)),
        }
    }

    pub fn hash(&self) -> u64 {
        let re = BigRationalAtom::new(self.re.clone()).hash();
        let im = BigRationalAtom::new(self.im.clone()).hash();
        hash_combine(hash_combine(SEED_BIG_COMPLEX, re), im)
    }

    pub fn add(&self, other: &BigComplexAtom) -> (BigRational, BigRational) {
        (&self.re + &other.re, &self.im + &other.im)
    }

    pub fn mul(&self, other: &BigComplexAtom) -> (BigRational, BigRational) {
        let re = &self.re * &other.re - &self.im * &other.im;
        let im = &self.re * &other.im + &self.im * &other.re;
        (re, im)
    }

    pub fn to_complex64(&self) -> num_complex::Complex64 {
        let re = BigRationalAtom::new(self.re.clone()).to_f64();
        let im = BigRationalAtom::new(self.im.clone()).to_f64();
        num_complex::Complex64::new(re, im)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multiplication_follows_i_squared() {
        // (0 + i)(0 + i) = -1
        let i = BigComplexAtom::from_integers(0, 1);
        let (re, im) = i.mul(&i);
        assert_eq!(re, BigRational::from_integer(BigInt::from(-1)));
        assert!(im.is_zero());
    }

    #[test]
    fn equal_parts_hash_equal() {
        let a = BigComplexAtom::from_integers(2, 3);
        let b = BigComplexAtom::from_integers(2, 3);
        assert_eq!(a, b);
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn conjugates_differ() {
        let a = BigComplexAtom::from_integers(2, 3);
        let b = BigComplexAtom::from_integers(2, -3);
        assert_ne!(a, b);
    }
}
