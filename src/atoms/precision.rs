//! Precision bookkeeping for arbitrary-precision reals.

/// log2(10), the factor between decimal digits and mantissa bits.
const LOG_2_10: f64 = 3.321928094887362;

/// Precision of an inexact number, tracked both in mantissa bits and in
/// decimal digits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Precision {
    pub bits: u32,
    pub decimals: f64,
}

impl Precision {
    pub const NONE: Precision = Precision {
        bits: 0,
        decimals: 0.0,
    };

    /// Machine precision: the f64 mantissa width.
    pub const MACHINE: Precision = Precision {
        bits: f64::MANTISSA_DIGITS,
        decimals: f64::MANTISSA_DIGITS as f64 / LOG_2_10,
    };

    pub fn from_decimals(decimals: f64) -> Precision {
        Precision {
            bits: (LOG_2_10 * decimals).ceil() as u32,
            decimals,
        }
    }

    pub fn from_bits(bits: u32) -> Precision {
        Precision {
            bits,
            decimals: bits as f64 / LOG_2_10,
        }
    }

    pub fn is_machine(&self) -> bool {
        self.bits == f64::MANTISSA_DIGITS
    }

    pub fn is_none(&self) -> bool {
        self.bits == 0
    }

    pub fn min(self, other: Precision) -> Precision {
        if self.bits <= other.bits {
            self
        } else {
            other
        }
    }
}

impl PartialOrd for Precision {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.bits.cmp(&other.bits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_bit_conversion_round_trips() {
        let p = Precision::from_decimals(20.0);
        assert_eq!(p.bits, 67);
        let q = Precision::from_bits(p.bits);
        assert!((q.decimals - 20.0).abs() < 0.5);
    }

    #[test]
    fn machine_precision_matches_f64() {
        assert_eq!(Precision::MACHINE.bits, 53);
        assert!(Precision::MACHINE.is_machine());
    }

    #[test]
    fn min_picks_the_smaller() {
        let a = Precision::from_bits(100);
        let b = Precision::from_bits(64);
        assert_eq!(a.min(b).bits, 64);
    }
}
