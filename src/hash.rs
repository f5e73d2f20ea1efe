//! Structural hashing.
//!
//! Every expression kind hashes from a per-kind seed so that values of
//! different kinds land apart even when their payloads coincide. The law the
//! rest of the kernel relies on: `same(a, b)` implies `hash(a) == hash(b)`.

/// 64-bit FNV-1a offset basis / prime.
const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

pub const SEED_MACHINE_INTEGER: u64 = 0x1a39_4c52_95d1_0001;
pub const SEED_BIG_INTEGER: u64 = 0x1a39_4c52_95d1_0002;
pub const SEED_BIG_RATIONAL: u64 = 0x1a39_4c52_95d1_0003;
pub const SEED_MACHINE_REAL: u64 = 0x1a39_4c52_95d1_0004;
pub const SEED_BIG_REAL: u64 = 0x1a39_4c52_95d1_0005;
pub const SEED_MACHINE_COMPLEX: u64 = 0x1a39_4c52_95d1_0006;
pub const SEED_BIG_COMPLEX: u64 = 0x1a39_4c52_95d1_0007;
pub const SEED_STRING: u64 = 0x1a39_4c52_95d1_0008;
pub const SEED_SYMBOL: u64 = 0x1a39_4c52_95d1_0009;
pub const SEED_EXPRESSION: u64 = 0x1a39_4c52_95d1_000a;

#[inline]
pub fn hash_combine(seed: u64, value: u64) -> u64 {
    let mut h = seed ^ FNV_OFFSET;
    let mut v = value;
    for _ in 0..8 {
        h ^= v & 0xff;
        h = h.wrapping_mul(FNV_PRIME);
        v >>= 8;
    }
    h
}

#[inline]
pub fn hash_pair(seed: u64, value: u64) -> u64 {
    hash_combine(hash_combine(FNV_OFFSET, seed), value)
}

pub fn hash_bytes(seed: u64, bytes: &[u8]) -> u64 {
    let mut h = seed ^ FNV_OFFSET;
    for &b in bytes {
        h ^= b as u64;
        h = h.wrapping_mul(FNV_PRIME);
    }
    h
}

/// Chops off the last 8 bits of the mantissa so near-equal machine reals
/// hash identically and can satisfy the tolerance-based `Equal`.
pub fn chop(x: f64) -> f64 {
    if x == 0.0 || !x.is_finite() {
        return x;
    }

    const MANTISSA_BITS: u32 = f64::MANTISSA_DIGITS; // 53
    const IGNORE: f64 = (1u64 << 8) as f64;

    let (mantissa, exp) = frexp(x);
    let mut m = mantissa * (2f64).powi(MANTISSA_BITS as i32);
    m = (m / IGNORE).floor() * IGNORE;
    m * (2f64).powi(exp - MANTISSA_BITS as i32)
}

/// Decomposes `x` into `(mantissa, exponent)` with `0.5 <= |mantissa| < 1`.
fn frexp(x: f64) -> (f64, i32) {
    if x == 0.0 || !x.is_finite() {
        return (x, 0);
    }
    let bits = x.to_bits();
    let raw_exp = ((bits >> 52) & 0x7ff) as i32;
    if raw_exp == 0 {
        // subnormal: scale up first
        let scaled = x * (2f64).powi(64);
        let (m, e) = frexp(scaled);
        return (m, e - 64);
    }
    let exp = raw_exp - 1022;
    let mantissa_bits = (bits & !(0x7ffu64 << 52)) | (1022u64 << 52);
    (f64::from_bits(mantissa_bits), exp)
}

pub fn hash_machine_real(x: f64) -> u64 {
    hash_pair(SEED_MACHINE_REAL, chop(x).to_bits())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combine_is_order_sensitive() {
        let a = hash_combine(hash_combine(FNV_OFFSET, 1), 2);
        let b = hash_combine(hash_combine(FNV_OFFSET, 2), 1);
        assert_ne!(a, b);
    }

    #[test]
    fn seeds_separate_kinds() {
        assert_ne!(
            hash_pair(SEED_MACHINE_INTEGER, 42),
            hash_pair(SEED_MACHINE_REAL, 42)
        );
    }

    #[test]
    fn chop_keeps_value_close() {
        let x = 1.000000000000001_f64;
        let c = chop(x);
        assert!((x - c).abs() < 1e-12);
    }

    #[test]
    fn near_equal_reals_hash_identically() {
        let x = 0.1_f64 + 0.2_f64;
        let y = 0.3_f64;
        assert_ne!(x.to_bits(), y.to_bits());
        assert_eq!(hash_machine_real(x), hash_machine_real(y));
    }

    #[test]
    fn frexp_round_trips() {
        for &x in &[1.0, -3.25, 0.0078125, 12345.678, -0.1] {
            let (m, e) = frexp(x);
            assert!((m.abs() >= 0.5 && m.abs() < 1.0) || x == 0.0);
            assert!((m * (2f64).powi(e) - x).abs() <= f64::EPSILON * x.abs());
        }
    }
}
