//! Deterministic hash primitives.
//!
//! djb2-style combinators plus float normalization. Every function here is
//! bit-stable across platforms, which the API hash depends on: two builds
//! that register the same surface must produce the same fingerprint.

use core::hash::{BuildHasherDefault, Hasher};

/// Seed used by every djb2 combinator.
pub const HASH_SEED: u32 = 5381;

/// djb2 over the characters of a string.
#[must_use]
pub fn hash_djb2(s: &str) -> u32 {
    s.chars().fold(HASH_SEED, |h, c| hash_djb2_one_32(c as u32, h))
}

/// djb2 over raw bytes, continuing from `prev`.
#[must_use]
pub fn hash_djb2_buffer(bytes: &[u8], prev: u32) -> u32 {
    bytes
        .iter()
        .fold(prev, |h, &b| hash_djb2_one_32(u32::from(b), h))
}

/// 64-bit djb2 over raw bytes, continuing from `prev`.
#[must_use]
pub fn hash_djb2_buffer_64(bytes: &[u8], prev: u64) -> u64 {
    bytes
        .iter()
        .fold(prev, |h, &b| hash_djb2_one_64(u64::from(b), h))
}

/// Fold one 32-bit value into a running djb2 hash.
#[must_use]
pub const fn hash_djb2_one_32(value: u32, prev: u32) -> u32 {
    (prev << 5).wrapping_add(prev).wrapping_add(value)
}

/// Fold one 64-bit value into a running 64-bit djb2 hash.
#[must_use]
pub const fn hash_djb2_one_64(value: u64, prev: u64) -> u64 {
    (prev << 5).wrapping_add(prev).wrapping_add(value)
}

/// Thomas Wang's 64-bit integer mix, truncated to 32 bits.
#[must_use]
pub const fn hash_one_uint64(value: u64) -> u32 {
    let mut v = value;
    v = (!v).wrapping_add(v << 18);
    v ^= v >> 31;
    v = v.wrapping_mul(21);
    v ^= v >> 11;
    v = v.wrapping_add(v << 6);
    v ^= v >> 22;
    v as u32
}

/// Map both zeroes to `+0.0` and every NaN to one canonical NaN.
#[must_use]
pub fn normalize_f64(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else if value.is_nan() {
        f64::NAN
    } else {
        value
    }
}

/// Fold a double into a running djb2 hash.
#[must_use]
pub fn hash_djb2_one_float(value: f64, prev: u32) -> u32 {
    let bits = normalize_f64(value).to_bits();
    (prev << 5).wrapping_add(prev).wrapping_add(hash_one_uint64(bits))
}

/// Fold a single-precision float into a running djb2 hash.
#[must_use]
pub fn hash_djb2_one_float_32(value: f32, prev: u32) -> u32 {
    let normalized = if value == 0.0 {
        0.0
    } else if value.is_nan() {
        f32::NAN
    } else {
        value
    };
    let bits = hash_djb2_one_32(normalized.to_bits(), HASH_SEED);
    (prev << 5).wrapping_add(prev).wrapping_add(bits)
}

/// Float equality where NaN equals NaN.
#[must_use]
#[allow(clippy::float_cmp)]
pub fn float_equal(a: f64, b: f64) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

/// Per-type hash adapter with stable output.
pub trait StableHash {
    fn stable_hash(&self) -> u32;
}

macro_rules! impl_stable_hash_narrow {
    ($($ty:ty),*) => {
        $(
            impl StableHash for $ty {
                fn stable_hash(&self) -> u32 {
                    *self as u32
                }
            }
        )*
    };
}

impl_stable_hash_narrow!(u8, u16, u32, i8, i16, i32, char);

impl StableHash for u64 {
    fn stable_hash(&self) -> u32 {
        hash_one_uint64(*self)
    }
}

impl StableHash for i64 {
    fn stable_hash(&self) -> u32 {
        hash_one_uint64(*self as u64)
    }
}

impl StableHash for f32 {
    fn stable_hash(&self) -> u32 {
        hash_djb2_one_float_32(*self, HASH_SEED)
    }
}

impl StableHash for f64 {
    fn stable_hash(&self) -> u32 {
        hash_djb2_one_float(*self, HASH_SEED)
    }
}

impl StableHash for bool {
    fn stable_hash(&self) -> u32 {
        u32::from(*self)
    }
}

impl StableHash for str {
    fn stable_hash(&self) -> u32 {
        hash_djb2(self)
    }
}

impl StableHash for String {
    fn stable_hash(&self) -> u32 {
        hash_djb2(self)
    }
}

/// A `Hasher` that folds written bytes with djb2.
///
/// Maps built with [`BuildStableHasher`] iterate in the same order on every
/// run, unlike the randomized std hasher.
#[derive(Debug, Clone, Copy)]
pub struct StableHasher {
    state: u64,
}

impl Default for StableHasher {
    fn default() -> Self {
        Self {
            state: u64::from(HASH_SEED),
        }
    }
}

impl Hasher for StableHasher {
    fn finish(&self) -> u64 {
        self.state
    }

    fn write(&mut self, bytes: &[u8]) {
        self.state = hash_djb2_buffer_64(bytes, self.state);
    }
}

/// Builder for maps keyed with [`StableHasher`].
pub type BuildStableHasher = BuildHasherDefault<StableHasher>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_djb2_known_values() {
        assert_eq!(hash_djb2(""), 5381);
        assert_eq!(hash_djb2("a"), 5381 * 33 + 97);
        assert_eq!(hash_djb2_one_32(1, HASH_SEED), 177_574);
        assert_eq!(hash_djb2_buffer(b"a", HASH_SEED), hash_djb2("a"));
    }

    #[test]
    fn test_djb2_64_does_not_truncate() {
        let h = hash_djb2_one_64(u64::from(u32::MAX), u64::from(u32::MAX));
        assert!(h > u64::from(u32::MAX));
    }

    #[test]
    fn test_float_normalization() {
        assert_eq!(
            hash_djb2_one_float(0.0, HASH_SEED),
            hash_djb2_one_float(-0.0, HASH_SEED)
        );
        let other_nan = f64::from_bits(0x7ff8_0000_0000_0001);
        assert!(other_nan.is_nan());
        assert_eq!(
            hash_djb2_one_float(f64::NAN, HASH_SEED),
            hash_djb2_one_float(other_nan, HASH_SEED)
        );
        assert_ne!(
            hash_djb2_one_float(1.0, HASH_SEED),
            hash_djb2_one_float(2.0, HASH_SEED)
        );
        assert_eq!(
            hash_djb2_one_float_32(0.0, HASH_SEED),
            hash_djb2_one_float_32(-0.0, HASH_SEED)
        );
    }

    #[test]
    fn test_float_32_folds_seeded_bits() {
        // 1.0f32 is 0x3f80_0000; seeded first, then folded into `prev`.
        assert_eq!(hash_djb2_one_float_32(1.0, HASH_SEED), 1_065_708_362);
        assert_ne!(
            hash_djb2_one_float_32(1.0, HASH_SEED),
            hash_djb2_one_32(1.0_f32.to_bits(), HASH_SEED)
        );
    }

    #[test]
    fn test_float_equal() {
        assert!(float_equal(f64::NAN, f64::NAN));
        assert!(float_equal(0.0, -0.0));
        assert!(!float_equal(1.0, 1.5));
    }

    #[test]
    fn test_stable_hash_adapters() {
        assert_eq!(7u32.stable_hash(), 7);
        assert_eq!(true.stable_hash(), 1);
        assert_eq!(5u64.stable_hash(), hash_one_uint64(5));
        assert_eq!("name".stable_hash(), hash_djb2("name"));
        assert_eq!(String::from("name").stable_hash(), hash_djb2("name"));
    }

    #[test]
    fn test_stable_hasher_is_deterministic() {
        let mut a = StableHasher::default();
        let mut b = StableHasher::default();
        a.write(b"Object");
        b.write(b"Object");
        assert_eq!(a.finish(), b.finish());
        b.write(b"x");
        assert_ne!(a.finish(), b.finish());
    }
}
