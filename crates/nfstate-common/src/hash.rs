//! Key hashing and equality capabilities
//!
//! Containers never hash or compare keys on their own. They are handed a
//! [`KeyOps`] value at construction and use it for the structure's whole
//! lifetime, so both functions must be pure: the same key always hashes to
//! the same value and equality never changes its mind.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

const FNV_OFFSET: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// Hash and equality for keys of type `K`
pub trait KeyOps<K: ?Sized> {
    /// 32-bit hash of `key`
    fn key_hash(&self, key: &K) -> u32;

    /// Whether two keys denote the same entry
    fn key_eq(&self, a: &K, b: &K) -> bool;
}

/// FNV-1a streaming hasher
#[derive(Debug, Clone, Copy)]
pub struct FnvHasher(u64);

impl Default for FnvHasher {
    #[inline(always)]
    fn default() -> Self {
        Self(FNV_OFFSET)
    }
}

impl Hasher for FnvHasher {
    #[inline(always)]
    fn finish(&self) -> u64 {
        self.0
    }

    #[inline(always)]
    fn write(&mut self, bytes: &[u8]) {
        for byte in bytes {
            self.0 ^= *byte as u64;
            self.0 = self.0.wrapping_mul(FNV_PRIME);
        }
    }
}

/// Fold a 64-bit hash into 32 bits without discarding the high half
#[inline(always)]
pub fn fold64(h: u64) -> u32 {
    (h ^ (h >> 32)) as u32
}

/// FNV-1a over the key's `Hash` impl, `Eq` for equality
pub struct FnvKeyOps<K: ?Sized>(PhantomData<fn(&K)>);

impl<K: ?Sized> FnvKeyOps<K> {
    /// Create the capability
    pub const fn new() -> Self {
        Self(PhantomData)
    }
}

impl<K: ?Sized> Default for FnvKeyOps<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: ?Sized> Clone for FnvKeyOps<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K: ?Sized> Copy for FnvKeyOps<K> {}

impl<K: ?Sized> fmt::Debug for FnvKeyOps<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnvKeyOps")
    }
}

impl<K: Hash + Eq + ?Sized> KeyOps<K> for FnvKeyOps<K> {
    #[inline(always)]
    fn key_hash(&self, key: &K) -> u32 {
        let mut h = FnvHasher::default();
        key.hash(&mut h);
        fold64(h.finish())
    }

    #[inline(always)]
    fn key_eq(&self, a: &K, b: &K) -> bool {
        a == b
    }
}

/// Plain function pointers for equality and hash
pub struct FnKeyOps<K> {
    eq: fn(&K, &K) -> bool,
    hash: fn(&K) -> u32,
}

impl<K> FnKeyOps<K> {
    /// Bundle an equality and a hash function
    pub const fn new(eq: fn(&K, &K) -> bool, hash: fn(&K) -> u32) -> Self {
        Self { eq, hash }
    }
}

impl<K> Clone for FnKeyOps<K> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<K> Copy for FnKeyOps<K> {}

impl<K> fmt::Debug for FnKeyOps<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnKeyOps")
    }
}

impl<K> KeyOps<K> for FnKeyOps<K> {
    #[inline(always)]
    fn key_hash(&self, key: &K) -> u32 {
        (self.hash)(key)
    }

    #[inline(always)]
    fn key_eq(&self, a: &K, b: &K) -> bool {
        (self.eq)(a, b)
    }
}

/// Continue a CRC-32 computation over one 32-bit word.
///
/// `crc_digest(crc_digest(0, a), b)` is the checksum of `a` followed by `b`
/// (little-endian), which is how salted digests are chained.
#[inline]
pub fn crc_digest(crc: u32, value: u32) -> u32 {
    let mut h = crc32fast::Hasher::new_with_initial(crc);
    h.update(&value.to_le_bytes());
    h.finalize()
}

/// Digests are keys too: hashed with a single CRC round
#[derive(Debug, Default, Clone, Copy)]
pub struct DigestKeyOps;

impl KeyOps<u32> for DigestKeyOps {
    #[inline(always)]
    fn key_hash(&self, key: &u32) -> u32 {
        crc_digest(0, *key)
    }

    #[inline(always)]
    fn key_eq(&self, a: &u32, b: &u32) -> bool {
        a == b
    }
}
