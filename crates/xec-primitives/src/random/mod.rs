//! Process-wide randomness service.
//!
//! Thread-safe entry points share a single ChaCha-based generator that is
//! seeded from the operating system on first use and guarded by a mutex.
//! `get_strong_rand_bytes` additionally mixes fresh OS entropy into every
//! request and is what key generation draws from.
//!
//! `FastRandomContext` is the explicit, per-use alternative: it owns its own
//! generator, is cheap to query and is deliberately not `Sync`.

use std::cell::Cell;
use std::marker::PhantomData;
use std::sync::{Mutex, OnceLock, PoisonError};

use rand::rngs::{OsRng, StdRng};
use rand::{Rng, RngCore, SeedableRng};

use crate::chainhash::Hash;

fn shared_rng() -> &'static Mutex<StdRng> {
    static RNG: OnceLock<Mutex<StdRng>> = OnceLock::new();
    RNG.get_or_init(|| Mutex::new(StdRng::from_entropy()))
}

fn with_shared_rng<T>(f: impl FnOnce(&mut StdRng) -> T) -> T {
    let mut rng = shared_rng().lock().unwrap_or_else(PoisonError::into_inner);
    f(&mut rng)
}

/// Fill `buf` with bytes from the shared generator.
pub fn get_rand_bytes(buf: &mut [u8]) {
    with_shared_rng(|rng| rng.fill_bytes(buf));
}

/// Fill `buf` with OS entropy mixed with the shared generator's output.
///
/// Suitable for secret material such as private keys.
pub fn get_strong_rand_bytes(buf: &mut [u8]) {
    OsRng.fill_bytes(buf);
    let mut mix = vec![0u8; buf.len()];
    get_rand_bytes(&mut mix);
    for (b, m) in buf.iter_mut().zip(mix.iter()) {
        *b ^= *m;
    }
}

/// Return a uniformly distributed integer in `[0, max)`.
///
/// Returns 0 when `max` is 0.
pub fn get_rand(max: u64) -> u64 {
    if max == 0 {
        return 0;
    }
    with_shared_rng(|rng| rng.gen_range(0..max))
}

/// Return a uniformly distributed integer in `[0, max)`, 0 when `max <= 0`.
pub fn get_rand_int(max: i32) -> i32 {
    if max <= 0 {
        return 0;
    }
    with_shared_rng(|rng| rng.gen_range(0..max))
}

/// Return 32 random bytes as a `Hash`.
pub fn get_rand_hash() -> Hash {
    let mut bytes = [0u8; 32];
    get_rand_bytes(&mut bytes);
    Hash::new(bytes)
}

/// A fast, single-owner random generator.
///
/// Not thread-safe: each user creates its own context.
pub struct FastRandomContext {
    rng: StdRng,
    _not_sync: PhantomData<Cell<()>>,
}

impl FastRandomContext {
    /// Create a context seeded from the shared generator.
    pub fn new() -> Self {
        let seed = get_rand_hash();
        Self::deterministic(*seed.as_bytes())
    }

    /// Create a context with a fixed seed, producing a reproducible stream.
    pub fn deterministic(seed: [u8; 32]) -> Self {
        FastRandomContext {
            rng: StdRng::from_seed(seed),
            _not_sync: PhantomData,
        }
    }

    /// Generate a random u64.
    pub fn rand64(&mut self) -> u64 {
        self.rng.next_u64()
    }

    /// Generate a random u32.
    pub fn rand32(&mut self) -> u32 {
        self.rng.next_u32()
    }

    /// Generate a random boolean.
    pub fn rand_bool(&mut self) -> bool {
        self.rng.gen()
    }

    /// Generate an integer in `[0, max)`, or 0 when `max` is 0.
    pub fn rand_range(&mut self, max: u64) -> u64 {
        if max == 0 {
            return 0;
        }
        self.rng.gen_range(0..max)
    }

    /// Generate `len` random bytes.
    pub fn rand_bytes(&mut self, len: usize) -> Vec<u8> {
        let mut out = vec![0u8; len];
        self.rng.fill_bytes(&mut out);
        out
    }

    /// Generate a random 32-byte hash.
    pub fn rand256(&mut self) -> Hash {
        let mut bytes = [0u8; 32];
        self.rng.fill_bytes(&mut bytes);
        Hash::new(bytes)
    }
}

impl Default for FastRandomContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_generator_produces_distinct_output() {
        let a = get_rand_hash();
        let b = get_rand_hash();
        assert_ne!(a, b, "two 256-bit draws should differ");

        let mut strong_a = [0u8; 32];
        let mut strong_b = [0u8; 32];
        get_strong_rand_bytes(&mut strong_a);
        get_strong_rand_bytes(&mut strong_b);
        assert_ne!(strong_a, strong_b);
    }

    #[test]
    fn test_get_rand_bounds() {
        assert_eq!(get_rand(0), 0);
        assert_eq!(get_rand_int(-5), 0);
        for _ in 0..1000 {
            assert!(get_rand(7) < 7);
            let v = get_rand_int(3);
            assert!((0..3).contains(&v));
        }
    }

    /// Concurrent callers share the generator without corrupting it.
    #[test]
    fn test_shared_generator_across_threads() {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                std::thread::spawn(|| {
                    let mut buf = [0u8; 64];
                    get_rand_bytes(&mut buf);
                    buf
                })
            })
            .collect();
        let outputs: Vec<[u8; 64]> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        for i in 0..outputs.len() {
            for j in i + 1..outputs.len() {
                assert_ne!(outputs[i], outputs[j]);
            }
        }
    }

    #[test]
    fn test_fast_context_deterministic() {
        let mut a = FastRandomContext::deterministic([9u8; 32]);
        let mut b = FastRandomContext::deterministic([9u8; 32]);
        assert_eq!(a.rand64(), b.rand64());
        assert_eq!(a.rand_bytes(17), b.rand_bytes(17));
        assert_eq!(a.rand256(), b.rand256());

        let mut c = FastRandomContext::deterministic([10u8; 32]);
        assert_ne!(a.rand64(), c.rand64());
    }

    #[test]
    fn test_fast_context_range() {
        let mut ctx = FastRandomContext::new();
        assert_eq!(ctx.rand_range(0), 0);
        for _ in 0..1000 {
            assert!(ctx.rand_range(10) < 10);
        }
        assert_eq!(ctx.rand_bytes(33).len(), 33);
    }
}
