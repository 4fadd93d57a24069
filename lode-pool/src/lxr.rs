//! Lookup-table hash engine.
//!
//! Scoring a nonce means hashing `opr_hash || nonce` through a large table of
//! pseudo-randomly shuffled bytes. The table makes the hash memory-bound: the
//! map is far bigger than cache, so every lookup is an expected cache miss and
//! raw ALU width buys little.
//!
//! Building the table is expensive, so the engine lives in a process-global
//! that is initialized exactly once. Call [`init`] (or [`init_with`]) at
//! startup; both are idempotent and later calls are no-ops. [`hash`] falls
//! back to the default configuration if nothing initialized the engine first.

use std::env;
use std::sync::OnceLock;

use thiserror::Error;

/// Default generation seed.
pub const DEFAULT_SEED: u64 = 0xfafa_ecec_fafa_ecec;
/// Default log2 of the byte map size. 2^25 = 32 MiB.
pub const DEFAULT_MAP_SIZE_BITS: u8 = 25;
/// Default digest width in bits.
pub const DEFAULT_HASH_SIZE: u16 = 256;
/// Default number of mixing passes over the digest state.
pub const DEFAULT_PASSES: u8 = 5;

/// Environment variable overriding `map_size_bits`. Values outside
/// [`MIN_MAP_SIZE_BITS`]..=[`MAX_MAP_SIZE_BITS`] are ignored in favor of the
/// default.
pub const BIT_SIZE_ENV: &str = "LXRBITSIZE";

pub const MIN_MAP_SIZE_BITS: u8 = 8;
pub const MAX_MAP_SIZE_BITS: u8 = 30;

/// Shuffle rounds applied while generating the byte map.
const MAP_SHUFFLE_ROUNDS: usize = 7;

/// Errors surfaced while validating an engine configuration. Fatal at
/// startup: an engine that cannot initialize cannot score work.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum HashInitError {
    #[error("map size bits {0} outside supported range {MIN_MAP_SIZE_BITS}..={MAX_MAP_SIZE_BITS}")]
    MapSizeOutOfRange(u8),

    #[error("hash size {0} must be a multiple of 8 bits, at least 256")]
    InvalidHashSize(u16),

    #[error("at least one mixing pass is required")]
    ZeroPasses,
}

/// Engine configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LxrConfig {
    pub seed: u64,
    pub map_size_bits: u8,
    pub hash_size: u16,
    pub passes: u8,
}

impl Default for LxrConfig {
    fn default() -> Self {
        Self {
            seed: DEFAULT_SEED,
            map_size_bits: DEFAULT_MAP_SIZE_BITS,
            hash_size: DEFAULT_HASH_SIZE,
            passes: DEFAULT_PASSES,
        }
    }
}

impl LxrConfig {
    /// Default configuration with the environment override applied.
    ///
    /// `LXRBITSIZE` replaces `map_size_bits` when it parses into the
    /// supported range; anything else (unset, garbage, out of range) leaves
    /// the default in place.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(bits) = env::var(BIT_SIZE_ENV).map(|v| v.parse::<u8>()) {
            if let Ok(bits) = bits {
                if (MIN_MAP_SIZE_BITS..=MAX_MAP_SIZE_BITS).contains(&bits) {
                    config.map_size_bits = bits;
                }
            }
        }
        config
    }

    pub fn validate(&self) -> Result<(), HashInitError> {
        if !(MIN_MAP_SIZE_BITS..=MAX_MAP_SIZE_BITS).contains(&self.map_size_bits) {
            return Err(HashInitError::MapSizeOutOfRange(self.map_size_bits));
        }
        if self.hash_size < 256 || self.hash_size % 8 != 0 {
            return Err(HashInitError::InvalidHashSize(self.hash_size));
        }
        if self.passes == 0 {
            return Err(HashInitError::ZeroPasses);
        }
        Ok(())
    }
}

/// The table hash itself. Owned by the process-global [`engine`]; construct
/// directly only in benchmarks or tests that need a private instance.
pub struct LxrHash {
    byte_map: Vec<u8>,
    mask: u64,
    hash_bytes: usize,
    passes: u8,
    seed: u64,
}

impl LxrHash {
    /// Generate the byte map and return a ready engine.
    ///
    /// The map starts as the identity (so every byte value keeps its overall
    /// frequency) and is then swapped into disorder by a seeded generator,
    /// [`MAP_SHUFFLE_ROUNDS`] full sweeps.
    pub fn generate(config: LxrConfig) -> Self {
        let map_size: u64 = 1 << config.map_size_bits;
        let mask = map_size - 1;

        let mut byte_map: Vec<u8> = (0..map_size).map(|i| i as u8).collect();

        let mut offset = config.seed
            ^ config.seed.rotate_left(32)
            ^ config.seed.rotate_left(16)
            ^ (config.seed >> 7);
        let mut state = config.seed;
        for _ in 0..MAP_SHUFFLE_ROUNDS {
            for i in 0..map_size as usize {
                offset = offset.rotate_left(9) ^ (offset >> 1) ^ state;
                state = state.rotate_left(17) ^ (state >> 1) ^ offset ^ i as u64;
                let j = ((offset ^ state) & mask) as usize;
                byte_map.swap(i, j);
            }
        }

        Self {
            byte_map,
            mask,
            hash_bytes: config.hash_size as usize / 8,
            passes: config.passes,
            seed: config.seed,
        }
    }

    /// Digest width in bytes.
    pub fn hash_bytes(&self) -> usize {
        self.hash_bytes
    }

    /// Hash `src` into a `hash_bytes`-wide digest (at least 32 bytes).
    pub fn hash(&self, src: &[u8]) -> Vec<u8> {
        let n = self.hash_bytes;
        let mut hs = vec![0u64; n];
        let mut acc = self.seed;
        let (mut s1, mut s2, mut s3) = (0u64, 0u64, 0u64);

        let look = |v: u64| -> u64 { self.byte_map[(v & self.mask) as usize] as u64 };

        // Absorb the input one byte at a time, rotating through the lanes.
        for (i, &byte) in src.iter().enumerate() {
            let v = byte as u64;
            let idx = i % n;
            acc = acc.rotate_left(7) ^ (v << 20) ^ (v << 4) ^ v ^ (look(acc ^ v) << 12);
            s1 = s1.rotate_left(9) ^ (s1 >> 3) ^ hs[idx] ^ acc;
            hs[idx] = s1 ^ acc;
            (s1, s2, s3) = (s3, s1, s2);
        }

        // Mixing passes: every lane is rewritten through table lookups that
        // depend on the whole running state, not just the lane itself.
        for _ in 0..self.passes {
            for idx in 0..n {
                let v = hs[idx];
                s1 = s1.rotate_left(9) ^ (s1 >> 1) ^ acc ^ (look(acc.rotate_right(5) ^ v) << 3);
                s1 = s1.rotate_left(5) ^ (s1 >> 3) ^ (look(s1 ^ v) << 7);
                acc = acc.rotate_left(17)
                    ^ (acc >> 5)
                    ^ s1
                    ^ (look(acc ^ s1.rotate_right(27) ^ v) << 11);
                hs[idx] = s1 ^ acc ^ v.rotate_left(7) ^ (v >> 13);
                (s1, s2, s3) = (s3, s1, s2);
            }
        }

        // Squeeze each 64-bit lane down to one output byte through the map.
        let mut out = vec![0u8; n];
        for (i, &h) in hs.iter().enumerate() {
            let folded = h ^ (h >> 32) ^ (h >> 17);
            out[i] = self.byte_map[(folded & self.mask) as usize];
        }
        out
    }
}

static ENGINE: OnceLock<LxrHash> = OnceLock::new();

/// Initialize the global engine with defaults plus the environment override.
/// Idempotent; a no-op if the engine is already up.
pub fn init() -> Result<(), HashInitError> {
    init_with(LxrConfig::from_env())
}

/// Initialize the global engine with an explicit configuration.
///
/// The first successful call wins; later calls validate their argument and
/// otherwise do nothing, so concurrent initializers are safe.
pub fn init_with(config: LxrConfig) -> Result<(), HashInitError> {
    if ENGINE.get().is_some() {
        return Ok(());
    }
    config.validate()?;
    let _ = ENGINE.get_or_init(|| LxrHash::generate(config));
    Ok(())
}

fn engine() -> &'static LxrHash {
    // The default configuration always validates, so an uninitialized
    // engine self-initializes rather than erroring on first use.
    ENGINE.get_or_init(|| LxrHash::generate(LxrConfig::default()))
}

/// Hash `src` through the global engine.
pub fn hash(src: &[u8]) -> Vec<u8> {
    engine().hash(src)
}

/// Initialize the global engine with a tiny (1 KiB) map so hashing tests run
/// instantly. First caller wins; safe to call from every test that hashes.
#[cfg(test)]
pub(crate) fn init_for_tests() {
    let _ = init_with(LxrConfig {
        map_size_bits: 10,
        ..LxrConfig::default()
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_config() -> LxrConfig {
        LxrConfig {
            map_size_bits: 10,
            ..LxrConfig::default()
        }
    }

    #[test]
    fn validate_rejects_out_of_range_map() {
        let config = LxrConfig {
            map_size_bits: 31,
            ..LxrConfig::default()
        };
        assert_eq!(config.validate(), Err(HashInitError::MapSizeOutOfRange(31)));

        let config = LxrConfig {
            map_size_bits: 7,
            ..LxrConfig::default()
        };
        assert_eq!(config.validate(), Err(HashInitError::MapSizeOutOfRange(7)));
    }

    #[test]
    fn validate_rejects_bad_hash_size() {
        let config = LxrConfig {
            hash_size: 100,
            ..LxrConfig::default()
        };
        assert_eq!(config.validate(), Err(HashInitError::InvalidHashSize(100)));
    }

    #[test]
    fn validate_rejects_zero_passes() {
        let config = LxrConfig {
            passes: 0,
            ..LxrConfig::default()
        };
        assert_eq!(config.validate(), Err(HashInitError::ZeroPasses));
    }

    #[test]
    fn env_override_out_of_range_is_ignored() {
        std::env::set_var(BIT_SIZE_ENV, "50");
        assert_eq!(LxrConfig::from_env().map_size_bits, DEFAULT_MAP_SIZE_BITS);

        std::env::set_var(BIT_SIZE_ENV, "not a number");
        assert_eq!(LxrConfig::from_env().map_size_bits, DEFAULT_MAP_SIZE_BITS);

        std::env::set_var(BIT_SIZE_ENV, "12");
        assert_eq!(LxrConfig::from_env().map_size_bits, 12);

        std::env::remove_var(BIT_SIZE_ENV);
        assert_eq!(LxrConfig::from_env().map_size_bits, DEFAULT_MAP_SIZE_BITS);
    }

    #[test]
    fn digest_is_deterministic_and_wide_enough() {
        let lx = LxrHash::generate(small_config());
        let a = lx.hash(b"opr hash plus nonce");
        let b = lx.hash(b"opr hash plus nonce");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn digest_varies_with_input() {
        let lx = LxrHash::generate(small_config());
        assert_ne!(lx.hash(b"nonce-1"), lx.hash(b"nonce-2"));
        assert_ne!(lx.hash(b""), lx.hash(b"\0"));
    }

    #[test]
    fn map_preserves_byte_frequencies() {
        let lx = LxrHash::generate(small_config());
        // 1024-entry map built from the identity: each byte value appears
        // exactly map_size / 256 times no matter how it was shuffled.
        let mut counts = [0usize; 256];
        for &b in &lx.byte_map {
            counts[b as usize] += 1;
        }
        assert!(counts.iter().all(|&c| c == 1024 / 256));
    }

    #[test]
    fn global_init_is_idempotent() {
        init_for_tests();
        let before = hash(b"stable");
        // Second init with a different configuration must be a no-op.
        assert!(init_with(LxrConfig::default()).is_ok());
        assert!(init().is_ok());
        assert_eq!(hash(b"stable"), before);
    }
}
