//! Difficulty scoring and hash-rate estimation.

use crate::lxr;

/// 2^64 as a float, the size of the difficulty space.
const TWO_64: f64 = 18_446_744_073_709_551_616.0;

/// Score a nonce against a work unit.
///
/// The difficulty is the first eight bytes of `H(opr_hash || nonce)` read
/// big-endian. There is no difficulty bar built into the value itself:
/// higher is better, and callers compare against whatever acceptance bar is
/// current.
pub fn compute_difficulty(opr_hash: &[u8], nonce: &[u8]) -> u64 {
    let mut buf = Vec::with_capacity(opr_hash.len() + nonce.len());
    buf.extend_from_slice(opr_hash);
    buf.extend_from_slice(nonce);
    let digest = lxr::hash(&buf);
    u64::from_be_bytes(digest[..8].try_into().expect("digest is at least 8 bytes"))
}

/// Estimate the hash rate behind `samples` shares whose worst target was
/// `target`, observed over `secs` seconds.
///
/// A uniform draw lands at or above `target` with probability
/// `(2^64 - target) / 2^64`, so its reciprocal is the expected number of
/// trials per such share. Multiplying by the number of shares and dividing
/// by the observation window yields trials per second. Returns 0 when the
/// window is empty or zero-length.
pub fn effective_hash_rate(target: u64, samples: usize, secs: f64) -> f64 {
    if samples == 0 || secs <= 0.0 {
        return 0.0;
    }
    let spacing = TWO_64 / (TWO_64 - target as f64).max(1.0);
    spacing * samples as f64 / secs
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difficulty_is_deterministic() {
        lxr::init_for_tests();
        let opr = [0xab; 32];
        let nonce = [0, 0, 0, 1, 1, 7];
        let a = compute_difficulty(&opr, &nonce);
        let b = compute_difficulty(&opr, &nonce);
        assert_eq!(a, b);
    }

    #[test]
    fn difficulty_depends_on_nonce() {
        lxr::init_for_tests();
        let opr = [0xab; 32];
        let a = compute_difficulty(&opr, &[0, 0, 0, 1, 1, 1]);
        let b = compute_difficulty(&opr, &[0, 0, 0, 1, 1, 2]);
        assert_ne!(a, b);
    }

    #[test]
    fn zero_target_counts_raw_trials() {
        // Every draw clears a zero target: one expected trial per share.
        assert_eq!(effective_hash_rate(0, 10, 5.0), 2.0);
    }

    #[test]
    fn halfway_target_doubles_the_trials() {
        let rate = effective_hash_rate(1u64 << 63, 10, 5.0);
        assert_eq!(rate, 4.0);
    }

    #[test]
    fn empty_window_is_zero() {
        assert_eq!(effective_hash_rate(1 << 63, 10, 0.0), 0.0);
        assert_eq!(effective_hash_rate(1 << 63, 0, 5.0), 0.0);
    }

    #[test]
    fn extreme_target_stays_finite() {
        let rate = effective_hash_rate(u64::MAX, 1, 1.0);
        assert!(rate.is_finite());
        assert!(rate > 0.0);
    }
}
