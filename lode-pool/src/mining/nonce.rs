//! Prefix-partitioned nonce counter.

/// Counter producing a unique, monotonically growing byte sequence scoped to
/// a `(pool_id, personal_id)` prefix.
///
/// The first five bytes never change after construction: a big-endian `u32`
/// pool id followed by one personal-id byte. Everything after them is the
/// counter region, which starts as a single zero byte and grows whenever a
/// carry would otherwise spill into the prefix. Two incrementers with
/// distinct prefixes therefore can never emit the same nonce.
#[derive(Debug, Clone)]
pub struct NonceIncrementer {
    nonce: Vec<u8>,
    last_prefix_byte: usize,
    last_nonce_byte: usize,
}

impl NonceIncrementer {
    pub fn new(pool_id: u32, personal_id: u32) -> Self {
        let mut nonce = pool_id.to_be_bytes().to_vec();
        nonce.push(personal_id as u8);
        let last_prefix_byte = nonce.len() - 1;
        nonce.push(0);
        Self {
            nonce,
            last_prefix_byte,
            last_nonce_byte: 1,
        }
    }

    /// The current nonce, prefix included.
    pub fn nonce(&self) -> &[u8] {
        &self.nonce
    }

    /// Advance to the next nonce.
    ///
    /// Increments the last byte, carrying leftward through the counter
    /// region. A carry that reaches the prefix instead grows the region: a
    /// fresh `1` byte is inserted right after the prefix and the wrapped
    /// bytes become the low-order tail, e.g. `[prefix, 255]` steps to
    /// `[prefix, 1, 0]`. The nonce space is unbounded short of memory
    /// exhaustion.
    pub fn next_nonce(&mut self) {
        let mut idx = self.nonce.len() - self.last_nonce_byte;
        loop {
            self.nonce[idx] = self.nonce[idx].wrapping_add(1);
            if self.nonce[idx] != 0 {
                return;
            }
            if idx - 1 == self.last_prefix_byte {
                self.nonce.insert(self.last_prefix_byte + 1, 1);
                return;
            }
            idx -= 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_layout() {
        let inc = NonceIncrementer::new(1, 1);
        assert_eq!(inc.nonce(), &[0, 0, 0, 1, 1, 0]);

        let inc = NonceIncrementer::new(0xdead_beef, 0x1ff);
        // Only the low byte of the personal id lands in the prefix.
        assert_eq!(inc.nonce(), &[0xde, 0xad, 0xbe, 0xef, 0xff, 0]);
    }

    #[test]
    fn counting_carries_and_grows() {
        let mut inc = NonceIncrementer::new(2, 3);
        for _ in 0..255 {
            inc.next_nonce();
        }
        assert_eq!(inc.nonce(), &[0, 0, 0, 2, 3, 255]);

        // 256th step wraps the whole counter: grow instead of touching
        // the prefix.
        inc.next_nonce();
        assert_eq!(inc.nonce(), &[0, 0, 0, 2, 3, 1, 0]);

        inc.next_nonce();
        assert_eq!(inc.nonce(), &[0, 0, 0, 2, 3, 1, 1]);
    }

    #[test]
    fn grows_on_every_prefix_carry() {
        let mut inc = NonceIncrementer::new(1, 1);
        // The counter region reads as a big-endian integer equal to the
        // number of steps taken: step 256 grows [255] into [1, 0], and step
        // 65536 wraps [255, 255] into a second growth, [1, 0, 0].
        for step in 1..=(1u32 << 16) {
            inc.next_nonce();
            if step == 256 {
                assert_eq!(inc.nonce(), &[0, 0, 0, 1, 1, 1, 0]);
            }
            if step == 65_535 {
                assert_eq!(inc.nonce(), &[0, 0, 0, 1, 1, 255, 255]);
            }
        }
        assert_eq!(inc.nonce(), &[0, 0, 0, 1, 1, 1, 0, 0]);
    }

    #[test]
    fn growth_within_300_steps() {
        let mut inc = NonceIncrementer::new(1, 1);
        let initial_len = inc.nonce().len();
        for _ in 0..300 {
            inc.next_nonce();
        }
        assert!(inc.nonce().len() > initial_len);
    }

    #[test]
    fn distinct_personal_ids_never_collide() {
        let mut a = NonceIncrementer::new(1, 1);
        let mut b = NonceIncrementer::new(1, 2);
        for _ in 0..10_000 {
            a.next_nonce();
            b.next_nonce();
            // The prefix survives every carry, so byte 4 always separates
            // the two sequences.
            assert_eq!(a.nonce()[..5], [0, 0, 0, 1, 1]);
            assert_eq!(b.nonce()[..5], [0, 0, 0, 1, 2]);
        }
    }
}
