//! Hashrate measurement type.

/// Hashrate in hashes per second.
///
/// Estimated rates come out of floating-point arithmetic (share windows,
/// expected-trial models), so the inner value is an `f64` rather than a
/// counter.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HashRate(pub f64);

impl HashRate {
    /// Create from megahashes per second
    pub fn from_megahashes(mh: f64) -> Self {
        Self(mh * 1_000_000.0)
    }

    /// Create from gigahashes per second
    pub fn from_gigahashes(gh: f64) -> Self {
        Self(gh * 1_000_000_000.0)
    }

    /// Get value as megahashes per second
    pub fn as_megahashes(&self) -> f64 {
        self.0 / 1_000_000.0
    }

    /// Get value as gigahashes per second
    pub fn as_gigahashes(&self) -> f64 {
        self.0 / 1_000_000_000.0
    }

    /// Returns true if the hashrate is zero.
    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }

    /// Format as human-readable string with appropriate units
    pub fn to_human_readable(&self) -> String {
        if self.0 >= 1_000_000_000_000.0 {
            format!("{:.2} TH/s", self.0 / 1_000_000_000_000.0)
        } else if self.0 >= 1_000_000_000.0 {
            format!("{:.2} GH/s", self.as_gigahashes())
        } else if self.0 >= 1_000_000.0 {
            format!("{:.2} MH/s", self.as_megahashes())
        } else {
            format!("{:.2} H/s", self.0)
        }
    }
}

impl From<f64> for HashRate {
    fn from(hashes_per_second: f64) -> Self {
        Self(hashes_per_second)
    }
}

impl From<HashRate> for f64 {
    fn from(rate: HashRate) -> Self {
        rate.0
    }
}

impl std::fmt::Display for HashRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_human_readable())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hashrate_conversions() {
        let rate = HashRate::from_gigahashes(500.0);
        assert_eq!(rate.as_gigahashes(), 500.0);
        assert_eq!(rate.to_human_readable(), "500.00 GH/s");

        let rate = HashRate::from_megahashes(1.5);
        assert_eq!(f64::from(rate), 1_500_000.0);
    }

    #[test]
    fn test_small_rates_render_in_base_units() {
        assert_eq!(HashRate(123.456).to_human_readable(), "123.46 H/s");
        assert!(HashRate::default().is_zero());
    }
}
