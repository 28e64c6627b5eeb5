//! Byte progress of downloads.

use crate::utils::fmt::bytes;

/// Loaded bytes of one resource, with its total if the server sent one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ByteProgress {
    pub loaded: u64,
    pub total: Option<u64>,
}

impl ByteProgress {
    pub const fn new(loaded: u64, total: Option<u64>) -> Self {
        Self { loaded, total }
    }

    /// A resource served without download (cache hit, local font).
    pub const fn complete(len: u64) -> Self {
        Self {
            loaded: len,
            total: Some(len),
        }
    }

    /// Sum of several resources. The total is unknown if any total is.
    pub fn aggregate<'a>(parts: impl IntoIterator<Item = &'a ByteProgress>) -> Self {
        parts
            .into_iter()
            .fold(Self::complete(0), |acc, part| Self {
                loaded: acc.loaded + part.loaded,
                total: acc.total.zip(part.total).map(|(a, b)| a + b),
            })
    }

    /// Completion in `0.0..=100.0`; `0.0` whenever the total is unknown or zero.
    pub fn percent(&self) -> f64 {
        match self.total {
            Some(total) if total > 0 => {
                (self.loaded.min(total) as f64 / total as f64) * 100.0
            }
            _ => 0.0,
        }
    }
}

impl std::fmt::Display for ByteProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.total {
            Some(total) => write!(f, "{}/{}", bytes(self.loaded), bytes(total)),
            None => write!(f, "{}", bytes(self.loaded)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_aggregate_sums_known_totals() {
        let parts = [ByteProgress::new(50, Some(100)), ByteProgress::new(25, Some(100))];
        let sum = ByteProgress::aggregate(&parts);
        assert_eq!(sum, ByteProgress::new(75, Some(200)));
        assert_eq!(sum.percent(), 37.5);
    }

    #[test]
    fn test_unknown_total_gives_zero_percent() {
        let parts = [ByteProgress::new(50, Some(100)), ByteProgress::new(10, None)];
        let sum = ByteProgress::aggregate(&parts);
        assert_eq!(sum.total, None);
        assert_eq!(sum.loaded, 60);
        assert_eq!(sum.percent(), 0.0);
    }

    #[test]
    fn test_empty_aggregate_is_not_nan() {
        let none: [ByteProgress; 0] = [];
        let sum = ByteProgress::aggregate(&none);
        assert_eq!(sum.percent(), 0.0);
        assert!(!sum.percent().is_nan());
    }

    #[test]
    fn test_complete() {
        assert_eq!(ByteProgress::complete(10).percent(), 100.0);
    }
}
