use serde::{Deserialize, Serialize};

/// G/C tally of one sequence: the raw count and the percentage of its length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct GcContents {
    count: usize,
    percent: f64,
}

impl GcContents {
    pub fn new_from_sequence(sequence: &[u8]) -> Self {
        let count = Self::count_gc(sequence);
        Self {
            count,
            percent: Self::calculate_percent(count, sequence.len()),
        }
    }

    #[inline(always)]
    pub fn count(&self) -> usize {
        self.count
    }

    #[inline(always)]
    pub fn percent(&self) -> f64 {
        self.percent
    }

    #[inline(always)]
    fn count_gc(sequence: &[u8]) -> usize {
        sequence
            .iter()
            .map(|c| c.to_ascii_uppercase())
            .filter(|&c| c == b'G' || c == b'C')
            .count()
    }

    // Fraction first, then scaled, so values agree with 100 * gc_fraction(seq).
    #[inline(always)]
    fn calculate_percent(count: usize, len: usize) -> f64 {
        if len == 0 {
            return 0.0;
        }
        100.0 * (count as f64 / len as f64)
    }
}
