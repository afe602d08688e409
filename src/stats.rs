//! Duration summary statistics for profiling events.
//!
//! The inspector aggregates the raw per-iteration durations of each event
//! into a [`Summary`] for tabular display.

/// Summary of a set of duration samples, in nanoseconds.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Summary {
    pub count: usize,
    pub avg: f64,
    pub min: u64,
    pub max: u64,
    pub p10: f64,
    pub p50: f64,
    pub p90: f64,
}

/// Summarize duration samples. Returns `None` for an empty slice.
pub fn summarize(samples: &[u64]) -> Option<Summary> {
    if samples.is_empty() {
        return None;
    }
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let sum: u64 = sorted.iter().sum();
    Some(Summary {
        count: sorted.len(),
        avg: sum as f64 / sorted.len() as f64,
        min: sorted[0],
        max: *sorted.last().unwrap(),
        p10: percentile(&sorted, 0.10),
        p50: percentile(&sorted, 0.50),
        p90: percentile(&sorted, 0.90),
    })
}

// Linear interpolation between the two nearest ranks, so p50 of [1, 2] is 1.5
// rather than whichever side the rounding falls on.
fn percentile(sorted: &[u64], p: f64) -> f64 {
    if sorted.len() == 1 {
        return sorted[0] as f64;
    }
    let rank = p * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    sorted[lo] as f64 + (sorted[hi] as f64 - sorted[lo] as f64) * frac
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty() {
        assert!(summarize(&[]).is_none());
    }

    #[test]
    fn test_single_sample() {
        let s = summarize(&[42]).unwrap();
        assert_eq!(s.count, 1);
        assert_eq!(s.min, 42);
        assert_eq!(s.max, 42);
        assert_eq!(s.avg, 42.0);
        assert_eq!(s.p50, 42.0);
    }

    #[test]
    fn test_unsorted_input() {
        let s = summarize(&[30, 10, 20]).unwrap();
        assert_eq!(s.min, 10);
        assert_eq!(s.max, 30);
        assert_eq!(s.avg, 20.0);
        assert_eq!(s.p50, 20.0);
    }

    #[test]
    fn test_interpolated_percentiles() {
        let s = summarize(&[1, 2]).unwrap();
        assert_eq!(s.p50, 1.5);
        let s = summarize(&(1..=11).collect::<Vec<u64>>()).unwrap();
        assert_eq!(s.p10, 2.0);
        assert_eq!(s.p50, 6.0);
        assert_eq!(s.p90, 10.0);
    }
}
