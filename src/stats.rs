//! Derived statistics from sufficient statistics
//!
//! The aggregation store keeps count/sum/min/max/sumsq per minute bucket,
//! which is enough to derive mean and variance without retaining raw
//! samples.

/// Mean, variance, and standard deviation derived from a rollup row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedStats {
    pub mean: f64,
    pub variance: f64,
    pub stddev: f64,
}

/// Derive stats from (count, sum, sumsq).
///
/// A zero count yields all zeros. Variance is floored at zero: with large
/// magnitudes, `sumsq/count - mean^2` can round to a tiny negative value.
pub fn derive(count: i64, sum: f64, sumsq: f64) -> DerivedStats {
    if count <= 0 {
        return DerivedStats {
            mean: 0.0,
            variance: 0.0,
            stddev: 0.0,
        };
    }

    let n = count as f64;
    let mean = sum / n;
    let variance = (sumsq / n - mean * mean).max(0.0);

    DerivedStats {
        mean,
        variance,
        stddev: variance.sqrt(),
    }
}
