//! Coverage estimation.
//!
//! Below the exhaustive threshold the engine is assumed to have explored the
//! whole path space and coverage is 1.0. Above it the estimate decays
//! logarithmically over the admitted scale range, hitting ≈0.77 at one
//! hundred times the threshold. The 0.23 offset is a fixed policy constant
//! so estimates stay comparable across deployments.

/// Fixed floor offset of the decay curve.
const SCALE_OFFSET: f64 = 0.23;

/// Widest path-count ratio the curve admits.
const MAX_SCALE: f64 = 100.0;

/// Estimates the fraction of the path space the engine explored.
pub fn coverage_estimate(paths_explored: u64, exhaustive_threshold: u64) -> f64 {
    if paths_explored < exhaustive_threshold {
        return 1.0;
    }
    let scale = (paths_explored as f64 / exhaustive_threshold as f64).min(MAX_SCALE);
    1.0 - SCALE_OFFSET * scale.ln() / MAX_SCALE.ln()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_below_threshold_is_exhaustive() {
        assert_eq!(coverage_estimate(0, 1000), 1.0);
        assert_eq!(coverage_estimate(999, 1000), 1.0);
    }

    #[test]
    fn test_exactly_at_threshold_is_still_exhaustive() {
        // scale == 1, ln(1) == 0.
        assert_eq!(coverage_estimate(1000, 1000), 1.0);
    }

    #[test]
    fn test_hundredfold_threshold_approaches_077() {
        let estimate = coverage_estimate(100_000, 1000);
        assert!((0.76..=0.78).contains(&estimate), "got {estimate}");
    }

    #[test]
    fn test_scale_is_clamped_beyond_hundredfold() {
        let at_cap = coverage_estimate(100_000, 1000);
        let beyond = coverage_estimate(10_000_000, 1000);
        assert!((at_cap - beyond).abs() < 1e-12, "estimate is flat past the cap");
    }

    #[test]
    fn test_estimate_is_monotonic_between_threshold_and_cap() {
        let mid = coverage_estimate(10_000, 1000);
        let high = coverage_estimate(50_000, 1000);
        assert!(mid > high, "more paths explored → lower estimated fraction");
        assert!(mid < 1.0);
    }
}
