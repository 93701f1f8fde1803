//! Descriptive statistics shared by baselines, profiling, and trend analysis.

/// Arithmetic mean. Empty slices yield 0.0.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation (divide by n).
/// Baselines use this to match the reference training statistics.
pub fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (sum_sq / values.len() as f64).sqrt()
}

/// Sample standard deviation (divide by n-1). 0.0 for fewer than 2 values.
pub fn sample_std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let sum_sq: f64 = values.iter().map(|v| (v - m) * (v - m)).sum();
    (sum_sq / (values.len() - 1) as f64).sqrt()
}

/// Percentile with linear interpolation between closest ranks.
/// `p` is in [0, 100]. Empty slices yield 0.0.
pub fn percentile(values: &[f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));

    let rank = p / 100.0 * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        return sorted[lo];
    }
    let frac = rank - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

pub fn median(values: &[f64]) -> f64 {
    percentile(values, 50.0)
}

/// Least-squares slope of `values` against their index order.
/// Fewer than 2 points gives 0.0.
pub fn regression_slope(values: &[f64]) -> f64 {
    let n = values.len();
    if n < 2 {
        return 0.0;
    }
    let x_mean = (n - 1) as f64 / 2.0;
    let y_mean = mean(values);

    let mut num = 0.0;
    let mut den = 0.0;
    for (i, y) in values.iter().enumerate() {
        let dx = i as f64 - x_mean;
        num += dx * (y - y_mean);
        den += dx * dx;
    }
    if den == 0.0 {
        return 0.0;
    }
    num / den
}

/// Replace NaN/Inf with a default so downstream arithmetic stays total.
pub fn safe_f64(value: f64, default: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        default
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std() {
        let vals = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(mean(&vals), 3.0);
        // Population variance of 1..5 is 2.0
        assert!((std_dev(&vals) - 2.0f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_sample_std_needs_two() {
        assert_eq!(sample_std_dev(&[5.0]), 0.0);
        assert!(sample_std_dev(&[1.0, 3.0]) > 0.0);
    }

    #[test]
    fn test_percentile_interpolates() {
        let vals = vec![10.0, 20.0, 30.0, 40.0];
        assert_eq!(percentile(&vals, 0.0), 10.0);
        assert_eq!(percentile(&vals, 100.0), 40.0);
        assert_eq!(percentile(&vals, 50.0), 25.0);
        // 95th of 0..=100 step 1
        let series: Vec<f64> = (0..=100).map(|i| i as f64).collect();
        assert_eq!(percentile(&series, 95.0), 95.0);
    }

    #[test]
    fn test_slope_direction() {
        let rising: Vec<f64> = (0..20).map(|i| i as f64 * 2.0).collect();
        assert!((regression_slope(&rising) - 2.0).abs() < 1e-9);
        let flat = vec![7.0; 20];
        assert_eq!(regression_slope(&flat), 0.0);
    }

    #[test]
    fn test_safe_f64() {
        assert_eq!(safe_f64(f64::NAN, 0.0), 0.0);
        assert_eq!(safe_f64(f64::INFINITY, 0.0), 0.0);
        assert_eq!(safe_f64(1.5, 0.0), 1.5);
    }
}
