use std::cmp::Ordering;

/// Consistency constant that makes the MAD an estimator of the normal SD
const MAD_SCALE: f64 = 1.4826;

/// Golden ratio conjugate used to place golden-section probes
const INV_PHI: f64 = 0.618_033_988_749_894_9;

pub fn arithmetic_mean(x: &[f64]) -> f64 {
    x.iter().sum::<f64>() / x.len() as f64
}

/// Geometric mean computed in log space
///
/// Returns zero if any value is zero.
pub fn geometric_mean(x: &[f64]) -> f64 {
    if x.iter().any(|v| *v <= 0.0) {
        return 0.0;
    }
    let log_sum = x.iter().map(|v| v.ln()).sum::<f64>();
    (log_sum / x.len() as f64).exp()
}

/// Median of a slice, sorting it in place
pub fn median(x: &mut [f64]) -> f64 {
    if x.is_empty() {
        return f64::NAN;
    }
    x.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    let n = x.len();
    if n % 2 == 0 {
        (x[n / 2 - 1] + x[n / 2]) / 2.0
    } else {
        x[n / 2]
    }
}

/// Squared, normal-consistent median absolute deviation
pub fn mad_squared(x: &mut [f64]) -> f64 {
    if x.is_empty() {
        return 0.0;
    }
    let center = median(x);
    let mut deviations = x.iter().map(|v| (v - center).abs()).collect::<Vec<_>>();
    let mad = median(&mut deviations) * MAD_SCALE;
    mad * mad
}

/// Trigamma function (second derivative of ln Γ)
pub fn trigamma(x: f64) -> f64 {
    if x < 0.5 {
        let pi = std::f64::consts::PI;
        return (pi / (pi * x).sin()).powi(2) - trigamma(1.0 - x);
    }
    let mut result = 0.0;
    let mut z = x;
    while z < 8.0 {
        result += 1.0 / (z * z);
        z += 1.0;
    }
    let z2 = z * z;
    result + 1.0 / z + 0.5 / z2 + 1.0 / (6.0 * z2 * z) - 1.0 / (30.0 * z2 * z2 * z)
        + 1.0 / (42.0 * z2 * z2 * z2 * z)
}

/// Storey q-values from raw p-values at a fixed tuning parameter `lambda`
///
/// q-values are the BH-adjusted p-values scaled by the estimated proportion
/// of true nulls. A zero estimate falls back to one.
pub fn storey_qvalues(pvalues: &[f64], bh_adjusted: &[f64], lambda: f64) -> Vec<f64> {
    if pvalues.is_empty() {
        return Vec::new();
    }
    let m = pvalues.len() as f64;
    let above = pvalues.iter().filter(|p| **p > lambda).count() as f64;
    let pi0 = match (above / (m * (1.0 - lambda))).min(1.0) {
        x if x > 0.0 => x,
        _ => 1.0,
    };
    bh_adjusted.iter().map(|q| (pi0 * q).min(1.0)).collect()
}

/// Maximizes a function of one variable on `[lo, hi]`
///
/// A coarse grid locates the best cell, then golden-section search refines
/// within the neighbouring cells until the bracket is narrower than `tol`.
pub fn maximize_on_interval<F>(f: F, lo: f64, hi: f64, grid_points: usize, tol: f64) -> f64
where
    F: Fn(f64) -> f64,
{
    let grid_points = grid_points.max(3);
    let delta = (hi - lo) / (grid_points - 1) as f64;
    let best = (0..grid_points)
        .map(|i| lo + i as f64 * delta)
        .map(|x| (x, f(x)))
        .filter(|(_, y)| !y.is_nan())
        .max_by(|a, b| a.1.partial_cmp(&b.1).unwrap_or(Ordering::Equal));
    let Some((center, _)) = best else {
        return lo;
    };

    let mut a = (center - delta).max(lo);
    let mut b = (center + delta).min(hi);
    let mut c = b - INV_PHI * (b - a);
    let mut d = a + INV_PHI * (b - a);
    let mut fc = f(c);
    let mut fd = f(d);
    while (b - a).abs() > tol {
        if fc >= fd {
            b = d;
            d = c;
            fd = fc;
            c = b - INV_PHI * (b - a);
            fc = f(c);
        } else {
            a = c;
            c = d;
            fc = fd;
            d = a + INV_PHI * (b - a);
            fd = f(d);
        }
    }
    (a + b) / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_arithmetic_mean() {
        let x = vec![1., 2., 3.];
        assert_relative_eq!(arithmetic_mean(&x), 2.0);
    }

    #[test]
    fn test_geometric_mean() {
        let x = vec![1., 2., 3.];
        assert_relative_eq!(geometric_mean(&x), 1.8171205928321397, epsilon = 1e-12);
        assert_eq!(geometric_mean(&[4.0, 0.0]), 0.0);
    }

    #[test]
    fn test_median_even_and_odd() {
        assert_relative_eq!(median(&mut [3.0, 1.0, 2.0]), 2.0);
        assert_relative_eq!(median(&mut [4.0, 1.0, 3.0, 2.0]), 2.5);
        assert!(median(&mut []).is_nan());
    }

    #[test]
    fn test_mad_squared() {
        // median 3, absolute deviations [2, 1, 0, 1, 2] -> median 1
        let mut x = vec![1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(mad_squared(&mut x), MAD_SCALE * MAD_SCALE, epsilon = 1e-12);
    }

    #[test]
    fn test_trigamma_known_values() {
        let pi = std::f64::consts::PI;
        assert_relative_eq!(trigamma(1.0), pi * pi / 6.0, epsilon = 1e-9);
        assert_relative_eq!(trigamma(0.5), pi * pi / 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_storey_qvalues_bounded_by_bh() {
        let pvalues = vec![0.001, 0.2, 0.7, 0.9];
        let bh = vec![0.004, 0.4, 0.9, 0.9];
        let q = storey_qvalues(&pvalues, &bh, 0.5);
        // two of four above 0.5 -> pi0 = 2 / (4 * 0.5) = 1.0
        assert_eq!(q, bh);

        let pvalues = vec![0.001, 0.002, 0.003, 0.9];
        let bh = vec![0.004, 0.004, 0.004, 0.9];
        let q = storey_qvalues(&pvalues, &bh, 0.5);
        assert_relative_eq!(q[0], 0.002, epsilon = 1e-12);
    }

    #[test]
    fn test_maximize_on_interval() {
        let argmax = maximize_on_interval(|x| -(x - 1.3).powi(2), -5.0, 5.0, 20, 1e-8);
        assert_relative_eq!(argmax, 1.3, epsilon = 1e-6);

        // monotone increasing: the boundary wins
        let argmax = maximize_on_interval(|x| x, 0.0, 2.0, 10, 1e-8);
        assert_relative_eq!(argmax, 2.0, epsilon = 1e-6);
    }
}
