//! Median-of-ratios size factors and normalized counts

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::{
    error::{DiffPathError, Result},
    math::{geometric_mean, median},
};

/// Estimates one size factor per sample
///
/// Each sample's factor is the median ratio of its counts to a pseudo-reference
/// sample, the per-gene geometric mean. Genes with a zero in any sample do not
/// enter the reference.
pub fn size_factors(counts: ArrayView2<u64>) -> Result<Array1<f64>> {
    let (n_genes, n_samples) = counts.dim();
    if n_genes == 0 || n_samples == 0 {
        return Err(DiffPathError::DesignDegenerate {
            reason: "count matrix is empty".to_string(),
        });
    }

    let reference = counts
        .axis_iter(Axis(0))
        .enumerate()
        .filter_map(|(gene, row)| {
            let values = row.iter().map(|c| *c as f64).collect::<Vec<_>>();
            let geo_mean = geometric_mean(&values);
            (geo_mean > 0.0).then_some((gene, geo_mean))
        })
        .collect::<Vec<_>>();

    if reference.is_empty() {
        return Err(DiffPathError::DesignDegenerate {
            reason: "every gene has a zero count in some sample; size factors are undefined".to_string(),
        });
    }

    let factors = (0..n_samples)
        .map(|sample| {
            let mut ratios = reference
                .iter()
                .map(|(gene, geo_mean)| counts[[*gene, sample]] as f64 / geo_mean)
                .collect::<Vec<_>>();
            median(&mut ratios)
        })
        .collect::<Array1<f64>>();

    if factors.iter().any(|f| !f.is_finite() || *f <= 0.0) {
        return Err(DiffPathError::DesignDegenerate {
            reason: "non-positive size factor estimated".to_string(),
        });
    }
    Ok(factors)
}

/// Divides each sample's counts by its size factor
pub fn normalized_counts(counts: ArrayView2<u64>, size_factors: &Array1<f64>) -> Array2<f64> {
    let mut normalized = counts.mapv(|c| c as f64);
    for (mut column, factor) in normalized.axis_iter_mut(Axis(1)).zip(size_factors.iter()) {
        column /= *factor;
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn test_size_factors_scale_with_depth() {
        // second sample sequenced twice as deep
        let counts = array![[10u64, 20], [30, 60], [50, 100]];
        let factors = size_factors(counts.view()).unwrap();
        assert_relative_eq!(factors[1] / factors[0], 2.0, epsilon = 1e-12);
        assert_relative_eq!(factors[0] * factors[1], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_size_factors_robust_to_composition() {
        // one gene dominates sample two; the median ignores it
        let counts = array![[100u64, 100], [100, 100], [100, 100], [100, 5000]];
        let factors = size_factors(counts.view()).unwrap();
        assert_relative_eq!(factors[0], factors[1], epsilon = 1e-12);
    }

    #[test]
    fn test_zero_genes_excluded_from_reference() {
        let counts = array![[0u64, 10], [10, 10], [20, 20]];
        let factors = size_factors(counts.view()).unwrap();
        assert_relative_eq!(factors[0], 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_all_genes_with_zero_is_degenerate() {
        let counts = array![[0u64, 10], [10, 0]];
        assert!(matches!(
            size_factors(counts.view()),
            Err(DiffPathError::DesignDegenerate { .. })
        ));
    }

    #[test]
    fn test_normalized_counts() {
        let counts = array![[10u64, 40]];
        let normalized = normalized_counts(counts.view(), &array![0.5, 2.0]);
        assert_eq!(normalized, array![[20.0, 20.0]]);
    }
}
