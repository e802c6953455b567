use std::collections::HashMap;

use log::warn;

use crate::{
    error::{DiffPathError, Result},
    matrix::CountMatrix,
};

/// Sample id to study-group label
#[derive(Debug, Clone, Default)]
pub struct SampleGroupAssignment {
    groups: HashMap<String, String>,
}
impl SampleGroupAssignment {
    pub fn new<I, S, L>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (S, L)>,
        S: Into<String>,
        L: Into<String>,
    {
        let groups = pairs
            .into_iter()
            .map(|(sample, label)| (sample.into(), label.into()))
            .collect();
        Self { groups }
    }

    pub fn label(&self, sample_id: &str) -> Option<&str> {
        self.groups.get(sample_id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }
}

/// Two-group design: intercept on group B plus an indicator for group A
///
/// Samples follow the column order of the count matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct TwoGroupDesign {
    in_a: Vec<bool>,
    n_a: usize,
    n_b: usize,
}
impl TwoGroupDesign {
    /// Resolves the contrast `group_a` vs `group_b` over the matrix columns
    pub fn resolve(
        counts: &CountMatrix,
        groups: &SampleGroupAssignment,
        group_a: &str,
        group_b: &str,
    ) -> Result<Self> {
        if group_a == group_b {
            return Err(DiffPathError::DesignDegenerate {
                reason: format!("both sides of the contrast are {group_a}"),
            });
        }
        let in_a = counts
            .sample_ids()
            .iter()
            .map(|sample| match groups.label(sample) {
                Some(label) if label == group_a => Ok(true),
                Some(label) if label == group_b => Ok(false),
                Some(label) => Err(DiffPathError::DesignDegenerate {
                    reason: format!(
                        "sample {sample} belongs to {label}, outside the contrast {group_a} vs {group_b}"
                    ),
                }),
                None => Err(DiffPathError::DesignDegenerate {
                    reason: format!("sample {sample} has no group assignment"),
                }),
            })
            .collect::<Result<Vec<_>>>()?;
        Self::from_indicator(in_a, group_a, group_b)
    }

    pub fn from_indicator(in_a: Vec<bool>, group_a: &str, group_b: &str) -> Result<Self> {
        let n_a = in_a.iter().filter(|a| **a).count();
        let n_b = in_a.len() - n_a;
        for (label, n) in [(group_a, n_a), (group_b, n_b)] {
            if n == 0 {
                return Err(DiffPathError::DesignDegenerate {
                    reason: format!("group {label} has no samples"),
                });
            }
            if n < 2 {
                warn!("Group {label} has a single sample; dispersion estimates rely on the other group");
            }
        }
        Ok(Self { in_a, n_a, n_b })
    }

    pub fn in_a(&self, sample: usize) -> bool {
        self.in_a[sample]
    }

    pub fn n_samples(&self) -> usize {
        self.in_a.len()
    }

    pub fn n_a(&self) -> usize {
        self.n_a
    }

    pub fn n_b(&self) -> usize {
        self.n_b
    }

    /// Number of model coefficients
    pub fn n_coefs(&self) -> usize {
        2
    }

    /// Means of `values` within group A and group B
    pub fn group_means(&self, values: &[f64]) -> (f64, f64) {
        let (sum_a, sum_b) = values
            .iter()
            .zip(self.in_a.iter())
            .fold((0.0, 0.0), |(a, b), (v, in_a)| {
                if *in_a {
                    (a + v, b)
                } else {
                    (a, b + v)
                }
            });
        (sum_a / self.n_a as f64, sum_b / self.n_b as f64)
    }

    /// Log determinant of X'WX for the two-group design
    ///
    /// The matrix is `[[Σw, Σ_A w], [Σ_A w, Σ_A w]]`, whose determinant factors
    /// into the group-wise weight sums.
    pub fn log_det_xtwx(&self, weights: &[f64]) -> f64 {
        let (mean_a, mean_b) = self.group_means(weights);
        (mean_a * self.n_a as f64).ln() + (mean_b * self.n_b as f64).ln()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matrix() -> CountMatrix {
        CountMatrix::from_rows(
            vec!["g1".to_string()],
            vec!["s1".into(), "s2".into(), "s3".into(), "s4".into()],
            vec![vec![1, 2, 3, 4]],
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_contrast() {
        let groups = SampleGroupAssignment::new([("s1", "ko"), ("s2", "wt"), ("s3", "ko"), ("s4", "wt")]);
        let design = TwoGroupDesign::resolve(&matrix(), &groups, "ko", "wt").unwrap();
        assert!(design.in_a(0));
        assert!(!design.in_a(1));
        assert_eq!((design.n_a(), design.n_b()), (2, 2));
        assert_eq!(design.group_means(&[1.0, 2.0, 3.0, 4.0]), (2.0, 3.0));
    }

    #[test]
    fn test_empty_group_is_degenerate() {
        let groups = SampleGroupAssignment::new([("s1", "ko"), ("s2", "ko"), ("s3", "ko"), ("s4", "ko")]);
        let result = TwoGroupDesign::resolve(&matrix(), &groups, "ko", "wt");
        assert!(matches!(result, Err(DiffPathError::DesignDegenerate { .. })));
    }

    #[test]
    fn test_unassigned_and_foreign_samples() {
        let groups = SampleGroupAssignment::new([("s1", "ko"), ("s2", "wt"), ("s3", "ko")]);
        assert!(TwoGroupDesign::resolve(&matrix(), &groups, "ko", "wt").is_err());

        let groups = SampleGroupAssignment::new([("s1", "ko"), ("s2", "wt"), ("s3", "ko"), ("s4", "het")]);
        assert!(TwoGroupDesign::resolve(&matrix(), &groups, "ko", "wt").is_err());
    }

    #[test]
    fn test_identical_sides_rejected() {
        let groups = SampleGroupAssignment::new([("s1", "ko")]);
        assert!(TwoGroupDesign::resolve(&matrix(), &groups, "ko", "ko").is_err());
    }

    #[test]
    fn test_log_det_xtwx() {
        let design = TwoGroupDesign::from_indicator(vec![true, true, false], "a", "b").unwrap();
        let weights = [1.0, 2.0, 4.0];
        // det = (1 + 2) * 4
        assert!((design.log_det_xtwx(&weights) - 12f64.ln()).abs() < 1e-12);
    }
}
