use bon::Builder;
use log::{debug, info, warn};
use ndarray::{Array1, Axis};
use rayon::prelude::*;

use crate::{
    config::{Correction, TesterConfig},
    dispersion::{estimate_dispersions, DispersionFit},
    error::{DiffPathError, Result},
    glm::{fit_gene, GlmFit},
    groups::{SampleGroupAssignment, TwoGroupDesign},
    matrix::CountMatrix,
    normalize::{normalized_counts, size_factors},
};

/// Per-gene outcome of the two-group test
///
/// Statistics are `None` when undefined: genes with no counts and genes whose
/// fit did not converge.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct DifferentialResult {
    #[builder(into)]
    pub gene_id: String,
    /// Mean of size-factor normalized counts across all samples
    pub base_mean: f64,
    pub log2_fold_change: Option<f64>,
    pub lfc_se: Option<f64>,
    pub stat: Option<f64>,
    pub pvalue: Option<f64>,
    pub padj: Option<f64>,
    pub dispersion: Option<f64>,
    #[builder(into)]
    pub symbol: Option<String>,
    pub entrez_id: Option<u64>,
}

/// Results of a differential test along with the fitted nuisance parameters
#[derive(Debug, Clone)]
pub struct DifferentialAnalysis {
    /// One entry per gene in matrix order
    pub results: Vec<DifferentialResult>,
    pub size_factors: Array1<f64>,
    pub dispersion: DispersionFit,
}
impl DifferentialAnalysis {
    pub fn get(&self, gene_id: &str) -> Option<&DifferentialResult> {
        self.results.iter().find(|r| r.gene_id == gene_id)
    }
}

/// Negative-binomial Wald test of `group_a` against `group_b`
pub struct DifferentialTester<'a> {
    counts: &'a CountMatrix,
    groups: &'a SampleGroupAssignment,
    group_a: &'a str,
    group_b: &'a str,
    config: TesterConfig,
}
impl<'a> DifferentialTester<'a> {
    pub fn new(
        counts: &'a CountMatrix,
        groups: &'a SampleGroupAssignment,
        group_a: &'a str,
        group_b: &'a str,
        config: TesterConfig,
    ) -> Self {
        Self {
            counts,
            groups,
            group_a,
            group_b,
            config,
        }
    }

    /// Run the test
    ///
    /// 1. Resolve the design and estimate size factors
    /// 2. Estimate and shrink dispersions
    /// 3. Fit each gene and compute Wald statistics
    /// 4. Adjust p-values across genes
    pub fn run(&self) -> Result<DifferentialAnalysis> {
        let design = TwoGroupDesign::resolve(self.counts, self.groups, self.group_a, self.group_b)?;
        if design.n_samples() <= design.n_coefs() {
            return Err(DiffPathError::DesignDegenerate {
                reason: format!(
                    "{} samples leave no residual degrees of freedom for {} coefficients",
                    design.n_samples(),
                    design.n_coefs()
                ),
            });
        }
        let counts = self.counts.counts();
        let size_factors = size_factors(counts)?;

        let base_means = normalized_counts(counts, &size_factors)
            .mean_axis(Axis(1))
            .map(|m| m.to_vec())
            .unwrap_or_default();
        let n_testable = base_means.iter().filter(|m| **m > 0.0).count();
        if n_testable == 0 {
            return Err(DiffPathError::DesignDegenerate {
                reason: "no gene has a non-zero count".to_string(),
            });
        }

        let dispersion = estimate_dispersions(
            counts,
            &size_factors,
            &base_means,
            &design,
            &self.config.dispersion,
        );

        let sf = size_factors.to_vec();
        let mut results = (0..self.counts.n_genes())
            .into_par_iter()
            .map(|gene| {
                let row = counts.row(gene).iter().map(|c| *c as f64).collect::<Vec<_>>();
                self.test_gene(gene, &row, &sf, &design, base_means[gene], dispersion.dispersions[gene])
            })
            .collect::<Vec<_>>();

        let n_converged = adjust_converged(&mut results, n_testable, self.config.correction)?;

        info!(
            "Tested {} genes for {} vs {} ({} samples)",
            n_converged,
            self.group_a,
            self.group_b,
            design.n_samples()
        );

        Ok(DifferentialAnalysis {
            results,
            size_factors,
            dispersion,
        })
    }

    fn test_gene(
        &self,
        gene: usize,
        row: &[f64],
        size_factors: &[f64],
        design: &TwoGroupDesign,
        base_mean: f64,
        dispersion: Option<f64>,
    ) -> DifferentialResult {
        let gene_id = self.counts.gene_ids()[gene].as_str();
        let Some(alpha) = dispersion else {
            return DifferentialResult::builder()
                .gene_id(gene_id)
                .base_mean(base_mean)
                .build();
        };

        let fit = fit_gene(
            row,
            size_factors,
            design,
            alpha,
            self.config.max_iter,
            self.config.beta_tol,
        );
        if !fit.converged {
            debug!(
                "{gene_id}: no convergence after {} iterations (deviance {:.4})",
                fit.iterations, fit.deviance
            );
        }
        result_from_fit(gene_id, base_mean, alpha, &fit)
    }
}

/// Builds a gene's result from its fit; a non-converged fit leaves every statistic undefined
fn result_from_fit(gene_id: &str, base_mean: f64, alpha: f64, fit: &GlmFit) -> DifferentialResult {
    if !fit.converged {
        return DifferentialResult::builder()
            .gene_id(gene_id)
            .base_mean(base_mean)
            .dispersion(alpha)
            .build();
    }
    DifferentialResult::builder()
        .gene_id(gene_id)
        .base_mean(base_mean)
        .dispersion(alpha)
        .log2_fold_change(fit.log2_fold_change())
        .lfc_se(fit.log2_standard_error())
        .maybe_stat(fit.wald_statistic())
        .maybe_pvalue(fit.wald_pvalue())
        .build()
}

/// Adjusts p-values over the genes with a defined p-value
///
/// Returns the number of such genes; none at all is a degenerate design.
fn adjust_converged(
    results: &mut [DifferentialResult],
    n_testable: usize,
    correction: Correction,
) -> Result<usize> {
    let n_converged = results.iter().filter(|r| r.pvalue.is_some()).count();
    if n_converged == 0 {
        return Err(DiffPathError::DesignDegenerate {
            reason: "no gene fit converged".to_string(),
        });
    }
    if n_converged < n_testable {
        warn!(
            "{} of {} testable genes did not converge; their statistics are undefined",
            n_testable - n_converged,
            n_testable
        );
    }

    let pvalues = results.iter().map(|r| r.pvalue).collect::<Vec<_>>();
    let adjusted = correction.adjust_defined(&pvalues);
    for (result, padj) in results.iter_mut().zip(adjusted) {
        result.padj = padj;
    }
    Ok(n_converged)
}

/// Tests `group_a` against `group_b` with the default configuration
pub fn test(
    counts: &CountMatrix,
    groups: &SampleGroupAssignment,
    group_a: &str,
    group_b: &str,
) -> Result<Vec<DifferentialResult>> {
    DifferentialTester::new(counts, groups, group_a, group_b, TesterConfig::default())
        .run()
        .map(|analysis| analysis.results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn samples() -> Vec<String> {
        vec!["s1".into(), "s2".into(), "s3".into(), "s4".into()]
    }

    fn groups() -> SampleGroupAssignment {
        SampleGroupAssignment::new([("s1", "ko"), ("s2", "ko"), ("s3", "wt"), ("s4", "wt")])
    }

    fn matrix(rows: Vec<Vec<u64>>) -> CountMatrix {
        let genes = (1..=rows.len()).map(|i| format!("G{i}")).collect();
        CountMatrix::from_rows(genes, samples(), rows).unwrap()
    }

    #[test]
    fn test_strong_change_detected() {
        let counts = matrix(vec![
            vec![100, 110, 10, 12],
            vec![50, 50, 50, 50],
            vec![50, 50, 50, 50],
            vec![50, 50, 50, 50],
        ]);
        let analysis = DifferentialTester::new(&counts, &groups(), "ko", "wt", TesterConfig::default())
            .run()
            .unwrap();
        let g1 = analysis.get("G1").unwrap();
        assert!(g1.log2_fold_change.unwrap() > 1.0);
        assert!(g1.padj.unwrap() < 0.05);
        assert_relative_eq!(g1.base_mean, 58.0, epsilon = 1e-8);

        let g2 = analysis.get("G2").unwrap();
        assert!(g2.log2_fold_change.unwrap().abs() < 1e-4);
        assert!(g2.padj.unwrap() > 0.5);
    }

    #[test]
    fn test_zero_gene_has_undefined_statistics() {
        let counts = matrix(vec![
            vec![100, 110, 10, 12],
            vec![0, 0, 0, 0],
            vec![50, 60, 55, 45],
        ]);
        let results = test(&counts, &groups(), "ko", "wt").unwrap();
        assert_eq!(results[1].gene_id, "G2");
        assert_eq!(results[1].base_mean, 0.0);
        assert!(results[1].pvalue.is_none());
        assert!(results[1].padj.is_none());
        assert!(results[1].dispersion.is_none());
        assert!(results[0].padj.is_some());
    }

    #[test]
    fn test_padj_monotone_and_bounded() {
        let counts = matrix(vec![
            vec![100, 110, 10, 12],
            vec![80, 70, 40, 45],
            vec![50, 52, 49, 51],
            vec![30, 20, 25, 28],
            vec![200, 180, 190, 210],
        ]);
        let results = test(&counts, &groups(), "ko", "wt").unwrap();
        let mut pairs = results
            .iter()
            .map(|r| (r.pvalue.unwrap(), r.padj.unwrap()))
            .collect::<Vec<_>>();
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        for window in pairs.windows(2) {
            assert!(window[0].1 <= window[1].1);
        }
        for (p, q) in pairs {
            assert!(q >= p && q <= 1.0);
        }
    }

    #[test]
    fn test_all_zero_matrix_is_degenerate() {
        let counts = matrix(vec![vec![0, 0, 0, 0], vec![0, 0, 0, 0]]);
        assert!(matches!(
            test(&counts, &groups(), "ko", "wt"),
            Err(DiffPathError::DesignDegenerate { .. })
        ));
    }

    #[test]
    fn test_unknown_group_is_degenerate() {
        let counts = matrix(vec![vec![10, 20, 30, 40]]);
        assert!(matches!(
            test(&counts, &groups(), "ko", "het"),
            Err(DiffPathError::DesignDegenerate { .. })
        ));
    }

    #[test]
    fn test_unreplicated_design_rejected() {
        let counts = CountMatrix::from_rows(
            vec!["G1".into(), "G2".into(), "G3".into()],
            vec!["s1".into(), "s2".into()],
            vec![vec![100, 130], vec![50, 45], vec![80, 70]],
        )
        .unwrap();
        let groups = SampleGroupAssignment::new([("s1", "ko"), ("s2", "wt")]);
        assert!(matches!(
            test(&counts, &groups, "ko", "wt"),
            Err(DiffPathError::DesignDegenerate { .. })
        ));
    }

    #[test]
    fn test_no_converged_fit_is_degenerate() {
        let counts = matrix(vec![
            vec![100, 110, 10, 12],
            vec![50, 60, 55, 45],
            vec![30, 20, 25, 28],
        ]);
        let config = TesterConfig::builder().max_iter(1).build();
        let result = DifferentialTester::new(&counts, &groups(), "ko", "wt", config).run();
        assert!(matches!(result, Err(DiffPathError::DesignDegenerate { .. })));
    }

    #[test]
    fn test_non_converged_fit_keeps_nuisance_parameters() {
        let fit = GlmFit {
            intercept: 1.0,
            log_fold_change: 2.0,
            standard_error: 0.5,
            deviance: 12.0,
            iterations: 100,
            converged: false,
        };
        let result = result_from_fit("G1", 42.0, 0.1, &fit);
        assert_eq!(result.base_mean, 42.0);
        assert_eq!(result.dispersion, Some(0.1));
        assert!(result.log2_fold_change.is_none());
        assert!(result.lfc_se.is_none());
        assert!(result.stat.is_none());
        assert!(result.pvalue.is_none());

        let converged = result_from_fit("G2", 42.0, 0.1, &GlmFit { converged: true, ..fit });
        assert!(converged.pvalue.is_some());
    }

    #[test]
    fn test_non_converged_genes_outside_bh_family() {
        let gene = |id: &str, pvalue: Option<f64>| {
            DifferentialResult::builder()
                .gene_id(id)
                .base_mean(10.0)
                .dispersion(0.1)
                .maybe_pvalue(pvalue)
                .build()
        };
        let mut results = vec![gene("G1", Some(0.01)), gene("G2", None), gene("G3", Some(0.02))];
        let n_converged = adjust_converged(&mut results, 3, Correction::BenjaminiHochberg).unwrap();
        assert_eq!(n_converged, 2);
        assert!(results[1].padj.is_none());
        // family of two: both adjust to 0.02
        assert_relative_eq!(results[0].padj.unwrap(), 0.02, epsilon = 1e-12);
        assert_relative_eq!(results[2].padj.unwrap(), 0.02, epsilon = 1e-12);

        let mut none = vec![gene("G1", None), gene("G2", None)];
        assert!(matches!(
            adjust_converged(&mut none, 2, Correction::BenjaminiHochberg),
            Err(DiffPathError::DesignDegenerate { .. })
        ));
    }
}
