//! Negative-binomial dispersion estimation with shrinkage toward a mean trend
//!
//! Estimation runs in three passes:
//! 1. a gene-wise Cox-Reid adjusted maximum likelihood estimate,
//! 2. a fitted trend of dispersion against mean expression,
//! 3. a maximum a posteriori estimate under a log-normal prior centred on the trend.
//!
//! The prior width is learned from the spread of gene-wise estimates around the
//! trend, so genes with few replicates borrow strength from the whole dataset.

use log::{debug, info, warn};
use ndarray::{Array1, ArrayView2};
use rayon::prelude::*;
use statrs::function::gamma::ln_gamma;

use crate::{
    config::DispersionConfig,
    groups::TwoGroupDesign,
    math::{arithmetic_mean, mad_squared, maximize_on_interval, trigamma},
};

/// Floor on fitted means, which keeps weights and logs finite for zero counts
pub(crate) const MIN_MU: f64 = 0.5;

/// Gene-wise estimates this close to the lower bound do not inform the trend or prior
const BOUNDARY_FACTOR: f64 = 100.0;

/// Smallest allowed prior variance of log dispersions
const MIN_PRIOR_VAR: f64 = 0.25;

const PARAMETRIC_MAX_ITER: usize = 10;
const GAMMA_GLM_MAX_ITER: usize = 25;

/// Dispersion as a function of mean normalized expression
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DispersionTrend {
    /// `asymptotic + extra_poisson / mean`
    Parametric { asymptotic: f64, extra_poisson: f64 },
    /// Same dispersion at every mean
    Mean(f64),
}
impl DispersionTrend {
    pub fn predict(&self, base_mean: f64) -> f64 {
        match self {
            DispersionTrend::Parametric {
                asymptotic,
                extra_poisson,
            } => {
                if base_mean > 0.0 {
                    asymptotic + extra_poisson / base_mean
                } else {
                    *asymptotic
                }
            }
            DispersionTrend::Mean(value) => *value,
        }
    }

    /// Fits the trend to gene-wise estimates
    ///
    /// The parametric form is preferred; it falls back to a trimmed mean when
    /// there are too few usable estimates or the fit does not converge to
    /// positive coefficients.
    pub fn fit(base_means: &[f64], gene_wise: &[Option<f64>], min_disp: f64) -> Self {
        let usable = base_means
            .iter()
            .zip(gene_wise.iter())
            .filter_map(|(mean, disp)| match disp {
                Some(d) if *mean > 0.0 && *d >= BOUNDARY_FACTOR * min_disp => Some((*mean, *d)),
                _ => None,
            })
            .collect::<Vec<_>>();

        if let Some((asymptotic, extra_poisson)) = fit_parametric(&usable) {
            debug!("Parametric dispersion trend: {asymptotic:.6} + {extra_poisson:.6} / mean");
            return DispersionTrend::Parametric {
                asymptotic,
                extra_poisson,
            };
        }

        let mean = if usable.is_empty() {
            let finite = gene_wise.iter().flatten().copied().collect::<Vec<_>>();
            warn!(
                "No gene-wise dispersion above {:e}; using the mean of {} boundary estimates",
                BOUNDARY_FACTOR * min_disp,
                finite.len()
            );
            if finite.is_empty() {
                min_disp
            } else {
                arithmetic_mean(&finite)
            }
        } else {
            warn!(
                "Parametric dispersion trend failed on {} genes; using a trimmed mean",
                usable.len()
            );
            trimmed_mean(usable.iter().map(|(_, d)| *d).collect())
        };
        DispersionTrend::Mean(mean.max(min_disp))
    }
}

/// Mean after discarding the outer 0.1% on each side
fn trimmed_mean(mut values: Vec<f64>) -> f64 {
    values.sort_unstable_by(|a, b| a.total_cmp(b));
    let trim = (values.len() as f64 * 0.001).floor() as usize;
    arithmetic_mean(&values[trim..values.len() - trim])
}

/// Iterated gamma-family fit of `disp ~ a0 + a1 / mean`
///
/// Points whose ratio to the current fit leaves `(1e-4, 15)` are excluded
/// before each refit.
fn fit_parametric(points: &[(f64, f64)]) -> Option<(f64, f64)> {
    let mut coefs = (0.1, 1.0);
    for _ in 0..PARAMETRIC_MAX_ITER {
        let kept = points
            .iter()
            .filter(|(mean, disp)| {
                let fitted = coefs.0 + coefs.1 / mean;
                let ratio = disp / fitted;
                fitted > 0.0 && ratio > 1e-4 && ratio < 15.0
            })
            .copied()
            .collect::<Vec<_>>();
        if kept.len() < 3 {
            return None;
        }
        let (next, converged) = gamma_identity_glm(&kept, coefs)?;
        if next.0 <= 0.0 || next.1 <= 0.0 {
            return None;
        }
        let change = (next.0 / coefs.0).ln().powi(2) + (next.1 / coefs.1).ln().powi(2);
        coefs = next;
        if change < 1e-6 && converged {
            return Some(coefs);
        }
    }
    None
}

fn gamma_deviance(points: &[(f64, f64)], coefs: (f64, f64)) -> f64 {
    points
        .iter()
        .map(|(mean, disp)| {
            let mu = (coefs.0 + coefs.1 / mean).max(1e-8);
            2.0 * (-(disp / mu).ln() + (disp - mu) / mu)
        })
        .sum()
}

/// IRLS for a gamma GLM with identity link on the single regressor `1 / mean`
fn gamma_identity_glm(points: &[(f64, f64)], start: (f64, f64)) -> Option<((f64, f64), bool)> {
    let mut coefs = start;
    let mut dev_old = gamma_deviance(points, coefs);
    for _ in 0..GAMMA_GLM_MAX_ITER {
        let (mut sw, mut swx, mut swxx, mut swy, mut swxy) = (0.0, 0.0, 0.0, 0.0, 0.0);
        for (mean, disp) in points {
            let x = 1.0 / mean;
            let mu = (coefs.0 + coefs.1 * x).max(1e-8);
            let w = 1.0 / (mu * mu);
            sw += w;
            swx += w * x;
            swxx += w * x * x;
            swy += w * disp;
            swxy += w * x * disp;
        }
        let det = sw * swxx - swx * swx;
        if det.abs() < 1e-12 || !det.is_finite() {
            return None;
        }
        coefs = (
            (swxx * swy - swx * swxy) / det,
            (sw * swxy - swx * swy) / det,
        );
        let dev = gamma_deviance(points, coefs);
        if (dev_old - dev).abs() / (dev.abs() + 0.1) < 1e-8 {
            return Some((coefs, true));
        }
        dev_old = dev;
    }
    Some((coefs, false))
}

/// Per-gene expected counts from group means of normalized counts
pub(crate) fn linear_mu(counts: &[f64], size_factors: &[f64], design: &TwoGroupDesign) -> Vec<f64> {
    let normalized = counts
        .iter()
        .zip(size_factors.iter())
        .map(|(c, s)| c / s)
        .collect::<Vec<_>>();
    let (mean_a, mean_b) = design.group_means(&normalized);
    size_factors
        .iter()
        .enumerate()
        .map(|(j, s)| {
            let mean = if design.in_a(j) { mean_a } else { mean_b };
            (s * mean).max(MIN_MU)
        })
        .collect()
}

/// Negative-binomial log-likelihood in `log_alpha` with the Cox-Reid adjustment
///
/// Terms constant in the dispersion are dropped.
pub(crate) fn cox_reid_log_likelihood(
    counts: &[f64],
    mu: &[f64],
    design: &TwoGroupDesign,
    log_alpha: f64,
) -> f64 {
    let alpha = log_alpha.exp();
    let inv = 1.0 / alpha;
    let ll = counts
        .iter()
        .zip(mu.iter())
        .map(|(y, m)| {
            ln_gamma(y + inv) - ln_gamma(inv) - y * (m + inv).ln() - inv * (1.0 + m * alpha).ln()
        })
        .sum::<f64>();
    let weights = mu.iter().map(|m| 1.0 / (1.0 / m + alpha)).collect::<Vec<_>>();
    ll - 0.5 * design.log_det_xtwx(&weights)
}

/// Upper bound on dispersion estimates
pub fn max_dispersion(n_samples: usize) -> f64 {
    (n_samples as f64).max(10.0)
}

/// Prior variance of log dispersions around the trend
///
/// Returns `(prior_variance, observed_variance)`, where the observed variance is
/// the squared MAD of log residuals and also sets the outlier threshold.
pub fn prior_variance(
    gene_wise: &[Option<f64>],
    trended: &[Option<f64>],
    design: &TwoGroupDesign,
    min_disp: f64,
) -> (f64, f64) {
    let mut residuals = gene_wise
        .iter()
        .zip(trended.iter())
        .filter_map(|(g, t)| match (g, t) {
            (Some(g), Some(t)) if *g >= BOUNDARY_FACTOR * min_disp => Some(g.ln() - t.ln()),
            _ => None,
        })
        .collect::<Vec<_>>();
    if residuals.len() < 3 {
        return (MIN_PRIOR_VAR, MIN_PRIOR_VAR);
    }
    let observed = mad_squared(&mut residuals);
    let df = design.n_samples().saturating_sub(design.n_coefs());
    if df == 0 {
        return (MIN_PRIOR_VAR, observed);
    }
    let expected_sampling = trigamma(df as f64 / 2.0);
    ((observed - expected_sampling).max(MIN_PRIOR_VAR), observed)
}

/// Dispersion estimates for every gene of a matrix
///
/// Entries are `None` for genes with no counts in any sample.
#[derive(Debug, Clone)]
pub struct DispersionFit {
    pub gene_wise: Vec<Option<f64>>,
    pub trended: Vec<Option<f64>>,
    /// Shrunken dispersions used for testing
    pub dispersions: Vec<Option<f64>>,
    /// Genes that kept their gene-wise estimate because it sits far above the trend
    pub outliers: Vec<bool>,
    pub trend: DispersionTrend,
    pub prior_variance: f64,
}

/// Runs gene-wise estimation, trend fitting and MAP shrinkage
pub fn estimate_dispersions(
    counts: ArrayView2<u64>,
    size_factors: &Array1<f64>,
    base_means: &[f64],
    design: &TwoGroupDesign,
    config: &DispersionConfig,
) -> DispersionFit {
    let n_genes = counts.nrows();
    let sf = size_factors.to_vec();
    let max_disp = max_dispersion(design.n_samples());
    let lo = config.min_disp.ln();
    let hi = max_disp.ln();

    let rows = (0..n_genes)
        .map(|gene| counts.row(gene).iter().map(|c| *c as f64).collect::<Vec<_>>())
        .collect::<Vec<_>>();

    let gene_fits = rows
        .par_iter()
        .map(|row| {
            if row.iter().all(|c| *c == 0.0) {
                return None;
            }
            let mu = linear_mu(row, &sf, design);
            let log_alpha = maximize_on_interval(
                |a| cox_reid_log_likelihood(row, &mu, design, a),
                lo,
                hi,
                config.grid_points,
                config.tolerance,
            );
            Some((log_alpha.exp().clamp(config.min_disp, max_disp), mu))
        })
        .collect::<Vec<_>>();
    let gene_wise = gene_fits
        .iter()
        .map(|fit| fit.as_ref().map(|(d, _)| *d))
        .collect::<Vec<_>>();

    let trend = DispersionTrend::fit(base_means, &gene_wise, config.min_disp);
    let trended = gene_wise
        .iter()
        .zip(base_means.iter())
        .map(|(g, mean)| g.map(|_| trend.predict(*mean).max(config.min_disp)))
        .collect::<Vec<_>>();

    let (prior_var, observed_var) = prior_variance(&gene_wise, &trended, design, config.min_disp);
    let outlier_threshold = config.outlier_sd * observed_var.sqrt();
    debug!("Dispersion prior variance {prior_var:.4}, outlier threshold {outlier_threshold:.4}");

    let shrunk = gene_fits
        .par_iter()
        .zip(rows.par_iter())
        .zip(trended.par_iter())
        .map(|((fit, row), trend_disp)| {
            let ((gene_disp, mu), trend_disp) = match (fit, trend_disp) {
                (Some(fit), Some(t)) => (fit, *t),
                _ => return (None, false),
            };
            if gene_disp.ln() - trend_disp.ln() > outlier_threshold {
                return (Some(*gene_disp), true);
            }
            let prior_mean = trend_disp.ln();
            let log_alpha = maximize_on_interval(
                |a| {
                    cox_reid_log_likelihood(row, mu, design, a)
                        - 0.5 * (a - prior_mean).powi(2) / prior_var
                },
                lo,
                hi,
                config.grid_points,
                config.tolerance,
            );
            (Some(log_alpha.exp().clamp(config.min_disp, max_disp)), false)
        })
        .collect::<Vec<_>>();
    let (dispersions, outliers): (Vec<_>, Vec<_>) = shrunk.into_iter().unzip();

    info!(
        "Estimated dispersions for {} of {} genes ({} outliers kept gene-wise)",
        dispersions.iter().flatten().count(),
        n_genes,
        outliers.iter().filter(|o| **o).count()
    );

    DispersionFit {
        gene_wise,
        trended,
        dispersions,
        outliers,
        trend,
        prior_variance: prior_var,
    }
}
