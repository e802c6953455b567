//! Negative-binomial GLM for the two-group design, fitted by IRLS

use statrs::function::{erf::erfc, gamma::ln_gamma};

use crate::{dispersion::MIN_MU, groups::TwoGroupDesign};

/// Coefficients beyond this magnitude abort the fit
const MAX_ABS_BETA: f64 = 30.0;

/// Ridge penalty added to X'WX
const RIDGE: f64 = 1e-6;

type Mat2 = [[f64; 2]; 2];

fn inverse(m: &Mat2) -> Option<Mat2> {
    let det = m[0][0] * m[1][1] - m[0][1] * m[1][0];
    if !det.is_finite() || det.abs() < f64::MIN_POSITIVE {
        return None;
    }
    Some([
        [m[1][1] / det, -m[0][1] / det],
        [-m[1][0] / det, m[0][0] / det],
    ])
}

fn multiply(a: &Mat2, b: &Mat2) -> Mat2 {
    let mut out = [[0.0; 2]; 2];
    for (i, row) in out.iter_mut().enumerate() {
        for (j, cell) in row.iter_mut().enumerate() {
            *cell = a[i][0] * b[0][j] + a[i][1] * b[1][j];
        }
    }
    out
}

/// Result of fitting one gene
#[derive(Debug, Clone, PartialEq)]
pub struct GlmFit {
    /// Natural-log expression of group B per unit size factor
    pub intercept: f64,
    /// Natural-log fold change of group A over group B
    pub log_fold_change: f64,
    pub standard_error: f64,
    pub deviance: f64,
    pub iterations: usize,
    pub converged: bool,
}
impl GlmFit {
    pub fn log2_fold_change(&self) -> f64 {
        self.log_fold_change / std::f64::consts::LN_2
    }

    pub fn log2_standard_error(&self) -> f64 {
        self.standard_error / std::f64::consts::LN_2
    }

    /// Wald statistic of the group coefficient
    pub fn wald_statistic(&self) -> Option<f64> {
        (self.standard_error.is_finite() && self.standard_error > 0.0)
            .then(|| self.log_fold_change / self.standard_error)
    }

    /// Two-sided Wald p-value
    pub fn wald_pvalue(&self) -> Option<f64> {
        self.wald_statistic()
            .map(|z| erfc(z.abs() / std::f64::consts::SQRT_2))
    }
}

/// Negative-binomial log density with mean `mu` and dispersion `alpha`
fn nb_log_density(y: f64, mu: f64, alpha: f64) -> f64 {
    let size = 1.0 / alpha;
    ln_gamma(y + size) - ln_gamma(size) - ln_gamma(y + 1.0)
        + size * (size / (size + mu)).ln()
        + y * (mu / (size + mu)).ln()
}

struct WeightedSums {
    /// X'WX without the ridge
    xtwx: Mat2,
    xtwz: [f64; 2],
}

fn weighted_sums(
    counts: &[f64],
    size_factors: &[f64],
    design: &TwoGroupDesign,
    mu: &[f64],
    alpha: f64,
) -> WeightedSums {
    let mut xtwx = [[0.0; 2]; 2];
    let mut xtwz = [0.0; 2];
    for (j, ((y, s), m)) in counts.iter().zip(size_factors).zip(mu).enumerate() {
        let w = m / (1.0 + alpha * m);
        let z = (m / s).ln() + (y - m) / m;
        xtwx[0][0] += w;
        xtwz[0] += w * z;
        if design.in_a(j) {
            xtwx[0][1] += w;
            xtwx[1][0] += w;
            xtwx[1][1] += w;
            xtwz[1] += w * z;
        }
    }
    WeightedSums { xtwx, xtwz }
}

fn with_ridge(m: &Mat2) -> Mat2 {
    [[m[0][0] + RIDGE, m[0][1]], [m[1][0], m[1][1] + RIDGE]]
}

fn fitted_mu(beta: [f64; 2], size_factors: &[f64], design: &TwoGroupDesign) -> Vec<f64> {
    size_factors
        .iter()
        .enumerate()
        .map(|(j, s)| {
            let eta = beta[0] + if design.in_a(j) { beta[1] } else { 0.0 };
            (s * eta.exp()).max(MIN_MU)
        })
        .collect()
}

/// Fits `log(mu_j) = log(s_j) + b0 + b1 * [j in A]` for one gene
///
/// Starts from least squares on log normalized counts and iterates until the
/// relative change in deviance drops below `tol`.
pub fn fit_gene(
    counts: &[f64],
    size_factors: &[f64],
    design: &TwoGroupDesign,
    alpha: f64,
    max_iter: usize,
    tol: f64,
) -> GlmFit {
    let log_normalized = counts
        .iter()
        .zip(size_factors)
        .map(|(c, s)| (c / s + 0.1).ln())
        .collect::<Vec<_>>();
    let (mean_a, mean_b) = design.group_means(&log_normalized);
    let mut beta = [mean_b, mean_a - mean_b];

    let mut mu = fitted_mu(beta, size_factors, design);
    let mut deviance = 0.0;
    let mut dev_old = 0.0;
    let mut converged = false;
    let mut iterations = 0;
    for iter in 0..max_iter {
        iterations = iter + 1;
        let sums = weighted_sums(counts, size_factors, design, &mu, alpha);
        let Some(inv) = inverse(&with_ridge(&sums.xtwx)) else {
            break;
        };
        beta = [
            inv[0][0] * sums.xtwz[0] + inv[0][1] * sums.xtwz[1],
            inv[1][0] * sums.xtwz[0] + inv[1][1] * sums.xtwz[1],
        ];
        if beta.iter().any(|b| !b.is_finite() || b.abs() > MAX_ABS_BETA) {
            break;
        }
        mu = fitted_mu(beta, size_factors, design);
        deviance = -2.0
            * counts
                .iter()
                .zip(mu.iter())
                .map(|(y, m)| nb_log_density(*y, *m, alpha))
                .sum::<f64>();
        if (deviance - dev_old).abs() / (deviance.abs() + 0.1) < tol {
            converged = true;
            break;
        }
        dev_old = deviance;
    }

    // sandwich covariance (X'WX + R)^-1 X'WX (X'WX + R)^-1
    let xtwx = weighted_sums(counts, size_factors, design, &mu, alpha).xtwx;
    let standard_error = inverse(&with_ridge(&xtwx))
        .map(|inv| multiply(&multiply(&inv, &xtwx), &inv)[1][1].sqrt())
        .unwrap_or(f64::NAN);

    GlmFit {
        intercept: beta[0],
        log_fold_change: beta[1],
        standard_error,
        deviance,
        iterations,
        converged: converged && standard_error.is_finite(),
    }
}
