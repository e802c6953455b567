use adjustp::{adjust, Procedure};
use bon::Builder;

/// Multiple-testing procedure applied across a family of p-values
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Correction {
    #[default]
    BenjaminiHochberg,
    Bonferroni,
}
impl Correction {
    fn procedure(&self) -> Procedure {
        match self {
            Correction::BenjaminiHochberg => Procedure::BenjaminiHochberg,
            Correction::Bonferroni => Procedure::Bonferroni,
        }
    }

    /// Adjusts every p-value of the family jointly
    pub fn adjust(&self, pvalues: &[f64]) -> Vec<f64> {
        if pvalues.is_empty() {
            return Vec::new();
        }
        adjust(pvalues, self.procedure())
            .into_iter()
            .map(|p| p.min(1.0))
            .collect()
    }

    /// Adjusts the defined p-values jointly.
    ///
    /// Undefined entries stay undefined and do not count towards the family size.
    pub fn adjust_defined(&self, pvalues: &[Option<f64>]) -> Vec<Option<f64>> {
        let defined = pvalues.iter().flatten().copied().collect::<Vec<_>>();
        let mut adjusted = self.adjust(&defined).into_iter();
        pvalues
            .iter()
            .map(|p| match p {
                Some(_) => adjusted.next(),
                None => None,
            })
            .collect()
    }
}

/// Per-gene score used to order genes for ranked enrichment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RankMetric {
    #[default]
    Log2FoldChange,
    WaldStatistic,
}

/// Dispersion estimation and shrinkage parameters
#[derive(Debug, Clone, Builder)]
pub struct DispersionConfig {
    /// Lower bound on any dispersion estimate
    #[builder(default = 1e-8)]
    pub min_disp: f64,
    /// Log-scale distance (in prior SDs) above the trend that marks a dispersion outlier
    #[builder(default = 2.0)]
    pub outlier_sd: f64,
    /// Number of points in the coarse log-dispersion grid
    #[builder(default = 30)]
    pub grid_points: usize,
    /// Width of the final golden-section bracket on the log scale
    #[builder(default = 1e-6)]
    pub tolerance: f64,
}
impl Default for DispersionConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

#[derive(Debug, Clone, Builder)]
pub struct TesterConfig {
    #[builder(default)]
    pub dispersion: DispersionConfig,
    /// Maximum IRLS iterations per gene
    #[builder(default = 100)]
    pub max_iter: usize,
    /// Relative deviance change that ends IRLS
    #[builder(default = 1e-8)]
    pub beta_tol: f64,
    #[builder(default)]
    pub correction: Correction,
}
impl Default for TesterConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Thresholds of the up/down/not-significant rule
#[derive(Debug, Clone, Builder)]
pub struct ClassifyConfig {
    #[builder(default = 0.05)]
    pub padj_threshold: f64,
    #[builder(default = 1.0)]
    pub log2fc_threshold: f64,
}
impl Default for ClassifyConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Over-representation analysis parameters
#[derive(Debug, Clone, Builder)]
pub struct OraConfig {
    #[builder(default = 0.05)]
    pub pvalue_cutoff: f64,
    #[builder(default = 0.2)]
    pub qvalue_cutoff: f64,
    #[builder(default)]
    pub correction: Correction,
}
impl Default for OraConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// Ranked (GSEA) enrichment parameters
#[derive(Debug, Clone, Builder)]
pub struct GseaConfig {
    #[builder(default = 1000)]
    pub n_permutations: usize,
    /// Terms with fewer members present in the ranking are not tested
    #[builder(default = 5)]
    pub min_size: usize,
    /// Terms with more members present in the ranking are not tested
    pub max_size: Option<usize>,
    /// Exponent applied to score magnitudes in the running sum
    #[builder(default = 1.0)]
    pub weight: f64,
    #[builder(default = 0.05)]
    pub padj_cutoff: f64,
    #[builder(default = 42)]
    pub seed: u64,
    #[builder(default)]
    pub correction: Correction,
}
impl Default for GseaConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}
