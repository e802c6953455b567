use bon::Builder;

use crate::utils::cmp_f64;

/// Outcome of testing one term
///
/// `expected` and `qvalue` are only set by over-representation; the enrichment
/// scores only by ranked enrichment.
#[derive(Debug, Clone, PartialEq, Builder)]
pub struct EnrichmentResult {
    #[builder(into)]
    pub term_id: String,
    #[builder(into)]
    pub description: Option<String>,
    /// Members of the term present in the universe or ranking
    pub set_size: usize,
    /// Members in the foreground, or in the leading edge
    pub overlap: usize,
    pub expected: Option<f64>,
    pub pvalue: f64,
    /// Initialized to 1.0 and set once the whole family is tested
    #[builder(default = 1.0)]
    pub padj: f64,
    pub qvalue: Option<f64>,
    pub enrichment_score: Option<f64>,
    pub normalized_score: Option<f64>,
    /// Overlapping or leading-edge gene ids
    #[builder(default)]
    pub genes: Vec<String>,
    #[builder(default)]
    pub significant: bool,
}

fn format_optional(value: Option<f64>) -> String {
    value.map_or_else(|| "NA".to_string(), |v| v.to_string())
}

/// Term results of one catalog in reporting order
#[derive(Debug, Clone, Default)]
pub struct EnrichmentResults {
    results: Vec<EnrichmentResult>,
}
impl EnrichmentResults {
    /// Orders by p-value, then |NES| descending, then term id
    pub fn from_vec(mut results: Vec<EnrichmentResult>) -> Self {
        results.sort_by(|a, b| {
            cmp_f64(a.pvalue, b.pvalue)
                .then_with(|| {
                    let abs_nes = |r: &EnrichmentResult| r.normalized_score.map_or(0.0, f64::abs);
                    cmp_f64(abs_nes(b), abs_nes(a))
                })
                .then_with(|| a.term_id.cmp(&b.term_id))
        });
        Self { results }
    }

    pub fn get(&self, term_id: &str) -> Option<&EnrichmentResult> {
        self.results.iter().find(|r| r.term_id == term_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EnrichmentResult> {
        self.results.iter()
    }

    pub fn significant(&self) -> impl Iterator<Item = &EnrichmentResult> {
        self.results.iter().filter(|r| r.significant)
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn into_vec(self) -> Vec<EnrichmentResult> {
        self.results
    }

    pub fn pprint(&self) {
        println!("Term\tDescription\tSetSize\tOverlap\tExpected\tPValue\tPAdj\tQValue\tES\tNES\tSignificant\tGenes");
        for r in &self.results {
            println!(
                "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
                r.term_id,
                r.description.as_deref().unwrap_or("NA"),
                r.set_size,
                r.overlap,
                format_optional(r.expected),
                r.pvalue,
                r.padj,
                format_optional(r.qvalue),
                format_optional(r.enrichment_score),
                format_optional(r.normalized_score),
                r.significant,
                r.genes.join("/")
            );
        }
    }
}
impl<'a> IntoIterator for &'a EnrichmentResults {
    type Item = &'a EnrichmentResult;
    type IntoIter = std::slice::Iter<'a, EnrichmentResult>;

    fn into_iter(self) -> Self::IntoIter {
        self.results.iter()
    }
}
