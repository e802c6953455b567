//! Ranked gene-set enrichment
//!
//! Each term is scored with a weighted running sum over a descending ranking of
//! genes. Significance comes from a null of random position sets of the same
//! size. Every term draws from its own ChaCha8 stream derived from the
//! configured seed and the term's catalog index, so results do not depend on
//! the number of threads.

use std::collections::HashMap;

use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

use crate::{
    config::{GseaConfig, RankMetric},
    differential::DifferentialResult,
    error::{DiffPathError, Result},
    geneset::{GeneSet, GeneSetCatalog},
    null::{running_sum, NullDistribution},
    results::{EnrichmentResult, EnrichmentResults},
    utils::{cmp_f64, first_duplicate},
};

/// Genes ordered by descending score
#[derive(Debug, Clone)]
pub struct RankedList {
    genes: Vec<String>,
    scores: Vec<f64>,
    positions: HashMap<String, usize>,
}
impl RankedList {
    pub fn new(genes: Vec<String>, scores: Vec<f64>) -> Result<Self> {
        if genes.len() != scores.len() {
            return Err(DiffPathError::InvalidInput {
                reason: format!("{} genes but {} scores", genes.len(), scores.len()),
            });
        }
        if let Some(gene) = first_duplicate(&genes) {
            return Err(DiffPathError::DuplicateGene {
                gene_id: gene.to_string(),
            });
        }
        if let Some(pos) = scores.iter().position(|s| !s.is_finite()) {
            return Err(DiffPathError::InvalidInput {
                reason: format!("score of {} is not finite", genes[pos]),
            });
        }
        if let Some(pos) = scores.windows(2).position(|w| w[0] < w[1]) {
            return Err(DiffPathError::InvalidInput {
                reason: format!(
                    "ranking is not descending at {} ({} < {})",
                    genes[pos + 1],
                    scores[pos],
                    scores[pos + 1]
                ),
            });
        }
        let positions = genes
            .iter()
            .enumerate()
            .map(|(pos, gene)| (gene.clone(), pos))
            .collect();
        Ok(Self {
            genes,
            scores,
            positions,
        })
    }

    /// Ranks genes with a defined `metric`, keeping input order among ties
    pub fn from_results(results: &[DifferentialResult], metric: RankMetric) -> Result<Self> {
        let mut ranked = results
            .iter()
            .filter_map(|r| {
                let score = match metric {
                    RankMetric::Log2FoldChange => r.log2_fold_change,
                    RankMetric::WaldStatistic => r.stat,
                };
                score.map(|s| (r.gene_id.clone(), s))
            })
            .collect::<Vec<_>>();
        ranked.sort_by(|a, b| cmp_f64(b.1, a.1));
        let (genes, scores) = ranked.into_iter().unzip();
        Self::new(genes, scores)
    }

    pub fn genes(&self) -> &[String] {
        &self.genes
    }

    pub fn scores(&self) -> &[f64] {
        &self.scores
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }

    /// Sorted ranking positions of the set's members
    fn hits(&self, set: &GeneSet) -> Vec<usize> {
        let mut hits = set
            .members
            .iter()
            .filter_map(|gene| self.positions.get(gene).copied())
            .collect::<Vec<_>>();
        hits.sort_unstable();
        hits
    }
}

/// Permutation-based ranked enrichment engine
#[derive(Debug, Clone, Default)]
pub struct RankedEnrichmentEngine {
    config: GseaConfig,
}
impl RankedEnrichmentEngine {
    pub fn new(config: GseaConfig) -> Self {
        Self { config }
    }

    /// Scores every term of `catalog` whose ranked size lies within bounds
    pub fn rank_enrich(&self, ranking: &RankedList, catalog: &GeneSetCatalog) -> Result<EnrichmentResults> {
        if self.config.n_permutations == 0 {
            return Err(DiffPathError::InvalidInput {
                reason: "at least one permutation is required".to_string(),
            });
        }
        if !self.config.weight.is_finite() || self.config.weight < 0.0 {
            return Err(DiffPathError::InvalidInput {
                reason: format!("weight {} must be a non-negative number", self.config.weight),
            });
        }

        let tested = catalog
            .sets
            .iter()
            .enumerate()
            .filter_map(|(index, set)| {
                let hits = ranking.hits(set);
                self.in_bounds(hits.len()).then_some((index, set, hits))
            })
            .collect::<Vec<_>>();
        debug!(
            "{} of {} terms within size bounds",
            tested.len(),
            catalog.len()
        );

        let mut results = tested
            .par_iter()
            .map(|(index, set, hits)| self.test_set(*index, set, hits, ranking))
            .collect::<Vec<_>>();

        let pvalues = results.iter().map(|r| r.pvalue).collect::<Vec<_>>();
        let adjusted = self.config.correction.adjust(&pvalues);
        for (result, padj) in results.iter_mut().zip(adjusted) {
            result.padj = padj;
            result.significant = padj < self.config.padj_cutoff;
        }

        let results = EnrichmentResults::from_vec(results);
        info!(
            "Ranked enrichment of {} {:?} terms over {} genes, {} significant",
            results.len(),
            catalog.namespace,
            ranking.len(),
            results.significant().count()
        );
        Ok(results)
    }

    fn in_bounds(&self, size: usize) -> bool {
        size > 0
            && size >= self.config.min_size
            && self.config.max_size.map_or(true, |max| size <= max)
    }

    fn test_set(&self, index: usize, set: &GeneSet, hits: &[usize], ranking: &RankedList) -> EnrichmentResult {
        let observed = running_sum(&ranking.scores, hits, self.config.weight);
        let es = observed.enrichment_score;

        let mut rng = ChaCha8Rng::seed_from_u64(self.config.seed);
        rng.set_stream(index as u64);
        let null = NullDistribution::sample(
            &ranking.scores,
            hits.len(),
            self.config.n_permutations,
            self.config.weight,
            &mut rng,
        );

        let mut leading_edge = hits
            .iter()
            .filter(|pos| {
                if es >= 0.0 {
                    **pos <= observed.peak
                } else {
                    **pos > observed.peak
                }
            })
            .map(|pos| ranking.genes[*pos].clone())
            .collect::<Vec<_>>();
        leading_edge.sort_unstable();

        EnrichmentResult::builder()
            .term_id(set.id.clone())
            .maybe_description(set.description.clone())
            .set_size(hits.len())
            .overlap(leading_edge.len())
            .pvalue(null.pvalue(es))
            .enrichment_score(es)
            .maybe_normalized_score(null.normalize(es))
            .genes(leading_edge)
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geneset::Namespace;
    use approx::assert_relative_eq;

    fn ranking(n: usize) -> RankedList {
        let genes = (0..n).map(|i| format!("g{i}")).collect();
        let scores = vec![1.0; n];
        RankedList::new(genes, scores).unwrap()
    }

    fn catalog(sets: Vec<GeneSet>) -> GeneSetCatalog {
        GeneSetCatalog::new(Namespace::Pathway, "hsa".to_string(), sets)
    }

    fn members(positions: impl Iterator<Item = usize>) -> Vec<String> {
        positions.map(|i| format!("g{i}")).collect()
    }

    fn engine(n_permutations: usize) -> RankedEnrichmentEngine {
        RankedEnrichmentEngine::new(GseaConfig::builder().n_permutations(n_permutations).build())
    }

    #[test]
    fn test_top_members() {
        let sets = catalog(vec![GeneSet::from_members("top", members(0..10))]);
        let results = engine(200).rank_enrich(&ranking(100), &sets).unwrap();
        let top = results.get("top").unwrap();
        assert_relative_eq!(top.enrichment_score.unwrap(), 1.0, epsilon = 1e-12);
        assert!(top.normalized_score.unwrap() > 1.0);
        assert!(top.pvalue < 0.05);
        assert_eq!(top.overlap, 10);
    }

    #[test]
    fn test_scattered_members() {
        let sets = catalog(vec![GeneSet::from_members("spread", members((0..10).map(|i| i * 10)))]);
        let results = engine(200).rank_enrich(&ranking(100), &sets).unwrap();
        let spread = results.get("spread").unwrap();
        assert!(spread.enrichment_score.unwrap().abs() < 0.2);
        assert!(!spread.significant);
    }

    #[test]
    fn test_deterministic() {
        let sets = catalog(vec![
            GeneSet::from_members("a", members(0..8)),
            GeneSet::from_members("b", members(40..60)),
            GeneSet::from_members("c", members((0..30).map(|i| i * 3))),
        ]);
        let first = engine(100).rank_enrich(&ranking(100), &sets).unwrap();
        let second = engine(100).rank_enrich(&ranking(100), &sets).unwrap();
        assert_eq!(first.into_vec(), second.into_vec());
    }

    #[test]
    fn test_size_bounds() {
        let sets = catalog(vec![
            GeneSet::from_members("small", members(0..3)),
            GeneSet::from_members("large", members(0..50)),
            GeneSet::from_members("ok", members(10..20)),
            GeneSet::from_members("absent", ["x1", "x2", "x3", "x4", "x5", "x6"]),
        ]);
        let engine = RankedEnrichmentEngine::new(GseaConfig::builder().n_permutations(10).max_size(30).build());
        let results = engine.rank_enrich(&ranking(100), &sets).unwrap();
        assert_eq!(results.len(), 1);
        assert!(results.get("ok").is_some());
    }

    #[test]
    fn test_ranked_list_validation() {
        let genes = vec!["a".to_string(), "b".to_string()];
        assert!(matches!(
            RankedList::new(genes.clone(), vec![1.0, 2.0]),
            Err(DiffPathError::InvalidInput { .. })
        ));
        assert!(matches!(
            RankedList::new(genes, vec![f64::NAN, 1.0]),
            Err(DiffPathError::InvalidInput { .. })
        ));
        assert!(matches!(
            RankedList::new(vec!["a".to_string(), "a".to_string()], vec![2.0, 1.0]),
            Err(DiffPathError::DuplicateGene { .. })
        ));
    }

    #[test]
    fn test_from_results() {
        let results = vec![
            DifferentialResult::builder().gene_id("low").base_mean(10.0).log2_fold_change(-2.0).stat(-4.0).build(),
            DifferentialResult::builder().gene_id("high").base_mean(10.0).log2_fold_change(3.0).stat(1.0).build(),
            DifferentialResult::builder().gene_id("na").base_mean(0.0).build(),
        ];
        let by_lfc = RankedList::from_results(&results, RankMetric::Log2FoldChange).unwrap();
        assert_eq!(by_lfc.genes(), &["high".to_string(), "low".to_string()]);
        let by_stat = RankedList::from_results(&results, RankMetric::WaldStatistic).unwrap();
        assert_eq!(by_stat.scores(), &[1.0, -4.0]);
    }

    #[test]
    fn test_zero_permutations_rejected() {
        let sets = catalog(vec![GeneSet::from_members("top", members(0..10))]);
        assert!(matches!(
            engine(0).rank_enrich(&ranking(20), &sets),
            Err(DiffPathError::InvalidInput { .. })
        ));
    }
}
