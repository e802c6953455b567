//! Over-representation of a foreground gene list in curated gene sets

use std::collections::HashSet;

use log::{debug, info};
use rayon::prelude::*;
use statrs::distribution::{DiscreteCDF, Hypergeometric};

use crate::{
    config::OraConfig,
    error::{DiffPathError, Result},
    geneset::{GeneSet, GeneSetCatalog},
    math::storey_qvalues,
    results::{EnrichmentResult, EnrichmentResults},
};

/// Tuning parameter of the Storey null-proportion estimate
const STOREY_LAMBDA: f64 = 0.5;

/// Upper-tail hypergeometric p-value `P(X >= k)`
///
/// `population` genes of which `successes` are term members, `draws` genes in
/// the foreground and `observed` foreground members of the term.
pub fn hypergeometric_sf(population: u64, successes: u64, draws: u64, observed: u64) -> Result<f64> {
    if observed == 0 {
        return Ok(1.0);
    }
    let hyper = Hypergeometric::new(population, successes, draws).map_err(|e| DiffPathError::InvalidInput {
        reason: format!("hypergeometric({population}, {successes}, {draws}): {e}"),
    })?;
    // subtracting 1 to include the observed count in the tail
    Ok(hyper.sf(observed - 1).clamp(0.0, 1.0))
}

/// Hypergeometric enrichment engine, one instance per parameter set
#[derive(Debug, Clone, Default)]
pub struct SetEnrichmentEngine {
    config: OraConfig,
}
impl SetEnrichmentEngine {
    pub fn new(config: OraConfig) -> Self {
        Self { config }
    }

    /// Tests every term of `catalog` for over-representation of `foreground`
    ///
    /// Only genes of the universe take part: the foreground and each term are
    /// intersected with it first. Terms without overlap are kept with p = 1.
    pub fn enrich(
        &self,
        foreground: &HashSet<String>,
        universe: &HashSet<String>,
        catalog: &GeneSetCatalog,
    ) -> Result<EnrichmentResults> {
        let foreground = foreground.intersection(universe).collect::<HashSet<_>>();
        if foreground.is_empty() {
            return Err(DiffPathError::EmptyForeground);
        }
        let population = universe.len() as u64;
        let draws = foreground.len() as u64;

        let mut results = catalog
            .sets
            .par_iter()
            .map(|set| self.test_set(set, &foreground, universe, population, draws))
            .collect::<Result<Vec<_>>>()?;

        let pvalues = results.iter().map(|r| r.pvalue).collect::<Vec<_>>();
        let adjusted = self.config.correction.adjust(&pvalues);
        let qvalues = storey_qvalues(&pvalues, &adjusted, STOREY_LAMBDA);
        for ((result, padj), qvalue) in results.iter_mut().zip(adjusted).zip(qvalues) {
            result.padj = padj;
            result.qvalue = Some(qvalue);
            result.significant = padj < self.config.pvalue_cutoff && qvalue < self.config.qvalue_cutoff;
        }

        let results = EnrichmentResults::from_vec(results);
        info!(
            "Tested {} {:?} terms ({}), {} significant",
            results.len(),
            catalog.namespace,
            catalog.organism,
            results.significant().count()
        );
        Ok(results)
    }

    /// Runs [`Self::enrich`] once per catalog, correcting within each catalog
    pub fn enrich_catalogs(
        &self,
        foreground: &HashSet<String>,
        universe: &HashSet<String>,
        catalogs: &[GeneSetCatalog],
    ) -> Result<Vec<EnrichmentResults>> {
        catalogs
            .iter()
            .map(|catalog| self.enrich(foreground, universe, catalog))
            .collect()
    }

    fn test_set(
        &self,
        set: &GeneSet,
        foreground: &HashSet<&String>,
        universe: &HashSet<String>,
        population: u64,
        draws: u64,
    ) -> Result<EnrichmentResult> {
        let in_universe = set
            .members
            .iter()
            .filter(|gene| universe.contains(*gene))
            .collect::<Vec<_>>();
        let mut overlap = in_universe
            .iter()
            .filter(|gene| foreground.contains(**gene))
            .map(|gene| gene.to_string())
            .collect::<Vec<_>>();
        overlap.sort_unstable();

        let successes = in_universe.len() as u64;
        let observed = overlap.len() as u64;
        let pvalue = hypergeometric_sf(population, successes, draws, observed)?;
        debug!("{}: {observed} of {successes} members in foreground, p = {pvalue}", set.id);

        Ok(EnrichmentResult::builder()
            .term_id(set.id.clone())
            .maybe_description(set.description.clone())
            .set_size(in_universe.len())
            .overlap(overlap.len())
            .expected(draws as f64 * successes as f64 / population as f64)
            .pvalue(pvalue)
            .genes(overlap)
            .build())
    }
}
