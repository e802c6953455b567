//! diffpath: differential expression and pathway enrichment for two-group count data
//!
//! The pipeline runs strictly downstream, each stage borrowing its input and
//! returning a new value:
//! - [`prepare`]: clean a raw count table into a [`CountMatrix`]
//! - [`DifferentialTester`]: negative-binomial Wald test between two groups
//! - [`classify()`]: label genes up, down or not significant
//! - [`SetEnrichmentEngine`]: hypergeometric over-representation per catalog
//! - [`RankedEnrichmentEngine`]: permutation-based ranked enrichment (GSEA)
//! - [`aggregate`]: lay classified genes onto a pathway's membership

mod annotate;
mod classify;
mod config;
mod differential;
mod dispersion;
mod error;
mod geneset;
mod glm;
mod groups;
mod gsea;
mod math;
mod matrix;
mod normalize;
mod null;
mod ora;
mod pathway;
mod prepare;
mod results;
mod utils;

pub use annotate::{annotate, AnnotationResolver, IdNamespace, TableResolver};
pub use classify::{classify, genes_with, tested_universe, ClassifiedGene, Regulation, RegulationSummary};
pub use config::{
    ClassifyConfig, Correction, DispersionConfig, GseaConfig, OraConfig, RankMetric, TesterConfig,
};
pub use differential::{test, DifferentialAnalysis, DifferentialResult, DifferentialTester};
pub use dispersion::{DispersionFit, DispersionTrend};
pub use error::{DiffPathError, Result};
pub use geneset::{GeneSet, GeneSetCatalog, Namespace, PathwayMembership};
pub use groups::SampleGroupAssignment;
pub use gsea::{RankedEnrichmentEngine, RankedList};
pub use matrix::CountMatrix;
pub use ora::SetEnrichmentEngine;
pub use pathway::{aggregate, aggregate_many, PathwayGene, PathwayGeneState, PathwayView};
pub use prepare::{prepare, BiotypeFilter, RawMatrix};
pub use results::{EnrichmentResult, EnrichmentResults};

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use std::collections::HashSet;

    fn raw_counts() -> Result<RawMatrix> {
        let rows = [
            ("G1", ["100", "110", "10", "12"]),
            ("G2", ["50", "50", "50", "50"]),
            ("G3", ["50", "50", "50", "50"]),
            ("G4", ["50", "50", "50", "50"]),
        ];
        Ok(RawMatrix::new(
            rows.iter().map(|(g, _)| g.to_string()).collect(),
            vec!["s1".into(), "s2".into(), "s3".into(), "s4".into()],
            rows.iter()
                .map(|(_, cells)| cells.iter().map(|c| c.to_string()).collect())
                .collect(),
        )?)
    }

    fn groups() -> SampleGroupAssignment {
        SampleGroupAssignment::new([("s1", "treated"), ("s2", "treated"), ("s3", "control"), ("s4", "control")])
    }

    fn classified() -> Result<Vec<ClassifiedGene>> {
        let counts = prepare(&raw_counts()?, None, 0.0)?;
        let results = test(&counts, &groups(), "treated", "control")?;
        Ok(classify(&results, &ClassifyConfig::default()))
    }

    #[test]
    fn test_single_changed_gene() -> Result<()> {
        let genes = classified()?;
        for gene in &genes {
            if gene.gene_id() == "G1" {
                assert_eq!(gene.label, Regulation::Up);
                assert!(gene.result.log2_fold_change.unwrap_or_default().abs() > 1.0);
                assert!(gene.result.padj.unwrap_or(1.0) < 0.05);
            } else {
                assert_eq!(gene.label, Regulation::NotSignificant);
            }
        }
        assert_eq!(
            RegulationSummary::from_classified(&genes),
            RegulationSummary { up: 1, down: 0, not_significant: 3 }
        );
        Ok(())
    }

    #[test]
    fn test_enrichment_of_changed_gene() -> Result<()> {
        let genes = classified()?;
        let foreground = genes_with(&genes, &[Regulation::Up, Regulation::Down]);
        let universe = tested_universe(&genes);
        assert_eq!(foreground, HashSet::from(["G1".to_string()]));
        assert_eq!(universe.len(), 4);

        let catalog = GeneSetCatalog::new(
            Namespace::Pathway,
            "hsa".to_string(),
            vec![GeneSet::from_members("P", ["G1", "G2"])],
        );
        let results = SetEnrichmentEngine::default().enrich(&foreground, &universe, &catalog)?;
        let term = results.get("P").expect("term tested");
        assert_eq!(term.overlap, 1);
        approx::assert_relative_eq!(term.pvalue, 0.5, epsilon = 1e-12);
        Ok(())
    }

    #[test]
    fn test_pathway_view_of_results() -> Result<()> {
        let genes = classified()?;
        let membership = PathwayMembership::new(vec![GeneSet::from_members("P", ["G1", "G2", "G9"])]);
        let view = aggregate(&genes, &membership, "P")?;
        let (summary, untested) = view.summary();
        assert_eq!(summary.up, 1);
        assert_eq!(summary.not_significant, 1);
        assert_eq!(untested, 1);
        Ok(())
    }
}
