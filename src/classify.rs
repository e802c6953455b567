use std::{collections::HashSet, fmt};

use crate::{config::ClassifyConfig, differential::DifferentialResult};

/// Direction of a gene's change between the two groups
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Regulation {
    Up,
    Down,
    NotSignificant,
}
impl Regulation {
    /// Labels a gene from its adjusted p-value and log2 fold change
    ///
    /// Both comparisons are strict; an undefined statistic is never significant.
    pub fn from_stats(padj: Option<f64>, log2_fold_change: Option<f64>, config: &ClassifyConfig) -> Self {
        match (padj, log2_fold_change) {
            (Some(p), Some(lfc)) if p < config.padj_threshold => {
                if lfc > config.log2fc_threshold {
                    Regulation::Up
                } else if lfc < -config.log2fc_threshold {
                    Regulation::Down
                } else {
                    Regulation::NotSignificant
                }
            }
            _ => Regulation::NotSignificant,
        }
    }

    pub fn is_significant(&self) -> bool {
        !matches!(self, Regulation::NotSignificant)
    }
}
impl fmt::Display for Regulation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Regulation::Up => "up",
            Regulation::Down => "down",
            Regulation::NotSignificant => "not_significant",
        };
        write!(f, "{label}")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedGene {
    pub result: DifferentialResult,
    pub label: Regulation,
}
impl ClassifiedGene {
    pub fn gene_id(&self) -> &str {
        &self.result.gene_id
    }
}

/// Labels every result, preserving input order
pub fn classify(results: &[DifferentialResult], config: &ClassifyConfig) -> Vec<ClassifiedGene> {
    results
        .iter()
        .map(|result| ClassifiedGene {
            label: Regulation::from_stats(result.padj, result.log2_fold_change, config),
            result: result.clone(),
        })
        .collect()
}

/// Label counts over a classified gene list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegulationSummary {
    pub up: usize,
    pub down: usize,
    pub not_significant: usize,
}
impl RegulationSummary {
    pub fn from_classified(genes: &[ClassifiedGene]) -> Self {
        genes.iter().fold(Self::default(), |mut summary, gene| {
            summary.add(gene.label);
            summary
        })
    }

    pub(crate) fn add(&mut self, label: Regulation) {
        match label {
            Regulation::Up => self.up += 1,
            Regulation::Down => self.down += 1,
            Regulation::NotSignificant => self.not_significant += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.up + self.down + self.not_significant
    }
}

/// Gene ids carrying any of `labels`, e.g. the foreground of an enrichment test
pub fn genes_with(genes: &[ClassifiedGene], labels: &[Regulation]) -> HashSet<String> {
    genes
        .iter()
        .filter(|gene| labels.contains(&gene.label))
        .map(|gene| gene.result.gene_id.clone())
        .collect()
}

/// Gene ids with a defined adjusted p-value
pub fn tested_universe(genes: &[ClassifiedGene]) -> HashSet<String> {
    genes
        .iter()
        .filter(|gene| gene.result.padj.is_some())
        .map(|gene| gene.result.gene_id.clone())
        .collect()
}
