use std::collections::HashMap;

use crate::{
    classify::{ClassifiedGene, RegulationSummary},
    error::{DiffPathError, Result},
    geneset::PathwayMembership,
};

#[derive(Debug, Clone, PartialEq)]
pub enum PathwayGeneState {
    Tested(ClassifiedGene),
    /// Member absent from the classified genes
    Untested,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PathwayGene {
    pub gene_id: String,
    pub state: PathwayGeneState,
}

/// Classified genes laid onto one pathway's membership
#[derive(Debug, Clone, PartialEq)]
pub struct PathwayView {
    pub pathway_id: String,
    pub description: Option<String>,
    /// Sorted by gene id
    pub genes: Vec<PathwayGene>,
}
impl PathwayView {
    /// Regulation counts of tested members and the number of untested members
    pub fn summary(&self) -> (RegulationSummary, usize) {
        self.genes
            .iter()
            .fold((RegulationSummary::default(), 0), |(mut summary, untested), gene| {
                match &gene.state {
                    PathwayGeneState::Tested(classified) => {
                        summary.add(classified.label);
                        (summary, untested)
                    }
                    PathwayGeneState::Untested => (summary, untested + 1),
                }
            })
    }

    pub fn tested(&self) -> impl Iterator<Item = &ClassifiedGene> {
        self.genes.iter().filter_map(|gene| match &gene.state {
            PathwayGeneState::Tested(classified) => Some(classified),
            PathwayGeneState::Untested => None,
        })
    }
}

fn index_by_gene(classified: &[ClassifiedGene]) -> HashMap<&str, &ClassifiedGene> {
    classified.iter().map(|gene| (gene.gene_id(), gene)).collect()
}

fn join(
    by_gene: &HashMap<&str, &ClassifiedGene>,
    membership: &PathwayMembership,
    pathway_id: &str,
) -> Result<PathwayView> {
    let pathway = membership
        .get(pathway_id)
        .ok_or_else(|| DiffPathError::UnknownPathway {
            pathway_id: pathway_id.to_string(),
        })?;
    let mut genes = pathway
        .members
        .iter()
        .map(|gene_id| PathwayGene {
            gene_id: gene_id.clone(),
            state: by_gene
                .get(gene_id.as_str())
                .map_or(PathwayGeneState::Untested, |gene| {
                    PathwayGeneState::Tested((*gene).clone())
                }),
        })
        .collect::<Vec<_>>();
    genes.sort_unstable_by(|a, b| a.gene_id.cmp(&b.gene_id));
    Ok(PathwayView {
        pathway_id: pathway_id.to_string(),
        description: pathway.description.clone(),
        genes,
    })
}

/// Joins one pathway's members with the classified genes
pub fn aggregate(
    classified: &[ClassifiedGene],
    membership: &PathwayMembership,
    pathway_id: &str,
) -> Result<PathwayView> {
    join(&index_by_gene(classified), membership, pathway_id)
}

/// Applies [`aggregate`] to every id, failing on the first unknown pathway
pub fn aggregate_many<S: AsRef<str>>(
    classified: &[ClassifiedGene],
    membership: &PathwayMembership,
    pathway_ids: &[S],
) -> Result<Vec<PathwayView>> {
    let by_gene = index_by_gene(classified);
    pathway_ids
        .iter()
        .map(|id| join(&by_gene, membership, id.as_ref()))
        .collect()
}
