//! Curated gene-set catalogs
//!
//! Catalogs are supplied by an external provider and only read here.

use std::collections::{HashMap, HashSet};

use derive_new::new;

/// A named term and its member gene ids
#[derive(new, Debug, Clone, PartialEq)]
pub struct GeneSet {
    pub id: String,
    pub description: Option<String>,
    pub members: HashSet<String>,
}
impl GeneSet {
    /// Builds a set from borrowed ids without a description
    pub fn from_members<I, S>(id: &str, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(id.to_string(), None, members.into_iter().map(Into::into).collect())
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn contains(&self, gene_id: &str) -> bool {
        self.members.contains(gene_id)
    }
}

/// Kind of terms a catalog holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    BiologicalProcess,
    MolecularFunction,
    CellularComponent,
    Pathway,
}

#[derive(new, Debug, Clone)]
pub struct GeneSetCatalog {
    pub namespace: Namespace,
    /// Organism tag, e.g. `hsa`
    pub organism: String,
    pub sets: Vec<GeneSet>,
}
impl GeneSetCatalog {
    pub fn get(&self, id: &str) -> Option<&GeneSet> {
        self.sets.iter().find(|set| set.id == id)
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}

/// Pathway id to member gene ids
#[derive(Debug, Clone, Default)]
pub struct PathwayMembership {
    pathways: HashMap<String, GeneSet>,
}
impl PathwayMembership {
    pub fn new(pathways: Vec<GeneSet>) -> Self {
        let pathways = pathways.into_iter().map(|set| (set.id.clone(), set)).collect();
        Self { pathways }
    }

    pub fn get(&self, pathway_id: &str) -> Option<&GeneSet> {
        self.pathways.get(pathway_id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.pathways.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pathways.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pathways.is_empty()
    }
}
impl From<&GeneSetCatalog> for PathwayMembership {
    fn from(catalog: &GeneSetCatalog) -> Self {
        Self::new(catalog.sets.clone())
    }
}
