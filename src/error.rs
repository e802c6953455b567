//! Error types shared by every stage of the pipeline

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiffPathError {
    #[error("Invalid count matrix: {reason}")]
    InvalidMatrix { reason: String },

    #[error("Degenerate design: {reason}")]
    DesignDegenerate { reason: String },

    #[error("Foreground is empty after intersecting with the universe")]
    EmptyForeground,

    #[error("Duplicate gene in ranked list: {gene_id}")]
    DuplicateGene { gene_id: String },

    #[error("Unknown pathway: {pathway_id}")]
    UnknownPathway { pathway_id: String },

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },
}

pub type Result<T> = std::result::Result<T, DiffPathError>;
