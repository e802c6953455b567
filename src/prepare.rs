//! Cleaning and filtering of a raw count table before testing
//!
//! The raw table keeps cells exactly as an external loader read them. Preparation
//! restricts genes to a biotype, coerces cells to non-negative integers and drops
//! lowly expressed genes, returning a new [`CountMatrix`].

use std::collections::HashMap;

use derive_new::new;
use log::{debug, info};
use ndarray::Array2;

use crate::{
    error::{DiffPathError, Result},
    math::arithmetic_mean,
    matrix::CountMatrix,
    utils::first_duplicate,
};

/// Gene by sample table of unparsed cells
#[derive(Debug, Clone)]
pub struct RawMatrix {
    cells: Array2<String>,
    gene_ids: Vec<String>,
    sample_ids: Vec<String>,
}
impl RawMatrix {
    pub fn new(gene_ids: Vec<String>, sample_ids: Vec<String>, rows: Vec<Vec<String>>) -> Result<Self> {
        let n_samples = sample_ids.len();
        if let Some(row) = rows.iter().position(|r| r.len() != n_samples) {
            return Err(DiffPathError::InvalidMatrix {
                reason: format!("row {} has {} cells, expected {}", row, rows[row].len(), n_samples),
            });
        }
        let cells = Array2::from_shape_vec(
            (gene_ids.len(), n_samples),
            rows.into_iter().flatten().collect(),
        )
        .map_err(|e| DiffPathError::InvalidMatrix {
            reason: e.to_string(),
        })?;
        Ok(Self {
            cells,
            gene_ids,
            sample_ids,
        })
    }

    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }
}

/// Keeps only genes annotated with a target biological category
#[derive(new, Debug, Clone)]
pub struct BiotypeFilter {
    /// Category to keep, e.g. `protein_coding`
    target: String,
    /// Gene id to biotype annotation
    biotypes: HashMap<String, String>,
}
impl BiotypeFilter {
    fn keeps(&self, gene_id: &str) -> bool {
        self.biotypes
            .get(gene_id)
            .is_some_and(|biotype| *biotype == self.target)
    }
}

/// Smallest rounded value that no longer fits a `u64` count
const MAX_COUNT: f64 = u64::MAX as f64;

fn parse_cell(cell: &str) -> Option<f64> {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Prepares a raw count table for differential testing
///
/// Genes whose mean count is at or below `min_mean_count` are dropped.
pub fn prepare(
    raw: &RawMatrix,
    biotype_filter: Option<&BiotypeFilter>,
    min_mean_count: f64,
) -> Result<CountMatrix> {
    if let Some(gene) = first_duplicate(&raw.gene_ids) {
        return Err(DiffPathError::InvalidMatrix {
            reason: format!("gene id {gene} occurs more than once"),
        });
    }
    if raw.sample_ids.len() < 2 {
        return Err(DiffPathError::InvalidMatrix {
            reason: format!("{} sample(s) present, at least two required", raw.sample_ids.len()),
        });
    }
    for (column, sample) in raw.cells.columns().into_iter().zip(raw.sample_ids.iter()) {
        if !column.iter().any(|cell| parse_cell(cell).is_some()) {
            return Err(DiffPathError::InvalidMatrix {
                reason: format!("column {sample} holds no numeric values"),
            });
        }
    }

    let mut gene_ids = Vec::new();
    let mut rows = Vec::new();
    let mut n_biotype = 0;
    let mut n_non_numeric = 0;
    let mut n_low = 0;
    for (row, gene) in raw.cells.rows().into_iter().zip(raw.gene_ids.iter()) {
        let parsed = row.iter().map(|cell| parse_cell(cell)).collect::<Vec<_>>();
        if let Some(value) = parsed.iter().flatten().find(|v| **v < 0.0) {
            return Err(DiffPathError::InvalidMatrix {
                reason: format!("gene {gene} has negative count {value}"),
            });
        }
        if let Some(value) = parsed.iter().flatten().find(|v| v.round() >= MAX_COUNT) {
            return Err(DiffPathError::InvalidMatrix {
                reason: format!("gene {gene} has count {value} beyond the integer range"),
            });
        }
        if biotype_filter.is_some_and(|filter| !filter.keeps(gene)) {
            n_biotype += 1;
            continue;
        }
        let Some(values) = parsed.into_iter().collect::<Option<Vec<_>>>() else {
            debug!("Dropping gene {gene}: non-numeric cell");
            n_non_numeric += 1;
            continue;
        };
        let rounded = values.iter().map(|v| v.round()).collect::<Vec<_>>();
        if arithmetic_mean(&rounded) <= min_mean_count {
            n_low += 1;
            continue;
        }
        gene_ids.push(gene.clone());
        rows.push(rounded.iter().map(|v| *v as u64).collect());
    }

    info!(
        "Prepared {} of {} genes ({} outside biotype, {} non-numeric, {} at or below mean count {})",
        gene_ids.len(),
        raw.gene_ids.len(),
        n_biotype,
        n_non_numeric,
        n_low,
        min_mean_count
    );
    CountMatrix::from_rows(gene_ids, raw.sample_ids.clone(), rows)
}
