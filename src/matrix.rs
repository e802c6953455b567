use ndarray::{Array2, ArrayView1, ArrayView2};

use crate::{
    error::{DiffPathError, Result},
    utils::first_duplicate,
};

/// Integer read counts, genes by samples
#[derive(Debug, Clone, PartialEq)]
pub struct CountMatrix {
    counts: Array2<u64>,
    gene_ids: Vec<String>,
    sample_ids: Vec<String>,
}
impl CountMatrix {
    pub fn new(counts: Array2<u64>, gene_ids: Vec<String>, sample_ids: Vec<String>) -> Result<Self> {
        let (n_genes, n_samples) = counts.dim();
        if gene_ids.len() != n_genes || sample_ids.len() != n_samples {
            return Err(DiffPathError::InvalidMatrix {
                reason: format!(
                    "{} x {} counts do not match {} gene ids and {} sample ids",
                    n_genes,
                    n_samples,
                    gene_ids.len(),
                    sample_ids.len()
                ),
            });
        }
        if let Some(gene) = first_duplicate(&gene_ids) {
            return Err(DiffPathError::InvalidMatrix {
                reason: format!("gene id {gene} occurs more than once"),
            });
        }
        if let Some(sample) = first_duplicate(&sample_ids) {
            return Err(DiffPathError::InvalidMatrix {
                reason: format!("sample id {sample} occurs more than once"),
            });
        }
        Ok(Self {
            counts,
            gene_ids,
            sample_ids,
        })
    }

    /// Builds a matrix from one count vector per gene
    pub fn from_rows(gene_ids: Vec<String>, sample_ids: Vec<String>, rows: Vec<Vec<u64>>) -> Result<Self> {
        let n_samples = sample_ids.len();
        if let Some(row) = rows.iter().position(|r| r.len() != n_samples) {
            return Err(DiffPathError::InvalidMatrix {
                reason: format!(
                    "row {} has {} values, expected {}",
                    row,
                    rows[row].len(),
                    n_samples
                ),
            });
        }
        let flat = rows.into_iter().flatten().collect::<Vec<_>>();
        let counts = Array2::from_shape_vec((gene_ids.len(), n_samples), flat).map_err(|e| {
            DiffPathError::InvalidMatrix {
                reason: e.to_string(),
            }
        })?;
        Self::new(counts, gene_ids, sample_ids)
    }

    pub fn n_genes(&self) -> usize {
        self.gene_ids.len()
    }

    pub fn n_samples(&self) -> usize {
        self.sample_ids.len()
    }

    pub fn gene_ids(&self) -> &[String] {
        &self.gene_ids
    }

    pub fn sample_ids(&self) -> &[String] {
        &self.sample_ids
    }

    pub fn counts(&self) -> ArrayView2<u64> {
        self.counts.view()
    }

    pub fn row(&self, gene: usize) -> ArrayView1<u64> {
        self.counts.row(gene)
    }

    pub fn gene_index(&self, gene_id: &str) -> Option<usize> {
        self.gene_ids.iter().position(|g| g == gene_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(prefix: &str, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{prefix}{i}")).collect()
    }

    #[test]
    fn test_from_rows() {
        let matrix =
            CountMatrix::from_rows(ids("g", 2), ids("s", 3), vec![vec![1, 2, 3], vec![4, 5, 6]])
                .unwrap();
        assert_eq!(matrix.n_genes(), 2);
        assert_eq!(matrix.n_samples(), 3);
        assert_eq!(matrix.row(1).to_vec(), vec![4, 5, 6]);
        assert_eq!(matrix.gene_index("g2"), Some(1));
        assert_eq!(matrix.gene_index("g9"), None);
    }

    #[test]
    fn test_ragged_rows_rejected() {
        let result = CountMatrix::from_rows(ids("g", 2), ids("s", 3), vec![vec![1, 2, 3], vec![4]]);
        assert!(matches!(result, Err(DiffPathError::InvalidMatrix { .. })));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let genes = vec!["g1".to_string(), "g1".to_string()];
        let result = CountMatrix::from_rows(genes, ids("s", 2), vec![vec![1, 2], vec![3, 4]]);
        assert!(matches!(result, Err(DiffPathError::InvalidMatrix { .. })));

        let samples = vec!["s1".to_string(), "s1".to_string()];
        let result = CountMatrix::from_rows(ids("g", 1), samples, vec![vec![1, 2]]);
        assert!(matches!(result, Err(DiffPathError::InvalidMatrix { .. })));
    }
}
