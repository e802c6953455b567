//! Attaching gene symbols and Entrez ids to differential results

use std::collections::HashMap;

use log::debug;

use crate::differential::DifferentialResult;

/// Identifier systems a resolver maps between
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdNamespace {
    Ensembl,
    Symbol,
    Entrez,
}

/// Maps gene identifiers between namespaces
///
/// Every requested id appears in the output; unmapped ids map to `None`.
pub trait AnnotationResolver {
    fn resolve(&self, ids: &[String], from: IdNamespace, to: IdNamespace) -> HashMap<String, Option<String>>;
}

/// In-memory lookup tables keyed by namespace pair
#[derive(Debug, Clone, Default)]
pub struct TableResolver {
    tables: HashMap<(IdNamespace, IdNamespace), HashMap<String, String>>,
}
impl TableResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_mapping<I, K, V>(mut self, from: IdNamespace, to: IdNamespace, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.tables
            .entry((from, to))
            .or_default()
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }
}
impl AnnotationResolver for TableResolver {
    fn resolve(&self, ids: &[String], from: IdNamespace, to: IdNamespace) -> HashMap<String, Option<String>> {
        let table = self.tables.get(&(from, to));
        ids.iter()
            .map(|id| {
                let mapped = if from == to {
                    Some(id.clone())
                } else {
                    table.and_then(|t| t.get(id)).cloned()
                };
                (id.clone(), mapped)
            })
            .collect()
    }
}

/// Returns copies of `results` with symbol and Entrez id attached
///
/// Gene ids of `results` are taken to be in namespace `from`. Existing
/// annotations are kept where the resolver has no mapping.
pub fn annotate<R: AnnotationResolver + ?Sized>(
    results: &[DifferentialResult],
    resolver: &R,
    from: IdNamespace,
) -> Vec<DifferentialResult> {
    let ids = results.iter().map(|r| r.gene_id.clone()).collect::<Vec<_>>();
    let symbols = resolver.resolve(&ids, from, IdNamespace::Symbol);
    let entrez = resolver.resolve(&ids, from, IdNamespace::Entrez);

    let annotated = results
        .iter()
        .map(|result| {
            let mut result = result.clone();
            if let Some(Some(symbol)) = symbols.get(&result.gene_id) {
                result.symbol = Some(symbol.clone());
            }
            if let Some(id) = entrez
                .get(&result.gene_id)
                .and_then(|id| id.as_deref())
                .and_then(|id| id.parse::<u64>().ok())
            {
                result.entrez_id = Some(id);
            }
            result
        })
        .collect::<Vec<_>>();
    debug!(
        "Annotated {} of {} genes with a symbol",
        annotated.iter().filter(|r| r.symbol.is_some()).count(),
        annotated.len()
    );
    annotated
}
