use std::cmp::Ordering;

use itertools::Itertools;

pub fn select_indices<T: Copy>(indices: &[usize], data: &[T]) -> Vec<T> {
    indices.iter().map(|i| data[*i]).collect()
}

/// Returns the first identifier that occurs more than once
pub fn first_duplicate<S: AsRef<str>>(ids: &[S]) -> Option<&str> {
    ids.iter().map(|id| id.as_ref()).duplicates().next()
}

/// Total order on p-values used to sort result tables
pub fn cmp_f64(a: f64, b: f64) -> Ordering {
    a.partial_cmp(&b).unwrap_or(Ordering::Equal)
}
