use derive_new::new;
use rand::seq::index::sample;
use rand_chacha::ChaCha8Rng;

use crate::utils::select_indices;

/// Running-sum statistic of a sorted set of positions in a ranking
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RunningSum {
    /// Signed maximum deviation from zero
    pub enrichment_score: f64,
    /// Ranking position where the maximum deviation occurs
    pub peak: usize,
}

/// Weighted Kolmogorov-Smirnov running sum over `scores` with `hits` as members
///
/// `hits` must be sorted ascending and unique. Hits step up by
/// `|score|^weight / N_R` and misses step down by `1 / (N - N_H)`; when every
/// member score is zero the hits step up equally.
pub fn running_sum(scores: &[f64], hits: &[usize], weight: f64) -> RunningSum {
    let n = scores.len();
    let n_hits = hits.len();
    if n_hits == 0 || n == 0 {
        return RunningSum {
            enrichment_score: 0.0,
            peak: 0,
        };
    }
    let miss_step = if n > n_hits {
        1.0 / (n - n_hits) as f64
    } else {
        0.0
    };
    let hit_weights = select_indices(hits, scores)
        .into_iter()
        .map(|s| s.abs().powf(weight))
        .collect::<Vec<_>>();
    let total = hit_weights.iter().sum::<f64>();

    let mut running = 0.0;
    let mut max = (0.0, 0);
    let mut min = (0.0, 0);
    let mut next = 0;
    for (pos, w) in hits.iter().zip(hit_weights.iter()) {
        if *pos > next {
            running -= (*pos - next) as f64 * miss_step;
            if running < min.0 {
                min = (running, pos - 1);
            }
        }
        running += if total > 0.0 { w / total } else { 1.0 / n_hits as f64 };
        if running > max.0 {
            max = (running, *pos);
        }
        next = pos + 1;
    }
    // trailing misses only return the sum to zero
    let (enrichment_score, peak) = if max.0 >= -min.0 { max } else { min };
    RunningSum {
        enrichment_score,
        peak,
    }
}

/// Enrichment scores of random position sets matching one term's size
#[derive(new, Debug, Clone)]
pub struct NullDistribution {
    scores: Vec<f64>,
}
impl NullDistribution {
    /// Draws `n_permutations` position sets of `set_size` without replacement
    pub fn sample(
        scores: &[f64],
        set_size: usize,
        n_permutations: usize,
        weight: f64,
        rng: &mut ChaCha8Rng,
    ) -> Self {
        let null = (0..n_permutations)
            .map(|_| {
                let mut positions = sample(rng, scores.len(), set_size).into_vec();
                positions.sort_unstable();
                running_sum(scores, &positions, weight).enrichment_score
            })
            .collect();
        Self::new(null)
    }

    fn same_sign(&self, es: f64) -> impl Iterator<Item = f64> + '_ {
        let positive = es >= 0.0;
        self.scores
            .iter()
            .copied()
            .filter(move |s| (*s >= 0.0) == positive)
    }

    /// Fraction of same-signed null scores at least as extreme as `es`
    pub fn pvalue(&self, es: f64) -> f64 {
        let (extreme, total) = self.same_sign(es).fold((0usize, 0usize), |(extreme, total), s| {
            (extreme + usize::from(s.abs() >= es.abs()), total + 1)
        });
        (1 + extreme) as f64 / (1 + total) as f64
    }

    /// `es` divided by the mean magnitude of same-signed null scores
    pub fn normalize(&self, es: f64) -> Option<f64> {
        let (sum, count) = self
            .same_sign(es)
            .fold((0.0, 0usize), |(sum, count), s| (sum + s.abs(), count + 1));
        (count > 0 && sum > 0.0).then(|| es / (sum / count as f64))
    }

    pub fn len(&self) -> usize {
        self.scores.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }
}
