//! Subset sampling strategies for the consensus engine.

use rand::prelude::*;

/// Sample `k` distinct indices from `0..n` using a Fisher-Yates partial
/// shuffle.
pub(crate) fn sample_distinct(rng: &mut impl Rng, n: usize, k: usize) -> Vec<usize> {
    debug_assert!(k <= n);
    let mut indices: Vec<usize> = (0..n).collect();
    for i in 0..k {
        let j = rng.gen_range(i..n);
        indices.swap(i, j);
    }
    indices.truncate(k);
    indices
}

/// Sample `k` distinct reading indices spreading the draw across distinct
/// sources before allowing repeats.
///
/// One reading is drawn from each source (sources visited in random order);
/// only when every source is represented does the draw fall back to the
/// remaining readings.
pub(crate) fn sample_evenly_across_sources(
    rng: &mut impl Rng,
    by_source: &[Vec<usize>],
    n_readings: usize,
    k: usize,
) -> Vec<usize> {
    debug_assert!(k <= n_readings);

    let mut source_order: Vec<usize> = (0..by_source.len()).collect();
    source_order.shuffle(rng);

    let mut subset = Vec::with_capacity(k);
    let mut used = vec![false; n_readings];
    for &s in &source_order {
        if subset.len() == k {
            break;
        }
        let group = &by_source[s];
        let idx = group[rng.gen_range(0..group.len())];
        subset.push(idx);
        used[idx] = true;
    }

    if subset.len() < k {
        let mut rest: Vec<usize> = (0..n_readings).filter(|&i| !used[i]).collect();
        rest.shuffle(rng);
        subset.extend(rest.into_iter().take(k - subset.len()));
    }
    subset
}

/// Sample `k` distinct indices with probability proportional to `quality`.
///
/// Weighted sampling without replacement via exponential sort keys
/// (Efraimidis-Spirakis): each index gets key `u^(1/w)` and the top `k`
/// keys win. Zero or negative scores only ever fill leftover slots.
pub(crate) fn sample_quality_weighted(
    rng: &mut impl Rng,
    quality: &[f64],
    k: usize,
) -> Vec<usize> {
    debug_assert!(k <= quality.len());
    let mut keyed: Vec<(f64, usize)> = quality
        .iter()
        .enumerate()
        .map(|(i, &w)| {
            let u: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
            let key = if w > 0.0 { u.powf(1.0 / w) } else { 0.0 };
            (key, i)
        })
        .collect();
    keyed.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap());
    keyed.truncate(k);
    keyed.into_iter().map(|(_, i)| i).collect()
}

/// PROSAC sampling schedule over a quality-ordered reading list.
///
/// Maintains the growing prefix length `n` and the growth threshold `T'_n`
/// of Chum & Matas: early draws stay inside the highest-quality prefix and
/// must include its newest member, later draws widen toward the full set.
pub(crate) struct ProsacSampler {
    /// Reading indices ordered by descending quality.
    sorted: Vec<usize>,
    subset_size: usize,
    prefix_len: usize,
    t_prime: f64,
    draws: usize,
}

impl ProsacSampler {
    pub(crate) fn new(quality: &[f64], subset_size: usize) -> Self {
        let mut sorted: Vec<usize> = (0..quality.len()).collect();
        sorted.sort_by(|&a, &b| quality[b].partial_cmp(&quality[a]).unwrap());
        Self {
            sorted,
            subset_size,
            prefix_len: subset_size.min(quality.len()),
            t_prime: 1.0,
            draws: 0,
        }
    }

    /// Reading indices of the current prioritized prefix, best first.
    pub(crate) fn prefix(&self) -> &[usize] {
        &self.sorted[..self.prefix_len]
    }

    pub(crate) fn next_subset(&mut self, rng: &mut impl Rng) -> Vec<usize> {
        self.draws += 1;

        while self.draws as f64 > self.t_prime && self.prefix_len < self.sorted.len() {
            let n = self.prefix_len as f64;
            let m = self.subset_size as f64;
            self.t_prime *= (n + 1.0) / (n + 1.0 - m);
            self.prefix_len += 1;
        }

        let n = self.prefix_len;
        let m = self.subset_size;
        if n == m {
            return self.sorted[..m].to_vec();
        }

        if (self.draws as f64) <= self.t_prime {
            // The newest prefix member plus m-1 from the older prefix part.
            let mut subset: Vec<usize> = sample_distinct(rng, n - 1, m - 1)
                .into_iter()
                .map(|i| self.sorted[i])
                .collect();
            subset.push(self.sorted[n - 1]);
            subset
        } else {
            sample_distinct(rng, n, m)
                .into_iter()
                .map(|i| self.sorted[i])
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_distinct_yields_distinct_indices() {
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let mut subset = sample_distinct(&mut rng, 10, 4);
            subset.sort_unstable();
            subset.dedup();
            assert_eq!(subset.len(), 4);
            assert!(subset.iter().all(|&i| i < 10));
        }
    }

    #[test]
    fn evenly_distributed_subset_covers_distinct_sources_first() {
        let mut rng = StdRng::seed_from_u64(2);
        // 3 sources, 6 readings: two readings each.
        let by_source = vec![vec![0, 3], vec![1, 4], vec![2, 5]];
        for _ in 0..100 {
            let subset = sample_evenly_across_sources(&mut rng, &by_source, 6, 3);
            let mut sources: Vec<usize> = subset.iter().map(|&i| i % 3).collect();
            sources.sort_unstable();
            sources.dedup();
            assert_eq!(sources.len(), 3, "subset must span all three sources");
        }
    }

    #[test]
    fn evenly_distributed_subset_allows_repeats_when_needed() {
        let mut rng = StdRng::seed_from_u64(3);
        let by_source = vec![vec![0, 1, 2, 3]];
        let mut subset = sample_evenly_across_sources(&mut rng, &by_source, 4, 3);
        subset.sort_unstable();
        subset.dedup();
        assert_eq!(subset.len(), 3);
    }

    #[test]
    fn quality_weighted_sampling_prefers_high_scores() {
        let mut rng = StdRng::seed_from_u64(4);
        let quality = [10.0, 10.0, 10.0, 0.01, 0.01, 0.01];
        let mut high_hits = 0usize;
        let trials = 300;
        for _ in 0..trials {
            let subset = sample_quality_weighted(&mut rng, &quality, 3);
            assert_eq!(subset.len(), 3);
            high_hits += subset.iter().filter(|&&i| i < 3).count();
        }
        // High-score indices should dominate the draws.
        assert!(
            high_hits as f64 > 0.9 * (3 * trials) as f64,
            "high-quality indices drawn {high_hits}/{} times",
            3 * trials
        );
    }

    #[test]
    fn prosac_starts_in_the_best_prefix_and_grows() {
        let mut rng = StdRng::seed_from_u64(5);
        // Quality strictly decreasing with index.
        let quality: Vec<f64> = (0..20).map(|i| 1.0 - i as f64 / 20.0).collect();
        let mut sampler = ProsacSampler::new(&quality, 3);

        let first = sampler.next_subset(&mut rng);
        let mut sorted_first = first.clone();
        sorted_first.sort_unstable();
        assert_eq!(sorted_first, vec![0, 1, 2], "first draw is the top prefix");

        let early_prefix = sampler.prefix().len();
        for _ in 0..200 {
            let subset = sampler.next_subset(&mut rng);
            assert_eq!(subset.len(), 3);
            let prefix = sampler.prefix();
            assert!(subset.iter().all(|i| prefix.contains(i)));
        }
        assert!(sampler.prefix().len() > early_prefix, "prefix must grow");
    }

    #[test]
    fn prosac_prefix_is_quality_ordered() {
        let quality = [0.1, 0.9, 0.5, 0.7];
        let sampler = ProsacSampler::new(&quality, 2);
        assert_eq!(sampler.prefix(), &[1, 3][..]);
    }
}
