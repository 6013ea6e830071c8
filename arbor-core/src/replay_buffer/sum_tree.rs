//! Sum tree for prioritized sampling.
use rand::Rng;
use segment_tree::{ops::MaxIgnoreNaN, SegmentPoint};

/// Binary tree whose internal nodes hold the sum of `priority^alpha` below them.
#[derive(Debug)]
pub struct SumTree {
    eps: f32,
    alpha: f32,
    capacity: usize,
    n_samples: usize,
    tree: Vec<f32>,
    max_tree: SegmentPoint<f32, MaxIgnoreNaN>,
}

impl SumTree {
    pub fn new(capacity: usize, alpha: f32) -> Self {
        Self {
            eps: 1e-8,
            alpha,
            capacity,
            n_samples: 0,
            tree: vec![0f32; 2 * capacity - 1],
            max_tree: SegmentPoint::build(vec![0f32; capacity], MaxIgnoreNaN),
        }
    }

    fn propagate(&mut self, mut ix: usize, change: f32) {
        while ix != 0 {
            ix = (ix - 1) / 2;
            self.tree[ix] += change;
        }
    }

    fn retrieve(&self, mut ix: usize, mut s: f32) -> usize {
        loop {
            let left = 2 * ix + 1;
            let right = left + 1;
            if left >= self.tree.len() {
                return ix;
            }
            if s <= self.tree[left] || self.tree[right] == 0f32 {
                ix = left;
            } else {
                s -= self.tree[left];
                ix = right;
            }
        }
    }

    pub fn total(&self) -> f32 {
        self.tree[0]
    }

    pub fn len(&self) -> usize {
        self.n_samples
    }

    /// Largest raw priority stored so far, `1.0` for an empty tree.
    pub fn max_priority(&self) -> f32 {
        if self.n_samples == 0 {
            1.0
        } else {
            self.max_tree.query(0, self.n_samples)
        }
    }

    /// Sets the priority of the `ix`-th slot, counting it as filled.
    pub fn add(&mut self, ix: usize, p: f32) {
        debug_assert!(ix < self.capacity);
        self.update(ix, p);
        if self.n_samples < self.capacity {
            self.n_samples += 1;
        }
    }

    /// Updates the priority of the `ix`-th slot.
    pub fn update(&mut self, ix: usize, p: f32) {
        debug_assert!(ix < self.capacity);
        let p = p.abs() + self.eps;
        self.max_tree.modify(ix, p);
        let p = p.powf(self.alpha);
        let ix = ix + self.capacity - 1;
        let change = p - self.tree[ix];
        self.tree[ix] = p;
        self.propagate(ix, change);
    }

    /// Returns the slot where the cumulative sum of priorities reaches `s`.
    pub fn get(&self, s: f32) -> usize {
        let ix = self.retrieve(0, s);
        debug_assert!(ix >= (self.capacity - 1));
        (ix + 1 - self.capacity).min(self.n_samples.saturating_sub(1))
    }

    /// Draws `batch_size` slots with probability proportional to `priority^alpha`.
    pub fn sample_indices(&self, batch_size: usize, rng: &mut impl Rng) -> Vec<usize> {
        let p_sum = self.total();
        (0..batch_size)
            .map(|_| self.get(p_sum * rng.gen::<f32>()))
            .collect()
    }

    /// Importance weights `(N P(i))^-beta`, normalized by their maximum within the batch.
    pub fn weights(&self, ixs: &[usize], beta: f32) -> Vec<f32> {
        let n = self.n_samples as f32 / self.total();
        let ws = ixs
            .iter()
            .map(|ix| (n * self.tree[ix + self.capacity - 1]).powf(-beta))
            .collect::<Vec<_>>();
        let w_max = ws.iter().copied().fold(f32::MIN_POSITIVE, f32::max);
        ws.iter().map(|w| w / w_max).collect()
    }
}

#[cfg(test)]
mod test {
    use super::SumTree;
    use rand::{rngs::SmallRng, SeedableRng};

    #[test]
    fn test_sum_tree_retrieval() {
        let data = vec![0.5f32, 0.2, 0.8, 0.3, 1.1, 2.5, 3.9];
        let mut sum_tree = SumTree::new(8, 1.0);
        for (ix, p) in data.iter().enumerate() {
            sum_tree.add(ix, *p);
        }

        assert_eq!(sum_tree.get(0.0), 0);
        assert_eq!(sum_tree.get(0.4), 0);
        assert_eq!(sum_tree.get(0.6), 1);
        assert_eq!(sum_tree.get(1.2), 2);
        assert_eq!(sum_tree.get(1.6), 3);
        assert_eq!(sum_tree.get(2.0), 4);
        assert!((sum_tree.max_priority() - 3.9).abs() < 1e-5);

        let mut rng = SmallRng::seed_from_u64(42);
        let ixs = sum_tree.sample_indices(10_000, &mut rng);
        assert!(ixs.iter().all(|&ix| ix < data.len()));
        let n_last = ixs.iter().filter(|&&ix| ix == 6).count();
        let n_second = ixs.iter().filter(|&&ix| ix == 1).count();
        assert!(n_last > n_second);

        let ws = sum_tree.weights(&[1, 6], 1.0);
        assert_eq!(ws[0], 1.0);
        assert!(ws[1] < ws[0]);
    }
}
