//! Weighted selection policies.
//!
//! Both selectors work on indices into a caller-owned, ordered list of weights, so the caller
//! keeps ownership of the weighted items.

use rand::{
    distributions::{Distribution, WeightedIndex},
    Rng,
};

use crate::{Error, Result};

/// Deterministic cyclic selection.
///
/// An item with weight `w` is dispensed `w` times in a row before moving on to the next one. A
/// full cycle is as long as the sum of weights, and then starts over from the first item.
#[derive(Debug, Clone)]
pub struct RoundRobin {
    weights: Vec<u32>,
    /// Item dispensed next.
    current: usize,
    /// How many times `current` has been dispensed in this cycle.
    dispensed: u32,
}

impl RoundRobin {
    pub fn new(weights: Vec<u32>) -> Result<RoundRobin> {
        if weights.is_empty() {
            return Err(Error::EmptySelection);
        }
        if weights.contains(&0) {
            return Err(Error::WeightNotPositive);
        }
        Ok(RoundRobin {
            weights,
            current: 0,
            dispensed: 0,
        })
    }

    /// Index of the next item. Advances the cycle by one.
    pub fn next_index(&mut self) -> usize {
        if self.dispensed == self.weights[self.current] {
            self.dispensed = 0;
            self.current = (self.current + 1) % self.weights.len();
        }
        self.dispensed += 1;
        self.current
    }

    /// Length of a full cycle.
    pub fn cycle_len(&self) -> u64 {
        self.weights.iter().map(|w| u64::from(*w)).sum()
    }
}

/// Stateless selection with probability proportional to weight.
///
/// Weights are summed in 64 bits, so any number of `u32` weights can be combined.
#[derive(Debug, Clone)]
pub struct WeightedRandom {
    distribution: WeightedIndex<u64>,
}

impl WeightedRandom {
    pub fn new(weights: &[u32]) -> Result<WeightedRandom> {
        if weights.is_empty() {
            return Err(Error::EmptySelection);
        }
        if weights.contains(&0) {
            return Err(Error::WeightNotPositive);
        }
        let distribution = WeightedIndex::new(weights.iter().map(|w| u64::from(*w)))
            .map_err(|_| Error::EmptySelection)?;
        Ok(WeightedRandom { distribution })
    }

    /// Draw one index using `rng`.
    pub fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.distribution.sample(rng)
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::{RoundRobin, WeightedRandom};
    use crate::Error;

    #[test]
    fn round_robin_rejects_empty() {
        assert!(matches!(RoundRobin::new(vec![]), Err(Error::EmptySelection)));
    }

    #[test]
    fn round_robin_rejects_zero_weight() {
        assert!(matches!(
            RoundRobin::new(vec![1, 0]),
            Err(Error::WeightNotPositive)
        ));
    }

    #[test]
    fn round_robin_even_weights() {
        let mut rr = RoundRobin::new(vec![1, 1, 1]).unwrap();
        let picks: Vec<_> = (0..7).map(|_| rr.next_index()).collect();
        assert_eq!(picks, [0, 1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn round_robin_dispenses_weight_times_per_cycle() {
        let weights = vec![3, 1, 2];
        let mut rr = RoundRobin::new(weights.clone()).unwrap();
        assert_eq!(rr.cycle_len(), 6);

        for _cycle in 0..4 {
            let picks: Vec<_> = (0..6).map(|_| rr.next_index()).collect();
            assert_eq!(picks, [0, 0, 0, 1, 2, 2]);
        }
    }

    #[test]
    fn weighted_random_rejects_empty() {
        assert!(matches!(WeightedRandom::new(&[]), Err(Error::EmptySelection)));
    }

    #[test]
    fn weighted_random_rejects_zero_weight() {
        assert!(matches!(
            WeightedRandom::new(&[3, 0]),
            Err(Error::WeightNotPositive)
        ));
    }

    #[test]
    fn weighted_random_handles_large_weights() {
        let selector = WeightedRandom::new(&[3_000_000_000, 3_000_000_000, u32::MAX]).unwrap();
        let mut rng = StdRng::seed_from_u64(9);

        let mut counts = [0usize; 3];
        for _ in 0..3000 {
            counts[selector.pick(&mut rng)] += 1;
        }
        for count in counts {
            assert!(count > 700 && count < 1300, "counts were {counts:?}");
        }
    }

    #[test]
    fn weighted_random_is_reproducible_with_seed() {
        let selector = WeightedRandom::new(&[1, 2, 3]).unwrap();

        let draw = |seed| {
            let mut rng = StdRng::seed_from_u64(seed);
            (0..50).map(|_| selector.pick(&mut rng)).collect::<Vec<_>>()
        };

        assert_eq!(draw(7), draw(7));
    }

    #[test]
    fn weighted_random_follows_weights() {
        let selector = WeightedRandom::new(&[20, 80]).unwrap();
        let mut rng = StdRng::seed_from_u64(42);

        const SIZE: usize = 1000;
        let low = (0..SIZE).filter(|_| selector.pick(&mut rng) == 0).count();
        let ratio = low as f64 / SIZE as f64;
        assert!(ratio > 0.1 && ratio < 0.3, "ratio was {ratio}");
    }

    #[test]
    fn weighted_random_single_item() {
        let selector = WeightedRandom::new(&[5]).unwrap();
        let mut rng = StdRng::seed_from_u64(1);
        assert!((0..10).all(|_| selector.pick(&mut rng) == 0));
    }
}
