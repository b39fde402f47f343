//! Uniform fixed-size sampling over a partitioned stream.
//!
//! Each partition maintains a reservoir with Vitter's skip counting: after
//! the reservoir fills, the number of items to skip before the next
//! replacement is drawn directly instead of flipping a coin per item.  While
//! fewer than `threshold_coefficient * size` items have been seen, the skip
//! is computed by sequential search (Vitter's Algorithm X); above that, by
//! rejection sampling (Algorithm Z), whose cost does not grow with the
//! stream length.
//!
//! Two reservoirs merge into a sample of the union using only each side's
//! sample and item count; see [`Reservoir::merge`].

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::{iter::Cloned, mem, slice};

use crate::{
    config::ReservoirConfig,
    error::Error,
    gla::{FragmentedGla, Gla, RoundContext, SingleResult},
    runtime::Runtime,
};

/// A reservoir of at most `size` items.
#[derive(Clone, Debug)]
pub struct Reservoir<T> {
    size: usize,

    // Number of seen items after which Algorithm Z takes over.
    threshold: f64,

    sample: Vec<T>,

    // Number of items offered to this reservoir, including merged ones.
    count: u64,

    // Number of upcoming items that will not enter the reservoir.
    skip: u64,

    // Algorithm Z's running variate, drawn lazily.
    w: Option<f64>,

    rng: ChaCha8Rng,
}

impl<T> Reservoir<T> {
    /// Creates an empty reservoir.  `stream` selects an independent random
    /// stream when `config` carries a seed.
    pub fn new(config: &ReservoirConfig, stream: u64) -> Self {
        let rng = match config.seed {
            Some(seed) => {
                let mut rng = ChaCha8Rng::seed_from_u64(seed);
                rng.set_stream(stream);
                rng
            }
            None => ChaCha8Rng::from_entropy(),
        };

        Self {
            size: config.size,
            threshold: config.threshold_coefficient * config.size as f64,
            sample: Vec::with_capacity(config.size),
            count: 0,
            skip: 0,
            w: None,
            rng,
        }
    }

    /// Configured sample size.
    pub fn capacity(&self) -> usize {
        self.size
    }

    /// Number of items currently held, `min(count, capacity)`.
    pub fn len(&self) -> usize {
        self.sample.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sample.is_empty()
    }

    /// Number of items this sample represents.
    pub fn count(&self) -> u64 {
        self.count
    }

    /// The sampled items in slot order.
    pub fn items(&self) -> &[T] {
        &self.sample
    }

    pub fn into_items(self) -> Vec<T> {
        self.sample
    }

    /// Returns the item in slot `slot`, or `None` if the reservoir has not
    /// filled that slot yet.  Slots at or beyond the configured size are an
    /// error.
    pub fn get_sample(&self, slot: usize) -> Result<Option<&T>, Error> {
        if slot >= self.size {
            return Err(Error::Capacity {
                index: slot,
                size: self.size,
            });
        }
        Ok(self.sample.get(slot))
    }

    /// Offers one item to the reservoir.
    pub fn insert(&mut self, item: T) {
        self.offer(item, |item| item);
    }

    /// Like [`insert`](Self::insert), but clones `item` only if it is
    /// retained.
    pub fn insert_ref(&mut self, item: &T)
    where
        T: Clone,
    {
        self.offer(item, T::clone);
    }

    fn offer<I>(&mut self, item: I, into_owned: impl FnOnce(I) -> T) {
        self.count += 1;

        if self.sample.len() < self.size {
            self.sample.push(into_owned(item));
            if self.sample.len() == self.size {
                self.skip = self.next_skip();
            }
        } else if self.skip > 0 {
            self.skip -= 1;
        } else {
            let slot = self.rng.gen_range(0..self.size);
            self.sample[slot] = into_owned(item);
            self.skip = self.next_skip();
        }
    }

    /// Folds `other` into `self`, so that the result is a uniform sample of
    /// both streams.
    ///
    /// A side that holds fewer items than the reservoir size holds its whole
    /// stream; its items are replayed through the other side's reservoir.
    /// When both sides are full, slot `i` of the result is taken from `other`
    /// with probability `other.count / (self.count + other.count)`, and kept
    /// otherwise.
    pub fn merge(&mut self, mut other: Self) {
        if other.count == 0 {
            return;
        }
        if self.count == 0 {
            *self = other;
            return;
        }

        let size = self.size as u64;
        if self.count < size && other.count >= size {
            mem::swap(self, &mut other);
        }

        if other.count < size {
            for item in other.sample {
                self.insert(item);
            }
            return;
        }

        let probability = other.count as f64 / (self.count + other.count) as f64;
        for (slot, item) in self.sample.iter_mut().zip(other.sample) {
            if self.rng.gen::<f64>() < probability {
                *slot = item;
            }
        }
        self.count += other.count;
        self.w = None;
        self.skip = self.next_skip();
    }

    // A uniform variate in (0, 1].
    fn uniform(&mut self) -> f64 {
        1.0 - self.rng.gen::<f64>()
    }

    fn next_skip(&mut self) -> u64 {
        if (self.count as f64) < self.threshold {
            self.skip_sequential()
        } else {
            self.skip_rejection()
        }
    }

    // Algorithm X: find the smallest skip `s` for which the probability of
    // skipping more than `s` items drops below a uniform variate.
    fn skip_sequential(&mut self) -> u64 {
        let n = self.size as f64;
        let v = self.uniform();

        let mut skip = 0;
        let mut t = self.count as f64 + 1.0;
        let mut quot = (t - n) / t;
        while quot > v {
            skip += 1;
            t += 1.0;
            quot *= (t - n) / t;
        }
        skip
    }

    // Algorithm Z: draw a candidate skip from a continuous approximation and
    // accept or reject it against the exact distribution.
    fn skip_rejection(&mut self) -> u64 {
        let n = self.size as f64;
        let t = self.count as f64;
        let term = t - n + 1.0;

        let mut w = match self.w {
            Some(w) => w,
            None => self.draw_w(),
        };

        let skip = loop {
            let u = self.uniform();
            let x = t * (w - 1.0);
            let s = x.floor();

            // Cheap test against a squeeze function.
            let lhs = ((((u * ((t + 1.0) / term).powi(2)) * (term + s)) / (t + x)).ln() / n).exp();
            let rhs = (((t + x) / (term + s)) * term) / t;
            if lhs <= rhs {
                w = rhs / lhs;
                break s;
            }

            // Exact test.
            let mut y = (((u * (t + 1.0)) / term) * (t + s + 1.0)) / (t + x);
            let (mut denom, numer_lim) = if n < s {
                (t, term + s)
            } else {
                (t - n + s, t + 1.0)
            };
            let mut numer = t + s;
            while numer >= numer_lim {
                y = (y * numer) / denom;
                denom -= 1.0;
                numer -= 1.0;
            }

            w = self.draw_w();
            if (y.ln() / n).exp() <= (t + x) / t {
                break s;
            }
        };

        self.w = Some(w);
        skip as u64
    }

    fn draw_w(&mut self) -> f64 {
        (-self.uniform().ln() / self.size as f64).exp()
    }
}

/// A [`Reservoir`] as a single-round aggregate.
///
/// The result is the sample in slot order, emitted as a single fragment, or
/// as no fragment at all when the input was empty.
#[derive(Clone, Debug)]
pub struct ReservoirSample<T> {
    reservoir: Reservoir<T>,
}

impl<T> ReservoirSample<T> {
    pub fn reservoir(&self) -> &Reservoir<T> {
        &self.reservoir
    }

    pub fn into_reservoir(self) -> Reservoir<T> {
        self.reservoir
    }
}

impl<T> Gla for ReservoirSample<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Item = T;
    type Params = ReservoirConfig;

    fn new(ctx: &RoundContext<ReservoirConfig>, partition: usize) -> Self {
        Self {
            reservoir: Reservoir::new(ctx, partition as u64),
        }
    }

    fn add_item(&mut self, _ctx: &RoundContext<ReservoirConfig>, item: &T) {
        self.reservoir.insert_ref(item);
    }

    fn add_state(&mut self, _ctx: &RoundContext<ReservoirConfig>, other: Self) {
        self.reservoir.merge(other.reservoir);
    }
}

impl<T> SingleResult for ReservoirSample<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Output = Vec<T>;

    fn result(&self, _ctx: &RoundContext<ReservoirConfig>) -> Vec<T> {
        self.reservoir.items().to_vec()
    }
}

impl<T> FragmentedGla for ReservoirSample<T>
where
    T: Clone + Send + Sync + 'static,
{
    type Row = T;
    type Cursor<'a>
        = Cloned<slice::Iter<'a, T>>
    where
        Self: 'a;

    fn num_fragments(&mut self, _ctx: &RoundContext<ReservoirConfig>) -> usize {
        usize::from(!self.reservoir.is_empty())
    }

    fn finalize<'a>(
        &'a self,
        _ctx: &'a RoundContext<ReservoirConfig>,
        _fragment: usize,
    ) -> Self::Cursor<'a> {
        self.reservoir.items().iter().cloned()
    }
}

/// Validates `config` and wraps it in a round context.
pub fn context(config: ReservoirConfig) -> Result<RoundContext<ReservoirConfig>, Error> {
    config.validate()?;
    Ok(RoundContext::new(config))
}

/// Samples `config.size` items uniformly from all partitions.
pub fn run<T, P>(runtime: &Runtime, config: ReservoirConfig, partitions: &[P]) -> Result<Vec<T>, Error>
where
    T: Clone + Send + Sync + 'static,
    P: AsRef<[T]> + Sync,
{
    let finished = runtime.run_once::<ReservoirSample<T>, _>(context(config)?, partitions)?;
    Ok(finished.state.into_reservoir().into_items())
}

#[cfg(test)]
mod test {
    use super::Reservoir;
    use crate::{config::ReservoirConfig, error::Error};
    use proptest::prelude::*;

    fn seeded(size: usize, seed: u64) -> Reservoir<u64> {
        Reservoir::new(&ReservoirConfig::new(size).with_seed(seed), 0)
    }

    #[test]
    fn fills_before_sampling() {
        let mut reservoir = seeded(5, 1);
        for item in 0..3 {
            reservoir.insert(item);
        }
        assert_eq!(reservoir.items(), &[0, 1, 2]);
        assert_eq!(reservoir.count(), 3);
        assert_eq!(reservoir.len(), 3);

        for item in 3..1000 {
            reservoir.insert(item);
        }
        assert_eq!(reservoir.len(), 5);
        assert_eq!(reservoir.count(), 1000);
    }

    #[test]
    fn capacity_error() {
        let mut reservoir = seeded(3, 1);
        reservoir.insert(10);
        assert_eq!(reservoir.get_sample(0).unwrap(), Some(&10));
        assert_eq!(reservoir.get_sample(2).unwrap(), None);
        assert_eq!(
            reservoir.get_sample(3).unwrap_err(),
            Error::Capacity { index: 3, size: 3 }
        );
    }

    #[test]
    fn merge_with_empty() {
        let mut left = seeded(3, 1);
        left.merge(seeded(3, 2));
        assert_eq!(left.count(), 0);

        let mut right = seeded(3, 2);
        right.insert(7);
        left.merge(right);
        assert_eq!(left.items(), &[7]);
        assert_eq!(left.count(), 1);
    }

    #[test]
    fn merge_replays_partial_sample() {
        // Neither side is full: the union fits and is kept entirely.
        let mut left = seeded(10, 1);
        let mut right = seeded(10, 2);
        (0..4).for_each(|i| left.insert(i));
        (4..9).for_each(|i| right.insert(i));
        left.merge(right);

        let mut items = left.items().to_vec();
        items.sort();
        assert_eq!(items, (0..9).collect::<Vec<_>>());
        assert_eq!(left.count(), 9);
    }

    #[test]
    fn full_sample_absorbs_partial_one() {
        let mut partial = seeded(3, 1);
        partial.insert(100);
        let mut full = seeded(3, 2);
        (0..50).for_each(|i| full.insert(i));

        // The partial side is on the left: the sides are swapped.
        partial.merge(full);
        assert_eq!(partial.count(), 51);
        assert_eq!(partial.len(), 3);
    }

    #[test]
    fn long_stream_uses_rejection_sampling() {
        // 22 * 4 = 88 items switch to Algorithm Z; make sure it keeps
        // producing valid samples far beyond that point.
        let mut reservoir = seeded(4, 7);
        for item in 0..100_000 {
            reservoir.insert(item);
        }
        assert_eq!(reservoir.len(), 4);
        assert!(reservoir.w.is_some());
        let mut items = reservoir.items().to_vec();
        items.sort();
        items.dedup();
        assert_eq!(items.len(), 4);
    }

    proptest! {
        #[test]
        fn sample_is_subset_of_stream(size in 1usize..20, len in 0u64..2000, seed in any::<u64>()) {
            let mut reservoir = seeded(size, seed);
            for item in 0..len {
                reservoir.insert(item);
            }
            prop_assert_eq!(reservoir.len() as u64, len.min(size as u64));
            let mut items = reservoir.items().to_vec();
            items.sort();
            items.dedup();
            prop_assert_eq!(items.len(), reservoir.len());
            prop_assert!(items.iter().all(|item| *item < len));
        }
    }
}
