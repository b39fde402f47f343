//! Equi-width histogram in two rounds.
//!
//! Round 0 finds the range of the input.  Round 1 counts the items of every
//! bucket.  Bucket counts are not merged through the reduction tree: each
//! partition counts the items of its current chunk locally and adds them to
//! a shared bucket array at every chunk boundary.  NaNs are ignored.

use std::{
    ops::Range,
    sync::{Mutex, PoisonError},
};
use tracing::debug;

use crate::{
    config::HistogramConfig,
    error::Error,
    gla::{FragmentedGla, Gla, IterableGla, RoundContext},
    runtime::Runtime,
};

/// Number of consecutive buckets emitted by one fragment.
pub const BUCKETS_PER_FRAGMENT: usize = 16;

#[derive(Debug)]
pub struct HistogramContext {
    config: HistogramConfig,

    // `(min, max)` of the input, known after round 0.
    range: Option<(f64, f64)>,

    buckets: Mutex<Vec<u64>>,
}

impl HistogramContext {
    pub fn range(&self) -> Option<(f64, f64)> {
        self.range
    }

    fn bucket_width(&self) -> f64 {
        match self.range {
            Some((min, max)) => (max - min) / self.config.bins as f64,
            None => 0.0,
        }
    }

    fn bucket(&self, x: f64) -> usize {
        let Some((min, _)) = self.range else {
            return 0;
        };
        let width = self.bucket_width();
        if width == 0.0 {
            return 0;
        }
        (((x - min) / width) as usize).min(self.config.bins - 1)
    }
}

#[derive(Debug)]
pub struct Histogram {
    extrema: Option<(f64, f64)>,

    // Counts of the current chunk.
    chunk: Vec<u64>,

    // Final counts, cached by `num_fragments`.
    totals: Vec<u64>,
}

impl Gla for Histogram {
    type Item = f64;
    type Params = HistogramContext;

    fn new(ctx: &RoundContext<HistogramContext>, _partition: usize) -> Self {
        let chunk = if ctx.range.is_some() {
            vec![0; ctx.config.bins]
        } else {
            Vec::new()
        };
        Self {
            extrema: None,
            chunk,
            totals: Vec::new(),
        }
    }

    fn add_item(&mut self, ctx: &RoundContext<HistogramContext>, &x: &f64) {
        if x.is_nan() {
            return;
        }
        if ctx.round() == 0 {
            self.extrema = Some(match self.extrema {
                Some((min, max)) => (min.min(x), max.max(x)),
                None => (x, x),
            });
        } else {
            self.chunk[ctx.bucket(x)] += 1;
        }
    }

    fn add_state(&mut self, _ctx: &RoundContext<HistogramContext>, other: Self) {
        self.extrema = match (self.extrema, other.extrema) {
            (Some((min1, max1)), Some((min2, max2))) => Some((min1.min(min2), max1.max(max2))),
            (extrema, None) | (None, extrema) => extrema,
        };
    }

    fn chunk_boundary(&mut self, ctx: &RoundContext<HistogramContext>) {
        if self.chunk.iter().all(|count| *count == 0) {
            return;
        }
        let mut buckets = ctx.buckets.lock().unwrap_or_else(PoisonError::into_inner);
        for (total, count) in buckets.iter_mut().zip(self.chunk.iter_mut()) {
            *total += *count;
            *count = 0;
        }
    }
}

impl IterableGla for Histogram {
    fn should_iterate(&mut self, ctx: &mut RoundContext<HistogramContext>) -> bool {
        if ctx.round() > 0 {
            return false;
        }
        let Some(range) = self.extrema else {
            debug!("histogram: empty input");
            return false;
        };

        let params = ctx.params_mut();
        debug!("histogram: range [{}, {}]", range.0, range.1);
        params.range = Some(range);
        params.buckets = Mutex::new(vec![0; params.config.bins]);
        true
    }

    fn phase(params: &HistogramContext) -> Option<&'static str> {
        Some(if params.range.is_none() {
            "extrema"
        } else {
            "count"
        })
    }

    fn max_rounds(_params: &HistogramContext) -> usize {
        2
    }
}

impl FragmentedGla for Histogram {
    /// `(lower, upper, count)`.
    type Row = (f64, f64, u64);
    type Cursor<'a>
        = BucketCursor<'a>
    where
        Self: 'a;

    fn num_fragments(&mut self, ctx: &RoundContext<HistogramContext>) -> usize {
        if ctx.range.is_none() {
            self.totals.clear();
            return 0;
        }
        self.totals = ctx
            .buckets
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        self.totals.len().div_ceil(BUCKETS_PER_FRAGMENT)
    }

    fn finalize<'a>(&'a self, ctx: &'a RoundContext<HistogramContext>, fragment: usize) -> BucketCursor<'a> {
        let first = fragment * BUCKETS_PER_FRAGMENT;
        let end = (first + BUCKETS_PER_FRAGMENT).min(self.totals.len());
        BucketCursor {
            totals: &self.totals,
            lower: ctx.range.map_or(0.0, |(min, _)| min),
            width: ctx.bucket_width(),
            buckets: first..end,
        }
    }
}

/// Emits the buckets of one fragment.
#[derive(Debug)]
pub struct BucketCursor<'a> {
    totals: &'a [u64],
    lower: f64,
    width: f64,
    buckets: Range<usize>,
}

impl Iterator for BucketCursor<'_> {
    type Item = (f64, f64, u64);

    fn next(&mut self) -> Option<Self::Item> {
        let bucket = self.buckets.next()?;
        let lower = self.lower + bucket as f64 * self.width;
        Some((lower, lower + self.width, self.totals[bucket]))
    }
}

pub fn context(config: HistogramConfig) -> Result<RoundContext<HistogramContext>, Error> {
    config.validate()?;
    Ok(RoundContext::new(HistogramContext {
        config,
        range: None,
        buckets: Mutex::new(Vec::new()),
    }))
}

/// Builds a histogram of `partitions` and returns its buckets in order.
pub fn run<P>(runtime: &Runtime, config: HistogramConfig, partitions: &[P]) -> Result<Vec<(f64, f64, u64)>, Error>
where
    P: AsRef<[f64]> + Sync,
{
    let mut finished = runtime.run_iterable::<Histogram, _>(context(config)?, partitions)?;
    let fragments = runtime.collect_fragments(&mut finished)?;
    Ok(fragments.into_iter().flatten().collect())
}
