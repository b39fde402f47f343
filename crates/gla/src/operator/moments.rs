//! Per-dimension count, mean, variance and extrema in a single pass.

use serde::Serialize;

use crate::{
    config::MomentsConfig,
    error::Error,
    gla::{Gla, RoundContext, SingleResult},
    runtime::Runtime,
};

/// Additive sufficient statistics.
#[derive(Clone, Debug, PartialEq)]
pub struct Moments {
    count: u64,
    sum: Vec<f64>,
    sum_of_squares: Vec<f64>,
    min: Vec<f64>,
    max: Vec<f64>,

    // Dimension of the first rejected item.
    mismatch: Option<usize>,
}

/// Summary statistics of a non-empty input.  Variances are population
/// variances.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct MomentsSummary {
    pub count: u64,
    pub mean: Vec<f64>,
    pub variance: Vec<f64>,
    pub min: Vec<f64>,
    pub max: Vec<f64>,
}

impl Moments {
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            count: 0,
            sum: vec![0.0; dimension],
            sum_of_squares: vec![0.0; dimension],
            min: vec![f64::INFINITY; dimension],
            max: vec![f64::NEG_INFINITY; dimension],
            mismatch: None,
        }
    }

    pub fn dimension(&self) -> usize {
        self.sum.len()
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn sum(&self) -> &[f64] {
        &self.sum
    }

    pub fn sum_of_squares(&self) -> &[f64] {
        &self.sum_of_squares
    }

    /// Adds one item.  An item of the wrong dimension leaves the statistics
    /// unchanged.
    pub fn insert(&mut self, values: &[f64]) -> Result<(), Error> {
        if values.len() != self.dimension() {
            return Err(Error::Dimension {
                expected: self.dimension(),
                actual: values.len(),
            });
        }

        self.count += 1;
        for (i, x) in values.iter().enumerate() {
            self.sum[i] += x;
            self.sum_of_squares[i] += x * x;
            self.min[i] = self.min[i].min(*x);
            self.max[i] = self.max[i].max(*x);
        }
        Ok(())
    }

    /// Dimension of the first item [`Gla::add_item`] skipped, if any.
    pub fn mismatch(&self) -> Option<usize> {
        self.mismatch
    }

    pub fn merge(&mut self, other: &Self) {
        self.count += other.count;
        self.mismatch = self.mismatch.or(other.mismatch);
        for i in 0..self.sum.len() {
            self.sum[i] += other.sum[i];
            self.sum_of_squares[i] += other.sum_of_squares[i];
            self.min[i] = self.min[i].min(other.min[i]);
            self.max[i] = self.max[i].max(other.max[i]);
        }
    }

    /// `None` for an empty input.
    pub fn summary(&self) -> Option<MomentsSummary> {
        if self.count == 0 {
            return None;
        }

        let n = self.count as f64;
        let mean: Vec<f64> = self.sum.iter().map(|sum| sum / n).collect();
        let variance = self
            .sum_of_squares
            .iter()
            .zip(&mean)
            // Rounding can make the difference slightly negative.
            .map(|(squares, mean)| (squares / n - mean * mean).max(0.0))
            .collect();

        Some(MomentsSummary {
            count: self.count,
            mean,
            variance,
            min: self.min.clone(),
            max: self.max.clone(),
        })
    }
}

impl Gla for Moments {
    type Item = Vec<f64>;
    type Params = MomentsConfig;

    fn new(ctx: &RoundContext<MomentsConfig>, _partition: usize) -> Self {
        Self::with_dimension(ctx.dimension)
    }

    fn add_item(&mut self, _ctx: &RoundContext<MomentsConfig>, item: &Vec<f64>) {
        if self.insert(item).is_err() {
            self.mismatch.get_or_insert(item.len());
        }
    }

    fn add_state(&mut self, _ctx: &RoundContext<MomentsConfig>, other: Self) {
        self.merge(&other);
    }
}

impl SingleResult for Moments {
    type Output = Option<MomentsSummary>;

    fn result(&self, _ctx: &RoundContext<MomentsConfig>) -> Option<MomentsSummary> {
        self.summary()
    }
}

pub fn context(config: MomentsConfig) -> Result<RoundContext<MomentsConfig>, Error> {
    config.validate()?;
    Ok(RoundContext::new(config))
}

/// Fails with [`Error::Dimension`] if any item does not have
/// `config.dimension` coordinates.
pub fn run<P>(runtime: &Runtime, config: MomentsConfig, partitions: &[P]) -> Result<Option<MomentsSummary>, Error>
where
    P: AsRef<[Vec<f64>]> + Sync,
{
    let finished = runtime.run_once::<Moments, _>(context(config)?, partitions)?;
    if let Some(actual) = finished.state.mismatch() {
        return Err(Error::Dimension {
            expected: finished.state.dimension(),
            actual,
        });
    }
    Ok(finished.result())
}
