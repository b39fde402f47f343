//! Lloyd's k-means clustering over fixed-dimension points.
//!
//! Unless explicit initial centers are configured, the first round only
//! draws `clusters` points with a reservoir sample and uses them as the
//! initial centers.  Every following round assigns each point to its nearest
//! center, accumulates per-cluster sums and the total squared distance, and
//! moves each center to the mean of its points.  A cluster that received no
//! point keeps its previous center.  Iteration stops once no center
//! coordinate moved by more than `epsilon` or after `max_rounds` rounds.
//! A point whose dimension differs from the configured one stops the
//! computation after the round that saw it.

use serde::Serialize;
use tracing::{debug, warn};

use super::reservoir::Reservoir;
use crate::{
    config::{KMeansConfig, ReservoirConfig},
    error::Error,
    gla::{Gla, IterableGla, RoundContext, SingleResult},
    runtime::Runtime,
};

/// A point.
pub type Point = Vec<f64>;

#[derive(Debug)]
pub struct KMeansContext {
    config: KMeansConfig,

    // Current centers; empty until initialized.
    centers: Vec<Point>,

    // Sum of squared distances of every assignment round, in order.
    objective_history: Vec<f64>,

    converged: bool,

    // Dimension of a rejected point.
    mismatch: Option<usize>,
}

impl KMeansContext {
    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }

    pub fn centers(&self) -> &[Point] {
        &self.centers
    }

    pub fn objective_history(&self) -> &[f64] {
        &self.objective_history
    }

    /// Dimension of a point that did not match the configured dimension, if
    /// any was seen.
    pub fn mismatch(&self) -> Option<usize> {
        self.mismatch
    }

    fn bootstrapping(&self) -> bool {
        self.centers.is_empty()
    }

    fn nearest(&self, point: &[f64]) -> (usize, f64) {
        self.centers
            .iter()
            .map(|center| squared_distance(center, point))
            .enumerate()
            .fold((0, f64::INFINITY), |best, candidate| {
                if candidate.1 < best.1 {
                    candidate
                } else {
                    best
                }
            })
    }
}

pub fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(a, b)| (a - b) * (a - b)).sum()
}

/// Per-partition state.
#[derive(Debug)]
pub struct KMeans {
    // Only present in the bootstrap round.
    sample: Option<Reservoir<Point>>,

    // Per-cluster coordinate sums, `clusters * dimension` entries.
    sums: Vec<f64>,
    counts: Vec<u64>,
    objective: f64,
    mismatch: Option<usize>,
}

impl Gla for KMeans {
    type Item = Point;
    type Params = KMeansContext;

    fn new(ctx: &RoundContext<KMeansContext>, partition: usize) -> Self {
        let config = &ctx.config;
        if ctx.bootstrapping() {
            let sample_config = ReservoirConfig {
                seed: config.seed,
                ..ReservoirConfig::new(config.clusters)
            };
            Self {
                sample: Some(Reservoir::new(&sample_config, partition as u64)),
                sums: Vec::new(),
                counts: Vec::new(),
                objective: 0.0,
                mismatch: None,
            }
        } else {
            Self {
                sample: None,
                sums: vec![0.0; config.clusters * config.dimension],
                counts: vec![0; config.clusters],
                objective: 0.0,
                mismatch: None,
            }
        }
    }

    fn add_item(&mut self, ctx: &RoundContext<KMeansContext>, point: &Point) {
        if point.len() != ctx.config.dimension {
            self.mismatch.get_or_insert(point.len());
            return;
        }

        if let Some(sample) = &mut self.sample {
            sample.insert_ref(point);
            return;
        }

        let (cluster, distance) = ctx.nearest(point);
        let dimension = ctx.config.dimension;
        for (sum, x) in self.sums[cluster * dimension..(cluster + 1) * dimension]
            .iter_mut()
            .zip(point)
        {
            *sum += x;
        }
        self.counts[cluster] += 1;
        self.objective += distance;
    }

    fn add_state(&mut self, _ctx: &RoundContext<KMeansContext>, other: Self) {
        if let (Some(sample), Some(other)) = (&mut self.sample, other.sample) {
            sample.merge(other);
        }
        for (sum, other) in self.sums.iter_mut().zip(other.sums) {
            *sum += other;
        }
        for (count, other) in self.counts.iter_mut().zip(other.counts) {
            *count += other;
        }
        self.objective += other.objective;
        self.mismatch = self.mismatch.or(other.mismatch);
    }
}

impl IterableGla for KMeans {
    fn should_iterate(&mut self, ctx: &mut RoundContext<KMeansContext>) -> bool {
        let params = ctx.params_mut();
        let clusters = params.config.clusters;
        let dimension = params.config.dimension;

        if let Some(actual) = self.mismatch {
            warn!("k-means: expected points of dimension {dimension}, got {actual}");
            params.mismatch = Some(actual);
            return false;
        }

        if let Some(sample) = self.sample.take() {
            if sample.is_empty() {
                debug!("k-means: no input points");
                return false;
            }
            // With fewer points than clusters, some centers coincide.
            params.centers = sample.items().iter().cycle().take(clusters).cloned().collect();
            debug!("k-means: initial centers drawn from {} points", sample.count());
            return true;
        }

        let centers: Vec<Point> = params
            .centers
            .iter()
            .enumerate()
            .map(|(cluster, old)| match self.counts[cluster] {
                0 => old.clone(),
                count => self.sums[cluster * dimension..(cluster + 1) * dimension]
                    .iter()
                    .map(|sum| sum / count as f64)
                    .collect(),
            })
            .collect();

        let old = params.centers.concat();
        let new = centers.concat();
        params.converged = params
            .config
            .convergence
            .has_converged(params.config.epsilon, &old, &new);
        params.objective_history.push(self.objective);
        params.centers = centers;

        debug!(
            "k-means: round {} objective {}, converged: {}",
            params.objective_history.len(),
            self.objective,
            params.converged
        );
        !params.converged
    }

    fn max_rounds(params: &KMeansContext) -> usize {
        params.config.max_rounds
    }
}

/// The fitted model.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct KMeansModel {
    pub centers: Vec<Point>,

    /// Objective of every assignment round.  The last entry was computed
    /// against the centers preceding `centers`.
    pub objective_history: Vec<f64>,

    pub converged: bool,
}

impl SingleResult for KMeans {
    type Output = KMeansModel;

    fn result(&self, ctx: &RoundContext<KMeansContext>) -> KMeansModel {
        KMeansModel {
            centers: ctx.centers.clone(),
            objective_history: ctx.objective_history.clone(),
            converged: ctx.converged,
        }
    }
}

pub fn context(config: KMeansConfig) -> Result<RoundContext<KMeansContext>, Error> {
    config.validate()?;
    let centers = config.centers.clone().unwrap_or_default();
    Ok(RoundContext::new(KMeansContext {
        config,
        centers,
        objective_history: Vec::new(),
        converged: false,
        mismatch: None,
    }))
}

/// Clusters the points in `partitions`.  Fails with [`Error::Dimension`] if
/// any point does not have `config.dimension` coordinates.
pub fn run<P>(runtime: &Runtime, config: KMeansConfig, partitions: &[P]) -> Result<KMeansModel, Error>
where
    P: AsRef<[Point]> + Sync,
{
    let finished = runtime.run_iterable::<KMeans, _>(context(config)?, partitions)?;
    if let Some(actual) = finished.context.mismatch {
        return Err(Error::Dimension {
            expected: finished.context.config.dimension,
            actual,
        });
    }
    Ok(finished.result())
}

#[cfg(test)]
mod test {
    use super::{context, run, squared_distance, KMeans};
    use crate::{
        config::KMeansConfig, convergence::ConvergenceMode, error::Error, gla::Termination,
        Runtime,
    };

    fn points(values: &[f64]) -> Vec<Vec<f64>> {
        values.iter().map(|v| vec![*v]).collect()
    }

    #[test]
    fn distance() {
        assert_eq!(squared_distance(&[0.0, 0.0], &[3.0, 4.0]), 25.0);
    }

    #[test]
    fn explicit_centers() {
        let runtime = Runtime::with_workers(2).unwrap();
        let partitions = vec![points(&[0.0, 1.0, 2.0]), points(&[10.0, 11.0, 12.0])];
        let config = KMeansConfig {
            centers: Some(vec![vec![0.0], vec![5.0]]),
            ..KMeansConfig::new(2, 1)
        };

        let model = run(&runtime, config, &partitions).unwrap();
        assert!(model.converged);
        assert_eq!(model.centers, vec![vec![1.0], vec![11.0]]);
        // 0 + 1 + 4 for the first cluster, 25 + 36 + 49 for the second;
        // then 2 + 2 once the centers settled.
        assert_eq!(model.objective_history, vec![115.0, 4.0]);
    }

    #[test]
    fn empty_cluster_keeps_center() {
        let runtime = Runtime::with_workers(2).unwrap();
        let partitions = vec![points(&[1.0, 2.0, 3.0])];
        let config = KMeansConfig {
            centers: Some(vec![vec![2.0], vec![100.0]]),
            ..KMeansConfig::new(2, 1)
        };
        let model = run(&runtime, config, &partitions).unwrap();
        assert_eq!(model.centers, vec![vec![2.0], vec![100.0]]);
        assert_eq!(model.objective_history.len(), 1);
    }

    #[test]
    fn bootstrap_from_sample() {
        let runtime = Runtime::with_workers(2).unwrap();
        let partitions = vec![points(&[-5.0, -4.0, -6.0]), points(&[5.0, 4.0, 6.0])];
        let config = KMeansConfig {
            seed: Some(3),
            ..KMeansConfig::new(2, 1)
        };

        let finished = runtime
            .run_iterable::<KMeans, _>(context(config).unwrap(), &partitions)
            .unwrap();
        let model = finished.result();
        assert!(model.converged);
        assert_eq!(model.centers.len(), 2);
        // One bootstrap round plus the assignment rounds.
        assert_eq!(finished.rounds, model.objective_history.len() + 1);
    }

    #[test]
    fn fewer_points_than_clusters() {
        let runtime = Runtime::with_workers(1).unwrap();
        let partitions = vec![points(&[7.0])];
        let model = run(&runtime, KMeansConfig::new(3, 1), &partitions).unwrap();
        assert_eq!(model.centers, vec![vec![7.0]; 3]);
    }

    #[test]
    fn empty_input() {
        let runtime = Runtime::with_workers(1).unwrap();
        let partitions: Vec<Vec<Vec<f64>>> = vec![vec![]];
        let model = run(&runtime, KMeansConfig::new(3, 1), &partitions).unwrap();
        assert!(model.centers.is_empty());
        assert!(!model.converged);
    }

    #[test]
    fn relative_convergence_round_cap() {
        let runtime = Runtime::with_workers(1).unwrap();
        // A center sitting at zero never counts as converged in relative
        // mode, so the round cap ends the computation.
        let partitions = vec![points(&[-1.0, 1.0])];
        let config = KMeansConfig {
            centers: Some(vec![vec![0.0]]),
            convergence: ConvergenceMode::Relative,
            epsilon: 0.5,
            max_rounds: 4,
            ..KMeansConfig::new(1, 1)
        };
        let finished = runtime
            .run_iterable::<KMeans, _>(context(config).unwrap(), &partitions)
            .unwrap();
        assert_eq!(finished.termination, Termination::RoundCap);
        assert_eq!(finished.rounds, 4);
        assert_eq!(finished.result().centers, vec![vec![0.0]]);
    }

    #[test]
    fn wrong_dimension_stops_bootstrap() {
        let runtime = Runtime::with_workers(2).unwrap();
        let partitions = vec![vec![vec![0.0, 0.0], vec![1.0, 1.0]], vec![vec![2.0]]];
        let finished = runtime
            .run_iterable::<KMeans, _>(context(KMeansConfig::new(2, 2)).unwrap(), &partitions)
            .unwrap();
        assert_eq!(finished.rounds, 1);
        assert_eq!(finished.context.mismatch(), Some(1));
        assert!(finished.context.centers().is_empty());

        assert_eq!(
            run(&runtime, KMeansConfig::new(2, 2), &partitions),
            Err(Error::Dimension {
                expected: 2,
                actual: 1
            })
        );
    }

    #[test]
    fn wrong_dimension_stops_assignment() {
        let runtime = Runtime::with_workers(1).unwrap();
        let partitions = vec![vec![vec![0.0], vec![4.0, 4.0], vec![10.0]]];
        let config = KMeansConfig {
            centers: Some(vec![vec![0.0], vec![10.0]]),
            ..KMeansConfig::new(2, 1)
        };
        let finished = runtime
            .run_iterable::<KMeans, _>(context(config.clone()).unwrap(), &partitions)
            .unwrap();
        assert_eq!(finished.rounds, 1);
        assert_eq!(finished.context.mismatch(), Some(2));
        assert!(finished.context.objective_history().is_empty());

        assert_eq!(
            run(&runtime, config, &partitions),
            Err(Error::Dimension {
                expected: 1,
                actual: 2
            })
        );
    }
}
