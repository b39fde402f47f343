//! Iterative, mergeable, fragment-parallel aggregation.
//!
//! This crate implements a family of aggregation operators that share one
//! contract (see [`gla`]): per-partition states accumulate items in
//! parallel, merge pairwise into a single state, optionally iterate over
//! the input again with updated parameters, and finally emit their result
//! either as one value or as fragments that can be produced in parallel.
//!
//! The [`Runtime`] drives that contract on a pool of worker threads, and
//! the [`operator`] module contains the operators themselves: reservoir
//! sampling, connected components, strongly connected components, k-means,
//! moments, histograms, grouped aggregation and, through the irregular
//! task scheduler in [`gist`], a blocked correlation matrix.
//!
//! ```
//! use feldera_gla::{operator::components, GraphConfig, Runtime};
//!
//! let runtime = Runtime::with_workers(2).unwrap();
//! let edges = vec![vec![(0, 1), (1, 2)], vec![(4, 3)]];
//! let labels = components::run(&runtime, GraphConfig::default(), &edges).unwrap();
//! assert_eq!(labels, vec![(0, 0), (1, 0), (2, 0), (3, 3), (4, 3)]);
//! ```

pub mod config;
pub mod convergence;
pub mod error;
pub mod gist;
pub mod gla;
pub mod operator;
pub mod runtime;

pub use config::{
    CorrelationConfig, GraphConfig, HistogramConfig, KMeansConfig, MomentsConfig,
    ReservoirConfig, RuntimeConfig,
};
pub use convergence::ConvergenceMode;
pub use error::{ConfigError, DetailedError, Error};
pub use gist::{Gist, GistRun, LocalScheduler, QueueScheduler};
pub use gla::{
    Finished, FragmentedGla, Fragments, Gla, IterableGla, RoundContext, SingleResult,
    Termination,
};
pub use runtime::Runtime;
