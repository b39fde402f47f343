//! The aggregates built on the contract in [`crate::gla`].
//!
//! Every operator module exposes a `context` function that validates the
//! operator's configuration and builds its initial [`RoundContext`], and a
//! `run` function that drives the operator to completion on a [`Runtime`].
//!
//! [`RoundContext`]: crate::RoundContext
//! [`Runtime`]: crate::Runtime

pub mod components;
pub mod correlation;
pub mod graph;
pub mod group_by;
pub mod histogram;
pub mod kmeans;
pub mod moments;
pub mod reservoir;
pub mod scc;

pub use components::ConnectedComponents;
pub use correlation::Correlation;
pub use graph::{Edge, VertexFlags, VertexId, VertexLabels};
pub use group_by::GroupBy;
pub use histogram::Histogram;
pub use kmeans::{KMeans, KMeansModel};
pub use moments::{Moments, MomentsSummary};
pub use reservoir::{Reservoir, ReservoirSample};
pub use scc::{SccPhase, StronglyConnectedComponents};
