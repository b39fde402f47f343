//! Strongly connected components of a directed graph.
//!
//! The computation runs in supersteps over the set of *active* vertices,
//! each made of three phases, every phase taking one or more rounds:
//!
//! * **Trimming**: a vertex with no active predecessor or no active
//!   successor is a singleton component and is deactivated.
//! * **Forward**: labels, reset to vertex ids at the start of the superstep,
//!   are propagated along edge direction until every active vertex holds the
//!   smallest id among the active vertices that reach it.  Vertices whose
//!   label is still their own id are the roots.
//! * **Backward**: starting from the roots, vertices are deactivated along
//!   reverse edges as long as the label does not change.  Every vertex
//!   deactivated this way belongs to the component of the root whose id it
//!   carries, which is also the smallest id of that component.
//!
//! Vertices that survive the backward phase start the next superstep.  The
//! computation ends when no active vertex is left.

use std::fmt::{self, Display, Formatter};
use tracing::{debug, warn};

use super::graph::{self, Edge, LabelCursor, VertexFlags, VertexId, VertexLabels};
use crate::{
    config::GraphConfig,
    error::Error,
    gla::{FragmentedGla, Gla, IterableGla, RoundContext, SingleResult},
    runtime::Runtime,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SccPhase {
    Initialize,
    Trimming,
    Forward,
    Backward,
}

impl SccPhase {
    pub fn name(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Trimming => "trimming",
            Self::Forward => "forward",
            Self::Backward => "backward",
        }
    }
}

impl Display for SccPhase {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug)]
pub struct SccContext {
    config: GraphConfig,
    phase: SccPhase,
    supersteps: usize,
    num_vertices: usize,
    labels: VertexLabels,
    active: VertexFlags,
    has_predecessor: VertexFlags,
    has_successor: VertexFlags,
    overflow: Option<VertexId>,
}

impl SccContext {
    pub fn phase(&self) -> SccPhase {
        self.phase
    }

    /// Number of completed trim-forward-backward cycles.
    pub fn supersteps(&self) -> usize {
        self.supersteps
    }

    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    /// The largest vertex id, if it was too large to size the vertex arrays.
    pub fn overflow(&self) -> Option<VertexId> {
        self.overflow
    }

    // Sizes the vertex arrays for ids up to `max_vertex`.  Returns `false`
    // if they cannot be allocated.
    fn allocate(&mut self, max_vertex: VertexId) -> bool {
        let Some(num_vertices) = graph::vertex_count(max_vertex) else {
            return false;
        };
        let arrays = VertexLabels::identity(num_vertices).and_then(|labels| {
            Some((
                labels,
                VertexFlags::new(num_vertices, true)?,
                VertexFlags::new(num_vertices, false)?,
                VertexFlags::new(num_vertices, false)?,
            ))
        });
        let Some((labels, active, has_predecessor, has_successor)) = arrays else {
            return false;
        };
        self.num_vertices = num_vertices;
        self.labels = labels;
        self.active = active;
        self.has_predecessor = has_predecessor;
        self.has_successor = has_successor;
        true
    }

    pub fn labels(&self) -> &VertexLabels {
        &self.labels
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    fn both_active(&self, source: VertexId, target: VertexId) -> bool {
        self.active.get(source) && self.active.get(target)
    }

    // Deactivates the roots found by the forward phase.
    fn deactivate_roots(&mut self) -> usize {
        let roots: Vec<VertexId> = self
            .active
            .iter_set()
            .filter(|vertex| self.labels.get(*vertex) == *vertex)
            .collect();
        for root in &roots {
            self.active.clear(*root);
        }
        roots.len()
    }

    // Deactivates vertices without an active predecessor or successor.
    fn trim(&mut self) -> usize {
        let trimmed: Vec<VertexId> = self
            .active
            .iter_set()
            .filter(|vertex| {
                !self.has_predecessor.get(*vertex) || !self.has_successor.get(*vertex)
            })
            .collect();
        for vertex in &trimmed {
            self.active.clear(*vertex);
        }
        trimmed.len()
    }

    // Prepares the vertices that are still active for another superstep.
    // Returns the number of such vertices.
    fn reset_active(&mut self) -> usize {
        let active: Vec<VertexId> = self.active.iter_set().collect();
        for vertex in &active {
            self.labels.reset(*vertex, *vertex);
            self.has_predecessor.clear(*vertex);
            self.has_successor.clear(*vertex);
        }
        active.len()
    }
}

#[derive(Debug)]
pub struct StronglyConnectedComponents {
    max_vertex: Option<VertexId>,
    finished: bool,
    fragments: usize,
}

impl Gla for StronglyConnectedComponents {
    type Item = Edge;
    type Params = SccContext;

    fn new(_ctx: &RoundContext<SccContext>, _partition: usize) -> Self {
        Self {
            max_vertex: None,
            finished: true,
            fragments: 0,
        }
    }

    fn add_item(&mut self, ctx: &RoundContext<SccContext>, &(source, target): &Edge) {
        match ctx.phase {
            SccPhase::Initialize => {
                self.max_vertex = self.max_vertex.max(Some(source.max(target)));
            }
            SccPhase::Trimming => {
                if ctx.both_active(source, target) {
                    ctx.has_successor.set(source);
                    ctx.has_predecessor.set(target);
                }
            }
            SccPhase::Forward => {
                if ctx.both_active(source, target) {
                    let label = ctx.labels.get(source);
                    if label < ctx.labels.get(target) {
                        self.finished = false;
                        ctx.labels.lower(target, label);
                    }
                }
            }
            SccPhase::Backward => {
                // Inactive vertices carrying an active label can only have
                // been deactivated in this backward phase.
                if !ctx.active.get(target)
                    && ctx.active.get(source)
                    && ctx.labels.get(source) == ctx.labels.get(target)
                    && ctx.active.clear(source)
                {
                    self.finished = false;
                }
            }
        }
    }

    fn add_state(&mut self, _ctx: &RoundContext<SccContext>, other: Self) {
        self.max_vertex = self.max_vertex.max(other.max_vertex);
        self.finished &= other.finished;
    }
}

impl IterableGla for StronglyConnectedComponents {
    fn should_iterate(&mut self, ctx: &mut RoundContext<SccContext>) -> bool {
        let params = ctx.params_mut();

        match params.phase {
            SccPhase::Initialize => {
                let Some(max_vertex) = self.max_vertex else {
                    return false;
                };
                if !params.allocate(max_vertex) {
                    warn!("scc: vertex id {max_vertex} is too large");
                    params.overflow = Some(max_vertex);
                    return false;
                }
                params.phase = SccPhase::Trimming;
                debug!("scc: {} vertices", params.num_vertices);
                true
            }
            SccPhase::Trimming => {
                let trimmed = params.trim();
                let remaining = params.active.count_set();
                debug!(
                    "scc: superstep {} trimmed {trimmed} vertices, {remaining} remain",
                    params.supersteps
                );
                if remaining == 0 {
                    return false;
                }
                params.phase = SccPhase::Forward;
                true
            }
            SccPhase::Forward => {
                if self.finished {
                    let roots = params.deactivate_roots();
                    debug!("scc: superstep {} found {roots} roots", params.supersteps);
                    params.phase = SccPhase::Backward;
                }
                true
            }
            SccPhase::Backward => {
                if !self.finished {
                    return true;
                }
                let remaining = params.reset_active();
                params.supersteps += 1;
                debug!(
                    "scc: superstep {} done, {remaining} vertices remain",
                    params.supersteps
                );
                if remaining == 0 {
                    return false;
                }
                params.phase = SccPhase::Trimming;
                true
            }
        }
    }

    fn phase(params: &SccContext) -> Option<&'static str> {
        Some(params.phase.name())
    }

    fn max_rounds(params: &SccContext) -> usize {
        params.config.max_rounds
    }
}

impl SingleResult for StronglyConnectedComponents {
    /// The component label of every vertex, indexed by vertex id.
    type Output = Vec<VertexId>;

    fn result(&self, ctx: &RoundContext<SccContext>) -> Vec<VertexId> {
        ctx.labels.to_vec()
    }
}

impl FragmentedGla for StronglyConnectedComponents {
    type Row = (VertexId, VertexId);
    type Cursor<'a>
        = LabelCursor<'a>
    where
        Self: 'a;

    fn num_fragments(&mut self, ctx: &RoundContext<SccContext>) -> usize {
        self.fragments = graph::num_fragments(ctx.num_vertices);
        self.fragments
    }

    fn finalize<'a>(&'a self, ctx: &'a RoundContext<SccContext>, fragment: usize) -> LabelCursor<'a> {
        let vertices = graph::fragment_range(ctx.num_vertices, self.fragments, fragment);
        LabelCursor::new(&ctx.labels, vertices)
    }
}

pub fn context(config: GraphConfig) -> Result<RoundContext<SccContext>, Error> {
    config.validate()?;
    Ok(RoundContext::new(SccContext {
        config,
        phase: SccPhase::Initialize,
        supersteps: 0,
        num_vertices: 0,
        labels: VertexLabels::default(),
        active: VertexFlags::default(),
        has_predecessor: VertexFlags::default(),
        has_successor: VertexFlags::default(),
        overflow: None,
    }))
}

/// Labels every vertex with the smallest id of its strongly connected
/// component and returns `(vertex, label)` pairs ordered by vertex.
pub fn run<P>(runtime: &Runtime, config: GraphConfig, partitions: &[P]) -> Result<Vec<(VertexId, VertexId)>, Error>
where
    P: AsRef<[Edge]> + Sync,
{
    let mut finished =
        runtime.run_iterable::<StronglyConnectedComponents, _>(context(config)?, partitions)?;
    if let Some(vertex) = finished.context.overflow {
        return Err(Error::VertexRange { vertex });
    }
    let fragments = runtime.collect_fragments(&mut finished)?;
    Ok(fragments.into_iter().flatten().collect())
}
