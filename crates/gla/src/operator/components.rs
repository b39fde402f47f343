//! Connected components of an undirected graph by min-label propagation.
//!
//! Input items are edges.  The first round only discovers the vertex count;
//! it sizes the label array and labels every vertex with its own id.  Every
//! following round lowers the labels of both endpoints of each edge to the
//! smaller of the two, until a round passes in which no edge connects two
//! differently labelled vertices.  Each vertex ends up labelled with the
//! smallest id in its component.

use tracing::{debug, warn};

use super::graph::{self, Edge, LabelCursor, VertexId, VertexLabels};
use crate::{
    config::GraphConfig,
    error::Error,
    gla::{FragmentedGla, Gla, IterableGla, RoundContext, SingleResult},
    runtime::Runtime,
};

/// Parameters carried across rounds.
#[derive(Debug)]
pub struct ComponentsContext {
    config: GraphConfig,
    num_vertices: usize,
    labels: VertexLabels,
    overflow: Option<VertexId>,
}

impl ComponentsContext {
    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    /// The largest vertex id, if it was too large to size the label array.
    pub fn overflow(&self) -> Option<VertexId> {
        self.overflow
    }

    pub fn labels(&self) -> &VertexLabels {
        &self.labels
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }
}

/// Per-partition state.
#[derive(Debug)]
pub struct ConnectedComponents {
    max_vertex: Option<VertexId>,
    finished: bool,
    fragments: usize,
}

impl Gla for ConnectedComponents {
    type Item = Edge;
    type Params = ComponentsContext;

    fn new(_ctx: &RoundContext<ComponentsContext>, _partition: usize) -> Self {
        Self {
            max_vertex: None,
            finished: true,
            fragments: 0,
        }
    }

    fn add_item(&mut self, ctx: &RoundContext<ComponentsContext>, &(source, target): &Edge) {
        if ctx.round() == 0 {
            self.max_vertex = self.max_vertex.max(Some(source.max(target)));
            return;
        }

        let source_label = ctx.labels.get(source);
        let target_label = ctx.labels.get(target);
        if source_label != target_label {
            self.finished = false;
            let label = source_label.min(target_label);
            ctx.labels.lower(source, label);
            ctx.labels.lower(target, label);
        }
    }

    fn add_state(&mut self, _ctx: &RoundContext<ComponentsContext>, other: Self) {
        self.max_vertex = self.max_vertex.max(other.max_vertex);
        self.finished &= other.finished;
    }
}

impl IterableGla for ConnectedComponents {
    fn should_iterate(&mut self, ctx: &mut RoundContext<ComponentsContext>) -> bool {
        if ctx.round() == 0 {
            let Some(max_vertex) = self.max_vertex else {
                return false;
            };
            let params = ctx.params_mut();
            let Some((num_vertices, labels)) = graph::vertex_count(max_vertex)
                .and_then(|n| Some((n, VertexLabels::identity(n)?)))
            else {
                warn!("connected components: vertex id {max_vertex} is too large");
                params.overflow = Some(max_vertex);
                return false;
            };
            debug!("connected components: {num_vertices} vertices");
            params.num_vertices = num_vertices;
            params.labels = labels;
            true
        } else {
            !self.finished
        }
    }

    fn phase(params: &ComponentsContext) -> Option<&'static str> {
        Some(if params.labels.is_empty() {
            "initialize"
        } else {
            "propagate"
        })
    }

    fn max_rounds(params: &ComponentsContext) -> usize {
        params.config.max_rounds
    }
}

impl SingleResult for ConnectedComponents {
    /// The label of every vertex, indexed by vertex id.
    type Output = Vec<VertexId>;

    fn result(&self, ctx: &RoundContext<ComponentsContext>) -> Vec<VertexId> {
        ctx.labels.to_vec()
    }
}

impl FragmentedGla for ConnectedComponents {
    type Row = (VertexId, VertexId);
    type Cursor<'a>
        = LabelCursor<'a>
    where
        Self: 'a;

    fn num_fragments(&mut self, ctx: &RoundContext<ComponentsContext>) -> usize {
        self.fragments = graph::num_fragments(ctx.labels.len());
        self.fragments
    }

    fn finalize<'a>(
        &'a self,
        ctx: &'a RoundContext<ComponentsContext>,
        fragment: usize,
    ) -> LabelCursor<'a> {
        let vertices = graph::fragment_range(ctx.num_vertices, self.fragments, fragment);
        LabelCursor::new(&ctx.labels, vertices)
    }
}

pub fn context(config: GraphConfig) -> Result<RoundContext<ComponentsContext>, Error> {
    config.validate()?;
    Ok(RoundContext::new(ComponentsContext {
        config,
        num_vertices: 0,
        labels: VertexLabels::default(),
        overflow: None,
    }))
}

/// Labels every vertex that appears in `partitions` with its component and
/// returns `(vertex, label)` pairs ordered by vertex.
pub fn run<P>(runtime: &Runtime, config: GraphConfig, partitions: &[P]) -> Result<Vec<(VertexId, VertexId)>, Error>
where
    P: AsRef<[Edge]> + Sync,
{
    let mut finished = runtime.run_iterable::<ConnectedComponents, _>(context(config)?, partitions)?;
    if let Some(vertex) = finished.context.overflow {
        return Err(Error::VertexRange { vertex });
    }
    let fragments = runtime.collect_fragments(&mut finished)?;
    Ok(fragments.into_iter().flatten().collect())
}

#[cfg(test)]
mod test {
    use super::{context, ConnectedComponents};
    use crate::{config::GraphConfig, error::Error, gla::Termination, Fragments, Runtime};

    fn runtime() -> Runtime {
        Runtime::with_workers(2).unwrap()
    }

    #[test]
    fn path_converges_after_two_propagation_rounds() {
        let partitions = vec![vec![(0u64, 1u64), (1, 2)]];
        let finished = runtime()
            .run_iterable::<ConnectedComponents, _>(
                context(GraphConfig::default()).unwrap(),
                &partitions,
            )
            .unwrap();

        assert_eq!(finished.result(), vec![0, 0, 0]);
        // Initialization plus two propagation rounds.
        assert_eq!(finished.rounds, 3);
        assert_eq!(finished.termination, Termination::Converged);
    }

    #[test]
    fn empty_graph() {
        let partitions: Vec<Vec<(u64, u64)>> = vec![vec![], vec![]];
        let mut finished = runtime()
            .run_iterable::<ConnectedComponents, _>(
                context(GraphConfig::default()).unwrap(),
                &partitions,
            )
            .unwrap();
        assert_eq!(finished.rounds, 1);
        assert_eq!(finished.num_fragments(), 0);
        assert!(finished.result().is_empty());
    }

    #[test]
    fn isolated_ids_are_their_own_component() {
        // Vertices 1 and 2 do not appear in any edge.
        let partitions = vec![vec![(0u64, 3u64)]];
        let labels = super::run(&runtime(), GraphConfig::default(), &partitions).unwrap();
        assert_eq!(labels, vec![(0, 0), (1, 1), (2, 2), (3, 0)]);
    }

    #[test]
    fn round_cap() {
        // A long path needs many rounds when edges are scanned against the
        // direction of propagation.
        let edges: Vec<(u64, u64)> = (0..50u64).rev().map(|v| (v, v + 1)).collect();
        let config = GraphConfig { max_rounds: 3 };
        let finished = runtime()
            .run_iterable::<ConnectedComponents, _>(context(config).unwrap(), &[edges])
            .unwrap();
        assert_eq!(finished.termination, Termination::RoundCap);
        assert_eq!(finished.rounds, 3);
    }

    #[test]
    fn largest_vertex_id_is_rejected() {
        let partitions = vec![vec![(1u64, 2u64)], vec![(u64::MAX, 0)]];
        let finished = runtime()
            .run_iterable::<ConnectedComponents, _>(
                context(GraphConfig::default()).unwrap(),
                &partitions,
            )
            .unwrap();
        assert_eq!(finished.rounds, 1);
        assert_eq!(finished.context.overflow(), Some(u64::MAX));
        assert!(finished.context.labels().is_empty());

        let error = super::run(&runtime(), GraphConfig::default(), &partitions).unwrap_err();
        assert_eq!(error, Error::VertexRange { vertex: u64::MAX });
    }

    #[test]
    fn invalid_config() {
        assert!(context(GraphConfig { max_rounds: 1 }).is_err());
    }
}
