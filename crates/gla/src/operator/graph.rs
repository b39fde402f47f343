//! Vertex-indexed arrays shared by the graph fixpoint operators, and the
//! slicing of vertex ranges into output fragments.

use std::{
    ops::Range,
    sync::atomic::{AtomicBool, AtomicU64, Ordering},
};

/// A 0-based vertex identifier.
pub type VertexId = u64;

/// A directed edge `(source, target)`.
pub type Edge = (VertexId, VertexId);

/// Granularity of vertex ranges assigned to fragments.
pub const FRAGMENT_BLOCK: u64 = 32;

/// Upper bound on the number of output fragments of a graph operator.
pub const MAX_FRAGMENTS: usize = 64;

/// One label per vertex, updated concurrently through `fetch_min`.
///
/// Lowering a label is commutative and idempotent, so partitions may lower
/// labels of the shared array during a scan without coordination: the
/// outcome of a round does not depend on the order in which partitions
/// touch a vertex.
#[derive(Debug, Default)]
pub struct VertexLabels {
    labels: Vec<AtomicU64>,
}

impl VertexLabels {
    /// Labels every vertex in `0..num_vertices` with its own id.  Returns
    /// `None` if the array cannot be allocated.
    pub fn identity(num_vertices: usize) -> Option<Self> {
        let mut labels = Vec::new();
        labels.try_reserve_exact(num_vertices).ok()?;
        labels.extend((0..num_vertices as u64).map(AtomicU64::new));
        Some(Self { labels })
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn get(&self, vertex: VertexId) -> VertexId {
        self.labels[vertex as usize].load(Ordering::Relaxed)
    }

    /// Lowers the label of `vertex` to `label` if that is smaller.  Returns
    /// `true` if this call changed the label.
    pub fn lower(&self, vertex: VertexId, label: VertexId) -> bool {
        self.labels[vertex as usize].fetch_min(label, Ordering::Relaxed) > label
    }

    /// Unconditionally overwrites a label.  Only used between rounds.
    pub fn reset(&mut self, vertex: VertexId, label: VertexId) {
        *self.labels[vertex as usize].get_mut() = label;
    }

    pub fn to_vec(&self) -> Vec<VertexId> {
        self.labels
            .iter()
            .map(|label| label.load(Ordering::Relaxed))
            .collect()
    }
}

/// One boolean per vertex, set concurrently.
#[derive(Debug, Default)]
pub struct VertexFlags {
    flags: Vec<AtomicBool>,
}

impl VertexFlags {
    /// Returns `None` if the array cannot be allocated.
    pub fn new(num_vertices: usize, value: bool) -> Option<Self> {
        let mut flags = Vec::new();
        flags.try_reserve_exact(num_vertices).ok()?;
        flags.extend((0..num_vertices).map(|_| AtomicBool::new(value)));
        Some(Self { flags })
    }

    pub fn get(&self, vertex: VertexId) -> bool {
        self.flags[vertex as usize].load(Ordering::Relaxed)
    }

    /// Sets the flag and returns `true` if it was previously clear.
    pub fn set(&self, vertex: VertexId) -> bool {
        !self.flags[vertex as usize].swap(true, Ordering::Relaxed)
    }

    /// Clears the flag and returns `true` if it was previously set.
    pub fn clear(&self, vertex: VertexId) -> bool {
        self.flags[vertex as usize].swap(false, Ordering::Relaxed)
    }

    /// Iterates over the ids of all vertices whose flag is set.
    pub fn iter_set(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.flags
            .iter()
            .enumerate()
            .filter(|(_, flag)| flag.load(Ordering::Relaxed))
            .map(|(vertex, _)| vertex as VertexId)
    }

    pub fn count_set(&self) -> usize {
        self.iter_set().count()
    }
}

/// Number of vertices needed to address ids up to `max_vertex`, or `None`
/// when that count does not fit in `usize`.
pub fn vertex_count(max_vertex: VertexId) -> Option<usize> {
    usize::try_from(max_vertex).ok()?.checked_add(1)
}

/// Number of fragments used to emit `num_vertices` labels: one per started
/// block of [`FRAGMENT_BLOCK`] vertices, capped at [`MAX_FRAGMENTS`].
pub fn num_fragments(num_vertices: usize) -> usize {
    (num_vertices as u64)
        .div_ceil(FRAGMENT_BLOCK)
        .min(MAX_FRAGMENTS as u64) as usize
}

/// The vertices emitted by fragment `fragment` out of `num_fragments`.
///
/// Fragment boundaries fall on multiples of [`FRAGMENT_BLOCK`]; the last
/// fragment extends to the last vertex.  Some fragments may be empty when
/// there are fewer complete blocks than fragments.
pub fn fragment_range(num_vertices: usize, num_fragments: usize, fragment: usize) -> Range<VertexId> {
    debug_assert!(fragment < num_fragments);

    let count = num_vertices as u64;
    let blocks = count / FRAGMENT_BLOCK;
    let fragments = num_fragments as u64;
    let fragment = fragment as u64;

    // The multiplication must happen before the division.
    let first = fragment * blocks / fragments * FRAGMENT_BLOCK;
    let end = if fragment + 1 == fragments {
        count
    } else {
        (fragment + 1) * blocks / fragments * FRAGMENT_BLOCK
    };
    first..end.max(first)
}

/// Emits `(vertex, label)` pairs for a range of vertices.
#[derive(Debug)]
pub struct LabelCursor<'a> {
    labels: &'a VertexLabels,
    vertices: Range<VertexId>,
}

impl<'a> LabelCursor<'a> {
    pub fn new(labels: &'a VertexLabels, vertices: Range<VertexId>) -> Self {
        Self { labels, vertices }
    }
}

impl Iterator for LabelCursor<'_> {
    type Item = (VertexId, VertexId);

    fn next(&mut self) -> Option<Self::Item> {
        let vertex = self.vertices.next()?;
        Some((vertex, self.labels.get(vertex)))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.vertices.size_hint()
    }
}
