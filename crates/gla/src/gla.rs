//! The operator contract shared by every aggregate in this crate.
//!
//! A GLA (generalized linear aggregate) is evaluated in synchronized rounds.
//! In every round:
//!
//! 1. one state per input partition is created with [`Gla::new`] and fed the
//!    partition's items with [`Gla::add_item`];
//! 2. the per-partition states are folded into one with [`Gla::add_state`];
//! 3. iterable operators then inspect the reduced state in
//!    [`IterableGla::should_iterate`], update the [`RoundContext`] and decide
//!    whether another round is needed.
//!
//! Once iteration stops, the result is read either as a single value
//! ([`SingleResult`]) or as independently producible fragments
//! ([`FragmentedGla`], consumed through the [`Fragments`] trait).
//!
//! The round context is shared by every partition of a round through a
//! shared reference and is mutated only by `should_iterate`, which runs on a
//! single thread after all partitions have been merged.  The only exception
//! are context members with interior mutability that are updated through a
//! commutative idempotent combine (see
//! [`VertexLabels`](crate::operator::VertexLabels)) or under a short-lived
//! lock (see [`Histogram`](crate::operator::Histogram)).

use std::ops::Deref;

/// The shared state of one operator invocation, carried across rounds.
#[derive(Debug)]
pub struct RoundContext<P> {
    round: usize,
    params: P,
}

impl<P> RoundContext<P> {
    pub fn new(params: P) -> Self {
        Self { round: 0, params }
    }

    /// The 0-based index of the current round.
    pub fn round(&self) -> usize {
        self.round
    }

    pub fn params(&self) -> &P {
        &self.params
    }

    /// Mutable access to round-carried parameters.  Only available to the
    /// code that holds the context exclusively, i.e., between rounds.
    pub fn params_mut(&mut self) -> &mut P {
        &mut self.params
    }

    pub fn into_params(self) -> P {
        self.params
    }

    pub(crate) fn advance(&mut self) {
        self.round += 1;
    }
}

impl<P> Deref for RoundContext<P> {
    type Target = P;

    fn deref(&self) -> &P {
        &self.params
    }
}

/// Per-partition state of an aggregate and the rule to merge two of them.
pub trait Gla: Sized + Send + 'static {
    /// A single input item.
    type Item: Sync;

    /// Round-carried parameters stored in the [`RoundContext`].
    type Params: Send + Sync + 'static;

    /// Creates an empty state for `partition` in the current round of `ctx`.
    fn new(ctx: &RoundContext<Self::Params>, partition: usize) -> Self;

    /// Accumulates one item.  Must only touch this state and read-only (or
    /// combine-only) members of `ctx`.
    fn add_item(&mut self, ctx: &RoundContext<Self::Params>, item: &Self::Item);

    /// Folds `other`, a state from the same round, into `self`.
    fn add_state(&mut self, ctx: &RoundContext<Self::Params>, other: Self);

    /// Called every [`chunk_size`](crate::RuntimeConfig::chunk_size) items and
    /// once at the end of each partition.
    fn chunk_boundary(&mut self, _ctx: &RoundContext<Self::Params>) {}
}

/// A GLA that may need more than one scan of its input.
pub trait IterableGla: Gla {
    /// Inspects the fully reduced state of the round that just finished,
    /// writes the parameters for the next round into `ctx` and returns
    /// `true` if another round is needed.
    ///
    /// Called exactly once per round, single-threaded.  The round index is
    /// advanced by the caller after this returns.
    fn should_iterate(&mut self, ctx: &mut RoundContext<Self::Params>) -> bool;

    /// Name of the active phase of a multi-phase operator, for logging.
    fn phase(_params: &Self::Params) -> Option<&'static str> {
        None
    }

    /// Upper bound on the number of rounds, read once when the run starts.
    /// Operators with a configured cap return it here.
    fn max_rounds(_params: &Self::Params) -> usize {
        usize::MAX
    }
}

/// A GLA whose result is a single value.
pub trait SingleResult: Gla {
    type Output;

    fn result(&self, ctx: &RoundContext<Self::Params>) -> Self::Output;
}

/// A GLA whose result is split into fragments that can be produced in
/// parallel.
pub trait FragmentedGla: Gla + Sync {
    type Row: Send;

    /// Pull-based iterator over the rows of one fragment.
    type Cursor<'a>: Iterator<Item = Self::Row> + Send
    where
        Self: 'a;

    /// Called once, single-threaded, after the last round.  Computes and
    /// caches anything the cursors share and returns the fragment count.
    fn num_fragments(&mut self, ctx: &RoundContext<Self::Params>) -> usize;

    /// Returns a cursor over fragment `fragment`.  May run concurrently for
    /// different fragments.
    fn finalize<'a>(
        &'a self,
        ctx: &'a RoundContext<Self::Params>,
        fragment: usize,
    ) -> Self::Cursor<'a>;
}

/// Anything that exposes its result as independently producible fragments.
///
/// Fragments are disjoint and their union is the complete result.  The rows
/// of a fragment come out in an order determined only by the fragment index
/// and the fragment count.
pub trait Fragments: Sync {
    type Row: Send;

    type Cursor<'a>: Iterator<Item = Self::Row> + Send
    where
        Self: 'a;

    fn num_fragments(&mut self) -> usize;

    fn finalize(&self, fragment: usize) -> Self::Cursor<'_>;
}

/// How an iterable computation ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Termination {
    /// The operator reached its own fixed point or convergence criterion.
    Converged,

    /// The round cap was hit first.  The result holds the values computed
    /// by the last round.
    RoundCap,
}

/// The outcome of running an operator to completion.
#[derive(Debug)]
pub struct Finished<G: Gla> {
    /// The reduced state of the last round.
    pub state: G,

    /// The round context as left by the last `should_iterate` call.
    pub context: RoundContext<G::Params>,

    /// Number of completed rounds.
    pub rounds: usize,

    pub termination: Termination,
}

impl<G: Gla> Finished<G> {
    pub fn converged(&self) -> bool {
        self.termination == Termination::Converged
    }
}

impl<G> Finished<G>
where
    G: SingleResult,
{
    pub fn result(&self) -> G::Output {
        self.state.result(&self.context)
    }
}

impl<G> Fragments for Finished<G>
where
    G: FragmentedGla,
{
    type Row = G::Row;
    type Cursor<'a>
        = G::Cursor<'a>
    where
        Self: 'a;

    fn num_fragments(&mut self) -> usize {
        self.state.num_fragments(&self.context)
    }

    fn finalize(&self, fragment: usize) -> Self::Cursor<'_> {
        self.state.finalize(&self.context, fragment)
    }
}
