//! Reduction of per-partition states into one.

use crate::{
    error::Error,
    gla::{Gla, RoundContext},
};

use super::Runtime;

impl Runtime {
    /// Reduces `states` level by level, merging adjacent pairs on the worker
    /// pool.  Left-to-right order is preserved, so the result equals
    /// `merge_sequential` up to the associativity of `add_state`.
    ///
    /// Returns `None` for an empty input.
    pub fn merge_tree<G>(
        &self,
        ctx: &RoundContext<G::Params>,
        mut states: Vec<G>,
    ) -> Result<Option<G>, Error>
    where
        G: Gla,
    {
        while states.len() > 1 {
            let mut pairs = Vec::with_capacity(states.len() / 2);
            let mut odd = None;
            let mut states_iter = states.into_iter();
            while let Some(left) = states_iter.next() {
                match states_iter.next() {
                    Some(right) => pairs.push((left, right)),
                    None => odd = Some(left),
                }
            }

            states = self.parallel_map(pairs, |(mut left, right)| {
                left.add_state(ctx, right);
                left
            })?;
            states.extend(odd);
        }

        Ok(states.pop())
    }
}

/// Folds `states` left to right on the calling thread.
pub fn merge_sequential<G, I>(ctx: &RoundContext<G::Params>, states: I) -> Option<G>
where
    G: Gla,
    I: IntoIterator<Item = G>,
{
    states.into_iter().reduce(|mut acc, state| {
        acc.add_state(ctx, state);
        acc
    })
}
