//! Grouped aggregation: one instance of an inner aggregate per key.

use hashbrown::{hash_map::Entry, HashMap};
use std::hash::Hash;

use crate::{
    gla::{Gla, RoundContext, SingleResult},
    runtime::Runtime,
    Error,
};

/// Routes `(key, item)` pairs to a per-key instance of `A`.
///
/// All inner instances share the round context of `A`.  Only single-round
/// inner aggregates are supported.
#[derive(Debug)]
pub struct GroupBy<K, A> {
    partition: usize,
    groups: HashMap<K, A>,
}

impl<K, A> GroupBy<K, A> {
    pub fn groups(&self) -> &HashMap<K, A> {
        &self.groups
    }

    pub fn into_groups(self) -> HashMap<K, A> {
        self.groups
    }
}

impl<K, A> Gla for GroupBy<K, A>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    A: Gla,
{
    type Item = (K, A::Item);
    type Params = A::Params;

    fn new(_ctx: &RoundContext<A::Params>, partition: usize) -> Self {
        Self {
            partition,
            groups: HashMap::new(),
        }
    }

    fn add_item(&mut self, ctx: &RoundContext<A::Params>, (key, item): &(K, A::Item)) {
        if let Some(state) = self.groups.get_mut(key) {
            state.add_item(ctx, item);
            return;
        }
        let mut state = A::new(ctx, self.partition);
        state.add_item(ctx, item);
        self.groups.insert(key.clone(), state);
    }

    fn add_state(&mut self, ctx: &RoundContext<A::Params>, other: Self) {
        for (key, state) in other.groups {
            match self.groups.entry(key) {
                Entry::Occupied(mut entry) => entry.get_mut().add_state(ctx, state),
                Entry::Vacant(entry) => {
                    entry.insert(state);
                }
            }
        }
    }

    fn chunk_boundary(&mut self, ctx: &RoundContext<A::Params>) {
        for state in self.groups.values_mut() {
            state.chunk_boundary(ctx);
        }
    }
}

impl<K, A> SingleResult for GroupBy<K, A>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    A: SingleResult,
{
    type Output = HashMap<K, A::Output>;

    fn result(&self, ctx: &RoundContext<A::Params>) -> Self::Output {
        self.groups
            .iter()
            .map(|(key, state)| (key.clone(), state.result(ctx)))
            .collect()
    }
}

/// Aggregates every group of `partitions` with `A`.
pub fn run<K, A, P>(
    runtime: &Runtime,
    ctx: RoundContext<A::Params>,
    partitions: &[P],
) -> Result<HashMap<K, A::Output>, Error>
where
    K: Clone + Eq + Hash + Send + Sync + 'static,
    A: SingleResult,
    P: AsRef<[(K, A::Item)]> + Sync,
{
    let finished = runtime.run_once::<GroupBy<K, A>, _>(ctx, partitions)?;
    Ok(finished.result())
}
