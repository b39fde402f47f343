//! A pool of worker threads that drives operators through their rounds.
//!
//! Every parallel step spawns one scoped thread per worker, deals its tasks
//! round robin and joins all threads before returning.  Scanning partitions,
//! merging one level of the reduction tree, draining fragments and running
//! GIST task queues are all such steps.  Data only crosses a round boundary
//! through the reduced state and the round context.

use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    thread::{self, Builder},
};
use tracing::{debug, error, info};

use crate::{
    config::RuntimeConfig,
    error::Error,
    gla::{Finished, Fragments, Gla, IterableGla, RoundContext, Termination},
};

mod controller;
mod merge;
mod panic;

pub use controller::{RoundController, RoundState};
pub use merge::merge_sequential;
pub use panic::{PanicLocation, WorkerPanicInfo};

/// Executes operators on a fixed number of worker threads.
#[derive(Clone, Debug)]
pub struct Runtime {
    config: RuntimeConfig,
}

impl Runtime {
    pub fn new(config: RuntimeConfig) -> Result<Self, Error> {
        config.validate()?;
        panic::install_panic_hook();
        info!(
            "starting gla runtime with {} workers, chunk size {}",
            config.workers, config.chunk_size
        );
        Ok(Self { config })
    }

    /// A runtime with `workers` threads and default settings otherwise.
    pub fn with_workers(workers: usize) -> Result<Self, Error> {
        Self::new(RuntimeConfig::with_workers(workers))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn workers(&self) -> usize {
        self.config.workers
    }

    /// Applies `f` to every task on the worker pool and returns the results
    /// in task order.
    ///
    /// Tasks are dealt round robin to at most `workers` threads named
    /// `gla-worker-<index>`.  If any thread panics, the remaining threads
    /// still run to completion and the panics of all failed workers are
    /// reported in a single [`Error::WorkerPanic`].
    pub fn parallel_map<T, R, F>(&self, tasks: Vec<T>, f: F) -> Result<Vec<R>, Error>
    where
        T: Send,
        R: Send,
        F: Fn(T) -> R + Sync,
    {
        let num_tasks = tasks.len();
        let num_threads = self.config.workers.min(num_tasks);
        if num_threads == 0 {
            return Ok(Vec::new());
        }

        let mut assignments: Vec<Vec<(usize, T)>> = (0..num_threads).map(|_| Vec::new()).collect();
        for (index, task) in tasks.into_iter().enumerate() {
            assignments[index % num_threads].push((index, task));
        }

        let f = &f;
        let outcomes = thread::scope(|scope| {
            let mut handles = Vec::with_capacity(num_threads);
            let mut failures = Vec::new();

            for (worker, assignment) in assignments.into_iter().enumerate() {
                let spawned = Builder::new()
                    .name(format!("gla-worker-{worker}"))
                    .spawn_scoped(scope, move || {
                        panic::enter_worker();
                        catch_unwind(AssertUnwindSafe(|| {
                            assignment
                                .into_iter()
                                .map(|(index, task)| (index, f(task)))
                                .collect::<Vec<_>>()
                        }))
                        .map_err(|payload| panic::take_panic_info(&*payload))
                    });
                match spawned {
                    Ok(handle) => handles.push((worker, handle)),
                    Err(error) => failures.push(Error::WorkerSpawn {
                        worker,
                        message: error.to_string(),
                    }),
                }
            }

            let joined = handles
                .into_iter()
                .map(|(worker, handle)| {
                    // Worker bodies catch their own panics, so `join` only
                    // fails if catching itself failed.
                    let outcome = handle
                        .join()
                        .unwrap_or_else(|payload| Err(panic::take_panic_info(&*payload)));
                    (worker, outcome)
                })
                .collect::<Vec<_>>();
            (joined, failures)
        });

        let (joined, mut failures) = outcomes;
        if let Some(spawn_error) = failures.pop() {
            error!("{spawn_error}");
            return Err(spawn_error);
        }

        let mut results: Vec<Option<R>> = (0..num_tasks).map(|_| None).collect();
        let mut panic_info = Vec::new();
        for (worker, outcome) in joined {
            match outcome {
                Ok(outputs) => {
                    for (index, output) in outputs {
                        results[index] = Some(output);
                    }
                }
                Err(info) => panic_info.push((worker, info)),
            }
        }

        if !panic_info.is_empty() {
            for (worker, info) in &panic_info {
                error!("worker {worker} panicked: {info}");
            }
            return Err(Error::WorkerPanic { panic_info });
        }
        Ok(results.into_iter().flatten().collect())
    }

    /// Feeds every partition into its own fresh state.  One state is
    /// returned per partition, in partition order.
    pub fn scan<G, P>(&self, ctx: &RoundContext<G::Params>, partitions: &[P]) -> Result<Vec<G>, Error>
    where
        G: Gla,
        P: AsRef<[G::Item]> + Sync,
    {
        let chunk_size = self.config.chunk_size;

        self.parallel_map(
            partitions.iter().enumerate().collect(),
            |(index, partition)| {
                let items = partition.as_ref();
                let mut state = G::new(ctx, index);
                for chunk in items.chunks(chunk_size) {
                    for item in chunk {
                        state.add_item(ctx, item);
                    }
                    state.chunk_boundary(ctx);
                }
                if items.is_empty() {
                    state.chunk_boundary(ctx);
                }
                state
            },
        )
    }

    /// One scan followed by a full reduction.  Without partitions the result
    /// is a fresh empty state.
    fn scan_and_merge<G, P>(&self, ctx: &RoundContext<G::Params>, partitions: &[P]) -> Result<G, Error>
    where
        G: Gla,
        P: AsRef<[G::Item]> + Sync,
    {
        let states = self.scan(ctx, partitions)?;
        Ok(self
            .merge_tree(ctx, states)?
            .unwrap_or_else(|| G::new(ctx, 0)))
    }

    /// Runs a single-round operator.
    pub fn run_once<G, P>(&self, ctx: RoundContext<G::Params>, partitions: &[P]) -> Result<Finished<G>, Error>
    where
        G: Gla,
        P: AsRef<[G::Item]> + Sync,
    {
        let state = self.scan_and_merge(&ctx, partitions)?;
        Ok(Finished {
            state,
            context: ctx,
            rounds: 1,
            termination: Termination::Converged,
        })
    }

    /// Runs an iterable operator until `should_iterate` returns `false` or
    /// [`IterableGla::max_rounds`] rounds have completed.  At least one round
    /// always runs.
    pub fn run_iterable<G, P>(&self, mut ctx: RoundContext<G::Params>, partitions: &[P]) -> Result<Finished<G>, Error>
    where
        G: IterableGla,
        P: AsRef<[G::Item]> + Sync,
    {
        let name = short_type_name::<G>();
        let mut controller = RoundController::new(name, G::max_rounds(ctx.params()));

        loop {
            let states = self.scan(&ctx, partitions)?;
            controller.start_merge();
            let mut state = self
                .merge_tree(&ctx, states)?
                .unwrap_or_else(|| G::new(&ctx, 0));

            controller.start_decision();
            let phase = G::phase(ctx.params());
            let iterate = state.should_iterate(&mut ctx);
            debug!(
                "{name}: round {} ({}) done, iterate: {iterate}",
                ctx.round(),
                phase.unwrap_or("-"),
            );

            if let Some(termination) = controller.finish_round(iterate) {
                return Ok(Finished {
                    state,
                    context: ctx,
                    rounds: controller.rounds(),
                    termination,
                });
            }
            ctx.advance();
        }
    }

    /// Asks `source` for its fragment count once and drains all fragments
    /// on the worker pool.  The outer vector is indexed by fragment.
    pub fn collect_fragments<F>(&self, source: &mut F) -> Result<Vec<Vec<F::Row>>, Error>
    where
        F: Fragments,
    {
        let num_fragments = source.num_fragments();
        let source = &*source;
        self.parallel_map((0..num_fragments).collect(), |fragment| {
            source.finalize(fragment).collect::<Vec<_>>()
        })
    }
}

fn short_type_name<T>() -> &'static str {
    let name = std::any::type_name::<T>();
    let base = name.split('<').next().unwrap_or(name);
    base.rsplit("::").next().unwrap_or(base)
}
