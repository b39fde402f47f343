//! Operators whose rounds are not a uniform scan over items.
//!
//! A [`Gist`] describes each round as a list of independent tasks (training
//! one sub-model, computing one block of a matrix product).  The runtime
//! loads the tasks into a [`QueueScheduler`], hands one [`LocalQueue`] to
//! every worker and lets idle workers steal from busy ones.  Tasks publish
//! their results into state owned by the GIST itself, typically behind a
//! mutex whose critical section only covers the final accumulation.

use crossbeam::deque::{Steal, Stealer, Worker};
use std::sync::Arc;
use tracing::debug;

use crate::{error::Error, gla::Termination, runtime::RoundController, Runtime};

/// An iterative computation over irregular tasks.
pub trait Gist: Send + Sync {
    type Task: Send;

    /// Produces the tasks of round `round`.  Called single-threaded before
    /// the round starts.
    fn prepare_round(&mut self, round: usize) -> Vec<Self::Task>;

    /// Executes one task.  May run concurrently with other tasks of the same
    /// round.
    fn do_step(&self, task: Self::Task);

    /// Called single-threaded after all tasks of `round` completed.
    /// Returns `true` if another round is needed.
    fn should_iterate(&mut self, round: usize) -> bool;
}

/// A source of tasks for one worker.
pub trait LocalScheduler {
    type Task;

    /// The next task to run, or `None` once no work is left anywhere.
    fn next_task(&mut self) -> Option<Self::Task>;
}

/// Per-worker FIFO queues with work stealing.
pub struct QueueScheduler<T> {
    queues: Vec<Worker<T>>,
    stealers: Arc<[Stealer<T>]>,
}

impl<T> QueueScheduler<T> {
    /// Deals `tasks` round robin over `workers` queues.
    pub fn new(tasks: Vec<T>, workers: usize) -> Self {
        let queues: Vec<Worker<T>> = (0..workers.max(1)).map(|_| Worker::new_fifo()).collect();
        let stealers = queues.iter().map(Worker::stealer).collect();

        for (index, task) in tasks.into_iter().enumerate() {
            queues[index % queues.len()].push(task);
        }

        Self { queues, stealers }
    }

    /// Splits the scheduler into one queue handle per worker.
    pub fn into_local(self) -> Vec<LocalQueue<T>> {
        let stealers = self.stealers;
        self.queues
            .into_iter()
            .enumerate()
            .map(|(worker, queue)| LocalQueue {
                worker,
                queue,
                stealers: stealers.clone(),
            })
            .collect()
    }
}

/// One worker's view of a [`QueueScheduler`].
pub struct LocalQueue<T> {
    worker: usize,
    queue: Worker<T>,
    stealers: Arc<[Stealer<T>]>,
}

impl<T> LocalQueue<T> {
    fn steal(&self) -> Option<T> {
        let peers = self.stealers.len();
        for offset in 1..peers {
            let peer = (self.worker + offset) % peers;
            loop {
                match self.stealers[peer].steal_batch_and_pop(&self.queue) {
                    Steal::Success(task) => return Some(task),
                    Steal::Empty => break,
                    Steal::Retry => (),
                }
            }
        }
        None
    }
}

impl<T> LocalScheduler for LocalQueue<T> {
    type Task = T;

    fn next_task(&mut self) -> Option<T> {
        self.queue.pop().or_else(|| self.steal())
    }
}

/// The outcome of [`Runtime::run_gist`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GistRun {
    pub rounds: usize,
    pub termination: Termination,
}

impl Runtime {
    /// Runs `gist` until its `should_iterate` returns `false` or `max_rounds`
    /// rounds have completed.
    pub fn run_gist<G>(&self, gist: &mut G, max_rounds: usize) -> Result<GistRun, Error>
    where
        G: Gist,
    {
        let mut controller = RoundController::new("gist", max_rounds);
        let mut round = 0;

        loop {
            let tasks = gist.prepare_round(round);
            debug!("gist: round {round} with {} tasks", tasks.len());

            let scheduler = QueueScheduler::new(tasks, self.workers());
            let shared = &*gist;
            let executed = self.parallel_map(scheduler.into_local(), |mut local| {
                let mut executed = 0usize;
                while let Some(task) = local.next_task() {
                    shared.do_step(task);
                    executed += 1;
                }
                executed
            })?;
            debug!(
                "gist: round {round} tasks per worker: {:?}",
                executed.as_slice()
            );

            controller.start_merge();
            controller.start_decision();
            let iterate = gist.should_iterate(round);
            if let Some(termination) = controller.finish_round(iterate) {
                return Ok(GistRun {
                    rounds: controller.rounds(),
                    termination,
                });
            }
            round += 1;
        }
    }
}
