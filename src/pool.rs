//! Replace-on-completion worker pool.
//!
//! `workers` threads share one FIFO task queue. Each pulls a job, runs it to
//! completion through the [`JobRunner`], publishes the outcome and pulls the
//! next one, so a slot freed by a fast job is refilled immediately while a
//! hung validator holds only its own slot. After the jobs the queue carries
//! one stop marker per worker; the coordinator returns once it has seen a
//! stop acknowledgement from every worker.

use crate::{
    job::JobDescriptor,
    runner::{JobRunner, RawOutcome},
    shutdown::Shutdown,
};
use crossbeam_channel::{Receiver, Sender};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub enum Task {
    Run(JobDescriptor),
    Stop,
}

enum Event {
    Finished(RawOutcome),
    Stopped { worker: usize, processed: usize },
}

#[derive(Debug)]
pub struct PoolReport {
    pub outcomes: Vec<RawOutcome>,
    pub jobs_submitted: usize,
    pub workers_started: usize,
    pub workers_stopped: usize,
    pub interrupted: bool,
    pub elapsed: Duration,
}

impl PoolReport {
    /// Jobs never dispatched because the run was interrupted.
    pub fn skipped(&self) -> usize {
        self.jobs_submitted.saturating_sub(self.outcomes.len())
    }
}

pub struct WorkerPool<'a, R: JobRunner> {
    runner: &'a R,
    workers: usize,
    progress_every: usize,
    shutdown: Shutdown,
}

impl<'a, R: JobRunner> WorkerPool<'a, R> {
    pub fn new(runner: &'a R, workers: usize, shutdown: Shutdown) -> Self {
        Self {
            runner,
            workers: workers.max(1),
            progress_every: 500,
            shutdown,
        }
    }

    pub fn with_progress_every(mut self, n: usize) -> Self {
        self.progress_every = n;
        self
    }

    /// Runs every job and returns their outcomes in completion order.
    pub fn run(&self, jobs: Vec<JobDescriptor>) -> PoolReport {
        let started = Instant::now();
        let total = jobs.len();
        let (task_tx, task_rx) = crossbeam_channel::unbounded::<Task>();
        let (event_tx, event_rx) = crossbeam_channel::unbounded::<Event>();

        // The queue is unbounded and task_rx is alive, so sends cannot fail.
        for job in jobs {
            let _ = task_tx.send(Task::Run(job));
        }
        for _ in 0..self.workers {
            let _ = task_tx.send(Task::Stop);
        }
        drop(task_tx);

        info!("processing {} jobs with {} workers", total, self.workers);

        let mut outcomes = Vec::with_capacity(total);
        let mut stopped = 0usize;
        std::thread::scope(|s| {
            for worker in 0..self.workers {
                let rx = task_rx.clone();
                let tx = event_tx.clone();
                let runner = self.runner;
                let shutdown = self.shutdown.clone();
                s.spawn(move || worker_loop(worker, runner, rx, tx, shutdown));
            }
            drop(event_tx);

            while stopped < self.workers {
                match event_rx.recv() {
                    Ok(Event::Finished(outcome)) => {
                        outcomes.push(outcome);
                        if self.progress_every > 0 && outcomes.len() % self.progress_every == 0 {
                            info!("...{}/{} jobs done", outcomes.len(), total);
                        }
                    }
                    Ok(Event::Stopped { worker, processed }) => {
                        debug!("worker {worker} stopped after {processed} jobs");
                        stopped += 1;
                    }
                    Err(_) => {
                        warn!("all workers gone after {stopped} stop acknowledgements");
                        break;
                    }
                }
            }
        });

        let interrupted = self.shutdown.is_requested();
        info!(
            "pool done: {}/{} jobs in {:?}{}",
            outcomes.len(),
            total,
            started.elapsed(),
            if interrupted { " (interrupted)" } else { "" }
        );

        PoolReport {
            outcomes,
            jobs_submitted: total,
            workers_started: self.workers,
            workers_stopped: stopped,
            interrupted,
            elapsed: started.elapsed(),
        }
    }
}

fn worker_loop<R: JobRunner>(
    worker: usize,
    runner: &R,
    tasks: Receiver<Task>,
    events: Sender<Event>,
    shutdown: Shutdown,
) {
    let mut processed = 0usize;
    while let Ok(task) = tasks.recv() {
        let job = match task {
            Task::Run(job) => job,
            Task::Stop => break,
        };
        if shutdown.is_requested() {
            break;
        }

        let outcome = catch_unwind(AssertUnwindSafe(|| runner.run(&job))).unwrap_or_else(|_| {
            warn!("worker {worker}: runner panicked on job {}", job.job_id);
            RawOutcome::launch_failure(&job.job_id, job.producer.clone(), "runner panicked".into())
        });
        processed += 1;
        if events.send(Event::Finished(outcome)).is_err() {
            break;
        }
    }
    let _ = events.send(Event::Stopped { worker, processed });
}
