use nitwit_bench::{
    job::JobDescriptor,
    pool::WorkerPool,
    runner::{ExitKind, JobRunner, RawOutcome},
    shutdown::Shutdown,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Sleeps per job and tracks how many jobs run at once.
struct StubRunner {
    delay: Duration,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    runs: AtomicUsize,
}

impl StubRunner {
    fn new(delay_ms: u64) -> Self {
        Self {
            delay: Duration::from_millis(delay_ms),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            runs: AtomicUsize::new(0),
        }
    }
}

impl JobRunner for StubRunner {
    fn run(&self, job: &JobDescriptor) -> RawOutcome {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.runs.fetch_add(1, Ordering::SeqCst);
        RawOutcome {
            job_id: job.job_id.clone(),
            producer: job.producer.clone(),
            exit: ExitKind::Success,
            cpu_seconds: 0.0,
            peak_memory_kb: 0,
            message: String::new(),
        }
    }
}

fn jobs(n: usize) -> Vec<JobDescriptor> {
    (0..n)
        .map(|i| JobDescriptor::new(format!("w{i}"), format!("s{i}"), format!("job-{i}"), None))
        .collect()
}

#[test]
fn processes_every_job_and_stops_every_worker() {
    for workers in [1, 2, 4] {
        for n in [0, 1, 7, 20] {
            let runner = StubRunner::new(5);
            let report = WorkerPool::new(&runner, workers, Shutdown::new()).run(jobs(n));

            assert_eq!(report.outcomes.len(), n, "workers={workers} jobs={n}");
            assert_eq!(report.workers_started, workers);
            assert_eq!(report.workers_stopped, workers);
            assert_eq!(runner.runs.load(Ordering::SeqCst), n);
            assert_eq!(report.skipped(), 0);
            assert!(!report.interrupted);

            let ids: HashSet<_> = report.outcomes.iter().map(|o| o.job_id.clone()).collect();
            assert_eq!(ids.len(), n);
        }
    }
}

#[test]
fn never_exceeds_worker_limit() {
    let runner = StubRunner::new(20);
    let report = WorkerPool::new(&runner, 3, Shutdown::new()).run(jobs(12));
    assert_eq!(report.outcomes.len(), 12);
    let max = runner.max_in_flight.load(Ordering::SeqCst);
    assert!(max <= 3, "max in flight {max}");
    assert!(max >= 2, "pool never ran jobs concurrently");
}

#[test]
fn zero_workers_is_treated_as_one() {
    let runner = StubRunner::new(1);
    let report = WorkerPool::new(&runner, 0, Shutdown::new()).run(jobs(3));
    assert_eq!(report.workers_started, 1);
    assert_eq!(report.workers_stopped, 1);
    assert_eq!(report.outcomes.len(), 3);
}

struct PanickyRunner;

impl JobRunner for PanickyRunner {
    fn run(&self, job: &JobDescriptor) -> RawOutcome {
        if job.job_id == "job-1" {
            panic!("boom");
        }
        RawOutcome {
            job_id: job.job_id.clone(),
            producer: None,
            exit: ExitKind::Success,
            cpu_seconds: 0.0,
            peak_memory_kb: 0,
            message: String::new(),
        }
    }
}

#[test]
fn runner_panic_becomes_launch_failure() {
    let report = WorkerPool::new(&PanickyRunner, 1, Shutdown::new()).run(jobs(3));
    assert_eq!(report.outcomes.len(), 3);
    assert_eq!(report.workers_stopped, 1);
    let failed = report
        .outcomes
        .iter()
        .find(|o| o.job_id == "job-1")
        .expect("job-1 outcome");
    assert!(matches!(failed.exit, ExitKind::LaunchFailure(_)));
}

/// Requests shutdown while running its first job.
struct InterruptingRunner {
    shutdown: Shutdown,
    inner: StubRunner,
}

impl JobRunner for InterruptingRunner {
    fn run(&self, job: &JobDescriptor) -> RawOutcome {
        self.shutdown.request();
        self.inner.run(job)
    }
}

#[test]
fn shutdown_stops_workers_without_losing_acknowledgements() {
    let shutdown = Shutdown::new();
    let runner = InterruptingRunner {
        shutdown: shutdown.clone(),
        inner: StubRunner::new(10),
    };
    let report = WorkerPool::new(&runner, 2, shutdown).run(jobs(50));

    assert!(report.interrupted);
    assert_eq!(report.workers_stopped, 2);
    assert!(report.outcomes.len() <= 2);
    assert_eq!(report.skipped(), 50 - report.outcomes.len());
}
