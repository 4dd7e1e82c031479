mod common;

use common::{script_job, sh_runner};
use nitwit_bench::{
    classify::Bucket,
    config::Layout,
    pool::WorkerPool,
    runner::ExitKind,
    shutdown::Shutdown,
    store::ResultStore,
};
use std::time::{Duration, Instant};

#[test]
fn one_hanging_job_only_blocks_its_own_slot() {
    let dir = tempfile::tempdir().unwrap();
    let timeout = 2.0;
    let jobs: Vec<_> = (1..=5)
        .map(|i| {
            let body = if i == 3 { "exec sleep 60\n" } else { "echo VALIDATED\nexit 0\n" };
            script_job(&dir, &format!("job{i}"), body)
        })
        .collect();

    let runner = sh_runner(timeout);
    let started = Instant::now();
    let report = WorkerPool::new(&runner, 2, Shutdown::new()).run(jobs);
    let elapsed = started.elapsed();

    assert_eq!(report.outcomes.len(), 5);
    assert_eq!(report.workers_stopped, 2);
    // Well under 5 x timeout: only the hung job waits for the deadline.
    assert!(elapsed < Duration::from_secs_f64(timeout * 3.5), "took {elapsed:?}");

    let mut store = ResultStore::new();
    for outcome in &report.outcomes {
        store.record_outcome(outcome);
    }
    assert_eq!(store.validated.len(), 4);
    assert_eq!(store.non_validated.len(), 1);
    assert!(store.badly_parsed.is_empty());

    let (bucket, rec) = store.find("job3").expect("job3 recorded");
    assert_eq!(bucket, Bucket::NonValidated);
    assert_eq!(rec.status, None);
    let hung = report.outcomes.iter().find(|o| o.job_id == "job3").unwrap();
    assert_eq!(hung.exit, ExitKind::TimedOut);

    let out = tempfile::tempdir().unwrap();
    store.flush(out.path(), Layout::Split, true).unwrap();
    assert_eq!(ResultStore::load(out.path()).unwrap(), store);
}
