#![allow(dead_code)]

use nitwit_bench::{config::Validator, job::JobDescriptor, runner::ProcessRunner, shutdown::Shutdown};
use std::path::Path;
use tempfile::TempDir;

/// Validator settings that run each witness as a shell script, with the
/// source path as `$1`.
pub fn sh_settings(timeout_seconds: f64) -> Validator {
    Validator {
        executable: "/bin/sh".into(),
        error_function: None,
        timeout_seconds,
        kill_grace_ms: 500,
        poll_interval_ms: 20,
        capture_stderr: false,
    }
}

pub fn sh_runner(timeout_seconds: f64) -> ProcessRunner {
    ProcessRunner::new(&sh_settings(timeout_seconds), Shutdown::new()).expect("runner")
}

/// Writes `body` as the witness script for `id` and returns its job.
pub fn script_job(dir: &TempDir, id: &str, body: &str) -> JobDescriptor {
    let witness = dir.path().join(format!("{id}.sh"));
    std::fs::write(&witness, body).expect("write witness script");
    let source = dir.path().join("program.c");
    if !source.exists() {
        std::fs::write(&source, "int main(void) { return 0; }\n").expect("write source");
    }
    JobDescriptor::new(witness, source, id, Some("test-producer".into()))
}

pub fn write_jobs_file(path: &Path, jobs: &[JobDescriptor]) {
    let rows: Vec<serde_json::Value> = jobs
        .iter()
        .map(|j| {
            serde_json::json!([
                j.witness.display().to_string(),
                j.source.display().to_string(),
                j.job_id,
                j.producer
            ])
        })
        .collect();
    std::fs::write(path, serde_json::to_string(&rows).unwrap()).expect("write jobs file");
}
