mod common;

use common::{script_job, sh_runner, sh_settings};
use nitwit_bench::{
    classify::{Bucket, classify},
    runner::{ExitKind, JobRunner, ProcessRunner, Termination},
    shutdown::Shutdown,
};
use std::os::unix::fs::PermissionsExt;
use std::time::{Duration, Instant};

#[test]
fn clean_exit_is_success_without_message() {
    let dir = tempfile::tempdir().unwrap();
    let job = script_job(&dir, "ok", "echo 'VALIDATED ### not a failure'\nexit 0\n");
    let outcome = sh_runner(10.0).run(&job);

    assert_eq!(outcome.exit, ExitKind::Success);
    assert_eq!(outcome.message, "");
    assert_eq!(outcome.job_id, "ok");
    assert_eq!(outcome.producer.as_deref(), Some("test-producer"));
    assert!(outcome.peak_memory_kb > 0);
}

#[test]
fn nonzero_exit_extracts_message() {
    let dir = tempfile::tempdir().unwrap();
    let job = script_job(
        &dir,
        "parse",
        "echo 'blah ### parse error at line 4'\necho 'more text'\nexit 2\n",
    );
    let outcome = sh_runner(10.0).run(&job);

    assert_eq!(outcome.exit, ExitKind::ValidatorCode(2));
    assert_eq!(outcome.message, "parse error at line 4");
    assert_eq!(classify(&outcome), Bucket::BadlyParsed);
}

#[test]
fn out_of_memory_message_overrides_exit_code() {
    let dir = tempfile::tempdir().unwrap();
    let job = script_job(&dir, "oom", "echo 'line 12 ### out of memory'\nexit 1\n");
    let outcome = sh_runner(10.0).run(&job);

    assert_eq!(outcome.exit, ExitKind::OutOfMemory);
    assert_eq!(outcome.exit.status_code(), Some(251));
}

#[test]
fn hanging_validator_is_killed_within_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let job = script_job(&dir, "hang", "exec sleep 30\n");
    let started = Instant::now();
    let outcome = sh_runner(1.0).run(&job);
    let elapsed = started.elapsed();

    assert_eq!(outcome.exit, ExitKind::TimedOut);
    assert_eq!(outcome.exit.status_code(), None);
    assert_eq!(outcome.message, "");
    assert_eq!(classify(&outcome), Bucket::NonValidated);
    assert!(elapsed < Duration::from_secs(4), "took {elapsed:?}");
}

#[test]
fn timed_out_job_ignores_out_of_memory_text() {
    let dir = tempfile::tempdir().unwrap();
    let job = script_job(&dir, "oom-hang", "echo 'x ### out of memory'\nexec sleep 30\n");
    let outcome = sh_runner(1.0).run(&job);

    assert_eq!(outcome.exit, ExitKind::TimedOut);
    assert_eq!(outcome.exit.status_code(), None);
    assert_eq!(outcome.message, "");
    assert_eq!(classify(&outcome), Bucket::NonValidated);
}

#[test]
fn unusable_timeouts_are_rejected_before_any_launch() {
    for timeout in [f64::INFINITY, f64::NAN, 1e30, 0.0, -1.0] {
        let err = ProcessRunner::new(&sh_settings(timeout), Shutdown::new());
        assert!(err.is_err(), "timeout {timeout} accepted");
    }
}

#[test]
fn descendant_outside_the_group_does_not_stall_the_job() {
    let Some(setsid) = ["/usr/bin/setsid", "/bin/setsid"]
        .into_iter()
        .find(|p| std::path::Path::new(p).is_file())
    else {
        return;
    };
    let dir = tempfile::tempdir().unwrap();
    let body = format!("{setsid} sleep 5 &\necho done\nexit 0\n");
    let job = script_job(&dir, "escape", &body);
    let started = Instant::now();
    let outcome = sh_runner(10.0).run(&job);

    assert_eq!(outcome.exit, ExitKind::Success);
    assert!(started.elapsed() < Duration::from_secs(3), "took {:?}", started.elapsed());
}

#[test]
fn forked_descendants_are_killed_with_the_group() {
    let dir = tempfile::tempdir().unwrap();
    // The background sleep keeps stdout open; the reader only finishes once
    // the whole group is gone.
    let job = script_job(&dir, "fork", "sleep 30 &\necho started\nwait\n");
    let started = Instant::now();
    let exec = sh_runner(1.0).execute(&job).unwrap();

    assert_eq!(exec.termination, Termination::TimedOut);
    assert_eq!(String::from_utf8_lossy(&exec.stdout), "started\n");
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn sigterm_resistant_validator_is_force_killed() {
    let dir = tempfile::tempdir().unwrap();
    let job = script_job(&dir, "stubborn", "trap '' TERM\nwhile :; do sleep 1; done\n");
    let started = Instant::now();
    let outcome = sh_runner(0.5).run(&job);

    assert_eq!(outcome.exit, ExitKind::TimedOut);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn signal_death_is_reported_as_signal() {
    let dir = tempfile::tempdir().unwrap();
    let job = script_job(&dir, "segv", "kill -SEGV $$\n");
    let outcome = sh_runner(10.0).run(&job);

    assert_eq!(outcome.exit, ExitKind::SignalKilled(11));
    assert_eq!(outcome.exit.status_code(), Some(11));
    assert_eq!(classify(&outcome), Bucket::BadlyParsed);
}

#[test]
fn error_function_is_passed_as_third_argument() {
    let dir = tempfile::tempdir().unwrap();
    let job = script_job(&dir, "errfn", "[ \"$2\" = \"__VERIFIER_error\" ] && exit 0\nexit 7\n");

    let mut settings = sh_settings(10.0);
    settings.error_function = Some("__VERIFIER_error".into());
    let runner = ProcessRunner::new(&settings, Shutdown::new()).unwrap();
    assert_eq!(runner.run(&job).exit, ExitKind::Success);

    assert_eq!(sh_runner(10.0).run(&job).exit, ExitKind::ValidatorCode(7));
}

#[test]
fn stderr_captured_only_when_enabled() {
    let dir = tempfile::tempdir().unwrap();
    let job = script_job(&dir, "stderr", "echo out\necho err >&2\n");

    let exec = sh_runner(10.0).execute(&job).unwrap();
    assert!(exec.stderr.is_empty());

    let mut settings = sh_settings(10.0);
    settings.capture_stderr = true;
    let runner = ProcessRunner::new(&settings, Shutdown::new()).unwrap();
    let exec = runner.execute(&job).unwrap();
    assert_eq!(String::from_utf8_lossy(&exec.stdout), "out\n");
    assert_eq!(String::from_utf8_lossy(&exec.stderr), "err\n");
}

#[test]
fn cpu_time_is_attributed_to_the_job() {
    let dir = tempfile::tempdir().unwrap();
    let job = script_job(
        &dir,
        "busy",
        "i=0\nwhile [ $i -lt 200000 ]; do i=$((i+1)); done\nexit 0\n",
    );
    let outcome = sh_runner(60.0).run(&job);

    assert_eq!(outcome.exit, ExitKind::Success);
    assert!(outcome.cpu_seconds > 0.0);
}

#[test]
fn shutdown_interrupts_running_job() {
    let dir = tempfile::tempdir().unwrap();
    let job = script_job(&dir, "long", "exec sleep 30\n");
    let shutdown = Shutdown::new();
    let runner = ProcessRunner::new(&sh_settings(60.0), shutdown.clone()).unwrap();

    let trip = shutdown.clone();
    let handle = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(200));
        trip.request();
    });
    let started = Instant::now();
    let outcome = runner.run(&job);
    handle.join().unwrap();

    assert_eq!(outcome.exit, ExitKind::Interrupted);
    assert_eq!(outcome.message, "");
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[test]
fn unlaunchable_executable_is_a_launch_failure() {
    let dir = tempfile::tempdir().unwrap();
    let exe = dir.path().join("not-executable");
    std::fs::write(&exe, "#!/bin/sh\nexit 0\n").unwrap();
    std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o644)).unwrap();

    let mut settings = sh_settings(10.0);
    settings.executable = exe.display().to_string();
    let runner = ProcessRunner::new(&settings, Shutdown::new()).unwrap();
    let job = script_job(&dir, "x", "exit 0\n");
    let outcome = runner.run(&job);

    assert!(matches!(outcome.exit, ExitKind::LaunchFailure(_)));
    assert!(!outcome.message.is_empty());
    assert_eq!(classify(&outcome), Bucket::BadlyParsed);
}

#[test]
fn missing_executable_is_rejected_at_setup() {
    let mut settings = sh_settings(10.0);
    settings.executable = "/definitely/not/here".into();
    assert!(ProcessRunner::new(&settings, Shutdown::new()).is_err());
}
