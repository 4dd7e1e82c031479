use super::{
    JobRunner,
    rusage::{self, Reaped},
    types::{ExitKind, JobUsage, RawOutcome},
};
use crate::{config::Validator, job::JobDescriptor, message, shutdown::Shutdown};
use anyhow::{Context, Result, anyhow};
use crossbeam_channel::Receiver;
use std::io::Read;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Exited,
    TimedOut,
    Interrupted,
}

/// Everything observed about one validator process.
#[derive(Debug, Clone)]
pub struct Execution {
    pub status: libc::c_int,
    pub termination: Termination,
    pub usage: JobUsage,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    pub wall: Duration,
}

pub struct ProcessRunner {
    settings: Validator,
    executable: PathBuf,
    timeout: Duration,
    shutdown: Shutdown,
}

impl ProcessRunner {
    pub fn new(settings: &Validator, shutdown: Shutdown) -> Result<Self> {
        let timeout = settings.timeout()?;
        let executable = PathBuf::from(&settings.executable);
        if !executable.is_file() {
            return Err(anyhow!(
                "validator executable does not exist or is not a file: {}",
                executable.display()
            ));
        }
        let executable = executable
            .canonicalize()
            .with_context(|| format!("canonicalize executable: {}", executable.display()))?;
        Ok(Self {
            settings: settings.clone(),
            executable,
            timeout,
            shutdown,
        })
    }

    pub fn executable(&self) -> &std::path::Path {
        &self.executable
    }

    /// Launches the validator for `job` and waits for it, killing its whole
    /// process group on timeout or interruption.
    ///
    /// `Err` means the process could not be started or reaped.
    pub fn execute(&self, job: &JobDescriptor) -> Result<Execution> {
        let mut cmd = Command::new(&self.executable);
        cmd.arg(&job.witness).arg(&job.source);
        if let Some(f) = &self.settings.error_function {
            cmd.arg(f);
        }
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(if self.settings.capture_stderr {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.process_group(0);

        debug!("job {} launch {}", job.job_id, self.executable.display());
        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning validator: {}", self.executable.display()))?;
        let pid = child.id() as libc::pid_t;

        // Drain pipes while waiting so a chatty validator can't block on a
        // full pipe buffer.
        let stdout_rx = spawn_reader(child.stdout.take());
        let stderr_rx = spawn_reader(child.stderr.take());

        let started = Instant::now();
        let waited = self.wait(pid, started);
        // Whatever the leader did, nothing in its group may outlive the job.
        rusage::signal_group(pid, libc::SIGKILL);
        let (reaped, termination) = match waited {
            Ok(w) => w,
            Err(err) => {
                let _ = rusage::reap(pid, true);
                return Err(err);
            }
        };

        let grace = self.settings.kill_grace();
        let stdout = collect(&stdout_rx, grace, &job.job_id, "stdout");
        let stderr = collect(&stderr_rx, grace, &job.job_id, "stderr");
        drop(child);

        Ok(Execution {
            status: reaped.status,
            termination,
            usage: reaped.usage,
            stdout,
            stderr,
            wall: started.elapsed(),
        })
    }

    fn wait(&self, pid: libc::pid_t, started: Instant) -> Result<(Reaped, Termination)> {
        let timeout = self.timeout;
        let poll = self.settings.poll_interval();
        loop {
            if let Some(reaped) = rusage::reap(pid, false)? {
                return Ok((reaped, Termination::Exited));
            }
            if self.shutdown.is_requested() {
                debug!("pid {pid} interrupted");
                return Ok((self.terminate(pid)?, Termination::Interrupted));
            }
            if started.elapsed() >= timeout {
                warn!("pid {pid} timed out after {:?}", timeout);
                return Ok((self.terminate(pid)?, Termination::TimedOut));
            }
            std::thread::sleep(poll);
        }
    }

    /// SIGTERM the group, give it the grace period, then SIGKILL and reap.
    fn terminate(&self, pid: libc::pid_t) -> Result<Reaped> {
        rusage::signal_group(pid, libc::SIGTERM);
        let deadline = Instant::now() + self.settings.kill_grace();
        while Instant::now() < deadline {
            if let Some(reaped) = rusage::reap(pid, false)? {
                return Ok(reaped);
            }
            std::thread::sleep(self.settings.poll_interval());
        }
        warn!("pid {pid} survived SIGTERM; sending SIGKILL");
        rusage::signal_group(pid, libc::SIGKILL);
        rusage::reap(pid, true)?.ok_or_else(|| anyhow!("pid {pid} could not be reaped"))
    }

    /// Turns an execution into the outcome record for `job`.
    ///
    /// Output of a job the harness killed is not inspected: its outcome is
    /// the timeout or interrupt itself, with an empty message.
    pub fn outcome(&self, job: &JobDescriptor, exec: &Execution) -> RawOutcome {
        let (exit, msg) = match exec.termination {
            Termination::TimedOut => (ExitKind::TimedOut, String::new()),
            Termination::Interrupted => (ExitKind::Interrupted, String::new()),
            Termination::Exited => {
                let exit = ExitKind::from_wait_status(exec.status);
                let stdout = String::from_utf8_lossy(&exec.stdout);
                let msg = message::extract_message(&stdout, &exit);
                if message::indicates_out_of_memory(&msg) {
                    (ExitKind::OutOfMemory, msg)
                } else {
                    (exit, msg)
                }
            }
        };

        RawOutcome {
            job_id: job.job_id.clone(),
            producer: job.producer.clone(),
            exit,
            cpu_seconds: exec.usage.cpu_seconds(),
            peak_memory_kb: exec.usage.peak_memory_kb,
            message: msg,
        }
    }
}

impl JobRunner for ProcessRunner {
    fn run(&self, job: &JobDescriptor) -> RawOutcome {
        match self.execute(job) {
            Ok(exec) => {
                let outcome = self.outcome(job, &exec);
                debug!(
                    "job {} finished exit={:?} cpu={:.3}s mem={}KB wall={:?}",
                    job.job_id, outcome.exit, outcome.cpu_seconds, outcome.peak_memory_kb, exec.wall
                );
                outcome
            }
            Err(err) => {
                warn!("job {} could not be run: {:#}", job.job_id, err);
                RawOutcome::launch_failure(&job.job_id, job.producer.clone(), format!("{err:#}"))
            }
        }
    }
}

/// Reads `src` to EOF on its own thread.
///
/// EOF only arrives once every holder of the pipe is gone. A descendant that
/// left the process group (e.g. through `setsid`) survives the group kill and
/// keeps the pipe open; [`collect`] gives up on it after the grace period, but
/// the reader thread stays blocked until that descendant exits.
fn spawn_reader<R: Read + Send + 'static>(src: Option<R>) -> Receiver<Vec<u8>> {
    let (tx, rx) = crossbeam_channel::bounded(1);
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut src) = src {
            // A read error keeps whatever arrived before it.
            let _ = src.read_to_end(&mut buf);
        }
        let _ = tx.send(buf);
    });
    rx
}

fn collect(rx: &Receiver<Vec<u8>>, grace: Duration, job_id: &str, stream: &str) -> Vec<u8> {
    match rx.recv_timeout(grace) {
        Ok(buf) => buf,
        Err(_) => {
            warn!("job {job_id}: {stream} still held open after exit; discarding");
            Vec::new()
        }
    }
}
