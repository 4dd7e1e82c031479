use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Validator-specific exit codes.
pub mod codes {
    pub const WITNESS_PARSE_ERROR: i32 = 2;
    pub const BAD_USAGE: i32 = 3;
    pub const RESULT_UNKNOWN: i32 = 4;
    pub const ERROR_FUNCTION_NOT_CALLED: i32 = 5;
    pub const NO_WITNESS: i32 = 240;
    pub const WITNESS_IN_SINK: i32 = 241;
    pub const PROGRAM_FINISHED: i32 = 242;
    pub const WITNESS_IN_ILLEGAL_STATE: i32 = 243;
    pub const IDENTIFIER_UNDEFINED: i32 = 244;
    pub const VIOLATION_CALLED_OUTSIDE_VIOLATION_STATE: i32 = 245;
    pub const ALREADY_DEFINED: i32 = 246;
    pub const UNSUPPORTED_NONDET_OP: i32 = 247;
    pub const ASSERTION_FAILED: i32 = 248;
    pub const BAD_FUNCTION_DEF: i32 = 249;
    pub const UNVALIDATED_VIOLATION: i32 = 250;
    pub const OUT_OF_MEMORY: i32 = 251;

    pub const SIGKILL: i32 = 9;
}

/// How a validator run ended, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExitKind {
    Success,
    ValidatorCode(i32),
    SignalKilled(i32),
    /// Killed by the harness after the per-job timeout.
    TimedOut,
    /// Killed by the harness because the run was interrupted.
    Interrupted,
    LaunchFailure(String),
    OutOfMemory,
}

impl ExitKind {
    pub fn from_exit_code(code: i32) -> Self {
        if code == 0 {
            ExitKind::Success
        } else {
            ExitKind::ValidatorCode(code)
        }
    }

    /// Decodes a raw `wait` status word.
    pub fn from_wait_status(status: libc::c_int) -> Self {
        if libc::WIFEXITED(status) {
            Self::from_exit_code(libc::WEXITSTATUS(status))
        } else if libc::WIFSIGNALED(status) {
            ExitKind::SignalKilled(libc::WTERMSIG(status))
        } else {
            ExitKind::ValidatorCode(status)
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ExitKind::Success)
    }

    /// Flat status as stored in result records; `None` when the harness
    /// killed the process or never started it.
    pub fn status_code(&self) -> Option<i64> {
        match self {
            ExitKind::Success => Some(0),
            ExitKind::ValidatorCode(c) => Some(i64::from(*c).abs()),
            ExitKind::SignalKilled(s) => Some(i64::from(*s).abs()),
            ExitKind::OutOfMemory => Some(i64::from(codes::OUT_OF_MEMORY)),
            ExitKind::TimedOut | ExitKind::Interrupted | ExitKind::LaunchFailure(_) => None,
        }
    }
}

/// Resource usage attributed to one job's process tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JobUsage {
    pub user_time: Duration,
    pub sys_time: Duration,
    pub peak_memory_kb: u64,
}

impl JobUsage {
    pub fn cpu_seconds(&self) -> f64 {
        self.user_time.saturating_add(self.sys_time).as_secs_f64()
    }
}

/// Result of running one job, produced exactly once per job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawOutcome {
    pub job_id: String,
    pub producer: Option<String>,
    pub exit: ExitKind,
    pub cpu_seconds: f64,
    pub peak_memory_kb: u64,
    pub message: String,
}

impl RawOutcome {
    pub fn launch_failure(job_id: &str, producer: Option<String>, reason: String) -> Self {
        Self {
            job_id: job_id.to_string(),
            producer,
            exit: ExitKind::LaunchFailure(reason.clone()),
            cpu_seconds: 0.0,
            peak_memory_kb: 0,
            message: reason,
        }
    }
}
