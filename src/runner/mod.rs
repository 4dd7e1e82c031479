pub mod process;
pub mod rusage;
pub mod types;

use crate::job::JobDescriptor;

pub use process::{Execution, ProcessRunner, Termination};
pub use types::{ExitKind, JobUsage, RawOutcome, codes};

/// Runs one job to completion. Implementations never fail: every problem,
/// including a validator that cannot be started, is reported in the outcome.
pub trait JobRunner: Sync {
    fn run(&self, job: &JobDescriptor) -> RawOutcome;
}
