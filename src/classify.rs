use crate::runner::{ExitKind, RawOutcome, codes};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Validated,
    NonValidated,
    BadlyParsed,
}

impl Bucket {
    pub const ALL: [Bucket; 3] = [Bucket::Validated, Bucket::NonValidated, Bucket::BadlyParsed];

    /// Name of the bucket's persisted collection.
    pub fn resource_name(self) -> &'static str {
        match self {
            Bucket::Validated => "validated_witnesses",
            Bucket::NonValidated => "non_validated_witnesses",
            Bucket::BadlyParsed => "badly_parsed_witnesses",
        }
    }

    pub fn key(self) -> &'static str {
        match self {
            Bucket::Validated => "validated",
            Bucket::NonValidated => "non_validated",
            Bucket::BadlyParsed => "badly_parsed",
        }
    }
}

pub fn classify(outcome: &RawOutcome) -> Bucket {
    classify_exit(&outcome.exit)
}

/// The one mapping from exit kinds to buckets.
pub fn classify_exit(exit: &ExitKind) -> Bucket {
    use codes::*;

    match exit {
        ExitKind::TimedOut | ExitKind::Interrupted => Bucket::NonValidated,
        ExitKind::SignalKilled(SIGKILL) => Bucket::NonValidated,
        ExitKind::Success => Bucket::Validated,
        ExitKind::ValidatorCode(VIOLATION_CALLED_OUTSIDE_VIOLATION_STATE) => Bucket::Validated,
        ExitKind::ValidatorCode(
            NO_WITNESS | WITNESS_IN_SINK | PROGRAM_FINISHED | WITNESS_IN_ILLEGAL_STATE
            | UNVALIDATED_VIOLATION,
        ) => Bucket::NonValidated,
        ExitKind::ValidatorCode(IDENTIFIER_UNDEFINED | ALREADY_DEFINED) => Bucket::BadlyParsed,
        ExitKind::ValidatorCode(WITNESS_PARSE_ERROR) => Bucket::BadlyParsed,
        ExitKind::ValidatorCode(BAD_USAGE) => Bucket::BadlyParsed,
        ExitKind::ValidatorCode(RESULT_UNKNOWN | ERROR_FUNCTION_NOT_CALLED | UNSUPPORTED_NONDET_OP) => {
            Bucket::NonValidated
        }
        ExitKind::LaunchFailure(_) => Bucket::BadlyParsed,
        ExitKind::OutOfMemory => Bucket::BadlyParsed,
        _ => Bucket::BadlyParsed,
    }
}

/// Outcomes that point at the harness rather than the witness.
pub fn operator_warning(outcome: &RawOutcome) -> Option<String> {
    match &outcome.exit {
        ExitKind::ValidatorCode(codes::BAD_USAGE) => {
            Some(format!("bad usage reported for job {}", outcome.job_id))
        }
        ExitKind::LaunchFailure(reason) => {
            Some(format!("launch failure for job {}: {}", outcome.job_id, reason))
        }
        _ => None,
    }
}

/// Human description of a stored status code.
pub fn describe_status(status: Option<i64>) -> &'static str {
    let Some(code) = status else {
        return "killed (timeout) or not started";
    };
    match code {
        0 => "validated",
        2 => "witness parse error",
        3 => "usage error",
        4 => "unspecified error, probably parsing C",
        5 => "error function not called",
        6 => "validator aborted",
        9 => "killed",
        11 => "segmentation fault",
        240 => "no witness",
        241 => "witness got to sink",
        242 => "program finished before violation node reached",
        243 => "witness got into an illegal state",
        244 => "identifier undefined",
        245 => "error function called, but witness not in violation state",
        246 => "identifier already defined",
        247 => "unsupported nondet operation",
        248 => "assertion failed",
        249 => "bad function definition",
        250 => "witness in violation state, though no violation occurred",
        251 => "out of memory",
        _ => "unknown",
    }
}
