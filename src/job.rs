use crate::config::Inputs;
use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// One (witness, source) pair handed to the validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub witness: PathBuf,
    pub source: PathBuf,
    pub job_id: String,
    #[serde(default)]
    pub producer: Option<String>,
}

impl JobDescriptor {
    pub fn new(
        witness: impl Into<PathBuf>,
        source: impl Into<PathBuf>,
        job_id: impl Into<String>,
        producer: Option<String>,
    ) -> Self {
        Self {
            witness: witness.into(),
            source: source.into(),
            job_id: job_id.into(),
            producer,
        }
    }
}

/// Accepted shapes of a single job-list entry.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum JobEntry {
    WithProducer(String, String, String, Option<String>),
    Plain(String, String, String),
    Object {
        #[serde(alias = "witness_path")]
        witness: String,
        #[serde(alias = "source_path")]
        source: String,
        #[serde(alias = "id")]
        job_id: String,
        #[serde(default, alias = "tool")]
        producer: Option<String>,
    },
}

impl From<JobEntry> for JobDescriptor {
    fn from(e: JobEntry) -> Self {
        match e {
            JobEntry::WithProducer(w, s, id, p) => JobDescriptor::new(w, s, id, p),
            JobEntry::Plain(w, s, id) => JobDescriptor::new(w, s, id, None),
            JobEntry::Object {
                witness,
                source,
                job_id,
                producer,
            } => JobDescriptor::new(witness, source, job_id, producer),
        }
    }
}

pub fn parse_jobs(raw: &str) -> Result<Vec<JobDescriptor>> {
    let entries: Vec<JobEntry> =
        serde_json::from_str(raw).with_context(|| "parsing job list JSON")?;
    Ok(entries.into_iter().map(JobDescriptor::from).collect())
}

/// Reads the job list, applies the limit and resolves paths against the
/// configured input roots.
pub fn load_jobs(path: &Path, inputs: &Inputs, limit: Option<usize>) -> Result<Vec<JobDescriptor>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading job list: {}", path.display()))?;
    let mut jobs = parse_jobs(&raw)?;
    if let Some(limit) = limit {
        jobs.truncate(limit);
    }

    let witness_root = inputs.witnesses_dir.as_deref().map(Path::new);
    let source_root = inputs.sources_dir.as_deref().map(Path::new);
    for job in &mut jobs {
        job.witness = resolve(witness_root, &job.witness);
        job.source = resolve(source_root, &job.source);
    }

    check_unique_ids(&jobs)?;
    let jobs = check_inputs_exist(jobs, inputs.skip_missing)?;
    info!("loaded {} jobs from {}", jobs.len(), path.display());
    Ok(jobs)
}

fn resolve(root: Option<&Path>, p: &Path) -> PathBuf {
    match root {
        Some(root) if p.is_relative() => root.join(p),
        _ => p.to_path_buf(),
    }
}

fn check_unique_ids(jobs: &[JobDescriptor]) -> Result<()> {
    let mut seen = HashSet::with_capacity(jobs.len());
    for job in jobs {
        if !seen.insert(job.job_id.as_str()) {
            bail!("duplicate job id in job list: {}", job.job_id);
        }
    }
    Ok(())
}

fn check_inputs_exist(jobs: Vec<JobDescriptor>, skip_missing: bool) -> Result<Vec<JobDescriptor>> {
    let mut kept = Vec::with_capacity(jobs.len());
    for job in jobs {
        let missing = [&job.witness, &job.source]
            .into_iter()
            .find(|p| !p.is_file())
            .cloned();
        match missing {
            None => kept.push(job),
            Some(p) if skip_missing => {
                warn!("skipping job {}: missing input {}", job.job_id, p.display());
            }
            Some(p) => {
                return Err(anyhow!(
                    "job {} references a missing input: {}",
                    job.job_id,
                    p.display()
                ));
            }
        }
    }
    Ok(kept)
}
