use crate::{classify::Bucket, store::ResultStore};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketCounts {
    pub validated: usize,
    pub non_validated: usize,
    pub badly_parsed: usize,
}

impl BucketCounts {
    pub fn from_store(store: &ResultStore) -> Self {
        Self {
            validated: store.validated.len(),
            non_validated: store.non_validated.len(),
            badly_parsed: store.badly_parsed.len(),
        }
    }

    pub fn get(&self, bucket: Bucket) -> usize {
        match bucket {
            Bucket::Validated => self.validated,
            Bucket::NonValidated => self.non_validated,
            Bucket::BadlyParsed => self.badly_parsed,
        }
    }
}

/// Contents of `index.json` in a run directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunIndex {
    pub started: String,
    pub finished: String,
    pub executable: String,
    pub timeout_seconds: f64,
    pub workers: usize,
    pub jobs_file: String,
    pub jobs_sha256: String,
    pub jobs_submitted: usize,
    pub skipped: usize,
    pub interrupted: usize,
    pub launch_failures: usize,
    pub counts: BucketCounts,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: Option<i64>,
    pub description: String,
    pub count: usize,
}

/// Per-bucket counts plus a status histogram of a loaded store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreSummary {
    pub counts: BucketCounts,
    pub by_status: BTreeMap<String, Vec<StatusCount>>,
}

pub fn summarize(store: &ResultStore) -> StoreSummary {
    let mut by_status = BTreeMap::new();
    for bucket in Bucket::ALL {
        let mut hist: BTreeMap<Option<i64>, usize> = BTreeMap::new();
        for r in store.bucket(bucket) {
            *hist.entry(r.status).or_insert(0) += 1;
        }
        let rows = hist
            .into_iter()
            .map(|(status, count)| StatusCount {
                status,
                description: crate::classify::describe_status(status).to_string(),
                count,
            })
            .collect();
        by_status.insert(bucket.key().to_string(), rows);
    }
    StoreSummary {
        counts: BucketCounts::from_store(store),
        by_status,
    }
}
