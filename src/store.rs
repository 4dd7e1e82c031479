use crate::{
    classify::{Bucket, classify},
    config::Layout,
    runner::RawOutcome,
};
use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;

/// Column names, in persisted order.
pub const HEADER: [&str; 6] = ["status", "wit_key", "out", "cpu", "tool", "mem"];
pub const COMBINED_FILE: &str = "results.json";

type Row = (Option<i64>, String, String, f64, Option<String>, u64);

/// One classified job, persisted as a six-column row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "Row", into = "Row")]
pub struct ResultRecord {
    pub status: Option<i64>,
    pub job_id: String,
    pub message: String,
    pub cpu_seconds: f64,
    pub producer: Option<String>,
    pub peak_memory_kb: u64,
}

impl From<Row> for ResultRecord {
    fn from((status, job_id, message, cpu_seconds, producer, peak_memory_kb): Row) -> Self {
        Self {
            status,
            job_id,
            message,
            cpu_seconds,
            producer,
            peak_memory_kb,
        }
    }
}

impl From<ResultRecord> for Row {
    fn from(r: ResultRecord) -> Self {
        (r.status, r.job_id, r.message, r.cpu_seconds, r.producer, r.peak_memory_kb)
    }
}

impl From<&RawOutcome> for ResultRecord {
    fn from(o: &RawOutcome) -> Self {
        Self {
            status: o.exit.status_code(),
            job_id: o.job_id.clone(),
            message: o.message.clone(),
            cpu_seconds: o.cpu_seconds,
            producer: o.producer.clone(),
            peak_memory_kb: o.peak_memory_kb,
        }
    }
}

/// Classified records, one append-only sequence per bucket.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultStore {
    pub validated: Vec<ResultRecord>,
    pub non_validated: Vec<ResultRecord>,
    pub badly_parsed: Vec<ResultRecord>,
}

impl ResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, bucket: Bucket, record: ResultRecord) {
        self.bucket_mut(bucket).push(record);
    }

    /// Classifies `outcome` and appends it; returns the chosen bucket.
    pub fn record_outcome(&mut self, outcome: &RawOutcome) -> Bucket {
        let bucket = classify(outcome);
        self.record(bucket, ResultRecord::from(outcome));
        bucket
    }

    pub fn bucket(&self, bucket: Bucket) -> &[ResultRecord] {
        match bucket {
            Bucket::Validated => &self.validated,
            Bucket::NonValidated => &self.non_validated,
            Bucket::BadlyParsed => &self.badly_parsed,
        }
    }

    fn bucket_mut(&mut self, bucket: Bucket) -> &mut Vec<ResultRecord> {
        match bucket {
            Bucket::Validated => &mut self.validated,
            Bucket::NonValidated => &mut self.non_validated,
            Bucket::BadlyParsed => &mut self.badly_parsed,
        }
    }

    pub fn len(&self) -> usize {
        Bucket::ALL.iter().map(|b| self.bucket(*b).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Looks a record up by job id across all buckets.
    pub fn find(&self, job_id: &str) -> Option<(Bucket, &ResultRecord)> {
        Bucket::ALL.into_iter().find_map(|b| {
            self.bucket(b)
                .iter()
                .find(|r| r.job_id == job_id)
                .map(|r| (b, r))
        })
    }

    /// Writes the store into `dir`, which must already exist.
    pub fn flush(&self, dir: &Path, layout: Layout, write_header: bool) -> Result<()> {
        match layout {
            Layout::Split => {
                for bucket in Bucket::ALL {
                    let path = dir.join(format!("{}.json", bucket.resource_name()));
                    let rows = rows_json(self.bucket(bucket), write_header)?;
                    write_json(&path, &rows)?;
                }
            }
            Layout::Combined => {
                let mut obj = serde_json::Map::new();
                for bucket in Bucket::ALL {
                    obj.insert(
                        bucket.key().to_string(),
                        rows_json(self.bucket(bucket), write_header)?,
                    );
                }
                write_json(&dir.join(COMBINED_FILE), &Value::Object(obj))?;
            }
        }
        Ok(())
    }

    /// Loads a store from a run directory (split files or a combined file
    /// inside it) or from a combined file path.
    pub fn load(path: &Path) -> Result<Self> {
        if path.is_file() {
            return Self::load_combined(path);
        }
        if !path.is_dir() {
            bail!("result store not found: {}", path.display());
        }

        let combined = path.join(COMBINED_FILE);
        let split_present = Bucket::ALL
            .iter()
            .any(|b| path.join(format!("{}.json", b.resource_name())).is_file());
        if !split_present && combined.is_file() {
            return Self::load_combined(&combined);
        }

        let mut store = Self::new();
        for bucket in Bucket::ALL {
            let file = path.join(format!("{}.json", bucket.resource_name()));
            let value = read_json(&file)?;
            *store.bucket_mut(bucket) = parse_rows(value)
                .with_context(|| format!("parsing {}", file.display()))?;
        }
        Ok(store)
    }

    fn load_combined(path: &Path) -> Result<Self> {
        let value = read_json(path)?;
        let Value::Object(mut obj) = value else {
            bail!("combined result file is not a JSON object: {}", path.display());
        };
        let mut store = Self::new();
        for bucket in Bucket::ALL {
            let rows = obj.remove(bucket.key()).ok_or_else(|| {
                anyhow!("combined result file lacks '{}': {}", bucket.key(), path.display())
            })?;
            *store.bucket_mut(bucket) = parse_rows(rows)
                .with_context(|| format!("parsing '{}' in {}", bucket.key(), path.display()))?;
        }
        Ok(store)
    }
}

fn rows_json(records: &[ResultRecord], write_header: bool) -> Result<Value> {
    let mut rows = Vec::with_capacity(records.len() + 1);
    if write_header {
        rows.push(serde_json::to_value(HEADER)?);
    }
    for r in records {
        rows.push(serde_json::to_value(r)?);
    }
    Ok(Value::Array(rows))
}

fn is_header(row: &Value) -> bool {
    match row.as_array() {
        Some(cols) => {
            cols.len() == HEADER.len()
                && cols.iter().zip(HEADER).all(|(c, h)| c.as_str() == Some(h))
        }
        None => false,
    }
}

fn parse_rows(value: Value) -> Result<Vec<ResultRecord>> {
    let Value::Array(rows) = value else {
        bail!("expected a JSON array of records");
    };
    let mut out = Vec::with_capacity(rows.len());
    for (i, row) in rows.into_iter().enumerate() {
        if i == 0 && is_header(&row) {
            continue;
        }
        let rec: ResultRecord =
            serde_json::from_value(row).with_context(|| format!("record {i}"))?;
        out.push(rec);
    }
    Ok(out)
}

fn read_json(path: &Path) -> Result<Value> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading results: {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing JSON: {}", path.display()))
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    let raw = serde_json::to_string(value)?;
    std::fs::write(path, raw).with_context(|| format!("writing results: {}", path.display()))
}
