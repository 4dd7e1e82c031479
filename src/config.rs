use anyhow::{Context, Result, anyhow, bail};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub validator: Validator,
    #[serde(default)]
    pub pool: Pool,
    #[serde(default)]
    pub inputs: Inputs,
    #[serde(default)]
    pub output: Output,
    #[serde(default)]
    pub logging: Logging,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config: {}", path.display()))?;
        let cfg: Config = toml::from_str(&raw).with_context(|| "parsing TOML")?;
        Ok(cfg)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Validator {
    pub executable: String,
    /// Optional third argument passed after the witness and source paths.
    #[serde(default)]
    pub error_function: Option<String>,
    pub timeout_seconds: f64,
    pub kill_grace_ms: u64,
    pub poll_interval_ms: u64,
    pub capture_stderr: bool,
}
impl Default for Validator {
    fn default() -> Self {
        Self {
            executable: "".into(),
            error_function: None,
            timeout_seconds: 300.0,
            kill_grace_ms: 2000,
            poll_interval_ms: 50,
            capture_stderr: false,
        }
    }
}

impl Validator {
    /// The per-job timeout. Rejects values that are not positive or do not
    /// fit a `Duration` (NaN, infinity, absurdly large).
    pub fn timeout(&self) -> Result<Duration> {
        let secs = self.timeout_seconds;
        if secs.is_nan() || secs <= 0.0 {
            bail!("timeout must be positive: {secs}");
        }
        Duration::try_from_secs_f64(secs).map_err(|e| anyhow!("invalid timeout {secs}: {e}"))
    }

    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pool {
    pub workers: usize,
    pub progress_every: usize,
    #[serde(default)]
    pub limit: Option<usize>,
}
impl Default for Pool {
    fn default() -> Self {
        Self {
            workers: 48,
            progress_every: 500,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Inputs {
    #[serde(default)]
    pub witnesses_dir: Option<String>,
    #[serde(default)]
    pub sources_dir: Option<String>,
    #[serde(default)]
    pub skip_missing: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Layout {
    Split,
    Combined,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Output {
    pub out_dir: String,
    pub layout: Layout,
    pub write_header: bool,
    pub write_index_json: bool,
    pub print_summary: bool,
}
impl Default for Output {
    fn default() -> Self {
        Self {
            out_dir: "output".into(),
            layout: Layout::Split,
            write_header: true,
            write_index_json: true,
            print_summary: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Logging {
    pub level: String,
    pub json: bool,
    pub write_to_file: bool,
    pub file_path: String,
}
impl Default for Logging {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json: false,
            write_to_file: true,
            file_path: "".into(),
        }
    }
}
