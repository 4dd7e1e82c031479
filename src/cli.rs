use crate::{
    classify::{self, Bucket},
    config::Config,
    job::{JobDescriptor, load_jobs},
    pool::WorkerPool,
    report::{self, BucketCounts, RunIndex},
    runner::{ExitKind, ProcessRunner, RawOutcome},
    shutdown::Shutdown,
    store::{ResultRecord, ResultStore},
    util::{create_run_dir, ensure_dir, hash_file, now_rfc3339, run_stamp},
};
use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer, Registry, layer::SubscriberExt, reload, util::SubscriberInitExt,
};

/// Slot for the run-directory log file, filled once the directory exists.
type FileLayer = Option<Box<dyn Layer<Registry> + Send + Sync>>;
type FileLayerHandle = reload::Handle<FileLayer, Registry>;

#[derive(Parser, Debug)]
#[command(name = "nitwit-bench")]
#[command(about = "Runs a witness validator over a job list with a bounded process pool")]
pub struct Args {
    #[command(subcommand)]
    pub cmd: Command,

    /// Path to config TOML. If omitted, uses ./nitwit-bench.toml if present.
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Override log level (trace/debug/info/warn/error).
    #[arg(long)]
    pub log_level: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Validate every job in a job list and store the classified results.
    Run {
        /// JSON array of [witness, source, job_id, producer?] entries.
        #[arg(long)]
        jobs: PathBuf,
        #[arg(long = "exec")]
        executable: Option<PathBuf>,
        /// Per-job timeout in seconds.
        #[arg(long)]
        timeout: Option<f64>,
        #[arg(long, short = 'p')]
        workers: Option<usize>,
        /// Only run the first N jobs.
        #[arg(long, short = 'l')]
        limit: Option<usize>,
        #[arg(long)]
        out_dir: Option<PathBuf>,
        #[arg(long)]
        error_function: Option<String>,
        /// Root for relative witness paths.
        #[arg(long)]
        witnesses: Option<PathBuf>,
        /// Root for relative source paths.
        #[arg(long)]
        sources: Option<PathBuf>,
    },
    /// Run one job with both output streams echoed; nothing is stored.
    Single {
        #[arg(long)]
        witness: PathBuf,
        #[arg(long)]
        source: PathBuf,
        #[arg(long, default_value = "single")]
        job_id: String,
        #[arg(long = "exec")]
        executable: Option<PathBuf>,
        #[arg(long)]
        timeout: Option<f64>,
    },
    /// Print bucket counts and a status histogram of a stored run.
    Summarize {
        #[arg(long)]
        results: PathBuf,
    },
}

pub fn dispatch(args: Args) -> Result<()> {
    let mut cfg = match resolve_config_path(args.config.as_deref()) {
        Some(path) => Config::load(&path)?,
        None => Config::default(),
    };

    match &args.cmd {
        Command::Run {
            jobs,
            executable,
            timeout,
            workers,
            limit,
            out_dir,
            error_function,
            witnesses,
            sources,
        } => {
            if let Some(p) = executable {
                cfg.validator.executable = p.display().to_string();
            }
            if let Some(t) = timeout {
                cfg.validator.timeout_seconds = *t;
            }
            if let Some(n) = workers {
                cfg.pool.workers = *n;
            }
            if limit.is_some() {
                cfg.pool.limit = *limit;
            }
            if let Some(d) = out_dir {
                cfg.output.out_dir = d.display().to_string();
            }
            if error_function.is_some() {
                cfg.validator.error_function = error_function.clone();
            }
            if let Some(d) = witnesses {
                cfg.inputs.witnesses_dir = Some(d.display().to_string());
            }
            if let Some(d) = sources {
                cfg.inputs.sources_dir = Some(d.display().to_string());
            }
            run(&args, &cfg, jobs)
        }
        Command::Single {
            witness,
            source,
            job_id,
            executable,
            timeout,
        } => {
            if let Some(p) = executable {
                cfg.validator.executable = p.display().to_string();
            }
            if let Some(t) = timeout {
                cfg.validator.timeout_seconds = *t;
            }
            cfg.validator.capture_stderr = true;
            init_logging(&args, &cfg)?;
            let job = JobDescriptor::new(witness, source, job_id.clone(), None);
            single(&cfg, &job)
        }
        Command::Summarize { results } => {
            init_logging(&args, &cfg)?;
            summarize(results)
        }
    }
}

fn resolve_config_path(user: Option<&Path>) -> Option<PathBuf> {
    if let Some(p) = user {
        return Some(p.to_path_buf());
    }
    let default = PathBuf::from("nitwit-bench.toml");
    default.exists().then_some(default)
}

/// Brings up stdout logging. The returned handle can attach a log file later
/// with [`attach_log_file`].
fn init_logging(args: &Args, cfg: &Config) -> Result<FileLayerHandle> {
    let level = args
        .log_level
        .as_deref()
        .unwrap_or(cfg.logging.level.as_str());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let stdout_layer = if cfg.logging.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .boxed()
    };

    let no_file: FileLayer = None;
    let (file_layer, handle) = reload::Layer::new(no_file);

    tracing_subscriber::registry()
        .with(file_layer)
        .with(filter)
        .with(stdout_layer)
        .try_init()
        .map_err(|e| anyhow!("failed to init logging: {e}"))?;

    Ok(handle)
}

fn attach_log_file(handle: &FileLayerHandle, path: &Path) -> Result<WorkerGuard> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    ensure_dir(parent)?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("create log file: {}", path.display()))?;
    let (non_blocking, guard) = tracing_appender::non_blocking(file);
    let layer: Box<dyn Layer<Registry> + Send + Sync> = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .boxed();
    handle
        .reload(Some(layer))
        .map_err(|e| anyhow!("failed to attach log file: {e}"))?;
    Ok(guard)
}

/// Setup checks that must pass before any job is started.
fn check_setup(cfg: &Config, jobs_file: &Path) -> Result<()> {
    let exe = Path::new(&cfg.validator.executable);
    if cfg.validator.executable.is_empty() {
        bail!("no validator executable configured (use --exec)");
    }
    if !exe.is_file() {
        bail!("the executable {} doesn't exist or isn't a file", exe.display());
    }
    if !jobs_file.is_file() {
        bail!("could not read job list {}: not a file", jobs_file.display());
    }
    for dir in [&cfg.inputs.witnesses_dir, &cfg.inputs.sources_dir]
        .into_iter()
        .flatten()
    {
        if !Path::new(dir).is_dir() {
            bail!("the directory {dir} doesn't exist or is not a directory");
        }
    }
    cfg.validator.timeout()?;
    if cfg.pool.workers == 0 {
        bail!("worker count must be at least 1");
    }
    Ok(())
}

fn run(args: &Args, cfg: &Config, jobs_file: &Path) -> Result<()> {
    check_setup(cfg, jobs_file)?;
    let logging = init_logging(args, cfg)?;
    let jobs = load_jobs(jobs_file, &cfg.inputs, cfg.pool.limit)?;
    let jobs_sha256 = hash_file(jobs_file)?;
    let shutdown = Shutdown::with_signal_handlers()?;
    let runner = ProcessRunner::new(&cfg.validator, shutdown.clone())?;

    // Nothing is written under out_dir until every setup check has passed.
    let exe_name = runner
        .executable()
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "validator".to_string());
    let run_dir = create_run_dir(Path::new(&cfg.output.out_dir), &exe_name, &run_stamp())?;
    let _guard = match resolve_log_path(cfg, &run_dir) {
        Some(path) => Some(attach_log_file(&logging, &path)?),
        None => None,
    };
    info!("run dir {}", run_dir.display());

    let started = now_rfc3339();

    let pool = WorkerPool::new(&runner, cfg.pool.workers, shutdown.clone())
        .with_progress_every(cfg.pool.progress_every);
    let report = pool.run(jobs);

    let mut store = ResultStore::new();
    let mut interrupted = 0usize;
    let mut launch_failures = 0usize;
    for outcome in &report.outcomes {
        match outcome.exit {
            ExitKind::Interrupted => {
                interrupted += 1;
                continue;
            }
            ExitKind::LaunchFailure(_) => launch_failures += 1,
            _ => {}
        }
        if let Some(msg) = classify::operator_warning(outcome) {
            warn!("{msg}");
        }
        store.record_outcome(outcome);
    }

    store.flush(&run_dir, cfg.output.layout, cfg.output.write_header)?;
    let counts = BucketCounts::from_store(&store);

    if cfg.output.write_index_json {
        let index = RunIndex {
            started,
            finished: now_rfc3339(),
            executable: runner.executable().display().to_string(),
            timeout_seconds: cfg.validator.timeout_seconds,
            workers: report.workers_started,
            jobs_file: jobs_file.display().to_string(),
            jobs_sha256,
            jobs_submitted: report.jobs_submitted,
            skipped: report.skipped(),
            interrupted,
            launch_failures,
            counts: counts.clone(),
        };
        std::fs::write(run_dir.join("index.json"), serde_json::to_string_pretty(&index)?)
            .with_context(|| "writing index.json")?;
    }

    for bucket in Bucket::ALL {
        info!("{}: {}", bucket.key(), counts.get(bucket));
    }
    if cfg.output.print_summary {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "run_dir": run_dir,
                "counts": counts,
                "skipped": report.skipped(),
                "interrupted": interrupted,
                "launch_failures": launch_failures,
            }))?
        );
    }

    if report.interrupted {
        bail!(
            "run interrupted; partial results for {} of {} jobs written to {}",
            store.len(),
            report.jobs_submitted,
            run_dir.display()
        );
    }
    Ok(())
}

fn single(cfg: &Config, job: &JobDescriptor) -> Result<()> {
    let runner = ProcessRunner::new(&cfg.validator, Shutdown::with_signal_handlers()?)?;
    let outcome = match runner.execute(job) {
        Ok(exec) => {
            println!("{}Stdout{}", "-".repeat(20), "-".repeat(20));
            println!("{}", String::from_utf8_lossy(&exec.stdout));
            println!("{}", "=".repeat(46));
            println!("{}Stderr{}", "-".repeat(20), "-".repeat(20));
            println!("{}", String::from_utf8_lossy(&exec.stderr));
            runner.outcome(job, &exec)
        }
        Err(err) => RawOutcome::launch_failure(&job.job_id, None, format!("{err:#}")),
    };
    let bucket = classify::classify(&outcome);
    if let Some(msg) = classify::operator_warning(&outcome) {
        warn!("{msg}");
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "bucket": bucket,
            "exit": outcome.exit,
            "record": ResultRecord::from(&outcome),
        }))?
    );
    Ok(())
}

fn summarize(results: &Path) -> Result<()> {
    let store = ResultStore::load(results)?;
    let summary = report::summarize(&store);
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

fn resolve_log_path(cfg: &Config, run_dir: &Path) -> Option<PathBuf> {
    if !cfg.logging.write_to_file {
        return None;
    }

    if !cfg.logging.file_path.is_empty() {
        return Some(PathBuf::from(&cfg.logging.file_path));
    }

    Some(run_dir.join("logs").join("nitwit-bench.log"))
}
