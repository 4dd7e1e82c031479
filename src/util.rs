use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;

pub fn ensure_dir(p: &Path) -> Result<()> {
    std::fs::create_dir_all(p).with_context(|| format!("create_dir_all {}", p.display()))
}

pub fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_else(|_| "1970-01-01T00:00:00Z".to_string())
}

/// `YYYY-MM-DD_HH-MM-SS`, safe for directory names.
pub fn run_stamp() -> String {
    let fmt = time::format_description::parse("[year]-[month]-[day]_[hour]-[minute]-[second]");
    fmt.ok()
        .and_then(|f| time::OffsetDateTime::now_utc().format(&f).ok())
        .unwrap_or_else(|| "1970-01-01_00-00-00".to_string())
}

pub fn hash_file(path: &Path) -> Result<String> {
    let mut f = File::open(path).with_context(|| format!("open file: {}", path.display()))?;
    let mut h = Sha256::new();
    let mut buf = vec![0u8; 1024 * 1024];
    loop {
        let n = f.read(&mut buf)?;
        if n == 0 {
            break;
        }
        h.update(&buf[..n]);
    }
    Ok(format!("{:x}", h.finalize()))
}

/// Creates `<root>/<name>_<stamp>`, adding a numeric suffix rather than
/// reusing an existing directory.
pub fn create_run_dir(root: &Path, name: &str, stamp: &str) -> Result<PathBuf> {
    ensure_dir(root)?;
    let base = format!("{name}_{stamp}");
    let mut candidate = root.join(&base);
    let mut k = 1;
    loop {
        match std::fs::create_dir(&candidate) {
            Ok(()) => return Ok(candidate),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                candidate = root.join(format!("{base}_{k}"));
                k += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("create run dir {}", candidate.display()));
            }
        }
    }
}
