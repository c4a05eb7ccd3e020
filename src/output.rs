//! Output directory layout.
//!
//! Every run writes into its own `<data>_<timestamp>` directory below the
//! output root, and `<output root>/latest` points at the most recent one.

use crate::error::{EvalError, EvalResult};
use chrono::{DateTime, Local};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

pub const LATEST_LINK_NAME: &str = "latest";

/// Directory name for a run over `data_dir` started at `started`.
pub fn run_dir_name(data_dir: &Path, started: DateTime<Local>) -> String {
    // `.` and `..` have no file name of their own.
    let base = data_dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .or_else(|| {
            fs::canonicalize(data_dir)
                .ok()
                .and_then(|p| p.file_name().map(|n| n.to_string_lossy().to_string()))
        })
        .unwrap_or_else(|| "run".to_string());

    format!("{}_{}", base, started.format("%Y%m%d_%H%M%S"))
}

/// Create a fresh run directory. Runs started within the same second get a
/// numeric suffix.
pub fn create_run_dir(
    output_root: &Path,
    data_dir: &Path,
    started: DateTime<Local>,
) -> EvalResult<PathBuf> {
    let name = run_dir_name(data_dir, started);
    let mut dir = output_root.join(&name);
    let mut suffix = 1;
    while dir.exists() {
        dir = output_root.join(format!("{}_{}", name, suffix));
        suffix += 1;
    }

    fs::create_dir_all(&dir).map_err(|e| EvalError::write(&dir, e))?;
    debug!("Created run directory {}", dir.display());
    Ok(dir)
}

/// Point `<output_root>/latest` at `run_dir`.
#[cfg(unix)]
pub fn link_latest(output_root: &Path, run_dir: &Path) -> EvalResult<()> {
    let link = output_root.join(LATEST_LINK_NAME);

    if let Ok(meta) = fs::symlink_metadata(&link) {
        if !meta.file_type().is_symlink() {
            return Err(EvalError::write(
                &link,
                std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "exists and is not a symbolic link",
                ),
            ));
        }
        fs::remove_file(&link).map_err(|e| EvalError::write(&link, e))?;
    }

    // Relative target so the output root can be moved as a whole.
    let target = run_dir
        .strip_prefix(output_root)
        .map(Path::to_path_buf)
        .unwrap_or_else(|_| run_dir.to_path_buf());
    std::os::unix::fs::symlink(&target, &link).map_err(|e| EvalError::write(&link, e))
}

#[cfg(not(unix))]
pub fn link_latest(_output_root: &Path, _run_dir: &Path) -> EvalResult<()> {
    debug!("Skipping `latest` link: symbolic links are only maintained on Unix");
    Ok(())
}
