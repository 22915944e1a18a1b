// Per-run output paths
//
// One file per session, named after the second the session started. The
// writer opens it create-new, so a second run within the same second fails
// with a naming collision instead of overwriting.

use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::error::{RecorderError, Result};

pub const FILE_PREFIX: &str = "recording_";
pub const FILE_EXTENSION: &str = "wav";

const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";
const PROBE_FILE: &str = ".writable_test";
const BYTES_PER_MB: u64 = 1024 * 1024;

/// Path of the recording for a session started at `now`
///
/// Format: `<output_dir>/recording_YYYYMMDD_HHMMSS.wav`
pub fn derive_path<Tz>(output_dir: &Path, now: &DateTime<Tz>) -> PathBuf
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    output_dir.join(format!(
        "{}{}.{}",
        FILE_PREFIX,
        now.format(TIMESTAMP_FORMAT),
        FILE_EXTENSION
    ))
}

/// Make sure the output directory exists, accepts new files and has at
/// least `min_free_mb` megabytes free (0 skips the space check)
pub fn prepare_output_dir(output_dir: &Path, min_free_mb: u64) -> Result<()> {
    fs::create_dir_all(output_dir).map_err(|e| RecorderError::io(output_dir, e))?;

    let probe = output_dir.join(PROBE_FILE);
    fs::write(&probe, b"test").map_err(|e| RecorderError::io(&probe, e))?;
    fs::remove_file(&probe).map_err(|e| RecorderError::io(&probe, e))?;

    info!("Output directory {} exists and is writable", output_dir.display());

    if min_free_mb > 0 {
        check_free_space(output_dir, min_free_mb)?;
    }
    Ok(())
}

fn check_free_space(output_dir: &Path, min_free_mb: u64) -> Result<()> {
    let available = fs2::available_space(output_dir).map_err(|e| RecorderError::io(output_dir, e))?;
    let available_mb = available / BYTES_PER_MB;

    if available_mb < min_free_mb {
        return Err(RecorderError::LowDiskSpace {
            path: output_dir.to_path_buf(),
            available_mb,
            required_mb: min_free_mb,
        });
    }

    info!(
        "Free space in {}: {} MB (minimum {} MB)",
        output_dir.display(),
        available_mb,
        min_free_mb
    );
    Ok(())
}
