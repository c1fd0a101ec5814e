//! `log` + `env_logger` wiring (§10.1, §6 `--log-level`/`--log-file`).
//!
//! Ordering matters: when `--run-id` is given, [`super::daemon::rotate_log_for_run_id`]
//! must rename/symlink the log file *before* `env_logger` opens it, since
//! `env_logger` keeps the fd it was handed at `init` for the rest of the
//! process's life.

use std::fs::OpenOptions;
use std::io::Write;

use env_logger::Target;
use log::LevelFilter;

use crate::types::errors::{FuseResult, PosixError};

/// Initializes the global logger at `level`, writing to `log_file` if given
/// or stderr otherwise (§6). Idempotent-safe to call once per process; a
/// second call is a programmer error and is reported as such rather than
/// silently ignored, since a daemonizing process only gets one real chance
/// to set this up.
pub fn init_logging(level: LevelFilter, log_file: Option<&str>) -> FuseResult<()> {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(level);
    builder.format(|buf, record| {
        writeln!(
            buf,
            "[{} {} {}:{}] {}",
            chrono_like_timestamp(),
            record.level(),
            record.target(),
            record.line().unwrap_or(0),
            record.args()
        )
    });

    if let Some(path) = log_file {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| PosixError::new(libc::EIO, format!("opening log file {path}: {e}")))?;
        builder.target(Target::Pipe(Box::new(file)));
    }

    builder
        .try_init()
        .map_err(|e| PosixError::new(libc::EALREADY, format!("logger already initialized: {e}")))
}

/// A dependency-free `YYYY-MM-DD HH:MM:SS` stamp for the log line prefix,
/// matching the reference codebase's own plain-text log format without
/// pulling in a date/time crate solely for this.
fn chrono_like_timestamp() -> String {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default();
    let secs = now.as_secs();
    let (y, m, d) = super::daemon::civil_from_days((secs / 86400) as i64);
    let rem = secs % 86400;
    format!("{:04}-{:02}-{:02} {:02}:{:02}:{:02}", y, m, d, rem / 3600, (rem % 3600) / 60, rem % 60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamp_format_has_expected_shape() {
        let ts = chrono_like_timestamp();
        assert_eq!(ts.len(), "2024-01-01 00:00:00".len());
    }
}
