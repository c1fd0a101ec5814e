//! Pid file handling and daemonization (§6 persisted state, §10.5
//! `glusterfs.c`). Daemonization detail beyond double-fork + session detach
//! is out of scope (§1); log rotation is limited to the run-id rename/symlink
//! scheme below.

use std::fs::OpenOptions;
use std::io::{Seek, SeekFrom, Write};
use std::os::unix::io::AsRawFd;
use std::path::Path;

use nix::unistd::{fork, setsid, ForkResult};

use crate::types::errors::{FuseResult, PosixError};

/// Opens `path` in append-then-truncate mode under an exclusive advisory
/// lock and writes the current pid as a single decimal line (§6).
pub fn write_pid_file(path: &Path) -> FuseResult<std::fs::File> {
    let mut file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(path)
        .map_err(|e| PosixError::new(libc::EIO, format!("opening pid file {}: {e}", path.display())))?;

    let rc = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if rc != 0 {
        return Err(PosixError::last_error(format!("pid file {} is already locked", path.display())));
    }

    file.set_len(0).map_err(|e| PosixError::new(libc::EIO, e.to_string()))?;
    file.seek(SeekFrom::Start(0)).map_err(|e| PosixError::new(libc::EIO, e.to_string()))?;
    writeln!(file, "{}", std::process::id()).map_err(|e| PosixError::new(libc::EIO, e.to_string()))?;
    file.flush().ok();
    Ok(file)
}

/// Best-effort pid file removal on clean shutdown (§6).
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        log::warn!("failed to remove pid file {}: {e}", path.display());
    }
}

/// Classic double-fork + session-detach daemonization. The first fork
/// leaves the parent's process group, `setsid` starts a new session in the
/// (now orphaned) child, and the second fork prevents ever re-acquiring a
/// controlling terminal.
///
/// Returns `true` in the grandchild, which is the only process that should
/// continue past this call; the original parent and the intermediate child
/// both `exit(0)` from inside this function.
pub fn daemonize() -> FuseResult<()> {
    match unsafe { fork() }.map_err(|e| PosixError::new(libc::EAGAIN, format!("first fork failed: {e}")))? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => {}
    }

    setsid().map_err(|e| PosixError::new(libc::EPERM, format!("setsid failed: {e}")))?;

    match unsafe { fork() }.map_err(|e| PosixError::new(libc::EAGAIN, format!("second fork failed: {e}")))? {
        ForkResult::Parent { .. } => std::process::exit(0),
        ForkResult::Child => Ok(()),
    }
}

/// When `run_id` is set and `log_path` names a regular file, renames it to
/// include a `YYYYMMDD.HHMMSS.PID` suffix and symlinks the original name to
/// the active file (§6). `now` is injected so the scheme is testable
/// without a live clock dependency.
pub fn rotate_log_for_run_id(log_path: &Path, run_id: &str, now: std::time::SystemTime) -> FuseResult<std::path::PathBuf> {
    let datetime = format_timestamp(now);
    let suffixed = log_path.with_file_name(format!(
        "{}.{}.{}.{}",
        log_path.file_name().unwrap_or_default().to_string_lossy(),
        datetime,
        std::process::id(),
        run_id,
    ));

    if log_path.is_file() {
        std::fs::rename(log_path, &suffixed).map_err(|e| PosixError::new(libc::EIO, e.to_string()))?;
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(&suffixed, log_path).map_err(|e| PosixError::new(libc::EIO, e.to_string()))?;

    Ok(suffixed)
}

fn format_timestamp(t: std::time::SystemTime) -> String {
    let secs = t.duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_secs();
    // A dependency-free UTC civil-from-days breakdown (Howard Hinnant's
    // algorithm), since pulling in a date/time crate just for this one
    // filename timestamp would be disproportionate to what it is used for.
    let days = (secs / 86400) as i64;
    let rem = secs % 86400;
    let (y, m, d) = civil_from_days(days);
    format!("{:04}{:02}{:02}.{:02}{:02}{:02}", y, m, d, rem / 3600, (rem % 3600) / 60, rem % 60)
}

pub(crate) fn civil_from_days(z: i64) -> (i64, u32, u32) {
    let z = z + 719468;
    let era = if z >= 0 { z } else { z - 146096 } / 146097;
    let doe = (z - era * 146097) as u64;
    let yoe = (doe - doe / 1460 + doe / 36524 - doe / 146096) / 365;
    let y = yoe as i64 + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let m = if mp < 10 { mp + 3 } else { mp - 9 } as u32;
    (if m <= 2 { y + 1 } else { y }, m, d)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pid_file_contains_current_pid_and_is_locked() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xlatefs.pid");
        let file = write_pid_file(&path).unwrap();
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.trim(), std::process::id().to_string());
        drop(file);
    }

    #[test]
    fn second_lock_attempt_on_same_pid_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("xlatefs.pid");
        let _held = write_pid_file(&path).unwrap();
        assert!(write_pid_file(&path).is_err());
    }

    #[test]
    fn log_rotation_renames_and_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("xlatefs.log");
        std::fs::write(&log_path, b"hello").unwrap();
        let now = std::time::UNIX_EPOCH + std::time::Duration::from_secs(1_700_000_000);
        let rotated = rotate_log_for_run_id(&log_path, "run1", now).unwrap();
        assert!(rotated.exists());
        assert!(log_path.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(std::fs::read_to_string(&log_path).unwrap(), "hello");
    }

    #[test]
    fn civil_from_days_matches_known_date() {
        // 1700000000 is 2023-11-14T22:13:20Z.
        let (y, m, d) = civil_from_days(1_700_000_000i64 / 86400 - 1 + 1);
        assert_eq!((y, m, d), (2023, 11, 14));
    }
}
