//! Single-instance guard.
//!
//! Two copies of the bot polling the same token fight over updates, so a
//! pidfile in the data directory marks the running instance. A new process
//! finding a live previous pid exits cleanly; a stale pidfile is replaced.

use std::path::Path;

use anyhow::Context;

const PIDFILE: &str = "checkpost.pid";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardStatus {
    /// This process now owns the pidfile.
    Acquired,
    /// Another live instance holds it.
    AlreadyRunning(u32),
}

/// Check for a live previous instance and claim the pidfile otherwise.
pub fn acquire(data_dir: &Path) -> anyhow::Result<GuardStatus> {
    let path = data_dir.join(PIDFILE);
    let own_pid = std::process::id();

    if let Ok(contents) = std::fs::read_to_string(&path)
        && let Ok(pid) = contents.trim().parse::<u32>()
        && pid != own_pid
        && process_alive(pid)
    {
        return Ok(GuardStatus::AlreadyRunning(pid));
    }

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating {}", data_dir.display()))?;
    std::fs::write(&path, own_pid.to_string())
        .with_context(|| format!("writing {}", path.display()))?;
    Ok(GuardStatus::Acquired)
}

/// Process-table check via `/proc`. On platforms without `/proc` the
/// pidfile is treated as stale, which at worst double-starts in dev.
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").is_dir() && Path::new(&format!("/proc/{pid}")).exists()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_claims_fresh_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(acquire(dir.path()).unwrap(), GuardStatus::Acquired);
        let written = std::fs::read_to_string(dir.path().join(PIDFILE)).unwrap();
        assert_eq!(written, std::process::id().to_string());
    }

    #[test]
    fn reacquire_by_same_process_succeeds() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(acquire(dir.path()).unwrap(), GuardStatus::Acquired);
        assert_eq!(acquire(dir.path()).unwrap(), GuardStatus::Acquired);
    }

    #[test]
    fn stale_pid_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        // No real process gets this close to the pid ceiling.
        std::fs::write(dir.path().join(PIDFILE), "4194000").unwrap();
        assert_eq!(acquire(dir.path()).unwrap(), GuardStatus::Acquired);
    }

    #[test]
    fn garbage_pidfile_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(PIDFILE), "not a pid").unwrap();
        assert_eq!(acquire(dir.path()).unwrap(), GuardStatus::Acquired);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn live_foreign_pid_blocks_acquisition() {
        let dir = tempfile::tempdir().unwrap();
        // pid 1 is always alive on Linux.
        std::fs::write(dir.path().join(PIDFILE), "1").unwrap();
        assert_eq!(acquire(dir.path()).unwrap(), GuardStatus::AlreadyRunning(1));
    }
}
