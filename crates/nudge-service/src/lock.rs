//! Single-instance election via a PID file.
//!
//! One PRIMARY owns the store per machine. Candidates read the well-known
//! PID file, probe the recorded process for liveness, and either reclaim a
//! stale file (becoming PRIMARY) or demote themselves to PROXY mode against
//! the recorded port. The file is written only by the elected PRIMARY and
//! removed on graceful shutdown; crashes leave a stale file for the next
//! launch to reap.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use nudge::model::now_iso;

#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("Nudge server already running (PID: {pid})")]
    AlreadyRunning { pid: u32 },
    #[error("Failed to stop server: {0}")]
    Stop(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The PID file record. A bare integer in the file is accepted as a legacy
/// format and read as the pid alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PidRecord {
    pub pid: u32,
    pub port: u16,
    pub started: String,
}

/// `/tmp/nudge/server.pid` on POSIX, `%LOCALAPPDATA%\nudge\server.pid` on
/// Windows.
pub fn default_pid_file() -> PathBuf {
    let dir = if cfg!(windows) {
        dirs::data_local_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("nudge")
    } else {
        PathBuf::from("/tmp/nudge")
    };
    dir.join("server.pid")
}

#[cfg(unix)]
pub fn process_alive(pid: u32) -> bool {
    // Signal 0 probes for existence without delivering anything.
    unsafe { libc::kill(pid as libc::pid_t, 0) == 0 }
}

#[cfg(windows)]
pub fn process_alive(pid: u32) -> bool {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{
        OpenProcess, PROCESS_QUERY_LIMITED_INFORMATION,
    };
    unsafe {
        let handle = OpenProcess(PROCESS_QUERY_LIMITED_INFORMATION, 0, pid);
        if handle.is_null() {
            return false;
        }
        CloseHandle(handle);
        true
    }
}

#[cfg(unix)]
fn terminate(pid: u32, force: bool) {
    let signal = if force { libc::SIGKILL } else { libc::SIGTERM };
    unsafe {
        libc::kill(pid as libc::pid_t, signal);
    }
}

#[cfg(windows)]
fn terminate(pid: u32, _force: bool) {
    use windows_sys::Win32::Foundation::CloseHandle;
    use windows_sys::Win32::System::Threading::{OpenProcess, PROCESS_TERMINATE, TerminateProcess};
    unsafe {
        let handle = OpenProcess(PROCESS_TERMINATE, 0, pid);
        if !handle.is_null() {
            TerminateProcess(handle, 1);
            CloseHandle(handle);
        }
    }
}

/// Manages the single-instance lock.
#[derive(Debug, Clone)]
pub struct ServerLock {
    pid_file: PathBuf,
}

impl Default for ServerLock {
    fn default() -> Self {
        ServerLock::new()
    }
}

impl ServerLock {
    pub fn new() -> Self {
        ServerLock {
            pid_file: default_pid_file(),
        }
    }

    /// Use an explicit file location (tests).
    pub fn at(pid_file: PathBuf) -> Self {
        ServerLock { pid_file }
    }

    /// Read the recorded pid and port, tolerating the legacy bare-pid
    /// format.
    fn read(&self) -> Option<(u32, Option<u16>)> {
        let content = fs::read_to_string(&self.pid_file).ok()?;
        let content = content.trim();
        if let Ok(record) = serde_json::from_str::<PidRecord>(content) {
            return Some((record.pid, Some(record.port)));
        }
        content.parse::<u32>().ok().map(|pid| (pid, None))
    }

    /// Is another server alive? Returns its recorded port when so; reaps a
    /// stale or unreadable file when not.
    pub fn check_running(&self) -> (bool, Option<u16>) {
        match self.read() {
            Some((pid, port)) if process_alive(pid) => (true, port),
            Some((pid, _)) => {
                debug!(pid, "stale pid file, reclaiming");
                self.cleanup();
                (false, None)
            }
            None => {
                if self.pid_file.exists() {
                    self.cleanup();
                }
                (false, None)
            }
        }
    }

    /// Try to take the lock for a server on `port`. Returns the running
    /// server's port on contention.
    pub fn try_acquire(&self, port: u16) -> Result<Option<u16>, LockError> {
        let (running, existing_port) = self.check_running();
        if running {
            return Ok(existing_port);
        }

        if let Some(dir) = self.pid_file.parent() {
            fs::create_dir_all(dir)?;
        }
        let record = PidRecord {
            pid: std::process::id(),
            port,
            started: now_iso(),
        };
        // Write-then-rename so readers never see a partial record.
        let tmp = self.pid_file.with_extension("pid.tmp");
        let body = serde_json::to_string(&record).map_err(std::io::Error::other)?;
        fs::write(&tmp, body)?;
        fs::rename(&tmp, &self.pid_file)?;
        Ok(None)
    }

    pub fn acquire(&self, port: u16) -> Result<(), LockError> {
        if self.try_acquire(port)?.is_some() {
            let pid = self.read().map(|(pid, _)| pid).unwrap_or_default();
            return Err(LockError::AlreadyRunning { pid });
        }
        Ok(())
    }

    pub fn release(&self) {
        self.cleanup();
    }

    fn cleanup(&self) {
        if let Err(err) = fs::remove_file(&self.pid_file) {
            if err.kind() != std::io::ErrorKind::NotFound {
                warn!(%err, "failed to remove pid file");
            }
        }
    }

    /// PID of the live server, if any.
    pub fn running_pid(&self) -> Option<u32> {
        let (pid, _) = self.read()?;
        process_alive(pid).then_some(pid)
    }

    /// Port recorded by the live server, if any.
    pub fn running_port(&self) -> Option<u16> {
        match self.check_running() {
            (true, port) => port,
            _ => None,
        }
    }

    /// Stop the running server: SIGTERM, a 500 ms grace period, then
    /// SIGKILL, then remove the file. Returns the stopped pid, or `None`
    /// when nothing was running.
    pub fn stop_server(&self) -> Result<Option<u32>, LockError> {
        let Some(pid) = self.running_pid() else {
            return Ok(None);
        };

        terminate(pid, false);
        std::thread::sleep(Duration::from_millis(500));
        if process_alive(pid) {
            terminate(pid, true);
        }
        self.cleanup();
        Ok(Some(pid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn lock_in(dir: &TempDir) -> ServerLock {
        ServerLock::at(dir.path().join("server.pid"))
    }

    // Far above any real pid_max, so never a live process.
    const DEAD_PID: u32 = 0x7fff_fff0;

    #[test]
    fn acquire_writes_record_and_release_removes_it() {
        let dir = TempDir::new().unwrap();
        let lock = lock_in(&dir);

        assert_eq!(lock.check_running(), (false, None));
        lock.acquire(8765).unwrap();

        let content = fs::read_to_string(dir.path().join("server.pid")).unwrap();
        let record: PidRecord = serde_json::from_str(&content).unwrap();
        assert_eq!(record.pid, std::process::id());
        assert_eq!(record.port, 8765);
        assert!(!record.started.is_empty());

        // Our own pid is alive, so a second candidate sees a running server.
        assert_eq!(lock.check_running(), (true, Some(8765)));
        assert_eq!(lock.running_pid(), Some(std::process::id()));
        assert!(matches!(
            lock.acquire(9000),
            Err(LockError::AlreadyRunning { .. })
        ));

        lock.release();
        assert_eq!(lock.check_running(), (false, None));
    }

    #[test]
    fn stale_record_is_reclaimed() {
        let dir = TempDir::new().unwrap();
        let lock = lock_in(&dir);

        let stale = PidRecord {
            pid: DEAD_PID,
            port: 8765,
            started: now_iso(),
        };
        fs::create_dir_all(dir.path()).unwrap();
        fs::write(
            dir.path().join("server.pid"),
            serde_json::to_string(&stale).unwrap(),
        )
        .unwrap();

        // Dead pid: treated as absent, file reaped, lock acquirable.
        assert_eq!(lock.check_running(), (false, None));
        assert!(!dir.path().join("server.pid").exists());
        lock.acquire(8766).unwrap();
    }

    #[test]
    fn legacy_bare_pid_is_accepted() {
        let dir = TempDir::new().unwrap();
        let lock = lock_in(&dir);

        fs::write(
            dir.path().join("server.pid"),
            format!("{}\n", std::process::id()),
        )
        .unwrap();

        // Alive, but no port recorded.
        assert_eq!(lock.check_running(), (true, None));
        assert_eq!(lock.running_pid(), Some(std::process::id()));
        assert_eq!(lock.running_port(), None);
    }

    #[test]
    fn garbage_file_counts_as_absent() {
        let dir = TempDir::new().unwrap();
        let lock = lock_in(&dir);
        fs::write(dir.path().join("server.pid"), "not a record").unwrap();
        assert_eq!(lock.check_running(), (false, None));
    }

    #[test]
    fn stop_without_server_is_a_noop() {
        let dir = TempDir::new().unwrap();
        let lock = lock_in(&dir);
        assert_eq!(lock.stop_server().unwrap(), None);
    }
}
