//! Daemonization and privilege dropping.
//!
//! These are thin, deliberately unsafe wrappers around the handful of
//! POSIX calls the original relies on (`fork`, `setsid`, `chroot`,
//! `setgid`/`setuid`, `getpwnam`). None of this has an async or portable
//! equivalent; it runs once, at startup, before the tokio runtime has
//! spawned any connection tasks.

use std::ffi::CString;
use std::path::Path;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("fork() failed: {0}")]
    Fork(std::io::Error),

    #[error("setsid() failed: {0}")]
    Setsid(std::io::Error),

    #[error("chroot({0}) failed: {1}")]
    Chroot(String, std::io::Error),

    #[error("chdir(\"/\") failed: {0}")]
    Chdir(std::io::Error),

    #[error("unknown user {0:?}")]
    UnknownUser(String),

    #[error("setgid() failed: {0}")]
    Setgid(std::io::Error),

    #[error("setuid() failed: {0}")]
    Setuid(std::io::Error),
}

/// Fork to the background, detach from the controlling terminal, and
/// write the child's PID to `pid_path`. The parent process exits here
/// and never returns.
pub fn daemonize(pid_path: &str) -> Result<(), DaemonError> {
    // SAFETY: fork() is called before any additional threads exist.
    // `main` is a plain synchronous `fn`, not `#[tokio::main]`; the
    // `tokio::runtime::Runtime` is constructed after `daemonize()`
    // returns, so no runtime worker threads have been spawned yet.
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(DaemonError::Fork(std::io::Error::last_os_error()));
    }
    if pid > 0 {
        // Parent: its job is done.
        std::process::exit(0);
    }

    // Child: detach from the controlling terminal.
    if unsafe { libc::setsid() } < 0 {
        return Err(DaemonError::Setsid(std::io::Error::last_os_error()));
    }

    std::fs::write(pid_path, format!("{}\n", std::process::id())).ok();
    Ok(())
}

/// `chroot()` to `dir` and `chdir("/")` inside the new root.
pub fn chroot(dir: &Path) -> Result<(), DaemonError> {
    let c_dir = CString::new(dir.as_os_str().as_encoded_bytes())
        .map_err(|_| DaemonError::Chroot(dir.display().to_string(), std::io::Error::last_os_error()))?;

    // SAFETY: `c_dir` is a valid NUL-terminated C string for the
    // duration of this call.
    if unsafe { libc::chroot(c_dir.as_ptr()) } != 0 {
        return Err(DaemonError::Chroot(
            dir.display().to_string(),
            std::io::Error::last_os_error(),
        ));
    }

    let root = CString::new("/").unwrap();
    // SAFETY: `root` is a valid NUL-terminated C string.
    if unsafe { libc::chdir(root.as_ptr()) } != 0 {
        return Err(DaemonError::Chdir(std::io::Error::last_os_error()));
    }
    Ok(())
}

/// Drop to `user`'s UID and primary GID, in that order (group first,
/// then user — once the UID is dropped there may no longer be
/// permission to change the GID).
pub fn drop_privileges(user: &str) -> Result<(), DaemonError> {
    let c_user = CString::new(user).map_err(|_| DaemonError::UnknownUser(user.to_string()))?;

    // SAFETY: `c_user` is valid for the duration of this call; the
    // returned pointer (if non-null) refers to a `static` glibc buffer
    // we only read from before the next `getpwnam` call.
    let passwd = unsafe { libc::getpwnam(c_user.as_ptr()) };
    if passwd.is_null() {
        return Err(DaemonError::UnknownUser(user.to_string()));
    }
    let (uid, gid) = unsafe { ((*passwd).pw_uid, (*passwd).pw_gid) };

    // SAFETY: `gid`/`uid` were just read from a valid `passwd` entry.
    if unsafe { libc::setgid(gid) } != 0 {
        return Err(DaemonError::Setgid(std::io::Error::last_os_error()));
    }
    if unsafe { libc::setuid(uid) } != 0 {
        return Err(DaemonError::Setuid(std::io::Error::last_os_error()));
    }
    Ok(())
}

/// Best-effort removal of the PID file on clean shutdown.
pub fn remove_pid_file(pid_path: &str) {
    let _ = std::fs::remove_file(pid_path);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_user_is_reported() {
        let err = drop_privileges("no-such-user-tlsproxyd-test").unwrap_err();
        assert!(matches!(err, DaemonError::UnknownUser(_)));
    }

    #[test]
    fn remove_pid_file_on_missing_path_is_a_noop() {
        remove_pid_file("/tmp/tlsproxyd-test-pid-that-does-not-exist.pid");
    }
}
