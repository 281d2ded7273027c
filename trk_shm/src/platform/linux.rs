//! Linux-specific shared memory operations

use memmap2::{MmapMut, MmapOptions};
use nix::time::{ClockId, clock_gettime};
use nix::unistd::getpid;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;
use std::sync::atomic::AtomicU32;
use std::time::Duration;

/// Create a new backing file exclusively.
///
/// Fails with `ErrorKind::AlreadyExists` if the file is present.
pub fn create_segment_file(path: &Path) -> io::Result<File> {
    OpenOptions::new()
        .create_new(true)
        .read(true)
        .write(true)
        .mode(0o600) // Owner read/write only
        .open(path)
}

/// Open an existing backing file for read/write mapping.
pub fn open_segment_file(path: &Path) -> io::Result<File> {
    OpenOptions::new().read(true).write(true).open(path)
}

/// Map `len` bytes of `file` shared between processes.
///
/// With `populate`, pages are faulted in up front so the first publish
/// does not pay for page faults.
pub fn map_segment(file: &File, len: usize, populate: bool) -> io::Result<MmapMut> {
    let mut options = MmapOptions::new();
    options.len(len);
    if populate {
        options.populate();
    }
    // SAFETY: the file is a tmpfs segment owned by this workspace's protocol;
    // every concurrent access goes through the node's atomics or the
    // wait/post window.
    unsafe { options.map_mut(file) }
}

/// Check if process is alive using kill(pid, 0)
pub fn is_process_alive(pid: u32) -> bool {
    use nix::sys::signal::kill;
    use nix::unistd::Pid;

    if pid == 0 {
        return false;
    }

    // Use a null signal (None) to test for process existence without sending a signal
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(_) => true,
        Err(nix::Error::ESRCH) => false, // No such process
        Err(nix::Error::EPERM) => true,  // Process exists but no permission to signal
        Err(_) => false,
    }
}

/// Get current process ID
pub fn get_current_pid() -> u32 {
    getpid().as_raw() as u32
}

/// CLOCK_MONOTONIC in nanoseconds.
pub fn monotonic_ns() -> u64 {
    match clock_gettime(ClockId::CLOCK_MONOTONIC) {
        Ok(ts) => (ts.tv_sec() as u64)
            .saturating_mul(1_000_000_000)
            .saturating_add(ts.tv_nsec() as u64),
        Err(_) => 0,
    }
}

/// Block while `word == expected`, for at most `timeout`.
///
/// Returns `true` if the wait ended because the timeout expired. Spurious
/// and signal wakeups return `false`; callers always re-check their
/// condition.
#[cfg(target_os = "linux")]
pub fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> bool {
    let ts = timeout.map(|d| libc::timespec {
        tv_sec: d.as_secs() as libc::time_t,
        tv_nsec: d.subsec_nanos() as libc::c_long,
    });
    let ts_ptr = ts
        .as_ref()
        .map_or(std::ptr::null(), |t| t as *const libc::timespec);

    // SAFETY: `word` points into a live shared mapping for the duration of
    // the call. FUTEX_WAIT (not _PRIVATE) keys on the physical page, so
    // waiters in other processes mapping the same file are matched.
    let rc = unsafe {
        libc::syscall(
            libc::SYS_futex,
            word.as_ptr(),
            libc::FUTEX_WAIT,
            expected,
            ts_ptr,
            std::ptr::null::<u32>(),
            0u32,
        )
    };

    rc == -1 && io::Error::last_os_error().raw_os_error() == Some(libc::ETIMEDOUT)
}

/// Wake every process blocked on `word`.
#[cfg(target_os = "linux")]
pub fn futex_wake_all(word: &AtomicU32) {
    futex_wake(word, i32::MAX);
}

/// Wake one process blocked on `word`.
#[cfg(target_os = "linux")]
pub fn futex_wake_one(word: &AtomicU32) {
    futex_wake(word, 1);
}

#[cfg(target_os = "linux")]
fn futex_wake(word: &AtomicU32, count: i32) {
    // SAFETY: see `futex_wait`.
    unsafe {
        libc::syscall(libc::SYS_futex, word.as_ptr(), libc::FUTEX_WAKE, count);
    }
}

// Sleep-poll fallback for platforms without futex(2). Same contract, coarser
// latency.

/// Block while `word == expected`, for at most `timeout`.
#[cfg(not(target_os = "linux"))]
pub fn futex_wait(word: &AtomicU32, expected: u32, timeout: Option<Duration>) -> bool {
    use std::sync::atomic::Ordering;

    let nap = Duration::from_micros(200);
    let deadline = timeout.map(|t| std::time::Instant::now() + t);
    while word.load(Ordering::Acquire) == expected {
        if let Some(d) = deadline {
            if std::time::Instant::now() >= d {
                return true;
            }
        }
        std::thread::sleep(nap);
    }
    false
}

/// Wake every process blocked on `word` (no-op: waiters poll).
#[cfg(not(target_os = "linux"))]
pub fn futex_wake_all(_word: &AtomicU32) {}

/// Wake one process blocked on `word` (no-op: waiters poll).
#[cfg(not(target_os = "linux"))]
pub fn futex_wake_one(_word: &AtomicU32) {}
