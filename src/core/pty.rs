//! Unix pseudo-terminal wrapper
//!
//! Allocates a PTY pair, forks the login shell onto the slave side in its own
//! session, and exposes the master side for polling, reading and writing. Also
//! owns the shell's lifetime: interrupt delivery, hangup and reaping.

use std::ffi::{CString, OsStr};
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::{Duration, Instant};

use bitflags::bitflags;
use nix::errno::Errno;
use nix::poll::{poll, PollFd, PollFlags, PollTimeout};
use nix::pty::{openpty, Winsize};
use nix::sys::signal::{kill, killpg, Signal};
use nix::sys::termios::{tcgetattr, tcsetattr, LocalFlags, SetArg};
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::{fork, setsid, ForkResult, Pid};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Shell used when neither the config nor `$SHELL` names one
pub const DEFAULT_SHELL: &str = "/bin/sh";

/// Value of `TERM` handed to the shell
const TERM_NAME: &str = "xterm";

/// Start the shell as an interactive login shell
const LOGIN_SHELL_ARGS: &[&str] = &["-l", "-i"];

#[derive(Error, Debug)]
pub enum PtyError {
    #[error("Failed to allocate PTY: {0}")]
    Allocation(#[source] Errno),

    #[error("Failed to fork shell: {0}")]
    Fork(#[source] Errno),

    #[error("Invalid shell path: {0}")]
    InvalidShell(String),

    #[error("Failed to poll PTY: {0}")]
    Poll(#[source] Errno),

    #[error("Failed to read from PTY: {0}")]
    Read(#[source] io::Error),

    #[error("Failed to write to PTY: {0}")]
    Write(#[source] io::Error),

    #[error("Failed to send {signal:?} to {pid}: {source}")]
    Signal {
        signal: Signal,
        pid: i32,
        #[source]
        source: Errno,
    },

    #[error("Failed to wait for shell: {0}")]
    Wait(#[source] Errno),

    #[error("Failed to start I/O thread: {0}")]
    Thread(#[source] io::Error),

    #[error("Shell is not running")]
    NotRunning,
}

pub type Result<T> = std::result::Result<T, PtyError>;

/// Terminal size in character cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermGeometry {
    pub cols: u16,
    pub rows: u16,
}

impl TermGeometry {
    /// Convert a pixel area to cells with fixed glyph metrics.
    pub fn from_pixels(width: u32, height: u32, glyph_width: u32, glyph_height: u32) -> Self {
        let cells = |px: u32, glyph: u32| -> u16 {
            let n = px / glyph.max(1);
            u16::try_from(n).unwrap_or(u16::MAX).max(1)
        };
        Self {
            cols: cells(width, glyph_width),
            rows: cells(height, glyph_height),
        }
    }
}

/// How descendants of the shell are interrupted
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalStrategy {
    /// Signal the terminal's foreground process group
    #[default]
    ProcessGroup,
    /// Enumerate direct children with `pgrep -P` and signal each one
    Pgrep,
}

/// The shell to launch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellCommand {
    pub program: PathBuf,
    /// Chosen by the user (config or `$SHELL`) rather than the fallback
    pub custom: bool,
}

impl ShellCommand {
    /// Pick the shell: explicit override, then `$SHELL`, then `/bin/sh`.
    pub fn resolve(override_shell: Option<&str>) -> Self {
        let env_shell = std::env::var("SHELL").ok();
        Self::resolve_from(override_shell, env_shell.as_deref())
    }

    fn resolve_from(override_shell: Option<&str>, env_shell: Option<&str>) -> Self {
        match override_shell.or(env_shell).filter(|s| !s.trim().is_empty()) {
            Some(shell) => Self {
                program: search_path(shell.trim()),
                custom: true,
            },
            None => Self {
                program: PathBuf::from(DEFAULT_SHELL),
                custom: false,
            },
        }
    }
}

/// Resolve a bare program name against `$PATH`.
fn search_path(program: &str) -> PathBuf {
    let candidate = Path::new(program);
    if candidate.components().count() > 1 || candidate.is_absolute() {
        return candidate.to_path_buf();
    }
    std::env::var_os("PATH")
        .and_then(|paths| {
            std::env::split_paths(&paths)
                .map(|dir| dir.join(program))
                .find(|p| p.is_file())
        })
        .unwrap_or_else(|| candidate.to_path_buf())
}

bitflags! {
    /// Poll result for the master side
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct Readiness: u8 {
        const READABLE = 0b0001;
        const WRITABLE = 0b0010;
        const HANGUP   = 0b0100;
    }
}

/// How the shell ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Exited(i32),
    Signaled(Signal),
}

impl ExitStatus {
    pub fn code(&self) -> Option<i32> {
        match self {
            ExitStatus::Exited(code) => Some(*code),
            ExitStatus::Signaled(_) => None,
        }
    }
}

/// Master side of a PTY with a shell attached
pub struct UnixPty {
    master: File,
    child: Pid,
    exit_status: Option<ExitStatus>,
}

impl UnixPty {
    /// Fork `shell` as an interactive login shell on a new PTY.
    ///
    /// With `disable_echo` set, ECHO is cleared on the line discipline before
    /// the shell starts. A failing `exec` only shows up as the child exiting
    /// with status 127.
    pub fn spawn(shell: &ShellCommand, geometry: TermGeometry, disable_echo: bool) -> Result<Self> {
        let program = CString::new(shell.program.as_os_str().as_bytes())
            .map_err(|_| PtyError::InvalidShell(shell.program.display().to_string()))?;
        let mut argv = vec![program.clone()];
        for arg in LOGIN_SHELL_ARGS {
            argv.push(CString::new(*arg).map_err(|_| PtyError::InvalidShell(arg.to_string()))?);
        }
        let envp = child_environment();
        // The child must not allocate, so the pointer arrays exist up front.
        let argv_ptrs = exec_pointers(&argv);
        let envp_ptrs = exec_pointers(&envp);

        let winsize = Winsize {
            ws_row: geometry.rows,
            ws_col: geometry.cols,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };
        let pty = openpty(Some(&winsize), None).map_err(PtyError::Allocation)?;

        if disable_echo {
            match tcgetattr(&pty.slave) {
                Ok(mut termios) => {
                    termios.local_flags.remove(LocalFlags::ECHO);
                    if let Err(e) = tcsetattr(&pty.slave, SetArg::TCSANOW, &termios) {
                        warn!("Could not disable PTY echo: {}", e);
                    }
                }
                Err(e) => warn!("Could not read PTY attributes: {}", e),
            }
        }

        // SAFETY: the child only closes descriptors, calls setsid/ioctl/dup2
        // and execs. Every allocation happened before the fork.
        match unsafe { fork() }.map_err(PtyError::Fork)? {
            ForkResult::Child => {
                drop(pty.master);

                if setsid().is_err() {
                    // SAFETY: _exit is async-signal-safe.
                    unsafe { libc::_exit(1) };
                }

                let slave_fd = pty.slave.as_raw_fd();
                // SAFETY: plain syscalls on descriptors owned by this process.
                unsafe {
                    libc::ioctl(slave_fd, libc::TIOCSCTTY as _, 0);
                    if libc::dup2(slave_fd, libc::STDIN_FILENO) < 0
                        || libc::dup2(slave_fd, libc::STDOUT_FILENO) < 0
                        || libc::dup2(slave_fd, libc::STDERR_FILENO) < 0
                    {
                        libc::_exit(1);
                    }
                }
                if slave_fd > libc::STDERR_FILENO {
                    drop(pty.slave);
                } else {
                    std::mem::forget(pty.slave);
                }

                // SAFETY: both arrays are NULL-terminated and point into
                // `argv` and `envp`, which outlive the call.
                unsafe {
                    libc::execve(program.as_ptr(), argv_ptrs.as_ptr(), envp_ptrs.as_ptr());
                    libc::_exit(127)
                }
            }
            ForkResult::Parent { child } => {
                drop(pty.slave);
                info!(
                    pid = %child,
                    shell = %shell.program.display(),
                    cols = geometry.cols,
                    rows = geometry.rows,
                    "spawned shell"
                );
                Ok(Self {
                    master: File::from(pty.master),
                    child,
                    exit_status: None,
                })
            }
        }
    }

    pub fn pid(&self) -> Pid {
        self.child
    }

    /// Wait up to `timeout` for the readiness in `interest`. Hangup is
    /// always reported.
    pub fn poll_for(&self, interest: Readiness, timeout: Duration) -> Result<Readiness> {
        let millis = u16::try_from(timeout.as_millis()).unwrap_or(u16::MAX);
        let mut events = PollFlags::empty();
        if interest.contains(Readiness::READABLE) {
            events |= PollFlags::POLLIN;
        }
        if interest.contains(Readiness::WRITABLE) {
            events |= PollFlags::POLLOUT;
        }
        let mut fds = [PollFd::new(self.master.as_fd(), events)];

        match poll(&mut fds, PollTimeout::from(millis)) {
            Ok(0) => return Ok(Readiness::empty()),
            Ok(_) => {}
            Err(Errno::EINTR) => return Ok(Readiness::empty()),
            Err(e) => return Err(PtyError::Poll(e)),
        }

        let revents = fds[0].revents().unwrap_or(PollFlags::empty());
        let mut ready = Readiness::empty();
        if revents.contains(PollFlags::POLLIN) {
            ready |= Readiness::READABLE;
        }
        if revents.contains(PollFlags::POLLOUT) {
            ready |= Readiness::WRITABLE;
        }
        if revents.intersects(PollFlags::POLLHUP | PollFlags::POLLERR | PollFlags::POLLNVAL) {
            ready |= Readiness::HANGUP;
        }
        Ok(ready)
    }

    /// Read shell output. `EIO` (the slave side closed) reads as end of file.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        loop {
            match self.master.read(buf) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) if e.raw_os_error() == Some(libc::EIO) => return Ok(0),
                Err(e) => return Err(PtyError::Read(e)),
            }
        }
    }

    /// Single write to the shell; a short count is returned, not retried.
    pub fn write(&mut self, data: &[u8]) -> Result<usize> {
        loop {
            match self.master.write(data) {
                Ok(n) => return Ok(n),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(PtyError::Write(e)),
            }
        }
    }

    /// Send `signal` to the shell process itself.
    pub fn signal_shell(&self, signal: Signal) -> Result<()> {
        if self.exit_status.is_some() {
            return Err(PtyError::NotRunning);
        }
        kill(self.child, signal).map_err(|source| PtyError::Signal {
            signal,
            pid: self.child.as_raw(),
            source,
        })
    }

    /// Interrupt whatever the shell is running. Returns how many targets
    /// were signalled; failures are logged, not returned.
    pub fn signal_descendants(&self, strategy: SignalStrategy, signal: Signal) -> usize {
        match strategy {
            SignalStrategy::ProcessGroup => self.signal_foreground_group(signal),
            SignalStrategy::Pgrep => signal_children(self.child, signal),
        }
    }

    /// Signal the terminal's foreground process group. When that is the
    /// shell's own group (no job control, or nothing running) the whole group
    /// is signalled, shell included.
    fn signal_foreground_group(&self, signal: Signal) -> usize {
        // SAFETY: tcgetpgrp only reads the terminal's foreground group.
        let raw = unsafe { libc::tcgetpgrp(self.master.as_raw_fd()) };
        let group = if raw > 0 { Pid::from_raw(raw) } else { self.child };

        match killpg(group, signal) {
            Ok(()) => {
                debug!(pgid = %group, ?signal, "signalled process group");
                1
            }
            Err(e) => {
                warn!("Could not signal process group {}: {}", group, e);
                0
            }
        }
    }

    /// Reap the shell if it has exited.
    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        if self.exit_status.is_some() {
            return Ok(self.exit_status);
        }
        match waitpid(self.child, Some(WaitPidFlag::WNOHANG)) {
            Ok(status) => {
                self.exit_status = exit_status_from(status);
                Ok(self.exit_status)
            }
            Err(Errno::ECHILD) => {
                self.exit_status = Some(ExitStatus::Exited(0));
                Ok(self.exit_status)
            }
            Err(e) => Err(PtyError::Wait(e)),
        }
    }

    /// Hang up the shell's session, escalating to SIGKILL after `grace`,
    /// and reap it.
    pub fn terminate(&mut self, grace: Duration) -> Option<ExitStatus> {
        if let Ok(Some(status)) = self.try_wait() {
            return Some(status);
        }

        // The shell leads its own session, so its pid is also its group id.
        if let Err(e) = killpg(self.child, Signal::SIGHUP) {
            debug!("SIGHUP to session {} failed: {}", self.child, e);
        }
        let _ = kill(self.child, Signal::SIGCONT);

        let deadline = Instant::now() + grace;
        while Instant::now() < deadline {
            if let Ok(Some(status)) = self.try_wait() {
                info!(pid = %self.child, ?status, "shell exited");
                return Some(status);
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        warn!("Shell {} ignored SIGHUP, killing", self.child);
        let _ = killpg(self.child, Signal::SIGKILL);
        let _ = kill(self.child, Signal::SIGKILL);
        match waitpid(self.child, None) {
            Ok(status) => self.exit_status = exit_status_from(status),
            Err(_) => self.exit_status = Some(ExitStatus::Signaled(Signal::SIGKILL)),
        }
        self.exit_status
    }
}

impl Drop for UnixPty {
    fn drop(&mut self) {
        if self.exit_status.is_none() {
            self.terminate(Duration::from_millis(50));
        }
    }
}

fn exit_status_from(status: WaitStatus) -> Option<ExitStatus> {
    match status {
        WaitStatus::Exited(_, code) => Some(ExitStatus::Exited(code)),
        WaitStatus::Signaled(_, signal, _) => Some(ExitStatus::Signaled(signal)),
        _ => None,
    }
}

/// Environment for the shell: ours, with `TERM` replaced.
/// NULL-terminated array of pointers into `strings`.
fn exec_pointers(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(std::ptr::null()))
        .collect()
}

fn child_environment() -> Vec<CString> {
    std::env::vars_os()
        .filter(|(key, _)| key != OsStr::new("TERM"))
        .filter_map(|(key, value)| {
            let mut entry = key.as_bytes().to_vec();
            entry.push(b'=');
            entry.extend_from_slice(value.as_bytes());
            CString::new(entry).ok()
        })
        .chain(CString::new(format!("TERM={}", TERM_NAME)).ok())
        .collect()
}

/// Signal the direct children of `parent` found through `pgrep -P`.
///
/// Best effort: grandchildren are missed, and a missing `pgrep` simply means
/// nothing is signalled.
pub fn signal_children(parent: Pid, signal: Signal) -> usize {
    let output = match Command::new("pgrep").arg("-P").arg(parent.to_string()).output() {
        Ok(output) => output,
        Err(e) => {
            warn!("Could not run pgrep: {}", e);
            return 0;
        }
    };

    let mut signalled = 0;
    for pid in parse_pids(&output.stdout) {
        match kill(pid, signal) {
            Ok(()) => signalled += 1,
            Err(e) => debug!("Could not signal child {}: {}", pid, e),
        }
    }
    signalled
}

fn parse_pids(stdout: &[u8]) -> Vec<Pid> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter_map(|line| line.trim().parse::<i32>().ok())
        .filter(|&pid| pid > 0)
        .map(Pid::from_raw)
        .collect()
}
