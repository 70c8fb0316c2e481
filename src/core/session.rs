//! PTY session
//!
//! Owns the shell, its PTY and the dedicated I/O thread. The thread and the
//! UI thread share one mutex-guarded [`SessionShared`]: the command queue, the
//! inbound output buffer and the flags between them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use nix::sys::signal::Signal;
use nix::unistd::Pid;
use tracing::{debug, info, warn};

use super::command::CommandBuffer;
use super::echo::{EchoOutcome, EnteredCommand};
use super::pty::{
    PtyError, Readiness, ShellCommand, SignalStrategy, TermGeometry, UnixPty,
};
use super::sanitize::{find_clear_screen, remove_escape_codes, SanitizeOptions};

/// Capacity of one inbound read
pub const TERMINAL_BUFFER_SIZE: usize = 4096;

/// Session events delivered to the UI loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Sanitized output is waiting in the terminal buffer
    Output,
    /// The shell is gone (exit code if it exited normally)
    Exited(Option<i32>),
    /// The I/O loop hit an unrecoverable error
    Error(String),
}

/// Session parameters
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub shell: ShellCommand,
    pub geometry: TermGeometry,
    pub disable_echo: bool,
    pub poll_timeout: Duration,
    pub idle_sleep: Duration,
    pub signal_strategy: SignalStrategy,
    pub sanitize: SanitizeOptions,
    /// How long the shell gets to die after SIGHUP before SIGKILL
    pub exit_grace: Duration,
}

impl SessionOptions {
    pub fn new(shell: ShellCommand, geometry: TermGeometry) -> Self {
        Self {
            disable_echo: shell.custom,
            shell,
            geometry,
            poll_timeout: Duration::from_millis(10),
            idle_sleep: Duration::from_micros(100),
            signal_strategy: SignalStrategy::default(),
            sanitize: SanitizeOptions::default(),
            exit_grace: Duration::from_millis(500),
        }
    }
}

/// Output handed from the I/O thread to the render bridge
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingOutput {
    pub bytes: Vec<u8>,
    /// A clear-screen sequence preceded `bytes`
    pub clear: bool,
}

/// State shared between the UI thread and the I/O thread
#[derive(Debug)]
pub struct SessionShared {
    /// Sanitized output not yet displayed
    terminal_buffer: Vec<u8>,
    pub command: CommandBuffer,
    term_needs_update: bool,
    clear_requested: bool,
    interrupt_requested: bool,
}

impl SessionShared {
    fn new() -> Self {
        Self {
            terminal_buffer: Vec::with_capacity(TERMINAL_BUFFER_SIZE),
            command: CommandBuffer::new(),
            term_needs_update: false,
            clear_requested: false,
            interrupt_requested: false,
        }
    }

    /// Move pending output out, zeroing the buffer and clearing the flag.
    pub fn take_output(&mut self) -> Option<PendingOutput> {
        if !self.term_needs_update {
            return None;
        }
        let out = PendingOutput {
            bytes: self.terminal_buffer.clone(),
            clear: self.clear_requested,
        };
        self.terminal_buffer.iter_mut().for_each(|b| *b = 0);
        self.terminal_buffer.clear();
        self.term_needs_update = false;
        self.clear_requested = false;
        Some(out)
    }
}

/// Cloneable access to the shared state for UI-side callers
#[derive(Debug, Clone)]
pub struct SessionHandle {
    shared: Arc<Mutex<SessionShared>>,
}

impl Default for SessionHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionHandle {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Mutex::new(SessionShared::new())),
        }
    }

    pub fn lock(&self) -> MutexGuard<'_, SessionShared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn with_command<R>(&self, f: impl FnOnce(&mut CommandBuffer) -> R) -> R {
        f(&mut self.lock().command)
    }

    /// Ask the I/O thread to interrupt the running job on its next pass.
    pub fn request_interrupt(&self) {
        self.lock().interrupt_requested = true;
    }

    pub fn interrupt_pending(&self) -> bool {
        self.lock().interrupt_requested
    }

    pub fn take_output(&self) -> Option<PendingOutput> {
        self.lock().take_output()
    }
}

#[cfg(test)]
impl SessionHandle {
    /// Stage output the way the I/O thread does.
    pub fn publish_output(&self, bytes: &[u8], clear: bool) {
        let mut shared = self.lock();
        shared.terminal_buffer.clear();
        shared.terminal_buffer.extend_from_slice(bytes);
        shared.clear_requested = clear;
        shared.term_needs_update = true;
    }
}

/// A running shell session
pub struct PtySession {
    handle: SessionHandle,
    child_pid: Pid,
    running: Arc<AtomicBool>,
    io_thread: Option<JoinHandle<()>>,
    events: Receiver<SessionEvent>,
}

impl PtySession {
    /// Spawn the shell and start the I/O thread.
    pub fn start(options: SessionOptions) -> Result<Self, PtyError> {
        let pty = UnixPty::spawn(&options.shell, options.geometry, options.disable_echo)?;
        let child_pid = pty.pid();
        let handle = SessionHandle::new();
        let running = Arc::new(AtomicBool::new(true));
        let (tx, rx) = mpsc::channel();

        let io = IoLoop {
            pty,
            handle: handle.clone(),
            running: running.clone(),
            events: tx,
            entered: EnteredCommand::new(),
            read_buf: vec![0u8; TERMINAL_BUFFER_SIZE],
            options,
        };

        // If the spawn fails the closure is dropped and the shell with it.
        let io_thread = thread::Builder::new()
            .name("pty-io".to_string())
            .spawn(move || io.run())
            .map_err(PtyError::Thread)?;

        Ok(Self {
            handle,
            child_pid,
            running,
            io_thread: Some(io_thread),
            events: rx,
        })
    }

    pub fn handle(&self) -> SessionHandle {
        self.handle.clone()
    }

    pub fn pid(&self) -> Pid {
        self.child_pid
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Non-blocking event check for the UI tick.
    pub fn try_event(&self) -> Option<SessionEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.running.store(false, Ordering::SeqCst);
                None
            }
        }
    }

    /// Stop the I/O thread; the shell is hung up when the PTY drops.
    pub fn shutdown(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.io_thread.take() {
            if thread.join().is_err() {
                warn!("PTY I/O thread panicked");
            }
        }
    }
}

#[cfg(test)]
impl PtySession {
    pub fn recv_event_timeout(&self, timeout: Duration) -> Option<SessionEvent> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(mpsc::RecvTimeoutError::Timeout) => None,
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                self.running.store(false, Ordering::SeqCst);
                None
            }
        }
    }
}

impl Drop for PtySession {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// The I/O thread's state
struct IoLoop {
    pty: UnixPty,
    handle: SessionHandle,
    running: Arc<AtomicBool>,
    events: Sender<SessionEvent>,
    entered: EnteredCommand,
    read_buf: Vec<u8>,
    options: SessionOptions,
}

/// What one poll pass decided
enum Step {
    Continue { notify: bool },
    ShellGone,
    Exit,
}

impl IoLoop {
    fn run(mut self) {
        debug!(pid = %self.pty.pid(), "PTY I/O loop started");

        while self.running.load(Ordering::SeqCst) {
            match self.step() {
                Ok(Step::Continue { notify }) => {
                    if notify && self.events.send(SessionEvent::Output).is_err() {
                        // Nobody is listening any more.
                        break;
                    }
                }
                Ok(Step::ShellGone) => {
                    let status = self.pty.terminate(self.options.exit_grace);
                    info!(?status, "shell went away");
                    self.finish(SessionEvent::Exited(status.and_then(|s| s.code())));
                    return;
                }
                Ok(Step::Exit) => {
                    let status = self.pty.terminate(self.options.exit_grace);
                    info!(?status, "session closed by exit");
                    self.finish(SessionEvent::Exited(status.and_then(|s| s.code())));
                    return;
                }
                Err(e) => {
                    warn!("PTY I/O loop failed: {}", e);
                    self.finish(SessionEvent::Error(e.to_string()));
                    return;
                }
            }
            thread::sleep(self.options.idle_sleep);
        }

        debug!("PTY I/O loop stopped");
    }

    fn finish(&self, event: SessionEvent) {
        self.running.store(false, Ordering::SeqCst);
        let _ = self.events.send(event);
    }

    fn step(&mut self) -> Result<Step, PtyError> {
        // Only ask for what can be acted on, so an idle loop sleeps in poll.
        let interest = {
            let shared = self.handle.lock();
            let mut interest = Readiness::empty();
            if !shared.term_needs_update {
                interest |= Readiness::READABLE;
            }
            if shared.command.is_ready() {
                interest |= Readiness::WRITABLE;
            }
            interest
        };

        let ready = self.pty.poll_for(interest, self.options.poll_timeout)?;

        let handle = self.handle.clone();
        let mut shared = handle.lock();
        let mut notify = false;

        if shared.interrupt_requested {
            self.deliver_interrupt(&mut shared);
        }

        if ready.contains(Readiness::READABLE) && !shared.term_needs_update {
            let n = self.pty.read(&mut self.read_buf)?;
            if n == 0 {
                return Ok(Step::ShellGone);
            }
            notify = self.accept_output(n, &mut shared);
        } else if ready.contains(Readiness::HANGUP) && !ready.contains(Readiness::READABLE) {
            return Ok(Step::ShellGone);
        }

        if ready.contains(Readiness::WRITABLE) && shared.command.is_ready() {
            if shared.command.is_exit() {
                shared.command.clear();
                drop(shared);
                self.interrupt_descendants();
                return Ok(Step::Exit);
            }
            self.send_command(&mut shared);
        }

        Ok(Step::Continue { notify })
    }

    /// Sanitize a fresh read, cancel local echo and stage it for display.
    fn accept_output(&mut self, n: usize, shared: &mut SessionShared) -> bool {
        let mut chunk = self.read_buf[..n].to_vec();

        let clear = match find_clear_screen(&chunk) {
            Some(after) => {
                chunk.drain(..after);
                true
            }
            None => false,
        };

        remove_escape_codes(&mut chunk, self.options.sanitize);

        if self.entered.is_pending() {
            match self.entered.filter(&mut chunk) {
                EchoOutcome::Suppressed => debug!("suppressed local echo"),
                EchoOutcome::Trimmed => debug!("trimmed local echo"),
                EchoOutcome::Untouched => debug!("read did not match the pending echo"),
            }
        }

        if chunk.is_empty() && !clear {
            return false;
        }

        shared.terminal_buffer.clear();
        shared.terminal_buffer.extend_from_slice(&chunk);
        shared.clear_requested = clear;
        shared.term_needs_update = true;
        true
    }

    fn send_command(&mut self, shared: &mut SessionShared) {
        let line = shared.command.take();
        match self.pty.write(&line) {
            Ok(n) if n < line.len() => {
                warn!("Short write to PTY: {} of {} bytes", n, line.len());
            }
            Ok(_) => debug!(bytes = line.len(), "sent command"),
            Err(e) => warn!("{}", e),
        }
        self.entered.record(&line);
    }

    fn deliver_interrupt(&mut self, shared: &mut SessionShared) {
        self.interrupt_descendants();
        if let Err(e) = self.pty.signal_shell(Signal::SIGINT) {
            warn!("{}", e);
        }
        shared.interrupt_requested = false;
        shared.command.clear();
        self.entered.forget();
    }

    fn interrupt_descendants(&self) {
        let count = self
            .pty
            .signal_descendants(self.options.signal_strategy, Signal::SIGINT);
        debug!(count, "interrupted descendants");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::{Path, PathBuf};
    use std::time::Instant;

    use crate::core::bridge::{BridgeOptions, RenderBridge};
    use crate::core::pty::DEFAULT_SHELL;
    use crate::core::surface::{DisplaySurface, TextArea};

    /// The shell prints this, but its echo of the command line does not
    /// contain it.
    const MARKER_COMMAND: &str = "echo padterm-$((40+2))";
    const MARKER_OUTPUT: &str = "padterm-42";

    fn sh() -> ShellCommand {
        ShellCommand {
            program: PathBuf::from(DEFAULT_SHELL),
            custom: false,
        }
    }

    fn test_options() -> SessionOptions {
        let mut options = SessionOptions::new(sh(), TermGeometry { cols: 80, rows: 24 });
        options.disable_echo = true;
        options
    }

    /// Type `line` and press Enter.
    fn send_line(handle: &SessionHandle, line: &str) {
        handle.with_command(|cmd| {
            assert!(cmd.push_bytes(line.as_bytes()));
            assert!(cmd.enter());
        });
    }

    /// Pump events into the surface until `pred` holds or time runs out.
    fn pump_until(
        session: &PtySession,
        bridge: &mut RenderBridge,
        surface: &mut TextArea,
        timeout: Duration,
        pred: impl Fn(&TextArea) -> bool,
    ) -> bool {
        let handle = session.handle();
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            session.recv_event_timeout(Duration::from_millis(20));
            bridge.flush(&handle, surface);
            if pred(surface) {
                return true;
            }
        }
        false
    }

    /// Let the shell print its prompt so later reads start with fresh output.
    fn wait_for_prompt(session: &PtySession, bridge: &mut RenderBridge, surface: &mut TextArea) {
        pump_until(session, bridge, surface, Duration::from_secs(5), |s| !s.is_empty());
        pump_until(session, bridge, surface, Duration::from_millis(300), |_| false);
    }

    fn wait_for_exit(session: &PtySession) -> Option<SessionEvent> {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if let Some(event @ SessionEvent::Exited(_)) =
                session.recv_event_timeout(Duration::from_millis(50))
            {
                return Some(event);
            }
        }
        None
    }

    #[test]
    fn test_take_output_clears_state() {
        let handle = SessionHandle::new();
        assert_eq!(handle.take_output(), None);

        handle.publish_output(b"hello", true);
        let out = handle.take_output().expect("output");
        assert_eq!(out.bytes, b"hello");
        assert!(out.clear);
        assert_eq!(handle.take_output(), None);
        assert!(handle.lock().terminal_buffer.is_empty());
    }

    #[test]
    fn test_interrupt_request_flag() {
        let handle = SessionHandle::new();
        assert!(!handle.interrupt_pending());
        handle.request_interrupt();
        assert!(handle.interrupt_pending());
    }

    #[test]
    fn test_echo_command_reaches_surface() {
        let session = PtySession::start(test_options()).expect("start session");
        let handle = session.handle();
        let mut bridge = RenderBridge::new(BridgeOptions::default());
        let mut surface = TextArea::new(9314);

        send_line(&handle, "echo hi");
        let seen = pump_until(&session, &mut bridge, &mut surface, Duration::from_secs(5), |s| {
            s.text().contains("hi")
        });

        assert!(seen, "surface was {:?}", surface.text());
        assert!(!surface.text().contains('\x1b'));
        assert!(!surface.text().contains("echo hi"));
    }

    #[test]
    fn test_sent_line_leaves_queue_empty() {
        let session = PtySession::start(test_options()).expect("start session");
        let handle = session.handle();
        let mut bridge = RenderBridge::new(BridgeOptions::default());
        let mut surface = TextArea::new(9314);

        send_line(&handle, MARKER_COMMAND);
        let seen = pump_until(&session, &mut bridge, &mut surface, Duration::from_secs(5), |s| {
            s.text().contains(MARKER_OUTPUT)
        });
        assert!(seen, "surface was {:?}", surface.text());

        let shared = handle.lock();
        assert!(shared.command.is_empty());
        assert!(!shared.command.is_ready());
    }

    #[test]
    fn test_bash_output_survives_default_sanitizer() {
        let Some(bash) = ["/bin/bash", "/usr/bin/bash"]
            .into_iter()
            .map(Path::new)
            .find(|p| p.exists())
        else {
            return;
        };
        let shell = ShellCommand {
            program: bash.to_path_buf(),
            custom: false,
        };
        let session = PtySession::start(SessionOptions::new(shell, TermGeometry { cols: 80, rows: 24 }))
            .expect("start bash");
        let handle = session.handle();
        let mut bridge = RenderBridge::new(BridgeOptions::default());
        let mut surface = TextArea::new(9314);

        wait_for_prompt(&session, &mut bridge, &mut surface);
        send_line(&handle, MARKER_COMMAND);
        let seen = pump_until(&session, &mut bridge, &mut surface, Duration::from_secs(5), |s| {
            s.text().contains(MARKER_OUTPUT)
        });

        assert!(seen, "surface was {:?}", surface.text());
        assert!(!surface.text().contains('\x1b'));
    }

    #[test]
    fn test_local_echo_is_removed() {
        let mut options = test_options();
        options.disable_echo = false;
        let session = PtySession::start(options).expect("start session");
        let handle = session.handle();
        let mut bridge = RenderBridge::new(BridgeOptions::default());
        let mut surface = TextArea::new(9314);

        wait_for_prompt(&session, &mut bridge, &mut surface);
        let before = surface.text().len();

        let cwd = std::env::current_dir().expect("cwd");
        let cwd = cwd.to_string_lossy().into_owned();
        send_line(&handle, "pwd");
        let seen = pump_until(&session, &mut bridge, &mut surface, Duration::from_secs(5), |s| {
            s.text()[before..].contains(cwd.as_str())
        });

        let shown = &surface.text()[before..];
        assert!(seen, "surface was {:?}", surface.text());
        assert!(!shown.contains("pwd"), "echo leaked: {:?}", shown);
    }

    #[test]
    fn test_exit_is_not_written_to_shell() {
        let session = PtySession::start(test_options()).expect("start session");
        let handle = session.handle();

        send_line(&handle, "exit");

        // A literal `exit` would end the shell with status 0. The session
        // hangs it up instead, so there is no exit code.
        assert_eq!(wait_for_exit(&session), Some(SessionEvent::Exited(None)));
        assert!(!session.is_running());
        assert!(handle.lock().command.is_empty());
    }

    #[test]
    fn test_interrupt_stops_foreground_job() {
        let session = PtySession::start(test_options()).expect("start session");
        let handle = session.handle();
        let mut bridge = RenderBridge::new(BridgeOptions::default());
        let mut surface = TextArea::new(9314);

        send_line(&handle, "sleep 30");
        // Let the shell start the job before interrupting it.
        pump_until(&session, &mut bridge, &mut surface, Duration::from_millis(500), |_| false);
        handle.request_interrupt();
        pump_until(&session, &mut bridge, &mut surface, Duration::from_millis(300), |_| false);
        assert!(!handle.interrupt_pending());

        send_line(&handle, MARKER_COMMAND);
        let seen = pump_until(&session, &mut bridge, &mut surface, Duration::from_secs(5), |s| {
            s.text().contains(MARKER_OUTPUT)
        });
        assert!(seen, "surface was {:?}", surface.text());
    }
}
