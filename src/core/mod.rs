//! Core terminal pipeline components.
//!
//! - **sanitize**: escape-sequence stripping and printable filtering
//! - **command**: outbound keystroke queue
//! - **echo**: local-echo cancellation for the last sent command
//! - **pty**: shell spawned under a Unix pseudo-terminal
//! - **session**: shared state plus the dedicated PTY I/O thread
//! - **surface**: bounded text widget contract
//! - **bridge**: staged output onto the surface under the length cap
//!
//! # Architecture
//!
//! ```text
//! PtySession
//! ├── UnixPty (shell process + master fd)
//! ├── pty-io thread ── poll/read/write, sanitize, echo filter
//! └── SessionHandle (Arc<Mutex<SessionShared>>)
//!     ├── CommandBuffer   <- keyboard adapter
//!     └── terminal buffer -> RenderBridge -> DisplaySurface
//! ```

pub mod bridge;
pub mod command;
pub mod echo;
pub mod pty;
pub mod sanitize;
pub mod session;
pub mod surface;
