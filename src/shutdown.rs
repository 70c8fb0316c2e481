//! Cooperative shutdown
//!
//! SIGINT, SIGTERM and SIGHUP only raise a flag. The UI loop checks it each
//! tick and unwinds normally, so the session can hang up the shell and the
//! terminal gets restored.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use signal_hook::consts::{SIGHUP, SIGINT, SIGTERM};

#[derive(Debug, Clone, Default)]
pub struct ShutdownToken {
    flag: Arc<AtomicBool>,
}

impl ShutdownToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// A token that is raised by the process termination signals.
    pub fn with_signals() -> io::Result<Self> {
        let token = Self::new();
        for signal in [SIGINT, SIGTERM, SIGHUP] {
            signal_hook::flag::register(signal, token.flag.clone())?;
        }
        Ok(token)
    }

    pub fn request(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_is_shared_between_clones() {
        let token = ShutdownToken::new();
        let other = token.clone();
        assert!(!other.is_requested());
        token.request();
        assert!(other.is_requested());
    }

    #[test]
    fn test_signal_raises_flag() {
        let token = ShutdownToken::with_signals().unwrap();
        signal_hook::low_level::raise(SIGHUP).unwrap();
        assert!(token.is_requested());
    }
}
