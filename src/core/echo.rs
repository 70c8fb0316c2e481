//! Local echo cancellation
//!
//! The on-screen keyboard already shows what the user typed, so the copy the
//! shell echoes back for the line just sent is removed from the next reads.

/// Outcome of filtering one read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EchoOutcome {
    /// No echo was pending or the read did not start with it
    Untouched,
    /// The read held part of the echo and nothing else
    Suppressed,
    /// The echo was removed and output remains
    Trimmed,
}

/// Copy of the last command sent, held until its echo has been consumed
#[derive(Debug, Clone, Default)]
pub struct EnteredCommand {
    /// Echo bytes still expected from the shell
    pending: Vec<u8>,
}

impl EnteredCommand {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember a freshly written command, superseding any earlier one.
    pub fn record(&mut self, command: &[u8]) {
        self.pending.clear();
        self.pending.extend_from_slice(command);
    }

    pub fn is_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn forget(&mut self) {
        self.pending.clear();
    }

    /// Strip the expected echo from the front of `read`.
    ///
    /// Carriage returns in `read` are skipped while matching, since the line
    /// discipline turns `\n` into `\r\n` on the way back. A read that ends
    /// part-way through the echo is suppressed and the rest of the echo stays
    /// pending for the next read. Any mismatch drops the pending echo and
    /// leaves `read` alone.
    pub fn filter(&mut self, read: &mut Vec<u8>) -> EchoOutcome {
        if self.pending.is_empty() || read.is_empty() {
            return EchoOutcome::Untouched;
        }

        let mut r = 0;
        let mut p = 0;
        while r < read.len() && p < self.pending.len() {
            if read[r] == self.pending[p] {
                r += 1;
                p += 1;
            } else if read[r] == b'\r' && self.pending[p] != b'\r' {
                r += 1;
            } else {
                self.pending.clear();
                return EchoOutcome::Untouched;
            }
        }

        if p < self.pending.len() {
            // Ran out of input mid-echo.
            self.pending.drain(..p);
            read.clear();
            return EchoOutcome::Suppressed;
        }

        self.pending.clear();
        // The echoed newline may still have its carriage return attached.
        while r < read.len() && read[r] == b'\r' {
            r += 1;
        }
        read.drain(..r);
        if read.is_empty() {
            EchoOutcome::Suppressed
        } else {
            EchoOutcome::Trimmed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_echo_then_output_is_trimmed() {
        let mut entered = EnteredCommand::new();
        entered.record(b"pwd\n");
        let mut read = b"pwd\n/home/user\n".to_vec();
        assert_eq!(entered.filter(&mut read), EchoOutcome::Trimmed);
        assert_eq!(read, b"/home/user\n");
        assert!(!entered.is_pending());
    }

    #[test]
    fn test_echo_with_crlf() {
        let mut entered = EnteredCommand::new();
        entered.record(b"pwd\n");
        let mut read = b"pwd\r\n/root\r\n".to_vec();
        assert_eq!(entered.filter(&mut read), EchoOutcome::Trimmed);
        assert_eq!(read, b"/root\r\n");
    }

    #[test]
    fn test_exact_echo_is_suppressed() {
        let mut entered = EnteredCommand::new();
        entered.record(b"ls\n");
        let mut read = b"ls\r\n".to_vec();
        assert_eq!(entered.filter(&mut read), EchoOutcome::Suppressed);
        assert!(read.is_empty());
    }

    #[test]
    fn test_split_echo_across_reads() {
        let mut entered = EnteredCommand::new();
        entered.record(b"echo hi\n");

        let mut first = b"echo".to_vec();
        assert_eq!(entered.filter(&mut first), EchoOutcome::Suppressed);
        assert!(entered.is_pending());

        let mut second = b" hi\r\nhi\r\n".to_vec();
        assert_eq!(entered.filter(&mut second), EchoOutcome::Trimmed);
        assert_eq!(second, b"hi\r\n");
    }

    #[test]
    fn test_mismatch_leaves_output_alone() {
        let mut entered = EnteredCommand::new();
        entered.record(b"pwd\n");
        let mut read = b"bash: warning\n".to_vec();
        assert_eq!(entered.filter(&mut read), EchoOutcome::Untouched);
        assert_eq!(read, b"bash: warning\n");
        assert!(!entered.is_pending());
    }

    #[test]
    fn test_nothing_pending() {
        let mut entered = EnteredCommand::new();
        let mut read = b"pwd\n".to_vec();
        assert_eq!(entered.filter(&mut read), EchoOutcome::Untouched);
        assert_eq!(read, b"pwd\n");
    }
}
