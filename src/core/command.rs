//! Command input queue
//!
//! Keystrokes accumulate here until Enter marks the line ready to send. The
//! buffer lives inside the session's shared state, so every access happens
//! under the session mutex.

/// Capacity of the outbound command buffer
pub const COMMAND_BUFFER_SIZE: usize = 4096;

/// Queue lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandState {
    Empty,
    Accumulating,
    ReadyToSend,
}

/// Fixed-capacity keystroke buffer
#[derive(Debug, Clone)]
pub struct CommandBuffer {
    data: Vec<u8>,
    capacity: usize,
    /// Insertion cursor (always at the end for on-screen keyboard input)
    pos: usize,
    ready: bool,
}

impl Default for CommandBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandBuffer {
    pub fn new() -> Self {
        Self::with_capacity(COMMAND_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
            capacity: capacity.max(2),
            pos: 0,
            ready: false,
        }
    }

    pub fn state(&self) -> CommandState {
        if self.ready {
            CommandState::ReadyToSend
        } else if self.is_empty() {
            CommandState::Empty
        } else {
            CommandState::Accumulating
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Append keystroke bytes.
    ///
    /// One byte is always kept free for the terminating newline. Returns
    /// `false` when the bytes do not fit or a line is already waiting to be
    /// sent; nothing is appended in that case.
    pub fn push_bytes(&mut self, bytes: &[u8]) -> bool {
        if self.ready || self.len() + bytes.len() >= self.capacity {
            return false;
        }
        self.data.splice(self.pos..self.pos, bytes.iter().copied());
        self.pos += bytes.len();
        true
    }

    pub fn push_char(&mut self, ch: char) -> bool {
        let mut utf8 = [0u8; 4];
        self.push_bytes(ch.encode_utf8(&mut utf8).as_bytes())
    }

    /// Remove the character before the cursor. Returns `false` if there is
    /// nothing to remove.
    pub fn backspace(&mut self) -> bool {
        if self.ready || self.pos == 0 {
            return false;
        }
        // Step back over UTF-8 continuation bytes so a whole character goes.
        let mut start = self.pos - 1;
        while start > 0 && self.data[start] & 0xC0 == 0x80 {
            start -= 1;
        }
        self.data.drain(start..self.pos);
        self.pos = start;
        true
    }

    /// Terminate the line with a newline and mark it ready to send.
    pub fn enter(&mut self) -> bool {
        if self.ready {
            return false;
        }
        self.data.push(b'\n');
        self.pos = self.data.len();
        self.ready = true;
        true
    }

    /// Whether the queued line is the `exit` builtin.
    ///
    /// Matches the literal prefix `exit` followed by end of input or
    /// whitespace, so `exit`, `exit\n` and `exit 1` all qualify.
    pub fn is_exit(&self) -> bool {
        is_exit_command(&self.data)
    }

    /// Move the queued line out, leaving the buffer empty.
    pub fn take(&mut self) -> Vec<u8> {
        let out = std::mem::take(&mut self.data);
        self.data.reserve(self.capacity);
        self.pos = 0;
        self.ready = false;
        out
    }

    /// Zero the buffer and reset length, position and the ready flag.
    pub fn clear(&mut self) {
        self.data.iter_mut().for_each(|b| *b = 0);
        self.data.clear();
        self.pos = 0;
        self.ready = false;
    }
}

pub fn is_exit_command(line: &[u8]) -> bool {
    match line.strip_prefix(b"exit") {
        Some(rest) => rest.first().map_or(true, |b| b.is_ascii_whitespace()),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accumulate_and_send() {
        let mut cmd = CommandBuffer::new();
        assert_eq!(cmd.state(), CommandState::Empty);

        for ch in "ls".chars() {
            assert!(cmd.push_char(ch));
        }
        assert_eq!(cmd.state(), CommandState::Accumulating);
        assert!(cmd.enter());
        assert_eq!(cmd.state(), CommandState::ReadyToSend);
        assert_eq!(cmd.as_bytes(), b"ls\n");

        let sent = cmd.take();
        assert_eq!(sent, b"ls\n");
        assert_eq!(cmd.len(), 0);
        assert!(!cmd.is_ready());
        assert_eq!(cmd.state(), CommandState::Empty);

        // Typing resumes at the start of a fresh line.
        assert!(cmd.push_char('p'));
        assert_eq!(cmd.as_bytes(), b"p");
    }

    #[test]
    fn test_clear_resets_everything() {
        let mut cmd = CommandBuffer::new();
        cmd.push_bytes(b"sleep 10");
        cmd.enter();
        cmd.clear();
        assert_eq!(cmd.state(), CommandState::Empty);
        assert_eq!(cmd.len(), 0);
        assert!(!cmd.is_ready());
    }

    #[test]
    fn test_no_input_while_ready() {
        let mut cmd = CommandBuffer::new();
        cmd.push_bytes(b"pwd");
        cmd.enter();
        assert!(!cmd.push_char('x'));
        assert!(!cmd.backspace());
        assert!(!cmd.enter());
        assert_eq!(cmd.as_bytes(), b"pwd\n");
    }

    #[test]
    fn test_capacity_keeps_room_for_newline() {
        let mut cmd = CommandBuffer::with_capacity(4);
        assert!(cmd.push_bytes(b"abc"));
        assert!(!cmd.push_char('d'));
        assert!(cmd.enter());
        assert_eq!(cmd.as_bytes(), b"abc\n");
    }

    #[test]
    fn test_backspace_removes_whole_char() {
        let mut cmd = CommandBuffer::new();
        cmd.push_char('a');
        cmd.push_char('é');
        assert_eq!(cmd.len(), 3);
        assert!(cmd.backspace());
        assert_eq!(cmd.as_bytes(), b"a");
        assert!(cmd.backspace());
        assert!(!cmd.backspace());
    }

    #[test]
    fn test_exit_detection() {
        assert!(is_exit_command(b"exit"));
        assert!(is_exit_command(b"exit\n"));
        assert!(is_exit_command(b"exit 3\n"));
        assert!(!is_exit_command(b"exits\n"));
        assert!(!is_exit_command(b"echo exit\n"));
        assert!(!is_exit_command(b""));
    }
}
