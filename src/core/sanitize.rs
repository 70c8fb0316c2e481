//! Escape sequence removal
//!
//! Strips ANSI/VT escape runs from raw shell output. Nothing is interpreted:
//! an escape run starts at ESC and ends at the first terminator byte, and the
//! whole run (terminator included) is dropped.

use serde::{Deserialize, Serialize};

const ESC: u8 = 0x1B;
const CR: u8 = 0x0D;

/// Clear-screen sequence (ED 2)
const CLEAR_SCREEN: &[u8] = b"\x1b[2J";

/// What to do with the literal `^@` marker some shells print for NUL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaretAt {
    /// Rewrite `^@` into two newlines
    #[default]
    Newlines,
    /// Drop `^@` entirely
    Strip,
}

/// Sanitizer options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SanitizeOptions {
    /// Also end an escape run at carriage return
    pub cr_terminates: bool,
    /// `^@` handling
    pub caret_at: CaretAt,
}

impl Default for SanitizeOptions {
    fn default() -> Self {
        Self {
            cr_terminates: true,
            caret_at: CaretAt::default(),
        }
    }
}

impl SanitizeOptions {
    fn is_terminator(&self, byte: u8) -> bool {
        byte == b'h' || byte == b'm' || (self.cr_terminates && byte == CR)
    }
}

/// Remove escape runs in place.
///
/// Two-pointer compaction: `dst` never overtakes `src`, so kept bytes are
/// moved toward the front without reordering. An ESC inside a run does not
/// restart it. A run that never terminates swallows the rest of the buffer.
pub fn remove_escape_codes(buffer: &mut Vec<u8>, opts: SanitizeOptions) {
    let mut dst = 0;
    let mut inside_escape = false;

    for src in 0..buffer.len() {
        let byte = buffer[src];

        if byte == ESC {
            inside_escape = true;
        }

        if inside_escape {
            if opts.is_terminator(byte) {
                inside_escape = false;
            }
            continue;
        }

        // `^@` is matched against the compacted output so a marker that only
        // becomes adjacent after removal is handled the same on every pass.
        if byte == b'@' && dst > 0 && buffer[dst - 1] == b'^' {
            match opts.caret_at {
                CaretAt::Newlines => {
                    buffer[dst - 1] = b'\n';
                    buffer[dst] = b'\n';
                    dst += 1;
                }
                CaretAt::Strip => {
                    dst -= 1;
                }
            }
            continue;
        }

        buffer[dst] = byte;
        dst += 1;
    }

    buffer.truncate(dst);
}

/// Offset just past the last clear-screen sequence, if any.
pub fn find_clear_screen(bytes: &[u8]) -> Option<usize> {
    bytes
        .windows(CLEAR_SCREEN.len())
        .rposition(|w| w == CLEAR_SCREEN)
        .map(|pos| pos + CLEAR_SCREEN.len())
}

/// Keep only characters that can be shown on the text surface.
///
/// Alphanumerics, punctuation and whitespace pass; other control characters
/// and carriage returns are dropped.
pub fn retain_printable(text: &str) -> String {
    text.chars()
        .filter(|&c| {
            if c == '\r' {
                return false;
            }
            if c.is_ascii() {
                c.is_ascii_alphanumeric() || c.is_ascii_punctuation() || c.is_ascii_whitespace() || c == '\x0B'
            } else {
                !c.is_control()
            }
        })
        .collect()
}
