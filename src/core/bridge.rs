//! Render bridge
//!
//! Moves staged PTY output onto a [`DisplaySurface`] on the UI tick, keeping
//! the displayed text under its cap.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use super::sanitize::retain_printable;
use super::session::{PendingOutput, SessionHandle};
use super::surface::{DisplaySurface, MAX_TEXTAREA_LENGTH};

/// What to do when new output would push the surface past its cap
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Drop the oldest characters to make room
    #[default]
    Evict,
    /// Append in `chunk_size` pieces, making room before each one
    Split,
}

#[derive(Debug, Clone)]
pub struct BridgeOptions {
    pub max_len: usize,
    pub overflow: OverflowPolicy,
    pub chunk_size: usize,
    /// Skip output identical to the previous flush
    pub dedupe: bool,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            max_len: MAX_TEXTAREA_LENGTH,
            overflow: OverflowPolicy::Evict,
            chunk_size: 4096,
            dedupe: true,
        }
    }
}

pub struct RenderBridge {
    options: BridgeOptions,
    /// Raw bytes of the last rendered output
    last_snapshot: Vec<u8>,
    /// Incomplete UTF-8 tail held back from the previous output
    carry: Vec<u8>,
}

impl RenderBridge {
    pub fn new(options: BridgeOptions) -> Self {
        Self {
            options,
            last_snapshot: Vec::new(),
            carry: Vec::new(),
        }
    }

    /// Render whatever the session has staged. Returns `true` if the surface
    /// changed.
    pub fn flush<S>(&mut self, handle: &SessionHandle, surface: &mut S) -> bool
    where
        S: DisplaySurface + ?Sized,
    {
        match handle.take_output() {
            Some(output) => self.render(output, surface),
            None => false,
        }
    }

    pub fn render<S>(&mut self, output: PendingOutput, surface: &mut S) -> bool
    where
        S: DisplaySurface + ?Sized,
    {
        if self.options.dedupe
            && !output.clear
            && !output.bytes.is_empty()
            && output.bytes == self.last_snapshot
        {
            debug!(bytes = output.bytes.len(), "skipping repeated output");
            return false;
        }

        if output.clear {
            surface.clear_text();
            self.carry.clear();
        }

        let text = self.decode(&output.bytes);
        let text = retain_printable(&text);
        self.append_bounded(&text, surface);

        self.last_snapshot = output.bytes;
        true
    }

    /// Append text under the overflow policy.
    pub fn append_bounded<S>(&self, text: &str, surface: &mut S)
    where
        S: DisplaySurface + ?Sized,
    {
        if text.is_empty() {
            return;
        }
        match self.options.overflow {
            OverflowPolicy::Evict => self.append_evicting(text, surface),
            OverflowPolicy::Split => {
                for chunk in split_chunks(text, self.options.chunk_size) {
                    self.append_evicting(chunk, surface);
                }
            }
        }
    }

    fn append_evicting<S>(&self, text: &str, surface: &mut S)
    where
        S: DisplaySurface + ?Sized,
    {
        let cap = self.options.max_len.min(surface.capacity()).max(1);
        let text = tail(text, cap);
        let overflow = (surface.len() + text.len()).saturating_sub(cap);
        if overflow > 0 {
            let evicted = surface.evict_front(overflow);
            trace!(evicted, "evicted oldest text");
        }
        surface.append_text(text);
    }

    fn decode(&mut self, bytes: &[u8]) -> String {
        let mut buf = std::mem::take(&mut self.carry);
        buf.extend_from_slice(bytes);
        let boundary = utf8_safe_boundary(&buf);
        self.carry = buf.split_off(boundary);
        String::from_utf8_lossy(&buf).into_owned()
    }
}

/// Last at most `max` bytes of `text`, starting on a char boundary.
fn tail(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut start = text.len() - max;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    &text[start..]
}

/// Split into pieces of at most `size` bytes without cutting a character.
fn split_chunks(text: &str, size: usize) -> Vec<&str> {
    let size = size.max(4);
    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.len() > size {
        let mut end = size;
        while !rest.is_char_boundary(end) {
            end -= 1;
        }
        let (head, tail) = rest.split_at(end);
        chunks.push(head);
        rest = tail;
    }
    if !rest.is_empty() {
        chunks.push(rest);
    }
    chunks
}

/// Length of the prefix of `buf` that ends on a complete UTF-8 character.
fn utf8_safe_boundary(buf: &[u8]) -> usize {
    let len = buf.len();
    let mut i = len;
    while i > 0 && len - i < 4 {
        let byte = buf[i - 1];
        if byte & 0x80 == 0 {
            return i;
        }
        if byte & 0xC0 == 0x80 {
            i -= 1;
            continue;
        }
        let char_len = match byte {
            b if b & 0xF8 == 0xF0 => 4,
            b if b & 0xF0 == 0xE0 => 3,
            b if b & 0xE0 == 0xC0 => 2,
            _ => return len,
        };
        return if len - (i - 1) >= char_len { len } else { i - 1 };
    }
    len
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::surface::TextArea;
    use std::sync::{Arc, Mutex};
    use std::thread;

    fn output(bytes: &[u8]) -> PendingOutput {
        PendingOutput {
            bytes: bytes.to_vec(),
            clear: false,
        }
    }

    fn small_bridge(max_len: usize, overflow: OverflowPolicy) -> RenderBridge {
        RenderBridge::new(BridgeOptions {
            max_len,
            overflow,
            chunk_size: 7,
            dedupe: false,
        })
    }

    #[test]
    fn test_flush_appends_and_clears_flag() {
        let handle = SessionHandle::new();
        let mut bridge = RenderBridge::new(BridgeOptions::default());
        let mut surface = TextArea::default();

        handle.publish_output(b"hello\r\n", false);
        assert!(bridge.flush(&handle, &mut surface));
        assert_eq!(surface.text(), "hello\n");
        assert_eq!(handle.take_output(), None);
        assert!(!bridge.flush(&handle, &mut surface));
    }

    #[test]
    fn test_repeated_output_is_skipped() {
        let mut bridge = RenderBridge::new(BridgeOptions::default());
        let mut surface = TextArea::default();

        assert!(bridge.render(output(b"$ "), &mut surface));
        assert!(!bridge.render(output(b"$ "), &mut surface));
        assert_eq!(surface.text(), "$ ");
        assert!(bridge.render(output(b"ok"), &mut surface));
        assert_eq!(surface.text(), "$ ok");
    }

    #[test]
    fn test_clear_replaces_surface() {
        let mut bridge = RenderBridge::new(BridgeOptions::default());
        let mut surface = TextArea::default();

        bridge.render(output(b"old stuff"), &mut surface);
        bridge.render(
            PendingOutput {
                bytes: b"fresh".to_vec(),
                clear: true,
            },
            &mut surface,
        );
        assert_eq!(surface.text(), "fresh");
    }

    #[test]
    fn test_split_utf8_is_carried() {
        let mut bridge = RenderBridge::new(BridgeOptions::default());
        let mut surface = TextArea::default();
        let bytes = "né".as_bytes();

        bridge.render(output(&bytes[..2]), &mut surface);
        assert_eq!(surface.text(), "n");
        bridge.render(output(&bytes[2..]), &mut surface);
        assert_eq!(surface.text(), "né");
    }

    #[test]
    fn test_control_bytes_are_filtered() {
        let mut bridge = RenderBridge::new(BridgeOptions::default());
        let mut surface = TextArea::default();
        bridge.render(output(b"a\x07b\x00c"), &mut surface);
        assert_eq!(surface.text(), "abc");
    }

    fn check_bounded(policy: OverflowPolicy) {
        let cap = 50;
        let mut bridge = small_bridge(cap, policy);
        let mut surface = TextArea::new(1000);
        let mut everything = String::new();

        // Deterministic mix of chunk sizes, some larger than the cap.
        let mut seed: u32 = 7;
        for i in 0..200 {
            seed = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345);
            let size = (seed >> 16) as usize % 80;
            let chunk: String = (0..size)
                .map(|j| (b'a' + ((i + j) % 26) as u8) as char)
                .collect();
            everything.push_str(&chunk);
            bridge.render(output(chunk.as_bytes()), &mut surface);

            assert!(surface.len() <= cap, "len {} after chunk {}", surface.len(), i);
            assert!(everything.ends_with(surface.text()));
        }
        assert_eq!(surface.len(), cap);
    }

    #[test]
    fn test_evict_never_exceeds_cap() {
        check_bounded(OverflowPolicy::Evict);
    }

    #[test]
    fn test_split_never_exceeds_cap() {
        check_bounded(OverflowPolicy::Split);
    }

    #[test]
    fn test_oldest_characters_are_evicted() {
        let mut bridge = small_bridge(10, OverflowPolicy::Evict);
        let mut surface = TextArea::new(100);
        bridge.render(output(b"0123456789"), &mut surface);
        bridge.render(output(b"abc"), &mut surface);
        assert_eq!(surface.text(), "3456789abc");
    }

    #[test]
    fn test_echo_is_not_displayed() {
        use crate::core::echo::EnteredCommand;

        let mut entered = EnteredCommand::new();
        entered.record(b"pwd\n");
        let mut read = b"pwd\r\n/home/user\r\n".to_vec();
        entered.filter(&mut read);

        let handle = SessionHandle::new();
        handle.publish_output(&read, false);
        let mut bridge = RenderBridge::new(BridgeOptions::default());
        let mut surface = TextArea::default();
        bridge.flush(&handle, &mut surface);

        assert_eq!(surface.text(), "/home/user\n");
    }

    #[test]
    fn test_readers_see_whole_appends() {
        let surface = Arc::new(Mutex::new(TextArea::new(64)));
        let handle = SessionHandle::new();

        let writer = {
            let surface = surface.clone();
            let handle = handle.clone();
            thread::spawn(move || {
                let mut bridge = small_bridge(64, OverflowPolicy::Split);
                for i in 0..500u32 {
                    let line = format!("[{:04}]", i);
                    handle.publish_output(line.as_bytes(), false);
                    let mut guard = surface.lock().unwrap();
                    bridge.flush(&handle, &mut *guard);
                }
            })
        };

        for _ in 0..500 {
            let snapshot = surface.lock().unwrap().text().to_string();
            assert!(snapshot.len() <= 64);
            // Every append is a whole six-byte record, so eviction of the
            // front keeps records aligned to the end.
            let trimmed = &snapshot[snapshot.len() % 6..];
            for record in trimmed.as_bytes().chunks(6) {
                assert_eq!(record[0], b'[');
                assert_eq!(record[5], b']');
            }
        }
        writer.join().unwrap();
    }

    #[test]
    fn test_utf8_boundary() {
        assert_eq!(utf8_safe_boundary(b""), 0);
        assert_eq!(utf8_safe_boundary(b"abc"), 3);
        let e = "é".as_bytes();
        assert_eq!(utf8_safe_boundary(&[b'a', e[0]]), 1);
        assert_eq!(utf8_safe_boundary(&[b'a', e[0], e[1]]), 3);
        let euro = "€".as_bytes();
        assert_eq!(utf8_safe_boundary(&euro[..2]), 0);
    }

    #[test]
    fn test_split_chunks_keeps_chars_whole() {
        let chunks = split_chunks("ééééé", 5);
        assert!(chunks.iter().all(|c| c.len() <= 5));
        assert_eq!(chunks.concat(), "ééééé");
    }
}
