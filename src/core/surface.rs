//! Display surface
//!
//! The render bridge and the keyboard adapter talk to the on-screen text
//! widget only through [`DisplaySurface`]. [`TextArea`] is the bounded widget
//! used by the UI.

/// Hard cap on the displayed text, in bytes
pub const MAX_TEXTAREA_LENGTH: usize = 9314;

/// Operations the text widget exposes to the terminal pipeline
pub trait DisplaySurface {
    /// Append at the end and move the cursor there.
    fn append_text(&mut self, text: &str);

    fn clear_text(&mut self);

    fn text(&self) -> &str;

    fn len(&self) -> usize {
        self.text().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Largest text length the surface will hold
    fn capacity(&self) -> usize;

    /// Cursor as a byte offset into [`text`](Self::text)
    fn cursor(&self) -> usize;

    /// Move the cursor, snapping to the nearest preceding char boundary.
    fn set_cursor(&mut self, pos: usize);

    /// Delete the character before the cursor.
    fn delete_char(&mut self);

    /// Delete the character at the cursor.
    fn delete_char_forward(&mut self);

    /// Remove at least `bytes` bytes from the front, whole characters only.
    /// Returns how many bytes went.
    fn evict_front(&mut self, bytes: usize) -> usize {
        let before = self.len();
        self.set_cursor(0);
        while before - self.len() < bytes && !self.is_empty() {
            self.delete_char_forward();
        }
        let end = self.len();
        self.set_cursor(end);
        before - self.len()
    }
}

/// Bounded text widget
#[derive(Debug, Clone)]
pub struct TextArea {
    text: String,
    cursor: usize,
    capacity: usize,
}

impl Default for TextArea {
    fn default() -> Self {
        Self::new(MAX_TEXTAREA_LENGTH)
    }
}

impl TextArea {
    pub fn new(capacity: usize) -> Self {
        Self {
            text: String::new(),
            cursor: 0,
            capacity: capacity.max(1),
        }
    }

    fn floor_boundary(&self, pos: usize) -> usize {
        let mut pos = pos.min(self.text.len());
        while !self.text.is_char_boundary(pos) {
            pos -= 1;
        }
        pos
    }

    fn ceil_boundary(&self, pos: usize) -> usize {
        let mut pos = pos.min(self.text.len());
        while !self.text.is_char_boundary(pos) {
            pos += 1;
        }
        pos
    }
}

impl DisplaySurface for TextArea {
    fn append_text(&mut self, text: &str) {
        // A single append larger than the widget keeps only its tail.
        let text = if text.len() > self.capacity {
            let mut start = text.len() - self.capacity;
            while !text.is_char_boundary(start) {
                start += 1;
            }
            &text[start..]
        } else {
            text
        };

        let overflow = (self.text.len() + text.len()).saturating_sub(self.capacity);
        if overflow > 0 {
            self.evict_front(overflow);
        }
        self.text.push_str(text);
        self.cursor = self.text.len();
    }

    fn clear_text(&mut self) {
        self.text.clear();
        self.cursor = 0;
    }

    fn text(&self) -> &str {
        &self.text
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn cursor(&self) -> usize {
        self.cursor
    }

    fn set_cursor(&mut self, pos: usize) {
        self.cursor = self.floor_boundary(pos);
    }

    fn delete_char(&mut self) {
        if let Some(ch) = self.text[..self.cursor].chars().next_back() {
            self.cursor -= ch.len_utf8();
            self.text.remove(self.cursor);
        }
    }

    fn delete_char_forward(&mut self) {
        if self.cursor < self.text.len() {
            self.text.remove(self.cursor);
        }
    }

    fn evict_front(&mut self, bytes: usize) -> usize {
        let end = self.ceil_boundary(bytes);
        self.text.drain(..end);
        self.cursor = self.cursor.saturating_sub(end);
        end
    }
}
