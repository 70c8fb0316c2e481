//! Terminal renderer using crossterm
//!
//! Draws the header bar, the text area and the on-screen keyboard onto the
//! host terminal.

use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    execute,
    style::{Attribute, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen,
    },
};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::config::{Color, ColorScheme, KeyColors};
use crate::core::surface::DisplaySurface;

use super::keyboard::{Keyboard, Rect};

const TAB_WIDTH: usize = 8;

/// Where each part of the UI goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenLayout {
    pub header: Rect,
    pub text: Rect,
    pub keyboard: Rect,
}

impl ScreenLayout {
    /// Split the host terminal: one header row, the keyboard at the bottom
    /// (half the screen at most) and the text area in between.
    pub fn compute(cols: u16, rows: u16, keyboard: &Keyboard) -> Self {
        let header_h = rows.min(1);
        let key_rows = keyboard.rows().len() as u16;
        let keyboard_h = if keyboard.is_visible() {
            (rows / 2)
                .clamp(key_rows, key_rows * 3)
                .min(rows.saturating_sub(header_h + 1))
        } else {
            0
        };
        let text_h = rows.saturating_sub(header_h + keyboard_h);

        Self {
            header: Rect::new(0, 0, cols, header_h),
            text: Rect::new(0, header_h, cols, text_h),
            keyboard: Rect::new(0, header_h + text_h, cols, keyboard_h),
        }
    }
}

/// Break text into display lines no wider than `width` columns.
pub fn wrap_lines(text: &str, width: u16) -> Vec<String> {
    let width = width.max(1) as usize;
    let mut lines = Vec::new();

    for source in text.split('\n') {
        let mut line = String::new();
        let mut used = 0usize;
        for ch in source.chars() {
            if ch == '\t' {
                let spaces = TAB_WIDTH - used % TAB_WIDTH;
                for _ in 0..spaces {
                    if used == width {
                        lines.push(std::mem::take(&mut line));
                        used = 0;
                    }
                    line.push(' ');
                    used += 1;
                }
                continue;
            }
            let w = ch.width().unwrap_or(0);
            if used + w > width {
                lines.push(std::mem::take(&mut line));
                used = 0;
            }
            line.push(ch);
            used += w;
        }
        lines.push(line);
    }
    lines
}

/// Terminal renderer
pub struct Renderer {
    scheme: ColorScheme,
    /// Shown while the text surface is empty
    placeholder: Option<String>,
    /// Whether the terminal has been initialized
    initialized: bool,
}

impl Renderer {
    pub fn new(scheme: ColorScheme) -> Self {
        Self {
            scheme,
            placeholder: None,
            initialized: false,
        }
    }

    pub fn set_placeholder(&mut self, text: impl Into<String>) {
        self.placeholder = Some(text.into());
    }

    /// Initialize the terminal for rendering
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;

        let mut stdout = io::stdout();
        execute!(
            stdout,
            EnterAlternateScreen,
            crossterm::event::EnableMouseCapture,
            DisableLineWrap,
            SetBackgroundColor(self.scheme.window_bg.to_crossterm()),
            Clear(ClearType::All),
            MoveTo(0, 0)
        )?;
        stdout.flush()?;
        self.initialized = true;
        Ok(())
    }

    /// Cleanup the terminal
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let mut stdout = io::stdout();
        let _ = execute!(stdout, ResetColor, SetAttribute(Attribute::Reset));
        let _ = execute!(stdout, Show);
        let _ = execute!(stdout, EnableLineWrap);
        let _ = execute!(stdout, crossterm::event::DisableMouseCapture);
        let _ = execute!(stdout, LeaveAlternateScreen);
        let _ = stdout.flush();

        // Disable raw mode - this is the most important part
        terminal::disable_raw_mode()?;
        Ok(())
    }

    /// Draw a full frame.
    pub fn render<S>(
        &mut self,
        layout: &ScreenLayout,
        title: &str,
        status: &str,
        surface: &S,
        keyboard: &Keyboard,
    ) -> io::Result<()>
    where
        S: DisplaySurface + ?Sized,
    {
        let stdout = io::stdout();
        let mut stdout = io::BufWriter::with_capacity(65536, stdout.lock());

        // Begin synchronized update (reduces flicker)
        write!(stdout, "\x1b[?2026h")?;
        execute!(stdout, Hide)?;

        self.render_header(&mut stdout, layout.header, title, status)?;
        let cursor = self.render_text(&mut stdout, layout.text, surface)?;
        self.render_keyboard(&mut stdout, layout.keyboard, keyboard)?;

        execute!(stdout, ResetColor, SetAttribute(Attribute::Reset))?;
        if let Some((col, row)) = cursor {
            execute!(stdout, MoveTo(col, row), Show)?;
        }

        // End synchronized update
        write!(stdout, "\x1b[?2026l")?;
        stdout.flush()
    }

    fn render_header<W: Write>(&self, out: &mut W, area: Rect, title: &str, status: &str) -> io::Result<()> {
        if area.is_empty() {
            return Ok(());
        }
        let width = area.width as usize;
        let mut line = vec![' '; width];

        let title_w = title.width().min(width);
        let start = (width - title_w) / 2;
        for (i, ch) in title.chars().take(title_w).enumerate() {
            line[start + i] = ch;
        }
        let status_w = status.width();
        if status_w + 1 < width.saturating_sub(start + title_w) {
            let start = width - status_w - 1;
            for (i, ch) in status.chars().enumerate() {
                line[start + i] = ch;
            }
        }

        self.set_colors(out, self.scheme.header_fg, self.scheme.header_bg)?;
        execute!(out, MoveTo(area.x, area.y))?;
        write!(out, "{}", line.into_iter().collect::<String>())
    }

    /// Draw the tail of the surface text. Returns the cell after the last
    /// character, for the cursor.
    fn render_text<W, S>(&self, out: &mut W, area: Rect, surface: &S) -> io::Result<Option<(u16, u16)>>
    where
        W: Write,
        S: DisplaySurface + ?Sized,
    {
        if area.is_empty() {
            return Ok(None);
        }
        let (text, fg) = match &self.placeholder {
            Some(placeholder) if surface.is_empty() => (placeholder.as_str(), self.scheme.placeholder_fg),
            _ => (surface.text(), self.scheme.text_fg),
        };
        let lines = wrap_lines(text, area.width);
        let visible = &lines[lines.len().saturating_sub(area.height as usize)..];

        self.set_colors(out, fg, self.scheme.text_bg)?;
        for row in 0..area.height {
            execute!(out, MoveTo(area.x, area.y + row))?;
            let line = visible.get(row as usize).map(String::as_str).unwrap_or("");
            let pad = (area.width as usize).saturating_sub(line.width());
            write!(out, "{}{}", line, " ".repeat(pad))?;
        }

        let last_row = visible.len().saturating_sub(1) as u16;
        let last_col = visible.last().map_or(0, |l| l.width() as u16);
        let col = last_col.min(area.width.saturating_sub(1));
        Ok(Some((area.x + col, area.y + last_row)))
    }

    fn render_keyboard<W: Write>(&self, out: &mut W, area: Rect, keyboard: &Keyboard) -> io::Result<()> {
        if area.is_empty() {
            return Ok(());
        }

        self.set_colors(out, self.scheme.header_fg, self.scheme.keyboard_bg)?;
        for row in 0..area.height {
            execute!(out, MoveTo(area.x, area.y + row))?;
            write!(out, "{}", " ".repeat(area.width as usize))?;
        }

        for (r, c, rect, key) in keyboard.key_rects(area) {
            if rect.is_empty() {
                continue;
            }
            let pressed = keyboard.is_pressed(r, c);
            let colors = self.key_colors(key.is_char(), pressed, keyboard.is_checked(&key));

            // The last column of each key is left as a gap.
            let inner = rect.width.saturating_sub(1).max(1);
            self.set_colors(out, colors.fg, colors.bg)?;
            for row in 0..rect.height {
                execute!(out, MoveTo(rect.x, rect.y + row))?;
                write!(out, "{}", " ".repeat(inner as usize))?;
            }

            let label_w = key.label.width() as u16;
            if label_w <= inner {
                let x = rect.x + (inner - label_w) / 2;
                let y = rect.y + rect.height / 2;
                execute!(out, MoveTo(x, y))?;
                write!(out, "{}", key.label)?;
            }
        }
        Ok(())
    }

    fn key_colors(&self, is_char: bool, pressed: bool, checked: bool) -> KeyColors {
        let s = &self.scheme;
        match (is_char, pressed) {
            (true, true) => s.key_char_pressed,
            (false, true) => s.key_non_char_pressed,
            _ if checked => s.key_checked,
            (true, false) => s.key_char,
            (false, false) => s.key_non_char,
        }
    }

    fn set_colors<W: Write>(&self, out: &mut W, fg: Color, bg: Color) -> io::Result<()> {
        execute!(
            out,
            SetForegroundColor(fg.to_crossterm()),
            SetBackgroundColor(bg.to_crossterm())
        )
    }

    /// Get terminal size
    pub fn size() -> io::Result<(u16, u16)> {
        terminal::size()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}
