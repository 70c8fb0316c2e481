//! On-screen keyboard
//!
//! Static key layouts, layer switching and hit testing, plus the adapter that
//! routes a pressed key either into the session's command queue or out
//! through the kernel virtual keyboard.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::core::session::SessionHandle;
use crate::core::surface::DisplaySurface;
use crate::uinput::{keys, VirtualKeyboard};

/// How long a tapped key stays highlighted
const PRESS_HIGHLIGHT: Duration = Duration::from_millis(120);

/// Normal key width in layout units
const UNIT: u16 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Layer {
    Lower,
    Upper,
    Symbols,
}

impl Layer {
    pub fn name(&self) -> &'static str {
        match self {
            Layer::Lower => "abc",
            Layer::Upper => "ABC",
            Layer::Symbols => "123",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyAction {
    Char(char),
    Backspace,
    Enter,
    /// Toggle between lower and upper case
    Shift,
    Layer(Layer),
    /// Interrupt the foreground job (^C)
    Interrupt,
    Left,
    Right,
    /// Show or hide the keyboard
    Hide,
}

#[derive(Debug, Clone, Copy)]
pub struct Key {
    pub label: &'static str,
    pub action: KeyAction,
    /// Width in layout units
    pub width: u16,
}

impl Key {
    pub fn is_char(&self) -> bool {
        matches!(self.action, KeyAction::Char(c) if c != ' ')
    }
}

const fn ch(label: &'static str, c: char) -> Key {
    Key {
        label,
        action: KeyAction::Char(c),
        width: UNIT,
    }
}

const fn fun(label: &'static str, action: KeyAction, width: u16) -> Key {
    Key {
        label,
        action,
        width,
    }
}

type Rows = &'static [&'static [Key]];

const BOTTOM: &[Key] = &[
    fun("123", KeyAction::Layer(Layer::Symbols), 3),
    fun("^C", KeyAction::Interrupt, 3),
    fun("space", KeyAction::Char(' '), 8),
    ch(".", '.'),
    fun("⏎", KeyAction::Enter, 3),
    fun("▼", KeyAction::Hide, 2),
];

const BOTTOM_SYMBOLS: &[Key] = &[
    fun("abc", KeyAction::Layer(Layer::Lower), 3),
    fun("^C", KeyAction::Interrupt, 3),
    fun("space", KeyAction::Char(' '), 8),
    ch(".", '.'),
    fun("⏎", KeyAction::Enter, 3),
    fun("▼", KeyAction::Hide, 2),
];

static LOWER: Rows = &[
    &[
        ch("q", 'q'), ch("w", 'w'), ch("e", 'e'), ch("r", 'r'), ch("t", 't'),
        ch("y", 'y'), ch("u", 'u'), ch("i", 'i'), ch("o", 'o'), ch("p", 'p'),
    ],
    &[
        ch("a", 'a'), ch("s", 's'), ch("d", 'd'), ch("f", 'f'), ch("g", 'g'),
        ch("h", 'h'), ch("j", 'j'), ch("k", 'k'), ch("l", 'l'), ch("-", '-'),
    ],
    &[
        fun("⇧", KeyAction::Shift, 3),
        ch("z", 'z'), ch("x", 'x'), ch("c", 'c'), ch("v", 'v'),
        ch("b", 'b'), ch("n", 'n'), ch("m", 'm'),
        fun("⌫", KeyAction::Backspace, 3),
    ],
    BOTTOM,
];

static UPPER: Rows = &[
    &[
        ch("Q", 'Q'), ch("W", 'W'), ch("E", 'E'), ch("R", 'R'), ch("T", 'T'),
        ch("Y", 'Y'), ch("U", 'U'), ch("I", 'I'), ch("O", 'O'), ch("P", 'P'),
    ],
    &[
        ch("A", 'A'), ch("S", 'S'), ch("D", 'D'), ch("F", 'F'), ch("G", 'G'),
        ch("H", 'H'), ch("J", 'J'), ch("K", 'K'), ch("L", 'L'), ch("_", '_'),
    ],
    &[
        fun("⇧", KeyAction::Shift, 3),
        ch("Z", 'Z'), ch("X", 'X'), ch("C", 'C'), ch("V", 'V'),
        ch("B", 'B'), ch("N", 'N'), ch("M", 'M'),
        fun("⌫", KeyAction::Backspace, 3),
    ],
    BOTTOM,
];

static SYMBOLS: Rows = &[
    &[
        ch("1", '1'), ch("2", '2'), ch("3", '3'), ch("4", '4'), ch("5", '5'),
        ch("6", '6'), ch("7", '7'), ch("8", '8'), ch("9", '9'), ch("0", '0'),
    ],
    &[
        ch("/", '/'), ch(":", ':'), ch(";", ';'), ch("(", '('), ch(")", ')'),
        ch("$", '$'), ch("&", '&'), ch("@", '@'), ch("\"", '"'), ch("'", '\''),
    ],
    &[
        ch("|", '|'), ch("~", '~'), ch("*", '*'), ch("=", '='), ch("+", '+'),
        ch("<", '<'), ch(">", '>'), ch("#", '#'), ch("%", '%'), ch("!", '!'),
    ],
    &[
        ch("tab", '\t'), ch("[", '['), ch("]", ']'), ch("{", '{'), ch("}", '}'),
        ch("\\", '\\'), ch("`", '`'), ch("?", '?'), ch(",", ','),
        fun("⌫", KeyAction::Backspace, 3),
    ],
    BOTTOM_SYMBOLS,
];

/// The compact layout of the kernel virtual keyboard
static KERNEL: Rows = &[
    &[
        ch("q", 'q'), ch("w", 'w'), ch("e", 'e'), ch("r", 'r'), ch("t", 't'),
        ch("y", 'y'), ch("u", 'u'), ch("i", 'i'), ch("o", 'o'), ch("p", 'p'),
    ],
    &[
        ch("a", 'a'), ch("s", 's'), ch("d", 'd'), ch("f", 'f'), ch("g", 'g'),
        ch("h", 'h'), ch("j", 'j'), ch("k", 'k'), ch("l", 'l'),
    ],
    &[
        fun("⇧", KeyAction::Shift, 3),
        ch("z", 'z'), ch("x", 'x'), ch("c", 'c'), ch("v", 'v'),
        ch("b", 'b'), ch("n", 'n'), ch("m", 'm'),
        fun("⌫", KeyAction::Backspace, 3),
    ],
    &[
        fun("123", KeyAction::Layer(Layer::Symbols), 3),
        fun("←", KeyAction::Left, 2),
        fun("space", KeyAction::Char(' '), 8),
        fun("→", KeyAction::Right, 2),
        ch(".", '.'),
        fun("⏎", KeyAction::Enter, 3),
    ],
];

/// Which set of layouts the keyboard shows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutKind {
    /// Feeds the embedded terminal
    Terminal,
    /// Feeds the kernel virtual keyboard
    Kernel,
}

/// Cell rectangle on the host terminal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl Rect {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self { x, y, width, height }
    }

    pub fn contains(&self, col: u16, row: u16) -> bool {
        col >= self.x && col < self.x + self.width && row >= self.y && row < self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// On-screen keyboard state
#[derive(Debug)]
pub struct Keyboard {
    kind: LayoutKind,
    layer: Layer,
    visible: bool,
    /// Highlight tapped keys
    animations: bool,
    /// Last tapped key and when
    pressed: Option<(usize, usize, Instant)>,
}

impl Keyboard {
    pub fn new(kind: LayoutKind) -> Self {
        Self {
            kind,
            layer: Layer::Lower,
            visible: true,
            animations: true,
            pressed: None,
        }
    }

    pub fn layer(&self) -> Layer {
        self.layer
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn set_visible(&mut self, visible: bool) {
        self.visible = visible;
        self.pressed = None;
    }

    pub fn set_animations(&mut self, enabled: bool) {
        self.animations = enabled;
        self.pressed = None;
    }

    pub fn toggle_visible(&mut self) {
        self.set_visible(!self.visible);
    }

    pub fn rows(&self) -> Rows {
        match (self.kind, self.layer) {
            (LayoutKind::Kernel, Layer::Symbols) => SYMBOLS,
            (LayoutKind::Kernel, _) => KERNEL,
            (LayoutKind::Terminal, Layer::Lower) => LOWER,
            (LayoutKind::Terminal, Layer::Upper) => UPPER,
            (LayoutKind::Terminal, Layer::Symbols) => SYMBOLS,
        }
    }

    /// Apply keyboard-local actions. Returns the action to forward, if any.
    pub fn press(&mut self, action: KeyAction) -> Option<KeyAction> {
        match action {
            KeyAction::Shift => {
                self.layer = match self.layer {
                    Layer::Lower => Layer::Upper,
                    _ => Layer::Lower,
                };
                None
            }
            KeyAction::Layer(layer) => {
                self.layer = layer;
                None
            }
            KeyAction::Hide => {
                self.toggle_visible();
                None
            }
            // The kernel layout has no upper layer; shift applies to one key.
            KeyAction::Char(c) if self.kind == LayoutKind::Kernel && self.layer == Layer::Upper => {
                self.layer = Layer::Lower;
                Some(KeyAction::Char(c.to_ascii_uppercase()))
            }
            other => Some(other),
        }
    }

    /// Whether the key is latched (shift or active layer)
    pub fn is_checked(&self, key: &Key) -> bool {
        match key.action {
            KeyAction::Shift => self.layer == Layer::Upper,
            _ => false,
        }
    }

    pub fn is_pressed(&self, row: usize, col: usize) -> bool {
        matches!(self.pressed, Some((r, c, _)) if r == row && c == col)
    }

    /// Drop an expired press highlight. Returns `true` if one was dropped.
    pub fn release_expired(&mut self) -> bool {
        match self.pressed {
            Some((_, _, at)) if at.elapsed() >= PRESS_HIGHLIGHT => {
                self.pressed = None;
                true
            }
            _ => false,
        }
    }

    /// Key rectangles for the current layer inside `area`.
    pub fn key_rects(&self, area: Rect) -> Vec<(usize, usize, Rect, Key)> {
        let rows = self.rows();
        let mut out = Vec::new();
        if area.is_empty() || rows.is_empty() {
            return out;
        }

        let n = rows.len() as u32;
        for (r, keys) in rows.iter().enumerate() {
            let y0 = area.y as u32 + area.height as u32 * r as u32 / n;
            let y1 = area.y as u32 + area.height as u32 * (r as u32 + 1) / n;
            let total: u32 = keys.iter().map(|k| k.width as u32).sum::<u32>().max(1);

            let mut acc = 0u32;
            for (c, key) in keys.iter().enumerate() {
                let x0 = area.x as u32 + area.width as u32 * acc / total;
                acc += key.width as u32;
                let x1 = area.x as u32 + area.width as u32 * acc / total;
                let rect = Rect::new(x0 as u16, y0 as u16, (x1 - x0) as u16, (y1 - y0) as u16);
                out.push((r, c, rect, *key));
            }
        }
        out
    }

    /// Find the key under a cell and mark it pressed.
    pub fn hit_test(&mut self, area: Rect, col: u16, row: u16) -> Option<KeyAction> {
        if !self.visible {
            return None;
        }
        let (r, c, _, key) = self
            .key_rects(area)
            .into_iter()
            .find(|(_, _, rect, _)| rect.contains(col, row))?;
        if self.animations {
            self.pressed = Some((r, c, Instant::now()));
        }
        Some(key.action)
    }
}

/// Scan code for a character, and the modifier it needs
pub fn scan_code(c: char) -> Option<(u16, Option<u16>)> {
    use keys::*;

    const LETTERS: [u16; 26] = [
        KEY_A, KEY_B, KEY_C, KEY_D, KEY_E, KEY_F, KEY_G, KEY_H, KEY_I, KEY_J, KEY_K, KEY_L, KEY_M,
        KEY_N, KEY_O, KEY_P, KEY_Q, KEY_R, KEY_S, KEY_T, KEY_U, KEY_V, KEY_W, KEY_X, KEY_Y, KEY_Z,
    ];
    const DIGITS: [u16; 10] = [
        KEY_0, KEY_1, KEY_2, KEY_3, KEY_4, KEY_5, KEY_6, KEY_7, KEY_8, KEY_9,
    ];
    let shift = Some(KEY_LEFTSHIFT);

    let code = match c {
        'a'..='z' => (LETTERS[(c as u8 - b'a') as usize], None),
        'A'..='Z' => (LETTERS[(c as u8 - b'A') as usize], shift),
        '0'..='9' => (DIGITS[(c as u8 - b'0') as usize], None),
        ' ' => (KEY_SPACE, None),
        '\t' => (KEY_TAB, None),
        '\n' => (KEY_ENTER, None),
        '.' => (KEY_DOT, None),
        ',' => (KEY_COMMA, None),
        '-' => (KEY_MINUS, None),
        '=' => (KEY_EQUAL, None),
        '/' => (KEY_SLASH, None),
        ';' => (KEY_SEMICOLON, None),
        '\'' => (KEY_APOSTROPHE, None),
        '`' => (KEY_GRAVE, None),
        '[' => (KEY_LEFTBRACE, None),
        ']' => (KEY_RIGHTBRACE, None),
        '\\' => (KEY_BACKSLASH, None),
        '!' => (KEY_1, shift),
        '@' => (KEY_2, shift),
        '#' => (KEY_3, shift),
        '$' => (KEY_4, shift),
        '%' => (KEY_5, shift),
        '^' => (KEY_6, shift),
        '&' => (KEY_7, shift),
        '*' => (KEY_8, shift),
        '(' => (KEY_9, shift),
        ')' => (KEY_0, shift),
        '_' => (KEY_MINUS, shift),
        '+' => (KEY_EQUAL, shift),
        '?' => (KEY_SLASH, shift),
        ':' => (KEY_SEMICOLON, shift),
        '"' => (KEY_APOSTROPHE, shift),
        '~' => (KEY_GRAVE, shift),
        '{' => (KEY_LEFTBRACE, shift),
        '}' => (KEY_RIGHTBRACE, shift),
        '|' => (KEY_BACKSLASH, shift),
        '<' => (KEY_COMMA, shift),
        '>' => (KEY_DOT, shift),
        _ => return None,
    };
    Some(code)
}

/// Every scan code the kernel keyboard can emit
pub fn kernel_key_codes() -> Vec<u16> {
    let mut codes: Vec<u16> = (' '..='~')
        .chain(['\t', '\n'])
        .filter_map(scan_code)
        .map(|(code, _)| code)
        .chain([
            keys::KEY_BACKSPACE,
            keys::KEY_LEFT,
            keys::KEY_RIGHT,
            keys::KEY_UP,
            keys::KEY_DOWN,
            keys::KEY_LEFTSHIFT,
            keys::KEY_LEFTCTRL,
        ])
        .collect();
    codes.sort_unstable();
    codes.dedup();
    codes
}

/// Routes forwarded key actions to their destination
pub enum KeyboardAdapter {
    /// Command queue of a PTY session, echoed locally on the surface
    Terminal(TerminalInput),
    /// System-wide key events
    Kernel(VirtualKeyboard),
}

impl KeyboardAdapter {
    pub fn terminal(handle: SessionHandle) -> Self {
        KeyboardAdapter::Terminal(TerminalInput::new(handle))
    }

    pub fn press<S>(&mut self, action: KeyAction, surface: &mut S)
    where
        S: DisplaySurface + ?Sized,
    {
        match self {
            KeyboardAdapter::Terminal(input) => input.press(action, surface),
            KeyboardAdapter::Kernel(device) => kernel_press(device, action),
        }
    }
}

/// Feeds the session's command queue and mirrors typing on the surface
pub struct TerminalInput {
    handle: SessionHandle,
    /// Locally echoed characters still at the end of the surface
    echoed: usize,
    /// Surface length right after the last local edit
    echo_end: usize,
}

impl TerminalInput {
    pub fn new(handle: SessionHandle) -> Self {
        Self {
            handle,
            echoed: 0,
            echo_end: 0,
        }
    }

    pub fn press<S>(&mut self, action: KeyAction, surface: &mut S)
    where
        S: DisplaySurface + ?Sized,
    {
        // Shell output landed since the last edit, so the tail is not ours.
        if surface.len() != self.echo_end {
            self.echoed = 0;
        }

        match action {
            KeyAction::Char(c) => {
                let (pushed, state) = self.handle.with_command(|cmd| (cmd.push_char(c), cmd.state()));
                if pushed {
                    let mut utf8 = [0u8; 4];
                    surface.append_text(c.encode_utf8(&mut utf8));
                    self.echoed += 1;
                } else {
                    debug!(?state, "command queue rejected {:?}", c);
                }
            }
            KeyAction::Backspace => {
                if self.handle.with_command(|cmd| cmd.backspace()) && self.echoed > 0 {
                    let end = surface.len();
                    surface.set_cursor(end);
                    surface.delete_char();
                    self.echoed -= 1;
                }
            }
            KeyAction::Enter => {
                if self.handle.with_command(|cmd| cmd.enter()) {
                    surface.append_text("\n");
                    self.echoed = 0;
                }
            }
            KeyAction::Interrupt => {
                if self.handle.interrupt_pending() {
                    debug!("interrupt already pending");
                } else {
                    self.handle.request_interrupt();
                    surface.append_text("^C\n");
                    self.echoed = 0;
                }
            }
            // The command line has no cursor movement.
            KeyAction::Left | KeyAction::Right => {}
            KeyAction::Shift | KeyAction::Layer(_) | KeyAction::Hide => {}
        }

        self.echo_end = surface.len();
    }
}

fn kernel_press(device: &mut VirtualKeyboard, action: KeyAction) {
    match action {
        KeyAction::Char(c) => match scan_code(c) {
            Some((code, modifier)) => device.tap(code, modifier),
            None => debug!("no scan code for {:?}", c),
        },
        KeyAction::Backspace => device.tap(keys::KEY_BACKSPACE, None),
        KeyAction::Enter => device.tap(keys::KEY_ENTER, None),
        KeyAction::Left => device.tap(keys::KEY_LEFT, None),
        KeyAction::Right => device.tap(keys::KEY_RIGHT, None),
        KeyAction::Interrupt => device.tap(keys::KEY_C, Some(keys::KEY_LEFTCTRL)),
        KeyAction::Shift | KeyAction::Layer(_) | KeyAction::Hide => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::command::CommandState;
    use crate::core::surface::TextArea;

    #[test]
    fn test_shift_and_layers() {
        let mut kb = Keyboard::new(LayoutKind::Terminal);
        assert_eq!(kb.press(KeyAction::Shift), None);
        assert_eq!(kb.layer(), Layer::Upper);
        assert_eq!(kb.press(KeyAction::Layer(Layer::Symbols)), None);
        assert_eq!(kb.layer(), Layer::Symbols);
        kb.press(KeyAction::Shift);
        assert_eq!(kb.layer(), Layer::Lower);
        assert_eq!(kb.press(KeyAction::Enter), Some(KeyAction::Enter));
    }

    #[test]
    fn test_kernel_shift_is_one_shot() {
        let mut kb = Keyboard::new(LayoutKind::Kernel);
        kb.press(KeyAction::Shift);
        assert_eq!(kb.press(KeyAction::Char('a')), Some(KeyAction::Char('A')));
        assert_eq!(kb.press(KeyAction::Char('a')), Some(KeyAction::Char('a')));
    }

    #[test]
    fn test_hide_toggles_visibility() {
        let mut kb = Keyboard::new(LayoutKind::Terminal);
        kb.press(KeyAction::Hide);
        assert!(!kb.is_visible());
        assert_eq!(kb.hit_test(Rect::new(0, 0, 40, 8), 1, 1), None);
        kb.toggle_visible();
        assert!(kb.is_visible());
    }

    #[test]
    fn test_key_rects_fill_area() {
        let kb = Keyboard::new(LayoutKind::Terminal);
        let area = Rect::new(0, 10, 40, 8);
        let rects = kb.key_rects(area);

        for (row, keys) in kb.rows().iter().enumerate() {
            let in_row: Vec<_> = rects.iter().filter(|(r, ..)| *r == row).collect();
            assert_eq!(in_row.len(), keys.len());
            let width: u16 = in_row.iter().map(|(_, _, rect, _)| rect.width).sum();
            assert_eq!(width, area.width);
        }
    }

    #[test]
    fn test_hit_test_finds_key() {
        let mut kb = Keyboard::new(LayoutKind::Terminal);
        let area = Rect::new(0, 0, 40, 8);
        // Top-left key of the lower layer.
        assert_eq!(kb.hit_test(area, 0, 0), Some(KeyAction::Char('q')));
        assert!(kb.is_pressed(0, 0));
        assert_eq!(kb.hit_test(area, 39, 0), Some(KeyAction::Char('p')));
        assert_eq!(kb.hit_test(area, 50, 0), None);
    }

    #[test]
    fn test_no_highlight_without_animations() {
        let mut kb = Keyboard::new(LayoutKind::Terminal);
        kb.set_animations(false);
        let area = Rect::new(0, 0, 40, 8);
        assert_eq!(kb.hit_test(area, 0, 0), Some(KeyAction::Char('q')));
        assert!(!kb.is_pressed(0, 0));
    }

    #[test]
    fn test_terminal_keys_feed_command_queue() {
        let handle = SessionHandle::new();
        let mut adapter = KeyboardAdapter::terminal(handle.clone());
        let mut surface = TextArea::new(100);
        surface.append_text("$ ");

        for c in "lsx".chars() {
            adapter.press(KeyAction::Char(c), &mut surface);
        }
        adapter.press(KeyAction::Backspace, &mut surface);
        assert_eq!(surface.text(), "$ ls");
        assert_eq!(handle.lock().command.as_bytes(), b"ls");

        adapter.press(KeyAction::Enter, &mut surface);
        assert_eq!(surface.text(), "$ ls\n");
        let shared = handle.lock();
        assert_eq!(shared.command.state(), CommandState::ReadyToSend);
        assert_eq!(shared.command.as_bytes(), b"ls\n");
    }

    #[test]
    fn test_backspace_on_empty_queue_keeps_output() {
        let handle = SessionHandle::new();
        let mut adapter = KeyboardAdapter::terminal(handle);
        let mut surface = TextArea::new(100);
        surface.append_text("$ ");
        adapter.press(KeyAction::Backspace, &mut surface);
        assert_eq!(surface.text(), "$ ");
    }

    #[test]
    fn test_backspace_leaves_shell_output_alone() {
        let handle = SessionHandle::new();
        let mut adapter = KeyboardAdapter::terminal(handle.clone());
        let mut surface = TextArea::new(100);
        surface.append_text("$ ");

        adapter.press(KeyAction::Char('a'), &mut surface);
        adapter.press(KeyAction::Char('b'), &mut surface);
        // Output from the shell arrives between keystrokes.
        surface.append_text("[job done]");
        adapter.press(KeyAction::Char('c'), &mut surface);

        adapter.press(KeyAction::Backspace, &mut surface);
        assert_eq!(surface.text(), "$ ab[job done]");
        adapter.press(KeyAction::Backspace, &mut surface);
        assert_eq!(surface.text(), "$ ab[job done]");
        assert_eq!(handle.lock().command.as_bytes(), b"a");
    }

    #[test]
    fn test_repeated_interrupt_echoes_once() {
        let handle = SessionHandle::new();
        let mut adapter = KeyboardAdapter::terminal(handle.clone());
        let mut surface = TextArea::new(100);
        adapter.press(KeyAction::Interrupt, &mut surface);
        adapter.press(KeyAction::Interrupt, &mut surface);
        assert_eq!(surface.text(), "^C\n");
    }

    #[test]
    fn test_interrupt_sets_flag() {
        let handle = SessionHandle::new();
        let mut adapter = KeyboardAdapter::terminal(handle.clone());
        let mut surface = TextArea::new(100);
        adapter.press(KeyAction::Interrupt, &mut surface);
        assert!(handle.interrupt_pending());
        assert_eq!(surface.text(), "^C\n");
    }

    #[test]
    fn test_scan_codes() {
        assert_eq!(scan_code('q'), Some((keys::KEY_Q, None)));
        assert_eq!(scan_code('Q'), Some((keys::KEY_Q, Some(keys::KEY_LEFTSHIFT))));
        assert_eq!(scan_code('.'), Some((keys::KEY_DOT, None)));
        assert_eq!(scan_code('é'), None);
    }

    #[test]
    fn test_every_kernel_key_has_a_code() {
        for layer in [Layer::Lower, Layer::Symbols] {
            let mut kb = Keyboard::new(LayoutKind::Kernel);
            kb.press(KeyAction::Layer(layer));
            for key in kb.rows().iter().flat_map(|r| r.iter()) {
                if let KeyAction::Char(c) = key.action {
                    assert!(scan_code(c).is_some(), "no code for {:?}", c);
                }
            }
        }
        let codes = kernel_key_codes();
        assert!(codes.contains(&keys::KEY_BACKSPACE));
        assert!(codes.windows(2).all(|w| w[0] < w[1]));
    }
}
