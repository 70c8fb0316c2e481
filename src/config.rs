//! Configuration and color scheme management for padterm.
//!
//! This module provides:
//! - TOML configuration loading from `~/.padterm/config.toml`
//! - Extra `-c FILE` configs merged on top, section by section
//! - Built-in color schemes (breezy-light, breezy-dark, default)
//!
//! # Configuration File
//!
//! ```toml
//! # Shell to run instead of $SHELL (optional)
//! shell = "/bin/bash"
//!
//! # Color scheme: breezy-light, breezy-dark, default
//! theme = "breezy-dark"
//!
//! [terminal]
//! glyph_width = 10
//! glyph_height = 20
//! max_text_len = 9314
//! overflow = "evict"      # or "split"
//!
//! [pty]
//! signal_strategy = "process-group"   # or "pgrep"
//!
//! [keyboard]
//! hidden = false
//!
//! [general]
//! timeout_secs = 0
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::bridge::{BridgeOptions, OverflowPolicy};
use crate::core::pty::{ShellCommand, SignalStrategy, TermGeometry};
use crate::core::sanitize::{CaretAt, SanitizeOptions};
use crate::core::session::SessionOptions;
use crate::core::surface::MAX_TEXTAREA_LENGTH;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Main configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Shell to run instead of `$SHELL`
    pub shell: Option<String>,
    /// Color scheme name
    pub theme: String,
    pub terminal: TerminalConfig,
    pub pty: PtyConfig,
    pub keyboard: KeyboardConfig,
    pub general: GeneralConfig,
    pub uinput: UinputConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            shell: None,
            theme: "breezy-light".to_string(),
            terminal: TerminalConfig::default(),
            pty: PtyConfig::default(),
            keyboard: KeyboardConfig::default(),
            general: GeneralConfig::default(),
            uinput: UinputConfig::default(),
        }
    }
}

/// Text area configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalConfig {
    /// Pixel width of one glyph, for the pixel to cell conversion
    pub glyph_width: u32,
    pub glyph_height: u32,
    pub max_text_len: usize,
    pub overflow: OverflowPolicy,
    pub chunk_size: usize,
    pub dedupe: bool,
}

impl Default for TerminalConfig {
    fn default() -> Self {
        Self {
            glyph_width: 10,
            glyph_height: 20,
            max_text_len: MAX_TEXTAREA_LENGTH,
            overflow: OverflowPolicy::Evict,
            chunk_size: 4096,
            dedupe: true,
        }
    }
}

/// PTY I/O loop configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PtyConfig {
    pub poll_timeout_ms: u64,
    pub idle_sleep_us: u64,
    pub signal_strategy: SignalStrategy,
    /// Unset means: disable echo only for a custom shell
    pub disable_echo: Option<bool>,
    pub cr_terminates_escape: bool,
    pub caret_at: CaretAt,
}

impl Default for PtyConfig {
    fn default() -> Self {
        Self {
            poll_timeout_ms: 10,
            idle_sleep_us: 100,
            signal_strategy: SignalStrategy::ProcessGroup,
            disable_echo: None,
            cr_terminates_escape: true,
            caret_at: CaretAt::Newlines,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyboardConfig {
    /// Start with the keyboard hidden
    pub hidden: bool,
    /// Highlight keys while tapped
    pub animations: bool,
}

impl Default for KeyboardConfig {
    fn default() -> Self {
        Self {
            hidden: false,
            animations: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// UI refresh cadence
    pub tick_ms: u64,
    /// Shut down after this long without input (0 = never)
    pub timeout_secs: u64,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            tick_ms: 50,
            timeout_secs: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UinputConfig {
    pub device: PathBuf,
    pub name: String,
}

impl Default for UinputConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from("/dev/uinput"),
            name: "fbkeyboard".to_string(),
        }
    }
}

impl Config {
    /// Load the user config, then merge `extra` files over it in order.
    pub fn load_with(extra: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut paths = Vec::new();
        if let Some(path) = Self::get_config_path() {
            if path.exists() {
                paths.push(path);
            }
        }
        paths.extend(extra.iter().cloned());
        Self::load_files(&paths)
    }

    /// Merge the given files in order; later keys win.
    pub fn load_files(paths: &[PathBuf]) -> Result<Self, ConfigError> {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        for path in paths {
            merge_values(&mut merged, read_value(path)?);
        }
        let path = paths.last().cloned().unwrap_or_default();
        merged
            .try_into()
            .map_err(|source| ConfigError::Parse { path, source })
    }

    fn get_config_path() -> Option<PathBuf> {
        app_dir().map(|dir| dir.join("config.toml"))
    }

    pub fn get_color_scheme(&self) -> ColorScheme {
        ColorScheme::by_name(&self.theme)
    }

    pub fn sanitize_options(&self) -> SanitizeOptions {
        SanitizeOptions {
            cr_terminates: self.pty.cr_terminates_escape,
            caret_at: self.pty.caret_at,
        }
    }

    pub fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            max_len: self.terminal.max_text_len,
            overflow: self.terminal.overflow,
            chunk_size: self.terminal.chunk_size,
            dedupe: self.terminal.dedupe,
        }
    }

    /// Terminal geometry for a text area of the given pixel size.
    pub fn geometry(&self, width: u32, height: u32) -> TermGeometry {
        TermGeometry::from_pixels(
            width,
            height,
            self.terminal.glyph_width,
            self.terminal.glyph_height,
        )
    }

    pub fn session_options(&self, shell: ShellCommand, geometry: TermGeometry) -> SessionOptions {
        let mut options = SessionOptions::new(shell, geometry);
        if let Some(disable) = self.pty.disable_echo {
            options.disable_echo = disable;
        }
        options.poll_timeout = Duration::from_millis(self.pty.poll_timeout_ms);
        options.idle_sleep = Duration::from_micros(self.pty.idle_sleep_us);
        options.signal_strategy = self.pty.signal_strategy;
        options.sanitize = self.sanitize_options();
        options
    }
}

fn read_value(path: &Path) -> Result<toml::Value, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Deep-merge `overlay` into `base`: tables merge key by key, anything else
/// is replaced.
fn merge_values(base: &mut toml::Value, overlay: toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base), toml::Value::Table(overlay)) => {
            for (key, value) in overlay {
                match base.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, overlay) => *base = overlay,
    }
}

/// Color definition (RGB)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// From a `0xRRGGBB` value
    pub const fn hex(rgb: u32) -> Self {
        Self {
            r: (rgb >> 16) as u8,
            g: (rgb >> 8) as u8,
            b: rgb as u8,
        }
    }

    /// Convert to crossterm Color
    pub fn to_crossterm(&self) -> crossterm::style::Color {
        crossterm::style::Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

/// Colors for one key state
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct KeyColors {
    pub fg: Color,
    pub bg: Color,
    pub border: Color,
}

impl KeyColors {
    const fn new(fg: u32, bg: u32, border: u32) -> Self {
        Self {
            fg: Color::hex(fg),
            bg: Color::hex(bg),
            border: Color::hex(border),
        }
    }
}

/// Color scheme definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColorScheme {
    pub name: String,

    pub window_bg: Color,

    // Header bar
    pub header_bg: Color,
    pub header_fg: Color,
    pub header_border: Color,

    // Text area
    pub text_bg: Color,
    pub text_fg: Color,
    pub text_border: Color,
    pub placeholder_fg: Color,

    // Keyboard
    pub keyboard_bg: Color,
    pub key_char: KeyColors,
    pub key_char_pressed: KeyColors,
    pub key_non_char: KeyColors,
    pub key_non_char_pressed: KeyColors,
    /// Latched modifier or active layer key
    pub key_checked: KeyColors,
}

impl Default for ColorScheme {
    fn default() -> Self {
        Self::breezy_light()
    }
}

impl ColorScheme {
    /// KDE Breeze light
    pub fn breezy_light() -> Self {
        Self {
            name: "breezy-light".to_string(),

            window_bg: Color::hex(0xeff0f1),

            header_bg: Color::hex(0xfcfcfc),
            header_fg: Color::hex(0x232629),
            header_border: Color::hex(0xbdc3c7),

            text_bg: Color::hex(0xfcfcfc),
            text_fg: Color::hex(0x232629),
            text_border: Color::hex(0xbdc3c7),
            placeholder_fg: Color::hex(0x7f8c8d),

            keyboard_bg: Color::hex(0xfcfcfc),
            key_char: KeyColors::new(0x232629, 0xeff0f1, 0xbdc3c7),
            key_char_pressed: KeyColors::new(0x232629, 0x3daee9, 0x2980b9),
            key_non_char: KeyColors::new(0x232629, 0xbdc3c7, 0x7f8c8d),
            key_non_char_pressed: KeyColors::new(0x232629, 0x3daee9, 0x2980b9),
            key_checked: KeyColors::new(0x232629, 0x3daee9, 0x2980b9),
        }
    }

    /// KDE Breeze dark
    pub fn breezy_dark() -> Self {
        Self {
            name: "breezy-dark".to_string(),

            window_bg: Color::hex(0x31363b),

            header_bg: Color::hex(0x232629),
            header_fg: Color::hex(0xeff0f1),
            header_border: Color::hex(0x7f8c8d),

            text_bg: Color::hex(0x232629),
            text_fg: Color::hex(0xeff0f1),
            text_border: Color::hex(0x7f8c8d),
            placeholder_fg: Color::hex(0x7f8c8d),

            keyboard_bg: Color::hex(0x232629),
            key_char: KeyColors::new(0xeff0f1, 0x31363b, 0xbdc3c7),
            key_char_pressed: KeyColors::new(0xeff0f1, 0x3daee9, 0x2980b9),
            key_non_char: KeyColors::new(0xeff0f1, 0x232629, 0x7f8c8d),
            key_non_char_pressed: KeyColors::new(0xeff0f1, 0x3daee9, 0x2980b9),
            key_checked: KeyColors::new(0xeff0f1, 0x3daee9, 0x2980b9),
        }
    }

    /// Plain dark terminal colors
    pub fn default_scheme() -> Self {
        Self {
            name: "default".to_string(),

            window_bg: Color::new(0, 0, 0),

            header_bg: Color::new(40, 40, 40),
            header_fg: Color::new(180, 180, 180),
            header_border: Color::new(80, 80, 80),

            text_bg: Color::new(0, 0, 0),
            text_fg: Color::new(220, 220, 220),
            text_border: Color::new(80, 80, 80),
            placeholder_fg: Color::new(150, 150, 150),

            keyboard_bg: Color::new(30, 30, 30),
            key_char: KeyColors::new(0xdcdcdc, 0x3c3c3c, 0x505050),
            key_char_pressed: KeyColors::new(0xffffff, 0x3c3cb4, 0x6496ff),
            key_non_char: KeyColors::new(0xb4b4b4, 0x282828, 0x505050),
            key_non_char_pressed: KeyColors::new(0xffffff, 0x3c3cb4, 0x6496ff),
            key_checked: KeyColors::new(0x000000, 0xc8c800, 0x6496ff),
        }
    }

    /// Get scheme by name
    pub fn by_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "breezy-light" | "breezy_light" | "light" => Self::breezy_light(),
            "breezy-dark" | "breezy_dark" | "dark" => Self::breezy_dark(),
            "default" => Self::default_scheme(),
            other => {
                tracing::warn!("Unknown theme '{}', using breezy-light", other);
                Self::breezy_light()
            }
        }
    }

    /// List available schemes
    pub fn list() -> Vec<&'static str> {
        vec!["breezy-light", "breezy-dark", "default"]
    }
}

/// `~/.padterm`, created on first use
pub fn app_dir() -> Option<PathBuf> {
    let dir = home_dir()?.join(".padterm");
    if !dir.exists() {
        let _ = fs::create_dir_all(&dir);
    }
    Some(dir)
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}
