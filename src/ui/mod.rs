//! User interface rendering and input handling.
//!
//! - **keyboard**: On-screen keyboard layouts and the key press adapter
//! - **keymapper**: Physical key events to keyboard actions
//! - **renderer**: Header, text area and keyboard drawn with crossterm

pub mod keyboard;
pub mod keymapper;
pub mod renderer;

pub use keyboard::{Keyboard, KeyboardAdapter, LayoutKind};
pub use keymapper::{KeyMapper, Mapped};
pub use renderer::{Renderer, ScreenLayout};
