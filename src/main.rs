//! padterm - an on-screen keyboard terminal for touch devices
//!
//! padterm runs a login shell under a pseudo-terminal and shows its output
//! above an on-screen keyboard. Keys tapped on the keyboard are collected
//! into a command line and sent to the shell on Enter.
//!
//! # Features
//!
//! - **Shell session**: Login shell on a PTY with a dedicated I/O thread
//! - **Plain text output**: Escape sequences are stripped, local echo removed
//! - **Bounded scrollback**: Oldest text is dropped once the cap is reached
//! - **On-screen keyboard**: Lower, upper and symbol layers, ^C key
//! - **Kernel keyboard**: `--uinput` sends taps system-wide instead
//! - **Color Schemes**: breezy-light, breezy-dark, default
//!
//! # Quick Start
//!
//! ```text
//! padterm              # Start with $SHELL
//! padterm -s /bin/ash  # Start a specific shell
//! padterm -k           # Virtual keyboard for the whole system
//! ```

mod config;
mod core;
mod shutdown;
mod uinput;
mod ui;

use std::env;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use crossterm::event::{self, Event, KeyEventKind, MouseButton, MouseEventKind};
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::{ColorScheme, Config};
use crate::core::bridge::RenderBridge;
use crate::core::pty::ShellCommand;
use crate::core::session::{PtySession, SessionEvent};
use crate::core::surface::{DisplaySurface, TextArea};
use crate::shutdown::ShutdownToken;
use crate::ui::{KeyMapper, Keyboard, KeyboardAdapter, LayoutKind, Mapped, Renderer, ScreenLayout};
use crate::uinput::VirtualKeyboard;

/// Shown in the text area when the shell could not be started
const PLACEHOLDER: &str = "Could not prepare the terminal!";

const TITLE: &str = "padterm";

/// Command line options
#[derive(Debug, Default)]
struct Args {
    verbose: bool,
    config_files: Vec<PathBuf>,
    shell: Option<String>,
    /// Pixel size of the terminal area
    geometry: Option<(u32, u32)>,
    theme: Option<String>,
    uinput: bool,
}

/// Version string from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_version() {
    eprintln!("padterm {}", VERSION);
}

fn print_help() {
    eprintln!("padterm {} - On-screen keyboard terminal", VERSION);
    eprintln!();
    eprintln!("Usage: padterm [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  -c, --config <FILE>   Extra config file, merged over ~/.padterm/config.toml");
    eprintln!("                        (may be given more than once)");
    eprintln!("  -s, --shell <CMD>     Shell to run instead of $SHELL");
    eprintln!("  -g, --geometry <WxH>  Terminal area size in pixels");
    eprintln!("  -t, --theme <NAME>    Color scheme");
    eprintln!("  -k, --uinput          Send keys to a kernel virtual keyboard");
    eprintln!("  -V, --verbose         Debug logging");
    eprintln!("  -v, --version         Show version");
    eprintln!("  -h, --help            Show this help");
    eprintln!();
    eprintln!("Keys:");
    eprintln!("  Ctrl+C                Interrupt the running command");
    eprintln!("  Ctrl+K, F1            Show/hide the on-screen keyboard");
    eprintln!("  Ctrl+Q                Quit");
    eprintln!();
    eprintln!("Configuration: ~/.padterm/config.toml");
    eprintln!("Log file:      ~/.padterm/padterm.log");
    eprintln!();
    eprintln!("Color schemes: {}", ColorScheme::list().join(", "));
    eprintln!();
    eprintln!("Exit: Type 'exit' in the shell");
}

fn parse_geometry(value: &str) -> Result<(u32, u32), String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("Invalid geometry '{}', expected WxH", value))?;
    let w = w.trim().parse().map_err(|_| format!("Invalid width in '{}'", value))?;
    let h = h.trim().parse().map_err(|_| format!("Invalid height in '{}'", value))?;
    Ok((w, h))
}

fn parse_args() -> Result<Args, String> {
    let args: Vec<String> = env::args().collect();
    parse_arg_list(&args[1..])
}

fn parse_arg_list(args: &[String]) -> Result<Args, String> {
    let mut parsed = Args::default();
    let mut i = 0;

    let value = |i: usize, name: &str| -> Result<String, String> {
        args.get(i)
            .cloned()
            .ok_or_else(|| format!("Missing {} argument", name))
    };

    while i < args.len() {
        match args[i].as_str() {
            "-h" | "--help" => {
                print_help();
                std::process::exit(0);
            }
            "-v" | "--version" => {
                print_version();
                std::process::exit(0);
            }
            "-V" | "--verbose" => {
                parsed.verbose = true;
            }
            "-c" | "--config" => {
                i += 1;
                parsed.config_files.push(PathBuf::from(value(i, "config")?));
            }
            "-s" | "--shell" => {
                i += 1;
                parsed.shell = Some(value(i, "shell")?);
            }
            "-g" | "--geometry" => {
                i += 1;
                parsed.geometry = Some(parse_geometry(&value(i, "geometry")?)?);
            }
            "-t" | "--theme" => {
                i += 1;
                parsed.theme = Some(value(i, "theme")?);
            }
            "-k" | "--uinput" => {
                parsed.uinput = true;
            }
            arg => {
                return Err(format!("Unknown argument: {}. Use -h for help.", arg));
            }
        }
        i += 1;
    }

    Ok(parsed)
}

/// Log to `~/.padterm/padterm.log`; `RUST_LOG` overrides the level.
fn init_logging(verbose: bool) {
    let log_path = config::app_dir()
        .map(|dir| dir.join("padterm.log"))
        .unwrap_or_else(|| PathBuf::from("padterm.log"));

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .ok();

    if let Some(file) = log_file {
        let level = if verbose { "debug" } else { "info" };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_writer(std::sync::Mutex::new(file))
            .with_ansi(false)
            .finish();
        let _ = tracing::subscriber::set_global_default(subscriber);
    }
}

fn main() -> anyhow::Result<()> {
    let args = match parse_args() {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Error: {}", e);
            eprintln!("Use --help for usage information");
            std::process::exit(1);
        }
    };

    init_logging(args.verbose);
    info!("padterm {} starting...", VERSION);

    let mut config = Config::load_with(&args.config_files).context("Failed to load configuration")?;
    if let Some(theme) = &args.theme {
        config.theme = theme.clone();
    }

    let shutdown = ShutdownToken::with_signals().context("Failed to install signal handlers")?;

    let result = if args.uinput {
        run_uinput(&config, shutdown)
    } else {
        run_terminal(&args, &config, shutdown)
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    info!("padterm exiting");
    result
}

/// Run the embedded terminal
fn run_terminal(args: &Args, config: &Config, shutdown: ShutdownToken) -> anyhow::Result<()> {
    let mut keyboard = Keyboard::new(LayoutKind::Terminal);
    keyboard.set_visible(!config.keyboard.hidden);
    keyboard.set_animations(config.keyboard.animations);

    let (cols, rows) = Renderer::size()?;
    let layout = ScreenLayout::compute(cols, rows, &keyboard);
    info!("Terminal size: {}x{}", cols, rows);

    let (px_w, px_h) = args.geometry.unwrap_or((
        layout.text.width as u32 * config.terminal.glyph_width,
        layout.text.height as u32 * config.terminal.glyph_height,
    ));
    let geometry = config.geometry(px_w, px_h);

    let shell = ShellCommand::resolve(args.shell.as_deref().or(config.shell.as_deref()));
    info!("Shell: {} ({}x{})", shell.program.display(), geometry.cols, geometry.rows);

    let mut renderer = Renderer::new(config.get_color_scheme());
    let session = match PtySession::start(config.session_options(shell, geometry)) {
        Ok(session) => {
            info!(pid = %session.pid(), "Session started");
            Some(session)
        }
        Err(e) => {
            warn!("Could not start shell: {}", e);
            renderer.set_placeholder(PLACEHOLDER);
            None
        }
    };
    renderer.init()?;

    let mut ui = Ui {
        keyboard,
        surface: TextArea::new(config.terminal.max_text_len),
        renderer,
        bridge: RenderBridge::new(config.bridge_options()),
        adapter: session.as_ref().map(|s| KeyboardAdapter::terminal(s.handle())),
        status: String::new(),
    };
    let result = ui.run(session.as_ref(), config, &shutdown);

    // Session first, so the shell is gone before the screen is restored.
    drop(session);
    let _ = ui.renderer.cleanup();
    result
}

/// Run as a system-wide virtual keyboard
fn run_uinput(config: &Config, shutdown: ShutdownToken) -> anyhow::Result<()> {
    let device = VirtualKeyboard::create(
        &config.uinput.device,
        &config.uinput.name,
        &ui::keyboard::kernel_key_codes(),
    )
    .context("Failed to set up the virtual keyboard")?;

    let mut surface = TextArea::new(config.terminal.max_text_len);
    surface.append_text(&format!("Keys go to {}", config.uinput.device.display()));

    let mut renderer = Renderer::new(config.get_color_scheme());
    renderer.init()?;

    let mut keyboard = Keyboard::new(LayoutKind::Kernel);
    keyboard.set_visible(!config.keyboard.hidden);
    keyboard.set_animations(config.keyboard.animations);

    let mut ui = Ui {
        keyboard,
        surface,
        renderer,
        bridge: RenderBridge::new(config.bridge_options()),
        adapter: Some(KeyboardAdapter::Kernel(device)),
        status: String::new(),
    };
    let result = ui.run(None, config, &shutdown);
    let _ = ui.renderer.cleanup();
    result
}

/// Everything the UI thread owns
struct Ui {
    keyboard: Keyboard,
    surface: TextArea,
    renderer: Renderer,
    bridge: RenderBridge,
    adapter: Option<KeyboardAdapter>,
    status: String,
}

impl Ui {
    fn run(&mut self, session: Option<&PtySession>, config: &Config, shutdown: &ShutdownToken) -> anyhow::Result<()> {
        let tick = Duration::from_millis(config.general.tick_ms.max(1));
        let idle_limit = (config.general.timeout_secs > 0)
            .then(|| Duration::from_secs(config.general.timeout_secs));
        let mut last_input = Instant::now();
        let (mut cols, mut rows) = Renderer::size()?;
        let mut dirty = true;

        loop {
            if shutdown.is_requested() {
                info!("Shutdown requested");
                break;
            }
            if let Some(limit) = idle_limit {
                if last_input.elapsed() >= limit {
                    info!("No input for {:?}, shutting down", limit);
                    break;
                }
            }

            if let Some(session) = session {
                let exited = self.drain_session(session);
                if self.bridge.flush(&session.handle(), &mut self.surface) {
                    dirty = true;
                }
                if exited {
                    break;
                }
            }

            if self.keyboard.release_expired() {
                dirty = true;
            }

            let layout = ScreenLayout::compute(cols, rows, &self.keyboard);
            if dirty {
                self.status = self.keyboard.layer().name().to_string();
                self.renderer
                    .render(&layout, TITLE, &self.status, &self.surface, &self.keyboard)?;
                dirty = false;
            }

            if !event::poll(tick)? {
                continue;
            }
            match event::read()? {
                Event::Key(key_event) => {
                    if key_event.kind != KeyEventKind::Press {
                        continue;
                    }
                    last_input = Instant::now();
                    match KeyMapper::map(&key_event) {
                        Some(Mapped::Quit) => {
                            info!("Quit key pressed");
                            shutdown.request();
                        }
                        Some(Mapped::Action(action)) => {
                            self.dispatch(action);
                            dirty = true;
                        }
                        None => {}
                    }
                }
                Event::Mouse(mouse) => {
                    if let MouseEventKind::Down(MouseButton::Left) = mouse.kind {
                        last_input = Instant::now();
                        if let Some(action) = self.keyboard.hit_test(layout.keyboard, mouse.column, mouse.row) {
                            self.dispatch(action);
                            dirty = true;
                        }
                    }
                }
                Event::Resize(c, r) => {
                    cols = c;
                    rows = r;
                    dirty = true;
                }
                _ => {}
            }
        }

        Ok(())
    }

    /// Handle pending session events. Returns `true` once the shell is gone.
    fn drain_session(&mut self, session: &PtySession) -> bool {
        while let Some(event) = session.try_event() {
            match event {
                SessionEvent::Output => {}
                SessionEvent::Exited(code) => {
                    info!(?code, "Shell exited");
                    return true;
                }
                SessionEvent::Error(msg) => {
                    error!("Session failed: {}", msg);
                    self.surface.append_text(&format!("\n[{}]\n", msg));
                }
            }
        }
        !session.is_running()
    }

    fn dispatch(&mut self, action: ui::keyboard::KeyAction) {
        let Some(action) = self.keyboard.press(action) else {
            return;
        };
        if let Some(adapter) = self.adapter.as_mut() {
            adapter.press(action, &mut self.surface);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_args() {
        let parsed = parse_arg_list(&args(&[
            "-c", "a.toml", "--config", "b.toml", "-s", "/bin/ash", "-g", "480x800", "-t",
            "breezy-dark", "-V",
        ]))
        .unwrap();
        assert_eq!(
            parsed.config_files,
            vec![PathBuf::from("a.toml"), PathBuf::from("b.toml")]
        );
        assert_eq!(parsed.shell.as_deref(), Some("/bin/ash"));
        assert_eq!(parsed.geometry, Some((480, 800)));
        assert_eq!(parsed.theme.as_deref(), Some("breezy-dark"));
        assert!(parsed.verbose);
        assert!(!parsed.uinput);
    }

    #[test]
    fn test_parse_args_errors() {
        assert!(parse_arg_list(&args(&["--bogus"])).is_err());
        assert!(parse_arg_list(&args(&["-s"])).is_err());
        assert!(parse_arg_list(&args(&["-g", "800"])).is_err());
    }

    #[test]
    fn test_parse_geometry() {
        assert_eq!(parse_geometry("720x1440"), Ok((720, 1440)));
        assert_eq!(parse_geometry("10X20"), Ok((10, 20)));
        assert!(parse_geometry("axb").is_err());
    }
}
