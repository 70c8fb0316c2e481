//! Kernel virtual keyboard
//!
//! Registers a uinput device and turns on-screen key presses into
//! system-wide key events instead of feeding a PTY.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::mem;
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};
use std::slice;

use nix::errno::Errno;
use thiserror::Error;
use tracing::{debug, info, warn};

const EV_SYN: u16 = 0x00;
const EV_KEY: u16 = 0x01;
const SYN_REPORT: u16 = 0;
const BUS_USB: u16 = 0x03;

const UINPUT_MAX_NAME_SIZE: usize = 80;
const ABS_CNT: usize = 0x40;

/// Linux input scan codes used by the on-screen layouts
pub mod keys {
    pub const KEY_1: u16 = 2;
    pub const KEY_2: u16 = 3;
    pub const KEY_3: u16 = 4;
    pub const KEY_4: u16 = 5;
    pub const KEY_5: u16 = 6;
    pub const KEY_6: u16 = 7;
    pub const KEY_7: u16 = 8;
    pub const KEY_8: u16 = 9;
    pub const KEY_9: u16 = 10;
    pub const KEY_0: u16 = 11;
    pub const KEY_MINUS: u16 = 12;
    pub const KEY_EQUAL: u16 = 13;
    pub const KEY_BACKSPACE: u16 = 14;
    pub const KEY_TAB: u16 = 15;
    pub const KEY_Q: u16 = 16;
    pub const KEY_W: u16 = 17;
    pub const KEY_E: u16 = 18;
    pub const KEY_R: u16 = 19;
    pub const KEY_T: u16 = 20;
    pub const KEY_Y: u16 = 21;
    pub const KEY_U: u16 = 22;
    pub const KEY_I: u16 = 23;
    pub const KEY_O: u16 = 24;
    pub const KEY_P: u16 = 25;
    pub const KEY_LEFTBRACE: u16 = 26;
    pub const KEY_RIGHTBRACE: u16 = 27;
    pub const KEY_ENTER: u16 = 28;
    pub const KEY_LEFTCTRL: u16 = 29;
    pub const KEY_A: u16 = 30;
    pub const KEY_S: u16 = 31;
    pub const KEY_D: u16 = 32;
    pub const KEY_F: u16 = 33;
    pub const KEY_G: u16 = 34;
    pub const KEY_H: u16 = 35;
    pub const KEY_J: u16 = 36;
    pub const KEY_K: u16 = 37;
    pub const KEY_L: u16 = 38;
    pub const KEY_SEMICOLON: u16 = 39;
    pub const KEY_APOSTROPHE: u16 = 40;
    pub const KEY_GRAVE: u16 = 41;
    pub const KEY_LEFTSHIFT: u16 = 42;
    pub const KEY_BACKSLASH: u16 = 43;
    pub const KEY_Z: u16 = 44;
    pub const KEY_X: u16 = 45;
    pub const KEY_C: u16 = 46;
    pub const KEY_V: u16 = 47;
    pub const KEY_B: u16 = 48;
    pub const KEY_N: u16 = 49;
    pub const KEY_M: u16 = 50;
    pub const KEY_COMMA: u16 = 51;
    pub const KEY_DOT: u16 = 52;
    pub const KEY_SLASH: u16 = 53;
    pub const KEY_SPACE: u16 = 57;
    pub const KEY_UP: u16 = 103;
    pub const KEY_LEFT: u16 = 105;
    pub const KEY_RIGHT: u16 = 106;
    pub const KEY_DOWN: u16 = 108;
}

nix::ioctl_write_int!(ui_set_evbit, b'U', 100);
nix::ioctl_write_int!(ui_set_keybit, b'U', 101);
nix::ioctl_none!(ui_dev_create, b'U', 1);
nix::ioctl_none!(ui_dev_destroy, b'U', 2);

#[derive(Debug, Error)]
pub enum UinputError {
    #[error("cannot open uinput device {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("{request} failed: {source}")]
    Ioctl {
        request: &'static str,
        #[source]
        source: Errno,
    },

    #[error("error writing to uinput: {0}")]
    Write(#[source] io::Error),

    #[error("short write to uinput: {written} of {expected} bytes")]
    ShortWrite { written: usize, expected: usize },
}

pub type Result<T> = std::result::Result<T, UinputError>;

/// `struct input_event`
#[repr(C)]
struct InputEvent {
    time: libc::timeval,
    kind: u16,
    code: u16,
    value: i32,
}

/// `struct input_id`
#[repr(C)]
struct InputId {
    bustype: u16,
    vendor: u16,
    product: u16,
    version: u16,
}

/// `struct uinput_user_dev`
#[repr(C)]
struct UinputUserDev {
    name: [u8; UINPUT_MAX_NAME_SIZE],
    id: InputId,
    ff_effects_max: u32,
    absmax: [i32; ABS_CNT],
    absmin: [i32; ABS_CNT],
    absfuzz: [i32; ABS_CNT],
    absflat: [i32; ABS_CNT],
}

fn as_bytes<T>(value: &T) -> &[u8] {
    // SAFETY: only used on the plain repr(C) structs above.
    unsafe { slice::from_raw_parts((value as *const T).cast::<u8>(), mem::size_of::<T>()) }
}

/// A registered uinput keyboard
pub struct VirtualKeyboard {
    file: File,
}

impl VirtualKeyboard {
    /// Open `path` and register a keyboard able to emit `codes`.
    pub fn create(path: &Path, name: &str, codes: &[u16]) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .open(path)
            .map_err(|source| UinputError::Open {
                path: path.to_path_buf(),
                source,
            })?;
        let fd = file.as_raw_fd();

        // SAFETY: fd is an open uinput descriptor for the lifetime of `file`.
        unsafe {
            ui_set_evbit(fd, EV_KEY.into()).map_err(|source| UinputError::Ioctl {
                request: "UI_SET_EVBIT EV_KEY",
                source,
            })?;
            ui_set_evbit(fd, EV_SYN.into()).map_err(|source| UinputError::Ioctl {
                request: "UI_SET_EVBIT EV_SYN",
                source,
            })?;
            for &code in codes {
                if let Err(e) = ui_set_keybit(fd, code.into()) {
                    warn!(code, "UI_SET_KEYBIT failed: {}", e);
                }
            }
        }

        let mut dev = UinputUserDev {
            name: [0; UINPUT_MAX_NAME_SIZE],
            id: InputId {
                bustype: BUS_USB,
                vendor: 1,
                product: 1,
                version: 1,
            },
            ff_effects_max: 0,
            absmax: [0; ABS_CNT],
            absmin: [0; ABS_CNT],
            absfuzz: [0; ABS_CNT],
            absflat: [0; ABS_CNT],
        };
        let len = name.len().min(UINPUT_MAX_NAME_SIZE - 1);
        dev.name[..len].copy_from_slice(&name.as_bytes()[..len]);

        let mut file = file;
        write_exact(&mut file, as_bytes(&dev))?;

        // SAFETY: as above.
        unsafe {
            ui_dev_create(fd).map_err(|source| UinputError::Ioctl {
                request: "UI_DEV_CREATE",
                source,
            })?;
        }

        info!(path = %path.display(), name, keys = codes.len(), "uinput device created");
        Ok(Self { file })
    }

    /// Press and release `code`, holding `modifier` around it if given.
    pub fn tap(&mut self, code: u16, modifier: Option<u16>) {
        if let Some(m) = modifier {
            self.emit(EV_KEY, m, 1);
        }
        self.emit(EV_KEY, code, 1);
        self.emit(EV_KEY, code, 0);
        if let Some(m) = modifier {
            self.emit(EV_KEY, m, 0);
        }
        self.emit(EV_SYN, SYN_REPORT, 0);
        debug!(code, ?modifier, "key sent");
    }

    /// Best-effort single event write.
    fn emit(&mut self, kind: u16, code: u16, value: i32) {
        let event = InputEvent {
            time: libc::timeval {
                tv_sec: 0,
                tv_usec: 0,
            },
            kind,
            code,
            value,
        };
        if let Err(e) = write_exact(&mut self.file, as_bytes(&event)) {
            warn!("error sending uinput event: {}", e);
        }
    }
}

/// One write, no retry; a short write is an error.
fn write_exact(file: &mut File, bytes: &[u8]) -> Result<()> {
    let written = file.write(bytes).map_err(UinputError::Write)?;
    if written != bytes.len() {
        return Err(UinputError::ShortWrite {
            written,
            expected: bytes.len(),
        });
    }
    Ok(())
}

impl Drop for VirtualKeyboard {
    fn drop(&mut self) {
        // SAFETY: the descriptor is still owned by `self.file`.
        if let Err(e) = unsafe { ui_dev_destroy(self.file.as_raw_fd()) } {
            warn!("UI_DEV_DESTROY failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_struct_layout_matches_kernel() {
        // 80 name bytes, 8 id bytes, 4 ff bytes, 4 tables of 64 i32
        assert_eq!(mem::size_of::<UinputUserDev>(), 80 + 8 + 4 + 4 * 64 * 4);
        assert_eq!(
            mem::size_of::<InputEvent>(),
            mem::size_of::<libc::timeval>() + 8
        );
    }

    #[test]
    fn test_missing_device_is_reported() {
        let missing = Path::new("/nonexistent/padterm-uinput");
        match VirtualKeyboard::create(missing, "fbkeyboard", &[keys::KEY_A]) {
            Err(UinputError::Open { path, .. }) => assert_eq!(path, missing),
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("opened a device that does not exist"),
        }
    }
}
