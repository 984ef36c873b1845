//! Terminal state ownership: raw/original/unknown mode transitions.
//!
//! Mode bit sets are transcribed from the reference implementation's
//! `drsh_ts_raw`/`drsh_ts_orig` (see SPEC_FULL.md §4.3). `TermState`'s
//! `Drop` best-effort restores the original mode, generalizing the
//! manual save/restore pairing in the teacher's `win_console.rs` into
//! an RAII guard.

use std::io::Write;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Init,
    Raw,
    Orig,
    Unknown,
}

#[cfg(unix)]
mod platform {
    use std::os::unix::io::RawFd;

    pub struct Handles {
        pub in_fd: RawFd,
        pub out_fd: RawFd,
        pub in_is_terminal: bool,
        pub out_is_terminal: bool,
        pub orig: Option<libc::termios>,
    }

    pub fn init(in_fd: RawFd, out_fd: RawFd) -> std::io::Result<Handles> {
        let in_is_terminal = unsafe { libc::isatty(in_fd) } != 0;
        let out_is_terminal = unsafe { libc::isatty(out_fd) } != 0;
        let orig = if in_is_terminal {
            let mut t: libc::termios = unsafe { std::mem::zeroed() };
            if unsafe { libc::tcgetattr(in_fd, &mut t) } == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Some(t)
        } else {
            None
        };
        Ok(Handles {
            in_fd,
            out_fd,
            in_is_terminal,
            out_is_terminal,
            orig,
        })
    }

    pub fn set_raw(h: &Handles) -> std::io::Result<()> {
        let Some(orig) = h.orig else { return Ok(()) };
        if !h.in_is_terminal {
            return Ok(());
        }
        let mut raw = orig;
        raw.c_iflag &= !(libc::BRKINT | libc::ICRNL | libc::INPCK | libc::ISTRIP | libc::IXON);
        raw.c_oflag &= !libc::OPOST;
        raw.c_cflag |= libc::CS8;
        // ISIG is deliberately left set so Ctrl-Z still signals at the
        // tty-driver level (see SPEC_FULL.md §4.3).
        raw.c_lflag &= !(libc::ECHO | libc::ICANON | libc::IEXTEN);
        raw.c_cc[libc::VMIN] = 1;
        raw.c_cc[libc::VTIME] = 0;
        if unsafe { libc::tcsetattr(h.in_fd, libc::TCSAFLUSH, &raw) } < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn set_orig(h: &Handles) -> std::io::Result<()> {
        let Some(orig) = h.orig else { return Ok(()) };
        if !h.in_is_terminal {
            return Ok(());
        }
        if unsafe { libc::tcsetattr(h.in_fd, libc::TCSAFLUSH, &orig) } < 0 {
            return Err(std::io::Error::last_os_error());
        }
        Ok(())
    }

    pub fn window_size(h: &Handles) -> (u16, u16) {
        if !h.out_is_terminal {
            return (80, 24);
        }
        let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
        if unsafe { libc::ioctl(h.out_fd, libc::TIOCGWINSZ, &mut ws) } == 0 && ws.ws_col > 0 {
            (ws.ws_col, ws.ws_row)
        } else {
            (80, 24)
        }
    }
}

#[cfg(windows)]
mod platform {
    use windows_sys::Win32::System::Console::*;

    pub struct Handles {
        pub in_handle: *mut std::ffi::c_void,
        pub out_handle: *mut std::ffi::c_void,
        pub in_is_terminal: bool,
        pub out_is_terminal: bool,
        pub in_orig: u32,
        pub out_orig: u32,
    }

    // SAFETY: console handles are process-global and only touched from
    // the single-threaded shell loop.
    unsafe impl Send for Handles {}

    pub fn init(
        in_handle: *mut std::ffi::c_void,
        out_handle: *mut std::ffi::c_void,
    ) -> std::io::Result<Handles> {
        unsafe {
            SetConsoleCtrlHandler(Some(ctrl_handler), 1);
            let in_is_terminal = GetFileType(in_handle) == FILE_TYPE_CHAR;
            let out_is_terminal = GetFileType(out_handle) == FILE_TYPE_CHAR;
            let mut in_orig = 0u32;
            let mut out_orig = 0u32;
            if in_is_terminal {
                if GetConsoleMode(in_handle, &mut in_orig) == 0 {
                    return Err(std::io::Error::last_os_error());
                }
                if SetConsoleCP(65001) == 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            if out_is_terminal {
                if GetConsoleMode(out_handle, &mut out_orig) == 0 {
                    return Err(std::io::Error::last_os_error());
                }
                if SetConsoleOutputCP(65001) == 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            Ok(Handles {
                in_handle,
                out_handle,
                in_is_terminal,
                out_is_terminal,
                in_orig,
                out_orig,
            })
        }
    }

    unsafe extern "system" fn ctrl_handler(ctrl_type: u32) -> i32 {
        // Swallow Ctrl-C / Ctrl-Break so the shell itself survives; the
        // key decoder turns Ctrl-C into a logical INTERRUPT command.
        match ctrl_type {
            CTRL_C_EVENT | CTRL_BREAK_EVENT => 1,
            _ => 0,
        }
    }

    pub fn set_raw(h: &Handles) -> std::io::Result<()> {
        unsafe {
            if h.in_is_terminal {
                let mode = ENABLE_VIRTUAL_TERMINAL_INPUT;
                if SetConsoleMode(h.in_handle, mode) == 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            if h.out_is_terminal {
                let mode = ENABLE_PROCESSED_OUTPUT
                    | ENABLE_WRAP_AT_EOL_OUTPUT
                    | ENABLE_VIRTUAL_TERMINAL_PROCESSING
                    | DISABLE_NEWLINE_AUTO_RETURN;
                if SetConsoleMode(h.out_handle, mode) == 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
        }
        Ok(())
    }

    pub fn set_orig(h: &Handles) -> std::io::Result<()> {
        unsafe {
            if h.in_is_terminal {
                SetConsoleMode(h.in_handle, h.in_orig);
            }
            if h.out_is_terminal {
                SetConsoleMode(h.out_handle, h.out_orig);
            }
        }
        Ok(())
    }

    pub fn window_size(h: &Handles) -> (u16, u16) {
        if !h.out_is_terminal {
            return (80, 24);
        }
        unsafe {
            let mut info: CONSOLE_SCREEN_BUFFER_INFO = std::mem::zeroed();
            if GetConsoleScreenBufferInfo(h.out_handle, &mut info) != 0 {
                let cols = (info.srWindow.Right - info.srWindow.Left + 1).max(1) as u16;
                let rows = (info.srWindow.Bottom - info.srWindow.Top + 1).max(1) as u16;
                (cols, rows)
            } else {
                (80, 24)
            }
        }
    }
}

pub struct TermState {
    handles: platform::Handles,
    state: Mode,
    scratch: Vec<u8>,
}

impl TermState {
    #[cfg(unix)]
    pub fn new(in_fd: std::os::unix::io::RawFd, out_fd: std::os::unix::io::RawFd) -> std::io::Result<Self> {
        Ok(TermState {
            handles: platform::init(in_fd, out_fd)?,
            state: Mode::Init,
            scratch: Vec::new(),
        })
    }

    #[cfg(windows)]
    pub fn new(
        in_handle: *mut std::ffi::c_void,
        out_handle: *mut std::ffi::c_void,
    ) -> std::io::Result<Self> {
        Ok(TermState {
            handles: platform::init(in_handle, out_handle)?,
            state: Mode::Init,
            scratch: Vec::new(),
        })
    }

    pub fn state(&self) -> Mode {
        self.state
    }

    pub fn raw(&mut self) -> std::io::Result<()> {
        if self.state == Mode::Raw {
            return Ok(());
        }
        platform::set_raw(&self.handles)?;
        tracing::debug!(from = ?self.state, "terminal mode -> raw");
        self.state = Mode::Raw;
        Ok(())
    }

    pub fn orig(&mut self) -> std::io::Result<()> {
        if self.state == Mode::Orig {
            return Ok(());
        }
        platform::set_orig(&self.handles)?;
        tracing::debug!(from = ?self.state, "terminal mode -> orig");
        self.state = Mode::Orig;
        Ok(())
    }

    /// After a spawned child returns, the TTY is in an unknown state;
    /// force the next redisplay to re-enter raw mode.
    pub fn unknown(&mut self) {
        tracing::trace!(from = ?self.state, "terminal mode -> unknown");
        self.state = Mode::Unknown;
    }

    /// Best-effort raw write; short writes and errors are swallowed.
    pub fn write(&mut self, bytes: &[u8]) {
        let _ = std::io::stdout().write_all(bytes);
    }

    /// Current terminal width/height in character cells, falling back
    /// to a conservative 80x24 when the output isn't a terminal.
    pub fn window_size(&self) -> (u16, u16) {
        platform::window_size(&self.handles)
    }

    pub fn printf(&mut self, args: std::fmt::Arguments<'_>) {
        self.scratch.clear();
        let mut s = String::new();
        if std::fmt::write(&mut s, args).is_ok() {
            self.scratch.extend_from_slice(s.as_bytes());
            let bytes = self.scratch.clone();
            self.write(&bytes);
        }
    }
}

impl Drop for TermState {
    fn drop(&mut self) {
        let _ = self.orig();
    }
}
