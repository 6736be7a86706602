//! VT100 Terminal Driver
//!
//! Byte-level terminal access for the line editor: raw mode switching,
//! a select()-based read with timeout, window size queries and the
//! cursor movement escape codes the editor emits.

use std::io::{self, Write};
use std::os::unix::io::RawFd;

/// Result of waiting for the next input byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Byte(u8),
    Timeout,
    Eof,
}

/// Decoded ANSI escape sequences.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeCode {
    CursorUp,
    CursorDown,
    CursorLeft,
    CursorRight,
    Home,
    End,
    Delete,
    Insert,
    PgUp,
    PgDown,
    Unknown,
}

/// Decode a collected escape sequence (the bytes after ESC).
pub fn escape_decode(seq: &str) -> EscapeCode {
    match seq {
        "[A" | "OA" => EscapeCode::CursorUp,
        "[B" | "OB" => EscapeCode::CursorDown,
        "[C" | "OC" => EscapeCode::CursorRight,
        "[D" | "OD" => EscapeCode::CursorLeft,
        "[H" | "OH" | "[1~" => EscapeCode::Home,
        "[F" | "OF" | "[4~" => EscapeCode::End,
        "[3~" => EscapeCode::Delete,
        "[2~" => EscapeCode::Insert,
        "[5~" => EscapeCode::PgUp,
        "[6~" => EscapeCode::PgDown,
        _ => EscapeCode::Unknown,
    }
}

/// The terminal session: an input fd (None for editors fed by
/// forcelines only) and a buffered output writer.
pub struct Vt100 {
    input_fd: Option<RawFd>,
    out: Box<dyn Write>,
    /// Read timeout in seconds; 0 blocks forever.
    timeout: u32,
    saved_termios: Option<libc::termios>,
}

impl std::fmt::Debug for Vt100 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vt100")
            .field("input_fd", &self.input_fd)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Vt100 {
    pub fn new(input_fd: Option<RawFd>, out: Box<dyn Write>) -> Self {
        Self {
            input_fd,
            out,
            timeout: 0,
            saved_termios: None,
        }
    }

    /// A driver over the process terminal.
    pub fn stdio() -> Self {
        Self::new(Some(0), Box::new(io::stdout()))
    }

    pub fn set_timeout(&mut self, timeout: u32) {
        self.timeout = timeout;
    }

    pub fn isatty(&self) -> bool {
        match self.input_fd {
            Some(fd) => unsafe { libc::isatty(fd) == 1 },
            None => false,
        }
    }

    /// Wait for the next byte, a timeout, or end of input.
    pub fn getchar(&mut self) -> Key {
        let Some(fd) = self.input_fd else {
            return Key::Eof;
        };

        if self.timeout > 0 {
            unsafe {
                let mut readfds: libc::fd_set = std::mem::zeroed();
                libc::FD_ZERO(&mut readfds);
                libc::FD_SET(fd, &mut readfds);
                let mut tv = libc::timeval {
                    tv_sec: self.timeout as libc::time_t,
                    tv_usec: 0,
                };
                let res = libc::select(
                    fd + 1,
                    &mut readfds,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                    &mut tv,
                );
                match res {
                    0 => return Key::Timeout,
                    r if r < 0 => return Key::Eof,
                    _ => {}
                }
            }
        }

        let mut byte = [0u8; 1];
        let n = unsafe { libc::read(fd, byte.as_mut_ptr() as *mut libc::c_void, 1) };
        if n == 1 {
            Key::Byte(byte[0])
        } else {
            Key::Eof
        }
    }

    /// Switch the input terminal into raw (non-canonical, no echo) mode.
    pub fn set_raw_mode(&mut self) {
        let Some(fd) = self.input_fd else {
            return;
        };
        unsafe {
            let mut tio: libc::termios = std::mem::zeroed();
            if libc::tcgetattr(fd, &mut tio) < 0 {
                return;
            }
            if self.saved_termios.is_none() {
                self.saved_termios = Some(tio);
            }
            tio.c_iflag = 0;
            tio.c_oflag = libc::OPOST | libc::ONLCR;
            tio.c_lflag = 0;
            tio.c_cc[libc::VMIN] = 1;
            tio.c_cc[libc::VTIME] = 0;
            libc::tcsetattr(fd, libc::TCSADRAIN, &tio);
        }
    }

    /// Restore the terminal settings captured by the first raw switch.
    pub fn restore_mode(&mut self) {
        let (Some(fd), Some(tio)) = (self.input_fd, self.saved_termios) else {
            return;
        };
        unsafe {
            libc::tcsetattr(fd, libc::TCSADRAIN, &tio);
        }
    }

    /// Terminal width in cells; 80 when unknown.
    pub fn width(&self) -> usize {
        self.winsize().map(|ws| ws.0).unwrap_or(80)
    }

    /// Terminal height in rows; 24 when unknown.
    pub fn height(&self) -> usize {
        self.winsize().map(|ws| ws.1).unwrap_or(24)
    }

    fn winsize(&self) -> Option<(usize, usize)> {
        let fd = self.input_fd?;
        unsafe {
            let mut ws: libc::winsize = std::mem::zeroed();
            if libc::ioctl(fd, libc::TIOCGWINSZ, &mut ws) != 0 || ws.ws_col == 0 {
                return None;
            }
            Some((ws.ws_col as usize, ws.ws_row as usize))
        }
    }

    pub fn print(&mut self, text: &str) {
        let _ = self.out.write_all(text.as_bytes());
    }

    pub fn flush(&mut self) {
        let _ = self.out.flush();
    }

    pub fn crlf(&mut self) {
        self.print("\n");
    }

    pub fn ding(&mut self) {
        self.print("\x07");
        self.flush();
    }

    pub fn cursor_up(&mut self, n: usize) {
        if n > 0 {
            self.print(&format!("\x1b[{}A", n));
        }
    }

    pub fn cursor_down(&mut self, n: usize) {
        if n > 0 {
            self.print(&format!("\x1b[{}B", n));
        }
    }

    pub fn cursor_forward(&mut self, n: usize) {
        if n > 0 {
            self.print(&format!("\x1b[{}C", n));
        }
    }

    pub fn cursor_back(&mut self, n: usize) {
        if n > 0 {
            self.print(&format!("\x1b[{}D", n));
        }
    }

    pub fn cursor_home(&mut self) {
        self.print("\x1b[H");
    }

    pub fn erase_down(&mut self) {
        self.print("\x1b[J");
    }

    pub fn clear_screen(&mut self) {
        self.print("\x1b[2J");
    }

    pub fn next_line(&mut self) {
        self.print("\x1bE");
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_decode() {
        assert_eq!(escape_decode("[A"), EscapeCode::CursorUp);
        assert_eq!(escape_decode("[D"), EscapeCode::CursorLeft);
        assert_eq!(escape_decode("[3~"), EscapeCode::Delete);
        assert_eq!(escape_decode("OH"), EscapeCode::Home);
        assert_eq!(escape_decode("[9~"), EscapeCode::Unknown);
    }

    #[test]
    fn test_no_input_fd_is_eof() {
        let mut term = Vt100::new(None, Box::new(Vec::new()));
        assert_eq!(term.getchar(), Key::Eof);
        assert!(!term.isatty());
    }

    #[test]
    fn test_width_fallback() {
        let term = Vt100::new(None, Box::new(Vec::new()));
        assert_eq!(term.width(), 80);
        assert_eq!(term.height(), 24);
    }
}
