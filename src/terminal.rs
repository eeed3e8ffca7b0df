//! Raw terminal control: key decoding, window geometry, raw-mode entry and
//! restoration, and width-based text wrapping for rendering.

use std::io;
use std::os::fd::RawFd;
use std::sync::OnceLock;

use anyhow::{anyhow, bail, Result};
use nix::errno::Errno;
use nix::sys::signal::{self, SigHandler, Signal};
use nix::sys::termios::{
    self, ControlFlags, InputFlags, LocalFlags, OutputFlags, SetArg, SpecialCharacterIndices,
    Termios,
};
use nix::unistd;

use crate::util;

// -------- key decoding --------

/// One decoded input unit. Ordinary bytes pass through as `Byte`; escape
/// sequences and the delete byte decode to named keys.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Key {
    Byte(u8),
    Backspace,
    ArrowLeft,
    ArrowRight,
    ArrowUp,
    ArrowDown,
    Delete,
    Home,
    End,
    PageUp,
    PageDown,
    Escape,
}

impl Key {
    /// Stable numeric code: bytes map to themselves, Backspace to 127,
    /// Escape to 27, and the named keys to a contiguous block from 1000.
    pub fn code(self) -> u32 {
        match self {
            Key::Byte(b) => u32::from(b),
            Key::Backspace => 127,
            Key::Escape => 27,
            Key::ArrowLeft => 1000,
            Key::ArrowRight => 1001,
            Key::ArrowUp => 1002,
            Key::ArrowDown => 1003,
            Key::Delete => 1004,
            Key::Home => 1005,
            Key::End => 1006,
            Key::PageUp => 1007,
            Key::PageDown => 1008,
        }
    }

    pub fn from_code(code: u32) -> Option<Key> {
        Some(match code {
            127 => Key::Backspace,
            27 => Key::Escape,
            1000 => Key::ArrowLeft,
            1001 => Key::ArrowRight,
            1002 => Key::ArrowUp,
            1003 => Key::ArrowDown,
            1004 => Key::Delete,
            1005 => Key::Home,
            1006 => Key::End,
            1007 => Key::PageUp,
            1008 => Key::PageDown,
            0..=255 => Key::Byte(code as u8),
            _ => return None,
        })
    }
}

/// The byte a Ctrl-chord delivers for the given letter.
pub const fn ctrl_key(c: u8) -> u8 {
    c & 0x1f
}

/// Block until one input unit is available on `fd` and decode it.
///
/// An ESC that is not followed by a complete recognized sequence decodes to
/// `Key::Escape`; the continuation bytes are read with single attempts so a
/// lone ESC under the raw-mode read timeout falls through immediately.
pub fn read_key(fd: RawFd) -> Result<Key> {
    let c = loop {
        let mut b = [0u8; 1];
        match unistd::read(fd, &mut b) {
            Ok(1) => break b[0],
            Ok(_) => continue,
            Err(Errno::EAGAIN) => continue,
            Err(e) => bail!("failed to read input: {e}"),
        }
    };
    if c == b'\x1b' {
        let Some(s0) = next_byte(fd) else {
            return Ok(Key::Escape);
        };
        let Some(s1) = next_byte(fd) else {
            return Ok(Key::Escape);
        };
        let key = match (s0, s1) {
            (b'[', b'0'..=b'9') => match next_byte(fd) {
                Some(b'~') => match s1 {
                    b'1' | b'7' => Key::Home,
                    b'3' => Key::Delete,
                    b'4' | b'8' => Key::End,
                    b'5' => Key::PageUp,
                    b'6' => Key::PageDown,
                    _ => Key::Escape,
                },
                _ => Key::Escape,
            },
            (b'[', b'A') => Key::ArrowUp,
            (b'[', b'B') => Key::ArrowDown,
            (b'[', b'C') => Key::ArrowRight,
            (b'[', b'D') => Key::ArrowLeft,
            (b'[', b'H') | (b'O', b'H') => Key::Home,
            (b'[', b'F') | (b'O', b'F') => Key::End,
            _ => Key::Escape,
        };
        return Ok(key);
    }
    Ok(match c {
        127 => Key::Backspace,
        byte => Key::Byte(byte),
    })
}

fn next_byte(fd: RawFd) -> Option<u8> {
    let mut b = [0u8; 1];
    match unistd::read(fd, &mut b) {
        Ok(1) => Some(b[0]),
        _ => None,
    }
}

// -------- window geometry --------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Geometry {
    pub cols: u16,
    pub rows: u16,
}

/// Query the terminal size, preferring the kernel's view of the device and
/// falling back to a cursor-report probe when the ioctl is unavailable or
/// reports zero columns. The fallback writes to the terminal, so it only
/// works once raw mode is active.
pub fn window_size() -> Option<Geometry> {
    let mut ws = libc::winsize {
        ws_row: 0,
        ws_col: 0,
        ws_xpixel: 0,
        ws_ypixel: 0,
    };
    let rc = unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) };
    if rc == 0 && ws.ws_col != 0 {
        return Some(Geometry {
            cols: ws.ws_col,
            rows: ws.ws_row,
        });
    }
    // push the cursor to the bottom-right corner and ask where it landed
    util::write_all_fd(libc::STDOUT_FILENO, b"\x1b[999C\x1b[999B").ok()?;
    let (row, col) = cursor_position()?;
    Some(Geometry {
        cols: col,
        rows: row,
    })
}

fn cursor_position() -> Option<(u16, u16)> {
    util::write_all_fd(libc::STDOUT_FILENO, b"\x1b[6n").ok()?;
    let mut buf = [0u8; 32];
    let mut len = 0;
    while len < buf.len() - 1 {
        match unistd::read(libc::STDIN_FILENO, &mut buf[len..len + 1]) {
            Ok(1) => {
                if buf[len] == b'R' {
                    break;
                }
                len += 1;
            }
            _ => break,
        }
    }
    parse_cursor_report(&buf[..len])
}

/// Parse a cursor-position report (`ESC [ row ; col`, terminator already
/// stripped) into its `(row, col)` pair.
pub fn parse_cursor_report(buf: &[u8]) -> Option<(u16, u16)> {
    let rest = buf.strip_prefix(b"\x1b[")?;
    let text = std::str::from_utf8(rest).ok()?;
    let (row, col) = text.split_once(';')?;
    Some((row.parse().ok()?, col.parse().ok()?))
}

// -------- raw mode --------

static SAVED_TERMIOS: OnceLock<libc::termios> = OnceLock::new();

extern "C" fn restore_on_signal(sig: libc::c_int) {
    if let Some(saved) = SAVED_TERMIOS.get() {
        let _ = unsafe { libc::tcsetattr(libc::STDIN_FILENO, libc::TCSAFLUSH, saved) };
    }
    unsafe {
        libc::signal(sig, libc::SIG_DFL);
        libc::raise(sig);
    }
}

/// Scope-bound raw-mode session on stdin.
///
/// Dropping the guard restores the saved settings; a signal handler covers
/// termination paths that never reach the drop, restoring from a process-wide
/// snapshot of the original settings before re-raising with the default
/// disposition.
pub struct RawModeGuard {
    saved: Termios,
}

impl RawModeGuard {
    pub fn enter() -> Result<RawModeGuard> {
        let stdin = io::stdin();
        let saved = termios::tcgetattr(&stdin)
            .map_err(|e| anyhow!("failed to read terminal attributes: {e}"))?;
        let _ = SAVED_TERMIOS.set(saved.clone().into());
        for sig in [Signal::SIGINT, Signal::SIGTERM, Signal::SIGHUP, Signal::SIGQUIT] {
            unsafe { signal::signal(sig, SigHandler::Handler(restore_on_signal)) }
                .map_err(|e| anyhow!("failed to install signal handler: {e}"))?;
        }
        let mut raw = saved.clone();
        raw.input_flags &= !(InputFlags::BRKINT
            | InputFlags::ICRNL
            | InputFlags::INPCK
            | InputFlags::ISTRIP
            | InputFlags::IXON);
        raw.output_flags &= !OutputFlags::OPOST;
        raw.control_flags |= ControlFlags::CS8;
        raw.local_flags &=
            !(LocalFlags::ECHO | LocalFlags::ICANON | LocalFlags::IEXTEN | LocalFlags::ISIG);
        raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
        raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 1;
        termios::tcsetattr(&stdin, SetArg::TCSAFLUSH, &raw)
            .map_err(|e| anyhow!("failed to set terminal attributes: {e}"))?;
        Ok(RawModeGuard { saved })
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = termios::tcsetattr(&io::stdin(), SetArg::TCSAFLUSH, &self.saved);
    }
}

// -------- text wrapping --------

/// Break `content` into display rows of at most `width` cells. Tabs expand
/// to four spaces and break the row first when the expansion would overflow;
/// newlines always break, possibly emitting an empty row. `width` must be
/// positive; callers guard this.
pub fn to_rows(content: &str, width: i32) -> Vec<String> {
    let mut rows = Vec::new();
    let mut row = String::new();
    let mut row_width = 0;
    for c in content.chars() {
        if row_width == width {
            rows.push(std::mem::take(&mut row));
            row_width = 0;
        }
        if c == '\t' {
            if row_width + 4 >= width {
                rows.push(std::mem::take(&mut row));
                row_width = 0;
            }
            row.push_str("    ");
            row_width += 4;
        } else if c == '\n' {
            rows.push(std::mem::take(&mut row));
            row_width = 0;
        } else {
            row.push(c);
            row_width += 1;
        }
    }
    if !row.is_empty() {
        rows.push(row);
    }
    rows
}

/// A content string with a lazily computed, width-keyed cache of its display
/// rows. The cache is recomputed only when queried with a different width
/// than the previous call.
pub struct WrappedLine {
    content: String,
    cache: Option<(i32, Vec<String>)>,
}

impl WrappedLine {
    pub fn new(content: impl Into<String>) -> WrappedLine {
        WrappedLine {
            content: content.into(),
            cache: None,
        }
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn rows(&mut self, width: i32) -> &[String] {
        if self.cache.as_ref().map_or(true, |(w, _)| *w != width) {
            self.cache = Some((width, to_rows(&self.content, width)));
        }
        match &self.cache {
            Some((_, rows)) => rows,
            None => &[],
        }
    }
}
