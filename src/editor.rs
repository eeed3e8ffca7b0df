//! Interactive raw-mode session: scrollback of annotated command lines, a
//! live input line, and cursor movement, rendered as full frames.

use anyhow::{anyhow, Result};

use crate::interp::Grammar;
use crate::terminal::{self, ctrl_key, Geometry, Key, RawModeGuard, WrappedLine};
use crate::util;

const STATUS_LINE: &str = "crew | CTRL-Q = quit";

/// Outcome of dispatching one key.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// One submitted line: the echoed input followed by its annotated parse.
struct ScrollbackEntry {
    text: WrappedLine,
}

pub struct Editor {
    grammar: Grammar,
    geometry: Geometry,
    cursor_x: u16,
    cursor_y: u16,
    input: String,
    scrollback: Vec<ScrollbackEntry>,
}

impl Editor {
    pub fn new(grammar: Grammar, geometry: Geometry) -> Editor {
        Editor {
            grammar,
            geometry,
            cursor_x: 0,
            cursor_y: 0,
            input: String::new(),
            scrollback: Vec::new(),
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn cursor(&self) -> (u16, u16) {
        (self.cursor_x, self.cursor_y)
    }

    /// Scrollback entry texts, oldest first.
    pub fn entries(&self) -> impl Iterator<Item = &str> + '_ {
        self.scrollback.iter().map(|entry| entry.text.content())
    }

    /// Apply one decoded key to the editor state. Unrecognized bytes and
    /// keys with no binding are ignored.
    pub fn handle_key(&mut self, key: Key) -> Flow {
        match key {
            Key::Byte(b) if b == ctrl_key(b'q') => return Flow::Quit,
            Key::Byte(b'\r') => self.submit_line(),
            Key::Byte(b @ 0x20..=0x7e) => {
                self.input.push(b as char);
                self.cursor_x = (self.cursor_x + 1).min(self.geometry.cols - 1);
            }
            Key::Backspace => {
                if self.input.pop().is_some() {
                    self.cursor_x = self.cursor_x.saturating_sub(1);
                }
            }
            Key::ArrowLeft => self.cursor_x = self.cursor_x.saturating_sub(1),
            Key::ArrowRight => self.cursor_x = (self.cursor_x + 1).min(self.geometry.cols - 1),
            Key::ArrowUp => self.cursor_y = self.cursor_y.saturating_sub(1),
            Key::ArrowDown => self.cursor_y = (self.cursor_y + 1).min(self.geometry.rows - 1),
            Key::PageUp => {
                for _ in 0..self.geometry.rows {
                    self.cursor_y = self.cursor_y.saturating_sub(1);
                }
            }
            Key::PageDown => {
                for _ in 0..self.geometry.rows {
                    self.cursor_y = (self.cursor_y + 1).min(self.geometry.rows - 1);
                }
            }
            Key::Home => self.cursor_x = 0,
            Key::End => self.cursor_x = self.geometry.cols - 1,
            Key::Delete | Key::Escape | Key::Byte(_) => {}
        }
        Flow::Continue
    }

    fn submit_line(&mut self) {
        let line = std::mem::take(&mut self.input);
        let tokens = util::tokenize(&line);
        let annotation = match self.grammar.parse(&tokens) {
            Some(result) => result.to_string(),
            None => String::from("NO COMMAND!"),
        };
        self.scrollback.push(ScrollbackEntry {
            text: WrappedLine::new(format!(">{line}\n{annotation}")),
        });
        self.cursor_x = 0;
    }

    /// Assemble one full screen as a single buffered write: the newest
    /// wrapped scrollback rows that fit (oldest first within that tail),
    /// placeholder markers on unused rows, the input line, and an inverted
    /// status line, with the cursor parked back at its tracked position.
    pub fn render_frame(&mut self) -> String {
        let width = i32::from(self.geometry.cols);
        let budget = usize::from(self.geometry.rows.saturating_sub(2));
        let mut total = 0;
        for entry in &mut self.scrollback {
            total += entry.text.rows(width).len();
        }
        let mut skip = total.saturating_sub(budget);
        let mut used = 0;
        let mut frame = String::from("\x1b[?25l\x1b[H");
        for entry in &mut self.scrollback {
            for row in entry.text.rows(width) {
                if skip > 0 {
                    skip -= 1;
                    continue;
                }
                frame.push_str(row);
                frame.push_str("\x1b[K\r\n");
                used += 1;
            }
        }
        for _ in used..budget {
            frame.push_str("~\x1b[K\r\n");
        }
        frame.push_str(&self.input);
        frame.push_str("\x1b[K\r\n");
        let cols = usize::from(self.geometry.cols);
        let mut status = String::from(STATUS_LINE);
        status.truncate(cols);
        while status.len() < cols {
            status.push(' ');
        }
        frame.push_str("\x1b[7m");
        frame.push_str(&status);
        frame.push_str("\x1b[m");
        frame.push_str(&format!(
            "\x1b[{};{}H",
            self.cursor_y + 1,
            self.cursor_x + 1
        ));
        frame.push_str("\x1b[?25h");
        frame
    }
}

/// Run the editor on the controlling terminal until the quit key.
///
/// Raw mode is entered before the geometry poll because the cursor-report
/// fallback needs it; the guard restores the terminal on every exit path,
/// and any error surfaces after the screen is cleared so the diagnostic
/// prints at a sane position.
pub fn launch(grammar: Grammar) -> Result<()> {
    let _guard = RawModeGuard::enter()?;
    let geometry =
        terminal::window_size().ok_or_else(|| anyhow!("unable to determine window size"))?;
    let mut editor = Editor::new(grammar, geometry);
    loop {
        let frame = editor.render_frame();
        if let Err(e) = util::write_all_fd(libc::STDOUT_FILENO, frame.as_bytes()) {
            return Err(screen_reset(anyhow!("failed to write frame: {e}")));
        }
        let key = match terminal::read_key(libc::STDIN_FILENO) {
            Ok(key) => key,
            Err(e) => return Err(screen_reset(e)),
        };
        match editor.handle_key(key) {
            Flow::Continue => {}
            Flow::Quit => {
                let _ = util::write_all_fd(libc::STDOUT_FILENO, b"\x1b[2J\x1b[H");
                return Ok(());
            }
        }
    }
}

fn screen_reset(err: anyhow::Error) -> anyhow::Error {
    let _ = util::write_all_fd(libc::STDOUT_FILENO, b"\x1b[2J\x1b[H");
    err
}
