//! Line Editor
//!
//! A UTF-8 aware single-line editor: emacs-style key bindings, history
//! navigation, completion with common-prefix substitution, contextual
//! help, per-view hotkeys, and idle/watchdog timeouts. Display updates
//! are incremental: only the tail of the line after the first changed
//! character is rewritten.
//!
//! Application-specific behaviour (what enter, tab, `?` and hotkeys
//! mean) reaches the editor through the [`LineHooks`] trait; handlers
//! return instructions and the editor applies them, so the shell never
//! re-enters the editor.

pub mod history;
pub mod vt100;

use unicode_width::UnicodeWidthStr;

use crate::scheme::ParseStatus;
pub use history::{Expansion, History};
pub use vt100::{escape_decode, EscapeCode, Key, Vt100};

/// What a timeout means for the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeoutAction {
    /// End the session (idle timeout).
    Close,
    /// Keep waiting, optionally rearming the read timeout (e.g. after
    /// the watchdog fired and the idle timeout applies again).
    Continue(Option<u32>),
}

/// Instruction returned by the enter hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnterAction {
    /// The line is complete; return it to the caller.
    Accept,
    /// Replace the buffer (auto-completion) and accept it.
    AcceptReplaced(String),
    /// Replace the buffer and keep editing.
    Replace(String),
    /// Keep editing. A message is printed as a syntax diagnostic; with
    /// no message the editor just rings the bell.
    Reject(Option<String>),
}

/// Application callbacks driving completion, validation and hotkeys.
pub trait LineHooks {
    /// Completion candidates for the word at `[start, end)` of `line`.
    fn complete(&mut self, line: &str, start: usize, end: usize) -> Vec<String>;

    /// Decide what pressing enter does with this line.
    fn on_enter(&mut self, line: &str, isatty: bool) -> EnterAction;

    /// Parse status of the line so far (drives the smart space key).
    fn line_status(&mut self, line: &str) -> ParseStatus;

    /// Print contextual help for the line (the `?` key).
    fn context_help(&mut self, line: &str);

    /// Command line bound to a control key, if any.
    fn hotkey(&mut self, code: u8) -> Option<String>;

    /// Called when the read times out.
    fn timeout(&mut self) -> TimeoutAction;

    /// Called on every received key, before dispatch. May rearm the
    /// read timeout (watchdog disarm).
    fn keypress(&mut self, key: u8) -> Option<u32>;
}

/// Result of one readline call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadResult {
    Line(String),
    Eof,
    /// A forced line failed validation.
    Error,
}

#[derive(Debug, Clone)]
struct LastRender {
    buffer: String,
    point: usize,
    width: usize,
}

/// The editor instance.
pub struct Editor {
    term: Vt100,
    history: History,
    prompt: String,
    prompt_cells: usize,
    buffer: String,
    /// Byte offset of the insertion point; always a char boundary.
    point: usize,
    /// Position while browsing history, and the in-progress line saved
    /// when browsing started.
    hist_pos: Option<usize>,
    saved_buffer: Option<String>,
    kill_string: Option<String>,
    last: Option<LastRender>,
    /// Pending bytes of an incomplete UTF-8 character.
    pending: Vec<u8>,
    utf8: bool,
    echo_enabled: bool,
    echo_char: Option<char>,
    done: bool,
    accepted: Option<String>,
}

impl Editor {
    pub fn new(term: Vt100, stifle: usize) -> Self {
        Self {
            term,
            history: History::new(stifle),
            prompt: String::new(),
            prompt_cells: 0,
            buffer: String::new(),
            point: 0,
            hist_pos: None,
            saved_buffer: None,
            kill_string: None,
            last: None,
            pending: Vec::new(),
            utf8: true,
            echo_enabled: true,
            echo_char: None,
            done: false,
            accepted: None,
        }
    }

    // ------------------------------------------------------------------
    // Attributes
    // ------------------------------------------------------------------

    pub fn line(&self) -> &str {
        &self.buffer
    }

    pub fn point(&self) -> usize {
        self.point
    }

    pub fn isatty(&self) -> bool {
        self.term.isatty()
    }

    pub fn width(&self) -> usize {
        self.term.width()
    }

    pub fn height(&self) -> usize {
        self.term.height()
    }

    pub fn utf8(&self) -> bool {
        self.utf8
    }

    pub fn set_utf8(&mut self, utf8: bool) {
        self.utf8 = utf8;
    }

    pub fn set_timeout(&mut self, seconds: u32) {
        self.term.set_timeout(seconds);
    }

    pub fn set_prompt(&mut self, prompt: &str) {
        self.prompt = prompt.to_string();
        self.prompt_cells = self.nsyms(&self.prompt);
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn history_mut(&mut self) -> &mut History {
        &mut self.history
    }

    pub fn enable_echo(&mut self) {
        self.echo_enabled = true;
    }

    pub fn disable_echo(&mut self, echo_char: Option<char>) {
        self.echo_enabled = false;
        self.echo_char = echo_char;
    }

    /// Print through the editor's output stream.
    pub fn print(&mut self, text: &str) {
        self.term.print(text);
        self.term.flush();
    }

    pub fn crlf(&mut self) {
        self.term.crlf();
    }

    pub fn ding(&mut self) {
        self.term.ding();
    }

    // ------------------------------------------------------------------
    // Cell arithmetic
    // ------------------------------------------------------------------

    /// Number of terminal cells the string occupies. In 8-bit mode each
    /// byte is one cell; in UTF-8 mode CJK characters take two.
    pub fn nsyms(&self, text: &str) -> usize {
        if self.utf8 {
            UnicodeWidthStr::width(text)
        } else {
            text.len()
        }
    }

    /// Byte length of the common prefix of two strings, aligned to a
    /// character boundary.
    fn equal_part(a: &str, b: &str) -> usize {
        let mut eq = 0;
        for (ca, cb) in a.chars().zip(b.chars()) {
            if ca != cb {
                break;
            }
            eq += ca.len_utf8();
        }
        eq
    }

    fn prev_boundary(&self, from: usize) -> usize {
        self.buffer[..from]
            .char_indices()
            .last()
            .map(|(i, _)| i)
            .unwrap_or(0)
    }

    fn next_boundary(&self, from: usize) -> usize {
        self.buffer[from..]
            .chars()
            .next()
            .map(|c| from + c.len_utf8())
            .unwrap_or(from)
    }

    // ------------------------------------------------------------------
    // Buffer operations
    // ------------------------------------------------------------------

    /// Editing a history view copies it into the working buffer.
    fn take_hist_line(&mut self) {
        if self.hist_pos.take().is_some() {
            self.saved_buffer = None;
        }
    }

    pub fn insert_text(&mut self, text: &str) {
        self.take_hist_line();
        self.buffer.insert_str(self.point, text);
        self.point += text.len();
    }

    /// Delete the byte range `[start, end)`.
    pub fn delete_range(&mut self, start: usize, end: usize) {
        self.take_hist_line();
        let end = end.min(self.buffer.len());
        if start >= end {
            return;
        }
        self.buffer.replace_range(start..end, "");
        if self.point >= end {
            self.point -= end - start;
        } else if self.point > start {
            self.point = start;
        }
    }

    pub fn replace_line(&mut self, text: &str) {
        self.take_hist_line();
        self.buffer = text.to_string();
        self.point = self.buffer.len();
    }

    pub fn is_empty(&self) -> bool {
        self.point == 0
    }

    /// True when the insertion point sits inside an unterminated double
    /// quote. Escaped quotes do not toggle the state.
    pub fn is_quoting(&self) -> bool {
        let bytes = self.buffer.as_bytes();
        let mut quoting = false;
        let mut i = 0;
        while i < self.point {
            if quoting && bytes[i] == b'\\' {
                i += 2;
                continue;
            }
            if bytes[i] == b'"' {
                quoting = !quoting;
            }
            i += 1;
        }
        quoting
    }

    // ------------------------------------------------------------------
    // Display
    // ------------------------------------------------------------------

    /// Move the cursor from cell `base + delta` back to cell `base`,
    /// wrapping across rows of the given width.
    fn position(&mut self, base: usize, delta: i64, width: usize) {
        let width = width.max(1) as i64;
        let base = base as i64;
        let rows = (base + delta) / width - base / width;
        let cols = (base + delta) % width - base % width;
        if cols > 0 {
            self.term.cursor_back(cols as usize);
        } else if cols < 0 {
            self.term.cursor_forward((-cols) as usize);
        }
        if rows > 0 {
            self.term.cursor_up(rows as usize);
        } else if rows < 0 {
            self.term.cursor_down((-rows) as usize);
        }
    }

    fn echoed(&self, text: &str) -> String {
        if self.echo_enabled {
            text.to_string()
        } else if let Some(ch) = self.echo_char {
            std::iter::repeat(ch).take(text.chars().count()).collect()
        } else {
            String::new()
        }
    }

    /// Incremental redraw: reuse everything up to the first character
    /// that differs from the previous render.
    pub fn redisplay(&mut self) {
        let width = self.term.width();
        let line_len = self.nsyms(&self.buffer);
        let mut eq_bytes = 0;

        let same_width = match self.last.clone() {
            Some(last) if last.width == width => {
                eq_bytes = Self::equal_part(&self.buffer, &last.buffer);
                let eq_len = self.nsyms(&last.buffer[..eq_bytes]);
                let count = self.nsyms(&last.buffer[..last.point]);
                self.position(
                    self.prompt_cells + eq_len,
                    count as i64 - eq_len as i64,
                    width,
                );
                true
            }
            _ => false,
        };
        if !same_width {
            if let Some(last) = &self.last {
                if last.width != width {
                    self.term.next_line();
                    self.term.erase_down();
                }
            }
            let prompt = self.prompt.clone();
            self.term.print(&prompt);
        }

        let tail = self.echoed(&self.buffer[eq_bytes..]);
        self.term.print(&tail);

        // Wrap if the line ends exactly on the right margin.
        if width > 0 && (self.prompt_cells + line_len) % width == 0 && self.buffer.len() > eq_bytes
        {
            self.term.next_line();
        }
        if self
            .last
            .as_ref()
            .map(|l| l.buffer.len() > self.buffer.len())
            .unwrap_or(false)
        {
            self.term.erase_down();
        }

        if self.point < self.buffer.len() {
            let pre = self.nsyms(&self.buffer[..self.point]);
            let count = self.nsyms(&self.buffer[self.point..]);
            self.position(self.prompt_cells + pre, count as i64, width);
        }
        self.term.flush();

        self.last = Some(LastRender {
            buffer: self.buffer.clone(),
            point: self.point,
            width,
        });
    }

    /// Forget the previous render and redraw from the prompt.
    pub fn reset_line_state(&mut self) {
        self.last = None;
        self.redisplay();
    }

    /// Move the cursor below the (possibly wrapped) current input line.
    pub fn multi_crlf(&mut self) {
        if let Some(last) = self.last.clone() {
            let line_len = self.nsyms(&last.buffer);
            let count = self.nsyms(&last.buffer[..last.point]);
            self.position(
                self.prompt_cells + line_len,
                -(line_len as i64 - count as i64),
                last.width,
            );
        }
        self.term.crlf();
        self.term.flush();
    }

    /// Print completion candidates in columns.
    fn display_matches(&mut self, matches: &[String]) {
        let width = self.term.width();
        let max = matches.iter().map(|m| self.nsyms(m)).max().unwrap_or(0);
        let cols = if max < width {
            (width + 1) / (max + 1)
        } else {
            1
        };

        for row in matches.chunks(cols.max(1)) {
            let mut line = String::new();
            for (i, m) in row.iter().enumerate() {
                line.push_str(m);
                if i + 1 < row.len() {
                    for _ in self.nsyms(m)..max + 1 {
                        line.push(' ');
                    }
                }
            }
            self.term.print(&line);
            self.term.crlf();
        }
    }

    // ------------------------------------------------------------------
    // Completion
    // ------------------------------------------------------------------

    /// Case-insensitive common prefix of the candidate set, taken from
    /// the first candidate's spelling.
    fn common_prefix(candidates: &[String]) -> String {
        let Some(first) = candidates.first() else {
            return String::new();
        };
        let mut prefix_len = first.len();
        for cand in &candidates[1..] {
            let mut common = 0;
            for (a, b) in first.chars().zip(cand.chars()) {
                if !a.eq_ignore_ascii_case(&b) {
                    break;
                }
                common += a.len_utf8();
            }
            prefix_len = prefix_len.min(common);
        }
        first[..prefix_len].to_string()
    }

    /// Attempt completion at the insertion point. Returns true when the
    /// word completed cleanly (the caller may add a space).
    fn do_complete(&mut self, hooks: &mut dyn LineHooks, with_extensions: bool) -> bool {
        // No completion inside quotes.
        if self.is_quoting() {
            return false;
        }
        // Word boundaries around the point.
        let start = self.buffer[..self.point]
            .rfind(|c: char| c.is_whitespace())
            .map(|i| i + 1)
            .unwrap_or(0);
        let end = self.point;

        let candidates = hooks.complete(&self.buffer.clone(), start, end);
        if candidates.is_empty() {
            return false;
        }

        let subst = Self::common_prefix(&candidates);
        let word = &self.buffer[start..end];
        let mut completed = false;
        if !subst.is_empty() && !subst.eq_ignore_ascii_case(word) {
            self.delete_range(start, end);
            self.point = start;
            self.insert_text(&subst);
            completed = true;
        }

        let mut unique: Vec<String> = Vec::new();
        for cand in &candidates {
            if !unique.iter().any(|u| u.eq_ignore_ascii_case(cand)) {
                unique.push(cand.clone());
            }
        }

        if unique.len() > 1 {
            if with_extensions || !completed {
                self.term.crlf();
                self.display_matches(&unique);
                self.reset_line_state();
            } else {
                self.redisplay();
            }
            return false;
        }

        self.redisplay();
        true
    }

    // ------------------------------------------------------------------
    // Key handlers
    // ------------------------------------------------------------------

    fn key_enter(&mut self, hooks: &mut dyn LineHooks) -> bool {
        if self.buffer.is_empty() {
            self.multi_crlf();
            self.done = true;
            self.accepted = Some(String::new());
            return true;
        }

        // History expansion happens before validation.
        match self.history.expand(&self.buffer.clone()) {
            Expansion::Expanded(text) => {
                self.replace_line(&text);
                self.redisplay();
            }
            Expansion::Error => {
                self.multi_crlf();
                eprintln!("Syntax error: Bad history entry");
                self.reset_line_state();
                return true;
            }
            Expansion::None => {}
        }

        let isatty = self.term.isatty();
        match hooks.on_enter(&self.buffer.clone(), isatty) {
            EnterAction::Accept => {
                self.multi_crlf();
                self.done = true;
                self.accepted = Some(self.buffer.clone());
                true
            }
            EnterAction::AcceptReplaced(text) => {
                self.replace_line(&text);
                self.redisplay();
                self.multi_crlf();
                self.done = true;
                self.accepted = Some(text);
                true
            }
            EnterAction::Replace(text) => {
                self.replace_line(&text);
                self.redisplay();
                true
            }
            EnterAction::Reject(Some(msg)) => {
                self.multi_crlf();
                eprintln!("{}", msg);
                self.reset_line_state();
                true
            }
            EnterAction::Reject(None) => false,
        }
    }

    fn key_interrupt(&mut self) -> bool {
        self.term.crlf();
        self.buffer.clear();
        self.point = 0;
        self.hist_pos = None;
        self.saved_buffer = None;
        self.done = true;
        self.accepted = Some(String::new());
        true
    }

    fn key_backspace(&mut self) -> bool {
        if self.point == 0 {
            return false;
        }
        let prev = self.prev_boundary(self.point);
        self.delete_range(prev, self.point);
        true
    }

    fn key_delete(&mut self) -> bool {
        if self.point >= self.buffer.len() {
            return false;
        }
        let next = self.next_boundary(self.point);
        self.delete_range(self.point, next);
        true
    }

    fn key_backword(&mut self) -> bool {
        while self.point > 0
            && self.buffer[..self.point]
                .chars()
                .last()
                .map(char::is_whitespace)
                .unwrap_or(false)
        {
            self.key_backspace();
        }
        while self.point > 0
            && !self.buffer[..self.point]
                .chars()
                .last()
                .map(char::is_whitespace)
                .unwrap_or(true)
        {
            self.key_backspace();
        }
        true
    }

    fn key_kill(&mut self) -> bool {
        self.kill_string = Some(self.buffer[self.point..].to_string());
        let end = self.buffer.len();
        self.delete_range(self.point, end);
        true
    }

    fn key_yank(&mut self) -> bool {
        match self.kill_string.clone() {
            Some(text) if !text.is_empty() => {
                self.insert_text(&text);
                true
            }
            _ => false,
        }
    }

    fn key_erase_line(&mut self) -> bool {
        if self.point == 0 {
            self.kill_string = None;
            return true;
        }
        self.kill_string = Some(self.buffer[..self.point].to_string());
        let point = self.point;
        self.delete_range(0, point);
        self.point = 0;
        true
    }

    fn key_clear_screen(&mut self) -> bool {
        self.term.clear_screen();
        self.term.cursor_home();
        self.reset_line_state();
        true
    }

    fn key_left(&mut self) -> bool {
        if self.point == 0 {
            return false;
        }
        self.point = self.prev_boundary(self.point);
        true
    }

    fn key_right(&mut self) -> bool {
        if self.point >= self.buffer.len() {
            return false;
        }
        self.point = self.next_boundary(self.point);
        true
    }

    fn key_up(&mut self) -> bool {
        let pos = match self.hist_pos {
            None => {
                if self.history.is_empty() {
                    return false;
                }
                self.saved_buffer = Some(self.buffer.clone());
                self.history.len() - 1
            }
            Some(0) => return false,
            Some(pos) => pos - 1,
        };
        self.hist_pos = Some(pos);
        self.buffer = self.history.get(pos).unwrap_or_default().to_string();
        self.point = self.buffer.len();
        true
    }

    fn key_down(&mut self) -> bool {
        let Some(pos) = self.hist_pos else {
            return false;
        };
        if pos + 1 < self.history.len() {
            self.hist_pos = Some(pos + 1);
            self.buffer = self.history.get(pos + 1).unwrap_or_default().to_string();
        } else {
            self.hist_pos = None;
            self.buffer = self.saved_buffer.take().unwrap_or_default();
        }
        self.point = self.buffer.len();
        true
    }

    fn key_tab(&mut self, hooks: &mut dyn LineHooks) -> bool {
        if self.do_complete(hooks, true) {
            self.insert_text(" ");
            return true;
        }
        false
    }

    fn key_help(&mut self, hooks: &mut dyn LineHooks) -> bool {
        if self.is_quoting() {
            self.insert_text("?");
            return true;
        }
        self.term.crlf();
        hooks.context_help(&self.buffer.clone());
        self.term.crlf();
        self.reset_line_state();
        true
    }

    /// Space auto-completes an illegal line before self-inserting.
    fn key_space(&mut self, hooks: &mut dyn LineHooks) -> bool {
        if self.buffer.is_empty() {
            return true;
        }
        if self.is_quoting() {
            self.insert_text(" ");
            return true;
        }
        let status = hooks.line_status(&self.buffer.clone());
        let legal = matches!(status, ParseStatus::Ok | ParseStatus::Partial)
            && !self.buffer.ends_with(' ');
        if legal || self.do_complete(hooks, false) {
            self.insert_text(" ");
            return true;
        }
        false
    }

    fn key_hotkey(&mut self, code: u8, hooks: &mut dyn LineHooks) -> bool {
        let Some(cmd) = hooks.hotkey(code) else {
            return false;
        };
        self.replace_line(&cmd);
        self.redisplay();
        self.key_enter(hooks)
    }

    fn insert_byte(&mut self, byte: u8) -> bool {
        if !self.utf8 {
            // 8-bit mode: the byte is a Latin-1 character.
            self.insert_text(&(byte as char).to_string());
            return true;
        }
        if byte & 0x80 == 0 {
            self.insert_text(&(byte as char).to_string());
            return true;
        }
        self.pending.push(byte);
        if let Ok(text) = std::str::from_utf8(&self.pending.clone()) {
            self.insert_text(text);
            self.pending.clear();
        } else if self.pending.len() >= 6 {
            self.pending.clear();
        }
        true
    }

    fn handle_key(&mut self, key: u8, hooks: &mut dyn LineHooks) -> bool {
        match key {
            1 => {
                // ^A start of line
                self.point = 0;
                true
            }
            3 => self.key_interrupt(),
            4 => self.key_delete(),
            5 => {
                // ^E end of line
                self.point = self.buffer.len();
                true
            }
            8 | 127 => self.key_backspace(),
            9 => self.key_tab(hooks),
            10 | 13 => self.key_enter(hooks),
            11 => self.key_kill(),
            12 => self.key_clear_screen(),
            21 => self.key_erase_line(),
            23 => self.key_backword(),
            25 => self.key_yank(),
            b' ' => self.key_space(hooks),
            b'?' => self.key_help(hooks),
            key if key < 32 => self.key_hotkey(key, hooks),
            key => self.insert_byte(key),
        }
    }

    fn handle_escape(&mut self, seq: &str) -> bool {
        match escape_decode(seq) {
            EscapeCode::CursorUp => self.key_up(),
            EscapeCode::CursorDown => self.key_down(),
            EscapeCode::CursorLeft => self.key_left(),
            EscapeCode::CursorRight => self.key_right(),
            EscapeCode::Home => {
                self.point = 0;
                true
            }
            EscapeCode::End => {
                self.point = self.buffer.len();
                true
            }
            EscapeCode::Delete => self.key_delete(),
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Read loops
    // ------------------------------------------------------------------

    fn begin_line(&mut self) {
        self.buffer.clear();
        self.point = 0;
        self.hist_pos = None;
        self.saved_buffer = None;
        self.pending.clear();
        self.last = None;
        self.done = false;
        self.accepted = None;
    }

    /// Interactive read: raw mode, key dispatch, escape sequences.
    pub fn readline(&mut self, hooks: &mut dyn LineHooks) -> ReadResult {
        self.begin_line();
        self.term.set_raw_mode();
        self.reset_line_state();

        let mut esc_seq: Option<String> = None;

        while !self.done {
            let key = match self.term.getchar() {
                Key::Byte(b) => b,
                Key::Timeout => match hooks.timeout() {
                    TimeoutAction::Close => break,
                    TimeoutAction::Continue(timeout) => {
                        if let Some(timeout) = timeout {
                            self.term.set_timeout(timeout);
                        }
                        continue;
                    }
                },
                Key::Eof => break,
            };

            if let Some(timeout) = hooks.keypress(key) {
                self.term.set_timeout(timeout);
            }

            // Escape sequence collection.
            if esc_seq.is_none() && key == 27 {
                esc_seq = Some(String::new());
                continue;
            }
            if let Some(mut seq) = esc_seq.take() {
                if seq.len() >= 8 {
                    // Broken sequence; drop it.
                    continue;
                }
                seq.push(key as char);
                // ANSI terminator: a byte above '?' other than '['.
                if key != b'[' && key > 63 {
                    if !self.handle_escape(&seq) {
                        self.term.ding();
                    }
                    self.redisplay();
                } else {
                    esc_seq = Some(seq);
                }
                continue;
            }

            if !self.handle_key(key, hooks) {
                self.term.ding();
            }
            if self.done {
                break;
            }
            if self.pending.is_empty() {
                self.redisplay();
            }
        }

        self.term.restore_mode();

        match self.accepted.take() {
            Some(mut line) => {
                if line.ends_with(' ') {
                    line.pop();
                }
                ReadResult::Line(line)
            }
            None => ReadResult::Eof,
        }
    }

    /// Feed a prepared line through the enter logic without a terminal.
    pub fn forceline(&mut self, line: &str, hooks: &mut dyn LineHooks) -> ReadResult {
        self.begin_line();
        let trimmed = line.trim_end_matches(['\r', '\n']).trim_start();
        self.buffer = trimmed.to_string();
        self.point = self.buffer.len();

        // Echo the line as a prompt line would show it.
        if !self.buffer.is_empty() {
            let text = format!("{}{}\n", self.prompt, self.buffer);
            self.term.print(&text);
            self.term.flush();
        }

        if self.key_enter(hooks) && self.done {
            let mut line = self.accepted.take().unwrap_or_default();
            if line.ends_with(' ') {
                line.pop();
            }
            ReadResult::Line(line)
        } else {
            ReadResult::Error
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
