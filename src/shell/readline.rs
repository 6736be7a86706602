//! Readline Integration and Main Loop
//!
//! Maps the editor's hooks onto the shell: completion, enter
//! validation with auto-completion, contextual help, per-view hotkeys,
//! and the idle/watchdog timeout interplay. The driver loop reads from
//! the input source stack, falling back to the interactive terminal.

use super::context::Context;
use super::{execute, help, parse, EscapeContext, Shell, ShellState};
use crate::scheme::ParseStatus;
use crate::tinyrl::{EnterAction, LineHooks, ReadResult, TimeoutAction};

/// The editor-facing side of the shell.
pub struct ShellHooks<'a> {
    pub shell: &'a mut Shell,
}

impl ShellHooks<'_> {
    fn syntax_message(&mut self, line: &str, status: ParseStatus) -> String {
        let reason = match status {
            ParseStatus::BadHistory => "Bad history entry",
            ParseStatus::BadCmd => "Illegal command line",
            ParseStatus::BadParam => "Illegal parameter",
            ParseStatus::Partial => "The command is not completed",
            ParseStatus::Ok => "Unknown problem",
        };
        match self.shell.current_file() {
            Some(file) => format!(
                "Syntax error on line {}:{} \"{}\": {}",
                file.name(),
                file.line,
                line,
                reason
            ),
            None => format!("Syntax error: {}", reason),
        }
    }

    /// Try to repair an unresolvable line by completing its last word.
    fn completed_line(&mut self, line: &str) -> Option<String> {
        let candidates = help::completions(self.shell, line, line.len());
        if candidates.is_empty() {
            return None;
        }
        let mut unique: Vec<&String> = Vec::new();
        for cand in &candidates {
            if !unique.iter().any(|u| u.eq_ignore_ascii_case(cand)) {
                unique.push(cand);
            }
        }
        if unique.len() != 1 {
            return None;
        }
        let word_start = line
            .rfind(|c: char| c.is_whitespace())
            .map(|i| i + 1)
            .unwrap_or(0);
        let mut fixed = line[..word_start].to_string();
        fixed.push_str(unique[0]);
        (fixed != line).then_some(fixed)
    }
}

impl LineHooks for ShellHooks<'_> {
    fn complete(&mut self, line: &str, _start: usize, end: usize) -> Vec<String> {
        help::completions(self.shell, line, end)
    }

    fn on_enter(&mut self, line: &str, isatty: bool) -> EnterAction {
        if self.shell.resolve_command(line).is_none() {
            // Try to auto-complete the trailing word into a command.
            if let Some(fixed) = self.completed_line(line) {
                if self.shell.resolve_command(&fixed).is_some() {
                    let (_, _, status) = parse::parse_line(self.shell, &fixed);
                    if status == ParseStatus::Ok {
                        return EnterAction::AcceptReplaced(fixed);
                    }
                    if isatty {
                        return EnterAction::Replace(format!("{} ", fixed));
                    }
                    return EnterAction::Reject(Some(self.syntax_message(&fixed, status)));
                }
                if isatty {
                    return EnterAction::Replace(format!("{} ", fixed));
                }
            }
            if isatty {
                return EnterAction::Reject(None);
            }
            return EnterAction::Reject(Some(self.syntax_message(line, ParseStatus::BadCmd)));
        }

        let (_, _, status) = parse::parse_line(self.shell, line);
        match status {
            ParseStatus::Ok => EnterAction::Accept,
            status => EnterAction::Reject(Some(self.syntax_message(line, status))),
        }
    }

    fn line_status(&mut self, line: &str) -> ParseStatus {
        if self.shell.resolve_command(line).is_none() {
            return ParseStatus::BadCmd;
        }
        let (_, _, status) = parse::parse_line(self.shell, line);
        status
    }

    fn context_help(&mut self, line: &str) {
        help::print_help(self.shell, line);
    }

    fn hotkey(&mut self, code: u8) -> Option<String> {
        let mut cmd = None;
        if let Some(depth) = self.shell.depth() {
            for level in (0..=depth).rev() {
                let found = self
                    .shell
                    .pwd_at(level)
                    .and_then(|pwd| self.shell.find_view(&pwd.view))
                    .and_then(|view| view.find_hotkey(code));
                if found.is_some() {
                    cmd = found;
                    break;
                }
            }
        }
        if cmd.is_none() {
            cmd = self.shell.global().find_hotkey(code);
        }
        let cmd = cmd?;
        self.shell
            .expand(&cmd, EscapeContext::None, &Context::new())
    }

    fn timeout(&mut self) -> TimeoutAction {
        if !self.shell.wdog_active {
            eprintln!("Warning: Idle timeout. The session will be closed.");
            return TimeoutAction::Close;
        }
        // Watchdog fired: run its command once, rearm the idle timeout.
        if let Some(cmd) = self.shell.wdog_cmd() {
            let mut context = Context::with_cmd(cmd, crate::scheme::Pargv::new());
            execute::execute(self.shell, &mut context);
        }
        self.shell.wdog_active = false;
        TimeoutAction::Continue(Some(self.shell.idle_timeout()))
    }

    fn keypress(&mut self, _key: u8) -> Option<u32> {
        if self.shell.wdog_active {
            self.shell.wdog_active = false;
            return Some(self.shell.idle_timeout());
        }
        None
    }
}

/// Render the current prompt: the view prompt wrapped in the
/// `_PROMPT_PREFIX`/`_PROMPT_SUFFIX` variables.
pub fn renew_prompt(shell: &mut Shell) {
    let view_prompt = shell
        .current_view()
        .and_then(|v| v.prompt())
        .unwrap_or_default();
    let template = format!("${{_PROMPT_PREFIX}}{}${{_PROMPT_SUFFIX}}", view_prompt);
    let prompt = shell
        .expand(&template, EscapeContext::None, &Context::new())
        .unwrap_or_default();
    if let Some(editor) = shell.editor.as_mut() {
        editor.set_prompt(&prompt);
    }
}

/// Read and execute one line from the editor or a forced source line.
/// Returns false when the session is over.
fn exec_one(shell: &mut Shell, forced: Option<String>) -> bool {
    renew_prompt(shell);

    let Some(mut editor) = shell.editor.take() else {
        return false;
    };
    shell.term_size = (editor.width(), editor.height());
    let isatty = editor.isatty();

    let result = {
        let mut hooks = ShellHooks {
            shell: &mut *shell,
        };
        match &forced {
            Some(line) => editor.forceline(line, &mut hooks),
            None => editor.readline(&mut hooks),
        }
    };

    if isatty && forced.is_none() {
        if let ReadResult::Line(line) = &result {
            if !line.is_empty() {
                editor.history_mut().add(line);
            }
        }
    }
    shell.editor = Some(editor);

    match result {
        ReadResult::Line(line) => {
            shell.set_state(ShellState::Ok);
            if !line.is_empty() {
                let state = execute::execute_line(shell, &line);
                shell.set_state(state);
            }
            true
        }
        ReadResult::Error => {
            shell.set_state(ShellState::SyntaxError);
            true
        }
        ReadResult::Eof => {
            shell.set_state(ShellState::Eof);
            false
        }
    }
}

/// The main loop: drain stacked sources, then (on a terminal) serve
/// the interactive session until EOF or close. A clean exit returns
/// Ok; a stop-on-error abort returns the failing state.
pub fn run_loop(shell: &mut Shell) -> ShellState {
    loop {
        if shell.state() == ShellState::Closing {
            return ShellState::Ok;
        }

        if shell.has_files() {
            let (line, stop_on_error) = match shell.current_file() {
                Some(src) => (src.next_line(), src.stop_on_error),
                None => (None, false),
            };
            let Some(line) = line else {
                if !shell.pop_file() && !shell.term_isatty() {
                    return ShellState::Ok;
                }
                continue;
            };
            if line.trim().is_empty() {
                continue;
            }
            exec_one(shell, Some(line));
            match shell.state() {
                ShellState::Closing => return ShellState::Ok,
                state @ (ShellState::ScriptError | ShellState::SyntaxError)
                    if stop_on_error =>
                {
                    // Abandon the failing file; surface the state when
                    // nothing else can take over.
                    if !shell.pop_file() && !shell.term_isatty() {
                        return state;
                    }
                }
                _ => {}
            }
            continue;
        }

        // Interactive session.
        if !exec_one(shell, None) {
            return ShellState::Ok;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
