//! Completion and Contextual Help
//!
//! Enumerates command and parameter candidates for the TAB and `?`
//! surfaces. Commands come from the current and global views (with
//! namespace visibility applied); parameters come from the matcher's
//! candidate collection at the insertion point.

use std::rc::Rc;

use super::context::Context;
use super::{parse, EscapeContext, Shell};
use crate::argv::{self, Argv};
use crate::scheme::{Command, Param, ParamMode, Pargv, ParseStatus, Visibility};

/// Commands whose names can continue the line, across the current view
/// and the global view, sorted and deduplicated by name.
pub fn command_completions(shell: &Shell, line: &str, field: Visibility) -> Vec<Rc<Command>> {
    let mut out = Vec::new();
    if let Some(view) = shell.current_view() {
        view.collect_completions(line, field, true, shell.views(), &mut out);
    }
    shell
        .global()
        .collect_completions(line, field, true, shell.views(), &mut out);

    out.sort_by(|a, b| a.name().to_lowercase().cmp(&b.name().to_lowercase()));
    out.dedup_by(|a, b| a.name().eq_ignore_ascii_case(b.name()));
    out
}

/// The parameters that could appear at the insertion point of the
/// line, together with the arguments parsed so far.
pub fn param_candidates(
    shell: &mut Shell,
    cmd: &Rc<Command>,
    line: &str,
) -> (Vec<Rc<Param>>, Pargv) {
    let name_words = argv::word_count(cmd.name());
    let mut index = argv::word_count(line).saturating_sub(name_words);
    if index != 0 && !line.ends_with(|c: char| c.is_whitespace()) {
        // The last word is still being typed.
        index -= 1;
    }

    let argv = Argv::new(line);
    let mut idx = name_words;
    let mut pargv = Pargv::new();
    let mut candidates = Vec::new();
    parse::parse_pargv(
        shell,
        &mut pargv,
        cmd,
        &cmd.params(),
        &argv,
        &mut idx,
        Some(&mut candidates),
        index + name_words,
        true,
    );
    (candidates, pargv)
}

/// Completion words for the parameter under the cursor: subcommand
/// literals, `completion` expression output, and select-type values.
pub fn param_completions(shell: &mut Shell, cmd: &Rc<Command>, line: &str, word: &str) -> Vec<String> {
    let mut matches = Vec::new();
    let at_param = argv::word_count(line) > argv::word_count(cmd.name())
        || line.ends_with(|c: char| c.is_whitespace());
    if !at_param {
        return matches;
    }

    let (candidates, pargv) = param_candidates(shell, cmd, line);
    for param in candidates {
        if let Some(args) = cmd.args() {
            if args.name() == param.name() {
                continue;
            }
        }
        match param.mode() {
            ParamMode::Switch => continue,
            ParamMode::Subcommand => {
                matches.push(param.value().to_string());
            }
            ParamMode::Common => {}
        }
        if let Some(expr) = param.completion() {
            let expr = expr.to_string();
            let context = Context {
                cmd: Some(cmd.clone()),
                pargv: Some(pargv.clone()),
                action: None,
            };
            if let Some(output) = shell.expand(&expr, EscapeContext::Action, &context) {
                for token in output.split_whitespace() {
                    if token.starts_with(word) {
                        matches.push(token.to_string());
                    }
                }
            }
        }
        if let Some(ptype) = param.ptype() {
            matches.extend(ptype.word_generator(word));
        }
    }
    matches
}

/// All completion candidates for the editor: command suffixes plus
/// parameter words for the resolved command.
pub fn completions(shell: &mut Shell, line: &str, end: usize) -> Vec<String> {
    let text = &line[..end.min(line.len())];
    let word_start = text
        .rfind(|c: char| c.is_whitespace())
        .map(|i| i + 1)
        .unwrap_or(0);
    let word = text[word_start..].to_string();
    let text = text.to_string();

    let mut matches: Vec<String> = command_completions(shell, &text, Visibility::Completion)
        .iter()
        .map(|cmd| cmd.suffix().to_string())
        .collect();

    if let Some(cmd) = shell.resolve_command(&text) {
        matches.extend(param_completions(shell, &cmd, &text, &word));
    }
    matches
}

/// One contextual help entry.
#[derive(Debug, Clone)]
pub struct HelpEntry {
    pub name: String,
    pub help: String,
    pub detail: Option<String>,
}

/// Build the `?` help table for the line: continuing commands, then
/// the parameters of the resolved command, then `<cr>` when the line
/// already parses.
pub fn help_entries(shell: &mut Shell, line: &str) -> Vec<HelpEntry> {
    let mut entries: Vec<HelpEntry> = command_completions(shell, line, Visibility::Help)
        .iter()
        .map(|cmd| HelpEntry {
            name: cmd.suffix().to_string(),
            help: cmd.text().unwrap_or("").to_string(),
            detail: cmd.detail(),
        })
        .collect();

    if let Some(cmd) = shell.resolve_command(line) {
        let (params, _) = param_candidates(shell, &cmd, line);
        let params = expand_switches(&params);
        for param in &params {
            push_param_help(param, &mut entries);
        }

        // A fully parsed line can be entered as-is.
        let (_, _, status) = parse::parse_line(shell, line);
        if status == ParseStatus::Ok {
            entries.push(HelpEntry {
                name: "<cr>".to_string(),
                help: String::new(),
                detail: None,
            });
        }
    }
    entries
}

fn expand_switches(params: &[Rc<Param>]) -> Vec<Rc<Param>> {
    let mut out = Vec::new();
    for param in params {
        if param.mode() == ParamMode::Switch {
            out.extend(param.params());
        } else {
            out.push(param.clone());
        }
    }
    out
}

fn push_param_help(param: &Rc<Param>, entries: &mut Vec<HelpEntry>) {
    let name = match param.mode() {
        ParamMode::Subcommand => param.value().to_string(),
        _ => param
            .ptype()
            .map(|p| p.text().unwrap_or(p.name()).to_string())
            .unwrap_or_else(|| param.name().to_string()),
    };
    let mut help = param.text().unwrap_or("").to_string();
    if let Some(range) = param.ptype().map(|p| p.range().to_string()) {
        if !range.is_empty() {
            help.push_str(&format!(" ({})", range));
        }
    }
    entries.push(HelpEntry {
        name,
        help,
        detail: None,
    });
}

/// Render the help table to the terminal stream.
pub fn print_help(shell: &mut Shell, line: &str) {
    let entries = help_entries(shell, line);
    if entries.is_empty() {
        return;
    }
    let width = entries.iter().map(|e| e.name.len()).max().unwrap_or(0);
    let mut out = String::new();
    for entry in &entries {
        out.push_str(&format!("  {:width$}  {}\n", entry.name, entry.help));
    }

    // A second `?` on the same line shows the single entry's detail.
    use super::ShellState;
    if entries.len() == 1 && shell.state() == ShellState::Helping {
        if let Some(detail) = &entries[0].detail {
            out.push_str(&format!("{}\n", detail));
        }
    }
    if shell.state() == ShellState::Helping {
        shell.set_state(ShellState::Ok);
    } else {
        shell.set_state(ShellState::Helping);
    }
    shell.print(&out);
}

// ============================================================================
// Tests
// ============================================================================
