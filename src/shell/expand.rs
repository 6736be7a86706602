//! Variable Expansion
//!
//! `${...}` substitution over command templates, prompts, patterns and
//! action scripts. Inside the braces a colon-separated list of
//! alternatives is tried; modifier characters before a variable name
//! control quoting and escaping. The escape table applied to expanded
//! values depends on the target context: action scripts, regex
//! patterns, or none.

use indexmap::IndexMap;

use super::context::Context;
use super::{execute, Shell};
use crate::argv::{self, Argv};
use crate::scheme::Param;

/// Characters escaped when expanding into an action script.
pub const ESC_DEFAULT: &str = "`|$<>&()#;\\\"!";
/// Characters escaped when expanding into a regex pattern.
pub const ESC_REGEX: &str = "^$.*+[](){}";
/// Characters always escaped inside double quotes.
pub const ESC_QUOTED: &str = "\\\"";

/// Target context of an expansion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscapeContext {
    None,
    Action,
    Regex,
}

/// Modifier flags parsed from the characters before a variable name.
#[derive(Debug, Clone, Copy, Default)]
struct Modifiers {
    /// Quote the value when it contains spaces.
    quote: bool,
    /// Apply the internal (quote) escape set.
    internal_escape: bool,
    /// Apply the context escape table.
    context_escape: bool,
    /// Strip the internal set from the context table (automatic vars).
    drop_internal: bool,
}

impl Modifiers {
    fn parse(word: &str) -> (Self, &str) {
        let mut mods = Self {
            quote: false,
            internal_escape: false,
            context_escape: true,
            drop_internal: false,
        };
        let bytes = word.as_bytes();
        let mut i = 0;
        while i < bytes.len() && !bytes[i].is_ascii_alphabetic() {
            match bytes[i] {
                b'#' => {
                    mods.quote = true;
                    mods.internal_escape = true;
                }
                b'\\' => mods.internal_escape = true,
                b'!' => {
                    mods.quote = true;
                    mods.internal_escape = true;
                    mods.context_escape = false;
                }
                b'~' => {
                    mods.internal_escape = true;
                    mods.context_escape = false;
                }
                b'^' => {
                    mods.quote = false;
                    mods.internal_escape = false;
                    mods.context_escape = false;
                }
                b'_' if bytes.get(i + 1) == Some(&b'_') => {
                    // Automatic variable: ${__line} reads _line with the
                    // internal escapes removed from the context table.
                    mods.drop_internal = true;
                    i += 1;
                    break;
                }
                _ => break,
            }
            i += 1;
        }
        (mods, &word[i..])
    }
}

fn escape_table(escape: EscapeContext, context: &Context) -> Option<String> {
    match escape {
        EscapeContext::None => None,
        EscapeContext::Action => Some(
            context
                .cmd
                .as_ref()
                .and_then(|c| c.escape_chars().map(str::to_string))
                .unwrap_or_else(|| ESC_DEFAULT.to_string()),
        ),
        EscapeContext::Regex => Some(
            context
                .cmd
                .as_ref()
                .and_then(|c| c.regex_chars().map(str::to_string))
                .unwrap_or_else(|| ESC_REGEX.to_string()),
        ),
    }
}

/// Expand every `${...}` group of the string. Returns None for an
/// empty input; a non-terminated group drops the rest of the string.
pub fn expand(
    shell: &mut Shell,
    text: &str,
    escape: EscapeContext,
    context: &Context,
) -> Option<String> {
    let escape_chars = escape_table(escape, context);
    let mut result: Option<String> = None;
    let mut rest = text;

    while !rest.is_empty() {
        if let Some(stripped) = rest.strip_prefix("${") {
            let Some(close) = stripped.find('}') else {
                break;
            };
            let group = &stripped[..close];
            rest = &stripped[close + 1..];
            let seg = expand_group(shell, group, escape_chars.as_deref(), context);
            result.get_or_insert_with(String::new).push_str(&seg);
        } else {
            let next = rest.find("${").unwrap_or(rest.len());
            result
                .get_or_insert_with(String::new)
                .push_str(&rest[..next]);
            rest = &rest[next..];
        }
    }

    result
}

/// One `${...}` group: try each `:`-separated word; words that expand
/// contribute their value, words that don't contribute their literal
/// text. A group where nothing expanded yields the empty string.
fn expand_group(
    shell: &mut Shell,
    group: &str,
    escape_chars: Option<&str>,
    context: &Context,
) -> String {
    let mut out = String::new();
    let mut valid = false;

    for word in group.split(':') {
        let (mods, name) = Modifiers::parse(word);

        let Some(value) = expand_var(shell, name, context) else {
            out.push_str(name);
            continue;
        };
        valid = true;

        let mut table = String::new();
        if let Some(chars) = escape_chars {
            if mods.context_escape {
                if mods.drop_internal {
                    table.extend(chars.chars().filter(|c| !ESC_QUOTED.contains(*c)));
                } else {
                    table.push_str(chars);
                }
            }
        }
        if mods.internal_escape {
            table.push_str(ESC_QUOTED);
        }

        let escaped = if table.is_empty() {
            value.clone()
        } else {
            argv::encode(&value, &table)
        };

        let needs_quotes = mods.quote && value.contains(' ');
        if needs_quotes {
            out.push('"');
        }
        out.push_str(&escaped);
        if needs_quotes {
            out.push('"');
        }
    }

    if valid {
        out
    } else {
        String::new()
    }
}

/// Resolve one variable name through the lookup order: parsed
/// arguments, parameter defaults, view-id bindings, context-fixed
/// variables, global variables, the process environment.
pub fn expand_var(shell: &mut Shell, name: &str, context: &Context) -> Option<String> {
    if name.is_empty() {
        return None;
    }

    if let Some(pargv) = &context.pargv {
        if let Some(parg) = pargv.find(name) {
            return Some(parg.value().to_string());
        }
    }

    if let Some(cmd) = &context.cmd {
        if let Some(defval) = find_default(&cmd.params(), name) {
            return Some(defval);
        }
    }

    if let Some(depth) = shell.depth() {
        let stored = shell
            .pwd_at(depth)
            .and_then(|pwd| pwd.viewid.get(name).cloned());
        if let Some(stored) = stored {
            return Some(expand(shell, &stored, EscapeContext::None, context).unwrap_or_default());
        }
    }

    if let Some(value) = find_context_var(shell, name, context) {
        return Some(value);
    }

    if let Some(value) = find_global_var(shell, name, context) {
        return Some(value);
    }

    std::env::var(name).ok()
}

/// Recursive default-value search over a parameter vector.
fn find_default(params: &[std::rc::Rc<Param>], name: &str) -> Option<String> {
    for param in params {
        if param.name() == name {
            if let Some(defval) = param.defval() {
                return Some(defval.to_string());
            }
        }
        if let Some(found) = find_default(&param.params(), name) {
            return Some(found);
        }
    }
    None
}

/// The fixed-name variables bound to the current context.
fn find_context_var(shell: &mut Shell, name: &str, context: &Context) -> Option<String> {
    if name.eq_ignore_ascii_case("_width") {
        return Some(shell.term_width().to_string());
    }
    if name.eq_ignore_ascii_case("_height") {
        return Some(shell.term_height().to_string());
    }
    if name.eq_ignore_ascii_case("_watchdog_timeout") {
        return Some(shell.wdog_timeout().to_string());
    }

    let cmd = context.cmd.clone()?;

    if name.eq_ignore_ascii_case("_full_cmd") {
        return Some(cmd.name().to_string());
    }
    if name.eq_ignore_ascii_case("_cmd") || name.eq_ignore_ascii_case("_orig_cmd") {
        return Some(cmd.orig_name().to_string());
    }
    if name.eq_ignore_ascii_case("_line") {
        return Some(cmd_line(context, false));
    }
    if name.eq_ignore_ascii_case("_full_line") {
        return Some(cmd_line(context, true));
    }
    if name.eq_ignore_ascii_case("_params") {
        return params_line(context);
    }
    if name.eq_ignore_ascii_case("_interactive") {
        return Some(if shell.interactive() { "1" } else { "0" }.to_string());
    }
    if name.eq_ignore_ascii_case("_isatty") {
        return Some(if shell.term_isatty() { "1" } else { "0" }.to_string());
    }
    if name.eq_ignore_ascii_case("_pid") {
        return Some(std::process::id().to_string());
    }
    if let Some(idx) = name
        .to_lowercase()
        .strip_prefix("_prefix")
        .and_then(|n| n.parse::<usize>().ok())
    {
        let full_words = argv::word_count(cmd.name());
        let orig_words = argv::word_count(cmd.orig_name());
        let pnum = full_words.saturating_sub(orig_words);
        if idx < pnum {
            return Argv::new(cmd.name()).get(idx).map(str::to_string);
        }
        return None;
    }
    if name.eq_ignore_ascii_case("_cur_depth") {
        let depth = shell.depth().map(|d| d as i64).unwrap_or(-1);
        return Some(depth.to_string());
    }
    if name.eq_ignore_ascii_case("_cur_pwd") {
        let depth = shell.depth()?;
        let pwd = shell.pwd_full(depth)?;
        let quoted: Vec<String> = pwd.iter().map(|l| format!("\"{}\"", l)).collect();
        return Some(quoted.join(" "));
    }

    None
}

/// Global variable lookup. Static variables serve and refresh their
/// cached value; dynamic variables recompute each time.
fn find_global_var(shell: &mut Shell, name: &str, context: &Context) -> Option<String> {
    let var = shell.find_var(name)?;

    if !var.dynamic() {
        if let Some(saved) = var.saved() {
            return Some(saved);
        }
    }

    let mut result = match var.value() {
        Some(value) => expand(shell, &value, EscapeContext::None, context),
        None => None,
    };

    if result.is_none() {
        let action = var.action().borrow().clone();
        if action.script().is_some() || action.builtin().is_some() {
            let mut ctx = context.clone();
            ctx.action = Some(action);
            let output = execute::exec_action(shell, &ctx, false, true);
            if output.retcode == 0 {
                result = output.out;
            }
        }
    }

    if !var.dynamic() {
        if let Some(value) = &result {
            var.set_saved(value);
        }
    }

    result
}

/// The entered line recomputed from the parsed command: the command
/// name (original name unless `full`) followed by the visible
/// parameter values, quoted where needed.
pub fn cmd_line(context: &Context, full: bool) -> String {
    let Some(cmd) = &context.cmd else {
        return String::new();
    };
    let mut line = if full {
        cmd.name().to_string()
    } else {
        cmd.orig_name().to_string()
    };
    if let Some(params) = params_line(context) {
        if !params.is_empty() {
            line.push(' ');
            line.push_str(&params);
        }
    }
    line
}

/// Visible parameter values, escaped and quoted for re-parsing.
fn params_line(context: &Context) -> Option<String> {
    let pargv = context.pargv.as_ref()?;
    let mut parts = Vec::new();
    for parg in pargv.iter() {
        if parg.param().hidden() {
            continue;
        }
        let escaped = argv::encode(parg.value(), ESC_QUOTED);
        if parg.value().contains(' ') {
            parts.push(format!("\"{}\"", escaped));
        } else {
            parts.push(escaped);
        }
    }
    Some(parts.join(" "))
}

/// Seed view-id bindings from an expanded `NAME=VALUE;...` template.
pub fn expand_viewid(
    shell: &mut Shell,
    template: &str,
    context: &Context,
) -> IndexMap<String, String> {
    let mut map = IndexMap::new();
    let Some(expanded) = expand(shell, template, EscapeContext::None, context) else {
        return map;
    };
    for pair in expanded.split(';') {
        if let Some((name, value)) = pair.split_once('=') {
            map.insert(name.to_string(), value.to_string());
        }
    }
    map
}

/// Replace a leading `~` with the user's home directory.
pub fn tilde_expand(path: &str) -> String {
    if let Some(rest) = path.strip_prefix('~') {
        if rest.is_empty() || rest.starts_with('/') {
            if let Ok(home) = std::env::var("HOME") {
                return format!("{}{}", home, rest);
            }
        }
    }
    path.to_string()
}

// ============================================================================
// Tests
// ============================================================================
