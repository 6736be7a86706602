//! Builtin Plugin
//!
//! The framework's own plugin: the default script executor, the
//! access/config/log hooks, and the navigation and housekeeping
//! symbols the default schemes rely on.

use std::io::Read;
use std::process::{Command, Stdio};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{info, warn};

use super::{ActionOutput, Plugin, SymApi, SymFn, SymType};
use crate::konf::{QueryBuilder, QueryOp};
use crate::scheme::ConfigOp;
use crate::shell::context::Context;
use crate::shell::{EscapeContext, Shell, ShellState};

/// Bound on captured action output.
pub const STDOUT_MAXBUF: usize = 64 * 1024;

static SCRIPT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Register the builtin `clish` plugin symbols.
pub fn init_clish(plugin: &mut Plugin) {
    plugin.add_sym(
        "clish_hook_access",
        SymType::Access,
        SymApi::Simple,
        true,
        SymFn::Access(Rc::new(hook_access)),
    );
    plugin.add_sym(
        "clish_hook_config",
        SymType::Config,
        SymApi::Simple,
        true,
        SymFn::Config(Rc::new(hook_config)),
    );
    plugin.add_sym(
        "clish_hook_log",
        SymType::Log,
        SymApi::Simple,
        true,
        SymFn::Log(Rc::new(hook_log)),
    );

    let psym = |plugin: &mut Plugin, name: &str, f: SymFn| {
        plugin.add_sym(name, SymType::Action, SymApi::Simple, true, f);
    };
    psym(plugin, "clish_close", SymFn::Action(Rc::new(sym_close)));
    psym(plugin, "clish_overview", SymFn::Action(Rc::new(sym_overview)));
    psym(plugin, "clish_source", SymFn::Action(Rc::new(sym_source)));
    psym(
        plugin,
        "clish_source_nostop",
        SymFn::Action(Rc::new(sym_source_nostop)),
    );
    psym(plugin, "clish_history", SymFn::Action(Rc::new(sym_history)));
    psym(plugin, "clish_nested_up", SymFn::Action(Rc::new(sym_nested_up)));
    psym(plugin, "clish_nop", SymFn::Action(Rc::new(sym_nop)));
    psym(plugin, "clish_wdog", SymFn::Action(Rc::new(sym_wdog)));

    // The default script executor is suppressed by dry-run.
    plugin.add_sym(
        "clish_script",
        SymType::Action,
        SymApi::Stdout,
        false,
        SymFn::Action(Rc::new(sym_script)),
    );
}

// ----------------------------------------------------------------------
// Hooks
// ----------------------------------------------------------------------

/// Group-based access check: the access string is a colon-separated
/// list of group names; `*` matches everyone. The user must belong to
/// at least one named group.
pub fn hook_access(_shell: &Shell, access: &str) -> bool {
    let groups = user_groups();
    access.split(':').any(|wanted| {
        if wanted == "*" {
            return true;
        }
        groups.iter().any(|g| g == wanted)
    })
}

fn user_groups() -> Vec<String> {
    let mut names = Vec::new();
    unsafe {
        let count = libc::getgroups(0, std::ptr::null_mut());
        if count <= 0 {
            return names;
        }
        let mut gids = vec![0 as libc::gid_t; count as usize];
        let count = libc::getgroups(count, gids.as_mut_ptr());
        if count <= 0 {
            return names;
        }
        gids.truncate(count as usize);
        for gid in gids {
            let grp = libc::getgrgid(gid);
            if grp.is_null() {
                continue;
            }
            let name = std::ffi::CStr::from_ptr((*grp).gr_name);
            names.push(name.to_string_lossy().into_owned());
        }
    }
    names
}

/// Compose and dispatch the configuration query attached to the
/// command, then print any dump stream.
pub fn hook_config(shell: &mut Shell, context: &Context) -> i32 {
    if shell.client().is_none() {
        return 0;
    }
    let Some(cmd) = context.cmd.clone() else {
        return 0;
    };
    let config = cmd.config().borrow().clone();
    let op = config.op();

    let mut builder = QueryBuilder::new();
    match op {
        ConfigOp::None => return 0,
        ConfigOp::Set => {
            builder = builder.op(QueryOp::Set);
            let line = shell.cmd_line(context);
            builder = builder.line(&line);
            if !config.splitter() {
                builder = builder.no_splitter();
            }
            if !config.unique() {
                builder = builder.non_unique();
            }
        }
        ConfigOp::Unset => {
            builder = builder.op(QueryOp::Unset);
        }
        ConfigOp::Dump => {
            builder = builder.op(QueryOp::Dump);
            if let Some(file) = config.file() {
                let path = shell
                    .expand(file, EscapeContext::Action, context)
                    .filter(|p| !p.is_empty())
                    .unwrap_or_else(|| "/tmp/running-config".to_string());
                builder = builder.file(&path);
            }
        }
    }

    if matches!(op, ConfigOp::Set | ConfigOp::Unset) {
        let Some(pattern) = config.pattern() else {
            return -1;
        };
        let Some(pattern) = shell.expand(pattern, EscapeContext::Regex, context) else {
            return -1;
        };
        builder = builder.pattern(&pattern);
    }

    builder = builder.priority(config.priority());

    if let Some(seq) = config.seq() {
        let num = shell
            .expand(seq, EscapeContext::Action, context)
            .and_then(|s| s.trim().parse::<u16>().ok())
            .unwrap_or(0);
        builder = builder.seq(num);
    }

    // Pwd scope: an explicit depth expression overrides the command's
    // view depth.
    let depth = match config.depth() {
        Some(expr) => shell
            .expand(expr, EscapeContext::Action, context)
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(0),
        None => shell.cmd_depth(&cmd),
    };
    if let Some(pwd) = shell.pwd_full(depth) {
        builder = builder.pwd(&pwd);
    }

    let request = builder.build();
    let result = match shell.client_mut() {
        Some(client) => client.request(&request),
        None => return 0,
    };
    match result {
        Ok(Some(stream)) if op == ConfigOp::Dump => {
            shell.print(&stream);
            0
        }
        Ok(_) => 0,
        Err(e) => {
            eprintln!("Error: The request to the config daemon failed: {}", e);
            0
        }
    }
}

/// Command logging through the tracing subscriber.
pub fn hook_log(shell: &Shell, _context: &Context, line: &str, retcode: i32) -> i32 {
    if line.is_empty() {
        // Initialization call.
        return 0;
    }
    info!(user = %shell.user_name(), line = line, retcode = retcode, "command");
    0
}

// ----------------------------------------------------------------------
// Action symbols
// ----------------------------------------------------------------------

/// Default script executor: the expanded ACTION text runs under its
/// shebang from a private temporary file.
pub fn sym_script(
    shell: &mut Shell,
    context: &Context,
    script: &str,
    need_out: bool,
) -> ActionOutput {
    if script.is_empty() {
        return ActionOutput::ok();
    }

    let shebang = context
        .action
        .as_ref()
        .and_then(|a| a.shebang().map(str::to_string))
        .unwrap_or_else(|| shell.default_shebang().to_string());

    let path = std::env::temp_dir().join(format!(
        "clish.script.{}.{}",
        std::process::id(),
        SCRIPT_SEQ.fetch_add(1, Ordering::Relaxed)
    ));
    if let Err(e) = std::fs::write(&path, script) {
        eprintln!("Error: Can't write the ACTION script: {}", e);
        return ActionOutput::code(-1);
    }

    let mut parts = shebang.split_whitespace();
    let program = parts.next().unwrap_or("/bin/sh");
    let mut command = Command::new(program);
    command.args(parts).arg(&path);

    let output = if need_out {
        command.stdout(Stdio::piped());
        match command.spawn() {
            Ok(mut child) => {
                let mut captured = Vec::new();
                if let Some(stdout) = child.stdout.take() {
                    let _ = stdout.take(STDOUT_MAXBUF as u64).read_to_end(&mut captured);
                }
                match child.wait() {
                    Ok(status) => ActionOutput::with_out(
                        status.code().unwrap_or(-1),
                        String::from_utf8_lossy(&captured).into_owned(),
                    ),
                    Err(_) => ActionOutput::code(-1),
                }
            }
            Err(e) => {
                eprintln!("Error: Can't execute {}: {}", program, e);
                ActionOutput::code(-1)
            }
        }
    } else {
        match command.status() {
            Ok(status) => ActionOutput::code(status.code().unwrap_or(-1)),
            Err(e) => {
                eprintln!("Error: Can't execute {}: {}", program, e);
                ActionOutput::code(-1)
            }
        }
    };

    let _ = std::fs::remove_file(&path);
    output
}

fn sym_close(shell: &mut Shell, _ctx: &Context, _script: &str, _out: bool) -> ActionOutput {
    shell.set_state(ShellState::Closing);
    ActionOutput::ok()
}

fn sym_overview(shell: &mut Shell, _ctx: &Context, _script: &str, _out: bool) -> ActionOutput {
    if let Some(overview) = shell.overview() {
        shell.print(&format!("{}\n", overview));
    }
    ActionOutput::ok()
}

fn source_file(shell: &mut Shell, script: &str, stop_on_error: bool) -> ActionOutput {
    let fname = script.trim();
    if fname.is_empty() {
        return ActionOutput::code(-1);
    }
    match shell.push_file(fname, stop_on_error) {
        Ok(()) => ActionOutput::ok(),
        Err(e) => {
            eprintln!("Error: Can't open file {}: {}", fname, e);
            ActionOutput::code(-1)
        }
    }
}

/// Execute a command file, stopping at the first failed line.
fn sym_source(shell: &mut Shell, _ctx: &Context, script: &str, _out: bool) -> ActionOutput {
    source_file(shell, script, true)
}

/// Execute a command file, continuing past failures.
fn sym_source_nostop(shell: &mut Shell, _ctx: &Context, script: &str, _out: bool) -> ActionOutput {
    source_file(shell, script, false)
}

fn sym_history(shell: &mut Shell, _ctx: &Context, script: &str, _out: bool) -> ActionOutput {
    if let Ok(stifle) = script.trim().parse::<usize>() {
        shell.stifle_history(stifle);
    }
    let listing = shell.history_listing();
    shell.print(&listing);
    ActionOutput::ok()
}

/// Leave the current nested level; from the top level, close the shell.
fn sym_nested_up(shell: &mut Shell, _ctx: &Context, _script: &str, _out: bool) -> ActionOutput {
    match shell.depth() {
        Some(depth) if depth > 0 => {
            shell.set_depth(depth - 1);
        }
        _ => shell.set_state(ShellState::Closing),
    }
    ActionOutput::ok()
}

fn sym_nop(_shell: &mut Shell, _ctx: &Context, _script: &str, _out: bool) -> ActionOutput {
    ActionOutput::ok()
}

/// Arm or change the watchdog timeout (seconds; 0 disarms).
fn sym_wdog(shell: &mut Shell, _ctx: &Context, script: &str, _out: bool) -> ActionOutput {
    match script.trim().parse::<u32>() {
        Ok(timeout) => {
            shell.set_wdog_timeout(timeout);
            ActionOutput::ok()
        }
        Err(_) => {
            warn!(script = script, "bad watchdog timeout");
            ActionOutput::code(-1)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_registers_symbols() {
        let mut plugin = Plugin::new("clish");
        init_clish(&mut plugin);
        for name in [
            "clish_close",
            "clish_overview",
            "clish_source",
            "clish_source_nostop",
            "clish_history",
            "clish_nested_up",
            "clish_nop",
            "clish_wdog",
            "clish_script",
        ] {
            assert!(
                plugin.get_sym(name, SymType::Action).is_some(),
                "missing {}",
                name
            );
        }
        assert!(plugin.get_sym("clish_hook_access", SymType::Access).is_some());
        assert!(plugin.get_sym("clish_hook_config", SymType::Config).is_some());
        assert!(plugin.get_sym("clish_hook_log", SymType::Log).is_some());
    }

    #[test]
    fn test_script_sym_is_not_permanent() {
        let mut plugin = Plugin::new("clish");
        init_clish(&mut plugin);
        let script = plugin.get_sym("clish_script", SymType::Action).unwrap();
        assert!(!script.permanent());
        assert_eq!(script.api(), SymApi::Stdout);
        let close = plugin.get_sym("clish_close", SymType::Action).unwrap();
        assert!(close.permanent());
    }

    #[test]
    fn test_access_wildcard() {
        let shell = Shell::for_tests();
        assert!(hook_access(&shell, "*"));
        assert!(hook_access(&shell, "nosuchgroup:*"));
        assert!(!hook_access(&shell, "nosuchgroup_zz"));
    }

    #[test]
    fn test_script_execution() {
        let mut shell = Shell::for_tests();
        let ctx = Context::default();
        let out = sym_script(&mut shell, &ctx, "exit 3", false);
        assert_eq!(out.retcode, 3);
        let out = sym_script(&mut shell, &ctx, "echo hello", true);
        assert_eq!(out.retcode, 0);
        assert_eq!(out.out.as_deref(), Some("hello\n"));
    }

    #[test]
    fn test_script_empty_is_ok() {
        let mut shell = Shell::for_tests();
        let out = sym_script(&mut shell, &Context::default(), "", true);
        assert_eq!(out.retcode, 0);
        assert!(out.out.is_none());
    }
}
