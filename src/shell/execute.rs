//! Action Execution
//!
//! Runs a matched command: pre-transition for commands from other
//! views, the lockfile handshake, action invocation with dry-run and
//! signal discipline, the config and log hooks, and the view
//! transition on success.

use std::os::unix::io::RawFd;

use tracing::debug;

use super::context::Context;
use super::{EscapeContext, Shell, ShellState, LOCK_WAIT};
use crate::plugin::{ActionOutput, SymFn, SymType};
use crate::scheme::ViewRestore;

/// Scoped signal discipline for the lifetime of an action: SIGINT,
/// SIGQUIT and SIGHUP are caught-and-ignored in the shell, and for
/// non-interrupt actions additionally blocked so that child processes
/// inherit the block. Dropping restores the previous state.
struct SignalGuard {
    old_int: libc::sigaction,
    old_quit: libc::sigaction,
    old_hup: libc::sigaction,
    old_mask: Option<libc::sigset_t>,
}

extern "C" fn sig_swallow(_signo: libc::c_int) {}

impl SignalGuard {
    fn new(interrupt: bool) -> Self {
        unsafe {
            let mut sa: libc::sigaction = std::mem::zeroed();
            let handler: extern "C" fn(libc::c_int) = sig_swallow;
            sa.sa_sigaction = handler as usize;
            libc::sigemptyset(&mut sa.sa_mask);
            let mut old_int: libc::sigaction = std::mem::zeroed();
            let mut old_quit: libc::sigaction = std::mem::zeroed();
            let mut old_hup: libc::sigaction = std::mem::zeroed();
            libc::sigaction(libc::SIGINT, &sa, &mut old_int);
            libc::sigaction(libc::SIGQUIT, &sa, &mut old_quit);
            libc::sigaction(libc::SIGHUP, &sa, &mut old_hup);

            let old_mask = if !interrupt {
                let mut sigs: libc::sigset_t = std::mem::zeroed();
                libc::sigemptyset(&mut sigs);
                libc::sigaddset(&mut sigs, libc::SIGINT);
                libc::sigaddset(&mut sigs, libc::SIGQUIT);
                libc::sigaddset(&mut sigs, libc::SIGHUP);
                let mut old: libc::sigset_t = std::mem::zeroed();
                libc::sigprocmask(libc::SIG_BLOCK, &sigs, &mut old);
                Some(old)
            } else {
                None
            };

            Self {
                old_int,
                old_quit,
                old_hup,
                old_mask,
            }
        }
    }
}

impl Drop for SignalGuard {
    fn drop(&mut self) {
        unsafe {
            if let Some(old) = &self.old_mask {
                libc::sigprocmask(libc::SIG_SETMASK, old, std::ptr::null_mut());
            }
            libc::sigaction(libc::SIGINT, &self.old_int, std::ptr::null_mut());
            libc::sigaction(libc::SIGQUIT, &self.old_quit, std::ptr::null_mut());
            libc::sigaction(libc::SIGHUP, &self.old_hup, std::ptr::null_mut());
        }
    }
}

/// The administrative session lock: a non-blocking write lock on the
/// lockfile, polled once a second up to the retry budget.
pub struct LockFile {
    fd: RawFd,
}

impl LockFile {
    pub fn acquire(path: &str) -> Option<Self> {
        let cpath = std::ffi::CString::new(path).ok()?;
        let fd = unsafe {
            libc::open(
                cpath.as_ptr(),
                libc::O_WRONLY | libc::O_CREAT,
                0o644 as libc::c_uint,
            )
        };
        if fd < 0 {
            eprintln!("Warning: Can't open lockfile {}.", path);
            return None;
        }
        unsafe {
            libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
        }

        let mut lock: libc::flock = unsafe { std::mem::zeroed() };
        lock.l_type = libc::F_WRLCK as libc::c_short;
        lock.l_whence = libc::SEEK_SET as libc::c_short;

        for attempt in 0..LOCK_WAIT {
            let res = unsafe { libc::fcntl(fd, libc::F_SETLK, &lock) };
            if res != -1 {
                return Some(Self { fd });
            }
            let errno = std::io::Error::last_os_error()
                .raw_os_error()
                .unwrap_or(0);
            if errno == libc::EINTR {
                continue;
            }
            if errno == libc::EAGAIN || errno == libc::EACCES {
                if attempt == 0 {
                    eprintln!("Warning: Try to get lock. Please wait...");
                }
                std::thread::sleep(std::time::Duration::from_secs(1));
                continue;
            }
            if errno == libc::EINVAL {
                eprintln!("Error: Locking isn't supported by OS, consider \"--lockless\".");
            }
            break;
        }
        eprintln!("Error: Can't get lock.");
        unsafe {
            libc::close(fd);
        }
        None
    }
}

impl Drop for LockFile {
    fn drop(&mut self) {
        let mut lock: libc::flock = unsafe { std::mem::zeroed() };
        lock.l_type = libc::F_UNLCK as libc::c_short;
        lock.l_whence = libc::SEEK_SET as libc::c_short;
        unsafe {
            libc::fcntl(self.fd, libc::F_SETLK, &lock);
            libc::close(self.fd);
        }
    }
}

/// Execute a matched command in context. Returns the action's retcode;
/// 0 is success.
pub fn execute(shell: &mut Shell, context: &mut Context) -> i32 {
    let Some(cmd) = context.cmd.clone() else {
        return -1;
    };
    let saved_wdog_timeout = shell.wdog_timeout();

    // Pre-transition when the command belongs to a shallower view.
    if let Some(pview_name) = cmd.pview() {
        let cur_view = shell.current_view();
        let pview = shell.find_view(pview_name);
        if let Some(pview) = pview {
            match pview.restore() {
                ViewRestore::View
                    if cur_view
                        .as_ref()
                        .map(|v| v.name() != pview.name())
                        .unwrap_or(true) =>
                {
                    shell.set_pwd(None, &pview, None, context);
                }
                ViewRestore::Depth => {
                    let cmd_depth = shell.cmd_depth(&cmd);
                    if let Some(depth) = shell.depth() {
                        if cmd_depth < depth {
                            shell.set_depth(cmd_depth);
                        }
                    }
                }
                _ => {}
            }
        }
    }

    // Take the lock for locking commands.
    let _lock = match shell.lockfile() {
        Some(path) if cmd.lock() => match LockFile::acquire(path) {
            Some(lock) => Some(lock),
            None => return -1,
        },
        _ => None,
    };

    context.action = Some(cmd.action().borrow().clone());
    let output = exec_action(shell, context, cmd.interrupt(), false);
    let result = output.retcode;

    // Config directive on success.
    if result == 0 {
        exec_config(shell, context);
    }

    // Command logging.
    if shell.log_enabled() {
        let line = shell.full_cmd_line(context);
        exec_log(shell, context, &line, result);
    }

    // Transition into the new view.
    if result == 0 {
        if let Some(viewname) = cmd.viewname() {
            let viewname = viewname.to_string();
            let expanded = shell.expand(&viewname, EscapeContext::None, context);
            if let Some(name) = expanded {
                match shell.find_view(&name) {
                    Some(view) => {
                        let line = shell.cmd_line(context);
                        shell.set_pwd(Some(line), &view, cmd.viewid(), context);
                    }
                    None => {
                        eprintln!("System error: Can't change view to {}", name);
                    }
                }
            }
        }
    }

    // Arm the watchdog, or fall back to the idle timeout. The watchdog
    // is not armed by the very command that configured it.
    let timeout = if shell.wdog_timeout() != 0 && saved_wdog_timeout != 0 {
        shell.wdog_active = true;
        eprintln!(
            "Warning: The watchdog is active. Timeout is {} seconds.",
            shell.wdog_timeout()
        );
        eprintln!("Warning: Press any key to stop watchdog.");
        shell.wdog_timeout()
    } else {
        shell.idle_timeout()
    };
    if let Some(editor) = shell.editor.as_mut() {
        editor.set_timeout(timeout);
    }

    result
}

/// Invoke the action symbol with the expanded script. Dry-run
/// suppresses non-permanent symbols.
pub fn exec_action(
    shell: &mut Shell,
    context: &Context,
    interrupt: bool,
    need_out: bool,
) -> ActionOutput {
    let Some(action) = context.action.clone() else {
        return ActionOutput::ok();
    };

    let sym = match action.builtin() {
        Some(sym) => sym,
        None => {
            if action.script().is_none() {
                return ActionOutput::ok();
            }
            match shell.hook(SymType::Action) {
                Some(sym) => sym,
                None => return ActionOutput::ok(),
            }
        }
    };

    if shell.dryrun() && !sym.permanent() {
        return ActionOutput::ok();
    }

    let Some(SymFn::Action(func)) = sym.func() else {
        eprintln!("Error: Default ACTION symbol is not specified.");
        return ActionOutput::code(-1);
    };

    let script = match action.script() {
        Some(script) => shell
            .expand(script, EscapeContext::Action, context)
            .unwrap_or_default(),
        None => String::new(),
    };

    debug!(script = %script, "exec action");
    let _signals = SignalGuard::new(interrupt);
    func(shell, context, &script, need_out)
}

/// Dispatch the config hook, honoring dry-run permanence.
pub fn exec_config(shell: &mut Shell, context: &Context) -> i32 {
    let Some(sym) = shell.hook(SymType::Config) else {
        return 0;
    };
    if shell.dryrun() && !sym.permanent() {
        return 0;
    }
    match sym.func() {
        Some(SymFn::Config(func)) => func(shell, context),
        _ => 0,
    }
}

/// Dispatch the log hook, honoring dry-run permanence.
pub fn exec_log(shell: &mut Shell, context: &Context, line: &str, retcode: i32) -> i32 {
    let Some(sym) = shell.hook(SymType::Log) else {
        return 0;
    };
    if shell.dryrun() && !sym.permanent() {
        return 0;
    }
    match sym.func() {
        Some(SymFn::Log(func)) => func(shell, context, line, retcode),
        _ => 0,
    }
}

/// Parse and execute one full line. The caller reports the state
/// transition; the returned state is Ok on success.
pub fn execute_line(shell: &mut Shell, line: &str) -> ShellState {
    use crate::scheme::ParseStatus;

    let (cmd, pargv, status) = super::parse::parse_line(shell, line);
    match status {
        ParseStatus::Ok => {}
        ParseStatus::Partial => return ShellState::SyntaxError,
        _ => return ShellState::SyntaxError,
    }
    let (Some(cmd), Some(pargv)) = (cmd, pargv) else {
        return ShellState::SyntaxError;
    };

    let mut context = Context::with_cmd(cmd, pargv);
    if execute(shell, &mut context) != 0 {
        return ShellState::ScriptError;
    }
    ShellState::Ok
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::{Command, ConfigOp, Pargv};
    use std::rc::Rc;

    fn shell_with_cmd(cmd: Command) -> Shell {
        let mut shell = Shell::new(None);
        shell.set_lockfile(None);
        let view = shell.find_create_view("main", Some("> "));
        cmd.action().borrow_mut().set_script("true");
        view.insert_command(Rc::new(cmd)).expect("insert");
        shell.prepare().expect("prepare");
        let view = shell.find_view("main").expect("view");
        let ctx = Context::new();
        shell.set_pwd(None, &view, None, &ctx);
        shell
    }

    #[test]
    fn test_execute_line_ok() {
        let mut shell = shell_with_cmd(Command::new("show version", Some("Version")));
        assert_eq!(execute_line(&mut shell, "show version"), ShellState::Ok);
    }

    #[test]
    fn test_execute_line_bad_cmd() {
        let mut shell = shell_with_cmd(Command::new("show", Some("Show")));
        assert_eq!(execute_line(&mut shell, "bogus"), ShellState::SyntaxError);
    }

    #[test]
    fn test_script_failure_is_script_error() {
        let cmd = Command::new("fail", Some("Fail"));
        cmd.action().borrow_mut().set_script("exit 4");
        let mut shell = Shell::new(None);
        shell.set_lockfile(None);
        let view = shell.find_create_view("main", Some("> "));
        view.insert_command(Rc::new(cmd)).expect("insert");
        shell.prepare().expect("prepare");
        let view = shell.find_view("main").expect("view");
        let ctx = Context::new();
        shell.set_pwd(None, &view, None, &ctx);
        assert_eq!(execute_line(&mut shell, "fail"), ShellState::ScriptError);
    }

    #[test]
    fn test_view_transition() {
        let mut shell = Shell::new(None);
        shell.set_lockfile(None);
        let main = shell.find_create_view("main", Some("> "));
        let nested = shell.find_create_view("iface", Some("(iface)> "));
        nested.set_depth(1);
        let cmd = Command::new("interface", Some("Enter interface mode"));
        cmd.insert_param(Rc::new(crate::scheme::Param::new(
            "name",
            Some("Name"),
            crate::shell::PTYPE_ARGS,
        )));
        let mut cmd = cmd;
        cmd.set_viewname("iface");
        cmd.set_viewid("ifname=${name}");
        cmd.action().borrow_mut().set_script("true");
        main.insert_command(Rc::new(cmd)).expect("insert");
        shell.prepare().expect("prepare");
        let ctx = Context::new();
        shell.set_pwd(None, &main, None, &ctx);

        assert_eq!(execute_line(&mut shell, "interface eth0"), ShellState::Ok);
        assert_eq!(shell.depth(), Some(1));
        let pwd = shell.pwd_at(1).expect("pwd");
        assert_eq!(pwd.view, "iface");
        assert_eq!(pwd.line.as_deref(), Some("interface eth0"));
        assert_eq!(pwd.viewid.get("ifname").map(String::as_str), Some("eth0"));
    }

    #[test]
    fn test_dry_run_suppresses_script() {
        let dir = tempfile::tempdir().expect("tempdir");
        let marker = dir.path().join("ran");
        let cmd = Command::new("touchit", Some("Touch"));
        cmd.action()
            .borrow_mut()
            .set_script(&format!("touch {}", marker.display()));
        let mut shell = shell_with_cmd(cmd);
        shell.set_dryrun(true);
        assert_eq!(execute_line(&mut shell, "touchit"), ShellState::Ok);
        assert!(!marker.exists());

        shell.set_dryrun(false);
        assert_eq!(execute_line(&mut shell, "touchit"), ShellState::Ok);
        assert!(marker.exists());
    }

    #[test]
    fn test_lock_contention() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("clish.lock");
        let path = path.to_str().expect("utf8").to_string();
        let first = LockFile::acquire(&path).expect("first lock");
        // A second holder in another process would block; within one
        // process the fcntl lock is owner-wide, so probe by dropping.
        drop(first);
        let second = LockFile::acquire(&path);
        assert!(second.is_some());
    }

    #[test]
    fn test_config_hook_skipped_without_client() {
        let cmd = Command::new("confcmd", Some("Conf"));
        cmd.config().borrow_mut().set_op(ConfigOp::Set);
        cmd.config().borrow_mut().set_pattern("^confcmd$");
        let mut shell = shell_with_cmd(cmd);
        // No client configured: the hook is a no-op, execution succeeds.
        assert_eq!(execute_line(&mut shell, "confcmd"), ShellState::Ok);
    }

    #[test]
    fn test_exec_action_without_action() {
        let mut shell = Shell::for_tests();
        let ctx = Context::new();
        let out = exec_action(&mut shell, &ctx, false, false);
        assert_eq!(out.retcode, 0);
    }

    #[test]
    fn test_restore_depth() {
        let mut shell = Shell::new(None);
        shell.set_lockfile(None);
        let main = shell.find_create_view("main", Some("> "));
        main.set_restore(ViewRestore::Depth);
        let nested = shell.find_create_view("sub", Some(">> "));
        nested.set_depth(1);
        nested.set_restore(ViewRestore::Depth);
        nested.insert_nspace(Rc::new(crate::scheme::Nspace::new("main")));
        let top_cmd = Command::new("top", Some("Top level"));
        top_cmd.action().borrow_mut().set_script("true");
        main.insert_command(Rc::new(top_cmd)).expect("insert");
        shell.prepare().expect("prepare");
        let ctx = Context::new();
        shell.set_pwd(None, &main, None, &ctx);
        shell.set_pwd(Some("enter".to_string()), &nested, None, &ctx);
        assert_eq!(shell.depth(), Some(1));

        // Running a depth-0 command from depth 1 restores the depth.
        let cmd = shell.resolve_command("top").expect("resolve");
        let mut context = Context::with_cmd(cmd, Pargv::new());
        assert_eq!(execute(&mut shell, &mut context), 0);
        assert_eq!(shell.depth(), Some(0));
    }
}
