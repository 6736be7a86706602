//! Parser / Matcher
//!
//! Resolves a token stream against a command's parameter grammar:
//! switch and subcommand dispatch, optional parameters revisited out of
//! order, `test`-gated presence, nested vectors, and greedy trailing
//! arguments. The same walk collects the completion candidates at the
//! insertion point.

use std::process::Command as ProcCommand;
use std::rc::Rc;

use super::context::Context;
use super::{EscapeContext, Shell};
use crate::argv::Argv;
use crate::scheme::{Command, Param, ParamMode, Pargv, ParseStatus};

/// Parse a full line: resolve the command, then match its grammar.
pub fn parse_line(
    shell: &mut Shell,
    line: &str,
) -> (Option<Rc<Command>>, Option<Pargv>, ParseStatus) {
    let Some(cmd) = shell.resolve_command(line) else {
        return (None, None, ParseStatus::BadCmd);
    };

    let argv = Argv::new(line);
    let mut idx = crate::argv::word_count(cmd.name());
    let mut pargv = Pargv::new();
    let status = parse_pargv(
        shell,
        &mut pargv,
        &cmd,
        &cmd.params(),
        &argv,
        &mut idx,
        None,
        usize::MAX,
        true,
    );

    if status == ParseStatus::Ok {
        (Some(cmd), Some(pargv), status)
    } else {
        (Some(cmd), None, status)
    }
}

/// Evaluate a parameter's `test` expression; absence means present.
fn line_test(shell: &mut Shell, param: &Rc<Param>, cmd: &Rc<Command>, pargv: &Pargv) -> bool {
    let Some(test) = param.test() else {
        return true;
    };
    let test = test.to_string();
    let context = Context {
        cmd: Some(cmd.clone()),
        pargv: Some(pargv.clone()),
        action: None,
    };
    let Some(expanded) = shell.expand(&test, EscapeContext::Action, &context) else {
        return false;
    };
    run_test(&expanded)
}

/// Evaluate a test(1)-style expression.
fn run_test(expr: &str) -> bool {
    ProcCommand::new("/bin/sh")
        .arg("-c")
        .arg(format!("test {}", expr))
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}

/// Collector for completion candidates, deduplicated by name.
fn push_candidate(list: &mut Vec<Rc<Param>>, param: &Rc<Param>) {
    if !list.iter().any(|p| p.name() == param.name()) {
        list.push(param.clone());
    }
}

/// Walk one parameter vector. `idx` advances over the token stream;
/// `completion` (with `need_idx`) collects the parameters that could
/// legally appear at the insertion point. `up_level` marks the
/// command's own vector, where trailing args are assembled.
#[allow(clippy::too_many_arguments)]
pub fn parse_pargv(
    shell: &mut Shell,
    pargv: &mut Pargv,
    cmd: &Rc<Command>,
    params: &[Rc<Param>],
    argv: &Argv,
    idx: &mut usize,
    mut completion: Option<&mut Vec<Rc<Param>>>,
    need_idx: usize,
    up_level: bool,
) -> ParseStatus {
    let argc = argv.count();
    let mut index = 0usize;
    let mut nopt_index = 0usize;
    let mut nopt_seen = false;

    while index < params.len() {
        let param = params[index].clone();
        let arg = argv.get(*idx).map(str::to_string);
        let is_switch = param.mode() == ParamMode::Switch;

        if !line_test(shell, &param, cmd, pargv) {
            index += 1;
            continue;
        }

        // Collect candidates at the insertion point.
        if let Some(list) = completion.as_mut() {
            if *idx == need_idx && pargv.find(param.name()).is_none() {
                let prefix_matches = |p: &Rc<Param>| match &arg {
                    None => true,
                    Some(arg) => p
                        .value()
                        .to_lowercase()
                        .starts_with(&arg.to_lowercase()),
                };
                if is_switch {
                    for child in param.params() {
                        if !line_test(shell, &child, cmd, pargv) {
                            continue;
                        }
                        if child.mode() != ParamMode::Subcommand || prefix_matches(&child) {
                            push_candidate(list, &child);
                        }
                    }
                } else if param.mode() != ParamMode::Subcommand || prefix_matches(&param) {
                    push_candidate(list, &param);
                }
            }
        }

        if !param.optional() {
            nopt_seen = true;
            nopt_index = index;
        }

        // Validate the token, dispatching switch alternatives.
        let mut rec_params = param.params();
        let mut chosen: Option<Rc<Param>> = None;
        let validated = if pargv.find(param.name()).is_some() {
            // Duplicated parameter.
            None
        } else if is_switch {
            let mut result = None;
            for child in param.params() {
                if !line_test(shell, &child, cmd, pargv) {
                    continue;
                }
                if let Some(value) = arg.as_deref().and_then(|a| child.validate(a)) {
                    rec_params = child.params();
                    chosen = Some(child);
                    result = Some(value);
                    break;
                }
            }
            result
        } else {
            arg.as_deref().and_then(|a| param.validate(a))
        };

        if let Some(value) = validated {
            if let Some(child) = &chosen {
                pargv.insert(&param, child.name());
                pargv.insert(child, &value);
            } else {
                pargv.insert(&param, &value);
            }

            // Keep the index on the last unfinished optional argument so
            // its own completions stay reachable.
            let hold = param.optional() && *idx == need_idx && need_idx + 1 == argc;
            if !hold {
                *idx += 1;
                if !rec_params.is_empty() {
                    let status = parse_pargv(
                        shell,
                        pargv,
                        cmd,
                        &rec_params,
                        argv,
                        idx,
                        completion.as_mut().map(|c| &mut **c),
                        need_idx,
                        false,
                    );
                    if status != ParseStatus::Ok {
                        return status;
                    }
                }
            }

            // Optional unordered parameters restart the walk after the
            // last non-optional position.
            if param.optional() && !param.order() {
                index = if nopt_seen { nopt_index + 1 } else { 0 };
            } else {
                nopt_seen = true;
                nopt_index = index;
                index += 1;
            }
        } else if param.optional() {
            index += 1;
        } else if arg.is_none() {
            break;
        } else {
            return ParseStatus::BadParam;
        }
    }

    // Unsatisfied required parameters mean the line is incomplete.
    if *idx >= argc && index < params.len() {
        for param in &params[index..] {
            if !param.optional() {
                return ParseStatus::Partial;
            }
        }
    }

    // Offer the args parameter when nothing else completes here.
    if up_level && *idx <= argc && index >= params.len() {
        if let (Some(list), Some(args)) = (completion.as_mut(), cmd.args()) {
            if list.is_empty() {
                push_candidate(list, &args);
            }
        }
    }

    // Leftover tokens belong to the trailing args parameter.
    if up_level && *idx < argc && index >= params.len() {
        let Some(args_param) = cmd.args() else {
            return ParseStatus::BadCmd;
        };
        let mut assembled = String::new();
        while *idx < argc {
            if let Some(arg) = argv.get(*idx) {
                if !assembled.is_empty() {
                    assembled.push(' ');
                }
                if argv.quoted(*idx) {
                    assembled.push('"');
                    assembled.push_str(arg);
                    assembled.push('"');
                } else {
                    assembled.push_str(arg);
                }
            }
            *idx += 1;
        }
        pargv.insert(&args_param, &assembled);
    }

    ParseStatus::Ok
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::{PtypeMethod, PtypePreprocess, View};

    fn shell_with(cmds: Vec<Command>) -> (Shell, Rc<View>) {
        let mut shell = Shell::new(None);
        let _ = shell.find_create_ptype(
            "UINT16",
            Some("Port"),
            "1..65535",
            PtypeMethod::UnsignedInteger,
            PtypePreprocess::None,
        );
        let _ = shell.find_create_ptype(
            "WORD",
            Some("Word"),
            "[a-z0-9]+",
            PtypeMethod::Regexp,
            PtypePreprocess::None,
        );
        let view = shell.find_create_view("main", Some("> "));
        for cmd in cmds {
            cmd.action().borrow_mut().set_script("true");
            view.insert_command(Rc::new(cmd)).expect("insert");
        }
        shell.prepare().expect("prepare");
        let ctx = Context::new();
        let v = view.clone();
        shell.set_pwd(None, &v, None, &ctx);
        (shell, view)
    }

    fn param(name: &str, ptype: &str) -> Param {
        Param::new(name, Some(name), ptype)
    }

    #[test]
    fn test_simple_command_no_params() {
        let (mut shell, _) = shell_with(vec![Command::new("show version", Some("Version"))]);
        let (cmd, pargv, status) = parse_line(&mut shell, "show version");
        assert_eq!(status, ParseStatus::Ok);
        assert_eq!(cmd.unwrap().name(), "show version");
        assert_eq!(pargv.unwrap().count(), 0);
    }

    #[test]
    fn test_required_param() {
        let cmd = Command::new("set port", Some("Set port"));
        cmd.insert_param(Rc::new(param("port", "UINT16")));
        let (mut shell, _) = shell_with(vec![cmd]);

        let (_, pargv, status) = parse_line(&mut shell, "set port 8080");
        assert_eq!(status, ParseStatus::Ok);
        assert_eq!(pargv.unwrap().find("port").unwrap().value(), "8080");

        // Out of range.
        let (_, _, status) = parse_line(&mut shell, "set port 70000");
        assert_eq!(status, ParseStatus::BadParam);

        // Missing.
        let (_, _, status) = parse_line(&mut shell, "set port");
        assert_eq!(status, ParseStatus::Partial);
    }

    #[test]
    fn test_unknown_command() {
        let (mut shell, _) = shell_with(vec![Command::new("show", Some("Show"))]);
        let (cmd, _, status) = parse_line(&mut shell, "bogus");
        assert_eq!(status, ParseStatus::BadCmd);
        assert!(cmd.is_none());
    }

    #[test]
    fn test_longest_match_with_extra_token() {
        let a = Command::new("a", Some("A"));
        a.insert_param(Rc::new(param("x", "WORD")));
        let ab = Command::new("a b", Some("AB"));
        ab.insert_param(Rc::new(param("x", "WORD")));
        let (mut shell, _) = shell_with(vec![a, ab]);
        let (cmd, _, status) = parse_line(&mut shell, "a b x");
        assert_eq!(status, ParseStatus::Ok);
        assert_eq!(cmd.unwrap().name(), "a b");
    }

    #[test]
    fn test_optional_unordered() {
        let cmd = Command::new("ping", Some("Ping"));
        let mut verbose = param("verbose", "WORD");
        verbose.set_mode(ParamMode::Subcommand);
        verbose.set_optional(true);
        let mut fast = param("fast", "WORD");
        fast.set_mode(ParamMode::Subcommand);
        fast.set_optional(true);
        cmd.insert_param(Rc::new(verbose));
        cmd.insert_param(Rc::new(fast));
        cmd.insert_param(Rc::new(param("host", "WORD")));
        let (mut shell, _) = shell_with(vec![cmd]);

        // Optionals may appear in any relative order.
        for line in [
            "ping host1",
            "ping verbose host1",
            "ping fast host1",
            "ping fast verbose host1",
            "ping verbose fast host1",
        ] {
            let (_, pargv, status) = parse_line(&mut shell, line);
            assert_eq!(status, ParseStatus::Ok, "line: {}", line);
            assert_eq!(pargv.unwrap().find("host").unwrap().value(), "host1");
        }

        let (_, pargv, _) = parse_line(&mut shell, "ping fast verbose host1");
        let pargv = pargv.unwrap();
        assert_eq!(pargv.find("fast").unwrap().value(), "fast");
        assert_eq!(pargv.find("verbose").unwrap().value(), "verbose");
    }

    #[test]
    fn test_duplicate_optional_rejected() {
        let cmd = Command::new("ping", Some("Ping"));
        let mut verbose = param("verbose", "WORD");
        verbose.set_mode(ParamMode::Subcommand);
        verbose.set_optional(true);
        cmd.insert_param(Rc::new(verbose));
        let (mut shell, _) = shell_with(vec![cmd]);
        let (_, _, status) = parse_line(&mut shell, "ping verbose verbose");
        assert_ne!(status, ParseStatus::Ok);
    }

    #[test]
    fn test_ordered_optional() {
        let cmd = Command::new("fetch", Some("Fetch"));
        let mut early = param("early", "WORD");
        early.set_mode(ParamMode::Subcommand);
        early.set_optional(true);
        early.set_order(true);
        cmd.insert_param(Rc::new(early));
        cmd.insert_param(Rc::new(param("url", "WORD")));
        let (mut shell, _) = shell_with(vec![cmd]);

        let (_, _, status) = parse_line(&mut shell, "fetch early target");
        assert_eq!(status, ParseStatus::Ok);
        // Once past its position an ordered optional cannot match.
        let (_, _, status) = parse_line(&mut shell, "fetch target early");
        assert_ne!(status, ParseStatus::Ok);
    }

    #[test]
    fn test_switch_param() {
        let cmd = Command::new("set mode", Some("Set mode"));
        let mut sw = param("choice", "");
        sw.set_mode(ParamMode::Switch);
        let sw = Rc::new(sw);
        let mut on = param("on", "WORD");
        on.set_mode(ParamMode::Subcommand);
        let mut off = param("off", "WORD");
        off.set_mode(ParamMode::Subcommand);
        sw.insert_param(Rc::new(on));
        sw.insert_param(Rc::new(off));
        let cmd2 = cmd;
        cmd2.insert_param(sw);
        let (mut shell, _) = shell_with(vec![cmd2]);

        let (_, pargv, status) = parse_line(&mut shell, "set mode off");
        assert_eq!(status, ParseStatus::Ok);
        let pargv = pargv.unwrap();
        // The switch records the chosen branch; the branch records the
        // validated value.
        assert_eq!(pargv.find("choice").unwrap().value(), "off");
        assert_eq!(pargv.find("off").unwrap().value(), "off");

        let (_, _, status) = parse_line(&mut shell, "set mode sideways");
        assert_eq!(status, ParseStatus::BadParam);
    }

    #[test]
    fn test_subcommand_nested_params() {
        let cmd = Command::new("interface", Some("Interface"));
        let mut eth = param("eth", "WORD");
        eth.set_mode(ParamMode::Subcommand);
        let eth = Rc::new(eth);
        eth.insert_param(Rc::new(param("unit", "UINT16")));
        cmd.insert_param(eth);
        let (mut shell, _) = shell_with(vec![cmd]);

        let (_, pargv, status) = parse_line(&mut shell, "interface eth 3");
        assert_eq!(status, ParseStatus::Ok);
        let pargv = pargv.unwrap();
        assert_eq!(pargv.find("eth").unwrap().value(), "eth");
        assert_eq!(pargv.find("unit").unwrap().value(), "3");

        let (_, _, status) = parse_line(&mut shell, "interface eth");
        assert_eq!(status, ParseStatus::Partial);
    }

    #[test]
    fn test_trailing_args() {
        let cmd = Command::new("exec", Some("Exec"));
        let args = Rc::new(Param::new("args", Some("Rest"), crate::shell::PTYPE_ARGS));
        cmd.set_args(args);
        let (mut shell, _) = shell_with(vec![cmd]);

        let (_, pargv, status) = parse_line(&mut shell, "exec one \"two three\" four");
        assert_eq!(status, ParseStatus::Ok);
        assert_eq!(
            pargv.unwrap().find("args").unwrap().value(),
            "one \"two three\" four"
        );
    }

    #[test]
    fn test_extra_tokens_without_args_param() {
        let (mut shell, _) = shell_with(vec![Command::new("show", Some("Show"))]);
        let (_, _, status) = parse_line(&mut shell, "show extra");
        assert_eq!(status, ParseStatus::BadCmd);
    }

    #[test]
    fn test_completion_collection() {
        let cmd = Command::new("set", Some("Set"));
        let mut proto = param("proto", "");
        proto.set_mode(ParamMode::Switch);
        let proto = Rc::new(proto);
        let mut tcp = param("tcp", "WORD");
        tcp.set_mode(ParamMode::Subcommand);
        let mut udp = param("udp", "WORD");
        udp.set_mode(ParamMode::Subcommand);
        proto.insert_param(Rc::new(tcp));
        proto.insert_param(Rc::new(udp));
        cmd.insert_param(proto);
        let (mut shell, view) = shell_with(vec![cmd]);

        let cmd = view.local_command("set").expect("cmd");
        let argv = Argv::new("set ");
        let mut idx = 1;
        let mut pargv = Pargv::new();
        let mut list = Vec::new();
        parse_pargv(
            &mut shell,
            &mut pargv,
            &cmd,
            &cmd.params(),
            &argv,
            &mut idx,
            Some(&mut list),
            1,
            true,
        );
        let names: Vec<_> = list.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["tcp", "udp"]);

        // With a partial token, only prefix-matching subcommands remain.
        let argv = Argv::new("set u");
        let mut idx = 1;
        let mut pargv = Pargv::new();
        let mut list = Vec::new();
        parse_pargv(
            &mut shell,
            &mut pargv,
            &cmd,
            &cmd.params(),
            &argv,
            &mut idx,
            Some(&mut list),
            1,
            true,
        );
        let names: Vec<_> = list.iter().map(|p| p.name()).collect();
        assert_eq!(names, vec!["udp"]);
    }

    #[test]
    fn test_test_condition_skips_param() {
        let cmd = Command::new("cond", Some("Cond"));
        let mut gated = param("gated", "WORD");
        gated.set_mode(ParamMode::Subcommand);
        gated.set_test("1 -eq 0");
        cmd.insert_param(Rc::new(gated));
        let (mut shell, _) = shell_with(vec![cmd]);

        // The gated parameter is invisible, so its token can't match.
        let (_, _, status) = parse_line(&mut shell, "cond gated");
        assert_ne!(status, ParseStatus::Ok);

        let (_, _, status) = parse_line(&mut shell, "cond");
        assert_eq!(status, ParseStatus::Ok);
    }
}
