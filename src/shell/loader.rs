//! Scheme Loader
//!
//! Populates the shell model from XML scheme files. The XML reader
//! builds a small neutral node tree; element handlers then walk it
//! top-down, mirroring the scheme structure: views hold commands and
//! namespaces, commands hold params, actions and config directives.

use std::collections::HashMap;
use std::rc::Rc;

use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::{debug, warn};

use super::expand::tilde_expand;
use super::Shell;
use crate::plugin::SymType;
use crate::scheme::{
    Command, ConfigOp, Nspace, Param, ParamMode, PtypeMethod, PtypePreprocess, Var, View,
    ViewRestore,
};

/// Scheme search path used when none is configured.
pub const DEFAULT_XML_PATH: &str = "/etc/clish;~/.clish";

/// Internal ptype backing prefix-generated subcommands.
const PTYPE_SUBCOMMAND: &str = "__SUBCOMMAND";

/// A backend-neutral DOM node.
#[derive(Debug, Default)]
pub struct XmlNode {
    pub name: String,
    pub attrs: HashMap<String, String>,
    pub children: Vec<XmlNode>,
    pub text: String,
}

impl XmlNode {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs.get(name).map(String::as_str)
    }

    fn flag(&self, name: &str, default: bool) -> bool {
        match self.attr(name) {
            Some(value) if value.eq_ignore_ascii_case("true") => true,
            Some(value) if value.eq_ignore_ascii_case("false") => false,
            _ => default,
        }
    }
}

/// Parse one XML document into a node tree.
pub fn parse_xml(content: &str) -> Result<XmlNode, String> {
    let mut reader = Reader::from_str(content);
    let mut stack: Vec<XmlNode> = vec![XmlNode::default()];

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let mut node = XmlNode {
                    name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                    ..Default::default()
                };
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| format!("Bad XML attribute: {}", e))?;
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    let value = attr
                        .unescape_value()
                        .map_err(|e| format!("Bad XML attribute value: {}", e))?
                        .into_owned();
                    node.attrs.insert(key, value);
                }
                stack.push(node);
            }
            Ok(Event::Empty(e)) => {
                let mut node = XmlNode {
                    name: String::from_utf8_lossy(e.name().as_ref()).into_owned(),
                    ..Default::default()
                };
                for attr in e.attributes() {
                    let attr = attr.map_err(|e| format!("Bad XML attribute: {}", e))?;
                    let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
                    let value = attr
                        .unescape_value()
                        .map_err(|e| format!("Bad XML attribute value: {}", e))?
                        .into_owned();
                    node.attrs.insert(key, value);
                }
                if let Some(parent) = stack.last_mut() {
                    parent.children.push(node);
                }
            }
            Ok(Event::Text(e)) => {
                let text = e
                    .unescape()
                    .map_err(|e| format!("Bad XML text: {}", e))?
                    .into_owned();
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::CData(e)) => {
                let text = String::from_utf8_lossy(&e).into_owned();
                if let Some(top) = stack.last_mut() {
                    top.text.push_str(&text);
                }
            }
            Ok(Event::End(_)) => {
                let node = stack.pop().ok_or("Unbalanced XML")?;
                stack
                    .last_mut()
                    .ok_or("Unbalanced XML")?
                    .children
                    .push(node);
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(format!("XML parse error: {}", e)),
        }
    }

    let mut root = stack.pop().ok_or("Unbalanced XML")?;
    if !stack.is_empty() {
        return Err("Unbalanced XML".to_string());
    }
    let result = root
        .children
        .drain(..)
        .find(|n| !n.name.is_empty())
        .ok_or_else(|| "Empty XML document".to_string());
    result
}

/// Load every `*.xml` file under each `;`-separated directory.
pub fn load_scheme_dirs(shell: &mut Shell, path: &str) -> Result<(), String> {
    for dir in path.split(';').filter(|d| !d.is_empty()) {
        let dir = tilde_expand(dir);
        let Ok(entries) = std::fs::read_dir(&dir) else {
            debug!(dir = %dir, "scheme directory not readable");
            continue;
        };
        let mut files: Vec<_> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().map(|e| e == "xml").unwrap_or(false))
            .collect();
        files.sort();
        for file in files {
            debug!(file = %file.display(), "parse scheme file");
            let content = std::fs::read_to_string(&file)
                .map_err(|e| format!("Can't read {}: {}", file.display(), e))?;
            load_str(shell, &content)
                .map_err(|e| format!("{}: {}", file.display(), e))?;
        }
    }
    Ok(())
}

/// Load one scheme document.
pub fn load_str(shell: &mut Shell, content: &str) -> Result<(), String> {
    let root = parse_xml(content)?;
    if root.name != "CLISH_MODULE" {
        return Err(format!("Unexpected root element {}", root.name));
    }
    let global = shell.global();
    for child in &root.children {
        process_node(shell, child, &Parent::View(global.clone()))?;
    }
    Ok(())
}

/// The element a child hangs off.
#[derive(Clone)]
enum Parent {
    View(Rc<View>),
    Command(Rc<Command>),
    Param(Rc<Param>),
    Var(Rc<Var>),
}

fn process_node(shell: &mut Shell, node: &XmlNode, parent: &Parent) -> Result<(), String> {
    match node.name.as_str() {
        "VIEW" => process_view(shell, node),
        "PTYPE" => process_ptype(shell, node),
        "OVERVIEW" => shell.set_overview(node.text.trim()),
        "COMMAND" => process_command(shell, node, parent),
        "STARTUP" => process_startup(shell, node),
        "WATCHDOG" => process_wdog(shell, node),
        "PARAM" => process_param(shell, node, parent),
        "ACTION" => process_action(shell, node, parent),
        "DETAIL" => process_detail(node, parent),
        "NAMESPACE" => process_namespace(shell, node, parent),
        "CONFIG" => process_config(node, parent),
        "VAR" => process_var(shell, node),
        "HOTKEY" => process_hotkey(node, parent),
        "PLUGIN" => {
            if let Some(name) = node.attr("name") {
                shell.request_plugin(name);
            }
            Ok(())
        }
        other => {
            warn!(element = other, "skipping unknown scheme element");
            Ok(())
        }
    }
}

fn process_children(shell: &mut Shell, node: &XmlNode, parent: &Parent) -> Result<(), String> {
    for child in &node.children {
        process_node(shell, child, parent)?;
    }
    Ok(())
}

fn process_view(shell: &mut Shell, node: &XmlNode) -> Result<(), String> {
    let name = node.attr("name").ok_or("VIEW without name")?;
    let view = shell.find_create_view(name, node.attr("prompt"));

    if let Some(depth) = node.attr("depth").and_then(|d| d.parse::<usize>().ok()) {
        view.set_depth(depth);
    }
    if let Some(restore) = node.attr("restore") {
        view.set_restore(ViewRestore::resolve(restore).unwrap_or(ViewRestore::None));
    }
    if let Some(access) = node.attr("access") {
        view.set_access(access);
    }

    process_children(shell, node, &Parent::View(view))
}

fn process_ptype(shell: &mut Shell, node: &XmlNode) -> Result<(), String> {
    let name = node.attr("name").ok_or("PTYPE without name")?;
    let pattern = node.attr("pattern").ok_or("PTYPE without pattern")?;
    let method = node
        .attr("method")
        .map(|m| PtypeMethod::resolve(m).ok_or_else(|| format!("Bad ptype method {}", m)))
        .transpose()?
        .unwrap_or_default();
    let preprocess = node
        .attr("preprocess")
        .and_then(PtypePreprocess::resolve)
        .unwrap_or_default();

    shell
        .find_create_ptype(name, node.attr("help"), pattern, method, preprocess)
        .map(|_| ())
}

fn process_command(shell: &mut Shell, node: &XmlNode, parent: &Parent) -> Result<(), String> {
    let Parent::View(view) = parent else {
        return Err("COMMAND outside a view".to_string());
    };
    let name = node.attr("name").ok_or("COMMAND without name")?;
    let help = node.attr("help").ok_or("COMMAND without help")?;

    if view.local_command(name).is_some() {
        warn!(command = name, "duplicate command ignored");
        return Ok(());
    }

    let mut cmd = Command::new(name, Some(help));
    cmd.set_pview(view.name());

    if let Some(ref_name) = node.attr("ref") {
        let (alias_cmd, alias_view) = match ref_name.split_once('@') {
            Some((c, v)) => (c, v.to_string()),
            None => (ref_name, view.name().to_string()),
        };
        if alias_cmd.is_empty() {
            return Err(format!("Empty reference for command {}", name));
        }
        shell.find_create_view(&alias_view, None);
        cmd.set_alias(alias_cmd, &alias_view);
    }

    if let Some(chars) = node.attr("escape_chars") {
        cmd.set_escape_chars(chars);
    }
    if let Some(chars) = node.attr("regex_chars") {
        cmd.set_regex_chars(chars);
    }
    if let Some(viewname) = node.attr("view") {
        cmd.set_viewname(viewname);
    }
    if let Some(viewid) = node.attr("viewid") {
        cmd.set_viewid(viewid);
    }
    if let Some(access) = node.attr("access") {
        cmd.set_access(access);
    }
    cmd.set_lock(node.flag("lock", true));
    cmd.set_interrupt(node.flag("interrupt", false));

    let cmd = Rc::new(cmd);
    if let Some(args_name) = node.attr("args") {
        let args_help = node.attr("args_help").unwrap_or("");
        cmd.set_args(Rc::new(Param::new(
            args_name,
            Some(args_help),
            super::PTYPE_ARGS,
        )));
    }

    view.insert_command(cmd.clone())?;
    process_children(shell, node, &Parent::Command(cmd))
}

fn special_command(
    shell: &mut Shell,
    node: &XmlNode,
    name: &str,
    lock: bool,
) -> Result<Rc<Command>, String> {
    let mut cmd = Command::new(name, None);
    if let Some(viewname) = node.attr("view") {
        cmd.set_viewname(viewname);
    }
    if let Some(viewid) = node.attr("viewid") {
        cmd.set_viewid(viewid);
    }
    cmd.set_lock(lock);
    cmd.set_interrupt(node.flag("interrupt", false));
    let cmd = Rc::new(cmd);
    process_children(shell, node, &Parent::Command(cmd.clone()))?;
    Ok(cmd)
}

fn process_startup(shell: &mut Shell, node: &XmlNode) -> Result<(), String> {
    node.attr("view").ok_or("STARTUP without view")?;
    if let Some(shebang) = node.attr("default_shebang") {
        shell.set_default_shebang(shebang);
    }
    if let Some(timeout) = node.attr("timeout").and_then(|t| t.parse().ok()) {
        shell.set_idle_timeout(timeout);
    }
    let lock = node.flag("lock", true);
    let cmd = special_command(shell, node, "startup", lock)?;
    shell.set_startup_cmd(cmd)
}

fn process_wdog(shell: &mut Shell, node: &XmlNode) -> Result<(), String> {
    // The watchdog must never contend for the session lock.
    let cmd = special_command(shell, node, "watchdog", false)?;
    shell.set_wdog_cmd(cmd)
}

fn process_param(shell: &mut Shell, node: &XmlNode, parent: &Parent) -> Result<(), String> {
    let name = node.attr("name").ok_or("PARAM without name")?;
    let help = node.attr("help").ok_or("PARAM without help")?;
    let ptype = node.attr("ptype").ok_or("PARAM without ptype")?;

    let mut param = Param::new(name, Some(help), ptype);

    if let Some(defval) = node.attr("default") {
        param.set_defval(defval);
    }
    param.set_hidden(node.flag("hidden", false));
    if let Some(mode) = node.attr("mode") {
        let mode = ParamMode::resolve(mode).unwrap_or(ParamMode::Common);
        param.set_mode(mode);
        if mode == ParamMode::Switch {
            param.set_hidden(true);
        }
    }
    param.set_optional(node.flag("optional", false));
    param.set_order(node.flag("order", false));
    if let Some(value) = node.attr("value") {
        param.set_value(value);
        param.set_mode(ParamMode::Subcommand);
    }
    if let Some(completion) = node.attr("completion") {
        param.set_completion(completion);
    }
    if let Some(access) = node.attr("access") {
        param.set_access(access);
    }

    // The subcommand-prefix idiom: wrap the parameter in an optional
    // literal-prefix subcommand.
    let mut outer_parent = parent.clone();
    if let Some(prefix) = node.attr("prefix") {
        let _ = shell.find_create_ptype(
            PTYPE_SUBCOMMAND,
            Some("Option"),
            "[^\\\\]+",
            PtypeMethod::Regexp,
            PtypePreprocess::None,
        )?;
        let mut wrapper = Param::new(prefix, Some(help), PTYPE_SUBCOMMAND);
        wrapper.set_mode(ParamMode::Subcommand);
        wrapper.set_optional(true);
        if let Some(test) = node.attr("test") {
            wrapper.set_test(test);
        }
        let wrapper = Rc::new(wrapper);
        insert_param(&outer_parent, wrapper.clone())?;
        outer_parent = Parent::Param(wrapper);
    } else if let Some(test) = node.attr("test") {
        param.set_test(test);
    }

    let param = Rc::new(param);
    insert_param(&outer_parent, param.clone())?;
    process_children(shell, node, &Parent::Param(param))
}

fn insert_param(parent: &Parent, param: Rc<Param>) -> Result<(), String> {
    match parent {
        Parent::Command(cmd) => {
            cmd.insert_param(param);
            Ok(())
        }
        Parent::Param(p) => {
            p.insert_param(param);
            Ok(())
        }
        _ => Err("PARAM outside a command".to_string()),
    }
}

fn process_action(shell: &mut Shell, node: &XmlNode, parent: &Parent) -> Result<(), String> {
    let action = match parent {
        Parent::Command(cmd) => cmd.action(),
        Parent::Var(var) => {
            let text = node.text.trim();
            let mut action = var.action().borrow_mut();
            if !text.is_empty() {
                action.set_script(text);
            }
            if let Some(builtin) = node.attr("builtin") {
                let sym = shell.add_unresolved_sym(builtin, SymType::Action);
                action.set_builtin(sym);
            }
            if let Some(shebang) = node.attr("shebang") {
                action.set_shebang(shebang);
            }
            return Ok(());
        }
        _ => return Err("ACTION outside a command or var".to_string()),
    };

    let text = node.text.trim();
    let mut action = action.borrow_mut();
    if !text.is_empty() {
        action.set_script(text);
    }
    if let Some(builtin) = node.attr("builtin") {
        let sym = shell.add_unresolved_sym(builtin, SymType::Action);
        action.set_builtin(sym);
    }
    if let Some(shebang) = node.attr("shebang") {
        action.set_shebang(shebang);
    }
    Ok(())
}

fn process_detail(node: &XmlNode, parent: &Parent) -> Result<(), String> {
    let Parent::Command(cmd) = parent else {
        return Err("DETAIL outside a command".to_string());
    };
    let text = node.text.trim();
    if !text.is_empty() {
        cmd.set_detail(text);
    }
    Ok(())
}

fn process_namespace(shell: &mut Shell, node: &XmlNode, parent: &Parent) -> Result<(), String> {
    let Parent::View(view) = parent else {
        return Err("NAMESPACE outside a view".to_string());
    };
    let ref_name = node.attr("ref").ok_or("NAMESPACE without ref")?;
    shell.find_create_view(ref_name, None);

    // A self-import without a prefix would recurse forever.
    if ref_name == view.name() && node.attr("prefix").is_none() {
        return Ok(());
    }

    let mut nspace = Nspace::new(ref_name);
    if let Some(prefix) = node.attr("prefix") {
        nspace.set_prefix(prefix)?;
        let help = node
            .attr("prefix_help")
            .unwrap_or("Prefix for the imported commands.");
        nspace.create_prefix_cmd("prefix", Some(help));
    }
    nspace.set_help(node.flag("help", false));
    nspace.set_completion(node.flag("completion", true));
    nspace.set_context_help(node.flag("context_help", false));
    nspace.set_inherit(node.flag("inherit", true));
    if let Some(access) = node.attr("access") {
        nspace.set_access(access);
    }

    view.insert_nspace(Rc::new(nspace));
    Ok(())
}

fn process_config(node: &XmlNode, parent: &Parent) -> Result<(), String> {
    let Parent::Command(cmd) = parent else {
        return Err("CONFIG outside a command".to_string());
    };
    let config = cmd.config();
    let mut config = config.borrow_mut();

    match node.attr("operation").and_then(ConfigOp::resolve) {
        Some(op @ (ConfigOp::Unset | ConfigOp::None | ConfigOp::Dump)) => config.set_op(op),
        _ => {
            config.set_op(ConfigOp::Set);
            // Unprioritized set operations get a late default slot.
            config.set_priority(0x7f00);
        }
    }

    if let Some(priority) = node
        .attr("priority")
        .and_then(crate::scheme::config::parse_priority)
    {
        config.set_priority(priority);
    }

    config.set_pattern(node.attr("pattern").unwrap_or("^${__cmd}"));

    if let Some(file) = node.attr("file") {
        config.set_file(file);
    }
    config.set_splitter(node.flag("splitter", true));
    config.set_unique(node.flag("unique", true));
    match node.attr("sequence") {
        Some(seq) => config.set_seq(seq),
        // Unsequenced entries cannot be non-unique.
        None => config.set_unique(true),
    }
    if let Some(depth) = node.attr("depth") {
        config.set_depth(depth);
    }
    Ok(())
}

fn process_var(shell: &mut Shell, node: &XmlNode) -> Result<(), String> {
    let name = node.attr("name").ok_or("VAR without name")?;
    let mut var = Var::new(name);
    var.set_dynamic(node.flag("dynamic", false));
    if let Some(value) = node.attr("value") {
        var.set_value(value);
    }
    shell.insert_var(var)?;
    let var = shell.find_var(name).ok_or("VAR vanished")?;
    process_children(shell, node, &Parent::Var(var))
}

fn process_hotkey(node: &XmlNode, parent: &Parent) -> Result<(), String> {
    let Parent::View(view) = parent else {
        return Err("HOTKEY outside a view".to_string());
    };
    let key = node.attr("key").ok_or("HOTKEY without key")?;
    let cmd = node.attr("cmd").ok_or("HOTKEY without cmd")?;
    view.insert_hotkey(key, cmd)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::ParseStatus;
    use crate::shell::context::Context;
    use crate::shell::parse;

    const SCHEME: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<CLISH_MODULE>
  <OVERVIEW>
    Demo scheme.
  </OVERVIEW>
  <PTYPE name="UINT16" method="unsignedInteger" pattern="1..65535" help="Number"/>
  <PTYPE name="STRING" pattern="[^\\]+" help="String"/>
  <VAR name="SYSTEM" value="demo"/>
  <STARTUP view="main"/>
  <VIEW name="main" prompt="${SYSTEM}&gt; ">
    <HOTKEY key="^D" cmd="exit"/>
    <COMMAND name="exit" help="Leave the shell">
      <ACTION builtin="clish_close"/>
    </COMMAND>
    <COMMAND name="show version" help="Show the version">
      <DETAIL>
        Long version details.
      </DETAIL>
      <ACTION>echo 1.0</ACTION>
    </COMMAND>
    <COMMAND name="set port" help="Set the port" view="main">
      <PARAM name="port" help="Port number" ptype="UINT16"/>
      <ACTION>echo port ${port}</ACTION>
      <CONFIG operation="set" priority="0x0100" pattern="^set port .*$"/>
    </COMMAND>
    <NAMESPACE ref="ops" prefix="do" help="true"/>
  </VIEW>
  <VIEW name="ops" prompt="ops&gt; ">
    <COMMAND name="ping" help="Ping a host">
      <PARAM name="host" help="Host" ptype="STRING"/>
      <ACTION>true</ACTION>
    </COMMAND>
  </VIEW>
</CLISH_MODULE>
"#;

    fn loaded_shell() -> Shell {
        let mut shell = Shell::new(None);
        shell.set_lockfile(None);
        load_str(&mut shell, SCHEME).expect("load");
        shell.prepare().expect("prepare");
        let view = shell.find_view("main").expect("main view");
        let ctx = Context::new();
        shell.set_pwd(None, &view, None, &ctx);
        shell
    }

    #[test]
    fn test_parse_xml_tree() {
        let root = parse_xml(SCHEME).expect("parse");
        assert_eq!(root.name, "CLISH_MODULE");
        let views: Vec<_> = root
            .children
            .iter()
            .filter(|n| n.name == "VIEW")
            .collect();
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].attr("name"), Some("main"));
    }

    #[test]
    fn test_load_populates_model() {
        let shell = loaded_shell();
        assert!(shell.find_ptype("UINT16").is_some());
        assert!(shell.find_var("SYSTEM").is_some());
        assert!(shell.overview().expect("overview").contains("Demo scheme."));
        assert!(shell.startup_cmd().is_some());
        let main = shell.find_view("main").expect("view");
        assert!(main.local_command("exit").is_some());
        assert!(main.local_command("show version").is_some());
        assert_eq!(main.find_hotkey(4).as_deref(), Some("exit"));
    }

    #[test]
    fn test_loaded_command_parses() {
        let mut shell = loaded_shell();
        let (cmd, pargv, status) = parse::parse_line(&mut shell, "set port 8080");
        assert_eq!(status, ParseStatus::Ok);
        assert_eq!(cmd.unwrap().name(), "set port");
        assert_eq!(pargv.unwrap().find("port").unwrap().value(), "8080");

        let (_, _, status) = parse::parse_line(&mut shell, "set port 70000");
        assert_eq!(status, ParseStatus::BadParam);
    }

    #[test]
    fn test_loaded_config_directive() {
        let shell = loaded_shell();
        let cmd = shell
            .find_view("main")
            .and_then(|v| v.local_command("set port"))
            .expect("cmd");
        let config = cmd.config();
        let config = config.borrow();
        assert_eq!(config.op(), ConfigOp::Set);
        assert_eq!(config.priority(), 0x0100);
        assert_eq!(config.pattern(), Some("^set port .*$"));
        assert!(config.unique());
    }

    #[test]
    fn test_namespace_prefix_loaded() {
        let mut shell = loaded_shell();
        let (cmd, _, status) = parse::parse_line(&mut shell, "do ping host1");
        assert_eq!(status, ParseStatus::Ok);
        assert_eq!(cmd.unwrap().orig_name(), "ping");
        // Not reachable without the prefix.
        let (_, _, status) = parse::parse_line(&mut shell, "ping host1");
        assert_eq!(status, ParseStatus::BadCmd);
    }

    #[test]
    fn test_detail_and_banner() {
        let shell = loaded_shell();
        let cmd = shell
            .find_view("main")
            .and_then(|v| v.local_command("show version"))
            .expect("cmd");
        assert!(cmd.detail().expect("detail").contains("Long version"));
    }

    #[test]
    fn test_duplicate_command_ignored() {
        let mut shell = Shell::new(None);
        let scheme = r#"<CLISH_MODULE>
  <VIEW name="v">
    <COMMAND name="one" help="First"><ACTION>true</ACTION></COMMAND>
    <COMMAND name="one" help="Second"><ACTION>false</ACTION></COMMAND>
  </VIEW>
</CLISH_MODULE>"#;
        load_str(&mut shell, scheme).expect("load");
        let view = shell.find_view("v").expect("view");
        assert_eq!(view.local_command("one").unwrap().text(), Some("First"));
    }

    #[test]
    fn test_two_overviews_fail() {
        let mut shell = Shell::new(None);
        let scheme = r#"<CLISH_MODULE>
  <OVERVIEW>one</OVERVIEW>
  <OVERVIEW>two</OVERVIEW>
</CLISH_MODULE>"#;
        assert!(load_str(&mut shell, scheme).is_err());
    }

    #[test]
    fn test_param_prefix_idiom() {
        let mut shell = Shell::new(None);
        shell.set_lockfile(None);
        let scheme = r#"<CLISH_MODULE>
  <PTYPE name="STRING" pattern="[^\\]+" help="String"/>
  <STARTUP view="v"/>
  <VIEW name="v" prompt="&gt; ">
    <COMMAND name="ping" help="Ping">
      <PARAM name="host" help="Host" ptype="STRING"/>
      <PARAM name="count" help="Count" ptype="STRING" prefix="repeat"/>
      <ACTION>true</ACTION>
    </COMMAND>
  </VIEW>
</CLISH_MODULE>"#;
        load_str(&mut shell, scheme).expect("load");
        shell.prepare().expect("prepare");
        let view = shell.find_view("v").expect("view");
        let ctx = Context::new();
        shell.set_pwd(None, &view, None, &ctx);

        // With and without the prefixed optional group.
        let (_, pargv, status) = parse::parse_line(&mut shell, "ping host1 repeat 3");
        assert_eq!(status, ParseStatus::Ok);
        let pargv = pargv.unwrap();
        assert_eq!(pargv.find("repeat").unwrap().value(), "repeat");
        assert_eq!(pargv.find("count").unwrap().value(), "3");

        let (_, pargv, status) = parse::parse_line(&mut shell, "ping host1");
        assert_eq!(status, ParseStatus::Ok);
        assert!(pargv.unwrap().find("count").is_none());
    }

    #[test]
    fn test_bad_root_element() {
        let mut shell = Shell::new(None);
        assert!(load_str(&mut shell, "<WRONG_ROOT/>").is_err());
    }

    #[test]
    fn test_unknown_element_skipped() {
        let mut shell = Shell::new(None);
        let scheme = r#"<CLISH_MODULE><FANCY_EXTENSION foo="1"/></CLISH_MODULE>"#;
        assert!(load_str(&mut shell, scheme).is_ok());
    }
}
