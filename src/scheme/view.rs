//! Views
//!
//! A view is a named CLI mode: an ordered set of commands, a prompt
//! template, namespace imports and hotkey bindings. Command lookup
//! prefers the longest name match; on ties the local view wins over
//! imports.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;

use super::command::{choose_longest, Command};
use super::hotkey::HotkeyMap;
use super::nspace::{Nspace, Visibility};
use crate::argv;

/// Registry of all views, keyed by name.
pub type ViewMap = IndexMap<String, Rc<View>>;

/// What a command from a deeper view restores before executing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewRestore {
    #[default]
    None,
    Depth,
    View,
}

impl ViewRestore {
    pub fn resolve(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Self::None),
            "depth" => Some(Self::Depth),
            "view" => Some(Self::View),
            _ => None,
        }
    }
}

/// A named CLI mode.
#[derive(Debug)]
pub struct View {
    name: String,
    prompt: RefCell<Option<String>>,
    depth: RefCell<usize>,
    restore: RefCell<ViewRestore>,
    access: RefCell<Option<String>>,
    /// Commands keyed by lowercased name (lookups are case-insensitive).
    commands: RefCell<IndexMap<String, Rc<Command>>>,
    nspaces: RefCell<Vec<Rc<Nspace>>>,
    hotkeys: RefCell<HotkeyMap>,
}

impl View {
    pub fn new(name: &str, prompt: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            prompt: RefCell::new(prompt.map(str::to_string)),
            depth: RefCell::new(0),
            restore: RefCell::new(ViewRestore::None),
            access: RefCell::new(None),
            commands: RefCell::new(IndexMap::new()),
            nspaces: RefCell::new(Vec::new()),
            hotkeys: RefCell::new(HotkeyMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn prompt(&self) -> Option<String> {
        self.prompt.borrow().clone()
    }

    pub fn set_prompt(&self, prompt: &str) {
        *self.prompt.borrow_mut() = Some(prompt.to_string());
    }

    pub fn depth(&self) -> usize {
        *self.depth.borrow()
    }

    pub fn set_depth(&self, depth: usize) {
        *self.depth.borrow_mut() = depth;
    }

    pub fn restore(&self) -> ViewRestore {
        *self.restore.borrow()
    }

    pub fn set_restore(&self, restore: ViewRestore) {
        *self.restore.borrow_mut() = restore;
    }

    pub fn access(&self) -> Option<String> {
        self.access.borrow().clone()
    }

    pub fn set_access(&self, access: &str) {
        *self.access.borrow_mut() = Some(access.to_string());
    }

    /// Insert a command; a duplicate name within the view is rejected.
    pub fn insert_command(&self, cmd: Rc<Command>) -> Result<(), String> {
        let key = cmd.name().to_lowercase();
        let mut commands = self.commands.borrow_mut();
        if commands.contains_key(&key) {
            return Err(format!(
                "Duplicate command {} in view {}",
                cmd.name(),
                self.name
            ));
        }
        commands.insert(key, cmd);
        Ok(())
    }

    /// Replace an existing command (alias-to-link conversion).
    pub fn replace_command(&self, cmd: Rc<Command>) {
        let key = cmd.name().to_lowercase();
        self.commands.borrow_mut().insert(key, cmd);
    }

    pub fn remove_command(&self, name: &str) -> bool {
        self.commands
            .borrow_mut()
            .shift_remove(&name.to_lowercase())
            .is_some()
    }

    pub fn retain_nspaces(&self, mut keep: impl FnMut(&Rc<Nspace>) -> bool) {
        self.nspaces.borrow_mut().retain(|ns| keep(ns));
    }

    pub fn command_names(&self) -> Vec<String> {
        self.commands
            .borrow()
            .values()
            .map(|c| c.name().to_string())
            .collect()
    }

    pub fn commands(&self) -> Vec<Rc<Command>> {
        self.commands.borrow().values().cloned().collect()
    }

    pub fn local_command(&self, name: &str) -> Option<Rc<Command>> {
        self.commands.borrow().get(&name.to_lowercase()).cloned()
    }

    pub fn insert_nspace(&self, nspace: Rc<Nspace>) {
        self.nspaces.borrow_mut().push(nspace);
    }

    pub fn nspaces(&self) -> Vec<Rc<Nspace>> {
        self.nspaces.borrow().clone()
    }

    pub fn insert_hotkey(&self, key: &str, cmd: &str) -> Result<(), String> {
        self.hotkeys.borrow_mut().insert(key, cmd)
    }

    pub fn find_hotkey(&self, code: u8) -> Option<String> {
        self.hotkeys
            .borrow()
            .cmd_by_code(code)
            .map(str::to_string)
    }

    /// Exact-name lookup including namespace imports. Later imports take
    /// precedence, so the namespace list is walked in reverse.
    pub fn find_command(&self, name: &str, inherit: bool, views: &ViewMap) -> Option<Rc<Command>> {
        let mut result = self.local_command(name);

        if inherit {
            for nspace in self.nspaces.borrow().iter().rev() {
                let cmd = nspace_find_command(nspace, name, views);
                result = choose_longest(result, cmd);
            }
        }

        result
    }

    /// The command providing the longest word-prefix match of the line.
    pub fn resolve_prefix(
        &self,
        line: &str,
        inherit: bool,
        views: &ViewMap,
    ) -> Option<Rc<Command>> {
        let argv = argv::Argv::new(line);
        let mut buffer = String::new();
        let mut result = None;

        for i in 0..argv.count() {
            if i > 0 {
                buffer.push(' ');
            }
            buffer.push_str(argv.get(i)?);
            match self.find_command(&buffer, inherit, views) {
                Some(cmd) => result = Some(cmd),
                None => break,
            }
        }

        result
    }

    /// Like `resolve_prefix`, but a match with no observable effect is
    /// not a command.
    pub fn resolve_command(
        &self,
        line: &str,
        inherit: bool,
        views: &ViewMap,
    ) -> Option<Rc<Command>> {
        self.resolve_prefix(line, inherit, views)
            .filter(|cmd| cmd.has_effect())
    }

    /// Collect completion candidates: commands whose name has exactly
    /// the word count of the line under construction and of which the
    /// line is a case-insensitive prefix.
    pub fn collect_completions(
        &self,
        line: &str,
        field: Visibility,
        inherit: bool,
        views: &ViewMap,
        out: &mut Vec<Rc<Command>>,
    ) {
        let mut words = argv::word_count(line);
        if line.is_empty() || line.ends_with(|c: char| c.is_whitespace()) {
            words += 1;
        }
        let folded = line.to_lowercase();

        for cmd in self.commands.borrow().values() {
            if argv::word_count(cmd.name()) == words
                && cmd.name().to_lowercase().starts_with(&folded)
            {
                out.push(cmd.clone());
            }
        }

        if !inherit {
            return;
        }
        for nspace in self.nspaces.borrow().iter().rev() {
            if !nspace.visibility(field) {
                continue;
            }
            nspace_collect_completions(nspace, line, field, views, out);
        }
    }
}

/// Namespace arm of `find_command`: strip the prefix (if any), look the
/// rest up in the imported view, and project the hit through a proxy
/// link.
fn nspace_find_command(nspace: &Rc<Nspace>, name: &str, views: &ViewMap) -> Option<Rc<Command>> {
    let view = views.get(nspace.view_name())?;

    if nspace.prefix().is_none() {
        return view.find_command(name, nspace.inherit(), views);
    }

    let (real_prefix, mut rest) = nspace.after_prefix(name)?;
    if let Some(stripped) = rest.strip_prefix(' ') {
        rest = stripped;
    }

    if rest.is_empty() {
        return nspace.find_create_proxy(&real_prefix, None);
    }
    let cmd = view.find_command(rest, nspace.inherit(), views)?;
    nspace.find_create_proxy(&real_prefix, Some(&cmd))
}

/// Namespace arm of the completion walk.
fn nspace_collect_completions(
    nspace: &Rc<Nspace>,
    line: &str,
    field: Visibility,
    views: &ViewMap,
    out: &mut Vec<Rc<Command>>,
) {
    let Some(view) = views.get(nspace.view_name()) else {
        return;
    };

    if nspace.prefix().is_none() {
        view.collect_completions(line, field, nspace.inherit(), views, out);
        return;
    }

    let Some((real_prefix, rest)) = nspace.after_prefix(line) else {
        return;
    };

    if rest.is_empty() {
        // The line is exactly the prefix; offer the prefix itself.
        if let Some(proxy) = nspace.find_create_proxy(&real_prefix, None) {
            out.push(proxy);
        }
        return;
    }
    let Some(in_line) = rest.strip_prefix(' ') else {
        return;
    };

    let mut hits = Vec::new();
    view.collect_completions(in_line, field, nspace.inherit(), views, &mut hits);
    for cmd in hits {
        if let Some(proxy) = nspace.find_create_proxy(&real_prefix, Some(&cmd)) {
            out.push(proxy);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn effective(name: &str, help: &str) -> Rc<Command> {
        let cmd = Command::new(name, Some(help));
        cmd.action().borrow_mut().set_script("true");
        Rc::new(cmd)
    }

    fn registry(views: Vec<Rc<View>>) -> ViewMap {
        views
            .into_iter()
            .map(|v| (v.name().to_string(), v))
            .collect()
    }

    #[test]
    fn test_duplicate_command_rejected() {
        let view = View::new("main", Some("> "));
        view.insert_command(effective("show", "Show")).unwrap();
        assert!(view.insert_command(effective("SHOW", "Dup")).is_err());
    }

    #[test]
    fn test_longest_match() {
        let view = Rc::new(View::new("main", None));
        view.insert_command(effective("a", "A")).unwrap();
        view.insert_command(effective("a b", "AB")).unwrap();
        let views = registry(vec![view.clone()]);
        let cmd = view.resolve_command("a b x", true, &views).unwrap();
        assert_eq!(cmd.name(), "a b");
        let cmd = view.resolve_command("a x", true, &views).unwrap();
        assert_eq!(cmd.name(), "a");
    }

    #[test]
    fn test_prefix_only_commands_do_not_resolve() {
        let view = Rc::new(View::new("main", None));
        view.insert_command(Rc::new(Command::new("show", Some("Prefix only"))))
            .unwrap();
        view.insert_command(effective("show version", "Version"))
            .unwrap();
        let views = registry(vec![view.clone()]);
        assert!(view.resolve_command("show", true, &views).is_none());
        assert!(view.resolve_command("show version", true, &views).is_some());
    }

    #[test]
    fn test_namespace_without_prefix() {
        let sub = Rc::new(View::new("sub", None));
        sub.insert_command(effective("inner", "Inner")).unwrap();
        let main = Rc::new(View::new("main", None));
        main.insert_nspace(Rc::new(Nspace::new("sub")));
        let views = registry(vec![main.clone(), sub]);
        let cmd = main.resolve_command("inner", true, &views).unwrap();
        assert_eq!(cmd.name(), "inner");
    }

    #[test]
    fn test_namespace_with_prefix() {
        let sub = Rc::new(View::new("sub", None));
        sub.insert_command(effective("shutdown", "Shut")).unwrap();
        let main = Rc::new(View::new("main", None));
        let mut ns = Nspace::new("sub");
        ns.set_prefix("no").unwrap();
        main.insert_nspace(Rc::new(ns));
        let views = registry(vec![main.clone(), sub]);

        let cmd = main.resolve_command("no shutdown", true, &views).unwrap();
        assert_eq!(cmd.name(), "no shutdown");
        assert_eq!(cmd.orig_name(), "shutdown");
        // Not reachable without the prefix.
        assert!(main.resolve_command("shutdown", true, &views).is_none());
    }

    #[test]
    fn test_local_overrides_import_on_tie() {
        let sub = Rc::new(View::new("sub", None));
        sub.insert_command(effective("go", "Import")).unwrap();
        let main = Rc::new(View::new("main", None));
        main.insert_command(effective("go", "Local")).unwrap();
        main.insert_nspace(Rc::new(Nspace::new("sub")));
        let views = registry(vec![main.clone(), sub]);
        let cmd = main.resolve_command("go", true, &views).unwrap();
        assert_eq!(cmd.text(), Some("Local"));
    }

    #[test]
    fn test_completion_word_count() {
        let view = Rc::new(View::new("main", None));
        view.insert_command(effective("show", "S")).unwrap();
        view.insert_command(effective("show version", "SV")).unwrap();
        view.insert_command(effective("shake", "SH")).unwrap();
        let views = registry(vec![view.clone()]);

        let mut out = Vec::new();
        view.collect_completions("sh", Visibility::Completion, true, &views, &mut out);
        let names: Vec<_> = out.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["show", "shake"]);

        let mut out = Vec::new();
        view.collect_completions("show ", Visibility::Completion, true, &views, &mut out);
        let names: Vec<_> = out.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["show version"]);
    }

    #[test]
    fn test_prefixed_namespace_completion() {
        let sub = Rc::new(View::new("sub", None));
        sub.insert_command(effective("alpha", "A")).unwrap();
        sub.insert_command(effective("beta", "B")).unwrap();
        let main = Rc::new(View::new("main", None));
        let mut ns = Nspace::new("sub");
        ns.set_prefix("b").unwrap();
        ns.create_prefix_cmd("b", Some("Sub commands"));
        main.insert_nspace(Rc::new(ns));
        let views = registry(vec![main.clone(), sub]);

        let mut out = Vec::new();
        main.collect_completions("b ", Visibility::Completion, true, &views, &mut out);
        let names: Vec<_> = out.iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["b alpha", "b beta"]);
    }

    #[test]
    fn test_namespace_visibility_filter() {
        let sub = Rc::new(View::new("sub", None));
        sub.insert_command(effective("inner", "I")).unwrap();
        let main = Rc::new(View::new("main", None));
        let mut ns = Nspace::new("sub");
        ns.set_completion(false);
        main.insert_nspace(Rc::new(ns));
        let views = registry(vec![main.clone(), sub]);

        let mut out = Vec::new();
        main.collect_completions("in", Visibility::Completion, true, &views, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_completion_determinism() {
        let view = Rc::new(View::new("main", None));
        view.insert_command(effective("show", "S")).unwrap();
        view.insert_command(effective("set", "Set")).unwrap();
        let views = registry(vec![view.clone()]);
        let mut first = Vec::new();
        view.collect_completions("s", Visibility::Completion, true, &views, &mut first);
        for _ in 0..3 {
            let mut again = Vec::new();
            view.collect_completions("s", Visibility::Completion, true, &views, &mut again);
            let a: Vec<_> = first.iter().map(|c| c.name()).collect();
            let b: Vec<_> = again.iter().map(|c| c.name()).collect();
            assert_eq!(a, b);
        }
    }
}
