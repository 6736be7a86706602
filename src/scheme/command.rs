//! Commands
//!
//! A command is a named invokable node in a view: a parameter grammar,
//! an action, an optional config directive, access control and a view
//! transition. Command links project an existing command into another
//! view (or under another name) while sharing its body.

use std::cell::RefCell;
use std::rc::Rc;

use super::action::Action;
use super::config::ConfigDirective;
use super::param::Param;

/// A command definition or link.
#[derive(Debug, Clone, Default)]
pub struct Command {
    name: String,
    text: Option<String>,
    detail: RefCell<Option<String>>,
    params: Rc<RefCell<Vec<Rc<Param>>>>,
    args: Rc<RefCell<Option<Rc<Param>>>>,
    action: Rc<RefCell<Action>>,
    config: Rc<RefCell<ConfigDirective>>,
    viewname: Option<String>,
    viewid: Option<String>,
    escape_chars: Option<String>,
    regex_chars: Option<String>,
    lock: bool,
    interrupt: bool,
    dynamic: bool,
    access: Option<String>,
    /// Name of the linked original, for command links.
    link: Option<String>,
    /// Alias reference recorded at load time, resolved into a link later.
    alias: Option<(String, String)>,
    /// Name of the owning view.
    pview: Option<String>,
}

impl Command {
    pub fn new(name: &str, text: Option<&str>) -> Self {
        Self {
            name: name.to_string(),
            text: text.map(str::to_string),
            lock: true,
            ..Default::default()
        }
    }

    /// Create a link: share the target's body under a new name/help.
    pub fn new_link(name: &str, text: Option<&str>, target: &Rc<Command>) -> Self {
        let mut link = (**target).clone();
        link.name = name.to_string();
        link.text = text.map(str::to_string);
        link.link = Some(target.orig_name().to_string());
        link
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name of the original command this one resolves to.
    pub fn orig_name(&self) -> &str {
        self.link.as_deref().unwrap_or(&self.name)
    }

    pub fn is_link(&self) -> bool {
        self.link.is_some()
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    /// Display suffix: the last word of a multi-word command name.
    pub fn suffix(&self) -> &str {
        crate::argv::suffix(&self.name)
    }

    pub fn detail(&self) -> Option<String> {
        self.detail.borrow().clone()
    }

    pub fn set_detail(&self, detail: &str) {
        *self.detail.borrow_mut() = Some(detail.to_string());
    }

    pub fn insert_param(&self, param: Rc<Param>) {
        self.params.borrow_mut().push(param);
    }

    pub fn params(&self) -> Vec<Rc<Param>> {
        self.params.borrow().clone()
    }

    pub fn param_count(&self) -> usize {
        self.params.borrow().len()
    }

    /// The greedy trailing arguments parameter, if declared.
    pub fn args(&self) -> Option<Rc<Param>> {
        self.args.borrow().clone()
    }

    pub fn set_args(&self, param: Rc<Param>) {
        *self.args.borrow_mut() = Some(param);
    }

    pub fn action(&self) -> Rc<RefCell<Action>> {
        self.action.clone()
    }

    pub fn config(&self) -> Rc<RefCell<ConfigDirective>> {
        self.config.clone()
    }

    pub fn viewname(&self) -> Option<&str> {
        self.viewname.as_deref()
    }

    pub fn set_viewname(&mut self, viewname: &str) {
        self.viewname = Some(viewname.to_string());
    }

    pub fn viewid(&self) -> Option<&str> {
        self.viewid.as_deref()
    }

    pub fn set_viewid(&mut self, viewid: &str) {
        self.viewid = Some(viewid.to_string());
    }

    pub fn escape_chars(&self) -> Option<&str> {
        self.escape_chars.as_deref()
    }

    pub fn set_escape_chars(&mut self, chars: &str) {
        self.escape_chars = Some(chars.to_string());
    }

    pub fn regex_chars(&self) -> Option<&str> {
        self.regex_chars.as_deref()
    }

    pub fn set_regex_chars(&mut self, chars: &str) {
        self.regex_chars = Some(chars.to_string());
    }

    pub fn lock(&self) -> bool {
        self.lock
    }

    pub fn set_lock(&mut self, lock: bool) {
        self.lock = lock;
    }

    pub fn interrupt(&self) -> bool {
        self.interrupt
    }

    pub fn set_interrupt(&mut self, interrupt: bool) {
        self.interrupt = interrupt;
    }

    /// Dynamically created namespace proxy links are marked.
    pub fn dynamic(&self) -> bool {
        self.dynamic
    }

    pub fn set_dynamic(&mut self, dynamic: bool) {
        self.dynamic = dynamic;
    }

    pub fn access(&self) -> Option<&str> {
        self.access.as_deref()
    }

    pub fn set_access(&mut self, access: &str) {
        self.access = Some(access.to_string());
    }

    /// Alias recorded by the loader: (alias name, view name).
    pub fn alias(&self) -> Option<(&str, &str)> {
        self.alias
            .as_ref()
            .map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn set_alias(&mut self, name: &str, view: &str) {
        self.alias = Some((name.to_string(), view.to_string()));
    }

    pub fn pview(&self) -> Option<&str> {
        self.pview.as_deref()
    }

    pub fn set_pview(&mut self, view: &str) {
        self.pview = Some(view.to_string());
    }

    /// True when matching the command has an observable effect. Commands
    /// with no action, no config op, no params and no transition act only
    /// as prefixes for longer commands and do not resolve.
    pub fn has_effect(&self) -> bool {
        let action = self.action.borrow();
        if action.script().is_some() || action.builtin().is_some() {
            return true;
        }
        if self.config.borrow().op() != super::config::ConfigOp::None {
            return true;
        }
        self.param_count() > 0 || self.viewname.is_some()
    }
}

/// Of two optional commands, the one with the longer name; ties go to
/// the first (the local view overrides imports).
pub fn choose_longest(a: Option<Rc<Command>>, b: Option<Rc<Command>>) -> Option<Rc<Command>> {
    let len_a = a.as_ref().map(|c| c.name().len()).unwrap_or(0);
    let len_b = b.as_ref().map(|c| c.name().len()).unwrap_or(0);
    if len_b > len_a {
        b
    } else if len_a > 0 {
        a
    } else {
        None
    }
}

// ============================================================================
// Tests
// ============================================================================
