//! Namespaces
//!
//! A NAMESPACE imports another view's commands into the current view,
//! optionally behind a textual prefix regex. Imported commands are
//! projected through dynamically created command links, cached per
//! namespace. Visibility flags control which surfaces (help,
//! completion, context help) see the import.

use std::cell::RefCell;
use std::rc::Rc;

use indexmap::IndexMap;
use regex_lite::Regex;

use super::command::Command;

/// Surfaces an import may be visible on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Help,
    Completion,
    ContextHelp,
}

/// An import of another view.
#[derive(Debug)]
pub struct Nspace {
    view_name: String,
    prefix: Option<String>,
    prefix_regex: Option<Regex>,
    help: bool,
    completion: bool,
    context_help: bool,
    inherit: bool,
    access: Option<String>,
    /// Pseudo-command standing for the bare prefix in completion lists.
    prefix_cmd: RefCell<Option<Rc<Command>>>,
    /// Cache of dynamically created proxy links, keyed by link name.
    proxies: RefCell<IndexMap<String, Rc<Command>>>,
}

impl Nspace {
    pub fn new(view_name: &str) -> Self {
        Self {
            view_name: view_name.to_string(),
            prefix: None,
            prefix_regex: None,
            help: false,
            completion: true,
            context_help: false,
            inherit: true,
            access: None,
            prefix_cmd: RefCell::new(None),
            proxies: RefCell::new(IndexMap::new()),
        }
    }

    pub fn view_name(&self) -> &str {
        &self.view_name
    }

    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn set_prefix(&mut self, prefix: &str) -> Result<(), String> {
        let re = Regex::new(&format!("(?i){}", prefix))
            .map_err(|e| format!("Bad namespace prefix {}: {}", prefix, e))?;
        self.prefix = Some(prefix.to_string());
        self.prefix_regex = Some(re);
        Ok(())
    }

    pub fn set_help(&mut self, on: bool) {
        self.help = on;
    }

    pub fn set_completion(&mut self, on: bool) {
        self.completion = on;
    }

    pub fn set_context_help(&mut self, on: bool) {
        self.context_help = on;
    }

    pub fn inherit(&self) -> bool {
        self.inherit
    }

    pub fn set_inherit(&mut self, inherit: bool) {
        self.inherit = inherit;
    }

    pub fn access(&self) -> Option<&str> {
        self.access.as_deref()
    }

    pub fn set_access(&mut self, access: &str) {
        self.access = Some(access.to_string());
    }

    pub fn visibility(&self, field: Visibility) -> bool {
        match field {
            Visibility::Help => self.help,
            Visibility::Completion => self.completion,
            Visibility::ContextHelp => self.context_help,
        }
    }

    /// Install the pseudo-command shown for the bare prefix.
    pub fn create_prefix_cmd(&self, name: &str, help: Option<&str>) {
        *self.prefix_cmd.borrow_mut() = Some(Rc::new(Command::new(name, help)));
    }

    /// Match the prefix regex at the very start of the line. Returns the
    /// matched prefix text and the remainder (with one following space
    /// stripped for command lookup).
    pub fn after_prefix<'l>(&self, line: &'l str) -> Option<(String, &'l str)> {
        let re = self.prefix_regex.as_ref()?;
        let m = re.find(line)?;
        if m.start() != 0 || m.end() == 0 {
            return None;
        }
        Some((line[..m.end()].to_string(), &line[m.end()..]))
    }

    /// Fetch or create the cached proxy link for a target command found
    /// through this namespace. `target` of None names the bare prefix.
    pub fn find_create_proxy(
        &self,
        prefix: &str,
        target: Option<&Rc<Command>>,
    ) -> Option<Rc<Command>> {
        let name = match target {
            Some(cmd) => format!("{} {}", prefix, cmd.name()),
            None => prefix.to_string(),
        };

        if let Some(cached) = self.proxies.borrow().get(&name) {
            return Some(cached.clone());
        }

        let link = match target {
            Some(cmd) => {
                let mut link = Command::new_link(&name, cmd.text(), cmd);
                link.set_dynamic(true);
                link
            }
            None => {
                let pc = self.prefix_cmd.borrow().clone()?;
                let mut link = Command::new_link(&name, pc.text(), &pc);
                link.set_dynamic(true);
                link
            }
        };

        let mut proxies = self.proxies.borrow_mut();
        // A different prefix text invalidates the whole cache.
        let lower = prefix.to_lowercase();
        if proxies
            .keys()
            .next()
            .map(|k| !k.to_lowercase().starts_with(&lower))
            .unwrap_or(false)
        {
            proxies.clear();
        }
        let link = Rc::new(link);
        proxies.insert(name, link.clone());
        Some(link)
    }

    /// Drop all cached proxies.
    pub fn clean_proxies(&self) {
        self.proxies.borrow_mut().clear();
    }
}

// ============================================================================
// Tests
// ============================================================================
