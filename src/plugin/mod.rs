//! Plugins and Symbols
//!
//! A plugin is a named bundle of symbols: functions the scheme can
//! reference from ACTION elements and the shell's hook table. Symbol
//! references in the scheme are textual (`name` or `name@plugin`) and
//! stay unresolved until every plugin is registered; a single
//! resolution pass then binds them or fails the load.

pub mod builtin;

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::shell::context::Context;
use crate::shell::Shell;

/// What a symbol may be used for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymType {
    #[default]
    None,
    Action,
    Access,
    Config,
    Log,
}

/// Calling convention of an action symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymApi {
    /// The function returns its output directly.
    #[default]
    Simple,
    /// The function writes to stdout; output is captured through a pipe
    /// when the caller needs it.
    Stdout,
}

/// Result of an action invocation.
#[derive(Debug, Clone, Default)]
pub struct ActionOutput {
    pub retcode: i32,
    pub out: Option<String>,
}

impl ActionOutput {
    pub fn ok() -> Self {
        Self {
            retcode: 0,
            out: None,
        }
    }

    pub fn code(retcode: i32) -> Self {
        Self { retcode, out: None }
    }

    pub fn with_out(retcode: i32, out: String) -> Self {
        Self {
            retcode,
            out: Some(out),
        }
    }
}

/// The function bound to a symbol, by hook type.
#[derive(Clone)]
pub enum SymFn {
    /// (shell, context, expanded script, output wanted).
    Action(Rc<dyn Fn(&mut Shell, &Context, &str, bool) -> ActionOutput>),
    /// (shell, access string) -> allowed.
    Access(Rc<dyn Fn(&Shell, &str) -> bool>),
    /// (shell, context) -> retcode.
    Config(Rc<dyn Fn(&mut Shell, &Context) -> i32>),
    /// (shell, context, expanded line, action retcode) -> retcode.
    Log(Rc<dyn Fn(&Shell, &Context, &str, i32) -> i32>),
}

impl std::fmt::Debug for SymFn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match self {
            SymFn::Action(_) => "Action",
            SymFn::Access(_) => "Access",
            SymFn::Config(_) => "Config",
            SymFn::Log(_) => "Log",
        };
        write!(f, "SymFn::{}", kind)
    }
}

/// A named symbol. Scheme references share the record; resolution fills
/// in the function, API style and permanence.
#[derive(Debug, Default)]
pub struct Symbol {
    name: String,
    sym_type: SymType,
    api: Cell<SymApi>,
    permanent: Cell<bool>,
    func: RefCell<Option<SymFn>>,
    plugin: RefCell<Option<String>>,
}

impl Symbol {
    pub fn new(name: &str, sym_type: SymType) -> Self {
        Self {
            name: name.to_string(),
            sym_type,
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sym_type(&self) -> SymType {
        self.sym_type
    }

    pub fn api(&self) -> SymApi {
        self.api.get()
    }

    pub fn permanent(&self) -> bool {
        self.permanent.get()
    }

    pub fn set_permanent(&self, permanent: bool) {
        self.permanent.set(permanent);
    }

    pub fn func(&self) -> Option<SymFn> {
        self.func.borrow().clone()
    }

    pub fn plugin(&self) -> Option<String> {
        self.plugin.borrow().clone()
    }

    pub fn resolved(&self) -> bool {
        self.func.borrow().is_some()
    }

    /// Copy the binding of a plugin symbol into this reference.
    pub fn bind_from(&self, other: &Symbol) {
        *self.func.borrow_mut() = other.func();
        self.api.set(other.api());
        self.permanent.set(other.permanent());
        *self.plugin.borrow_mut() = other.plugin();
    }
}

/// A registered bundle of symbols.
#[derive(Debug)]
pub struct Plugin {
    name: String,
    alias: Option<String>,
    conf: Option<String>,
    syms: Vec<Rc<Symbol>>,
}

impl Plugin {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            alias: None,
            conf: None,
            syms: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The name symbol references match: the alias when set.
    pub fn pubname(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.name)
    }

    pub fn set_alias(&mut self, alias: &str) {
        self.alias = Some(alias.to_string());
    }

    pub fn conf(&self) -> Option<&str> {
        self.conf.as_deref()
    }

    pub fn set_conf(&mut self, conf: &str) {
        self.conf = Some(conf.to_string());
    }

    /// Register a symbol. `permanent` symbols survive dry-run.
    pub fn add_sym(
        &mut self,
        name: &str,
        sym_type: SymType,
        api: SymApi,
        permanent: bool,
        func: SymFn,
    ) -> Rc<Symbol> {
        let sym = Symbol::new(name, sym_type);
        sym.api.set(api);
        sym.permanent.set(permanent);
        *sym.func.borrow_mut() = Some(func);
        *sym.plugin.borrow_mut() = Some(self.name.clone());
        let sym = Rc::new(sym);
        self.syms.push(sym.clone());
        sym
    }

    /// Find a symbol by name; `SymType::None` matches any type.
    pub fn get_sym(&self, name: &str, sym_type: SymType) -> Option<Rc<Symbol>> {
        self.syms
            .iter()
            .find(|s| {
                s.name() == name && (sym_type == SymType::None || s.sym_type() == sym_type)
            })
            .cloned()
    }

    pub fn syms(&self) -> &[Rc<Symbol>] {
        &self.syms
    }
}

/// Find a symbol across plugins. `name@plugin` pins the search to one
/// plugin's public name; a bare name matches the first provider.
pub fn find_sym(plugins: &[Plugin], name: &str, sym_type: SymType) -> Option<Rc<Symbol>> {
    let (sym_name, plugin_name) = match name.split_once('@') {
        Some((s, p)) => (s, Some(p)),
        None => (name, None),
    };

    plugins
        .iter()
        .filter(|p| plugin_name.map(|n| p.pubname() == n).unwrap_or(true))
        .find_map(|p| p.get_sym(sym_name, sym_type))
}

/// Bind every unresolved reference or report the first failure.
pub fn link_symbols(plugins: &[Plugin], unresolved: &[Rc<Symbol>]) -> Result<(), String> {
    for sym in unresolved {
        if sym.resolved() {
            continue;
        }
        let found = find_sym(plugins, sym.name(), sym.sym_type())
            .ok_or_else(|| format!("Can't resolve symbol {}", sym.name()))?;
        sym.bind_from(&found);
    }
    Ok(())
}

/// Convenience constructor for test and hook wiring.
pub fn action_fn<F>(f: F) -> SymFn
where
    F: Fn(&mut Shell, &Context, &str, bool) -> ActionOutput + 'static,
{
    SymFn::Action(Rc::new(f))
}

// ============================================================================
// Tests
// ============================================================================
