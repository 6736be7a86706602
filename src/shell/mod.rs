//! Shell Engine
//!
//! The shell record owns the scheme model (views, ptypes, variables),
//! the plugin and symbol tables, the pwd stack, the input source stack,
//! the config client and the line editor. The lifecycle is
//! load → prepare → startup → loop → close.

pub mod context;
pub mod execute;
pub mod expand;
pub mod file;
pub mod help;
pub mod loader;
pub mod parse;
pub mod readline;

use std::rc::Rc;

use indexmap::IndexMap;
use tracing::debug;

use crate::konf::Client;
use crate::plugin::{builtin, Plugin, SymFn, SymType, Symbol};
use crate::scheme::command::choose_longest;
use crate::scheme::{
    Command, Param, Ptype, PtypeMethod, PtypePreprocess, Var, View, ViewMap,
};
use crate::tinyrl::Editor;
use context::Context;
pub use expand::EscapeContext;
use file::Source;

/// Default lockfile guarding administrative sessions.
pub const LOCK_PATH: &str = "/tmp/clish.lock";
/// Lock acquisition budget: 1-second polls.
pub const LOCK_WAIT: u32 = 20;
/// Name of the internal trailing-arguments ptype.
pub const PTYPE_ARGS: &str = "__ptype_ARGS";

/// Overall shell state, surfaced as the process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShellState {
    #[default]
    Initializing,
    Ok,
    Unknown,
    IoError,
    ScriptError,
    SyntaxError,
    SystemError,
    Helping,
    Eof,
    Closing,
}

impl ShellState {
    pub fn exit_code(self) -> i32 {
        match self {
            ShellState::Ok | ShellState::Eof | ShellState::Closing => 0,
            ShellState::ScriptError => 1,
            ShellState::SyntaxError => 2,
            _ => 3,
        }
    }
}

/// One level of the pwd stack: how the user got here and the view-id
/// bindings seeded on entry.
#[derive(Debug, Clone, Default)]
pub struct Pwd {
    pub line: Option<String>,
    pub view: String,
    pub viewid: IndexMap<String, String>,
}

/// The hook table: one symbol per hook type.
#[derive(Debug, Clone)]
pub struct HookTable {
    pub action: Rc<Symbol>,
    pub access: Rc<Symbol>,
    pub config: Rc<Symbol>,
    pub log: Rc<Symbol>,
}

impl HookTable {
    fn new() -> Self {
        Self {
            action: Rc::new(Symbol::new("clish_script", SymType::Action)),
            access: Rc::new(Symbol::new("clish_hook_access", SymType::Access)),
            config: Rc::new(Symbol::new("clish_hook_config", SymType::Config)),
            log: Rc::new(Symbol::new("clish_hook_log", SymType::Log)),
        }
    }

    pub fn get(&self, sym_type: SymType) -> Option<Rc<Symbol>> {
        match sym_type {
            SymType::Action => Some(self.action.clone()),
            SymType::Access => Some(self.access.clone()),
            SymType::Config => Some(self.config.clone()),
            SymType::Log => Some(self.log.clone()),
            SymType::None => None,
        }
    }
}

/// The shell instance.
pub struct Shell {
    views: ViewMap,
    global: Rc<View>,
    ptypes: IndexMap<String, Rc<Ptype>>,
    vars: IndexMap<String, Rc<Var>>,
    plugins: Vec<Plugin>,
    /// Plugin names requested by the scheme.
    requested_plugins: Vec<String>,
    unresolved_syms: Vec<Rc<Symbol>>,
    hooks: HookTable,
    overview: Option<String>,
    startup_cmd: Option<Rc<Command>>,
    startup_view: Option<String>,
    startup_viewid: Option<String>,
    wdog_cmd: Option<Rc<Command>>,
    idle_timeout: u32,
    wdog_timeout: u32,
    pub(crate) wdog_active: bool,
    state: ShellState,
    pwd: Vec<Pwd>,
    depth: Option<usize>,
    files: Vec<Source>,
    client: Option<Client>,
    lockfile: Option<String>,
    default_shebang: String,
    interactive: bool,
    log: bool,
    dryrun: bool,
    user: String,
    pub(crate) editor: Option<Editor>,
    /// Terminal size cached while the editor is detached.
    pub(crate) term_size: (usize, usize),
}

impl Shell {
    pub fn new(editor: Option<Editor>) -> Self {
        let global = Rc::new(View::new("global", None));
        let mut views = ViewMap::new();
        views.insert("global".to_string(), global.clone());

        let hooks = HookTable::new();
        let unresolved_syms = vec![
            hooks.action.clone(),
            hooks.access.clone(),
            hooks.config.clone(),
            hooks.log.clone(),
        ];

        let mut shell = Self {
            views,
            global,
            ptypes: IndexMap::new(),
            vars: IndexMap::new(),
            plugins: Vec::new(),
            requested_plugins: Vec::new(),
            unresolved_syms,
            hooks,
            overview: None,
            startup_cmd: None,
            startup_view: None,
            startup_viewid: None,
            wdog_cmd: None,
            idle_timeout: 0,
            wdog_timeout: 0,
            wdog_active: false,
            state: ShellState::Initializing,
            pwd: Vec::new(),
            depth: None,
            files: Vec::new(),
            client: None,
            lockfile: Some(LOCK_PATH.to_string()),
            default_shebang: "/bin/sh".to_string(),
            interactive: true,
            log: false,
            dryrun: false,
            user: user_name_from_env(),
            editor,
            term_size: (80, 24),
        };

        // The internal ptype backing trailing-args parameters.
        let _ = shell.find_create_ptype(
            PTYPE_ARGS,
            Some("Arguments"),
            "[^\\\\]+",
            PtypeMethod::Regexp,
            PtypePreprocess::None,
        );

        shell
    }

    /// A prepared shell with no terminal, for unit tests.
    #[cfg(test)]
    pub fn for_tests() -> Self {
        let mut shell = Self::new(None);
        shell.prepare().expect("prepare test shell");
        shell
    }

    // ------------------------------------------------------------------
    // Registries
    // ------------------------------------------------------------------

    pub fn global(&self) -> Rc<View> {
        self.global.clone()
    }

    pub fn views(&self) -> &ViewMap {
        &self.views
    }

    pub fn find_view(&self, name: &str) -> Option<Rc<View>> {
        self.views.get(name).cloned()
    }

    pub fn find_create_view(&mut self, name: &str, prompt: Option<&str>) -> Rc<View> {
        if let Some(view) = self.views.get(name) {
            if let Some(prompt) = prompt {
                if view.prompt().is_none() {
                    view.set_prompt(prompt);
                }
            }
            return view.clone();
        }
        let view = Rc::new(View::new(name, prompt));
        self.views.insert(name.to_string(), view.clone());
        view
    }

    pub fn find_ptype(&self, name: &str) -> Option<Rc<Ptype>> {
        self.ptypes.get(name).cloned()
    }

    pub fn find_create_ptype(
        &mut self,
        name: &str,
        text: Option<&str>,
        pattern: &str,
        method: PtypeMethod,
        preprocess: PtypePreprocess,
    ) -> Result<Rc<Ptype>, String> {
        if let Some(ptype) = self.ptypes.get(name) {
            return Ok(ptype.clone());
        }
        let ptype = Rc::new(Ptype::new(name, text, pattern, method, preprocess)?);
        self.ptypes.insert(name.to_string(), ptype.clone());
        Ok(ptype)
    }

    pub fn find_var(&self, name: &str) -> Option<Rc<Var>> {
        self.vars.get(name).cloned()
    }

    /// Register a global variable; duplicates are rejected.
    pub fn insert_var(&mut self, var: Var) -> Result<(), String> {
        let name = var.name().to_string();
        if self.vars.contains_key(&name) {
            return Err(format!("Duplicate VAR {}", name));
        }
        self.vars.insert(name, Rc::new(var));
        Ok(())
    }

    pub fn overview(&self) -> Option<String> {
        self.overview.clone()
    }

    /// Install the overview text; a scheme may carry only one.
    pub fn set_overview(&mut self, text: &str) -> Result<(), String> {
        if self.overview.is_some() {
            return Err("Duplicate OVERVIEW".to_string());
        }
        self.overview = Some(text.to_string());
        Ok(())
    }

    pub fn startup_cmd(&self) -> Option<Rc<Command>> {
        self.startup_cmd.clone()
    }

    pub fn set_startup_cmd(&mut self, cmd: Rc<Command>) -> Result<(), String> {
        if self.startup_cmd.is_some() {
            return Err("Duplicate STARTUP".to_string());
        }
        self.startup_cmd = Some(cmd);
        Ok(())
    }

    /// Override the startup command's target view.
    pub fn set_startup_view(&mut self, view: &str) {
        self.startup_view = Some(view.to_string());
    }

    /// Override the startup command's view-id assignments.
    pub fn set_startup_viewid(&mut self, viewid: &str) {
        self.startup_viewid = Some(viewid.to_string());
    }

    pub fn wdog_cmd(&self) -> Option<Rc<Command>> {
        self.wdog_cmd.clone()
    }

    pub fn set_wdog_cmd(&mut self, cmd: Rc<Command>) -> Result<(), String> {
        if self.wdog_cmd.is_some() {
            return Err("Duplicate WATCHDOG".to_string());
        }
        self.wdog_cmd = Some(cmd);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Symbols and plugins
    // ------------------------------------------------------------------

    /// Record a symbol reference for the post-load resolution pass.
    /// References to the same name and type share one record.
    pub fn add_unresolved_sym(&mut self, name: &str, sym_type: SymType) -> Rc<Symbol> {
        if let Some(sym) = self
            .unresolved_syms
            .iter()
            .find(|s| s.name() == name && s.sym_type() == sym_type)
        {
            return sym.clone();
        }
        let sym = Rc::new(Symbol::new(name, sym_type));
        self.unresolved_syms.push(sym.clone());
        sym
    }

    pub fn request_plugin(&mut self, name: &str) {
        if !self.requested_plugins.iter().any(|n| n == name) {
            self.requested_plugins.push(name.to_string());
        }
    }

    pub fn hook(&self, sym_type: SymType) -> Option<Rc<Symbol>> {
        self.hooks.get(sym_type)
    }

    /// Evaluate an access expression through the access hook. A missing
    /// expression allows; an unresolved hook denies.
    pub fn check_access(&self, access: Option<&str>) -> bool {
        let Some(access) = access else {
            return true;
        };
        match self.hooks.access.func() {
            Some(SymFn::Access(f)) => f(self, access),
            _ => false,
        }
    }

    // ------------------------------------------------------------------
    // Prepare
    // ------------------------------------------------------------------

    /// Load plugins, resolve symbols and ptype references, convert
    /// aliases to links, and drop access-denied elements.
    pub fn prepare(&mut self) -> Result<(), String> {
        // The builtin plugin always loads first.
        let mut plugin = Plugin::new("clish");
        builtin::init_clish(&mut plugin);
        self.plugins.push(plugin);
        for name in self.requested_plugins.clone() {
            if name == "clish" {
                continue;
            }
            return Err(format!("Can't load plugin {}", name));
        }

        crate::plugin::link_symbols(&self.plugins, &self.unresolved_syms)?;

        self.bind_ptypes()?;
        self.resolve_aliases()?;
        self.filter_access();

        debug!(
            views = self.views.len(),
            ptypes = self.ptypes.len(),
            "shell prepared"
        );
        Ok(())
    }

    fn bind_param_ptype(&self, param: &Rc<Param>) -> Result<(), String> {
        if !param.ptype_name().is_empty() {
            let ptype = self
                .find_ptype(param.ptype_name())
                .ok_or_else(|| format!("Unknown ptype {}", param.ptype_name()))?;
            param.bind_ptype(ptype);
        }
        for child in param.params() {
            self.bind_param_ptype(&child)?;
        }
        Ok(())
    }

    fn bind_cmd_ptypes(&self, cmd: &Rc<Command>) -> Result<(), String> {
        for param in cmd.params() {
            self.bind_param_ptype(&param)?;
        }
        if let Some(args) = cmd.args() {
            self.bind_param_ptype(&args)?;
        }
        Ok(())
    }

    fn bind_ptypes(&self) -> Result<(), String> {
        for view in self.views.values() {
            for cmd in view.commands() {
                self.bind_cmd_ptypes(&cmd)?;
            }
        }
        if let Some(cmd) = &self.startup_cmd {
            self.bind_cmd_ptypes(cmd)?;
        }
        if let Some(cmd) = &self.wdog_cmd {
            self.bind_cmd_ptypes(cmd)?;
        }
        Ok(())
    }

    /// Convert alias commands into links sharing the target's body.
    fn resolve_aliases(&mut self) -> Result<(), String> {
        for view in self.views.values() {
            for cmd in view.commands() {
                let Some((alias_name, alias_view)) = cmd.alias() else {
                    continue;
                };
                let target_view = self
                    .views
                    .get(alias_view)
                    .ok_or_else(|| format!("Broken alias view {}", alias_view))?;
                let target = target_view
                    .local_command(alias_name)
                    .ok_or_else(|| format!("Broken alias {}", alias_name))?;
                let link = Command::new_link(cmd.name(), cmd.text(), &target);
                view.replace_command(Rc::new(link));
            }
        }
        Ok(())
    }

    /// Drop elements whose access expression the current user fails.
    fn filter_access(&mut self) {
        let denied_views: Vec<String> = self
            .views
            .values()
            .filter(|v| !self.check_access(v.access().as_deref()))
            .map(|v| v.name().to_string())
            .collect();
        for name in denied_views {
            self.views.shift_remove(&name);
        }

        for view in self.views.values() {
            let denied: Vec<String> = view
                .commands()
                .iter()
                .filter(|c| !self.check_access(c.access()))
                .map(|c| c.name().to_string())
                .collect();
            for name in denied {
                view.remove_command(&name);
            }
            view.retain_nspaces(|ns| self.check_access(ns.access()));
        }
    }

    // ------------------------------------------------------------------
    // Pwd stack
    // ------------------------------------------------------------------

    pub fn depth(&self) -> Option<usize> {
        self.depth
    }

    pub fn set_depth(&mut self, depth: usize) {
        if depth < self.pwd.len() {
            self.depth = Some(depth);
        }
    }

    pub fn current_view(&self) -> Option<Rc<View>> {
        let pwd = self.pwd.get(self.depth?)?;
        self.views.get(&pwd.view).cloned()
    }

    pub fn pwd_at(&self, index: usize) -> Option<&Pwd> {
        self.pwd.get(index)
    }

    /// Record entry into a view at its depth, seeding view-id bindings
    /// from the command's template.
    pub fn set_pwd(
        &mut self,
        line: Option<String>,
        view: &Rc<View>,
        viewid: Option<&str>,
        context: &Context,
    ) {
        let index = view.depth();
        let viewid_map = match viewid {
            Some(template) => expand::expand_viewid(self, template, context),
            None => IndexMap::new(),
        };
        while self.pwd.len() <= index {
            self.pwd.push(Pwd::default());
        }
        self.pwd[index] = Pwd {
            line,
            view: view.name().to_string(),
            viewid: viewid_map,
        };
        self.depth = Some(index);
    }

    /// The quoted pwd lines for levels 1..=depth, or None when a level
    /// has no recorded line.
    pub fn pwd_full(&self, depth: usize) -> Option<Vec<String>> {
        let mut out = Vec::new();
        for i in 1..=depth {
            out.push(self.pwd.get(i)?.line.clone()?);
        }
        Some(out)
    }

    /// View depth a command's owning view sits at.
    pub fn cmd_depth(&self, cmd: &Rc<Command>) -> usize {
        cmd.pview()
            .and_then(|name| self.views.get(name))
            .map(|v| v.depth())
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Command resolution
    // ------------------------------------------------------------------

    /// The longest-matching command for the line: the current view and
    /// the global view both participate; the local view wins ties.
    pub fn resolve_command(&self, line: &str) -> Option<Rc<Command>> {
        let global = self.global.resolve_command(line, true, &self.views);
        let local = self
            .current_view()
            .and_then(|v| v.resolve_command(line, true, &self.views));
        choose_longest(local, global)
    }

    // ------------------------------------------------------------------
    // Input sources
    // ------------------------------------------------------------------

    pub fn push_file(&mut self, path: &str, stop_on_error: bool) -> std::io::Result<()> {
        let source = Source::from_path(&expand::tilde_expand(path), stop_on_error)?;
        self.files.push(source);
        Ok(())
    }

    pub fn push_commands(&mut self, commands: Vec<String>, stop_on_error: bool) {
        self.files.push(Source::from_commands(commands, stop_on_error));
    }

    pub fn pop_file(&mut self) -> bool {
        self.files.pop().is_some() && !self.files.is_empty()
    }

    pub fn current_file(&mut self) -> Option<&mut Source> {
        self.files.last_mut()
    }

    pub fn has_files(&self) -> bool {
        !self.files.is_empty()
    }

    // ------------------------------------------------------------------
    // Misc state
    // ------------------------------------------------------------------

    pub fn state(&self) -> ShellState {
        self.state
    }

    pub fn set_state(&mut self, state: ShellState) {
        self.state = state;
    }

    pub fn client(&self) -> Option<&Client> {
        self.client.as_ref()
    }

    pub fn client_mut(&mut self) -> Option<&mut Client> {
        self.client.as_mut()
    }

    pub fn set_socket(&mut self, path: &str) {
        self.client = Some(Client::new(path));
    }

    pub fn lockfile(&self) -> Option<&str> {
        self.lockfile.as_deref()
    }

    /// A `None` path disables locking shell-wide.
    pub fn set_lockfile(&mut self, path: Option<&str>) {
        self.lockfile = path.map(str::to_string);
    }

    pub fn default_shebang(&self) -> &str {
        &self.default_shebang
    }

    pub fn set_default_shebang(&mut self, shebang: &str) {
        self.default_shebang = shebang.to_string();
    }

    pub fn interactive(&self) -> bool {
        self.interactive
    }

    pub fn set_interactive(&mut self, interactive: bool) {
        self.interactive = interactive;
    }

    pub fn log_enabled(&self) -> bool {
        self.log
    }

    pub fn set_log(&mut self, log: bool) {
        self.log = log;
    }

    pub fn dryrun(&self) -> bool {
        self.dryrun
    }

    pub fn set_dryrun(&mut self, dryrun: bool) {
        self.dryrun = dryrun;
    }

    pub fn user_name(&self) -> &str {
        &self.user
    }

    pub fn idle_timeout(&self) -> u32 {
        self.idle_timeout
    }

    pub fn set_idle_timeout(&mut self, timeout: u32) {
        self.idle_timeout = timeout;
    }

    pub fn wdog_timeout(&self) -> u32 {
        self.wdog_timeout
    }

    pub fn set_wdog_timeout(&mut self, timeout: u32) {
        self.wdog_timeout = timeout;
    }

    // ------------------------------------------------------------------
    // Editor access
    // ------------------------------------------------------------------

    pub fn term_width(&self) -> usize {
        self.editor
            .as_ref()
            .map(|e| e.width())
            .unwrap_or(self.term_size.0)
    }

    pub fn term_height(&self) -> usize {
        self.editor
            .as_ref()
            .map(|e| e.height())
            .unwrap_or(self.term_size.1)
    }

    pub fn term_isatty(&self) -> bool {
        self.editor.as_ref().map(|e| e.isatty()).unwrap_or(false)
    }

    pub fn utf8(&self) -> bool {
        self.editor.as_ref().map(|e| e.utf8()).unwrap_or(true)
    }

    pub fn set_utf8(&mut self, utf8: bool) {
        if let Some(editor) = self.editor.as_mut() {
            editor.set_utf8(utf8);
        }
    }

    pub fn print(&mut self, text: &str) {
        match self.editor.as_mut() {
            Some(editor) => editor.print(text),
            None => {
                use std::io::Write;
                let mut out = std::io::stdout();
                let _ = out.write_all(text.as_bytes());
                let _ = out.flush();
            }
        }
    }

    pub fn stifle_history(&mut self, stifle: usize) {
        if let Some(editor) = self.editor.as_mut() {
            editor.history_mut().stifle(stifle);
        }
    }

    pub fn save_history(&self, path: &str) -> std::io::Result<()> {
        if let Some(editor) = self.editor.as_ref() {
            editor
                .history()
                .save(std::path::Path::new(&expand::tilde_expand(path)))?;
        }
        Ok(())
    }

    pub fn restore_history(&mut self, path: &str) {
        if let Some(editor) = self.editor.as_mut() {
            let _ = editor
                .history_mut()
                .restore(std::path::Path::new(&expand::tilde_expand(path)));
        }
    }

    /// Numbered history listing, oldest first.
    pub fn history_listing(&self) -> String {
        let Some(editor) = self.editor.as_ref() else {
            return String::new();
        };
        let history = editor.history();
        let mut out = String::new();
        for (pos, line) in history.iter().enumerate() {
            out.push_str(&format!("{:4}  {}\n", history.index(pos), line));
        }
        out
    }

    // ------------------------------------------------------------------
    // Expansion and execution fronts
    // ------------------------------------------------------------------

    pub fn expand(
        &mut self,
        text: &str,
        escape: EscapeContext,
        context: &Context,
    ) -> Option<String> {
        expand::expand(self, text, escape, context)
    }

    /// The entered line reconstructed from the resolved command and its
    /// visible parameters.
    pub fn cmd_line(&self, context: &Context) -> String {
        expand::cmd_line(context, false)
    }

    pub fn full_cmd_line(&self, context: &Context) -> String {
        expand::cmd_line(context, true)
    }

    /// Run the startup command: print the banner, then execute it.
    pub fn startup(&mut self) -> Result<(), ShellState> {
        let Some(cmd) = self.startup_cmd.clone() else {
            eprintln!("Error: Can't get valid STARTUP tag.");
            return Err(ShellState::SystemError);
        };
        let cmd = if self.startup_view.is_some() || self.startup_viewid.is_some() {
            let mut forced = (*cmd).clone();
            if let Some(view) = &self.startup_view {
                forced.set_viewname(view);
            }
            if let Some(viewid) = &self.startup_viewid {
                forced.set_viewid(viewid);
            }
            Rc::new(forced)
        } else {
            cmd
        };
        if let Some(banner) = cmd.detail() {
            self.print(&format!("{}\n", banner));
        }
        let mut context = Context::with_cmd(cmd, crate::scheme::Pargv::new());
        // The log hook gets an initialization call.
        if self.log {
            execute::exec_log(self, &context, "", 0);
        }
        let result = execute::execute(self, &mut context);
        if result != 0 {
            return Err(ShellState::ScriptError);
        }
        self.state = ShellState::Ok;
        Ok(())
    }
}

fn user_name_from_env() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("LOGNAME"))
        .unwrap_or_else(|_| format!("uid{}", unsafe { libc::getuid() }))
}

// ============================================================================
// Tests
// ============================================================================
