//! Command Actions
//!
//! An ACTION is the script body a command executes, plus an optional
//! shebang and an optional builtin symbol reference. The symbol is
//! stored by name at load time and bound to a plugin symbol once all
//! plugins are loaded.

use std::cell::RefCell;
use std::rc::Rc;

use crate::plugin::Symbol;

/// Script body with its interpreter selection and builtin binding.
#[derive(Debug, Clone, Default)]
pub struct Action {
    script: Option<String>,
    shebang: Option<String>,
    builtin: RefCell<Option<Rc<Symbol>>>,
}

impl Action {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script(&self) -> Option<&str> {
        self.script.as_deref()
    }

    pub fn set_script(&mut self, script: &str) {
        self.script = Some(script.to_string());
    }

    pub fn shebang(&self) -> Option<&str> {
        self.shebang.as_deref()
    }

    pub fn set_shebang(&mut self, shebang: &str) {
        // A leading "#!" in the attribute is tolerated.
        self.shebang = Some(shebang.trim_start_matches("#!").to_string());
    }

    /// The shared symbol record; resolution fills its function later.
    pub fn builtin(&self) -> Option<Rc<Symbol>> {
        self.builtin.borrow().clone()
    }

    pub fn set_builtin(&self, sym: Rc<Symbol>) {
        *self.builtin.borrow_mut() = Some(sym);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shebang_strip() {
        let mut action = Action::new();
        action.set_shebang("#!/usr/bin/env lua");
        assert_eq!(action.shebang(), Some("/usr/bin/env lua"));
        action.set_shebang("/bin/sh");
        assert_eq!(action.shebang(), Some("/bin/sh"));
    }

    #[test]
    fn test_default_empty() {
        let action = Action::new();
        assert!(action.script().is_none());
        assert!(action.builtin().is_none());
    }
}
