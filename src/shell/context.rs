//! Invocation Context
//!
//! The per-invocation state threaded through expansion, hooks and
//! action execution: the resolved command, its parsed arguments and the
//! action being run. There is no module-level mutable state; everything
//! an action sees arrives through the context and the shell reference.

use std::rc::Rc;

use crate::scheme::{Action, Command, Pargv};

#[derive(Debug, Clone, Default)]
pub struct Context {
    pub cmd: Option<Rc<Command>>,
    pub pargv: Option<Pargv>,
    pub action: Option<Action>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cmd(cmd: Rc<Command>, pargv: Pargv) -> Self {
        let action = cmd.action().borrow().clone();
        Self {
            cmd: Some(cmd),
            pargv: Some(pargv),
            action: Some(action),
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
    fn test_with_cmd_captures_action() {
        let cmd = Command::new("show", Some("Show"));
        cmd.action().borrow_mut().set_script("echo ok");
        let ctx = Context::with_cmd(Rc::new(cmd), Pargv::new());
        assert_eq!(ctx.action.as_ref().unwrap().script(), Some("echo ok"));
        assert!(ctx.pargv.is_some());
    }
}
