//! Parsed Arguments
//!
//! The result of matching a command line against a command's grammar:
//! an ordered vector of (parameter, validated value) pairs with lookup
//! by parameter name.

use std::rc::Rc;

use super::param::Param;

/// Outcome of a parse attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStatus {
    Ok,
    Partial,
    BadCmd,
    BadParam,
    BadHistory,
}

/// One matched parameter with its validated value.
#[derive(Debug, Clone)]
pub struct Parg {
    param: Rc<Param>,
    value: String,
}

impl Parg {
    pub fn param(&self) -> &Rc<Param> {
        &self.param
    }

    pub fn name(&self) -> &str {
        self.param.name()
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// Ordered set of parsed arguments for one command invocation.
#[derive(Debug, Clone, Default)]
pub struct Pargv {
    pargs: Vec<Parg>,
}

impl Pargv {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a parameter value, or update it if the parameter was already
    /// recorded (optional parameters may be revisited).
    pub fn insert(&mut self, param: &Rc<Param>, value: &str) {
        if let Some(parg) = self
            .pargs
            .iter_mut()
            .find(|p| p.param.name() == param.name())
        {
            parg.value = value.to_string();
            return;
        }
        self.pargs.push(Parg {
            param: param.clone(),
            value: value.to_string(),
        });
    }

    pub fn find(&self, name: &str) -> Option<&Parg> {
        self.pargs.iter().find(|p| p.param.name() == name)
    }

    pub fn count(&self) -> usize {
        self.pargs.len()
    }

    pub fn get(&self, index: usize) -> Option<&Parg> {
        self.pargs.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Parg> {
        self.pargs.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_find() {
        let mut pargv = Pargv::new();
        let p = Rc::new(Param::new("port", None, "UINT"));
        pargv.insert(&p, "8080");
        assert_eq!(pargv.count(), 1);
        assert_eq!(pargv.find("port").unwrap().value(), "8080");
        assert!(pargv.find("host").is_none());
    }

    #[test]
    fn test_insert_updates_existing() {
        let mut pargv = Pargv::new();
        let p = Rc::new(Param::new("port", None, "UINT"));
        pargv.insert(&p, "80");
        pargv.insert(&p, "443");
        assert_eq!(pargv.count(), 1);
        assert_eq!(pargv.find("port").unwrap().value(), "443");
    }

    #[test]
    fn test_order_preserved() {
        let mut pargv = Pargv::new();
        for name in ["a", "b", "c"] {
            pargv.insert(&Rc::new(Param::new(name, None, "T")), name);
        }
        let names: Vec<_> = pargv.iter().map(|p| p.name().to_string()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }
}
