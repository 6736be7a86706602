//! Command Parameters
//!
//! A PARAM is a slot in a command's grammar: a typed positional value,
//! a switch over nested alternatives, or a literal subcommand keyword.
//! Parameters nest, carry a `test` condition gating their presence, and
//! may name a completion expression.

use std::cell::RefCell;
use std::rc::Rc;

use super::ptype::Ptype;

/// How the parameter consumes input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParamMode {
    /// Value validated by the ptype.
    #[default]
    Common,
    /// Exactly one of the nested parameters matches.
    Switch,
    /// A literal keyword equal to the parameter's value.
    Subcommand,
}

impl ParamMode {
    pub fn resolve(name: &str) -> Option<Self> {
        match name {
            "common" => Some(Self::Common),
            "switch" => Some(Self::Switch),
            "subcommand" => Some(Self::Subcommand),
            _ => None,
        }
    }
}

/// A single parameter definition.
#[derive(Debug, Default)]
pub struct Param {
    name: String,
    text: Option<String>,
    ptype_name: String,
    /// Bound after the scheme is fully loaded.
    ptype: RefCell<Option<Rc<Ptype>>>,
    defval: Option<String>,
    mode: ParamMode,
    optional: bool,
    order: bool,
    hidden: bool,
    value: Option<String>,
    test: Option<String>,
    completion: Option<String>,
    access: Option<String>,
    params: RefCell<Vec<Rc<Param>>>,
}

impl Param {
    pub fn new(name: &str, text: Option<&str>, ptype_name: &str) -> Self {
        Self {
            name: name.to_string(),
            text: text.map(str::to_string),
            ptype_name: ptype_name.to_string(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn ptype_name(&self) -> &str {
        &self.ptype_name
    }

    pub fn ptype(&self) -> Option<Rc<Ptype>> {
        self.ptype.borrow().clone()
    }

    pub fn bind_ptype(&self, ptype: Rc<Ptype>) {
        *self.ptype.borrow_mut() = Some(ptype);
    }

    pub fn mode(&self) -> ParamMode {
        self.mode
    }

    pub fn set_mode(&mut self, mode: ParamMode) {
        self.mode = mode;
    }

    pub fn optional(&self) -> bool {
        self.optional
    }

    pub fn set_optional(&mut self, optional: bool) {
        self.optional = optional;
    }

    pub fn order(&self) -> bool {
        self.order
    }

    pub fn set_order(&mut self, order: bool) {
        self.order = order;
    }

    pub fn hidden(&self) -> bool {
        self.hidden
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        self.hidden = hidden;
    }

    pub fn defval(&self) -> Option<&str> {
        self.defval.as_deref()
    }

    pub fn set_defval(&mut self, defval: &str) {
        self.defval = Some(defval.to_string());
    }

    /// The literal a subcommand matches; defaults to the parameter name.
    pub fn value(&self) -> &str {
        self.value.as_deref().unwrap_or(&self.name)
    }

    pub fn set_value(&mut self, value: &str) {
        self.value = Some(value.to_string());
    }

    pub fn test(&self) -> Option<&str> {
        self.test.as_deref()
    }

    pub fn set_test(&mut self, test: &str) {
        self.test = Some(test.to_string());
    }

    pub fn completion(&self) -> Option<&str> {
        self.completion.as_deref()
    }

    pub fn set_completion(&mut self, completion: &str) {
        self.completion = Some(completion.to_string());
    }

    pub fn access(&self) -> Option<&str> {
        self.access.as_deref()
    }

    pub fn set_access(&mut self, access: &str) {
        self.access = Some(access.to_string());
    }

    pub fn insert_param(&self, param: Rc<Param>) {
        self.params.borrow_mut().push(param);
    }

    pub fn param_count(&self) -> usize {
        self.params.borrow().len()
    }

    pub fn param(&self, index: usize) -> Option<Rc<Param>> {
        self.params.borrow().get(index).cloned()
    }

    pub fn params(&self) -> Vec<Rc<Param>> {
        self.params.borrow().clone()
    }

    /// Match one token against this parameter. Subcommands compare the
    /// literal case-insensitively; everything else defers to the ptype,
    /// which returns the translated value.
    pub fn validate(&self, text: &str) -> Option<String> {
        if self.mode == ParamMode::Subcommand && !self.value().eq_ignore_ascii_case(text) {
            return None;
        }
        self.ptype.borrow().as_ref()?.translate(text)
    }

    /// Walk this parameter and its descendants.
    pub fn walk(self: &Rc<Self>, f: &mut dyn FnMut(&Rc<Param>)) {
        f(self);
        for child in self.params.borrow().iter() {
            child.walk(f);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheme::ptype::{PtypeMethod, PtypePreprocess};

    fn any_ptype() -> Rc<Ptype> {
        Rc::new(
            Ptype::new("ANY", None, ".*", PtypeMethod::Regexp, PtypePreprocess::None).unwrap(),
        )
    }

    #[test]
    fn test_common_validate() {
        let param = Param::new("addr", Some("Address"), "ANY");
        param.bind_ptype(any_ptype());
        assert_eq!(param.validate("10.0.0.1"), Some("10.0.0.1".to_string()));
    }

    #[test]
    fn test_unbound_ptype_rejects() {
        let param = Param::new("addr", None, "ANY");
        assert_eq!(param.validate("x"), None);
    }

    #[test]
    fn test_subcommand_literal() {
        let mut param = Param::new("verbose", None, "ANY");
        param.set_mode(ParamMode::Subcommand);
        let param = param;
        param.bind_ptype(any_ptype());
        assert_eq!(param.validate("verbose"), Some("verbose".to_string()));
        assert_eq!(param.validate("VERBOSE"), Some("VERBOSE".to_string()));
        assert_eq!(param.validate("terse"), None);
    }

    #[test]
    fn test_subcommand_explicit_value() {
        let mut param = Param::new("p_no", None, "ANY");
        param.set_mode(ParamMode::Subcommand);
        param.set_value("no");
        let param = param;
        param.bind_ptype(any_ptype());
        assert_eq!(param.validate("no"), Some("no".to_string()));
        assert_eq!(param.validate("p_no"), None);
    }

    #[test]
    fn test_nested_walk() {
        let root = Rc::new(Param::new("sw", None, "ANY"));
        root.insert_param(Rc::new(Param::new("a", None, "ANY")));
        root.insert_param(Rc::new(Param::new("b", None, "ANY")));
        let mut names = Vec::new();
        root.walk(&mut |p| names.push(p.name().to_string()));
        assert_eq!(names, vec!["sw", "a", "b"]);
    }

    #[test]
    fn test_value_falls_back_to_name() {
        let param = Param::new("enable", None, "ANY");
        assert_eq!(param.value(), "enable");
    }
}
