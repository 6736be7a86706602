//! Scheme Model
//!
//! The data model an XML scheme populates: parameter types, parameters,
//! commands, views, namespaces, variables and hotkeys, plus the parsed
//! argument vectors the matcher produces.

pub mod action;
pub mod command;
pub mod config;
pub mod hotkey;
pub mod nspace;
pub mod param;
pub mod pargv;
pub mod ptype;
pub mod var;
pub mod view;

pub use action::Action;
pub use command::Command;
pub use config::{ConfigDirective, ConfigOp};
pub use hotkey::HotkeyMap;
pub use nspace::{Nspace, Visibility};
pub use param::{Param, ParamMode};
pub use pargv::{Parg, Pargv, ParseStatus};
pub use ptype::{Ptype, PtypeMethod, PtypePreprocess};
pub use var::Var;
pub use view::{View, ViewMap, ViewRestore};
