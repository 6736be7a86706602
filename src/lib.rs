//! clish - A configurable interactive CLI shell framework
//!
//! Commands are described declaratively in XML scheme files: views
//! (modes), parameter types, commands with typed parameter grammars,
//! and actions. The framework parses input, performs completion and
//! contextual help, dispatches actions through pluggable symbols, and
//! persists a hierarchical running configuration through a separate
//! daemon speaking a line-based protocol over UNIX sockets.

pub mod argv;
pub mod konf;
pub mod plugin;
pub mod scheme;
pub mod shell;
pub mod tinyrl;

pub use konf::{Client, ConfTree, Query, QueryBuilder, QueryOp};
pub use scheme::{Command, Param, ParseStatus, Ptype, View};
pub use shell::{Shell, ShellState};
pub use tinyrl::{Editor, Vt100};
