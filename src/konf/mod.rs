//! Running Configuration
//!
//! The configuration subsystem: the ordered tree of configuration
//! lines, the textual query language, the daemon service loop and the
//! shell-side client.

pub mod client;
pub mod daemon;
pub mod query;
pub mod tree;

pub use client::{Client, ClientError, KONFD_SOCKET_PATH};
pub use query::{MsgBuf, Query, QueryBuilder, QueryOp};
pub use tree::ConfTree;
