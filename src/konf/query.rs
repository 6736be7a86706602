//! Configuration Queries
//!
//! The textual request language spoken between the shell, the `konf`
//! client and the daemon: one newline- or NUL-terminated line of short
//! option tokens plus positional pwd components.

use crate::argv::{self, Argv};

/// Operation requested by a query (or carried by an answer).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum QueryOp {
    #[default]
    None,
    Ok,
    Error,
    Set,
    Unset,
    Stream,
    Dump,
}

/// A decoded query line.
#[derive(Debug, Clone)]
pub struct Query {
    pub op: QueryOp,
    pub pattern: Option<String>,
    pub priority: u16,
    pub seq: bool,
    pub seq_num: u16,
    pub pwd: Vec<String>,
    pub line: Option<String>,
    pub path: Option<String>,
    pub splitter: bool,
    pub unique: bool,
    pub depth: i32,
}

impl Default for Query {
    fn default() -> Self {
        Self {
            op: QueryOp::None,
            pattern: None,
            priority: 0,
            seq: false,
            seq_num: 0,
            pwd: Vec::new(),
            line: None,
            path: None,
            splitter: true,
            unique: true,
            depth: -1,
        }
    }
}

fn parse_u16(text: &str) -> u16 {
    let value = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).unwrap_or(0)
    } else {
        text.parse::<u32>().unwrap_or(0)
    };
    value.min(0xffff) as u16
}

impl Query {
    /// Parse a request line. Returns None for queries the daemon should
    /// answer `-e` to: no operation, or a set without pattern and line.
    pub fn parse(text: &str) -> Option<Self> {
        let argv = Argv::new(text);
        let mut query = Self::default();
        let mut i = 0;

        while i < argv.count() {
            let tok = argv.get(i)?;
            let mut value = |i: &mut usize| -> Option<String> {
                *i += 1;
                argv.get(*i).map(str::to_string)
            };
            match tok {
                "-s" | "--set" => query.op = QueryOp::Set,
                "-u" | "--unset" => query.op = QueryOp::Unset,
                "-o" | "--ok" => query.op = QueryOp::Ok,
                "-e" | "--error" => query.op = QueryOp::Error,
                "-d" | "--dump" => query.op = QueryOp::Dump,
                "-t" | "--stream" => query.op = QueryOp::Stream,
                "-p" | "--priority" => query.priority = parse_u16(&value(&mut i)?),
                "-q" | "--seq" => {
                    query.seq = true;
                    query.seq_num = parse_u16(&value(&mut i)?);
                }
                "-r" | "--pattern" => query.pattern = Some(value(&mut i)?),
                "-l" | "--line" => query.line = Some(value(&mut i)?),
                "-f" | "--file" => query.path = Some(value(&mut i)?),
                "-i" | "--splitter" => query.splitter = false,
                "-n" | "--non-unique" => query.unique = false,
                "-h" | "--depth" => query.depth = i32::from(parse_u16(&value(&mut i)?)),
                pwd => query.pwd.push(pwd.to_string()),
            }
            i += 1;
        }

        if query.op == QueryOp::None {
            return None;
        }
        if query.op == QueryOp::Set && (query.pattern.is_none() || query.line.is_none()) {
            return None;
        }
        Some(query)
    }
}

/// Quote a token for the wire: escape backslash and double quote, wrap
/// in double quotes.
pub fn quote(text: &str) -> String {
    format!("\"{}\"", argv::encode(text, "\\\""))
}

/// Compose helpers used by the shell-side config hook and the `konf`
/// binary. Pwd components are appended one quoted token per level.
#[derive(Debug, Default)]
pub struct QueryBuilder {
    parts: Vec<String>,
}

impl QueryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn op(mut self, op: QueryOp) -> Self {
        let tok = match op {
            QueryOp::Set => "-s",
            QueryOp::Unset => "-u",
            QueryOp::Dump => "-d",
            QueryOp::Stream => "-t",
            QueryOp::Ok => "-o",
            QueryOp::Error => "-e",
            QueryOp::None => return self,
        };
        self.parts.push(tok.to_string());
        self
    }

    pub fn line(mut self, line: &str) -> Self {
        self.parts.push("-l".to_string());
        self.parts.push(quote(line));
        self
    }

    pub fn pattern(mut self, pattern: &str) -> Self {
        self.parts.push("-r".to_string());
        self.parts.push(quote(pattern));
        self
    }

    pub fn priority(mut self, priority: u16) -> Self {
        if priority != 0 {
            self.parts.push(format!("-p 0x{:x}", priority));
        }
        self
    }

    pub fn seq(mut self, seq_num: u16) -> Self {
        self.parts.push(format!("-q {}", seq_num));
        self
    }

    pub fn file(mut self, path: &str) -> Self {
        self.parts.push("-f".to_string());
        self.parts.push(quote(path));
        self
    }

    pub fn no_splitter(mut self) -> Self {
        self.parts.push("-i".to_string());
        self
    }

    pub fn non_unique(mut self) -> Self {
        self.parts.push("-n".to_string());
        self
    }

    pub fn depth(mut self, depth: u16) -> Self {
        self.parts.push(format!("-h {}", depth));
        self
    }

    pub fn pwd(mut self, components: &[String]) -> Self {
        for c in components {
            self.parts.push(quote(c));
        }
        self
    }

    pub fn build(self) -> String {
        self.parts.join(" ")
    }
}

/// Incremental message buffer: accumulates socket reads and yields
/// complete newline- or NUL-terminated strings.
#[derive(Debug, Default)]
pub struct MsgBuf {
    data: Vec<u8>,
}

impl MsgBuf {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn feed(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    /// Extract the next complete message, excluding its terminator.
    pub fn next_msg(&mut self) -> Option<String> {
        let pos = self.data.iter().position(|&b| b == 0 || b == b'\n')?;
        let msg: Vec<u8> = self.data.drain(..=pos).take(pos).collect();
        Some(String::from_utf8_lossy(&msg).into_owned())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set() {
        let q = Query::parse("-s -l \"interface eth0\" -r \"^interface eth0$\" -p 0x100")
            .expect("parse");
        assert_eq!(q.op, QueryOp::Set);
        assert_eq!(q.line.as_deref(), Some("interface eth0"));
        assert_eq!(q.pattern.as_deref(), Some("^interface eth0$"));
        assert_eq!(q.priority, 0x100);
        assert!(q.unique);
        assert!(q.splitter);
        assert!(q.pwd.is_empty());
    }

    #[test]
    fn test_parse_set_requires_line_and_pattern() {
        assert!(Query::parse("-s -l \"x\"").is_none());
        assert!(Query::parse("-s -r \"x\"").is_none());
        assert!(Query::parse("").is_none());
    }

    #[test]
    fn test_parse_pwd_components() {
        let q = Query::parse("-u -r \".*\" \"interface eth0\" \"ip\"").expect("parse");
        assert_eq!(q.op, QueryOp::Unset);
        assert_eq!(q.pwd, vec!["interface eth0", "ip"]);
    }

    #[test]
    fn test_parse_flags() {
        let q = Query::parse("-s -l \"a\" -r \"a\" -i -n -q 5 -h 2").expect("parse");
        assert!(!q.splitter);
        assert!(!q.unique);
        assert!(q.seq);
        assert_eq!(q.seq_num, 5);
        assert_eq!(q.depth, 2);
    }

    #[test]
    fn test_parse_answer_ops() {
        assert_eq!(Query::parse("-o").unwrap().op, QueryOp::Ok);
        assert_eq!(Query::parse("-e").unwrap().op, QueryOp::Error);
        assert_eq!(Query::parse("-t").unwrap().op, QueryOp::Stream);
    }

    #[test]
    fn test_builder_round_trip() {
        let text = QueryBuilder::new()
            .op(QueryOp::Set)
            .line("interface \"lo\"")
            .pattern("^interface .*$")
            .priority(0x0100)
            .pwd(&["system config".to_string()])
            .build();
        let q = Query::parse(&text).expect("round trip");
        assert_eq!(q.op, QueryOp::Set);
        assert_eq!(q.line.as_deref(), Some("interface \"lo\""));
        assert_eq!(q.pattern.as_deref(), Some("^interface .*$"));
        assert_eq!(q.priority, 0x0100);
        assert_eq!(q.pwd, vec!["system config"]);
    }

    #[test]
    fn test_msgbuf_framing() {
        let mut buf = MsgBuf::new();
        buf.feed(b"-o\0-e\n-t");
        assert_eq!(buf.next_msg().as_deref(), Some("-o"));
        assert_eq!(buf.next_msg().as_deref(), Some("-e"));
        assert_eq!(buf.next_msg(), None);
        buf.feed(b"\0");
        assert_eq!(buf.next_msg().as_deref(), Some("-t"));
    }

    #[test]
    fn test_msgbuf_empty_line() {
        let mut buf = MsgBuf::new();
        buf.feed(b"line one\n\nrest");
        assert_eq!(buf.next_msg().as_deref(), Some("line one"));
        assert_eq!(buf.next_msg().as_deref(), Some(""));
        assert_eq!(buf.next_msg(), None);
    }
}
