//! Configuration Daemon Service
//!
//! The in-memory tree served over UNIX stream sockets. Clients send
//! newline- or NUL-terminated queries; each is answered with `-o` or
//! `-e`, and a `dump` without a file target streams the subtree first
//! (`-t`, text lines, empty line). Connections on the read-only socket
//! may only dump.
//!
//! The daemon is single threaded: one current-thread runtime, one task
//! per connection, the tree behind a local `Rc<RefCell>`. Mutations are
//! synchronous and visible to every subsequent query.

use std::cell::RefCell;
use std::rc::Rc;

use regex_lite::Regex;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, info, warn};

use super::query::{MsgBuf, Query, QueryOp};
use super::tree::ConfTree;

/// Outcome of one processed query.
#[derive(Debug)]
pub struct Answer {
    /// Stream text to send before the status, for socket dumps.
    pub stream: Option<String>,
    pub ok: bool,
}

impl Answer {
    fn error() -> Self {
        Self {
            stream: None,
            ok: false,
        }
    }

    fn ok() -> Self {
        Self {
            stream: None,
            ok: true,
        }
    }
}

/// Execute one query against the tree. `rw` reflects which listen
/// socket the connection arrived on.
pub fn process_query(tree: &mut ConfTree, rw: bool, text: &str) -> Answer {
    debug!(request = text, "config query");

    let Some(query) = Query::parse(text) else {
        return Answer::error();
    };

    // The read-only socket permits nothing but dump.
    if !rw && query.op != QueryOp::Dump {
        debug!("permission denied: read-only socket");
        return Answer::error();
    }

    let pwdc = query.pwd.len();
    let Some(node) = tree.navigate_mut(&query.pwd) else {
        debug!("unknown pwd path");
        return Answer::error();
    };

    match query.op {
        QueryOp::Set => {
            let line = query.line.as_deref().unwrap_or_default();
            let pattern = query.pattern.as_deref().unwrap_or_default();
            if query.unique {
                match node.del_pattern(
                    Some(line),
                    true,
                    pattern,
                    query.priority,
                    query.seq,
                    query.seq_num,
                ) {
                    Err(_) => return Answer::error(),
                    Ok(kept) if kept > 0 => return Answer::ok(),
                    Ok(_) => {}
                }
            }
            let pos = node.new_conf(line, query.priority, query.seq, query.seq_num);
            let entry = &mut node.children_mut()[pos];
            entry.set_splitter(query.splitter);
            entry.set_depth(pwdc as i32);
            Answer::ok()
        }

        QueryOp::Unset => {
            let pattern = query.pattern.as_deref().unwrap_or_default();
            match node.del_pattern(None, true, pattern, query.priority, query.seq, query.seq_num)
            {
                Ok(_) => Answer::ok(),
                Err(_) => Answer::error(),
            }
        }

        QueryOp::Dump => {
            let regex = match query.pattern.as_deref() {
                Some(p) => match Regex::new(&format!("(?i){}", p)) {
                    Ok(re) => Some(re),
                    Err(_) => return Answer::error(),
                },
                None => None,
            };
            let mut out = String::new();
            node.dump(
                &mut out,
                regex.as_ref(),
                pwdc as i32 - 1,
                query.depth,
                query.seq,
                0,
            );
            match query.path {
                Some(path) => match std::fs::write(&path, &out) {
                    Ok(()) => Answer::ok(),
                    Err(e) => {
                        warn!(path = %path, error = %e, "config dump to file failed");
                        Answer::error()
                    }
                },
                None => Answer {
                    stream: Some(out),
                    ok: true,
                },
            }
        }

        _ => Answer::error(),
    }
}

/// Serve one client connection until it closes.
pub async fn handle_connection(mut stream: UnixStream, rw: bool, tree: Rc<RefCell<ConfTree>>) {
    let mut buf = MsgBuf::new();
    let mut chunk = [0u8; 4096];

    loop {
        let n = match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        buf.feed(&chunk[..n]);

        while let Some(msg) = buf.next_msg() {
            if msg.is_empty() {
                continue;
            }
            let answer = process_query(&mut tree.borrow_mut(), rw, &msg);
            if let Some(text) = answer.stream {
                // -t announces the stream; a lone blank line ends it.
                let mut framed = String::from("-t\n");
                framed.push_str(&text);
                framed.push('\n');
                if stream.write_all(framed.as_bytes()).await.is_err() {
                    return;
                }
            }
            let status: &[u8] = if answer.ok { b"-o\0" } else { b"-e\0" };
            if stream.write_all(status).await.is_err() {
                return;
            }
        }
    }
}

/// Accept loop over the RW socket and the optional RO socket. Returns
/// when `shutdown` is notified (stop signal).
pub async fn serve(
    rw_listener: UnixListener,
    ro_listener: Option<UnixListener>,
    tree: Rc<RefCell<ConfTree>>,
    shutdown: std::sync::Arc<tokio::sync::Notify>,
) {
    let local = tokio::task::LocalSet::new();
    local
        .run_until(async move {
            loop {
                tokio::select! {
                    accepted = rw_listener.accept() => {
                        if let Ok((stream, _)) = accepted {
                            debug!("rw connection established");
                            tokio::task::spawn_local(handle_connection(
                                stream, true, tree.clone()));
                        }
                    }
                    accepted = accept_opt(ro_listener.as_ref()) => {
                        if let Ok((stream, _)) = accepted {
                            debug!("ro connection established");
                            tokio::task::spawn_local(handle_connection(
                                stream, false, tree.clone()));
                        }
                    }
                    _ = shutdown.notified() => {
                        info!("stop daemon");
                        break;
                    }
                }
            }
        })
        .await;
}

/// Accept on an optional listener; pends forever when absent.
async fn accept_opt(
    listener: Option<&UnixListener>,
) -> std::io::Result<(UnixStream, tokio::net::unix::SocketAddr)> {
    match listener {
        Some(l) => l.accept().await,
        None => std::future::pending().await,
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn set(tree: &mut ConfTree, line: &str, extra: &str) -> bool {
        let text = format!("-s -l \"{}\" -r \"^{}$\" {}", line, line, extra);
        process_query(tree, true, &text).ok
    }

    #[test]
    fn test_set_and_dump() {
        let mut tree = ConfTree::root();
        assert!(set(&mut tree, "interface eth0", "-p 0x100"));
        let answer = process_query(&mut tree, true, "-d");
        assert!(answer.ok);
        assert_eq!(answer.stream.as_deref(), Some("!\ninterface eth0\n"));
    }

    #[test]
    fn test_unique_set_applied_twice() {
        let mut tree = ConfTree::root();
        assert!(set(&mut tree, "interface eth0", "-p 0x100"));
        assert!(set(&mut tree, "interface eth0", "-p 0x100"));
        assert_eq!(tree.children().len(), 1);
        assert_eq!(tree.children()[0].line(), "interface eth0");
    }

    #[test]
    fn test_non_unique_set_duplicates() {
        let mut tree = ConfTree::root();
        assert!(set(&mut tree, "log drop", "-n -p 0x100 -q 0"));
        assert!(set(&mut tree, "log drop", "-n -p 0x100 -q 0"));
        assert_eq!(tree.children().len(), 2);
    }

    #[test]
    fn test_unset() {
        let mut tree = ConfTree::root();
        set(&mut tree, "interface eth0", "");
        set(&mut tree, "interface eth1", "");
        assert!(process_query(&mut tree, true, "-u -r \"^interface eth1$\"").ok);
        assert_eq!(tree.children().len(), 1);
    }

    #[test]
    fn test_ro_socket_rejects_mutation() {
        let mut tree = ConfTree::root();
        let answer = process_query(&mut tree, false, "-s -l \"x\" -r \"^x$\"");
        assert!(!answer.ok);
        assert!(tree.children().is_empty());
        assert!(process_query(&mut tree, false, "-u -r \".*\"").ok == false);
        // Dump is permitted.
        assert!(process_query(&mut tree, false, "-d").ok);
    }

    #[test]
    fn test_nested_pwd_set() {
        let mut tree = ConfTree::root();
        set(&mut tree, "interface eth0", "");
        let text = "-s -l \"ip address 10.0.0.1\" -r \"^ip address .*$\" \"interface eth0\"";
        assert!(process_query(&mut tree, true, text).ok);
        let answer = process_query(&mut tree, true, "-d");
        assert_eq!(
            answer.stream.as_deref(),
            Some("!\ninterface eth0\n ip address 10.0.0.1\n")
        );
    }

    #[test]
    fn test_unknown_pwd_is_error() {
        let mut tree = ConfTree::root();
        let text = "-s -l \"x\" -r \"^x$\" \"no such node\"";
        assert!(!process_query(&mut tree, true, text).ok);
    }

    #[test]
    fn test_bad_query_is_error() {
        let mut tree = ConfTree::root();
        assert!(!process_query(&mut tree, true, "").ok);
        assert!(!process_query(&mut tree, true, "-s -l \"x\"").ok);
        assert!(!process_query(&mut tree, true, "garbage words").ok);
    }

    #[test]
    fn test_sequence_numbering_over_queries() {
        let mut tree = ConfTree::root();
        for rule in ["rule a", "rule b", "rule c"] {
            let text = format!("-s -l \"{}\" -r \"^{}$\" -p 0x100 -q 0", rule, rule);
            assert!(process_query(&mut tree, true, &text).ok);
        }
        // Insert at sequence 2; numbering stays dense 1..4.
        let text = "-s -l \"rule w\" -r \"^rule w$\" -p 0x100 -q 2";
        assert!(process_query(&mut tree, true, text).ok);
        let nums: Vec<u16> = tree.children().iter().map(|c| c.seq_num()).collect();
        assert_eq!(nums, vec![1, 2, 3, 4]);
        let lines: Vec<&str> = tree.children().iter().map(|c| c.line()).collect();
        assert_eq!(lines, vec!["rule a", "rule w", "rule b", "rule c"]);
    }

    #[tokio::test]
    async fn test_connection_round_trip() {
        let tree = Rc::new(RefCell::new(ConfTree::root()));
        let (client, server) = UnixStream::pair().expect("socketpair");
        let local = tokio::task::LocalSet::new();
        local
            .run_until(async move {
                tokio::task::spawn_local(handle_connection(server, true, tree.clone()));
                let mut client = client;
                client
                    .write_all(b"-s -l \"hostname r1\" -r \"^hostname .*$\"\0-d\0")
                    .await
                    .expect("send");
                let mut buf = Vec::new();
                let mut chunk = [0u8; 1024];
                // Expect: -o\0 then -t stream then -o\0.
                loop {
                    let n = client.read(&mut chunk).await.expect("read");
                    if n == 0 {
                        break;
                    }
                    buf.extend_from_slice(&chunk[..n]);
                    if buf.iter().filter(|&&b| b == 0).count() >= 2 {
                        break;
                    }
                }
                let text = String::from_utf8_lossy(&buf);
                assert!(text.contains("-o"));
                assert!(text.contains("-t\n!\nhostname r1\n\n"));
            })
            .await;
    }
}
