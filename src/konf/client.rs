//! Configuration Client
//!
//! Shell-side access to the configuration daemon: a lazily connected
//! UNIX stream socket. A failed send reconnects once before giving up.
//! Answers are `-o`/`-e`, optionally preceded by a `-t` stream of text
//! lines terminated by an empty line.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::time::Duration;

use thiserror::Error;

use super::query::{MsgBuf, Query, QueryOp};

/// Default daemon socket path.
pub const KONFD_SOCKET_PATH: &str = "/tmp/konfd.socket";

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("can't connect to config daemon at {0}")]
    Connect(String),
    #[error("config daemon i/o failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("config daemon returned an error")]
    Daemon,
    #[error("unexpected answer from config daemon")]
    BadAnswer,
}

/// A connection to the configuration daemon.
pub struct Client {
    path: String,
    stream: Option<UnixStream>,
}

impl Client {
    pub fn new(path: &str) -> Self {
        Self {
            path: path.to_string(),
            stream: None,
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn connect(&mut self) -> Result<&mut UnixStream, ClientError> {
        if self.stream.is_none() {
            let stream = UnixStream::connect(&self.path)
                .map_err(|_| ClientError::Connect(self.path.clone()))?;
            stream
                .set_read_timeout(Some(Duration::from_secs(10)))
                .ok();
            self.stream = Some(stream);
        }
        match self.stream.as_mut() {
            Some(stream) => Ok(stream),
            None => Err(ClientError::Connect(self.path.clone())),
        }
    }

    pub fn disconnect(&mut self) {
        self.stream = None;
    }

    fn send_raw(&mut self, command: &str) -> Result<(), ClientError> {
        let stream = self.connect()?;
        let mut bytes = command.as_bytes().to_vec();
        bytes.push(0);
        stream.write_all(&bytes)?;
        Ok(())
    }

    /// Send one query line; on a send failure reconnect once and retry.
    pub fn send(&mut self, command: &str) -> Result<(), ClientError> {
        if self.send_raw(command).is_ok() {
            return Ok(());
        }
        self.disconnect();
        self.send_raw(command)
    }

    /// Read messages until an `-o` or `-e` answer arrives. Stream data
    /// announced by `-t` (text lines up to an empty line) is collected
    /// and returned on success.
    pub fn recv_answer(&mut self) -> Result<Option<String>, ClientError> {
        let stream = self.connect()?;
        let mut buf = MsgBuf::new();
        let mut chunk = [0u8; 4096];
        let mut data: Option<String> = None;
        let mut in_stream = false;
        let mut stream_lines = String::new();

        loop {
            while let Some(msg) = buf.next_msg() {
                if in_stream {
                    if msg.is_empty() {
                        in_stream = false;
                        data = Some(std::mem::take(&mut stream_lines));
                        continue;
                    }
                    stream_lines.push_str(&msg);
                    stream_lines.push('\n');
                    continue;
                }
                let op = Query::parse(&msg).map(|q| q.op);
                match op {
                    Some(QueryOp::Ok) => return Ok(data),
                    Some(QueryOp::Error) => return Err(ClientError::Daemon),
                    Some(QueryOp::Stream) => in_stream = true,
                    _ => return Err(ClientError::BadAnswer),
                }
            }
            let n = stream.read(&mut chunk)?;
            if n == 0 {
                return Err(ClientError::BadAnswer);
            }
            buf.feed(&chunk[..n]);
        }
    }

    /// Issue a query and wait for its answer.
    pub fn request(&mut self, command: &str) -> Result<Option<String>, ClientError> {
        self.send(command)?;
        self.recv_answer()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;
    use std::os::unix::net::UnixListener;

    fn serve_once(dir: &std::path::Path, answer: &'static [u8]) -> String {
        let path = dir.join("konfd.sock");
        let listener = UnixListener::bind(&path).expect("bind");
        let path_str = path.to_string_lossy().into_owned();
        std::thread::spawn(move || {
            let (mut sock, _) = listener.accept().expect("accept");
            let mut buf = [0u8; 1024];
            let _ = sock.read(&mut buf);
            sock.write_all(answer).expect("answer");
        });
        path_str
    }

    #[test]
    fn test_ok_answer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = serve_once(dir.path(), b"-o\0");
        let mut client = Client::new(&path);
        let data = client.request("-s -l \"x\" -r \"x\"").expect("request");
        assert!(data.is_none());
    }

    #[test]
    fn test_error_answer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = serve_once(dir.path(), b"-e\0");
        let mut client = Client::new(&path);
        assert!(matches!(
            client.request("-u -r \"x\""),
            Err(ClientError::Daemon)
        ));
    }

    #[test]
    fn test_stream_answer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = serve_once(dir.path(), b"-t\nline one\nline two\n\n-o\0");
        let mut client = Client::new(&path);
        let data = client.request("-d").expect("request").expect("stream data");
        assert_eq!(data, "line one\nline two\n");
    }

    #[test]
    fn test_connect_failure() {
        let mut client = Client::new("/nonexistent/socket/path");
        assert!(matches!(
            client.request("-d"),
            Err(ClientError::Connect(_))
        ));
    }
}
