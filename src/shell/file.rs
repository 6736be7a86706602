//! Input Source Stack
//!
//! Non-interactive input comes from a LIFO stack of sources: script
//! files and literal command lists (`-c`). The topmost source feeds the
//! shell one line at a time; when it runs dry it is popped and the next
//! one continues.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};

#[derive(Debug)]
enum SourceKind {
    File(BufReader<File>),
    Text(VecDeque<String>),
}

/// One stacked input source.
#[derive(Debug)]
pub struct Source {
    kind: SourceKind,
    name: Option<String>,
    /// Lines consumed so far, for diagnostics.
    pub line: u32,
    pub stop_on_error: bool,
}

impl Source {
    pub fn from_path(path: &str, stop_on_error: bool) -> std::io::Result<Self> {
        let file = File::open(path)?;
        Ok(Self {
            kind: SourceKind::File(BufReader::new(file)),
            name: Some(path.to_string()),
            line: 0,
            stop_on_error,
        })
    }

    /// Literal command lines (the `-c` option).
    pub fn from_commands(commands: Vec<String>, stop_on_error: bool) -> Self {
        Self {
            kind: SourceKind::Text(commands.into()),
            name: None,
            line: 0,
            stop_on_error,
        }
    }

    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("stdin")
    }

    /// The next input line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let line = match &mut self.kind {
            SourceKind::File(reader) => {
                let mut buf = String::new();
                match reader.read_line(&mut buf) {
                    Ok(0) | Err(_) => return None,
                    Ok(_) => buf.trim_end_matches(['\r', '\n']).to_string(),
                }
            }
            SourceKind::Text(lines) => lines.pop_front()?,
        };
        self.line += 1;
        Some(line)
    }
}

// ============================================================================
// Tests
// ============================================================================
