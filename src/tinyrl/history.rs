//! Line History
//!
//! A bounded (stifled) list of edited lines with absolute entry
//! numbering, file save/restore, and `!`-style expansion.

use std::io::{BufRead, Write};
use std::path::Path;

/// Result of a history expansion attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expansion {
    /// Nothing to expand.
    None,
    /// The line with all events substituted.
    Expanded(String),
    /// An event referenced a missing entry.
    Error,
}

#[derive(Debug, Default)]
pub struct History {
    entries: Vec<String>,
    /// Absolute index of entries[0]; numbering starts at 1.
    base: usize,
    /// Maximum entries kept; 0 means unbounded.
    stifle: usize,
}

impl History {
    pub fn new(stifle: usize) -> Self {
        Self {
            entries: Vec::new(),
            base: 1,
            stifle,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, pos: usize) -> Option<&str> {
        self.entries.get(pos).map(String::as_str)
    }

    /// Absolute event number of the entry at `pos`.
    pub fn index(&self, pos: usize) -> usize {
        self.base + pos
    }

    pub fn add(&mut self, line: &str) {
        if self.stifle != 0 && self.entries.len() == self.stifle {
            self.entries.remove(0);
            self.base += 1;
        }
        self.entries.push(line.to_string());
    }

    /// Change the bound, discarding the oldest entries if shrinking.
    pub fn stifle(&mut self, stifle: usize) {
        if stifle != 0 && stifle < self.entries.len() {
            let drop = self.entries.len() - stifle;
            self.entries.drain(..drop);
            self.base += drop;
        }
        self.stifle = stifle;
    }

    fn by_absolute(&self, index: usize) -> Option<&str> {
        if index < self.base {
            return None;
        }
        self.get(index - self.base)
    }

    fn by_relative(&self, back: usize) -> Option<&str> {
        if back == 0 || back > self.entries.len() {
            return None;
        }
        self.get(self.entries.len() - back)
    }

    /// Expand `!!`, `!N` and `!-N` events in the line.
    pub fn expand(&self, line: &str) -> Expansion {
        if !line.contains('!') {
            return Expansion::None;
        }
        let mut out = String::with_capacity(line.len());
        let mut changed = false;
        let mut rest = line;

        while let Some(pos) = rest.find('!') {
            out.push_str(&rest[..pos]);
            let after = &rest[pos + 1..];

            if let Some(tail) = after.strip_prefix('!') {
                match self.by_relative(1) {
                    Some(prev) => out.push_str(prev),
                    None => return Expansion::Error,
                }
                changed = true;
                rest = tail;
                continue;
            }

            let negative = after.starts_with('-');
            let digits: String = after
                .chars()
                .skip(usize::from(negative))
                .take_while(|c| c.is_ascii_digit())
                .collect();
            if digits.is_empty() {
                // A lone bang is not an event designator.
                out.push('!');
                rest = after;
                continue;
            }
            let n: usize = match digits.parse() {
                Ok(n) => n,
                Err(_) => return Expansion::Error,
            };
            let entry = if negative {
                self.by_relative(n)
            } else {
                self.by_absolute(n)
            };
            match entry {
                Some(text) => out.push_str(text),
                None => return Expansion::Error,
            }
            changed = true;
            rest = &after[usize::from(negative) + digits.len()..];
        }
        out.push_str(rest);

        if changed {
            Expansion::Expanded(out)
        } else {
            Expansion::None
        }
    }

    /// Write the history, one line per entry, oldest first.
    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let mut file = std::fs::File::create(path)?;
        for entry in &self.entries {
            writeln!(file, "{}", entry)?;
        }
        Ok(())
    }

    /// Load entries from a file; the last line becomes the most recent.
    pub fn restore(&mut self, path: &Path) -> std::io::Result<()> {
        let file = std::fs::File::open(path)?;
        for line in std::io::BufReader::new(file).lines() {
            let line = line?;
            if !line.is_empty() {
                self.add(&line);
            }
        }
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = &String> {
        self.entries.iter()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn filled() -> History {
        let mut h = History::new(0);
        for line in ["one", "two", "three"] {
            h.add(line);
        }
        h
    }

    #[test]
    fn test_add_and_numbering() {
        let h = filled();
        assert_eq!(h.len(), 3);
        assert_eq!(h.get(0), Some("one"));
        assert_eq!(h.index(0), 1);
        assert_eq!(h.index(2), 3);
    }

    #[test]
    fn test_stifle_drops_oldest() {
        let mut h = History::new(2);
        for line in ["one", "two", "three"] {
            h.add(line);
        }
        assert_eq!(h.len(), 2);
        assert_eq!(h.get(0), Some("two"));
        // Absolute numbering survives the drop.
        assert_eq!(h.index(0), 2);
    }

    #[test]
    fn test_expand_bang_bang() {
        let h = filled();
        assert_eq!(h.expand("!!"), Expansion::Expanded("three".to_string()));
        assert_eq!(
            h.expand("echo !!"),
            Expansion::Expanded("echo three".to_string())
        );
    }

    #[test]
    fn test_expand_absolute_and_relative() {
        let h = filled();
        assert_eq!(h.expand("!1"), Expansion::Expanded("one".to_string()));
        assert_eq!(h.expand("!-1"), Expansion::Expanded("three".to_string()));
        assert_eq!(h.expand("!-3"), Expansion::Expanded("one".to_string()));
        assert_eq!(h.expand("!9"), Expansion::Error);
        assert_eq!(h.expand("!-9"), Expansion::Error);
    }

    #[test]
    fn test_expand_no_event() {
        let h = filled();
        assert_eq!(h.expand("plain line"), Expansion::None);
        // A lone bang with no designator passes through.
        assert_eq!(h.expand("bang ! done"), Expansion::None);
    }

    #[test]
    fn test_save_restore() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("history.txt");
        filled().save(&path).expect("save");

        let mut restored = History::new(0);
        restored.restore(&path).expect("restore");
        assert_eq!(restored.len(), 3);
        assert_eq!(restored.get(2), Some("three"));
    }
}
