//! Configuration Tree
//!
//! An in-memory ordered tree of configuration lines. Children are kept
//! sorted by (priority, sequence, sub-order, line); sequenced siblings
//! within one priority form a dense 1..N numbering that is renormalized
//! on every mutation.

use std::fmt::Write as _;

use regex_lite::Regex;

/// Sub-order marker of a settled entry.
const ENTRY_OK: u16 = 0xffff;
/// Transient sub-order marker: a freshly inserted sequenced entry sorts
/// before settled siblings with the same sequence number.
const ENTRY_NEW: u16 = 0xfffd;

/// One configuration line with its ordered children.
#[derive(Debug)]
pub struct ConfTree {
    line: String,
    priority: u16,
    seq_num: u16,
    sub_num: u16,
    splitter: bool,
    depth: i32,
    children: Vec<ConfTree>,
}

impl ConfTree {
    pub fn new(line: &str, priority: u16) -> Self {
        Self {
            line: line.to_string(),
            priority,
            seq_num: 0,
            sub_num: ENTRY_OK,
            splitter: true,
            depth: -1,
            children: Vec::new(),
        }
    }

    /// The root of a configuration: an empty line at priority 0.
    pub fn root() -> Self {
        Self::new("", 0)
    }

    pub fn line(&self) -> &str {
        &self.line
    }

    pub fn priority(&self) -> u16 {
        self.priority
    }

    pub fn priority_hi(&self) -> u8 {
        (self.priority >> 8) as u8
    }

    pub fn seq_num(&self) -> u16 {
        self.seq_num
    }

    pub fn splitter(&self) -> bool {
        self.splitter
    }

    pub fn set_splitter(&mut self, splitter: bool) {
        self.splitter = splitter;
    }

    pub fn depth(&self) -> i32 {
        self.depth
    }

    pub fn set_depth(&mut self, depth: i32) {
        self.depth = depth;
    }

    pub fn children(&self) -> &[ConfTree] {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut [ConfTree] {
        &mut self.children
    }

    fn sort_key(&self) -> (u16, u16, u16, &str) {
        (self.priority, self.seq_num, self.sub_num, &self.line)
    }

    /// Insert a new child, keeping the list ordered. When `seq` is set a
    /// zero `seq_num` means "append to the sequence"; a non-zero value
    /// displaces the current holder of that number downwards.
    pub fn new_conf(&mut self, line: &str, priority: u16, seq: bool, seq_num: u16) -> usize {
        let mut entry = ConfTree::new(line, priority);
        if seq {
            entry.seq_num = if seq_num != 0 { seq_num } else { 0xffff };
            entry.sub_num = ENTRY_NEW;
        }

        let key = entry.sort_key();
        let pos = self
            .children
            .partition_point(|c| c.sort_key() <= (key.0, key.1, key.2, key.3));
        self.children.insert(pos, entry);

        if seq {
            self.normalize_seq(priority, Some(pos));
            self.children[pos].sub_num = ENTRY_OK;
        }
        pos
    }

    /// Renumber the sequenced entries of one priority bucket to a dense
    /// 1..N. A `start` index resumes numbering from the entry before it.
    fn normalize_seq(&mut self, priority: u16, start: Option<usize>) {
        let mut cnt: u16 = 1;
        let from = match start {
            Some(pos) => {
                if pos > 0 {
                    let prev = &self.children[pos - 1];
                    if prev.priority == priority && prev.seq_num != 0 {
                        cnt = prev.seq_num.saturating_add(1);
                    }
                }
                pos
            }
            None => 0,
        };

        for child in self.children.iter_mut().skip(from) {
            if child.priority > priority {
                break;
            }
            if child.priority < priority || child.seq_num == 0 {
                continue;
            }
            child.seq_num = cnt;
            cnt = cnt.saturating_add(1);
        }
    }

    /// Find a child by line text, scanning from the tail. With non-zero
    /// priority and sequence number the scan is bounded to that bucket.
    pub fn find(&self, line: &str, priority: u16, seq_num: u16) -> Option<&ConfTree> {
        let check = priority != 0 && seq_num != 0;
        self.children.iter().rev().find(|c| {
            if check && (c.priority != priority || c.seq_num != seq_num) {
                return false;
            }
            c.line == line
        })
    }

    pub fn find_mut(&mut self, line: &str) -> Option<&mut ConfTree> {
        self.children.iter_mut().rev().find(|c| c.line == line)
    }

    /// Descend along a pwd path of line keys.
    pub fn navigate(&self, pwd: &[String]) -> Option<&ConfTree> {
        let mut node = self;
        for key in pwd {
            node = node.find(key, 0, 0)?;
        }
        Some(node)
    }

    pub fn navigate_mut(&mut self, pwd: &[String]) -> Option<&mut ConfTree> {
        let mut node = self;
        for key in pwd {
            node = node.find_mut(key)?;
        }
        Some(node)
    }

    /// Delete children matching the pattern, filtered by priority and
    /// sequence selectors. With `unique`, a child whose line equals
    /// `line` exactly is kept and counted instead of deleted; the count
    /// of such survivors is returned.
    pub fn del_pattern(
        &mut self,
        line: Option<&str>,
        unique: bool,
        pattern: &str,
        priority: u16,
        seq: bool,
        seq_num: u16,
    ) -> Result<usize, String> {
        if seq && priority == 0 {
            return Err("Sequence delete needs a priority".to_string());
        }
        let regex = Regex::new(&format!("(?i){}", pattern))
            .map_err(|e| format!("Bad pattern {}: {}", pattern, e))?;

        let mut kept = 0usize;
        let mut deleted = 0usize;
        self.children.retain(|c| {
            if priority != 0 && c.priority != priority {
                return true;
            }
            if seq && seq_num != 0 && c.seq_num != seq_num {
                return true;
            }
            if seq && seq_num == 0 && c.seq_num == 0 {
                return true;
            }
            if !regex.is_match(&c.line) {
                return true;
            }
            if unique && line.map(|l| l == c.line).unwrap_or(false) {
                kept += 1;
                return true;
            }
            deleted += 1;
            false
        });

        if seq && deleted != 0 {
            self.normalize_seq(priority, None);
        }
        Ok(kept)
    }

    /// Render the subtree. Lines deeper than `top_depth` and within the
    /// `max_depth` window print with one space of indentation per level;
    /// top-level records are separated by `!` when the high priority
    /// byte changes or the splitter flag is set. The pattern filters the
    /// immediate children only.
    pub fn dump(
        &self,
        out: &mut String,
        pattern: Option<&Regex>,
        top_depth: i32,
        max_depth: i32,
        seq: bool,
        prev_pri_hi: u8,
    ) {
        if !self.line.is_empty()
            && self.depth > top_depth
            && (max_depth < 0 || self.depth <= top_depth + max_depth)
        {
            if self.depth == 0 && (self.splitter || self.priority_hi() != prev_pri_hi) {
                out.push_str("!\n");
            }
            let indent = (self.depth - top_depth - 1).max(0) as usize;
            for _ in 0..indent {
                out.push(' ');
            }
            if seq && self.seq_num != 0 {
                let _ = write!(out, "{} ", self.seq_num);
            }
            out.push_str(&self.line);
            out.push('\n');
        }

        let mut pri: u8 = 0;
        for child in &self.children {
            if let Some(re) = pattern {
                if !re.is_match(&child.line) {
                    continue;
                }
            }
            child.dump(out, None, top_depth, max_depth, seq, pri);
            pri = child.priority_hi();
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn seqs(tree: &ConfTree, priority: u16) -> Vec<u16> {
        tree.children()
            .iter()
            .filter(|c| c.priority() == priority && c.seq_num() != 0)
            .map(|c| c.seq_num())
            .collect()
    }

    #[test]
    fn test_ordered_insert_by_priority() {
        let mut root = ConfTree::root();
        root.new_conf("low", 0x0200, false, 0);
        root.new_conf("high", 0x0100, false, 0);
        let lines: Vec<_> = root.children().iter().map(|c| c.line()).collect();
        assert_eq!(lines, vec!["high", "low"]);
    }

    #[test]
    fn test_same_priority_sorted_by_line() {
        let mut root = ConfTree::root();
        root.new_conf("bbb", 0x0100, false, 0);
        root.new_conf("aaa", 0x0100, false, 0);
        let lines: Vec<_> = root.children().iter().map(|c| c.line()).collect();
        assert_eq!(lines, vec!["aaa", "bbb"]);
    }

    #[test]
    fn test_sequence_auto_numbering() {
        let mut root = ConfTree::root();
        root.new_conf("rule one", 0x0100, true, 0);
        root.new_conf("rule two", 0x0100, true, 0);
        root.new_conf("rule three", 0x0100, true, 0);
        assert_eq!(seqs(&root, 0x0100), vec![1, 2, 3]);
    }

    #[test]
    fn test_sequence_insert_displaces() {
        let mut root = ConfTree::root();
        root.new_conf("first", 0x0100, true, 0);
        root.new_conf("second", 0x0100, true, 0);
        root.new_conf("wedge", 0x0100, true, 1);
        let lines: Vec<_> = root.children().iter().map(|c| c.line()).collect();
        assert_eq!(lines, vec!["wedge", "first", "second"]);
        assert_eq!(seqs(&root, 0x0100), vec![1, 2, 3]);
    }

    #[test]
    fn test_sequence_dense_after_delete() {
        let mut root = ConfTree::root();
        for name in ["a", "b", "c", "d"] {
            root.new_conf(name, 0x0100, true, 0);
        }
        root.del_pattern(None, true, "^b$", 0x0100, true, 0).unwrap();
        assert_eq!(seqs(&root, 0x0100), vec![1, 2, 3]);
        let lines: Vec<_> = root.children().iter().map(|c| c.line()).collect();
        assert_eq!(lines, vec!["a", "c", "d"]);
    }

    #[test]
    fn test_unique_set_keeps_one() {
        let mut root = ConfTree::root();
        root.new_conf("interface eth0", 0x0100, false, 0);
        // Second identical set: the unique delete finds the survivor.
        let kept = root
            .del_pattern(
                Some("interface eth0"),
                true,
                "^interface eth0$",
                0x0100,
                false,
                0,
            )
            .unwrap();
        assert_eq!(kept, 1);
        assert_eq!(root.children().len(), 1);
    }

    #[test]
    fn test_unset_deletes_matching() {
        let mut root = ConfTree::root();
        root.new_conf("interface eth0", 0x0100, false, 0);
        root.new_conf("interface eth1", 0x0100, false, 0);
        root.new_conf("hostname router", 0x0200, false, 0);
        root.del_pattern(None, true, "^interface .*$", 0, false, 0)
            .unwrap();
        let lines: Vec<_> = root.children().iter().map(|c| c.line()).collect();
        assert_eq!(lines, vec!["hostname router"]);
    }

    #[test]
    fn test_navigate() {
        let mut root = ConfTree::root();
        let pos = root.new_conf("interface eth0", 0x0100, false, 0);
        root.children[pos].set_depth(0);
        root.children[pos].new_conf("ip address 10.0.0.1", 0, false, 0);
        let node = root
            .navigate(&["interface eth0".to_string()])
            .expect("navigate");
        assert_eq!(node.children().len(), 1);
        assert!(root.navigate(&["missing".to_string()]).is_none());
    }

    #[test]
    fn test_dump_indent_and_splitter() {
        let mut root = ConfTree::root();
        let pos = root.new_conf("interface eth0", 0x0100, false, 0);
        root.children[pos].set_depth(0);
        let child = root.children[pos].new_conf("ip address 10.0.0.1", 0, false, 0);
        root.children[pos].children[child].set_depth(1);
        let pos = root.new_conf("hostname router", 0x0200, false, 0);
        root.children[pos].set_depth(0);

        let mut out = String::new();
        root.dump(&mut out, None, -1, -1, false, 0);
        assert_eq!(
            out,
            "!\ninterface eth0\n ip address 10.0.0.1\n!\nhostname router\n"
        );
    }

    #[test]
    fn test_dump_seq_numbers() {
        let mut root = ConfTree::root();
        let pos = root.new_conf("rule drop", 0x0100, true, 0);
        root.children[pos].set_depth(0);
        let pos = root.new_conf("rule allow", 0x0100, true, 0);
        root.children[pos].set_depth(0);

        let mut out = String::new();
        root.dump(&mut out, None, -1, -1, true, 0);
        assert!(out.contains("1 rule drop\n"));
        assert!(out.contains("2 rule allow\n"));
    }

    #[test]
    fn test_dump_depth_window() {
        let mut root = ConfTree::root();
        let pos = root.new_conf("outer", 0x0100, false, 0);
        root.children[pos].set_depth(0);
        let child = root.children[pos].new_conf("inner", 0, false, 0);
        root.children[pos].children[child].set_depth(1);

        let mut out = String::new();
        root.dump(&mut out, None, -1, 1, false, 0);
        assert!(out.contains("outer"));
        assert!(!out.contains("inner"));
    }

    #[test]
    fn test_dump_pattern_filters_first_level() {
        let mut root = ConfTree::root();
        let pos = root.new_conf("interface eth0", 0x0100, false, 0);
        root.children[pos].set_depth(0);
        let pos = root.new_conf("hostname router", 0x0200, false, 0);
        root.children[pos].set_depth(0);

        let re = Regex::new("(?i)^interface .*$").unwrap();
        let mut out = String::new();
        root.dump(&mut out, Some(&re), -1, -1, false, 0);
        assert!(out.contains("interface eth0"));
        assert!(!out.contains("hostname"));
    }
}
