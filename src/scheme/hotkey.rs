//! View Hotkeys
//!
//! Maps a control key (symbolic `^A`..`^_` form in the scheme) to a
//! command line executed when the key is pressed at the prompt.

use std::collections::HashMap;

/// Symbolic names for control codes 0..31, indexed by code.
const HOTKEY_NAMES: [&str; 32] = [
    "^@", "^A", "^B", "^C", "^D", "^E", "^F", "^G", "^H", "^I", "^J", "^K", "^L", "^M", "^N",
    "^O", "^P", "^Q", "^R", "^S", "^T", "^U", "^V", "^W", "^X", "^Y", "^Z", "^[", "^\\", "^]",
    "^^", "^_",
];

/// Translate a symbolic key name to its control code.
pub fn key_code(key: &str) -> Option<u8> {
    HOTKEY_NAMES
        .iter()
        .position(|&n| n == key)
        .map(|i| i as u8)
}

/// Per-view hotkey bindings.
#[derive(Debug, Default)]
pub struct HotkeyMap {
    map: HashMap<u8, String>,
}

impl HotkeyMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind a symbolic key to a command line; rebinding replaces.
    pub fn insert(&mut self, key: &str, cmd: &str) -> Result<(), String> {
        let code = key_code(key).ok_or_else(|| format!("Unknown hotkey {}", key))?;
        self.map.insert(code, cmd.to_string());
        Ok(())
    }

    pub fn cmd_by_code(&self, code: u8) -> Option<&str> {
        self.map.get(&code).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_codes() {
        assert_eq!(key_code("^@"), Some(0));
        assert_eq!(key_code("^A"), Some(1));
        assert_eq!(key_code("^X"), Some(24));
        assert_eq!(key_code("^_"), Some(31));
        assert_eq!(key_code("^1"), None);
        assert_eq!(key_code("X"), None);
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut hk = HotkeyMap::new();
        hk.insert("^X", "exit").unwrap();
        assert_eq!(hk.cmd_by_code(24), Some("exit"));
        assert_eq!(hk.cmd_by_code(25), None);
        hk.insert("^X", "logout").unwrap();
        assert_eq!(hk.cmd_by_code(24), Some("logout"));
        assert!(hk.insert("^zz", "nope").is_err());
    }
}
