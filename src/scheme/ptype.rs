//! Parameter Types
//!
//! A PTYPE is a named validator for command parameters: an anchored
//! regular expression, a signed or unsigned integer range, or an
//! enumerated selection of `name(value)` pairs. Select types also act
//! as completion generators.

use regex_lite::Regex;

/// Validation method of a parameter type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PtypeMethod {
    #[default]
    Regexp,
    Integer,
    UnsignedInteger,
    Select,
}

impl PtypeMethod {
    pub fn resolve(name: &str) -> Option<Self> {
        match name {
            "regexp" => Some(Self::Regexp),
            "integer" => Some(Self::Integer),
            "unsignedInteger" => Some(Self::UnsignedInteger),
            "select" => Some(Self::Select),
            _ => None,
        }
    }
}

/// Case folding applied before validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PtypePreprocess {
    #[default]
    None,
    ToUpper,
    ToLower,
}

impl PtypePreprocess {
    pub fn resolve(name: &str) -> Option<Self> {
        match name {
            "none" => Some(Self::None),
            "toupper" => Some(Self::ToUpper),
            "tolower" => Some(Self::ToLower),
            _ => None,
        }
    }
}

/// One entry of a select-type pattern: display name and mapped value.
#[derive(Debug, Clone)]
struct SelectItem {
    name: String,
    value: String,
}

/// Compiled per-method state.
#[derive(Debug)]
enum MethodState {
    Regexp(Regex),
    Integer { min: i64, max: i64 },
    Unsigned { min: u64, max: u64 },
    Select(Vec<SelectItem>),
}

/// A named parameter type.
#[derive(Debug)]
pub struct Ptype {
    name: String,
    text: Option<String>,
    pattern: String,
    range: String,
    preprocess: PtypePreprocess,
    state: MethodState,
}

/// Split a `name(value)` token; a bare token maps to itself.
fn parse_select_item(token: &str) -> SelectItem {
    match token.find('(') {
        Some(lbrk) => {
            let name = token[..lbrk].to_string();
            let rest = &token[lbrk + 1..];
            let value = match rest.find(')') {
                Some(rbrk) => rest[..rbrk].to_string(),
                None => rest.to_string(),
            };
            SelectItem { name, value }
        }
        None => SelectItem {
            name: token.to_string(),
            value: token.to_string(),
        },
    }
}

impl Ptype {
    pub fn new(
        name: &str,
        text: Option<&str>,
        pattern: &str,
        method: PtypeMethod,
        preprocess: PtypePreprocess,
    ) -> Result<Self, String> {
        let (state, stored_pattern) = match method {
            PtypeMethod::Regexp => {
                // Only a full match of the expression is allowed.
                let anchored = format!("^{}$", pattern);
                let re = Regex::new(&anchored)
                    .map_err(|e| format!("Bad regexp pattern for ptype {}: {}", name, e))?;
                (MethodState::Regexp(re), anchored)
            }
            PtypeMethod::Integer => {
                let (min, max) = parse_range::<i64>(pattern)
                    .unwrap_or((i64::from(i32::MIN), i64::from(i32::MAX)));
                (MethodState::Integer { min, max }, pattern.to_string())
            }
            PtypeMethod::UnsignedInteger => {
                let (min, max) =
                    parse_range::<u64>(pattern).unwrap_or((0, u64::from(u32::MAX)));
                (MethodState::Unsigned { min, max }, pattern.to_string())
            }
            PtypeMethod::Select => {
                let items = crate::argv::Argv::new(pattern)
                    .iter()
                    .map(|a| parse_select_item(&a.text))
                    .collect();
                (MethodState::Select(items), pattern.to_string())
            }
        };

        let range = match &state {
            MethodState::Regexp(_) => String::new(),
            MethodState::Integer { min, max } => format!("{}..{}", min, max),
            MethodState::Unsigned { min, max } => format!("{}..{}", min, max),
            MethodState::Select(items) => items
                .iter()
                .map(|i| i.name.as_str())
                .collect::<Vec<_>>()
                .join("/"),
        };

        Ok(Self {
            name: name.to_string(),
            text: text.map(str::to_string),
            pattern: stored_pattern,
            range,
            preprocess,
            state,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Help text shown for parameters of this type.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Range summary used in contextual help: `min..max`, `a/b/c`, or empty.
    pub fn range(&self) -> &str {
        &self.range
    }

    pub fn method(&self) -> PtypeMethod {
        match self.state {
            MethodState::Regexp(_) => PtypeMethod::Regexp,
            MethodState::Integer { .. } => PtypeMethod::Integer,
            MethodState::Unsigned { .. } => PtypeMethod::UnsignedInteger,
            MethodState::Select(_) => PtypeMethod::Select,
        }
    }

    fn apply_preprocess(&self, text: &str) -> String {
        match self.preprocess {
            PtypePreprocess::None => text.to_string(),
            PtypePreprocess::ToUpper => text.to_uppercase(),
            PtypePreprocess::ToLower => text.to_lowercase(),
        }
    }

    fn validate_or_translate(&self, text: &str, translate: bool) -> Option<String> {
        let value = self.apply_preprocess(text);
        match &self.state {
            MethodState::Regexp(re) => re.is_match(&value).then_some(value),
            MethodState::Integer { min, max } => {
                let n: i64 = parse_decimal_signed(&value)?;
                (n >= *min && n <= *max).then_some(value)
            }
            MethodState::Unsigned { min, max } => {
                let n: u64 = parse_decimal_unsigned(&value)?;
                (n >= *min && n <= *max).then_some(value)
            }
            MethodState::Select(items) => items
                .iter()
                .find(|i| i.name.eq_ignore_ascii_case(&value))
                .map(|i| {
                    if translate {
                        i.value.clone()
                    } else {
                        i.name.clone()
                    }
                }),
        }
    }

    /// Validate user input, returning the canonical (display) form.
    pub fn validate(&self, text: &str) -> Option<String> {
        self.validate_or_translate(text, false)
    }

    /// Like validate, but select types return the mapped value.
    pub fn translate(&self, text: &str) -> Option<String> {
        self.validate_or_translate(text, true)
    }

    /// Completion candidates for the given prefix. Only select types
    /// generate candidates.
    pub fn word_generator(&self, text: &str) -> Vec<String> {
        let MethodState::Select(items) = &self.state else {
            return Vec::new();
        };
        if let Some(exact) = self.validate(text) {
            return vec![exact];
        }
        let folded = text.to_lowercase();
        items
            .iter()
            .filter(|i| i.name.to_lowercase().starts_with(&folded))
            .map(|i| i.name.clone())
            .collect()
    }
}

/// Parse a `min..max` range descriptor.
fn parse_range<T: std::str::FromStr>(pattern: &str) -> Option<(T, T)> {
    let (lo, hi) = pattern.split_once("..")?;
    Some((lo.trim().parse().ok()?, hi.trim().parse().ok()?))
}

fn parse_decimal_signed(text: &str) -> Option<i64> {
    let rest = text.strip_prefix('-').unwrap_or(text);
    if rest.is_empty() || !rest.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

fn parse_decimal_unsigned(text: &str) -> Option<u64> {
    if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    text.parse().ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn uint(pattern: &str) -> Ptype {
        Ptype::new("test_uint", None, pattern, PtypeMethod::UnsignedInteger, PtypePreprocess::None)
            .unwrap()
    }

    #[test]
    fn test_regexp_full_match() {
        let pt = Ptype::new("word", None, "[a-z]+", PtypeMethod::Regexp, PtypePreprocess::None)
            .unwrap();
        assert_eq!(pt.validate("abc"), Some("abc".to_string()));
        assert_eq!(pt.validate("abc1"), None);
        assert_eq!(pt.validate(""), None);
        assert_eq!(pt.range(), "");
    }

    #[test]
    fn test_integer_range() {
        let pt = Ptype::new("small", None, "-10..10", PtypeMethod::Integer, PtypePreprocess::None)
            .unwrap();
        assert_eq!(pt.validate("-10"), Some("-10".to_string()));
        assert_eq!(pt.validate("10"), Some("10".to_string()));
        assert_eq!(pt.validate("11"), None);
        assert_eq!(pt.validate("1.5"), None);
        assert_eq!(pt.validate("abc"), None);
        assert_eq!(pt.range(), "-10..10");
    }

    #[test]
    fn test_unsigned_range() {
        let pt = uint("1..65535");
        assert_eq!(pt.validate("1"), Some("1".to_string()));
        assert_eq!(pt.validate("65535"), Some("65535".to_string()));
        assert_eq!(pt.validate("70000"), None);
        assert_eq!(pt.validate("0"), None);
        assert_eq!(pt.validate("-1"), None);
    }

    #[test]
    fn test_unsigned_default_range() {
        let pt = uint("");
        assert_eq!(pt.validate("0"), Some("0".to_string()));
        assert_eq!(pt.validate("4294967295"), Some("4294967295".to_string()));
        assert_eq!(pt.validate("4294967296"), None);
    }

    #[test]
    fn test_select_validate_translate() {
        let pt = Ptype::new(
            "proto",
            None,
            "tcp(6) udp(17) icmp(1)",
            PtypeMethod::Select,
            PtypePreprocess::None,
        )
        .unwrap();
        assert_eq!(pt.validate("tcp"), Some("tcp".to_string()));
        assert_eq!(pt.validate("TCP"), Some("tcp".to_string()));
        assert_eq!(pt.translate("udp"), Some("17".to_string()));
        assert_eq!(pt.validate("sctp"), None);
        assert_eq!(pt.range(), "tcp/udp/icmp");
    }

    #[test]
    fn test_select_round_trip() {
        let pt = Ptype::new(
            "onoff",
            None,
            "on(1) off(0)",
            PtypeMethod::Select,
            PtypePreprocess::None,
        )
        .unwrap();
        for (name, value) in [("on", "1"), ("off", "0")] {
            assert_eq!(pt.validate(name).as_deref(), Some(name));
            assert_eq!(pt.translate(name).as_deref(), Some(value));
        }
    }

    #[test]
    fn test_select_bare_item() {
        let pt =
            Ptype::new("color", None, "red green", PtypeMethod::Select, PtypePreprocess::None)
                .unwrap();
        assert_eq!(pt.translate("red"), Some("red".to_string()));
    }

    #[test]
    fn test_word_generator() {
        let pt = Ptype::new(
            "proto",
            None,
            "tcp(6) udp(17) tls(443)",
            PtypeMethod::Select,
            PtypePreprocess::None,
        )
        .unwrap();
        assert_eq!(pt.word_generator("t"), vec!["tcp", "tls"]);
        assert_eq!(pt.word_generator("udp"), vec!["udp"]);
        assert!(pt.word_generator("x").is_empty());
        let re = Ptype::new("any", None, ".*", PtypeMethod::Regexp, PtypePreprocess::None)
            .unwrap();
        assert!(re.word_generator("t").is_empty());
    }

    #[test]
    fn test_preprocess() {
        let pt = Ptype::new(
            "upper",
            None,
            "[A-Z]+",
            PtypeMethod::Regexp,
            PtypePreprocess::ToUpper,
        )
        .unwrap();
        assert_eq!(pt.validate("abc"), Some("ABC".to_string()));
    }

    #[test]
    fn test_method_resolve() {
        assert_eq!(PtypeMethod::resolve("integer"), Some(PtypeMethod::Integer));
        assert_eq!(PtypeMethod::resolve("select"), Some(PtypeMethod::Select));
        assert_eq!(PtypeMethod::resolve("bogus"), None);
        assert_eq!(PtypePreprocess::resolve("tolower"), Some(PtypePreprocess::ToLower));
    }
}
