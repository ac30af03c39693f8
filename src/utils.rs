//! Shared helpers.
//!
//! - Name and filter patterns
//! - `@fir:` attribute key parsing and printing
//! - Content hashing for block names

use once_cell::sync::Lazy;
use regex::Regex;
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Prefixes and reserved names
// ---------------------------------------------------------------------------

/// Canonical event-binding attribute prefix.
pub const FIR_PREFIX: &str = "@fir:";

/// Long-hand form of [`FIR_PREFIX`] accepted on input.
pub const ALPINE_FIR_PREFIX: &str = "x-on:fir:";

/// Prefix of every directive attribute.
pub const DIRECTIVE_PREFIX: &str = "x-fir-";

/// Prefix reserved for generated block names.
pub const BLOCK_PREFIX: &str = "fir-";

/// Event-template sentinel meaning "the whole host element".
pub const NO_BLOCK: &str = "-";

/// Modifier telling the client runtime no HTML payload is expected.
pub const NOHTML: &str = "nohtml";

/// Attribute whose value is appended to synthesized class names.
pub const KEY_ATTR: &str = "fir-key";

/// Opening and closing interpolation markers of the template language.
pub const OPEN_DELIM: &str = "{{";
pub const CLOSE_DELIM: &str = "}}";

/// Number of hex digits of the SHA-256 digest kept in a block name.
const HASH_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Patterns
// ---------------------------------------------------------------------------

static EVENT_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9-]+$").expect("valid event name pattern"));

static TEMPLATE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[ A-Za-z0-9\-:_]*$").expect("valid template name pattern"));

static FILTER_VALUE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9-]+:(ok|pending|error|done)$").expect("valid filter pattern")
});

/// Whether `name` is a valid event name.
pub fn is_valid_event_name(name: &str) -> bool {
    EVENT_NAME_RE.is_match(name)
}

/// Whether `name` is a valid (non-empty) template or block name.
pub fn is_valid_template_name(name: &str) -> bool {
    !name.trim().is_empty() && TEMPLATE_NAME_RE.is_match(name)
}

/// Whether `value` is a single `event:state` bracket entry.
pub fn is_valid_filter_value(value: &str) -> bool {
    FILTER_VALUE_RE.is_match(value)
}

// ---------------------------------------------------------------------------
// Hashing
// ---------------------------------------------------------------------------

/// Hex digest of `content`, truncated to the block name length.
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(HASH_LEN);
    digest
}

/// Content-addressed block name for an inner HTML fragment.
pub fn block_name(inner_html: &str) -> String {
    format!("{BLOCK_PREFIX}{}", content_hash(inner_html))
}

/// Heuristic: the fragment contains template syntax.
pub fn has_template_syntax(fragment: &str) -> bool {
    fragment.contains(OPEN_DELIM) && fragment.contains(CLOSE_DELIM)
}

// ---------------------------------------------------------------------------
// Event-binding attribute keys
// ---------------------------------------------------------------------------

/// Strip the `@fir:` or `x-on:fir:` prefix from an attribute key.
pub fn strip_fir_prefix(key: &str) -> Option<(&'static str, &str)> {
    if let Some(rest) = key.strip_prefix(FIR_PREFIX) {
        Some((FIR_PREFIX, rest))
    } else if let Some(rest) = key.strip_prefix(ALPINE_FIR_PREFIX) {
        Some((ALPINE_FIR_PREFIX, rest))
    } else {
        None
    }
}

/// Split `event:state` into its parts. A missing state yields `None`.
pub fn split_event_state(entry: &str) -> (&str, Option<&str>) {
    match entry.split_once(':') {
        Some((event, state)) => (event, Some(state)),
        None => (entry, None),
    }
}

/// Parsed shape of an event-binding attribute key:
/// `<prefix><events>[::<block>][.<modifier>]*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirKey {
    pub prefix: &'static str,
    /// Either a single `event[:state]` or a bracket group `[e1:s1,e2:s2]`.
    pub events: String,
    pub block: Option<String>,
    pub modifiers: Vec<String>,
}

impl FirKey {
    pub fn parse(key: &str) -> Option<Self> {
        let (prefix, rest) = strip_fir_prefix(key)?;
        let mut segments = rest.split('.');
        let head = segments.next().unwrap_or_default();
        let modifiers = segments.map(str::to_owned).collect();
        let (events, block) = match head.split_once("::") {
            Some((events, block)) => (events, Some(block.to_owned())),
            None => (head, None),
        };
        if events.is_empty() {
            return None;
        }
        Some(Self {
            prefix,
            events: events.to_owned(),
            block,
            modifiers,
        })
    }

    /// The key without its modifiers, as fed to the filter expander.
    pub fn routing_part(&self) -> String {
        match &self.block {
            Some(block) => format!("{}::{}", self.events, block),
            None => self.events.clone(),
        }
    }

    /// Raw `event[:state]` entries, brackets removed, without validation.
    pub fn event_entries(&self) -> Vec<&str> {
        let inner = self
            .events
            .strip_prefix('[')
            .and_then(|s| s.strip_suffix(']'))
            .unwrap_or(&self.events);
        inner
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }

    pub fn has_modifier(&self, modifier: &str) -> bool {
        self.modifiers.iter().any(|m| m == modifier)
    }

    pub fn to_key(&self) -> String {
        let mut key = format!("{}{}", self.prefix, self.routing_part());
        for modifier in &self.modifiers {
            key.push('.');
            key.push_str(modifier);
        }
        key
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_template_name_pattern() {
        assert!(is_valid_template_name("todo"));
        assert!(is_valid_template_name("todo_item:row 2"));
        assert!(!is_valid_template_name(""));
        assert!(!is_valid_template_name("todo.item"));
        assert!(!is_valid_template_name("{{.x}}"));
    }

    #[test]
    fn test_filter_value_pattern() {
        assert!(is_valid_filter_value("create:ok"));
        assert!(is_valid_filter_value("update-now:done"));
        assert!(!is_valid_filter_value("create"));
        assert!(!is_valid_filter_value("create:bad"));
    }

    #[test]
    fn test_block_name_is_stable() {
        let a = block_name("<h1>{{.Title}}</h1>");
        let b = block_name("<h1>{{.Title}}</h1>");
        assert_eq!(a, b);
        assert!(a.starts_with("fir-"));
        assert_eq!(a.len(), "fir-".len() + 16);
        assert_ne!(a, block_name("<h2>{{.Title}}</h2>"));
    }

    #[test]
    fn test_has_template_syntax() {
        assert!(has_template_syntax("<b>{{ .Name }}</b>"));
        assert!(!has_template_syntax("<b>static</b>"));
        assert!(!has_template_syntax("{{ unterminated"));
    }

    #[test]
    fn test_parse_fir_key() {
        let key = FirKey::parse("@fir:[create:ok,delete:error]::todo.prevent.nohtml").unwrap();
        assert_eq!(key.prefix, FIR_PREFIX);
        assert_eq!(key.events, "[create:ok,delete:error]");
        assert_eq!(key.block.as_deref(), Some("todo"));
        assert_eq!(key.modifiers, vec!["prevent", "nohtml"]);
        assert_eq!(key.event_entries(), vec!["create:ok", "delete:error"]);
        assert_eq!(key.to_key(), "@fir:[create:ok,delete:error]::todo.prevent.nohtml");
    }

    #[test]
    fn test_parse_alpine_key() {
        let key = FirKey::parse("x-on:fir:click").unwrap();
        assert_eq!(key.prefix, ALPINE_FIR_PREFIX);
        assert_eq!(key.routing_part(), "click");
        assert!(FirKey::parse("class").is_none());
        assert!(FirKey::parse("@fir:").is_none());
    }

    #[test]
    fn test_split_event_state() {
        assert_eq!(split_event_state("create:ok"), ("create", Some("ok")));
        assert_eq!(split_event_state("create"), ("create", None));
    }
}
