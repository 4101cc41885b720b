//! Glob-style event name patterns.
//!
//! `*` matches any run of characters (including none), `?` matches exactly
//! one character, everything else matches literally. Patterns are anchored
//! to the whole event name.

use regex::Regex;

use crate::error::BusError;

#[derive(Debug, Clone)]
pub struct WildcardPattern {
    source: String,
    regex: Regex,
}

impl WildcardPattern {
    pub fn new(pattern: &str) -> Result<Self, BusError> {
        let mut expr = String::with_capacity(pattern.len() * 2 + 8);
        expr.push_str("(?s)^");
        let mut buf = [0u8; 4];
        for c in pattern.chars() {
            match c {
                '*' => expr.push_str(".*"),
                '?' => expr.push('.'),
                other => expr.push_str(&regex::escape(other.encode_utf8(&mut buf))),
            }
        }
        expr.push('$');

        let regex = Regex::new(&expr).map_err(|e| BusError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn matches(&self, event: &str) -> bool {
        self.regex.is_match(event)
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl PartialEq for WildcardPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}
