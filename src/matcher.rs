//! Output matching with embedded regex islands
//!
//! Expected output is matched literally, except for fragments an author
//! marked with `{{match "regex"}}`. During template expansion each such
//! fragment is registered in a [`RegexRegistry`] and replaced by an opaque
//! token. Matching then escapes the whole expected text, swaps every token
//! back for its regex source and matches the anchored result against the
//! actual output. When no token is present the comparison is plain string
//! equality.

use regex::Regex;
use crate::error::RunError;

const TOKEN_PREFIX: &str = "__tesh_match_";
const TOKEN_SUFFIX: &str = "__";

/// Regex fragments registered during one expansion pass.
///
/// Tokens only contain characters `regex::escape` leaves untouched, so they
/// survive escaping of the surrounding text.
#[derive(Debug, Default)]
pub struct RegexRegistry {
    patterns: Vec<String>,
}

impl RegexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a regex source and return the token standing in for it.
    pub fn register(&mut self, pattern: impl Into<String>) -> String {
        let id = self.patterns.len();
        self.patterns.push(pattern.into());
        format!("{}{}{}", TOKEN_PREFIX, id, TOKEN_SUFFIX)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Replace every registered token in `text` with `f(pattern)`.
    /// Returns whether any token was found.
    fn substitute(&self, text: &str, f: impl Fn(&str) -> String) -> (String, bool) {
        let mut out = String::with_capacity(text.len());
        let mut found = false;
        let mut rest = text;

        while let Some(start) = rest.find(TOKEN_PREFIX) {
            out.push_str(&rest[..start]);
            let after = &rest[start + TOKEN_PREFIX.len()..];
            let digits = after.len() - after.trim_start_matches(|c: char| c.is_ascii_digit()).len();

            let pattern = after[..digits].parse::<usize>().ok()
                .filter(|_| after[digits..].starts_with(TOKEN_SUFFIX))
                .and_then(|id| self.patterns.get(id));

            match pattern {
                Some(pattern) => {
                    out.push_str(&f(pattern));
                    found = true;
                    rest = &after[digits + TOKEN_SUFFIX.len()..];
                }
                None => {
                    // Not one of ours, keep it verbatim
                    out.push_str(TOKEN_PREFIX);
                    rest = after;
                }
            }
        }
        out.push_str(rest);

        (out, found)
    }

    /// The expected text with tokens replaced by their raw regex source,
    /// for error messages.
    pub fn literal(&self, expected: &str) -> String {
        self.substitute(expected, |pattern| pattern.to_string()).0
    }

    /// Build the anchored regex for `expected`, or `None` if it holds no
    /// registered token.
    pub fn pattern(&self, expected: &str) -> Option<String> {
        let escaped = regex::escape(expected);
        let (pattern, found) = self.substitute(&escaped, |pattern| format!("(?:{})", pattern));
        found.then(|| format!("^{}$", pattern))
    }
}

/// Check whether `actual` output satisfies the `expected` text.
pub fn matches(actual: &str, expected: &str, registry: &RegexRegistry) -> Result<bool, RunError> {
    if registry.is_empty() || (actual.is_empty() && expected.is_empty()) {
        return Ok(actual == expected);
    }

    let Some(pattern) = registry.pattern(expected) else {
        return Ok(actual == expected);
    };

    let re = Regex::new(&pattern).map_err(|source| RunError::MatchCompile {
        pattern: pattern.clone(),
        source,
    })?;
    Ok(re.is_match(actual))
}
