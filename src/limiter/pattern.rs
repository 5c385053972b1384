//! Host patterns: shell-style globs or regular expressions.

use regex::Regex;

use super::error::LimiterError;

/// A compiled pattern matched against `host[:port]`.
#[derive(Debug, Clone)]
pub struct HostPattern {
    source: String,
    regex: Regex,
}

impl HostPattern {
    /// Compiles a glob.
    ///
    /// Supported syntax: `*` (any run of characters), `?` (one character),
    /// `[abc]` / `[!abc]` (character classes), `{a,b}` (alternatives) and
    /// `\` to escape the next character.
    ///
    /// The glob is anchored at both ends, so it matches the whole
    /// `host[:port]` and never a substring of it. It also matches case
    /// insensitively, so uppercase letters in the glob still match the
    /// lowercased host the limiter passes in. Regex patterns get no such
    /// folding and should be written against lowercase hosts.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::InvalidPattern`] for unbalanced classes or groups.
    pub fn glob(glob: &str) -> Result<Self, LimiterError> {
        let regex = Regex::new(&glob_to_regex(glob))
            .map_err(|source| LimiterError::invalid_pattern(glob, source))?;
        Ok(Self {
            source: glob.to_string(),
            regex,
        })
    }

    /// Compiles a regular expression; unanchored unless the pattern anchors itself.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::InvalidPattern`] if the regex does not compile.
    pub fn regex(pattern: &str) -> Result<Self, LimiterError> {
        let regex =
            Regex::new(pattern).map_err(|source| LimiterError::invalid_pattern(pattern, source))?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    #[must_use]
    pub fn matches(&self, host: &str) -> bool {
        self.regex.is_match(host)
    }

    /// Returns the pattern as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

/// Translates a glob into an anchored, case-insensitive regex.
fn glob_to_regex(glob: &str) -> String {
    let mut out = String::from("(?i)^");
    let mut chars = glob.chars();
    let mut open_groups = 0_usize;

    while let Some(c) = chars.next() {
        match c {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '{' => {
                open_groups += 1;
                out.push_str("(?:");
            }
            '}' if open_groups > 0 => {
                open_groups -= 1;
                out.push(')');
            }
            ',' if open_groups > 0 => out.push('|'),
            '[' => {
                out.push('[');
                let mut first = true;
                let mut closed = false;
                for class_char in chars.by_ref() {
                    match class_char {
                        ']' if !first => {
                            closed = true;
                            break;
                        }
                        '!' if first => out.push('^'),
                        '\\' | '[' | ']' | '&' | '~' | '-' if first => {
                            out.push('\\');
                            out.push(class_char);
                        }
                        '\\' | '[' | '&' | '~' => {
                            out.push('\\');
                            out.push(class_char);
                        }
                        other => out.push(other),
                    }
                    first = false;
                }
                if closed {
                    out.push(']');
                }
            }
            '\\' => {
                if let Some(escaped) = chars.next() {
                    out.push_str(&regex::escape(escaped.encode_utf8(&mut [0; 4])));
                }
            }
            other => out.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }

    // Unclosed groups and classes are left open so that compilation fails.
    out.push('$');
    out
}
