//! Time-to-path naming.
//!
//! A [`PathNamer`] turns an instant into a file path using a strftime
//! pattern such as `logs/%Y-%m-%d.log`. Patterns are validated once, up
//! front, so formatting never meets an unknown specifier.

use std::fmt::Write as _;

use chrono::format::{Item, StrftimeItems};
use chrono::{DateTime, FixedOffset, Utc};

use crate::error::{Error, Result};

/// Pure `time -> path` function over a validated strftime pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathNamer {
    pattern: String,
}

impl PathNamer {
    /// Compile a pattern, rejecting empty patterns and unknown specifiers.
    pub fn new(pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();

        if pattern.is_empty() {
            return Err(Error::InvalidPattern {
                pattern,
                reason: "pattern is empty".into(),
            });
        }

        if StrftimeItems::new(&pattern).any(|item| matches!(item, Item::Error)) {
            return Err(Error::InvalidPattern {
                pattern,
                reason: "unrecognized or incomplete strftime specifier".into(),
            });
        }

        Ok(Self { pattern })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Render the pattern for `at`, viewed at `offset` east of UTC.
    pub fn format(&self, at: DateTime<Utc>, offset: FixedOffset) -> Result<String> {
        let local = at.with_timezone(&offset);
        let mut out = String::with_capacity(self.pattern.len() + 16);
        write!(out, "{}", local.format(&self.pattern)).map_err(|_| Error::InvalidPattern {
            pattern: self.pattern.clone(),
            reason: format!("cannot be rendered for {local}"),
        })?;
        Ok(out)
    }

    /// Glob matching every path this namer can produce.
    ///
    /// Each specifier becomes `*`, literal text is glob-escaped and `%%`
    /// becomes a literal `%`. Suitable as a retention sweep pattern.
    pub fn glob_pattern(&self) -> String {
        let mut out = String::with_capacity(self.pattern.len());
        let mut literal = String::new();
        let mut chars = self.pattern.chars().peekable();

        while let Some(c) = chars.next() {
            if c != '%' {
                literal.push(c);
                continue;
            }
            if chars.peek() == Some(&'%') {
                chars.next();
                literal.push('%');
                continue;
            }

            // Padding / width / precision modifiers, then the specifier itself.
            while matches!(chars.peek(), Some('-' | '_' | '0'..='9' | '.' | ':' | '#')) {
                chars.next();
            }
            chars.next();

            out.push_str(&glob::Pattern::escape(&literal));
            literal.clear();
            if !out.ends_with('*') {
                out.push('*');
            }
        }

        out.push_str(&glob::Pattern::escape(&literal));
        out
    }
}
