//! Wildcard path filter.
//!
//! Patterns come from a pipe-delimited string such as `*.tmp|cache/*` and are
//! compiled once into regular expressions. `?` matches a single character and
//! `*` matches any run of characters; everything else is literal.
//!
//! Since every other character is escaped, a pattern is malformed in only two
//! ways: it contains NUL, which no path on any supported platform can hold,
//! or its compiled form is larger than the regex engine's size limit. Both
//! fail construction with `EngineError::InvalidPattern`.

use std::path::Path;

use regex::Regex;

use crate::error::EngineError;
use crate::model::{FilterMode, FilterSpec};

/// Include/exclude decision for source paths.
#[derive(Debug, Clone)]
pub struct PathFilter {
    mode: FilterMode,
    patterns: Vec<Regex>,
}

impl PathFilter {
    /// Compile a filter. Fails on the first pattern that cannot be compiled.
    pub fn new(mode: FilterMode, patterns: &str) -> Result<Self, EngineError> {
        let patterns = split_patterns(patterns)
            .map(compile_wildcard)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PathFilter { mode, patterns })
    }

    pub fn from_spec(spec: &FilterSpec) -> Result<Self, EngineError> {
        Self::new(spec.mode, &spec.patterns)
    }

    /// Blacklist with no patterns: includes everything.
    pub fn allow_all() -> Self {
        PathFilter {
            mode: FilterMode::Blacklist,
            patterns: Vec::new(),
        }
    }

    pub fn mode(&self) -> FilterMode {
        self.mode
    }

    pub fn pattern_count(&self) -> usize {
        self.patterns.len()
    }

    /// Returns true if `path` takes part in the run.
    pub fn check(&self, path: &Path) -> bool {
        if self.patterns.is_empty() {
            return self.mode == FilterMode::Blacklist;
        }

        let path = path.to_string_lossy();
        let matched = self.patterns.iter().any(|re| re.is_match(&path));

        match self.mode {
            FilterMode::Whitelist => matched,
            FilterMode::Blacklist => !matched,
        }
    }
}

impl Default for PathFilter {
    fn default() -> Self {
        Self::allow_all()
    }
}

/// Split a pipe-delimited pattern string, dropping empty segments.
pub fn split_patterns(patterns: &str) -> impl Iterator<Item = &str> {
    patterns.split('|').filter(|p| !p.is_empty())
}

/// Translate one wildcard pattern into a regex anchored at a path component
/// boundary and at the end of the path.
fn compile_wildcard(pattern: &str) -> Result<Regex, EngineError> {
    if pattern.contains('\0') {
        return Err(EngineError::InvalidPattern {
            pattern: pattern.to_string(),
            reason: "pattern contains a NUL character".to_string(),
        });
    }

    let mut body = String::with_capacity(pattern.len() * 2);
    for c in pattern.chars() {
        match c {
            '*' => body.push_str(".*"),
            '?' => body.push('.'),
            _ => body.push_str(&regex::escape(c.encode_utf8(&mut [0u8; 4]))),
        }
    }

    Regex::new(&format!(r"(?s)(?:^|[/\\]){body}$")).map_err(|e| EngineError::InvalidPattern {
        pattern: pattern.to_string(),
        reason: e.to_string(),
    })
}
