//! Glob-style file name filters.

use glob::{MatchOptions, Pattern};

use polystore_common::{Error, Result};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A search pattern matched against file names (not full paths).
///
/// An empty pattern and `*` both match every name.
#[derive(Debug, Clone)]
pub struct SearchPattern {
    pattern: Option<Pattern>,
}

impl SearchPattern {
    /// Compile a pattern.
    ///
    /// # Errors
    /// - `InvalidArgument` if the glob is malformed
    pub fn new(pattern: &str) -> Result<Self> {
        let pattern = pattern.trim();
        if pattern.is_empty() || pattern == "*" {
            return Ok(Self::any());
        }
        let compiled = Pattern::new(pattern).map_err(|e| {
            Error::InvalidArgument(format!("Invalid search pattern '{}': {}", pattern, e))
        })?;
        Ok(Self {
            pattern: Some(compiled),
        })
    }

    /// Pattern matching every name.
    pub fn any() -> Self {
        Self { pattern: None }
    }

    /// Whether the pattern matches every name.
    pub fn matches_all(&self) -> bool {
        self.pattern.is_none()
    }

    /// Match a file name.
    pub fn matches(&self, name: &str) -> bool {
        match &self.pattern {
            Some(pattern) => pattern.matches_with(name, MATCH_OPTIONS),
            None => true,
        }
    }
}

impl Default for SearchPattern {
    fn default() -> Self {
        Self::any()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcards_match_everything() {
        assert!(SearchPattern::new("").unwrap().matches("anything.bin"));
        assert!(SearchPattern::new("*").unwrap().matches_all());
    }

    #[test]
    fn test_extension_pattern_is_case_insensitive() {
        let pattern = SearchPattern::new("*.txt").unwrap();
        assert!(pattern.matches("notes.txt"));
        assert!(pattern.matches("NOTES.TXT"));
        assert!(!pattern.matches("notes.md"));
    }

    #[test]
    fn test_question_mark() {
        let pattern = SearchPattern::new("log?.csv").unwrap();
        assert!(pattern.matches("log1.csv"));
        assert!(!pattern.matches("log12.csv"));
    }

    #[test]
    fn test_invalid_pattern() {
        let err = SearchPattern::new("[").unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
