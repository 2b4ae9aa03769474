//! Executable-path patterns that decide which processes are left alone.
//!
//! A pattern is either an exact path or a bare file name. Bare names match the
//! basename of a candidate path case-insensitively, whatever separator style
//! the path uses.

/// Returns true when `path` is covered by `pattern`.
///
/// Exact paths compare verbatim. A pattern without any `/` or `\` is treated
/// as a file name and compared against the lowercased last path component.
pub fn path_matches(path: &str, pattern: &str) -> bool {
    if path == pattern {
        return true;
    }
    if pattern.contains(['/', '\\']) {
        return false;
    }
    basename(path).to_lowercase() == pattern.to_lowercase()
}

/// Last component of `path`, treating both `/` and `\` as separators.
pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Ordered set of patterns excluded from volume reduction.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    patterns: Vec<String>,
}

impl Whitelist {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, pattern: impl Into<String>) {
        let pattern = pattern.into();
        if pattern.trim().is_empty() || self.patterns.contains(&pattern) {
            return;
        }
        self.patterns.push(pattern);
    }

    /// Drop every entry so no process is protected from reduction.
    pub fn reset(&mut self) {
        self.patterns.clear();
    }

    pub fn is_whitelisted(&self, path: &str) -> bool {
        self.patterns
            .iter()
            .any(|pattern| path_matches(path, pattern))
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

impl<S: Into<String>> FromIterator<S> for Whitelist {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut list = Whitelist::new();
        for pattern in iter {
            list.add(pattern);
        }
        list
    }
}
