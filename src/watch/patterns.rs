// src/watch/patterns.rs

//! Glob detection and compilation.
//!
//! Patterns are matched against slash-normalized path strings. `*` and `?`
//! never cross a `/`; `**` spans any number of segments.

use globset::{Glob, GlobBuilder, GlobMatcher, GlobSet, GlobSetBuilder};

use crate::errors::{Result, WatchError};

/// Returns true if `s` contains glob metacharacters.
///
/// Brackets and braces only count when they are closed, so a file named
/// `[draft` is treated literally.
pub fn is_glob(s: &str) -> bool {
    if s.contains('*') || s.contains('?') {
        return true;
    }
    if let Some(open) = s.find('[') {
        if s[open + 1..].find(']').is_some_and(|close| close > 0) {
            return true;
        }
    }
    if let Some(open) = s.find('{') {
        if s[open + 1..].find('}').is_some_and(|close| close > 0) {
            return true;
        }
    }
    if let Some(open) = s.find('(') {
        if s[open..].contains('|') && s[open..].contains(')') {
            return true;
        }
    }
    false
}

fn glob(pattern: &str) -> Result<Glob> {
    GlobBuilder::new(pattern)
        .literal_separator(true)
        .build()
        .map_err(|e| WatchError::ConfigError(format!("invalid glob pattern {pattern}: {e}")))
}

/// Compile a single pattern.
pub fn compile_glob(pattern: &str) -> Result<GlobMatcher> {
    Ok(glob(pattern)?.compile_matcher())
}

/// Build a GlobSet from simple string patterns.
pub fn build_globset<'a, I>(patterns: I) -> Result<GlobSet>
where
    I: IntoIterator<Item = &'a str>,
{
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        builder.add(glob(pat)?);
    }
    builder
        .build()
        .map_err(|e| WatchError::ConfigError(format!("building glob set: {e}")))
}

/// Split a slash-separated glob at its first glob-bearing segment.
///
/// Returns the literal prefix (without a trailing slash, `""` when the very
/// first segment is a glob) and the remaining segments.
pub fn split_glob(path: &str) -> (String, Vec<String>) {
    let mut parent: Vec<&str> = Vec::new();
    let mut rest: Vec<String> = Vec::new();

    for segment in path.split('/') {
        if !rest.is_empty() || is_glob(segment) {
            rest.push(segment.to_string());
        } else {
            parent.push(segment);
        }
    }

    let mut prefix = parent.join("/");
    if prefix.is_empty() && path.starts_with('/') {
        prefix.push('/');
    }
    (prefix, rest)
}

/// Match one glob segment against one path segment.
pub fn segment_matches(pattern: &str, segment: &str) -> bool {
    match compile_glob(pattern) {
        Ok(m) => m.is_match(segment),
        Err(_) => pattern == segment,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_glob_metacharacters() {
        assert!(is_glob("src/*.rs"));
        assert!(is_glob("**/x"));
        assert!(is_glob("file?.txt"));
        assert!(is_glob("a/[abc].txt"));
        assert!(is_glob("a/{x,y}.txt"));
        assert!(is_glob("a/@(x|y)"));
        assert!(!is_glob("plain/path.txt"));
        assert!(!is_glob("odd[name"));
        assert!(!is_glob("[]"));
    }

    #[test]
    fn star_does_not_cross_separators() {
        let m = compile_glob("/w/*.rs").unwrap();
        assert!(m.is_match("/w/main.rs"));
        assert!(!m.is_match("/w/src/main.rs"));

        let deep = compile_glob("/w/**/*.rs").unwrap();
        assert!(deep.is_match("/w/src/a/main.rs"));
        assert!(deep.is_match("/w/main.rs"));
    }

    #[test]
    fn split_at_first_glob_segment() {
        let (parent, rest) = split_glob("/w/src/**/*.rs");
        assert_eq!(parent, "/w/src");
        assert_eq!(rest, vec!["**", "*.rs"]);

        let (parent, rest) = split_glob("*.txt");
        assert_eq!(parent, "");
        assert_eq!(rest, vec!["*.txt"]);

        let (parent, rest) = split_glob("/w/a/b");
        assert_eq!(parent, "/w/a/b");
        assert!(rest.is_empty());
    }

    #[test]
    fn globset_collects_patterns() {
        let set = build_globset(["/w/a", "/w/b/**"]).unwrap();
        assert!(set.is_match("/w/a"));
        assert!(set.is_match("/w/b/c/d"));
        assert!(!set.is_match("/w/c"));
    }
}
