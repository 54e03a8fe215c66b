// src/watch/ignore.rs

//! Ignore decisions.
//!
//! An [`IgnoreMatcher`] combines three sources:
//! - the built-in transient-file pattern (editor swap/backup/temp files),
//! - the `ignored` option entries,
//! - the Ignored-Path Set grown by negated watch requests and `unwatch`.
//!
//! The compiled form is memoized and rebuilt lazily after any mutation.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, LazyLock};

use globset::GlobSet;
use regex::Regex;
use tracing::{debug, warn};

use crate::fs::Metadata;
use crate::watch::path_utils::{resolve, slash};
use crate::watch::patterns::{build_globset, is_glob};

static TRANSIENT_FILE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\..*\.swp$|~$|\.subl.*\.tmp$").expect("transient-file pattern is valid")
});

/// Returns true for editor swap, backup and temp files.
pub fn is_transient(path: &str) -> bool {
    TRANSIENT_FILE.is_match(path)
}

type PredicateFn = dyn Fn(&Path, Option<&Metadata>) -> bool + Send + Sync;

/// Ignore predicate receiving the path and, once it has been stat'ed, its
/// metadata.
#[derive(Clone)]
pub struct IgnorePredicate(Arc<PredicateFn>);

impl IgnorePredicate {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&Path, Option<&Metadata>) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn test(&self, path: &Path, stats: Option<&Metadata>) -> bool {
        (self.0)(path, stats)
    }
}

impl fmt::Debug for IgnorePredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("IgnorePredicate(..)")
    }
}

/// One entry of the `ignored` option.
#[derive(Debug, Clone)]
pub enum Ignored {
    /// Literal path or glob pattern.
    Pattern(String),
    Regex(Regex),
    Predicate(IgnorePredicate),
}

impl Ignored {
    pub fn predicate<F>(f: F) -> Self
    where
        F: Fn(&Path, Option<&Metadata>) -> bool + Send + Sync + 'static,
    {
        Ignored::Predicate(IgnorePredicate::new(f))
    }
}

impl From<&str> for Ignored {
    fn from(s: &str) -> Self {
        Ignored::Pattern(s.to_string())
    }
}

impl From<String> for Ignored {
    fn from(s: String) -> Self {
        Ignored::Pattern(s)
    }
}

impl From<Regex> for Ignored {
    fn from(re: Regex) -> Self {
        Ignored::Regex(re)
    }
}

#[derive(Debug)]
struct CompiledIgnore {
    literals: HashSet<String>,
    globs: GlobSet,
    regexes: Vec<Regex>,
    predicates: Vec<IgnorePredicate>,
}

impl CompiledIgnore {
    fn matches(&self, path: &Path, stats: Option<&Metadata>) -> bool {
        let slashed = slash(path);
        self.literals.contains(&slashed)
            || self.globs.is_match(&slashed)
            || self.regexes.iter().any(|re| re.is_match(&slashed))
            || self.predicates.iter().any(|p| p.test(path, stats))
    }
}

#[derive(Debug)]
pub struct IgnoreMatcher {
    /// Ignored-Path Set: raw strings from negated requests and `unwatch`.
    paths: BTreeSet<String>,
    user: Vec<Ignored>,
    skip_transient: bool,
    compiled: Option<CompiledIgnore>,
}

impl IgnoreMatcher {
    /// `cwd` resolves relative string entries of `ignored`.
    pub fn new(ignored: &[Ignored], cwd: Option<&Path>, skip_transient: bool) -> Self {
        let user = ignored
            .iter()
            .map(|entry| match (entry, cwd) {
                (Ignored::Pattern(p), Some(cwd)) if !Path::new(p).is_absolute() => {
                    Ignored::Pattern(slash(&resolve(cwd, Path::new(p))))
                }
                (other, _) => other.clone(),
            })
            .collect();

        Self {
            paths: BTreeSet::new(),
            user,
            skip_transient,
            compiled: None,
        }
    }

    /// Add a raw entry to the Ignored-Path Set.
    pub fn insert(&mut self, raw: impl Into<String>) {
        if self.paths.insert(raw.into()) {
            self.invalidate();
        }
    }

    /// Stop ignoring a previously ignored path and its contents.
    pub fn forget(&mut self, raw: &str) {
        let removed = self.paths.remove(raw) | self.paths.remove(&format!("{raw}/**"));
        if removed {
            self.invalidate();
        }
    }

    pub fn contains(&self, raw: &str) -> bool {
        self.paths.contains(raw)
    }

    /// Drop the memoized matcher; the next query recompiles it.
    pub fn invalidate(&mut self) {
        self.compiled = None;
    }

    pub fn is_ignored(&mut self, path: &Path, stats: Option<&Metadata>) -> bool {
        if is_transient(&slash(path)) && self.skip_transient {
            return true;
        }

        if self.compiled.is_none() {
            self.compiled = Some(self.compile());
        }
        self.compiled
            .as_ref()
            .is_some_and(|c| c.matches(path, stats))
    }

    fn compile(&self) -> CompiledIgnore {
        let mut literals = HashSet::new();
        let mut patterns: Vec<String> = Vec::new();
        let mut regexes = Vec::new();
        let mut predicates = Vec::new();

        let mut push_pattern = |raw: &str| {
            let raw = raw.replace('\\', "/");
            if is_glob(&raw) {
                patterns.push(raw);
            } else {
                literals.insert(raw);
            }
        };

        for raw in &self.paths {
            push_pattern(raw);
        }

        for entry in &self.user {
            match entry {
                Ignored::Pattern(p) => {
                    push_pattern(p);
                    if !is_glob(p) {
                        // Contents of an ignored directory are ignored too.
                        push_pattern(&format!("{}/**", p.trim_end_matches('/')));
                    }
                }
                Ignored::Regex(re) => regexes.push(re.clone()),
                Ignored::Predicate(p) => predicates.push(p.clone()),
            }
        }

        let globs = match build_globset(patterns.iter().map(String::as_str)) {
            Ok(set) => set,
            Err(err) => {
                warn!(error = %err, "invalid ignore pattern; falling back to per-pattern compile");
                let valid: Vec<&str> = patterns
                    .iter()
                    .map(String::as_str)
                    .filter(|p| build_globset([*p]).is_ok())
                    .collect();
                build_globset(valid).unwrap_or_default()
            }
        };

        debug!(
            literals = literals.len(),
            globs = globs.len(),
            regexes = regexes.len(),
            predicates = predicates.len(),
            "compiled ignore matcher"
        );

        CompiledIgnore {
            literals,
            globs,
            regexes,
            predicates,
        }
    }
}

/// Convert a path to the raw string form stored in the Ignored-Path Set.
pub fn raw_entry(path: &Path) -> String {
    slash(path)
}

/// `path/**`, the "contents too" form.
pub fn contents_entry(path: &Path) -> String {
    let base = slash(path);
    format!("{}/**", base.trim_end_matches('/'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matcher(ignored: &[Ignored]) -> IgnoreMatcher {
        IgnoreMatcher::new(ignored, None, true)
    }

    #[test]
    fn transient_files_follow_the_toggle() {
        let mut on = matcher(&[]);
        assert!(on.is_ignored(Path::new("/w/.file.txt.swp"), None));
        assert!(on.is_ignored(Path::new("/w/file.txt~"), None));
        assert!(on.is_ignored(Path::new("/w/.subl123.tmp"), None));
        assert!(!on.is_ignored(Path::new("/w/file.txt"), None));

        let mut off = IgnoreMatcher::new(&[], None, false);
        assert!(!off.is_ignored(Path::new("/w/file.txt~"), None));
    }

    #[test]
    fn literal_entries_cover_their_contents() {
        let mut m = matcher(&["/w/build".into()]);
        assert!(m.is_ignored(Path::new("/w/build"), None));
        assert!(m.is_ignored(Path::new("/w/build/out/a.o"), None));
        assert!(!m.is_ignored(Path::new("/w/builder"), None));
    }

    #[test]
    fn relative_entries_resolve_against_cwd() {
        let mut m = IgnoreMatcher::new(&["logs".into()], Some(Path::new("/w")), true);
        assert!(m.is_ignored(Path::new("/w/logs/today"), None));
        assert!(!m.is_ignored(Path::new("/other/logs"), None));
    }

    #[test]
    fn glob_regex_and_predicate_entries() {
        let mut m = matcher(&[
            "/w/**/*.log".into(),
            Regex::new("add").unwrap().into(),
            Ignored::predicate(|_, stats| stats.is_some_and(|s| s.is_dir())),
        ]);

        assert!(m.is_ignored(Path::new("/w/a/b.log"), None));
        assert!(m.is_ignored(Path::new("/w/add.txt"), None));
        assert!(!m.is_ignored(Path::new("/w/sub"), None));
        assert!(m.is_ignored(Path::new("/w/sub"), Some(&Metadata::dir())));
        assert!(!m.is_ignored(Path::new("/w/sub"), Some(&Metadata::file(1))));
    }

    #[test]
    fn path_set_mutations_invalidate_the_memo() {
        let mut m = matcher(&[]);
        let sub = Path::new("/w/sub");
        assert!(!m.is_ignored(&sub.join("a.txt"), None));

        m.insert(raw_entry(sub));
        m.insert(contents_entry(sub));
        assert!(m.is_ignored(&sub.join("a.txt"), None));

        m.forget(&raw_entry(sub));
        assert!(!m.is_ignored(&sub.join("a.txt"), None));
        assert!(!m.contains("/w/sub/**"));
    }

    #[test]
    fn negated_globs_in_path_set() {
        let mut m = matcher(&[]);
        m.insert("/w/*.tmp");
        assert!(m.is_ignored(Path::new("/w/x.tmp"), None));
        assert!(!m.is_ignored(Path::new("/w/sub/x.tmp"), None));
    }
}
