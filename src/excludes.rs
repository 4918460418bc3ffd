//! The exclude set: glob-like patterns compiled to regex matchers and tested
//! against sync-root-relative paths before they ever reach a delay FIFO.

use log::warn;
use std::fs;
use std::path::Path;

/// A compiled pattern paired with the original string the user supplied (so
/// `remove` and the status report can echo it back verbatim).
struct CompiledPattern {
    original: String,
    regex: regex::Regex,
}

/// Ordered collection of exclude patterns for one `Sync`.
#[derive(Default)]
pub struct Excludes {
    patterns: Vec<CompiledPattern>,
}

impl Excludes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotent: adding the same pattern string twice is a no-op the
    /// second time.
    pub fn add(&mut self, pattern: &str) {
        if self.patterns.iter().any(|p| p.original == pattern) {
            return;
        }
        let regex = compile(pattern);
        self.patterns.push(CompiledPattern { original: pattern.to_string(), regex });
    }

    /// Removing an absent pattern is logged but not fatal.
    pub fn remove(&mut self, pattern: &str) {
        let before = self.patterns.len();
        self.patterns.retain(|p| p.original != pattern);
        if self.patterns.len() == before {
            warn!("exclude pattern {:?} was not present, nothing removed", pattern);
        }
    }

    /// Parses one pattern per line. A leading `+` is explicitly unsupported
    /// (skipped with a log message); leading whitespace and a leading `-`
    /// are stripped.
    pub fn load_file(&mut self, path: &Path) -> std::io::Result<()> {
        let contents = fs::read_to_string(path)?;
        for line in contents.lines() {
            let trimmed = line.trim_start();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.starts_with('+') {
                warn!("exclude file {:?}: '+' inclusion lines are not supported, skipping {:?}", path, line);
                continue;
            }
            let pattern = trimmed.strip_prefix('-').unwrap_or(trimmed).trim_start();
            if !pattern.is_empty() {
                self.add(pattern);
            }
        }
        Ok(())
    }

    pub fn test(&self, relative_path: &str) -> bool {
        self.patterns.iter().any(|p| p.regex.is_match(relative_path))
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.original.as_str())
    }
}

/// Compiles one rsync-filter-like pattern to a regex: escape regex
/// metacharacters, `?` -> `[^/]`, `*` -> `[^/]*`, `**` -> `.*`, a leading `/`
/// anchors at the sync root, a trailing `/` matches the directory and
/// everything under it.
fn compile(pattern: &str) -> regex::Regex {
    let anchored = pattern.starts_with('/');
    let body = pattern.strip_prefix('/').unwrap_or(pattern);
    let (body, is_dir) = match body.strip_suffix('/') {
        Some(stripped) => (stripped, true),
        None => (body, false),
    };

    let mut re = String::new();
    re.push_str(if anchored { "^" } else { "^(?:.*/)?" });

    let chars: Vec<char> = body.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c == '*' && chars.get(i + 1) == Some(&'*') && chars.get(i + 2) == Some(&'/') {
            // "**/" matches zero or more path segments, including none.
            re.push_str("(?:.*/)?");
            i += 3;
        } else if c == '*' && chars.get(i + 1) == Some(&'*') {
            re.push_str(".*");
            i += 2;
        } else if c == '*' {
            re.push_str("[^/]*");
            i += 1;
        } else if c == '?' {
            re.push_str("[^/]");
            i += 1;
        } else {
            if is_regex_meta(c) {
                re.push('\\');
            }
            re.push(c);
            i += 1;
        }
    }

    if is_dir {
        re.push_str("(?:/.*)?");
    }
    re.push('$');

    regex::Regex::new(&re).expect("compiled exclude pattern is always a valid regex")
}

fn is_regex_meta(c: char) -> bool {
    matches!(c, '.' | '+' | '(' | ')' | '[' | ']' | '{' | '}' | '^' | '$' | '|' | '\\')
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn add_is_idempotent() {
        let mut ex = Excludes::new();
        ex.add("*.tmp");
        ex.add("*.tmp");
        assert_eq!(ex.patterns().count(), 1);
    }

    #[test]
    fn star_matches_one_segment_at_any_depth() {
        let mut ex = Excludes::new();
        ex.add("*.tmp");
        assert!(ex.test("a.tmp"));
        // Unanchored: matches the basename at any depth...
        assert!(ex.test("dir/a.tmp"));
        // ...but `*` itself never crosses a `/` within one segment.
        assert!(!ex.test("a.tmp/extra"));
    }

    #[test]
    fn double_star_matches_any_suffix() {
        let mut ex = Excludes::new();
        ex.add("**/*.tmp");
        assert!(ex.test("a.tmp"));
        assert!(ex.test("deep/nested/a.tmp"));
    }

    #[test]
    fn anchored_pattern_only_matches_at_root() {
        let mut ex = Excludes::new();
        ex.add("/build");
        assert!(ex.test("build"));
        assert!(!ex.test("sub/build"));
    }

    #[test]
    fn trailing_slash_matches_directory_and_contents() {
        let mut ex = Excludes::new();
        ex.add("/target/");
        assert!(ex.test("target"));
        assert!(ex.test("target/debug/out"));
    }

    #[test]
    fn load_file_skips_plus_lines_and_strips_minus() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        writeln!(tmp, "+included").unwrap();
        writeln!(tmp, "-*.log").unwrap();
        writeln!(tmp, "  *.bak").unwrap();
        tmp.flush().unwrap();

        let mut ex = Excludes::new();
        ex.load_file(tmp.path()).unwrap();
        assert_eq!(ex.patterns().count(), 2);
        assert!(ex.test("a.log"));
        assert!(ex.test("a.bak"));
    }

    #[test]
    fn remove_absent_pattern_is_not_fatal() {
        let mut ex = Excludes::new();
        ex.remove("nope");
        assert_eq!(ex.patterns().count(), 0);
    }
}
