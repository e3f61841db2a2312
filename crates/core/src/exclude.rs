//! Glob exclusion rules
//!
//! Two pattern shapes are supported:
//!
//! - **File patterns** (`*.log`, `.env`, `src/*.gen.rs`) are matched against the
//!   whole `/`-separated path relative to the project root. Wildcards may cross
//!   directory separators, so `*.log` excludes `a/b/c.log` while a literal
//!   `.env` only excludes the root-level file.
//! - **Directory patterns** end in `/` (or `\`). They match any run of directory
//!   components at any depth, and everything beneath a matching directory is
//!   excluded. Wildcards stay within one component.
//!
//! Supported wildcards: `*`, `?`, `[abc]`, `[a-z]`, `[!abc]` / `[^abc]`, and
//! `\` to escape the next character.

use crate::error::CheckpointError;
use regex::Regex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PatternKind {
    File,
    Directory,
}

/// A single compiled exclusion pattern
#[derive(Debug, Clone)]
pub struct ExclusionPattern {
    raw: String,
    kind: PatternKind,
    regex: Regex,
    /// Number of path components a directory pattern spans
    components: usize,
}

impl ExclusionPattern {
    /// Compile one pattern
    pub fn compile(raw: &str) -> Result<Self, CheckpointError> {
        let invalid = |message: String| CheckpointError::Exclusion {
            pattern: raw.to_string(),
            message,
        };

        let trimmed = raw.trim();
        let (body, kind) = match trimmed.strip_suffix(['/', '\\']) {
            Some(body) => (body, PatternKind::Directory),
            None => (trimmed, PatternKind::File),
        };
        let body = body.trim_start_matches("./").trim_start_matches('/');
        if body.is_empty() {
            return Err(invalid("pattern is empty".to_string()));
        }

        let (star, single) = match kind {
            PatternKind::File => (".*", "."),
            PatternKind::Directory => ("[^/]*", "[^/]"),
        };
        let source = translate(body, star, single).map_err(invalid)?;
        let regex = Regex::new(&source).map_err(|e| invalid(e.to_string()))?;

        Ok(Self {
            raw: raw.to_string(),
            kind,
            regex,
            components: body.split('/').filter(|c| !c.is_empty()).count().max(1),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn is_directory(&self) -> bool {
        self.kind == PatternKind::Directory
    }

    /// Match a file path relative to the project root
    pub fn matches_file(&self, rel_path: &str) -> bool {
        match self.kind {
            PatternKind::File => self.regex.is_match(rel_path),
            PatternKind::Directory => {
                // Only the directories above the file count
                let components: Vec<&str> = rel_path.split('/').collect();
                let dirs = &components[..components.len().saturating_sub(1)];
                self.matches_components(dirs)
            }
        }
    }

    /// Match a directory path relative to the project root
    pub fn matches_dir(&self, rel_dir: &str) -> bool {
        match self.kind {
            PatternKind::File => false,
            PatternKind::Directory => {
                let components: Vec<&str> = rel_dir.split('/').filter(|c| !c.is_empty()).collect();
                self.matches_components(&components)
            }
        }
    }

    fn matches_components(&self, dirs: &[&str]) -> bool {
        if dirs.len() < self.components {
            return false;
        }
        dirs.windows(self.components)
            .any(|window| self.regex.is_match(&window.join("/")))
    }
}

/// Logical OR over a set of exclusion patterns
#[derive(Debug, Clone, Default)]
pub struct ExclusionMatcher {
    patterns: Vec<ExclusionPattern>,
}

impl ExclusionMatcher {
    /// Compile every pattern, returning the matcher and the patterns that failed
    ///
    /// Malformed patterns are skipped; the rest still apply.
    pub fn compile<S: AsRef<str>>(patterns: &[S]) -> (Self, Vec<CheckpointError>) {
        let mut compiled = Vec::with_capacity(patterns.len());
        let mut errors = Vec::new();

        for pattern in patterns {
            match ExclusionPattern::compile(pattern.as_ref()) {
                Ok(p) => compiled.push(p),
                Err(e) => {
                    tracing::warn!("{}", e);
                    errors.push(e);
                }
            }
        }

        (Self { patterns: compiled }, errors)
    }

    /// Whether a file at `rel_path` is excluded
    pub fn matches(&self, rel_path: &str) -> bool {
        let rel_path = normalize(rel_path);
        self.patterns.iter().any(|p| p.matches_file(&rel_path))
    }

    /// Whether the directory at `rel_dir` and everything beneath it is excluded
    pub fn matches_dir(&self, rel_dir: &str) -> bool {
        let rel_dir = normalize(rel_dir);
        self.patterns.iter().any(|p| p.matches_dir(&rel_dir))
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(|p| p.as_str())
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

fn normalize(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches("./").trim_matches('/').to_string()
}

/// Translate a glob body into an anchored regular expression
fn translate(body: &str, star: &str, single: &str) -> Result<String, String> {
    let chars: Vec<char> = body.chars().collect();
    let mut out = String::with_capacity(body.len() * 2 + 2);
    out.push('^');

    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '*' => out.push_str(star),
            '?' => out.push_str(single),
            '\\' => {
                i += 1;
                match chars.get(i) {
                    Some(c) => out.push_str(&regex::escape(&c.to_string())),
                    None => return Err("dangling escape at end of pattern".to_string()),
                }
            }
            '[' => {
                let start = i;
                let mut class = String::from("[");
                i += 1;
                if matches!(chars.get(i), Some('!') | Some('^')) {
                    class.push('^');
                    i += 1;
                }
                // A leading ']' is a literal member
                if chars.get(i) == Some(&']') {
                    class.push_str("\\]");
                    i += 1;
                }
                let mut closed = false;
                while let Some(&c) = chars.get(i) {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    if matches!(c, '\\' | '[' | '^' | '&' | '~') {
                        class.push('\\');
                    }
                    class.push(c);
                    i += 1;
                }
                if !closed {
                    return Err(format!("unterminated character class at offset {}", start));
                }
                class.push(']');
                out.push_str(&class);
            }
            c => out.push_str(&regex::escape(&c.to_string())),
        }
        i += 1;
    }

    out.push('$');
    Ok(out)
}
