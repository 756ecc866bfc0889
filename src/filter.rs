//! Decides which filesystem entries make it into the index.

use std::fs;
use std::path::{Component, Path, PathBuf};

use glob::{MatchOptions, Pattern};

use crate::config::IndexConfig;
use crate::error::{Error, Result};
use crate::gitignore::GitignoreFilter;

/// Directory names that are never indexed, whatever the user excludes.
pub const NOISE_DIR_NAMES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "__pycache__",
    ".mypy_cache",
    ".venv",
    "venv",
    ".tox",
    "node_modules",
];

const NAME_MATCH: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

#[derive(Debug, Clone, PartialEq)]
enum FilePattern {
    Any,
    /// Lowercased dotted suffix, e.g. `.txt` or `.tar.gz`.
    Suffix(String),
    Glob(Pattern),
}

fn has_glob_meta(s: &str) -> bool {
    s.contains('*') || s.contains('?') || s.contains('[')
}

/// `*.ext`, `.ext` and `ext` all mean the same extension; `*` means anything.
fn parse_pattern(raw: &str) -> Result<FilePattern> {
    let trimmed = raw.trim();
    if trimmed == "*" || trimmed == "*.*" {
        return Ok(FilePattern::Any);
    }

    let ext = trimmed
        .strip_prefix("*.")
        .or_else(|| trimmed.strip_prefix('.'))
        .unwrap_or(trimmed);
    if !ext.is_empty() && !has_glob_meta(ext) && !ext.contains('/') {
        return Ok(FilePattern::Suffix(format!(".{}", ext.to_lowercase())));
    }

    Pattern::new(trimmed)
        .map(FilePattern::Glob)
        .map_err(|e| Error::ConfigInvalid(format!("file filter `{raw}`: {e}")))
}

/// For a file only its parent directories count; a file called `venv` is
/// still indexed.
fn is_noise_component(path: &Path, is_dir: bool) -> bool {
    let dirs = if is_dir { Some(path) } else { path.parent() };
    let Some(dirs) = dirs else {
        return false;
    };
    dirs.components().any(|c| match c {
        Component::Normal(name) => name
            .to_str()
            .map(|n| NOISE_DIR_NAMES.contains(&n))
            .unwrap_or(false),
        _ => false,
    })
}

#[derive(Debug)]
pub struct PathFilter {
    excluded_roots: Vec<PathBuf>,
    /// Empty means every file is accepted.
    patterns: Vec<FilePattern>,
    gitignore: Option<GitignoreFilter>,
}

impl PathFilter {
    pub fn new(config: &IndexConfig) -> Result<Self> {
        Self::for_roots(config, &config.indexed_paths)
    }

    /// Like [`PathFilter::new`], but `.gitignore` files are discovered below
    /// `roots` rather than the configured indexed paths.
    pub fn for_roots(config: &IndexConfig, roots: &[PathBuf]) -> Result<Self> {
        let mut excluded_roots: Vec<PathBuf> = Vec::with_capacity(config.excluded_paths.len());
        for raw in &config.excluded_paths {
            let root = raw.components().collect::<PathBuf>();
            // Keep the canonical form too; walked paths are canonical.
            if let Ok(canonical) = fs::canonicalize(&root) {
                if canonical != root && !excluded_roots.contains(&canonical) {
                    excluded_roots.push(canonical);
                }
            }
            if !excluded_roots.contains(&root) {
                excluded_roots.push(root);
            }
        }

        let mut patterns = Vec::with_capacity(config.file_filters.len());
        for raw in &config.file_filters {
            let pattern = parse_pattern(raw)?;
            if pattern == FilePattern::Any {
                // One catch-all makes the whole filter a no-op.
                patterns.clear();
                break;
            }
            patterns.push(pattern);
        }

        let gitignore = if config.respect_gitignore {
            Some(GitignoreFilter::build(roots))
        } else {
            None
        };

        Ok(Self {
            excluded_roots,
            patterns,
            gitignore,
        })
    }

    /// Subtree pruning: excluded prefixes, noise directories and gitignore
    /// rules. File filters never prune.
    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        if is_noise_component(path, is_dir) {
            return true;
        }
        // `Path::starts_with` is component-wise, so `/mnt` does not cover `/mnt2`.
        if self
            .excluded_roots
            .iter()
            .any(|root| path.starts_with(root))
        {
            return true;
        }
        self.gitignore
            .as_ref()
            .map(|gi| gi.is_ignored(path, is_dir))
            .unwrap_or(false)
    }

    pub fn accepts_file(&self, path: &Path) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let Some(name) = path.file_name().map(|n| n.to_string_lossy()) else {
            return false;
        };
        let lower = name.to_lowercase();
        self.patterns.iter().any(|pattern| match pattern {
            FilePattern::Any => true,
            FilePattern::Suffix(suffix) => lower.len() > suffix.len() && lower.ends_with(suffix),
            FilePattern::Glob(glob) => glob.matches_with(&name, NAME_MATCH),
        })
    }

    /// Directories pass whenever they are not excluded, so traversal reaches
    /// the files the filters are meant for.
    pub fn should_index(&self, path: &Path, is_dir: bool) -> bool {
        if self.is_excluded(path, is_dir) {
            return false;
        }
        is_dir || self.accepts_file(path)
    }

    pub fn filters_files(&self) -> bool {
        !self.patterns.is_empty()
    }
}

/// One-off check of a single path against a config. Unreadable paths and
/// broken symlinks are rejected, never raised.
pub fn should_index(path: &Path, config: &IndexConfig) -> bool {
    let filter = match PathFilter::new(config) {
        Ok(filter) => filter,
        Err(err) => {
            tracing::warn!(error = %err, "cannot build path filter");
            return false;
        }
    };
    match fs::metadata(path) {
        Ok(meta) => filter.should_index(path, meta.is_dir()),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "skipping unreadable path");
            false
        }
    }
}
