use std::fs;
use std::path::{Path, PathBuf};

use ignore::gitignore::{Gitignore, GitignoreBuilder};

const DISCOVERY_MAX_DEPTH: usize = 3;

/// `.gitignore` rules of the repositories found under the indexed roots.
pub struct GitignoreFilter {
    matchers: Vec<Gitignore>,
}

impl std::fmt::Debug for GitignoreFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitignoreFilter")
            .field("matchers_count", &self.matchers.len())
            .finish()
    }
}

impl GitignoreFilter {
    pub fn build(roots: &[PathBuf]) -> Self {
        let started = std::time::Instant::now();
        let mut matchers = Vec::new();
        for root in roots {
            let root = fs::canonicalize(root).unwrap_or_else(|_| root.clone());
            collect_gitignores(&root, 0, &mut matchers);
        }
        tracing::debug!(
            repositories = matchers.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "gitignore rules loaded"
        );
        Self { matchers }
    }

    pub fn is_ignored(&self, path: &Path, is_dir: bool) -> bool {
        for gi in &self.matchers {
            // An unanchored `target/` in one repository must not hide
            // `target` directories of a sibling repository.
            if !path.starts_with(gi.path()) {
                continue;
            }
            match gi.matched(path, is_dir) {
                ignore::Match::Ignore(_) => return true,
                ignore::Match::Whitelist(_) => return false,
                ignore::Match::None => {}
            }
        }
        false
    }

    pub fn len(&self) -> usize {
        self.matchers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }
}

fn collect_gitignores(dir: &Path, depth: usize, result: &mut Vec<Gitignore>) {
    if depth > DISCOVERY_MAX_DEPTH {
        return;
    }

    if dir.join(".git").exists() {
        let gitignore_path = dir.join(".gitignore");
        if gitignore_path.is_file() {
            let mut builder = GitignoreBuilder::new(dir);
            if let Some(err) = builder.add(&gitignore_path) {
                tracing::warn!(path = %gitignore_path.display(), error = %err, "unreadable .gitignore");
            }
            match builder.build() {
                Ok(gi) => result.push(gi),
                Err(err) => {
                    tracing::warn!(path = %gitignore_path.display(), error = %err, "bad .gitignore")
                }
            }
        }
        return;
    }

    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with('.') || name == "node_modules" || name == "target" {
            continue;
        }
        collect_gitignores(&path, depth + 1, result);
    }
}
