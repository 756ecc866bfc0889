//! Pluggable matching backends: the external `fzf` process and an in-process
//! ranker with the same contract.

use std::ffi::OsString;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::error::{Error, Result};

pub const FZF_ENV: &str = "EVERYFIND_FZF";
pub const DEFAULT_PROMPT: &str = "Everyfind: ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectOptions {
    pub multi: bool,
    pub prompt: String,
    /// Initial query typed into the finder.
    pub query: String,
}

impl Default for SelectOptions {
    fn default() -> Self {
        Self {
            multi: false,
            prompt: DEFAULT_PROMPT.to_string(),
            query: String::new(),
        }
    }
}

/// Given a candidate list, return what the user (or the ranking) picked.
pub trait MatchBackend {
    fn name(&self) -> &str;

    /// Interactive selection. A cancelled selection is `Ok(vec![])`.
    fn select(&self, candidates: &[String], opts: &SelectOptions) -> Result<Vec<String>>;

    /// Non-interactive: every candidate matching `pattern`, best first.
    fn filter(&self, candidates: &[String], pattern: &str) -> Result<Vec<String>>;
}

/// Runs `fzf` with candidates on stdin. Its UI draws on the controlling
/// terminal, which fzf opens itself, so stdin and stdout stay free for the
/// candidate and selection streams.
#[derive(Debug, Clone, Default)]
pub struct FzfBackend {
    program: Option<PathBuf>,
    leading_args: Vec<OsString>,
}

impl FzfBackend {
    pub const NAME: &'static str = "fzf";

    /// Uses `$EVERYFIND_FZF` when set, else `fzf` from `PATH`.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_binary(path: impl Into<PathBuf>) -> Self {
        Self {
            program: Some(path.into()),
            leading_args: Vec::new(),
        }
    }

    /// Runs `program args...` followed by the fzf options, for wrappers.
    pub fn with_command<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: Some(program.into()),
            leading_args: args.into_iter().map(Into::into).collect(),
        }
    }

    fn unavailable(reason: impl Into<String>) -> Error {
        Error::BackendUnavailable {
            backend: Self::NAME.to_string(),
            reason: reason.into(),
        }
    }

    fn failed(reason: impl Into<String>) -> Error {
        Error::Backend {
            backend: Self::NAME.to_string(),
            reason: reason.into(),
        }
    }

    /// Resolves the executable without running it.
    pub fn locate(&self) -> Result<PathBuf> {
        if let Some(program) = &self.program {
            return which::which(program)
                .map_err(|err| Self::unavailable(format!("{}: {err}", program.display())));
        }
        match std::env::var_os(FZF_ENV).filter(|v| !v.is_empty()) {
            Some(custom) => which::which(&custom).map_err(|err| {
                Self::unavailable(format!("{FZF_ENV}={}: {err}", Path::new(&custom).display()))
            }),
            None => which::which(Self::NAME)
                .map_err(|err| Self::unavailable(format!("fzf not found in PATH: {err}"))),
        }
    }

    fn run(&self, candidates: &[String], args: &[OsString]) -> Result<(Option<i32>, Vec<String>)> {
        let program = self.locate()?;
        tracing::debug!(
            program = %program.display(),
            candidates = candidates.len(),
            "spawning matcher"
        );

        let mut child = Command::new(&program)
            .args(&self.leading_args)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|err| match err.kind() {
                io::ErrorKind::NotFound | io::ErrorKind::PermissionDenied => {
                    Self::unavailable(format!("{}: {err}", program.display()))
                }
                _ => Self::failed(format!("spawn failed: {err}")),
            })?;

        let stdin = child.stdin.take();
        let output = std::thread::scope(|scope| {
            if let Some(mut stdin) = stdin {
                scope.spawn(move || {
                    if let Err(err) = write_candidates(&mut stdin, candidates) {
                        // fzf may exit before reading everything.
                        if err.kind() != io::ErrorKind::BrokenPipe {
                            tracing::warn!(error = %err, "writing candidates failed");
                        }
                    }
                });
            }
            child.wait_with_output()
        })
        .map_err(|err| Self::failed(format!("wait failed: {err}")))?;

        Ok((output.status.code(), split_nul(&output.stdout)))
    }
}

fn write_candidates(out: &mut impl Write, candidates: &[String]) -> io::Result<()> {
    let mut out = io::BufWriter::new(out);
    for candidate in candidates {
        out.write_all(candidate.as_bytes())?;
        out.write_all(b"\0")?;
    }
    out.flush()
}

fn split_nul(bytes: &[u8]) -> Vec<String> {
    bytes
        .split(|b| *b == 0)
        .filter(|chunk| !chunk.is_empty())
        .map(|chunk| String::from_utf8_lossy(chunk).into_owned())
        .collect()
}

impl MatchBackend for FzfBackend {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn select(&self, candidates: &[String], opts: &SelectOptions) -> Result<Vec<String>> {
        let mut args: Vec<OsString> = vec![
            "--read0".into(),
            "--print0".into(),
            "-i".into(),
            "--prompt".into(),
            opts.prompt.clone().into(),
        ];
        if !opts.query.is_empty() {
            args.push("--query".into());
            args.push(opts.query.clone().into());
        }
        if opts.multi {
            args.push("--multi".into());
        }

        match self.run(candidates, &args)? {
            (Some(0), picked) => Ok(picked),
            // 1: no match, 130: user aborted.
            (Some(1), _) | (Some(130), _) => {
                tracing::debug!("selection cancelled");
                Ok(Vec::new())
            }
            (Some(code), _) => Err(Self::failed(format!("exited with status {code}"))),
            (None, _) => Err(Self::failed("terminated by signal")),
        }
    }

    fn filter(&self, candidates: &[String], pattern: &str) -> Result<Vec<String>> {
        let args: Vec<OsString> = vec![
            "--read0".into(),
            "--print0".into(),
            "-i".into(),
            "--filter".into(),
            pattern.into(),
        ];
        match self.run(candidates, &args)? {
            (Some(0), hits) => Ok(hits),
            (Some(1), _) => Ok(Vec::new()),
            (Some(code), _) => Err(Self::failed(format!("exited with status {code}"))),
            (None, _) => Err(Self::failed("terminated by signal")),
        }
    }
}

/// In-process ranking. A candidate matches when the pattern's characters
/// occur in order (case-insensitive) somewhere in the path; hits are grouped
/// by how the pattern relates to the file name, then by shorter path.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinMatcher;

impl BuiltinMatcher {
    pub const NAME: &'static str = "builtin";

    pub fn new() -> Self {
        Self
    }

    /// Lower is better; `None` when the candidate does not match at all.
    pub fn rank(candidate: &str, pattern: &str) -> Option<u8> {
        let q = pattern.trim().to_lowercase();
        if q.is_empty() {
            return Some(u8::MAX);
        }
        let path = candidate.to_lowercase();
        if !is_subsequence(&q, &path) {
            return None;
        }
        let name = path.rsplit('/').next().unwrap_or(path.as_str());

        if name == q {
            return Some(0);
        }
        if name.starts_with(&q) {
            return Some(1);
        }
        if name.contains(&q) {
            return Some(2);
        }
        if path.contains(&q) {
            return Some(3);
        }
        Some(4)
    }

    pub fn ranked(&self, candidates: &[String], pattern: &str) -> Vec<String> {
        let mut hits: Vec<(u8, &String)> = candidates
            .iter()
            .filter_map(|c| Self::rank(c, pattern).map(|r| (r, c)))
            .collect();
        // Stable: equal keys keep their input order.
        hits.sort_by(|(ra, a), (rb, b)| {
            ra.cmp(rb)
                .then_with(|| a.len().cmp(&b.len()))
                .then_with(|| a.cmp(b))
        });
        hits.into_iter().map(|(_, c)| c.clone()).collect()
    }
}

fn is_subsequence(needle: &str, haystack: &str) -> bool {
    let mut hay = haystack.chars();
    needle.chars().all(|n| hay.any(|h| h == n))
}

impl MatchBackend for BuiltinMatcher {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn select(&self, candidates: &[String], opts: &SelectOptions) -> Result<Vec<String>> {
        if opts.query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let mut hits = self.ranked(candidates, &opts.query);
        if !opts.multi {
            hits.truncate(1);
        }
        Ok(hits)
    }

    fn filter(&self, candidates: &[String], pattern: &str) -> Result<Vec<String>> {
        Ok(self.ranked(candidates, pattern))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn sh(script: &str) -> FzfBackend {
        FzfBackend::with_command("/bin/sh", ["-c", script, "fzf"])
    }

    #[test]
    fn rank_classes() {
        assert_eq!(BuiltinMatcher::rank("/home/u/report.pdf", "report.pdf"), Some(0));
        assert_eq!(BuiltinMatcher::rank("/home/u/Report.pdf", "rep"), Some(1));
        assert_eq!(BuiltinMatcher::rank("/home/u/myreport.pdf", "report"), Some(2));
        assert_eq!(BuiltinMatcher::rank("/home/report/x.pdf", "report"), Some(3));
        assert_eq!(BuiltinMatcher::rank("/home/u/r_e_p.txt", "rep"), Some(4));
        assert_eq!(BuiltinMatcher::rank("/home/u/x.txt", "zzz"), None);
    }

    #[test]
    fn ranking_prefers_name_then_shorter_path() {
        let candidates = paths(&[
            "/srv/docs/notes/todo.txt",
            "/a/notes.md",
            "/very/long/path/notes.md",
            "/n/o/t/e/s",
            "/b/notes.md",
        ]);
        let ranked = BuiltinMatcher.ranked(&candidates, "notes.md");
        assert_eq!(
            ranked,
            paths(&["/a/notes.md", "/b/notes.md", "/very/long/path/notes.md"])
        );

        let ranked = BuiltinMatcher.ranked(&candidates, "notes");
        assert_eq!(ranked[0], "/a/notes.md");
        assert_eq!(ranked.last().map(String::as_str), Some("/n/o/t/e/s"));
    }

    #[test]
    fn equal_candidates_keep_input_order() {
        let candidates = paths(&["/x/a.txt", "/x/a.txt"]);
        assert_eq!(BuiltinMatcher.ranked(&candidates, "a").len(), 2);
    }

    #[test]
    fn builtin_select_semantics() {
        let candidates = paths(&["/a/foo.rs", "/b/foobar.rs", "/c/other"]);
        let single = SelectOptions {
            query: "foo".into(),
            ..SelectOptions::default()
        };
        assert_eq!(
            BuiltinMatcher.select(&candidates, &single).unwrap(),
            paths(&["/a/foo.rs"])
        );

        let multi = SelectOptions {
            multi: true,
            ..single
        };
        assert_eq!(BuiltinMatcher.select(&candidates, &multi).unwrap().len(), 2);

        let empty = SelectOptions::default();
        assert!(BuiltinMatcher.select(&candidates, &empty).unwrap().is_empty());
    }

    #[test]
    fn empty_pattern_filter_returns_everything() {
        let candidates = paths(&["/b", "/a"]);
        assert_eq!(BuiltinMatcher.filter(&candidates, "").unwrap(), candidates);
    }

    #[test]
    fn missing_binary_is_unavailable() {
        let backend = FzfBackend::with_binary("/nonexistent/fzf-everyfind");
        let err = backend.select(&paths(&["/a"]), &SelectOptions::default()).unwrap_err();
        assert!(err.is_backend_unavailable());
    }

    #[test]
    fn candidates_round_trip_through_nul_stream() {
        let candidates = paths(&["/a/with space.txt", "/b/new\nline", "/c/ü.md"]);
        let backend = sh("cat");
        assert_eq!(backend.filter(&candidates, "x").unwrap(), candidates);
    }

    #[test]
    fn exit_codes_map_to_outcomes() {
        let candidates = paths(&["/a", "/b"]);
        let opts = SelectOptions::default();

        let picked = sh("cat >/dev/null; printf '/b\\0'").select(&candidates, &opts);
        assert_eq!(picked.unwrap(), paths(&["/b"]));

        let aborted = sh("cat >/dev/null; exit 130").select(&candidates, &opts);
        assert!(aborted.unwrap().is_empty());

        let none = sh("cat >/dev/null; exit 1").filter(&candidates, "zz");
        assert!(none.unwrap().is_empty());

        let broken = sh("cat >/dev/null; exit 2").select(&candidates, &opts);
        assert!(matches!(broken, Err(Error::Backend { .. })));
    }

    #[test]
    fn early_exit_does_not_block_on_large_input() {
        let candidates: Vec<String> = (0..200_000).map(|i| format!("/bulk/{i}")).collect();
        let result = sh("exit 130").select(&candidates, &SelectOptions::default());
        assert!(result.unwrap().is_empty());
    }
}
