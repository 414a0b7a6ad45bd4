//! Context auto-detection: working directory, OS, git repo/branch, and the
//! process environment.

use std::process::Command;

use nudge::model::{Context, Os};

fn git(args: &[&str]) -> Option<String> {
    let output = Command::new("git").args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8(output.stdout).ok()?;
    let trimmed = stdout.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

pub fn detect_os() -> Option<Os> {
    Os::from_token(std::env::consts::OS)
}

/// The origin remote URL, falling back to a `file://` URL for the worktree
/// root of a local-only repository.
pub fn detect_repo() -> Option<String> {
    git(&["remote", "get-url", "origin"]).or_else(|| {
        git(&["rev-parse", "--show-toplevel"]).map(|toplevel| format!("file://{toplevel}"))
    })
}

pub fn detect_branch() -> Option<String> {
    git(&["rev-parse", "--abbrev-ref", "HEAD"])
}

pub fn auto_detect() -> Context {
    Context {
        cwd: std::env::current_dir()
            .ok()
            .map(|p| p.to_string_lossy().into_owned()),
        repo: detect_repo(),
        branch: detect_branch(),
        os: detect_os(),
        env: Some(std::env::vars().map(|(k, v)| (k, Some(v))).collect()),
        files_open: None,
    }
}
