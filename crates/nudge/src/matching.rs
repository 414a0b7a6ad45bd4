use glob::{MatchOptions, Pattern};
use indexmap::IndexMap;

use crate::model::{Context, Hint, Scope};

/// Glob options: `*` stays within one path component, `**` crosses them.
fn match_options() -> MatchOptions {
    MatchOptions {
        case_sensitive: true,
        require_literal_separator: true,
        require_literal_leading_dot: false,
    }
}

/// Expand one level of `{a,b}` alternation, recursively, so brace sets work
/// on top of `glob::Pattern`. A pattern without braces comes back unchanged.
fn expand_braces(pattern: &str) -> Vec<String> {
    let bytes = pattern.as_bytes();
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };

    let mut depth = 0usize;
    let mut close = None;
    let mut commas = Vec::new();
    for (i, &b) in bytes.iter().enumerate().skip(open) {
        match b {
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            b',' if depth == 1 => commas.push(i),
            _ => {}
        }
    }
    // Unbalanced braces: treat the pattern literally.
    let Some(close) = close else {
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    let mut alternatives = Vec::new();
    let mut start = open + 1;
    for comma in commas.iter().copied().chain(std::iter::once(close)) {
        alternatives.push(&pattern[start..comma]);
        start = comma + 1;
    }

    let mut expanded = Vec::new();
    for alt in alternatives {
        for rest in expand_braces(&format!("{prefix}{alt}{suffix}")) {
            expanded.push(rest);
        }
    }
    expanded
}

/// Match `path` against a single glob with brace and `**` semantics.
/// Malformed patterns never match.
pub fn glob_match(pattern: &str, path: &str) -> bool {
    expand_braces(pattern).iter().any(|p| {
        Pattern::new(p)
            .map(|p| p.matches_with(path, match_options()))
            .unwrap_or(false)
    })
}

fn first_matching_pattern<'a>(patterns: &'a [String], cwd: &str) -> Option<&'a str> {
    patterns
        .iter()
        .map(String::as_str)
        .find(|p| glob_match(p, cwd))
}

/// Evaluate a hint's scope against a context.
///
/// Every present predicate must pass; a predicate whose context counterpart
/// is absent is not checked, except the env predicates which need
/// `context.env` to evaluate at all. Returns the match reasons on success
/// and an empty list on failure.
pub fn is_eligible(hint: &Hint, context: &Context) -> (bool, Vec<String>) {
    let Some(scope) = hint.meta.scope.as_ref() else {
        return (true, vec!["no scope restrictions".to_string()]);
    };

    let mut reasons = Vec::new();

    if let (Some(patterns), Some(cwd)) = (scope.cwd_glob.as_deref(), context.cwd.as_deref()) {
        if !patterns.is_empty() {
            match first_matching_pattern(patterns, cwd) {
                Some(pattern) => reasons.push(format!("cwd matched {pattern}")),
                None => return (false, Vec::new()),
            }
        }
    }

    if let (Some(repos), Some(repo)) = (scope.repo.as_ref(), context.repo.as_deref()) {
        if !repos.0.is_empty() {
            if !repos.contains(repo) {
                return (false, Vec::new());
            }
            reasons.push("repo matched".to_string());
        }
    }

    if let (Some(branches), Some(branch)) = (scope.branch.as_deref(), context.branch.as_deref()) {
        if !branches.is_empty() {
            if !branches.iter().any(|b| b == branch) {
                return (false, Vec::new());
            }
            reasons.push(format!("branch={branch} allowed"));
        }
    }

    if let (Some(allowed), Some(os)) = (scope.os.as_deref(), context.os) {
        if !allowed.is_empty() {
            if !allowed.contains(&os) {
                return (false, Vec::new());
            }
            reasons.push(format!("os={os} matched"));
        }
    }

    if let (Some(required), Some(env)) = (scope.env_required.as_deref(), context.env.as_ref()) {
        if !required.is_empty() {
            if required.iter().any(|name| !env.contains_key(name)) {
                return (false, Vec::new());
            }
            reasons.push(format!(
                "required env vars present: {}",
                required.join(", ")
            ));
        }
    }

    if let (Some(matches), Some(env)) = (scope.env_match.as_ref(), context.env.as_ref()) {
        if !matches.is_empty() {
            for (name, expected) in matches {
                let Some(Some(actual)) = env.get(name) else {
                    return (false, Vec::new());
                };
                if !expected.contains(actual) {
                    return (false, Vec::new());
                }
            }
            reasons.push("env values matched".to_string());
        }
    }

    if reasons.is_empty() {
        reasons.push("all scope conditions matched".to_string());
    }
    (true, reasons)
}

/// How many scope fields a hint pins down. The `env_required` and
/// `env_match` predicates count per entry.
pub fn count_specificity(scope: Option<&Scope>) -> usize {
    let Some(scope) = scope else { return 0 };

    let present = |b: bool| usize::from(b);
    present(scope.cwd_glob.as_ref().is_some_and(|v| !v.is_empty()))
        + present(scope.repo.as_ref().is_some_and(|v| !v.0.is_empty()))
        + present(scope.branch.as_ref().is_some_and(|v| !v.is_empty()))
        + present(scope.os.as_ref().is_some_and(|v| !v.is_empty()))
        + scope.env_required.as_ref().map_or(0, Vec::len)
        + scope.env_match.as_ref().map_or(0, IndexMap::len)
}
