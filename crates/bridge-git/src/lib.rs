//! VCS Client contract: a thin wrapper over the `git` binary exposing the
//! primitives the engine's dispatcher-side signal handlers need — current
//! branch, diff between refs, tag listing, commit metadata since a tag,
//! and remote-repo content reads. Never invoked directly from the engine
//! (`bridge-core`); only from signal handlers outside this workspace's
//! core, which is why every function here takes an explicit working
//! directory rather than assuming a global CWD.

use std::path::Path;
use std::process::Command;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

/// Branches the engine's preflight refuses to run against (spec §4.7:
/// "MUST refuse to run on protected branches").
pub const PROTECTED_BRANCHES: &[&str] = &["main", "master"];

pub fn is_protected_branch(branch: &str) -> bool {
    PROTECTED_BRANCHES.contains(&branch)
}

fn run_git(repo: &Path, args: &[&str]) -> Result<std::process::Output> {
    Command::new("git")
        .args(args)
        .current_dir(repo)
        .output()
        .with_context(|| format!("failed to run git {args:?}"))
}

fn run_git_ok(repo: &Path, args: &[&str]) -> Result<String> {
    let out = run_git(repo, args)?;
    if !out.status.success() {
        bail!(
            "git {args:?} failed: {}",
            String::from_utf8_lossy(&out.stderr)
        );
    }
    Ok(String::from_utf8_lossy(&out.stdout).trim().to_string())
}

/// Current branch name, or `None` in detached-HEAD state.
pub fn current_branch(repo: &Path) -> Result<Option<String>> {
    let branch = run_git_ok(repo, &["rev-parse", "--abbrev-ref", "HEAD"])?;
    if branch == "HEAD" {
        Ok(None)
    } else {
        Ok(Some(branch))
    }
}

/// Per-file change counts between two refs, the deterministic signal the
/// Multi-Pass Reviewer's adaptive classification keys off of (files
/// touched, lines added/removed).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffStat {
    pub files: Vec<String>,
    pub lines_added: u64,
    pub lines_removed: u64,
}

impl DiffStat {
    pub fn files_changed(&self) -> u64 {
        self.files.len() as u64
    }

    pub fn lines_changed(&self) -> u64 {
        self.lines_added + self.lines_removed
    }
}

/// Diff stat between `base` and `head` using `git diff --numstat`, which
/// reports one `<added>\t<removed>\t<path>` line per file (binary files
/// report `-` for both counts, treated as zero here).
pub fn diff_stat(repo: &Path, base: &str, head: &str) -> Result<DiffStat> {
    let range = format!("{base}...{head}");
    let out = run_git_ok(repo, &["diff", "--numstat", &range])?;
    let mut stat = DiffStat::default();
    for line in out.lines().filter(|l| !l.trim().is_empty()) {
        let mut parts = line.splitn(3, '\t');
        let added = parts.next().unwrap_or("0").parse::<u64>().unwrap_or(0);
        let removed = parts.next().unwrap_or("0").parse::<u64>().unwrap_or(0);
        let path = parts.next().unwrap_or("").to_string();
        stat.lines_added += added;
        stat.lines_removed += removed;
        if !path.is_empty() {
            stat.files.push(path);
        }
    }
    Ok(stat)
}

/// Unified diff text between two refs, for passing into review prompts.
pub fn diff_text(repo: &Path, base: &str, head: &str) -> Result<String> {
    let range = format!("{base}...{head}");
    run_git_ok(repo, &["diff", &range])
}

/// All tags, oldest first (by creation order in the underlying ref log;
/// callers that need semver order should sort the result themselves).
pub fn list_tags(repo: &Path) -> Result<Vec<String>> {
    let out = run_git_ok(repo, &["tag", "--list"])?;
    Ok(out.lines().map(str::to_string).filter(|l| !l.is_empty()).collect())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub hash: String,
    pub author: String,
    pub subject: String,
}

/// Commit metadata since `tag` (exclusive), oldest first.
///
/// Robustness note (Open Question, resolved): some workflows count commits
/// with `git log --oneline | grep -c pattern`, which is fooled by a
/// trailing-newline quirk when the log is empty (`grep -c` on empty input
/// still reports `1` on some platforms). This counts filtered non-empty
/// lines directly instead of delegating to `grep -c`.
pub fn commits_since_tag(repo: &Path, tag: &str) -> Result<Vec<CommitInfo>> {
    let range = format!("{tag}..HEAD");
    let out = run_git_ok(
        repo,
        &["log", "--reverse", "--pretty=format:%H\x1f%an\x1f%s", &range],
    )?;
    Ok(parse_commit_log(&out))
}

fn parse_commit_log(raw: &str) -> Vec<CommitInfo> {
    raw.lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let mut parts = line.splitn(3, '\x1f');
            let hash = parts.next()?.to_string();
            let author = parts.next()?.to_string();
            let subject = parts.next().unwrap_or("").to_string();
            Some(CommitInfo { hash, author, subject })
        })
        .collect()
}

/// Robust commit count: filtered non-empty line count, never a bare
/// `grep -c` invocation (Open Question resolution, spec §9).
pub fn commit_count_since_tag(repo: &Path, tag: &str) -> Result<usize> {
    Ok(commits_since_tag(repo, tag)?.len())
}

/// Read a file's content as of a given ref, for remote-pattern queries
/// against another repository's checkout without touching the working
/// tree (`git show <ref>:<path>`).
pub fn read_at_ref(repo: &Path, git_ref: &str, path: &str) -> Result<String> {
    let spec = format!("{git_ref}:{path}");
    run_git_ok(repo, &["show", &spec])
}

pub fn is_clean(repo: &Path) -> Result<bool> {
    let out = run_git_ok(repo, &["status", "--porcelain"])?;
    Ok(out.is_empty())
}

pub fn is_repo(repo: &Path) -> bool {
    Command::new("git")
        .args(["rev-parse", "--is-inside-work-tree"])
        .current_dir(repo)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn init_repo(dir: &Path) {
        Command::new("git").args(["init", "-q", "-b", "main"]).current_dir(dir).output().unwrap();
        Command::new("git").args(["config", "user.email", "t@example.com"]).current_dir(dir).output().unwrap();
        Command::new("git").args(["config", "user.name", "Test"]).current_dir(dir).output().unwrap();
    }

    fn commit(dir: &Path, file: &str, contents: &str, msg: &str) {
        fs::write(dir.join(file), contents).unwrap();
        Command::new("git").args(["add", "."]).current_dir(dir).output().unwrap();
        Command::new("git").args(["commit", "-q", "-m", msg]).current_dir(dir).output().unwrap();
    }

    #[test]
    fn protected_branch_detection() {
        assert!(is_protected_branch("main"));
        assert!(is_protected_branch("master"));
        assert!(!is_protected_branch("feature/x"));
    }

    #[test]
    #[serial_test::serial]
    fn current_branch_reports_name() {
        let td = tempdir().unwrap();
        init_repo(td.path());
        commit(td.path(), "a.txt", "1", "init");
        assert_eq!(current_branch(td.path()).unwrap(), Some("main".to_string()));
    }

    #[test]
    #[serial_test::serial]
    fn diff_stat_counts_added_and_removed_lines() {
        let td = tempdir().unwrap();
        init_repo(td.path());
        commit(td.path(), "a.txt", "one\n", "init");
        Command::new("git").args(["tag", "base"]).current_dir(td.path()).output().unwrap();
        commit(td.path(), "a.txt", "one\ntwo\nthree\n", "update");

        let stat = diff_stat(td.path(), "base", "HEAD").unwrap();
        assert_eq!(stat.files_changed(), 1);
        assert!(stat.lines_added >= 2);
    }

    #[test]
    #[serial_test::serial]
    fn commits_since_tag_excludes_the_tagged_commit_itself() {
        let td = tempdir().unwrap();
        init_repo(td.path());
        commit(td.path(), "a.txt", "1", "init");
        Command::new("git").args(["tag", "v1"]).current_dir(td.path()).output().unwrap();
        commit(td.path(), "a.txt", "2", "second");
        commit(td.path(), "a.txt", "3", "third");

        let commits = commits_since_tag(td.path(), "v1").unwrap();
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].subject, "second");
        assert_eq!(commits[1].subject, "third");
    }

    #[test]
    #[serial_test::serial]
    fn commit_count_matches_filtered_line_count_not_grep_c_quirk() {
        let td = tempdir().unwrap();
        init_repo(td.path());
        commit(td.path(), "a.txt", "1", "init");
        Command::new("git").args(["tag", "v1"]).current_dir(td.path()).output().unwrap();
        assert_eq!(commit_count_since_tag(td.path(), "v1").unwrap(), 0);
    }

    #[test]
    #[serial_test::serial]
    fn read_at_ref_returns_file_content() {
        let td = tempdir().unwrap();
        init_repo(td.path());
        commit(td.path(), "a.txt", "hello\n", "init");
        let content = read_at_ref(td.path(), "HEAD", "a.txt").unwrap();
        assert_eq!(content, "hello");
    }

    #[test]
    #[serial_test::serial]
    fn is_clean_detects_dirty_tree() {
        let td = tempdir().unwrap();
        init_repo(td.path());
        commit(td.path(), "a.txt", "1", "init");
        assert!(is_clean(td.path()).unwrap());
        fs::write(td.path().join("a.txt"), "dirty").unwrap();
        assert!(!is_clean(td.path()).unwrap());
    }

    #[test]
    fn is_repo_false_for_non_repo_dir() {
        let td = tempdir().unwrap();
        assert!(!is_repo(td.path()));
    }
}
