// SPDX-License-Identifier: GPL-3.0-or-later

use std::{ffi::OsString, fmt::Display, io::prelude::*};

use crate::utils::{trim_ascii, try_forward, Result};

use lazy_static::lazy_static;

/// Reference to a single commit, using any format the git CLI understands as
/// a reference.
#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct Ref {
    pub name: String,
}
impl Ref {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self { name: name.into() }
    }
}
impl Display for Ref {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(&self.name, f)
    }
}

/// A single commit from the report window, as reported by the history graph.
/// Never mutated after parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitRef {
    pub hash: String,
    pub author_name: String,
    pub author_email: String,
    pub timestamp: chrono::DateTime<chrono::FixedOffset>,
    pub subject: String,
}
impl CommitRef {
    pub fn committer(&self) -> String {
        format!("{} <{}>", self.author_name, self.author_email)
    }
}

/// A merge commit that is a descendant of some commit of interest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeEntry {
    pub commit: Ref,
    pub subject: String,
}

/// Which set of branch heads to enumerate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BranchScope {
    /// Remote-tracking branches only (`git branch -r`).
    Remote,

    /// Local and remote-tracking branches (`git branch -a`).
    All,
}
impl BranchScope {
    fn flag(self) -> &'static str {
        match self {
            BranchScope::Remote => "-r",
            BranchScope::All => "-a",
        }
    }
}

#[derive(Debug, Clone)]
pub enum Url {
    Ssh {
        user: Option<String>,
        host: String,
        path: String,
    },
    Url(reqwest::Url),
}
impl Url {
    pub fn hostname(&self) -> Option<&str> {
        match self {
            Url::Ssh { host, .. } => Some(&host),
            Url::Url(url) => url.host_str(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Url::Ssh { path, .. } => &path,
            Url::Url(url) => url.path().strip_prefix("/").unwrap_or_default(),
        }
    }

    // Returns (organization, repository) from a GitHub URL.
    pub fn github_path(&self) -> Option<(&str, &str)> {
        let path = self.path();
        let path = path.strip_suffix(".git").unwrap_or(path);
        let mut iter = path.split("/");
        let organization = iter.next()?;
        let repo = iter.next()?;
        if iter.next().is_some() {
            None
        } else {
            Some((organization, repo))
        }
    }
}
impl Display for Url {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Url::Ssh { user, host, path } => {
                if let Some(user) = user {
                    write!(f, "{}@", user)?;
                }
                write!(f, "{}:{}", host, path)
            }
            Url::Url(url) => write!(f, "{}", url),
        }
    }
}

#[derive(Debug, Clone)]
pub enum ExecutionResult {
    /// Successful execution; contains (stdout, stderr)
    Ok(Vec<u8>, Vec<u8>),

    /// Unsuccessful execution; contains (stdout, stderr, exit code)
    Err(Vec<u8>, Vec<u8>, Option<i32>),
}

/// Trait for providing execution of Git commands.
pub trait ExecutionProvider {
    fn exec(&self, path: &std::path::PathBuf, command: &str, args: Vec<OsString>)
        -> ExecutionResult;
}

/// Simple execution provider that just runs a git process directly.
#[derive(Debug, Clone)]
pub struct SimpleExecutionProvider;
impl ExecutionProvider for SimpleExecutionProvider {
    fn exec(
        &self,
        path: &std::path::PathBuf,
        command: &str,
        args: Vec<OsString>,
    ) -> ExecutionResult {
        let mut cmd = std::process::Command::new("git");
        cmd.args(["-C", path.to_str().unwrap_or(".")]);
        cmd.arg(command);
        cmd.args(args);
        cmd.stdin(std::process::Stdio::null());

        match cmd.output() {
            Ok(output) => {
                if output.status.success() {
                    ExecutionResult::Ok(output.stdout, output.stderr)
                } else {
                    ExecutionResult::Err(output.stdout, output.stderr, output.status.code())
                }
            }
            Err(err) => ExecutionResult::Err(Vec::new(), err.to_string().into_bytes(), None),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MockExecutionProvider {
    // Path of a directory that contains mock outputs of git commands as plain text files named
    // with the command line after the "git" command itself, with '/' characters removed. For
    // example, a file named "branch --show-current" would contain the output of
    // "git branch --show-current".
    pub mock_data_path: std::path::PathBuf,
}
impl ExecutionProvider for MockExecutionProvider {
    fn exec(
        &self,
        _path: &std::path::PathBuf,
        command: &str,
        mut args: Vec<OsString>,
    ) -> ExecutionResult {
        args.insert(0, OsString::from(command));
        let cmdline = args.join(&std::ffi::OsString::from(" "));
        let mut name = cmdline.to_string_lossy().to_string();
        name.retain(|c| c != '/');

        let mut path = self.mock_data_path.clone();
        path.push(&name);

        let contents = try_forward(
            || {
                let mut file = std::fs::File::open(&path)?;
                let mut contents = Vec::new();
                file.read_to_end(&mut contents)?;
                Ok(contents)
            },
            || {
                format!(
                    "failed to read mock data file {} for `git {}`",
                    &name,
                    cmdline.to_string_lossy()
                )
            },
        );
        match contents {
            Ok(contents) => ExecutionResult::Ok(contents, Vec::new()),
            Err(e) => ExecutionResult::Err(Vec::new(), e.to_string().into_bytes(), None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Repository {
    pub path: std::path::PathBuf,
}
impl Repository {
    pub fn new(path: std::path::PathBuf) -> Self {
        Self { path }
    }

    fn exec_with_stderr<I, A>(
        &self,
        ep: &dyn ExecutionProvider,
        subcommand: &str,
        args: I,
    ) -> Result<(Vec<u8>, Vec<u8>)>
    where
        I: Iterator<Item = A>,
        A: Into<OsString>,
    {
        let args_vec = args.map(Into::into).collect();
        let result = ep.exec(&self.path, subcommand, args_vec);
        match result {
            ExecutionResult::Ok(stdout, stderr) => Ok((stdout, stderr)),
            ExecutionResult::Err(stdout, stderr, _) => Err(format!(
                "git {} failed\nstdout:\n{}\nstderr:\n{}",
                subcommand,
                String::from_utf8_lossy(&stdout),
                String::from_utf8_lossy(&stderr),
            ))?,
        }
    }

    fn exec<I, A>(&self, ep: &dyn ExecutionProvider, subcommand: &str, args: I) -> Result<Vec<u8>>
    where
        I: Iterator<Item = A>,
        A: Into<OsString>,
    {
        let (stdout, stderr) = self.exec_with_stderr(ep, subcommand, args)?;

        if !stderr.is_empty() {
            Err(format!(
                "git subcommand produced unexpected stderr: {}",
                String::from_utf8_lossy(&stderr),
            ))?;
        }

        Ok(stdout)
    }

    pub fn get_url(&self, ep: &dyn ExecutionProvider, remote: &str) -> Result<Url> {
        try_forward(
            || -> Result<Url> {
                let raw = self.exec(ep, "remote", [&"get-url", remote].iter())?;
                let url = String::from_utf8(raw)?;
                let url = url.trim();

                lazy_static! {
                    static ref GIT_RE: regex::Regex =
                        regex::Regex::new(r"^(?:([^@/:]+)@)?([^@/:]+):([^@:]+)$").unwrap();
                }

                if let Some(captures) = GIT_RE.captures(&url) {
                    let host = captures.get(2).unwrap().as_str();
                    let path = captures.get(3).unwrap().as_str();

                    return Ok(Url::Ssh {
                        user: captures.get(1).map(|x| x.as_str().into()),
                        host: host.into(),
                        path: path.into(),
                    });
                }

                Ok(Url::Url(reqwest::Url::parse(&url)?))
            },
            || format!("failed to query URL for remote {}", remote),
        )
    }

    /// Symbolic description of a commit restricted to branch-like refs, via
    /// `git name-rev`. Returns None when git produces no name at all; the
    /// caller decides whether a name like `main~3` or `undefined` is usable.
    pub fn symbolic_name(&self, ep: &dyn ExecutionProvider, commit: &Ref) -> Result<Option<String>> {
        try_forward(
            || -> Result<Option<String>> {
                let raw = self.exec(
                    ep,
                    "name-rev",
                    [
                        "--name-only",
                        "--refs=refs/heads/*",
                        "--refs=refs/remotes/*",
                        commit.name.as_str(),
                    ]
                    .iter(),
                )?;
                let name = String::from_utf8_lossy(trim_ascii(&raw)).to_string();
                Ok((!name.is_empty()).then_some(name))
            },
            || format!("failed to obtain symbolic name for {}", commit),
        )
    }

    /// Name of the currently checked-out branch, or None on a detached HEAD.
    pub fn current_branch(&self, ep: &dyn ExecutionProvider) -> Result<Option<String>> {
        try_forward(
            || -> Result<Option<String>> {
                let raw = self.exec(ep, "branch", ["--show-current"].iter())?;
                let name = String::from_utf8_lossy(trim_ascii(&raw)).to_string();
                Ok((!name.is_empty()).then_some(name))
            },
            || "failed to obtain current branch",
        )
    }

    /// All branches whose history contains the given commit, in whatever order
    /// git enumerates them.
    pub fn branches_containing(
        &self,
        ep: &dyn ExecutionProvider,
        commit: &Ref,
        scope: BranchScope,
    ) -> Result<Vec<String>> {
        try_forward(
            || -> Result<Vec<String>> {
                let raw = self.exec(
                    ep,
                    "branch",
                    [scope.flag(), "--contains", commit.name.as_str()].iter(),
                )?;
                Ok(parse_branch_list(&raw))
            },
            || format!("failed to enumerate branches containing {}", commit),
        )
    }

    /// Merge commits on the ancestry path from the given commit to HEAD,
    /// i.e. merges that have the commit as an ancestor.
    pub fn descendant_merges(
        &self,
        ep: &dyn ExecutionProvider,
        commit: &Ref,
    ) -> Result<Vec<MergeEntry>> {
        try_forward(
            || -> Result<Vec<MergeEntry>> {
                let raw = self.exec(
                    ep,
                    "log",
                    [
                        "--merges".into(),
                        "--pretty=format:%H|%s".into(),
                        "--ancestry-path".into(),
                        format!("{}..HEAD", commit),
                    ]
                    .iter(),
                )?;
                parse_merge_log(&raw)
            },
            || format!("failed to obtain merges descending from {}", commit),
        )
    }

    /// All commits on any branch (local or remote-tracking) within the given
    /// time window.
    pub fn log_window(
        &self,
        ep: &dyn ExecutionProvider,
        since: &str,
        until: &str,
    ) -> Result<Vec<CommitRef>> {
        try_forward(
            || -> Result<Vec<CommitRef>> {
                let raw = self.exec(
                    ep,
                    "log",
                    [
                        "--all",
                        "--remotes",
                        "--since",
                        since,
                        "--until",
                        until,
                        "--pretty=format:%h|%an|%ae|%cI|%s",
                    ]
                    .iter(),
                )?;
                parse_window_log(&raw)
            },
            || format!("failed to obtain log for {}..{}", since, until),
        )
    }

    /// Paths touched by a commit. `git diff-tree` reports nothing for merge
    /// commits without -m, so fall back to `git show`.
    pub fn changed_files(&self, ep: &dyn ExecutionProvider, commit: &Ref) -> Result<Vec<String>> {
        try_forward(
            || -> Result<Vec<String>> {
                let files = self
                    .exec(
                        ep,
                        "diff-tree",
                        ["--no-commit-id", "--name-only", "-r", commit.name.as_str()].iter(),
                    )
                    .map(|raw| parse_file_list(&raw))
                    .unwrap_or_default();
                if !files.is_empty() {
                    return Ok(files);
                }

                let raw = self.exec(
                    ep,
                    "show",
                    ["--name-only", "--pretty=format:", commit.name.as_str()].iter(),
                )?;
                Ok(parse_file_list(&raw))
            },
            || format!("failed to list files changed by {}", commit),
        )
    }

    /// Fetch from a remote (or a raw URL, together with an explicit refspec).
    /// Fetch progress goes to stderr, so stderr output is not an error here.
    pub fn fetch(&self, ep: &dyn ExecutionProvider, remote: &str, refspecs: &[String]) -> Result<()> {
        try_forward(
            || -> Result<()> {
                self.exec_with_stderr(
                    ep,
                    "fetch",
                    [remote].into_iter().chain(refspecs.iter().map(String::as_str)),
                )?;
                Ok(())
            },
            || format!("failed to fetch from {}", remote),
        )
    }
}

fn parse_branch_list(raw: &[u8]) -> Vec<String> {
    let mut branches = Vec::new();
    for line in raw.split(|&ch| ch == b'\n') {
        let text = String::from_utf8_lossy(trim_ascii(line));
        let text = text.strip_prefix("* ").unwrap_or(&text);
        // Skip symref aliases like "origin/HEAD -> origin/main" and the
        // "(HEAD detached at ...)" placeholder.
        if text.is_empty() || text.contains(" -> ") || text.starts_with('(') {
            continue;
        }
        branches.push(text.to_string());
    }
    branches
}

fn parse_merge_log(raw: &[u8]) -> Result<Vec<MergeEntry>> {
    let mut entries = Vec::new();
    for line in raw.split(|&ch| ch == b'\n') {
        let line = trim_ascii(line);
        if line.is_empty() {
            continue;
        }

        let text = String::from_utf8_lossy(line);
        let (hash, subject) = text
            .split_once('|')
            .ok_or_else(|| format!("bad merge log line\n{}", text))?;
        entries.push(MergeEntry {
            commit: Ref::new(hash),
            subject: subject.to_string(),
        });
    }
    Ok(entries)
}

fn parse_window_log(raw: &[u8]) -> Result<Vec<CommitRef>> {
    let mut commits = Vec::new();
    for line in raw.split(|&ch| ch == b'\n') {
        let line = trim_ascii(line);
        if line.is_empty() {
            continue;
        }

        let text = String::from_utf8_lossy(line);
        // The subject comes last so that '|' inside it survives.
        let mut fields = text.splitn(5, '|');
        let (hash, author_name, author_email, timestamp, subject) = (
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
            fields.next(),
        );
        let (Some(hash), Some(author_name), Some(author_email), Some(timestamp), Some(subject)) =
            (hash, author_name, author_email, timestamp, subject)
        else {
            return Err(format!("bad log line\n{}", text).into());
        };

        commits.push(CommitRef {
            hash: hash.to_string(),
            author_name: author_name.to_string(),
            author_email: author_email.to_string(),
            timestamp: chrono::DateTime::parse_from_rfc3339(timestamp)?,
            subject: subject.to_string(),
        });
    }
    Ok(commits)
}

fn parse_file_list(raw: &[u8]) -> Vec<String> {
    raw.split(|&ch| ch == b'\n')
        .map(|line| String::from_utf8_lossy(trim_ascii(line)).to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

#[cfg(test)]
mod test {
    use crate::git_core::*;

    #[test]
    fn branch_list_basic() {
        let raw = b"\
            * main\n  \
              local-b\n  \
              remotes/origin/HEAD -> origin/main\n  \
              remotes/origin/feature-a\n\
        ";
        assert_eq!(
            parse_branch_list(raw),
            vec!["main", "local-b", "remotes/origin/feature-a"]
        );
    }

    #[test]
    fn branch_list_detached() {
        let raw = b"* (HEAD detached at 31b5c003)\n  feature-x\n";
        assert_eq!(parse_branch_list(raw), vec!["feature-x"]);
    }

    #[test]
    fn branch_list_empty() {
        assert!(parse_branch_list(b"").is_empty());
        assert!(parse_branch_list(b"\n\n").is_empty());
    }

    #[test]
    fn merge_log_basic() -> Result<()> {
        let raw = b"\
            d73727e2a3b1c0ffee00112233445566778899aa|Merge pull request #42 from org/feature-x\n\
            98ad5553000000000000000000000000deadbeef|Merge branch 'release'\n\
        ";
        let entries = parse_merge_log(raw)?;
        assert_eq!(entries.len(), 2);
        assert_eq!(
            entries[0].subject,
            "Merge pull request #42 from org/feature-x"
        );
        assert_eq!(entries[1].commit.name.len(), 40);
        Ok(())
    }

    #[test]
    fn window_log_basic() -> Result<()> {
        let raw = b"\
            31b5c003|Alice Example|alice@example.com|2026-08-23T09:15:00+08:00|Fix the widget\n\
            d73727e2|Bob Example|bob@example.com|2026-08-23T10:00:00+08:00|pipe | in subject\n\
        ";
        let commits = parse_window_log(raw)?;
        assert_eq!(commits.len(), 2);
        assert_eq!(commits[0].committer(), "Alice Example <alice@example.com>");
        assert_eq!(commits[1].subject, "pipe | in subject");
        assert_eq!(commits[1].timestamp.offset().local_minus_utc(), 8 * 3600);
        Ok(())
    }

    #[test]
    fn window_log_bad_line() {
        assert!(parse_window_log(b"31b5c003|only|three fields\n").is_err());
    }

    #[test]
    fn file_list_basic() {
        let raw = b"src/lib.rs\n\nREADME.md\n";
        assert_eq!(parse_file_list(raw), vec!["src/lib.rs", "README.md"]);
    }
}
