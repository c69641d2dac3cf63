// SPDX-License-Identifier: GPL-3.0-or-later

//! Commit-to-branch-and-review attribution.
//!
//! Given a commit, determine (a) the branch it most plausibly originated on
//! and (b) the review request that introduced it. Both resolutions are
//! two-tier fallback chains over read-only history queries: a failing or
//! empty tier degrades to the next one, never to an error.

use std::fmt::Display;

use itertools::Itertools;
use lazy_static::lazy_static;
use log::debug;
use regex::Regex;

use crate::git_core::{BranchScope, ExecutionProvider, Ref, Repository};
use crate::utils::Result;

/// Best-guess origin branches of a commit, or the `unknown` sentinel when no
/// branch can be determined. Never an error condition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BranchAttribution {
    Branches(Vec<String>),
    Unknown,
}
impl BranchAttribution {
    pub fn is_unknown(&self) -> bool {
        matches!(self, BranchAttribution::Unknown)
    }

    pub fn branches(&self) -> &[String] {
        match self {
            BranchAttribution::Branches(branches) => branches,
            BranchAttribution::Unknown => &[],
        }
    }
}
impl Display for BranchAttribution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BranchAttribution::Branches(branches) => {
                write!(f, "{}", branches.iter().join(", "))
            }
            BranchAttribution::Unknown => write!(f, "unknown"),
        }
    }
}

/// A review request (pull request) as reported by the review tracking
/// service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewRequest {
    pub id: u64,
    pub source_branch: String,
}

/// Interface to the review tracking service. Queries cover all review states
/// (open, closed, merged). Failures are absorbed by the resolver.
pub trait ReviewService {
    fn find_review_requests(&self, source_branch: &str) -> Result<Vec<ReviewRequest>>;
}

/// Extracts a review id from a merge commit subject line. Pluggable because
/// the convention is unenforced free text.
pub trait MergeSubjectMatcher {
    fn review_id(&self, subject: &str) -> Option<u64>;
}

/// Matches the GitHub merge button convention,
/// `Merge pull request #<number> from <head>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GithubMergeSubjects;
impl MergeSubjectMatcher for GithubMergeSubjects {
    fn review_id(&self, subject: &str) -> Option<u64> {
        lazy_static! {
            static ref RE: Regex = Regex::new(r"Merge pull request #([0-9]+)").unwrap();
        }
        RE.captures(subject)
            .and_then(|captures| captures.get(1).unwrap().as_str().parse().ok())
    }
}

static GITHUB_MERGE_SUBJECTS: GithubMergeSubjects = GithubMergeSubjects;

/// The per-commit result of attribution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribution {
    pub branch: BranchAttribution,
    pub review_url: Option<String>,
}

/// Resolves commits to their origin branch and review request. Read-only and
/// credential-agnostic: all it ever does is query the repository and the
/// review service.
pub struct Resolver<'a> {
    repo: &'a Repository,
    ep: &'a dyn ExecutionProvider,
    reviews: Option<&'a dyn ReviewService>,
    review_url_base: Option<String>,
    matcher: &'a dyn MergeSubjectMatcher,
}
impl<'a> Resolver<'a> {
    pub fn new(repo: &'a Repository, ep: &'a dyn ExecutionProvider) -> Self {
        Self {
            repo,
            ep,
            reviews: None,
            review_url_base: None,
            matcher: &GITHUB_MERGE_SUBJECTS,
        }
    }

    pub fn review_service(self, reviews: &'a dyn ReviewService) -> Self {
        Self {
            reviews: Some(reviews),
            ..self
        }
    }

    /// Web base URL of the repository, e.g. `https://github.com/org/repo`;
    /// review URLs are synthesized as `<base>/pull/<id>`. Without a base, no
    /// review link can be produced at all.
    pub fn review_url_base(self, base: String) -> Self {
        Self {
            review_url_base: Some(base),
            ..self
        }
    }

    pub fn matcher(self, matcher: &'a dyn MergeSubjectMatcher) -> Self {
        Self { matcher, ..self }
    }

    /// Resolve a single commit. Infallible: exhausted fallbacks yield the
    /// `unknown` branch sentinel and an absent review link.
    pub fn resolve(&self, commit: &Ref) -> Attribution {
        Attribution {
            branch: self.resolve_branch(commit),
            review_url: self.resolve_review(commit),
        }
    }

    fn resolve_branch(&self, commit: &Ref) -> BranchAttribution {
        // Tier 1: symbolic description. Cheap and precise, but only useful
        // when the commit sits exactly at a branch tip.
        match self.repo.symbolic_name(self.ep, commit) {
            Ok(Some(name)) if is_exact_branch_name(&name) => {
                return BranchAttribution::Branches(vec![name]);
            }
            Ok(name) => {
                debug!("no usable symbolic name for {}: {:?}", commit, name);
            }
            Err(err) => {
                debug!("symbolic name lookup for {} failed: {}", commit, err);
            }
        }

        // Tier 2: enumerate every branch that contains the commit.
        let branches = match self.repo.branches_containing(self.ep, commit, BranchScope::All) {
            Ok(branches) => branches,
            Err(err) => {
                debug!("branch enumeration for {} failed: {}", commit, err);
                Vec::new()
            }
        };
        if branches.is_empty() {
            return BranchAttribution::Unknown;
        }

        let current = self.repo.current_branch(self.ep).unwrap_or_else(|err| {
            debug!("current branch lookup failed: {}", err);
            None
        });

        match select_fallback_branch(&branches, current.as_deref()) {
            Some(branch) => BranchAttribution::Branches(vec![branch.to_string()]),
            None => BranchAttribution::Unknown,
        }
    }

    fn resolve_review(&self, commit: &Ref) -> Option<String> {
        let base = self.review_url_base.as_ref()?;

        // Tier 1: ask the review service about every remote-tracking branch
        // that contains the commit.
        if let Some(reviews) = self.reviews {
            match self
                .repo
                .branches_containing(self.ep, commit, BranchScope::Remote)
            {
                Ok(branches) => {
                    for branch in &branches {
                        let Some(head) = source_branch_name(branch) else {
                            continue;
                        };
                        match reviews.find_review_requests(head) {
                            Ok(requests) => {
                                if let Some(request) = requests.first() {
                                    return Some(format!("{}/pull/{}", base, request.id));
                                }
                            }
                            Err(err) => {
                                debug!("review lookup for branch {} failed: {}", head, err);
                            }
                        }
                    }
                }
                Err(err) => {
                    debug!("remote branch enumeration for {} failed: {}", commit, err);
                }
            }
        }

        // Tier 2: scan merge commits that descend from this commit for a
        // conventional merge subject.
        match self.repo.descendant_merges(self.ep, commit) {
            Ok(merges) => {
                for merge in &merges {
                    if let Some(id) = self.matcher.review_id(&merge.subject) {
                        return Some(format!("{}/pull/{}", base, id));
                    }
                }
            }
            Err(err) => {
                debug!("merge scan for {} failed: {}", commit, err);
            }
        }

        None
    }
}

/// A symbolic description is only usable if it is an exact branch name:
/// relative spellings like `main~3` or `main^2` mean the commit sits behind
/// the tip, and `undefined` is git's placeholder for "no name found".
fn is_exact_branch_name(name: &str) -> bool {
    !name.is_empty() && name != "undefined" && !name.contains('~') && !name.contains('^')
}

/// Pick the most plausible origin from the set of branches containing a
/// commit: a remote-tracking (shared, reviewed) branch first, then a local
/// branch other than the checked-out one, then whatever git listed first.
fn select_fallback_branch<'b>(branches: &'b [String], current: Option<&str>) -> Option<&'b str> {
    if let Some(branch) = branches.iter().find(|b| b.starts_with("remotes/")) {
        return Some(branch);
    }
    if let Some(branch) = branches
        .iter()
        .find(|b| !b.starts_with("remotes/") && Some(b.as_str()) != current)
    {
        return Some(branch);
    }
    branches.first().map(String::as_str)
}

/// Source branch name of a remote-tracking branch as the review service knows
/// it, i.e. with the remote prefix stripped. Integration branches and the
/// HEAD symref are not review sources.
fn source_branch_name(remote_branch: &str) -> Option<&str> {
    let branch = remote_branch.strip_prefix("remotes/").unwrap_or(remote_branch);
    let (_, head) = branch.split_once('/')?;
    if head.is_empty() || head == "HEAD" || head == "main" || head == "master" {
        return None;
    }
    Some(head)
}

#[cfg(test)]
mod test {
    use crate::attribution::*;

    #[test]
    fn exact_branch_names() {
        assert!(is_exact_branch_name("feature-x"));
        assert!(is_exact_branch_name("remotes/origin/feature-x"));
        assert!(!is_exact_branch_name("main~3"));
        assert!(!is_exact_branch_name("main^2"));
        assert!(!is_exact_branch_name("undefined"));
        assert!(!is_exact_branch_name(""));
    }

    fn branches(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn fallback_prefers_remote() {
        let set = branches(&["remotes/origin/feature-a", "local-b"]);
        assert_eq!(
            select_fallback_branch(&set, Some("local-b")),
            Some("remotes/origin/feature-a")
        );

        let set = branches(&["local-b", "remotes/origin/feature-a"]);
        assert_eq!(
            select_fallback_branch(&set, None),
            Some("remotes/origin/feature-a")
        );
    }

    #[test]
    fn fallback_prefers_non_current_local() {
        let set = branches(&["main", "local-b"]);
        assert_eq!(select_fallback_branch(&set, Some("main")), Some("local-b"));

        let set = branches(&["local-b"]);
        assert_eq!(select_fallback_branch(&set, Some("main")), Some("local-b"));
    }

    #[test]
    fn fallback_last_resort_is_first_listed() {
        let set = branches(&["main"]);
        assert_eq!(select_fallback_branch(&set, Some("main")), Some("main"));
        assert_eq!(select_fallback_branch(&[], None), None);
    }

    #[test]
    fn github_merge_subjects() {
        let matcher = GithubMergeSubjects;
        assert_eq!(
            matcher.review_id("Merge pull request #42 from org/feature-x"),
            Some(42)
        );
        assert_eq!(matcher.review_id("Merge branch 'release'"), None);
        assert_eq!(matcher.review_id("Merge pull request #x from nowhere"), None);
    }

    #[test]
    fn source_branch_names() {
        assert_eq!(source_branch_name("origin/feature-x"), Some("feature-x"));
        assert_eq!(
            source_branch_name("remotes/origin/feature/nested"),
            Some("feature/nested")
        );
        assert_eq!(source_branch_name("origin/main"), None);
        assert_eq!(source_branch_name("origin/master"), None);
        assert_eq!(source_branch_name("origin/HEAD"), None);
        assert_eq!(source_branch_name("detached"), None);
    }
}
