// SPDX-License-Identifier: GPL-3.0-or-later

//! The digest itself: window arithmetic, per-commit collection, rendering.
//!
//! Everything here is a straight iteration-and-format loop over the
//! attribution resolver's output; the only policy lives in attribution.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use log::warn;

use crate::attribution::{Attribution, Resolver};
use crate::config::ReportConfig;
use crate::git_core::{CommitRef, ExecutionProvider, Ref, Repository};
use crate::utils::Result;

/// A concrete trailing time window, precomputed as `git log` arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub label: String,
    pub since: String,
    pub until: String,
}

/// Compute the report window: the day `days_back` days before `now` in the
/// configured timezone, from `start_hour` to end of day.
pub fn report_window(config: &ReportConfig, now: DateTime<Utc>) -> Result<Window> {
    let offset = FixedOffset::east_opt(config.utc_offset_hours * 3600)
        .ok_or_else(|| format!("bad UTC offset: {}", config.utc_offset_hours))?;
    if config.start_hour > 23 {
        Err(format!("bad start hour: {}", config.start_hour))?;
    }

    let local = now.with_timezone(&offset);
    let day = (local - Duration::days(config.days_back)).date_naive();

    Ok(Window {
        label: format!("{} (UTC{}, {:02}:00-23:59)", day, offset, config.start_hour),
        since: format!("{}T{:02}:00:00{}", day, config.start_hour, offset),
        until: format!("{}T23:59:59{}", day, offset),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct CommitEntry {
    pub commit: CommitRef,
    pub attribution: Attribution,
    pub commit_url: Option<String>,
    pub files: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Digest {
    pub window: Window,
    pub total: usize,
    /// Per-committer sections in first-seen commit order.
    pub sections: Vec<(String, Vec<CommitEntry>)>,
}

/// Collect the digest for one window: query the log, then resolve each
/// commit independently. Resolution failures degrade to `unknown`/absent
/// inside the resolver; only the window query itself can fail here.
pub fn collect_digest(
    repo: &Repository,
    ep: &dyn ExecutionProvider,
    resolver: &Resolver,
    window: &Window,
    web_base: Option<&str>,
) -> Result<Digest> {
    let commits = repo.log_window(ep, &window.since, &window.until)?;

    let mut sections: Vec<(String, Vec<CommitEntry>)> = Vec::new();
    let total = commits.len();

    for commit in commits {
        let commit_ref = Ref::new(commit.hash.clone());
        let attribution = resolver.resolve(&commit_ref);
        let files = repo.changed_files(ep, &commit_ref).unwrap_or_else(|err| {
            warn!("{}", err);
            Vec::new()
        });
        let commit_url = web_base.map(|base| format!("{}/commit/{}", base, commit.hash));

        let committer = commit.committer();
        let entry = CommitEntry {
            commit,
            attribution,
            commit_url,
            files,
        };

        match sections.iter_mut().find(|(name, _)| *name == committer) {
            Some((_, entries)) => entries.push(entry),
            None => sections.push((committer, vec![entry])),
        }
    }

    Ok(Digest {
        window: window.clone(),
        total,
        sections,
    })
}

impl Digest {
    /// Line-oriented plain-text rendering, one section per committer.
    pub fn render(&self) -> String {
        let mut out: Vec<String> = Vec::new();
        out.push(format!("Commit digest for {}:", self.window.label));
        out.push(format!("Total commits: {}", self.total));
        out.push(format!("Unique committers: {}", self.sections.len()));
        out.push("Committer summary:".to_string());

        for (committer, entries) in &self.sections {
            out.push(format!("    {}: {} commit(s)", committer, entries.len()));
            for entry in entries {
                out.push(format!(
                    "        Commit {} on branch(es) {}: {}",
                    entry.commit.hash, entry.attribution.branch, entry.commit.subject
                ));
                if let Some(url) = &entry.attribution.review_url {
                    out.push(format!("            PR: {}", url));
                } else if let Some(url) = &entry.commit_url {
                    out.push(format!("            Commit: {}", url));
                }
                out.push("            Files changed:".to_string());
                if entry.files.is_empty() {
                    out.push("                (no files detected)".to_string());
                } else {
                    for file in &entry.files {
                        out.push(format!("                {}", file));
                    }
                }
            }
        }

        out.join("\n")
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use crate::attribution::BranchAttribution;
    use crate::report::*;

    #[test]
    fn window_basic() -> Result<()> {
        let config = ReportConfig::default();
        let now = Utc.with_ymd_and_hms(2026, 8, 24, 3, 0, 0).unwrap();

        let window = report_window(&config, now)?;
        // 03:00 UTC is 11:00 UTC+8; one day back is the 23rd.
        assert_eq!(window.since, "2026-08-23T08:00:00+08:00");
        assert_eq!(window.until, "2026-08-23T23:59:59+08:00");
        Ok(())
    }

    #[test]
    fn window_crosses_midnight() -> Result<()> {
        let config = ReportConfig::default();
        // 20:00 UTC is already 04:00 on the next day in UTC+8.
        let now = Utc.with_ymd_and_hms(2026, 8, 23, 20, 0, 0).unwrap();

        let window = report_window(&config, now)?;
        assert_eq!(window.since, "2026-08-23T08:00:00+08:00");
        Ok(())
    }

    #[test]
    fn window_rejects_bad_offset() {
        let config = ReportConfig {
            utc_offset_hours: 99,
            ..Default::default()
        };
        assert!(report_window(&config, Utc::now()).is_err());
    }

    fn entry(hash: &str, committer: (&str, &str), branch: &str, files: &[&str]) -> CommitEntry {
        CommitEntry {
            commit: CommitRef {
                hash: hash.to_string(),
                author_name: committer.0.to_string(),
                author_email: committer.1.to_string(),
                timestamp: DateTime::parse_from_rfc3339("2026-08-23T09:15:00+08:00").unwrap(),
                subject: "Fix the widget".to_string(),
            },
            attribution: Attribution {
                branch: BranchAttribution::Branches(vec![branch.to_string()]),
                review_url: None,
            },
            commit_url: None,
            files: files.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn render_basic() {
        let mut first = entry(
            "31b5c003",
            ("Alice Example", "alice@example.com"),
            "feature-x",
            &["src/widget.rs"],
        );
        first.attribution.review_url = Some("https://github.com/org/repo/pull/42".to_string());
        let second = entry(
            "d73727e2",
            ("Bob Example", "bob@example.com"),
            "main",
            &[],
        );

        let digest = Digest {
            window: Window {
                label: "2026-08-23 (UTC+08:00, 08:00-23:59)".to_string(),
                since: "2026-08-23T08:00:00+08:00".to_string(),
                until: "2026-08-23T23:59:59+08:00".to_string(),
            },
            total: 2,
            sections: vec![
                ("Alice Example <alice@example.com>".to_string(), vec![first]),
                ("Bob Example <bob@example.com>".to_string(), vec![second]),
            ],
        };

        let text = digest.render();
        assert!(text.contains("Total commits: 2"));
        assert!(text.contains("Unique committers: 2"));
        assert!(text.contains("Commit 31b5c003 on branch(es) feature-x: Fix the widget"));
        assert!(text.contains("PR: https://github.com/org/repo/pull/42"));
        assert!(text.contains("(no files detected)"));
    }
}
