// SPDX-License-Identifier: GPL-3.0-or-later

//! Review request lookup against the GitHub REST API.

use log::{debug, info};
use reqwest::{header, StatusCode, Url};
use serde::Deserialize;

use crate::attribution::{ReviewRequest, ReviewService};
use crate::git_core;
use crate::utils::Result;

pub mod api;

fn default_api() -> String {
    "https://api.github.com/".into()
}

#[derive(Deserialize, Debug, Clone)]
pub struct Host {
    pub host: String,
    #[serde(default = "default_api")]
    pub api: String,
    pub user: String,
    pub token: String,
}

/// Blocking client bound to one repository. Only issues read queries.
#[derive(Debug)]
pub struct Client {
    owner: String,
    repo: String,
    url_api: Url,
    http: reqwest::blocking::Client,
}
impl Client {
    pub fn new(host: &Host, owner: &str, repo: &str) -> Result<Self> {
        // The API base must end with a '/' for Url::join to keep its path.
        let mut api = host.api.clone();
        if !api.ends_with('/') {
            api.push('/');
        }
        let url_api = Url::parse(&api)?;

        let mut default_headers = header::HeaderMap::new();
        default_headers.insert(
            header::AUTHORIZATION,
            format!("Bearer {}", host.token).parse()?,
        );
        default_headers.insert(header::ACCEPT, "application/vnd.github+json".parse()?);
        default_headers.insert("X-GitHub-Api-Version", "2022-11-28".parse()?);

        let http = reqwest::blocking::Client::builder()
            .user_agent("git-digest")
            .default_headers(default_headers)
            .build()?;

        Ok(Self {
            owner: owner.to_string(),
            repo: repo.to_string(),
            url_api,
            http,
        })
    }

    /// Pull requests whose head is the given branch, across all states.
    /// A 404 (e.g. repository renamed) is reported as an empty list.
    pub fn pulls_for_head(&self, branch: &str) -> Result<Vec<api::Pull>> {
        let url = self
            .url_api
            .join(&format!("repos/{}/{}/pulls", self.owner, self.repo))?;
        info!("Requesting {}", url);

        let response = self
            .http
            .get(url)
            .query(&[
                ("head", format!("{}:{}", self.owner, branch)),
                ("state", "all".to_string()),
            ])
            .send()?;
        debug!("Response: {:?}", &response);

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            Err(format!("HTTP error: {}", response.status()))?;
        }

        let text = response.text()?;
        Ok(serde_json::from_str(&text)?)
    }
}

impl ReviewService for Client {
    fn find_review_requests(&self, source_branch: &str) -> Result<Vec<ReviewRequest>> {
        Ok(self
            .pulls_for_head(source_branch)?
            .into_iter()
            .map(|pull| ReviewRequest {
                id: pull.number,
                source_branch: pull.head.ref_,
            })
            .collect())
    }
}

/// Derive a token-bearing fetch URL from a remote URL. Credentials stay an
/// explicit per-call argument; nothing ever rewrites the repository's remote
/// configuration. Only https remotes can carry a token.
pub fn authenticated_url(url: &git_core::Url, token: &str) -> Option<String> {
    match url {
        git_core::Url::Url(url) if url.scheme() == "https" => {
            let host = url.host_str()?;
            Some(format!("https://{}@{}{}", token, host, url.path()))
        }
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use crate::github::*;

    #[test]
    fn authenticated_url_https_only() {
        let https = git_core::Url::Url(Url::parse("https://github.com/org/repo").unwrap());
        assert_eq!(
            authenticated_url(&https, "tok").as_deref(),
            Some("https://tok@github.com/org/repo")
        );

        let ssh = git_core::Url::Ssh {
            user: Some("git".into()),
            host: "github.com".into(),
            path: "org/repo".into(),
        };
        assert_eq!(authenticated_url(&ssh, "tok"), None);
    }

    #[test]
    fn pull_deserialization() {
        let text = r#"[{"number": 42, "head": {"ref": "feature-x", "sha": "31b5c003"}}]"#;
        let pulls: Vec<api::Pull> = serde_json::from_str(text).unwrap();
        assert_eq!(pulls[0].number, 42);
        assert_eq!(pulls[0].head.ref_, "feature-x");
    }
}
