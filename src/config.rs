// SPDX-License-Identifier: GPL-3.0-or-later

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use lazy_static::lazy_static;
use serde::Deserialize;

use crate::github;
use crate::utils::{read_bytes, try_forward, Result};

#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RepositoryConfig {
    pub path: PathBuf,
    #[serde(default = "default_remote")]
    pub remote: String,
}

fn default_remote() -> String {
    "origin".into()
}

/// Parameters of the trailing report window. The window covers one past day
/// in the configured timezone, from `start_hour` to end of day.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ReportConfig {
    pub utc_offset_hours: i32,
    pub days_back: i64,
    pub start_hour: u32,
}
impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            utc_offset_hours: 8,
            days_back: 1,
            start_hour: 8,
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub repository: RepositoryConfig,
    #[serde(default)]
    pub github: Option<github::Host>,
    #[serde(default)]
    pub report: ReportConfig,
}

pub fn get_project_dirs() -> &'static ProjectDirs {
    lazy_static! {
        static ref PROJECT_DIRS: ProjectDirs =
            ProjectDirs::from("experimental", "gitdigest", "git-digest").unwrap();
    }
    &PROJECT_DIRS
}

pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => get_project_dirs().config_dir().join("git-digest.toml"),
    };
    try_forward(
        || Ok(toml::from_str(std::str::from_utf8(&read_bytes(&path)?)?)?),
        || format!("Error loading {}", path.display()),
    )
}

#[cfg(test)]
mod test {
    use crate::config::*;

    #[test]
    fn minimal_config() {
        let config: Config = toml::from_str(
            r#"
            [repository]
            path = "/srv/checkouts/widgets"
            "#,
        )
        .unwrap();
        assert_eq!(config.repository.remote, "origin");
        assert!(config.github.is_none());
        assert_eq!(config.report, ReportConfig::default());
    }

    #[test]
    fn full_config() {
        let config: Config = toml::from_str(
            r#"
            [repository]
            path = "/srv/checkouts/widgets"
            remote = "upstream"

            [github]
            host = "github.com"
            user = "reporter"
            token = "abc123"

            [report]
            utc_offset_hours = 2
            days_back = 2
            start_hour = 0
            "#,
        )
        .unwrap();
        assert_eq!(config.repository.remote, "upstream");
        let github = config.github.unwrap();
        assert_eq!(github.api, "https://api.github.com/");
        assert_eq!(github.token, "abc123");
        assert_eq!(config.report.utc_offset_hours, 2);
    }
}
