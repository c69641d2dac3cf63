// SPDX-License-Identifier: GPL-3.0-or-later

use clap::Parser;
use log::{debug, warn};

use git_digest::*;
use utils::Result;

#[derive(Parser, Debug)]
struct Options {
    /// Report on the repository at the given path (overrides the configured
    /// path).
    #[clap(short = 'C')]
    path: Option<std::path::PathBuf>,

    /// Load the configuration from the given file instead of the default
    /// location.
    #[clap(long)]
    config: Option<std::path::PathBuf>,

    /// Do not fetch and do not contact the review service.
    #[clap(long)]
    offline: bool,

    /// Skip the fetch before collecting the report window.
    #[clap(long)]
    no_fetch: bool,

    /// Write the digest to the given file instead of stdout.
    #[clap(short, long)]
    output: Option<std::path::PathBuf>,
}

fn do_main() -> Result<()> {
    let args = Options::parse();

    env_logger::builder()
        .format_timestamp(Some(env_logger::TimestampPrecision::Millis))
        .init();
    debug!("Starting up");

    let config = config::load_config(args.config.as_deref())?;
    let repo = git_core::Repository::new(args.path.unwrap_or_else(|| config.repository.path.clone()));
    let ep = git_core::SimpleExecutionProvider;
    let remote = &config.repository.remote;

    let url = match repo.get_url(&ep, remote) {
        Ok(url) => Some(url),
        Err(err) => {
            warn!("{}", err);
            None
        }
    };

    if !args.offline && !args.no_fetch {
        // Prefer an explicit token-bearing URL over the configured remote so
        // that credentials never end up in the repository configuration.
        let authenticated = url.as_ref().zip(config.github.as_ref()).and_then(
            |(url, host)| github::authenticated_url(url, &host.token),
        );
        let result = match &authenticated {
            Some(fetch_url) => repo.fetch(
                &ep,
                fetch_url,
                &[format!("+refs/heads/*:refs/remotes/{}/*", remote)],
            ),
            None => repo.fetch(&ep, remote, &[]),
        };
        if let Err(err) = result {
            warn!("{}", err);
        }
    }

    let web_base = url.as_ref().and_then(|url| {
        let hostname = url.hostname()?;
        let (owner, name) = url.github_path()?;
        Some(format!("https://{}/{}/{}", hostname, owner, name))
    });

    let client = if args.offline {
        None
    } else {
        config
            .github
            .as_ref()
            .zip(url.as_ref().and_then(git_core::Url::github_path))
            .and_then(|(host, (owner, name))| match github::Client::new(host, owner, name) {
                Ok(client) => Some(client),
                Err(err) => {
                    warn!("{}", err);
                    None
                }
            })
    };

    let mut resolver = attribution::Resolver::new(&repo, &ep);
    if let Some(base) = &web_base {
        resolver = resolver.review_url_base(base.clone());
    }
    if let Some(client) = &client {
        resolver = resolver.review_service(client);
    }

    let window = report::report_window(&config.report, chrono::Utc::now())?;
    let digest = report::collect_digest(&repo, &ep, &resolver, &window, web_base.as_deref())?;
    let text = digest.render();

    match args.output {
        Some(path) => std::fs::write(path, text)?,
        None => println!("{}", text),
    }

    Ok(())
}

fn main() {
    if let Err(err) = do_main() {
        println!("{}", err);
        std::process::exit(1);
    }
}
