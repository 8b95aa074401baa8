// crates/cli/src/main.rs
mod cli;
mod watch;

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use playbook_client::{ClientConfig, HttpJobClient, Submission};
use playbook_jobs::{JobPoller, MultiJobPoller, PollerConfig};
use playbook_progress::{TerminalBoard, TerminalPanel};
use playbook_types::JobId;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Commands, GlobalArgs};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn,playbook_jobs=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let (client_config, poller_config) = configs(&cli.global);
    let client = Arc::new(
        HttpJobClient::new(&client_config).context("Failed to build the job service client")?,
    );

    let all_completed = match cli.command {
        Commands::Watch { job_ids } => {
            let mut ids: Vec<JobId> = job_ids.into_iter().map(JobId::new).collect();
            if ids.len() == 1 {
                let id = ids.remove(0);
                let poller = JobPoller::new(client, poller_config);
                let title = id.to_string();
                watch::watch_one(&poller, id, &title, &mut TerminalPanel::new()).await
            } else {
                let poller = MultiJobPoller::new(client, poller_config);
                watch::watch_many(&poller, ids, &mut TerminalBoard::new()).await
            }
        }
        Commands::Submit { path, body, title } => {
            let body: serde_json::Value =
                serde_json::from_str(&body).context("--body is not valid JSON")?;
            match client
                .submit(&path, &body)
                .await
                .with_context(|| format!("Failed to submit to {path}"))?
            {
                Submission::Immediate(result) => {
                    info!(%path, "Endpoint answered synchronously");
                    println!("{result:#}");
                    true
                }
                Submission::Queued(id) => {
                    let title = title.unwrap_or(path);
                    let poller = JobPoller::new(client, poller_config);
                    watch::watch_one(&poller, id, &title, &mut TerminalPanel::new()).await
                }
            }
        }
    };

    Ok(if all_completed {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Environment configuration with command-line flags layered on top.
fn configs(args: &GlobalArgs) -> (ClientConfig, PollerConfig) {
    let mut client = ClientConfig::from_env();
    if let Some(url) = &args.api_url {
        client.api_url = url.clone();
    }

    let mut poller = PollerConfig::from_env();
    if let Some(ms) = args.interval_ms {
        poller = poller.with_interval(Duration::from_millis(ms));
    }
    if let Some(ms) = args.timeout_ms {
        poller = poller.with_timeout(Duration::from_millis(ms));
    }
    (client, poller)
}
