// crates/cli/src/cli.rs
//! Command-line arguments for `playbook-jobs`.

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "playbook-jobs", version, about = "Submit and watch strategy playbook jobs")]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Base URL of the playbook API (overrides PLAYBOOK_API_URL)
    #[arg(long, global = true)]
    pub api_url: Option<String>,

    /// Milliseconds between status polls (overrides PLAYBOOK_POLL_INTERVAL_MS)
    #[arg(long, global = true)]
    pub interval_ms: Option<u64>,

    /// Milliseconds before giving up on a job (overrides PLAYBOOK_POLL_TIMEOUT_MS)
    #[arg(long, global = true)]
    pub timeout_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Watch one or more running jobs until they finish
    Watch {
        /// Job ids to track
        #[arg(required = true)]
        job_ids: Vec<String>,
    },
    /// POST to a job-creating endpoint, then watch the job it returns
    Submit {
        /// Endpoint path, e.g. /api/strategy-report/generate
        path: String,

        /// JSON request body
        #[arg(short, long, default_value = "{}")]
        body: String,

        /// Panel title shown while the job runs
        #[arg(short, long)]
        title: Option<String>,
    },
}
