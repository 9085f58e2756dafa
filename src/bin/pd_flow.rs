use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use std::process::ExitCode;
use tracing::info;

use pipedrive_tools::cli::{self, CommonArgs};
use pipedrive_tools::time::format_timestamp;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Print the phase history of every deal in a pipeline"
)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Pipeline name
    #[arg(long)]
    pipeline: String,

    /// Saved filter name restricting the deals
    #[arg(long)]
    filter: Option<String>,

    /// Concurrent update fetches (default 8)
    #[arg(long)]
    workers: Option<usize>,

    /// Abort outstanding fetches on the first error
    #[arg(long)]
    fail_fast: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Args = cli::parse_args();
    cli::init_tracing(args.common.verbose);
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => cli::report(err),
    }
}

async fn run(args: Args) -> Result<()> {
    let api = cli::connect(&args.common, |mut b| {
        if let Some(workers) = args.workers {
            b = b.workers(workers);
        }
        if args.fail_fast {
            b = b.fail_fast(true);
        }
        b
    })?;

    let pipeline_id = api
        .pipeline_id_by_name(&args.pipeline)
        .await
        .context("looking up pipeline")?;
    let filter_id = match &args.filter {
        Some(name) => Some(
            api.filter_id_by_name(name)
                .await
                .context("looking up filter")?,
        ),
        None => None,
    };
    let stages = api
        .fetch_stages(pipeline_id)
        .await
        .context("fetching stages")?;
    let deals = api
        .fetch_deals_from_pipeline(pipeline_id, filter_id)
        .await
        .context("fetching deals")?;
    info!(pipeline_id, deals = deals.len(), stages = stages.len(), "pipeline loaded");

    let mut changes = api
        .fetch_pipeline_changes(deals, &stages)
        .await
        .context("fetching deal updates")?;
    changes.sort_by_key(|c| c.deal.id);

    let now = Utc::now();
    for change in &changes {
        let deal = &change.deal;
        println!(
            "{} {} [{}] decided {}",
            deal.id,
            deal.title,
            deal.status.as_str(),
            format_timestamp(&change.decision_time_at(now))
        );
        for transition in &change.pipeline_updates {
            println!("  {} {}", format_timestamp(&transition.at), transition.phase);
        }
        for stat in change.phase_stats_at(now) {
            println!("  {:>8.1}d {}x {}", stat.days, stat.touchdowns, stat.phase);
        }
    }
    Ok(())
}
