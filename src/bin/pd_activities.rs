use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;

use pipedrive_tools::cli::{self, CommonArgs};
use pipedrive_tools::time::format_timestamp;

#[derive(Debug, Parser)]
#[command(author, version, about = "List the activities of a Pipedrive deal")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Deal ID
    deal_id: String,
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
    let deal_id = cli::parse_deal_id(&args.deal_id)?;
    let api = cli::connect(&args.common, |b| b)?;

    let mut activities = api.fetch_deal_activities(deal_id);
    while let Some(activity) = activities.next().await {
        let activity =
            activity.with_context(|| format!("fetching activities of deal {}", deal_id))?;
        println!(
            "{}\t{}\t{}\t{}\t{}",
            activity.id,
            activity
                .add_time
                .as_ref()
                .map(format_timestamp)
                .unwrap_or_default(),
            activity.kind,
            if activity.done { "done" } else { "open" },
            activity.subject
        );
    }
    Ok(())
}
