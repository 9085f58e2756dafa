use anyhow::{Context, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::io::Write;
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::{debug, info};

use pipedrive_tools::cli::{self, CommonArgs};
use pipedrive_tools::model::DealRef;
use pipedrive_tools::pace::{Pacer, DEAL_INTERVAL};
use pipedrive_tools::render::Renderer;
use pipedrive_tools::{Api, Error};

const DEFAULT_TEMPLATE: &str = "{{.id}} {{.status}}";
/// Explicit ids are split into about this many concurrently paced chunks.
const CHUNKS: usize = 5;

#[derive(Debug, Parser)]
#[command(author, version, about = "Print Pipedrive deals through a text template")]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Template printed for each deal
    #[arg(long, default_value = DEFAULT_TEMPLATE)]
    template: String,

    /// Do not append a newline to the template
    #[arg(long)]
    newline: bool,

    /// Number of random samples to take
    #[arg(long, default_value_t = 0)]
    sample: usize,

    /// Seed for random sampling (0 seeds from the clock)
    #[arg(long, default_value_t = 0)]
    seed: u64,

    /// Filter ID to use for all deals
    #[arg(long)]
    filter: Option<u64>,

    /// Dump the variables of one deal and exit
    #[arg(long = "show-variables", alias = "showVariables")]
    show_variables: bool,

    /// Explicit deal IDs
    deal_ids: Vec<String>,
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
    let filter = args.filter.filter(|id| *id > 0);
    if filter.is_some() && !args.deal_ids.is_empty() {
        return Err(Error::InvalidInput(
            "filter and explicit dealIDs are mutually exclusive".into(),
        )
        .into());
    }
    let ids = cli::parse_deal_ids(&args.deal_ids)?;
    let renderer = Renderer::new(&args.template, !args.newline)?;
    info!(
        template = %args.template,
        org_lookups = renderer.uses_lookup(),
        "using template"
    );
    let api = cli::connect(&args.common, |b| b)?;

    let show_variables = args.show_variables;
    let sample = if show_variables { 1 } else { args.sample };
    let seed = args.seed;
    let (tx, mut rx) = mpsc::channel::<DealRef>(16);

    let producer = {
        let api = api.clone();
        async move {
            if ids.is_empty() {
                let deals = api.fetch_deals(filter).await.context("fetching deals")?;
                for deal in select_deals(deals, sample, seed) {
                    if tx.send(deal).await.is_err() {
                        break;
                    }
                }
                Ok(())
            } else {
                fetch_explicit(&api, &ids, tx).await
            }
        }
    };

    let consumer = async move {
        while let Some(deal) = rx.recv().await {
            if show_variables {
                println!("{}", serde_json::to_string_pretty(&deal)?);
                break;
            }
            let line = renderer
                .render(&deal, &api)
                .await
                .with_context(|| format!("rendering deal {}", deal.id))?;
            let mut stdout = std::io::stdout();
            stdout.write_all(line.as_bytes())?;
            stdout.flush()?;
        }
        Ok::<_, anyhow::Error>(())
    };

    tokio::try_join!(producer, consumer)?;
    Ok(())
}

/// Sample with replacement when `sample > 0`, otherwise keep everything.
fn select_deals(deals: Vec<DealRef>, sample: usize, seed: u64) -> Vec<DealRef> {
    if sample == 0 || deals.is_empty() {
        return deals;
    }
    let seed = if seed == 0 { clock_seed() } else { seed };
    info!(seed, "using seed");
    let mut rng = StdRng::seed_from_u64(seed);
    (0..sample)
        .map(|_| deals[rng.gen_range(0..deals.len())].clone())
        .collect()
}

fn clock_seed() -> u64 {
    chrono::Utc::now()
        .timestamp_nanos_opt()
        .map(|n| n.unsigned_abs())
        .unwrap_or(1)
}

/// Chunks run concurrently; within a chunk, lookups are sequential and paced.
async fn fetch_explicit(api: &Api, ids: &[u64], tx: mpsc::Sender<DealRef>) -> Result<()> {
    let chunk_size = ids.len() / CHUNKS + 1;
    let pacer = Pacer::new(DEAL_INTERVAL);
    let chunks = ids.chunks(chunk_size).map(|chunk| {
        let tx = tx.clone();
        async move {
            debug!(len = chunk.len(), interval = ?pacer.interval(), "fetching chunk");
            for &id in chunk {
                let deal = pacer
                    .pace(api.fetch_deal(id))
                    .await
                    .with_context(|| format!("fetching deal {}", id))?;
                if tx.send(deal).await.is_err() {
                    break;
                }
            }
            Ok::<_, anyhow::Error>(())
        }
    });
    futures::future::try_join_all(chunks).await?;
    Ok(())
}
