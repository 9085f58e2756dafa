use anyhow::{Context, Result};
use clap::Parser;
use serde_json::{Map, Value};
use std::process::ExitCode;
use tokio::sync::mpsc;
use tracing::info;

use pipedrive_tools::cli::{self, CommonArgs};
use pipedrive_tools::custom_fields::{join_csv, toggle_csv_tag, DEAL_AKTION};
use pipedrive_tools::model::DealRef;
use pipedrive_tools::pace::{Pacer, TOUCH_INTERVAL};
use pipedrive_tools::Error;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Touch Pipedrive deals by toggling a tag in a comma-separated custom field"
)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Tag to add when missing and remove when present
    #[arg(long, default_value = "839")]
    tag: String,

    /// Raw key of the custom field holding the tags
    #[arg(long, default_value = DEAL_AKTION)]
    field_key: String,

    /// Deal IDs to touch
    #[arg(required = true)]
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
    let ids = cli::parse_deal_ids(&args.deal_ids)?;
    let api = cli::connect(&args.common, |b| {
        b.custom_deal_fields(true).custom_org_fields(true)
    })?;
    let field_name = api
        .deal_fields()
        .name_for(&args.field_key)
        .map(str::to_string)
        .ok_or_else(|| {
            Error::InvalidInput(format!(
                "custom field '{}' is not in the deal field table",
                args.field_key
            ))
        })?;

    let (tx, mut rx) = mpsc::channel::<DealRef>(1);
    let pacer = Pacer::new(TOUCH_INTERVAL);

    let producer = {
        let api = api.clone();
        async move {
            for id in ids {
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
    };

    let consumer = async move {
        while let Some(deal) = rx.recv().await {
            let tags = toggle_csv_tag(deal.custom_fields.get(&field_name), &args.tag);
            let csv = join_csv(&tags);
            info!(deal = deal.id, tags = %csv, "updating");
            let mut body = Map::new();
            body.insert(args.field_key.clone(), Value::String(csv));
            api.update_deal(deal.id, &Value::Object(body))
                .await
                .with_context(|| format!("updating deal {}", deal.id))?;
        }
        Ok::<_, anyhow::Error>(())
    };

    tokio::try_join!(producer, consumer)?;
    Ok(())
}
