use anyhow::{Context, Result};
use clap::Parser;
use std::process::ExitCode;

use pipedrive_tools::cli::{self, CommonArgs};
use pipedrive_tools::model::DealField;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "List deal field definitions (raw key, name, options)"
)]
struct Args {
    #[command(flatten)]
    common: CommonArgs,

    /// Show a single field by ID
    field_id: Option<u64>,
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
    let api = cli::connect(&args.common, |b| b)?;
    let fields = match args.field_id {
        Some(id) => vec![api
            .fetch_deal_field(id)
            .await
            .with_context(|| format!("fetching deal field {}", id))?],
        None => api.fetch_deal_fields().await.context("fetching deal fields")?,
    };
    for field in &fields {
        print_field(field);
    }
    Ok(())
}

fn print_field(field: &DealField) {
    println!("{}\t{}\t{}\t{}", field.id, field.key, field.field_type, field.name);
    for option in field.options.iter().flatten() {
        let id = match &option.id {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        };
        println!("\t{}\t{}", id, option.label);
    }
}
