//! Plumbing shared by the `pd-*` binaries: common flags, logging setup,
//! config assembly and exit codes.
use clap::{Args, Parser};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use crate::api::Api;
use crate::config::{self, Config, ConfigBuilder, ConfigError, UrlLogging};
use crate::error::{Error, Result};
use crate::render::TemplateError;

/// Configuration, usage and input errors.
pub const EXIT_USAGE: u8 = 1;
/// Fetch, decode and protocol failures.
pub const EXIT_FAILURE: u8 = 2;

#[derive(Debug, Clone, Default, Args)]
pub struct CommonArgs {
    /// API token to be used (falls back to the config file, then $PDTOKEN)
    #[arg(long)]
    pub token: Option<String>,

    /// Enable verbose output and log request URLs with the token redacted
    #[arg(long)]
    pub verbose: bool,

    /// Path to an optional YAML config file
    #[arg(long)]
    pub config: Option<PathBuf>,
}

/// Logs go to stderr; stdout carries program output only. `RUST_LOG`
/// overrides the default level.
pub fn init_tracing(verbose: bool) {
    let default = if verbose {
        "info,pipedrive_tools=debug"
    } else {
        "warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}

/// Parse flags; malformed command lines exit with [`EXIT_USAGE`], help and
/// version requests exit 0.
pub fn parse_args<P: Parser>() -> P {
    P::try_parse().unwrap_or_else(|err| {
        if err.use_stderr() {
            let _ = err.print();
            std::process::exit(i32::from(EXIT_USAGE));
        }
        err.exit()
    })
}

/// Explicit flags first, then `tweak` (tool-specific flags), then the config
/// file for anything still unset. The token falls back to `$PDTOKEN`.
pub fn build_config(
    common: &CommonArgs,
    tweak: impl FnOnce(ConfigBuilder) -> ConfigBuilder,
) -> std::result::Result<Config, ConfigError> {
    let mut builder = Config::builder();
    if let Some(token) = &common.token {
        builder = builder.token(token.clone());
    }
    if common.verbose {
        builder = builder.url_logging(UrlLogging::Redacted);
    }
    builder = tweak(builder);
    if let Some(path) = &common.config {
        builder = builder.merge_file(&config::load(path)?);
    }
    builder.build()
}

pub fn connect(
    common: &CommonArgs,
    tweak: impl FnOnce(ConfigBuilder) -> ConfigBuilder,
) -> Result<Api> {
    let config = build_config(common, tweak)?;
    Api::new(config)
}

pub fn parse_deal_id(raw: &str) -> Result<u64> {
    let id: u64 = raw
        .trim()
        .parse()
        .map_err(|_| Error::InvalidInput(format!("invalid deal id '{}'", raw)))?;
    if id == 0 {
        return Err(Error::InvalidInput("DealID 0 not allowed".into()));
    }
    Ok(id)
}

/// Validate every id before any request is made.
pub fn parse_deal_ids(raw: &[String]) -> Result<Vec<u64>> {
    raw.iter().map(|r| parse_deal_id(r)).collect()
}

fn is_usage(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause.downcast_ref::<Error>().is_some_and(Error::is_usage)
            || cause.is::<ConfigError>()
            || cause.is::<TemplateError>()
    })
}

pub fn exit_status(err: &anyhow::Error) -> u8 {
    if is_usage(err) {
        EXIT_USAGE
    } else {
        EXIT_FAILURE
    }
}

/// Print the error chain and pick the exit code.
pub fn report(err: anyhow::Error) -> ExitCode {
    eprintln!("Fatal error: {:#}", err);
    ExitCode::from(exit_status(&err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Context;

    #[test]
    fn deal_ids_validated() {
        let ids = parse_deal_ids(&["674".into(), " 12 ".into()]).unwrap();
        assert_eq!(ids, vec![674, 12]);
        assert!(matches!(
            parse_deal_ids(&["12".into(), "abc".into()]),
            Err(Error::InvalidInput(msg)) if msg.contains("abc")
        ));
        assert!(matches!(
            parse_deal_id("0"),
            Err(Error::InvalidInput(msg)) if msg == "DealID 0 not allowed"
        ));
        assert!(parse_deal_id("-3").is_err());
    }

    #[test]
    fn usage_errors_map_to_one() {
        let err = anyhow::Error::from(Error::InvalidInput("x".into())).context("while parsing");
        assert_eq!(exit_status(&err), EXIT_USAGE);

        let err: anyhow::Error = ConfigError::MissingToken { var: "PDTOKEN".into() }.into();
        assert_eq!(exit_status(&err), EXIT_USAGE);

        let err: anyhow::Error = Error::Config(ConfigError::Invalid("workers must be > 0")).into();
        assert_eq!(exit_status(&err), EXIT_USAGE);

        let err: anyhow::Error = TemplateError::Unclosed(0).into();
        assert_eq!(exit_status(&err), EXIT_USAGE);
    }

    #[test]
    fn fetch_errors_map_to_two() {
        let err = Err::<(), _>(Error::Protocol("limit 0".into()))
            .context("fetching deals")
            .unwrap_err();
        assert_eq!(exit_status(&err), EXIT_FAILURE);
        let err: anyhow::Error = Error::Status {
            status: 500,
            url: "u".into(),
            body: "b".into(),
        }
        .into();
        assert_eq!(exit_status(&err), EXIT_FAILURE);
    }

    #[test]
    fn explicit_flags_beat_file() {
        let td = tempfile::tempdir().unwrap();
        let path = td.path().join("config.yaml");
        std::fs::write(&path, config::example()).unwrap();
        let common = CommonArgs {
            token: Some("flag-token".into()),
            verbose: true,
            config: Some(path),
        };
        let cfg = build_config(&common, |b| b.workers(3)).unwrap();
        assert_eq!(cfg.token().expose(), "flag-token");
        assert_eq!(cfg.workers(), 3);
        assert_eq!(cfg.url_logging(), UrlLogging::Redacted);
        assert!(cfg.custom_org_fields());
    }

    #[test]
    fn unreadable_config_is_a_config_error() {
        let common = CommonArgs {
            token: Some("t".into()),
            verbose: false,
            config: Some(PathBuf::from("/nonexistent/pd-tools.yaml")),
        };
        assert!(matches!(
            build_config(&common, |b| b),
            Err(ConfigError::Io(_))
        ));
    }
}
