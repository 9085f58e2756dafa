use serde_json::Value;
use thiserror::Error;

use crate::config::ConfigError;
use crate::render::TemplateError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to reach Pipedrive: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("pipedrive error {status} for {url}: {body}")]
    Status {
        status: u16,
        url: String,
        body: String,
    },
    #[error("invalid Pipedrive response: {source}")]
    Decode {
        #[source]
        source: serde_json::Error,
        body: String,
    },
    #[error("could not serialize record: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("protocol violation: {0}")]
    Protocol(String),
    #[error("deal {deal_id}: field '{field}' holds {value}, expected a string")]
    FieldType {
        deal_id: u64,
        field: String,
        value: Value,
    },
    #[error("custom field '{key}' ({name}): could not map {value}")]
    CustomField {
        key: String,
        name: String,
        value: Value,
    },
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{kind} '{name}' not found")]
    NotFound { kind: &'static str, name: String },
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("operation cancelled")]
    Cancelled,
}

impl Error {
    /// True for errors caused by the caller's input or configuration rather
    /// than by talking to the API.
    pub fn is_usage(&self) -> bool {
        matches!(
            self,
            Error::InvalidInput(_) | Error::Template(_) | Error::Config(_)
        )
    }
}
