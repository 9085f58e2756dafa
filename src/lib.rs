pub mod api;
mod changes;
pub mod cli;
pub mod config;
pub mod custom_fields;
pub mod envelope;
pub mod error;
pub mod model;
pub mod pace;
pub mod paginate;
pub mod pool;
pub mod reconstruct;
pub mod render;
pub mod time;

pub use api::Api;
pub use error::{Error, Result};
