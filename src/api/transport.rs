use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use tracing::warn;

use crate::error::{Error, Result};

/// Raw HTTP access. URLs arrive fully built, token included; implementations
/// return the response body of a successful request.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &Url) -> Result<String>;

    async fn put(&self, url: &Url, body: &Value) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
}

impl HttpTransport {
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = Client::builder().user_agent(concat!(
            env!("CARGO_PKG_NAME"),
            "/",
            env!("CARGO_PKG_VERSION")
        ));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            http: builder.build()?,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &Url) -> Result<String> {
        let res = self
            .http
            .get(url.clone())
            .send()
            .await
            .map_err(strip_url)?;
        read_body(res).await
    }

    async fn put(&self, url: &Url, body: &Value) -> Result<String> {
        let res = self
            .http
            .put(url.clone())
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await
            .map_err(strip_url)?;
        read_body(res).await
    }
}

// reqwest errors carry the request URL, token included.
fn strip_url(err: reqwest::Error) -> Error {
    Error::Transport(err.without_url())
}

async fn read_body(res: Response) -> Result<String> {
    let status = res.status();
    // Never echo the token-bearing URL into errors.
    let mut url = res.url().clone();
    url.set_query(None);

    if status == StatusCode::TOO_MANY_REQUESTS {
        let body = res.text().await.unwrap_or_default();
        warn!(%url, "rate limited by Pipedrive");
        return Err(Error::Status {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        });
    }
    if !status.is_success() {
        let body = res.text().await.unwrap_or_default();
        warn!(%status, %url, %body, "Pipedrive API error");
        return Err(Error::Status {
            status: status.as_u16(),
            url: url.to_string(),
            body,
        });
    }
    res.text().await.map_err(strip_url)
}
