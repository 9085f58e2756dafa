//! Offset pagination over the page envelope.
//!
//! [`Paginator::run`] asks a URL generator for the URL at the current offset,
//! fetches and decodes the page, publishes it to a [`PageSink`], and advances
//! the offset by the page's `limit` until `more_items_in_collection` is false.
//! Pages published before a failure stay published.
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::api::Api;
use crate::envelope::GenericResponse;
use crate::error::{Error, Result};

const STREAM_BUFFER: usize = 64;

/// Consumer of decoded pages.
#[async_trait]
pub trait PageSink: Send {
    async fn publish(&mut self, page: GenericResponse) -> Result<()>;
}

#[async_trait]
impl PageSink for Vec<GenericResponse> {
    async fn publish(&mut self, page: GenericResponse) -> Result<()> {
        self.push(page);
        Ok(())
    }
}

#[async_trait]
impl PageSink for mpsc::Sender<GenericResponse> {
    async fn publish(&mut self, page: GenericResponse) -> Result<()> {
        // A dropped receiver means nobody wants further pages.
        self.send(page).await.map_err(|_| Error::Cancelled)
    }
}

pub(crate) fn decode_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).map_err(|source| {
        error!(%body, "error decoding result");
        Error::Decode {
            source,
            body: body.to_string(),
        }
    })
}

pub struct Paginator<'a> {
    api: &'a Api,
    cancel: Option<CancellationToken>,
}

impl<'a> Paginator<'a> {
    pub(crate) fn new(api: &'a Api) -> Self {
        Self { api, cancel: None }
    }

    /// Stop between pages and abort in-flight requests once `token` fires.
    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Drive the pagination loop. `next_url` returns `None` to stop before
    /// fetching. Returns the number of pages published.
    pub async fn run<U, S>(&self, mut next_url: U, sink: &mut S) -> Result<usize>
    where
        U: FnMut(u32) -> Result<Option<String>> + Send,
        S: PageSink + ?Sized,
    {
        let mut offset: u32 = 0;
        let mut published = 0usize;
        loop {
            if self.cancel.as_ref().is_some_and(|t| t.is_cancelled()) {
                return Err(Error::Cancelled);
            }
            let Some(url) = next_url(offset)? else {
                return Ok(published);
            };

            let body = self.guard(self.api.get_endpoint(&url)).await?;
            let page: GenericResponse = decode_body(&body)?;
            let more = page.has_more();
            let limit = page.pagination().limit;
            if more && limit == 0 {
                return Err(Error::Protocol(format!(
                    "page at offset {} claims more items but has limit 0",
                    offset
                )));
            }

            sink.publish(page).await?;
            published += 1;
            if !more {
                return Ok(published);
            }
            offset = offset.checked_add(limit).ok_or_else(|| {
                Error::Protocol(format!("offset overflow after {} + {}", offset, limit))
            })?;
            debug!(offset, "fetching next page");
        }
    }

    /// Fetch every page and decode each `data` array into `T`.
    pub async fn collect<T, U>(&self, next_url: U) -> Result<Vec<T>>
    where
        T: DeserializeOwned,
        U: FnMut(u32) -> Result<Option<String>> + Send,
    {
        let mut pages: Vec<GenericResponse> = Vec::new();
        self.run(next_url, &mut pages).await?;
        let mut items = Vec::new();
        for page in &pages {
            items.extend(page.decode_list::<T>()?);
        }
        Ok(items)
    }

    async fn guard<T, F>(&self, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match &self.cancel {
            Some(token) => tokio::select! {
                _ = token.cancelled() => Err(Error::Cancelled),
                res = fut => res,
            },
            None => fut.await,
        }
    }
}

/// Items decoded from a paginated endpoint, delivered as they arrive.
/// Errors are delivered in-band after the items that preceded them.
pub struct PageStream<T> {
    rx: mpsc::Receiver<Result<T>>,
}

impl<T> PageStream<T> {
    pub async fn next(&mut self) -> Option<Result<T>> {
        self.rx.recv().await
    }

    /// Drain the stream, stopping at the first error.
    pub async fn try_collect(mut self) -> Result<Vec<T>> {
        let mut items = Vec::new();
        while let Some(item) = self.rx.recv().await {
            items.push(item?);
        }
        Ok(items)
    }
}

impl Api {
    pub fn paginator(&self) -> Paginator<'_> {
        Paginator::new(self)
    }

    pub async fn fetch_generic<U, S>(&self, next_url: U, sink: &mut S) -> Result<usize>
    where
        U: FnMut(u32) -> Result<Option<String>> + Send,
        S: PageSink + ?Sized,
    {
        self.paginator().run(next_url, sink).await
    }

    /// Single PUT; the write path has no continuation, so an envelope that
    /// claims more items is rejected after being published.
    pub async fn put_generic<S>(&self, endpoint: &str, body: &Value, sink: &mut S) -> Result<()>
    where
        S: PageSink + ?Sized,
    {
        let raw = self.put_endpoint(endpoint, body).await?;
        let page: GenericResponse = decode_body(&raw)?;
        let more = page.has_more();
        sink.publish(page).await?;
        if more {
            return Err(Error::Protocol(
                "PUT response claims more items in collection".into(),
            ));
        }
        Ok(())
    }

    /// Run the paginator and a decoding worker in the background.
    pub fn stream_generic<T, U>(&self, next_url: U) -> PageStream<T>
    where
        T: DeserializeOwned + Send + 'static,
        U: FnMut(u32) -> Result<Option<String>> + Send + 'static,
    {
        let (page_tx, mut page_rx) = mpsc::channel::<GenericResponse>(1);
        let (item_tx, item_rx) = mpsc::channel::<Result<T>>(STREAM_BUFFER);
        let (done_tx, done_rx) = oneshot::channel::<Result<usize>>();

        let api = self.clone();
        tokio::spawn(async move {
            let mut sink = page_tx;
            let result = api.paginator().run(next_url, &mut sink).await;
            drop(sink);
            let _ = done_tx.send(result);
        });

        tokio::spawn(async move {
            while let Some(page) = page_rx.recv().await {
                match page.decode_list::<T>() {
                    Ok(items) => {
                        for item in items {
                            if item_tx.send(Ok(item)).await.is_err() {
                                return;
                            }
                        }
                    }
                    Err(err) => {
                        let _ = item_tx.send(Err(err)).await;
                        return;
                    }
                }
            }
            if let Ok(Err(err)) = done_rx.await {
                let _ = item_tx.send(Err(err)).await;
            }
        });

        PageStream { rx: item_rx }
    }
}
