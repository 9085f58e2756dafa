use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument};

use crate::config::{Config, UrlLogging};
use crate::custom_fields::{CustomFieldTable, WithCustomFields};
use crate::envelope::GenericResponse;
use crate::error::{Error, Result};
use crate::model::{
    Activity, Deal, DealField, DealRef, DealUpdate, Filter, Organization, Pipeline, Stage,
};
use crate::paginate::{decode_body, PageStream};

pub mod endpoints;
pub mod transport;

pub use endpoints::{fill, paged, Endpoints};
pub use transport::{HttpTransport, Transport};

/// Pipedrive API v1 facade. Cheap to clone; all state is shared and
/// read-only after construction.
#[derive(Clone)]
pub struct Api {
    config: Arc<Config>,
    endpoints: Arc<Endpoints>,
    transport: Arc<dyn Transport>,
    deal_fields: Arc<CustomFieldTable>,
    org_fields: Arc<CustomFieldTable>,
}

impl fmt::Debug for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Api")
            .field("base_url", self.config.base_url())
            .finish_non_exhaustive()
    }
}

impl Api {
    /// Second build phase: derive the transport and field tables from a
    /// validated config.
    pub fn new(config: Config) -> Result<Self> {
        let transport = HttpTransport::new(config.timeout())?;
        Ok(Self::with_transport(config, Arc::new(transport)))
    }

    pub fn with_transport(config: Config, transport: Arc<dyn Transport>) -> Self {
        let endpoints = Endpoints::for_base(config.base_url());
        let deal_fields = if config.custom_deal_fields() {
            CustomFieldTable::deal_defaults()
        } else {
            CustomFieldTable::default()
        };
        let org_fields = if config.custom_org_fields() {
            CustomFieldTable::organization_defaults()
        } else {
            CustomFieldTable::default()
        };
        Self {
            config: Arc::new(config),
            endpoints: Arc::new(endpoints),
            transport,
            deal_fields: Arc::new(deal_fields),
            org_fields: Arc::new(org_fields),
        }
    }

    /// Replace the built-in custom-field tables.
    pub fn with_field_tables(mut self, deals: CustomFieldTable, orgs: CustomFieldTable) -> Self {
        self.deal_fields = Arc::new(deals);
        self.org_fields = Arc::new(orgs);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    pub fn deal_fields(&self) -> &CustomFieldTable {
        &self.deal_fields
    }

    fn authorize(&self, endpoint: &str) -> Result<Url> {
        let mut url = Url::parse(endpoint).map_err(|err| Error::InvalidUrl {
            url: endpoint.to_string(),
            reason: err.to_string(),
        })?;
        url.query_pairs_mut()
            .append_pair("api_token", self.config.token().expose());
        Ok(url)
    }

    /// The URL with the `api_token` value replaced by an ellipsis.
    pub fn redact(url: &Url) -> String {
        let Some(query) = url.query() else {
            return url.to_string();
        };
        let query = query
            .split('&')
            .map(|pair| {
                if pair.starts_with("api_token=") {
                    "api_token=…"
                } else {
                    pair
                }
            })
            .collect::<Vec<_>>()
            .join("&");
        let mut shown = url.clone();
        shown.set_query(None);
        format!("{}?{}", shown, query)
    }

    fn log_url(&self, method: &str, url: &Url) {
        match self.config.url_logging() {
            UrlLogging::Off => {}
            UrlLogging::Redacted => info!(method, url = %Self::redact(url), "request"),
            UrlLogging::Plain => info!(method, url = %url, "request"),
        }
    }

    pub(crate) async fn get_endpoint(&self, endpoint: &str) -> Result<String> {
        let url = self.authorize(endpoint)?;
        self.log_url("GET", &url);
        self.transport.get(&url).await
    }

    pub(crate) async fn put_endpoint(&self, endpoint: &str, body: &Value) -> Result<String> {
        let url = self.authorize(endpoint)?;
        self.log_url("PUT", &url);
        self.transport.put(&url, body).await
    }

    async fn fetch_single(&self, endpoint: &str) -> Result<GenericResponse> {
        let body = self.get_endpoint(endpoint).await?;
        decode_body(&body)
    }

    fn decode_record<T>(data: &Value, table: &CustomFieldTable) -> Result<T>
    where
        T: DeserializeOwned + WithCustomFields,
    {
        let mut record = T::deserialize(data).map_err(|source| {
            error!(body = %data, "error decoding record");
            Error::Decode {
                source,
                body: data.to_string(),
            }
        })?;
        if !table.is_empty() {
            if let Some(raw) = data.as_object() {
                *record.custom_fields_mut() = table.apply(raw)?;
            }
        }
        Ok(record)
    }

    fn decode_records<T>(raw: Vec<Value>, table: &CustomFieldTable) -> Result<Vec<T>>
    where
        T: DeserializeOwned + WithCustomFields,
    {
        raw.iter().map(|data| Self::decode_record(data, table)).collect()
    }

    #[instrument(skip(self))]
    pub async fn fetch_deal(&self, deal_id: u64) -> Result<DealRef> {
        if deal_id == 0 {
            return Err(Error::InvalidInput("DealID 0 not allowed".into()));
        }
        let page = self
            .fetch_single(&fill(&self.endpoints.deal, &[("id", deal_id)]))
            .await?;
        Self::decode_record(&page.data, &self.deal_fields)
    }

    /// All deals, optionally restricted by a saved filter.
    #[instrument(skip(self))]
    pub async fn fetch_deals(&self, filter_id: Option<u64>) -> Result<Vec<DealRef>> {
        let next = paged(
            &self.endpoints.deals,
            &[("filter_id", filter_id.unwrap_or(0))],
        );
        let raw: Vec<Value> = self.paginator().collect(next).await?;
        Self::decode_records(raw, &self.deal_fields)
    }

    #[instrument(skip(self))]
    pub async fn fetch_deals_from_pipeline(
        &self,
        pipeline_id: u64,
        filter_id: Option<u64>,
    ) -> Result<Vec<Deal>> {
        let next = paged(
            &self.endpoints.pipeline_deals,
            &[
                ("pipeline_id", pipeline_id),
                ("filter_id", filter_id.unwrap_or(0)),
            ],
        );
        let raw: Vec<Value> = self.paginator().collect(next).await?;
        Self::decode_records(raw, &self.deal_fields)
    }

    pub async fn fetch_deal_updates(&self, deal_id: u64) -> Result<Vec<DealUpdate>> {
        self.fetch_deal_updates_with(deal_id, CancellationToken::new())
            .await
    }

    /// Full update history of a deal, abandoned once `cancel` fires.
    pub async fn fetch_deal_updates_with(
        &self,
        deal_id: u64,
        cancel: CancellationToken,
    ) -> Result<Vec<DealUpdate>> {
        let next = paged(&self.endpoints.deal_updates, &[("id", deal_id)]);
        self.paginator().with_cancel(cancel).collect(next).await
    }

    /// Stages of a pipeline ordered by `order_nr`.
    pub async fn fetch_stages(&self, pipeline_id: u64) -> Result<Vec<Stage>> {
        let next = paged(&self.endpoints.stages, &[("pipeline_id", pipeline_id)]);
        let mut stages: Vec<Stage> = self.paginator().collect(next).await?;
        stages.sort_by_key(|s| s.order_nr);
        Ok(stages)
    }

    pub async fn fetch_pipelines(&self) -> Result<Vec<Pipeline>> {
        self.paginator()
            .collect(paged(&self.endpoints.pipelines, &[]))
            .await
    }

    pub async fn pipeline_id_by_name(&self, name: &str) -> Result<u64> {
        self.fetch_pipelines()
            .await?
            .into_iter()
            .find(|p| p.name == name)
            .map(|p| p.id)
            .ok_or_else(|| Error::NotFound {
                kind: "pipeline",
                name: name.to_string(),
            })
    }

    pub async fn fetch_filters(&self) -> Result<Vec<Filter>> {
        self.paginator()
            .collect(paged(&self.endpoints.filters, &[]))
            .await
    }

    pub async fn filter_id_by_name(&self, name: &str) -> Result<u64> {
        self.fetch_filters()
            .await?
            .into_iter()
            .find(|f| f.name == name)
            .map(|f| f.id)
            .ok_or_else(|| Error::NotFound {
                kind: "filter",
                name: name.to_string(),
            })
    }

    pub async fn fetch_deal_field(&self, field_id: u64) -> Result<DealField> {
        self.fetch_single(&fill(&self.endpoints.deal_field, &[("id", field_id)]))
            .await?
            .decode()
    }

    pub async fn fetch_deal_fields(&self) -> Result<Vec<DealField>> {
        self.paginator()
            .collect(paged(&self.endpoints.deal_fields, &[]))
            .await
    }

    #[instrument(skip(self))]
    pub async fn fetch_organization(&self, org_id: u64) -> Result<Organization> {
        let page = self
            .fetch_single(&fill(&self.endpoints.organization, &[("id", org_id)]))
            .await?;
        Self::decode_record(&page.data, &self.org_fields)
    }

    /// Activities of a deal, streamed page by page.
    pub fn fetch_deal_activities(&self, deal_id: u64) -> PageStream<Activity> {
        self.stream_generic(paged(&self.endpoints.deal_activities, &[("id", deal_id)]))
    }

    /// PUT a partial deal body and return the updated deal.
    #[instrument(skip(self, body))]
    pub async fn update_deal(&self, deal_id: u64, body: &Value) -> Result<DealRef> {
        if deal_id == 0 {
            return Err(Error::InvalidInput("DealID 0 not allowed".into()));
        }
        let mut pages: Vec<GenericResponse> = Vec::new();
        self.put_generic(&fill(&self.endpoints.deal, &[("id", deal_id)]), body, &mut pages)
            .await?;
        let page = pages
            .first()
            .ok_or_else(|| Error::Protocol("PUT produced no response".into()))?;
        Self::decode_record(&page.data, &self.deal_fields)
    }
}
