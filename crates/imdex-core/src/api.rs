//! Remote collection API
//!
//! Wire contract for the authoritative store:
//! - `GET /collection?namespace=<ns>` → array of [`RemoteEntry`]
//! - `PUT /entity/<id>` with [`EntryUpdate`] → single-field update
//! - `POST /collection/batch` with [`BatchUpdate`] → batch upsert
//!
//! `Authorization: Bearer <token>` is attached when the session monitor
//! has a credential and omitted otherwise. The transport sits behind the
//! [`CollectionApi`] trait so the engine can be driven against fakes.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::config::TrackerConfig;
use crate::error::ApiError;
use crate::model::{CatchFlags, EntryId, FlagField};
use crate::network::ConnectivityProbe;
use crate::session::SessionMonitor;

/// One record from `GET /collection`.
///
/// Flags missing from the payload default to false; a record the server
/// never stored is equivalent to all-false.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteEntry {
    pub entity_id: EntryId,
    #[serde(default)]
    pub normal: bool,
    #[serde(default)]
    pub shiny: bool,
    #[serde(default)]
    pub alpha: bool,
    #[serde(default)]
    pub alpha_shiny: bool,
}

impl RemoteEntry {
    pub fn new(entity_id: EntryId, flags: CatchFlags) -> Self {
        Self {
            entity_id,
            normal: flags.normal,
            shiny: flags.shiny,
            alpha: flags.alpha,
            alpha_shiny: flags.alpha_shiny,
        }
    }

    pub fn flags(&self) -> CatchFlags {
        CatchFlags {
            normal: self.normal,
            shiny: self.shiny,
            alpha: self.alpha,
            alpha_shiny: self.alpha_shiny,
        }
    }
}

/// Body of `PUT /entity/<id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntryUpdate {
    pub namespace: String,
    pub field: FlagField,
    pub value: bool,
}

/// One entry inside a batch upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchEntry {
    pub entity_id: EntryId,
    pub fields: CatchFlags,
}

/// Body of `POST /collection/batch`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchUpdate {
    pub namespace: String,
    pub updates: Vec<BatchEntry>,
}

/// Remote store operations the engine depends on.
#[async_trait]
pub trait CollectionApi: Send + Sync {
    async fn fetch_collection(&self, namespace: &str) -> Result<Vec<RemoteEntry>, ApiError>;
    async fn put_entry(&self, entry: EntryId, update: &EntryUpdate) -> Result<(), ApiError>;
    async fn push_batch(&self, batch: &BatchUpdate) -> Result<(), ApiError>;
}

/// Production [`CollectionApi`] on reqwest.
pub struct HttpCollectionApi {
    client: Client,
    base_url: String,
    direct_write_timeout: Duration,
    session: Arc<SessionMonitor>,
}

impl HttpCollectionApi {
    pub fn new(config: &TrackerConfig, session: Arc<SessionMonitor>) -> Self {
        let client = Client::builder()
            .timeout(config.load_timeout())
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            direct_write_timeout: config.direct_write_timeout(),
            session,
        }
    }

    async fn bearer(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match self.session.token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

#[async_trait]
impl CollectionApi for HttpCollectionApi {
    async fn fetch_collection(&self, namespace: &str) -> Result<Vec<RemoteEntry>, ApiError> {
        let url = format!("{}/collection", self.base_url);
        let request = self.client.get(&url).query(&[("namespace", namespace)]);
        let response = self.bearer(request).await.send().await.map_err(ApiError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                code: status.as_u16(),
            });
        }

        // Strict decode: a payload that is not a record array is a failed
        // fetch, never a partial merge.
        response
            .json::<Vec<RemoteEntry>>()
            .await
            .map_err(|e| ApiError::Malformed {
                message: e.to_string(),
            })
    }

    async fn put_entry(&self, entry: EntryId, update: &EntryUpdate) -> Result<(), ApiError> {
        let url = format!("{}/entity/{}", self.base_url, entry);
        let request = self
            .client
            .put(&url)
            .timeout(self.direct_write_timeout)
            .json(update);
        let response = self.bearer(request).await.send().await.map_err(ApiError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                code: status.as_u16(),
            });
        }
        Ok(())
    }

    async fn push_batch(&self, batch: &BatchUpdate) -> Result<(), ApiError> {
        let url = format!("{}/collection/batch", self.base_url);
        let request = self.client.post(&url).json(batch);
        let response = self.bearer(request).await.send().await.map_err(ApiError::from)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                code: status.as_u16(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl ConnectivityProbe for HttpCollectionApi {
    async fn is_reachable(&self) -> bool {
        // Any HTTP response counts as reachable; only transport failures
        // mean the store is out of reach.
        self.client.head(&self.base_url).send().await.is_ok()
    }
}
