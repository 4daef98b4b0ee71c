//! Stream Source Resolver client
//!
//! Turns a content identifier into a playable URL plus metadata:
//!
//! ```text
//! GET {base}/api/stream/{kind}/{id}[?extension={ext}]
//!
//! { "success": true, "streamUrl": "...", "info": { ... }, "message": "..." }
//! ```

use crate::{ContentKind, EpisodeContext, Error, PlaybackRequest, Result, StreamInfo};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

/// Default request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// What to resolve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRequest {
    pub kind: ContentKind,
    pub stream_id: String,
    /// Container hint, episodes only
    pub extension: Option<String>,
}

impl StreamRequest {
    pub fn new(kind: ContentKind, stream_id: impl Into<String>) -> Self {
        Self {
            kind,
            stream_id: stream_id.into(),
            extension: None,
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = Some(extension.into());
        self
    }
}

/// Raw resolver response body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ResolverResponse {
    pub success: bool,
    pub stream_url: Option<String>,
    pub info: Option<StreamInfo>,
    pub message: Option<String>,
}

impl ResolverResponse {
    /// Reject unsuccessful responses and responses without a URL
    pub fn into_resolved(self) -> Result<ResolvedStream> {
        if !self.success {
            return Err(Error::Resolver(
                self.message
                    .unwrap_or_else(|| "stream could not be resolved".to_string()),
            ));
        }
        match self.stream_url {
            Some(url) if !url.trim().is_empty() => Ok(ResolvedStream {
                stream_url: url,
                info: self.info,
            }),
            other => Err(Error::InvalidStreamUrl(other.unwrap_or_default())),
        }
    }
}

/// A playable URL and its metadata
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedStream {
    pub stream_url: String,
    pub info: Option<StreamInfo>,
}

impl ResolvedStream {
    /// Build the request the page hands the player
    pub fn into_request(
        self,
        kind: ContentKind,
        episode: Option<EpisodeContext>,
    ) -> PlaybackRequest {
        PlaybackRequest {
            stream_url: self.stream_url,
            stream_type: kind,
            stream_info: self.info,
            episode_data: episode,
        }
    }
}

#[async_trait]
pub trait StreamResolver: Send + Sync {
    async fn resolve(&self, request: &StreamRequest) -> Result<ResolvedStream>;
}

/// Resolver backed by the HTTP API
#[derive(Debug, Clone)]
pub struct HttpStreamResolver {
    client: reqwest::Client,
    base: Url,
}

impl HttpStreamResolver {
    pub fn new(base: &str) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Self::with_client(base, client)
    }

    pub fn with_client(base: &str, client: reqwest::Client) -> Result<Self> {
        let base = Url::parse(base)?;
        if base.cannot_be_a_base() {
            return Err(Error::Resolver(format!("not a base URL: {base}")));
        }
        Ok(Self { client, base })
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Endpoint for a request
    pub fn endpoint(&self, request: &StreamRequest) -> Result<Url> {
        let mut url = self.base.clone();
        let kind = request.kind.to_string();
        url.path_segments_mut()
            .map_err(|_| Error::Resolver(format!("not a base URL: {}", self.base)))?
            .pop_if_empty()
            .extend(["api", "stream", kind.as_str(), request.stream_id.as_str()]);
        if let Some(extension) = request.extension.as_deref().filter(|e| !e.is_empty()) {
            url.query_pairs_mut().append_pair("extension", extension);
        }
        Ok(url)
    }
}

#[async_trait]
impl StreamResolver for HttpStreamResolver {
    #[instrument(skip(self), fields(kind = %request.kind, id = %request.stream_id))]
    async fn resolve(&self, request: &StreamRequest) -> Result<ResolvedStream> {
        let url = self.endpoint(request)?;
        debug!(url = %url, "Resolving stream");

        let response = self.client.get(url).send().await?.error_for_status()?;
        let body: ResolverResponse = response.json().await?;
        body.into_resolved().inspect_err(|e| {
            warn!(error = %e, "Stream resolution failed");
        })
    }
}
