//! Remote case service.
//!
//! `CaseService` is the seam the poller and the action triggers talk to.
//! `HttpCaseService` is the real implementation over the service's REST API.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::{Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;

use crate::case::{Case, CaseId, CaseUpdate, NewCase};
use crate::config::Config;
use crate::{cwlog_trace, Error, Result};

/// Raw download payload as returned by the service.
#[derive(Debug, Clone, Default)]
pub struct CaseArchive {
    /// Value of the `content-disposition` header, if any.
    pub content_disposition: Option<String>,
    pub bytes: Vec<u8>,
}

/// Operations the client needs from the remote case service.
#[async_trait]
pub trait CaseService: Send + Sync {
    /// `GET {base}/sites/{site}/cases`
    async fn list_cases(&self, site: &str) -> Result<Vec<Case>>;

    /// `GET {base}/cases/{id}`
    async fn get_case(&self, id: CaseId) -> Result<Case>;

    /// `POST {base}/cases/`
    async fn create_case(&self, request: &NewCase) -> Result<Case>;

    /// `PATCH {base}/cases/{id}`: edits name and variables, returns the updated case.
    async fn update_case(&self, id: CaseId, update: &CaseUpdate) -> Result<Case>;

    /// `POST {base}/cases/{id}/`: triggers a run and returns the updated case.
    async fn run_case(&self, id: CaseId) -> Result<Case>;

    /// `GET {base}/cases/{id}/download`
    async fn download_case(&self, id: CaseId) -> Result<CaseArchive>;

    /// `DELETE {base}/cases/{id}`
    async fn delete_case(&self, id: CaseId) -> Result<()>;
}

/// HTTP client for the case service.
pub struct HttpCaseService {
    client: Client,
    base_url: Url,
}

impl HttpCaseService {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| Error::InvalidUrl(format!("{base_url}: {e}")))?;
        if base_url.cannot_be_a_base() {
            return Err(Error::InvalidUrl(base_url.to_string()));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.api_url(), config.request_timeout())
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Base URL extended by `segments`, each one percent-encoded as a single
    /// path segment. An empty last segment yields a trailing slash.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn send(&self, req: RequestBuilder) -> Result<Response> {
        let response = req.send().await?;
        let status = response.status();
        cwlog_trace!("HTTP {} {}", status.as_u16(), response.url());
        if status.is_success() {
            return Ok(response);
        }
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                cwlog_trace!("HTTP {} body unreadable: {}", status.as_u16(), e);
                format!("<unreadable body: {e}>")
            }
        };
        Err(Error::Api { status, body })
    }

    async fn send_json<T: DeserializeOwned>(&self, req: RequestBuilder) -> Result<T> {
        Ok(self.send(req).await?.json().await?)
    }
}

#[async_trait]
impl CaseService for HttpCaseService {
    async fn list_cases(&self, site: &str) -> Result<Vec<Case>> {
        let url = self.endpoint(&["sites", site, "cases"])?;
        self.send_json(self.client.get(url)).await
    }

    async fn get_case(&self, id: CaseId) -> Result<Case> {
        let url = self.endpoint(&["cases", &id.to_string()])?;
        self.send_json(self.client.get(url)).await
    }

    async fn create_case(&self, request: &NewCase) -> Result<Case> {
        let url = self.endpoint(&["cases", ""])?;
        self.send_json(self.client.post(url).json(request)).await
    }

    async fn update_case(&self, id: CaseId, update: &CaseUpdate) -> Result<Case> {
        let url = self.endpoint(&["cases", &id.to_string()])?;
        self.send_json(self.client.patch(url).json(update)).await
    }

    async fn run_case(&self, id: CaseId) -> Result<Case> {
        let url = self.endpoint(&["cases", &id.to_string(), ""])?;
        self.send_json(self.client.post(url)).await
    }

    async fn download_case(&self, id: CaseId) -> Result<CaseArchive> {
        let url = self.endpoint(&["cases", &id.to_string(), "download"])?;
        let response = self.send(self.client.get(url)).await?;
        let content_disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = response.bytes().await?.to_vec();
        Ok(CaseArchive {
            content_disposition,
            bytes,
        })
    }

    async fn delete_case(&self, id: CaseId) -> Result<()> {
        let url = self.endpoint(&["cases", &id.to_string()])?;
        self.send(self.client.delete(url)).await?;
        Ok(())
    }
}
