use bytes::Bytes;
use futures::stream::BoxStream;
use futures::{StreamExt, TryStreamExt};
use reqwest::header::CONTENT_DISPOSITION;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use super::models::ClientConfig;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// A started download: response metadata plus the body as a chunk stream.
pub struct DownloadResponse {
    /// Url after redirects.
    pub final_url: String,
    pub content_disposition: Option<String>,
    pub total_size: Option<u64>,
    pub stream: BoxStream<'static, Result<Bytes>>,
}

#[derive(Clone)]
pub struct ApiClient {
    config: ClientConfig,
    http: Client,
}

impl ApiClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        // Timeouts apply per connect and per read so long downloads are not cut off.
        let http = Client::builder()
            .user_agent(config.user_agent.clone())
            .connect_timeout(config.timeout)
            .read_timeout(config.timeout)
            .build()?;

        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    async fn get(&self, url: &str) -> Result<reqwest::Response> {
        let response = self.http.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ApiError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }

    /// Fetch a portal page as HTML text
    pub async fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self.get(url).await?;
        let html = response.text().await?;
        debug!(url, bytes = html.len(), "fetched page");
        Ok(html)
    }

    /// Start a download and return its metadata with a body stream
    pub async fn download_file_stream(&self, url: &str) -> Result<DownloadResponse> {
        let response = self.get(url).await?;

        let final_url = response.url().to_string();
        let content_disposition = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_string);
        let total_size = response.content_length();

        debug!(
            url,
            final_url = %final_url,
            ?content_disposition,
            ?total_size,
            "download started"
        );

        let stream = response
            .bytes_stream()
            .map_err(ApiError::RequestError)
            .boxed();

        Ok(DownloadResponse {
            final_url,
            content_disposition,
            total_size,
            stream,
        })
    }
}
