//! HTTP client wrapper for probing and streaming transfer units.
//!
//! This module provides the `HttpClient` struct which handles size probes and
//! streaming bodies with proper timeout configuration and error handling.

use std::pin::Pin;
use std::time::Duration;

use futures_util::TryStreamExt;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, ClientBuilder, Method};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::io::StreamReader;
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::user_agent;

/// HTTP client for probing and downloading media files.
///
/// This client is designed to be created once and reused for every unit of
/// every batch, taking advantage of connection pooling.
///
/// # Example
///
/// ```no_run
/// use playlist_downloader::download::HttpClient;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let client = HttpClient::new();
/// let size = client.probe_content_length("https://example.com/video.mp4").await?;
/// println!("size: {size:?}");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes without body progress
    /// - Gzip decompression: enabled
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        Self::try_new_with_timeouts(connect_timeout_secs, read_timeout_secs)
            .expect("failed to build HTTP client with static configuration")
    }

    /// Fallible variant of [`new_with_timeouts`](Self::new_with_timeouts).
    ///
    /// # Errors
    ///
    /// Returns the builder error if the TLS backend or resolver cannot be initialized.
    pub fn try_new_with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = base_client_builder(connect_timeout_secs, read_timeout_secs).build()?;
        Ok(Self { client })
    }

    /// Issues a metadata-only request and returns the announced content length.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the URL is invalid, the request fails, or the
    /// server answers with an error status.
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn probe_content_length(&self, url: &str) -> Result<Option<u64>, DownloadError> {
        validate_url(url)?;
        let response = self.send_request(Method::HEAD, url).await?;
        let length = header_content_length(&response);
        debug!(?length, "probed content length");
        Ok(length)
    }

    /// Issues a streaming GET and returns the body as a chunk reader.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` if the URL is invalid, the request fails, or the
    /// server answers with an error status.
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn open_stream(&self, url: &str) -> Result<StreamingBody, DownloadError> {
        validate_url(url)?;
        let response = self.send_request(Method::GET, url).await?;
        let content_length = header_content_length(&response);
        debug!(?content_length, "opened response stream");

        let stream = response.bytes_stream().map_err(std::io::Error::other);
        Ok(StreamingBody {
            url: url.to_string(),
            content_length,
            reader: Box::pin(StreamReader::new(stream)),
        })
    }

    async fn send_request(
        &self,
        method: Method,
        url: &str,
    ) -> Result<reqwest::Response, DownloadError> {
        let response = self
            .client
            .request(method, url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DownloadError::timeout(url)
                } else {
                    DownloadError::network(url, e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url, status.as_u16()));
        }

        Ok(response)
    }

    /// Returns a reference to the underlying reqwest client.
    ///
    /// This can be used for advanced operations not covered by this wrapper.
    #[must_use]
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// An open response body read in caller-sized chunks.
pub struct StreamingBody {
    url: String,
    content_length: Option<u64>,
    reader: Pin<Box<dyn AsyncRead + Send>>,
}

impl std::fmt::Debug for StreamingBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamingBody")
            .field("url", &self.url)
            .field("content_length", &self.content_length)
            .finish_non_exhaustive()
    }
}

impl StreamingBody {
    /// Content length announced by the server, if any.
    #[must_use]
    pub fn content_length(&self) -> Option<u64> {
        self.content_length
    }

    /// Fills `buf` from the body, returning fewer bytes only at end of body.
    ///
    /// # Errors
    ///
    /// Returns [`DownloadError::Stream`] if the connection fails mid-body.
    pub async fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize, DownloadError> {
        let mut filled = 0;
        while filled < buf.len() {
            let read = self
                .reader
                .read(&mut buf[filled..])
                .await
                .map_err(|e| DownloadError::stream(&self.url, e))?;
            if read == 0 {
                break;
            }
            filled += read;
        }
        Ok(filled)
    }
}

fn base_client_builder(connect_timeout_secs: u64, read_timeout_secs: u64) -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .read_timeout(Duration::from_secs(read_timeout_secs))
        .gzip(true)
        .user_agent(user_agent::default_download_user_agent())
}

fn validate_url(url: &str) -> Result<(), DownloadError> {
    Url::parse(url)
        .map(|_| ())
        .map_err(|_| DownloadError::invalid_url(url))
}

fn header_content_length(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_open_stream_reads_full_chunks_until_end() {
        let mock_server = MockServer::start().await;
        let body = vec![7u8; 10_000];

        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(body.clone()))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/video.mp4", mock_server.uri());
        let mut stream = client.open_stream(&url).await.unwrap();
        assert_eq!(stream.content_length(), Some(10_000));

        let mut buf = vec![0u8; 4096];
        let mut sizes = Vec::new();
        loop {
            let n = stream.read_chunk(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            sizes.push(n);
        }
        assert_eq!(sizes, vec![4096, 4096, 1808]);
    }

    #[tokio::test]
    async fn test_open_stream_maps_error_status() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/missing.mp4"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/missing.mp4", mock_server.uri());
        let result = client.open_stream(&url).await;

        match result {
            Err(DownloadError::HttpStatus { status, .. }) => assert_eq!(status, 404),
            other => panic!("Expected HttpStatus error, got: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_probe_rejects_invalid_url() {
        let client = HttpClient::new();
        let result = client.probe_content_length("not-a-valid-url").await;
        assert!(matches!(result, Err(DownloadError::InvalidUrl { .. })));
    }

    #[tokio::test]
    async fn test_probe_error_status_is_reported() {
        let mock_server = MockServer::start().await;

        Mock::given(method("HEAD"))
            .and(path("/gone.webm"))
            .respond_with(ResponseTemplate::new(410))
            .mount(&mock_server)
            .await;

        let client = HttpClient::new();
        let url = format!("{}/gone.webm", mock_server.uri());
        let result = client.probe_content_length(&url).await;
        assert!(matches!(
            result,
            Err(DownloadError::HttpStatus { status: 410, .. })
        ));
    }

    #[test]
    fn test_default_equivalent_to_new() {
        let client = HttpClient::default();
        drop(client.inner().clone());
    }
}
