//! HTTP artifact fetcher.

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::time::Duration;
use thirdparty_core::{Error, Result};
use tokio::fs::File;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::cache::DownloadCache;
use crate::provider::{ArtifactFetcher, FetchRequest, FetchedArtifact};

/// Settings for [`HttpFetcher`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpOptions {
    /// Whole-request timeout.
    pub timeout: Duration,
    /// Connect timeout.
    pub connect_timeout: Duration,
    /// Additional attempts after a network failure.
    pub retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
    /// User agent header.
    pub user_agent: String,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(thirdparty_core::config::DEFAULT_TIMEOUT_SECS),
            connect_timeout: Duration::from_secs(
                thirdparty_core::config::DEFAULT_CONNECT_TIMEOUT_SECS,
            ),
            retries: 0,
            retry_delay: Duration::from_secs(2),
            user_agent: format!("thirdparty/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Downloads archives over HTTP(S), streaming them to disk.
pub struct HttpFetcher {
    client: Client,
    options: HttpOptions,
    cache: Option<DownloadCache>,
}

impl HttpFetcher {
    /// Create a fetcher without download cache.
    pub fn new(options: HttpOptions) -> Result<Self> {
        let client = Client::builder()
            .user_agent(options.user_agent.clone())
            .timeout(options.timeout)
            .connect_timeout(options.connect_timeout)
            .build()
            .map_err(|e| {
                Error::configuration(format!("Failed to create HTTP client: {e}"))
            })?;
        Ok(Self {
            client,
            options,
            cache: None,
        })
    }

    /// Use a download cache for sources with a declared sha256.
    #[must_use]
    pub fn with_cache(mut self, cache: DownloadCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The fetcher's settings.
    #[must_use]
    pub const fn options(&self) -> &HttpOptions {
        &self.options
    }

    /// Download `url` to `dest`, retrying network failures.
    ///
    /// Returns the size and SHA256 of the downloaded file.
    async fn download(&self, url: &str, dest: &Path) -> Result<(u64, String)> {
        let attempts = self.options.retries.saturating_add(1);
        let mut attempt = 1;
        loop {
            match self.download_once(url, dest).await {
                Ok(done) => return Ok(done),
                Err(e) if e.is_network() && attempt < attempts => {
                    warn!(%url, attempt, attempts, error = %e, "Download failed, retrying");
                    tokio::time::sleep(self.options.retry_delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn download_once(&self, url: &str, dest: &Path) -> Result<(u64, String)> {
        let result = self.stream_to_file(url, dest).await;
        if result.is_err() {
            let _ = tokio::fs::remove_file(dest).await;
        }
        result
    }

    async fn stream_to_file(&self, url: &str, dest: &Path) -> Result<(u64, String)> {
        debug!(%url, "Sending request");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| Error::network(url, e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::network(
                url,
                format!(
                    "HTTP {} {}",
                    status.as_u16(),
                    status.canonical_reason().unwrap_or("Unknown error")
                ),
            ));
        }
        debug!(%url, content_length = ?response.content_length(), "Receiving body");

        let mut file = File::create(dest)
            .await
            .map_err(|e| Error::io(e, dest, "create"))?;
        let mut stream = response.bytes_stream();
        let mut hasher = Sha256::new();
        let mut size: u64 = 0;

        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| Error::network(url, format!("body read failed: {e}")))?;
            hasher.update(&chunk);
            file.write_all(&chunk)
                .await
                .map_err(|e| Error::io(e, dest, "write"))?;
            size += chunk.len() as u64;
        }
        file.flush().await.map_err(|e| Error::io(e, dest, "flush"))?;

        Ok((size, format!("{:x}", hasher.finalize())))
    }
}

#[async_trait]
impl ArtifactFetcher for HttpFetcher {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn fetch(&self, request: &FetchRequest<'_>, dest_dir: &Path) -> Result<FetchedArtifact> {
        let source = request.source;
        let file_name = source.file_name();
        let dest = dest_dir.join(file_name);
        tokio::fs::create_dir_all(dest_dir)
            .await
            .map_err(|e| Error::io(e, dest_dir, "create"))?;

        let cached = match (&self.cache, &source.sha256) {
            (Some(cache), Some(sha256)) => cache.get(sha256, file_name),
            _ => None,
        };
        if let Some(cached) = cached {
            let size = tokio::fs::copy(&cached, &dest)
                .await
                .map_err(|e| Error::io(e, &dest, "copy"))?;
            info!(platform = %request.platform, tool = request.tool, file = file_name, "Using cached download");
            return Ok(FetchedArtifact {
                path: dest,
                size,
                from_cache: true,
            });
        }

        info!(platform = %request.platform, tool = request.tool, url = %source.url, "Downloading");
        let (size, sha256) = self.download(&source.url, &dest).await?;
        debug!(file = file_name, size, %sha256, "Download complete");

        if let (Some(cache), Some(expected)) = (&self.cache, &source.sha256) {
            if expected.eq_ignore_ascii_case(&sha256) {
                if let Err(e) = cache.store(expected, file_name, &dest) {
                    warn!(file = file_name, error = %e, "Failed to store download in cache");
                }
            }
        }

        Ok(FetchedArtifact {
            path: dest,
            size,
            from_cache: false,
        })
    }
}
