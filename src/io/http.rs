use async_trait::async_trait;
use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, HeaderMap, RANGE};
use reqwest::{Client, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

use super::ReadAt;
use anyhow::{Context, Result, anyhow, bail};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_RETRY: u32 = 10;
const RETRY_STEP: Duration = Duration::from_millis(500);

/// Inclusive last byte and byte count of a read of `len` bytes at
/// `offset`, clamped to an object of `size` bytes. `None` when nothing
/// can be read.
fn clamp_range(offset: u64, len: usize, size: u64) -> Option<(u64, usize)> {
    if len == 0 || offset >= size {
        return None;
    }
    let end = offset.saturating_add(len as u64 - 1).min(size - 1);
    Some((end, (end - offset + 1) as usize))
}

fn range_header(start: u64, end: u64) -> String {
    format!("bytes={start}-{end}")
}

/// Linear backoff before retry number `attempt`.
fn retry_delay(attempt: u32) -> Duration {
    RETRY_STEP * attempt
}

fn accepts_byte_ranges(headers: &HeaderMap) -> bool {
    headers
        .get(ACCEPT_RANGES)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("bytes"))
}

fn content_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|s| s.parse().ok())
}

/// Archive served by a remote HTTP server, read through Range requests.
///
/// Only the central directory is fetched at mount time; member data is
/// requested lazily as entry streams are read.
pub struct HttpRangeReader {
    client: Client,
    url: String,
    size: u64,
    transferred_bytes: AtomicU64,
    max_retry: u32,
}

impl HttpRangeReader {
    /// Create a new HTTP Range reader
    ///
    /// This will send a HEAD request to verify Range support and get file size
    pub async fn new(url: String) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;

        let resp = client
            .head(&url)
            .send()
            .await
            .with_context(|| format!("HEAD {url}"))?;

        if !resp.status().is_success() {
            bail!("HTTP request failed with status: {}", resp.status());
        }

        if !accepts_byte_ranges(resp.headers()) {
            bail!("Remote server does not support Range requests");
        }

        let size = content_length(resp.headers())
            .ok_or_else(|| anyhow!("Remote server did not return Content-Length"))?;

        debug!(url = %url, size, "remote archive supports range requests");

        Ok(Self {
            client,
            url,
            size,
            transferred_bytes: AtomicU64::new(0),
            max_retry: MAX_RETRY,
        })
    }

    /// Get total bytes transferred from network
    pub fn transferred_bytes(&self) -> u64 {
        self.transferred_bytes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl ReadAt for HttpRangeReader {
    async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let Some((end, expected_size)) = clamp_range(offset, buf.len(), self.size) else {
            return Ok(0);
        };

        let mut received = 0;
        let mut retry_count = 0;

        while received < expected_size {
            let range = range_header(offset + received as u64, end);

            match self
                .client
                .get(&self.url)
                .header(RANGE, &range)
                .send()
                .await
            {
                Ok(resp) => {
                    if resp.status() != StatusCode::PARTIAL_CONTENT {
                        bail!("HTTP request failed with status: {}", resp.status());
                    }

                    let bytes = resp.bytes().await?;
                    if bytes.is_empty() {
                        bail!("Server returned an empty body for range {range}");
                    }
                    let chunk_len = bytes.len().min(expected_size - received);
                    buf[received..received + chunk_len].copy_from_slice(&bytes[..chunk_len]);
                    received += chunk_len;

                    self.transferred_bytes
                        .fetch_add(chunk_len as u64, Ordering::Relaxed);
                }
                Err(e) if e.is_timeout() || e.is_connect() => {
                    retry_count += 1;
                    if retry_count >= self.max_retry {
                        bail!("Max retries exceeded for range {range}");
                    }
                    warn!(
                        retry = retry_count,
                        max = self.max_retry,
                        error = %e,
                        "connection error, retrying"
                    );
                    tokio::time::sleep(retry_delay(retry_count)).await;
                }
                Err(e) => return Err(e.into()),
            }
        }

        Ok(received)
    }

    fn size(&self) -> u64 {
        self.size
    }
}
