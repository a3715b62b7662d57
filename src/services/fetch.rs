use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;

use crate::metrics::UPSTREAM_FETCHES;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("HTTP {status} from {url}")]
    Status {
        status: reqwest::StatusCode,
        url: String,
    },
    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },
}

/// Seam between the aggregation engine and the network.
///
/// Production uses [`HttpFetcher`]; tests substitute a stub with canned
/// bodies and call counting.
#[async_trait]
pub trait SourceFetch: Send + Sync {
    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError>;
    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError>;
}

/// Retrying reqwest-backed fetcher shared by every upstream.
///
/// Transport gzip is handled by the client; payload-level gzip (shard
/// documents named `*.xml.gz`) is left intact for the guide parser's
/// magic-byte sniff.
pub struct HttpFetcher {
    client: Client,
    max_retries: u32,
}

impl HttpFetcher {
    pub fn new(user_agent: &str, max_retries: u32) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .gzip(true)
            .build()?;
        Ok(Self {
            client,
            max_retries,
        })
    }

    async fn execute(&self, url: &str, timeout: Duration) -> Result<reqwest::Response, FetchError> {
        let host = host_of(url);
        let mut attempt = 0u32;
        loop {
            match self.client.get(url).timeout(timeout).send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status.is_success() {
                        UPSTREAM_FETCHES.with_label_values(&[&host, "ok"]).inc();
                        return Ok(resp);
                    }

                    let retryable = status == reqwest::StatusCode::TOO_MANY_REQUESTS
                        || status.is_server_error();
                    if retryable && attempt < self.max_retries {
                        let backoff_ms = (1u64 << attempt).saturating_mul(500).min(10_000);
                        tracing::warn!(
                            "fetch_retry" = attempt + 1,
                            "status" = status.as_u16(),
                            "backoff_ms" = backoff_ms,
                            "url" = url
                        );
                        sleep(Duration::from_millis(backoff_ms)).await;
                        attempt += 1;
                        continue;
                    }

                    UPSTREAM_FETCHES.with_label_values(&[&host, "error"]).inc();
                    return Err(FetchError::Status {
                        status,
                        url: url.to_string(),
                    });
                }
                Err(err) => {
                    if attempt < self.max_retries {
                        let backoff_ms = (1u64 << attempt).saturating_mul(500).min(10_000);
                        tracing::warn!(
                            "fetch_retry" = attempt + 1,
                            "reason" = "network",
                            "backoff_ms" = backoff_ms,
                            "url" = url
                        );
                        sleep(Duration::from_millis(backoff_ms)).await;
                        attempt += 1;
                        continue;
                    }

                    UPSTREAM_FETCHES.with_label_values(&[&host, "error"]).inc();
                    return Err(FetchError::Transport {
                        url: url.to_string(),
                        source: err,
                    });
                }
            }
        }
    }
}

#[async_trait]
impl SourceFetch for HttpFetcher {
    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let resp = self.execute(url, timeout).await?;
        resp.text().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })
    }

    async fn fetch_bytes(&self, url: &str, timeout: Duration) -> Result<Vec<u8>, FetchError> {
        let resp = self.execute(url, timeout).await?;
        let bytes = resp.bytes().await.map_err(|source| FetchError::Transport {
            url: url.to_string(),
            source,
        })?;
        Ok(bytes.to_vec())
    }
}

fn host_of(url: &str) -> String {
    url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(str::to_string))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Canned-response fetcher for deterministic tests: per-URL bodies or
/// failures, optional per-URL latency, and a call log for fetch-count
/// assertions.
#[cfg(test)]
#[derive(Default)]
pub struct StubFetch {
    bodies: std::sync::Mutex<std::collections::HashMap<String, Result<Vec<u8>, u16>>>,
    delays: std::sync::Mutex<std::collections::HashMap<String, Duration>>,
    calls: std::sync::Mutex<Vec<String>>,
}

#[cfg(test)]
impl StubFetch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_body(self, url: &str, body: impl Into<Vec<u8>>) -> Self {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), Ok(body.into()));
        self
    }

    pub fn with_status(self, url: &str, status: u16) -> Self {
        self.bodies
            .lock()
            .unwrap()
            .insert(url.to_string(), Err(status));
        self
    }

    pub fn with_delay(self, url: &str, delay: Duration) -> Self {
        self.delays.lock().unwrap().insert(url.to_string(), delay);
        self
    }

    pub fn calls_for(&self, url: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|u| *u == url).count()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[cfg(test)]
#[async_trait]
impl SourceFetch for StubFetch {
    async fn fetch_text(&self, url: &str, timeout: Duration) -> Result<String, FetchError> {
        let bytes = self.fetch_bytes(url, timeout).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    async fn fetch_bytes(&self, url: &str, _timeout: Duration) -> Result<Vec<u8>, FetchError> {
        self.calls.lock().unwrap().push(url.to_string());
        let delay = self.delays.lock().unwrap().get(url).copied();
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        let canned = self.bodies.lock().unwrap().get(url).cloned();
        match canned {
            Some(Ok(body)) => Ok(body),
            Some(Err(status)) => Err(FetchError::Status {
                status: reqwest::StatusCode::from_u16(status).unwrap(),
                url: url.to_string(),
            }),
            None => Err(FetchError::Status {
                status: reqwest::StatusCode::NOT_FOUND,
                url: url.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_extraction_for_metrics_labels() {
        assert_eq!(host_of("https://i.mjh.nz/au/Sydney/raw-tv.m3u8"), "i.mjh.nz");
        assert_eq!(host_of("not a url"), "unknown");
    }

    #[tokio::test]
    async fn test_stub_counts_calls_per_url() {
        let stub = StubFetch::new().with_body("http://a", "hello");
        let _ = stub.fetch_text("http://a", Duration::from_secs(1)).await;
        let _ = stub.fetch_text("http://a", Duration::from_secs(1)).await;
        let _ = stub.fetch_bytes("http://b", Duration::from_secs(1)).await;
        assert_eq!(stub.calls_for("http://a"), 2);
        assert_eq!(stub.calls_for("http://b"), 1);
        assert_eq!(stub.total_calls(), 3);
    }

    #[tokio::test]
    async fn test_stub_unknown_url_is_not_found() {
        let stub = StubFetch::new();
        let err = stub
            .fetch_bytes("http://missing", Duration::from_secs(1))
            .await
            .unwrap_err();
        match err {
            FetchError::Status { status, .. } => {
                assert_eq!(status, reqwest::StatusCode::NOT_FOUND)
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
