/*!
 * Terminal HTTP client used at the end of the plugin chain.
 *
 * `HttpClient` is the seam for the injected non-blocking client; the
 * default implementation wraps an async `reqwest::Client`. Connection
 * pooling, TLS and proxies are the client's business, not the transport's.
 *
 * Design decisions:
 * - **Whole-body reads**: the reply body is always read to the end, so the
 *   connection goes back to the client on every path.
 * - **Flattened headers**: multi-valued headers are joined with `", "`
 *   before the request goes out.
 * - **No decompression here**: compressed replies are handled by the
 *   decoder stage of the plugin chain.
 */
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};

use super::request::{OutgoingRequest, Reply};
use crate::error::Result;

/// Performs one HTTP exchange without blocking the calling task.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: OutgoingRequest) -> Result<Reply>;
}

/**
 * `HttpClient` backed by an async `reqwest::Client`.
 *
 * One instance is created per transport and shared by all dispatch tasks.
 */
pub struct ReqwestClient {
    http: reqwest::Client,
}

impl ReqwestClient {
    /**
     * Creates a client with the given timeouts.
     *
     * Returns `Err` only if reqwest fails to build the client (e.g. TLS
     * backend unavailable).
     */
    pub fn new(timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(connect_timeout)
            .build()?;
        Ok(Self { http })
    }

    pub fn from_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: OutgoingRequest) -> Result<Reply> {
        let response = self
            .http
            .request(request.method, request.url)
            .headers(flatten_headers(&request.headers))
            .body(request.body)
            .send()
            .await?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();

        Ok(Reply {
            status,
            headers,
            body,
        })
    }
}

/**
 * Collapses every multi-valued header into a single value joined by `", "`.
 * Values that are not valid UTF-8 are kept as the first raw value.
 */
pub fn flatten_headers(headers: &HeaderMap) -> HeaderMap {
    let mut flat = HeaderMap::with_capacity(headers.keys_len());

    for name in headers.keys() {
        let values: Vec<&HeaderValue> = headers.get_all(name).iter().collect();
        let joined = match values.as_slice() {
            [single] => Some((*single).clone()),
            many => {
                let parts: Option<Vec<&str>> = many.iter().map(|v| v.to_str().ok()).collect();
                parts
                    .and_then(|p| HeaderValue::from_str(&p.join(", ")).ok())
                    .or_else(|| many.first().map(|v| (*v).clone()))
            }
        };
        if let Some(value) = joined {
            flat.insert(name.clone(), value);
        }
    }

    flat
}
