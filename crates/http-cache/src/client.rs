//! reqwest client whose responses go through the [`HttpCache`].

use bytes::Bytes;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::{FetchError, HttpCache, RequestSignature};

const USER_AGENT: &str = concat!("parcel-overlay/", env!("CARGO_PKG_VERSION"));

/// Outbound HTTP client with a read-through cache.
///
/// Only the request signature (method, URL, canonical params/body) decides
/// cache identity. Headers and credential params are sent upstream but never
/// affect the key.
#[derive(Clone)]
pub struct CachedClient {
    http: reqwest::Client,
    cache: Arc<HttpCache>,
}

impl CachedClient {
    pub fn new(cache: Arc<HttpCache>, timeout: Duration) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Transport {
                url: String::new(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;
        Ok(Self { http, cache })
    }

    pub fn cache(&self) -> &Arc<HttpCache> {
        &self.cache
    }

    pub async fn get<K, V>(&self, url: &str, params: &[(K, V)]) -> Result<Bytes, FetchError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        self.get_with_headers(url, params, &[]).await
    }

    #[instrument(skip(self, params, headers), fields(url = %url))]
    pub async fn get_with_headers<K, V>(
        &self,
        url: &str,
        params: &[(K, V)],
        headers: &[(&str, String)],
    ) -> Result<Bytes, FetchError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let signature = RequestSignature::get(url, params)?;
        let query: Vec<(&str, &str)> = params.iter().map(|(k, v)| (k.as_ref(), v.as_ref())).collect();
        let (http, query) = (&self.http, &query);

        self.cache
            .get_or_fetch(&signature, move || async move {
                let mut request = http.get(url).query(query);
                for (name, value) in headers {
                    request = request.header(*name, value.as_str());
                }
                send(request, url).await
            })
            .await
    }

    #[instrument(skip(self, body, headers), fields(url = %url))]
    pub async fn post_json(&self, url: &str, body: &Value, headers: &[(&str, String)]) -> Result<Bytes, FetchError> {
        let signature = RequestSignature::post_json(url, body)?;
        let http = &self.http;

        self.cache
            .get_or_fetch(&signature, move || async move {
                let mut request = http.post(url).json(body);
                for (name, value) in headers {
                    request = request.header(*name, value.as_str());
                }
                send(request, url).await
            })
            .await
    }
}

async fn send(request: reqwest::RequestBuilder, url: &str) -> Result<Bytes, FetchError> {
    let transport = |e: reqwest::Error| FetchError::Transport {
        url: url.to_string(),
        reason: if e.is_timeout() {
            "timed out".to_string()
        } else {
            e.to_string()
        },
    };

    let response = request.send().await.map_err(transport)?;
    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }

    let body = response.bytes().await.map_err(transport)?;
    debug!(status = status.as_u16(), bytes = body.len(), "Fetched upstream");
    Ok(body)
}
