use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("invalid image url {url}: {reason}")]
    InvalidUrl { url: String, reason: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("image body too large: {size} bytes, max {max}")]
    TooLarge { size: u64, max: u64 },
}

/// Loads raw image bytes for a candidate URL.
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError>;
    fn name(&self) -> &'static str;
}

/// Direct HTTP loader with an optional same-origin proxy used when the
/// direct load fails (hosts that refuse cross-origin or hotlinked requests).
pub struct HttpImageFetcher {
    client: reqwest::Client,
    proxy_base: Option<Url>,
    token: Option<String>,
    max_bytes: u64,
}

impl HttpImageFetcher {
    pub fn new(timeout: Duration, max_bytes: u64) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, proxy_base: None, token: None, max_bytes })
    }

    pub fn with_proxy(mut self, base_url: &str, token: Option<String>) -> Result<Self, FetchError> {
        let base = Url::parse(base_url).map_err(|e| FetchError::InvalidUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        self.proxy_base = Some(base);
        self.token = token;
        Ok(self)
    }

    pub fn proxy_url(&self, target: &str) -> Option<Url> {
        let base = self.proxy_base.as_ref()?;
        let mut u = base.join("/api/proxy-image").ok()?;
        u.query_pairs_mut().append_pair("url", target);
        Some(u)
    }

    async fn get(&self, url: &str, bearer: bool) -> Result<Bytes, FetchError> {
        let mut req = self.client.get(url);
        if bearer {
            if let Some(tok) = &self.token {
                req = req.bearer_auth(tok);
            }
        }
        let resp = req.send().await?.error_for_status()?;
        if let Some(len) = resp.content_length() {
            if len > self.max_bytes {
                return Err(FetchError::TooLarge { size: len, max: self.max_bytes });
            }
        }
        let body = resp.bytes().await?;
        if body.len() as u64 > self.max_bytes {
            return Err(FetchError::TooLarge { size: body.len() as u64, max: self.max_bytes });
        }
        Ok(body)
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    fn name(&self) -> &'static str { "http" }

    async fn fetch(&self, url: &str) -> Result<Bytes, FetchError> {
        match self.get(url, false).await {
            Ok(b) => Ok(b),
            Err(direct_err) => {
                let Some(proxied) = self.proxy_url(url) else {
                    return Err(direct_err);
                };
                tracing::debug!(%url, error = %direct_err, "direct image load failed, retrying through proxy");
                self.get(proxied.as_str(), true).await
            }
        }
    }
}
