//! reqwest-backed [`Network`] implementation.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::{debug, info, trace};

use crate::{NetError, Network, Request, Response, ResponseType, Url};

/// Resource loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// User agent string.
    pub user_agent: String,
    /// Accept-Language header.
    pub accept_language: String,
    /// Transport timeout for a single request.
    pub default_timeout: Duration,
    /// Maximum redirects.
    pub max_redirects: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            user_agent: format!("OfflineWorker/{}", env!("CARGO_PKG_VERSION")),
            accept_language: "en-US,en;q=0.9".to_string(),
            default_timeout: Duration::from_secs(30),
            max_redirects: 10,
        }
    }
}

/// Live network access for a worker scoped to one origin.
pub struct HttpNetwork {
    client: Client,
    config: LoaderConfig,
    origin: Url,
}

impl HttpNetwork {
    /// Create a loader whose responses are classified against `origin`.
    pub fn new(config: LoaderConfig, origin: Url) -> Result<Self, NetError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(config.default_timeout)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .build()
            .map_err(|e| NetError::RequestFailed(e.to_string()))?;

        info!(origin = %origin, "HttpNetwork initialized");

        Ok(Self {
            client,
            config,
            origin,
        })
    }

    /// Same-origin responses are `basic`, everything else is `cors`.
    fn classify(&self, final_url: &Url) -> ResponseType {
        if final_url.origin() == self.origin.origin() {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        }
    }
}

#[async_trait]
impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetError> {
        debug!(url = %request.url, method = %request.method, "Fetching resource");

        if !matches!(request.url.scheme(), "http" | "https") {
            return Err(NetError::InvalidUrl(request.url.to_string()));
        }

        let mut req_builder = self
            .client
            .request(request.method.clone(), request.url.clone());

        for (name, value) in request.headers.iter() {
            req_builder = req_builder.header(name, value);
        }

        req_builder = req_builder.header("Accept-Language", &self.config.accept_language);

        if let Some(ref referrer) = request.referrer {
            req_builder = req_builder.header("Referer", referrer.as_str());
        }

        if let Some(ref body) = request.body {
            req_builder = req_builder.body(body.clone());
        }

        let response = req_builder.send().await.map_err(|e| {
            if e.is_timeout() {
                NetError::Timeout(self.config.default_timeout)
            } else if e.is_connect() {
                NetError::Offline(request.url.to_string())
            } else {
                NetError::HttpError(e)
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let final_url = response.url().clone();
        let body = response.bytes().await?;

        trace!(
            url = %final_url,
            status = %status,
            body_len = body.len(),
            "Response received"
        );

        let mut out = Response::new(final_url.clone(), status)
            .with_type(self.classify(&final_url))
            .with_body(body);
        out.headers = headers;
        out.redirected = final_url != request.url;
        Ok(out)
    }
}
