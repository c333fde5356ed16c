//! # Offline Net
//!
//! Request and response model for the offline worker, plus the network
//! collaborator it falls back to on a cache miss.
//!
//! ## Design Goals
//!
//! 1. **Host-agnostic**: the worker core only sees the [`Network`] trait
//! 2. **Cheap duplication**: response bodies are reference-counted so a
//!    response can be handed to a page and persisted without copying bytes
//! 3. **Single consumption**: reading a body consumes the [`Response`]

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use offline_common::OfflineError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use url::Url;

pub mod loader;

pub use loader::{HttpNetwork, LoaderConfig};

/// Errors that can occur in networking.
#[derive(Error, Debug)]
pub enum NetError {
    #[error("Request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Network unreachable: {0}")]
    Offline(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

impl From<NetError> for OfflineError {
    fn from(err: NetError) -> Self {
        OfflineError::network_with_source("fetch failed", err)
    }
}

/// What kind of resource the page asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Destination {
    /// Top-level or nested page navigation.
    Document,
    Image,
    Script,
    Style,
    Font,
    Manifest,
    /// `fetch()` / XHR with no specific destination.
    #[default]
    Empty,
    Other,
}

impl Destination {
    /// Whether this is a full-page navigation.
    pub fn is_document(&self) -> bool {
        matches!(self, Destination::Document)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Destination::Document => "document",
            Destination::Image => "image",
            Destination::Script => "script",
            Destination::Style => "style",
            Destination::Font => "font",
            Destination::Manifest => "manifest",
            Destination::Empty => "",
            Destination::Other => "other",
        }
    }
}

impl FromStr for Destination {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "document" | "iframe" | "frame" => Destination::Document,
            "image" => Destination::Image,
            "script" | "worker" | "sharedworker" => Destination::Script,
            "style" => Destination::Style,
            "font" => Destination::Font,
            "manifest" => Destination::Manifest,
            "" => Destination::Empty,
            _ => Destination::Other,
        })
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// HTTP request issued by a controlled page.
#[derive(Debug, Clone)]
pub struct Request {
    pub url: Url,
    pub method: Method,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    pub destination: Destination,
    pub referrer: Option<Url>,
}

impl Request {
    /// Create a GET request.
    pub fn get(url: Url) -> Self {
        Self {
            url,
            method: Method::GET,
            headers: HeaderMap::new(),
            body: None,
            destination: Destination::Empty,
            referrer: None,
        }
    }

    /// Create a page navigation (GET, document destination).
    pub fn navigate(url: Url) -> Self {
        Self::get(url).with_destination(Destination::Document)
    }

    /// Create a POST request.
    pub fn post(url: Url, body: Bytes) -> Self {
        Self {
            method: Method::POST,
            body: Some(body),
            ..Self::get(url)
        }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the destination.
    pub fn with_destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Set referrer.
    pub fn referrer(mut self, referrer: Url) -> Self {
        self.referrer = Some(referrer);
        self
    }

    /// Normalized identity used as the cache key.
    pub fn cache_key(&self) -> String {
        cache_key(&self.url)
    }
}

/// Normalized identity for a URL: the serialized URL without its fragment.
pub fn cache_key(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);
    url.into()
}

/// How the response relates to the requesting origin.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseType {
    /// Same-origin response, fully inspectable.
    #[default]
    Basic,
    /// Cross-origin response that passed CORS.
    Cors,
    /// Cross-origin response with hidden status and body.
    Opaque,
    /// Redirect returned with manual redirect mode.
    OpaqueRedirect,
    /// Network error.
    Error,
}

/// HTTP response.
///
/// The body is a reference-counted buffer. [`Response::duplicate`] hands out a
/// second handle to the same bytes; reading the body consumes the response.
#[derive(Debug)]
pub struct Response {
    pub url: Url,
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub response_type: ResponseType,
    pub redirected: bool,
    body: ResponseBody,
}

/// Response body variants.
#[derive(Debug)]
enum ResponseBody {
    /// Full body already loaded.
    Full(Bytes),
    /// Empty.
    Empty,
}

impl Response {
    /// Create a response with an empty body.
    pub fn new(url: Url, status: StatusCode) -> Self {
        Self {
            url,
            status,
            headers: HeaderMap::new(),
            response_type: ResponseType::Basic,
            redirected: false,
            body: ResponseBody::Empty,
        }
    }

    /// Attach a body.
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        let body = body.into();
        self.body = if body.is_empty() {
            ResponseBody::Empty
        } else {
            ResponseBody::Full(body)
        };
        self
    }

    /// Set the response type.
    pub fn with_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Add a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Check if request was successful (2xx).
    pub fn ok(&self) -> bool {
        self.status.is_success()
    }

    /// Body length in bytes.
    pub fn body_len(&self) -> usize {
        match &self.body {
            ResponseBody::Full(b) => b.len(),
            ResponseBody::Empty => 0,
        }
    }

    /// Second handle to this response sharing the same body buffer.
    pub fn duplicate(&self) -> Self {
        Self {
            url: self.url.clone(),
            status: self.status,
            headers: self.headers.clone(),
            response_type: self.response_type,
            redirected: self.redirected,
            body: match &self.body {
                ResponseBody::Full(b) => ResponseBody::Full(b.clone()),
                ResponseBody::Empty => ResponseBody::Empty,
            },
        }
    }

    /// Get the body as bytes.
    pub fn bytes(self) -> Bytes {
        match self.body {
            ResponseBody::Full(b) => b,
            ResponseBody::Empty => Bytes::new(),
        }
    }

    /// Get the body as text.
    pub fn text(self) -> Result<String, NetError> {
        let bytes = self.bytes();
        String::from_utf8(bytes.to_vec()).map_err(|e| NetError::RequestFailed(e.to_string()))
    }
}

/// Network collaborator used on cache misses and for precaching.
#[async_trait]
pub trait Network: Send + Sync {
    /// Issue the request. `Err` means the request never produced a response.
    async fn fetch(&self, request: &Request) -> Result<Response, NetError>;
}
