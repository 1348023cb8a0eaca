//! HTTP transport seam
//!
//! Network URLs fetch through a [`Transport`]. The context keeps per-host
//! overrides and falls back to [`HttpTransport`], a blocking reqwest client.

use std::io::Read;
use std::time::Duration;

use url::Url;

use crate::credentials::Credentials;
use crate::error::{LocatorError, Result};

/// Body stream returned by a transport
pub type Body = Box<dyn Read + Send>;

/// Performs GET requests for network URLs
///
/// Implementations must report a missing resource (HTTP 404 or equivalent)
/// as [`LocatorError::NotFound`] and every other failure as
/// [`LocatorError::Transport`].
pub trait Transport: Send + Sync {
    fn get(&self, url: &Url, credentials: Option<&Credentials>) -> Result<Body>;
}

/// Default transport backed by `reqwest::blocking`
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    /// Create a transport whose requests time out after `timeout`
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("locator/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LocatorError::transport(e.to_string()))?;

        Ok(Self { client })
    }
}

impl Transport for HttpTransport {
    fn get(&self, url: &Url, credentials: Option<&Credentials>) -> Result<Body> {
        let mut request = self.client.get(url.clone());

        // reqwest drops the Authorization header on cross-host redirects
        if let Some(auth) = credentials.and_then(Credentials::auth_header) {
            request = request.header(reqwest::header::AUTHORIZATION, auth);
        }

        let response = request.send()?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::GONE {
            return Err(LocatorError::not_found(format!("URL not found: {}", url)));
        }
        if !status.is_success() {
            return Err(LocatorError::transport(format!(
                "GET {} failed: HTTP {}",
                url,
                status.as_u16()
            )));
        }

        Ok(Box::new(response))
    }
}
