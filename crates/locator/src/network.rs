//! HTTP(S) URLs

use std::fmt;
use std::sync::Arc;

use percent_encoding::percent_decode_str;

use crate::context::Context;
use crate::credentials::Credentials;
use crate::error::{LocatorError, Result};
use crate::format::get_format;
use crate::transport::Body;

/// An `http` or `https` resource
#[derive(Clone)]
pub struct NetworkUrl {
    url: url::Url,
    context: Arc<Context>,
}

impl fmt::Debug for NetworkUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("NetworkUrl").field(&self.url.as_str()).finish()
    }
}

impl NetworkUrl {
    /// Parse an absolute http(s) URL
    ///
    /// Userinfo is moved into the context's credential store for the host.
    pub fn parse(url: &str, context: &Arc<Context>) -> Result<Self> {
        let mut parsed =
            url::Url::parse(url).map_err(|e| LocatorError::parse(url, e.to_string()))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(LocatorError::UnsupportedScheme {
                scheme: parsed.scheme().to_string(),
                url: url.to_string(),
            });
        }
        if parsed.host_str().is_none() {
            return Err(LocatorError::parse(url, "missing host"));
        }

        if let Some(credentials) = take_userinfo(&mut parsed) {
            context.set_credentials(&host_key(&parsed), credentials);
        }

        Ok(Self {
            url: parsed,
            context: context.clone(),
        })
    }

    pub fn as_url(&self) -> &url::Url {
        &self.url
    }

    /// `host[:port]`, the key under which credentials and transports are looked up
    pub fn host(&self) -> String {
        host_key(&self.url)
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub fn key(&self) -> String {
        self.url.to_string()
    }

    pub fn format(&self) -> String {
        get_format(self.url.path())
    }

    pub fn origin(&self) -> Self {
        self.with_url(self.url.join("./").unwrap_or_else(|_| self.url.clone()))
    }

    pub fn relative(&self, path: &str) -> Self {
        let mut base = self.url.clone();
        if !base.path().ends_with('/') {
            let dir = format!("{}/", base.path());
            base.set_path(&dir);
        }
        base.set_query(None);
        base.set_fragment(None);

        match base.join(path) {
            Ok(joined) => self.with_url(joined),
            Err(e) => {
                tracing::warn!("cannot resolve {:?} against {}: {}", path, base, e);
                self.with_url(base)
            }
        }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// GET the resource through the host's transport, bypassing the cache
    pub fn fetch(&self) -> Result<Body> {
        let host = self.host();
        let transport = self.context.transport_for(&host)?;
        let credentials = self.context.credentials(&host);
        tracing::debug!("GET {}", self.url);
        transport.get(&self.url, credentials.as_ref())
    }

    fn with_url(&self, url: url::Url) -> Self {
        Self {
            url,
            context: self.context.clone(),
        }
    }
}

/// `host[:port]` of `url`
pub(crate) fn host_key(url: &url::Url) -> String {
    let host = url.host_str().unwrap_or_default();
    match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    }
}

/// Decode the `%XX` escapes of a userinfo component
pub(crate) fn decode_userinfo(component: &str) -> String {
    percent_decode_str(component).decode_utf8_lossy().into_owned()
}

/// Strip `user:password@` from `url`, returning it decoded
pub(crate) fn take_userinfo(url: &mut url::Url) -> Option<Credentials> {
    if url.username().is_empty() && url.password().is_none() {
        return None;
    }

    let credentials = Credentials::basic(
        decode_userinfo(url.username()),
        decode_userinfo(url.password().unwrap_or_default()),
    );

    // Only fails for cannot-be-a-base URLs, which carry no userinfo
    let _ = url.set_username("");
    let _ = url.set_password(None);
    Some(credentials)
}
