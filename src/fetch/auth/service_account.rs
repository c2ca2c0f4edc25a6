use crate::fetch::client::HttpClient;
use anyhow::{Context, Result};
use async_trait::async_trait;
use gcp_auth::{CustomServiceAccount, TokenProvider};
use reqwest::header::{AUTHORIZATION, HeaderValue};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Read/write access to spreadsheets.
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Hands out a currently valid OAuth access token.
#[async_trait]
pub trait TokenSource: Send + Sync {
    async fn access_token(&self) -> Result<String>;
}

/// Tokens minted from a Google service-account key.
///
/// `gcp_auth` caches the token and exchanges a fresh signed JWT once it
/// expires, so calling [`TokenSource::access_token`] per request is cheap.
pub struct ServiceAccount {
    provider: CustomServiceAccount,
    scopes: Vec<&'static str>,
}

impl ServiceAccount {
    /// From the JSON key Google issues for the account.
    pub fn from_json(key: &str, scopes: &[&'static str]) -> Result<Self> {
        let provider =
            CustomServiceAccount::from_json(key).context("invalid service account key JSON")?;
        Ok(Self {
            provider,
            scopes: scopes.to_vec(),
        })
    }

    pub fn from_file(path: &Path, scopes: &[&'static str]) -> Result<Self> {
        let provider = CustomServiceAccount::from_file(path)
            .with_context(|| format!("failed to load service account key {}", path.display()))?;
        Ok(Self {
            provider,
            scopes: scopes.to_vec(),
        })
    }
}

#[async_trait]
impl TokenSource for ServiceAccount {
    async fn access_token(&self) -> Result<String> {
        let token = self
            .provider
            .token(&self.scopes)
            .await
            .context("service account token exchange failed")?;
        Ok(token.as_str().to_string())
    }
}

/// An [`HttpClient`] wrapper that asks a [`TokenSource`] for a bearer token
/// on every request, so long-running processes survive token expiry.
pub struct Bearer<C> {
    inner: C,
    tokens: Arc<dyn TokenSource>,
}

impl<C> Bearer<C> {
    pub fn new(inner: C, tokens: Arc<dyn TokenSource>) -> Self {
        Self { inner, tokens }
    }
}

#[async_trait]
impl<C: HttpClient> HttpClient for Bearer<C> {
    async fn execute(&self, mut req: reqwest::Request) -> Result<reqwest::Response> {
        let token = self.tokens.access_token().await?;
        let mut value = HeaderValue::from_str(&format!("Bearer {token}"))
            .context("access token is not a valid header value")?;
        value.set_sensitive(true);
        req.headers_mut().insert(AUTHORIZATION, value);
        debug!(url = %req.url(), "Sending authorized request");
        self.inner.execute(req).await
    }
}
