use async_trait::async_trait;
use reqwest::{Request, Response};

/// Anything that can send a prepared [`Request`].
///
/// Wrappers such as [`crate::fetch::auth::ApiKey`] decorate an inner client.
/// Transport failures are `reqwest::Error`s inside the `anyhow::Error`, so
/// callers can still downcast to tell a timeout apart.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, req: Request) -> anyhow::Result<Response>;
}
