//! Outbound HTTP plumbing shared by the geocoder and the Sheets store.

mod basic;
mod client;
pub mod auth;

pub use basic::BasicClient;
pub use client::HttpClient;

use anyhow::Result;

/// Executes `req` and returns the body as text, failing on non-2xx statuses.
pub async fn fetch_text<C: HttpClient>(client: &C, req: reqwest::Request) -> Result<String> {
    let url = req.url().clone();
    let resp = client.execute(req).await?;

    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(anyhow::anyhow!("{url} returned status {status}: {body}"));
    }

    Ok(resp.text().await?)
}
