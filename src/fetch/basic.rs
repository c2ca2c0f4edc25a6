use super::client::HttpClient;
use async_trait::async_trait;
use std::time::Duration;

pub struct BasicClient(reqwest::Client);

impl BasicClient {
    /// A client with a whole-request timeout and a `User-Agent`, as the
    /// public geocoding endpoints require.
    pub fn new(user_agent: &str, timeout: Duration) -> anyhow::Result<Self> {
        let inner = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self(inner))
    }
}

#[async_trait]
impl HttpClient for BasicClient {
    async fn execute(&self, req: reqwest::Request) -> anyhow::Result<reqwest::Response> {
        Ok(self.0.execute(req).await?)
    }
}
