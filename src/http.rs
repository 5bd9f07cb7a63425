use crate::config::ExportConfig;
use crate::media::fetcher::BROWSER_USER_AGENT;
use reqwest::Client;

/// Shared outbound client. Failing to build it is fatal for the whole service.
pub fn build_client(config: &ExportConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(BROWSER_USER_AGENT)
        .timeout(config.fetch_timeout)
        .connect_timeout(config.connect_timeout)
        .build()
}
