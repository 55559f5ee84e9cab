use std::time::Duration;

/// Per-request timeout for page fetches and downloads.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Configuration for the portal client
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub home_url: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            home_url: "https://live.warthunder.com/feed/all/".to_string(),
            user_agent: format!("mod-organizer/{}", env!("CARGO_PKG_VERSION")),
            timeout: REQUEST_TIMEOUT,
        }
    }
}
