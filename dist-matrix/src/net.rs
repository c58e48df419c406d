//! Centralized logic for initializing http clients to
//! ensure uniform configuration.

use std::time::Duration;

use crate::errors::DistResult;

/// Settings for http clients
///
/// Any settings that should apply to all http requests should
/// be stored here, to avoid different configurations.
#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// Sent as the User-Agent of every request
    pub user_agent: String,
    /// Limit on any single request (uploads can be big, so be generous)
    pub timeout: Duration,
}

impl ClientSettings {
    /// Create new ClientSettings using all necessary values
    pub fn new() -> Self {
        Self::default()
    }
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            user_agent: format!("dist-matrix/{}", env!("CARGO_PKG_VERSION")),
            timeout: Duration::from_secs(60 * 3),
        }
    }
}

/// Create a reqwest client
///
/// Ideally this should be called only once and reused!
pub fn create_reqwest_client(settings: &ClientSettings) -> DistResult<reqwest::Client> {
    let client = reqwest::Client::builder()
        .user_agent(settings.user_agent.clone())
        .timeout(settings.timeout)
        .build()?;
    Ok(client)
}
