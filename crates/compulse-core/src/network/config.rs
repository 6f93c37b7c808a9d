use serde::{Deserialize, Serialize};

/// HTTP client configuration shared by every external source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Connection timeout in seconds
    pub connect_timeout_seconds: u32,
    /// Request timeout in seconds
    pub request_timeout_seconds: u32,
    /// User agent to use (randomized by default). Sources that require a
    /// declared agent, such as the SEC, override it per request.
    pub user_agent: Option<String>,
    /// Optional proxy for all traffic (`http://`, `https://` or `socks5://`)
    pub proxy_url: Option<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            connect_timeout_seconds: 10,
            request_timeout_seconds: 30,
            user_agent: None,
            proxy_url: None,
        }
    }
}

impl NetworkConfig {
    pub fn validate(&self) -> Result<(), NetworkConfigError> {
        if self.connect_timeout_seconds == 0 || self.request_timeout_seconds == 0 {
            return Err(NetworkConfigError::ZeroTimeout);
        }
        if let Some(ref proxy) = self.proxy_url {
            let parsed = url::Url::parse(proxy)
                .map_err(|_| NetworkConfigError::InvalidProxy(proxy.clone()))?;
            if !matches!(parsed.scheme(), "http" | "https" | "socks5" | "socks5h") {
                return Err(NetworkConfigError::InvalidProxy(proxy.clone()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum NetworkConfigError {
    #[error("Timeouts must be greater than zero")]
    ZeroTimeout,
    #[error("Unsupported proxy URL: {0}")]
    InvalidProxy(String),
}
