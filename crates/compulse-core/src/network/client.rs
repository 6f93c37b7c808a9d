use std::time::Duration;

use reqwest::{Client, Method, Proxy, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

use super::config::NetworkConfig;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{url} returned HTTP {status}")]
    Status { url: String, status: u16 },
    #[error("Timed out after {0:?}")]
    Timeout(Duration),
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),
    #[error("Unexpected response: {0}")]
    Parse(String),
    #[error("Source not configured: {0}")]
    NotConfigured(String),
    #[error("Not found: {0}")]
    Missing(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Gave up after {attempts} attempts: {last}")]
    SourceUnavailable {
        attempts: u32,
        #[source]
        last: Box<FetchError>,
    },
}

impl FetchError {
    /// Whether retrying the same request could plausibly succeed.
    ///
    /// Transport failures, timeouts, 5xx, 408 and 429 are transient. Client
    /// errors, bad responses and local file problems are not.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(e) => {
                if let Some(status) = e.status() {
                    return is_transient_status(status.as_u16());
                }
                !e.is_decode() && !e.is_builder() && !e.is_redirect()
            }
            Self::Status { status, .. } => is_transient_status(*status),
            Self::Timeout(_) => true,
            Self::InvalidUrl(_)
            | Self::UrlParse(_)
            | Self::Parse(_)
            | Self::NotConfigured(_)
            | Self::Missing(_)
            | Self::Io(_)
            | Self::Csv(_)
            | Self::SourceUnavailable { .. } => false,
        }
    }
}

const fn is_transient_status(status: u16) -> bool {
    status >= 500 || status == 408 || status == 429
}

pub type FetchResult<T> = Result<T, FetchError>;

/// Thin wrapper over a shared `reqwest::Client` with status and body
/// handling every source needs.
#[derive(Debug, Clone)]
pub struct HttpClient {
    config: NetworkConfig,
    inner: Client,
}

impl HttpClient {
    pub fn new(config: NetworkConfig) -> FetchResult<Self> {
        let inner = Self::build_client(&config)?;
        Ok(Self { config, inner })
    }

    fn build_client(config: &NetworkConfig) -> FetchResult<Client> {
        let mut builder = Client::builder()
            .connect_timeout(Duration::from_secs(u64::from(config.connect_timeout_seconds)))
            .timeout(Duration::from_secs(u64::from(config.request_timeout_seconds)))
            .danger_accept_invalid_certs(false);

        if let Some(ref ua) = config.user_agent {
            builder = builder.user_agent(ua);
        } else {
            builder = builder.user_agent(random_user_agent());
        }

        if let Some(ref proxy_url) = config.proxy_url {
            builder = builder.proxy(Proxy::all(proxy_url)?);
        }

        builder.build().map_err(FetchError::Http)
    }

    fn validate_request(url: &str) -> FetchResult<Url> {
        let parsed = Url::parse(url)?;

        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(FetchError::InvalidUrl(format!("unsupported scheme in {url}")));
        }
        if parsed.host_str().is_none() {
            return Err(FetchError::InvalidUrl("No host in URL".to_string()));
        }

        Ok(parsed)
    }

    pub fn request(&self, method: Method, url: &str) -> FetchResult<RequestBuilder> {
        let parsed = Self::validate_request(url)?;
        Ok(self.inner.request(method, parsed))
    }

    pub fn get(&self, url: &str) -> FetchResult<RequestBuilder> {
        self.request(Method::GET, url)
    }

    pub fn post(&self, url: &str) -> FetchResult<RequestBuilder> {
        self.request(Method::POST, url)
    }

    /// Send a request and return the body of a successful response.
    pub async fn send_text(&self, request: RequestBuilder) -> FetchResult<String> {
        let response = request.send().await?;
        let status = response.status();
        let url = response.url().to_string();

        if !status.is_success() {
            tracing::debug!("{} returned {}", url, status);
            return Err(FetchError::Status {
                url,
                status: status.as_u16(),
            });
        }

        Ok(response.text().await?)
    }

    /// Send a request and decode a successful JSON response.
    pub async fn send_json<T: DeserializeOwned>(&self, request: RequestBuilder) -> FetchResult<T> {
        let body = self.send_text(request).await?;
        serde_json::from_str(&body).map_err(|e| FetchError::Parse(e.to_string()))
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }
}

fn random_user_agent() -> String {
    use rand::Rng;

    let agents = [
        "Mozilla/5.0 (Windows NT 10.0; rv:128.0) Gecko/20100101 Firefox/128.0",
        "Mozilla/5.0 (Windows NT 10.0; rv:115.0) Gecko/20100101 Firefox/115.0",
        "Mozilla/5.0 (X11; Linux x86_64; rv:128.0) Gecko/20100101 Firefox/128.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:128.0) Gecko/20100101 Firefox/128.0",
    ];

    let mut rng = rand::rng();
    agents[rng.random_range(0..agents.len())].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_http_and_https() {
        assert!(HttpClient::validate_request("https://www.sec.gov/files/company_tickers.json").is_ok());
        assert!(HttpClient::validate_request("http://localhost:11434/api/generate").is_ok());
    }

    #[test]
    fn test_validate_rejects_invalid_url() {
        assert!(matches!(
            HttpClient::validate_request("not-a-url"),
            Err(FetchError::UrlParse(_))
        ));
    }

    #[test]
    fn test_validate_rejects_file_scheme() {
        assert!(matches!(
            HttpClient::validate_request("file:///etc/passwd"),
            Err(FetchError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_status_classification() {
        let status = |status| FetchError::Status {
            url: "https://example.com".into(),
            status,
        };

        assert!(status(500).is_transient());
        assert!(status(503).is_transient());
        assert!(status(429).is_transient());
        assert!(status(408).is_transient());
        assert!(!status(404).is_transient());
        assert!(!status(401).is_transient());
    }

    #[test]
    fn test_non_transient_errors() {
        assert!(FetchError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!FetchError::Parse("bad json".into()).is_transient());
        assert!(!FetchError::NotConfigured("jobs".into()).is_transient());
        let exhausted = FetchError::SourceUnavailable {
            attempts: 3,
            last: Box::new(FetchError::Timeout(Duration::from_secs(1))),
        };
        assert!(!exhausted.is_transient());
    }

    #[test]
    fn test_random_user_agent_is_valid() {
        let ua = random_user_agent();

        assert!(ua.contains("Mozilla"));
        assert!(ua.contains("Firefox"));
    }

    #[test]
    fn test_client_config_access() {
        let config = NetworkConfig {
            user_agent: Some("compulse-tests".into()),
            ..Default::default()
        };
        let client = HttpClient::new(config.clone()).unwrap();

        assert_eq!(client.config(), &config);
        assert!(client.get("https://example.com/").is_ok());
        assert!(client.get("ftp://example.com/").is_err());
    }
}
