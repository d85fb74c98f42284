use anyhow::{Context, Result};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use reqwest::{StatusCode, Url};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Total timeout for one command round trip (seconds).
pub const REQUEST_TIMEOUT_SECS: u64 = 10;

/// Per-server failure surfaced to the user as a placeholder row.
///
/// The `Display` strings are the diagnostics; they start with `ERROR:` so a
/// placeholder row reads `SERVER - ERROR: ...`.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(
        "ERROR: API access refused! HTTP RC 401 - try to access the operations center at {base_url} with user '{user}' and validate that the REST API is enabled in the settings menu"
    )]
    AuthRefused { base_url: String, user: String },
    #[error("ERROR: Access denied! HTTP RC 403")]
    AccessDenied,
    #[error(
        "ERROR: Page not found! HTTP RC 404 - validate that the REST API is enabled and accessible at {base_url}"
    )]
    NotFound { base_url: String },
    // 500 covers bad command syntax, missing privileges and unmanaged server
    // names alike; the gateway gives us no way to tell them apart.
    #[error("ERROR: Problem with syntax of TSM command or TSM account privileges")]
    CommandRejected,
    #[error("ERROR: Incorrect request. Response: {status}")]
    Http { status: u16 },
    #[error("ERROR: Timeout exceeded: {timeout} secs. Is {address} reachable?")]
    Timeout { address: String, timeout: u64 },
    #[error("ERROR: Connection refused. Is {address} port {port} reachable?")]
    ConnectionRefused { address: String, port: u16 },
    #[error("ERROR: Request error: {reason}")]
    Request { reason: String },
    #[error("ERROR: Response body was not valid JSON: {reason}")]
    InvalidBody { reason: String },
}

/// Blocking client for the Operations Center REST gateway.
#[derive(Debug, Clone)]
pub struct OcClient {
    base_url: Url,
    http: Client,
    username: String,
    credentials: String,
}

impl OcClient {
    pub fn new(base_url: &str, username: &str, password: &str) -> Result<Self> {
        let mut normalized = base_url.to_string();
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        let base_url = Url::parse(&normalized).context("parsing Operations Center base URL")?;

        // The OC web server almost always runs a self-signed certificate;
        // verification is intentionally disabled.
        let http = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .connect_timeout(Duration::from_secs(5))
            .user_agent(HeaderValue::from_static("tsmctl/0.3"))
            .build()
            .context("building HTTP client")?;

        Ok(Self {
            base_url,
            http,
            username: username.to_string(),
            credentials: STANDARD.encode(format!("{username}:{password}")),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    /// Issues one administrative command against one server and returns the
    /// raw JSON envelope. One attempt, no retries.
    pub fn issue_command(&self, server: &str, command: &str) -> Result<Value, TransportError> {
        let url = self
            .base_url
            .join(&format!("api/cli/issueConfirmedCommand/{server}"))
            .map_err(|e| TransportError::Request {
                reason: e.to_string(),
            })?;

        let response = self
            .http
            .post(url)
            .header("OC-API-Version", HeaderValue::from_static("1.0"))
            .header(AUTHORIZATION, format!("Basic {}", self.credentials))
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .header(CONTENT_TYPE, HeaderValue::from_static("text/plain"))
            .body(command.to_string())
            .send()
            .map_err(|e| self.network_error(e))?;

        match response.status() {
            StatusCode::UNAUTHORIZED => Err(TransportError::AuthRefused {
                base_url: self.base_url.to_string(),
                user: self.username.clone(),
            }),
            StatusCode::FORBIDDEN => Err(TransportError::AccessDenied),
            StatusCode::NOT_FOUND => Err(TransportError::NotFound {
                base_url: self.base_url.to_string(),
            }),
            StatusCode::INTERNAL_SERVER_ERROR => Err(TransportError::CommandRejected),
            status if !status.is_success() => Err(TransportError::Http {
                status: status.as_u16(),
            }),
            _ => response.json().map_err(|e| TransportError::InvalidBody {
                reason: e.to_string(),
            }),
        }
    }

    fn network_error(&self, error: reqwest::Error) -> TransportError {
        let address = self.base_url.host_str().unwrap_or_default().to_string();
        if error.is_timeout() {
            TransportError::Timeout {
                address,
                timeout: REQUEST_TIMEOUT_SECS,
            }
        } else if error.is_connect() {
            TransportError::ConnectionRefused {
                address,
                port: self.base_url.port_or_known_default().unwrap_or(0),
            }
        } else {
            TransportError::Request {
                reason: error.to_string(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::Engine as _;
    use httpmock::prelude::*;
    use serde_json::json;

    fn oc_url(server: &MockServer) -> String {
        format!("{}/oc", server.base_url())
    }

    #[test]
    fn sends_command_with_oc_headers_and_basic_auth() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/oc/api/cli/issueConfirmedCommand/tsm01")
                .header("OC-API-Version", "1.0")
                .header(
                    "Authorization",
                    format!("Basic {}", STANDARD.encode("admin:secret")),
                )
                .body("query session");
            then.status(200).json_body(json!([[{"msg": {"n": "2034"}}]]));
        });

        let client = OcClient::new(&oc_url(&server), "admin", "secret").unwrap();
        let envelope = client.issue_command("tsm01", "query session").unwrap();

        mock.assert();
        assert_eq!(envelope, json!([[{"msg": {"n": "2034"}}]]));
    }

    #[test]
    fn maps_statuses_to_distinct_diagnostics() {
        let server = MockServer::start();
        for (status, needle) in [
            (401, "HTTP RC 401"),
            (403, "HTTP RC 403"),
            (404, "HTTP RC 404"),
            (500, "syntax of TSM command or TSM account privileges"),
            (503, "Response: 503"),
        ] {
            let mut mock = server.mock(|when, then| {
                when.method(POST)
                    .path("/oc/api/cli/issueConfirmedCommand/tsm01");
                then.status(status);
            });
            let client = OcClient::new(&oc_url(&server), "admin", "secret").unwrap();
            let err = client.issue_command("tsm01", "query node").unwrap_err();
            assert!(
                err.to_string().contains(needle),
                "status {status}: got {err}"
            );
            mock.delete();
        }
    }

    #[test]
    fn reports_unreachable_gateway_as_network_error() {
        // Nothing listens on port 1.
        let client = OcClient::new("http://127.0.0.1:1/oc", "admin", "secret").unwrap();
        let err = client.issue_command("tsm01", "query node").unwrap_err();
        assert!(err.to_string().starts_with("ERROR:"), "got {err}");
    }

    #[test]
    fn rejects_non_json_body() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/oc/api/cli/issueConfirmedCommand/tsm01");
            then.status(200).body("<html>login page</html>");
        });
        let client = OcClient::new(&oc_url(&server), "admin", "secret").unwrap();
        let err = client.issue_command("tsm01", "query node").unwrap_err();
        assert!(matches!(err, TransportError::InvalidBody { .. }));
    }
}
