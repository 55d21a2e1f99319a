//! Thin async clients for the external services bookhound talks to.
//!
//! Each method is a direct request/response mapping; transient failures go
//! through a shared retry helper with exponential backoff.

pub mod abs;
pub mod google_books;
pub mod prowlarr;
pub mod qbittorrent;

use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("failed to parse response: {0}")]
    Parse(String),

    #[error("client not configured: {0}")]
    NotConfigured(String),
}

impl ClientError {
    /// Worth retrying? Connection problems, timeouts and 5xx responses are;
    /// auth and parse failures are not.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            ClientError::Api { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;

/// Run an async operation with exponential backoff on transient errors.
pub async fn with_retry<T, F, Fut>(what: &str, mut op: F) -> ClientResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ClientResult<T>>,
{
    let mut attempt = 0;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt + 1 < RETRY_ATTEMPTS => {
                let delay = RETRY_BASE_DELAY_MS * 2u64.pow(attempt);
                log::warn!("{} failed ({}), retrying in {}ms", what, err, delay);
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Shared HTTP client with the timeout and UA every integration uses.
pub fn build_http_client() -> ClientResult<reqwest::Client> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .cookie_store(true)
        .user_agent(concat!("bookhound/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}

/// Map a non-success response into `ClientError::Api` with the body text.
pub(crate) async fn error_for_status(response: reqwest::Response) -> ClientResult<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(ClientError::Api {
        status: status.as_u16(),
        message: truncate_message(&message),
    })
}

// Byte slicing would panic mid-character on non-ASCII bodies
fn truncate_message(message: &str) -> String {
    if message.len() > 200 {
        message.chars().take(200).collect()
    } else {
        message.to_string()
    }
}
