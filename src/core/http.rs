use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT_ENCODING};
use reqwest::{Client, Response};
use tracing::debug;

use crate::core::error::{PackError, PackResult};

const APP_USER_AGENT: &str = "packsmith/0.1.0";

/// Additional attempts after the first failed GET. Only transient
/// failures (connect/timeout/5xx) are retried; GETs are idempotent.
const MAX_RETRIES: u32 = 2;

pub fn build_http_client() -> Result<Client, reqwest::Error> {
    let mut default_headers = HeaderMap::new();
    default_headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("identity"));

    Client::builder()
        .user_agent(APP_USER_AGENT)
        .default_headers(default_headers)
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(60))
        .build()
}

/// GET with a bounded retry budget.
///
/// Non-2xx statuses below 500 are returned to the caller as-is; each
/// component maps them into its own error variant.
pub async fn get_with_retry(client: &Client, url: &str) -> PackResult<Response> {
    let mut last_err: Option<PackError> = None;

    for attempt in 0..=MAX_RETRIES {
        if attempt > 0 {
            debug!("Retrying GET {} (attempt {}/{})", url, attempt + 1, MAX_RETRIES + 1);
        }

        match client.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                if status.is_server_error() {
                    last_err = Some(PackError::RegistryStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                    });
                    continue;
                }
                return Ok(response);
            }
            Err(e) if e.is_connect() || e.is_timeout() => {
                last_err = Some(e.into());
            }
            Err(e) => return Err(e.into()),
        }
    }

    Err(last_err.unwrap_or_else(|| PackError::RegistryStatus {
        url: url.to_string(),
        status: 0,
    }))
}
