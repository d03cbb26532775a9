//! 429 handling shared by the guardian and platform gateway clients

use reqwest::{header::RETRY_AFTER, RequestBuilder, Response, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};

use crate::types::{GuardianError, Result};

/// Longest pause between resubmits
pub const MAX_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Resubmits after a 429 before giving up
pub const MAX_RESUBMITS: u32 = 8;

/// Send the request built by `build`, resubmitting while the server
/// answers 429. Any other non-2xx status becomes [`GuardianError::Network`].
pub(crate) async fn send_with_backoff<F>(build: F) -> Result<Response>
where
    F: Fn() -> RequestBuilder,
{
    let mut attempt = 0;
    loop {
        let response = build().send().await?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            if attempt >= MAX_RESUBMITS {
                warn!(attempt, "Service still busy, giving up");
                return Err(GuardianError::Network(format!(
                    "service busy after {attempt} resubmits"
                )));
            }
            let delay = retry_delay(&response);
            debug!(attempt, delay_ms = delay.as_millis() as u64, "Service busy, resubmitting");
            tokio::time::sleep(delay).await;
            attempt += 1;
            continue;
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GuardianError::Network(format!("{status}: {body}")));
        }

        return Ok(response);
    }
}

fn retry_delay(response: &Response) -> Duration {
    response
        .headers()
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
        .unwrap_or(MAX_RETRY_DELAY)
        .min(MAX_RETRY_DELAY)
}
