use crate::api::responses::ApiErrorResponse;
use anyhow::{Result, anyhow};
use http::StatusCode;
use reqwest::{Client, Response, header::CONTENT_TYPE};
use serde::Serialize;
use std::time::Duration;
use tokio::time::sleep;

/// Statuses worth asking the API again
#[must_use]
pub const fn is_retryable(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::TOO_MANY_REQUESTS
            | StatusCode::INTERNAL_SERVER_ERROR
            | StatusCode::BAD_GATEWAY
            | StatusCode::SERVICE_UNAVAILABLE
            | StatusCode::GATEWAY_TIMEOUT
    )
}

/// Wait before retry number `retry` (one based)
#[must_use]
pub fn retry_backoff(backoff_unit: Duration, retry: u32) -> Duration {
    backoff_unit.saturating_mul(2u32.saturating_pow(retry.saturating_sub(1)))
}

/// POST `payload` as JSON, retrying transport errors and retryable statuses
/// up to `retries` times. The last response is returned whatever its status.
///
/// # Errors
///
/// Will return `Err` if the payload can not be serialized or the request can
/// not be sent after all the retries
pub async fn post_json<T: Serialize + ?Sized>(
    client: &Client,
    url: &str,
    payload: &T,
    timeout: Duration,
    retries: u32,
    backoff_unit: Duration,
) -> Result<Response> {
    let body = serde_json::to_vec(payload)?;

    let mut retry: u32 = 0;

    loop {
        let rs = client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .timeout(timeout)
            .body(body.clone())
            .send()
            .await;

        match rs {
            Ok(response) if retry < retries && is_retryable(response.status()) => {
                log::warn!("POST {url}: {}, retry {}/{retries}", response.status(), retry + 1);
            }

            Ok(response) => return Ok(response),

            Err(e) if retry < retries => {
                log::warn!("POST {url}: {e}, retry {}/{retries}", retry + 1);
            }

            Err(e) => return Err(e.into()),
        }

        retry += 1;

        sleep(retry_backoff(backoff_unit, retry)).await;
    }
}

/// Turn a non 2xx answer into an error carrying the status and the reason
/// given by the API, if any
///
/// # Errors
///
/// Will return `Err` if the status is not a success
pub async fn check_status(response: Response) -> Result<Response> {
    let status = response.status();

    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();

    let reason = serde_json::from_str::<ApiErrorResponse>(&body)
        .ok()
        .and_then(ApiErrorResponse::reason)
        .unwrap_or(body);

    if reason.is_empty() {
        Err(anyhow!("{status}"))
    } else {
        Err(anyhow!("{status}: {reason}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_retryable() {
        for status in [429, 500, 502, 503, 504] {
            assert!(is_retryable(StatusCode::from_u16(status).unwrap_or_default()));
        }

        for status in [200, 400, 401, 403, 404, 501] {
            assert!(!is_retryable(StatusCode::from_u16(status).unwrap_or_default()));
        }
    }

    #[test]
    fn test_retry_backoff() {
        let unit = Duration::from_secs(1);
        assert_eq!(retry_backoff(unit, 1), Duration::from_secs(1));
        assert_eq!(retry_backoff(unit, 2), Duration::from_secs(2));
        assert_eq!(retry_backoff(unit, 3), Duration::from_secs(4));
    }
}
