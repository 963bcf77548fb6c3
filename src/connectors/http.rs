//! Shared HTTP plumbing for the collaborator clients
//!
//! Maps transport failures onto the engine's retry taxonomy: connect/timeout
//! errors and 5xx responses are transient, 4xx responses are permanent.

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use tracing::debug;

use crate::error::{EngineError, EngineResult};

/// Default per-request timeout
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Build the shared HTTP client used by a collaborator
pub fn build_client(service: &str) -> EngineResult<Client> {
    Client::builder()
        .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
        .build()
        .map_err(|e| EngineError::Internal {
            message: format!("Failed to build {} HTTP client: {}", service, e),
        })
}

/// Classify a reqwest transport error
pub fn classify_transport(service: &str, error: reqwest::Error) -> EngineError {
    if error.is_timeout() || error.is_connect() || error.is_request() {
        EngineError::transient(format!("{}: {}", service, error))
    } else {
        EngineError::permanent(format!("{}: {}", service, error))
    }
}

/// Classify a non-success HTTP status
pub fn classify_status(service: &str, status: StatusCode, body: &str) -> EngineError {
    let message = format!("{} returned {}: {}", service, status, body);
    if status.is_server_error() {
        EngineError::transient(message)
    } else {
        EngineError::permanent(message)
    }
}

/// GET a JSON resource
pub async fn get_json<T: DeserializeOwned>(
    client: &Client,
    service: &str,
    url: &str,
    api_key: &str,
) -> EngineResult<T> {
    debug!(service, url, "GET");
    let response = client
        .get(url)
        .header("api-key", api_key)
        .send()
        .await
        .map_err(|e| classify_transport(service, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(service, status, &body));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| EngineError::permanent(format!("{} response decode failed: {}", service, e)))
}

/// POST a JSON body, decode a JSON response
pub async fn post_json<B: Serialize, T: DeserializeOwned>(
    client: &Client,
    service: &str,
    url: &str,
    api_key: &str,
    body: &B,
) -> EngineResult<T> {
    debug!(service, url, "POST");
    let response = client
        .post(url)
        .header("api-key", api_key)
        .json(body)
        .send()
        .await
        .map_err(|e| classify_transport(service, e))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_status(service, status, &body));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| EngineError::permanent(format!("{} response decode failed: {}", service, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        let err = classify_status("mailer", StatusCode::BAD_GATEWAY, "upstream down");
        assert!(err.is_retryable());
    }

    #[test]
    fn client_errors_are_permanent() {
        let err = classify_status("chat", StatusCode::UNPROCESSABLE_ENTITY, "bad blocks");
        assert!(!err.is_retryable());
    }
}
