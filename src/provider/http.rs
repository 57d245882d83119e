//! provider::http
//!
//! Response handling shared by the HTTP-backed providers.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use tracing::warn;

use super::traits::ProviderError;

/// User-Agent header value for API requests.
pub(crate) const USER_AGENT_VALUE: &str = concat!("redstring-pod/", env!("CARGO_PKG_VERSION"));

/// Error body shape shared by GitHub and Gitea.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

/// A client bounding every request by `timeout`.
///
/// If the TLS backend cannot build one, the default client is used and a
/// warning names the lost timeout.
pub(crate) fn client_with_timeout(timeout: Duration) -> Client {
    match Client::builder().timeout(timeout).build() {
        Ok(client) => client,
        Err(e) => {
            warn!(error = %e, ?timeout, "HTTP client build failed, requests are unbounded");
            Client::new()
        }
    }
}

/// Map a transport failure.
///
/// Timeouts and connection failures are transient.
pub(crate) fn network_error(err: reqwest::Error) -> ProviderError {
    ProviderError::Unavailable(err.to_string())
}

/// Decode a successful JSON response, or map the error status.
pub(crate) async fn handle_response<T>(response: Response, provider: &str) -> Result<T, ProviderError>
where
    T: for<'de> Deserialize<'de>,
{
    let status = response.status();
    if status.is_success() {
        response
            .json::<T>()
            .await
            .map_err(|e| ProviderError::Api {
                status: status.as_u16(),
                message: format!("failed to parse {} response: {}", provider, e),
            })
    } else {
        Err(error_from_response(response, provider).await)
    }
}

/// Map an unsuccessful response to a `ProviderError`.
///
/// `409` is reported as a conflict because both hosts use it for stale
/// branch tips. Callers that treat `422` as a conflict remap it themselves.
pub(crate) async fn error_from_response(response: Response, provider: &str) -> ProviderError {
    let status = response.status();
    let exhausted = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v == "0");

    let message = match response.json::<ErrorBody>().await {
        Ok(body) if !body.message.is_empty() => body.message,
        _ => "Unknown error".to_string(),
    };

    match status {
        StatusCode::UNAUTHORIZED => ProviderError::AuthFailed("invalid or expired token".into()),
        StatusCode::FORBIDDEN if exhausted => ProviderError::RateLimited,
        StatusCode::FORBIDDEN => ProviderError::AuthFailed(format!("permission denied: {}", message)),
        StatusCode::NOT_FOUND => ProviderError::NotFound(message),
        StatusCode::CONFLICT => ProviderError::Conflict(message),
        StatusCode::TOO_MANY_REQUESTS => ProviderError::RateLimited,
        _ if status.is_server_error() => ProviderError::Api {
            status: status.as_u16(),
            message: format!("{} server error: {}", provider, message),
        },
        _ => ProviderError::Api {
            status: status.as_u16(),
            message,
        },
    }
}

/// Percent-encode each segment of a repository path.
pub(crate) fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            segment
                .bytes()
                .map(|b| match b {
                    b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                        (b as char).to_string()
                    }
                    _ => format!("%{:02X}", b),
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("/")
}
