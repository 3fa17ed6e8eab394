//! Shared HTTP plumbing for the remote service clients.

use std::time::Duration;

use reqwest::{Client, Response};
use tracing::warn;

use crate::error::{Error, Result};

/// Build a client with a per-request timeout.
pub(crate) fn client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

/// Pass successful responses through; turn any other status into
/// [`Error::Api`] carrying the response body.
pub(crate) async fn check(service: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    warn!("{service} request failed: {status} - {body}");
    Err(Error::api(service, status.as_u16(), body))
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn join(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}
