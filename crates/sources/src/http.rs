use kassa_core::Source;
use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::error::SourceError;

const USER_AGENT: &str = concat!("kassa/", env!("CARGO_PKG_VERSION"));

/// Longest slice of a response body kept in error messages.
const BODY_SNIPPET: usize = 500;

pub fn client(timeout_secs: u64) -> Result<reqwest::Client, SourceError> {
    Ok(reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

/// Sends `req` and decodes a JSON body, mapping non-2xx statuses and decode
/// failures to distinct errors.
pub async fn send_json<T: DeserializeOwned>(
    req: RequestBuilder,
    feed: Source,
) -> Result<T, SourceError> {
    let resp = req.send().await?;
    let status = resp.status();
    let body = resp.text().await?;

    if !status.is_success() {
        return Err(SourceError::Status {
            feed,
            status: status.as_u16(),
            body: snippet(&body),
        });
    }

    tracing::trace!(%feed, body = %snippet(&body), "Raw response");
    serde_json::from_str(&body).map_err(|err| {
        tracing::error!(%feed, "Undecodable response: {}", snippet(&body));
        SourceError::Decode { feed, err }
    })
}

pub fn snippet(body: &str) -> String {
    match body.char_indices().nth(BODY_SNIPPET) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
