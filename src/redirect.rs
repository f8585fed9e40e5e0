//! Redirect policy and the hop-following send loop.
//!
//! The policy is a plain value built per request: hop limit, the set of
//! header names never forwarded to a redirect target, and the trusted
//! override. reqwest's built-in redirect hook cannot rewrite the next
//! request's headers, so clients are created with redirects off and
//! [`send_with_redirects`] drives the chain, consulting the policy before
//! every hop.

use std::collections::HashSet;

use http::header::{HeaderMap, LOCATION};
use http::Method;

use crate::errors::HttpError;
use crate::options::RequestOptions;

/// Hop limit used when the options leave `redirect_limit` unset.
pub const DEFAULT_REDIRECT_LIMIT: usize = 30;

/// Headers stripped when following a redirect, unless the target is trusted.
pub fn default_sensitive_headers() -> HashSet<String> {
    ["authorization", "www-authenticate", "proxy-authorization"]
        .iter()
        .map(|name| name.to_string())
        .collect()
}

/// Decision taken for one redirect response.
#[derive(Debug)]
pub(crate) enum RedirectFlow {
    /// Follow, sending exactly these headers.
    Follow(HeaderMap),
    /// Do not follow; hand the 3xx response back to the caller.
    Stop,
}

#[derive(Debug, Clone)]
pub struct RedirectPolicy {
    limit: usize,
    sensitive: HashSet<String>,
    location_trusted: bool,
}

impl RedirectPolicy {
    /// `limit` of zero means "never follow". Sensitive names are matched
    /// case-insensitively.
    pub fn new(limit: usize, sensitive: HashSet<String>, location_trusted: bool) -> Self {
        Self {
            limit,
            sensitive: sensitive
                .iter()
                .map(|name| name.to_ascii_lowercase())
                .collect(),
            location_trusted,
        }
    }

    pub fn from_options(options: &RequestOptions) -> Self {
        let limit = options.redirect_limit.unwrap_or(DEFAULT_REDIRECT_LIMIT);
        let sensitive = options
            .sensitive_headers
            .clone()
            .unwrap_or_else(default_sensitive_headers);
        Self::new(limit, sensitive, options.redirect_location_trusted)
    }

    /// `issued` counts the requests already sent in this chain, the initial
    /// one included. The returned headers are the first request's, minus
    /// the sensitive set.
    pub(crate) fn evaluate(
        &self,
        issued: usize,
        first_headers: &HeaderMap,
    ) -> Result<RedirectFlow, HttpError> {
        if self.limit == 0 {
            return Ok(RedirectFlow::Stop);
        }
        if issued >= self.limit {
            return Err(HttpError::RedirectLimitExceeded);
        }

        let mut headers = HeaderMap::new();
        for (name, value) in first_headers {
            if !self.location_trusted && self.sensitive.contains(name.as_str()) {
                continue;
            }
            headers.append(name.clone(), value.clone());
        }
        Ok(RedirectFlow::Follow(headers))
    }
}

/// Executes `request`, following redirects per `policy`. 301/302/303 turn
/// into GET without a body (HEAD stays HEAD); 307/308 replay the original
/// method and buffered body. A redirect limit violation aborts the whole
/// call with the sentinel error.
pub(crate) async fn send_with_redirects(
    client: &reqwest::Client,
    request: reqwest::Request,
    policy: &RedirectPolicy,
) -> Result<reqwest::Response, HttpError> {
    let first_headers = request.headers().clone();
    let timeout = request.timeout().copied();
    let mut current = request;
    let mut issued = 0usize;

    loop {
        let mut replay = current.try_clone();
        let method = current.method().clone();
        let response = client.execute(current).await?;
        issued += 1;

        let status = response.status();
        if !matches!(status.as_u16(), 301 | 302 | 303 | 307 | 308) {
            return Ok(response);
        }
        let Some(location) = response.headers().get(LOCATION) else {
            return Ok(response);
        };
        let location = location
            .to_str()
            .map_err(|e| HttpError::Header(format!("location: {e}")))?;
        let target = response.url().join(location)?;

        let headers = match policy.evaluate(issued, &first_headers)? {
            RedirectFlow::Follow(headers) => headers,
            RedirectFlow::Stop => return Ok(response),
        };

        log::debug!(
            "following {} redirect to {} (hop {})",
            status.as_u16(),
            target,
            issued
        );

        let replay_method_and_body = matches!(status.as_u16(), 307 | 308);
        let next_method = if replay_method_and_body {
            method
        } else if method == Method::HEAD {
            Method::HEAD
        } else {
            Method::GET
        };

        let mut next = reqwest::Request::new(next_method, target);
        *next.headers_mut() = headers;
        *next.timeout_mut() = timeout;
        if replay_method_and_body {
            if let Some(previous) = replay.as_mut() {
                *next.body_mut() = previous.body_mut().take();
            }
        }
        current = next;
    }
}
