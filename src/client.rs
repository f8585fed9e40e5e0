//! Transport construction from the transport-adjacent request options.
//!
//! Redirects are always disabled on the built client; hop-following lives in
//! [`crate::redirect`] where the policy can rewrite headers between hops.

use crate::errors::HttpError;
use crate::options::RequestOptions;

/// Returns the client this request should go through. A caller-supplied
/// `http_client` wins over every construction knob.
pub(crate) fn build_transport(options: &RequestOptions) -> Result<reqwest::Client, HttpError> {
    if let Some(client) = &options.http_client {
        return Ok(client.clone());
    }
    let builder = configure(options, reqwest::Client::builder())?;
    Ok(builder.build()?)
}

/// Applies the option knobs to `builder`. Split out so a session can add
/// its own cookie jar before building.
pub(crate) fn configure(
    options: &RequestOptions,
    mut builder: reqwest::ClientBuilder,
) -> Result<reqwest::ClientBuilder, HttpError> {
    builder = builder.redirect(reqwest::redirect::Policy::none());

    if options.insecure_skip_verify {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if options.disable_compression {
        builder = builder.no_gzip().no_brotli().no_deflate();
    }
    for (scheme, proxy_url) in &options.proxies {
        let proxy = match scheme.as_str() {
            "http" => reqwest::Proxy::http(proxy_url.as_str())?,
            "https" => reqwest::Proxy::https(proxy_url.as_str())?,
            other => {
                log::debug!("ignoring proxy for unsupported scheme {other}");
                continue;
            }
        };
        builder = builder.proxy(proxy);
    }
    if let Some(timeout) = options.connect_timeout {
        builder = builder.connect_timeout(timeout);
    }
    if let Some(interval) = options.tcp_keepalive {
        builder = builder.tcp_keepalive(interval);
    }
    if let Some(addr) = options.local_addr {
        builder = builder.local_address(addr);
    }
    if options.use_cookie_jar {
        builder = builder.cookie_store(true);
    }

    Ok(builder)
}
