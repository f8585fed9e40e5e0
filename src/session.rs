//! Cookie-persisting sessions.
//!
//! A [`Session`] owns one transport with a shared cookie jar and a baseline
//! set of [`RequestOptions`]. Every verb call merges its options over the
//! baseline (per-call values win, maps merge key by key) and goes through
//! the same pipeline as the one-shot functions, so cookies set by one
//! response ride along on the next request.

use std::sync::Arc;

use http::Method;
use reqwest::cookie::Jar;

use crate::api;
use crate::client;
use crate::errors::HttpError;
use crate::options::RequestOptions;
use crate::response::Response;

pub struct Session {
    baseline: RequestOptions,
    jar: Arc<Jar>,
    transport: reqwest::Client,
}

impl Session {
    /// Builds the shared transport once from `baseline`. Sessions always
    /// carry a cookie jar; that is what makes them sessions.
    pub fn new(mut baseline: RequestOptions) -> Result<Session, HttpError> {
        baseline.use_cookie_jar = true;
        let jar = Arc::new(Jar::default());
        let transport = build_session_client(&baseline, &jar)?;
        Ok(Session {
            baseline,
            jar,
            transport,
        })
    }

    /// Handle to the session's cookie jar, e.g. to seed cookies up front.
    pub fn cookie_jar(&self) -> Arc<Jar> {
        Arc::clone(&self.jar)
    }

    /// Drops pooled connections by rebuilding the transport around the same
    /// cookie jar. Cookies survive; idle sockets do not.
    pub fn close_idle_connections(&mut self) -> Result<(), HttpError> {
        self.transport = build_session_client(&self.baseline, &self.jar)?;
        Ok(())
    }

    pub async fn request(
        &self,
        method: Method,
        url: &str,
        per_call: RequestOptions,
    ) -> Result<Response, HttpError> {
        let merged = self.baseline.merge_over(per_call);
        api::dispatch(&self.transport, method, url, merged).await
    }

    pub async fn get(&self, url: &str, options: RequestOptions) -> Result<Response, HttpError> {
        self.request(Method::GET, url, options).await
    }

    pub async fn post(&self, url: &str, options: RequestOptions) -> Result<Response, HttpError> {
        self.request(Method::POST, url, options).await
    }

    pub async fn put(&self, url: &str, options: RequestOptions) -> Result<Response, HttpError> {
        self.request(Method::PUT, url, options).await
    }

    pub async fn patch(&self, url: &str, options: RequestOptions) -> Result<Response, HttpError> {
        self.request(Method::PATCH, url, options).await
    }

    pub async fn delete(&self, url: &str, options: RequestOptions) -> Result<Response, HttpError> {
        self.request(Method::DELETE, url, options).await
    }

    pub async fn head(&self, url: &str, options: RequestOptions) -> Result<Response, HttpError> {
        self.request(Method::HEAD, url, options).await
    }

    pub async fn options(&self, url: &str, options: RequestOptions) -> Result<Response, HttpError> {
        self.request(Method::OPTIONS, url, options).await
    }
}

/// A custom transport in the baseline wins; otherwise the knobs are applied
/// and the session jar is installed.
fn build_session_client(
    baseline: &RequestOptions,
    jar: &Arc<Jar>,
) -> Result<reqwest::Client, HttpError> {
    if let Some(transport) = &baseline.http_client {
        return Ok(transport.clone());
    }
    let builder =
        client::configure(baseline, reqwest::Client::builder())?.cookie_provider(Arc::clone(jar));
    Ok(builder.build()?)
}
