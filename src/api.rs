//! One-shot request entry points.
//!
//! Each call builds a transport from the options, assembles the request,
//! follows redirects, and wraps the outcome. Assembly failures and the
//! redirect-limit sentinel come back as `Err`; failures after dispatch come
//! back as an `Ok` response carrying the error, so callers can use `?` or
//! inspect [`Response::error`] as they prefer.

use http::Method;

use crate::client;
use crate::errors::HttpError;
use crate::options::RequestOptions;
use crate::redirect::{self, RedirectPolicy};
use crate::request::build_request;
use crate::response::Response;

/// Runs the whole pipeline against an already-chosen transport.
pub(crate) async fn dispatch(
    transport: &reqwest::Client,
    method: Method,
    url: &str,
    mut options: RequestOptions,
) -> Result<Response, HttpError> {
    let body = std::mem::take(&mut options.body);
    let policy = RedirectPolicy::from_options(&options);
    let prepared = build_request(transport, method, url, &options, body)?;

    match redirect::send_with_redirects(transport, prepared, &policy).await {
        Err(HttpError::RedirectLimitExceeded) => Err(HttpError::RedirectLimitExceeded),
        outcome => Ok(Response::wrap(outcome)),
    }
}

/// Sends one request with `method`. See the verb wrappers below for the
/// common cases.
pub async fn request(
    method: Method,
    url: &str,
    options: RequestOptions,
) -> Result<Response, HttpError> {
    let transport = client::build_transport(&options)?;
    dispatch(&transport, method, url, options).await
}

pub async fn get(url: &str, options: RequestOptions) -> Result<Response, HttpError> {
    request(Method::GET, url, options).await
}

pub async fn post(url: &str, options: RequestOptions) -> Result<Response, HttpError> {
    request(Method::POST, url, options).await
}

pub async fn put(url: &str, options: RequestOptions) -> Result<Response, HttpError> {
    request(Method::PUT, url, options).await
}

pub async fn patch(url: &str, options: RequestOptions) -> Result<Response, HttpError> {
    request(Method::PATCH, url, options).await
}

pub async fn delete(url: &str, options: RequestOptions) -> Result<Response, HttpError> {
    request(Method::DELETE, url, options).await
}

pub async fn head(url: &str, options: RequestOptions) -> Result<Response, HttpError> {
    request(Method::HEAD, url, options).await
}

pub async fn options(url: &str, options: RequestOptions) -> Result<Response, HttpError> {
    request(Method::OPTIONS, url, options).await
}
