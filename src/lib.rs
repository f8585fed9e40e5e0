//! Declarative HTTP request construction and response handling on top of
//! reqwest.
//!
//! A [`RequestOptions`] bag goes in: query parameters, headers, auth,
//! cookies, transport knobs, and at most one body. A prepared request comes
//! out, redirects are followed under an explicit [`RedirectPolicy`], and the
//! result is wrapped in a [`Response`] that buffers its body lazily and
//! never panics, even when the request itself failed.
//!
//! ```no_run
//! use fetchkit::RequestOptions;
//!
//! # async fn run() -> Result<(), fetchkit::HttpError> {
//! let options = RequestOptions {
//!     params: [("q".to_string(), "crabs".to_string())].into_iter().collect(),
//!     ..Default::default()
//! };
//! let mut resp = fetchkit::get("https://example.com/search", options).await?;
//!
//! if resp.ok() {
//!     println!("{}", resp.text().await);
//! }
//! # Ok(())
//! # }
//! ```

mod api;
mod client;
pub mod errors;
pub mod options;
pub mod redirect;
mod request;
pub mod response;
pub mod session;

pub use api::{delete, get, head, options, patch, post, put, request};
pub use errors::HttpError;
pub use http::Method;
pub use options::{
    BeforeRequestHook, Body, Cookie, FileUpload, JsonPayload, RawBody, RequestOptions, XmlPayload,
};
pub use redirect::{default_sensitive_headers, RedirectPolicy, DEFAULT_REDIRECT_LIMIT};
pub use request::DEFAULT_USER_AGENT;
pub use response::{CharsetDecoder, Response};
pub use session::Session;
