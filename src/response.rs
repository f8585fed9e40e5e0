//! Response wrapper with lazy, single-consumption body buffering.
//!
//! A [`Response`] wraps either a transport response or the error that
//! prevented one; metadata (status, headers, final URL) is captured eagerly
//! and the body stays on the wire until something asks for it.
//!
//! ## Notes
//! - [`Response::bytes`] and [`Response::text`] drain the stream once and
//!   answer from the buffer afterwards.
//! - [`Response::json`], [`Response::xml`] and
//!   [`Response::download_to_file`] consume the body: whichever of them runs
//!   first gets the bytes, later calls see an already-consumed body.
//! - Every method is safe on a failed response; consumers return empty
//!   values or the stored error, never panic.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::HeaderMap;
use serde::de::DeserializeOwned;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::errors::HttpError;

/// Converts a body in `charset` to UTF-8 bytes. Plugged into
/// [`Response::xml`] for feeds that are not UTF-8 encoded.
pub type CharsetDecoder = fn(charset: &str, input: &[u8]) -> Result<Vec<u8>, HttpError>;

/// Body consumption states. `Live` holds the untouched network stream;
/// `Buffered` the fully drained bytes; `Spent` is what remains after a
/// consuming call, a clear, or a failed request.
#[derive(Debug)]
enum BodyState {
    Live(reqwest::Response),
    Buffered(Bytes),
    Spent,
}

#[derive(Debug)]
pub struct Response {
    status_code: u16,
    ok: bool,
    url: Option<Url>,
    headers: HeaderMap,
    error: Option<Arc<HttpError>>,
    state: BodyState,
}

impl Response {
    /// Wraps the outcome of a transport call. An `Err` yields a response
    /// with `ok() == false`, status 0, and the error stored for every later
    /// consumer to report.
    pub fn wrap(outcome: Result<reqwest::Response, HttpError>) -> Response {
        match outcome {
            Ok(raw) => Self::from_raw(raw),
            Err(error) => Self::from_error(error),
        }
    }

    pub(crate) fn from_raw(raw: reqwest::Response) -> Response {
        let status = raw.status();
        Response {
            status_code: status.as_u16(),
            ok: status.is_success(),
            url: Some(raw.url().clone()),
            headers: raw.headers().clone(),
            error: None,
            state: BodyState::Live(raw),
        }
    }

    pub(crate) fn from_error(error: HttpError) -> Response {
        Response {
            status_code: 0,
            ok: false,
            url: None,
            headers: HeaderMap::new(),
            error: Some(Arc::new(error)),
            state: BodyState::Spent,
        }
    }

    /// True when a response arrived with a 2xx status.
    pub fn ok(&self) -> bool {
        self.ok
    }

    /// Numeric status code; 0 when the request never produced a response.
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// Final URL after redirects.
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The error that prevented this response, if any.
    pub fn error(&self) -> Option<&HttpError> {
        self.error.as_deref()
    }

    fn stored_error(&self) -> Option<HttpError> {
        self.error.as_ref().map(|e| HttpError::Failed(Arc::clone(e)))
    }

    /// Body bytes, drained from the network on first use and cached. `None`
    /// for failed responses, empty bodies, and bodies consumed elsewhere.
    pub async fn bytes(&mut self) -> Option<Bytes> {
        self.fill_buffer().await;
        match &self.state {
            BodyState::Buffered(bytes) if !bytes.is_empty() => Some(bytes.clone()),
            _ => None,
        }
    }

    /// Body text, UTF-8 lossy. Empty under the same conditions as
    /// [`Response::bytes`].
    pub async fn text(&mut self) -> String {
        match self.bytes().await {
            Some(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            None => String::new(),
        }
    }

    /// Decodes the body as JSON into `T`. Consumes the body.
    pub async fn json<T: DeserializeOwned>(&mut self) -> Result<T, HttpError> {
        let bytes = self.take_for_decode().await?;
        serde_json::from_slice(&bytes).map_err(|e| HttpError::Decode(e.to_string()))
    }

    /// Decodes the body as XML into `T`. Consumes the body. When the
    /// Content-Type names a charset outside the UTF-8 family, `decoder`
    /// (if given) converts the raw bytes first.
    pub async fn xml<T: DeserializeOwned>(
        &mut self,
        decoder: Option<CharsetDecoder>,
    ) -> Result<T, HttpError> {
        let bytes = self.take_for_decode().await?;
        let converted = match (decoder, charset(&self.headers)) {
            (Some(decode), Some(cs)) if !is_utf8(&cs) => decode(&cs, &bytes)?,
            _ => bytes.to_vec(),
        };
        let text = String::from_utf8_lossy(&converted);
        quick_xml::de::from_str(&text).map_err(|e| HttpError::Decode(e.to_string()))
    }

    /// Writes the body to `path`, streaming straight from the network when
    /// nothing buffered it yet. Consumes the body; a file-creation failure
    /// leaves it untouched.
    pub async fn download_to_file<P: AsRef<Path>>(&mut self, path: P) -> Result<(), HttpError> {
        if let Some(error) = self.stored_error() {
            return Err(error);
        }
        if matches!(self.state, BodyState::Spent) {
            return Err(HttpError::BodyConsumed);
        }

        let mut file = tokio::fs::File::create(path.as_ref()).await?;
        match std::mem::replace(&mut self.state, BodyState::Spent) {
            BodyState::Live(mut raw) => {
                while let Some(chunk) = raw.chunk().await? {
                    file.write_all(&chunk).await?;
                }
            }
            BodyState::Buffered(bytes) => file.write_all(&bytes).await?,
            BodyState::Spent => {}
        }
        file.flush().await?;
        Ok(())
    }

    /// Next chunk straight off the network stream, bypassing the buffer.
    /// `Ok(None)` once the stream is exhausted or the body went elsewhere.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>, HttpError> {
        if let Some(error) = self.stored_error() {
            return Err(error);
        }
        match &mut self.state {
            BodyState::Live(raw) => Ok(raw.chunk().await?),
            _ => Ok(None),
        }
    }

    /// Drops the buffered copy of the body. Further reads see an empty,
    /// consumed body; a still-unread stream is left alone. Never panics.
    pub fn clear_internal_buffer(&mut self) {
        if matches!(self.state, BodyState::Buffered(_)) {
            self.state = BodyState::Spent;
        }
    }

    async fn fill_buffer(&mut self) {
        if !matches!(self.state, BodyState::Live(_)) {
            return;
        }
        if let BodyState::Live(raw) = std::mem::replace(&mut self.state, BodyState::Spent) {
            match raw.bytes().await {
                Ok(bytes) => self.state = BodyState::Buffered(bytes),
                Err(error) => {
                    log::error!("draining response body failed: {error}");
                    self.error = Some(Arc::new(HttpError::Transport(error)));
                }
            }
        }
    }

    /// Hands the body to a decoding consumer: buffer it if needed, then move
    /// it out, leaving the state `Spent`.
    async fn take_for_decode(&mut self) -> Result<Bytes, HttpError> {
        self.fill_buffer().await;
        if let Some(error) = self.stored_error() {
            return Err(error);
        }
        match std::mem::replace(&mut self.state, BodyState::Spent) {
            BodyState::Buffered(bytes) if !bytes.is_empty() => Ok(bytes),
            BodyState::Buffered(_) => Err(HttpError::Decode("response body is empty".to_string())),
            _ => Err(HttpError::BodyConsumed),
        }
    }
}

fn is_utf8(charset: &str) -> bool {
    charset.eq_ignore_ascii_case("utf-8") || charset.eq_ignore_ascii_case("utf8")
}

/// Pulls the charset token out of a `Content-Type: ...; charset=...` header.
fn charset(headers: &HeaderMap) -> Option<String> {
    let content_type = headers.get(CONTENT_TYPE)?.to_str().ok()?;
    let idx = content_type.to_ascii_lowercase().find("charset=")?;
    let after = &content_type[idx + "charset=".len()..];
    // the value may be quoted or run to the next parameter
    let end = after.find([';', ' ', '\t']).unwrap_or(after.len());
    Some(after[..end].trim_matches('"').to_string())
}
