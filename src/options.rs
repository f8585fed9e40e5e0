//! Declarative request options.
//!
//! [`RequestOptions`] is a plain bag of optional intent: query parameters,
//! headers, auth, cookies, transport knobs, and at most one body via the
//! [`Body`] enum. Construction stays cheap and infallible; everything is
//! validated when the request is actually built.
//!
//! Bodies that wrap a live reader ([`Body::Raw`], [`Body::Files`]) are
//! single-use: the encoder takes ownership and drains them once. Because of
//! that, `RequestOptions` is not `Clone`; [`RequestOptions::merge_over`]
//! copies only replayable state from a baseline.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::io::Read;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use url::Url;

use crate::errors::HttpError;

/// Hook invoked with the fully assembled request, right before dispatch.
/// Returning an error aborts the call without touching the network.
pub type BeforeRequestHook =
    Arc<dyn Fn(&mut reqwest::Request) -> Result<(), HttpError> + Send + Sync>;

/// A cookie attached explicitly to a single request.
///
/// Only the name/value pair is sent; attribute handling belongs to the
/// cookie jar on the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cookie {
    pub name: String,
    pub value: String,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// JSON body payload. `Text` and `Bytes` are written to the wire verbatim;
/// `Serialized` goes through `serde_json` when the body is encoded.
#[derive(Debug, Clone)]
pub enum JsonPayload {
    Serialized(serde_json::Value),
    Text(String),
    Bytes(Bytes),
}

impl JsonPayload {
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, HttpError> {
        let value =
            serde_json::to_value(value).map_err(|e| HttpError::Encoding(e.to_string()))?;
        Ok(JsonPayload::Serialized(value))
    }

    pub(crate) fn into_bytes(self) -> Result<Bytes, HttpError> {
        match self {
            JsonPayload::Serialized(value) => serde_json::to_vec(&value)
                .map(Bytes::from)
                .map_err(|e| HttpError::Encoding(e.to_string())),
            JsonPayload::Text(text) => Ok(Bytes::from(text)),
            JsonPayload::Bytes(bytes) => Ok(bytes),
        }
    }
}

impl From<serde_json::Value> for JsonPayload {
    fn from(value: serde_json::Value) -> Self {
        JsonPayload::Serialized(value)
    }
}

impl From<String> for JsonPayload {
    fn from(text: String) -> Self {
        JsonPayload::Text(text)
    }
}

impl From<&str> for JsonPayload {
    fn from(text: &str) -> Self {
        JsonPayload::Text(text.to_string())
    }
}

impl From<Vec<u8>> for JsonPayload {
    fn from(bytes: Vec<u8>) -> Self {
        JsonPayload::Bytes(Bytes::from(bytes))
    }
}

/// XML body payload. `Empty` sends a zero-length body while still marking
/// the request as XML.
#[derive(Debug, Clone)]
pub enum XmlPayload {
    Text(String),
    Bytes(Bytes),
    Empty,
}

impl XmlPayload {
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self, HttpError> {
        let text =
            quick_xml::se::to_string(value).map_err(|e| HttpError::Encoding(e.to_string()))?;
        Ok(XmlPayload::Text(text))
    }

    pub(crate) fn into_bytes(self) -> Bytes {
        match self {
            XmlPayload::Text(text) => Bytes::from(text),
            XmlPayload::Bytes(bytes) => bytes,
            XmlPayload::Empty => Bytes::new(),
        }
    }
}

impl From<String> for XmlPayload {
    fn from(text: String) -> Self {
        XmlPayload::Text(text)
    }
}

impl From<&str> for XmlPayload {
    fn from(text: &str) -> Self {
        XmlPayload::Text(text.to_string())
    }
}

/// Opaque single-use byte stream for [`Body::Raw`].
pub struct RawBody {
    reader: Box<dyn Read + Send>,
}

impl RawBody {
    pub fn new<R: Read + Send + 'static>(reader: R) -> Self {
        Self {
            reader: Box::new(reader),
        }
    }

    /// Reads the stream to completion. The reader is gone afterwards,
    /// success or not.
    pub(crate) fn drain(mut self) -> Result<Bytes, HttpError> {
        let mut buf = Vec::new();
        self.reader
            .read_to_end(&mut buf)
            .map_err(|e| HttpError::Encoding(format!("raw body stream: {e}")))?;
        Ok(Bytes::from(buf))
    }
}

impl fmt::Debug for RawBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("RawBody(..)")
    }
}

impl From<Vec<u8>> for RawBody {
    fn from(bytes: Vec<u8>) -> Self {
        RawBody::new(std::io::Cursor::new(bytes))
    }
}

impl From<String> for RawBody {
    fn from(text: String) -> Self {
        RawBody::new(std::io::Cursor::new(text.into_bytes()))
    }
}

impl From<&str> for RawBody {
    fn from(text: &str) -> Self {
        RawBody::from(text.to_string())
    }
}

/// One file destined for a multipart form (POST) or a raw upload (PUT/PATCH).
///
/// The contents reader is consumed exactly once when the body is encoded.
pub struct FileUpload {
    /// Multipart field name; empty means a positional `fileN` name is
    /// assigned at encode time.
    pub field_name: Option<String>,
    /// File name reported in the part's `Content-Disposition`.
    pub file_name: String,
    /// Part MIME type; `application/octet-stream` when unset.
    pub file_mime: Option<String>,
    /// Opened byte stream with the file contents.
    pub contents: Box<dyn Read + Send>,
}

impl FileUpload {
    pub fn from_reader<R: Read + Send + 'static>(
        field_name: Option<&str>,
        file_name: &str,
        reader: R,
    ) -> Self {
        Self {
            field_name: field_name.map(str::to_string),
            file_name: file_name.to_string(),
            file_mime: None,
            contents: Box::new(reader),
        }
    }

    /// Opens `path` for reading. The part's file name is the path's final
    /// component.
    pub fn from_disk<P: AsRef<Path>>(path: P) -> Result<Self, HttpError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(HttpError::Upload)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            field_name: None,
            file_name,
            file_mime: None,
            contents: Box::new(file),
        })
    }

    /// Opens each path for reading, one upload per regular file. Suited to
    /// caller-expanded globs: directories and entries that fail to open are
    /// skipped with a warning, and only an all-skipped batch is an error.
    pub fn from_paths<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<Self>, HttpError> {
        let mut uploads = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            if path.is_dir() {
                log::warn!("skipping directory {}", path.display());
                continue;
            }
            match Self::from_disk(path) {
                Ok(upload) => uploads.push(upload),
                Err(error) => log::warn!("skipping {}: {error}", path.display()),
            }
        }
        if uploads.is_empty() {
            return Err(HttpError::Upload(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no uploadable files among the given paths",
            )));
        }
        Ok(uploads)
    }

    pub fn from_bytes(file_name: &str, bytes: Vec<u8>) -> Self {
        Self::from_reader(None, file_name, std::io::Cursor::new(bytes))
    }
}

impl fmt::Debug for FileUpload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileUpload")
            .field("field_name", &self.field_name)
            .field("file_name", &self.file_name)
            .field("file_mime", &self.file_mime)
            .finish_non_exhaustive()
    }
}

/// The one body a request may carry. Having a single slot makes conflicting
/// intents unrepresentable; form data lives in [`RequestOptions::data`] and
/// applies when the body is `None` (urlencoded) or `Files` (extra multipart
/// fields).
#[derive(Debug, Default)]
pub enum Body {
    #[default]
    None,
    Json(JsonPayload),
    Xml(XmlPayload),
    Files(Vec<FileUpload>),
    Raw(RawBody),
}

impl Body {
    pub fn json<T: Serialize>(value: &T) -> Result<Self, HttpError> {
        Ok(Body::Json(JsonPayload::from_serialize(value)?))
    }

    pub fn xml<T: Serialize>(value: &T) -> Result<Self, HttpError> {
        Ok(Body::Xml(XmlPayload::from_serialize(value)?))
    }

    pub fn raw<R: Read + Send + 'static>(reader: R) -> Self {
        Body::Raw(RawBody::new(reader))
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Body::None)
    }

    /// Clone for reuse as a session baseline. Reader-backed bodies cannot be
    /// replayed; they are dropped from the merge with a warning.
    fn clone_replayable(&self) -> Body {
        match self {
            Body::None => Body::None,
            Body::Json(payload) => Body::Json(payload.clone()),
            Body::Xml(payload) => Body::Xml(payload.clone()),
            Body::Files(_) | Body::Raw(_) => {
                log::warn!("session baseline carries a single-use body; ignoring it");
                Body::None
            }
        }
    }
}

/// Everything a caller can declare about one request.
///
/// All fields are optional; `RequestOptions::default()` is a valid, empty
/// set. Unknown or irrelevant fields are ignored by the pipeline stages that
/// do not consume them (an idempotent method ignores the body entirely).
#[derive(Default)]
pub struct RequestOptions {
    /// Request body intent. See [`Body`].
    pub body: Body,
    /// Form fields: the urlencoded body when `body` is `None`, extra
    /// multipart fields when `body` is `Files`.
    pub data: HashMap<String, String>,

    /// Query parameters merged into the URL (overriding existing keys).
    pub params: HashMap<String, String>,
    /// Struct-shaped query parameters; must serialize to a JSON object.
    /// Array values repeat the key. Set via [`RequestOptions::with_query_struct`].
    pub query_struct: Option<serde_json::Value>,

    /// Custom headers, applied before every derived header.
    pub headers: HashMap<String, String>,
    /// Overrides the default `User-Agent`.
    pub user_agent: Option<String>,
    /// Overrides the `Host` header.
    pub host: Option<String>,
    /// HTTP basic auth as a `(user, password)` pair.
    pub auth: Option<(String, String)>,
    /// Adds `X-Requested-With: XMLHttpRequest`.
    pub is_ajax: bool,
    /// Cookies attached to this request, in order.
    pub cookies: Vec<Cookie>,

    /// Give the transport a cookie jar so responses can set cookies.
    pub use_cookie_jar: bool,
    /// Skip TLS certificate verification.
    pub insecure_skip_verify: bool,
    /// Disable transparent response decompression.
    pub disable_compression: bool,
    /// Proxy URL per target scheme (`"http"`, `"https"`).
    pub proxies: HashMap<String, Url>,
    /// Limit for establishing the connection.
    pub connect_timeout: Option<Duration>,
    /// Deadline for the whole request/response exchange.
    pub request_timeout: Option<Duration>,
    /// TCP keepalive interval for pooled connections.
    pub tcp_keepalive: Option<Duration>,
    /// Local address to bind outgoing connections to.
    pub local_addr: Option<IpAddr>,
    /// Pre-built transport; when set, every construction knob above is
    /// ignored and this client is used as-is.
    pub http_client: Option<reqwest::Client>,

    /// Maximum redirect hops before the request fails; `None` means the
    /// crate default.
    pub redirect_limit: Option<usize>,
    /// Header names never forwarded across redirects; `None` means the
    /// crate default set.
    pub sensitive_headers: Option<HashSet<String>>,
    /// Forward even sensitive headers to redirect targets.
    pub redirect_location_trusted: bool,

    /// See [`BeforeRequestHook`].
    pub before_request: Option<BeforeRequestHook>,
}

impl RequestOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `query` for URL expansion. Fails when the value cannot be
    /// serialized at all; shape validation (object-ness) happens when the
    /// request is built.
    pub fn with_query_struct<T: Serialize>(mut self, query: &T) -> Result<Self, HttpError> {
        let value =
            serde_json::to_value(query).map_err(|e| HttpError::Encoding(e.to_string()))?;
        self.query_struct = Some(value);
        Ok(self)
    }

    /// Layers `per_call` over `self` as a baseline: per-call fields win when
    /// set, map fields merge key by key with per-call precedence, booleans
    /// or together. Single-use baseline bodies do not survive the merge.
    pub fn merge_over(&self, mut per_call: RequestOptions) -> RequestOptions {
        if per_call.body.is_none() {
            per_call.body = self.body.clone_replayable();
        }
        merge_map(&self.data, &mut per_call.data);
        merge_map(&self.params, &mut per_call.params);
        merge_map(&self.headers, &mut per_call.headers);
        merge_map(&self.proxies, &mut per_call.proxies);

        per_call.query_struct = per_call.query_struct.or_else(|| self.query_struct.clone());
        per_call.user_agent = per_call.user_agent.or_else(|| self.user_agent.clone());
        per_call.host = per_call.host.or_else(|| self.host.clone());
        per_call.auth = per_call.auth.or_else(|| self.auth.clone());
        per_call.is_ajax |= self.is_ajax;
        if per_call.cookies.is_empty() {
            per_call.cookies = self.cookies.clone();
        }

        per_call.use_cookie_jar |= self.use_cookie_jar;
        per_call.insecure_skip_verify |= self.insecure_skip_verify;
        per_call.disable_compression |= self.disable_compression;
        per_call.connect_timeout = per_call.connect_timeout.or(self.connect_timeout);
        per_call.request_timeout = per_call.request_timeout.or(self.request_timeout);
        per_call.tcp_keepalive = per_call.tcp_keepalive.or(self.tcp_keepalive);
        per_call.local_addr = per_call.local_addr.or(self.local_addr);
        per_call.http_client = per_call
            .http_client
            .or_else(|| self.http_client.clone());

        per_call.redirect_limit = per_call.redirect_limit.or(self.redirect_limit);
        per_call.sensitive_headers = per_call
            .sensitive_headers
            .or_else(|| self.sensitive_headers.clone());
        per_call.redirect_location_trusted |= self.redirect_location_trusted;

        per_call.before_request = per_call
            .before_request
            .or_else(|| self.before_request.clone());

        per_call
    }
}

impl fmt::Debug for RequestOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestOptions")
            .field("body", &self.body)
            .field("data", &self.data)
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("user_agent", &self.user_agent)
            .field("host", &self.host)
            .field("is_ajax", &self.is_ajax)
            .field("cookies", &self.cookies)
            .finish_non_exhaustive()
    }
}

fn merge_map<V: Clone>(baseline: &HashMap<String, V>, per_call: &mut HashMap<String, V>) {
    for (key, value) in baseline {
        per_call
            .entry(key.clone())
            .or_insert_with(|| value.clone());
    }
}
