//! Request assembly: URL expansion, body encoding, header composition.
//!
//! [`build_request`] turns a method, a URL string, and a set of
//! [`RequestOptions`] into a ready-to-send `reqwest::Request`. Every body is
//! buffered into `Bytes` so the request stays replayable across redirect
//! hops; the option structs own any single-use readers and this module is
//! where they get drained.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;

use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use http::header::{AUTHORIZATION, CONTENT_TYPE, COOKIE, HOST, USER_AGENT};
use http::Method;
use url::Url;

use crate::errors::HttpError;
use crate::options::{Body, FileUpload, RequestOptions};

pub(crate) mod multipart;
pub(crate) mod urls;

/// Sent when no `user_agent` option is given.
pub const DEFAULT_USER_AGENT: &str = concat!("fetchkit/", env!("CARGO_PKG_VERSION"));

#[derive(Debug)]
pub(crate) struct EncodedBody {
    pub(crate) bytes: Bytes,
    pub(crate) content_type: Option<String>,
}

impl EncodedBody {
    fn empty() -> Self {
        Self {
            bytes: Bytes::new(),
            content_type: None,
        }
    }
}

/// Assembles the outgoing request. `body` is taken by value because
/// encoding may consume single-use streams; the rest of the options are
/// only read.
pub(crate) fn build_request(
    client: &reqwest::Client,
    method: Method,
    url: &str,
    options: &RequestOptions,
    body: Body,
) -> Result<reqwest::Request, HttpError> {
    let target = build_target_url(url, options)?;
    let encoded = encode_body(&method, body, &options.data)?;
    let headers = compose_headers(options, encoded.content_type.as_deref())?;

    let mut builder = client.request(method, target).headers(headers);
    if let Some((user, password)) = &options.auth {
        builder = builder.basic_auth(user, Some(password));
    }
    if let Some(timeout) = options.request_timeout {
        builder = builder.timeout(timeout);
    }
    if !encoded.bytes.is_empty() {
        builder = builder.body(encoded.bytes);
    }

    let mut request = builder.build()?;
    if let Some(hook) = &options.before_request {
        hook(&mut request)?;
    }
    Ok(request)
}

fn build_target_url(url: &str, options: &RequestOptions) -> Result<Url, HttpError> {
    let with_params = urls::build_url_params(url, &options.params)?;
    match &options.query_struct {
        Some(query) => urls::build_url_struct(with_params.as_str(), query),
        None => Ok(with_params),
    }
}

/// GET, HEAD and OPTIONS never carry a body; any declared intent is
/// dropped, which also closes still-open upload streams.
fn takes_body(method: &Method) -> bool {
    matches!(method.as_str(), "POST" | "PUT" | "PATCH" | "DELETE")
}

pub(crate) fn encode_body(
    method: &Method,
    body: Body,
    data: &HashMap<String, String>,
) -> Result<EncodedBody, HttpError> {
    if !takes_body(method) {
        return Ok(EncodedBody::empty());
    }

    match body {
        Body::None => {
            if data.is_empty() {
                return Ok(EncodedBody::empty());
            }
            let sorted: BTreeMap<&String, &String> = data.iter().collect();
            let encoded = serde_urlencoded::to_string(&sorted)
                .map_err(|e| HttpError::Encoding(e.to_string()))?;
            Ok(EncodedBody {
                bytes: Bytes::from(encoded),
                content_type: Some("application/x-www-form-urlencoded".to_string()),
            })
        }
        Body::Json(payload) => Ok(EncodedBody {
            bytes: payload.into_bytes()?,
            content_type: Some("application/json".to_string()),
        }),
        Body::Xml(payload) => Ok(EncodedBody {
            bytes: payload.into_bytes(),
            content_type: Some("application/xml".to_string()),
        }),
        Body::Files(files) => encode_files(method, files, data),
        Body::Raw(raw) => Ok(EncodedBody {
            bytes: raw.drain()?,
            content_type: None,
        }),
    }
}

fn encode_files(
    method: &Method,
    files: Vec<FileUpload>,
    data: &HashMap<String, String>,
) -> Result<EncodedBody, HttpError> {
    if files.is_empty() {
        return Err(HttpError::Encoding(
            "file body declared without any files".to_string(),
        ));
    }

    if *method == Method::POST {
        let multipart = multipart::encode_multipart(files, data)?;
        return Ok(EncodedBody {
            bytes: multipart.bytes,
            content_type: Some(multipart.content_type),
        });
    }

    // PUT/PATCH/DELETE upload a single file verbatim.
    let mut files = files;
    if files.len() > 1 {
        return Err(HttpError::Encoding(format!(
            "{method} uploads take exactly one file, got {}",
            files.len()
        )));
    }
    let FileUpload {
        file_name,
        file_mime,
        mut contents,
        ..
    } = files.remove(0);

    let mut payload = Vec::new();
    contents
        .read_to_end(&mut payload)
        .map_err(HttpError::Upload)?;

    let content_type = match file_mime.filter(|mime| !mime.is_empty()) {
        Some(mime) => mime,
        None => mime_guess::from_path(&file_name)
            .first_or_octet_stream()
            .to_string(),
    };

    Ok(EncodedBody {
        bytes: Bytes::from(payload),
        content_type: Some(content_type),
    })
}

/// Builds the final header map. Later stages replace earlier ones: computed
/// content type, then caller headers, then the derived identity headers.
/// When basic auth is configured any caller-supplied `Authorization` is
/// dropped here so the credentials set on the builder are the only ones.
pub(crate) fn compose_headers(
    options: &RequestOptions,
    content_type: Option<&str>,
) -> Result<HeaderMap, HttpError> {
    let mut map = HeaderMap::new();

    if let Some(content_type) = content_type {
        map.insert(CONTENT_TYPE, parse_value(CONTENT_TYPE.as_str(), content_type)?);
    }

    for (name, value) in &options.headers {
        let header = HeaderName::from_bytes(name.as_bytes())
            .map_err(|e| HttpError::Header(format!("{name}: {e}")))?;
        map.insert(header, parse_value(name, value)?);
    }

    let user_agent = options.user_agent.as_deref().unwrap_or(DEFAULT_USER_AGENT);
    map.insert(USER_AGENT, parse_value("user-agent", user_agent)?);

    if let Some(host) = &options.host {
        map.insert(HOST, parse_value("host", host)?);
    }

    if options.auth.is_some() {
        map.remove(AUTHORIZATION);
    }

    if options.is_ajax {
        map.insert(
            HeaderName::from_static("x-requested-with"),
            HeaderValue::from_static("XMLHttpRequest"),
        );
    }

    if !options.cookies.is_empty() {
        let joined = options
            .cookies
            .iter()
            .map(|cookie| format!("{}={}", cookie.name, cookie.value))
            .collect::<Vec<_>>()
            .join("; ");
        let merged = match map.get(COOKIE) {
            Some(existing) => {
                let existing = existing
                    .to_str()
                    .map_err(|e| HttpError::Header(format!("cookie: {e}")))?;
                format!("{existing}; {joined}")
            }
            None => joined,
        };
        map.insert(COOKIE, parse_value("cookie", &merged)?);
    }

    Ok(map)
}

fn parse_value(name: &str, value: &str) -> Result<HeaderValue, HttpError> {
    HeaderValue::from_str(value).map_err(|e| HttpError::Header(format!("{name}: {e}")))
}
