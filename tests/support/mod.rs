//! Local echo server for the integration tests, loosely modeled on
//! httpbin: every endpoint reflects back what it received so the tests
//! can assert on the exact request that went over the wire.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Multipart, Path, Query, State};
use axum::http::header::{CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE};
use axum::http::{HeaderMap, HeaderValue, Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{any, get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

#[derive(Default)]
pub struct ServerState {
    /// Hits on `/redirect/{n}`, including the terminal hop.
    pub redirect_hits: AtomicUsize,
}

/// Binds an ephemeral port, serves the echo app in the background, and
/// returns the base URL plus the shared counters. Run the tests with
/// `RUST_LOG=debug` to see the client's redirect decisions.
pub async fn start() -> (String, Arc<ServerState>) {
    let _ = env_logger::builder().is_test(true).try_init();
    let state = Arc::new(ServerState::default());
    let app = router(Arc::clone(&state));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("http://{addr}"), state)
}

fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/get", get(echo_get))
        .route("/echo", any(echo_body))
        .route("/upload", post(echo_multipart))
        .route("/redirect/{n}", get(redirect_chain))
        .route("/redirect-after-post", post(redirect_after_post))
        .route("/keep/{n}", any(keep_method))
        .route("/cookies", get(cookies_echo))
        .route("/cookies/set", get(cookies_set))
        .route("/status/{code}", any(status_code))
        .route("/bytes/{n}", get(bytes_n))
        .route("/delay/{ms}", get(delay_ms))
        .with_state(state)
}

/// Byte pattern used by `/bytes/{n}`, reproducible on the client side.
pub fn deterministic_bytes(n: usize) -> Vec<u8> {
    (0..n).map(|i| (i % 251) as u8).collect()
}

fn header_map_json(headers: &HeaderMap) -> Value {
    let mut map = serde_json::Map::new();
    for (name, value) in headers {
        let text = String::from_utf8_lossy(value.as_bytes()).into_owned();
        map.insert(name.as_str().to_string(), Value::String(text));
    }
    Value::Object(map)
}

async fn echo_get(headers: HeaderMap, uri: Uri) -> Json<Value> {
    Json(json!({
        "query": uri.query().unwrap_or(""),
        "headers": header_map_json(&headers),
    }))
}

async fn echo_body(method: Method, headers: HeaderMap, body: String) -> Json<Value> {
    let content_type = headers
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");
    Json(json!({
        "method": method.as_str(),
        "content_type": content_type,
        "body": body,
        "headers": header_map_json(&headers),
    }))
}

async fn echo_multipart(mut multipart: Multipart) -> Json<Value> {
    let mut files = serde_json::Map::new();
    let mut form = serde_json::Map::new();
    while let Some(field) = multipart.next_field().await.unwrap() {
        let name = field.name().unwrap_or("").to_string();
        let is_file = field.file_name().is_some();
        let text = field.text().await.unwrap();
        if is_file {
            files.insert(name, Value::String(text));
        } else {
            form.insert(name, Value::String(text));
        }
    }
    Json(json!({ "files": files, "form": form }))
}

/// `/redirect/{n}`: 302 down to `/redirect/{n-1}`; the terminal hop echoes
/// the headers it received so tests can check what crossed the redirect.
async fn redirect_chain(
    State(state): State<Arc<ServerState>>,
    Path(n): Path<u32>,
    headers: HeaderMap,
) -> Response {
    state.redirect_hits.fetch_add(1, Ordering::SeqCst);
    if n == 0 {
        return Json(json!({ "headers": header_map_json(&headers) })).into_response();
    }
    (
        StatusCode::FOUND,
        [(LOCATION, format!("/redirect/{}", n - 1))],
    )
        .into_response()
}

/// 302 target for POST requests; `/redirect/{n}` itself only routes GET,
/// so a client that fails to switch methods gets a 405 on the next hop.
async fn redirect_after_post() -> Response {
    (
        StatusCode::FOUND,
        [(LOCATION, "/redirect/0".to_string())],
    )
        .into_response()
}

/// `/keep/{n}`: 307 chain, so method and body must survive each hop.
async fn keep_method(Path(n): Path<u32>, method: Method, body: String) -> Response {
    if n > 0 {
        return (
            StatusCode::TEMPORARY_REDIRECT,
            [(LOCATION, format!("/keep/{}", n - 1))],
        )
            .into_response();
    }
    Json(json!({ "method": method.as_str(), "body": body })).into_response()
}

async fn cookies_echo(headers: HeaderMap) -> Json<Value> {
    let mut cookies = serde_json::Map::new();
    if let Some(raw) = headers.get(COOKIE).and_then(|value| value.to_str().ok()) {
        for pair in raw.split("; ") {
            if let Some((name, value)) = pair.split_once('=') {
                cookies.insert(name.to_string(), Value::String(value.to_string()));
            }
        }
    }
    Json(Value::Object(cookies))
}

async fn cookies_set(Query(params): Query<HashMap<String, String>>) -> Response {
    let mut headers = HeaderMap::new();
    for (name, value) in &params {
        let cookie = format!("{name}={value}; Path=/");
        if let Ok(value) = HeaderValue::from_str(&cookie) {
            headers.append(SET_COOKIE, value);
        }
    }
    headers.insert(LOCATION, HeaderValue::from_static("/cookies"));
    (StatusCode::FOUND, headers).into_response()
}

async fn status_code(Path(code): Path<u16>) -> Response {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::BAD_REQUEST);
    (status, "status body").into_response()
}

async fn bytes_n(Path(n): Path<usize>) -> Vec<u8> {
    deterministic_bytes(n)
}

async fn delay_ms(Path(ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    "slow reply"
}
