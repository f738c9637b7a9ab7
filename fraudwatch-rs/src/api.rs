//! Exposes the watchlist via a minimal JSON API.
//!
//! The server binds to **server.address** of the config (or 0.0.0.0:8080 as fallback) and
//! provides three endpoints:
//! * **POST /api/search**: expects a form field **query** (`application/x-www-form-urlencoded`),
//!   a JSON body like `{"query": "01112223334"}` or the plain query as body text. Responds with
//!   the serialized [QueryResult](crate::watchlist::query::QueryResult) plus a **search_value**
//!   which repeats the presented phone. An empty query yields a **400**.
//! * **GET /api/stats**: reports the [SnapshotStats](crate::watchlist::snapshot::SnapshotStats)
//!   of the active snapshot along with the [RefreshStatus](crate::watchlist::scheduler::RefreshStatus)
//!   of the scheduler.
//! * **POST /api/refresh**: requests an immediate refresh. The response doesn't wait for it.
//!
//! All responses are marked as not cacheable, as a watchlist answer may change with the next
//! refresh.
//!
//! # Example
//!
//! ```no_run
//! # use fraudwatch::builder::Builder;
//! #[tokio::main]
//! async fn main() {
//!     let platform = Builder::new().enable_all().build().await;
//!     fraudwatch::watchlist::install(&platform).await.unwrap();
//!
//!     // Blocks until the platform is terminated (e.g. via CTRL-C)...
//!     fraudwatch::api::event_loop(platform).await.unwrap();
//! }
//! ```
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use hyper::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE, EXPIRES, PRAGMA};
use hyper::service::{make_service_fn, service_fn};
use hyper::{Body, Method, Request, Response, StatusCode};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::platform::Platform;
use crate::watchlist::query::{QueryEngine, QueryResult};
use crate::watchlist::scheduler::{RefreshScheduler, RefreshState, RefreshStatus};
use crate::watchlist::snapshot::SnapshotStats;
use crate::watchlist::store::SnapshotStore;

#[derive(Deserialize)]
struct SearchRequest {
    #[serde(default)]
    query: String,
}

#[derive(Serialize)]
struct SearchResponse<'a> {
    #[serde(flatten)]
    result: &'a QueryResult,
    search_value: &'a str,
}

#[derive(Serialize)]
struct StatsResponse {
    snapshot: SnapshotStats,
    state: Option<RefreshState>,
    refresh: Option<RefreshStatus>,
}

#[derive(Serialize)]
struct MessageResponse<'a> {
    message: &'a str,
}

/// Runs the HTTP server until the platform terminates.
///
/// Requests which are in flight once the platform shuts down are completed before this returns.
pub async fn event_loop(platform: Arc<Platform>) -> anyhow::Result<()> {
    let address = platform
        .find::<Config>()
        .map(|config| config.current().settings().server_address.clone())
        .unwrap_or_else(|| crate::config::DEFAULT_SERVER_ADDRESS.to_owned());
    let address: SocketAddr = address
        .parse()
        .with_context(|| format!("Invalid server address: {}", address))?;

    let shutdown = platform.shutdown_token();
    let make_service = make_service_fn(move |_connection| {
        let platform = platform.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |request| {
                let platform = platform.clone();
                async move { Ok::<_, Infallible>(handle(&platform, request).await) }
            }))
        }
    });

    let server = hyper::Server::try_bind(&address)
        .with_context(|| format!("Cannot bind to {}", address))?
        .serve(make_service);
    log::info!("Serving the watchlist API on {}...", server.local_addr());

    server
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
        .context("The HTTP server failed")?;

    log::info!("The HTTP server has been stopped.");
    Ok(())
}

/// Dispatches a single request.
pub async fn handle(platform: &Platform, request: Request<Body>) -> Response<Body> {
    if !platform.is_running() {
        return message(StatusCode::SERVICE_UNAVAILABLE, "Shutting down");
    }

    match (request.method(), request.uri().path()) {
        (&Method::POST, "/api/search") => search(platform, request).await,
        (&Method::GET, "/api/stats") => stats(platform),
        (&Method::POST, "/api/refresh") => refresh(platform),
        (_, "/api/search") | (_, "/api/refresh") | (_, "/api/stats") => {
            message(StatusCode::METHOD_NOT_ALLOWED, "Method not allowed")
        }
        _ => message(StatusCode::NOT_FOUND, "Not found"),
    }
}

async fn search(platform: &Platform, request: Request<Body>) -> Response<Body> {
    let engine = match platform.find::<QueryEngine>() {
        Some(engine) => engine,
        None => return message(StatusCode::SERVICE_UNAVAILABLE, "The watchlist isn't installed"),
    };

    let form_encoded = request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false);

    let body = match hyper::body::to_bytes(request.into_body()).await {
        Ok(body) => body,
        Err(error) => {
            log::debug!("Failed to read a search request: {}", error);
            return message(StatusCode::BAD_REQUEST, "Cannot read the request body");
        }
    };

    let query = if form_encoded {
        match serde_urlencoded::from_bytes::<SearchRequest>(&body) {
            Ok(request) => request.query,
            Err(error) => {
                log::debug!("Failed to decode a search form: {}", error);
                return message(StatusCode::BAD_REQUEST, "Cannot decode the search form");
            }
        }
    } else {
        match serde_json::from_slice::<SearchRequest>(&body) {
            Ok(request) => request.query,
            Err(_) => String::from_utf8_lossy(&body).into_owned(),
        }
    };

    if query.trim().is_empty() {
        return message(StatusCode::BAD_REQUEST, "Please provide a phone number or customer id");
    }

    let result = engine.query(&query);
    json(
        StatusCode::OK,
        &SearchResponse {
            result: &result,
            search_value: &result.phone,
        },
    )
}

fn stats(platform: &Platform) -> Response<Body> {
    let snapshot = platform
        .find::<SnapshotStore>()
        .map(|store| store.get_active().stats())
        .unwrap_or_else(|| SnapshotStore::new().get_active().stats());
    let scheduler = platform.find::<RefreshScheduler>();

    json(
        StatusCode::OK,
        &StatsResponse {
            snapshot,
            state: scheduler.as_ref().map(|scheduler| scheduler.state()),
            refresh: scheduler.as_ref().map(|scheduler| scheduler.status()),
        },
    )
}

fn refresh(platform: &Platform) -> Response<Body> {
    match platform.find::<RefreshScheduler>() {
        Some(scheduler) => {
            scheduler.trigger();
            message(StatusCode::ACCEPTED, "Refresh requested")
        }
        None => message(StatusCode::SERVICE_UNAVAILABLE, "The watchlist isn't installed"),
    }
}

fn message(status: StatusCode, text: &str) -> Response<Body> {
    json(status, &MessageResponse { message: text })
}

fn json<T: Serialize>(status: StatusCode, value: &T) -> Response<Body> {
    let (status, body) = match serde_json::to_vec(value) {
        Ok(body) => (status, body),
        Err(error) => {
            log::error!("Failed to serialize a response: {}", error);
            (StatusCode::INTERNAL_SERVER_ERROR, b"{}".to_vec())
        }
    };

    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;

    let headers = response.headers_mut();
    let _ = headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    let _ = headers.insert(
        CACHE_CONTROL,
        HeaderValue::from_static("no-cache, no-store, must-revalidate"),
    );
    let _ = headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
    let _ = headers.insert(EXPIRES, HeaderValue::from_static("0"));

    response
}
