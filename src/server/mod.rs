//! HTTP servers
//!
//! - **API** (`api.rs`) - custom and external metrics API façade
//! - **Health** - `/healthz`, `/livez`, `/readyz`
//! - **Metrics** - Prometheus exposition on `/metrics`

pub mod api;

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::header::{HeaderValue, CONTENT_TYPE};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::error::{Error, Result};
use crate::provider::RoutedMetricsProvider;
use crate::telemetry::RouterMetrics;

pub use api::{dispatch, parse_request, ApiRequest};

type HttpResponse = Response<Full<Bytes>>;

// =============================================================================
// Serve Loop
// =============================================================================

/// Accept connections on `addr` forever, serving each with `handler`.
async fn serve<H, Fut>(addr: &str, server: &'static str, handler: H) -> Result<()>
where
    H: Fn(Request<Incoming>) -> Fut + Clone + Send + Sync + 'static,
    Fut: Future<Output = std::result::Result<HttpResponse, Infallible>> + Send + 'static,
{
    let addr: SocketAddr = addr
        .parse()
        .map_err(|e| Error::Config(format!("Invalid {} server address: {}", server, e)))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Internal(format!("Failed to bind {} server: {}", server, e)))?;

    info!("{} server listening on {}", server, addr);

    loop {
        let (stream, _) = listener
            .accept()
            .await
            .map_err(|e| Error::Internal(format!("{} server accept error: {}", server, e)))?;

        let io = TokioIo::new(stream);
        let handler = handler.clone();

        tokio::spawn(async move {
            if let Err(e) = http1::Builder::new()
                .serve_connection(io, service_fn(handler))
                .await
            {
                error!("{} server connection error: {}", server, e);
            }
        });
    }
}

fn response(status: u16, content_type: &'static str, body: impl Into<Bytes>) -> HttpResponse {
    let mut response = Response::new(Full::new(body.into()));
    *response.status_mut() =
        StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
    response
}

fn json_response(status: u16, body: &serde_json::Value) -> HttpResponse {
    response(status, "application/json", body.to_string())
}

// =============================================================================
// API Server
// =============================================================================

/// Serve the metrics APIs from `provider`.
pub async fn run_api_server(addr: &str, provider: Arc<RoutedMetricsProvider>) -> Result<()> {
    let handler = move |req: Request<Incoming>| {
        let provider = Arc::clone(&provider);
        async move { Ok::<_, Infallible>(handle_api(&provider, req).await) }
    };
    serve(addr, "API", handler).await
}

async fn handle_api(provider: &RoutedMetricsProvider, req: Request<Incoming>) -> HttpResponse {
    if req.method() != Method::GET {
        return json_response(405, &api::method_not_allowed_status());
    }

    match parse_request(req.uri().path(), req.uri().query()) {
        Some(request) => {
            let (status, body) = dispatch(provider, request).await;
            json_response(status, &body)
        }
        None => json_response(404, &api::not_found_status()),
    }
}

// =============================================================================
// Health Server
// =============================================================================

/// Serve liveness and readiness probes. `/readyz` answers 503 until `ready`.
pub async fn run_health_server(addr: &str, ready: Arc<AtomicBool>) -> Result<()> {
    let handler = move |req: Request<Incoming>| {
        let ready = ready.load(Ordering::SeqCst);
        async move { Ok::<_, Infallible>(health_response(req.uri().path(), ready)) }
    };
    serve(addr, "Health", handler).await
}

fn health_response(path: &str, ready: bool) -> HttpResponse {
    match path {
        "/healthz" | "/livez" => response(200, "text/plain", "ok"),
        "/readyz" if ready => response(200, "text/plain", "ok"),
        "/readyz" => response(503, "text/plain", "not ready"),
        _ => response(404, "text/plain", "not found"),
    }
}

// =============================================================================
// Metrics Server
// =============================================================================

/// Serve Prometheus text exposition of `metrics`.
pub async fn run_metrics_server(addr: &str, metrics: Arc<RouterMetrics>) -> Result<()> {
    let handler = move |req: Request<Incoming>| {
        let metrics = Arc::clone(&metrics);
        async move { Ok::<_, Infallible>(metrics_response(req.uri().path(), &metrics)) }
    };
    serve(addr, "Metrics", handler).await
}

fn metrics_response(path: &str, metrics: &RouterMetrics) -> HttpResponse {
    if path != "/metrics" {
        return response(404, "text/plain", "not found");
    }

    match metrics.encode() {
        Ok((content_type, body)) => {
            let mut resp = response(200, "text/plain", body);
            if let Ok(value) = HeaderValue::from_str(&content_type) {
                resp.headers_mut().insert(CONTENT_TYPE, value);
            }
            resp
        }
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            response(500, "text/plain", "failed to encode metrics")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_endpoints() {
        assert_eq!(health_response("/healthz", false).status(), StatusCode::OK);
        assert_eq!(health_response("/livez", false).status(), StatusCode::OK);
        assert_eq!(
            health_response("/readyz", false).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(health_response("/readyz", true).status(), StatusCode::OK);
        assert_eq!(health_response("/other", true).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_metrics_endpoint() {
        let metrics = RouterMetrics::new().unwrap();
        metrics.set_registry_size(1, 1, 0);

        let resp = metrics_response("/metrics", &metrics);
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(resp
            .headers()
            .get(CONTENT_TYPE)
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("text/plain"));

        assert_eq!(
            metrics_response("/", &metrics).status(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_json_response() {
        let resp = json_response(404, &api::not_found_status());
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        assert_eq!(
            resp.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[tokio::test]
    async fn test_invalid_address_is_config_error() {
        let metrics = RouterMetrics::new().unwrap();
        let err = run_metrics_server("not-an-address", metrics)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
