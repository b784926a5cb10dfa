use std::future::Future;
use std::sync::OnceLock;
use std::time::Instant;

use axum::{
    body::Body, extract::MatchedPath, http::Request, middleware::Next, response::IntoResponse,
    routing::get, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{error, info};

const BUCKETS: &[f64] = &[
    0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0,
];

static RECORDER: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

/// Bind `bind` and serve `router` until `shutdown` resolves.
pub async fn serve<F>(router: Router, bind: &str, shutdown: F) -> Result<(), std::io::Error>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!("listening on {}", bind);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
}

/// Add the prometheus endpoint and the request metrics middleware. Call last,
/// so the middleware wraps every route added before it.
pub fn setup_metrics_routes(router: Router) -> Router {
    let router = match recorder() {
        Some(handle) => router.route(
            "/metrics",
            get(move || std::future::ready(handle.render())),
        ),
        None => router.route(
            "/metrics",
            get(|| std::future::ready("no metrics recorder installed".to_owned())),
        ),
    };
    router.layer(axum::middleware::from_fn(track_metrics))
}

/// The process-wide prometheus recorder. Installed on first call; `None` when
/// another recorder was installed first.
pub fn recorder() -> Option<PrometheusHandle> {
    RECORDER
        .get_or_init(|| {
            let builder = match PrometheusBuilder::new().set_buckets(BUCKETS) {
                Ok(builder) => builder,
                Err(e) => {
                    error!("invalid histogram buckets: {}", e);
                    return None;
                }
            };
            match builder.install_recorder() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    error!("failed to install prometheus recorder: {}", e);
                    None
                }
            }
        })
        .clone()
}

/// Middleware recording request count and latency per method, route and status.
pub async fn track_metrics(req: Request<Body>, next: Next) -> impl IntoResponse {
    let start = Instant::now();

    let path = match req.extensions().get::<MatchedPath>() {
        Some(matched) => matched.as_str().to_owned(),
        None => req.uri().path().to_owned(),
    };
    let method = req.method().to_string();

    let response = next.run(req).await;

    let labels = [
        ("method", method),
        ("path", path),
        ("status", response.status().as_u16().to_string()),
    ];
    metrics::counter!("http_requests_total", &labels).increment(1);
    metrics::histogram!("http_requests_duration_seconds", &labels)
        .record(start.elapsed().as_secs_f64());

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    #[tokio::test]
    async fn metrics_route_is_added_once_per_router() {
        let first = setup_metrics_routes(Router::new().route("/", get(|| async { "ok" })));
        let second = setup_metrics_routes(Router::new());

        for router in [first, second] {
            let response = router
                .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
        }
    }

    #[tokio::test]
    async fn tracked_routes_still_respond() {
        let router = setup_metrics_routes(Router::new().route("/", get(|| async { "ok" })));

        let response = router
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"ok");
    }
}
