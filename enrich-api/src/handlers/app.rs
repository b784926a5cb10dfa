use std::sync::Arc;

use axum::{extract::DefaultBodyLimit, routing, Router};
use enrich_common::store::RecordStore;
use tower::limit::ConcurrencyLimitLayer;

use super::records;

pub fn add_routes(
    router: Router,
    store: Arc<dyn RecordStore>,
    max_body_size: usize,
    concurrency_limit: usize,
) -> Router {
    let data = Router::new()
        .route(
            "/data",
            routing::get(records::list_records).post(records::create_record),
        )
        .route(
            "/data/:id",
            routing::delete(records::delete_record)
                .put(records::update_record)
                .patch(records::partial_update_record),
        )
        .with_state(store)
        .layer(ConcurrencyLimitLayer::new(concurrency_limit))
        .layer(DefaultBodyLimit::max(max_body_size));

    router
        .route("/", routing::get(index))
        .route("/_readiness", routing::get(index))
        .route("/_liveness", routing::get(index)) // No async loop, just check axum health
        .merge(data)
}

pub async fn index() -> &'static str {
    "records api"
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use enrich_common::memory::MemoryStore;
    use http_body_util::BodyExt; // for `collect`
    use tower::ServiceExt; // for `call`, `oneshot`, and `ready`

    #[tokio::test]
    async fn index() {
        let app = add_routes(Router::new(), Arc::new(MemoryStore::new()), 1_000_000, 10);

        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(&body[..], b"records api");
    }
}
