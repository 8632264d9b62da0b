use crate::services::metrics::{ERRORS_TOTAL, HTTP_REQUESTS_TOTAL};
use axum::extract::{MatchedPath, Request};
use axum::middleware::Next;
use axum::response::Response;
use service_core::error::ErrorKind;

/// Counts requests by matched route and status, and failed requests by
/// error kind.
pub async fn http_metrics_middleware(req: Request, next: Next) -> Response {
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map(|path| path.as_str().to_string())
        .unwrap_or_else(|| "unmatched".to_string());

    let response = next.run(req).await;

    HTTP_REQUESTS_TOTAL
        .with_label_values(&[route.as_str(), response.status().as_str()])
        .inc();

    if let Some(ErrorKind(kind)) = response.extensions().get::<ErrorKind>() {
        ERRORS_TOTAL.with_label_values(&[*kind]).inc();
    }

    response
}
