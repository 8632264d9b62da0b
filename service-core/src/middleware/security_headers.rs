use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};

/// Path prefix under which published documents are served.
pub const DOCUMENT_PATH_PREFIX: &str = "/artifacts/";

fn common() -> [(HeaderName, &'static str); 3] {
    [
        (header::X_CONTENT_TYPE_OPTIONS, "nosniff"),
        (header::STRICT_TRANSPORT_SECURITY, "max-age=31536000; includeSubDomains"),
        (header::REFERRER_POLICY, "no-referrer"),
    ]
}

// Published document keys are never reused.
fn document() -> [(HeaderName, &'static str); 3] {
    [
        (header::CONTENT_SECURITY_POLICY, "default-src 'self'; object-src 'self'"),
        (header::X_FRAME_OPTIONS, "SAMEORIGIN"),
        (header::CACHE_CONTROL, "public, max-age=31536000, immutable"),
    ]
}

fn api() -> [(HeaderName, &'static str); 3] {
    [
        (header::CONTENT_SECURITY_POLICY, "default-src 'none'; frame-ancestors 'none'"),
        (header::X_FRAME_OPTIONS, "DENY"),
        (header::CACHE_CONTROL, "no-store"),
    ]
}

pub async fn security_headers_middleware(req: Request, next: Next) -> Response {
    let is_document = req.uri().path().starts_with(DOCUMENT_PATH_PREFIX);

    let mut response = next.run(req).await;
    let headers = response.headers_mut();

    apply(headers, common());
    if is_document {
        apply(headers, document());
    } else {
        apply(headers, api());
    }

    response
}

fn apply<const N: usize>(headers: &mut HeaderMap, policy: [(HeaderName, &'static str); N]) {
    for (name, value) in policy {
        headers.insert(name, HeaderValue::from_static(value));
    }
}
