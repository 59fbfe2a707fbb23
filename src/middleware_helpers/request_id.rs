use axum::{
    extract::Request,
    http::{HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use tracing::{field, Instrument};

use super::cart_session::CART_SESSION_HEADER;
use crate::tracing::{scope_request_id, RequestId};

/// Header name for the request ID
pub const REQUEST_ID_HEADER: &str = "x-request-id";

const REQUEST_ID: HeaderName = HeaderName::from_static(REQUEST_ID_HEADER);

/// Tags every request with an id, echoed on the response and carried by error bodies.
///
/// A caller-supplied `x-request-id` is reused when it is a safe header value. The
/// downstream stack runs inside a `request` span that also names the cart session,
/// so one guest's cart and checkout calls can be followed through the logs.
pub async fn request_id_middleware(mut request: Request, next: Next) -> Response {
    let request_id = request
        .headers()
        .get(REQUEST_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(RequestId::new)
        .unwrap_or_default();
    let echoed = HeaderValue::from_str(request_id.as_str()).ok();

    if let Some(value) = &echoed {
        request.headers_mut().insert(REQUEST_ID, value.clone());
    }
    request.extensions_mut().insert(request_id.clone());

    let span = tracing::info_span!(
        "request",
        request_id = %request_id.as_str(),
        method = %request.method(),
        path = %request.uri().path(),
        cart_session = field::Empty,
    );
    if let Some(session) = request
        .headers()
        .get(CART_SESSION_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        span.record("cart_session", session);
    }

    let mut response =
        scope_request_id(request_id, async move { next.run(request).await }.instrument(span))
            .await;

    if let Some(value) = echoed {
        response.headers_mut().insert(REQUEST_ID, value);
    }
    response
}
