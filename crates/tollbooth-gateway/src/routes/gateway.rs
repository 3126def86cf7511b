use actix_web::{web, HttpRequest, HttpResponse, ResponseError};

use crate::error::GatewayError;
use crate::metrics::REQUESTS_TOTAL;
use crate::orchestrator::handle_paid_call;
use crate::state::AppState;

/// Sanitize a query string to prevent CRLF injection and fragment smuggling.
fn sanitize_query(query: &str) -> Result<String, GatewayError> {
    // Reject CRLF injection
    if query.contains('\r') || query.contains('\n') {
        return Err(GatewayError::InvalidRequest(
            "query string must not contain newlines".to_string(),
        ));
    }

    // Strip fragment; fragments are client-side only
    let sanitized = match query.find('#') {
        Some(idx) => &query[..idx],
        None => query,
    };

    // Reject null bytes
    if sanitized.contains('\0') {
        return Err(GatewayError::InvalidRequest(
            "query string must not contain null bytes".to_string(),
        ));
    }

    // Reject path traversal in query parameters (decoded and percent-encoded)
    let decoded = urlencoding::decode(sanitized).unwrap_or(std::borrow::Cow::Borrowed(sanitized));
    if decoded.contains("..") {
        return Err(GatewayError::InvalidRequest(
            "query string must not contain path traversal sequences".to_string(),
        ));
    }

    Ok(sanitized.to_string())
}

/// Rebuild the exact URL the client requested. This string becomes the
/// `resource` field of the payment requirements, so the no-payment challenge
/// and the verified call must agree on it byte for byte.
fn resource_url(req: &HttpRequest, query: Option<&str>) -> String {
    let conn = req.connection_info();
    match query.filter(|q| !q.is_empty()) {
        Some(q) => format!("{}://{}{}?{}", conn.scheme(), conn.host(), req.path(), q),
        None => format!("{}://{}{}", conn.scheme(), conn.host(), req.path()),
    }
}

/// ANY /p/{provider_id} - Paid call to a registered endpoint
pub async fn paid_call(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    let method = req.method().as_str().to_string();
    let result = paid_call_inner(req, path, body, state).await;

    // Error responses are counted too, not just the Ok arm.
    let status = match &result {
        Ok(response) => response.status(),
        Err(e) => e.status_code(),
    };
    REQUESTS_TOTAL
        .with_label_values(&[method.as_str(), status.as_str()])
        .inc();

    result
}

async fn paid_call_inner(
    req: HttpRequest,
    path: web::Path<String>,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, GatewayError> {
    let provider_id = path.into_inner();

    let query = match req.uri().query() {
        Some(raw) => Some(sanitize_query(raw)?),
        None => None,
    };
    let query = query.as_deref().filter(|q| !q.is_empty());

    let resource = resource_url(&req, query);

    let payment_header = req
        .headers()
        .get(x402::PAYMENT_HEADER)
        .and_then(|v| v.to_str().ok());

    handle_paid_call(
        &state,
        &provider_id,
        &resource,
        query,
        payment_header,
        body,
    )
    .await
}

/// Configure the gateway route. A single catch-all method route; the
/// configured endpoint decides which origin method is used.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/p/{provider_id}").route(web::route().to(paid_call)));
}
