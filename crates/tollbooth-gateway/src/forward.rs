//! Request forwarder: builds and issues the outbound call to the origin API.
//!
//! All credential handling is centralized here, dispatched on the endpoint's
//! [`AuthMethod`]. Registration-time intent is authoritative: custom headers
//! win over the computed auth header.

use bytes::Bytes;

use crate::error::GatewayError;
use crate::store::{AuthMethod, EndpointRecord};

/// Reserved query-parameter value used at registration time to document
/// where a key would go. Stripped before forwarding.
pub const CREDENTIAL_PLACEHOLDER: &str = "YOUR_API_KEY";

/// Query parameter used for query-auth endpoints that did not name one.
const DEFAULT_QUERY_PARAM: &str = "key";

/// User-Agent sent on every forwarded request.
const GATEWAY_USER_AGENT: &str = concat!("tollbooth-gateway/", env!("CARGO_PKG_VERSION"));

/// Maximum origin response body size (10 MB).
const MAX_RESPONSE_BODY_SIZE: usize = 10 * 1024 * 1024;

/// Truncation limit for upstream error bodies kept for diagnostics.
const ERROR_BODY_SNIPPET: usize = 2048;

/// A successful (2xx) origin response.
#[derive(Debug)]
pub struct OriginResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

/// Build the outbound URL: origin endpoint, minus placeholder params, plus
/// the inbound request's query parameters (caller-supplied values win), plus
/// the credential when the endpoint uses query auth.
pub fn build_target_url(
    endpoint: &EndpointRecord,
    inbound_query: Option<&str>,
    credential: Option<&str>,
) -> Result<String, GatewayError> {
    let mut url = url::Url::parse(&endpoint.origin_endpoint).map_err(|_| {
        GatewayError::Internal("stored origin endpoint is not a valid URL".to_string())
    })?;

    let mut pairs: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(_, v)| v != CREDENTIAL_PLACEHOLDER)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if let Some(query) = inbound_query {
        let inbound: Vec<(String, String)> = url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        // Drop registered pairs the caller overrides, then pass the inbound
        // query through verbatim, repeated keys included.
        pairs.retain(|(k, _)| !inbound.iter().any(|(ik, _)| ik == k));
        pairs.extend(inbound);
    }

    if endpoint.auth_method == AuthMethod::Query {
        let param = endpoint
            .query_param_name
            .as_deref()
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_QUERY_PARAM);
        let credential = credential.ok_or_else(|| {
            GatewayError::Internal("query auth endpoint has no credential".to_string())
        })?;
        pairs.retain(|(k, _)| k != param);
        pairs.push((param.to_string(), credential.to_string()));
    }

    if pairs.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(&pairs).finish();
    }

    Ok(url.to_string())
}

/// Build the outbound header set. Order of authority, lowest to highest:
/// fixed User-Agent, default Content-Type, computed auth header, then the
/// endpoint's custom headers.
pub fn build_headers(
    endpoint: &EndpointRecord,
    credential: Option<&str>,
) -> Result<Vec<(String, String)>, GatewayError> {
    let has_custom = |name: &str| {
        endpoint
            .custom_headers
            .keys()
            .any(|k| k.eq_ignore_ascii_case(name))
    };

    let mut headers: Vec<(String, String)> = Vec::new();
    if !has_custom("User-Agent") {
        headers.push(("User-Agent".to_string(), GATEWAY_USER_AGENT.to_string()));
    }

    if !has_custom("Content-Type") {
        headers.push(("Content-Type".to_string(), "application/json".to_string()));
    }

    if endpoint.auth_method == AuthMethod::Header {
        let name = endpoint.auth_header_name.as_deref().ok_or_else(|| {
            GatewayError::Internal("header auth endpoint has no header name".to_string())
        })?;
        // Custom headers win: only inject if registration didn't already
        // pin this header to a fixed value.
        if !has_custom(name) {
            let credential = credential.ok_or_else(|| {
                GatewayError::Internal("header auth endpoint has no credential".to_string())
            })?;
            headers.push((name.to_string(), credential.to_string()));
        }
    }

    for (name, value) in &endpoint.custom_headers {
        headers.push((name.clone(), value.clone()));
    }

    Ok(headers)
}

/// Resolve the outbound body: the inbound raw body verbatim when present,
/// otherwise the registered static body. GET requests carry none.
pub fn resolve_body(endpoint: &EndpointRecord, inbound_body: &Bytes) -> Option<Vec<u8>> {
    if endpoint.http_method == "GET" {
        return None;
    }
    if !inbound_body.is_empty() {
        return Some(inbound_body.to_vec());
    }
    endpoint
        .request_body
        .as_ref()
        .map(|b| b.as_bytes().to_vec())
}

/// Forward one inbound call to the origin API.
///
/// Returns `Ok` only for 2xx origin responses. Non-2xx becomes
/// [`GatewayError::OriginFailed`] (with a truncated body snippet for
/// diagnostics), and the endpoint-configured deadline becomes the distinct
/// [`GatewayError::OriginTimeout`]. The decrypted credential appears only
/// in the outbound request, never in errors or logs.
pub async fn forward(
    client: &reqwest::Client,
    endpoint: &EndpointRecord,
    inbound_query: Option<&str>,
    inbound_body: &Bytes,
    credential: Option<&str>,
) -> Result<OriginResponse, GatewayError> {
    let target_url = build_target_url(endpoint, inbound_query, credential)?;

    let method: reqwest::Method = endpoint
        .http_method
        .parse()
        .map_err(|_| GatewayError::Internal("stored HTTP method is invalid".to_string()))?;

    let timeout_secs = endpoint.max_timeout_seconds;
    let mut request = client
        .request(method, &target_url)
        .timeout(std::time::Duration::from_secs(timeout_secs));

    for (name, value) in build_headers(endpoint, credential)? {
        request = request.header(name, value);
    }

    if let Some(body) = resolve_body(endpoint, inbound_body) {
        request = request.body(body);
    }

    let mut response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            GatewayError::OriginTimeout(timeout_secs)
        } else {
            tracing::warn!(provider = %endpoint.provider_id, error = %e, "origin request failed");
            GatewayError::OriginFailed {
                status: None,
                message: "upstream request failed".to_string(),
            }
        }
    })?;

    let status = response.status();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    // Stream the body with progressive size enforcement so chunked
    // responses without Content-Length cannot exhaust memory.
    let mut body_buf = Vec::with_capacity(
        response
            .content_length()
            .map(|cl| cl as usize)
            .unwrap_or(8192)
            .min(MAX_RESPONSE_BODY_SIZE),
    );
    while let Some(chunk) = response.chunk().await.map_err(|e| {
        if e.is_timeout() {
            GatewayError::OriginTimeout(timeout_secs)
        } else {
            GatewayError::OriginFailed {
                status: Some(status.as_u16()),
                message: "failed to read upstream response".to_string(),
            }
        }
    })? {
        if body_buf.len() + chunk.len() > MAX_RESPONSE_BODY_SIZE {
            return Err(GatewayError::OriginFailed {
                status: Some(status.as_u16()),
                message: format!("upstream response too large (max {MAX_RESPONSE_BODY_SIZE} bytes)"),
            });
        }
        body_buf.extend_from_slice(&chunk);
    }

    if !status.is_success() {
        let snippet = String::from_utf8_lossy(&body_buf)
            .chars()
            .take(ERROR_BODY_SNIPPET)
            .collect::<String>();
        // 4xx error pages often echo the requested URL, which for query-auth
        // endpoints contains the credential. Scrub it before the snippet can
        // reach logs or a response body.
        return Err(GatewayError::OriginFailed {
            status: Some(status.as_u16()),
            message: redact_credential(snippet, credential),
        });
    }

    Ok(OriginResponse {
        status: status.as_u16(),
        content_type,
        body: Bytes::from(body_buf),
    })
}

/// Replace any occurrence of the decrypted credential (raw or
/// percent-encoded) in upstream diagnostic text.
fn redact_credential(snippet: String, credential: Option<&str>) -> String {
    let Some(secret) = credential else {
        return snippet;
    };
    let snippet = snippet.replace(secret, "[REDACTED]");
    let encoded = urlencoding::encode(secret);
    snippet.replace(encoded.as_ref(), "[REDACTED]")
}
