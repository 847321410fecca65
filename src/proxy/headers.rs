//! Header utilities for upstream provider calls
//!
//! Upstream headers are built from scratch for every call. Client headers
//! are never forwarded, so gateway credentials of the caller cannot leak to
//! a provider.

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};

use crate::error::{AppError, AppResult};
use crate::providers::{AuthStyle, ProviderInfo};

fn header_value(provider: &str, value: &str) -> AppResult<HeaderValue> {
    HeaderValue::from_str(value).map_err(|_| {
        AppError::ServiceUnavailable(format!("Invalid credentials configured for {}", provider))
    })
}

/// Build the headers for one call to `info`'s API
///
/// Sets the provider's auth header, its fixed extra headers, a JSON content
/// type and an SSE accept header.
pub fn build_provider_headers(info: &ProviderInfo, api_key: &str) -> AppResult<HeaderMap> {
    let mut headers = HeaderMap::new();

    match info.auth {
        AuthStyle::Bearer => {
            headers.insert(AUTHORIZATION, header_value(info.id, &format!("Bearer {}", api_key))?);
        }
        AuthStyle::Header(name) => {
            headers.insert(HeaderName::from_static(name), header_value(info.id, api_key)?);
        }
    }

    for &(name, value) in info.extra_headers {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }

    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(ACCEPT, HeaderValue::from_static("text/event-stream"));

    Ok(headers)
}
