//! Proxy module
//!
//! Handles request forwarding to upstream AI providers.

pub mod headers;
pub mod logging;
pub mod upstream;

pub use headers::build_provider_headers;
pub use logging::RequestContext;
pub use upstream::{HttpUpstream, UpstreamRequest, UpstreamTransport};
