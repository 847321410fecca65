//! Integration tests for the Conduit gateway
//!
//! These tests drive the full router against wiremock upstreams, covering
//! request mapping, stream decoding, accumulation and event synthesis.

mod chat_completions;
mod health;
mod responses;
