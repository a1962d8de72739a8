//! HTTP-facing endpoints that live outside the proxied pipeline.

pub mod status;
