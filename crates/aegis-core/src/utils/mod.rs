//! Small request-shaping helpers used by the proxy.

pub mod headers;
