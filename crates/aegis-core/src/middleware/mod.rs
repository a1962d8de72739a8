//! Cross-cutting request concerns that sit ahead of the proxy's retry loop.

pub mod auth;
