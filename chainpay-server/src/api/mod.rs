//! HTTP surface: the provider webhook and the operator API.

pub mod admin;
pub mod extractors;
pub mod webhooks;
