//! Shared wire types for the chainpay gateway.
//!
//! Everything here is serializable and free of storage concerns, so it can
//! be used both by the gateway itself and by merchants consuming its
//! notifications.

pub mod objects;
pub mod signature;
