#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![forbid(unsafe_code)]

pub mod broadcast;
pub mod collaborators;
pub mod config;
pub mod currency;
pub mod derivation;
pub mod entities;
pub mod error;
pub mod events;
pub mod fees;
pub mod framework;
pub mod money;
pub mod processors;
pub mod rpc;
pub mod store;
pub mod utils;
