//! Runtime configuration types.
//!
//! These are the validated values the engines work with. Loading and
//! parsing the TOML file is handled by the server crate.

mod confirmation;
mod merchant;
mod rpc;

pub use confirmation::ConfirmationPolicy;
pub use merchant::MerchantContact;
pub use rpc::{NetworkPair, RpcEndpoint};
