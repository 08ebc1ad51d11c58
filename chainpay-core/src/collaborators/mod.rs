//! External services the engines depend on, each behind a trait.
//!
//! - [`TransactionSigner`]: the key-management service that turns an
//!   unsigned transfer intent into a signed payload.
//! - [`FiatConverter`]: crypto to USD conversion.
//! - [`MerchantDirectory`]: where a merchant wants notifications delivered.

mod merchants;
mod rates;
mod signer;

pub use merchants::{ConfiguredMerchants, MerchantDirectory};
pub use rates::{ConversionError, FiatConverter, StaticRates};
pub use signer::{KmsClient, SignedPayload, SignerError, SigningIntent, TransactionSigner};
