//! Deterministic address derivation from extended public keys.
//!
//! Derivation is a pure function of `(xpub, chain, index)`: non-hardened
//! BIP-32 public child derivation followed by the chain's address encoding.
//! The stateful part (index allocation, persistence) lives in
//! [`address_book`].

pub mod address_book;
pub mod encoding;

use crate::error::ErrorClass;
use bip32::{ChildNumber, XPub};
use chainpay_sdk::objects::{Blockchain, ChainFamily};
use std::str::FromStr;
use thiserror::Error;

pub use address_book::{AddressBook, AddressBookError};
pub use encoding::validate_address;

/// Shortest serialized extended key that can be valid.
const MIN_XPUB_LEN: usize = 111;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeriveError {
    #[error("invalid extended public key: {0}")]
    InvalidXpub(String),
    #[error("index {0} is hardened and cannot be derived from a public key")]
    HardenedIndex(u32),
    #[error("child key derivation failed at index {index}: {reason}")]
    ChildKey { index: u32, reason: String },
    #[error("address derivation is not supported for {0}")]
    Unsupported(Blockchain),
}

impl DeriveError {
    pub fn class(&self) -> ErrorClass {
        match self {
            DeriveError::Unsupported(_) => ErrorClass::Validation,
            _ => ErrorClass::DerivationFailed,
        }
    }
}

/// One derived child: its index, address and compressed public key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedKey {
    pub index: u32,
    pub address: String,
    /// Hex of the 33-byte compressed public key.
    pub public_key: String,
}

/// Parse and validate an extended public key (`xpub...` or `tpub...`).
pub fn parse_xpub(xpub: &str) -> Result<XPub, DeriveError> {
    let xpub = xpub.trim();
    if xpub.len() < MIN_XPUB_LEN {
        return Err(DeriveError::InvalidXpub(format!(
            "expected at least {MIN_XPUB_LEN} characters, got {}",
            xpub.len()
        )));
    }
    XPub::from_str(xpub).map_err(|e| DeriveError::InvalidXpub(e.to_string()))
}

pub fn supports_derivation(blockchain: Blockchain) -> bool {
    matches!(
        blockchain.family(),
        ChainFamily::Utxo | ChainFamily::Evm | ChainFamily::Tron
    )
}

/// Derive the receiving address at `index`.
///
/// Same inputs always yield the same address.
pub fn derive(xpub: &str, blockchain: Blockchain, index: u32) -> Result<DerivedKey, DeriveError> {
    if !supports_derivation(blockchain) {
        return Err(DeriveError::Unsupported(blockchain));
    }
    let parent = parse_xpub(xpub)?;
    let child_number =
        ChildNumber::new(index, false).map_err(|_| DeriveError::HardenedIndex(index))?;
    let child = parent
        .derive_child(child_number)
        .map_err(|e| DeriveError::ChildKey {
            index,
            reason: e.to_string(),
        })?;
    let compressed = child.to_bytes();

    let address = match blockchain.family() {
        ChainFamily::Evm => {
            let account = encoding::account_hash(&compressed).map_err(|e| DeriveError::ChildKey {
                index,
                reason: e.to_string(),
            })?;
            encoding::evm_checksum_address(&account)
        }
        ChainFamily::Tron => {
            let account = encoding::account_hash(&compressed).map_err(|e| DeriveError::ChildKey {
                index,
                reason: e.to_string(),
            })?;
            encoding::tron_address(&account)
        }
        ChainFamily::Utxo => {
            let version = if xpub.trim_start().starts_with("tpub") {
                encoding::BTC_P2PKH_TESTNET
            } else {
                encoding::BTC_P2PKH_MAINNET
            };
            encoding::p2pkh_address(&compressed, version)
        }
        ChainFamily::Solana | ChainFamily::Monero => {
            return Err(DeriveError::Unsupported(blockchain));
        }
    };

    Ok(DerivedKey {
        index,
        address,
        public_key: hex::encode(compressed),
    })
}

/// Full path of a derived child, e.g. `m/44'/60'/0'/0/7`.
pub fn child_path(prefix: &str, index: u32) -> String {
    format!("{}/{}", prefix.trim_end_matches('/'), index)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// BIP-32 test vector 1, chain m/0H.
    pub(crate) const XPUB: &str = "xpub68Gmy5EdvgibQVfPdqkBBCHxA5htiqg55crXYuXoQRKfDBFA1WEjWgP6LHhwBZeNK1VTsfTFUHCdrfp1bgwQ9xv5ski8PX9rL2dZXvgGDnw";

    #[test]
    fn bitcoin_matches_published_vector() {
        // m/0H/1 from the BIP-32 vector
        let key = derive(XPUB, Blockchain::Btc, 1).unwrap();
        assert_eq!(key.address, "1JQheacLPdM5ySCkrZkV66G2ApAXe1mqLj");
        assert_eq!(
            key.public_key,
            "03501e454bf00751f24b1b489aa925215d66af2234e3891c3b21a52bedb3cd711c"
        );
    }

    #[test]
    fn account_model_chains() {
        let key = derive(XPUB, Blockchain::Eth, 0).unwrap();
        assert_eq!(key.address, "0x91860ef4Fc12f4dCa2564A3f7fcceA9325831aC6");
        assert_eq!(
            key.public_key,
            "033171c5f58a4504363dba2ca6cb7d6275f743bc8dada02dffef75912eaeeacf13"
        );

        // every EVM chain shares the encoding
        let polygon = derive(XPUB, Blockchain::Matic, 1).unwrap();
        assert_eq!(polygon.address, "0x29379f45F515C494483298225d1B347F73D1babF");

        let tron = derive(XPUB, Blockchain::Tron, 0).unwrap();
        assert_eq!(tron.address, "TPEfaR9SuTzhzpwCQZDTDRmZNkKunjb92m");
        let tron = derive(XPUB, Blockchain::Tron, 2).unwrap();
        assert_eq!(tron.address, "TYovs7VQZmjMvnMZyyYJYnYCFmJkdsebF7");
    }

    #[test]
    fn deterministic() {
        let first = derive(XPUB, Blockchain::Btc, 2).unwrap();
        let second = derive(XPUB, Blockchain::Btc, 2).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.address, "1MF1zYw5uEQiESDYq88vdEde6bLjah6tiu");
        assert_ne!(first, derive(XPUB, Blockchain::Btc, 3).unwrap());
    }

    #[test]
    fn derived_addresses_pass_validation() {
        for chain in [Blockchain::Btc, Blockchain::Eth, Blockchain::Avax, Blockchain::Tron] {
            let key = derive(XPUB, chain, 5).unwrap();
            assert!(validate_address(chain, &key.address), "{chain}");
        }
    }

    #[test]
    fn failures() {
        let err = derive("xpub-short", Blockchain::Eth, 0).unwrap_err();
        assert!(matches!(err, DeriveError::InvalidXpub(_)));
        assert_eq!(err.class(), ErrorClass::DerivationFailed);

        let mut corrupted = XPUB.to_owned();
        corrupted.replace_range(20..21, "z");
        assert!(matches!(
            derive(&corrupted, Blockchain::Eth, 0),
            Err(DeriveError::InvalidXpub(_))
        ));

        assert!(matches!(
            derive(XPUB, Blockchain::Eth, 0x8000_0000),
            Err(DeriveError::HardenedIndex(_))
        ));

        let err = derive(XPUB, Blockchain::Sol, 0).unwrap_err();
        assert_eq!(err, DeriveError::Unsupported(Blockchain::Sol));
        assert_eq!(err.class(), ErrorClass::Validation);
    }

    #[test]
    fn paths() {
        assert_eq!(child_path("m/44'/60'/0'/0", 7), "m/44'/60'/0'/0/7");
        assert_eq!(child_path("m/44'/0'/0'/0/", 0), "m/44'/0'/0'/0/0");
    }
}
