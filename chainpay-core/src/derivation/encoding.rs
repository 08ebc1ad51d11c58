//! Per-chain address encodings and format checks.

use chainpay_sdk::objects::{Blockchain, ChainFamily};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use sha2::{Digest, Sha256};
use sha3::Keccak256;

pub const BTC_P2PKH_MAINNET: u8 = 0x00;
pub const BTC_P2PKH_TESTNET: u8 = 0x6f;
const BTC_P2SH_MAINNET: u8 = 0x05;
const BTC_P2SH_TESTNET: u8 = 0xc4;
pub const TRON_ADDRESS_PREFIX: u8 = 0x41;

const BECH32_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";

/// Base58Check P2PKH address of a compressed public key.
pub fn p2pkh_address(compressed: &[u8], version: u8) -> String {
    let sha = Sha256::digest(compressed);
    let hash160 = ripemd::Ripemd160::digest(sha);
    let mut payload = Vec::with_capacity(21);
    payload.push(version);
    payload.extend_from_slice(&hash160);
    bs58::encode(payload).with_check().into_string()
}

/// Last 20 bytes of keccak256 over the uncompressed point (without the 0x04 tag).
pub fn account_hash(compressed: &[u8]) -> Result<[u8; 20], k256::elliptic_curve::Error> {
    let public = k256::PublicKey::from_sec1_bytes(compressed)?;
    let point = public.to_encoded_point(false);
    let digest = Keccak256::digest(&point.as_bytes()[1..]);
    let mut out = [0u8; 20];
    out.copy_from_slice(&digest[12..]);
    Ok(out)
}

/// EIP-55 mixed-case checksum encoding.
pub fn evm_checksum_address(account: &[u8; 20]) -> String {
    let lower = hex::encode(account);
    let digest = Keccak256::digest(lower.as_bytes());
    let mut out = String::with_capacity(42);
    out.push_str("0x");
    for (i, c) in lower.chars().enumerate() {
        let nibble = (digest[i / 2] >> (if i % 2 == 0 { 4 } else { 0 })) & 0x0f;
        if c.is_ascii_alphabetic() && nibble >= 8 {
            out.push(c.to_ascii_uppercase());
        } else {
            out.push(c);
        }
    }
    out
}

pub fn tron_address(account: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(21);
    payload.push(TRON_ADDRESS_PREFIX);
    payload.extend_from_slice(account);
    bs58::encode(payload).with_check().into_string()
}

/// Tron nodes report addresses as `41...` hex; convert to base58.
pub fn tron_hex_to_base58(hex_address: &str) -> Option<String> {
    let bytes = hex::decode(hex_address.trim_start_matches("0x")).ok()?;
    match bytes.as_slice() {
        [TRON_ADDRESS_PREFIX, rest @ ..] if rest.len() == 20 => {
            Some(bs58::encode(&bytes).with_check().into_string())
        }
        _ => None,
    }
}

/// Structural validation of a recipient address.
pub fn validate_address(blockchain: Blockchain, address: &str) -> bool {
    match blockchain.family() {
        ChainFamily::Evm => is_evm_address(address),
        ChainFamily::Tron => is_tron_address(address),
        ChainFamily::Utxo => is_btc_address(address),
        ChainFamily::Solana => bs58::decode(address)
            .into_vec()
            .is_ok_and(|bytes| bytes.len() == 32),
        ChainFamily::Monero => is_monero_address(address),
    }
}

fn is_evm_address(address: &str) -> bool {
    let Some(body) = address.strip_prefix("0x") else {
        return false;
    };
    if body.len() != 40 || !body.chars().all(|c| c.is_ascii_hexdigit()) {
        return false;
    }
    let all_lower = body.chars().all(|c| !c.is_ascii_uppercase());
    let all_upper = body.chars().all(|c| !c.is_ascii_lowercase());
    if all_lower || all_upper {
        return true;
    }
    // mixed case must carry a valid checksum
    let mut account = [0u8; 20];
    match hex::decode_to_slice(body, &mut account) {
        Ok(()) => evm_checksum_address(&account) == address,
        Err(_) => false,
    }
}

fn is_tron_address(address: &str) -> bool {
    bs58::decode(address)
        .with_check(None)
        .into_vec()
        .is_ok_and(|bytes| bytes.len() == 21 && bytes[0] == TRON_ADDRESS_PREFIX)
}

fn is_btc_address(address: &str) -> bool {
    let lower = address.to_ascii_lowercase();
    if lower.starts_with("bc1") || lower.starts_with("tb1") {
        let mixed = address != lower && address != address.to_ascii_uppercase();
        let data = &lower[3..];
        return !mixed
            && (11..=71).contains(&data.len())
            && data.chars().all(|c| BECH32_CHARSET.contains(c));
    }
    bs58::decode(address)
        .with_check(None)
        .into_vec()
        .is_ok_and(|bytes| {
            bytes.len() == 21
                && matches!(
                    bytes[0],
                    BTC_P2PKH_MAINNET | BTC_P2SH_MAINNET | BTC_P2PKH_TESTNET | BTC_P2SH_TESTNET
                )
        })
}

fn is_monero_address(address: &str) -> bool {
    const ALPHABET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
    matches!(address.len(), 95 | 106)
        && address
            .chars()
            .next()
            .is_some_and(|c| matches!(c, '4' | '8' | '5' | '7' | '9' | 'A' | 'B'))
        && address.chars().all(|c| ALPHABET.contains(c))
}
