//! HMAC signatures on both sides of the gateway.
//!
//! * **Provider notifications** (inbound): the chain-watching provider signs
//!   the raw request body with HMAC-SHA512 and sends the padded base64 digest
//!   in the [`PROVIDER_SIGNATURE_HEADER`] header.
//!
//! * **Merchant notifications** (outbound): the gateway signs
//!   `"{timestamp}.{json_body}"` with HMAC-SHA256 using the merchant secret:
//!
//! ```text
//! Chainpay-Signature: {unix_timestamp}.{base64_signature}
//! ```

use ring::hmac;

/// Header carrying the merchant-notification signature.
pub const SIGNATURE_HEADER: &str = "Chainpay-Signature";

/// Header carrying the provider's body digest.
pub const PROVIDER_SIGNATURE_HEADER: &str = "x-payload-hash";

/// Maximum accepted age of a merchant-notification signature, in seconds.
pub const MAX_SIGNATURE_AGE: i64 = 5 * 60;

/// Marker trait for payloads that can be wrapped in a [`SignedObject`].
pub trait Signature: for<'de> serde::Deserialize<'de> + serde::Serialize {}

#[derive(Debug, thiserror::Error)]
pub enum SignatureError {
    #[error("invalid header format")]
    InvalidFormat,
    #[error("invalid base64 encoding")]
    InvalidBase64,
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid signature")]
    SignatureMismatch,
    #[error("signature expired")]
    Expired,
}

impl From<ring::error::Unspecified> for SignatureError {
    fn from(_: ring::error::Unspecified) -> Self {
        Self::SignatureMismatch
    }
}

// ---------------------------------------------------------------------------
// Provider notifications
// ---------------------------------------------------------------------------

/// Compute the provider digest of `body`: base64(HMAC-SHA512(body, secret)).
pub fn sign_provider_payload(body: &[u8], secret: &[u8]) -> String {
    let tag = hmac::sign(&hmac::Key::new(hmac::HMAC_SHA512, secret), body);
    fast32::base64::RFC4648.encode(tag.as_ref())
}

/// Verify a provider digest in constant time.
pub fn verify_provider_payload(
    body: &[u8],
    header_value: &str,
    secret: &[u8],
) -> Result<(), SignatureError> {
    let digest = fast32::base64::RFC4648
        .decode_str(header_value.trim())
        .map_err(|_| SignatureError::InvalidBase64)?;
    hmac::verify(
        &hmac::Key::new(hmac::HMAC_SHA512, secret),
        body,
        digest.as_slice(),
    )?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Merchant notifications
// ---------------------------------------------------------------------------

/// A payload together with its serialized form and HMAC-SHA256 signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedObject<T: Signature> {
    pub body: T,
    pub timestamp: i64,
    pub json: String,
    pub signature: Box<[u8]>,
}

impl<T: Signature> SignedObject<T> {
    /// Sign `body` with the current time.
    pub fn new(body: T, key: &[u8]) -> Result<Self, serde_json::Error> {
        let timestamp = time::OffsetDateTime::now_utc().unix_timestamp();
        let json = serde_json::to_string(&body)?;
        let signature = merchant_tag(key, timestamp, &json)
            .as_ref()
            .to_vec()
            .into_boxed_slice();
        Ok(Self {
            body,
            timestamp,
            json,
            signature,
        })
    }

    /// Rebuild from a received header and body. Does **not** verify; call
    /// [`verify`](Self::verify).
    pub fn from_header_and_body(header_value: &str, json: String) -> Result<Self, SignatureError> {
        let (timestamp, signature) = parse_signature_header(header_value)?;
        let body: T = serde_json::from_str(&json)?;
        Ok(Self {
            body,
            timestamp,
            json,
            signature,
        })
    }

    pub fn verify(self, key: &[u8]) -> Result<T, SignatureError> {
        let data = format!("{}.{}", self.timestamp, self.json);
        hmac::verify(
            &hmac::Key::new(hmac::HMAC_SHA256, key),
            data.as_bytes(),
            &self.signature,
        )?;
        let now = time::OffsetDateTime::now_utc().unix_timestamp();
        if now - self.timestamp > MAX_SIGNATURE_AGE {
            return Err(SignatureError::Expired);
        }
        Ok(self.body)
    }

    pub fn to_header(&self) -> String {
        format!(
            "{}.{}",
            self.timestamp,
            fast32::base64::RFC4648_NOPAD.encode(&self.signature)
        )
    }
}

fn merchant_tag(key: &[u8], timestamp: i64, json: &str) -> hmac::Tag {
    let data = format!("{timestamp}.{json}");
    hmac::sign(&hmac::Key::new(hmac::HMAC_SHA256, key), data.as_bytes())
}

/// Split a `{timestamp}.{base64}` header into its parts.
pub fn parse_signature_header(value: &str) -> Result<(i64, Box<[u8]>), SignatureError> {
    let (timestamp, encoded) = value.split_once('.').ok_or(SignatureError::InvalidFormat)?;
    let timestamp: i64 = timestamp
        .parse()
        .map_err(|_| SignatureError::InvalidFormat)?;
    let signature = fast32::base64::RFC4648_NOPAD
        .decode_str(encoded)
        .map_err(|_| SignatureError::InvalidBase64)?
        .into_boxed_slice();
    Ok((timestamp, signature))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    impl Signature for Ping {}

    #[test]
    fn provider_digest_verifies_only_with_same_secret_and_body() {
        let body = br#"{"txId":"abc","amount":"1.5"}"#;
        let digest = sign_provider_payload(body, b"provider-secret");

        assert!(verify_provider_payload(body, &digest, b"provider-secret").is_ok());
        assert!(matches!(
            verify_provider_payload(body, &digest, b"other-secret"),
            Err(SignatureError::SignatureMismatch)
        ));
        assert!(matches!(
            verify_provider_payload(br#"{"txId":"abc","amount":"9.5"}"#, &digest, b"provider-secret"),
            Err(SignatureError::SignatureMismatch)
        ));
        assert!(matches!(
            verify_provider_payload(body, "%%%", b"provider-secret"),
            Err(SignatureError::InvalidBase64)
        ));
    }

    #[test]
    fn merchant_header_round_trip() {
        let signed = SignedObject::new(Ping { n: 7 }, b"merchant").unwrap();
        let header = signed.to_header();
        let received = SignedObject::<Ping>::from_header_and_body(&header, signed.json.clone()).unwrap();
        assert_eq!(received.verify(b"merchant").unwrap(), Ping { n: 7 });

        let tampered = SignedObject::<Ping>::from_header_and_body(&header, r#"{"n":8}"#.into()).unwrap();
        assert!(tampered.verify(b"merchant").is_err());
    }

    #[test]
    fn malformed_header() {
        assert!(matches!(
            parse_signature_header("no-dot-here"),
            Err(SignatureError::InvalidFormat)
        ));
        assert!(matches!(
            parse_signature_header("abc.AAAA"),
            Err(SignatureError::InvalidFormat)
        ));
    }
}
