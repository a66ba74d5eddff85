//! Request authentication for the interaction webhook.
//!
//! Discord signs every interaction with the application's Ed25519 key over
//! `timestamp || body`. Verification runs on the raw bytes before any JSON
//! parsing: re-serialising the body is not guaranteed to reproduce what was
//! signed.

use axum::http::HeaderMap;
use ed25519_dalek::{Signature, Verifier, VerifyingKey, PUBLIC_KEY_LENGTH};

use crate::config::ConfigError;

pub const SIGNATURE_HEADER: &str = "x-signature-ed25519";
pub const TIMESTAMP_HEADER: &str = "x-signature-timestamp";

#[derive(Debug, Clone)]
pub struct SignatureVerifier {
    key: VerifyingKey,
}

impl SignatureVerifier {
    pub fn new(key: VerifyingKey) -> Self {
        Self { key }
    }

    /// Parse the hex-encoded public key shown in the developer portal.
    pub fn from_hex(public_key: &str) -> Result<Self, ConfigError> {
        let bytes = hex::decode(public_key.trim())
            .map_err(|e| ConfigError::PublicKey(e.to_string()))?;
        let bytes: [u8; PUBLIC_KEY_LENGTH] = bytes.try_into().map_err(|b: Vec<u8>| {
            ConfigError::PublicKey(format!(
                "expected {} bytes, got {}",
                PUBLIC_KEY_LENGTH,
                b.len()
            ))
        })?;
        let key =
            VerifyingKey::from_bytes(&bytes).map_err(|e| ConfigError::PublicKey(e.to_string()))?;
        Ok(Self { key })
    }

    /// Check a hex signature over `timestamp || body`.
    ///
    /// Any missing or malformed input yields `false`.
    pub fn verify(&self, signature: Option<&str>, timestamp: Option<&str>, body: &[u8]) -> bool {
        let (Some(signature), Some(timestamp)) = (signature, timestamp) else {
            return false;
        };
        let Ok(raw) = hex::decode(signature) else {
            return false;
        };
        let Ok(signature) = Signature::from_slice(&raw) else {
            return false;
        };

        let mut message = Vec::with_capacity(timestamp.len() + body.len());
        message.extend_from_slice(timestamp.as_bytes());
        message.extend_from_slice(body);

        self.key.verify(&message, &signature).is_ok()
    }

    /// [`Self::verify`] reading the signature and timestamp headers.
    pub fn verify_headers(&self, headers: &HeaderMap, body: &[u8]) -> bool {
        let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok());
        self.verify(header(SIGNATURE_HEADER), header(TIMESTAMP_HEADER), body)
    }
}


#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::testing::{sign, signing_key};
    use super::*;

    const TIMESTAMP: &str = "1700000000";
    const BODY: &[u8] = br#"{"type":1}"#;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(signing_key().verifying_key())
    }

    fn flip_bit(bytes: &[u8], bit: usize) -> Vec<u8> {
        let mut out = bytes.to_vec();
        out[bit / 8] ^= 1 << (bit % 8);
        out
    }

    #[test]
    fn accepts_a_valid_signature() {
        let sig = sign(&signing_key(), TIMESTAMP, BODY);
        assert!(verifier().verify(Some(&sig), Some(TIMESTAMP), BODY));
    }

    #[test]
    fn from_hex_round_trips_the_key() {
        let hex_key = hex::encode(signing_key().verifying_key().to_bytes());
        let verifier = SignatureVerifier::from_hex(&hex_key).unwrap();
        let sig = sign(&signing_key(), TIMESTAMP, BODY);
        assert!(verifier.verify(Some(&sig), Some(TIMESTAMP), BODY));
    }

    #[test]
    fn from_hex_rejects_bad_keys() {
        assert!(SignatureVerifier::from_hex("not hex").is_err());
        assert!(SignatureVerifier::from_hex("abcd").is_err());
    }

    #[test]
    fn missing_headers_fail_closed() {
        let sig = sign(&signing_key(), TIMESTAMP, BODY);
        let v = verifier();
        assert!(!v.verify(None, Some(TIMESTAMP), BODY));
        assert!(!v.verify(Some(&sig), None, BODY));
        assert!(!v.verify(None, None, BODY));
    }

    #[test]
    fn malformed_signature_fails_closed() {
        let v = verifier();
        assert!(!v.verify(Some("zz"), Some(TIMESTAMP), BODY));
        assert!(!v.verify(Some("abcd"), Some(TIMESTAMP), BODY));
        assert!(!v.verify(Some(""), Some(TIMESTAMP), BODY));
    }

    #[test]
    fn any_single_bit_flip_in_the_signature_is_rejected() {
        let v = verifier();
        let sig = hex::decode(sign(&signing_key(), TIMESTAMP, BODY)).unwrap();
        for bit in 0..sig.len() * 8 {
            let mutated = hex::encode(flip_bit(&sig, bit));
            assert!(
                !v.verify(Some(&mutated), Some(TIMESTAMP), BODY),
                "bit {} of signature",
                bit
            );
        }
    }

    #[test]
    fn any_single_bit_flip_in_timestamp_or_body_is_rejected() {
        let v = verifier();
        let sig = sign(&signing_key(), TIMESTAMP, BODY);

        for bit in 0..TIMESTAMP.len() * 8 {
            let mutated = flip_bit(TIMESTAMP.as_bytes(), bit);
            // Non-UTF-8 timestamps can't reach us as header strings.
            if let Ok(ts) = std::str::from_utf8(&mutated) {
                assert!(!v.verify(Some(&sig), Some(ts), BODY), "bit {} of timestamp", bit);
            }
        }

        for bit in 0..BODY.len() * 8 {
            let mutated = flip_bit(BODY, bit);
            assert!(!v.verify(Some(&sig), Some(TIMESTAMP), &mutated), "bit {} of body", bit);
        }
    }

    #[test]
    fn verify_headers_reads_both_headers() {
        let sig = sign(&signing_key(), TIMESTAMP, BODY);
        let mut headers = HeaderMap::new();
        headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&sig).unwrap());
        headers.insert(TIMESTAMP_HEADER, HeaderValue::from_static(TIMESTAMP));
        assert!(verifier().verify_headers(&headers, BODY));

        headers.remove(TIMESTAMP_HEADER);
        assert!(!verifier().verify_headers(&headers, BODY));
    }
}
