//! Webhook signature verification.
//!
//! Signatures are always computed over the raw request body, before any JSON parsing.
//!
//! - Flutterwave sends the configured secret hash verbatim in `verif-hash`; newer
//!   integrations instead send `flutterwave-signature`, a hex HMAC-SHA256 of the body keyed
//!   by the same secret.
//! - Paystack sends `x-paystack-signature`, a hex HMAC-SHA512 of the body.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::{Sha256, Sha512};

use crate::config::Secret;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

pub const FLUTTERWAVE_HASH_HEADER: &str = "verif-hash";
pub const FLUTTERWAVE_SIGNATURE_HEADER: &str = "flutterwave-signature";
pub const PAYSTACK_SIGNATURE_HEADER: &str = "x-paystack-signature";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    #[error("Webhook secret is not configured")]
    SecretNotConfigured,
    #[error("Missing webhook signature")]
    MissingSignature,
    #[error("Invalid webhook signature")]
    Mismatch,
}

/// Hex HMAC-SHA256 of `body`, as a provider would send it.
#[cfg(test)]
pub fn hmac_sha256_hex(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Hex HMAC-SHA512 of `body`.
#[cfg(test)]
pub fn hmac_sha512_hex(secret: &str, body: &[u8]) -> String {
    let mut mac = HmacSha512::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Length-checked comparison that does not short-circuit on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Checks a hex MAC header against `mac`; `verify_slice` compares in constant time.
fn verify_hex_mac<M: Mac>(mac: M, provided: &str) -> bool {
    hex::decode(provided).is_ok_and(|tag| mac.verify_slice(&tag).is_ok())
}

pub fn verify_flutterwave(
    secret: Option<&Secret>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), SignatureError> {
    let secret = secret.ok_or(SignatureError::SecretNotConfigured)?;
    let verif_hash = header(headers, FLUTTERWAVE_HASH_HEADER);
    let signature = header(headers, FLUTTERWAVE_SIGNATURE_HEADER);

    if verif_hash.is_none() && signature.is_none() {
        return Err(SignatureError::MissingSignature);
    }
    if verif_hash.is_some_and(|hash| constant_time_eq(hash.as_bytes(), secret.reveal().as_bytes())) {
        return Ok(());
    }
    if let Some(signature) = signature {
        // HMAC accepts keys of any length
        let mut mac = HmacSha256::new_from_slice(secret.reveal().as_bytes())
            .expect("HMAC key length is valid");
        mac.update(body);
        if verify_hex_mac(mac, signature) {
            return Ok(());
        }
    }
    Err(SignatureError::Mismatch)
}

pub fn verify_paystack(
    secret: Option<&Secret>,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<(), SignatureError> {
    let secret = secret.ok_or(SignatureError::SecretNotConfigured)?;
    let signature =
        header(headers, PAYSTACK_SIGNATURE_HEADER).ok_or(SignatureError::MissingSignature)?;
    let mut mac =
        HmacSha512::new_from_slice(secret.reveal().as_bytes()).expect("HMAC key length is valid");
    mac.update(body);
    if verify_hex_mac(mac, signature) {
        Ok(())
    } else {
        Err(SignatureError::Mismatch)
    }
}
