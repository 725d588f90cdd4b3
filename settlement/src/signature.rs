//! Webhook signature verification
//!
//! The gateway signs each callback with HMAC-SHA256 over the raw payload
//! bytes, hex-encoded into a header. Verification is constant-time.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::collections::HashMap;

type HmacSha256 = Hmac<Sha256>;

/// Header names the gateway has used for the signature, in lookup order
pub const SIGNATURE_HEADERS: [&str; 3] =
    ["x-gateway-signature", "x-webhook-signature", "x-signature"];

/// Extract the signature from request headers, trying each known name
pub fn extract_signature(headers: &HashMap<String, String>) -> Option<String> {
    for name in SIGNATURE_HEADERS {
        for (key, value) in headers {
            if key.eq_ignore_ascii_case(name) && !value.is_empty() {
                return Some(value.clone());
            }
        }
    }
    None
}

/// Compute the hex-encoded HMAC-SHA256 signature for a payload
pub fn sign(payload: &[u8], secret: &str) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        // HMAC accepts keys of any length; this branch is unreachable
        Err(_) => return String::new(),
    };
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Verify a hex-encoded signature against the raw payload bytes
///
/// Uses `Mac::verify_slice`, a constant-time comparison, so the check does
/// not leak how many signature bytes matched.
pub fn verify(payload: &[u8], signature_hex: &str, secret: &str) -> bool {
    let decoded = match hex::decode(signature_hex.trim()) {
        Ok(bytes) => bytes,
        Err(_) => return false,
    };

    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return false,
    };
    mac.update(payload);
    mac.verify_slice(&decoded).is_ok()
}
