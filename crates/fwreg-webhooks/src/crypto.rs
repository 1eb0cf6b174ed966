//! HMAC-SHA256 payload signing.
//!
//! The signature is the lower-case hex HMAC of the exact request body, with
//! no scheme prefix and no timestamp.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the signature (`X-Webhook-Signature`).
pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

/// Compute `hex(HMAC-SHA256(secret, body))`.
#[must_use]
pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
        .expect("HMAC can take key of any size");
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Check a received signature in constant time.
#[must_use]
pub fn verify_signature(signature_hex: &str, secret: &str, body: &[u8]) -> bool {
    let computed = sign_payload(secret, body);
    signature_hex.as_bytes().ct_eq(computed.as_bytes()).into()
}
