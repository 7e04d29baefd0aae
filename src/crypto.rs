//! LINE webhook signature verification
//!
//! The platform signs every webhook body with HMAC-SHA256 keyed by the
//! channel secret and sends the base64 digest in `X-Line-Signature`.

use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the request signature
pub const SIGNATURE_HEADER: &str = "X-Line-Signature";

/// Signature verifier for inbound webhook requests
pub struct LineSignature;

impl LineSignature {
    /// Verify a base64 signature header against the raw request body
    ///
    /// Returns `false` when the header is not valid base64 or the MAC differs.
    pub fn verify(body: &[u8], signature: &str, channel_secret: &str) -> bool {
        let Ok(provided) = BASE64.decode(signature.trim()) else {
            return false;
        };
        let Some(expected) = Self::mac(body, channel_secret) else {
            return false;
        };

        expected.ct_eq(provided.as_slice()).into()
    }

    /// Generate the base64 signature for a body
    pub fn sign(body: &[u8], channel_secret: &str) -> String {
        Self::mac(body, channel_secret)
            .map(|mac| BASE64.encode(mac))
            .unwrap_or_default()
    }

    fn mac(body: &[u8], channel_secret: &str) -> Option<Vec<u8>> {
        let mut mac = HmacSha256::new_from_slice(channel_secret.as_bytes()).ok()?;
        mac.update(body);
        Some(mac.finalize().into_bytes().to_vec())
    }
}
