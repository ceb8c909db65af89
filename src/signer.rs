//! Outbound envelope signing and constant-time secret comparison

use hmac::{Hmac, Mac};
use sha2::Sha512;

use crate::error::{AppError, AppResult, SecurityError};

type HmacSha512 = Hmac<Sha512>;

/// Signs outbound response envelopes. The production signer is backed by a
/// deployment secret; tests substitute their own implementation.
pub trait Signer: Send + Sync {
    fn sign(&self, message: &[u8]) -> AppResult<String>;
}

/// HMAC-SHA512 signer producing lowercase hex signatures
pub struct HmacSigner {
    secret: String,
}

impl HmacSigner {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl Signer for HmacSigner {
    fn sign(&self, message: &[u8]) -> AppResult<String> {
        let mut mac = HmacSha512::new_from_slice(self.secret.as_bytes()).map_err(|e| {
            AppError::security(SecurityError::SignatureMismatch {
                message: format!("invalid signing key: {}", e),
            })
        })?;
        mac.update(message);
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

/// Constant-time byte comparison for callback tokens and signatures
pub fn secure_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter()
        .zip(b.iter())
        .fold(0_u8, |acc, (x, y)| acc | (x ^ y))
        == 0
}
