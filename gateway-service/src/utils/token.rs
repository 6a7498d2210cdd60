//! One-time invite secrets.
//!
//! Secrets are 32 bytes from the OS CSPRNG, handed out base64url-encoded.
//! Only a keyed HMAC-SHA256 of the encoded secret is ever persisted; the
//! hash is deterministic so the invite can be looked up by it.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use sha2::Sha256;
use std::fmt;

type HmacSha256 = Hmac<Sha256>;

const SECRET_BYTES: usize = 32;

/// Plaintext invite secret. Only ever leaves the process in the invite mail.
#[derive(Clone)]
pub struct InviteSecret(String);

impl InviteSecret {
    pub fn generate() -> Self {
        let mut bytes = [0u8; SECRET_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for InviteSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InviteSecret(***)")
    }
}

#[derive(Clone)]
pub struct SecretHasher {
    mac: HmacSha256,
}

impl SecretHasher {
    pub fn new(key: &[u8]) -> Result<Self, anyhow::Error> {
        if key.is_empty() {
            anyhow::bail!("invite hash key must not be empty");
        }
        let mac = HmacSha256::new_from_slice(key)
            .map_err(|e| anyhow::anyhow!("invalid invite hash key: {}", e))?;
        Ok(Self { mac })
    }

    /// Lowercase hex digest of `secret`.
    pub fn hash(&self, secret: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(secret.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}
