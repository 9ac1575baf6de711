use std::fmt;
use std::path::Path;

use ed25519_dalek::{Signer, SigningKey};

use super::{Address, LedgerError};
use crate::error::{AgentError, Result};

/// An ed25519 signing identity in the 64-byte `[secret | public]` layout
/// used by ledger keypair files.
pub struct Keypair {
    signing: SigningKey,
}

impl Keypair {
    pub fn from_seed(seed: [u8; 32]) -> Self {
        Self {
            signing: SigningKey::from_bytes(&seed),
        }
    }

    /// Parse the 64-byte layout, checking that the public half matches the
    /// key derived from the secret half.
    pub fn from_bytes(bytes: &[u8]) -> std::result::Result<Self, LedgerError> {
        if bytes.len() != 64 {
            return Err(LedgerError::Signing(format!(
                "expected 64 bytes, got {}",
                bytes.len()
            )));
        }
        let mut seed = [0u8; 32];
        seed.copy_from_slice(&bytes[..32]);
        let keypair = Self::from_seed(seed);
        if keypair.signing.verifying_key().as_bytes() != &bytes[32..] {
            return Err(LedgerError::Signing(
                "public key does not match secret key".into(),
            ));
        }
        Ok(keypair)
    }

    /// Load a keypair file: a JSON array of 64 integers.
    pub fn read_file(path: &Path) -> Result<Self> {
        let fail = |reason: String| AgentError::Keypair {
            path: path.display().to_string(),
            reason,
        };
        let raw = std::fs::read_to_string(path).map_err(|e| fail(e.to_string()))?;
        let bytes: Vec<u8> = serde_json::from_str(&raw).map_err(|e| fail(e.to_string()))?;
        Self::from_bytes(&bytes).map_err(|e| fail(e.to_string()))
    }

    /// The 64-byte file layout.
    pub fn to_bytes(&self) -> [u8; 64] {
        let mut out = [0u8; 64];
        out[..32].copy_from_slice(&self.signing.to_bytes());
        out[32..].copy_from_slice(self.signing.verifying_key().as_bytes());
        out
    }

    pub fn pubkey(&self) -> Address {
        Address::from_bytes(self.signing.verifying_key().to_bytes())
    }

    /// Base58 ed25519 signature over `message`.
    pub fn sign(&self, message: &[u8]) -> String {
        bs58::encode(self.signing.sign(message).to_bytes()).into_string()
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("pubkey", &self.pubkey())
            .finish_non_exhaustive()
    }
}
