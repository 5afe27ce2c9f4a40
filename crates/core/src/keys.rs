use data_encoding::BASE32_NOPAD;
use rand::rngs::OsRng;
use rand::RngCore;
use std::fmt;
use x25519_dalek::{x25519, X25519_BASEPOINT_BYTES};

/// An x25519 key pair for onion-service client authentication (v3)
///
/// Generated fresh per session and never persisted. The public half is
/// registered with the daemon at service creation; the private half is
/// printed once for the operator to hand to the client out-of-band.
#[derive(Clone)]
pub struct ClientAuthKeyPair {
    secret: [u8; 32],
    public: [u8; 32],
}

impl ClientAuthKeyPair {
    /// Generate a new random key pair from OS entropy
    ///
    /// An entropy failure is unrecoverable; callers treat it as fatal.
    pub fn generate() -> Result<Self, KeyError> {
        let mut secret = [0u8; 32];
        OsRng
            .try_fill_bytes(&mut secret)
            .map_err(|e| KeyError::Entropy(e.to_string()))?;

        Ok(Self::from_secret_bytes(secret))
    }

    /// Create a key pair from a raw secret scalar
    pub fn from_secret_bytes(secret: [u8; 32]) -> Self {
        let public = x25519(secret, X25519_BASEPOINT_BYTES);
        Self { secret, public }
    }

    /// Get the secret key bytes
    pub fn secret_bytes(&self) -> [u8; 32] {
        self.secret
    }

    /// Get the public key bytes
    pub fn public_bytes(&self) -> [u8; 32] {
        self.public
    }

    /// Encode both halves as unpadded upper-case base32 (RFC 4648)
    ///
    /// The daemon's ClientAuthV3 mechanism expects exactly this text form
    /// for the public half.
    pub fn encode(&self) -> EncodedClientAuth {
        EncodedClientAuth {
            private: BASE32_NOPAD.encode(&self.secret_bytes()),
            public: BASE32_NOPAD.encode(&self.public_bytes()),
        }
    }
}

impl fmt::Debug for ClientAuthKeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientAuthKeyPair")
            .field("public", &BASE32_NOPAD.encode(&self.public_bytes()))
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// The text form of a client-auth key pair: base32, unpadded, upper-case
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedClientAuth {
    pub private: String,
    pub public: String,
}

/// Errors related to key provisioning
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("Entropy source failed: {0}")]
    Entropy(String),
}

impl From<KeyError> for onion_common::OnionError {
    fn from(err: KeyError) -> Self {
        match err {
            KeyError::Entropy(msg) => onion_common::OnionError::Entropy(msg),
        }
    }
}
