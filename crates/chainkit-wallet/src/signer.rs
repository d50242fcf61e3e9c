//! Software signer over a supplied secret key.
//!
//! Hardware and remote signers live outside this crate; `KeySigner` exists
//! for the CLI, tests and hosts that keep keys in process. The secret is
//! zeroized on drop.

use async_trait::async_trait;
use ed25519_dalek::{Signer as _, SigningKey};
use secp256k1::{Message, Secp256k1, SecretKey};
use std::fmt;
use zeroize::Zeroizing;

use chainkit_core::{Curve, PublicKey, SignerError, TransactionSigner};

pub struct KeySigner {
    curve: Curve,
    secret: Zeroizing<[u8; 32]>,
    public_key: Vec<u8>,
}

impl KeySigner {
    /// secp256k1 signer; the public key is the 33-byte compressed point.
    pub fn secp256k1(secret: [u8; 32]) -> Result<Self, SignerError> {
        let secret = Zeroizing::new(secret);
        let sk = SecretKey::from_slice(secret.as_slice())
            .map_err(|e| SignerError::Rejected(format!("invalid secp256k1 key: {e}")))?;
        let public_key = sk.public_key(&Secp256k1::signing_only()).serialize().to_vec();
        Ok(Self { curve: Curve::Secp256k1, secret, public_key })
    }

    /// Ed25519 signer from a 32-byte seed.
    pub fn ed25519(secret: [u8; 32]) -> Self {
        let secret = Zeroizing::new(secret);
        let public_key = SigningKey::from_bytes(&secret).verifying_key().to_bytes().to_vec();
        Self { curve: Curve::Ed25519, secret, public_key }
    }

    pub fn from_hex(curve: Curve, secret_hex: &str) -> Result<Self, SignerError> {
        let bytes = Zeroizing::new(
            hex::decode(secret_hex.trim().trim_start_matches("0x"))
                .map_err(|e| SignerError::Rejected(format!("secret is not hex: {e}")))?,
        );
        let secret: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| SignerError::Rejected("secret must be 32 bytes".into()))?;
        match curve {
            Curve::Secp256k1 => Self::secp256k1(secret),
            Curve::Ed25519 => Ok(Self::ed25519(secret)),
        }
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }

    /// secp256k1: 65 bytes `r || s || recid` over a 32-byte digest.
    /// Ed25519: 64-byte signature over the payload as given.
    fn sign_payload(&self, payload: &[u8]) -> Result<Vec<u8>, SignerError> {
        match self.curve {
            Curve::Secp256k1 => {
                let sk = SecretKey::from_slice(self.secret.as_slice())
                    .map_err(|e| SignerError::Device(e.to_string()))?;
                let message = Message::from_digest_slice(payload)
                    .map_err(|_| SignerError::Rejected("secp256k1 signs 32-byte digests".into()))?;
                let (recovery_id, compact) = Secp256k1::signing_only()
                    .sign_ecdsa_recoverable(&message, &sk)
                    .serialize_compact();
                let mut out = compact.to_vec();
                out.push(recovery_id.to_i32() as u8);
                Ok(out)
            }
            Curve::Ed25519 => Ok(SigningKey::from_bytes(&self.secret).sign(payload).to_bytes().to_vec()),
        }
    }

    fn check_key(&self, public_key: &PublicKey) -> Result<(), SignerError> {
        if public_key.blockchain_key() == self.public_key.as_slice() {
            Ok(())
        } else {
            Err(SignerError::Rejected("public key does not belong to this signer".into()))
        }
    }
}

impl fmt::Debug for KeySigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeySigner")
            .field("curve", &self.curve)
            .field("public_key", &hex::encode(&self.public_key))
            .field("secret", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl TransactionSigner for KeySigner {
    async fn sign(&self, hash: &[u8], public_key: &PublicKey) -> Result<Vec<u8>, SignerError> {
        self.check_key(public_key)?;
        self.sign_payload(hash)
    }

    async fn sign_batch(
        &self,
        hashes: &[Vec<u8>],
        public_key: &PublicKey,
    ) -> Result<Vec<Vec<u8>>, SignerError> {
        self.check_key(public_key)?;
        hashes.iter().map(|h| self.sign_payload(h)).collect()
    }
}
