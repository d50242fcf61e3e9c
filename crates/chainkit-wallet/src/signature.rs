//! Signature post-processing between external signers and builders.
//!
//! Signers return whatever their hardware or library produces. Builders need
//! a fixed shape: canonical (low-S) ECDSA in compact or DER form, a recovery
//! id for chains that embed one, or a raw 64-byte Ed25519 signature.

use secp256k1::ecdsa::{RecoverableSignature, RecoveryId, Signature};
use secp256k1::{Message, PublicKey, Secp256k1};

use chainkit_core::BuildError;

pub const COMPACT_SIGNATURE_LEN: usize = 64;
pub const ED25519_SIGNATURE_LEN: usize = 64;

fn invalid(reason: impl Into<String>) -> BuildError {
    BuildError::InvalidSignature(reason.into())
}

fn parse_any(signature: &[u8]) -> Result<Signature, BuildError> {
    match signature.len() {
        COMPACT_SIGNATURE_LEN => Signature::from_compact(signature),
        // r || s || v as returned by recoverable signers
        65 => Signature::from_compact(&signature[..COMPACT_SIGNATURE_LEN]),
        _ => Signature::from_der(signature),
    }
    .map_err(|e| invalid(e.to_string()))
}

/// Parse a compact (64 or 65 byte) or DER signature into canonical compact
/// form with `s <= n/2`.
pub fn to_compact(signature: &[u8]) -> Result<[u8; COMPACT_SIGNATURE_LEN], BuildError> {
    let mut sig = parse_any(signature)?;
    sig.normalize_s();
    Ok(sig.serialize_compact())
}

/// Replace a high `s` with `n - s`. Input and output are 64-byte compact.
pub fn normalize_low_s(compact: &[u8]) -> Result<[u8; COMPACT_SIGNATURE_LEN], BuildError> {
    if compact.len() != COMPACT_SIGNATURE_LEN {
        return Err(invalid(format!("expected 64 bytes, got {}", compact.len())));
    }
    to_compact(compact)
}

/// Canonical DER encoding of a compact, recoverable or DER signature.
pub fn to_der(signature: &[u8]) -> Result<Vec<u8>, BuildError> {
    let mut sig = parse_any(signature)?;
    sig.normalize_s();
    Ok(sig.serialize_der().to_vec())
}

/// Find the recovery id (0..=3) under which `compact` over `hash` recovers
/// to `expected_pubkey` (compressed or uncompressed SEC1).
pub fn recover_id(hash: &[u8], compact: &[u8], expected_pubkey: &[u8]) -> Result<u8, BuildError> {
    if compact.len() < COMPACT_SIGNATURE_LEN {
        return Err(invalid(format!("expected 64 bytes, got {}", compact.len())));
    }
    let expected = PublicKey::from_slice(expected_pubkey).map_err(|e| invalid(e.to_string()))?;
    let message = Message::from_digest_slice(hash).map_err(|e| invalid(e.to_string()))?;
    let secp = Secp256k1::verification_only();

    for id in 0..4 {
        let Ok(recovery_id) = RecoveryId::from_i32(id) else { continue };
        let Ok(sig) = RecoverableSignature::from_compact(&compact[..COMPACT_SIGNATURE_LEN], recovery_id)
        else {
            continue;
        };
        if secp.recover_ecdsa(&message, &sig).is_ok_and(|key| key == expected) {
            return Ok(id as u8);
        }
    }
    Err(invalid("no recovery id matches the public key"))
}

/// Verify a compact or DER signature over a 32-byte `hash`.
pub fn verify_ecdsa(hash: &[u8], signature: &[u8], pubkey: &[u8]) -> bool {
    let (Ok(sig), Ok(key), Ok(message)) = (
        parse_any(signature),
        PublicKey::from_slice(pubkey),
        Message::from_digest_slice(hash),
    ) else {
        return false;
    };
    Secp256k1::verification_only().verify_ecdsa(&message, &sig, &key).is_ok()
}

/// Ed25519 signatures need no post-processing beyond a length check.
pub fn ed25519_passthrough(signature: &[u8]) -> Result<[u8; ED25519_SIGNATURE_LEN], BuildError> {
    signature
        .try_into()
        .map_err(|_| invalid(format!("ed25519 signature must be 64 bytes, got {}", signature.len())))
}
