/*
    Copyright © 2023, ParallelChain Lab
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Host side implementations of the signature schemes and the address codec that contracts call
//! into through their imports.
//!
//! Everything here is a pure function of its arguments. The host functions in
//! [contract::functions](crate::contract) only move bytes between guest memory and these
//! functions and translate [CryptoError] into the codes the guest expects.

use bech32::{Bech32, Hrp};
use ed25519_dalek::{Signer as _, Verifier as _};
use k256::ecdsa::{signature::hazmat::PrehashVerifier, RecoveryId, Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

/// Length of the message hash taken by secp256k1 verification and recovery.
pub const MESSAGE_HASH_LENGTH: usize = 32;

/// CryptoError enumerates the reasons a crypto or address host function could not produce a result.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid hash format")]
    InvalidHashFormat,

    #[error("invalid signature format")]
    InvalidSignatureFormat,

    #[error("invalid public key format")]
    InvalidPubkeyFormat,

    #[error("invalid private key format")]
    InvalidPrivateKeyFormat,

    #[error("invalid recovery parameter, supported values are 0 and 1")]
    InvalidRecoveryParam,

    #[error("batch verification needs matching numbers of messages, signatures and public keys")]
    BatchErr,

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("{0}")]
    Generic(String),
}

impl CryptoError {
    /// Error code reported to the guest. 0 and 1 are the "valid" and "invalid" results of
    /// verification and never appear here.
    pub fn code(&self) -> u32 {
        match self {
            CryptoError::InvalidHashFormat => 3,
            CryptoError::InvalidSignatureFormat => 4,
            CryptoError::InvalidPubkeyFormat => 5,
            CryptoError::InvalidRecoveryParam => 6,
            CryptoError::BatchErr => 7,
            CryptoError::InvalidPrivateKeyFormat => 8,
            CryptoError::InvalidAddress(_) => 9,
            CryptoError::Generic(_) => 10,
        }
    }
}

/// Signs SHA-256(message) and returns the 64 byte compact signature.
pub fn secp256k1_sign(message: &[u8], private_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let key = SigningKey::from_slice(private_key).map_err(|_| CryptoError::InvalidPrivateKeyFormat)?;
    let hash = Sha256::digest(message);
    let (signature, _) = key
        .sign_prehash_recoverable(&hash)
        .map_err(|e| CryptoError::Generic(e.to_string()))?;
    Ok(signature.to_bytes().to_vec())
}

/// Verifies a compact signature over a 32 byte hash against a SEC1 encoded public key
/// (compressed or uncompressed).
pub fn secp256k1_verify(hash: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool, CryptoError> {
    if hash.len() != MESSAGE_HASH_LENGTH {
        return Err(CryptoError::InvalidHashFormat);
    }
    let signature = Signature::from_slice(signature).map_err(|_| CryptoError::InvalidSignatureFormat)?;
    let key = VerifyingKey::from_sec1_bytes(public_key).map_err(|_| CryptoError::InvalidPubkeyFormat)?;
    Ok(key.verify_prehash(hash, &signature).is_ok())
}

/// Recovers the uncompressed (65 byte) public key that produced `signature` over `hash`.
pub fn secp256k1_recover_pubkey(
    hash: &[u8],
    signature: &[u8],
    recovery_param: u8,
) -> Result<Vec<u8>, CryptoError> {
    if hash.len() != MESSAGE_HASH_LENGTH {
        return Err(CryptoError::InvalidHashFormat);
    }
    let signature = Signature::from_slice(signature).map_err(|_| CryptoError::InvalidSignatureFormat)?;
    let recovery_id = match recovery_param {
        0 | 1 => RecoveryId::from_byte(recovery_param).ok_or(CryptoError::InvalidRecoveryParam)?,
        _ => return Err(CryptoError::InvalidRecoveryParam),
    };
    let key = VerifyingKey::recover_from_prehash(hash, &signature, recovery_id)
        .map_err(|e| CryptoError::Generic(e.to_string()))?;
    Ok(key.to_encoded_point(false).as_bytes().to_vec())
}

/// Signs `message` with a 32 byte ed25519 secret key.
pub fn ed25519_sign(message: &[u8], private_key: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let secret: [u8; 32] = private_key
        .try_into()
        .map_err(|_| CryptoError::InvalidPrivateKeyFormat)?;
    let key = ed25519_dalek::SigningKey::from_bytes(&secret);
    Ok(key.sign(message).to_bytes().to_vec())
}

pub fn ed25519_verify(message: &[u8], signature: &[u8], public_key: &[u8]) -> Result<bool, CryptoError> {
    let signature = ed25519_signature(signature)?;
    let key = ed25519_verifying_key(public_key)?;
    Ok(key.verify(message, &signature).is_ok())
}

/// Verifies many ed25519 signatures at once. Accepted shapes, as on a real chain:
/// n messages / n signatures / n keys, one message signed by n keys, and n messages signed by
/// one key. An empty batch is valid.
pub fn ed25519_batch_verify(
    messages: &[Vec<u8>],
    signatures: &[Vec<u8>],
    public_keys: &[Vec<u8>],
) -> Result<bool, CryptoError> {
    let count = signatures.len();
    let messages: Vec<&[u8]> = match messages.len() {
        len if len == count => messages.iter().map(Vec::as_slice).collect(),
        1 => vec![messages[0].as_slice(); count],
        _ => return Err(CryptoError::BatchErr),
    };
    let public_keys: Vec<&[u8]> = match public_keys.len() {
        len if len == count => public_keys.iter().map(Vec::as_slice).collect(),
        1 => vec![public_keys[0].as_slice(); count],
        _ => return Err(CryptoError::BatchErr),
    };
    if count == 0 {
        return Ok(true);
    }

    let signatures = signatures
        .iter()
        .map(|signature| ed25519_signature(signature))
        .collect::<Result<Vec<_>, _>>()?;
    let public_keys = public_keys
        .into_iter()
        .map(ed25519_verifying_key)
        .collect::<Result<Vec<_>, _>>()?;

    Ok(ed25519_dalek::verify_batch(&messages, &signatures, &public_keys).is_ok())
}

fn ed25519_signature(bytes: &[u8]) -> Result<ed25519_dalek::Signature, CryptoError> {
    ed25519_dalek::Signature::from_slice(bytes).map_err(|_| CryptoError::InvalidSignatureFormat)
}

fn ed25519_verifying_key(bytes: &[u8]) -> Result<ed25519_dalek::VerifyingKey, CryptoError> {
    let bytes: [u8; 32] = bytes.try_into().map_err(|_| CryptoError::InvalidPubkeyFormat)?;
    ed25519_dalek::VerifyingKey::from_bytes(&bytes).map_err(|_| CryptoError::InvalidPubkeyFormat)
}

/// Decodes a bech32 address with the given prefix into its canonical bytes.
pub fn canonicalize_address(human: &str, prefix: &str) -> Result<Vec<u8>, CryptoError> {
    if human.is_empty() {
        return Err(CryptoError::InvalidAddress("empty address".to_string()));
    }
    let (hrp, data) = bech32::decode(human).map_err(|e| CryptoError::InvalidAddress(e.to_string()))?;
    if !hrp.as_str().eq_ignore_ascii_case(prefix) {
        return Err(CryptoError::InvalidAddress(format!(
            "expected prefix `{}`, found `{}`",
            prefix, hrp
        )));
    }
    if data.is_empty() {
        return Err(CryptoError::InvalidAddress("address has no data".to_string()));
    }
    Ok(data)
}

/// Encodes canonical address bytes as bech32 with the given prefix.
pub fn humanize_address(canonical: &[u8], prefix: &str) -> Result<String, CryptoError> {
    if canonical.is_empty() {
        return Err(CryptoError::InvalidAddress("empty canonical address".to_string()));
    }
    let hrp = Hrp::parse(prefix).map_err(|e| CryptoError::InvalidAddress(e.to_string()))?;
    bech32::encode::<Bech32>(hrp, canonical).map_err(|e| CryptoError::InvalidAddress(e.to_string()))
}

/// Accepts only addresses in the normalized form [humanize_address] produces.
pub fn validate_address(human: &str, prefix: &str) -> Result<(), CryptoError> {
    let canonical = canonicalize_address(human, prefix)?;
    let normalized = humanize_address(&canonical, prefix)?;
    if normalized != human {
        return Err(CryptoError::InvalidAddress(format!(
            "address is not normalized, expected {}",
            normalized
        )));
    }
    Ok(())
}
