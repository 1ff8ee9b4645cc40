// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! A minimal, explicitly non-production `SigningKey`/`VerifyingKey`/
//! `TrustStore` implementation, used only by this crate's own tests and by
//! the inspector applet's `--trust-dir` flag. Real deployments supply a real
//! asymmetric trust store; this one authenticates with a shared secret
//! hashed alongside the message (`SHA-512(secret || message)`), which is not
//! a sound signature scheme — it has no public/private key separation.

use sha2::{Digest, Sha512};

use crate::signature::{SigningKey, TrustStore, VerifyingKey};

fn keyed_digest(secret: &[u8], message: &[u8]) -> Vec<u8> {
    let mut hasher = Sha512::new();
    hasher.update(secret);
    hasher.update(message);
    hasher.finalize().to_vec()
}

pub struct HmacSigningKey {
    id: [u8; 16],
    secret: Vec<u8>,
}

impl SigningKey for HmacSigningKey {
    fn key_id(&self) -> [u8; 16] {
        self.id
    }

    fn sign(&self, message: &[u8]) -> Vec<u8> {
        keyed_digest(&self.secret, message)
    }
}

pub struct HmacVerifyingKey {
    id: [u8; 16],
    secret: Vec<u8>,
}

impl VerifyingKey for HmacVerifyingKey {
    fn key_id(&self) -> [u8; 16] {
        self.id
    }

    fn verify(&self, message: &[u8], sig: &[u8]) -> bool {
        keyed_digest(&self.secret, message) == sig
    }
}

/// A matching signing/verifying pair sharing `id` as both the key id and
/// (for this toy scheme only) the shared secret.
pub fn hmac_keypair(id: [u8; 16]) -> (HmacSigningKey, HmacVerifyingKey) {
    let secret = id.to_vec();
    (
        HmacSigningKey { id, secret: secret.clone() },
        HmacVerifyingKey { id, secret },
    )
}

/// An in-memory trust store over a fixed set of toy verifying keys.
pub struct HmacTrustStore {
    keys: Vec<HmacVerifyingKey>,
}

impl HmacTrustStore {
    pub fn new(keys: Vec<HmacVerifyingKey>) -> Self {
        HmacTrustStore { keys }
    }
}

impl TrustStore for HmacTrustStore {
    fn keys(&self) -> Vec<&dyn VerifyingKey> {
        self.keys.iter().map(|k| k as &dyn VerifyingKey).collect()
    }
}

/// Loads a directory of `<32-hex-char-key-id>` files, each containing a raw
/// shared secret, into an [`HmacTrustStore`]. This is the toy on-disk key
/// format the inspector applet's `--trust-dir` points at — not a production
/// key format.
impl HmacTrustStore {
    pub fn load_dir(dir: &std::path::Path) -> crate::error::Result<Self> {
        let mut keys = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let Some(id) = decode_key_id(name) else {
                continue;
            };
            let secret = std::fs::read(&path)?;
            keys.push(HmacVerifyingKey { id, secret });
        }
        Ok(HmacTrustStore { keys })
    }
}

fn decode_key_id(name: &str) -> Option<[u8; 16]> {
    if name.len() != 32 {
        return None;
    }
    let mut out = [0u8; 16];
    for i in 0..16 {
        out[i] = u8::from_str_radix(&name[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keypair_signs_and_verifies() {
        let (signing, verifying) = hmac_keypair(*b"0123456789abcdef");
        let sig = signing.sign(b"hello");
        assert!(verifying.verify(b"hello", &sig));
        assert!(!verifying.verify(b"goodbye", &sig));
    }

    #[test]
    fn key_id_roundtrips_through_hex_name() {
        let id = *b"0123456789abcdef";
        let hex: String = id.iter().map(|b| format!("{b:02x}")).collect();
        assert_eq!(decode_key_id(&hex), Some(id));
    }
}
