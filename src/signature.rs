// Copyright 2019-2022 ChainSafe Systems
// SPDX-License-Identifier: Apache-2.0, MIT

//! Signature driver: digest caching, the v0 signature record layout, and the
//! sign/verify traits external trust-store collaborators implement.
//!
//! The trust store itself (key loading, the asymmetric primitive) is out of
//! scope per spec — only the interface lives here. See [`crate::testing`]
//! for a non-production stand-in used by this crate's own tests.

use sha2::{Digest, Sha512};

use crate::error::{Error, Result};

/// Digest algorithm tag. Only `Sha512` is supported in v0; any other value
/// read from a signature record is `not-supported`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HashAlg {
    Sha512,
}

impl HashAlg {
    pub fn to_u8(self) -> u8 {
        match self {
            HashAlg::Sha512 => 0,
        }
    }

    pub fn from_u8(v: u8) -> Option<HashAlg> {
        match v {
            0 => Some(HashAlg::Sha512),
            _ => None,
        }
    }

    fn digest(self, bytes: &[u8]) -> Vec<u8> {
        match self {
            HashAlg::Sha512 => {
                let mut hasher = Sha512::new();
                hasher.update(bytes);
                hasher.finalize().to_vec()
            }
        }
    }
}

/// A detached signature block's contents (v0 layout, spec §6.2).
#[derive(Debug, Clone)]
pub struct SigRecord {
    pub sign_ver: u8,
    pub hash_alg: u8,
    pub reserved: u16,
    pub key_id: [u8; 16],
    pub sig: Vec<u8>,
}

const RECORD_PREFIX_LEN: usize = 20;

impl SigRecord {
    pub fn parse(bytes: &[u8]) -> Result<SigRecord> {
        if bytes.len() < RECORD_PREFIX_LEN {
            return Err(Error::Malformed("signature record shorter than its prefix".into()));
        }
        let sign_ver = bytes[0];
        let hash_alg = bytes[1];
        let reserved = u16::from_le_bytes(bytes[2..4].try_into().unwrap());
        let mut key_id = [0u8; 16];
        key_id.copy_from_slice(&bytes[4..20]);
        Ok(SigRecord {
            sign_ver,
            hash_alg,
            reserved,
            key_id,
            sig: bytes[RECORD_PREFIX_LEN..].to_vec(),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(RECORD_PREFIX_LEN + self.sig.len());
        out.push(self.sign_ver);
        out.push(self.hash_alg);
        out.extend_from_slice(&self.reserved.to_le_bytes());
        out.extend_from_slice(&self.key_id);
        out.extend_from_slice(&self.sig);
        out
    }

    fn signed_message(&self, header: &[u8], digest: &[u8]) -> Vec<u8> {
        let mut msg = Vec::with_capacity(header.len() + RECORD_PREFIX_LEN + digest.len());
        msg.extend_from_slice(header);
        msg.push(self.sign_ver);
        msg.push(self.hash_alg);
        msg.extend_from_slice(&self.reserved.to_le_bytes());
        msg.extend_from_slice(&self.key_id);
        msg.extend_from_slice(digest);
        msg
    }
}

/// A private key capable of producing a [`SigRecord`]'s signature bytes.
pub trait SigningKey {
    fn key_id(&self) -> [u8; 16];
    fn hash_alg(&self) -> HashAlg {
        HashAlg::Sha512
    }
    fn sign(&self, message: &[u8]) -> Vec<u8>;
}

/// A public key capable of checking a signature over a reconstructed message.
pub trait VerifyingKey {
    fn key_id(&self) -> [u8; 16];
    fn verify(&self, message: &[u8], sig: &[u8]) -> bool;
}

/// External collaborator yielding the set of keys this process trusts.
/// Verification skips any key whose id doesn't match the record being
/// checked; the first matching key that verifies wins.
pub trait TrustStore {
    fn keys(&self) -> Vec<&dyn VerifyingKey>;
}

/// Caches the `ADB` block's digest per algorithm across however many
/// signatures are checked against it, and remembers which key (if any)
/// ended up trusting the arena.
pub struct VerifyContext {
    header: Vec<u8>,
    adb_payload: Vec<u8>,
    digests: std::collections::HashMap<HashAlg, Vec<u8>>,
    trusted_key_id: Option<[u8; 16]>,
}

impl VerifyContext {
    pub fn new(header: Vec<u8>, adb_payload: Vec<u8>) -> Self {
        VerifyContext {
            header,
            adb_payload,
            digests: std::collections::HashMap::new(),
            trusted_key_id: None,
        }
    }

    pub fn trusted_key_id(&self) -> Option<[u8; 16]> {
        self.trusted_key_id
    }

    fn digest(&mut self, alg: HashAlg) -> Vec<u8> {
        self.digests
            .entry(alg)
            .or_insert_with(|| alg.digest(&self.adb_payload))
            .clone()
    }

    /// Verifies one signature record against `store`. On success, records
    /// the trusting key id. On failure, returns `KeyRejected`/`NotSupported`
    /// without poisoning any prior trust already established by another
    /// record.
    pub fn verify_record(&mut self, record: &SigRecord, store: &dyn TrustStore) -> Result<()> {
        if record.sign_ver != 0 {
            log::warn!("rejecting signature record: unknown sign_ver {}", record.sign_ver);
            return Err(Error::NotSupported(format!(
                "unknown signature version {}",
                record.sign_ver
            )));
        }
        let alg = HashAlg::from_u8(record.hash_alg).ok_or_else(|| {
            log::warn!("rejecting signature record: unknown hash_alg {}", record.hash_alg);
            Error::NotSupported(format!("unknown hash algorithm {}", record.hash_alg))
        })?;
        let digest = self.digest(alg);
        let message = record.signed_message(&self.header, &digest);

        for key in store.keys() {
            if key.key_id() != record.key_id {
                continue;
            }
            if key.verify(&message, &record.sig) {
                self.trusted_key_id = Some(record.key_id);
                return Ok(());
            }
        }
        log::warn!("no trusted key verified signature record for key id {:02x?}", record.key_id);
        Err(Error::KeyRejected(1))
    }
}

/// Produces the `SIG` block contents for `key` over the given header and
/// `ADB` block payload. Called once per loaded private key on emission.
pub fn sign(header: &[u8], adb_payload: &[u8], key: &dyn SigningKey) -> SigRecord {
    let alg = key.hash_alg();
    let digest = alg.digest(adb_payload);
    let mut record = SigRecord {
        sign_ver: 0,
        hash_alg: alg.to_u8(),
        reserved: 0,
        key_id: key.key_id(),
        sig: Vec::new(),
    };
    let message = record.signed_message(header, &digest);
    record.sig = key.sign(&message);
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{hmac_keypair, HmacTrustStore};

    #[test]
    fn sign_then_verify_round_trips() {
        let (signing, verifying) = hmac_keypair(*b"0123456789abcdef");
        let header = b"header-bytes".to_vec();
        let payload = b"the arena bytes".to_vec();

        let record = sign(&header, &payload, &signing);
        let store = HmacTrustStore::new(vec![verifying]);
        let mut vctx = VerifyContext::new(header, payload);
        assert!(vctx.verify_record(&record, &store).is_ok());
        assert_eq!(vctx.trusted_key_id(), Some(signing.key_id()));
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let (signing, verifying) = hmac_keypair(*b"0123456789abcdef");
        let header = b"header-bytes".to_vec();
        let payload = b"the arena bytes".to_vec();
        let record = sign(&header, &payload, &signing);

        let store = HmacTrustStore::new(vec![verifying]);
        let mut tampered = payload.clone();
        tampered[0] ^= 0xff;
        let mut vctx = VerifyContext::new(header, tampered);
        assert!(vctx.verify_record(&record, &store).is_err());
    }

    #[test]
    fn unknown_sign_ver_is_not_supported() {
        let (signing, verifying) = hmac_keypair(*b"0123456789abcdef");
        let header = b"h".to_vec();
        let payload = b"p".to_vec();
        let mut record = sign(&header, &payload, &signing);
        record.sign_ver = 1;
        let store = HmacTrustStore::new(vec![verifying]);
        let mut vctx = VerifyContext::new(header, payload);
        assert!(matches!(vctx.verify_record(&record, &store), Err(Error::NotSupported(_))));
    }
}
