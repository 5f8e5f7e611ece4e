// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! Shared helpers for unit and integration tests: a connection that never
//! answers, and a deterministic signer with no real cryptography behind it.

use std::collections::BTreeSet;

use tari_notary_types::{NymId, Signature, TransactionNumber};

use crate::interface::{NetworkReply, NotaryConnection, RequestMessage, Signer, SignerError};

pub fn numbers(values: &[u64]) -> BTreeSet<TransactionNumber> {
    values.iter().map(|&v| TransactionNumber::from(v)).collect()
}

/// A connection whose sends always time out.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullConnection;

impl NotaryConnection for NullConnection {
    fn send(&self, _request: &RequestMessage) -> NetworkReply {
        NetworkReply::timeout()
    }
}

/// Deterministic stand-in for the signer collaborator. Signatures are a
/// function of key and payload, so verification round-trips without any
/// key material.
#[derive(Clone, Copy, Debug, Default)]
pub struct StaticSigner {
    reject_all: bool,
}

impl StaticSigner {
    /// A signer whose `verify` always fails, for exercising bad-signature
    /// paths.
    pub fn rejecting() -> Self {
        Self { reject_all: true }
    }

    fn signature_for(payload: &[u8], key: &NymId) -> Signature {
        let mut bytes = Vec::with_capacity(key.as_str().len() + 9);
        bytes.extend_from_slice(key.as_str().as_bytes());
        bytes.push(b':');
        bytes.extend_from_slice(&(payload.len() as u64).to_le_bytes());
        let checksum = payload.iter().fold(0u64, |acc, &b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
        bytes.extend_from_slice(&checksum.to_le_bytes());
        Signature::new(bytes)
    }
}

impl Signer for StaticSigner {
    fn sign(&self, payload: &[u8], key: &NymId) -> Result<Signature, SignerError> {
        Ok(Self::signature_for(payload, key))
    }

    fn verify(&self, payload: &[u8], signature: &Signature, key: &NymId) -> bool {
        if self.reject_all {
            return false;
        }
        *signature == Self::signature_for(payload, key)
    }
}
