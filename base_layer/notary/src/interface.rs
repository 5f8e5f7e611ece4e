// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! Collaborator capabilities the consensus core depends on but does not
//! implement: signing, hashing and the notary connection. Key material and
//! transport never enter this crate; they stay behind these traits.

use std::collections::BTreeSet;

use blake2::Blake2b;
use digest::{consts::U32, Digest};
use serde::{Deserialize, Serialize};
use tari_notary_types::{FixedHash, NotaryId, NymId, RequestNumber, Signature};
use thiserror::Error;

#[derive(Debug, Error)]
#[error("Signing failed: {0}")]
pub struct SignerError(pub String);

/// Produces and checks signatures on behalf of a nym. The consensus core
/// passes an opaque key reference; it never sees key material.
pub trait Signer: Send + Sync {
    fn sign(&self, payload: &[u8], key: &NymId) -> Result<Signature, SignerError>;
    fn verify(&self, payload: &[u8], signature: &Signature, key: &NymId) -> bool;
}

/// Content addressing for box receipts and nymbox hashes.
pub trait Hasher: Send + Sync {
    fn hash(&self, bytes: &[u8]) -> FixedHash;
}

/// The stock hasher: Blake2b truncated to 32 bytes.
#[derive(Clone, Copy, Debug, Default)]
pub struct Blake2bHasher;

impl Hasher for Blake2bHasher {
    fn hash(&self, bytes: &[u8]) -> FixedHash {
        let digest = Blake2b::<U32>::digest(bytes);
        let mut output = [0u8; 32];
        output.copy_from_slice(&digest);
        output.into()
    }
}

/// The commands the consensus core itself originates. Everything else a
/// wallet sends is built upstream and only passes through the context for
/// request-number stamping.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    PingNotary,
    GetRequestNumber,
}

/// A request on its way to the notary.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub kind: MessageKind,
    pub nym_id: NymId,
    pub notary_id: NotaryId,
    pub request_number: RequestNumber,
    pub acknowledged_replies: BTreeSet<RequestNumber>,
    pub nymbox_hash: Option<FixedHash>,
    pub payload: Option<String>,
    pub signature: Option<Signature>,
}

impl RequestMessage {
    pub fn new(kind: MessageKind, nym_id: NymId, notary_id: NotaryId, request_number: RequestNumber) -> Self {
        Self {
            kind,
            nym_id,
            notary_id,
            request_number,
            acknowledged_replies: BTreeSet::new(),
            nymbox_hash: None,
            payload: None,
            signature: None,
        }
    }

    /// The bytes a signature covers: the message with the signature field
    /// cleared, in the canonical encoding.
    pub fn signing_payload(&self) -> Result<Vec<u8>, SignerError> {
        let mut unsigned = self.clone();
        unsigned.signature = None;
        serde_json::to_vec(&unsigned).map_err(|e| SignerError(e.to_string()))
    }
}

/// The fields of a notary reply the consensus core consumes.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyMessage {
    pub success: bool,
    pub new_request_number: Option<RequestNumber>,
    pub acknowledged_replies: BTreeSet<RequestNumber>,
    pub nymbox_hash: Option<FixedHash>,
}

/// Transport-level outcome of a send. `Timeout` and `InvalidReply` both mean
/// "outcome unknown" to the consensus core; the harvester must not run on
/// either.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendResult {
    Timeout,
    InvalidReply,
    ValidReply,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NetworkReply {
    pub result: SendResult,
    pub reply: Option<ReplyMessage>,
}

impl NetworkReply {
    pub fn timeout() -> Self {
        Self {
            result: SendResult::Timeout,
            reply: None,
        }
    }

    pub fn invalid() -> Self {
        Self {
            result: SendResult::InvalidReply,
            reply: None,
        }
    }

    pub fn valid(reply: ReplyMessage) -> Self {
        Self {
            result: SendResult::ValidReply,
            reply: Some(reply),
        }
    }
}

/// A live connection to one notary. Sends are synchronous; the caller owns
/// retry policy.
pub trait NotaryConnection: Send + Sync {
    fn send(&self, request: &RequestMessage) -> NetworkReply;
}

#[cfg(test)]
mod test {
    use super::{Blake2bHasher, Hasher, MessageKind, RequestMessage};

    #[test]
    fn hashing_is_deterministic_and_input_sensitive() {
        let hasher = Blake2bHasher;
        assert_eq!(hasher.hash(b"alpha"), hasher.hash(b"alpha"));
        assert_ne!(hasher.hash(b"alpha"), hasher.hash(b"beta"));
    }

    #[test]
    fn signing_payload_excludes_the_signature() {
        let mut message = RequestMessage::new(
            MessageKind::PingNotary,
            "nym-alice".into(),
            "notary-1".into(),
            1.into(),
        );
        let unsigned = message.signing_payload().unwrap();
        message.signature = Some(vec![9u8; 4].into());
        assert_eq!(message.signing_payload().unwrap(), unsigned);
    }
}
