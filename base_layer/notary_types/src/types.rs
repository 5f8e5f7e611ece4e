// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use std::{fmt, fmt::Formatter, ops::Deref};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Size of a content-address hash in bytes.
pub const FIXED_HASH_SIZE: usize = 32;

/// A fixed-size content hash. Used for nymbox hashes and box-receipt
/// commitments. The all-zero hash means "not set".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct FixedHash([u8; FIXED_HASH_SIZE]);

#[derive(Debug, Error)]
#[error("Invalid fixed hash size: {size}")]
pub struct FixedHashSizeError {
    pub size: usize,
}

impl FixedHash {
    pub const fn zero() -> Self {
        Self([0u8; FIXED_HASH_SIZE])
    }

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; FIXED_HASH_SIZE]
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl From<[u8; FIXED_HASH_SIZE]> for FixedHash {
    fn from(bytes: [u8; FIXED_HASH_SIZE]) -> Self {
        Self(bytes)
    }
}

impl TryFrom<&[u8]> for FixedHash {
    type Error = FixedHashSizeError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let array =
            <[u8; FIXED_HASH_SIZE]>::try_from(bytes).map_err(|_| FixedHashSizeError { size: bytes.len() })?;
        Ok(Self(array))
    }
}

impl Deref for FixedHash {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for FixedHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for FixedHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "FixedHash({})", self.to_hex())
    }
}

/// An opaque signature produced by the signer collaborator. The consensus
/// core stores and forwards these; it never interprets them.
#[derive(Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Signature(Vec<u8>);

impl Signature {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Signature {
    fn from(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({})", hex::encode(&self.0))
    }
}
