// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use std::{
    fmt,
    fmt::Formatter,
    hash::{Hash, Hasher},
};

use serde::{Deserialize, Serialize};

/// A server-minted transaction number. Numbers are allocated monotonically by
/// the notary and never reused. Zero is the "no number" sentinel.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialOrd, Ord)]
pub struct TransactionNumber(u64);

impl TransactionNumber {
    /// The "no number" sentinel.
    pub const ZERO: TransactionNumber = TransactionNumber(0);

    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }

    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl Hash for TransactionNumber {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state)
    }
}

impl PartialEq for TransactionNumber {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl PartialEq<u64> for TransactionNumber {
    fn eq(&self, other: &u64) -> bool {
        self.0.eq(other)
    }
}

impl PartialEq<TransactionNumber> for u64 {
    fn eq(&self, other: &TransactionNumber) -> bool {
        self.eq(&other.0)
    }
}

impl Eq for TransactionNumber {}

impl From<u64> for TransactionNumber {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl From<TransactionNumber> for u64 {
    fn from(v: TransactionNumber) -> Self {
        v.0
    }
}

impl fmt::Display for TransactionNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
