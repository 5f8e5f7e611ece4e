// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use std::{fmt, fmt::Formatter};

use serde::{Deserialize, Serialize};

/// A per-context message sequence number, advancing by one for every request
/// sent to the notary.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestNumber(u64);

/// The request number used before a context has synchronized its counter with
/// the notary (registration and `getRequestNumber` itself).
pub const FIRST_REQUEST_NUMBER: RequestNumber = RequestNumber(1);

impl RequestNumber {
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the current value and advances the counter.
    pub fn post_increment(&mut self) -> RequestNumber {
        let current = *self;
        self.0 += 1;
        current
    }
}

impl From<u64> for RequestNumber {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

impl From<RequestNumber> for u64 {
    fn from(v: RequestNumber) -> Self {
        v.0
    }
}

impl PartialEq<u64> for RequestNumber {
    fn eq(&self, other: &u64) -> bool {
        self.0.eq(other)
    }
}

impl fmt::Display for RequestNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
