// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! String-backed identifiers for the parties to a consensus relationship.
//! The notary mints these; the consensus core treats them as opaque.

use std::{fmt, fmt::Formatter};

use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$attr:meta])* $name:ident) => {
        $(#[$attr])*
        #[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

string_id!(
    /// Identifies a party (a signing identity) in a consensus relationship.
    NymId
);
string_id!(
    /// Identifies the notary arbitrating a consensus relationship.
    NotaryId
);
string_id!(
    /// Identifies an asset account held at a notary.
    AccountId
);

#[cfg(test)]
mod test {
    use super::{AccountId, NotaryId, NymId};

    #[test]
    fn ids_round_trip_through_serde() {
        let nym = NymId::from("nym-alice");
        let json = serde_json::to_string(&nym).unwrap();
        assert_eq!(json, "\"nym-alice\"");
        assert_eq!(serde_json::from_str::<NymId>(&json).unwrap(), nym);
    }

    #[test]
    fn distinct_id_types_do_not_compare() {
        let notary = NotaryId::from("notary-1");
        let account = AccountId::from("notary-1");
        assert_eq!(notary.as_str(), account.as_str());
    }
}
