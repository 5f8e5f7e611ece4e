// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! Common newtypes shared between the notary consensus crate and its
//! consumers. Everything in here is cheap to copy or clone and carries a
//! stable serde representation.

pub mod ids;
pub mod request_number;
pub mod transaction_number;
pub mod types;

pub use ids::{AccountId, NotaryId, NymId};
pub use request_number::{RequestNumber, FIRST_REQUEST_NUMBER};
pub use transaction_number::TransactionNumber;
pub use types::{FixedHash, FixedHashSizeError, Signature};
