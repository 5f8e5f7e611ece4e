// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use tari_notary_types::TransactionNumber;
use thiserror::Error;

use crate::ledger::kind::Kind;

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Receipt {txn} is malformed: {reason}")]
    MalformedReceipt { txn: TransactionNumber, reason: String },
    #[error("Receipt {0} carries no attachment")]
    MissingAttachment(TransactionNumber),
    #[error("The number of origin cannot be calculated for a {0} receipt; it must be set explicitly")]
    OriginNotCalculable(Kind),
    #[error("A receipt with transaction number {0} is already present in this box")]
    DuplicateReceipt(TransactionNumber),
    #[error("Full form of receipt {0} does not hash to its abbreviated commitment")]
    HashMismatch(TransactionNumber),
    #[error("Abbreviated and full forms of receipt {txn} disagree on {field}")]
    ReceiptMismatch {
        txn: TransactionNumber,
        field: &'static str,
    },
    #[error("No full form stored for receipt {0}")]
    MissingFullForm(TransactionNumber),
    #[error("Receipt {0} has been marked for deletion")]
    Tombstoned(TransactionNumber),
}
