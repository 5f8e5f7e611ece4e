// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use std::{
    fmt,
    fmt::{Display, Formatter},
};

use tari_notary_types::TransactionNumber;
use thiserror::Error;

use crate::{
    ledger::{error::LedgerError, kind::Kind, BoxKind},
    storage::error::ContextStorageError,
};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Transaction number {0} is already issued")]
    AlreadyIssued(TransactionNumber),
    #[error("Transaction number {0} is not issued")]
    NotIssued(TransactionNumber),
    #[error("Transaction number {0} is not available")]
    NotAvailable(TransactionNumber),
    #[error("Transaction number {0} is not above the highest number on record")]
    StaleNumber(TransactionNumber),
    #[error("Number registry invariant violated: {0}")]
    InvariantViolated(&'static str),
}

#[derive(Debug, Error)]
pub enum StatementError {
    #[error("Malformed statement: {0}")]
    MalformedStatement(#[from] serde_json::Error),
}

/// Which side of a statement comparison holds a number exclusively.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MismatchSide {
    Context,
    Statement,
}

impl Display for MismatchSide {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            MismatchSide::Context => f.write_str("context"),
            MismatchSide::Statement => f.write_str("statement"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Statement(#[from] StatementError),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
    #[error(transparent)]
    Storage(#[from] ContextStorageError),
    #[error("Statement disagreement: transaction number {number} is present only on the {side}")]
    Mismatch {
        number: TransactionNumber,
        side: MismatchSide,
    },
    #[error("Expected {box_kind} receipt for transaction {txn} not found")]
    MissingReceipt {
        box_kind: BoxKind,
        txn: TransactionNumber,
    },
    #[error("Wrong receipt kind for transaction {txn}: expected {expected}, got {got}")]
    WrongReceiptKind {
        expected: String,
        got: Kind,
        txn: TransactionNumber,
    },
    #[error("Receipt count mismatch for the {box_kind}: statement reports {reported}, box holds {actual}")]
    ReceiptCountMismatch {
        box_kind: BoxKind,
        reported: usize,
        actual: usize,
    },
    #[error("Amount mismatch for transaction {txn}: expected {expected}, got {got}")]
    AmountMismatch {
        txn: TransactionNumber,
        expected: i64,
        got: i64,
    },
    #[error("Balance mismatch: expected {expected}, got {got}")]
    BalanceMismatch { expected: i64, got: i64 },
    #[error("Inbox delta of {delta} is not explained by unreported receipts totalling {unreported}")]
    UnexplainedDelta { delta: i64, unreported: i64 },
    #[error("Missing or invalid signature on {subject}")]
    UnsignedOrBadSignature { subject: String },
    #[error("A new cron receipt arrived for reference {reference} after its final receipt")]
    CronReceiptAfterFinal { reference: TransactionNumber },
    #[error("Operation is not valid for this context variant")]
    WrongContext,
    #[error("Request timed out")]
    NetworkTimeout,
    #[error("Invalid reply from notary")]
    InvalidReply,
}
