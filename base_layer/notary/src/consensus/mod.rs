// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! The consensus state machine: per-counterparty contexts, the number
//! registry they own, signed statements over it, and the verification and
//! recovery algorithms that keep two mutually-distrustful parties agreed on
//! which transaction numbers are outstanding and what an account holds.

pub mod balance_check;
pub mod context;
pub mod error;
pub mod harvest;
pub mod managed_number;
pub mod registry;
pub mod statement;
pub mod verifier;

pub use balance_check::{verify_balance_receipt, SignedBalanceReceipt, SignedTransactionReceipt};
pub use context::{ConsensusType, Context, SerializedContext, SerializedVariant};
pub use error::{ConsensusError, MismatchSide, RegistryError, StatementError};
pub use harvest::{harvest_numbers, HarvestAction, HarvestRole, MessageOutcome, Outcome, TransactionOutcome};
pub use managed_number::ManagedNumber;
pub use registry::{HighestUpdate, NumberRegistry};
pub use statement::{BalanceStatement, ReportItem, TransactionStatement};
pub use verifier::{
    verify_balance_statement,
    verify_transaction_statement,
    verify_transaction_statement_for,
    TargetTransaction,
    NEW_OUTBOX_PLACEHOLDER,
};
