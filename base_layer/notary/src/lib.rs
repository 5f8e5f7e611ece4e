// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! # Notary consensus components
//!
//! The consensus subsystem of a federated transaction protocol: a notary and
//! its clients maintain a shared, signed view of which transaction numbers
//! are outstanding and what each account holds, over a network where either
//! side may crash or replay messages.
//!
//! The moving parts:
//!
//! - [`consensus::Context`]: the per-counterparty state machine, sole owner
//!   of its [`consensus::NumberRegistry`]
//! - [`consensus::TransactionStatement`] and
//!   [`consensus::BalanceStatement`]: the snapshots the parties sign
//! - [`consensus::verifier`]: cross-checks a statement against a live
//!   context, an inbox, an outbox and an account
//! - [`consensus::harvest`]: returns numbers to the available pool after a
//!   failed request
//! - [`consensus::balance_check`]: audits a stored signed receipt against
//!   the live state
//! - [`ledger`]: boxes, receipts, and the abbreviated-receipt commitment
//!   scheme
//! - [`storage`]: persistence behind a swappable backend
//!
//! Cryptography and transport stay outside, behind the traits in
//! [`interface`].

pub mod consensus;
pub mod interface;
pub mod ledger;
pub mod storage;
pub mod test_utils;

pub use consensus::{ConsensusError, Context};
pub use ledger::{Account, BoxKind, Ledger};
