// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! Boxes and the receipts inside them. A ledger is one party's ordered view
//! of a single box (inbox, outbox, nymbox, ...) held at a notary.

pub mod box_receipt;
pub mod error;
pub mod kind;
pub mod receipt;

use std::{
    fmt,
    fmt::{Display, Formatter},
};

use serde::{Deserialize, Serialize};
use tari_notary_types::{AccountId, NotaryId, NymId, TransactionNumber};

use crate::ledger::{error::LedgerError, kind::Kind, receipt::Receipt};

/// The boxes a receipt can live in. `Message` is the transient ledger
/// embedded in a request on its way to the notary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum BoxKind {
    Nymbox,
    Inbox,
    Outbox,
    PaymentInbox,
    RecordBox,
    ExpiredBox,
    Message,
}

impl Display for BoxKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            BoxKind::Nymbox => "nymbox",
            BoxKind::Inbox => "inbox",
            BoxKind::Outbox => "outbox",
            BoxKind::PaymentInbox => "paymentInbox",
            BoxKind::RecordBox => "recordBox",
            BoxKind::ExpiredBox => "expiredBox",
            BoxKind::Message => "message",
        };
        f.write_str(s)
    }
}

/// An ordered container of receipts representing one box.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ledger {
    kind: BoxKind,
    account_id: AccountId,
    notary_id: NotaryId,
    party_id: NymId,
    receipts: Vec<Receipt>,
}

impl Ledger {
    pub fn new(kind: BoxKind, account_id: AccountId, notary_id: NotaryId, party_id: NymId) -> Self {
        Self {
            kind,
            account_id,
            notary_id,
            party_id,
            receipts: Vec::new(),
        }
    }

    pub fn kind(&self) -> BoxKind {
        self.kind
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    pub fn notary_id(&self) -> &NotaryId {
        &self.notary_id
    }

    pub fn party_id(&self) -> &NymId {
        &self.party_id
    }

    pub fn count(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }

    pub fn receipts(&self) -> impl Iterator<Item = &Receipt> {
        self.receipts.iter()
    }

    /// Appends a receipt. Transaction numbers are unique within a box.
    pub fn add_receipt(&mut self, receipt: Receipt) -> Result<(), LedgerError> {
        if self.get_by_transaction_num(receipt.transaction_num()).is_some() {
            return Err(LedgerError::DuplicateReceipt(receipt.transaction_num()));
        }
        self.receipts.push(receipt);
        Ok(())
    }

    pub fn remove_receipt(&mut self, number: TransactionNumber) -> Option<Receipt> {
        let index = self.receipts.iter().position(|r| r.transaction_num() == number)?;
        Some(self.receipts.remove(index))
    }

    pub fn get_by_transaction_num(&self, number: TransactionNumber) -> Option<&Receipt> {
        self.receipts.iter().find(|r| r.transaction_num() == number)
    }

    pub fn get_by_reference_num(&self, reference: TransactionNumber) -> Vec<&Receipt> {
        self.receipts.iter().filter(|r| r.in_reference_to() == reference).collect()
    }

    /// Receipts whose number of origin matches. Receipts for which the origin
    /// cannot be computed are skipped.
    pub fn get_by_number_of_origin(&self, origin: TransactionNumber) -> Vec<&Receipt> {
        self.receipts
            .iter()
            .filter(|r| r.number_of_origin().map(|n| n == origin).unwrap_or(false))
            .collect()
    }

    /// The final receipt closing out the cron item `reference`, if present.
    pub fn get_final_receipt_by_reference(&self, reference: TransactionNumber) -> Option<&Receipt> {
        self.receipts
            .iter()
            .find(|r| r.kind() == Kind::FinalReceipt && r.in_reference_to() == reference)
    }
}

/// The slice of an asset account the consensus core is allowed to see.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub account_id: AccountId,
    pub instrument_id: String,
    pub balance: i64,
}

impl Account {
    pub fn new<T: Into<String>>(account_id: AccountId, instrument_id: T, balance: i64) -> Self {
        Self {
            account_id,
            instrument_id: instrument_id.into(),
            balance,
        }
    }
}
