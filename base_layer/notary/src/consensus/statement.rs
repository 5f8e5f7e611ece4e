// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tari_notary_types::{AccountId, NotaryId, NymId, TransactionNumber};

use crate::{
    consensus::error::StatementError,
    ledger::kind::{Kind, OriginKind},
};

pub const STATEMENT_VERSION: u32 = 1;

/// An immutable snapshot of a party's issued and available number sets,
/// produced to be signed. Serialization is canonical: ordered sets, fixed
/// field order, so `parse(serialize(s)) == s`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStatement {
    version: u32,
    nym_id: NymId,
    notary: NotaryId,
    available: BTreeSet<TransactionNumber>,
    issued: BTreeSet<TransactionNumber>,
}

impl TransactionStatement {
    pub fn new(
        notary: NotaryId,
        nym_id: NymId,
        issued: BTreeSet<TransactionNumber>,
        available: BTreeSet<TransactionNumber>,
    ) -> Self {
        Self {
            version: STATEMENT_VERSION,
            nym_id,
            notary,
            available,
            issued,
        }
    }

    pub fn parse(serialized: &str) -> Result<Self, StatementError> {
        Ok(serde_json::from_str(serialized)?)
    }

    pub fn serialize(&self) -> Result<String, StatementError> {
        Ok(serde_json::to_string(self)?)
    }

    /// The bytes a signature over this statement covers.
    pub fn signing_payload(&self) -> Result<Vec<u8>, StatementError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Strips a number from both sets. Used during assembly when the sender
    /// is about to consume a number the snapshot must not list, e.g. the
    /// opening number of the cron item a cancellation is closing.
    pub fn remove(&mut self, number: TransactionNumber) {
        self.issued.remove(&number);
        self.available.remove(&number);
    }

    pub fn issued(&self) -> &BTreeSet<TransactionNumber> {
        &self.issued
    }

    pub fn available(&self) -> &BTreeSet<TransactionNumber> {
        &self.available
    }

    pub fn notary(&self) -> &NotaryId {
        &self.notary
    }

    pub fn nym_id(&self) -> &NymId {
        &self.nym_id
    }
}

/// One line of the inbox/outbox report inside a balance statement.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportItem {
    pub kind: Kind,
    pub transaction_num: TransactionNumber,
    pub in_reference_to: TransactionNumber,
    pub number_of_origin: TransactionNumber,
    pub origin_kind: OriginKind,
    pub amount: i64,
    pub closing_num: Option<TransactionNumber>,
}

/// A transaction statement bundled with an account balance and a report of
/// every receipt in the account's inbox and outbox. Signing one commits the
/// party to the complete post-transaction state of the account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceStatement {
    statement: TransactionStatement,
    account_id: AccountId,
    transaction_num: TransactionNumber,
    balance: i64,
    sub_items: Vec<ReportItem>,
}

impl BalanceStatement {
    pub fn new(
        statement: TransactionStatement,
        account_id: AccountId,
        transaction_num: TransactionNumber,
        balance: i64,
        sub_items: Vec<ReportItem>,
    ) -> Self {
        Self {
            statement,
            account_id,
            transaction_num,
            balance,
            sub_items,
        }
    }

    pub fn parse(serialized: &str) -> Result<Self, StatementError> {
        Ok(serde_json::from_str(serialized)?)
    }

    pub fn serialize(&self) -> Result<String, StatementError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn signing_payload(&self) -> Result<Vec<u8>, StatementError> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn statement(&self) -> &TransactionStatement {
        &self.statement
    }

    pub fn account_id(&self) -> &AccountId {
        &self.account_id
    }

    /// The balance agreement's own transaction number, which is also the
    /// number of the transaction being attempted.
    pub fn transaction_num(&self) -> TransactionNumber {
        self.transaction_num
    }

    /// The balance as it will stand after the transaction succeeds.
    pub fn balance(&self) -> i64 {
        self.balance
    }

    pub fn sub_items(&self) -> &[ReportItem] {
        &self.sub_items
    }

    /// The report line for a final receipt closing out `reference`, if the
    /// report contains one.
    pub fn final_receipt_item(&self, reference: TransactionNumber) -> Option<&ReportItem> {
        self.sub_items
            .iter()
            .find(|item| item.kind == Kind::FinalReceipt && item.in_reference_to == reference)
    }

    pub fn contains_receipt(&self, transaction_num: TransactionNumber) -> bool {
        self.sub_items.iter().any(|item| item.transaction_num == transaction_num)
    }
}
