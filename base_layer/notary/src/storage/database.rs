// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use std::{
    fmt,
    fmt::{Display, Formatter},
    sync::Arc,
};

use log::*;
use tari_notary_types::{AccountId, NotaryId, NymId, TransactionNumber};

use crate::{
    consensus::{balance_check::SignedBalanceReceipt, context::SerializedContext},
    ledger::{receipt::Receipt, BoxKind},
    storage::error::ContextStorageError,
};

const LOG_TARGET: &str = "notary::storage::database";

/// This trait defines the functionality a storage backend needs to provide
/// for the consensus core: context blobs, per-account success receipts, and
/// per-receipt full forms.
pub trait NotaryBackend: Send + Sync + Clone {
    /// Retrieve the record associated with the provided DbKey
    fn fetch(&self, key: &DbKey) -> Result<Option<DbValue>, ContextStorageError>;
    /// Modify the state of the backend with a write operation
    fn write(&self, op: WriteOperation) -> Result<(), ContextStorageError>;

    fn exists(&self, key: &DbKey) -> Result<bool, ContextStorageError> {
        Ok(self.fetch(key)?.is_some())
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum DbKey {
    /// One blob per (local, remote) pair.
    Context(NymId, NymId),
    /// The last notary-signed balance receipt for an account.
    SuccessReceipt(NotaryId, AccountId),
    /// The full form of one box receipt.
    BoxReceipt(BoxKind, NotaryId, AccountId, TransactionNumber),
}

impl Display for DbKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            DbKey::Context(local, remote) => write!(f, "contexts/{local}/{remote}"),
            DbKey::SuccessReceipt(notary, account) => write!(f, "receipts/{notary}/{account}.success"),
            DbKey::BoxReceipt(box_kind, notary, account, txn) => write!(f, "{box_kind}/{notary}/{account}/{txn}"),
        }
    }
}

#[derive(Clone, Debug)]
pub enum DbValue {
    Context(Box<SerializedContext>),
    SuccessReceipt(Box<SignedBalanceReceipt>),
    BoxReceipt(Box<Receipt>),
    /// Deletion sentinel. Physical removal is deferred to an operator.
    Tombstone,
}

pub enum WriteOperation {
    Insert(DbKey, DbValue),
    Remove(DbKey),
    Tombstone(DbKey),
}

/// Outcome of a box-receipt lookup, distinguishing "never stored" from
/// "stored then marked for deletion".
#[derive(Clone, Debug)]
pub enum BoxReceiptFetch {
    Missing,
    Tombstoned,
    Receipt(Box<Receipt>),
}

pub struct NotaryDatabase<T>
where T: NotaryBackend
{
    db: Arc<T>,
}

impl<T> Clone for NotaryDatabase<T>
where T: NotaryBackend
{
    fn clone(&self) -> Self {
        Self { db: self.db.clone() }
    }
}

impl<T> NotaryDatabase<T>
where T: NotaryBackend + 'static
{
    pub fn new(db: T) -> Self {
        Self { db: Arc::new(db) }
    }

    pub fn save_context(&self, context: &SerializedContext) -> Result<(), ContextStorageError> {
        let key = DbKey::Context(context.local_id.clone(), context.remote_id.clone());
        self.db
            .write(WriteOperation::Insert(key, DbValue::Context(Box::new(context.clone()))))
    }

    pub fn fetch_context(&self, local: &NymId, remote: &NymId) -> Result<SerializedContext, ContextStorageError> {
        let key = DbKey::Context(local.clone(), remote.clone());
        match self.db.fetch(&key) {
            Ok(None) => Err(ContextStorageError::ValueNotFound(key)),
            Ok(Some(DbValue::Context(context))) => Ok(*context),
            Ok(Some(other)) => unexpected_result(key, &other),
            Err(e) => log_error(key, e),
        }
    }

    pub fn context_exists(&self, local: &NymId, remote: &NymId) -> Result<bool, ContextStorageError> {
        self.db.exists(&DbKey::Context(local.clone(), remote.clone()))
    }

    pub fn save_success_receipt(
        &self,
        notary: &NotaryId,
        account: &AccountId,
        receipt: &SignedBalanceReceipt,
    ) -> Result<(), ContextStorageError> {
        let key = DbKey::SuccessReceipt(notary.clone(), account.clone());
        self.db
            .write(WriteOperation::Insert(key, DbValue::SuccessReceipt(Box::new(receipt.clone()))))
    }

    pub fn fetch_success_receipt(
        &self,
        notary: &NotaryId,
        account: &AccountId,
    ) -> Result<SignedBalanceReceipt, ContextStorageError> {
        let key = DbKey::SuccessReceipt(notary.clone(), account.clone());
        match self.db.fetch(&key) {
            Ok(None) => Err(ContextStorageError::ValueNotFound(key)),
            Ok(Some(DbValue::SuccessReceipt(receipt))) => Ok(*receipt),
            Ok(Some(other)) => unexpected_result(key, &other),
            Err(e) => log_error(key, e),
        }
    }

    pub fn save_box_receipt(
        &self,
        box_kind: BoxKind,
        notary: &NotaryId,
        account: &AccountId,
        receipt: &Receipt,
    ) -> Result<(), ContextStorageError> {
        let key = DbKey::BoxReceipt(box_kind, notary.clone(), account.clone(), receipt.transaction_num());
        self.db
            .write(WriteOperation::Insert(key, DbValue::BoxReceipt(Box::new(receipt.clone()))))
    }

    pub fn fetch_box_receipt(
        &self,
        box_kind: BoxKind,
        notary: &NotaryId,
        account: &AccountId,
        txn: TransactionNumber,
    ) -> Result<BoxReceiptFetch, ContextStorageError> {
        let key = DbKey::BoxReceipt(box_kind, notary.clone(), account.clone(), txn);
        match self.db.fetch(&key) {
            Ok(None) => Ok(BoxReceiptFetch::Missing),
            Ok(Some(DbValue::BoxReceipt(receipt))) => Ok(BoxReceiptFetch::Receipt(receipt)),
            Ok(Some(DbValue::Tombstone)) => Ok(BoxReceiptFetch::Tombstoned),
            Ok(Some(other)) => unexpected_result(key, &other),
            Err(e) => log_error(key, e),
        }
    }

    pub fn tombstone_box_receipt(
        &self,
        box_kind: BoxKind,
        notary: &NotaryId,
        account: &AccountId,
        txn: TransactionNumber,
    ) -> Result<(), ContextStorageError> {
        let key = DbKey::BoxReceipt(box_kind, notary.clone(), account.clone(), txn);
        self.db.write(WriteOperation::Tombstone(key))
    }
}

fn unexpected_result<R>(key: DbKey, value: &DbValue) -> Result<R, ContextStorageError> {
    let message = format!("Unexpected value {value:?} for key {key}");
    error!(target: LOG_TARGET, "{}", message);
    Err(ContextStorageError::UnexpectedResult(message))
}

fn log_error<R>(key: DbKey, error: ContextStorageError) -> Result<R, ContextStorageError> {
    error!(
        target: LOG_TARGET,
        "Database access for key {} resulted in error: {}", key, error
    );
    Err(error)
}
