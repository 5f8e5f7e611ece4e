// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use crate::storage::{
    database::{DbKey, DbValue, NotaryBackend, WriteOperation},
    error::ContextStorageError,
};

/// An in-memory backend. Used by tests and by embedders that persist
/// elsewhere; everything is lost when the last handle drops.
#[derive(Clone, Default)]
pub struct NotaryMemoryDb {
    inner: Arc<RwLock<HashMap<DbKey, DbValue>>>,
}

impl NotaryMemoryDb {
    pub fn new() -> Self {
        Default::default()
    }
}

impl NotaryBackend for NotaryMemoryDb {
    fn fetch(&self, key: &DbKey) -> Result<Option<DbValue>, ContextStorageError> {
        let inner = self.inner.read().expect("memory db lock poisoned");
        Ok(inner.get(key).cloned())
    }

    fn write(&self, op: WriteOperation) -> Result<(), ContextStorageError> {
        let mut inner = self.inner.write().expect("memory db lock poisoned");
        match op {
            WriteOperation::Insert(key, value) => {
                inner.insert(key, value);
            },
            WriteOperation::Remove(key) => {
                inner.remove(&key);
            },
            WriteOperation::Tombstone(key) => {
                inner.insert(key, DbValue::Tombstone);
            },
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::NotaryMemoryDb;
    use crate::{
        consensus::context::Context,
        ledger::{kind::Kind, receipt::Receipt, BoxKind},
        storage::database::{BoxReceiptFetch, NotaryDatabase},
    };

    #[test]
    fn context_round_trip_through_the_database() {
        let db = NotaryDatabase::new(NotaryMemoryDb::new());
        let context = Context::new_client("nym-server".into(), "nym-alice".into(), "notary-1".into());
        context.issue_number(5.into()).unwrap();

        assert!(!db.context_exists(context.local_id(), context.remote_id()).unwrap());
        db.save_context(&context.serialize()).unwrap();
        assert!(db.context_exists(context.local_id(), context.remote_id()).unwrap());

        let restored = db.fetch_context(context.local_id(), context.remote_id()).unwrap();
        assert_eq!(restored, context.serialize());
    }

    #[test]
    fn missing_context_reports_its_key() {
        let db = NotaryDatabase::new(NotaryMemoryDb::new());
        let err = db.fetch_context(&"nym-a".into(), &"nym-b".into()).unwrap_err();
        assert!(err.to_string().contains("contexts/nym-a/nym-b"));
    }

    #[test]
    fn box_receipts_store_fetch_and_tombstone() {
        let db = NotaryDatabase::new(NotaryMemoryDb::new());
        let notary = "notary-1".into();
        let account = "acct-1".into();
        let receipt = Receipt::new(Kind::ChequeReceipt, 40.into(), 35.into(), 0, 0);

        assert!(matches!(
            db.fetch_box_receipt(BoxKind::Inbox, &notary, &account, 40.into()).unwrap(),
            BoxReceiptFetch::Missing
        ));
        db.save_box_receipt(BoxKind::Inbox, &notary, &account, &receipt).unwrap();
        assert!(matches!(
            db.fetch_box_receipt(BoxKind::Inbox, &notary, &account, 40.into()).unwrap(),
            BoxReceiptFetch::Receipt(_)
        ));
        db.tombstone_box_receipt(BoxKind::Inbox, &notary, &account, 40.into())
            .unwrap();
        assert!(matches!(
            db.fetch_box_receipt(BoxKind::Inbox, &notary, &account, 40.into()).unwrap(),
            BoxReceiptFetch::Tombstoned
        ));
    }
}
