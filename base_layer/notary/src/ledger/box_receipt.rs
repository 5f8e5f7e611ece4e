// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! The abbreviated/full receipt split. Transmitted ledgers carry hash
//! commitments; the full forms live in per-receipt storage and are checked
//! against the commitment on the way back in.

use log::*;
use tari_notary_types::{AccountId, NotaryId, TransactionNumber};

use crate::{
    consensus::error::ConsensusError,
    interface::Hasher,
    ledger::{error::LedgerError, receipt::Receipt, BoxKind},
    storage::{BoxReceiptFetch, NotaryBackend, NotaryDatabase},
};

const LOG_TARGET: &str = "notary::ledger::box_receipt";

/// Whether a loaded full form is checked against its abbreviated commitment.
/// `TrustLedger` skips the check for callers that have already verified the
/// containing ledger's signature; the choice is explicit at every call site.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadSecurity {
    Verify,
    TrustLedger,
}

/// Checks that `full` is the receipt `abbreviated` committed to: same
/// content hash, same transaction number, same display reference.
pub fn verify_box_receipt(abbreviated: &Receipt, full: &Receipt, hasher: &dyn Hasher) -> Result<(), LedgerError> {
    let txn = abbreviated.transaction_num();
    let expected = abbreviated.receipt_hash().ok_or(LedgerError::ReceiptMismatch {
        txn,
        field: "receipt_hash",
    })?;
    let actual = full.digest(hasher)?;
    if actual != expected {
        warn!(
            target: LOG_TARGET,
            "Full form of receipt {} hashes to {} but the abbreviated form committed to {}", txn, actual, expected
        );
        return Err(LedgerError::HashMismatch(txn));
    }
    if full.transaction_num() != abbreviated.transaction_num() {
        return Err(LedgerError::ReceiptMismatch {
            txn,
            field: "transaction_num",
        });
    }
    if full.reference_to_display() != abbreviated.reference_to_display() {
        return Err(LedgerError::ReceiptMismatch {
            txn,
            field: "reference_to_display",
        });
    }
    Ok(())
}

/// Stores the full form of a receipt under its box-receipt key.
pub fn save_box_receipt<T: NotaryBackend + 'static>(
    db: &NotaryDatabase<T>,
    box_kind: BoxKind,
    notary: &NotaryId,
    account: &AccountId,
    receipt: &Receipt,
) -> Result<(), ConsensusError> {
    if receipt.is_abbreviated() {
        return Err(LedgerError::MissingFullForm(receipt.transaction_num()).into());
    }
    db.save_box_receipt(box_kind, notary, account, receipt)?;
    Ok(())
}

/// Loads the full form committed to by `abbreviated`. With
/// [`LoadSecurity::Verify`] the form is checked against the commitment
/// before it is handed back.
pub fn load_box_receipt<T: NotaryBackend + 'static>(
    db: &NotaryDatabase<T>,
    hasher: &dyn Hasher,
    abbreviated: &Receipt,
    box_kind: BoxKind,
    notary: &NotaryId,
    account: &AccountId,
    security: LoadSecurity,
) -> Result<Receipt, ConsensusError> {
    let txn = abbreviated.transaction_num();
    let full = match db.fetch_box_receipt(box_kind, notary, account, txn)? {
        BoxReceiptFetch::Missing => return Err(LedgerError::MissingFullForm(txn).into()),
        BoxReceiptFetch::Tombstoned => return Err(LedgerError::Tombstoned(txn).into()),
        BoxReceiptFetch::Receipt(receipt) => *receipt,
    };
    match security {
        LoadSecurity::Verify => verify_box_receipt(abbreviated, &full, hasher)?,
        LoadSecurity::TrustLedger => {
            debug!(
                target: LOG_TARGET,
                "Loading receipt {} without re-verifying its commitment", txn
            );
        },
    }
    Ok(full)
}

/// Marks a stored receipt for deletion. The record stays behind as a
/// tombstone; physical removal is an operator action.
pub fn mark_box_receipt_deleted<T: NotaryBackend + 'static>(
    db: &NotaryDatabase<T>,
    box_kind: BoxKind,
    notary: &NotaryId,
    account: &AccountId,
    txn: TransactionNumber,
) -> Result<(), ConsensusError> {
    db.tombstone_box_receipt(box_kind, notary, account, txn)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::{load_box_receipt, mark_box_receipt_deleted, save_box_receipt, verify_box_receipt, LoadSecurity};
    use crate::{
        consensus::error::ConsensusError,
        interface::Blake2bHasher,
        ledger::{
            error::LedgerError,
            kind::Kind,
            receipt::{Cheque, Instrument, Receipt},
            BoxKind,
        },
        storage::{NotaryDatabase, NotaryMemoryDb},
    };

    fn full_receipt() -> Receipt {
        Receipt::new(Kind::ChequeReceipt, 40.into(), 35.into(), 0, 1_700_000_000)
            .with_instrument(&Instrument::Cheque(Cheque {
                transaction_num: 35.into(),
                amount: 250,
            }))
            .unwrap()
            .with_reference_to_display(35.into())
    }

    #[test]
    fn matching_forms_verify() {
        let hasher = Blake2bHasher;
        let full = full_receipt();
        let abbreviated = full.abbreviate(&hasher).unwrap();
        verify_box_receipt(&abbreviated, &full, &hasher).unwrap();
    }

    #[test]
    fn a_tampered_full_form_is_rejected() {
        // Scenario: the abbreviated inbox claims one hash, the stored full
        // form hashes to another.
        let hasher = Blake2bHasher;
        let full = full_receipt();
        let abbreviated = full.abbreviate(&hasher).unwrap();
        let tampered = full_receipt().with_note("inserted after signing");
        match verify_box_receipt(&abbreviated, &tampered, &hasher) {
            Err(LedgerError::HashMismatch(txn)) => assert_eq!(txn, 40u64),
            other => panic!("expected hash mismatch, got {other:?}"),
        }
    }

    #[test]
    fn save_load_round_trip_with_verification() {
        let hasher = Blake2bHasher;
        let db = NotaryDatabase::new(NotaryMemoryDb::new());
        let notary = "notary-1".into();
        let account = "acct-1".into();
        let full = full_receipt();
        let abbreviated = full.abbreviate(&hasher).unwrap();

        save_box_receipt(&db, BoxKind::Inbox, &notary, &account, &full).unwrap();
        let loaded = load_box_receipt(
            &db,
            &hasher,
            &abbreviated,
            BoxKind::Inbox,
            &notary,
            &account,
            LoadSecurity::Verify,
        )
        .unwrap();
        assert_eq!(loaded, full);
    }

    #[test]
    fn verification_catches_a_swapped_stored_form() {
        let hasher = Blake2bHasher;
        let db = NotaryDatabase::new(NotaryMemoryDb::new());
        let notary = "notary-1".into();
        let account = "acct-1".into();
        let full = full_receipt();
        let abbreviated = full.abbreviate(&hasher).unwrap();

        // Something else was stored under this receipt's key.
        let swapped = Receipt::new(Kind::ChequeReceipt, 40.into(), 35.into(), 0, 1_700_000_001)
            .with_instrument(&Instrument::Cheque(Cheque {
                transaction_num: 35.into(),
                amount: 9_999,
            }))
            .unwrap()
            .with_reference_to_display(35.into());
        save_box_receipt(&db, BoxKind::Inbox, &notary, &account, &swapped).unwrap();

        let result = load_box_receipt(
            &db,
            &hasher,
            &abbreviated,
            BoxKind::Inbox,
            &notary,
            &account,
            LoadSecurity::Verify,
        );
        assert!(matches!(
            result,
            Err(ConsensusError::Ledger(LedgerError::HashMismatch(_)))
        ));
        // An explicit opt-out hands the stored form back regardless.
        let trusted = load_box_receipt(
            &db,
            &hasher,
            &abbreviated,
            BoxKind::Inbox,
            &notary,
            &account,
            LoadSecurity::TrustLedger,
        )
        .unwrap();
        assert_eq!(trusted, swapped);
    }

    #[test]
    fn abbreviated_forms_cannot_be_saved() {
        let hasher = Blake2bHasher;
        let db = NotaryDatabase::new(NotaryMemoryDb::new());
        let abbreviated = full_receipt().abbreviate(&hasher).unwrap();
        let result = save_box_receipt(&db, BoxKind::Inbox, &"notary-1".into(), &"acct-1".into(), &abbreviated);
        assert!(result.is_err());
    }

    #[test]
    fn tombstoned_receipts_refuse_to_load() {
        let hasher = Blake2bHasher;
        let db = NotaryDatabase::new(NotaryMemoryDb::new());
        let notary = "notary-1".into();
        let account = "acct-1".into();
        let full = full_receipt();
        let abbreviated = full.abbreviate(&hasher).unwrap();
        save_box_receipt(&db, BoxKind::Inbox, &notary, &account, &full).unwrap();
        mark_box_receipt_deleted(&db, BoxKind::Inbox, &notary, &account, full.transaction_num()).unwrap();
        let result = load_box_receipt(
            &db,
            &hasher,
            &abbreviated,
            BoxKind::Inbox,
            &notary,
            &account,
            LoadSecurity::Verify,
        );
        assert!(matches!(result, Err(ConsensusError::Ledger(LedgerError::Tombstoned(_)))));
    }
}
