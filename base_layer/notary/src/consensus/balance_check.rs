// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! Verification of a stored, notary-signed balance receipt against the live
//! account state. This is the client's defense against a misbehaving notary:
//! every delta between the receipt it holds and the state it is shown must
//! be explained, or the client refuses to sign anything further until the
//! dispute is resolved.

use chrono::Utc;
use log::*;
use serde::{Deserialize, Serialize};
use tari_notary_types::{AccountId, NotaryId, NymId, Signature};

use crate::{
    consensus::{
        context::Context,
        error::ConsensusError,
        statement::{BalanceStatement, TransactionStatement},
    },
    interface::Signer,
    ledger::{kind::Kind, Account, Ledger},
    storage::{NotaryBackend, NotaryDatabase},
};

const LOG_TARGET: &str = "notary::consensus::balance_check";

/// A balance statement countersigned by the notary: the client's proof of
/// the last agreed account state.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignedBalanceReceipt {
    statement: BalanceStatement,
    date_signed: i64,
    signer_nym: NymId,
    signature: Signature,
}

impl SignedBalanceReceipt {
    pub fn sign(
        statement: BalanceStatement,
        signer: &dyn Signer,
        signer_nym: NymId,
    ) -> Result<Self, ConsensusError> {
        let payload = statement.signing_payload()?;
        let signature = signer
            .sign(&payload, &signer_nym)
            .map_err(|e| ConsensusError::UnsignedOrBadSignature {
                subject: format!("balance receipt: {e}"),
            })?;
        Ok(Self {
            statement,
            date_signed: Utc::now().timestamp(),
            signer_nym,
            signature,
        })
    }

    pub fn statement(&self) -> &BalanceStatement {
        &self.statement
    }

    pub fn date_signed(&self) -> i64 {
        self.date_signed
    }

    pub fn verify_signature(&self, signer: &dyn Signer) -> Result<(), ConsensusError> {
        let payload = self.statement.signing_payload()?;
        if signer.verify(&payload, &self.signature, &self.signer_nym) {
            Ok(())
        } else {
            Err(ConsensusError::UnsignedOrBadSignature {
                subject: "balance receipt".to_string(),
            })
        }
    }
}

/// A transaction statement countersigned by the notary. Transaction receipts
/// can be newer than the last balance receipt, because they are signed
/// against the nym rather than any one account.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SignedTransactionReceipt {
    statement: TransactionStatement,
    date_signed: i64,
    signer_nym: NymId,
    signature: Signature,
}

impl SignedTransactionReceipt {
    pub fn sign(
        statement: TransactionStatement,
        signer: &dyn Signer,
        signer_nym: NymId,
    ) -> Result<Self, ConsensusError> {
        let payload = statement.signing_payload()?;
        let signature = signer
            .sign(&payload, &signer_nym)
            .map_err(|e| ConsensusError::UnsignedOrBadSignature {
                subject: format!("transaction receipt: {e}"),
            })?;
        Ok(Self {
            statement,
            date_signed: Utc::now().timestamp(),
            signer_nym,
            signature,
        })
    }

    pub fn statement(&self) -> &TransactionStatement {
        &self.statement
    }

    pub fn date_signed(&self) -> i64 {
        self.date_signed
    }

    pub fn verify_signature(&self, signer: &dyn Signer) -> Result<(), ConsensusError> {
        let payload = self.statement.signing_payload()?;
        if signer.verify(&payload, &self.signature, &self.signer_nym) {
            Ok(())
        } else {
            Err(ConsensusError::UnsignedOrBadSignature {
                subject: "transaction receipt".to_string(),
            })
        }
    }
}

/// Verifies the stored balance receipt against the live state. Fail-fast: the
/// first discrepancy is returned and nothing further is checked. On any
/// failure the caller must refuse to sign a new receipt until the state has
/// been disputed or re-synced.
///
/// `context` is the client's view of the notary. `transaction_receipt`, when
/// present and newer, supplies the issued-number list instead of the balance
/// receipt's own statement.
pub fn verify_balance_receipt(
    receipt: &SignedBalanceReceipt,
    transaction_receipt: Option<&SignedTransactionReceipt>,
    context: &Context,
    inbox: &Ledger,
    account: &Account,
    signer: &dyn Signer,
) -> Result<(), ConsensusError> {
    // The notary's signature is what makes the receipt evidence at all.
    receipt.verify_signature(signer)?;

    // Prefer the newer issued-number list.
    let issued_statement = match transaction_receipt {
        Some(txn_receipt) if txn_receipt.date_signed() > receipt.date_signed() => {
            txn_receipt.verify_signature(signer)?;
            debug!(
                target: LOG_TARGET,
                "Using the newer transaction receipt for the issued-number list"
            );
            txn_receipt.statement().clone()
        },
        _ => receipt.statement().statement().clone(),
    };

    // Numbers may have closed out since the receipt was signed; none may
    // have appeared unannounced.
    context.verify_statement_superset(&issued_statement)?;

    // Every balance-affecting change since the receipt must be explained by
    // receipts the notary has shown us.
    let old_sum = report_sum(receipt.statement());
    let new_sum = inbox_sum(inbox)?;
    let delta = new_sum - old_sum;
    let expected_balance = receipt.statement().balance() + delta;
    if expected_balance != account.balance {
        debug!(
            target: LOG_TARGET,
            "Receipt balance {} plus inbox delta {} gives {}, but the account holds {}",
            receipt.statement().balance(),
            delta,
            expected_balance,
            account.balance
        );
        return Err(ConsensusError::BalanceMismatch {
            expected: expected_balance,
            got: account.balance,
        });
    }
    let unreported = unreported_sum(receipt.statement(), inbox)?;
    if unreported != delta {
        debug!(
            target: LOG_TARGET,
            "Inbox delta {} is not accounted for by unreported receipts totalling {}", delta, unreported
        );
        return Err(ConsensusError::UnexplainedDelta { delta, unreported });
    }

    // A final receipt ends a cron item; a new market or payment receipt for
    // the same instrument afterwards means the notary kept it running.
    for live in inbox.receipts() {
        if !live.kind().is_cron_receipt() {
            continue;
        }
        let reference = live.in_reference_to();
        if receipt.statement().final_receipt_item(reference).is_some() &&
            !receipt.statement().contains_receipt(live.transaction_num())
        {
            warn!(
                target: LOG_TARGET,
                "New {} receipt {} arrived for reference {} after its final receipt",
                live.kind(),
                live.transaction_num(),
                reference
            );
            return Err(ConsensusError::CronReceiptAfterFinal { reference });
        }
    }

    Ok(())
}

/// Persists the success receipt for an account, replacing any previous one.
pub fn save_success_receipt<T: NotaryBackend + 'static>(
    db: &NotaryDatabase<T>,
    notary: &NotaryId,
    account: &AccountId,
    receipt: &SignedBalanceReceipt,
) -> Result<(), ConsensusError> {
    Ok(db.save_success_receipt(notary, account, receipt)?)
}

pub fn load_success_receipt<T: NotaryBackend + 'static>(
    db: &NotaryDatabase<T>,
    notary: &NotaryId,
    account: &AccountId,
) -> Result<SignedBalanceReceipt, ConsensusError> {
    Ok(db.fetch_success_receipt(notary, account)?)
}

/// Sum of the balance-affecting amounts in the receipt's inbox report.
fn report_sum(statement: &BalanceStatement) -> i64 {
    statement
        .sub_items()
        .iter()
        .filter(|item| item.kind.is_balance_affecting_receipt() || (item.kind == Kind::Transfer && item.amount > 0))
        .map(|item| item.amount)
        .sum()
}

/// Sum of the balance-affecting receipt amounts in the live inbox.
fn inbox_sum(inbox: &Ledger) -> Result<i64, ConsensusError> {
    let mut sum = 0i64;
    for receipt in inbox.receipts() {
        if receipt.kind().is_balance_affecting_receipt() {
            sum += receipt.receipt_amount()?;
        }
    }
    Ok(sum)
}

/// Signed total of live inbox receipts absent from the receipt's report.
fn unreported_sum(statement: &BalanceStatement, inbox: &Ledger) -> Result<i64, ConsensusError> {
    let mut sum = 0i64;
    for receipt in inbox.receipts() {
        if !receipt.kind().is_balance_affecting_receipt() {
            continue;
        }
        if !statement.contains_receipt(receipt.transaction_num()) {
            sum += receipt.receipt_amount()?;
        }
    }
    Ok(sum)
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use super::{verify_balance_receipt, SignedBalanceReceipt, SignedTransactionReceipt};
    use crate::{
        consensus::{
            context::Context,
            error::ConsensusError,
            statement::{BalanceStatement, ReportItem, TransactionStatement},
        },
        ledger::{
            kind::{Kind, OriginKind},
            receipt::{Instrument, Receipt, TransferOrder},
            Account,
            BoxKind,
            Ledger,
        },
        test_utils::{numbers, NullConnection, StaticSigner},
    };

    fn server_context(issued: &[u64]) -> Context {
        let context = Context::new_server(
            "nym-alice".into(),
            "nym-server".into(),
            "notary-1".into(),
            Arc::new(NullConnection),
        );
        for &n in issued {
            context.issue_number(n.into()).unwrap();
        }
        context
    }

    fn statement_of(issued: &[u64]) -> TransactionStatement {
        TransactionStatement::new("notary-1".into(), "nym-alice".into(), numbers(issued), numbers(issued))
    }

    fn empty_inbox() -> Ledger {
        Ledger::new(BoxKind::Inbox, "acct-1".into(), "notary-1".into(), "nym-alice".into())
    }

    fn pending_receipt(txn: u64, origin: u64, amount: i64) -> Receipt {
        Receipt::new(Kind::Pending, txn.into(), origin.into(), 0, 0)
            .with_instrument(&Instrument::Transfer(TransferOrder {
                origin: origin.into(),
                amount,
            }))
            .unwrap()
    }

    fn signed_receipt(issued: &[u64], balance: i64, sub_items: Vec<ReportItem>) -> SignedBalanceReceipt {
        let statement = BalanceStatement::new(statement_of(issued), "acct-1".into(), 5.into(), balance, sub_items);
        SignedBalanceReceipt::sign(statement, &StaticSigner::default(), "nym-server".into()).unwrap()
    }

    fn pending_item(txn: u64, origin: u64, amount: i64) -> ReportItem {
        ReportItem {
            kind: Kind::Transfer,
            transaction_num: txn.into(),
            in_reference_to: origin.into(),
            number_of_origin: origin.into(),
            origin_kind: OriginKind::NotApplicable,
            amount,
            closing_num: None,
        }
    }

    #[test]
    fn unchanged_state_verifies() {
        let context = server_context(&[5, 6]);
        let receipt = signed_receipt(&[5, 6], 1_000, vec![]);
        let inbox = empty_inbox();
        let account = Account::new("acct-1".into(), "silver-grams", 1_000);
        verify_balance_receipt(&receipt, None, &context, &inbox, &account, &StaticSigner::default()).unwrap();
    }

    #[test]
    fn a_bad_signature_is_fatal() {
        let context = server_context(&[5]);
        let receipt = signed_receipt(&[5], 1_000, vec![]);
        let inbox = empty_inbox();
        let account = Account::new("acct-1".into(), "silver-grams", 1_000);
        let rejecting = StaticSigner::rejecting();
        let result = verify_balance_receipt(&receipt, None, &context, &inbox, &account, &rejecting);
        assert!(matches!(result, Err(ConsensusError::UnsignedOrBadSignature { .. })));
    }

    #[test]
    fn unannounced_issued_numbers_are_refused() {
        // The context holds 7, the stored receipt never mentioned it.
        let context = server_context(&[5, 7]);
        let receipt = signed_receipt(&[5], 1_000, vec![]);
        let inbox = empty_inbox();
        let account = Account::new("acct-1".into(), "silver-grams", 1_000);
        let result = verify_balance_receipt(&receipt, None, &context, &inbox, &account, &StaticSigner::default());
        assert!(matches!(result, Err(ConsensusError::Mismatch { .. })));
    }

    #[test]
    fn a_newer_transaction_receipt_supplies_the_issued_list() {
        let context = server_context(&[5, 7]);
        let mut receipt = signed_receipt(&[5], 1_000, vec![]);
        // Backdate the balance receipt so the transaction receipt is newer.
        receipt.date_signed = 0;
        let txn_receipt =
            SignedTransactionReceipt::sign(statement_of(&[5, 7]), &StaticSigner::default(), "nym-server".into())
                .unwrap();
        let inbox = empty_inbox();
        let account = Account::new("acct-1".into(), "silver-grams", 1_000);
        verify_balance_receipt(
            &receipt,
            Some(&txn_receipt),
            &context,
            &inbox,
            &account,
            &StaticSigner::default(),
        )
        .unwrap();
    }

    #[test]
    fn new_inbox_receipts_must_match_the_balance_delta() {
        let context = server_context(&[5]);
        let receipt = signed_receipt(&[5], 1_000, vec![]);
        let mut inbox = empty_inbox();
        inbox.add_receipt(pending_receipt(80, 9, 250)).unwrap();
        let account = Account::new("acct-1".into(), "silver-grams", 1_250);
        verify_balance_receipt(&receipt, None, &context, &inbox, &account, &StaticSigner::default()).unwrap();

        // Same inbox, but the account balance moved by a different amount.
        let short_account = Account::new("acct-1".into(), "silver-grams", 1_100);
        let result =
            verify_balance_receipt(&receipt, None, &context, &inbox, &short_account, &StaticSigner::default());
        assert!(matches!(result, Err(ConsensusError::BalanceMismatch { .. })));
    }

    #[test]
    fn a_vanished_reported_receipt_is_an_unexplained_delta() {
        let context = server_context(&[5]);
        // The report lists a 250 pending receipt that is gone from the live
        // inbox, while the balance moved to compensate.
        let receipt = signed_receipt(&[5], 1_000, vec![pending_item(80, 9, 250)]);
        let inbox = empty_inbox();
        let account = Account::new("acct-1".into(), "silver-grams", 750);
        let result = verify_balance_receipt(&receipt, None, &context, &inbox, &account, &StaticSigner::default());
        assert!(matches!(result, Err(ConsensusError::UnexplainedDelta { .. })));
    }

    #[test]
    fn cron_receipts_after_a_final_receipt_are_server_misbehavior() {
        let context = server_context(&[5]);
        // The stored report holds a final receipt for cron item 9.
        let final_item = ReportItem {
            kind: Kind::FinalReceipt,
            transaction_num: 70.into(),
            in_reference_to: 9.into(),
            number_of_origin: 9.into(),
            origin_kind: OriginKind::MarketOffer,
            amount: 0,
            closing_num: Some(71.into()),
        };
        let receipt = signed_receipt(&[5], 1_000, vec![final_item]);
        // A fresh market receipt for the same instrument shows up anyway.
        let mut inbox = empty_inbox();
        inbox
            .add_receipt(
                Receipt::new(Kind::MarketReceipt, 90.into(), 9.into(), 50, 0).with_origin_kind(OriginKind::MarketOffer),
            )
            .unwrap();
        let account = Account::new("acct-1".into(), "silver-grams", 1_050);
        let result = verify_balance_receipt(&receipt, None, &context, &inbox, &account, &StaticSigner::default());
        assert!(matches!(result, Err(ConsensusError::CronReceiptAfterFinal { .. })));
    }
}
