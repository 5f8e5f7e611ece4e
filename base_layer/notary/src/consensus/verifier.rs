// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! Cross-checks a signed statement against the live consensus state. These
//! functions are read-only; nothing here mutates a context.

use std::collections::BTreeSet;

use log::*;
use tari_notary_types::TransactionNumber;

use crate::{
    consensus::{
        context::{ConsensusType, Context},
        error::{ConsensusError, MismatchSide, RegistryError},
        statement::{BalanceStatement, ReportItem, TransactionStatement},
    },
    ledger::{error::LedgerError, kind::Kind, Account, BoxKind, Ledger},
};

const LOG_TARGET: &str = "notary::consensus::verifier";

/// The placeholder transaction number a client writes on an outbox report
/// item when it cannot yet know the notary-assigned number.
pub const NEW_OUTBOX_PLACEHOLDER: TransactionNumber = TransactionNumber::new(1);

/// The transaction a statement was signed for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TargetTransaction {
    pub kind: Kind,
    pub transaction_num: TransactionNumber,
}

/// How one report item participates in balance verification: which box it
/// belongs to, the sign its amount carries, and the receipt kinds that may
/// answer for it.
struct ReportClass {
    counts_as_inbox: bool,
    multiplier: i64,
    expected: &'static [Kind],
}

/// Classifies a report item, or `None` for kinds that carry no box receipt
/// and are skipped. A `transfer` item is an outbox entry when its amount is
/// negative (money leaving) and an inbox entry otherwise; an inbox transfer
/// may already have been accepted by the recipient, so it matches a
/// `transferReceipt` as well as a `pending`.
fn report_class(item: &ReportItem) -> Option<ReportClass> {
    match item.kind {
        Kind::Transfer => {
            if item.amount < 0 {
                Some(ReportClass {
                    counts_as_inbox: false,
                    multiplier: -1,
                    expected: &[Kind::Pending],
                })
            } else {
                Some(ReportClass {
                    counts_as_inbox: true,
                    multiplier: 1,
                    expected: &[Kind::Pending, Kind::TransferReceipt],
                })
            }
        },
        Kind::ChequeReceipt => Some(ReportClass {
            counts_as_inbox: true,
            multiplier: 1,
            expected: &[Kind::ChequeReceipt],
        }),
        Kind::VoucherReceipt => Some(ReportClass {
            counts_as_inbox: true,
            multiplier: 1,
            expected: &[Kind::VoucherReceipt],
        }),
        Kind::MarketReceipt => Some(ReportClass {
            counts_as_inbox: true,
            multiplier: 1,
            expected: &[Kind::MarketReceipt],
        }),
        Kind::PaymentReceipt => Some(ReportClass {
            counts_as_inbox: true,
            multiplier: 1,
            expected: &[Kind::PaymentReceipt],
        }),
        Kind::TransferReceipt => Some(ReportClass {
            counts_as_inbox: true,
            multiplier: 1,
            expected: &[Kind::TransferReceipt],
        }),
        Kind::BasketReceipt => Some(ReportClass {
            counts_as_inbox: true,
            multiplier: 1,
            expected: &[Kind::BasketReceipt],
        }),
        Kind::FinalReceipt => Some(ReportClass {
            counts_as_inbox: true,
            multiplier: 1,
            expected: &[Kind::FinalReceipt],
        }),
        _ => None,
    }
}

/// Verifies a transaction statement against a client context.
///
/// The statement was signed as if the transaction in flight had already
/// succeeded, so the caller supplies the same lens: `excluded` numbers are
/// removed from the context's issued set and `included` numbers added before
/// the two sides must match exactly. The statement can never grow the
/// obligation set unannounced; any number it carries must come out of the
/// context or out of `included`.
pub fn verify_transaction_statement(
    context: &Context,
    statement: &TransactionStatement,
    excluded: &BTreeSet<TransactionNumber>,
    included: &BTreeSet<TransactionNumber>,
) -> Result<(), ConsensusError> {
    if context.context_type() != ConsensusType::Client {
        return Err(ConsensusError::WrongContext);
    }
    let mut effective = context.issued_snapshot();
    for &number in included {
        if !effective.insert(number) {
            debug!(
                target: LOG_TARGET,
                "New transaction number {} already exists in the context", number
            );
            return Err(RegistryError::AlreadyIssued(number).into());
        }
    }
    for &number in excluded {
        if !effective.remove(&number) {
            debug!(
                target: LOG_TARGET,
                "Excluded transaction number {} does not exist in the context", number
            );
            return Err(RegistryError::NotIssued(number).into());
        }
    }
    for &number in statement.issued() {
        if !effective.contains(&number) {
            debug!(
                target: LOG_TARGET,
                "Issued transaction number {} from statement not found on context", number
            );
            return Err(ConsensusError::Mismatch {
                number,
                side: MismatchSide::Statement,
            });
        }
    }
    for &number in &effective {
        if !statement.issued().contains(&number) {
            debug!(
                target: LOG_TARGET,
                "Issued transaction number {} from context not found on statement", number
            );
            return Err(ConsensusError::Mismatch {
                number,
                side: MismatchSide::Context,
            });
        }
    }
    Ok(())
}

/// Verifies the transaction statement accompanying a target transaction.
///
/// A real target's own number must already be on the issued list, or among
/// the `new_numbers` being signed over in this same exchange. A cancellation
/// is verified as if its number were already excluded, since that is the
/// success it is asking for; cron item openings stay in place. A zero target
/// number means the statement accompanies a message-level operation (nymbox
/// processing) and carries no number of its own.
pub fn verify_transaction_statement_for(
    context: &Context,
    statement: &TransactionStatement,
    target: TargetTransaction,
    new_numbers: &BTreeSet<TransactionNumber>,
) -> Result<(), ConsensusError> {
    let mut excluded = BTreeSet::new();
    if !target.transaction_num.is_zero() {
        let found =
            context.verify_issued_number(target.transaction_num) || new_numbers.contains(&target.transaction_num);
        if !found {
            debug!(
                target: LOG_TARGET,
                "Target transaction number {} does not appear on the issued list", target.transaction_num
            );
            return Err(RegistryError::NotIssued(target.transaction_num).into());
        }
        match target.kind {
            Kind::CancelCronItem => {
                excluded.insert(target.transaction_num);
            },
            Kind::MarketOffer | Kind::PaymentPlan | Kind::SmartContract => {},
            kind => {
                warn!(
                    target: LOG_TARGET,
                    "Unexpected {} target for a transaction statement", kind
                );
            },
        }
    }
    verify_transaction_statement(context, statement, &excluded, new_numbers)
}

/// Verifies a balance statement against the live account state.
///
/// Checks, in order: the proposed balance arithmetic; every report item
/// against its box receipt (location, reference, origin, signed amount,
/// kind); that the report omits nothing the boxes hold; and finally the
/// issued-number lists through [`verify_transaction_statement`], with the
/// target's opening number excluded when its kind closes on success.
#[allow(clippy::too_many_arguments)]
pub fn verify_balance_statement(
    context: &Context,
    statement: &BalanceStatement,
    adjustment: i64,
    inbox: &Ledger,
    outbox: &Ledger,
    account: &Account,
    target: TargetTransaction,
    excluded: &BTreeSet<TransactionNumber>,
    outbox_num_hint: Option<TransactionNumber>,
) -> Result<(), ConsensusError> {
    // The statement holds what the balance will be after the transaction
    // succeeds.
    let expected_balance = account.balance + adjustment;
    if expected_balance != statement.balance() {
        debug!(
            target: LOG_TARGET,
            "Balance statement carries {}, but account balance {} plus adjustment {} gives {}",
            statement.balance(),
            account.balance,
            adjustment,
            expected_balance
        );
        return Err(ConsensusError::BalanceMismatch {
            expected: expected_balance,
            got: statement.balance(),
        });
    }

    let mut inbox_items = 0usize;
    let mut outbox_items = 0usize;
    for item in statement.sub_items() {
        let class = match report_class(item) {
            Some(class) => class,
            None => {
                warn!(
                    target: LOG_TARGET,
                    "Ignoring {} item in balance statement while verifying it against the boxes", item.kind
                );
                continue;
            },
        };
        let (ledger, box_kind) = if class.counts_as_inbox {
            inbox_items += 1;
            (inbox, BoxKind::Inbox)
        } else {
            outbox_items += 1;
            (outbox, BoxKind::Outbox)
        };

        // A brand-new outbox entry was reported under the placeholder number;
        // the notary passes the real number back in so it can be found.
        let lookup = match outbox_num_hint {
            Some(hint) if !class.counts_as_inbox && item.transaction_num == NEW_OUTBOX_PLACEHOLDER => {
                trace!(
                    target: LOG_TARGET,
                    "Report item is a new outbox entry, retrieving by notary-assigned number {}",
                    hint
                );
                hint
            },
            _ => item.transaction_num,
        };
        let receipt = ledger
            .get_by_transaction_num(lookup)
            .ok_or(ConsensusError::MissingReceipt {
                box_kind,
                txn: item.transaction_num,
            })?;

        if item.in_reference_to != receipt.in_reference_to() {
            return Err(LedgerError::ReceiptMismatch {
                txn: item.transaction_num,
                field: "in_reference_to",
            }
            .into());
        }
        if item.number_of_origin != receipt.number_of_origin()? {
            return Err(LedgerError::ReceiptMismatch {
                txn: item.transaction_num,
                field: "number_of_origin",
            }
            .into());
        }
        let receipt_amount = receipt.receipt_amount()? * class.multiplier;
        if item.amount != receipt_amount {
            debug!(
                target: LOG_TARGET,
                "{} receipt {} amounts disagree: report says {}, receipt computes {}",
                box_kind,
                item.transaction_num,
                item.amount,
                receipt_amount
            );
            return Err(ConsensusError::AmountMismatch {
                txn: item.transaction_num,
                expected: receipt_amount,
                got: item.amount,
            });
        }
        if !class.expected.contains(&receipt.kind()) {
            return Err(ConsensusError::WrongReceiptKind {
                expected: class
                    .expected
                    .iter()
                    .map(|k| k.to_string())
                    .collect::<Vec<_>>()
                    .join(" or "),
                got: receipt.kind(),
                txn: item.transaction_num,
            });
        }
        if matches!(item.kind, Kind::VoucherReceipt | Kind::PaymentReceipt | Kind::FinalReceipt) &&
            item.origin_kind != receipt.origin_kind()
        {
            return Err(LedgerError::ReceiptMismatch {
                txn: item.transaction_num,
                field: "origin_kind",
            }
            .into());
        }
        if matches!(item.kind, Kind::BasketReceipt | Kind::FinalReceipt) && item.closing_num != receipt.closing_num()
        {
            return Err(LedgerError::ReceiptMismatch {
                txn: item.transaction_num,
                field: "closing_num",
            }
            .into());
        }
    }

    // Nothing in either box may go unreported.
    if inbox_items != inbox.count() {
        return Err(ConsensusError::ReceiptCountMismatch {
            box_kind: BoxKind::Inbox,
            reported: inbox_items,
            actual: inbox.count(),
        });
    }
    if outbox_items != outbox.count() {
        return Err(ConsensusError::ReceiptCountMismatch {
            box_kind: BoxKind::Outbox,
            reported: outbox_items,
            actual: outbox.count(),
        });
    }

    // The statement's own number authorizes the transaction being attempted.
    if !context.verify_issued_number_excluding(target.transaction_num, excluded) {
        debug!(
            target: LOG_TARGET,
            "Target transaction number {} does not appear on the issued list", target.transaction_num
        );
        return Err(RegistryError::NotIssued(target.transaction_num).into());
    }

    let mut removed = excluded.clone();
    if target.kind.closes_opening_number() {
        debug!(
            target: LOG_TARGET,
            "Transaction number {} is being closed by this {}", target.transaction_num, target.kind
        );
        removed.insert(target.transaction_num);
    } else if target.kind.keeps_opening_number() {
        debug!(
            target: LOG_TARGET,
            "Transaction number {} remains open after this {}", target.transaction_num, target.kind
        );
    } else {
        warn!(
            target: LOG_TARGET,
            "Unexpected target transaction kind {} in balance statement verification", target.kind
        );
    }

    verify_transaction_statement(context, statement.statement(), &removed, &BTreeSet::new())
}
