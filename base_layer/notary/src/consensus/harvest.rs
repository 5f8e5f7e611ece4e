// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! Reconciles transaction numbers after a request that failed, or partially
//! failed. Harvesting never runs on an unknown outcome: a timeout or garbled
//! reply means the notary may have processed the request, and recovering a
//! number it considers spent would fork the relationship.
//!
//! The distinction that drives the whole policy: when the *message* failed,
//! the transaction never ran, so the opening number is still good; when the
//! message succeeded but the *transaction* failed, the opening number was
//! burned in the attempt and only the closing numbers come back.

use log::*;
use tari_notary_types::TransactionNumber;

use crate::{
    consensus::context::Context,
    ledger::{error::LedgerError, kind::Kind, receipt::{Instrument, Receipt}},
};

const LOG_TARGET: &str = "notary::consensus::harvest";

/// Whether the notary's reply itself arrived and succeeded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MessageOutcome {
    Failure,
    Success,
}

/// Whether the transaction inside a successful reply succeeded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransactionOutcome {
    Unknown,
    Success,
    Failure,
}

/// The known outcome of a request/reply pair.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Outcome {
    pub reply: MessageOutcome,
    pub transaction: TransactionOutcome,
    /// The caller intends to retry with the same numbers. Closing numbers
    /// must stay consumed so the retry can reuse them.
    pub retrying: bool,
}

/// Which side of a two-party instrument is harvesting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HarvestRole {
    Payer,
    Payee,
}

/// What to do with one number. Applied through the context, which rechecks
/// membership before every move.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HarvestAction {
    /// Return the number to the available pool.
    Recover(TransactionNumber),
    /// The number was consumed with nothing to show for it; close it out.
    Burn(TransactionNumber),
    /// The number is spent but the obligation lives on.
    MarkUsed(TransactionNumber),
}

/// Decides the fate of every transaction number a failed request had in
/// play. Pure policy; the caller applies the actions via
/// [`Context::apply_harvest`].
pub fn harvest_numbers(
    receipt: &Receipt,
    outcome: Outcome,
    role: HarvestRole,
) -> Result<Vec<HarvestAction>, LedgerError> {
    let opening = receipt.transaction_num();
    let mut actions = Vec::new();
    match receipt.kind() {
        Kind::ProcessInbox | Kind::Withdrawal | Kind::Deposit | Kind::CancelCronItem | Kind::PayDividend => {
            single_opening(opening, outcome, &mut actions);
        },
        Kind::Transfer => {
            single_opening(opening, outcome, &mut actions);
        },
        Kind::MarketOffer => {
            let numbers = match receipt.instrument()? {
                Instrument::MarketOffer(numbers) => numbers,
                other => return Err(wrong_instrument(receipt, &other)),
            };
            single_opening(opening, outcome, &mut actions);
            closing_numbers(&[numbers.asset_closing, numbers.currency_closing], outcome, &mut actions);
        },
        Kind::ExchangeBasket => {
            let numbers = match receipt.instrument()? {
                Instrument::BasketExchange(numbers) => numbers,
                other => return Err(wrong_instrument(receipt, &other)),
            };
            burned_opening(opening, outcome, &mut actions);
            closing_numbers(&numbers.closings, outcome, &mut actions);
        },
        Kind::PaymentPlan => {
            let numbers = match receipt.instrument()? {
                Instrument::PaymentPlan(numbers) => numbers,
                other => return Err(wrong_instrument(receipt, &other)),
            };
            match role {
                HarvestRole::Payer => {
                    burned_opening(numbers.sender_opening, outcome, &mut actions);
                    closing_numbers(&[numbers.sender_closing], outcome, &mut actions);
                },
                HarvestRole::Payee => {
                    recipient_opening(numbers.recipient_opening, outcome, &mut actions);
                    closing_numbers(&[numbers.recipient_closing], outcome, &mut actions);
                },
            }
        },
        Kind::SmartContract => {
            let numbers = match receipt.instrument()? {
                Instrument::SmartContract(numbers) => numbers,
                other => return Err(wrong_instrument(receipt, &other)),
            };
            burned_opening(numbers.opening, outcome, &mut actions);
            closing_numbers(&numbers.account_closings, outcome, &mut actions);
        },
        kind => {
            debug!(target: LOG_TARGET, "Nothing to harvest from a {} entry", kind);
        },
    }
    Ok(actions)
}

/// A lone opening number: recovered when the message never ran, consumed one
/// way or the other once the notary saw it.
fn single_opening(opening: TransactionNumber, outcome: Outcome, actions: &mut Vec<HarvestAction>) {
    match (outcome.reply, outcome.transaction) {
        (MessageOutcome::Failure, _) => actions.push(HarvestAction::Recover(opening)),
        (MessageOutcome::Success, TransactionOutcome::Success) => actions.push(HarvestAction::MarkUsed(opening)),
        (MessageOutcome::Success, TransactionOutcome::Failure) => actions.push(HarvestAction::Burn(opening)),
        (MessageOutcome::Success, TransactionOutcome::Unknown) => {
            warn!(
                target: LOG_TARGET,
                "Transaction outcome for opening number {} is unknown; leaving it in place", opening
            );
        },
    }
}

/// An opening number that is gone the moment the notary sees the request,
/// regardless of how the transaction inside fared.
fn burned_opening(opening: TransactionNumber, outcome: Outcome, actions: &mut Vec<HarvestAction>) {
    match outcome.reply {
        MessageOutcome::Failure => actions.push(HarvestAction::Recover(opening)),
        MessageOutcome::Success => actions.push(HarvestAction::Burn(opening)),
    }
}

/// The recipient's opening number on a two-party instrument. The activation
/// was not ours, so the number survives anything short of a successful
/// activation; but when a retry by the counterparty is still possible the
/// safe move is to leave it alone.
fn recipient_opening(opening: TransactionNumber, outcome: Outcome, actions: &mut Vec<HarvestAction>) {
    match (outcome.reply, outcome.transaction) {
        (MessageOutcome::Failure, _) => actions.push(HarvestAction::Recover(opening)),
        (MessageOutcome::Success, TransactionOutcome::Success) => actions.push(HarvestAction::Burn(opening)),
        (MessageOutcome::Success, TransactionOutcome::Failure) => {
            if outcome.retrying {
                warn!(
                    target: LOG_TARGET,
                    "Partial failure on a two-party instrument while a retry is pending; leaving opening number {} \
                     in place. Manual reconciliation may be required.",
                    opening
                );
            } else {
                actions.push(HarvestAction::Recover(opening));
            }
        },
        (MessageOutcome::Success, TransactionOutcome::Unknown) => {
            warn!(
                target: LOG_TARGET,
                "Transaction outcome for recipient opening number {} is unknown; leaving it in place", opening
            );
        },
    }
}

/// Closing numbers: marked used once the instrument is live, recovered on
/// any known failure, untouched during a retry so the retry can reuse them.
fn closing_numbers(closings: &[TransactionNumber], outcome: Outcome, actions: &mut Vec<HarvestAction>) {
    if outcome.transaction == TransactionOutcome::Success {
        actions.extend(closings.iter().map(|&n| HarvestAction::MarkUsed(n)));
        return;
    }
    if outcome.retrying {
        debug!(
            target: LOG_TARGET,
            "Retry pending: keeping {} closing numbers consumed",
            closings.len()
        );
        return;
    }
    if outcome.reply == MessageOutcome::Failure || outcome.transaction == TransactionOutcome::Failure {
        actions.extend(closings.iter().map(|&n| HarvestAction::Recover(n)));
    }
}

fn wrong_instrument(receipt: &Receipt, got: &Instrument) -> LedgerError {
    LedgerError::MalformedReceipt {
        txn: receipt.transaction_num(),
        reason: format!("unexpected embedded instrument {got:?} on a {} request", receipt.kind()),
    }
}

impl Context {
    /// Applies harvest actions. Errors are logged and the number left in its
    /// current state: a leaked number is recoverable by resync, an
    /// incorrectly reused one is not. Applying the same actions twice is a
    /// no-op the second time.
    pub fn apply_harvest(&self, actions: &[HarvestAction]) {
        for action in actions {
            let result = match *action {
                HarvestAction::Recover(number) => self.recover_available_number(number),
                HarvestAction::Burn(number) => self.consume_issued(number),
                HarvestAction::MarkUsed(number) => self.consume_available(number),
            };
            if let Err(e) = result {
                info!(target: LOG_TARGET, "Skipping harvest action {:?}: {}", action, e);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::Arc;

    use tari_notary_types::TransactionNumber;

    use super::{harvest_numbers, HarvestAction, HarvestRole, MessageOutcome, Outcome, TransactionOutcome};
    use crate::{
        consensus::context::Context,
        ledger::{
            kind::Kind,
            receipt::{Instrument, MarketOfferNumbers, PaymentPlanNumbers, Receipt},
        },
        test_utils::NullConnection,
    };

    fn outcome(reply: MessageOutcome, transaction: TransactionOutcome, retrying: bool) -> Outcome {
        Outcome {
            reply,
            transaction,
            retrying,
        }
    }

    fn withdrawal_receipt(opening: u64) -> Receipt {
        Receipt::new(Kind::Withdrawal, opening.into(), 0.into(), -100, 0)
    }

    fn payment_plan_receipt() -> Receipt {
        Receipt::new(Kind::PaymentPlan, 100.into(), 0.into(), 0, 0)
            .with_instrument(&Instrument::PaymentPlan(PaymentPlanNumbers {
                sender_opening: 100.into(),
                sender_closing: 101.into(),
                recipient_opening: 200.into(),
                recipient_closing: 201.into(),
            }))
            .unwrap()
    }

    fn market_offer_receipt() -> Receipt {
        Receipt::new(Kind::MarketOffer, 50.into(), 0.into(), 0, 0)
            .with_instrument(&Instrument::MarketOffer(MarketOfferNumbers {
                asset_closing: 51.into(),
                currency_closing: 52.into(),
            }))
            .unwrap()
    }

    #[test]
    fn failed_withdrawal_recovers_its_opening_number() {
        // Scenario: issued {11,12}, number 11 consumed, reply is an
        // unambiguous failure.
        let receipt = withdrawal_receipt(11);
        let actions = harvest_numbers(
            &receipt,
            outcome(MessageOutcome::Failure, TransactionOutcome::Unknown, false),
            HarvestRole::Payer,
        )
        .unwrap();
        assert_eq!(actions, vec![HarvestAction::Recover(11.into())]);
    }

    #[test]
    fn success_success_never_recovers_the_opening_number() {
        for receipt in [
            withdrawal_receipt(11),
            Receipt::new(Kind::Transfer, 11.into(), 0.into(), -500, 0),
            market_offer_receipt(),
            payment_plan_receipt(),
        ] {
            for role in [HarvestRole::Payer, HarvestRole::Payee] {
                let actions = harvest_numbers(
                    &receipt,
                    outcome(MessageOutcome::Success, TransactionOutcome::Success, false),
                    role,
                )
                .unwrap();
                assert!(
                    !actions.iter().any(|a| matches!(a, HarvestAction::Recover(_))),
                    "unexpected recovery for {} as {:?}: {:?}",
                    receipt.kind(),
                    role,
                    actions
                );
            }
        }
    }

    #[test]
    fn transfer_opening_is_consumed_once_the_notary_saw_it() {
        let receipt = Receipt::new(Kind::Transfer, 5.into(), 0.into(), -500, 0);
        let actions = harvest_numbers(
            &receipt,
            outcome(MessageOutcome::Success, TransactionOutcome::Failure, false),
            HarvestRole::Payer,
        )
        .unwrap();
        assert_eq!(actions, vec![HarvestAction::Burn(5.into())]);
    }

    #[test]
    fn market_offer_closers_follow_the_closer_rule() {
        let receipt = market_offer_receipt();
        // Message failure: everything comes back.
        let actions = harvest_numbers(
            &receipt,
            outcome(MessageOutcome::Failure, TransactionOutcome::Unknown, false),
            HarvestRole::Payer,
        )
        .unwrap();
        assert!(actions.contains(&HarvestAction::Recover(50.into())));
        assert!(actions.contains(&HarvestAction::Recover(51.into())));
        assert!(actions.contains(&HarvestAction::Recover(52.into())));

        // Transaction failure: opening burned, closers recovered.
        let actions = harvest_numbers(
            &receipt,
            outcome(MessageOutcome::Success, TransactionOutcome::Failure, false),
            HarvestRole::Payer,
        )
        .unwrap();
        assert!(actions.contains(&HarvestAction::Burn(50.into())));
        assert!(actions.contains(&HarvestAction::Recover(51.into())));
        assert!(actions.contains(&HarvestAction::Recover(52.into())));

        // Retrying: closers stay put.
        let actions = harvest_numbers(
            &receipt,
            outcome(MessageOutcome::Success, TransactionOutcome::Failure, true),
            HarvestRole::Payer,
        )
        .unwrap();
        assert!(!actions.contains(&HarvestAction::Recover(51.into())));
        assert!(!actions.contains(&HarvestAction::Recover(52.into())));
    }

    #[test]
    fn payment_plan_partial_failure_splits_by_role() {
        // Scenario: payer opening 100, payer closing 101, payee opening 200,
        // payee closing 201; reply success, transaction failure.
        let receipt = payment_plan_receipt();
        let partial = outcome(MessageOutcome::Success, TransactionOutcome::Failure, false);

        let payer = harvest_numbers(&receipt, partial, HarvestRole::Payer).unwrap();
        assert_eq!(payer, vec![
            HarvestAction::Burn(100.into()),
            HarvestAction::Recover(101.into()),
        ]);

        let payee = harvest_numbers(&receipt, partial, HarvestRole::Payee).unwrap();
        assert_eq!(payee, vec![
            HarvestAction::Recover(200.into()),
            HarvestAction::Recover(201.into()),
        ]);
    }

    #[test]
    fn payment_plan_recipient_is_left_alone_during_a_retry() {
        let receipt = payment_plan_receipt();
        let actions = harvest_numbers(
            &receipt,
            outcome(MessageOutcome::Success, TransactionOutcome::Failure, true),
            HarvestRole::Payee,
        )
        .unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn unknown_outcome_harvests_nothing_for_the_opening() {
        let receipt = withdrawal_receipt(11);
        let actions = harvest_numbers(
            &receipt,
            outcome(MessageOutcome::Success, TransactionOutcome::Unknown, false),
            HarvestRole::Payer,
        )
        .unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn applying_a_harvest_twice_is_idempotent() {
        let context = Context::new_server(
            "nym-alice".into(),
            "nym-server".into(),
            "notary-1".into(),
            Arc::new(NullConnection),
        );
        for n in [11u64, 12] {
            context.issue_number(n.into()).unwrap();
        }
        context.consume_available(11.into()).unwrap();

        let actions = vec![HarvestAction::Recover(TransactionNumber::from(11))];
        context.apply_harvest(&actions);
        let after_first = context.serialize();
        context.apply_harvest(&actions);
        assert_eq!(context.serialize(), after_first);
        assert!(context.verify_available_number(11.into()));
    }

    #[test]
    fn burn_and_mark_used_are_idempotent_too() {
        let context = Context::new_server(
            "nym-alice".into(),
            "nym-server".into(),
            "notary-1".into(),
            Arc::new(NullConnection),
        );
        for n in [20u64, 21, 22] {
            context.issue_number(n.into()).unwrap();
        }
        let actions = vec![
            HarvestAction::Burn(TransactionNumber::from(20)),
            HarvestAction::MarkUsed(TransactionNumber::from(21)),
        ];
        context.apply_harvest(&actions);
        let after_first = context.serialize();
        context.apply_harvest(&actions);
        assert_eq!(context.serialize(), after_first);
        assert!(!context.verify_issued_number(20.into()));
        assert!(context.verify_issued_number(21.into()));
        assert!(!context.verify_available_number(21.into()));
    }
}
