// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use std::collections::BTreeSet;

use log::*;
use serde::{Deserialize, Serialize};
use tari_notary_types::{RequestNumber, TransactionNumber};

use crate::consensus::error::RegistryError;

const LOG_TARGET: &str = "notary::consensus::registry";

/// The four number sets and the highest-number watermark for one consensus
/// relationship.
///
/// Invariants, checked by [`audit`]:
/// - `available ⊆ issued`
/// - `tentative ∩ issued = ∅`
/// - `highest ≥ max(issued)` whenever `issued` is non-empty
///
/// The watermark rises whenever a number is issued, so a registry restored
/// from a client-variant context (which persists no watermark) re-derives a
/// consistent one from its issued set.
///
/// [`audit`]: NumberRegistry::audit
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberRegistry {
    issued: BTreeSet<TransactionNumber>,
    available: BTreeSet<TransactionNumber>,
    tentative: BTreeSet<TransactionNumber>,
    acknowledged: BTreeSet<RequestNumber>,
    highest: TransactionNumber,
}

/// Result of a watermark update: the offered numbers split into fresh and
/// replayed, plus the smallest replayed number (zero when all were fresh).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HighestUpdate {
    pub first_invalid: TransactionNumber,
    pub good: BTreeSet<TransactionNumber>,
    pub bad: BTreeSet<TransactionNumber>,
}

impl NumberRegistry {
    pub fn new() -> Self {
        Default::default()
    }

    pub(crate) fn restore(
        issued: BTreeSet<TransactionNumber>,
        available: BTreeSet<TransactionNumber>,
        tentative: BTreeSet<TransactionNumber>,
        acknowledged: BTreeSet<RequestNumber>,
        highest: TransactionNumber,
    ) -> Self {
        let derived = issued.iter().next_back().copied().unwrap_or(TransactionNumber::ZERO);
        let highest = highest.max(derived);
        Self {
            issued,
            available,
            tentative,
            acknowledged,
            highest,
        }
    }

    /// Adds `number` to both the issued and available sets.
    pub fn issue(&mut self, number: TransactionNumber) -> Result<(), RegistryError> {
        if number.is_zero() {
            return Err(RegistryError::StaleNumber(number));
        }
        if self.issued.contains(&number) {
            return Err(RegistryError::AlreadyIssued(number));
        }
        self.issued.insert(number);
        self.available.insert(number);
        self.highest = self.highest.max(number);
        Ok(())
    }

    /// Adds every fresh number in `numbers` to both sets; numbers already
    /// issued are skipped, not an error. Returns the count actually added.
    pub fn accept_issued(&mut self, numbers: &BTreeSet<TransactionNumber>) -> usize {
        let mut added = 0;
        for &number in numbers {
            if number.is_zero() || self.issued.contains(&number) {
                continue;
            }
            self.issued.insert(number);
            self.available.insert(number);
            self.highest = self.highest.max(number);
            added += 1;
        }
        added
    }

    /// Removes `number` from the available set, leaving it issued. This is
    /// the moment a number is spent on a transaction.
    pub fn consume(&mut self, number: TransactionNumber) -> Result<(), RegistryError> {
        if !self.available.remove(&number) {
            return Err(RegistryError::NotAvailable(number));
        }
        Ok(())
    }

    /// Removes `number` from both sets: the obligation is closed.
    pub fn close(&mut self, number: TransactionNumber) -> Result<(), RegistryError> {
        if !self.issued.remove(&number) {
            return Err(RegistryError::NotIssued(number));
        }
        self.available.remove(&number);
        Ok(())
    }

    /// Restores `number` to the available set after a failed optimistic
    /// consumption. Idempotent: recovering an already-available number is a
    /// no-op. The number must still be issued.
    pub fn recover(&mut self, number: TransactionNumber) -> Result<(), RegistryError> {
        if !self.issued.contains(&number) {
            return Err(RegistryError::NotIssued(number));
        }
        self.available.insert(number);
        Ok(())
    }

    /// Records a notary-offered number awaiting acknowledgment. Numbers at or
    /// below the watermark are silently refused: a second delivery of the
    /// same reply must not re-open them.
    pub fn add_tentative(&mut self, number: TransactionNumber) -> bool {
        if number <= self.highest {
            debug!(
                target: LOG_TARGET,
                "Refusing tentative number {} at or below highest {}", number, self.highest
            );
            return false;
        }
        self.tentative.insert(number)
    }

    pub fn remove_tentative(&mut self, number: TransactionNumber) -> bool {
        self.tentative.remove(&number)
    }

    /// Splits `numbers` into fresh and replayed against the watermark and
    /// raises the watermark to the largest fresh number, if any.
    pub fn update_highest(&mut self, numbers: &BTreeSet<TransactionNumber>) -> HighestUpdate {
        let old = self.highest;
        let mut update = HighestUpdate::default();
        for &number in numbers {
            if number <= old {
                warn!(
                    target: LOG_TARGET,
                    "Transaction number {} is at or below the last known highest {}. Must be seeing the same \
                     notary reply a second time. Skipping.",
                    number,
                    old
                );
                update.bad.insert(number);
            } else {
                update.good.insert(number);
            }
        }
        if let Some(&first_invalid) = update.bad.iter().next() {
            update.first_invalid = first_invalid;
        }
        if let Some(&new_highest) = update.good.iter().next_back() {
            if old.is_zero() {
                info!(
                    target: LOG_TARGET,
                    "Creating highest transaction number entry as {}", new_highest
                );
            } else {
                info!(
                    target: LOG_TARGET,
                    "Raising highest transaction number from {} to {}", old, new_highest
                );
            }
            self.highest = new_highest;
        }
        update
    }

    pub fn highest(&self) -> TransactionNumber {
        self.highest
    }

    pub fn issued(&self) -> &BTreeSet<TransactionNumber> {
        &self.issued
    }

    pub fn available(&self) -> &BTreeSet<TransactionNumber> {
        &self.available
    }

    pub fn tentative(&self) -> &BTreeSet<TransactionNumber> {
        &self.tentative
    }

    pub fn is_issued(&self, number: TransactionNumber) -> bool {
        self.issued.contains(&number)
    }

    pub fn is_available(&self, number: TransactionNumber) -> bool {
        self.available.contains(&number)
    }

    pub fn is_tentative(&self, number: TransactionNumber) -> bool {
        self.tentative.contains(&number)
    }

    /// True while any issued number has been spent but not yet closed.
    pub fn has_open_transactions(&self) -> bool {
        self.issued.len() != self.available.len()
    }

    pub fn issued_count_excluding(&self, exclude: &BTreeSet<TransactionNumber>) -> usize {
        self.issued.iter().filter(|n| !exclude.contains(n)).count()
    }

    pub fn acknowledged(&self) -> &BTreeSet<RequestNumber> {
        &self.acknowledged
    }

    pub fn add_acknowledged(&mut self, number: RequestNumber) -> bool {
        self.acknowledged.insert(number)
    }

    pub fn remove_acknowledged(&mut self, numbers: &BTreeSet<RequestNumber>) {
        for number in numbers {
            self.acknowledged.remove(number);
        }
    }

    /// Keeps only the acknowledged request numbers the remote still lists as
    /// outstanding; everything else has been confirmed seen and can go.
    pub fn finish_acknowledgements(&mut self, still_pending: &BTreeSet<RequestNumber>) {
        self.acknowledged.retain(|number| still_pending.contains(number));
    }

    /// Checks the registry invariants. A failure here means the registry has
    /// been corrupted; the owning context must be destroyed and reloaded from
    /// the last signed receipt.
    pub fn audit(&self) -> Result<(), RegistryError> {
        if !self.available.is_subset(&self.issued) {
            return Err(RegistryError::InvariantViolated("available is not a subset of issued"));
        }
        if !self.tentative.is_disjoint(&self.issued) {
            return Err(RegistryError::InvariantViolated("tentative intersects issued"));
        }
        if let Some(&max_issued) = self.issued.iter().next_back() {
            if self.highest < max_issued {
                return Err(RegistryError::InvariantViolated("highest is below max(issued)"));
            }
        }
        Ok(())
    }
}
