// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use std::sync::atomic::{AtomicBool, Ordering};

use tari_notary_types::TransactionNumber;

use crate::{
    consensus::{context::Context, error::ConsensusError},
    ledger::kind::Kind,
};

/// Scoped reservation of one transaction number from a server context.
///
/// On every scope exit (early return, `?`, panic unwind) the number goes
/// back to the available pool unless [`set_success`] was called with `true`
/// first. A handle carrying number zero is the "pool empty" sentinel and does
/// nothing on drop.
///
/// [`set_success`]: ManagedNumber::set_success
#[derive(Debug)]
pub struct ManagedNumber<'a> {
    context: &'a Context,
    number: TransactionNumber,
    success: AtomicBool,
    managed: bool,
}

impl<'a> ManagedNumber<'a> {
    pub(crate) fn new(context: &'a Context, number: TransactionNumber) -> Self {
        Self {
            context,
            number,
            success: AtomicBool::new(false),
            managed: !number.is_zero(),
        }
    }

    pub fn number(&self) -> TransactionNumber {
        self.number
    }

    /// False for the sentinel handle returned when the pool was empty.
    pub fn is_valid(&self) -> bool {
        self.managed
    }

    /// Marks the reservation as spent for good. Call this once the notary has
    /// accepted the transaction; the reply handling owns the number's state
    /// from then on.
    pub fn set_success(&self, success: bool) {
        self.success.store(success, Ordering::SeqCst);
    }
}

impl Drop for ManagedNumber<'_> {
    fn drop(&mut self) {
        if !self.managed {
            return;
        }
        // The flag is re-read under the context lock.
        self.context.release_managed_number(self.number, &self.success);
    }
}

impl Context {
    /// Server variant: reserves the smallest available number for a request.
    /// Every purpose except `processInbox` keeps one number back, so the
    /// inbox can still be processed when the pool runs low. An empty pool
    /// yields the invalid sentinel handle, not an error.
    pub fn next_transaction_number(&self, purpose: Kind) -> Result<ManagedNumber<'_>, ConsensusError> {
        let number = self.reserve_transaction_number(purpose)?;
        Ok(ManagedNumber::new(self, number))
    }
}

#[cfg(test)]
mod test {
    use std::{collections::BTreeSet, panic, sync::Arc};

    use tari_notary_types::TransactionNumber;

    use crate::{consensus::context::Context, ledger::kind::Kind, test_utils::NullConnection};

    fn server_with_numbers(numbers: &[u64]) -> Context {
        let context = Context::new_server(
            "nym-alice".into(),
            "nym-server".into(),
            "notary-1".into(),
            Arc::new(NullConnection),
        );
        for &n in numbers {
            context.issue_number(n.into()).unwrap();
        }
        context
    }

    fn available(context: &Context) -> BTreeSet<TransactionNumber> {
        context.available_snapshot()
    }

    #[test]
    fn abandoned_number_returns_to_the_pool() {
        let context = server_with_numbers(&[5, 6]);
        let before = available(&context);
        {
            let managed = context.next_transaction_number(Kind::Transfer).unwrap();
            assert!(managed.is_valid());
            assert_eq!(managed.number(), 5u64);
            assert!(!context.verify_available_number(5.into()));
        }
        assert_eq!(available(&context), before);
    }

    #[test]
    fn successful_number_stays_consumed() {
        let context = server_with_numbers(&[5, 6]);
        {
            let managed = context.next_transaction_number(Kind::Withdrawal).unwrap();
            managed.set_success(true);
        }
        assert!(!context.verify_available_number(5.into()));
        assert!(context.verify_issued_number(5.into()));
    }

    #[test]
    fn success_can_be_revoked_before_scope_exit() {
        let context = server_with_numbers(&[5, 6]);
        {
            let managed = context.next_transaction_number(Kind::Withdrawal).unwrap();
            managed.set_success(true);
            managed.set_success(false);
        }
        assert!(context.verify_available_number(5.into()));
    }

    #[test]
    fn empty_pool_yields_the_invalid_sentinel() {
        let context = server_with_numbers(&[]);
        let managed = context.next_transaction_number(Kind::Deposit).unwrap();
        assert!(!managed.is_valid());
        assert_eq!(managed.number(), TransactionNumber::ZERO);
    }

    #[test]
    fn the_last_number_is_reserved_for_process_inbox() {
        let context = server_with_numbers(&[5]);
        // A normal transaction must leave one number behind.
        let managed = context.next_transaction_number(Kind::Transfer).unwrap();
        assert!(!managed.is_valid());
        drop(managed);
        // Processing the inbox may take it.
        let managed = context.next_transaction_number(Kind::ProcessInbox).unwrap();
        assert!(managed.is_valid());
        assert_eq!(managed.number(), 5u64);
    }

    #[test]
    fn panic_unwinding_recovers_the_number() {
        let context = server_with_numbers(&[5, 6]);
        let before = available(&context);
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| {
            let managed = context.next_transaction_number(Kind::Transfer).unwrap();
            assert!(managed.is_valid());
            panic!("request assembly failed");
        }));
        assert!(result.is_err());
        assert_eq!(available(&context), before);
    }

    #[test]
    fn client_contexts_cannot_reserve_numbers() {
        let context = Context::new_client("nym-server".into(), "nym-alice".into(), "notary-1".into());
        assert!(context.next_transaction_number(Kind::Transfer).is_err());
    }
}
