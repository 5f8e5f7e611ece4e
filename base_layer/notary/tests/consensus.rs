// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

//! Cross-component scenarios: both sides of a relationship driven through a
//! transaction, failure recovery, and restart persistence.

use std::{collections::BTreeSet, sync::Arc};

use tari_notary::{
    consensus::{
        harvest_numbers,
        verifier,
        Context,
        HarvestRole,
        MessageOutcome,
        Outcome,
        TransactionOutcome,
        TransactionStatement,
    },
    ledger::kind::Kind,
    storage::{NotaryDatabase, NotaryMemoryDb},
    test_utils::{numbers, NullConnection},
};
use tari_notary_types::TransactionNumber;

/// Both sides of one relationship, seeded with the same issued numbers.
fn relationship(issued: &[u64]) -> (Context, Context) {
    let client_view = Context::new_server(
        "nym-alice".into(),
        "nym-server".into(),
        "notary-1".into(),
        Arc::new(NullConnection),
    );
    let server_view = Context::new_client("nym-server".into(), "nym-alice".into(), "notary-1".into());
    for &n in issued {
        client_view.issue_number(n.into()).unwrap();
        server_view.issue_number(n.into()).unwrap();
    }
    (client_view, server_view)
}

#[test]
fn happy_transfer_keeps_both_sides_agreed() {
    // Client and server both start with {5, 6, 7} issued and available.
    let (client, server) = relationship(&[5, 6, 7]);

    // The client reserves number 5 for a transfer and signs a statement
    // reflecting the state after success.
    let managed = client.next_transaction_number(Kind::Transfer).unwrap();
    assert_eq!(managed.number(), 5u64);
    let statement = client.statement(&BTreeSet::new(), &BTreeSet::new()).unwrap();
    assert_eq!(statement.issued(), &numbers(&[5, 6, 7]));

    // Server side: the statement's issued list matches its view exactly.
    verifier::verify_transaction_statement(&server, &statement, &BTreeSet::new(), &BTreeSet::new()).unwrap();
    // The transfer succeeds; the server records 5 as spent but outstanding.
    server.consume_available(5.into()).unwrap();

    // Reply success, transaction success: the client keeps 5 consumed.
    managed.set_success(true);
    drop(managed);

    assert_eq!(client.issued_snapshot(), numbers(&[5, 6, 7]));
    assert_eq!(client.available_snapshot(), numbers(&[6, 7]));
    assert_eq!(server.issued_snapshot(), client.issued_snapshot());
    assert_eq!(server.available_snapshot(), client.available_snapshot());
    assert!(client.has_open_transactions());
}

#[test]
fn failed_withdrawal_restores_the_pool() {
    // Issued {11, 12}; number 11 goes out on a withdrawal that the notary
    // unambiguously rejects at the message level.
    let (client, _server) = relationship(&[11, 12]);
    let before = client.available_snapshot();

    let managed = client.next_transaction_number(Kind::Withdrawal).unwrap();
    assert_eq!(managed.number(), 11u64);
    let request = tari_notary::ledger::receipt::Receipt::new(Kind::Withdrawal, 11.into(), 0.into(), -100, 0);
    managed.set_success(true);
    drop(managed);
    assert!(!client.verify_available_number(11.into()));

    let actions = harvest_numbers(
        &request,
        Outcome {
            reply: MessageOutcome::Failure,
            transaction: TransactionOutcome::Unknown,
            retrying: false,
        },
        HarvestRole::Payer,
    )
    .unwrap();
    client.apply_harvest(&actions);

    assert_eq!(client.available_snapshot(), before);
    assert_eq!(client.issued_snapshot(), numbers(&[11, 12]));
}

#[test]
fn number_provision_runs_tentative_then_statement() {
    // The notary mints {101, 102, 103}; the client holds them tentatively
    // until the signed statement confirms them.
    let (client, server) = relationship(&[]);
    let minted = [101u64, 102, 103];
    for &n in &minted {
        assert!(client.add_tentative_number(n.into()).unwrap());
        server.issue_number(n.into()).unwrap();
    }
    assert!(client.issued_snapshot().is_empty());

    let statement = TransactionStatement::new(
        "notary-1".into(),
        "nym-alice".into(),
        numbers(&minted),
        numbers(&minted),
    );
    assert!(client.accept_issued_statement(&statement).unwrap());
    assert_eq!(client.issued_snapshot(), server.issued_snapshot());
    assert_eq!(client.highest(), 103u64);

    // Replayed delivery of the same statement cannot double-issue.
    for &n in &minted {
        assert!(!client.add_tentative_number(n.into()).unwrap());
    }
    assert!(!client.accept_issued_statement(&statement).unwrap());
    assert_eq!(client.issued_snapshot(), numbers(&minted));
    client.audit().unwrap();
}

#[test]
fn contexts_survive_a_restart() {
    let (client, server) = relationship(&[5, 6]);
    client.consume_available(5.into()).unwrap();
    client.set_request_number(9.into());
    client.add_acknowledged_number(4.into());
    client.set_admin_password("hunter2").unwrap();
    server.consume_available(5.into()).unwrap();
    server.open_cron_item(6.into()).unwrap();

    let db = NotaryDatabase::new(NotaryMemoryDb::new());
    db.save_context(&client.serialize()).unwrap();
    db.save_context(&server.serialize()).unwrap();

    let restored_client = Context::from_serialized(
        db.fetch_context(client.local_id(), client.remote_id()).unwrap(),
        Some(Arc::new(NullConnection)),
    )
    .unwrap();
    let restored_server =
        Context::from_serialized(db.fetch_context(server.local_id(), server.remote_id()).unwrap(), None).unwrap();

    assert_eq!(restored_client, client);
    assert_eq!(restored_server, server);
    assert!(!restored_client.verify_available_number(5.into()));
    assert_eq!(restored_client.request_number(), 9u64);
    assert!(restored_server.verify_cron_item(6.into()));
    restored_client.audit().unwrap();
    restored_server.audit().unwrap();
}

#[test]
fn a_divergent_statement_is_caught_before_signing() {
    // The client tries to shed number 6 without the server having closed it.
    let (client, server) = relationship(&[5, 6]);
    let dishonest = TransactionStatement::new(
        "notary-1".into(),
        "nym-alice".into(),
        numbers(&[5]),
        numbers(&[5]),
    );
    assert!(
        verifier::verify_transaction_statement(&server, &dishonest, &BTreeSet::new(), &BTreeSet::new()).is_err()
    );

    // And the honest statement still passes.
    let honest = client.statement(&BTreeSet::new(), &BTreeSet::new()).unwrap();
    verifier::verify_transaction_statement(&server, &honest, &BTreeSet::new(), &BTreeSet::new()).unwrap();
}

#[test]
fn the_watermark_defends_across_restarts() {
    let (client, _server) = relationship(&[]);
    client.update_highest(&numbers(&[10, 20, 30])).unwrap();

    let db = NotaryDatabase::new(NotaryMemoryDb::new());
    db.save_context(&client.serialize()).unwrap();
    let restored = Context::from_serialized(
        db.fetch_context(client.local_id(), client.remote_id()).unwrap(),
        Some(Arc::new(NullConnection)),
    )
    .unwrap();

    assert_eq!(restored.highest(), TransactionNumber::from(30));
    assert!(!restored.add_tentative_number(25.into()).unwrap());
    assert!(restored.add_tentative_number(31.into()).unwrap());
}
