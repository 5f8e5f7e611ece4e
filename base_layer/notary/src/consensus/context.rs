// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use std::{
    collections::BTreeSet,
    fmt,
    fmt::{Display, Formatter},
    sync::{Arc, Mutex, MutexGuard},
};

use log::*;
use serde::{Deserialize, Serialize};
use tari_notary_types::{
    FixedHash,
    NotaryId,
    NymId,
    RequestNumber,
    TransactionNumber,
    FIRST_REQUEST_NUMBER,
};
use zeroize::Zeroizing;

use crate::{
    consensus::{
        error::{ConsensusError, MismatchSide},
        registry::{HighestUpdate, NumberRegistry},
        statement::TransactionStatement,
    },
    interface::{MessageKind, NetworkReply, NotaryConnection, RequestMessage, SendResult, Signer},
    ledger::kind::Kind,
};

const LOG_TARGET: &str = "notary::consensus::context";

pub const CONTEXT_VERSION_CLIENT: u32 = 1;
pub const CONTEXT_VERSION_SERVER: u32 = 2;

/// Which end of the relationship this context represents.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConsensusType {
    /// A notary's view of one of its clients.
    Client,
    /// A client's view of one of its notaries.
    Server,
}

impl Display for ConsensusType {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ConsensusType::Client => f.write_str("client"),
            ConsensusType::Server => f.write_str("server"),
        }
    }
}

/// State carried only by the notary's view of a client.
#[derive(Clone, Debug, Default)]
pub struct ClientState {
    open_cron_items: BTreeSet<TransactionNumber>,
}

/// State carried only by a client's view of a notary.
#[derive(Clone, Default)]
pub struct ServerState {
    admin_password: Zeroizing<String>,
    admin_attempted: bool,
    admin_success: bool,
    revision: u64,
}

impl fmt::Debug for ServerState {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerState")
            .field("admin_password", &"<redacted>")
            .field("admin_attempted", &self.admin_attempted)
            .field("admin_success", &self.admin_success)
            .field("revision", &self.revision)
            .finish()
    }
}

#[derive(Clone, Debug)]
pub enum ContextVariant {
    Client(ClientState),
    Server(ServerState),
}

#[derive(Debug)]
struct ContextState {
    numbers: NumberRegistry,
    request_number: RequestNumber,
    local_nymbox_hash: FixedHash,
    remote_nymbox_hash: FixedHash,
    variant: ContextVariant,
}

impl ContextState {
    fn server(&self) -> Result<&ServerState, ConsensusError> {
        match &self.variant {
            ContextVariant::Server(state) => Ok(state),
            ContextVariant::Client(_) => Err(ConsensusError::WrongContext),
        }
    }

    fn server_mut(&mut self) -> Result<&mut ServerState, ConsensusError> {
        match &mut self.variant {
            ContextVariant::Server(state) => Ok(state),
            ContextVariant::Client(_) => Err(ConsensusError::WrongContext),
        }
    }

    fn client(&self) -> Result<&ClientState, ConsensusError> {
        match &self.variant {
            ContextVariant::Client(state) => Ok(state),
            ContextVariant::Server(_) => Err(ConsensusError::WrongContext),
        }
    }

    fn client_mut(&mut self) -> Result<&mut ClientState, ConsensusError> {
        match &mut self.variant {
            ContextVariant::Client(state) => Ok(state),
            ContextVariant::Server(_) => Err(ConsensusError::WrongContext),
        }
    }
}

/// The per-counterparty consensus object: the single owner and the single
/// mutator of a [`NumberRegistry`].
///
/// A context is shared between threads; every entry point takes `&self` and
/// serializes on the internal state lock. The server variant additionally
/// holds a message lock spanning one request/reply exchange; the state lock
/// is never held across I/O, and the message lock is always acquired first.
pub struct Context {
    local_id: NymId,
    remote_id: NymId,
    notary_id: NotaryId,
    connection: Option<Arc<dyn NotaryConnection>>,
    message_lock: Mutex<()>,
    state: Mutex<ContextState>,
}

impl Context {
    /// A notary's view of the client `remote`.
    pub fn new_client(local: NymId, remote: NymId, notary: NotaryId) -> Self {
        Self::with_variant(local, remote, notary, None, ContextVariant::Client(ClientState::default()))
    }

    /// A client's view of the notary `remote`, reachable over `connection`.
    pub fn new_server(local: NymId, remote: NymId, notary: NotaryId, connection: Arc<dyn NotaryConnection>) -> Self {
        Self::with_variant(
            local,
            remote,
            notary,
            Some(connection),
            ContextVariant::Server(ServerState::default()),
        )
    }

    fn with_variant(
        local_id: NymId,
        remote_id: NymId,
        notary_id: NotaryId,
        connection: Option<Arc<dyn NotaryConnection>>,
        variant: ContextVariant,
    ) -> Self {
        Self {
            local_id,
            remote_id,
            notary_id,
            connection,
            message_lock: Mutex::new(()),
            state: Mutex::new(ContextState {
                numbers: NumberRegistry::new(),
                request_number: RequestNumber::default(),
                local_nymbox_hash: FixedHash::zero(),
                remote_nymbox_hash: FixedHash::zero(),
                variant,
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().expect("context state lock poisoned")
    }

    // ---------------------------------------------------------------------
    // Identity
    // ---------------------------------------------------------------------

    pub fn local_id(&self) -> &NymId {
        &self.local_id
    }

    pub fn remote_id(&self) -> &NymId {
        &self.remote_id
    }

    pub fn notary_id(&self) -> &NotaryId {
        &self.notary_id
    }

    pub fn context_type(&self) -> ConsensusType {
        match self.lock_state().variant {
            ContextVariant::Client(_) => ConsensusType::Client,
            ContextVariant::Server(_) => ConsensusType::Server,
        }
    }

    /// The nym holding the client role in this relationship.
    pub fn client_nym_id(&self) -> NymId {
        match self.context_type() {
            ConsensusType::Client => self.remote_id.clone(),
            ConsensusType::Server => self.local_id.clone(),
        }
    }

    /// The nym holding the notary role in this relationship.
    pub fn server_nym_id(&self) -> NymId {
        match self.context_type() {
            ConsensusType::Client => self.local_id.clone(),
            ConsensusType::Server => self.remote_id.clone(),
        }
    }

    // ---------------------------------------------------------------------
    // Number lifecycle
    // ---------------------------------------------------------------------

    pub fn issue_number(&self, number: TransactionNumber) -> Result<(), ConsensusError> {
        Ok(self.lock_state().numbers.issue(number)?)
    }

    /// Client variant: adds every fresh number the counterparty signed over.
    /// Returns whether all offered numbers landed.
    pub fn accept_issued_numbers(&self, new_numbers: &BTreeSet<TransactionNumber>) -> Result<bool, ConsensusError> {
        let mut state = self.lock_state();
        state.client()?;
        if new_numbers.is_empty() {
            return Ok(false);
        }
        let added = state.numbers.accept_issued(new_numbers);
        Ok(added == new_numbers.len())
    }

    /// Server variant: accepts the numbers in a signed statement that were
    /// pending as tentative, gated through the replay watermark. Returns
    /// whether every offered number landed.
    pub fn accept_issued_statement(&self, statement: &TransactionStatement) -> Result<bool, ConsensusError> {
        let mut state = self.lock_state();
        state.server()?;
        let offered = statement.issued().len();
        if offered == 0 {
            return Ok(false);
        }
        let adding: BTreeSet<TransactionNumber> = statement
            .issued()
            .iter()
            .filter(|n| state.numbers.is_tentative(**n) && !state.numbers.is_issued(**n))
            .copied()
            .collect();
        let mut added = 0;
        if !adding.is_empty() {
            let update = state.numbers.update_highest(&adding);
            for &number in &update.good {
                state.numbers.remove_tentative(number);
                match state.numbers.issue(number) {
                    Ok(()) => added += 1,
                    Err(e) => warn!(target: LOG_TARGET, "Failed to issue accepted number {}: {}", number, e),
                }
            }
        }
        Ok(added == offered)
    }

    /// Server variant: promotes a single tentative number to issued.
    pub fn accept_issued_number(&self, number: TransactionNumber) -> Result<bool, ConsensusError> {
        let mut state = self.lock_state();
        state.server()?;
        if !state.numbers.remove_tentative(number) {
            return Ok(false);
        }
        match state.numbers.issue(number) {
            Ok(()) => Ok(true),
            Err(e) => {
                warn!(target: LOG_TARGET, "Failed to issue tentative number {}: {}", number, e);
                Ok(false)
            },
        }
    }

    pub fn consume_available(&self, number: TransactionNumber) -> Result<(), ConsensusError> {
        Ok(self.lock_state().numbers.consume(number)?)
    }

    pub fn consume_issued(&self, number: TransactionNumber) -> Result<(), ConsensusError> {
        Ok(self.lock_state().numbers.close(number)?)
    }

    pub fn recover_available_number(&self, number: TransactionNumber) -> Result<(), ConsensusError> {
        Ok(self.lock_state().numbers.recover(number)?)
    }

    pub fn verify_issued_number(&self, number: TransactionNumber) -> bool {
        self.lock_state().numbers.is_issued(number)
    }

    pub fn verify_issued_number_excluding(
        &self,
        number: TransactionNumber,
        exclude: &BTreeSet<TransactionNumber>,
    ) -> bool {
        if exclude.contains(&number) {
            return false;
        }
        self.verify_issued_number(number)
    }

    pub fn verify_available_number(&self, number: TransactionNumber) -> bool {
        self.lock_state().numbers.is_available(number)
    }

    pub fn has_open_transactions(&self) -> bool {
        self.lock_state().numbers.has_open_transactions()
    }

    pub fn issued_numbers(&self, exclude: &BTreeSet<TransactionNumber>) -> usize {
        self.lock_state().numbers.issued_count_excluding(exclude)
    }

    pub fn issued_snapshot(&self) -> BTreeSet<TransactionNumber> {
        self.lock_state().numbers.issued().clone()
    }

    pub fn available_snapshot(&self) -> BTreeSet<TransactionNumber> {
        self.lock_state().numbers.available().clone()
    }

    pub fn audit(&self) -> Result<(), ConsensusError> {
        Ok(self.lock_state().numbers.audit()?)
    }

    // ---------------------------------------------------------------------
    // Tentative numbers and the replay watermark (server variant)
    // ---------------------------------------------------------------------

    pub fn add_tentative_number(&self, number: TransactionNumber) -> Result<bool, ConsensusError> {
        let mut state = self.lock_state();
        state.server()?;
        Ok(state.numbers.add_tentative(number))
    }

    pub fn remove_tentative_number(&self, number: TransactionNumber) -> Result<bool, ConsensusError> {
        let mut state = self.lock_state();
        state.server()?;
        Ok(state.numbers.remove_tentative(number))
    }

    pub fn verify_tentative_number(&self, number: TransactionNumber) -> bool {
        self.lock_state().numbers.is_tentative(number)
    }

    pub fn update_highest(&self, numbers: &BTreeSet<TransactionNumber>) -> Result<HighestUpdate, ConsensusError> {
        let mut state = self.lock_state();
        state.server()?;
        Ok(state.numbers.update_highest(numbers))
    }

    pub fn highest(&self) -> TransactionNumber {
        self.lock_state().numbers.highest()
    }

    /// Server variant: force local state to agree with the notary's issued
    /// list. A manual recovery path; every divergence is logged.
    pub fn resync(&self, server_issued: &BTreeSet<TransactionNumber>) -> Result<(), ConsensusError> {
        let mut state = self.lock_state();
        state.server()?;
        let missing: BTreeSet<TransactionNumber> = server_issued
            .iter()
            .filter(|n| !state.numbers.is_issued(**n))
            .copied()
            .collect();
        for number in &missing {
            warn!(
                target: LOG_TARGET,
                "Notary believes number {} is still issued. Restoring.", number
            );
        }
        state.numbers.accept_issued(&missing);
        let stale: Vec<TransactionNumber> = state
            .numbers
            .issued()
            .iter()
            .filter(|n| !server_issued.contains(n))
            .copied()
            .collect();
        for number in stale {
            warn!(
                target: LOG_TARGET,
                "Notary believes number {} is no longer issued. Removing.", number
            );
            if let Err(e) = state.numbers.close(number) {
                warn!(target: LOG_TARGET, "Failed to remove number {}: {}", number, e);
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Cron items (client variant)
    // ---------------------------------------------------------------------

    pub fn open_cron_item(&self, number: TransactionNumber) -> Result<bool, ConsensusError> {
        let mut state = self.lock_state();
        Ok(state.client_mut()?.open_cron_items.insert(number))
    }

    pub fn close_cron_item(&self, number: TransactionNumber) -> Result<bool, ConsensusError> {
        let mut state = self.lock_state();
        Ok(state.client_mut()?.open_cron_items.remove(&number))
    }

    pub fn verify_cron_item(&self, number: TransactionNumber) -> bool {
        let state = self.lock_state();
        state
            .client()
            .map(|client| client.open_cron_items.contains(&number))
            .unwrap_or(false)
    }

    pub fn open_cron_items(&self) -> usize {
        let state = self.lock_state();
        state.client().map(|client| client.open_cron_items.len()).unwrap_or(0)
    }

    // ---------------------------------------------------------------------
    // Acknowledged request numbers
    // ---------------------------------------------------------------------

    pub fn acknowledged_numbers(&self) -> BTreeSet<RequestNumber> {
        self.lock_state().numbers.acknowledged().clone()
    }

    pub fn add_acknowledged_number(&self, number: RequestNumber) -> bool {
        self.lock_state().numbers.add_acknowledged(number)
    }

    pub fn remove_acknowledged_numbers(&self, numbers: &BTreeSet<RequestNumber>) {
        self.lock_state().numbers.remove_acknowledged(numbers)
    }

    pub fn finish_acknowledgements(&self, still_pending: &BTreeSet<RequestNumber>) {
        self.lock_state().numbers.finish_acknowledgements(still_pending)
    }

    // ---------------------------------------------------------------------
    // Request counter and nymbox hashes
    // ---------------------------------------------------------------------

    pub fn request_number(&self) -> RequestNumber {
        self.lock_state().request_number
    }

    pub fn set_request_number(&self, number: RequestNumber) {
        self.lock_state().request_number = number;
    }

    /// Returns the request number to stamp on the next message and advances
    /// the counter.
    pub fn increment_request_number(&self) -> RequestNumber {
        self.lock_state().request_number.post_increment()
    }

    pub fn local_nymbox_hash(&self) -> FixedHash {
        self.lock_state().local_nymbox_hash
    }

    pub fn remote_nymbox_hash(&self) -> FixedHash {
        self.lock_state().remote_nymbox_hash
    }

    pub fn set_local_nymbox_hash(&self, hash: FixedHash) {
        self.lock_state().local_nymbox_hash = hash;
    }

    pub fn set_remote_nymbox_hash(&self, hash: FixedHash) {
        self.lock_state().remote_nymbox_hash = hash;
    }

    // ---------------------------------------------------------------------
    // Admin and revision (server variant)
    // ---------------------------------------------------------------------

    pub fn admin_password(&self) -> String {
        let state = self.lock_state();
        state
            .server()
            .map(|server| server.admin_password.to_string())
            .unwrap_or_default()
    }

    pub fn set_admin_password(&self, password: &str) -> Result<(), ConsensusError> {
        let mut state = self.lock_state();
        state.server_mut()?.admin_password = Zeroizing::new(password.to_string());
        Ok(())
    }

    pub fn have_admin_password(&self) -> bool {
        let state = self.lock_state();
        state
            .server()
            .map(|server| !server.admin_password.is_empty())
            .unwrap_or(false)
    }

    pub fn admin_attempted(&self) -> bool {
        let state = self.lock_state();
        state.server().map(|server| server.admin_attempted).unwrap_or(false)
    }

    pub fn set_admin_attempted(&self) -> Result<(), ConsensusError> {
        let mut state = self.lock_state();
        state.server_mut()?.admin_attempted = true;
        Ok(())
    }

    pub fn is_admin(&self) -> bool {
        let state = self.lock_state();
        state.server().map(|server| server.admin_success).unwrap_or(false)
    }

    pub fn set_admin_success(&self) -> Result<(), ConsensusError> {
        let mut state = self.lock_state();
        let server = state.server_mut()?;
        server.admin_attempted = true;
        server.admin_success = true;
        Ok(())
    }

    pub fn revision(&self) -> u64 {
        let state = self.lock_state();
        state.server().map(|server| server.revision).unwrap_or(0)
    }

    pub fn set_revision(&self, revision: u64) -> Result<(), ConsensusError> {
        let mut state = self.lock_state();
        state.server_mut()?.revision = revision;
        Ok(())
    }

    /// True when the locally-cached credential revision is behind `current`.
    pub fn stale_nym(&self, current: u64) -> bool {
        self.revision() < current
    }

    // ---------------------------------------------------------------------
    // Statement production and verification
    // ---------------------------------------------------------------------

    /// Server variant: snapshot the issued set, minus `without`, plus
    /// `adding`, into a statement ready for signing.
    pub fn statement(
        &self,
        adding: &BTreeSet<TransactionNumber>,
        without: &BTreeSet<TransactionNumber>,
    ) -> Result<TransactionStatement, ConsensusError> {
        let state = self.lock_state();
        state.server()?;
        Ok(self.generate_statement(&state, adding, without))
    }

    /// Server variant: the statement accompanying `target_kind` transaction
    /// number `target_num`. A cancellation strips its own opening number,
    /// simulating the success it is asking the notary to sign off on; cron
    /// item openings stay in play until final closure.
    pub fn transaction_statement(
        &self,
        target_kind: Kind,
        target_num: TransactionNumber,
        adding: &BTreeSet<TransactionNumber>,
    ) -> Result<TransactionStatement, ConsensusError> {
        let state = self.lock_state();
        state.server()?;
        let mut statement = self.generate_statement(&state, adding, &BTreeSet::new());
        if target_kind == Kind::CancelCronItem && !target_num.is_zero() {
            statement.remove(target_num);
        }
        Ok(statement)
    }

    fn generate_statement(
        &self,
        state: &ContextState,
        adding: &BTreeSet<TransactionNumber>,
        without: &BTreeSet<TransactionNumber>,
    ) -> TransactionStatement {
        let mut issued: BTreeSet<TransactionNumber> = state
            .numbers
            .issued()
            .iter()
            .filter(|n| !without.contains(n))
            .copied()
            .collect();
        issued.extend(adding.iter().copied());
        let available = issued.clone();
        TransactionStatement::new(self.notary_id.clone(), self.local_id.clone(), issued, available)
    }

    /// Server variant check against a stored statement: numbers may have
    /// closed out since the statement was signed, but nothing may have
    /// appeared on the context unannounced.
    pub fn verify_statement_superset(&self, statement: &TransactionStatement) -> Result<(), ConsensusError> {
        let state = self.lock_state();
        for &number in state.numbers.issued() {
            if !statement.issued().contains(&number) {
                debug!(
                    target: LOG_TARGET,
                    "Issued transaction number {} on context not found on statement", number
                );
                return Err(ConsensusError::Mismatch {
                    number,
                    side: MismatchSide::Context,
                });
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Network operations (server variant)
    // ---------------------------------------------------------------------

    /// Sends a transport liveness probe, signed but outside the request
    /// number sequence.
    pub fn ping_notary(&self, signer: &dyn Signer) -> Result<NetworkReply, ConsensusError> {
        let connection = self.require_connection()?;
        let _exchange = self.message_lock.lock().expect("context message lock poisoned");
        let request = self.build_signed_request(MessageKind::PingNotary, signer)?;
        Ok(connection.send(&request))
    }

    /// Re-synchronizes the request counter with the notary. Holds the message
    /// lock across the exchange; takes the state lock only after I/O has
    /// finished.
    pub fn update_request_number(&self, signer: &dyn Signer) -> Result<RequestNumber, ConsensusError> {
        let connection = self.require_connection()?;
        let _exchange = self.message_lock.lock().expect("context message lock poisoned");
        let request = self.build_signed_request(MessageKind::GetRequestNumber, signer)?;
        let response = connection.send(&request);
        match response.result {
            SendResult::Timeout => {
                warn!(target: LOG_TARGET, "Reply timeout from notary {}", self.notary_id);
                Err(ConsensusError::NetworkTimeout)
            },
            SendResult::InvalidReply => {
                warn!(target: LOG_TARGET, "Invalid reply from notary {}", self.notary_id);
                Err(ConsensusError::InvalidReply)
            },
            SendResult::ValidReply => {
                let reply = response.reply.ok_or(ConsensusError::InvalidReply)?;
                let new_number = reply.new_request_number.ok_or(ConsensusError::InvalidReply)?;
                let mut state = self.lock_state();
                state.server()?;
                state.request_number = new_number;
                state.numbers.add_acknowledged(new_number);
                state.numbers.remove_acknowledged(&reply.acknowledged_replies);
                if let Some(hash) = reply.nymbox_hash {
                    state.remote_nymbox_hash = hash;
                }
                debug!(
                    target: LOG_TARGET,
                    "Request number synchronized with notary {} at {}", self.notary_id, new_number
                );
                Ok(new_number)
            },
        }
    }

    fn require_connection(&self) -> Result<Arc<dyn NotaryConnection>, ConsensusError> {
        self.connection.clone().ok_or(ConsensusError::WrongContext)
    }

    fn build_signed_request(&self, kind: MessageKind, signer: &dyn Signer) -> Result<RequestMessage, ConsensusError> {
        let mut request = RequestMessage::new(
            kind,
            self.local_id.clone(),
            self.notary_id.clone(),
            FIRST_REQUEST_NUMBER,
        );
        {
            let state = self.lock_state();
            request.acknowledged_replies = state.numbers.acknowledged().clone();
            if !state.local_nymbox_hash.is_zero() {
                request.nymbox_hash = Some(state.local_nymbox_hash);
            }
        }
        let payload = request
            .signing_payload()
            .map_err(|e| ConsensusError::UnsignedOrBadSignature {
                subject: format!("{kind:?} request: {e}"),
            })?;
        let signature = signer
            .sign(&payload, &self.local_id)
            .map_err(|e| ConsensusError::UnsignedOrBadSignature {
                subject: format!("{kind:?} request: {e}"),
            })?;
        request.signature = Some(signature);
        Ok(request)
    }

    // ---------------------------------------------------------------------
    // Managed numbers (server variant)
    // ---------------------------------------------------------------------

    pub(crate) fn reserve_transaction_number(&self, purpose: Kind) -> Result<TransactionNumber, ConsensusError> {
        let mut state = self.lock_state();
        state.server()?;
        let reserve = usize::from(purpose != Kind::ProcessInbox);
        let available = state.numbers.available().len();
        trace!(
            target: LOG_TARGET,
            "Allocating a transaction number for {}: {} available, {} issued",
            purpose,
            available,
            state.numbers.issued().len()
        );
        if reserve >= available {
            warn!(
                target: LOG_TARGET,
                "No transaction numbers to allocate for {} ({} available, {} reserved)", purpose, available, reserve
            );
            return Ok(TransactionNumber::ZERO);
        }
        let number = match state.numbers.available().iter().next() {
            Some(&number) => number,
            None => return Ok(TransactionNumber::ZERO),
        };
        state.numbers.consume(number)?;
        Ok(number)
    }

    /// Called when a managed number goes out of scope. The success flag is
    /// read under the state lock, so a racing `set_success` resolves
    /// deterministically before the recovery decision.
    pub(crate) fn release_managed_number(&self, number: TransactionNumber, success: &std::sync::atomic::AtomicBool) {
        let mut state = self.lock_state();
        if success.load(std::sync::atomic::Ordering::SeqCst) {
            return;
        }
        match state.numbers.recover(number) {
            Ok(()) => debug!(
                target: LOG_TARGET,
                "Returned transaction number {} to the available pool", number
            ),
            Err(e) => warn!(
                target: LOG_TARGET,
                "Failed to return transaction number {} to the available pool: {}", number, e
            ),
        }
    }

    // ---------------------------------------------------------------------
    // Serialization
    // ---------------------------------------------------------------------

    pub fn serialize(&self) -> SerializedContext {
        let state = self.lock_state();
        let (version, variant) = match &state.variant {
            ContextVariant::Client(client) => (CONTEXT_VERSION_CLIENT, SerializedVariant::Client {
                open_cron_items: client.open_cron_items.iter().map(|n| n.as_u64()).collect(),
            }),
            ContextVariant::Server(server) => (CONTEXT_VERSION_SERVER, SerializedVariant::Server {
                server_id: self.notary_id.clone(),
                highest_transaction_number: state.numbers.highest().as_u64(),
                tentative_request_numbers: state.numbers.tentative().iter().map(|n| n.as_u64()).collect(),
                revision: server.revision,
                admin_password: server.admin_password.to_string(),
                admin_attempted: server.admin_attempted,
                admin_success: server.admin_success,
            }),
        };
        SerializedContext {
            version,
            local_id: self.local_id.clone(),
            remote_id: self.remote_id.clone(),
            notary_id: self.notary_id.clone(),
            issued: state.numbers.issued().iter().map(|n| n.as_u64()).collect(),
            available: state.numbers.available().iter().map(|n| n.as_u64()).collect(),
            acknowledged_replies: state.numbers.acknowledged().iter().map(|n| n.as_u64()).collect(),
            request_number: state.request_number.as_u64(),
            local_nymbox_hash: state.local_nymbox_hash,
            remote_nymbox_hash: state.remote_nymbox_hash,
            variant,
        }
    }

    /// Restores a context from its serialized form. The server variant needs
    /// its connection re-supplied; it is never persisted.
    pub fn from_serialized(
        serialized: SerializedContext,
        connection: Option<Arc<dyn NotaryConnection>>,
    ) -> Result<Self, ConsensusError> {
        let issued: BTreeSet<TransactionNumber> = serialized.issued.iter().map(|&n| n.into()).collect();
        let available: BTreeSet<TransactionNumber> = serialized.available.iter().map(|&n| n.into()).collect();
        let acknowledged: BTreeSet<RequestNumber> =
            serialized.acknowledged_replies.iter().map(|&n| n.into()).collect();
        let (numbers, variant, connection) = match serialized.variant {
            SerializedVariant::Client { open_cron_items } => {
                let numbers = NumberRegistry::restore(
                    issued,
                    available,
                    BTreeSet::new(),
                    acknowledged,
                    TransactionNumber::ZERO,
                );
                let variant = ContextVariant::Client(ClientState {
                    open_cron_items: open_cron_items.iter().map(|&n| n.into()).collect(),
                });
                (numbers, variant, None)
            },
            SerializedVariant::Server {
                highest_transaction_number,
                tentative_request_numbers,
                revision,
                admin_password,
                admin_attempted,
                admin_success,
                ..
            } => {
                let connection = match connection {
                    Some(connection) => connection,
                    None => {
                        error!(
                            target: LOG_TARGET,
                            "A server context cannot be restored without a connection"
                        );
                        return Err(ConsensusError::WrongContext);
                    },
                };
                let numbers = NumberRegistry::restore(
                    issued,
                    available,
                    tentative_request_numbers.iter().map(|&n| n.into()).collect(),
                    acknowledged,
                    highest_transaction_number.into(),
                );
                let variant = ContextVariant::Server(ServerState {
                    admin_password: Zeroizing::new(admin_password),
                    admin_attempted,
                    admin_success,
                    revision,
                });
                (numbers, variant, Some(connection))
            },
        };
        numbers.audit()?;
        Ok(Self {
            local_id: serialized.local_id,
            remote_id: serialized.remote_id,
            notary_id: serialized.notary_id,
            connection,
            message_lock: Mutex::new(()),
            state: Mutex::new(ContextState {
                numbers,
                request_number: serialized.request_number.into(),
                local_nymbox_hash: serialized.local_nymbox_hash,
                remote_nymbox_hash: serialized.remote_nymbox_hash,
                variant,
            }),
        })
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.serialize() == other.serialize()
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("local_id", &self.local_id)
            .field("remote_id", &self.remote_id)
            .field("notary_id", &self.notary_id)
            .field("type", &self.context_type())
            .finish()
    }
}

/// The persisted shape of a context. Field order is the wire order; all
/// number lists are sorted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializedContext {
    pub version: u32,
    pub local_id: NymId,
    pub remote_id: NymId,
    pub notary_id: NotaryId,
    pub issued: Vec<u64>,
    pub available: Vec<u64>,
    pub acknowledged_replies: Vec<u64>,
    pub request_number: u64,
    pub local_nymbox_hash: FixedHash,
    pub remote_nymbox_hash: FixedHash,
    pub variant: SerializedVariant,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SerializedVariant {
    Client {
        open_cron_items: Vec<u64>,
    },
    Server {
        server_id: NotaryId,
        highest_transaction_number: u64,
        tentative_request_numbers: Vec<u64>,
        revision: u64,
        admin_password: String,
        admin_attempted: bool,
        admin_success: bool,
    },
}

impl SerializedContext {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}
