// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tari_notary_types::{FixedHash, TransactionNumber};

use crate::{
    interface::Hasher,
    ledger::{
        error::LedgerError,
        kind::{Kind, OriginKind},
    },
};

/// Reference to the transaction a receipt originally stems from. `number` is
/// zero until it has been set explicitly or computed from the embedded
/// instrument.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OriginRef {
    pub number: TransactionNumber,
    pub kind: OriginKind,
}

/// A single ledger entry.
///
/// A receipt exists in one of two forms. The *full* form carries the
/// cleartext attachment (the embedded instrument) and note, and can compute
/// its own content hash. The *abbreviated* form omits both and instead
/// carries `receipt_hash`, a commitment to the full form, which keeps
/// transmitted ledgers small. `verify_box_receipt` ties the two together.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Receipt {
    kind: Kind,
    date_signed: i64,
    transaction_num: TransactionNumber,
    in_reference_to: TransactionNumber,
    reference_to_display: TransactionNumber,
    origin: OriginRef,
    amount: i64,
    display_amount: i64,
    closing_num: Option<TransactionNumber>,
    note: Option<String>,
    attachment: Option<String>,
    receipt_hash: Option<FixedHash>,
    #[serde(skip)]
    origin_cache: OnceCell<TransactionNumber>,
}

impl Receipt {
    pub fn new(
        kind: Kind,
        transaction_num: TransactionNumber,
        in_reference_to: TransactionNumber,
        amount: i64,
        date_signed: i64,
    ) -> Self {
        Self {
            kind,
            date_signed,
            transaction_num,
            in_reference_to,
            reference_to_display: TransactionNumber::ZERO,
            origin: OriginRef::default(),
            amount,
            display_amount: amount,
            closing_num: None,
            note: None,
            attachment: None,
            receipt_hash: None,
            origin_cache: OnceCell::new(),
        }
    }

    pub fn with_closing_number(mut self, number: TransactionNumber) -> Self {
        self.closing_num = Some(number);
        self
    }

    pub fn with_origin_kind(mut self, kind: OriginKind) -> Self {
        self.origin.kind = kind;
        self
    }

    pub fn with_reference_to_display(mut self, number: TransactionNumber) -> Self {
        self.reference_to_display = number;
        self
    }

    pub fn with_display_amount(mut self, amount: i64) -> Self {
        self.display_amount = amount;
        self
    }

    pub fn with_note<T: Into<String>>(mut self, note: T) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_attachment<T: Into<String>>(mut self, attachment: T) -> Self {
        self.attachment = Some(attachment.into());
        self
    }

    /// Embeds an instrument as the receipt attachment.
    pub fn with_instrument(self, instrument: &Instrument) -> Result<Self, LedgerError> {
        let txn = self.transaction_num;
        let serialized = serde_json::to_string(instrument).map_err(|e| LedgerError::MalformedReceipt {
            txn,
            reason: e.to_string(),
        })?;
        Ok(self.with_attachment(serialized))
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn date_signed(&self) -> i64 {
        self.date_signed
    }

    pub fn transaction_num(&self) -> TransactionNumber {
        self.transaction_num
    }

    pub fn in_reference_to(&self) -> TransactionNumber {
        self.in_reference_to
    }

    pub fn reference_to_display(&self) -> TransactionNumber {
        self.reference_to_display
    }

    pub fn origin_kind(&self) -> OriginKind {
        self.origin.kind
    }

    pub fn amount(&self) -> i64 {
        self.amount
    }

    pub fn display_amount(&self) -> i64 {
        self.display_amount
    }

    pub fn closing_num(&self) -> Option<TransactionNumber> {
        self.closing_num
    }

    pub fn note(&self) -> Option<&str> {
        self.note.as_deref()
    }

    pub fn attachment(&self) -> Option<&str> {
        self.attachment.as_deref()
    }

    pub fn receipt_hash(&self) -> Option<FixedHash> {
        self.receipt_hash
    }

    pub fn is_abbreviated(&self) -> bool {
        self.receipt_hash.is_some() && self.attachment.is_none()
    }

    /// Parses the embedded instrument out of the attachment.
    pub fn instrument(&self) -> Result<Instrument, LedgerError> {
        let attachment = self
            .attachment
            .as_deref()
            .ok_or(LedgerError::MissingAttachment(self.transaction_num))?;
        serde_json::from_str(attachment).map_err(|e| LedgerError::MalformedReceipt {
            txn: self.transaction_num,
            reason: e.to_string(),
        })
    }

    /// The amount this receipt contributes to the local account balance, by
    /// kind. Cheques and vouchers have left the account, so their embedded
    /// amount is negated. Transfer and final receipts move no money; they
    /// only close obligations.
    pub fn receipt_amount(&self) -> Result<i64, LedgerError> {
        match self.kind {
            Kind::ChequeReceipt | Kind::VoucherReceipt => match self.instrument()? {
                Instrument::Cheque(cheque) => Ok(-cheque.amount),
                other => Err(self.wrong_instrument(&other)),
            },
            Kind::Pending => match self.instrument()? {
                Instrument::Transfer(order) => Ok(order.amount),
                other => Err(self.wrong_instrument(&other)),
            },
            Kind::MarketReceipt | Kind::PaymentReceipt | Kind::BasketReceipt => Ok(self.amount),
            Kind::TransferReceipt | Kind::FinalReceipt => Ok(0),
            _ => Ok(self.amount),
        }
    }

    /// The transaction number of the original transaction this receipt stems
    /// from, computed lazily and cached. Kinds for which the origin cannot be
    /// derived fail explicitly; callers must use [`set_number_of_origin`]
    /// first.
    ///
    /// [`set_number_of_origin`]: Receipt::set_number_of_origin
    pub fn number_of_origin(&self) -> Result<TransactionNumber, LedgerError> {
        if !self.origin.number.is_zero() {
            return Ok(self.origin.number);
        }
        if let Some(cached) = self.origin_cache.get() {
            return Ok(*cached);
        }
        let computed = match self.kind {
            Kind::ChequeReceipt | Kind::VoucherReceipt => match self.instrument()? {
                Instrument::Cheque(cheque) => cheque.transaction_num,
                other => return Err(self.wrong_instrument(&other)),
            },
            Kind::Pending |
            Kind::TransferReceipt |
            Kind::MarketReceipt |
            Kind::PaymentReceipt |
            Kind::FinalReceipt |
            Kind::BasketReceipt |
            Kind::InstrumentNotice => self.in_reference_to,
            Kind::Blank | Kind::SuccessNotice | Kind::ReplyNotice | Kind::Notice => TransactionNumber::ZERO,
            Kind::ProcessInbox | Kind::ProcessNymbox => {
                return Err(LedgerError::OriginNotCalculable(self.kind));
            },
            // A request is its own origin.
            _ => self.transaction_num,
        };
        let _unused = self.origin_cache.set(computed);
        Ok(computed)
    }

    pub fn set_number_of_origin(&mut self, number: TransactionNumber) {
        self.origin.number = number;
    }

    /// Content hash of the full form. Fails on an abbreviated receipt, which
    /// has nothing left to hash.
    pub fn digest(&self, hasher: &dyn Hasher) -> Result<FixedHash, LedgerError> {
        if self.is_abbreviated() {
            return Err(LedgerError::MissingFullForm(self.transaction_num));
        }
        let core = HashableReceipt {
            kind: self.kind,
            date_signed: self.date_signed,
            transaction_num: self.transaction_num,
            in_reference_to: self.in_reference_to,
            reference_to_display: self.reference_to_display,
            origin: self.origin,
            amount: self.amount,
            display_amount: self.display_amount,
            closing_num: self.closing_num,
            note: self.note.as_deref(),
            attachment: self.attachment.as_deref(),
        };
        let serialized = serde_json::to_vec(&core).map_err(|e| LedgerError::MalformedReceipt {
            txn: self.transaction_num,
            reason: e.to_string(),
        })?;
        Ok(hasher.hash(&serialized))
    }

    /// Produces the abbreviated form: hash commitment in, attachment and note
    /// out.
    pub fn abbreviate(&self, hasher: &dyn Hasher) -> Result<Receipt, LedgerError> {
        let hash = self.digest(hasher)?;
        let mut abbreviated = self.clone();
        abbreviated.attachment = None;
        abbreviated.note = None;
        abbreviated.receipt_hash = Some(hash);
        abbreviated.origin_cache = OnceCell::new();
        Ok(abbreviated)
    }

    fn wrong_instrument(&self, got: &Instrument) -> LedgerError {
        LedgerError::MalformedReceipt {
            txn: self.transaction_num,
            reason: format!("unexpected embedded instrument {got:?} on a {} receipt", self.kind),
        }
    }
}

// The origin cache is derived state; two receipts differing only in what has
// been computed so far are the same receipt.
impl PartialEq for Receipt {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind &&
            self.date_signed == other.date_signed &&
            self.transaction_num == other.transaction_num &&
            self.in_reference_to == other.in_reference_to &&
            self.reference_to_display == other.reference_to_display &&
            self.origin == other.origin &&
            self.amount == other.amount &&
            self.display_amount == other.display_amount &&
            self.closing_num == other.closing_num &&
            self.note == other.note &&
            self.attachment == other.attachment &&
            self.receipt_hash == other.receipt_hash
    }
}

impl Eq for Receipt {}

#[derive(Serialize)]
struct HashableReceipt<'a> {
    kind: Kind,
    date_signed: i64,
    transaction_num: TransactionNumber,
    in_reference_to: TransactionNumber,
    reference_to_display: TransactionNumber,
    origin: OriginRef,
    amount: i64,
    display_amount: i64,
    closing_num: Option<TransactionNumber>,
    note: Option<&'a str>,
    attachment: Option<&'a str>,
}

/// The instrument a full-form receipt embeds in its attachment. Stands in for
/// the signed contract the notary countersigned; the consensus core only
/// needs the numbers and amounts out of it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Instrument {
    Cheque(Cheque),
    Transfer(TransferOrder),
    MarketOffer(MarketOfferNumbers),
    PaymentPlan(PaymentPlanNumbers),
    SmartContract(SmartContractNumbers),
    BasketExchange(BasketExchangeNumbers),
}

/// A cheque or voucher as embedded in its deposit receipt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cheque {
    pub transaction_num: TransactionNumber,
    pub amount: i64,
}

/// The original transfer order a pending receipt refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferOrder {
    pub origin: TransactionNumber,
    pub amount: i64,
}

/// Closing numbers reserved by a market offer: one for the asset account and
/// one for the currency account.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketOfferNumbers {
    pub asset_closing: TransactionNumber,
    pub currency_closing: TransactionNumber,
}

/// The four numbers a payment plan reserves across its two parties.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentPlanNumbers {
    pub sender_opening: TransactionNumber,
    pub sender_closing: TransactionNumber,
    pub recipient_opening: TransactionNumber,
    pub recipient_closing: TransactionNumber,
}

/// The local party's view of a smart contract: its own opening number plus
/// one closing number per asset account it committed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmartContractNumbers {
    pub opening: TransactionNumber,
    pub account_closings: Vec<TransactionNumber>,
}

/// Closing numbers reserved by a basket exchange, one per sub-account.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasketExchangeNumbers {
    pub closings: Vec<TransactionNumber>,
}
