// Copyright 2024. The Tari Project
// SPDX-License-Identifier: BSD-3-Clause

use std::{
    fmt,
    fmt::{Display, Formatter},
};

use serde::{Deserialize, Serialize};

/// Every kind of ledger entry in one enum: the request kinds a party submits
/// to the notary, and the receipt kinds the notary drops into boxes in
/// response. The two spaces overlap heavily in how they are processed, so
/// they share a tag.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Kind {
    // Requests.
    Transfer,
    Withdrawal,
    Deposit,
    ProcessInbox,
    ProcessNymbox,
    MarketOffer,
    PaymentPlan,
    SmartContract,
    CancelCronItem,
    ExchangeBasket,
    PayDividend,
    // Receipts.
    Pending,
    ChequeReceipt,
    VoucherReceipt,
    TransferReceipt,
    MarketReceipt,
    PaymentReceipt,
    FinalReceipt,
    BasketReceipt,
    InstrumentNotice,
    Notice,
    Blank,
    SuccessNotice,
    ReplyNotice,
}

impl Kind {
    pub fn is_request(self) -> bool {
        matches!(
            self,
            Kind::Transfer |
                Kind::Withdrawal |
                Kind::Deposit |
                Kind::ProcessInbox |
                Kind::ProcessNymbox |
                Kind::MarketOffer |
                Kind::PaymentPlan |
                Kind::SmartContract |
                Kind::CancelCronItem |
                Kind::ExchangeBasket |
                Kind::PayDividend
        )
    }

    pub fn is_receipt(self) -> bool {
        !self.is_request()
    }

    /// Request kinds whose opening number is closed out by a successful
    /// transaction. A balance statement for one of these is signed as if the
    /// number were already gone.
    pub fn closes_opening_number(self) -> bool {
        matches!(
            self,
            Kind::ProcessInbox |
                Kind::Withdrawal |
                Kind::Deposit |
                Kind::PayDividend |
                Kind::CancelCronItem |
                Kind::ExchangeBasket
        )
    }

    /// Request kinds whose opening number stays issued after success, until
    /// the instrument finally closes (transfer acceptance, cron expiry).
    pub fn keeps_opening_number(self) -> bool {
        matches!(
            self,
            Kind::Transfer | Kind::MarketOffer | Kind::PaymentPlan | Kind::SmartContract
        )
    }

    /// Long-lived notary-hosted instruments tracked in `open_cron_items`.
    pub fn is_cron_request(self) -> bool {
        matches!(self, Kind::MarketOffer | Kind::PaymentPlan | Kind::SmartContract)
    }

    /// Receipt kinds produced by a running cron item.
    pub fn is_cron_receipt(self) -> bool {
        matches!(self, Kind::MarketReceipt | Kind::PaymentReceipt)
    }

    /// Receipt kinds that move money in or out of an account, as opposed to
    /// the bookkeeping kinds that only open or close obligations.
    pub fn is_balance_affecting_receipt(self) -> bool {
        matches!(
            self,
            Kind::Pending |
                Kind::ChequeReceipt |
                Kind::VoucherReceipt |
                Kind::MarketReceipt |
                Kind::PaymentReceipt |
                Kind::BasketReceipt
        )
    }
}

impl Display for Kind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Transfer => "transfer",
            Kind::Withdrawal => "withdrawal",
            Kind::Deposit => "deposit",
            Kind::ProcessInbox => "processInbox",
            Kind::ProcessNymbox => "processNymbox",
            Kind::MarketOffer => "marketOffer",
            Kind::PaymentPlan => "paymentPlan",
            Kind::SmartContract => "smartContract",
            Kind::CancelCronItem => "cancelCronItem",
            Kind::ExchangeBasket => "exchangeBasket",
            Kind::PayDividend => "payDividend",
            Kind::Pending => "pending",
            Kind::ChequeReceipt => "chequeReceipt",
            Kind::VoucherReceipt => "voucherReceipt",
            Kind::TransferReceipt => "transferReceipt",
            Kind::MarketReceipt => "marketReceipt",
            Kind::PaymentReceipt => "paymentReceipt",
            Kind::FinalReceipt => "finalReceipt",
            Kind::BasketReceipt => "basketReceipt",
            Kind::InstrumentNotice => "instrumentNotice",
            Kind::Notice => "notice",
            Kind::Blank => "blank",
            Kind::SuccessNotice => "successNotice",
            Kind::ReplyNotice => "replyNotice",
        };
        f.write_str(s)
    }
}

/// Where a multi-step instrument originally came from. Receipts generated by
/// cron items carry this so a party can tell a payment-plan receipt from a
/// market receipt with the same shape.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OriginKind {
    #[default]
    NotApplicable,
    MarketOffer,
    PaymentPlan,
    SmartContract,
    PayDividend,
}

impl Display for OriginKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let s = match self {
            OriginKind::NotApplicable => "notApplicable",
            OriginKind::MarketOffer => "originMarketOffer",
            OriginKind::PaymentPlan => "originPaymentPlan",
            OriginKind::SmartContract => "originSmartContract",
            OriginKind::PayDividend => "originPayDividend",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod test {
    use super::Kind;

    #[test]
    fn request_and_receipt_spaces_partition() {
        for kind in [Kind::Transfer, Kind::ProcessInbox, Kind::SmartContract] {
            assert!(kind.is_request());
            assert!(!kind.is_receipt());
        }
        for kind in [Kind::Pending, Kind::FinalReceipt, Kind::ReplyNotice] {
            assert!(kind.is_receipt());
            assert!(!kind.is_request());
        }
    }

    #[test]
    fn opening_number_policy_covers_every_request() {
        for kind in [
            Kind::Transfer,
            Kind::Withdrawal,
            Kind::Deposit,
            Kind::ProcessInbox,
            Kind::MarketOffer,
            Kind::PaymentPlan,
            Kind::SmartContract,
            Kind::CancelCronItem,
            Kind::ExchangeBasket,
            Kind::PayDividend,
        ] {
            assert!(kind.closes_opening_number() ^ kind.keeps_opening_number());
        }
    }
}
