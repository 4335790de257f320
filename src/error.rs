use crate::auction::{Amount, BidId, Leader, LotId, Units};
use thiserror::Error;

/// Why a bid placement was refused
///
/// Variants are listed in the order the checks run.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum BidRejection {
    #[error("lot does not exist")]
    LotNotFound,
    #[error("lot is already closed")]
    LotClosed,
    #[error("price must be a positive multiple of {step}")]
    InvalidPriceGranularity { step: Amount },
    /// `current` stays out of the message: it is blind until the lot closes
    #[error("bid must be higher than the current bid")]
    BidTooLow { current: Amount },
    #[error("bid must not exceed {ceiling}")]
    BidTooHigh { ceiling: Amount },
    #[error("requested units must be between 1 and {max}")]
    InvalidQuantity { max: Units },
    #[error("bidder name is missing")]
    MissingBidderName,
}

impl BidRejection {
    pub fn kind(self) -> &'static str {
        use BidRejection::*;
        match self {
            LotNotFound => "LotNotFound",
            LotClosed => "LotClosed",
            InvalidPriceGranularity { .. } => "InvalidPriceGranularity",
            BidTooLow { .. } => "BidTooLow",
            BidTooHigh { .. } => "BidTooHigh",
            InvalidQuantity { .. } => "InvalidQuantity",
            MissingBidderName => "MissingBidderName",
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("bid rejected: {0}")]
    Rejected(#[from] BidRejection),
    #[error("unknown lot: {0}")]
    LotNotFound(LotId),
    #[error("lot already exists: {0}")]
    LotExists(LotId),
    #[error("lot is still open: {0}")]
    LotStillOpen(LotId),
    #[error("invalid lot: {0}")]
    InvalidLot(&'static str),
    #[error("unknown bid: {0}")]
    BidNotFound(BidId),
    #[error("administrator privileges required")]
    Forbidden,
    #[error("storage operation failed")]
    Storage(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Cached leader fields of a closed lot disagree with its ledger
///
/// Never returned to callers, only logged, counted and healed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("lot {lot_id}: cached leader {cached:?} does not match ledger leader {expected:?}")]
pub struct ConsistencyFault {
    pub lot_id: LotId,
    pub cached: Leader,
    pub expected: Leader,
}
