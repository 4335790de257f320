use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

pub type LotId = String;
pub type LotIdRef<'s> = &'s str;
pub type BidderIdentity = String;
pub type BidderIdentityRef<'s> = &'s str;
pub type Amount = u64;
pub type Units = u32;

/// Ledger-assigned bid id
///
/// Ids grow in insertion order, which also makes them the last-resort
/// tie-break when two bids share both price and timestamp.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BidId(pub u64);

impl fmt::Display for BidId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LotState {
    Open,
    /// Terminal, a closed lot never reopens
    Closed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lot {
    pub id: LotId,
    pub starting_price: Amount,
    pub unit_quantity: Units,
    /// `None` means the lot never closes
    pub close_time: Option<DateTime<Utc>>,
    /// Cached price of the ledger leader, `starting_price` when there are no bids
    pub current_bid: Amount,
    /// Cached display name of the ledger leader
    pub leading_bidder_name: Option<String>,
}

impl Lot {
    /// The only place where open/closed is decided.
    pub fn state(&self, now: DateTime<Utc>) -> LotState {
        match self.close_time {
            Some(close_time) if close_time <= now => LotState::Closed,
            _ => LotState::Open,
        }
    }

    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        self.state(now) == LotState::Open
    }

    pub fn cached_leader(&self) -> Leader {
        Leader {
            price: self.current_bid,
            bidder_name: self.leading_bidder_name.clone(),
        }
    }

    pub fn apply_leader(&mut self, leader: Leader) {
        self.current_bid = leader.price;
        self.leading_bidder_name = leader.bidder_name;
    }
}

/// The denormalized leader fields of a [`Lot`]
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Leader {
    pub price: Amount,
    pub bidder_name: Option<String>,
}

impl Leader {
    pub fn of_empty_lot(starting_price: Amount) -> Self {
        Self {
            price: starting_price,
            bidder_name: None,
        }
    }

    pub fn of_bid(bid: &Bid) -> Self {
        Self {
            price: bid.price,
            bidder_name: Some(bid.bidder_display_name.clone()),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewLot {
    pub id: LotId,
    pub starting_price: Amount,
    pub unit_quantity: Units,
    #[serde(default)]
    pub close_time: Option<DateTime<Utc>>,
}

impl NewLot {
    pub fn into_lot(self) -> Lot {
        Lot {
            current_bid: self.starting_price,
            leading_bidder_name: None,
            id: self.id,
            starting_price: self.starting_price,
            unit_quantity: self.unit_quantity,
            close_time: self.close_time,
        }
    }
}

/// An entry of the bid ledger. Never updated in place.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bid {
    pub id: BidId,
    pub lot_id: LotId,
    pub price: Amount,
    pub units_requested: Units,
    pub bidder_display_name: String,
    pub bidder_identity: BidderIdentity,
    pub created_at: DateTime<Utc>,
}

impl Bid {
    pub fn is_owned_by(&self, identity: BidderIdentityRef) -> bool {
        self.bidder_identity == identity
    }
}

/// A validated bid about to be appended; the store assigns the id.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewBid {
    pub lot_id: LotId,
    pub price: Amount,
    pub units_requested: Units,
    pub bidder_display_name: String,
    pub bidder_identity: BidderIdentity,
    pub created_at: DateTime<Utc>,
}

impl NewBid {
    pub fn into_bid(self, id: BidId) -> Bid {
        Bid {
            id,
            lot_id: self.lot_id,
            price: self.price,
            units_requested: self.units_requested,
            bidder_display_name: self.bidder_display_name,
            bidder_identity: self.bidder_identity,
            created_at: self.created_at,
        }
    }
}
