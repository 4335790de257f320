//! Visibility Policy
//!
//! Blind auction: until a lot closes nobody, administrators included,
//! sees other bidders' bids or any price aggregate. A viewer always sees
//! their own bids, and bid counts are never hidden.
use crate::allocation;
use crate::auction::{Amount, Bid, BidderIdentity, Lot, LotId, LotState, Units};
use chrono::{DateTime, Utc};
use serde::Serialize;

pub const MASK_CHAR: char = '*';

/// Who is asking, as resolved by the authentication layer
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Viewer {
    pub identity: Option<BidderIdentity>,
    pub is_admin: bool,
}

impl Viewer {
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn bidder(identity: impl Into<BidderIdentity>) -> Self {
        Self {
            identity: Some(identity.into()),
            is_admin: false,
        }
    }

    pub fn admin(identity: impl Into<BidderIdentity>) -> Self {
        Self {
            identity: Some(identity.into()),
            is_admin: true,
        }
    }

    pub fn owns(&self, bid: &Bid) -> bool {
        self.identity
            .as_deref()
            .map_or(false, |identity| bid.is_owned_by(identity))
    }
}

/// Replace every digit with [`MASK_CHAR`]
pub fn mask_amount(amount: Amount) -> String {
    amount.to_string().chars().map(|_| MASK_CHAR).collect()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum PriceDisplay {
    Masked(String),
    Revealed(Amount),
}

impl PriceDisplay {
    pub fn new(state: LotState, amount: Amount) -> Self {
        match state {
            LotState::Open => PriceDisplay::Masked(mask_amount(amount)),
            LotState::Closed => PriceDisplay::Revealed(amount),
        }
    }

    pub fn revealed(&self) -> Option<Amount> {
        match self {
            PriceDisplay::Revealed(amount) => Some(*amount),
            PriceDisplay::Masked(_) => None,
        }
    }

    pub fn is_masked(&self) -> bool {
        matches!(self, PriceDisplay::Masked(_))
    }
}

/// Bids of one lot the viewer may see, in ranking order
pub fn visible_bids(viewer: &Viewer, state: LotState, bids: &[Bid]) -> Vec<Bid> {
    let mut visible: Vec<Bid> = match state {
        LotState::Open => bids.iter().filter(|bid| viewer.owns(bid)).cloned().collect(),
        LotState::Closed => bids.to_vec(),
    };
    allocation::sort_ranked(&mut visible);
    visible
}

pub fn my_bids_count(viewer: &Viewer, bids: &[Bid]) -> usize {
    bids.iter().filter(|bid| viewer.owns(bid)).count()
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LotView {
    pub lot_id: LotId,
    pub state: LotState,
    pub starting_price: Amount,
    pub unit_quantity: Units,
    pub close_time: Option<DateTime<Utc>>,
    pub current_bid: PriceDisplay,
    /// Only disclosed once the lot is closed
    pub leading_bidder_name: Option<String>,
    pub total_bids_count: usize,
    pub my_bids_count: usize,
    pub bids: Vec<Bid>,
    pub aggregate: PriceDisplay,
}

impl LotView {
    pub fn build(viewer: &Viewer, lot: &Lot, bids: &[Bid], now: DateTime<Utc>) -> Self {
        let state = lot.state(now);
        Self {
            lot_id: lot.id.clone(),
            state,
            starting_price: lot.starting_price,
            unit_quantity: lot.unit_quantity,
            close_time: lot.close_time,
            current_bid: PriceDisplay::new(state, lot.current_bid),
            leading_bidder_name: match state {
                LotState::Open => None,
                LotState::Closed => lot.leading_bidder_name.clone(),
            },
            total_bids_count: bids.len(),
            my_bids_count: my_bids_count(viewer, bids),
            bids: visible_bids(viewer, state, bids),
            aggregate: PriceDisplay::new(state, allocation::aggregate_sum(bids, lot.unit_quantity)),
        }
    }
}

/// Marketplace-wide totals
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    pub open_lots: usize,
    pub closed_lots: usize,
    pub total_bids_count: usize,
    pub my_bids_count: usize,
    /// Over every lot; masked while any lot is still open
    pub all_lots_total: PriceDisplay,
    /// Over closed lots only
    pub closed_lots_total: Amount,
}

impl Summary {
    pub fn build(viewer: &Viewer, ledgers: &[(Lot, Vec<Bid>)], now: DateTime<Utc>) -> Self {
        let mut summary = Self {
            open_lots: 0,
            closed_lots: 0,
            total_bids_count: 0,
            my_bids_count: 0,
            all_lots_total: PriceDisplay::Revealed(0),
            closed_lots_total: 0,
        };
        let mut all_lots_total: Amount = 0;

        for (lot, bids) in ledgers {
            let total = allocation::aggregate_sum(bids, lot.unit_quantity);
            all_lots_total = all_lots_total.saturating_add(total);
            match lot.state(now) {
                LotState::Open => summary.open_lots += 1,
                LotState::Closed => {
                    summary.closed_lots += 1;
                    summary.closed_lots_total = summary.closed_lots_total.saturating_add(total);
                }
            }
            summary.total_bids_count += bids.len();
            summary.my_bids_count += my_bids_count(viewer, bids);
        }

        let state = if summary.open_lots == 0 {
            LotState::Closed
        } else {
            LotState::Open
        };
        summary.all_lots_total = PriceDisplay::new(state, all_lots_total);
        summary
    }
}
