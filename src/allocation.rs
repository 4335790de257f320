//! Allocation Resolver
//!
//! Pure functions over a lot's ledger. Everything that decides who is
//! ahead (the cached leader, the settlement winners, the aggregate
//! totals) goes through [`rank`], so the three can never disagree.
use crate::auction::{Amount, Bid, Leader, Lot, LotId, Units};
use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::BTreeMap;

/// Priority order: higher price first, then earlier `created_at`, then lower id.
pub fn rank(a: &Bid, b: &Bid) -> Ordering {
    b.price
        .cmp(&a.price)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

pub fn ranked(bids: &[Bid]) -> Vec<&Bid> {
    let mut ranked: Vec<_> = bids.iter().collect();
    ranked.sort_by(|a, b| rank(a, b));
    ranked
}

pub fn sort_ranked(bids: &mut [Bid]) {
    bids.sort_by(rank);
}

pub fn leader(bids: &[Bid]) -> Option<&Bid> {
    bids.iter().min_by(|a, b| rank(a, b))
}

/// What the lot's cached leader fields must hold for this ledger.
pub fn expected_leader(lot: &Lot, bids: &[Bid]) -> Leader {
    leader(bids)
        .map(Leader::of_bid)
        .unwrap_or_else(|| Leader::of_empty_lot(lot.starting_price))
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Award {
    pub bid: Bid,
    pub units_awarded: Units,
}

impl Award {
    pub fn amount(&self) -> Amount {
        self.bid.price.saturating_mul(Amount::from(self.units_awarded))
    }
}

/// Greedy highest-price-first allocation of `unit_quantity` units.
///
/// Bids that end up with zero units are left out. An empty ledger
/// resolves to no awards.
pub fn resolve(bids: &[Bid], unit_quantity: Units) -> Vec<Award> {
    let mut remaining = unit_quantity;
    let mut awards = vec![];

    for bid in ranked(bids) {
        if remaining == 0 {
            break;
        }
        let units_awarded = remaining.min(bid.units_requested);
        if units_awarded > 0 {
            awards.push(Award {
                bid: bid.clone(),
                units_awarded,
            });
            remaining -= units_awarded;
        }
    }

    awards
}

/// Total of the `unit_quantity` highest unit slots.
///
/// Every bid contributes one slot of `price` per requested unit. Slots of
/// equal price are counted as one run, so the work depends on the number
/// of distinct prices, not on unit counts. This is computed independently
/// of [`resolve`] and must always match the sum of its awards.
pub fn aggregate_sum(bids: &[Bid], unit_quantity: Units) -> Amount {
    let mut runs: BTreeMap<Reverse<Amount>, u64> = BTreeMap::new();
    for bid in bids {
        *runs.entry(Reverse(bid.price)).or_default() += u64::from(bid.units_requested);
    }

    let mut remaining = u64::from(unit_quantity);
    let mut total: Amount = 0;
    for (Reverse(price), slots) in runs {
        if remaining == 0 {
            break;
        }
        let taken = remaining.min(slots);
        total = total.saturating_add(price.saturating_mul(taken));
        remaining -= taken;
    }
    total
}

/// Winners snapshot handed to reporting and export.
///
/// Always rebuilt from the ledger, never stored as the source of truth.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub lot_id: LotId,
    pub unit_quantity: Units,
    pub awards: Vec<Award>,
    pub units_sold: Units,
    pub units_unsold: Units,
    pub total: Amount,
}

impl Settlement {
    pub fn from_ledger(lot: &Lot, bids: &[Bid]) -> Self {
        let awards = resolve(bids, lot.unit_quantity);
        let units_sold = awards.iter().map(|award| award.units_awarded).sum::<Units>();
        let total = awards
            .iter()
            .map(Award::amount)
            .fold(0, Amount::saturating_add);

        Self {
            lot_id: lot.id.clone(),
            unit_quantity: lot.unit_quantity,
            units_unsold: lot.unit_quantity - units_sold,
            units_sold,
            awards,
            total,
        }
    }

    pub fn is_unsold(&self) -> bool {
        self.awards.is_empty()
    }
}
