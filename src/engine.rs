//! Auction engine
//!
//! Ties the storage, the change notifier and the clock together and
//! exposes every operation on lots. Bid placement and removal live in
//! [`crate::ledger`], cache repair in [`crate::repair`].
use crate::allocation::{self, Award, Settlement};
use crate::auction::{Bid, Lot, LotIdRef, NewLot};
use crate::clock::SharedClock;
use crate::error::{Error, Result};
use crate::ledger::BidRules;
use crate::notify::{ChangeAction, SharedNotifier};
use crate::persistence::Persistence;
use crate::visibility::{LotView, PriceDisplay, Summary, Viewer};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

pub struct Engine<P> {
    pub(crate) persistence: P,
    notifier: SharedNotifier,
    clock: SharedClock,
    pub(crate) rules: BidRules,
    consistency_faults: AtomicU64,
}

impl<P> Engine<P>
where
    P: Persistence,
{
    pub fn new(persistence: P, notifier: SharedNotifier, clock: SharedClock, rules: BidRules) -> Self {
        Self {
            persistence,
            notifier,
            clock,
            rules,
            consistency_faults: AtomicU64::new(0),
        }
    }

    pub fn persistence(&self) -> &P {
        &self.persistence
    }

    pub fn rules(&self) -> BidRules {
        self.rules
    }

    /// Number of consistency faults detected (and healed) so far
    pub fn consistency_faults(&self) -> u64 {
        self.consistency_faults.load(Ordering::SeqCst)
    }

    pub(crate) fn record_consistency_fault(&self) {
        self.consistency_faults.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Best-effort: a failed notification is logged and otherwise ignored
    pub(crate) fn publish(&self, lot_id: LotIdRef, action: ChangeAction) {
        if let Err(e) = self.notifier.notify(lot_id, action) {
            warn!(%lot_id, ?action, error = %e, "change notification failed");
        }
    }

    pub fn create_lot(&self, new_lot: NewLot) -> Result<Lot> {
        if new_lot.id.trim().is_empty() {
            return Err(Error::InvalidLot("lot id is empty"));
        }
        if new_lot.unit_quantity < 1 {
            return Err(Error::InvalidLot("unit quantity must be at least 1"));
        }
        if new_lot.starting_price > self.rules.price_ceiling {
            return Err(Error::InvalidLot("starting price exceeds the price ceiling"));
        }

        let lot = new_lot.into_lot();
        if !self.persistence.create_lot(&lot)? {
            return Err(Error::LotExists(lot.id));
        }
        info!(lot_id = %lot.id, starting_price = lot.starting_price, unit_quantity = lot.unit_quantity, "lot created");
        self.publish(&lot.id, ChangeAction::Added);
        Ok(lot)
    }

    /// Administrative delete of a lot and, with it, its whole ledger
    pub fn delete_lot(&self, viewer: &Viewer, lot_id: LotIdRef) -> Result<()> {
        if !viewer.is_admin {
            return Err(Error::Forbidden);
        }
        if !self.persistence.delete_lot(lot_id)? {
            return Err(Error::LotNotFound(lot_id.to_owned()));
        }
        info!(%lot_id, "lot deleted");
        self.publish(lot_id, ChangeAction::Deleted);
        Ok(())
    }

    /// Lot and its ranked ledger, with the cached leader healed if the lot is closed
    pub(crate) fn load(&self, lot_id: LotIdRef) -> Result<(Lot, Vec<Bid>)> {
        let lot = self
            .persistence
            .load_lot(lot_id)?
            .ok_or_else(|| Error::LotNotFound(lot_id.to_owned()))?;
        let bids = self.persistence.bids_for_lot(lot_id)?;
        let lot = self.heal_if_inconsistent(lot, &bids)?;
        Ok((lot, bids))
    }

    fn load_closed(&self, lot_id: LotIdRef) -> Result<(Lot, Vec<Bid>)> {
        let (lot, bids) = self.load(lot_id)?;
        if lot.is_open(self.now()) {
            return Err(Error::LotStillOpen(lot.id));
        }
        Ok((lot, bids))
    }

    /// Winners of a closed lot and the units each of them gets
    pub fn resolve(&self, lot_id: LotIdRef) -> Result<Vec<Award>> {
        let (lot, bids) = self.load_closed(lot_id)?;
        let awards = allocation::resolve(&bids, lot.unit_quantity);
        debug!(%lot_id, winners = awards.len(), "lot resolved");
        Ok(awards)
    }

    pub fn settlement(&self, lot_id: LotIdRef) -> Result<Settlement> {
        let (lot, bids) = self.load_closed(lot_id)?;
        Ok(Settlement::from_ledger(&lot, &bids))
    }

    /// Aggregate bid total of a lot, masked until the lot closes
    pub fn aggregate(&self, lot_id: LotIdRef) -> Result<PriceDisplay> {
        let (lot, bids) = self.load(lot_id)?;
        Ok(PriceDisplay::new(
            lot.state(self.now()),
            allocation::aggregate_sum(&bids, lot.unit_quantity),
        ))
    }

    pub fn view_lot(&self, viewer: &Viewer, lot_id: LotIdRef) -> Result<LotView> {
        let (lot, bids) = self.load(lot_id)?;
        Ok(LotView::build(viewer, &lot, &bids, self.now()))
    }

    /// The viewer's own bids on every lot
    pub fn bids_of(&self, viewer: &Viewer) -> Result<Vec<Bid>> {
        match viewer.identity.as_deref() {
            Some(identity) => Ok(self.persistence.bids_for_bidder(identity)?),
            None => Ok(vec![]),
        }
    }

    pub fn summary(&self, viewer: &Viewer) -> Result<Summary> {
        let mut ledgers = vec![];
        for lot in self.persistence.list_lots()? {
            let bids = self.persistence.bids_for_lot(&lot.id)?;
            let lot = self.heal_if_inconsistent(lot, &bids)?;
            ledgers.push((lot, bids));
        }
        Ok(Summary::build(viewer, &ledgers, self.now()))
    }
}
