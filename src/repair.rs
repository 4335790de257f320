//! Consistency repair
//!
//! Detects closed lots whose cached `current_bid`/`leading_bidder_name`
//! no longer match their ledger and overwrites the cache from it.
use crate::allocation;
use crate::auction::{Bid, Lot, LotIdRef};
use crate::engine::Engine;
use crate::error::{ConsistencyFault, Error, Result};
use crate::persistence::{LotTransaction, Persistence};
use crate::visibility::Viewer;
use chrono::{DateTime, Utc};
use tracing::{info, warn};

/// Compares the cached leader of a closed lot with its ledger
///
/// Open lots are never reported: their cache tracks the last placed bid.
pub fn check_consistency(lot: &Lot, bids: &[Bid], now: DateTime<Utc>) -> Option<ConsistencyFault> {
    if lot.is_open(now) {
        return None;
    }
    let expected = allocation::expected_leader(lot, bids);
    let cached = lot.cached_leader();
    (cached != expected).then(|| ConsistencyFault {
        lot_id: lot.id.clone(),
        cached,
        expected,
    })
}

impl<P> Engine<P>
where
    P: Persistence,
{
    pub fn is_inconsistent(&self, lot_id: LotIdRef) -> Result<bool> {
        let lot = self
            .persistence
            .load_lot(lot_id)?
            .ok_or_else(|| Error::LotNotFound(lot_id.to_owned()))?;
        let bids = self.persistence.bids_for_lot(lot_id)?;
        Ok(check_consistency(&lot, &bids, self.now()).is_some())
    }

    /// Administrative resync of one lot. Returns whether anything changed.
    pub fn sync(&self, viewer: &Viewer, lot_id: LotIdRef) -> Result<bool> {
        if !viewer.is_admin {
            return Err(Error::Forbidden);
        }
        let changed = self.sync_lot(lot_id)?;
        info!(%lot_id, changed, "lot synchronized");
        Ok(changed)
    }

    /// Resync every closed lot. Returns how many were corrected.
    pub fn sync_all(&self, viewer: &Viewer) -> Result<usize> {
        if !viewer.is_admin {
            return Err(Error::Forbidden);
        }
        let now = self.now();
        let mut corrected = 0;
        for lot in self.persistence.list_lots()? {
            if lot.is_open(now) {
                continue;
            }
            if self.sync_lot(&lot.id)? {
                corrected += 1;
            }
        }
        info!(corrected, "closed lots synchronized");
        Ok(corrected)
    }

    /// Overwrite the cached leader with the ledger's, under the lot's exclusive scope
    ///
    /// Idempotent: a second run finds nothing to change.
    pub(crate) fn sync_lot(&self, lot_id: LotIdRef) -> Result<bool> {
        let mut transaction = self.persistence.begin(lot_id)?;
        let lot = transaction
            .lot()?
            .ok_or_else(|| Error::LotNotFound(lot_id.to_owned()))?;
        let expected = allocation::expected_leader(&lot, &transaction.bids()?);

        if lot.cached_leader() == expected {
            transaction.rollback()?;
            return Ok(false);
        }
        transaction.store_leader(&expected)?;
        transaction.commit()?;
        Ok(true)
    }

    /// Auto-heal on read
    ///
    /// A fault on a closed lot is logged, counted and synced away; the
    /// returned lot carries the corrected leader.
    pub(crate) fn heal_if_inconsistent(&self, mut lot: Lot, bids: &[Bid]) -> Result<Lot> {
        if let Some(fault) = check_consistency(&lot, bids, self.now()) {
            warn!(%fault, "consistency fault detected, resynchronizing");
            self.record_consistency_fault();
            self.sync_lot(&lot.id)?;
            lot.apply_leader(fault.expected);
        }
        Ok(lot)
    }
}
