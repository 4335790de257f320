use super::*;
use crate::allocation;
use crate::auction::LotId;
use anyhow::{ensure, format_err};
use parking_lot::{lock_api::ArcMutexGuard, Mutex, RawMutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Clone, Debug)]
struct LotRecord {
    lot: Lot,
    bids: Vec<Bid>,
}

impl LotRecord {
    fn ranked_bids(&self) -> Vec<Bid> {
        let mut bids = self.bids.clone();
        allocation::sort_ranked(&mut bids);
        bids
    }
}

/// `None` once the lot got deleted
type LotCell = Arc<Mutex<Option<LotRecord>>>;

fn read_cell<T>(cell: &LotCell, f: impl FnOnce(&LotRecord) -> T) -> Option<T> {
    cell.lock().as_ref().map(f)
}

/// Fake in-memory persistence.
///
/// Useful for unit-tests and for running without a database. Every lot
/// has its own mutex, which is the exclusive scope of
/// [`Persistence::begin`].
#[derive(Debug, Default)]
pub struct InMemoryPersistence {
    lots: RwLock<BTreeMap<LotId, LotCell>>,
    next_bid_id: AtomicU64,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    fn cell(&self, lot_id: LotIdRef) -> Option<LotCell> {
        self.lots.read().get(lot_id).cloned()
    }

    fn cells(&self) -> Vec<LotCell> {
        self.lots.read().values().cloned().collect()
    }

    fn allocate_bid_id(&self) -> BidId {
        BidId(self.next_bid_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

impl Persistence for InMemoryPersistence {
    type Transaction<'a> = InMemoryTransaction<'a>;

    fn begin<'a>(&'a self, lot_id: LotIdRef) -> Result<InMemoryTransaction<'a>> {
        let guard = self.cell(lot_id).unwrap_or_default().lock_arc();
        let staged = guard.clone();
        Ok(InMemoryTransaction {
            persistence: self,
            guard,
            staged,
        })
    }

    fn create_lot(&self, lot: &Lot) -> Result<bool> {
        let mut lots = self.lots.write();
        if lots.contains_key(&lot.id) {
            return Ok(false);
        }
        lots.insert(
            lot.id.clone(),
            Arc::new(Mutex::new(Some(LotRecord {
                lot: lot.clone(),
                bids: vec![],
            }))),
        );
        Ok(true)
    }

    fn delete_lot(&self, lot_id: LotIdRef) -> Result<bool> {
        let Some(cell) = self.lots.write().remove(lot_id) else {
            return Ok(false);
        };
        // waits for a transaction in flight, then drops the bids with the lot
        let deleted = cell.lock().take().is_some();
        Ok(deleted)
    }

    fn load_lot(&self, lot_id: LotIdRef) -> Result<Option<Lot>> {
        Ok(self
            .cell(lot_id)
            .and_then(|cell| read_cell(&cell, |record| record.lot.clone())))
    }

    fn list_lots(&self) -> Result<Vec<Lot>> {
        Ok(self
            .cells()
            .iter()
            .filter_map(|cell| read_cell(cell, |record| record.lot.clone()))
            .collect())
    }

    fn bids_for_lot(&self, lot_id: LotIdRef) -> Result<Vec<Bid>> {
        Ok(self
            .cell(lot_id)
            .and_then(|cell| read_cell(&cell, LotRecord::ranked_bids))
            .unwrap_or_default())
    }

    fn bids_for_bidder(&self, bidder: BidderIdentityRef) -> Result<Vec<Bid>> {
        let mut bids = vec![];
        for cell in self.cells() {
            if let Some(ranked) = read_cell(&cell, LotRecord::ranked_bids) {
                bids.extend(ranked.into_iter().filter(|bid| bid.is_owned_by(bidder)));
            }
        }
        Ok(bids)
    }

    fn find_bid(&self, bid_id: BidId) -> Result<Option<Bid>> {
        Ok(self.cells().iter().find_map(|cell| {
            read_cell(cell, |record| {
                record.bids.iter().find(|bid| bid.id == bid_id).cloned()
            })
            .flatten()
        }))
    }
}

/// Holds the lot's mutex and a private copy of its record
///
/// Writes go to the copy and replace the shared record on commit, so a
/// rollback (or a drop) leaves the lot untouched.
pub struct InMemoryTransaction<'a> {
    persistence: &'a InMemoryPersistence,
    guard: ArcMutexGuard<RawMutex, Option<LotRecord>>,
    staged: Option<LotRecord>,
}

impl<'a> InMemoryTransaction<'a> {
    fn record(&mut self) -> Result<&mut LotRecord> {
        self.staged
            .as_mut()
            .ok_or_else(|| format_err!("lot does not exist"))
    }
}

impl<'a> LotTransaction for InMemoryTransaction<'a> {
    fn lot(&mut self) -> Result<Option<Lot>> {
        Ok(self.staged.as_ref().map(|record| record.lot.clone()))
    }

    fn bids(&mut self) -> Result<Vec<Bid>> {
        Ok(self
            .staged
            .as_ref()
            .map(LotRecord::ranked_bids)
            .unwrap_or_default())
    }

    fn insert_bid(&mut self, bid: NewBid) -> Result<Bid> {
        let id = self.persistence.allocate_bid_id();
        let record = self.record()?;
        ensure!(
            record.lot.id == bid.lot_id,
            "bid for lot {} inserted into lot {}",
            bid.lot_id,
            record.lot.id
        );
        let bid = bid.into_bid(id);
        record.bids.push(bid.clone());
        Ok(bid)
    }

    fn delete_bid(&mut self, bid_id: BidId) -> Result<bool> {
        let record = self.record()?;
        let before = record.bids.len();
        record.bids.retain(|bid| bid.id != bid_id);
        Ok(record.bids.len() != before)
    }

    fn store_leader(&mut self, leader: &Leader) -> Result<()> {
        self.record()?.lot.apply_leader(leader.clone());
        Ok(())
    }

    fn commit(self) -> Result<()> {
        let Self {
            mut guard, staged, ..
        } = self;
        *guard = staged;
        Ok(())
    }

    fn rollback(self) -> Result<()> {
        Ok(())
    }
}
