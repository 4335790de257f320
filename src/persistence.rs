//! Storage traits
//!
//! Everything that must observe and change a lot atomically (a bid
//! placement checking `current_bid` and then moving it, a removal and
//! the leader recomputation that follows) runs inside a
//! [`LotTransaction`]. Opening one with [`Persistence::begin`] takes an
//! exclusive scope on that single lot; other lots are not affected.
//!
//! Plain reads outside of a transaction may observe a lot between two
//! committed writes, never in the middle of one.
pub mod in_memory;
pub mod postgres;

pub use self::in_memory::*;
pub use self::postgres::PostgresPersistence;

use crate::auction::{Bid, BidId, BidderIdentityRef, Leader, Lot, LotIdRef, NewBid};
use anyhow::Result;

/// An instance of a persistence (store) that holds lots and their ledgers
///
/// Must be thread-safe.
pub trait Persistence: Send + Sync {
    type Transaction<'a>: LotTransaction
    where
        Self: 'a;

    /// Open an exclusive scope on `lot_id`
    ///
    /// Blocks while another transaction holds the same lot. Succeeds for
    /// unknown lots too; [`LotTransaction::lot`] then returns `None`.
    fn begin<'a>(&'a self, lot_id: LotIdRef) -> Result<Self::Transaction<'a>>;

    /// Returns `false` if a lot with the same id already exists
    fn create_lot(&self, lot: &Lot) -> Result<bool>;

    /// Deletes the lot together with its bids. Returns `false` if it did not exist.
    fn delete_lot(&self, lot_id: LotIdRef) -> Result<bool>;

    fn load_lot(&self, lot_id: LotIdRef) -> Result<Option<Lot>>;

    fn list_lots(&self) -> Result<Vec<Lot>>;

    /// Bids of a lot, highest price first, earlier bids first at equal price
    fn bids_for_lot(&self, lot_id: LotIdRef) -> Result<Vec<Bid>>;

    /// Bids placed by `bidder` on any lot, same order as [`Persistence::bids_for_lot`]
    /// within each lot
    fn bids_for_bidder(&self, bidder: BidderIdentityRef) -> Result<Vec<Bid>>;

    fn find_bid(&self, bid_id: BidId) -> Result<Option<Bid>>;
}

/// Reads and writes on a single lot inside its exclusive scope
///
/// Dropping a transaction without committing discards its writes.
pub trait LotTransaction {
    fn lot(&mut self) -> Result<Option<Lot>>;

    fn bids(&mut self) -> Result<Vec<Bid>>;

    fn insert_bid(&mut self, bid: NewBid) -> Result<Bid>;

    /// Returns `false` if the bid is not part of this lot's ledger
    fn delete_bid(&mut self, bid_id: BidId) -> Result<bool>;

    fn store_leader(&mut self, leader: &Leader) -> Result<()>;

    fn commit(self) -> Result<()>;

    fn rollback(self) -> Result<()>;
}
