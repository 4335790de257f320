//! Bid Ledger
//!
//! Appending and (administratively) removing bids, and keeping the lot's
//! cached leader in step with it.
use crate::allocation;
use crate::auction::{Amount, Bid, BidId, BidderIdentityRef, Leader, Lot, LotIdRef, NewBid, Units};
use crate::engine::Engine;
use crate::error::{BidRejection, Error, Result};
use crate::notify::ChangeAction;
use crate::persistence::{LotTransaction, Persistence};
use crate::visibility::Viewer;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BidRules {
    pub price_step: Amount,
    pub price_ceiling: Amount,
}

/// What a bidder submits; their identity comes from the caller's session
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BidRequest {
    pub price: Amount,
    pub units_requested: Units,
    pub bidder_display_name: String,
}

impl BidRequest {
    pub fn new(price: Amount, units_requested: Units, bidder_display_name: impl Into<String>) -> Self {
        Self {
            price,
            units_requested,
            bidder_display_name: bidder_display_name.into(),
        }
    }
}

impl BidRules {
    /// Checks a bid against the lot as it is right now, in a fixed order
    pub fn validate(
        &self,
        lot: Option<&Lot>,
        request: &BidRequest,
        now: DateTime<Utc>,
    ) -> Result<(), BidRejection> {
        use BidRejection::*;

        let lot = lot.ok_or(LotNotFound)?;
        if !lot.is_open(now) {
            return Err(LotClosed);
        }
        if request.price == 0 || request.price % self.price_step != 0 {
            return Err(InvalidPriceGranularity {
                step: self.price_step,
            });
        }
        if request.price <= lot.current_bid {
            return Err(BidTooLow {
                current: lot.current_bid,
            });
        }
        if self.price_ceiling < request.price {
            return Err(BidTooHigh {
                ceiling: self.price_ceiling,
            });
        }
        if request.units_requested < 1 || lot.unit_quantity < request.units_requested {
            return Err(InvalidQuantity {
                max: lot.unit_quantity,
            });
        }
        if request.bidder_display_name.trim().is_empty() {
            return Err(MissingBidderName);
        }
        Ok(())
    }
}

impl<P> Engine<P>
where
    P: Persistence,
{
    /// Append a bid to a lot's ledger
    ///
    /// The price check and the leader update happen inside the lot's
    /// exclusive scope. The new bid is the leader by construction, so the
    /// cache is set from it directly.
    pub fn place(
        &self,
        lot_id: LotIdRef,
        bidder_identity: BidderIdentityRef,
        request: &BidRequest,
    ) -> Result<Bid> {
        let now = self.now();
        let mut transaction = self.persistence.begin(lot_id)?;
        let lot = transaction.lot()?;

        if let Err(rejection) = self.rules.validate(lot.as_ref(), request, now) {
            debug!(%lot_id, price = request.price, reason = rejection.kind(), "bid rejected");
            transaction.rollback()?;
            return Err(rejection.into());
        }

        let bid = transaction.insert_bid(NewBid {
            lot_id: lot_id.to_owned(),
            price: request.price,
            units_requested: request.units_requested,
            bidder_display_name: request.bidder_display_name.trim().to_owned(),
            bidder_identity: bidder_identity.to_owned(),
            created_at: now,
        })?;
        transaction.store_leader(&Leader::of_bid(&bid))?;
        transaction.commit()?;

        debug!(%lot_id, bid_id = %bid.id, price = bid.price, units = bid.units_requested, "bid placed");
        self.publish(lot_id, ChangeAction::Bid);
        Ok(bid)
    }

    /// Administrative removal of a bid
    ///
    /// The lot's leader is recomputed from the remaining ledger in the
    /// same exclusive scope as the delete.
    pub fn remove(&self, viewer: &Viewer, bid_id: BidId) -> Result<()> {
        if !viewer.is_admin {
            return Err(Error::Forbidden);
        }
        let bid = self
            .persistence
            .find_bid(bid_id)?
            .ok_or(Error::BidNotFound(bid_id))?;

        let mut transaction = self.persistence.begin(&bid.lot_id)?;
        if !transaction.delete_bid(bid_id)? {
            // removed concurrently
            transaction.rollback()?;
            return Err(Error::BidNotFound(bid_id));
        }
        let lot = transaction
            .lot()?
            .ok_or_else(|| Error::LotNotFound(bid.lot_id.clone()))?;
        let leader = allocation::expected_leader(&lot, &transaction.bids()?);
        transaction.store_leader(&leader)?;
        transaction.commit()?;

        info!(
            lot_id = %bid.lot_id,
            %bid_id,
            current_bid = leader.price,
            leader = ?leader.bidder_name,
            "bid removed"
        );
        self.publish(&bid.lot_id, ChangeAction::Bid);
        Ok(())
    }
}
