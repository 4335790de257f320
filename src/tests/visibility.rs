use super::{bid, start_time, Fixture};
use crate::{
    auction::{LotState, NewLot},
    ledger::BidRequest,
    visibility::{mask_amount, visible_bids, PriceDisplay, Summary, Viewer},
};
use chrono::Duration;
use anyhow::Result;

#[test]
fn masking_keeps_only_the_shape() {
    assert_eq!(mask_amount(0), "*");
    assert_eq!(mask_amount(12_340), "*****");
    assert_eq!(PriceDisplay::new(LotState::Open, 260).revealed(), None);
    assert_eq!(PriceDisplay::new(LotState::Closed, 260).revealed(), Some(260));
}

#[test]
fn open_lot_shows_only_own_bids() {
    let bids = vec![bid(1, 110, 1, "A", 0), bid(2, 130, 1, "B", 1)];

    assert!(visible_bids(&Viewer::anonymous(), LotState::Open, &bids).is_empty());
    assert!(visible_bids(&Viewer::bidder("c"), LotState::Open, &bids).is_empty());
    assert!(visible_bids(&Viewer::admin("root"), LotState::Open, &bids).is_empty());

    let own = visible_bids(&Viewer::bidder("a"), LotState::Open, &bids);
    assert_eq!(own.iter().map(|bid| bid.id.0).collect::<Vec<_>>(), vec![1]);
}

#[test]
fn closed_lot_shows_every_bid_in_rank_order() {
    let bids = vec![
        bid(1, 110, 1, "A", 0),
        bid(2, 130, 1, "B", 5),
        bid(3, 130, 1, "C", 1),
    ];

    let all = visible_bids(&Viewer::anonymous(), LotState::Closed, &bids);
    assert_eq!(all.iter().map(|bid| bid.id.0).collect::<Vec<_>>(), vec![3, 2, 1]);
}

#[test]
fn lot_view_is_blind_until_close() -> Result<()> {
    let f = Fixture::new();
    f.lot("lot", 100, 2)?;
    f.engine.place("lot", "alice", &BidRequest::new(110, 1, "Alice"))?;
    f.tick();
    f.engine.place("lot", "bob", &BidRequest::new(130, 2, "Bob"))?;

    for viewer in [Viewer::anonymous(), Viewer::bidder("carol"), Viewer::admin("root")] {
        let view = f.engine.view_lot(&viewer, "lot")?;
        assert_eq!(view.state, LotState::Open);
        assert_eq!(view.total_bids_count, 2);
        assert_eq!(view.my_bids_count, 0);
        assert!(view.bids.is_empty());
        assert_eq!(view.aggregate, PriceDisplay::Masked("***".to_owned()));
        assert!(view.current_bid.is_masked());
        assert_eq!(view.leading_bidder_name, None);
    }

    let alice = f.engine.view_lot(&Viewer::bidder("alice"), "lot")?;
    assert_eq!(alice.my_bids_count, 1);
    assert_eq!(alice.bids.len(), 1);
    assert_eq!(alice.bids[0].price, 110);

    f.close_lots();
    let view = f.engine.view_lot(&Viewer::anonymous(), "lot")?;
    assert_eq!(view.state, LotState::Closed);
    assert_eq!(view.bids.len(), 2);
    assert_eq!(view.bids[0].bidder_display_name, "Bob");
    assert_eq!(view.aggregate, PriceDisplay::Revealed(260));
    assert_eq!(view.current_bid, PriceDisplay::Revealed(130));
    assert_eq!(view.leading_bidder_name.as_deref(), Some("Bob"));
    Ok(())
}

#[test]
fn own_bids_across_lots() -> Result<()> {
    let f = Fixture::new();
    f.lot("a", 0, 1)?;
    f.lot("b", 0, 1)?;
    f.engine.place("a", "alice", &BidRequest::new(10, 1, "Alice"))?;
    f.engine.place("b", "bob", &BidRequest::new(10, 1, "Bob"))?;
    f.engine.place("b", "alice", &BidRequest::new(20, 1, "Alice"))?;

    let mine = f.engine.bids_of(&Viewer::bidder("alice"))?;
    assert_eq!(mine.len(), 2);
    assert!(mine.iter().all(|bid| bid.bidder_identity == "alice"));
    assert!(f.engine.bids_of(&Viewer::anonymous())?.is_empty());
    Ok(())
}

#[test]
fn summary_reveals_closed_totals_only() -> Result<()> {
    let f = Fixture::new();
    f.lot("early", 0, 2)?;
    f.engine.create_lot(crate::auction::NewLot {
        id: "late".to_owned(),
        starting_price: 0,
        unit_quantity: 1,
        close_time: Some(super::start_time() + chrono::Duration::hours(3)),
    })?;
    f.engine.place("early", "alice", &BidRequest::new(50, 2, "Alice"))?;
    f.engine.place("late", "bob", &BidRequest::new(70, 1, "Bob"))?;

    f.close_lots();
    let summary = f.engine.summary(&Viewer::bidder("alice"))?;
    assert_eq!(summary.open_lots, 1);
    assert_eq!(summary.closed_lots, 1);
    assert_eq!(summary.total_bids_count, 2);
    assert_eq!(summary.my_bids_count, 1);
    assert_eq!(summary.closed_lots_total, 100);
    assert_eq!(summary.all_lots_total, PriceDisplay::Masked("***".to_owned()));

    f.clock.set(super::start_time() + chrono::Duration::hours(4));
    let summary = f.engine.summary(&Viewer::anonymous())?;
    assert_eq!(summary.all_lots_total, PriceDisplay::Revealed(170));
    assert_eq!(summary.closed_lots_total, 170);
    Ok(())
}

#[test]
fn bulk_lot_reads_without_expanding_units() -> Result<()> {
    let f = Fixture::new();
    f.lot("bulk", 0, 1_000_000_000)?;
    f.engine
        .place("bulk", "a", &BidRequest::new(10, 1_000_000_000, "A"))?;
    f.tick();
    f.engine
        .place("bulk", "b", &BidRequest::new(20, 400_000_000, "B"))?;

    let view = f.engine.view_lot(&Viewer::anonymous(), "bulk")?;
    assert_eq!(view.aggregate, PriceDisplay::Masked(mask_amount(14_000_000_000)));

    f.close_lots();
    let expected = 20 * 400_000_000 + 10 * 600_000_000;
    assert_eq!(f.engine.aggregate("bulk")?, PriceDisplay::Revealed(expected));
    assert_eq!(f.engine.settlement("bulk")?.total, expected);
    assert_eq!(f.engine.summary(&Viewer::anonymous())?.closed_lots_total, expected);
    Ok(())
}

#[test]
fn summary_totals_saturate() {
    let lot = |id: &str| {
        NewLot {
            id: id.to_owned(),
            starting_price: 0,
            unit_quantity: 2,
            close_time: Some(start_time()),
        }
        .into_lot()
    };
    let ledger = vec![bid(1, u64::MAX / 2, 2, "A", 0)];
    let ledgers = vec![(lot("x"), ledger.clone()), (lot("y"), ledger)];

    let summary = Summary::build(&Viewer::anonymous(), &ledgers, start_time() + Duration::hours(1));
    assert_eq!(summary.closed_lots_total, u64::MAX);
    assert_eq!(summary.all_lots_total, PriceDisplay::Revealed(u64::MAX));
}
