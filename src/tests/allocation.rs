use super::bid;
use crate::{
    allocation::{self, aggregate_sum, expected_leader, resolve, Award, Settlement},
    auction::{Bid, Leader, NewLot},
};
use proptest::prelude::*;

fn awarded(awards: &[Award]) -> Vec<(String, u32)> {
    awards
        .iter()
        .map(|award| (award.bid.bidder_display_name.clone(), award.units_awarded))
        .collect()
}

fn scenario() -> Vec<Bid> {
    vec![
        bid(1, 110, 1, "A", 0),
        bid(2, 130, 2, "B", 10),
        bid(3, 130, 1, "C", 20),
    ]
}

#[test]
fn earlier_bid_wins_a_price_tie() {
    let bids = scenario();

    assert_eq!(allocation::leader(&bids).map(|bid| bid.id.0), Some(2));
    assert_eq!(awarded(&resolve(&bids, 2)), vec![("B".to_owned(), 2)]);
    assert_eq!(aggregate_sum(&bids, 2), 260);
}

#[test]
fn removing_the_leader_hands_units_down_the_ranking() {
    let bids: Vec<_> = scenario().into_iter().filter(|bid| bid.id.0 != 2).collect();

    assert_eq!(
        awarded(&resolve(&bids, 2)),
        vec![("C".to_owned(), 1), ("A".to_owned(), 1)]
    );
    assert_eq!(aggregate_sum(&bids, 2), 240);
}

#[test]
fn empty_ledger_awards_nothing() {
    let lot = NewLot {
        id: "lot".to_owned(),
        starting_price: 100,
        unit_quantity: 3,
        close_time: None,
    }
    .into_lot();

    assert!(resolve(&[], 3).is_empty());
    assert_eq!(aggregate_sum(&[], 3), 0);
    assert_eq!(expected_leader(&lot, &[]), Leader::of_empty_lot(100));

    let settlement = Settlement::from_ledger(&lot, &[]);
    assert!(settlement.is_unsold());
    assert_eq!(settlement.units_unsold, 3);
    assert_eq!(settlement.total, 0);
}

#[test]
fn oversupply_awards_every_full_request() {
    let bids = scenario();
    let awards = resolve(&bids, 10);

    assert_eq!(
        awarded(&awards),
        vec![("B".to_owned(), 2), ("C".to_owned(), 1), ("A".to_owned(), 1)]
    );

    let lot = NewLot {
        id: "lot".to_owned(),
        starting_price: 100,
        unit_quantity: 10,
        close_time: None,
    }
    .into_lot();
    let settlement = Settlement::from_ledger(&lot, &bids);
    assert_eq!(settlement.units_sold, 4);
    assert_eq!(settlement.units_unsold, 6);
    assert_eq!(settlement.total, 130 * 2 + 130 + 110);
}

#[test]
fn partial_fill_of_the_last_winner() {
    let bids = vec![bid(1, 200, 3, "A", 0), bid(2, 150, 4, "B", 1)];

    assert_eq!(
        awarded(&resolve(&bids, 5)),
        vec![("A".to_owned(), 3), ("B".to_owned(), 2)]
    );
    assert_eq!(aggregate_sum(&bids, 5), 200 * 3 + 150 * 2);
}

#[test]
fn identical_price_and_time_falls_back_to_bid_id() {
    let bids = vec![bid(7, 100, 1, "Late", 0), bid(3, 100, 1, "Early", 0)];

    assert_eq!(
        allocation::leader(&bids).map(|bid| bid.bidder_display_name.as_str()),
        Some("Early")
    );
}

#[test]
fn aggregate_saturates_instead_of_overflowing() {
    let bids = vec![bid(1, u64::MAX / 2, 3, "A", 0), bid(2, 10, 1, "B", 1)];
    assert_eq!(aggregate_sum(&bids, 4), u64::MAX);
}

fn arb_ledger() -> impl Strategy<Value = Vec<Bid>> {
    prop::collection::vec((1u64..50, 1u32..6, 0i64..20), 0..12).prop_map(|entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(i, (price, units, at))| bid(i as u64 + 1, price * 10, units, &format!("B{i}"), at))
            .collect()
    })
}

proptest! {
    #[test]
    fn allocation_conserves_units(bids in arb_ledger(), unit_quantity in 1u32..15) {
        let awards = resolve(&bids, unit_quantity);
        let awarded: u32 = awards.iter().map(|award| award.units_awarded).sum();
        let requested: u32 = bids.iter().map(|bid| bid.units_requested).sum();

        prop_assert!(awarded <= unit_quantity);
        prop_assert_eq!(awarded, unit_quantity.min(requested));
        prop_assert!(awards.iter().all(|award| award.units_awarded > 0));
    }

    #[test]
    fn aggregate_matches_allocation(bids in arb_ledger(), unit_quantity in 1u32..15) {
        let from_awards: u64 = resolve(&bids, unit_quantity).iter().map(Award::amount).sum();
        prop_assert_eq!(aggregate_sum(&bids, unit_quantity), from_awards);
    }

    #[test]
    fn ranking_ignores_input_order(bids in arb_ledger(), unit_quantity in 1u32..15) {
        let mut reversed = bids.clone();
        reversed.reverse();

        prop_assert_eq!(resolve(&bids, unit_quantity), resolve(&reversed, unit_quantity));
        prop_assert_eq!(allocation::leader(&bids), allocation::leader(&reversed));
    }

    #[test]
    fn leader_heads_the_allocation(bids in arb_ledger(), unit_quantity in 1u32..15) {
        let awards = resolve(&bids, unit_quantity);
        prop_assert_eq!(awards.first().map(|award| &award.bid), allocation::leader(&bids));
    }
}
