use super::{start_time, Fixture};
use crate::{
    auction::{Leader, NewLot},
    config::Config,
    error::Error,
    ledger::BidRequest,
    notify::ChangeAction,
    persistence::Persistence,
    visibility::{PriceDisplay, Viewer},
};
use anyhow::Result;
use chrono::Duration;

fn winners(f: &Fixture, lot_id: &str) -> Result<Vec<(String, u32)>> {
    Ok(f.engine
        .resolve(lot_id)?
        .into_iter()
        .map(|award| (award.bid.bidder_display_name, award.units_awarded))
        .collect())
}

/// A places 110, B places 130 for both units, C ties B's price later on
fn tied_lot(f: &Fixture) -> Result<()> {
    f.lot("L", 100, 2)?;
    f.engine.place("L", "a", &BidRequest::new(110, 1, "A"))?;
    f.tick();
    f.engine.place("L", "b", &BidRequest::new(130, 2, "B"))?;
    // an equal price can only enter the ledger through the store itself
    f.seed_bid("L", 130, 1, "C", start_time() + Duration::minutes(5))?;
    Ok(())
}

#[test]
fn tie_goes_to_the_earlier_bid() -> Result<()> {
    let f = Fixture::new();
    tied_lot(&f)?;

    let lot = f.stored_lot("L")?;
    assert_eq!(lot.current_bid, 130);
    assert_eq!(lot.leading_bidder_name.as_deref(), Some("B"));

    f.close_lots();
    assert!(!f.engine.is_inconsistent("L")?);
    assert_eq!(winners(&f, "L")?, vec![("B".to_owned(), 2)]);
    assert_eq!(f.engine.aggregate("L")?, PriceDisplay::Revealed(260));
    Ok(())
}

#[test]
fn removing_the_winner_after_close() -> Result<()> {
    let f = Fixture::new();
    tied_lot(&f)?;
    f.close_lots();

    let b = f
        .engine
        .persistence()
        .bids_for_bidder("b")?
        .pop()
        .expect("B's bid");
    f.engine.remove(&Viewer::admin("root"), b.id)?;

    assert_eq!(
        f.stored_lot("L")?.cached_leader(),
        Leader {
            price: 130,
            bidder_name: Some("C".to_owned())
        }
    );
    assert_eq!(
        winners(&f, "L")?,
        vec![("C".to_owned(), 1), ("A".to_owned(), 1)]
    );
    assert_eq!(f.engine.aggregate("L")?, PriceDisplay::Revealed(240));
    assert_eq!(f.engine.consistency_faults(), 0);
    Ok(())
}

#[test]
fn unsold_lot_at_close() -> Result<()> {
    let f = Fixture::new();
    f.lot("L", 100, 2)?;
    f.close_lots();

    assert!(f.engine.resolve("L")?.is_empty());
    assert_eq!(f.stored_lot("L")?.cached_leader(), Leader::of_empty_lot(100));
    assert_eq!(f.engine.aggregate("L")?, PriceDisplay::Revealed(0));

    let settlement = f.engine.settlement("L")?;
    assert!(settlement.is_unsold());
    assert_eq!(settlement.units_unsold, 2);
    Ok(())
}

#[test]
fn winners_stay_hidden_while_open() -> Result<()> {
    let f = Fixture::new();
    f.lot("L", 100, 1)?;
    f.engine.place("L", "a", &BidRequest::new(110, 1, "A"))?;

    assert!(matches!(f.engine.resolve("L"), Err(Error::LotStillOpen(_))));
    assert!(matches!(f.engine.settlement("L"), Err(Error::LotStillOpen(_))));
    assert!(f.engine.aggregate("L")?.is_masked());
    assert!(matches!(f.engine.resolve("nope"), Err(Error::LotNotFound(_))));
    Ok(())
}

#[test]
fn settlement_is_rebuilt_from_the_ledger() -> Result<()> {
    let f = Fixture::new();
    f.lot("L", 0, 3)?;
    f.engine.place("L", "a", &BidRequest::new(100, 2, "A"))?;
    f.tick();
    f.engine.place("L", "b", &BidRequest::new(120, 2, "B"))?;
    f.close_lots();

    let settlement = f.engine.settlement("L")?;
    assert_eq!(settlement.units_sold, 3);
    assert_eq!(settlement.units_unsold, 0);
    assert_eq!(settlement.total, 120 * 2 + 100);
    assert_eq!(settlement, f.engine.settlement("L")?);

    let exported = serde_json::to_value(&settlement)?;
    assert_eq!(exported["lotId"], "L");
    assert_eq!(exported["awards"][0]["unitsAwarded"], 2);
    assert_eq!(exported["awards"][0]["bid"]["bidderDisplayName"], "B");
    Ok(())
}

#[test]
fn lot_lifecycle() -> Result<()> {
    let f = Fixture::new();
    let lot = f.lot("L", 100, 2)?;
    assert_eq!(lot.current_bid, 100);
    assert_eq!(lot.leading_bidder_name, None);

    assert!(f.lot("L", 100, 2).is_err());
    assert!(matches!(
        f.engine.create_lot(NewLot {
            id: "zero".to_owned(),
            starting_price: 100,
            unit_quantity: 0,
            close_time: None,
        }),
        Err(Error::InvalidLot(_))
    ));

    f.engine.place("L", "a", &BidRequest::new(110, 1, "A"))?;
    assert!(matches!(
        f.engine.delete_lot(&Viewer::bidder("a"), "L"),
        Err(Error::Forbidden)
    ));
    f.engine.delete_lot(&Viewer::admin("root"), "L")?;

    assert!(f.engine.persistence().load_lot("L")?.is_none());
    assert!(f.engine.persistence().bids_for_bidder("a")?.is_empty());
    assert!(matches!(
        f.engine.delete_lot(&Viewer::admin("root"), "L"),
        Err(Error::LotNotFound(_))
    ));
    assert_eq!(
        f.notifier.take().iter().map(|n| n.action).collect::<Vec<_>>(),
        vec![ChangeAction::Added, ChangeAction::Bid, ChangeAction::Deleted]
    );
    Ok(())
}

#[test]
fn config_from_vars() -> Result<()> {
    let config = Config::from_vars(vec![
        ("BIDLEDGER_PRICE_STEP".to_owned(), "25".to_owned()),
        ("BIDLEDGER_LISTEN_ADDR".to_owned(), "127.0.0.1:8080".to_owned()),
        ("BIDLEDGER_DATABASE_URL".to_owned(), "".to_owned()),
        ("UNRELATED".to_owned(), "x".to_owned()),
    ])?;
    assert_eq!(config.price_step, 25);
    assert_eq!(config.price_ceiling, Config::default().price_ceiling);
    assert_eq!(config.listen_addr.port(), 8080);
    assert_eq!(config.database_url, None);
    assert_eq!(config.bid_rules().price_step, 25);

    assert!(Config::from_vars(vec![("BIDLEDGER_PRICE_STEP".to_owned(), "0".to_owned())]).is_err());
    assert!(Config::from_vars(vec![("BIDLEDGER_PRICE_CEILING".to_owned(), "ten".to_owned())]).is_err());
    Ok(())
}

#[test]
fn config_file_is_overridden_by_env() -> Result<()> {
    let path = std::env::temp_dir().join(format!("bidledger-config-{}.json", std::process::id()));
    std::fs::write(&path, r#"{ "price_step": 5, "log_filter": "debug" }"#)?;

    let config = Config::from_vars(vec![
        ("BIDLEDGER_CONFIG".to_owned(), path.display().to_string()),
        ("BIDLEDGER_LOG".to_owned(), "warn".to_owned()),
    ])?;
    std::fs::remove_file(&path)?;

    assert_eq!(config.price_step, 5);
    assert_eq!(config.log_filter, "warn");
    Ok(())
}
