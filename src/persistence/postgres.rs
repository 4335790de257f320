use super::*;
use crate::auction::{Amount, LotId, Units};
use anyhow::{ensure, Context};
use r2d2_postgres::postgres::{Config, NoTls, Row};
use r2d2_postgres::PostgresConnectionManager;
use std::marker::PhantomData;
use tracing::warn;

pub type PostgresPool = r2d2::Pool<PostgresConnectionManager<NoTls>>;
pub type PostgresConnection = r2d2::PooledConnection<PostgresConnectionManager<NoTls>>;

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS lots (
    id TEXT PRIMARY KEY,
    starting_price BIGINT NOT NULL CHECK (starting_price >= 0),
    unit_quantity INTEGER NOT NULL CHECK (unit_quantity >= 1),
    close_time TIMESTAMPTZ,
    current_bid BIGINT NOT NULL,
    leading_bidder_name TEXT
);
CREATE TABLE IF NOT EXISTS bids (
    id BIGSERIAL PRIMARY KEY,
    lot_id TEXT NOT NULL REFERENCES lots (id) ON DELETE CASCADE,
    price BIGINT NOT NULL,
    units_requested INTEGER NOT NULL,
    bidder_display_name TEXT NOT NULL,
    bidder_identity TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL
);
CREATE INDEX IF NOT EXISTS bids_lot_rank ON bids (lot_id, price DESC, created_at ASC, id ASC);
CREATE INDEX IF NOT EXISTS bids_bidder ON bids (bidder_identity);
"#;

const LOT_COLUMNS: &str =
    "id, starting_price, unit_quantity, close_time, current_bid, leading_bidder_name";
const BID_COLUMNS: &str =
    "id, lot_id, price, units_requested, bidder_display_name, bidder_identity, created_at";
const BID_ORDER: &str = "ORDER BY price DESC, created_at ASC, id ASC";

#[derive(Clone)]
pub struct PostgresPersistence {
    pool: PostgresPool,
}

impl PostgresPersistence {
    pub fn new(pool: PostgresPool) -> Self {
        Self { pool }
    }

    pub fn connect(url: &str) -> Result<Self> {
        let config: Config = url.parse().context("Invalid postgres connection string")?;
        let manager = PostgresConnectionManager::new(config, NoTls);
        let pool = r2d2::Pool::new(manager).context("Failed to build postgres pool")?;
        Ok(Self::new(pool))
    }

    /// Create the tables if they are missing
    pub fn migrate(&self) -> Result<()> {
        self.pool.get()?.batch_execute(SCHEMA)?;
        Ok(())
    }
}

fn to_amount(value: i64) -> Result<Amount> {
    Ok(Amount::try_from(value)?)
}

fn from_amount(amount: Amount) -> Result<i64> {
    Ok(i64::try_from(amount)?)
}

fn lot_from_row(row: &Row) -> Result<Lot> {
    Ok(Lot {
        id: row.try_get("id")?,
        starting_price: to_amount(row.try_get("starting_price")?)?,
        unit_quantity: Units::try_from(row.try_get::<_, i32>("unit_quantity")?)?,
        close_time: row.try_get("close_time")?,
        current_bid: to_amount(row.try_get("current_bid")?)?,
        leading_bidder_name: row.try_get("leading_bidder_name")?,
    })
}

fn bid_from_row(row: &Row) -> Result<Bid> {
    Ok(Bid {
        id: BidId(u64::try_from(row.try_get::<_, i64>("id")?)?),
        lot_id: row.try_get("lot_id")?,
        price: to_amount(row.try_get("price")?)?,
        units_requested: Units::try_from(row.try_get::<_, i32>("units_requested")?)?,
        bidder_display_name: row.try_get("bidder_display_name")?,
        bidder_identity: row.try_get("bidder_identity")?,
        created_at: row.try_get("created_at")?,
    })
}

fn bids_from_rows(rows: &[Row]) -> Result<Vec<Bid>> {
    rows.iter().map(bid_from_row).collect()
}

impl Persistence for PostgresPersistence {
    type Transaction<'a> = PostgresTransaction<'a>;

    fn begin<'a>(&'a self, lot_id: LotIdRef) -> Result<PostgresTransaction<'a>> {
        let mut conn = self.pool.get()?;
        conn.batch_execute("BEGIN")?;
        let mut transaction = PostgresTransaction {
            conn,
            lot_id: lot_id.to_owned(),
            open: true,
            _persistence: PhantomData,
        };
        // the row lock is the per-lot exclusive scope
        transaction
            .conn
            .query_opt("SELECT id FROM lots WHERE id = $1 FOR UPDATE", &[&lot_id])?;
        Ok(transaction)
    }

    fn create_lot(&self, lot: &Lot) -> Result<bool> {
        let inserted = self.pool.get()?.execute(
            "INSERT INTO lots (id, starting_price, unit_quantity, close_time, current_bid, leading_bidder_name) \
             VALUES ($1, $2, $3, $4, $5, $6) ON CONFLICT (id) DO NOTHING",
            &[
                &lot.id,
                &from_amount(lot.starting_price)?,
                &i32::try_from(lot.unit_quantity)?,
                &lot.close_time,
                &from_amount(lot.current_bid)?,
                &lot.leading_bidder_name,
            ],
        )?;
        Ok(inserted == 1)
    }

    fn delete_lot(&self, lot_id: LotIdRef) -> Result<bool> {
        let deleted = self
            .pool
            .get()?
            .execute("DELETE FROM lots WHERE id = $1", &[&lot_id])?;
        Ok(deleted == 1)
    }

    fn load_lot(&self, lot_id: LotIdRef) -> Result<Option<Lot>> {
        let query = format!("SELECT {LOT_COLUMNS} FROM lots WHERE id = $1");
        self.pool
            .get()?
            .query_opt(query.as_str(), &[&lot_id])?
            .as_ref()
            .map(lot_from_row)
            .transpose()
    }

    fn list_lots(&self) -> Result<Vec<Lot>> {
        let query = format!("SELECT {LOT_COLUMNS} FROM lots ORDER BY id");
        self.pool
            .get()?
            .query(query.as_str(), &[])?
            .iter()
            .map(lot_from_row)
            .collect()
    }

    fn bids_for_lot(&self, lot_id: LotIdRef) -> Result<Vec<Bid>> {
        let query = format!("SELECT {BID_COLUMNS} FROM bids WHERE lot_id = $1 {BID_ORDER}");
        bids_from_rows(&self.pool.get()?.query(query.as_str(), &[&lot_id])?)
    }

    fn bids_for_bidder(&self, bidder: BidderIdentityRef) -> Result<Vec<Bid>> {
        let query = format!(
            "SELECT {BID_COLUMNS} FROM bids WHERE bidder_identity = $1 \
             ORDER BY lot_id, price DESC, created_at ASC, id ASC"
        );
        bids_from_rows(&self.pool.get()?.query(query.as_str(), &[&bidder])?)
    }

    fn find_bid(&self, bid_id: BidId) -> Result<Option<Bid>> {
        let query = format!("SELECT {BID_COLUMNS} FROM bids WHERE id = $1");
        let id = i64::try_from(bid_id.0)?;
        self.pool
            .get()?
            .query_opt(query.as_str(), &[&id])?
            .as_ref()
            .map(bid_from_row)
            .transpose()
    }
}

/// A database transaction holding the row lock of one lot
///
/// Owns its pooled connection, so `BEGIN`/`COMMIT` are issued by hand.
/// Dropped while still open, it rolls back.
pub struct PostgresTransaction<'a> {
    conn: PostgresConnection,
    lot_id: LotId,
    open: bool,
    _persistence: PhantomData<&'a PostgresPersistence>,
}

impl<'a> PostgresTransaction<'a> {
    fn finish(&mut self, statement: &str) -> Result<()> {
        self.open = false;
        self.conn.batch_execute(statement)?;
        Ok(())
    }
}

impl<'a> LotTransaction for PostgresTransaction<'a> {
    fn lot(&mut self) -> Result<Option<Lot>> {
        let query = format!("SELECT {LOT_COLUMNS} FROM lots WHERE id = $1");
        self.conn
            .query_opt(query.as_str(), &[&self.lot_id])?
            .as_ref()
            .map(lot_from_row)
            .transpose()
    }

    fn bids(&mut self) -> Result<Vec<Bid>> {
        let query = format!("SELECT {BID_COLUMNS} FROM bids WHERE lot_id = $1 {BID_ORDER}");
        bids_from_rows(&self.conn.query(query.as_str(), &[&self.lot_id])?)
    }

    fn insert_bid(&mut self, bid: NewBid) -> Result<Bid> {
        ensure!(
            bid.lot_id == self.lot_id,
            "bid for lot {} inserted into lot {}",
            bid.lot_id,
            self.lot_id
        );
        let query = format!(
            "INSERT INTO bids (lot_id, price, units_requested, bidder_display_name, bidder_identity, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {BID_COLUMNS}"
        );
        let row = self.conn.query_one(
            query.as_str(),
            &[
                &bid.lot_id,
                &from_amount(bid.price)?,
                &i32::try_from(bid.units_requested)?,
                &bid.bidder_display_name,
                &bid.bidder_identity,
                &bid.created_at,
            ],
        )?;
        bid_from_row(&row)
    }

    fn delete_bid(&mut self, bid_id: BidId) -> Result<bool> {
        let id = i64::try_from(bid_id.0)?;
        let deleted = self.conn.execute(
            "DELETE FROM bids WHERE id = $1 AND lot_id = $2",
            &[&id, &self.lot_id],
        )?;
        Ok(deleted == 1)
    }

    fn store_leader(&mut self, leader: &Leader) -> Result<()> {
        self.conn.execute(
            "UPDATE lots SET current_bid = $2, leading_bidder_name = $3 WHERE id = $1",
            &[&self.lot_id, &from_amount(leader.price)?, &leader.bidder_name],
        )?;
        Ok(())
    }

    fn commit(mut self) -> Result<()> {
        self.finish("COMMIT")
    }

    fn rollback(mut self) -> Result<()> {
        self.finish("ROLLBACK")
    }
}

impl<'a> Drop for PostgresTransaction<'a> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.conn.batch_execute("ROLLBACK") {
                warn!(lot_id = %self.lot_id, error = %e, "rollback on drop failed");
            }
        }
    }
}
