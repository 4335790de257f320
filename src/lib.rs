//! Bid settlement and visibility engine for blind, multi-unit auctions.
pub mod allocation;
pub mod auction;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod http;
pub mod ledger;
pub mod notify;
pub mod persistence;
pub mod repair;
pub mod visibility;

pub use self::engine::Engine;
pub use self::error::{BidRejection, Error, Result};
