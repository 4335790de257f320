use crate::auction::Amount;
use crate::ledger::BidRules;
use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::str::FromStr;

pub const ENV_CONFIG_FILE: &str = "BIDLEDGER_CONFIG";
pub const ENV_PRICE_STEP: &str = "BIDLEDGER_PRICE_STEP";
pub const ENV_PRICE_CEILING: &str = "BIDLEDGER_PRICE_CEILING";
pub const ENV_LISTEN_ADDR: &str = "BIDLEDGER_LISTEN_ADDR";
pub const ENV_DATABASE_URL: &str = "BIDLEDGER_DATABASE_URL";
pub const ENV_LOG: &str = "BIDLEDGER_LOG";

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Every bid price must be a multiple of this
    pub price_step: Amount,
    /// Hard upper bound for a single bid price
    pub price_ceiling: Amount,
    pub listen_addr: SocketAddr,
    /// Postgres connection string; the in-memory store is used when unset
    pub database_url: Option<String>,
    /// Fallback `tracing` filter when `RUST_LOG` is not set
    pub log_filter: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            price_step: 10,
            price_ceiling: 100_000_000,
            listen_addr: SocketAddr::from(([0, 0, 0, 0], 3000)),
            database_url: None,
            log_filter: "info".to_owned(),
        }
    }
}

impl Config {
    /// Load from the process environment
    ///
    /// `BIDLEDGER_CONFIG` may point at a JSON file that replaces the
    /// defaults; individual `BIDLEDGER_*` variables override both.
    pub fn from_env() -> Result<Self> {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Result<Self> {
        let vars: HashMap<String, String> = vars.into_iter().collect();

        let mut config = match vars.get(ENV_CONFIG_FILE) {
            Some(path) => Self::from_json_file(path)?,
            None => Self::default(),
        };

        if let Some(step) = vars.get(ENV_PRICE_STEP) {
            config.price_step = parse_var(ENV_PRICE_STEP, step)?;
        }
        if let Some(ceiling) = vars.get(ENV_PRICE_CEILING) {
            config.price_ceiling = parse_var(ENV_PRICE_CEILING, ceiling)?;
        }
        if let Some(addr) = vars.get(ENV_LISTEN_ADDR) {
            config.listen_addr = parse_var(ENV_LISTEN_ADDR, addr)?;
        }
        if let Some(url) = vars.get(ENV_DATABASE_URL) {
            config.database_url = Some(url.clone()).filter(|url| !url.is_empty());
        }
        if let Some(filter) = vars.get(ENV_LOG) {
            config.log_filter = filter.clone();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.price_step >= 1, "price step must be at least 1");
        ensure!(
            self.price_step <= self.price_ceiling,
            "price ceiling {} is below the price step {}",
            self.price_ceiling,
            self.price_step
        );
        Ok(())
    }

    pub fn bid_rules(&self) -> BidRules {
        BidRules {
            price_step: self.price_step,
            price_ceiling: self.price_ceiling,
        }
    }
}

fn parse_var<T>(name: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    value
        .trim()
        .parse()
        .with_context(|| format!("Invalid value for {name}: {value:?}"))
}
