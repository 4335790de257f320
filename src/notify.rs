//! Change notifications
//!
//! Publishing is best-effort: a failed notification is logged by the
//! caller and never undoes the write that triggered it.
mod in_memory;

pub use self::in_memory::*;

use crate::auction::{LotId, LotIdRef};
use anyhow::Result;
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeAction {
    /// The ledger of a lot changed (placement or removal)
    Bid,
    /// A lot was created
    Added,
    /// A lot was deleted
    Deleted,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub lot_id: LotId,
    pub action: ChangeAction,
}

pub trait Notifier {
    fn notify(&self, lot_id: LotIdRef, action: ChangeAction) -> Result<()>;
}

pub type SharedNotifier = Arc<dyn Notifier + Send + Sync + 'static>;

/// Only logs. Used when nothing downstream listens.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl TracingNotifier {
    pub fn new_shared() -> SharedNotifier {
        Arc::new(Self)
    }
}

impl Notifier for TracingNotifier {
    fn notify(&self, lot_id: LotIdRef, action: ChangeAction) -> Result<()> {
        debug!(%lot_id, ?action, "change notification");
        Ok(())
    }
}
