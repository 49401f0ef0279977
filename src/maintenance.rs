//! Operator maintenance commands over the session ledger.

use serde::Serialize;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::info;

use crate::ledger::Ledger;
use crate::{Error, Result};

/// Item id most recently seen by the watcher, shared with maintenance so
/// commands without an explicit id can target it.
#[derive(Debug, Default)]
pub struct CurrentItem(Mutex<Option<String>>);

impl CurrentItem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, item_id: Option<String>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = item_id;
    }

    pub fn get(&self) -> Option<String> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// Result of a maintenance command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaintenanceReport {
    /// Number of ledger entries removed (zero for read-only commands).
    pub affected: usize,
    pub message: String,
}

impl fmt::Display for MaintenanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

/// Clear or inspect idempotency flags and cooldown stamps.
#[derive(Clone)]
pub struct Maintenance {
    ledger: Arc<Ledger>,
    current: Arc<CurrentItem>,
}

impl Maintenance {
    pub fn new(ledger: Arc<Ledger>, current: Arc<CurrentItem>) -> Self {
        Self { ledger, current }
    }

    /// Clear the processed flag of `item_id`, or of the current item.
    pub fn clear_processed(&self, item_id: Option<&str>) -> Result<MaintenanceReport> {
        let id = self.target(item_id)?;
        let affected = self.ledger.clear_processed(&id);
        Ok(self.report(
            affected,
            if affected > 0 {
                format!("cleared processed flag for {}", id)
            } else {
                format!("{} was not marked processed", id)
            },
        ))
    }

    pub fn clear_all_processed(&self) -> MaintenanceReport {
        let affected = self.ledger.clear_all_processed();
        self.report(affected, format!("cleared {} processed flags", affected))
    }

    /// Clear the cooldown stamp of `item_id`, or of the current item.
    pub fn clear_rate_limit(&self, item_id: Option<&str>) -> Result<MaintenanceReport> {
        let id = self.target(item_id)?;
        let affected = self.ledger.clear_rate_limit(&id);
        Ok(self.report(
            affected,
            if affected > 0 {
                format!("cleared rate limit for {}", id)
            } else {
                format!("{} had no rate limit", id)
            },
        ))
    }

    pub fn clear_all_rate_limits(&self) -> MaintenanceReport {
        let affected = self.ledger.clear_all_rate_limits();
        self.report(affected, format!("cleared {} rate limits", affected))
    }

    /// Ledger counts and the current item.
    pub fn status(&self) -> MaintenanceReport {
        let (processed, limited) = self.ledger.counts();
        let current = self.current.get();
        let mut message = format!("{} processed, {} rate limited", processed, limited);
        if let Some(id) = current {
            let state = if self.ledger.is_processed(&id) {
                "processed"
            } else {
                "pending"
            };
            message.push_str(&format!("; current item {} ({})", id, state));
        } else {
            message.push_str("; no current item");
        }
        MaintenanceReport {
            affected: 0,
            message,
        }
    }

    fn target(&self, item_id: Option<&str>) -> Result<String> {
        match item_id {
            Some(id) if !id.is_empty() => Ok(id.to_string()),
            _ => self.current.get().ok_or(Error::NoCurrentItem),
        }
    }

    fn report(&self, affected: usize, message: String) -> MaintenanceReport {
        info!("maintenance: {}", message);
        MaintenanceReport { affected, message }
    }
}
