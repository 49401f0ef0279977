//! "Process current item" pipeline.
//!
//! Guards run cheapest first and each early exit is logged; the cooldown is
//! consulted last so it only matters when an action would really run.

use chrono::Duration;
use regex::Regex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

use crate::config::{Config, ItemConfig, RuleSet};
use crate::executor::{locate_trigger, reflects_performed, ExecutionOutcome, Executor};
use crate::ledger::{Clock, Ledger};
use crate::selector::select_action;
use crate::surface::{normalize_text, Element, Surface};
use crate::Result;

/// Why a run stopped before executing anything.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// Location does not identify an item.
    NoItem,
    AlreadyProcessed,
    /// Item text missing or empty.
    NoContent,
    NoMatchingAction,
    TriggerMissing,
    CoolingDown { remaining: Duration },
    /// The surface failed a read-only check.
    Surface(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::NoItem => f.write_str("no item at current location"),
            SkipReason::AlreadyProcessed => f.write_str("already processed"),
            SkipReason::NoContent => f.write_str("no item text"),
            SkipReason::NoMatchingAction => f.write_str("no matching action"),
            SkipReason::TriggerMissing => f.write_str("trigger control not present"),
            SkipReason::CoolingDown { remaining } => {
                write!(f, "cooling down ({}s left)", remaining.num_seconds().max(1))
            }
            SkipReason::Surface(e) => write!(f, "surface error: {}", e),
        }
    }
}

/// Terminal state of one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Skipped(SkipReason),
    /// The trigger already showed the performed state; marked without acting.
    AlreadyApplied { item_id: String, action: String },
    Executed {
        item_id: String,
        action: String,
        outcome: ExecutionOutcome,
    },
}

impl PipelineOutcome {
    /// True when the executor ran and succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Executed { outcome, .. } if outcome.success)
    }
}

impl fmt::Display for PipelineOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineOutcome::Skipped(reason) => write!(f, "skipped: {}", reason),
            PipelineOutcome::AlreadyApplied { item_id, action } => {
                write!(f, "{} already applied to {}", action, item_id)
            }
            PipelineOutcome::Executed {
                item_id,
                action,
                outcome,
            } => write!(f, "{} on {}: {}", action, item_id, outcome),
        }
    }
}

/// Runs the guard chain and the executor for whatever item the surface shows.
pub struct Orchestrator<'a, S: Surface> {
    surface: &'a S,
    rules: RuleSet,
    item: ItemConfig,
    id_regex: Regex,
    window: Duration,
    ledger: Arc<Ledger>,
    clock: Arc<dyn Clock>,
    executor: Executor,
}

impl<'a, S: Surface> Orchestrator<'a, S> {
    pub fn new(
        surface: &'a S,
        config: &Config,
        ledger: Arc<Ledger>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        Ok(Self {
            surface,
            rules: config.actions.clone(),
            item: config.item.clone(),
            id_regex: config.id_regex()?,
            window: config.settings.rate_limit_window(),
            ledger,
            clock,
            executor: Executor::new(&config.settings),
        })
    }

    pub fn ledger(&self) -> &Arc<Ledger> {
        &self.ledger
    }

    /// Item id derived from the current location, if any.
    pub async fn current_item_id(&self) -> Option<String> {
        match self.surface.location().await {
            Ok(path) => item_id_from(&self.id_regex, &path),
            Err(e) => {
                debug!("location unavailable: {}", e);
                None
            }
        }
    }

    /// True when the surface currently renders item content.
    pub async fn shows_item_content(&self) -> bool {
        matches!(
            self.surface.query(None, &self.item.content_marker).await,
            Ok(Some(_))
        )
    }

    /// First item container holding the content marker. `None` when no
    /// container is configured or none is rendered.
    async fn item_scope(&self) -> Result<Option<Element>> {
        let Some(ref container) = self.item.container else {
            return Ok(None);
        };
        for el in self.surface.query_all(None, container).await? {
            if self
                .surface
                .query(Some(&el), &self.item.content_marker)
                .await?
                .is_some()
            {
                return Ok(Some(el));
            }
        }
        Ok(None)
    }

    /// Normalized text of the displayed item.
    async fn item_text(&self, scope: Option<&Element>) -> Option<String> {
        match self.surface.query(scope, &self.item.content_marker).await {
            Ok(Some(el)) => Some(normalize_text(&el.text)).filter(|t| !t.is_empty()),
            Ok(None) => None,
            Err(e) => {
                debug!("item text unavailable: {}", e);
                None
            }
        }
    }

    /// Evaluate the current item once, acting on it if every guard passes.
    pub async fn process_current(&self) -> PipelineOutcome {
        let outcome = self.pipeline().await;
        match &outcome {
            PipelineOutcome::Skipped(reason) => debug!("pipeline skipped: {}", reason),
            PipelineOutcome::Executed { outcome: o, .. } if !o.success => {
                warn!("pipeline: {}", outcome)
            }
            _ => info!("pipeline: {}", outcome),
        }
        outcome
    }

    async fn pipeline(&self) -> PipelineOutcome {
        let Some(item_id) = self.current_item_id().await else {
            return PipelineOutcome::Skipped(SkipReason::NoItem);
        };

        if self.ledger.is_processed(&item_id) {
            return PipelineOutcome::Skipped(SkipReason::AlreadyProcessed);
        }

        let scope = match self.item_scope().await {
            Ok(scope) => scope,
            Err(e) => return PipelineOutcome::Skipped(SkipReason::Surface(e.to_string())),
        };
        if let Some(ref el) = scope {
            trace!("{}: item container {}", item_id, el.selector);
        }

        let Some(text) = self.item_text(scope.as_ref()).await else {
            return PipelineOutcome::Skipped(SkipReason::NoContent);
        };

        let Some(def) = select_action(&text, &self.rules) else {
            return PipelineOutcome::Skipped(SkipReason::NoMatchingAction);
        };
        debug!("{}: selected {} ({})", item_id, def.key, def.label);

        let trigger = match locate_trigger(self.surface, def, scope.as_ref()).await {
            Ok(Some(el)) => el,
            Ok(None) => return PipelineOutcome::Skipped(SkipReason::TriggerMissing),
            Err(e) => return PipelineOutcome::Skipped(SkipReason::Surface(e.to_string())),
        };

        if reflects_performed(def, &trigger) {
            self.ledger.mark_processed(&item_id);
            return PipelineOutcome::AlreadyApplied {
                item_id,
                action: def.key.clone(),
            };
        }

        if let Some(remaining) =
            self.ledger
                .cooldown_remaining(&item_id, self.clock.now(), self.window)
        {
            return PipelineOutcome::Skipped(SkipReason::CoolingDown { remaining });
        }

        let outcome = self
            .executor
            .execute(self.surface, def, &trigger, scope.as_ref())
            .await;
        if outcome.success {
            self.ledger.mark_processed(&item_id);
            self.ledger.record_execution(&item_id, self.clock.now());
        } else {
            self.ledger.unmark_processed(&item_id);
        }

        PipelineOutcome::Executed {
            item_id,
            action: def.key.clone(),
            outcome,
        }
    }
}

/// First capture group of `pattern` applied to `location`.
pub fn item_id_from(pattern: &Regex, location: &str) -> Option<String> {
    pattern
        .captures(location)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .filter(|id| !id.is_empty())
}
