//! Change watcher: turns raw surface events into serialized pipeline runs.
//!
//! Mutation bursts are debounced per item, navigations fire after a settle
//! delay, and anything arriving while a run is in flight is dropped.

use std::future::pending;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, info, trace};

use crate::config::Settings;
use crate::maintenance::CurrentItem;
use crate::orchestrator::{Orchestrator, PipelineOutcome};
use crate::surface::{Surface, SurfaceEvent};

/// Why a trigger fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Cause {
    Debounce,
    Navigation,
}

/// Debounce/settle state machine in front of an [`Orchestrator`].
pub struct Watcher<'a, S: Surface> {
    orchestrator: Orchestrator<'a, S>,
    current: Arc<CurrentItem>,
    debounce: Duration,
    settle: Duration,
    initial_delay: Duration,
    last_seen: Option<String>,
    runs: usize,
}

impl<'a, S: Surface> Watcher<'a, S> {
    pub fn new(
        orchestrator: Orchestrator<'a, S>,
        settings: &Settings,
        current: Arc<CurrentItem>,
    ) -> Self {
        Self {
            orchestrator,
            current,
            debounce: Duration::from_millis(settings.debounce_ms),
            settle: Duration::from_millis(settings.navigation_settle_ms),
            initial_delay: Duration::from_millis(settings.initial_delay_ms),
            last_seen: None,
            runs: 0,
        }
    }

    /// Consume events until the channel closes and no trigger is pending.
    /// Returns the number of pipeline runs.
    pub async fn run(mut self, mut events: mpsc::Receiver<SurfaceEvent>) -> usize {
        let mut debounce_at: Option<Instant> = None;
        let mut settle_at = Some(Instant::now() + self.initial_delay);
        let mut open = true;

        loop {
            if !open && debounce_at.is_none() && settle_at.is_none() {
                break;
            }

            let cause = tokio::select! {
                ev = events.recv(), if open => {
                    match ev {
                        Some(SurfaceEvent::Mutation) => {
                            if let Some(at) = self.on_mutation().await {
                                debounce_at = Some(at);
                            }
                        }
                        Some(SurfaceEvent::Navigation) => {
                            trace!("navigation, settling");
                            settle_at = Some(Instant::now() + self.settle);
                        }
                        None => {
                            debug!("event stream closed");
                            open = false;
                        }
                    }
                    None
                }
                _ = deadline(debounce_at) => {
                    debounce_at = None;
                    Some(Cause::Debounce)
                }
                _ = deadline(settle_at) => {
                    settle_at = None;
                    Some(Cause::Navigation)
                }
            };

            if let Some(cause) = cause {
                self.fire(cause, &mut events, &mut open).await;
                // triggers that came due during the run are dropped, not queued
                let now = Instant::now();
                debounce_at = debounce_at.filter(|at| *at > now);
                settle_at = settle_at.filter(|at| *at > now);
            }
        }

        info!("watcher stopped after {} runs", self.runs);
        self.runs
    }

    /// New debounce deadline when an item's content is shown and its id
    /// differs from the last one seen.
    async fn on_mutation(&mut self) -> Option<Instant> {
        if !self.orchestrator.shows_item_content().await {
            return None;
        }
        let id = self.orchestrator.current_item_id().await?;
        if self.last_seen.as_deref() == Some(id.as_str()) {
            return None;
        }
        debug!("item {} shown, debouncing", id);
        self.last_seen = Some(id);
        Some(Instant::now() + self.debounce)
    }

    async fn fire(
        &mut self,
        cause: Cause,
        events: &mut mpsc::Receiver<SurfaceEvent>,
        open: &mut bool,
    ) {
        let id = self.orchestrator.current_item_id().await;
        self.current.set(id.clone());
        let Some(id) = id else {
            trace!("{:?} trigger: no item shown", cause);
            return;
        };
        self.last_seen = Some(id.clone());
        if self.orchestrator.ledger().is_processed(&id) {
            debug!("{:?} trigger for {} suppressed: already processed", cause, id);
            return;
        }

        self.runs += 1;
        debug!("{:?} trigger for {}, run #{}", cause, id, self.runs);

        let mut dropped = 0usize;
        let pipeline = self.orchestrator.process_current();
        tokio::pin!(pipeline);
        let outcome: PipelineOutcome = loop {
            tokio::select! {
                outcome = &mut pipeline => break outcome,
                ev = events.recv(), if *open => match ev {
                    Some(ev) => {
                        dropped += 1;
                        trace!("dropped {:?} during run", ev);
                    }
                    None => *open = false,
                },
            }
        };

        if dropped > 0 {
            debug!("{} events dropped during run", dropped);
        }
        trace!("run #{} finished: {}", self.runs, outcome);
    }
}

/// Resolves at `at`, or never when no deadline is armed.
async fn deadline(at: Option<Instant>) {
    match at {
        Some(at) => sleep_until(at).await,
        None => pending().await,
    }
}
