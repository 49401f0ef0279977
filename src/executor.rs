//! Action executor: trigger, optional fast path, intermediate surface,
//! target, confirmation.
//!
//! Every interaction fault is converted into a failed [`ExecutionOutcome`];
//! nothing propagates to the caller.

use rand::Rng;
use std::fmt;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::config::{ActionDefinition, Settings};
use crate::resolver;
use crate::surface::{self, Element, Query, Surface};
use crate::Result;

/// Executor state, logged on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExecState {
    Idle,
    TriggerClicked,
    AwaitingIntermediate,
    IntermediateResolved,
    Clicked,
    AwaitingConfirmation,
    Confirmed,
    NoConfirmationNeeded,
    Done,
}

/// Why an execution ended the way it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeReason {
    /// Fast-path control clicked and the trigger flipped to its active state.
    FastPathConfirmed,
    /// Confirmation control found and clicked.
    Confirmed,
    /// No confirmation control appeared; the target click stands.
    NoConfirmationNeeded,
    TriggerClickFailed,
    /// No menu or dialog appeared in time.
    NoIntermediateSurface,
    NoCandidate,
    CandidateDisabled,
    TargetClickFailed,
    ConfirmationDisabled,
    ConfirmationClickFailed,
    /// The surface faulted mid-run.
    Fault(String),
}

impl fmt::Display for OutcomeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutcomeReason::FastPathConfirmed => f.write_str("fast path confirmed"),
            OutcomeReason::Confirmed => f.write_str("confirmed"),
            OutcomeReason::NoConfirmationNeeded => f.write_str("no confirmation needed"),
            OutcomeReason::TriggerClickFailed => f.write_str("trigger click failed"),
            OutcomeReason::NoIntermediateSurface => f.write_str("no menu or dialog appeared"),
            OutcomeReason::NoCandidate => f.write_str("no target candidate"),
            OutcomeReason::CandidateDisabled => f.write_str("target candidate disabled"),
            OutcomeReason::TargetClickFailed => f.write_str("target click failed"),
            OutcomeReason::ConfirmationDisabled => f.write_str("confirmation disabled"),
            OutcomeReason::ConfirmationClickFailed => f.write_str("confirmation click failed"),
            OutcomeReason::Fault(e) => write!(f, "fault: {}", e),
        }
    }
}

/// Result of one executor run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub success: bool,
    pub reason: OutcomeReason,
}

impl ExecutionOutcome {
    fn success(reason: OutcomeReason) -> Self {
        Self {
            success: true,
            reason,
        }
    }

    fn failure(reason: OutcomeReason) -> Self {
        Self {
            success: false,
            reason,
        }
    }
}

impl fmt::Display for ExecutionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.success { "success" } else { "failure" };
        write!(f, "{} ({})", status, self.reason)
    }
}

/// True when `el` already reflects the performed state of `def`.
pub fn reflects_performed(def: &ActionDefinition, el: &Element) -> bool {
    el.pressed == Some(true) || def.controls.active.iter().any(|q| q.matches(el))
}

/// The action's trigger control under `scope`. Performed-state queries are
/// tried before the plain trigger queries.
pub async fn locate_trigger<S: Surface>(
    surface: &S,
    def: &ActionDefinition,
    scope: Option<&Element>,
) -> Result<Option<Element>> {
    let queries: Vec<Query> = def
        .controls
        .active
        .iter()
        .chain(&def.controls.trigger)
        .cloned()
        .collect();
    surface::first_of(surface, scope, &queries).await
}

/// Drives one action through its interaction sequence.
#[derive(Debug, Clone)]
pub struct Executor {
    delay_min: u64,
    delay_max: u64,
    poll: Duration,
    flip_timeout: Duration,
    menu_timeout: Duration,
    confirm_timeout: Duration,
    click_settle: Duration,
}

impl Executor {
    pub fn new(settings: &Settings) -> Self {
        Self {
            delay_min: settings.delay_min_ms,
            delay_max: settings.delay_max_ms.max(settings.delay_min_ms),
            poll: settings.poll_interval(),
            flip_timeout: Duration::from_millis(settings.wait_timeout_ms),
            menu_timeout: Duration::from_millis(settings.menu_wait_timeout_ms),
            confirm_timeout: Duration::from_millis(settings.confirm_wait_timeout_ms),
            click_settle: Duration::from_millis(settings.click_settle_ms),
        }
    }

    /// Run `def` starting from the located `trigger` control. `scope` is the
    /// displayed item the trigger belongs to, if known.
    pub async fn execute<S: Surface>(
        &self,
        surface: &S,
        def: &ActionDefinition,
        trigger: &Element,
        scope: Option<&Element>,
    ) -> ExecutionOutcome {
        let mut state = ExecState::Idle;
        let result = self.run(surface, def, trigger, scope, &mut state).await;
        let outcome = match result {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("{} faulted in state {:?}: {}", def.key, state, e);
                ExecutionOutcome::failure(OutcomeReason::Fault(e.to_string()))
            }
        };
        transition(&mut state, ExecState::Done);
        info!("{}: {}", def.key, outcome);
        outcome
    }

    async fn run<S: Surface>(
        &self,
        surface: &S,
        def: &ActionDefinition,
        trigger: &Element,
        scope: Option<&Element>,
        state: &mut ExecState,
    ) -> Result<ExecutionOutcome> {
        self.pace().await;
        if !surface::click(surface, trigger).await {
            return Ok(ExecutionOutcome::failure(OutcomeReason::TriggerClickFailed));
        }
        transition(state, ExecState::TriggerClicked);

        if let Some(ref control) = def.controls.fast_path {
            if self.fast_path(surface, def, control, scope).await {
                return Ok(ExecutionOutcome::success(OutcomeReason::FastPathConfirmed));
            }
        }

        transition(state, ExecState::AwaitingIntermediate);
        let intermediate = [Query::Role("menu".into()), Query::Role("dialog".into())];
        let Some(root) =
            surface::wait_for(surface, &intermediate, self.menu_timeout, self.poll).await
        else {
            return Ok(ExecutionOutcome::failure(OutcomeReason::NoIntermediateSurface));
        };

        let Some(candidate) = resolver::resolve(surface, def, Some(&root)).await? else {
            return Ok(ExecutionOutcome::failure(OutcomeReason::NoCandidate));
        };
        transition(state, ExecState::IntermediateResolved);
        let target = candidate.element;
        debug!("target {} via {} tier", target.selector, candidate.tier);
        if target.disabled {
            return Ok(ExecutionOutcome::failure(OutcomeReason::CandidateDisabled));
        }

        if let Err(e) = surface.scroll_into_view(&target).await {
            debug!("scroll into view failed: {}", e);
        }
        self.pace().await;
        if !surface::click(surface, &target).await {
            return Ok(ExecutionOutcome::failure(OutcomeReason::TargetClickFailed));
        }
        transition(state, ExecState::Clicked);

        tokio::time::sleep(self.click_settle).await;
        transition(state, ExecState::AwaitingConfirmation);
        let clicked = &target;
        let found = surface::wait_until(self.confirm_timeout, self.poll, move || {
            find_confirmation(surface, def, clicked, trigger)
        })
        .await;

        let Some(confirm) = found else {
            transition(state, ExecState::NoConfirmationNeeded);
            return Ok(ExecutionOutcome::success(OutcomeReason::NoConfirmationNeeded));
        };

        self.pace().await;
        if surface
            .refresh(&confirm)
            .await?
            .is_some_and(|fresh| fresh.disabled)
        {
            return Ok(ExecutionOutcome::failure(OutcomeReason::ConfirmationDisabled));
        }
        if !surface::click(surface, &confirm).await {
            return Ok(ExecutionOutcome::failure(OutcomeReason::ConfirmationClickFailed));
        }
        transition(state, ExecState::Confirmed);
        Ok(ExecutionOutcome::success(OutcomeReason::Confirmed))
    }

    /// Click the fast-path control and wait for the trigger to flip. Any
    /// shortfall returns false so the generic path can take over.
    async fn fast_path<S: Surface>(
        &self,
        surface: &S,
        def: &ActionDefinition,
        control: &Query,
        scope: Option<&Element>,
    ) -> bool {
        let found = surface::wait_for(
            surface,
            std::slice::from_ref(control),
            self.confirm_timeout,
            self.poll,
        )
        .await;
        let Some(el) = found else {
            debug!("fast path: {} not present", control);
            return false;
        };
        if el.disabled {
            debug!("fast path: {} disabled", control);
            return false;
        }

        self.pace().await;
        if !surface::click(surface, &el).await {
            debug!("fast path: click on {} failed", el.selector);
            return false;
        }

        let flipped = surface::wait_until(self.flip_timeout, self.poll, move || async move {
            match locate_trigger(surface, def, scope).await {
                Ok(Some(t)) if reflects_performed(def, &t) => Some(()),
                _ => None,
            }
        })
        .await
        .is_some();
        if !flipped {
            debug!("fast path: state did not flip, using generic path");
        }
        flipped
    }

    /// Randomized delay within the configured pacing bounds.
    async fn pace(&self) {
        let ms = rand::thread_rng().gen_range(self.delay_min..=self.delay_max);
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }
}

fn transition(state: &mut ExecState, next: ExecState) {
    debug!("executor: {:?} -> {:?}", state, next);
    *state = next;
}

/// One confirmation lookup across identity, label/role and button-text tiers.
/// The trigger and the element just clicked are never confirmations, nor is
/// anything already showing the performed state.
async fn find_confirmation<S: Surface>(
    surface: &S,
    def: &ActionDefinition,
    clicked: &Element,
    trigger: &Element,
) -> Option<Element> {
    let confirm = &def.controls.confirm;
    let usable = |el: &Element| {
        !el.disabled
            && el.selector != clicked.selector
            && el.selector != trigger.selector
            && !def.controls.active.iter().any(|q| q.matches(el))
    };
    let not_cancel = |el: &Element| !confirm.cancel.iter().any(|c| el.text.contains(c.as_str()));
    let labelled = |el: &Element| confirm.labels.iter().any(|l| el.text.contains(l.as_str()));

    let tiers: [Vec<(Query, bool)>; 2] = [
        confirm
            .test_ids
            .iter()
            .map(|id| (Query::TestId(id.clone()), false))
            .collect(),
        confirm
            .labels
            .iter()
            .map(|l| (Query::Label(l.clone()), false))
            .chain([(Query::Role("button".into()), true)])
            .collect(),
    ];
    for tier in &tiers {
        for (q, by_text) in tier {
            match surface.query_all(None, q).await {
                Ok(found) => {
                    let hit = found
                        .into_iter()
                        .find(|el| usable(el) && not_cancel(el) && (!*by_text || labelled(el)));
                    if let Some(el) = hit {
                        debug!("confirmation via {}", q);
                        return Some(el);
                    }
                }
                Err(e) => debug!("confirmation query {} failed: {}", q, e),
            }
        }
    }

    match surface.query_all(None, &Query::Clickable).await {
        Ok(found) => found
            .into_iter()
            .find(|el| el.is_button() && usable(el) && not_cancel(el) && labelled(el)),
        Err(e) => {
            debug!("button scan failed: {}", e);
            None
        }
    }
}
