//! Action rule table.

use crate::surface::Query;
use serde::Deserialize;

/// One candidate action: when to fire it and which controls drive it.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionDefinition {
    /// Stable key, e.g. `REPOST`.
    pub key: String,

    /// Disabled entries are skipped by the selector.
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Item text must contain at least one of these.
    #[serde(default)]
    pub include: Vec<String>,

    /// Item text containing any of these disqualifies the action.
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Human-readable name for logs.
    pub label: String,

    pub controls: ActionControls,
}

fn default_enabled() -> bool {
    true
}

impl ActionDefinition {
    /// True when `text` contains an include pattern and no exclude pattern.
    pub fn matches(&self, text: &str) -> bool {
        self.include.iter().any(|p| !p.is_empty() && text.contains(p.as_str()))
            && !self.is_excluded(text)
    }

    /// True when `text` contains any exclude pattern.
    pub fn is_excluded(&self, text: &str) -> bool {
        self.exclude
            .iter()
            .any(|p| !p.is_empty() && text.contains(p.as_str()))
    }
}

/// Controls that make up an action's interaction sequence.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionControls {
    /// Starting control, first query that matches wins.
    pub trigger: Vec<Query>,

    /// Matches when the trigger already reflects the performed state.
    #[serde(default)]
    pub active: Vec<Query>,

    /// Test id of the target item inside the intermediate surface.
    #[serde(default)]
    pub target_test_id: Option<String>,

    /// Test id fragment shared by related actions' targets.
    #[serde(default)]
    pub fallback_test_id: Option<String>,

    /// High-confidence control that bypasses the intermediate surface flow.
    #[serde(default)]
    pub fast_path: Option<Query>,

    #[serde(default)]
    pub confirm: ConfirmControls,
}

/// How the confirmation control is recognized.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmControls {
    #[serde(default)]
    pub test_ids: Vec<String>,
    /// Accessible-label fragments (also matched against button text).
    #[serde(default)]
    pub labels: Vec<String>,
    /// Buttons whose text contains one of these are never confirmations.
    #[serde(default)]
    pub cancel: Vec<String>,
}

/// Ordered, immutable table of action definitions.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct RuleSet(Vec<ActionDefinition>);

impl RuleSet {
    pub fn new(definitions: Vec<ActionDefinition>) -> Self {
        Self(definitions)
    }

    /// Definitions in declared order.
    pub fn definitions(&self) -> &[ActionDefinition] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self(vec![repost()])
    }
}

/// Plain repost on x.com: trigger opens a menu holding "リポスト" and "引用".
pub fn repost() -> ActionDefinition {
    ActionDefinition {
        key: "REPOST".into(),
        enabled: true,
        include: vec!["リポスト".into()],
        exclude: vec!["引用".into()],
        label: "リポスト".into(),
        controls: ActionControls {
            trigger: vec![
                Query::TestId("retweet".into()),
                Query::TestId("unretweet".into()),
                Query::Label("リポスト".into()),
                Query::Label("Retweet".into()),
                Query::Label("Repost".into()),
            ],
            active: vec![Query::TestId("unretweet".into())],
            target_test_id: Some("retweetConfirm".into()),
            fallback_test_id: Some("Confirm".into()),
            fast_path: Some(Query::TestId("retweetConfirm".into())),
            confirm: ConfirmControls {
                test_ids: vec!["confirmationSheetConfirm".into()],
                labels: vec!["リポスト".into(), "Retweet".into(), "Repost".into()],
                cancel: vec!["キャンセル".into(), "Cancel".into()],
            },
        },
    }
}
