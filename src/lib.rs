//! # eoka-watch
//!
//! Watch a single-page app that swaps items in place, decide from each item's
//! text whether a configured action applies, and drive the action's
//! trigger → menu → confirmation sequence exactly once per item.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use eoka_watch::{Config, Ledger, Orchestrator, PageSurface, SystemClock};
//!
//! # #[tokio::main]
//! # async fn main() -> eoka_watch::Result<()> {
//! let config = Config::load("configs/x-repost.yaml")?;
//! let browser = eoka::Browser::launch().await?;
//! let page = browser.new_page(&config.target.url).await?;
//! let surface = PageSurface::new(page);
//!
//! let ledger = Arc::new(Ledger::in_memory());
//! let orchestrator = Orchestrator::new(&surface, &config, ledger, Arc::new(SystemClock))?;
//! let outcome = orchestrator.process_current().await;
//! println!("{}", outcome);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod executor;
pub mod ledger;
pub mod maintenance;
pub mod orchestrator;
pub mod resolver;
pub mod selector;
pub mod surface;
pub mod watcher;

pub use config::{
    ActionControls, ActionDefinition, BrowserConfig, Config, ConfirmControls, ItemConfig,
    RuleSet, Settings, TargetUrl,
};
pub use executor::{ExecutionOutcome, Executor, OutcomeReason};
pub use ledger::{Clock, KvStore, Ledger, ManualClock, MemoryStore, SystemClock};
pub use maintenance::{CurrentItem, Maintenance, MaintenanceReport};
pub use orchestrator::{Orchestrator, PipelineOutcome, SkipReason};
pub use resolver::{resolve, Candidate, Tier};
pub use selector::select_action;
pub use surface::{Element, MemorySurface, PageSurface, Query, Surface, SurfaceEvent};
pub use watcher::Watcher;

/// Result type for eoka-watch operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during config loading, surface access or maintenance.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("yaml parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid pattern: {0}")]
    Regex(#[from] regex::Error),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("surface error: {0}")]
    Surface(String),

    #[error("no item is currently displayed; pass an item id")]
    NoCurrentItem,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_minimal_config() {
        let yaml = r#"
name: "Test"
target:
  url: "https://x.com/home"
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.name, "Test");
        assert_eq!(config.target.url, "https://x.com/home");
        assert!(!config.browser.headless);
        assert_eq!(config.actions.len(), 1);
        assert_eq!(config.actions.definitions()[0].key, "REPOST");
    }

    #[test]
    fn test_parse_settings_overrides() {
        let yaml = r#"
name: "Test"
target:
  url: "https://x.com/home"
settings:
  delay_min_ms: 10
  delay_max_ms: 20
  rate_limit_window_sec: 120
  debug_log: false
"#;
        let config = Config::parse(yaml).unwrap();
        assert_eq!(config.settings.delay_min_ms, 10);
        assert_eq!(config.settings.delay_max_ms, 20);
        assert_eq!(config.settings.rate_limit_window_sec, 120);
        assert!(!config.settings.debug_log);
        // untouched values keep their defaults
        assert_eq!(config.settings.poll_interval_ms, 100);
        assert_eq!(config.settings.confirm_wait_timeout_ms, 3000);
    }

    #[test]
    fn test_item_container() {
        let base = r#"
name: "Test"
target:
  url: "https://x.com/home"
"#;
        let config = Config::parse(base).unwrap();
        assert_eq!(config.item.container, Some(Query::Tag("article".into())));

        let config = Config::parse(&format!("{}item:\n  container: null\n", base)).unwrap();
        assert_eq!(config.item.container, None);
        assert_eq!(config.item.content_marker, Query::TestId("tweetText".into()));
    }

    #[test]
    fn test_parse_action_table() {
        let yaml = r#"
name: "Test"
target:
  url: "https://x.com/home"
actions:
  - key: LIKE
    label: "いいね"
    enabled: false
    include: ["いいね"]
    controls:
      trigger: ["testid:like"]
      active: ["testid:unlike"]
      target_test_id: "like"
  - key: REPOST
    label: "リポスト"
    include: ["リポスト"]
    exclude: ["引用"]
    controls:
      trigger: ["testid:retweet", "label:Retweet"]
      active: ["testid:unretweet"]
      target_test_id: "retweetConfirm"
      fallback_test_id: "Confirm"
      fast_path: "testid:retweetConfirm"
      confirm:
        test_ids: ["confirmationSheetConfirm"]
        labels: ["リポスト"]
        cancel: ["キャンセル"]
"#;
        let config = Config::parse(yaml).unwrap();
        let defs = config.actions.definitions();
        assert_eq!(defs.len(), 2);
        assert!(!defs[0].enabled);
        assert!(defs[1].enabled); // default true
        assert_eq!(defs[1].exclude, vec!["引用".to_string()]);
        assert_eq!(defs[1].controls.trigger.len(), 2);
        assert!(matches!(defs[1].controls.trigger[1], Query::Label(_)));
        assert_eq!(
            defs[1].controls.fast_path,
            Some(Query::TestId("retweetConfirm".into()))
        );
        assert_eq!(defs[1].controls.confirm.cancel, vec!["キャンセル".to_string()]);
    }

    #[test]
    fn test_validation_missing_name() {
        let yaml = r#"
target:
  url: "https://x.com/home"
"#;
        assert!(Config::parse(yaml).is_err());
    }

    #[test]
    fn test_validation_empty_url() {
        let yaml = r#"
name: "Test"
target:
  url: ""
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("target.url"));
    }

    #[test]
    fn test_validation_delay_range() {
        let yaml = r#"
name: "Test"
target:
  url: "https://x.com/home"
settings:
  delay_min_ms: 500
  delay_max_ms: 100
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("delay_min_ms"));
    }

    #[test]
    fn test_validation_id_pattern_needs_group() {
        let yaml = r#"
name: "Test"
target:
  url: "https://x.com/home"
item:
  id_pattern: "/status/\\d+$"
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("capture group"));
    }

    #[test]
    fn test_validation_duplicate_keys() {
        let yaml = r#"
name: "Test"
target:
  url: "https://x.com/home"
actions:
  - key: REPOST
    label: "a"
    include: ["a"]
    controls: { trigger: ["testid:a"] }
  - key: REPOST
    label: "b"
    include: ["b"]
    controls: { trigger: ["testid:b"] }
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_validation_enabled_without_include() {
        let yaml = r#"
name: "Test"
target:
  url: "https://x.com/home"
actions:
  - key: REPOST
    label: "a"
    include: []
    controls: { trigger: ["testid:retweet"] }
"#;
        let err = Config::parse(yaml).unwrap_err();
        assert!(err.to_string().contains("include"));
    }

    #[test]
    fn test_load_example_config() {
        let config = Config::load("configs/x-repost.yaml").unwrap();
        assert_eq!(config.name, "X auto repost");
        assert_eq!(config.target.url, "https://x.com/home");
        assert_eq!(config.actions.definitions()[0].key, "REPOST");
    }
}
