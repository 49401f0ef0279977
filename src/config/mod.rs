pub mod rules;
pub mod schema;

pub use rules::{ActionControls, ActionDefinition, ConfirmControls, RuleSet};
pub use schema::{BrowserConfig, Config, ItemConfig, Settings, TargetUrl, Viewport};
