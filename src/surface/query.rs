//! Declarative element queries.
//!
//! Queries are written as prefixed strings in config (`testid:retweet`,
//! `label:Repost`, `role:menuitem`) and evaluated either as CSS inside the
//! page or locally against an [`Element`] snapshot.

use serde::Deserialize;
use std::fmt;

use super::Element;

/// A declarative element query.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(from = "String")]
pub enum Query {
    /// `testid:retweet` - exact `data-testid`
    TestId(String),
    /// `testid~:Confirm` - `data-testid` contains
    TestIdContains(String),
    /// `label:Repost` - `aria-label` contains
    Label(String),
    /// `role:menuitem` - ARIA role
    Role(String),
    /// `tag:button` - tag name
    Tag(String),
    /// `text:Repost` - clickable element whose text contains
    Text(String),
    /// `clickable` - buttons, links, button/menuitem roles, tab-indexed containers
    Clickable,
    /// `css:div > span` - raw CSS, only meaningful inside a browser
    Css(String),
}

impl Query {
    /// Parse a query string. Unprefixed strings default to text search.
    pub fn parse(s: &str) -> Self {
        let s = s.trim();
        if s == "clickable" {
            return Query::Clickable;
        }
        if let Some(v) = s.strip_prefix("testid~:") {
            return Query::TestIdContains(v.into());
        }
        if let Some(v) = s.strip_prefix("testid:") {
            return Query::TestId(v.into());
        }
        if let Some(v) = s.strip_prefix("label:") {
            return Query::Label(v.into());
        }
        if let Some(v) = s.strip_prefix("role:") {
            return Query::Role(v.into());
        }
        if let Some(v) = s.strip_prefix("tag:") {
            return Query::Tag(v.to_lowercase());
        }
        if let Some(v) = s.strip_prefix("css:") {
            return Query::Css(v.into());
        }
        if let Some(v) = s.strip_prefix("text:") {
            return Query::Text(v.into());
        }
        Query::Text(s.into())
    }

    /// CSS selector plus an optional text filter applied after selection.
    pub fn to_css(&self) -> (String, Option<&str>) {
        match self {
            Query::TestId(v) => (format!("[data-testid={}]", css_string(v)), None),
            Query::TestIdContains(v) => (format!("[data-testid*={}]", css_string(v)), None),
            Query::Label(v) => (format!("[aria-label*={}]", css_string(v)), None),
            Query::Role(v) => (format!("[role={}]", css_string(v)), None),
            Query::Tag(v) => (v.clone(), None),
            Query::Text(v) => (CLICKABLE_CSS.into(), Some(v.as_str())),
            Query::Clickable => (CLICKABLE_CSS.into(), None),
            Query::Css(v) => (v.clone(), None),
        }
    }

    /// Evaluate against a snapshot. `Css` never matches locally.
    pub fn matches(&self, el: &Element) -> bool {
        match self {
            Query::TestId(v) => el.test_id.as_deref() == Some(v.as_str()),
            Query::TestIdContains(v) => el
                .test_id
                .as_deref()
                .is_some_and(|id| id.contains(v.as_str())),
            Query::Label(v) => el
                .label
                .as_deref()
                .is_some_and(|l| l.contains(v.as_str())),
            Query::Role(v) => el.role.as_deref() == Some(v.as_str()),
            Query::Tag(v) => el.tag == *v,
            Query::Text(v) => el.is_clickable() && el.text.contains(v.as_str()),
            Query::Clickable => el.is_clickable(),
            Query::Css(_) => false,
        }
    }
}

const CLICKABLE_CSS: &str = r#"button, a, [role="button"], [role="menuitem"], [tabindex]"#;

/// Quote a value for use inside a CSS attribute selector.
fn css_string(v: &str) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| format!("\"{}\"", v.replace('"', "\\\"")))
}

impl From<String> for Query {
    fn from(s: String) -> Self {
        Query::parse(&s)
    }
}

impl From<&str> for Query {
    fn from(s: &str) -> Self {
        Query::parse(s)
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Query::TestId(v) => write!(f, "testid:{}", v),
            Query::TestIdContains(v) => write!(f, "testid~:{}", v),
            Query::Label(v) => write!(f, "label:{}", v),
            Query::Role(v) => write!(f, "role:{}", v),
            Query::Tag(v) => write!(f, "tag:{}", v),
            Query::Text(v) => write!(f, "text:{}", v),
            Query::Clickable => f.write_str("clickable"),
            Query::Css(v) => write!(f, "css:{}", v),
        }
    }
}
