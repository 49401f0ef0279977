//! Tiered element resolution inside an intermediate surface.
//!
//! Tiers degrade in confidence: stable test ids, then ARIA roles, then raw
//! text. The first tier producing any candidates is used; exclusion is
//! re-applied afterwards no matter which tier supplied them.

use std::fmt;
use tracing::debug;

use crate::config::ActionDefinition;
use crate::surface::{Element, Query, Surface};
use crate::Result;

/// Roles considered in the semantic tier.
const ROLE_TIER: &[&str] = &["menuitem", "option", "button"];

/// Strategy that produced a candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Identity,
    Role,
    Text,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Tier::Identity => "identity",
            Tier::Role => "role",
            Tier::Text => "text",
        })
    }
}

/// Resolved target and the tier it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub element: Element,
    pub tier: Tier,
}

/// Resolve the target control for `def` under `root` (the whole surface
/// when `None`).
pub async fn resolve<S: Surface>(
    surface: &S,
    def: &ActionDefinition,
    root: Option<&Element>,
) -> Result<Option<Candidate>> {
    for tier in [Tier::Identity, Tier::Role, Tier::Text] {
        let found = collect(surface, root, &tier_queries(def, tier)).await?;
        if found.is_empty() {
            continue;
        }
        debug!("{} tier produced {} candidates for {}", tier, found.len(), def.key);
        let picked = found
            .into_iter()
            .find(|el| !el.text.trim().is_empty() && !def.is_excluded(&el.text))
            .map(|element| Candidate { element, tier });
        if picked.is_none() {
            debug!("every {} candidate for {} was filtered out", tier, def.key);
        }
        return Ok(picked);
    }
    Ok(None)
}

fn tier_queries(def: &ActionDefinition, tier: Tier) -> Vec<Query> {
    match tier {
        Tier::Identity => {
            let c = &def.controls;
            let mut qs = Vec::new();
            if let Some(ref id) = c.target_test_id {
                qs.push(Query::TestId(id.clone()));
                qs.push(Query::TestIdContains(id.clone()));
            }
            if let Some(ref id) = c.fallback_test_id {
                qs.push(Query::TestIdContains(id.clone()));
            }
            qs
        }
        Tier::Role => ROLE_TIER.iter().map(|r| Query::Role((*r).into())).collect(),
        Tier::Text => def
            .include
            .iter()
            .filter(|p| !p.is_empty())
            .map(|p| Query::Text(p.clone()))
            .collect(),
    }
}

/// Union of all matches, in query order, without duplicates.
async fn collect<S: Surface>(
    surface: &S,
    root: Option<&Element>,
    queries: &[Query],
) -> Result<Vec<Element>> {
    let mut out: Vec<Element> = Vec::new();
    for q in queries {
        for el in surface.query_all(root, q).await? {
            if !out.iter().any(|e| e.selector == el.selector) {
                out.push(el);
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::rules::repost;
    use crate::surface::{MemorySurface, NodeSpec};

    async fn menu(s: &MemorySurface) -> Element {
        s.query(None, &Query::Role("menu".into())).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn identity_beats_text() {
        let s = MemorySurface::new("/a/status/1");
        s.insert("menu", None, NodeSpec::new("div").role("menu"));
        s.insert("by-text", Some("menu"), NodeSpec::new("div").focusable().text("リポスト"));
        s.insert(
            "by-id",
            Some("menu"),
            NodeSpec::new("div").test_id("retweetConfirm").text("リポスト"),
        );
        let root = menu(&s).await;
        let got = resolve(&s, &repost(), Some(&root)).await.unwrap().unwrap();
        assert_eq!(got.element.selector, "by-id");
        assert_eq!(got.tier, Tier::Identity);
    }

    #[tokio::test]
    async fn role_tier_skips_excluded_items() {
        let s = MemorySurface::new("/a/status/1");
        s.insert("menu", None, NodeSpec::new("div").role("menu"));
        s.insert("quote", Some("menu"), NodeSpec::new("div").role("menuitem").text("引用"));
        s.insert("plain", Some("menu"), NodeSpec::new("div").role("menuitem").text("リポスト"));
        let root = menu(&s).await;
        let got = resolve(&s, &repost(), Some(&root)).await.unwrap().unwrap();
        assert_eq!(got.element.selector, "plain");
        assert_eq!(got.tier, Tier::Role);
    }

    #[tokio::test]
    async fn text_tier_when_nothing_structured() {
        let s = MemorySurface::new("/a/status/1");
        s.insert("menu", None, NodeSpec::new("div").role("menu"));
        s.insert("quote", Some("menu"), NodeSpec::new("div").focusable().text("引用リポスト"));
        s.insert("plain", Some("menu"), NodeSpec::new("div").focusable().text("リポスト"));
        let root = menu(&s).await;
        let got = resolve(&s, &repost(), Some(&root)).await.unwrap().unwrap();
        assert_eq!(got.element.selector, "plain");
        assert_eq!(got.tier, Tier::Text);
    }

    #[tokio::test]
    async fn winning_tier_does_not_fall_through() {
        // role tier yields only excluded or empty items; text tier is not consulted
        let s = MemorySurface::new("/a/status/1");
        s.insert("menu", None, NodeSpec::new("div").role("menu"));
        s.insert("quote", Some("menu"), NodeSpec::new("div").role("menuitem").text("引用"));
        s.insert("blank", Some("menu"), NodeSpec::new("div").role("option"));
        s.insert("plain", Some("menu"), NodeSpec::new("div").focusable().text("リポスト"));
        let root = menu(&s).await;
        assert!(resolve(&s, &repost(), Some(&root)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_is_scoped_to_root() {
        let s = MemorySurface::new("/a/status/1");
        s.insert("menu", None, NodeSpec::new("div").role("menu"));
        s.insert("outside", None, NodeSpec::new("div").test_id("retweetConfirm").text("リポスト"));
        let root = menu(&s).await;
        assert!(resolve(&s, &repost(), Some(&root)).await.unwrap().is_none());
        let anywhere = resolve(&s, &repost(), None).await.unwrap().unwrap();
        assert_eq!(anywhere.element.selector, "outside");
    }

    #[tokio::test]
    async fn fallback_test_id_counts_as_identity() {
        let s = MemorySurface::new("/a/status/1");
        s.insert("menu", None, NodeSpec::new("div").role("menu"));
        s.insert(
            "generic",
            Some("menu"),
            NodeSpec::new("div").role("menuitem").test_id("unretweetConfirm").text("元に戻す"),
        );
        let root = menu(&s).await;
        let got = resolve(&s, &repost(), Some(&root)).await.unwrap().unwrap();
        assert_eq!(got.element.selector, "generic");
        assert_eq!(got.tier, Tier::Identity);
    }
}
