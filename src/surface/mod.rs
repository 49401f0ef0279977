//! Interaction surface: the live, externally-owned view the watcher drives.
//!
//! The core only reads location and element snapshots, clicks, scrolls, and
//! waits. Snapshots are re-queried on every use and never cached across runs.

mod memory;
mod page;
mod query;

pub use memory::{Dom, MemorySurface, NodeSpec};
pub use page::PageSurface;
pub use query::Query;

use crate::Result;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Point-in-time view of one element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Element {
    /// Unique locator used to address the element again.
    pub selector: String,
    /// Lowercase tag name.
    pub tag: String,
    pub role: Option<String>,
    /// `data-testid`
    pub test_id: Option<String>,
    /// `aria-label`
    pub label: Option<String>,
    /// Rendered text including descendants.
    pub text: String,
    /// `disabled` attribute or `aria-disabled="true"`.
    pub disabled: bool,
    /// `aria-pressed`, when present.
    pub pressed: Option<bool>,
    /// Has a `tabindex` attribute.
    pub focusable: bool,
}

impl Element {
    /// Buttons, links, button/menuitem roles and tab-indexed containers.
    pub fn is_clickable(&self) -> bool {
        matches!(self.tag.as_str(), "button" | "a")
            || matches!(self.role.as_deref(), Some("button") | Some("menuitem"))
            || self.focusable
    }

    /// Button-like elements considered in the confirmation text tier.
    pub fn is_button(&self) -> bool {
        self.tag == "button" || self.role.as_deref() == Some("button")
    }
}

/// Raw notification from the surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceEvent {
    /// The element tree changed.
    Mutation,
    /// Programmatic navigation (push/replace) happened.
    Navigation,
}

/// Operations the core needs from the live view.
#[allow(async_fn_in_trait)]
pub trait Surface {
    /// Current location path, e.g. `/someone/status/123`.
    async fn location(&self) -> Result<String>;

    /// All elements matching `query`, in document order. `scope` restricts the
    /// search to descendants of that element.
    async fn query_all(&self, scope: Option<&Element>, query: &Query) -> Result<Vec<Element>>;

    /// Native activation (`element.click()`).
    async fn activate(&self, el: &Element) -> Result<()>;

    /// Synthesized pointer-down/up, mouse-down/up, click at the element's center.
    async fn pointer_click(&self, el: &Element) -> Result<()>;

    /// Scroll the element into view.
    async fn scroll_into_view(&self, el: &Element) -> Result<()>;

    /// Fresh snapshot of a previously seen element, if it is still attached.
    async fn refresh(&self, el: &Element) -> Result<Option<Element>> {
        self.query(None, &Query::Css(el.selector.clone())).await
    }

    /// First element matching `query`.
    async fn query(&self, scope: Option<&Element>, query: &Query) -> Result<Option<Element>> {
        Ok(self.query_all(scope, query).await?.into_iter().next())
    }
}

/// Click with fallback: native activation, else a synthesized event sequence.
/// Returns false only when both fail.
pub async fn click<S: Surface>(surface: &S, el: &Element) -> bool {
    match surface.activate(el).await {
        Ok(()) => true,
        Err(e) => {
            debug!("native click on {} failed ({}), dispatching pointer events", el.selector, e);
            match surface.pointer_click(el).await {
                Ok(()) => true,
                Err(e) => {
                    debug!("pointer click on {} failed: {}", el.selector, e);
                    false
                }
            }
        }
    }
}

/// First element matched by the first query (in order) that matches anything.
pub async fn first_of<S: Surface>(
    surface: &S,
    scope: Option<&Element>,
    queries: &[Query],
) -> Result<Option<Element>> {
    for q in queries {
        if let Some(el) = surface.query(scope, q).await? {
            trace!("{} matched {}", q, el.selector);
            return Ok(Some(el));
        }
    }
    Ok(None)
}

/// Poll for an element matching any of `queries` until `timeout` elapses.
/// Query faults count as "not yet present".
pub async fn wait_for<S: Surface>(
    surface: &S,
    queries: &[Query],
    timeout: Duration,
    poll: Duration,
) -> Option<Element> {
    wait_until(timeout, poll, move || async move {
        match first_of(surface, None, queries).await {
            Ok(found) => found,
            Err(e) => {
                debug!("query failed while waiting: {}", e);
                None
            }
        }
    })
    .await
}

/// Poll `probe` until it yields a value or `timeout` elapses. Always probes at
/// least once.
pub async fn wait_until<T, F, Fut>(timeout: Duration, poll: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Option<T>>,
{
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(v) = probe().await {
            return Some(v);
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(poll).await;
    }
}

/// Collapse whitespace runs (including newlines) into single spaces.
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_collapses_whitespace() {
        assert_eq!(normalize_text("  a\n\nb \t c  "), "a b c");
        assert_eq!(normalize_text("\n \n"), "");
    }

    #[test]
    fn clickable_kinds() {
        let mut el = Element {
            tag: "div".into(),
            ..Default::default()
        };
        assert!(!el.is_clickable());
        el.role = Some("menuitem".into());
        assert!(el.is_clickable());
        assert!(!el.is_button());
        el.role = Some("button".into());
        assert!(el.is_button());
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_times_out() {
        let start = Instant::now();
        let got: Option<()> =
            wait_until(Duration::from_secs(3), Duration::from_millis(100), || async { None })
                .await;
        assert!(got.is_none());
        assert!(start.elapsed() >= Duration::from_secs(3));
        assert!(start.elapsed() < Duration::from_millis(3200));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_until_returns_when_ready() {
        let start = Instant::now();
        let got = wait_until(Duration::from_secs(3), Duration::from_millis(100), move || async move {
            (start.elapsed() >= Duration::from_millis(450)).then_some(7)
        })
        .await;
        assert_eq!(got, Some(7));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
