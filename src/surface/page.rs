//! Browser-backed surface: every operation is injected JavaScript over eoka.

use eoka::Page;
use serde::Deserialize;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use super::{Element, Query, Surface, SurfaceEvent};
use crate::{Error, Result};

/// Enumerate elements matching a CSS selector (optionally under a scope and
/// filtered by text) as snapshots with a unique path selector.
const QUERY_JS: &str = r#"
((scopeSel, css, textFilter) => {
    function selector(el) {
        if (el.id) return '#' + CSS.escape(el.id);
        const path = [];
        let n = el;
        while (n && n.nodeType === 1) {
            let s = n.tagName.toLowerCase();
            if (n.id) { path.unshift('#' + CSS.escape(n.id)); break; }
            const p = n.parentElement;
            if (p) {
                const sibs = [...p.children].filter(c => c.tagName === n.tagName);
                if (sibs.length > 1) s += ':nth-of-type(' + (sibs.indexOf(n) + 1) + ')';
            }
            path.unshift(s);
            n = p;
        }
        return path.join(' > ');
    }

    const root = scopeSel ? document.querySelector(scopeSel) : document;
    if (!root) return [];

    let found;
    try {
        found = [...root.querySelectorAll(css)];
    } catch (e) {
        return [];
    }

    return found
        .map(el => ({ el, text: (el.innerText || el.textContent || '').trim() }))
        .filter(({ text }) => textFilter === null || text.includes(textFilter))
        .map(({ el, text }) => {
            const pressed = el.getAttribute('aria-pressed');
            return {
                selector: selector(el),
                tag: el.tagName.toLowerCase(),
                role: el.getAttribute('role'),
                test_id: el.getAttribute('data-testid'),
                label: el.getAttribute('aria-label'),
                text,
                disabled: el.disabled === true || el.getAttribute('aria-disabled') === 'true',
                pressed: pressed === null ? null : pressed === 'true',
                focusable: el.hasAttribute('tabindex'),
            };
        });
})
"#;

const ACTIVATE_JS: &str = r#"
((sel) => {
    const el = document.querySelector(sel);
    if (!el) return 'missing';
    try {
        el.click();
        return 'ok';
    } catch (e) {
        return 'error: ' + (e.message || String(e));
    }
})
"#;

const POINTER_CLICK_JS: &str = r#"
((sel) => {
    const el = document.querySelector(sel);
    if (!el) return 'missing';
    try {
        const r = el.getBoundingClientRect();
        const opts = {
            bubbles: true, cancelable: true, view: window,
            clientX: r.x + r.width / 2, clientY: r.y + r.height / 2,
            button: 0, pointerId: 1, pointerType: 'mouse', isPrimary: true,
        };
        el.dispatchEvent(new PointerEvent('pointerdown', opts));
        el.dispatchEvent(new MouseEvent('mousedown', opts));
        el.dispatchEvent(new PointerEvent('pointerup', opts));
        el.dispatchEvent(new MouseEvent('mouseup', opts));
        el.dispatchEvent(new MouseEvent('click', opts));
        return 'ok';
    } catch (e) {
        return 'error: ' + (e.message || String(e));
    }
})
"#;

const SCROLL_JS: &str = r#"
((sel) => {
    const el = document.querySelector(sel);
    if (!el) return 'missing';
    el.scrollIntoView({ behavior: 'smooth', block: 'center' });
    return 'ok';
})
"#;

/// Registers a mutation counter on the document. Idempotent per document.
const WATCH_INSTALL_JS: &str = r#"
(() => {
    if (window.__eokaWatch) return;
    window.__eokaWatch = { mutations: 0 };
    new MutationObserver(() => { window.__eokaWatch.mutations++; })
        .observe(document.documentElement, { childList: true, subtree: true });
})()
"#;

const WATCH_POLL_JS: &str = r#"
(() => ({
    path: location.pathname,
    mutations: window.__eokaWatch ? window.__eokaWatch.mutations : -1,
}))()
"#;

#[derive(Debug, Deserialize)]
struct WatchState {
    path: String,
    mutations: i64,
}

/// [`Surface`] over a live eoka [`Page`].
pub struct PageSurface {
    page: Page,
}

impl PageSurface {
    pub fn new(page: Page) -> Self {
        Self { page }
    }

    async fn run_on(&self, template: &str, selector: &str) -> Result<()> {
        let js = format!("{}({})", template, json_arg(selector));
        let status: String = self.page.evaluate(&js).await?;
        match status.as_str() {
            "ok" => Ok(()),
            "missing" => Err(Error::Surface(format!("element '{}' not found", selector))),
            other => Err(Error::Surface(format!("'{}': {}", selector, other))),
        }
    }

    /// Poll the page for structural changes and location changes, forwarding
    /// them as [`SurfaceEvent`]s until the receiver goes away.
    pub async fn pump_events(
        &self,
        tx: mpsc::Sender<SurfaceEvent>,
        interval: Duration,
    ) -> Result<()> {
        let mut last_path: Option<String> = None;
        let mut last_mutations: i64 = 0;

        loop {
            let state: WatchState = self.page.evaluate(WATCH_POLL_JS).await?;

            if state.mutations < 0 {
                // fresh document: register the observer and report the load as a change
                debug!("registering mutation observer");
                self.page.execute(WATCH_INSTALL_JS).await?;
                last_mutations = 0;
                if tx.send(SurfaceEvent::Mutation).await.is_err() {
                    return Ok(());
                }
            } else if state.mutations > last_mutations {
                trace!("{} new mutations", state.mutations - last_mutations);
                last_mutations = state.mutations;
                if tx.send(SurfaceEvent::Mutation).await.is_err() {
                    return Ok(());
                }
            }

            if let Some(ref prev) = last_path {
                if *prev != state.path {
                    debug!("location changed: {} -> {}", prev, state.path);
                    if tx.send(SurfaceEvent::Navigation).await.is_err() {
                        return Ok(());
                    }
                }
            }
            last_path = Some(state.path);

            tokio::time::sleep(interval).await;
        }
    }
}

fn json_arg(v: &str) -> String {
    serde_json::to_string(v).unwrap_or_else(|_| "null".into())
}

impl Surface for PageSurface {
    async fn location(&self) -> Result<String> {
        Ok(self.page.evaluate("location.pathname").await?)
    }

    async fn query_all(&self, scope: Option<&Element>, query: &Query) -> Result<Vec<Element>> {
        let (css, text) = query.to_css();
        let js = format!(
            "{}({}, {}, {})",
            QUERY_JS,
            scope.map_or_else(|| "null".into(), |s| json_arg(&s.selector)),
            json_arg(&css),
            text.map_or_else(|| "null".into(), json_arg),
        );
        let elements: Vec<Element> = self.page.evaluate(&js).await?;
        trace!("{} -> {} elements", query, elements.len());
        Ok(elements)
    }

    async fn activate(&self, el: &Element) -> Result<()> {
        self.run_on(ACTIVATE_JS, &el.selector).await
    }

    async fn pointer_click(&self, el: &Element) -> Result<()> {
        self.run_on(POINTER_CLICK_JS, &el.selector).await
    }

    async fn scroll_into_view(&self, el: &Element) -> Result<()> {
        self.run_on(SCROLL_JS, &el.selector).await?;
        self.page.wait(200).await;
        Ok(())
    }
}
