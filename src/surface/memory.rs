//! In-memory surface for offline runs and tests.
//!
//! Holds a flat element tree with parent links, records clicks, and runs
//! click reactions so a scripted page can open menus or flip state.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use super::{Element, Query, Surface};
use crate::{Error, Result};

/// Attributes of one in-memory element.
#[derive(Debug, Clone, Default)]
pub struct NodeSpec {
    tag: String,
    role: Option<String>,
    test_id: Option<String>,
    label: Option<String>,
    text: String,
    disabled: bool,
    pressed: Option<bool>,
    focusable: bool,
}

impl NodeSpec {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_lowercase(),
            ..Default::default()
        }
    }

    pub fn role(mut self, role: &str) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn test_id(mut self, id: &str) -> Self {
        self.test_id = Some(id.into());
        self
    }

    pub fn label(mut self, label: &str) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn text(mut self, text: &str) -> Self {
        self.text = text.into();
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn pressed(mut self, pressed: bool) -> Self {
        self.pressed = Some(pressed);
        self
    }

    pub fn focusable(mut self) -> Self {
        self.focusable = true;
        self
    }
}

#[derive(Debug, Clone)]
struct Node {
    key: String,
    parent: Option<String>,
    spec: NodeSpec,
}

/// Mutable page state handed to click reactions.
#[derive(Debug, Default)]
pub struct Dom {
    location: String,
    nodes: Vec<Node>,
}

impl Dom {
    pub fn set_location(&mut self, path: &str) {
        self.location = path.into();
    }

    /// Append an element; `parent` must already exist to be searchable in scope.
    pub fn insert(&mut self, key: &str, parent: Option<&str>, spec: NodeSpec) {
        self.remove(key);
        self.nodes.push(Node {
            key: key.into(),
            parent: parent.map(Into::into),
            spec,
        });
    }

    /// Remove an element and everything below it.
    pub fn remove(&mut self, key: &str) {
        let mut doomed: HashSet<String> = HashSet::new();
        doomed.insert(key.to_string());
        // parents precede children, so one forward pass collects the subtree
        for node in &self.nodes {
            if let Some(ref p) = node.parent {
                if doomed.contains(p) {
                    doomed.insert(node.key.clone());
                }
            }
        }
        self.nodes.retain(|n| !doomed.contains(&n.key));
    }

    /// Edit an element's attributes in place.
    pub fn update(&mut self, key: &str, f: impl FnOnce(&mut NodeSpec)) {
        if let Some(node) = self.nodes.iter_mut().find(|n| n.key == key) {
            f(&mut node.spec);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.nodes.iter().any(|n| n.key == key)
    }

    fn is_within(&self, node: &Node, ancestor: &str) -> bool {
        let mut parent = node.parent.as_deref();
        while let Some(p) = parent {
            if p == ancestor {
                return true;
            }
            parent = self
                .nodes
                .iter()
                .find(|n| n.key == p)
                .and_then(|n| n.parent.as_deref());
        }
        false
    }

    fn text_of(&self, key: &str) -> String {
        let mut parts = Vec::new();
        if let Some(node) = self.nodes.iter().find(|n| n.key == key) {
            if !node.spec.text.is_empty() {
                parts.push(node.spec.text.clone());
            }
        }
        for child in self.nodes.iter().filter(|n| n.parent.as_deref() == Some(key)) {
            let t = self.text_of(&child.key);
            if !t.is_empty() {
                parts.push(t);
            }
        }
        parts.join(" ")
    }

    fn snapshot(&self, node: &Node) -> Element {
        Element {
            selector: node.key.clone(),
            tag: node.spec.tag.clone(),
            role: node.spec.role.clone(),
            test_id: node.spec.test_id.clone(),
            label: node.spec.label.clone(),
            text: self.text_of(&node.key),
            disabled: node.spec.disabled,
            pressed: node.spec.pressed,
            focusable: node.spec.focusable,
        }
    }
}

type Reaction = Rc<dyn Fn(&mut Dom)>;

/// Scriptable in-memory [`Surface`].
#[derive(Default)]
pub struct MemorySurface {
    dom: RefCell<Dom>,
    reactions: RefCell<HashMap<String, Vec<Reaction>>>,
    clicks: RefCell<Vec<String>>,
    broken_native: RefCell<HashSet<String>>,
    broken: RefCell<HashSet<String>>,
}

impl MemorySurface {
    pub fn new(location: &str) -> Self {
        let surface = Self::default();
        surface.dom.borrow_mut().set_location(location);
        surface
    }

    pub fn set_location(&self, path: &str) {
        self.dom.borrow_mut().set_location(path);
    }

    pub fn insert(&self, key: &str, parent: Option<&str>, spec: NodeSpec) {
        self.dom.borrow_mut().insert(key, parent, spec);
    }

    pub fn remove(&self, key: &str) {
        self.dom.borrow_mut().remove(key);
    }

    pub fn update(&self, key: &str, f: impl FnOnce(&mut NodeSpec)) {
        self.dom.borrow_mut().update(key, f);
    }

    pub fn contains(&self, key: &str) -> bool {
        self.dom.borrow().contains(key)
    }

    /// Run `reaction` every time `key` is clicked.
    pub fn on_click(&self, key: &str, reaction: impl Fn(&mut Dom) + 'static) {
        self.reactions
            .borrow_mut()
            .entry(key.into())
            .or_default()
            .push(Rc::new(reaction));
    }

    /// Make native activation of `key` fail so the pointer fallback is used.
    pub fn break_native_click(&self, key: &str) {
        self.broken_native.borrow_mut().insert(key.into());
    }

    /// Make every click on `key` fail.
    pub fn break_click(&self, key: &str) {
        self.broken.borrow_mut().insert(key.into());
    }

    /// Keys of clicked elements, in order.
    pub fn clicks(&self) -> Vec<String> {
        self.clicks.borrow().clone()
    }

    pub fn click_count(&self, key: &str) -> usize {
        self.clicks.borrow().iter().filter(|k| *k == key).count()
    }

    fn perform_click(&self, el: &Element, native: bool) -> Result<()> {
        let key = &el.selector;
        if !self.contains(key) {
            return Err(Error::Surface(format!("element {} is gone", key)));
        }
        if self.broken.borrow().contains(key)
            || (native && self.broken_native.borrow().contains(key))
        {
            return Err(Error::Surface(format!("click on {} threw", key)));
        }
        self.clicks.borrow_mut().push(key.clone());
        let reactions = self.reactions.borrow().get(key).cloned().unwrap_or_default();
        let mut dom = self.dom.borrow_mut();
        for reaction in reactions {
            reaction(&mut *dom);
        }
        Ok(())
    }
}

impl Surface for MemorySurface {
    async fn location(&self) -> Result<String> {
        Ok(self.dom.borrow().location.clone())
    }

    async fn query_all(&self, scope: Option<&Element>, query: &Query) -> Result<Vec<Element>> {
        let dom = self.dom.borrow();
        Ok(dom
            .nodes
            .iter()
            .filter(|n| scope.map_or(true, |s| dom.is_within(n, &s.selector)))
            .map(|n| dom.snapshot(n))
            .filter(|el| query.matches(el))
            .collect())
    }

    async fn activate(&self, el: &Element) -> Result<()> {
        self.perform_click(el, true)
    }

    async fn pointer_click(&self, el: &Element) -> Result<()> {
        self.perform_click(el, false)
    }

    async fn refresh(&self, el: &Element) -> Result<Option<Element>> {
        let dom = self.dom.borrow();
        Ok(dom
            .nodes
            .iter()
            .find(|n| n.key == el.selector)
            .map(|n| dom.snapshot(n)))
    }

    async fn scroll_into_view(&self, el: &Element) -> Result<()> {
        if self.contains(&el.selector) {
            Ok(())
        } else {
            Err(Error::Surface(format!("element {} is gone", el.selector)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface;

    fn menu_page() -> MemorySurface {
        let s = MemorySurface::new("/a/status/1");
        s.insert("menu", None, NodeSpec::new("div").role("menu"));
        s.insert("quote", Some("menu"), NodeSpec::new("div").role("menuitem").text("引用"));
        s.insert("repost", Some("menu"), NodeSpec::new("div").role("menuitem"));
        s.insert("repost-label", Some("repost"), NodeSpec::new("span").text("リポスト"));
        s.insert("outside", None, NodeSpec::new("button").text("リポスト"));
        s
    }

    #[tokio::test]
    async fn scoped_query_only_sees_descendants() {
        let s = menu_page();
        let menu = s.query(None, &Query::Role("menu".into())).await.unwrap().unwrap();
        let inside = s.query_all(Some(&menu), &Query::Text("リポスト".into())).await.unwrap();
        assert_eq!(inside.len(), 1);
        assert_eq!(inside[0].selector, "repost");

        let everywhere = s.query_all(None, &Query::Text("リポスト".into())).await.unwrap();
        assert_eq!(everywhere.len(), 2);
    }

    #[tokio::test]
    async fn text_includes_descendants() {
        let s = menu_page();
        let menu = s.query(None, &Query::Role("menu".into())).await.unwrap().unwrap();
        assert_eq!(menu.text, "引用 リポスト");
    }

    #[tokio::test]
    async fn remove_drops_subtree() {
        let s = menu_page();
        s.remove("menu");
        assert!(!s.contains("repost-label"));
        assert!(s.contains("outside"));
    }

    #[tokio::test]
    async fn click_runs_reactions_and_falls_back() {
        let s = menu_page();
        s.on_click("outside", |dom| dom.insert("dialog", None, NodeSpec::new("div").role("dialog")));
        s.break_native_click("outside");

        let el = s.query(None, &Query::Tag("button".into())).await.unwrap().unwrap();
        assert!(s.activate(&el).await.is_err());
        assert!(surface::click(&s, &el).await);
        assert!(s.contains("dialog"));
        assert_eq!(s.clicks(), vec!["outside".to_string()]);
    }

    #[tokio::test]
    async fn refresh_sees_updates() {
        let s = menu_page();
        let el = s.query(None, &Query::Tag("button".into())).await.unwrap().unwrap();
        s.update("outside", |n| *n = n.clone().disabled(true));
        assert!(s.refresh(&el).await.unwrap().unwrap().disabled);
        s.remove("outside");
        assert!(s.refresh(&el).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn broken_click_fails_both_ways() {
        let s = menu_page();
        s.break_click("outside");
        let el = s.query(None, &Query::Tag("button".into())).await.unwrap().unwrap();
        assert!(!surface::click(&s, &el).await);
        assert_eq!(s.click_count("outside"), 0);
    }
}
