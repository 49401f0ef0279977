//! Browser-backed surface tests.
//!
//! These tests require Chrome to be installed and available.
//! Run with: cargo test --test browser -- --ignored

use eoka::Browser;
use eoka_watch::{PageSurface, Query, Surface, SurfaceEvent};
use std::time::Duration;
use tokio::sync::mpsc;

/// Check if Chrome is available
fn chrome_available() -> bool {
    eoka::stealth::patcher::find_chrome().is_ok()
}

const MENU_PAGE: &str = r##"data:text/html,
    <div data-testid="tweetText">please リポスト this</div>
    <button data-testid="retweet" aria-label="Repost" onclick="
        const m = document.createElement('div');
        m.setAttribute('role', 'menu');
        m.innerHTML = '<div role=menuitem>引用</div><div role=menuitem data-testid=retweetConfirm>リポスト</div>';
        document.body.appendChild(m);
    ">12</button>
"##;

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_query_and_click() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let page = browser.new_page(MENU_PAGE).await.expect("Failed to create page");
    let surface = PageSurface::new(page);

    let trigger = surface
        .query(None, &Query::parse("testid:retweet"))
        .await
        .expect("query failed")
        .expect("trigger missing");
    assert_eq!(trigger.tag, "button");
    assert_eq!(trigger.label.as_deref(), Some("Repost"));
    assert_eq!(trigger.text, "12");

    surface.activate(&trigger).await.expect("click failed");

    let menu = surface
        .query(None, &Query::parse("role:menu"))
        .await
        .expect("query failed")
        .expect("menu missing");
    let items = surface
        .query_all(Some(&menu), &Query::parse("role:menuitem"))
        .await
        .expect("query failed");
    assert_eq!(items.len(), 2);
    assert_eq!(items[1].test_id.as_deref(), Some("retweetConfirm"));

    browser.close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_pointer_click_fallback() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let page = browser.new_page(MENU_PAGE).await.expect("Failed to create page");
    let surface = PageSurface::new(page);

    let trigger = surface
        .query(None, &Query::parse("testid:retweet"))
        .await
        .unwrap()
        .unwrap();
    surface.pointer_click(&trigger).await.expect("pointer click failed");
    assert!(surface
        .query(None, &Query::parse("role:menu"))
        .await
        .unwrap()
        .is_some());

    browser.close().await.expect("Failed to close browser");
}

#[tokio::test]
#[ignore = "requires Chrome"]
async fn test_events_report_mutations() {
    if !chrome_available() {
        eprintln!("Chrome not found, skipping test");
        return;
    }

    let browser = Browser::launch().await.expect("Failed to launch browser");
    let page = browser.new_page(MENU_PAGE).await.expect("Failed to create page");
    let surface = PageSurface::new(page);
    let (tx, mut rx) = mpsc::channel(16);

    let probe = async {
        // first event is the observer registration
        assert_eq!(rx.recv().await, Some(SurfaceEvent::Mutation));
        let trigger = surface
            .query(None, &Query::parse("testid:retweet"))
            .await
            .unwrap()
            .unwrap();
        surface.activate(&trigger).await.unwrap();
        let next = tokio::time::timeout(Duration::from_secs(5), rx.recv()).await;
        assert_eq!(next.ok().flatten(), Some(SurfaceEvent::Mutation));
    };

    tokio::select! {
        res = surface.pump_events(tx, Duration::from_millis(50)) => panic!("pump stopped: {:?}", res.err()),
        _ = probe => {}
    }

    browser.close().await.expect("Failed to close browser");
}
