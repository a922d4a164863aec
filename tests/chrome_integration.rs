//! Checks against a real Chrome. Run with `cargo test -- --ignored`.

use notebook_takeout::dom::{ChromePage, Page};
use notebook_takeout::{BrowserSession, LaunchOptions, TakeoutConfig, TakeoutSession};
use serde_json::json;
use std::time::Duration;

const LIBRARY: &str = "data:text/html,<html><body>\
    <artifact-library-item><button aria-description='Audio Overview'></button>\
    <span class='artifact-title'>Deep Dive</span><button aria-label='More'>m</button></artifact-library-item>\
    <artifact-library-item><button aria-description='Briefing Report'></button>\
    <span class='artifact-title'>Briefing</span><button aria-label='More'>m</button></artifact-library-item>\
    </body></html>";

fn launch(url: &str) -> BrowserSession {
    let session = BrowserSession::launch(LaunchOptions::new().headless(true)).expect("Failed to launch browser");
    session.navigate(url).expect("Failed to navigate");
    session
}

#[test]
#[ignore] // Requires Chrome to be installed
fn test_chrome_page_queries() {
    let session = launch(LIBRARY);
    let page = ChromePage::new(session.tab().unwrap());

    let items = page.query_all(None, "artifact-library-item").unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(page.tag_name(&items[0]).unwrap(), "artifact-library-item");
    assert_eq!(page.query_text(Some(&items[1]), ".artifact-title").unwrap().as_deref(), Some("Briefing"));

    let title = page.query(Some(&items[0]), ".artifact-title").unwrap().unwrap();
    assert_eq!(page.closest(&title, "artifact-library-item").unwrap(), Some(items[0].clone()));

    // Ref attributes never leak into serialized markup
    assert!(!page.outer_html(&items[0]).unwrap().contains("data-takeout-ref"));
}

#[test]
#[ignore]
fn test_wait_for_selector_sees_late_elements() {
    let session = launch("data:text/html,<html><body><div id='root'></div></body></html>");
    let tab = session.tab().unwrap();
    tab.evaluate(
        "setTimeout(() => { document.getElementById('root').innerHTML = '<report-viewer>hi</report-viewer>'; }, 300)",
        false,
    )
    .unwrap();

    let page = ChromePage::new(tab);
    assert!(page.observes_mutations());
    let found = page.wait_for_selector(None, "report-viewer", Duration::from_secs(3)).unwrap();
    assert!(found.is_some());
}

#[test]
#[ignore]
fn test_overlay_round_trip() {
    let session = launch("data:text/html,<html><body><p>notebook</p></body></html>");
    let page = ChromePage::new(session.tab().unwrap());

    page.show_overlay("Exporting...").unwrap();
    page.update_overlay("Downloading 1 of 2", Some(0.5)).unwrap();
    assert!(!page.overlay_cancelled().unwrap());
    page.hide_overlay().unwrap();
}

#[test]
#[ignore]
fn test_session_scans_launched_page() {
    let dir = tempfile::tempdir().unwrap();
    let session = TakeoutSession::launch(
        LaunchOptions::new().headless(true).start_url(LIBRARY),
        TakeoutConfig::default().with_download_dir(dir.path()),
    )
    .expect("Failed to launch session");

    let result = session.execute_tool("scan_artifacts", json!({})).unwrap();
    let data = result.data.unwrap();
    assert_eq!(data["count"], 2);
    assert_eq!(data["artifacts"][0]["kind"], "Audio");
    assert_eq!(data["artifacts"][1]["index"], 1);
}
