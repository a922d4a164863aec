//! Chrome's native downloads as download-capability events.
//!
//! Chrome is told to deny downloads but still report them. Each denied
//! download arrives as `Browser.downloadWillBegin` and is forwarded to the
//! observer as `on_created`; the denial is the synchronous cancel.
//! Files themselves are written by the wrapped capability (normally
//! [`FsDownloads`](crate::download::FsDownloads)).

use crate::download::fetch::CookieSource;
use crate::download::{DownloadId, DownloadItem, DownloadManager, DownloadObserver, DownloadRequest};
use crate::error::{Result, TakeoutError};
use headless_chrome::Tab;
use headless_chrome::protocol::cdp::Browser;
use headless_chrome::protocol::cdp::types::Event;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::{Arc, Weak};
use url::Url;

/// Download capability fed by a Chrome tab
pub struct ChromeDownloadBridge {
    tab: Weak<Tab>,
    inner: Arc<dyn DownloadManager>,
    native: Mutex<HashSet<DownloadId>>,
}

impl ChromeDownloadBridge {
    /// Deny native downloads in `tab` and forward them to `observer`
    pub fn attach(
        tab: &Arc<Tab>,
        inner: Arc<dyn DownloadManager>,
        observer: Weak<dyn DownloadObserver>,
    ) -> Result<Arc<Self>> {
        tab.call_method(Browser::SetDownloadBehavior {
            behavior: Browser::SetDownloadBehaviorBehaviorOption::Deny,
            browser_context_id: None,
            download_path: None,
            events_enabled: Some(true),
        })
        .map_err(|e| TakeoutError::TabOperationFailed(format!("Failed to set download behaviour: {}", e)))?;

        let bridge = Arc::new(Self {
            tab: Arc::downgrade(tab),
            inner,
            native: Mutex::new(HashSet::new()),
        });

        let listener_bridge = Arc::downgrade(&bridge);
        let listener_tab = Arc::downgrade(tab);
        tab.add_event_listener(Arc::new(move |event: &Event| {
            let Event::BrowserDownloadWillBegin(begin) = event else {
                return;
            };
            let params = &begin.params;
            let mut item = DownloadItem::new(params.guid.clone(), params.url.clone());
            if !params.suggested_filename.is_empty() {
                item = item.with_filename(params.suggested_filename.clone());
            }
            if let Some(tab) = listener_tab.upgrade() {
                item = item.with_referrer(tab.get_url());
            }
            if let Some(bridge) = listener_bridge.upgrade() {
                bridge.native.lock().insert(item.id.clone());
            }
            log::debug!("Native download {} for {}", item.id, item.url);

            // Off the event thread: handling may issue further CDP calls
            let observer = observer.clone();
            std::thread::spawn(move || {
                if let Some(observer) = observer.upgrade() {
                    observer.on_created(&item);
                }
            });
        }))
        .map_err(|e| TakeoutError::TabOperationFailed(format!("Failed to add download listener: {}", e)))?;

        Ok(bridge)
    }
}

impl DownloadManager for ChromeDownloadBridge {
    fn create(&self, request: DownloadRequest) -> Result<DownloadId> {
        self.inner.create(request)
    }

    fn cancel(&self, id: &DownloadId) -> Result<()> {
        if !self.native.lock().contains(id) {
            return self.inner.cancel(id);
        }
        let Some(tab) = self.tab.upgrade() else {
            return Ok(());
        };
        // Usually already cancelled by the deny behaviour
        if let Err(e) = tab.call_method(Browser::CancelDownload {
            guid: id.as_str().to_string(),
            browser_context_id: None,
        }) {
            log::debug!("Cancel of native download {} ignored: {}", id, e);
        }
        Ok(())
    }

    fn erase(&self, id: &DownloadId) -> Result<()> {
        if self.native.lock().remove(id) {
            return Ok(());
        }
        self.inner.erase(id)
    }

    fn saved_name(&self, id: &DownloadId) -> Option<String> {
        self.inner.saved_name(id)
    }
}

/// Cookies of the tab's browser profile, for direct fetches
pub struct ChromeCookies {
    tab: Arc<Tab>,
}

impl ChromeCookies {
    pub fn new(tab: Arc<Tab>) -> Self {
        Self { tab }
    }
}

fn cookie_applies(domain: &str, host: &str) -> bool {
    let domain = domain.trim_start_matches('.').to_ascii_lowercase();
    let host = host.to_ascii_lowercase();
    !domain.is_empty() && (host == domain || host.ends_with(&format!(".{}", domain)))
}

impl CookieSource for ChromeCookies {
    fn cookie_header(&self, url: &Url) -> Result<Option<String>> {
        let Some(host) = url.host_str() else {
            return Ok(None);
        };
        let cookies = self
            .tab
            .get_cookies()
            .map_err(|e| TakeoutError::TabOperationFailed(format!("Failed to read cookies: {}", e)))?;

        let pairs: Vec<String> = cookies
            .iter()
            .filter(|c| cookie_applies(&c.domain, host))
            .map(|c| format!("{}={}", c.name, c.value))
            .collect();
        Ok(if pairs.is_empty() { None } else { Some(pairs.join("; ")) })
    }
}
