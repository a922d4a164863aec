//! One notebook page and everything wired around it.

use crate::browser::{BrowserSession, ConnectionOptions, LaunchOptions};
use crate::config::TakeoutConfig;
use crate::dom::{ChromePage, Clock, MemoryPage, Page, SystemClock};
use crate::download::{
    ChromeCookies, ChromeDownloadBridge, DownloadManager, DownloadObserver, DownloadOrchestrator, Fetcher,
    FsDownloads, HttpFetcher, Interceptor,
};
use crate::error::{Result, TakeoutError};
use crate::export::{BatchLatch, CancelFlag, Exporter, StatusBoard};
use crate::extract::PageContext;
use crate::store::LocalStore;
use crate::tools::{ToolContext, ToolRegistry, ToolResult};
use parking_lot::{Mutex, MutexGuard};
use std::sync::{Arc, Weak};

/// Owns the page, the download pipeline, persisted state and the tools.
///
/// All fields synchronize internally, so a session is shared behind an
/// `Arc`. Page work is serialized through [`exclusive`](Self::exclusive).
pub struct TakeoutSession {
    browser: Option<BrowserSession>,
    page: Arc<dyn Page>,
    clock: Arc<dyn Clock>,
    config: TakeoutConfig,
    files: Arc<FsDownloads>,
    downloads: Arc<dyn DownloadManager>,
    interceptor: Arc<Interceptor>,
    fetcher: Arc<dyn Fetcher>,
    store: LocalStore,
    cancel: CancelFlag,
    status: StatusBoard,
    batch: BatchLatch,
    page_lock: Mutex<()>,
    tool_registry: ToolRegistry,
}

impl TakeoutSession {
    /// Launch Chrome and attach to its tab
    pub fn launch(options: LaunchOptions, config: TakeoutConfig) -> Result<Self> {
        Self::from_browser(BrowserSession::launch(options)?, config)
    }

    /// Attach to a running Chrome
    pub fn connect(options: ConnectionOptions, config: TakeoutConfig) -> Result<Self> {
        Self::from_browser(BrowserSession::connect(options)?, config)
    }

    /// Wire the notebook tab of `browser`: page helpers, native download
    /// events, cookie-carrying fetches and files under the download directory
    pub fn from_browser(browser: BrowserSession, config: TakeoutConfig) -> Result<Self> {
        let tab = browser.tab()?;
        std::fs::create_dir_all(&config.download_dir)?;

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let fetcher: Arc<dyn Fetcher> = Arc::new(HttpFetcher::new().with_cookies(ChromeCookies::new(tab.clone())));
        let files = Arc::new(FsDownloads::new(&config.download_dir, fetcher.clone()));

        // The bridge reports to the interceptor, which cancels through the bridge
        let mut bridged: Result<Arc<dyn DownloadManager>> = Err(TakeoutError::TabOperationFailed(
            "download bridge was not attached".to_string(),
        ));
        let interceptor = Arc::new_cyclic(|weak: &Weak<Interceptor>| {
            let observer: Weak<dyn DownloadObserver> = weak.clone();
            files.set_observer(observer.clone());
            bridged = ChromeDownloadBridge::attach(&tab, files.clone(), observer)
                .map(|bridge| bridge as Arc<dyn DownloadManager>);
            let downloads: Arc<dyn DownloadManager> = match &bridged {
                Ok(bridge) => bridge.clone(),
                Err(_) => files.clone(),
            };
            Interceptor::new(downloads, clock.clone(), &config)
        });
        let downloads = bridged?;

        log::info!("Session attached to {}", tab.get_url());
        Ok(Self {
            browser: Some(browser),
            page: Arc::new(ChromePage::new(tab)),
            clock,
            config,
            files,
            downloads,
            interceptor,
            fetcher,
            store: LocalStore::in_memory(),
            cancel: CancelFlag::new(),
            status: StatusBoard::new(),
            batch: BatchLatch::new(),
            page_lock: Mutex::new(()),
            tool_registry: ToolRegistry::with_defaults(),
        })
    }

    /// Session over an in-memory page; files still land in the download directory
    pub fn offline(
        page: Arc<MemoryPage>,
        config: TakeoutConfig,
        fetcher: Arc<dyn Fetcher>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let files = Arc::new(FsDownloads::new(&config.download_dir, fetcher.clone()));
        let interceptor = Arc::new(Interceptor::new(files.clone(), clock.clone(), &config));
        let observer: Arc<dyn DownloadObserver> = interceptor.clone();
        files.set_observer(Arc::downgrade(&observer));
        page.set_download_observer(Arc::downgrade(&observer));

        Self {
            browser: None,
            page,
            clock,
            config,
            downloads: files.clone(),
            files,
            interceptor,
            fetcher,
            store: LocalStore::in_memory(),
            cancel: CancelFlag::new(),
            status: StatusBoard::new(),
            batch: BatchLatch::new(),
            page_lock: Mutex::new(()),
            tool_registry: ToolRegistry::with_defaults(),
        }
    }

    /// Builder method: persist settings and the capture tally in `store`
    pub fn with_store(mut self, store: LocalStore) -> Self {
        self.store = store;
        self
    }

    pub fn browser(&self) -> Option<&BrowserSession> {
        self.browser.as_ref()
    }

    pub fn page(&self) -> &dyn Page {
        self.page.as_ref()
    }

    pub fn config(&self) -> &TakeoutConfig {
        &self.config
    }

    pub fn interceptor(&self) -> &Interceptor {
        &self.interceptor
    }

    /// Files written so far
    pub fn files(&self) -> &FsDownloads {
        &self.files
    }

    pub fn store(&self) -> &LocalStore {
        &self.store
    }

    pub fn cancel_flag(&self) -> &CancelFlag {
        &self.cancel
    }

    pub fn status(&self) -> &StatusBoard {
        &self.status
    }

    /// Held by the running multi-item export
    pub fn batch_latch(&self) -> &BatchLatch {
        &self.batch
    }

    pub fn tool_registry(&self) -> &ToolRegistry {
        &self.tool_registry
    }

    /// Hold while driving the page; extractions must never interleave
    pub fn exclusive(&self) -> MutexGuard<'_, ()> {
        self.page_lock.lock()
    }

    pub fn context(&self) -> PageContext<'_> {
        PageContext::new(self.page.as_ref(), self.clock.as_ref(), &self.config)
    }

    pub fn orchestrator(&self) -> DownloadOrchestrator<'_> {
        DownloadOrchestrator::new(self.context(), self.downloads.as_ref(), &self.interceptor)
    }

    /// Exporter showing the page overlay when notifications are enabled
    pub fn exporter(&self) -> Exporter<'_> {
        Exporter::new(
            self.context(),
            self.downloads.as_ref(),
            &self.interceptor,
            self.fetcher.as_ref(),
            &self.cancel,
            &self.status,
        )
        .with_overlay(self.store.settings().show_notifications)
    }

    /// Open `url` in the notebook tab
    pub fn navigate(&self, url: &str) -> Result<()> {
        self.require_browser()?.navigate(url)
    }

    pub fn go_back(&self) -> Result<()> {
        self.require_browser()?.go_back()
    }

    fn require_browser(&self) -> Result<&BrowserSession> {
        self.browser
            .as_ref()
            .ok_or_else(|| TakeoutError::NavigationFailed("no browser is attached to this session".to_string()))
    }

    /// Execute a tool by name
    pub fn execute_tool(&self, name: &str, params: serde_json::Value) -> Result<ToolResult> {
        let mut context = ToolContext::new(self);
        self.tool_registry.execute(name, params, &mut context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dom::ManualClock;
    use crate::download::StaticFetcher;

    fn session(dir: &std::path::Path) -> TakeoutSession {
        TakeoutSession::offline(
            Arc::new(MemoryPage::new("<body></body>")),
            TakeoutConfig::default().with_download_dir(dir),
            Arc::new(StaticFetcher::new()),
            Arc::new(ManualClock::new()),
        )
    }

    #[test]
    fn test_offline_session_has_no_history() {
        let dir = tempfile::tempdir().unwrap();
        let err = session(dir.path()).go_back().unwrap_err();
        assert!(matches!(err, TakeoutError::NavigationFailed(_)));
    }

    #[test]
    fn test_offline_interceptor_arms_and_disarms() {
        let dir = tempfile::tempdir().unwrap();
        let session = session(dir.path());
        session.interceptor().arm("Deck", None).unwrap();
        assert_eq!(session.interceptor().state_label(), "armed");
        session.interceptor().disarm();
        assert!(session.files().completed().is_empty());
    }
}
