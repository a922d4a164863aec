use crate::browser::config::{ConnectionOptions, LaunchOptions};
use crate::error::{Result, TakeoutError};
use headless_chrome::{Browser, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

/// Chrome/Chromium instance hosting the notebook tab
pub struct BrowserSession {
    browser: Browser,
}

impl BrowserSession {
    /// Launch a new browser instance with the given options
    pub fn launch(options: LaunchOptions) -> Result<Self> {
        let mut launch_opts = headless_chrome::LaunchOptions::default();

        // Keep the automation banner and flag away from the notebook app
        launch_opts.ignore_default_args.push(OsStr::new("--enable-automation"));
        launch_opts.args.push(OsStr::new("--disable-blink-features=AutomationControlled"));

        // Exports can run for many minutes between CDP calls
        launch_opts.idle_browser_timeout = Duration::from_secs(60 * 60);

        launch_opts.headless = options.headless;
        launch_opts.window_size = Some((options.window_width, options.window_height));
        launch_opts.path = options.chrome_path;
        launch_opts.user_data_dir = options.user_data_dir;
        launch_opts.sandbox = options.sandbox;

        let browser = Browser::new(launch_opts).map_err(|e| TakeoutError::LaunchFailed(e.to_string()))?;
        let tab = browser
            .new_tab()
            .map_err(|e| TakeoutError::LaunchFailed(format!("Failed to create tab: {}", e)))?;

        if let Some(url) = &options.start_url {
            tab.navigate_to(url)
                .and_then(|tab| tab.wait_until_navigated())
                .map_err(|e| TakeoutError::NavigationFailed(format!("Failed to open {}: {}", url, e)))?;
        }

        Ok(Self { browser })
    }

    /// Connect to an existing browser instance via WebSocket
    pub fn connect(options: ConnectionOptions) -> Result<Self> {
        let browser = Browser::connect_with_timeout(options.ws_url, Duration::from_millis(options.timeout))
            .map_err(|e| TakeoutError::ConnectionFailed(e.to_string()))?;

        Ok(Self { browser })
    }

    pub fn browser(&self) -> &Browser {
        &self.browser
    }

    pub fn get_tabs(&self) -> Result<Vec<Arc<Tab>>> {
        let tabs = self
            .browser
            .get_tabs()
            .lock()
            .map_err(|e| TakeoutError::TabOperationFailed(format!("Failed to get tabs: {}", e)))?
            .clone();

        Ok(tabs)
    }

    /// The tab showing the notebook.
    ///
    /// Prefers a tab already on the notebook app, then a visible focused tab,
    /// then any visible tab.
    pub fn tab(&self) -> Result<Arc<Tab>> {
        let tabs = self.get_tabs()?;

        if let Some(tab) = tabs.iter().find(|tab| tab.get_url().contains("notebooklm.google.com")) {
            return Ok(tab.clone());
        }

        for script in [
            "document.visibilityState === 'visible' && document.hasFocus()",
            "document.visibilityState === 'visible'",
        ] {
            for tab in &tabs {
                match tab.evaluate(script, false) {
                    Ok(remote_object) => {
                        if remote_object.value.and_then(|v| v.as_bool()).unwrap_or(false) {
                            return Ok(tab.clone());
                        }
                    }
                    Err(e) => log::debug!("Failed to check tab status: {}", e),
                }
            }
        }

        tabs.into_iter()
            .next()
            .ok_or_else(|| TakeoutError::TabOperationFailed("No tab found".to_string()))
    }

    /// Navigate the notebook tab and wait for the load to finish
    pub fn navigate(&self, url: &str) -> Result<()> {
        self.tab()?
            .navigate_to(url)
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| TakeoutError::NavigationFailed(format!("Failed to navigate to {}: {}", url, e)))?;

        Ok(())
    }

    /// Navigate back in browser history
    pub fn go_back(&self) -> Result<()> {
        self.tab()?
            .evaluate("(function() { window.history.back(); return true; })()", false)
            .map_err(|e| TakeoutError::NavigationFailed(format!("Failed to go back: {}", e)))?;

        // History navigation has no load event to wait on
        std::thread::sleep(Duration::from_millis(300));

        Ok(())
    }
}
