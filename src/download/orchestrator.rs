//! Strategy selection for delivering one artifact as a file.
//!
//! 1. Extraction: content read from the page, converted, handed to the
//!    download capability as a `data:` URL. No native download happens.
//! 2. Direct data: infographics exported as SVG or PNG from the page.
//! 3. Button click: the download menu is used with the interceptor armed so
//!    the native download is caught and re-issued under a proper name.

use crate::artifact::{Artifact, ArtifactKind, DomReference, ExtractionResult};
use crate::convert::filename::extension_of;
use crate::convert::{html_to_csv, render_note, render_source, sanitize_filename};
use crate::dom::wait::wait_until;
use crate::dom::NodeRef;
use crate::download::fetch::data_url;
use crate::download::intercept::{Interceptor, Retrieval};
use crate::download::retry::{Outcome, RetryPolicy};
use crate::download::{DownloadManager, DownloadRequest};
use crate::error::{Result, TakeoutError};
use crate::export::archive::Archive;
use crate::extract::report::ARTIFACT_ITEM;
use crate::extract::scan::MORE_BUTTON;
use crate::extract::{self, ItemTarget, PageContext};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MENU_PANEL: &str = ".mat-mdc-menu-panel, .cdk-overlay-pane";
const MENU_TIMEOUT: Duration = Duration::from_secs(2);
const MENU_ITEMS: &str = r#".mat-mdc-menu-item, [role="menuitem"], button"#;
const DOWNLOAD_BUTTON: &str = r#"button[aria-label*="Download"]"#;
const CAPTURE_POLL: Duration = Duration::from_millis(100);

/// Caller overrides for a single download
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct DownloadOptions {
    /// File name stem to use instead of the artifact title
    #[serde(default)]
    pub filename: Option<String>,

    /// Ask the download capability for a save dialog
    #[serde(default)]
    pub save_as: Option<bool>,

    /// Attempts before giving up (default from the configuration)
    #[serde(default)]
    pub attempts: Option<u32>,
}

/// Which strategy produced (or failed to produce) the file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Extraction,
    DirectData,
    ButtonClick,
}

/// Result of one download attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadReport {
    pub success: bool,
    pub strategy: Strategy,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_id: Option<String>,

    /// Set when the download may have happened but could not be confirmed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl DownloadReport {
    fn saved(strategy: Strategy, filename: String, download_id: String) -> Self {
        Self {
            success: true,
            strategy,
            filename: Some(filename),
            download_id: Some(download_id),
            warning: None,
            error: None,
        }
    }

    fn unconfirmed(warning: impl Into<String>) -> Self {
        Self {
            success: true,
            strategy: Strategy::ButtonClick,
            filename: None,
            download_id: None,
            warning: Some(warning.into()),
            error: None,
        }
    }
}

impl Outcome for DownloadReport {
    fn failure(&self) -> Option<String> {
        (!self.success).then(|| self.error.clone().unwrap_or_else(|| "download failed".to_string()))
    }
}

/// A file produced from page content, ready to hand to the download capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFile {
    pub filename: String,
    pub mime: String,
    pub bytes: Vec<u8>,
    pub strategy: Strategy,
}

impl RenderedFile {
    fn extracted(stem: &str, extension: &str, mime: &str, bytes: Vec<u8>) -> Self {
        Self {
            filename: format!("{}{}", sanitize_filename(stem), extension),
            mime: mime.to_string(),
            bytes,
            strategy: Strategy::Extraction,
        }
    }
}

/// Serialize an extraction into the file a user would expect
pub fn render_extraction(result: ExtractionResult) -> Result<RenderedFile> {
    match result {
        ExtractionResult::Source { title, content, guide } => Ok(RenderedFile::extracted(
            &title,
            ".md",
            "text/markdown",
            render_source(&title, &content, guide.as_ref()).into_bytes(),
        )),
        ExtractionResult::Html {
            title,
            content,
            citations,
            ..
        } => Ok(RenderedFile::extracted(
            &title,
            ".md",
            "text/markdown",
            render_note(&title, &content, &citations).into_bytes(),
        )),
        ExtractionResult::Table { title, html } => Ok(RenderedFile::extracted(
            &title,
            ".csv",
            "text/csv",
            html_to_csv(&html)?.into_bytes(),
        )),
        ExtractionResult::Mindmap { title, svg, tree } => {
            let stem = sanitize_filename(&title);
            let mut archive = Archive::new();
            archive.add(&format!("{}.svg", stem), svg.into_bytes());
            archive.add(&format!("{}.json", stem), serde_json::to_vec_pretty(&tree)?);
            Ok(RenderedFile::extracted(&title, ".zip", "application/zip", archive.to_bytes()?))
        }
        ExtractionResult::Failure { reason } => Err(TakeoutError::ExtractionEmpty(reason)),
    }
}

/// Delivers artifacts through the first applicable strategy
pub struct DownloadOrchestrator<'a> {
    ctx: PageContext<'a>,
    downloads: &'a dyn DownloadManager,
    interceptor: &'a Interceptor,
}

impl<'a> DownloadOrchestrator<'a> {
    pub fn new(ctx: PageContext<'a>, downloads: &'a dyn DownloadManager, interceptor: &'a Interceptor) -> Self {
        Self {
            ctx,
            downloads,
            interceptor,
        }
    }

    pub fn context(&self) -> &PageContext<'a> {
        &self.ctx
    }

    /// Produce the artifact's file from page content.
    ///
    /// `None` means the artifact has no readable representation and must go
    /// through its download menu.
    pub fn render_artifact(&self, artifact: &Artifact) -> Result<Option<RenderedFile>> {
        let target = ItemTarget::for_artifact(artifact);
        let ctx = &self.ctx;
        let extraction = match artifact.kind {
            Some(ArtifactKind::Report) => extract::extract_report(ctx, &target)?,
            Some(ArtifactKind::DataTable) => extract::extract_data_table(ctx, &target)?,
            Some(ArtifactKind::Note | ArtifactKind::Mindmap) => extract::extract_note(ctx, &target)?,
            Some(ArtifactKind::Source) => extract::extract_source(ctx, &target)?,
            Some(ArtifactKind::Infographic) => {
                let Some(item) = self.library_item(artifact)? else {
                    return Ok(None);
                };
                return Ok(extract::export_infographic(ctx, &item)?.map(|data| RenderedFile {
                    filename: format!("{}{}", sanitize_filename(&artifact.title), data.extension),
                    mime: data.mime,
                    bytes: data.bytes,
                    strategy: Strategy::DirectData,
                }));
            }
            Some(ArtifactKind::Audio | ArtifactKind::Slides) | None => return Ok(None),
        };
        render_extraction(extraction).map(Some)
    }

    fn library_item(&self, artifact: &Artifact) -> Result<Option<NodeRef>> {
        let position = match artifact.dom_reference {
            DomReference::ArtifactItem(position) => position,
            _ => return Ok(None),
        };
        Ok(self.ctx.page.query_all(None, ARTIFACT_ITEM)?.into_iter().nth(position))
    }

    /// Open the artifact's "More" menu and click its download entry.
    ///
    /// When the menu has no download entry it is dismissed with Escape and
    /// [`TakeoutError::NotFound`] is returned.
    pub fn click_download_menu(&self, artifact: &Artifact) -> Result<()> {
        let page = self.ctx.page;
        let index = artifact
            .index
            .ok_or_else(|| TakeoutError::NotFound(format!("download menu for '{}'", artifact.title)))?;
        let more = page
            .query_all(None, MORE_BUTTON)?
            .into_iter()
            .nth(index)
            .ok_or_else(|| TakeoutError::NotFound(format!("More button {}", index)))?;

        page.click(&more)?;
        self.ctx.clock.sleep(self.ctx.config.settle_delay);

        let item = match self.ctx.find(None, MENU_PANEL, MENU_TIMEOUT)? {
            Some(menu) => self.find_download_item(Some(&menu))?,
            None => self.find_download_item(None)?,
        };
        let Some(item) = item else {
            page.press_escape()?;
            return Err(TakeoutError::NotFound(format!("download option for '{}'", artifact.title)));
        };
        page.click(&item)
    }

    fn find_download_item(&self, scope: Option<&NodeRef>) -> Result<Option<NodeRef>> {
        let page = self.ctx.page;
        for candidate in page.query_all(scope, MENU_ITEMS)? {
            if page.text(&candidate)?.to_lowercase().contains("download") {
                return Ok(Some(candidate));
            }
        }
        page.query(scope, DOWNLOAD_BUTTON)
    }

    /// One attempt at delivering `artifact`
    pub fn download(&self, artifact: &Artifact, options: &DownloadOptions) -> Result<DownloadReport> {
        if let Some(mut file) = self.render_artifact(artifact)? {
            if let Some(stem) = &options.filename {
                let extension = extension_of(&file.filename).unwrap_or_default().to_string();
                file.filename = format!("{}{}", sanitize_filename(stem), extension);
            }
            let request = DownloadRequest::new(data_url(&file.mime, &file.bytes))
                .filename(file.filename.clone())
                .save_as(options.save_as.unwrap_or(self.ctx.config.save_as));
            let id = self.downloads.create(request)?;
            let saved = self.downloads.saved_name(&id).unwrap_or(file.filename);
            log::info!("Saved '{}' as {} ({:?})", artifact.title, saved, file.strategy);
            return Ok(DownloadReport::saved(file.strategy, saved, id.to_string()));
        }

        self.click_and_capture(artifact, options)
    }

    fn click_and_capture(&self, artifact: &Artifact, options: &DownloadOptions) -> Result<DownloadReport> {
        let name = options.filename.as_deref().unwrap_or(&artifact.title);
        self.interceptor.arm(name, artifact.kind)?;

        if let Err(e) = self.click_download_menu(artifact) {
            self.interceptor.disarm();
            return Err(e);
        }

        let interceptor = self.interceptor;
        let waited = wait_until(
            self.ctx.clock,
            self.ctx.config.capture_wait,
            CAPTURE_POLL,
            "captured download",
            || {
                Ok(match interceptor.retrieve() {
                    Retrieval::Captured(capture) => Some(Ok(capture)),
                    Retrieval::Failed(reason) => Some(Err(reason)),
                    Retrieval::NotCaptured => None,
                })
            },
        );

        match waited {
            Ok(Ok(capture)) => {
                let saved = self.downloads.saved_name(&capture.download_id).unwrap_or(capture.filename);
                log::info!("Captured '{}' as {}", artifact.title, saved);
                Ok(DownloadReport::saved(Strategy::ButtonClick, saved, capture.download_id.to_string()))
            }
            Ok(Err(reason)) => Err(TakeoutError::DownloadInterception(reason)),
            Err(TakeoutError::Timeout { .. }) => {
                self.interceptor.disarm();
                log::warn!("Download of '{}' started but was not captured", artifact.title);
                Ok(DownloadReport::unconfirmed(
                    "download started but was not captured; it may have been saved under the browser's default name",
                ))
            }
            Err(e) => Err(e),
        }
    }

    /// [`download`](Self::download) under a retry policy
    pub fn download_with_retry(
        &self,
        artifact: &Artifact,
        options: &DownloadOptions,
        attempts: u32,
    ) -> Result<DownloadReport> {
        RetryPolicy::new(attempts).run(self.ctx.clock, &artifact.title, |_| self.download(artifact, options))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TakeoutConfig;
    use crate::dom::{Clock, ManualClock, MemoryPage, PageEvent, Reaction};
    use crate::download::fetch::StaticFetcher;
    use crate::download::{DownloadItem, DownloadObserver, FsDownloads};
    use std::sync::Arc;

    const LIBRARY: &str = r#"<div class="library">
        <artifact-library-item><button aria-description="Audio Overview"></button><span class="artifact-title">Deep Dive</span><button aria-label="More"></button></artifact-library-item>
        <artifact-library-item><button aria-description="Report"></button><button class="artifact-button-content"><span class="artifact-title">Briefing</span></button><button aria-label="More"></button></artifact-library-item>
        </div>"#;

    fn menu(entry: &str) -> String {
        format!(r#"{}<div class="cdk-overlay-pane"><button class="mat-mdc-menu-item">{}</button></div>"#, LIBRARY, entry)
    }

    struct Harness {
        page: Arc<MemoryPage>,
        clock: Arc<ManualClock>,
        config: TakeoutConfig,
        downloads: Arc<FsDownloads>,
        interceptor: Arc<Interceptor>,
        _dir: tempfile::TempDir,
    }

    fn harness(page: MemoryPage) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let config = TakeoutConfig::default().with_download_dir(dir.path());
        let fetcher = StaticFetcher::new().serve("https://notebooklm.google.com/audio/1", "audio/wav", vec![1, 2, 3]);
        let downloads = Arc::new(FsDownloads::new(dir.path(), Arc::new(fetcher)));
        let clock = Arc::new(ManualClock::new());
        let interceptor = Arc::new(Interceptor::new(downloads.clone(), clock.clone(), &config));
        let observer: Arc<dyn DownloadObserver> = interceptor.clone();
        downloads.set_observer(Arc::downgrade(&observer));
        page.set_download_observer(Arc::downgrade(&observer));
        Harness {
            page: Arc::new(page),
            clock,
            config,
            downloads,
            interceptor,
            _dir: dir,
        }
    }

    impl Harness {
        fn orchestrator(&self) -> DownloadOrchestrator<'_> {
            let clock: &dyn Clock = self.clock.as_ref();
            DownloadOrchestrator::new(
                PageContext::new(self.page.as_ref(), clock, &self.config),
                self.downloads.as_ref(),
                &self.interceptor,
            )
        }
    }

    fn artifact(kind: ArtifactKind, title: &str, position: usize) -> Artifact {
        Artifact {
            id: format!("artifact-{}", position),
            kind: Some(kind),
            type_label: kind.label().to_string(),
            title: title.to_string(),
            details: None,
            index: Some(position),
            dom_reference: DomReference::ArtifactItem(position),
        }
    }

    #[test]
    fn test_audio_goes_through_interception() {
        let page = MemoryPage::new(LIBRARY)
            .on(PageEvent::Click, r#"button[aria-label="More"]"#, |_| Reaction::scene(menu("Download")))
            .on(PageEvent::Click, ".mat-mdc-menu-item", |_| {
                Reaction::scene(LIBRARY).with_download(
                    DownloadItem::new("native-1", "https://notebooklm.google.com/audio/1")
                        .with_referrer("https://notebooklm.google.com/notebook/x"),
                )
            });
        let h = harness(page);

        let report = h
            .orchestrator()
            .download(&artifact(ArtifactKind::Audio, "Deep Dive", 0), &DownloadOptions::default())
            .unwrap();
        assert!(report.success);
        assert_eq!(report.strategy, Strategy::ButtonClick);
        assert_eq!(report.filename.as_deref(), Some("Deep-Dive.wav"));
        assert!(h.downloads.dir().join("Deep-Dive.wav").exists());
        assert!(matches!(h.interceptor.retrieve(), Retrieval::NotCaptured));
    }

    #[test]
    fn test_menu_without_download_entry() {
        let page = MemoryPage::new(LIBRARY)
            .on(PageEvent::Click, r#"button[aria-label="More"]"#, |_| Reaction::scene(menu("Rename")))
            .on_key("Escape", || Reaction::scene(LIBRARY));
        let h = harness(page);

        let err = h
            .orchestrator()
            .download(&artifact(ArtifactKind::Slides, "Deck", 0), &DownloadOptions::default())
            .unwrap_err();
        assert!(matches!(err, TakeoutError::NotFound(_)));
        assert_eq!(h.interceptor.state_label(), "idle");
        assert_eq!(h.page.current_html(), LIBRARY);
    }

    #[test]
    fn test_uncaptured_click_is_a_warning() {
        let page = MemoryPage::new(LIBRARY)
            .on(PageEvent::Click, r#"button[aria-label="More"]"#, |_| Reaction::scene(menu("Download")))
            .on(PageEvent::Click, ".mat-mdc-menu-item", |_| Reaction::scene(LIBRARY));
        let h = harness(page);

        let report = h
            .orchestrator()
            .download(&artifact(ArtifactKind::Audio, "Deep Dive", 0), &DownloadOptions::default())
            .unwrap();
        assert!(report.success);
        assert!(report.warning.is_some());
        assert_eq!(h.interceptor.state_label(), "idle");
    }

    #[test]
    fn test_report_is_extracted_not_clicked() {
        let viewer = r#"<report-viewer><labs-tailwind-doc-viewer><h2>Summary</h2>
            <p>Enough report text to pass the minimum length threshold easily.</p></labs-tailwind-doc-viewer></report-viewer>"#;
        let page = MemoryPage::new(LIBRARY)
            .on(PageEvent::Click, "button.artifact-button-content", move |_| {
                Reaction::scene(format!("{}{}", LIBRARY, viewer))
            })
            .on_key("Escape", || Reaction::scene(LIBRARY));
        let h = harness(page);

        let options = DownloadOptions {
            filename: Some("My Briefing".to_string()),
            ..Default::default()
        };
        let report = h.orchestrator().download(&artifact(ArtifactKind::Report, "Briefing", 1), &options).unwrap();
        assert_eq!(report.strategy, Strategy::Extraction);
        assert_eq!(report.filename.as_deref(), Some("My-Briefing.md"));

        let saved = std::fs::read_to_string(h.downloads.dir().join("My-Briefing.md")).unwrap();
        assert!(saved.starts_with("# Briefing\n"));
        assert!(saved.contains("## Summary"));
        let clicks = h.page.actions().iter().filter(|a| a.starts_with("Click")).count();
        assert_eq!(clicks, 1);
    }

    #[test]
    fn test_repeat_download_reports_renamed_file() {
        let viewer = r#"<report-viewer><labs-tailwind-doc-viewer><h2>Summary</h2>
            <p>Enough report text to pass the minimum length threshold easily.</p></labs-tailwind-doc-viewer></report-viewer>"#;
        let page = MemoryPage::new(LIBRARY)
            .on(PageEvent::Click, "button.artifact-button-content", move |_| {
                Reaction::scene(format!("{}{}", LIBRARY, viewer))
            })
            .on_key("Escape", || Reaction::scene(LIBRARY));
        let h = harness(page);
        let briefing = artifact(ArtifactKind::Report, "Briefing", 1);

        let first = h.orchestrator().download(&briefing, &DownloadOptions::default()).unwrap();
        let second = h.orchestrator().download(&briefing, &DownloadOptions::default()).unwrap();
        assert_eq!(first.filename.as_deref(), Some("Briefing.md"));
        assert_eq!(second.filename.as_deref(), Some("Briefing (2).md"));
        assert!(h.downloads.dir().join("Briefing (2).md").exists());
    }

    #[test]
    fn test_retry_gives_up_after_attempts() {
        let h = harness(MemoryPage::new(LIBRARY));
        let err = h
            .orchestrator()
            .download_with_retry(&artifact(ArtifactKind::Report, "Missing", 5), &DownloadOptions::default(), 2)
            .unwrap_err();
        assert!(matches!(err, TakeoutError::NotFound(_)));
        assert_eq!(h.clock.sleeps().iter().filter(|d| **d == Duration::from_secs(1)).count(), 1);
    }

    #[test]
    fn test_failed_report_counts_as_failure() {
        let report = DownloadReport {
            success: false,
            strategy: Strategy::ButtonClick,
            filename: None,
            download_id: None,
            warning: None,
            error: Some("menu vanished".to_string()),
        };
        assert_eq!(report.failure().as_deref(), Some("menu vanished"));
        assert_eq!(DownloadReport::unconfirmed("x").failure(), None);
    }

    #[test]
    fn test_source_without_guide_keeps_source_layout() {
        let file = render_extraction(ExtractionResult::Source {
            title: "Paper".to_string(),
            content: "<p>Body text</p>".to_string(),
            guide: None,
        })
        .unwrap();
        assert_eq!(file.filename, "Paper.md");
        assert_eq!(String::from_utf8(file.bytes).unwrap(), "# Paper\n\n## Content\n\nBody text\n");

        let note = render_extraction(ExtractionResult::Html {
            title: "Paper".to_string(),
            content: "<p>Body text</p>".to_string(),
            citations: Vec::new(),
            warnings: Vec::new(),
        })
        .unwrap();
        assert!(!String::from_utf8(note.bytes).unwrap().contains("## Content"));
    }
}
