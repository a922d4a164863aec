//! "Download all": every artifact into one archive, or one file each.

use crate::artifact::Artifact;
use crate::convert::{choose_extension, sanitize_filename};
use crate::dom::FetchedFile;
use crate::dom::wait::wait_until;
use crate::download::retry::{Outcome, RetryPolicy};
use crate::download::{BatchCapture, DownloadOptions};
use crate::error::Result;
use crate::export::{Archive, ExportSummary, Exporter, ItemFailure, Progress, finish_status};

const ARCHIVE_PREFIX: &str = "notebooklm-export";

/// One file collected for the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Outcome for CollectedFile {}

impl<'a> Exporter<'a> {
    /// Export `artifacts` as one archive (`zip`) or as individual downloads
    pub fn download_all(&self, artifacts: &[Artifact], zip: bool) -> Result<ExportSummary> {
        if zip {
            self.run_zip(artifacts)
        } else {
            self.run_sequential(artifacts)
        }
    }

    /// Collect every artifact, then save a single archive.
    ///
    /// A second batch while one is running is a no-op. A cancelled batch
    /// still saves what it collected so far.
    pub fn run_zip(&self, artifacts: &[Artifact]) -> Result<ExportSummary> {
        if !self.interceptor.begin_batch() {
            return Ok(ExportSummary::already_running(artifacts.len()));
        }
        let progress = self.progress("Downloading", artifacts.len());
        let (archive, failures, cancelled) = self.collect(artifacts, &progress);
        self.interceptor.end_batch();

        let mut summary = ExportSummary {
            exported: archive.len(),
            total: artifacts.len(),
            failures,
            cancelled,
            ..Default::default()
        };

        if archive.is_empty() {
            summary.status = "No files downloaded".to_string();
            progress.finish(&summary.status);
            return Ok(summary);
        }

        let name = match self.save_archive(ARCHIVE_PREFIX, &archive) {
            Ok(name) => name,
            Err(e) => {
                progress.finish(&format!("Export failed: {}", e));
                return Err(e);
            }
        };
        summary.status = finish_status(summary.exported, summary.total, cancelled, Some(&name));
        summary.files.push(name);
        progress.finish(&summary.status);
        Ok(summary)
    }

    fn collect(&self, artifacts: &[Artifact], progress: &Progress<'_>) -> (Archive, Vec<ItemFailure>, bool) {
        let ctx = self.ctx();
        let policy = RetryPolicy::new(ctx.config.batch_attempts);
        let mut archive = Archive::new();
        let mut failures = Vec::new();
        let mut cancelled = false;

        for (position, artifact) in artifacts.iter().enumerate() {
            if progress.cancelled() {
                log::info!("Batch cancelled after {} of {} items", position, artifacts.len());
                cancelled = true;
                break;
            }
            self.between_items(position, ctx.config.batch_item_delay);
            progress.item(position, &artifact.title);

            match policy.run(ctx.clock, &artifact.title, |_| self.capture_item(artifact)) {
                Ok(file) => {
                    let stored = archive.add(&file.filename, file.bytes);
                    log::debug!("Collected '{}' as {}", artifact.title, stored);
                    progress.done();
                }
                Err(e) => failures.push(ItemFailure::new(artifact, &e)),
            }
        }
        (archive, failures, cancelled)
    }

    /// Produce one artifact's file without saving it
    pub fn capture_item(&self, artifact: &Artifact) -> Result<CollectedFile> {
        if let Some(file) = self.orchestrator.render_artifact(artifact)? {
            return Ok(CollectedFile {
                filename: file.filename,
                bytes: file.bytes,
            });
        }

        let ctx = self.ctx();
        self.interceptor.set_batch_pending(&artifact.title, artifact.kind)?;
        self.orchestrator.click_download_menu(artifact)?;
        ctx.clock.sleep(ctx.config.batch_capture_initial_delay);

        let interceptor = self.interceptor;
        let capture = wait_until(
            ctx.clock,
            ctx.config.batch_capture_timeout,
            ctx.config.batch_capture_poll,
            "batch download",
            || Ok(interceptor.take_batch_capture()),
        )?;

        let file = self.fetch_capture(&capture)?;
        if let Err(e) = self
            .downloads
            .cancel(&capture.download_id)
            .and_then(|_| self.downloads.erase(&capture.download_id))
        {
            log::debug!("Could not drop native download {}: {}", capture.download_id, e);
        }

        let mime = file.mime.as_deref().or(capture.mime.as_deref());
        let filename = format!(
            "{}{}",
            sanitize_filename(&capture.name),
            choose_extension(capture.filename.as_deref(), mime, capture.kind)
        );
        Ok(CollectedFile {
            filename,
            bytes: file.bytes,
        })
    }

    /// Direct fetch first, then the page's credentialed fetch
    fn fetch_capture(&self, capture: &BatchCapture) -> Result<FetchedFile> {
        match self.fetcher.fetch(&capture.url) {
            Ok(file) => Ok(file),
            Err(e) => {
                log::debug!("Direct fetch of {} failed ({}), fetching through the page", capture.url, e);
                self.ctx().page.fetch_with_credentials(&capture.url)
            }
        }
    }

    /// Download each artifact on its own, with retries
    pub fn run_sequential(&self, artifacts: &[Artifact]) -> Result<ExportSummary> {
        let ctx = self.ctx();
        let progress = self.progress("Downloading", artifacts.len());
        let options = DownloadOptions::default();
        let mut summary = ExportSummary {
            total: artifacts.len(),
            ..Default::default()
        };

        for (position, artifact) in artifacts.iter().enumerate() {
            if progress.cancelled() {
                summary.cancelled = true;
                break;
            }
            self.between_items(position, ctx.config.sequential_item_delay);
            progress.item(position, &artifact.title);

            match self
                .orchestrator
                .download_with_retry(artifact, &options, ctx.config.batch_attempts)
            {
                Ok(report) => {
                    if let Some(warning) = &report.warning {
                        log::warn!("'{}': {}", artifact.title, warning);
                    }
                    summary.exported += 1;
                    summary.files.extend(report.filename);
                    progress.done();
                }
                Err(e) => summary.failures.push(ItemFailure::new(artifact, &e)),
            }
        }

        summary.status = finish_status(summary.exported, summary.total, summary.cancelled, None);
        progress.finish(&summary.status);
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactKind, DomReference};
    use crate::dom::{MemoryPage, PageEvent, Reaction};
    use crate::download::{DownloadItem, StaticFetcher};
    use crate::export::CancelFlag;
    use crate::export::testing::{Bench, unzip};

    const AUDIO_URL: &str = "https://notebooklm.google.com/audio/1";

    const LIBRARY: &str = r#"<div class="library">
        <artifact-library-item><button aria-description="Audio Overview"></button><span class="artifact-title">Deep Dive</span><button aria-label="More"></button></artifact-library-item>
        <artifact-library-item><button aria-description="Report"></button><button class="artifact-button-content"><span class="artifact-title">Briefing</span></button><button aria-label="More"></button></artifact-library-item>
        </div>"#;

    const REPORT: &str = r#"<report-viewer><labs-tailwind-doc-viewer><h2>Summary</h2>
        <p>Enough report text to pass the minimum length threshold easily.</p></labs-tailwind-doc-viewer></report-viewer>"#;

    fn library_page(cancel_on_open: Option<CancelFlag>) -> MemoryPage {
        MemoryPage::new(LIBRARY)
            .on(PageEvent::Click, r#"button[aria-label="More"]"#, |_| {
                Reaction::scene(format!(
                    r#"{}<div class="cdk-overlay-pane"><button class="mat-mdc-menu-item">Download</button></div>"#,
                    LIBRARY
                ))
            })
            .on(PageEvent::Click, ".mat-mdc-menu-item", |_| {
                Reaction::scene(LIBRARY).with_download(
                    DownloadItem::new("native-1", AUDIO_URL).with_referrer("https://notebooklm.google.com/notebook/x"),
                )
            })
            .on(PageEvent::Click, "button.artifact-button-content", move |_| {
                if let Some(flag) = &cancel_on_open {
                    flag.cancel();
                }
                Reaction::scene(format!("{}{}", LIBRARY, REPORT))
            })
            .on_key("Escape", || Reaction::scene(LIBRARY))
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

    fn archive_of(bench: &Bench) -> Vec<(String, Vec<u8>)> {
        let saved = bench.saved();
        let zip = saved
            .iter()
            .find(|p| p.extension().is_some_and(|e| e == "zip"))
            .expect("archive saved");
        unzip(&std::fs::read(zip).unwrap())
    }

    #[test]
    fn test_zip_collects_clicked_and_extracted_items() {
        let bench = Bench::new(library_page(None), StaticFetcher::new().serve(AUDIO_URL, "audio/wav", vec![1, 2, 3]));
        let artifacts = vec![
            artifact(ArtifactKind::Audio, "Deep Dive", 0),
            artifact(ArtifactKind::Report, "Briefing", 1),
        ];

        let summary = bench.exporter().download_all(&artifacts, true).unwrap();
        assert_eq!(summary.exported, 2);
        assert!(summary.failures.is_empty());
        assert_eq!(summary.files.len(), 1);
        assert!(summary.files[0].starts_with("notebooklm-export-"));
        assert!(summary.status.starts_with("Exported 2 of 2 items"));

        let entries = archive_of(&bench);
        let names: Vec<_> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["Deep-Dive.wav", "Briefing.md"]);
        assert_eq!(entries[0].1, vec![1, 2, 3]);
        assert!(!bench.interceptor.batch_active());
        assert!(!bench.status.snapshot().running);
    }

    #[test]
    fn test_page_fetch_fallback() {
        let page = library_page(None).serve(AUDIO_URL, "audio/mpeg", vec![9]);
        let bench = Bench::new(page, StaticFetcher::new());

        let file = {
            assert!(bench.interceptor.begin_batch());
            let file = bench.exporter().capture_item(&artifact(ArtifactKind::Audio, "Deep Dive", 0)).unwrap();
            bench.interceptor.end_batch();
            file
        };
        assert_eq!(file.filename, "Deep-Dive.mp3");
        assert_eq!(file.bytes, vec![9]);
        assert!(bench.page.actions().contains(&format!("Fetch {}", AUDIO_URL)));
        assert_eq!(bench.fetcher.requests(), vec![AUDIO_URL.to_string()]);
    }

    #[test]
    fn test_cancelled_batch_keeps_partial_archive() {
        let flag = CancelFlag::new();
        let mut bench = Bench::new(library_page(Some(flag.clone())), StaticFetcher::new());
        bench.cancel = flag;
        let artifacts = vec![
            artifact(ArtifactKind::Report, "Briefing", 1),
            artifact(ArtifactKind::Audio, "Deep Dive", 0),
        ];

        let summary = bench.exporter().download_all(&artifacts, true).unwrap();
        assert!(summary.cancelled);
        assert_eq!(summary.exported, 1);
        assert!(summary.status.starts_with("Cancelled: exported 1 of 2 items"));
        let entries = archive_of(&bench);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "Briefing.md");
    }

    #[test]
    fn test_nothing_collected_saves_nothing() {
        let bench = Bench::new(MemoryPage::new(LIBRARY), StaticFetcher::new());
        let summary = bench
            .exporter()
            .download_all(&[artifact(ArtifactKind::Slides, "Deck", 7)], true)
            .unwrap();
        assert_eq!(summary.status, "No files downloaded");
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].title, "Deck");
        assert!(bench.saved().is_empty());
    }

    #[test]
    fn test_second_batch_is_a_noop() {
        let bench = Bench::new(MemoryPage::new(LIBRARY), StaticFetcher::new());
        assert!(bench.interceptor.begin_batch());
        let summary = bench
            .exporter()
            .download_all(&[artifact(ArtifactKind::Report, "Briefing", 1)], true)
            .unwrap();
        assert_eq!(summary.status, "A batch export is already running");
        assert!(bench.interceptor.batch_active());
        assert!(bench.page.actions().is_empty());
    }

    #[test]
    fn test_sequential_saves_each_item() {
        let bench = Bench::new(library_page(None), StaticFetcher::new().serve(AUDIO_URL, "audio/wav", vec![1]));
        let artifacts = vec![
            artifact(ArtifactKind::Report, "Briefing", 1),
            artifact(ArtifactKind::Audio, "Deep Dive", 0),
        ];

        let summary = bench.exporter().download_all(&artifacts, false).unwrap();
        assert_eq!(summary.exported, 2);
        assert_eq!(summary.files, vec!["Briefing.md".to_string(), "Deep-Dive.wav".to_string()]);
        assert!(bench.dir.path().join("Briefing.md").exists());
        assert!(bench.dir.path().join("Deep-Dive.wav").exists());
        assert!(bench.clock.sleeps().contains(&bench.config.sequential_item_delay));
    }
}
