//! Notes and sources export.

use crate::artifact::{Artifact, ExtractionResult};
use crate::convert::{render_note, render_source, sanitize_filename};
use crate::download::orchestrator::render_extraction;
use crate::error::{Result, TakeoutError};
use crate::export::{Archive, ExportSummary, Exporter, ItemFailure, finish_status};
use crate::extract::{self, ItemTarget};

const NOTES_PREFIX: &str = "notebooklm-notes";
const SOURCES_PREFIX: &str = "notebooklm-sources";
const COMBINED_HEADING: &str = "# NotebookLM Notes";

/// A note rendered for the notes archive
enum ExportedNote {
    Markdown { stem: String, markdown: String },
    Mindmap { stem: String, result: ExtractionResult },
}

impl<'a> Exporter<'a> {
    /// Extract every note into one archive.
    ///
    /// A single mindmap on its own is saved as its own `.svg` + `.json` archive.
    pub fn export_notes(&self, notes: &[Artifact]) -> Result<ExportSummary> {
        let ctx = self.ctx();
        let progress = self.progress("Exporting notes", notes.len());
        let mut summary = ExportSummary {
            total: notes.len(),
            ..Default::default()
        };
        let mut exported = Vec::new();

        for (position, note) in notes.iter().enumerate() {
            if progress.cancelled() {
                summary.cancelled = true;
                break;
            }
            self.between_items(position, ctx.config.note_export_delay);
            progress.item(position, &note.title);

            match self.export_note(note) {
                Ok(item) => {
                    exported.push(item);
                    progress.done();
                }
                Err(e) => summary.failures.push(ItemFailure::new(note, &e)),
            }
        }
        summary.exported = exported.len();

        let saved = match exported.as_slice() {
            [] => None,
            [ExportedNote::Mindmap { result, .. }] => {
                let file = render_extraction(result.clone())?;
                Some(self.save(&file.filename, &file.mime, &file.bytes)?)
            }
            items => Some(self.save_archive(NOTES_PREFIX, &notes_archive(items)?)?),
        };

        summary.status = match &saved {
            Some(name) => finish_status(summary.exported, summary.total, summary.cancelled, Some(name)),
            None => "No notes exported".to_string(),
        };
        summary.files.extend(saved);
        progress.finish(&summary.status);
        Ok(summary)
    }

    fn export_note(&self, note: &Artifact) -> Result<ExportedNote> {
        let stem = sanitize_filename(&note.title);
        match extract::extract_note(self.ctx(), &ItemTarget::for_artifact(note))? {
            ExtractionResult::Html {
                title,
                content,
                citations,
                warnings,
                ..
            } => {
                for warning in &warnings {
                    log::warn!("'{}': {}", note.title, warning);
                }
                Ok(ExportedNote::Markdown {
                    stem,
                    markdown: render_note(&title, &content, &citations),
                })
            }
            result @ ExtractionResult::Mindmap { .. } => Ok(ExportedNote::Mindmap { stem, result }),
            ExtractionResult::Failure { reason } => Err(TakeoutError::ExtractionEmpty(reason)),
            ExtractionResult::Table { .. } | ExtractionResult::Source { .. } => Err(TakeoutError::ExtractionEmpty(
                format!("'{}' did not open as a note", note.title),
            )),
        }
    }

    /// Extract every source; one source is saved as markdown, several as an archive
    pub fn export_sources(&self, sources: &[Artifact]) -> Result<ExportSummary> {
        let ctx = self.ctx();
        let progress = self.progress("Exporting sources", sources.len());
        let mut summary = ExportSummary {
            total: sources.len(),
            ..Default::default()
        };
        let mut files = Vec::new();

        for (position, source) in sources.iter().enumerate() {
            if progress.cancelled() {
                summary.cancelled = true;
                break;
            }
            self.between_items(position, ctx.config.source_export_delay);
            progress.item(position, &source.title);

            match self.export_source(source) {
                Ok(file) => {
                    files.push(file);
                    progress.done();
                }
                Err(e) => summary.failures.push(ItemFailure::new(source, &e)),
            }
        }
        summary.exported = files.len();

        let saved = match files.as_slice() {
            [] => None,
            [(name, markdown)] if sources.len() == 1 => Some(self.save(name, "text/markdown", markdown.as_bytes())?),
            files => {
                let mut archive = Archive::new();
                for (name, markdown) in files {
                    archive.add(&format!("sources/{}", name), markdown.clone().into_bytes());
                }
                Some(self.save_archive(SOURCES_PREFIX, &archive)?)
            }
        };

        summary.status = match &saved {
            Some(name) => finish_status(summary.exported, summary.total, summary.cancelled, Some(name)),
            None => "No sources exported".to_string(),
        };
        summary.files.extend(saved);
        progress.finish(&summary.status);
        Ok(summary)
    }

    /// `(file name, markdown)` of one source
    fn export_source(&self, source: &Artifact) -> Result<(String, String)> {
        match extract::extract_source(self.ctx(), &ItemTarget::for_artifact(source))? {
            ExtractionResult::Source { title, content, guide } => Ok((
                format!("{}.md", sanitize_filename(&source.title)),
                render_source(&title, &content, guide.as_ref()),
            )),
            ExtractionResult::Failure { reason } => Err(TakeoutError::ExtractionEmpty(reason)),
            _ => Err(TakeoutError::ExtractionEmpty(format!(
                "'{}' has no readable content",
                source.title
            ))),
        }
    }
}

/// `notes/*.md`, `combined-notes.md` and `mindmaps/*.svg|.json`
fn notes_archive(items: &[ExportedNote]) -> Result<Archive> {
    let mut archive = Archive::new();
    let mut combined = Vec::new();

    for item in items {
        match item {
            ExportedNote::Markdown { stem, markdown } => {
                archive.add(&format!("notes/{}.md", stem), markdown.clone().into_bytes());
                combined.push(markdown.trim_end().to_string());
            }
            ExportedNote::Mindmap {
                stem,
                result: ExtractionResult::Mindmap { svg, tree, .. },
            } => {
                archive.add(&format!("mindmaps/{}.svg", stem), svg.clone().into_bytes());
                archive.add(&format!("mindmaps/{}.json", stem), serde_json::to_vec_pretty(tree)?);
            }
            ExportedNote::Mindmap { .. } => {}
        }
    }

    if !combined.is_empty() {
        let text = format!("{}\n\n{}\n", COMBINED_HEADING, combined.join("\n\n---\n\n"));
        archive.add("combined-notes.md", text.into_bytes());
    }
    Ok(archive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifact::{ArtifactKind, DomReference};
    use crate::dom::{MemoryPage, PageEvent, Reaction};
    use crate::download::StaticFetcher;
    use crate::export::testing::{Bench, unzip};

    const NOTES: &str = r#"<div class="notes">
        <artifact-library-note><span class="note-title">Plan</span><button class="artifact-button-content">open</button></artifact-library-note>
        <artifact-library-note><span class="note-title">Ideas</span><button class="artifact-button-content">open</button></artifact-library-note>
        </div>"#;

    fn note(title: &str, position: usize) -> Artifact {
        Artifact {
            id: format!("note-{}", position),
            kind: Some(ArtifactKind::Note),
            type_label: "Note".to_string(),
            title: title.to_string(),
            details: None,
            index: None,
            dom_reference: DomReference::Note(position),
        }
    }

    fn source(title: &str, position: usize) -> Artifact {
        Artifact {
            id: format!("source-{}", position),
            kind: Some(ArtifactKind::Source),
            type_label: "Source".to_string(),
            title: title.to_string(),
            details: None,
            index: None,
            dom_reference: DomReference::Source(position),
        }
    }

    fn notes_page() -> MemoryPage {
        MemoryPage::new(NOTES)
            .on(PageEvent::Click, "artifact-library-note", |el| {
                let title = el.text().collect::<String>();
                let body = if title.contains("Plan") { "Plan body" } else { "Ideas body" };
                Reaction::scene(format!(
                    r#"{}<rich-text-editor><div class="ql-editor"><p>{}</p></div></rich-text-editor>"#,
                    NOTES, body
                ))
            })
            .on_key("Escape", || Reaction::scene(NOTES))
    }

    #[test]
    fn test_notes_archive_layout() {
        let bench = Bench::new(notes_page(), StaticFetcher::new());
        let summary = bench.exporter().export_notes(&[note("Plan", 0), note("Ideas", 1)]).unwrap();
        assert_eq!(summary.exported, 2);
        assert!(summary.files[0].starts_with("notebooklm-notes-"));
        assert!(bench.clock.sleeps().contains(&bench.config.note_export_delay));

        let entries = unzip(&bench.read(&summary.files[0]));
        let names: Vec<_> = entries.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["notes/Plan.md", "notes/Ideas.md", "combined-notes.md"]);

        let combined = String::from_utf8(entries[2].1.clone()).unwrap();
        assert!(combined.starts_with("# NotebookLM Notes\n\n# Plan"));
        assert!(combined.contains("Plan body\n\n---\n\n# Ideas"));
    }

    #[test]
    fn test_missing_note_is_recorded() {
        let bench = Bench::new(notes_page(), StaticFetcher::new());
        let summary = bench.exporter().export_notes(&[note("Plan", 0), note("Gone", 9)]).unwrap();
        assert_eq!(summary.exported, 1);
        assert_eq!(summary.failures.len(), 1);
        assert_eq!(summary.failures[0].title, "Gone");
        assert_eq!(summary.files.len(), 1);
    }

    #[test]
    fn test_nothing_to_export() {
        let bench = Bench::new(MemoryPage::new("<div></div>"), StaticFetcher::new());
        let summary = bench.exporter().export_notes(&[]).unwrap();
        assert_eq!(summary.status, "No notes exported");
        assert!(bench.saved().is_empty());
    }

    const SOURCES: &str = r#"<div class="sources">
        <div class="single-source-container"><span class="icon">web</span><span class="source-title">site</span></div>
        <div class="single-source-container"><span class="icon">pdf</span><span class="source-title">paper.pdf</span></div>
        </div>"#;

    fn sources_page() -> MemoryPage {
        MemoryPage::new(SOURCES)
            .on(PageEvent::Click, ".single-source-container", |_| {
                Reaction::scene(format!(
                    r#"{}<source-viewer><div class="scroll-container"><p>Source text that is comfortably longer than fifty characters.</p></div></source-viewer>"#,
                    SOURCES
                ))
            })
            .on_key("Escape", || Reaction::scene(SOURCES))
    }

    #[test]
    fn test_single_source_is_plain_markdown() {
        let bench = Bench::new(sources_page(), StaticFetcher::new());
        let summary = bench.exporter().export_sources(&[source("site", 0)]).unwrap();
        assert_eq!(summary.files, vec!["site.md".to_string()]);
        let markdown = String::from_utf8(bench.read("site.md")).unwrap();
        assert!(markdown.starts_with("# site"));
        assert!(markdown.contains("## Content"));
    }

    #[test]
    fn test_several_sources_are_zipped() {
        let bench = Bench::new(sources_page(), StaticFetcher::new());
        let summary = bench
            .exporter()
            .export_sources(&[source("site", 0), source("paper.pdf", 1)])
            .unwrap();
        assert!(summary.files[0].starts_with("notebooklm-sources-"));
        let entries = unzip(&bench.read(&summary.files[0]));
        assert_eq!(entries[0].0, "sources/site.md");
        assert_eq!(entries[1].0, "sources/paper.pdf.md");
        assert!(bench.clock.sleeps().contains(&bench.config.source_export_delay));
    }
}
