//! Listing what the notebook page offers for export.

use crate::artifact::{Artifact, ArtifactKind, DomReference};
use crate::dom::Page;
use crate::error::Result;
use crate::extract::note::{NOTE_ITEM, NOTE_TITLE};
use crate::extract::report::{ARTIFACT_ITEM, ARTIFACT_TITLE};
use crate::extract::source::{SOURCE_ITEM, SOURCE_TITLE};

pub(crate) const MORE_BUTTON: &str = r#"button[aria-label="More"]"#;
const TYPE_BUTTON: &str = "button[aria-description]";
const DETAILS: &str = ".artifact-details";
const NOTE_ICON: &str = "mat-icon.artifact-icon";
const SOURCE_ICON: &str = ".source-item-source-icon";

/// Artifacts of the library panel.
///
/// `index` is the position of the item's "More" button among all "More"
/// buttons on the page, which is how the download menu is reached later.
pub fn scan_artifacts(page: &dyn Page) -> Result<Vec<Artifact>> {
    let more_buttons = page.query_all(None, MORE_BUTTON)?;
    let mut artifacts = Vec::new();

    for (position, item) in page.query_all(None, ARTIFACT_ITEM)?.into_iter().enumerate() {
        let type_label = match page.query(Some(&item), TYPE_BUTTON)? {
            Some(button) => page.attribute(&button, "aria-description")?.unwrap_or_default(),
            None => String::new(),
        };
        let kind = ArtifactKind::from_label(&type_label);
        let title = page
            .query_text(Some(&item), ARTIFACT_TITLE)?
            .unwrap_or_else(|| format!("Artifact {}", position + 1));
        let index = match page.query(Some(&item), MORE_BUTTON)? {
            Some(more) => more_buttons.iter().position(|b| *b == more),
            None => None,
        };

        artifacts.push(Artifact {
            id: format!("artifact-{}", position),
            kind,
            type_label,
            title,
            details: page.query_text(Some(&item), DETAILS)?,
            index,
            dom_reference: DomReference::ArtifactItem(position),
        });
    }

    log::debug!("Scanned {} artifacts", artifacts.len());
    Ok(artifacts)
}

/// Notes of the notes panel; mindmap notes show the `flowchart` icon
pub fn scan_notes(page: &dyn Page) -> Result<Vec<Artifact>> {
    let mut notes = Vec::new();
    for (position, item) in page.query_all(None, NOTE_ITEM)?.into_iter().enumerate() {
        let icon = page.query_text(Some(&item), NOTE_ICON)?;
        let kind = if icon.as_deref() == Some("flowchart") {
            ArtifactKind::Mindmap
        } else {
            ArtifactKind::Note
        };
        notes.push(Artifact {
            id: format!("note-{}", position),
            kind: Some(kind),
            type_label: kind.label().to_string(),
            title: page
                .query_text(Some(&item), NOTE_TITLE)?
                .unwrap_or_else(|| format!("Note {}", position + 1)),
            details: None,
            index: None,
            dom_reference: DomReference::Note(position),
        });
    }
    Ok(notes)
}

/// Visible sources; `details` carries the source's icon name
pub fn scan_sources(page: &dyn Page) -> Result<Vec<Artifact>> {
    let mut sources = Vec::new();
    for (position, item) in page.query_all(None, SOURCE_ITEM)?.into_iter().enumerate() {
        if !page.is_visible(&item)? {
            continue;
        }
        sources.push(Artifact {
            id: format!("source-{}", position),
            kind: Some(ArtifactKind::Source),
            type_label: ArtifactKind::Source.label().to_string(),
            title: page
                .query_text(Some(&item), SOURCE_TITLE)?
                .unwrap_or_else(|| format!("Source {}", position + 1)),
            details: Some(
                page.query_text(Some(&item), SOURCE_ICON)?
                    .unwrap_or_else(|| "document".to_string()),
            ),
            index: None,
            dom_reference: DomReference::Source(position),
        });
    }
    Ok(sources)
}
