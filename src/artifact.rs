//! Artifacts discovered on the notebook page and what extraction yields for them.

use crate::extract::mindmap::MindmapTree;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kinds of user-generated artifacts the notebook can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub enum ArtifactKind {
    #[serde(alias = "Audio Overview", alias = "audio")]
    Audio,
    #[serde(alias = "Slide Deck", alias = "slides")]
    Slides,
    #[serde(alias = "infographic")]
    Infographic,
    #[serde(alias = "report")]
    Report,
    #[serde(alias = "Data Table", alias = "data_table")]
    DataTable,
    #[serde(alias = "note")]
    Note,
    #[serde(alias = "Mind Map", alias = "mindmap")]
    Mindmap,
    #[serde(alias = "source")]
    Source,
}

impl ArtifactKind {
    /// Classify a type label as shown by the page (e.g. "Audio Overview")
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.to_ascii_lowercase();
        let kind = if label.contains("audio") {
            Self::Audio
        } else if label.contains("slide") {
            Self::Slides
        } else if label.contains("infographic") {
            Self::Infographic
        } else if label.contains("table") {
            Self::DataTable
        } else if label.contains("mind") {
            Self::Mindmap
        } else if label.contains("report") {
            Self::Report
        } else if label.contains("note") {
            Self::Note
        } else if label.contains("source") {
            Self::Source
        } else {
            return None;
        };
        Some(kind)
    }

    /// Human-readable name used in fallback titles
    pub fn label(&self) -> &'static str {
        match self {
            Self::Audio => "Audio Overview",
            Self::Slides => "Slides",
            Self::Infographic => "Infographic",
            Self::Report => "Report",
            Self::DataTable => "Data Table",
            Self::Note => "Note",
            Self::Mindmap => "Mindmap",
            Self::Source => "Source",
        }
    }

    /// Bucket used by the capture tally
    pub fn category(&self) -> &'static str {
        match self {
            Self::Audio => "audio",
            Self::Slides => "slides",
            Self::Infographic => "infographics",
            Self::Report => "reports",
            Self::DataTable => "tables",
            Self::Note => "notes",
            Self::Mindmap => "mindmaps",
            Self::Source => "sources",
        }
    }

    /// Whether the content can be read from the page instead of downloaded
    pub fn is_extractable(&self) -> bool {
        matches!(
            self,
            Self::Report | Self::DataTable | Self::Note | Self::Mindmap | Self::Source
        )
    }
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Which list on the page an artifact came from, and its position there
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "list", content = "position", rename_all = "snake_case")]
pub enum DomReference {
    ArtifactItem(usize),
    Note(usize),
    Source(usize),
}

/// An exportable item found by a scan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,

    /// `None` when the page shows a type this crate does not know
    pub kind: Option<ArtifactKind>,

    /// Type label as shown by the page
    pub type_label: String,

    pub title: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,

    /// Position among the "More" buttons, used to open the download menu
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,

    pub dom_reference: DomReference,
}

/// One unique source cited by a note
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Citation {
    /// Sequential number shown to the reader, starting at 1
    pub display_index: usize,

    /// Source file name from the tooltip footer
    pub source_title: String,

    /// Quoted passage, as markdown
    pub quote_text: String,

    /// Identifier the page uses for the source (the marker label)
    pub original_source_id: String,
}

/// Summary and key topics shown beside a source
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceGuide {
    pub summary_html: String,
    pub key_topics: Vec<String>,
}

/// Outcome of one extraction; never an empty success
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ExtractionResult {
    Html {
        title: String,
        content: String,
        citations: Vec<Citation>,
        /// Per-citation problems that did not stop the extraction
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        warnings: Vec<String>,
    },
    /// A source document; rendered with its guide and a `## Content` section
    Source {
        title: String,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        guide: Option<SourceGuide>,
    },
    Mindmap {
        title: String,
        svg: String,
        tree: MindmapTree,
    },
    Table {
        title: String,
        html: String,
    },
    Failure {
        reason: String,
    },
}

impl ExtractionResult {
    /// Fold an extraction error into a typed failure
    pub fn from_result(result: crate::error::Result<ExtractionResult>) -> Self {
        result.unwrap_or_else(|e| Self::Failure { reason: e.to_string() })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }
}
