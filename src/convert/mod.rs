//! Converters from page markup to exported file formats
//!
//! - [`markdown`]: HTML → Markdown with citation cross-references
//! - [`csv`]: table markup → CSV
//! - [`svg`]: live SVG → standalone SVG document
//! - [`filename`]: safe file names and extension inference

pub mod csv;
pub mod filename;
pub mod markdown;
pub mod svg;

pub use csv::html_to_csv;
pub use filename::{choose_extension, sanitize_filename, timestamp_slug, unique_name};
pub use markdown::{CitationIndex, MarkdownRenderer, html_to_markdown, render_note, render_source};
pub use svg::{StyleTarget, SvgExport};
