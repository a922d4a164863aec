use crate::artifact::ArtifactKind;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

const MAX_NAME_CHARS: usize = 100;

static RESERVED: Lazy<Regex> = Lazy::new(|| Regex::new(r#"[<>:"/\\|?*\x00-\x1f]"#).expect("valid regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static DASHES: Lazy<Regex> = Lazy::new(|| Regex::new(r"-+").expect("valid regex"));

/// Make a title safe to use as a file name (without extension)
pub fn sanitize_filename(title: &str) -> String {
    let name = RESERVED.replace_all(title.trim(), "_");
    let name = WHITESPACE.replace_all(&name, "-");
    let name = DASHES.replace_all(&name, "-");
    let name: String = name.chars().take(MAX_NAME_CHARS).collect();
    if name.is_empty() { "untitled".to_string() } else { name }
}

/// Extension of a file name including the dot, e.g. `".pdf"`
pub fn extension_of(filename: &str) -> Option<&str> {
    let base = filename.rsplit(['/', '\\']).next().unwrap_or(filename);
    let dot = base.rfind('.')?;
    let ext = &base[dot..];
    if dot == 0 || ext.len() < 2 || ext.len() > 10 || ext.contains(char::is_whitespace) {
        return None;
    }
    Some(ext)
}

/// Extension for a MIME type, ignoring parameters
pub fn extension_for_mime(mime: &str) -> Option<&'static str> {
    let essence = mime.split(';').next().unwrap_or(mime).trim().to_ascii_lowercase();
    let ext = match essence.as_str() {
        "image/png" => ".png",
        "image/jpeg" => ".jpg",
        "image/svg+xml" => ".svg",
        "application/pdf" => ".pdf",
        "audio/wav" | "audio/x-wav" => ".wav",
        "audio/mpeg" => ".mp3",
        "video/mp4" => ".mp4",
        "text/markdown" => ".md",
        "text/csv" => ".csv",
        "application/zip" => ".zip",
        _ => return None,
    };
    Some(ext)
}

/// Extension assumed for an artifact kind when nothing better is known
pub fn extension_for_kind(kind: ArtifactKind) -> Option<&'static str> {
    match kind {
        ArtifactKind::Infographic => Some(".png"),
        ArtifactKind::Slides => Some(".pdf"),
        ArtifactKind::Audio => Some(".wav"),
        ArtifactKind::Report | ArtifactKind::Note | ArtifactKind::Source => Some(".md"),
        ArtifactKind::DataTable => Some(".csv"),
        ArtifactKind::Mindmap => Some(".svg"),
    }
}

/// Pick an extension from the native name, then the MIME type, then the kind
pub fn choose_extension(native_name: Option<&str>, mime: Option<&str>, kind: Option<ArtifactKind>) -> String {
    native_name
        .and_then(extension_of)
        .or_else(|| mime.and_then(extension_for_mime))
        .or_else(|| kind.and_then(extension_for_kind))
        .unwrap_or(".bin")
        .to_string()
}

/// File-name-safe UTC timestamp, e.g. `2026-10-19T08-30-00`
pub fn timestamp_slug(now: DateTime<Utc>) -> String {
    now.format("%Y-%m-%dT%H-%M-%S").to_string()
}

/// `name` unless already taken, otherwise `stem (n).ext` with the first free `n`
pub fn unique_name(name: &str, taken: &HashSet<String>) -> String {
    if !taken.contains(name) {
        return name.to_string();
    }
    let (stem, ext) = match extension_of(name) {
        Some(ext) => (&name[..name.len() - ext.len()], ext),
        None => (name, ""),
    };
    (2..)
        .map(|n| format!("{} ({}){}", stem, n, ext))
        .find(|candidate| !taken.contains(candidate))
        .unwrap_or_else(|| name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("Q3 Plan: draft / v2?"), "Q3-Plan_-draft-_-v2_");
        assert_eq!(sanitize_filename("  a   -- b  "), "a-b");
        assert_eq!(sanitize_filename("   "), "untitled");
        assert_eq!(sanitize_filename(&"é".repeat(150)).chars().count(), 100);
    }

    #[test]
    fn test_extension_of() {
        assert_eq!(extension_of("deck.pdf"), Some(".pdf"));
        assert_eq!(extension_of("archive.tar.gz"), Some(".gz"));
        assert_eq!(extension_of("no_extension"), None);
        assert_eq!(extension_of(".hidden"), None);
        assert_eq!(extension_of("dir.v2/file"), None);
    }

    #[test]
    fn test_choose_extension_priority() {
        assert_eq!(choose_extension(Some("x.mp4"), Some("audio/wav"), Some(ArtifactKind::Audio)), ".mp4");
        assert_eq!(choose_extension(None, Some("audio/mpeg; charset=binary"), Some(ArtifactKind::Audio)), ".mp3");
        assert_eq!(choose_extension(Some("download"), None, Some(ArtifactKind::Slides)), ".pdf");
        assert_eq!(choose_extension(None, Some("application/octet-stream"), None), ".bin");
    }

    #[test]
    fn test_timestamp_slug() {
        let at = Utc.with_ymd_and_hms(2026, 10, 19, 8, 30, 5).unwrap();
        assert_eq!(timestamp_slug(at), "2026-10-19T08-30-05");
    }

    #[test]
    fn test_unique_name() {
        let mut taken = HashSet::new();
        assert_eq!(unique_name("a.md", &taken), "a.md");
        taken.insert("a.md".to_string());
        taken.insert("a (2).md".to_string());
        assert_eq!(unique_name("a.md", &taken), "a (3).md");
        taken.insert("notes".to_string());
        assert_eq!(unique_name("notes", &taken), "notes (2)");
    }
}
