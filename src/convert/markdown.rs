//! HTML → Markdown conversion.
//!
//! Rules are checked per element in a fixed order: tables, lists,
//! blockquotes, ARIA headings, citation markers, then the standard inline and
//! block mappings. Citation markers become superscript links numbered by
//! display number, and a trailing Sources section lists each source once.

use crate::artifact::{Citation, SourceGuide};
use indexmap::IndexMap;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node};
use std::collections::HashMap;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid regex"));
static EXCESS_NEWLINES: Lazy<Regex> = Lazy::new(|| Regex::new(r"\n{3,}").expect("valid regex"));
static CODE_LANGUAGE: Lazy<Regex> = Lazy::new(|| Regex::new(r"language-(\w+)").expect("valid regex"));

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "div", "dl", "figure", "footer", "h1", "h2", "h3", "h4", "h5",
    "h6", "header", "hr", "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "td", "tfoot", "th",
    "thead", "tr", "ul",
];

fn is_block(tag: &str) -> bool {
    // Angular components in the viewer render as blocks
    BLOCK_TAGS.contains(&tag) || tag.contains('-')
}

/// A source in the Sources appendix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedSource {
    pub display: usize,
    pub original_id: String,
    pub title: String,
    pub quote: String,
}

/// Maps original source ids to display numbers in first-occurrence order
#[derive(Debug, Clone, Default)]
pub struct CitationIndex {
    sources: IndexMap<String, IndexedSource>,
}

impl CitationIndex {
    /// Seed the index from harvested citations, ordered by display index
    pub fn from_citations(citations: &[Citation]) -> Self {
        let mut ordered: Vec<&Citation> = citations.iter().collect();
        ordered.sort_by_key(|c| c.display_index);

        let mut index = Self::default();
        for citation in ordered {
            index.register(&citation.original_source_id, &citation.source_title, &citation.quote_text);
        }
        index
    }

    fn register(&mut self, id: &str, title: &str, quote: &str) -> usize {
        let next = self.sources.len() + 1;
        self.sources
            .entry(id.to_string())
            .or_insert_with(|| IndexedSource {
                display: next,
                original_id: id.to_string(),
                title: title.to_string(),
                quote: quote.to_string(),
            })
            .display
    }

    /// Display number for `id`, assigning the next one on first sight
    pub fn display_number(&mut self, id: &str) -> usize {
        self.register(id, "", "")
    }

    pub fn get(&self, id: &str) -> Option<usize> {
        self.sources.get(id).map(|s| s.display)
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Sources in ascending display order
    pub fn sources(&self) -> impl Iterator<Item = &IndexedSource> {
        self.sources.values()
    }
}

enum Marker {
    Source(String),
    /// "Show more" control of a collapsed citation group
    Expander,
}

#[derive(Debug, Clone, Copy, Default)]
struct Context {
    in_pre: bool,
}

/// Stateful converter; one instance per document
pub struct MarkdownRenderer {
    index: CitationIndex,
    occurrences: HashMap<usize, usize>,
    link_citations: bool,
}

impl MarkdownRenderer {
    /// Converter that drops citation markers
    pub fn plain() -> Self {
        Self {
            index: CitationIndex::default(),
            occurrences: HashMap::new(),
            link_citations: false,
        }
    }

    /// Converter that links citation markers to a Sources appendix
    pub fn with_citations(citations: &[Citation]) -> Self {
        Self {
            index: CitationIndex::from_citations(citations),
            occurrences: HashMap::new(),
            link_citations: true,
        }
    }

    pub fn index(&self) -> &CitationIndex {
        &self.index
    }

    /// Convert an HTML fragment
    pub fn convert(&mut self, html: &str) -> String {
        let fragment = Html::parse_fragment(html);
        let body = self.children(fragment.root_element(), Context::default());
        tidy(&body)
    }

    /// The `## Sources` appendix; empty when nothing was cited
    pub fn sources_section(&self) -> String {
        if !self.link_citations || self.index.is_empty() {
            return String::new();
        }

        let mut out = String::from("\n\n---\n\n## Sources\n\n");
        for source in self.index.sources() {
            let title = source.title.trim();
            let title = if title.is_empty() {
                format!("Source {}", source.original_id)
            } else {
                title.to_string()
            };

            out.push_str(&format!("<a id=\"src-{}\"></a>\n", source.display));
            if self.occurrences.contains_key(&source.display) {
                out.push_str(&format!("**[[{0}]](#cite-ref-{0}-1)** {1}\n\n", source.display, title));
            } else {
                out.push_str(&format!("**[{}]** {}\n\n", source.display, title));
            }

            let quote = source.quote.trim();
            if !quote.is_empty() {
                for line in quote.lines() {
                    if line.trim().is_empty() {
                        out.push_str(">\n");
                    } else {
                        out.push_str("> ");
                        out.push_str(line.trim_end());
                        out.push('\n');
                    }
                }
                out.push('\n');
            }
        }
        out
    }

    fn children(&mut self, element: ElementRef<'_>, ctx: Context) -> String {
        let mut out = String::new();
        for child in element.children() {
            match child.value() {
                Node::Text(text) => {
                    let beside_block = [child.prev_sibling(), child.next_sibling()]
                        .into_iter()
                        .any(|sibling| match sibling {
                            None => true,
                            Some(sibling) => ElementRef::wrap(sibling).is_some_and(|e| is_block(e.value().name())),
                        });
                    out.push_str(&self.text(text, beside_block, ctx));
                }
                Node::Element(_) => {
                    if let Some(child) = ElementRef::wrap(child) {
                        out.push_str(&self.element(child, ctx));
                    }
                }
                _ => {}
            }
        }
        out
    }

    fn text(&self, raw: &str, beside_block: bool, ctx: Context) -> String {
        if ctx.in_pre {
            return raw.to_string();
        }
        if raw.trim().is_empty() {
            return if beside_block { String::new() } else { " ".to_string() };
        }
        WHITESPACE.replace_all(raw, " ").into_owned()
    }

    fn element(&mut self, element: ElementRef<'_>, ctx: Context) -> String {
        let tag = element.value().name().to_ascii_lowercase();

        match tag.as_str() {
            "script" | "style" | "noscript" | "template" => return String::new(),
            "table" => return self.table(element, ctx),
            "ul" | "ol" => return self.list(element, tag == "ol", ctx),
            "blockquote" => {
                let inner = self.children(element, ctx);
                let inner = tidy(&inner);
                return if inner.is_empty() { String::new() } else { format!("\n{}\n\n", inner) };
            }
            _ => {}
        }

        if element.value().attr("role") == Some("heading") {
            let level = element
                .value()
                .attr("aria-level")
                .and_then(|l| l.trim().parse::<i64>().ok())
                .unwrap_or(1)
                .clamp(1, 6) as usize;
            let content = self.children(element, ctx);
            return heading(level, &content);
        }

        if let Some(marker) = citation_marker(element, &tag) {
            return self.citation(marker);
        }

        match tag.as_str() {
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                let level = tag[1..].parse().unwrap_or(1);
                let content = self.children(element, ctx);
                heading(level, &content)
            }
            "strong" | "b" => emphasize(&self.children(element, ctx), "**"),
            "em" | "i" => emphasize(&self.children(element, ctx), "*"),
            "s" | "del" | "strike" => emphasize(&self.children(element, ctx), "~~"),
            "a" => {
                let content = self.children(element, ctx);
                link(element.value().attr("href"), content.trim())
            }
            "img" => {
                let src = element.value().attr("src").unwrap_or("").trim();
                if src.is_empty() {
                    String::new()
                } else {
                    format!("![{}]({})", element.value().attr("alt").unwrap_or("").trim(), src)
                }
            }
            "code" => {
                if ctx.in_pre {
                    self.children(element, ctx)
                } else {
                    let code: String = element.text().collect();
                    if code.is_empty() { String::new() } else { format!("`{}`", code) }
                }
            }
            "pre" => fenced_code(element),
            "hr" => "\n---\n\n".to_string(),
            "br" => "\n".to_string(),
            "p" => {
                let content = self.children(element, ctx);
                let content = content.trim();
                if content.is_empty() { String::new() } else { format!("\n{}\n\n", content) }
            }
            "div" => {
                let mut content = self.children(element, ctx);
                content.push('\n');
                content
            }
            _ => self.children(element, ctx),
        }
    }

    fn citation(&mut self, marker: Marker) -> String {
        let Marker::Source(id) = marker else {
            return String::new();
        };
        if !self.link_citations {
            return String::new();
        }

        let display = self.index.display_number(&id);
        let occurrence = self.occurrences.entry(display).or_insert(0);
        *occurrence += 1;
        format!(
            "<sup><a id=\"cite-ref-{0}-{1}\" href=\"#src-{0}\">[{0}]</a></sup>",
            display, occurrence
        )
    }

    fn table(&mut self, table: ElementRef<'_>, ctx: Context) -> String {
        let rows: Vec<ElementRef<'_>> = table
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|e| e.value().name() == "tr")
            .filter(|row| nearest_table(*row).map(|t| t.id()) == Some(table.id()))
            .collect();
        if rows.is_empty() {
            return self.children(table, ctx);
        }

        let has_head = table
            .children()
            .filter_map(ElementRef::wrap)
            .any(|c| c.value().name() == "thead")
            || rows[0].children().filter_map(ElementRef::wrap).any(|c| c.value().name() == "th");

        let mut grid: Vec<Vec<String>> = Vec::new();
        for row in &rows {
            let mut cells = Vec::new();
            for cell in row
                .children()
                .filter_map(ElementRef::wrap)
                .filter(|c| matches!(c.value().name(), "td" | "th"))
            {
                let content = self.children(cell, ctx);
                cells.push(WHITESPACE.replace_all(content.trim(), " ").replace('|', "\\|"));
            }
            grid.push(cells);
        }

        let width = grid.iter().map(Vec::len).max().unwrap_or(0);
        if width == 0 {
            return String::new();
        }

        let mut lines = Vec::new();
        for (i, cells) in grid.iter_mut().enumerate() {
            cells.resize(width, String::new());
            lines.push(format!("| {} |", cells.join(" | ")));
            if i == 0 && has_head {
                lines.push(format!("| {} |", vec!["---"; width].join(" | ")));
            }
        }
        format!("\n{}\n\n", lines.join("\n"))
    }

    fn list(&mut self, list: ElementRef<'_>, ordered: bool, ctx: Context) -> String {
        let mut number = list
            .value()
            .attr("start")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(1);

        let mut items = Vec::new();
        for item in list.children().filter_map(ElementRef::wrap).filter(|c| c.value().name() == "li") {
            let marker = if ordered {
                number += 1;
                format!("{}.", number - 1)
            } else {
                "-".to_string()
            };

            let content = tidy(&self.children(item, ctx));
            let pad = " ".repeat(marker.len() + 1);
            let mut lines = content.lines().filter(|l| !l.trim().is_empty());
            let mut rendered = format!("{} {}", marker, lines.next().unwrap_or("").trim());
            for line in lines {
                rendered.push('\n');
                rendered.push_str(&pad);
                rendered.push_str(line.trim_end());
            }
            items.push(rendered);
        }

        if items.is_empty() {
            return String::new();
        }
        format!("\n{}\n\n", items.join("\n"))
    }
}

fn nearest_table(row: ElementRef<'_>) -> Option<ElementRef<'_>> {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "table")
}

fn citation_marker(element: ElementRef<'_>, tag: &str) -> Option<Marker> {
    if let Some(id) = element.value().attr("data-source-index") {
        let id = id.trim();
        if !id.is_empty() {
            return Some(Marker::Source(id.to_string()));
        }
    }

    match tag {
        "a" => {
            let id = element.value().attr("href")?.strip_prefix("#cite")?;
            let id = id.trim_start_matches(['-', '_']);
            let id = if id.is_empty() {
                element.text().collect::<String>().trim().to_string()
            } else {
                id.to_string()
            };
            (!id.is_empty()).then_some(Marker::Source(id))
        }
        "source-link" => {
            let label = element.text().collect::<String>().trim().to_string();
            (!label.is_empty()).then_some(Marker::Source(label))
        }
        "button" => {
            let is_marker = element
                .value()
                .classes()
                .any(|c| c == "ng-star-inserted" || c == "citation-marker");
            if !is_marker {
                return None;
            }
            let label = citation_label(element);
            if label == "..." || element.value().attr("aria-label") == Some("Show additional citations") {
                return Some(Marker::Expander);
            }
            // Only numbered buttons are citations; other Angular buttons are content
            citation_label_text(&label).map(Marker::Source)
        }
        _ => None,
    }
}

/// Trimmed label if it can belong to a citation button: numbered, or the `...` expander
pub(crate) fn citation_label_text(raw: &str) -> Option<String> {
    let label = raw.trim();
    (label == "..." || label.chars().any(|c| c.is_ascii_digit())).then(|| label.to_string())
}

/// Visible label of a citation button: its first span, else its text
pub(crate) fn citation_label(button: ElementRef<'_>) -> String {
    let span = button
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "span");
    let text: String = match span {
        Some(span) => span.text().collect(),
        None => button.text().collect(),
    };
    text.trim().to_string()
}

fn heading(level: usize, content: &str) -> String {
    let content = WHITESPACE.replace_all(content.trim(), " ");
    if content.is_empty() {
        return String::new();
    }
    format!("\n{} {}\n\n", "#".repeat(level), content)
}

fn emphasize(content: &str, marker: &str) -> String {
    let core = content.trim();
    if core.is_empty() {
        return content.to_string();
    }
    let lead = if content.starts_with(char::is_whitespace) { " " } else { "" };
    let trail = if content.ends_with(char::is_whitespace) { " " } else { "" };
    format!("{}{}{}{}{}", lead, marker, core, marker, trail)
}

fn link(href: Option<&str>, content: &str) -> String {
    let href = href.unwrap_or("").trim();
    if href.is_empty() || href.starts_with("javascript:") {
        return content.to_string();
    }
    if content.is_empty() {
        return format!("<{}>", href);
    }
    format!("[{}]({})", content, href)
}

fn fenced_code(pre: ElementRef<'_>) -> String {
    let code = pre
        .descendants()
        .filter_map(ElementRef::wrap)
        .find(|e| e.value().name() == "code");
    let language = code
        .and_then(|c| c.value().attr("class"))
        .or_else(|| pre.value().attr("class"))
        .and_then(|class| CODE_LANGUAGE.captures(class))
        .map(|caps| caps[1].to_string())
        .unwrap_or_default();
    let text: String = code.unwrap_or(pre).text().collect();
    format!("\n```{}\n{}\n```\n\n", language, text.trim_end_matches('\n'))
}

fn tidy(markdown: &str) -> String {
    let lines: Vec<&str> = markdown.lines().map(str::trim_end).collect();
    EXCESS_NEWLINES
        .replace_all(&lines.join("\n"), "\n\n")
        .trim()
        .to_string()
}

/// Convert an HTML fragment without citation handling
pub fn html_to_markdown(html: &str) -> String {
    MarkdownRenderer::plain().convert(html)
}

/// Full note document: title heading, body with citation links, Sources appendix
pub fn render_note(title: &str, html: &str, citations: &[Citation]) -> String {
    let mut renderer = MarkdownRenderer::with_citations(citations);
    let body = renderer.convert(html);

    let mut out = String::new();
    if !title.trim().is_empty() {
        out.push_str(&format!("# {}\n\n", title.trim()));
    }
    out.push_str(&body);
    out.push_str(&renderer.sources_section());

    let mut out = tidy(&out);
    out.push('\n');
    out
}

/// Source document: title, guide summary, key topics, then the content
pub fn render_source(title: &str, html: &str, guide: Option<&SourceGuide>) -> String {
    let mut out = format!("# {}\n\n", title.trim());

    if let Some(guide) = guide {
        let summary = html_to_markdown(&guide.summary_html);
        if !summary.is_empty() {
            out.push_str("## Summary\n\n");
            out.push_str(&summary);
            out.push_str("\n\n");
        }
        if !guide.key_topics.is_empty() {
            out.push_str("## Key Topics\n\n");
            for topic in &guide.key_topics {
                out.push_str(&format!("- {}\n", topic));
            }
            out.push('\n');
        }
    }

    out.push_str("## Content\n\n");
    out.push_str(&html_to_markdown(html));

    let mut out = tidy(&out);
    out.push('\n');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn citation(display: usize, id: &str, title: &str, quote: &str) -> Citation {
        Citation {
            display_index: display,
            source_title: title.to_string(),
            quote_text: quote.to_string(),
            original_source_id: id.to_string(),
        }
    }

    #[test]
    fn test_headings_and_inline() {
        let md = html_to_markdown(
            "<h2>Plan</h2><p>Some <strong>bold</strong> and <em>soft</em> and <del>gone</del> text.</p>",
        );
        assert_eq!(md, "## Plan\n\nSome **bold** and *soft* and ~~gone~~ text.");
    }

    #[test]
    fn test_aria_heading_is_clamped() {
        let md = html_to_markdown("<div role=\"heading\" aria-level=\"9\">Deep</div><div role=\"heading\">Top</div>");
        assert!(md.contains("###### Deep"));
        assert!(md.contains("# Top"));
    }

    #[test]
    fn test_links_images_code() {
        let md = html_to_markdown(
            "<p><a href=\"https://x.dev\">site</a> <img src=\"a.png\" alt=\"pic\"> <code>x = 1</code></p>\
             <pre><code class=\"language-rust\">fn main() {}\n</code></pre><hr>",
        );
        assert!(md.contains("[site](https://x.dev) ![pic](a.png) `x = 1`"));
        assert!(md.contains("```rust\nfn main() {}\n```"));
        assert!(md.ends_with("---"));
    }

    #[test]
    fn test_table_with_header_and_padding() {
        let md = html_to_markdown(
            "<table><thead><tr><th>A</th><th>B</th><th>C</th></tr></thead>\
             <tbody><tr><td>1</td><td>x|y</td></tr></tbody></table>",
        );
        assert_eq!(md, "| A | B | C |\n| --- | --- | --- |\n| 1 | x\\|y |  |");
    }

    #[test]
    fn test_table_without_header_has_no_separator() {
        let md = html_to_markdown("<table><tr><td>1</td><td>2</td></tr><tr><td>3</td><td>4</td></tr></table>");
        assert_eq!(md, "| 1 | 2 |\n| 3 | 4 |");
    }

    #[test]
    fn test_nested_lists() {
        let md = html_to_markdown(
            "<ul><li>One<ul><li>Inner</li></ul></li><li><p>Two</p><p>more</p></li></ul>\
             <ol start=\"3\"><li>Third</li><li>Fourth</li></ol>",
        );
        assert!(md.contains("- One\n  - Inner\n- Two\n  more"), "{}", md);
        assert!(md.contains("3. Third\n4. Fourth"), "{}", md);
    }

    #[test]
    fn test_blockquote_has_no_marker() {
        let md = html_to_markdown("<p>before</p><blockquote><p>quoted</p></blockquote><p>after</p>");
        assert_eq!(md, "before\n\nquoted\n\nafter");
    }

    #[test]
    fn test_repeated_source_gets_one_display_number() {
        let html = "<p>Claim<button class=\"ng-star-inserted\"><span>7</span></button> and again\
                    <button class=\"ng-star-inserted\"><span>7</span></button>.</p>";
        let citations = vec![citation(1, "7", "paper.pdf", "the quote")];
        let md = render_note("Note", html, &citations);

        assert_eq!(md.matches("[1]</a></sup>").count(), 2);
        assert!(md.contains("id=\"cite-ref-1-1\""));
        assert!(md.contains("id=\"cite-ref-1-2\""));
        assert_eq!(md.matches("<a id=\"src-1\"></a>").count(), 1);
        assert!(md.contains("**[[1]](#cite-ref-1-1)** paper.pdf\n\n> the quote"));
    }

    #[test]
    fn test_display_numbers_follow_first_occurrence() {
        let html = "<p><a href=\"#cite-12\">12</a> <a href=\"#cite-4\">4</a> <a href=\"#cite-12\">12</a></p>";
        let first = render_note("", html, &[]);
        let second = render_note("", html, &[]);
        assert_eq!(first, second);
        assert!(first.contains("id=\"cite-ref-1-1\" href=\"#src-1\""));
        assert!(first.contains("id=\"cite-ref-2-1\" href=\"#src-2\""));
        assert!(first.contains("id=\"cite-ref-1-2\" href=\"#src-1\""));
        assert!(first.contains("**[[1]](#cite-ref-1-1)** Source 12"));
    }

    #[test]
    fn test_sources_ascending_and_uncited_listed() {
        let citations = vec![
            citation(2, "9", "b.pdf", ""),
            citation(1, "3", "a.pdf", "line one\nline two"),
        ];
        let md = render_note("T", "<p>x<span data-source-index=\"3\">3</span></p>", &citations);
        let a = md.find("a.pdf").unwrap();
        let b = md.find("b.pdf").unwrap();
        assert!(a < b);
        assert!(md.contains("> line one\n> line two"));
        assert!(md.contains("**[2]** b.pdf"));
    }

    #[test]
    fn test_expander_and_plain_markers_dropped() {
        let html = "<p>text<button class=\"citation-marker\"><span>...</span></button>\
                    <button class=\"ng-star-inserted\"><span>2</span></button></p>";
        assert_eq!(html_to_markdown(html), "text");
        let linked = render_note("", html, &[]);
        assert!(linked.contains("[1]</a></sup>"));
        assert!(!linked.contains("..."));
    }

    #[test]
    fn test_render_source_sections() {
        let guide = SourceGuide {
            summary_html: "<p>Short <b>summary</b></p>".to_string(),
            key_topics: vec!["Alpha".to_string(), "Beta".to_string()],
        };
        let md = render_source("Paper", "<p>Body text</p>", Some(&guide));
        assert_eq!(
            md,
            "# Paper\n\n## Summary\n\nShort **summary**\n\n## Key Topics\n\n- Alpha\n- Beta\n\n## Content\n\nBody text\n"
        );
    }
}
