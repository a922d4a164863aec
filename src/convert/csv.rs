use crate::error::{Result, TakeoutError};
use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};

fn selectors(list: &[&str]) -> Vec<Selector> {
    list.iter()
        .map(|s| Selector::parse(s).expect("valid selector"))
        .collect()
}

static TABLE_SELECTORS: Lazy<Vec<Selector>> =
    Lazy::new(|| selectors(&["table", "[role=\"table\"]", ".table", "[class*=\"table\"]"]));

static ROW_SELECTORS: Lazy<Vec<Selector>> =
    Lazy::new(|| selectors(&["tr", "[role=\"row\"]", ".table-row, [class*=\"row\"]"]));

static CELL_SELECTORS: Lazy<Vec<Selector>> = Lazy::new(|| {
    selectors(&[
        "th, td",
        "[role=\"cell\"], [role=\"columnheader\"], [role=\"rowheader\"]",
        ".table-cell, [class*=\"cell\"]",
    ])
});

/// First selector in `candidates` with any match under `scope`
fn first_matching<'a>(scope: ElementRef<'a>, candidates: &[Selector]) -> Vec<ElementRef<'a>> {
    candidates
        .iter()
        .map(|selector| scope.select(selector).collect::<Vec<_>>())
        .find(|found| !found.is_empty())
        .unwrap_or_default()
}

/// Inner markup of a table (bare `<tr>`/`<tbody>`) parses to loose text unless rewrapped
fn wrap_bare_rows(html: &str) -> std::borrow::Cow<'_, str> {
    let head: String = html.trim_start().chars().take(6).collect::<String>().to_ascii_lowercase();
    if head.starts_with("<tr") || head.starts_with("<tbody") || head.starts_with("<thead") {
        format!("<table>{}</table>", html).into()
    } else {
        html.into()
    }
}

/// Convert the first table-like structure in `html` to CSV.
///
/// Both real `<table>` markup and ARIA grids built from divs are accepted.
/// Rows without cells are skipped.
pub fn html_to_csv(html: &str) -> Result<String> {
    let fragment = Html::parse_fragment(&wrap_bare_rows(html));
    let root = fragment.root_element();

    let table = TABLE_SELECTORS
        .iter()
        .find_map(|selector| root.select(selector).next())
        .ok_or_else(|| TakeoutError::NotFound("no table in data table content".to_string()))?;

    // Ragged tables keep their row lengths; fields are quoted only when needed
    let mut writer = ::csv::WriterBuilder::new()
        .has_headers(false)
        .flexible(true)
        .terminator(::csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    let mut rows = 0usize;
    for row in first_matching(table, &ROW_SELECTORS) {
        let cells = first_matching(row, &CELL_SELECTORS);
        if cells.is_empty() {
            continue;
        }
        writer
            .write_record(cells.iter().map(|cell| cell.text().collect::<String>().trim().to_string()))
            .map_err(std::io::Error::from)?;
        rows += 1;
    }

    if rows == 0 {
        return Err(TakeoutError::ExtractionEmpty("table has no rows".to_string()));
    }
    let bytes = writer.into_inner().map_err(|e| TakeoutError::Io(e.into_error()))?;
    let mut csv_text = String::from_utf8(bytes)
        .map_err(|e| TakeoutError::Io(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
    if csv_text.ends_with('\n') {
        csv_text.pop();
    }
    log::debug!("Converted table with {} rows", rows);
    Ok(csv_text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(csv_text: &str) -> Vec<Vec<String>> {
        ::csv::ReaderBuilder::new()
            .has_headers(false)
            .from_reader(csv_text.as_bytes())
            .records()
            .map(|r| r.unwrap().iter().map(str::to_string).collect())
            .collect()
    }

    #[test]
    fn test_plain_table() {
        let out = html_to_csv("<table><tr><th>Name</th><th>Score</th></tr><tr><td> Ada </td><td>10</td></tr></table>")
            .unwrap();
        assert_eq!(out, "Name,Score\nAda,10");
    }

    #[test]
    fn test_quoting_is_parseable() {
        let out = html_to_csv(
            "<table><tr><td>a, b</td><td>say \"hi\"</td><td>two\nlines</td></tr></table>",
        )
        .unwrap();
        assert!(out.starts_with("\"a, b\",\"say \"\"hi\"\"\""));
        assert_eq!(parse(&out), vec![vec!["a, b", "say \"hi\"", "two\nlines"]]);
    }

    #[test]
    fn test_aria_grid() {
        let out = html_to_csv(
            "<div role=\"table\">\
               <div role=\"row\"><span role=\"columnheader\">K</span><span role=\"columnheader\">V</span></div>\
               <div role=\"row\"><span role=\"cell\">x</span><span role=\"cell\">1</span></div>\
             </div>",
        )
        .unwrap();
        assert_eq!(out, "K,V\nx,1");
    }

    #[test]
    fn test_bare_rows_are_wrapped() {
        let out = html_to_csv("<tbody><tr><td>a,b</td><td>c\"d</td><td>plain</td></tr></tbody>").unwrap();
        assert_eq!(out, "\"a,b\",\"c\"\"d\",plain");
        assert_eq!(parse(&out), vec![vec!["a,b", "c\"d", "plain"]]);
    }

    #[test]
    fn test_ragged_rows_keep_their_width() {
        let out = html_to_csv("<table><tr><td>a</td><td>b</td></tr><tr><td>only</td></tr></table>").unwrap();
        assert_eq!(out, "a,b\nonly");
    }

    #[test]
    fn test_missing_table() {
        let err = html_to_csv("<p>nothing tabular</p>").unwrap_err();
        assert!(matches!(err, TakeoutError::NotFound(_)));
    }

    #[test]
    fn test_table_without_rows() {
        let err = html_to_csv("<div class=\"data-table\"><p>empty</p></div>").unwrap_err();
        assert!(matches!(err, TakeoutError::ExtractionEmpty(_)));
    }
}
