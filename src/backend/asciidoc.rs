//! AsciiDoc backend: a line-oriented parser for the common block types.
//!
//! Handles `=` titles and sections, paragraphs, `*`/`-`/`.` list items,
//! `----` listing blocks (with a preceding `[source,lang]`), `|===` tables
//! and `image::` macros. Block titles (`.Caption`) attach to the next image or
//! table. Attribute entries and comments are dropped.

use super::{BackendInput, DocumentBackend};
use crate::document::{DocItemLabel, DoclingDocument, DocumentBuilder, TableData};
use crate::error::DocServeError;
use crate::format::InputFormat;
use once_cell::sync::Lazy;
use regex::Regex;

static HEADING_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(=+)\s+(.+?)\s*=*\s*$").expect("valid regex"));
static LIST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*([*\-]+|\.+)\s+(.+)$").expect("valid regex"));
static IMAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^image::([^\[]+)\[([^\]]*)\]").expect("valid regex"));
static SOURCE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\[source(?:,\s*([\w+\-]+))?.*\]$").expect("valid regex"));
static ATTR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^:[\w\-!]+:").expect("valid regex"));

pub struct AsciiDocBackend;

impl DocumentBackend for AsciiDocBackend {
    fn format(&self) -> InputFormat {
        InputFormat::Asciidoc
    }

    fn convert(&self, input: &BackendInput<'_>) -> Result<DoclingDocument, DocServeError> {
        let text = input.read_to_string()?;
        let mut builder = input.builder();
        parse_asciidoc(&text, &mut builder);
        Ok(builder.build())
    }
}

/// Append the items of `source` to `b`.
pub fn parse_asciidoc(source: &str, b: &mut DocumentBuilder) {
    let lines: Vec<&str> = source.lines().collect();
    let mut paragraph: Vec<&str> = Vec::new();
    let mut block_title: Option<String> = None;
    let mut source_lang: Option<String> = None;
    let mut header_option = false;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];
        let trimmed = line.trim();

        if trimmed.is_empty() {
            flush(&mut paragraph, b);
            i += 1;
            continue;
        }
        if trimmed.starts_with("//") || ATTR_RE.is_match(trimmed) {
            i += 1;
            continue;
        }

        if let Some(caps) = SOURCE_RE.captures(trimmed) {
            flush(&mut paragraph, b);
            source_lang = caps.get(1).map(|m| m.as_str().to_string());
            i += 1;
            continue;
        }
        if trimmed.starts_with('[') && trimmed.ends_with(']') {
            // Other block attributes; only the table header option matters.
            header_option = trimmed.contains("header");
            i += 1;
            continue;
        }

        if trimmed == "----" || trimmed == "...." {
            flush(&mut paragraph, b);
            let fence = trimmed;
            let start = i + 1;
            let mut end = start;
            while end < lines.len() && lines[end].trim() != fence {
                end += 1;
            }
            let code = lines[start..end].join("\n");
            b.add_code(&code, source_lang.take().as_deref(), None);
            i = end + 1;
            continue;
        }

        if trimmed == "|===" {
            flush(&mut paragraph, b);
            let start = i + 1;
            let mut end = start;
            while end < lines.len() && lines[end].trim() != "|===" {
                end += 1;
            }
            let data = parse_table(&lines[start..end], header_option);
            b.add_table(data, None, block_title.take().as_deref());
            header_option = false;
            i = end + 1;
            continue;
        }

        if let Some(caps) = IMAGE_RE.captures(trimmed) {
            flush(&mut paragraph, b);
            let alt = caps.get(2).map(|m| m.as_str()).unwrap_or("");
            let caption = block_title.take().unwrap_or_else(|| alt.to_string());
            b.add_picture(None, None, Some(&caption));
            i += 1;
            continue;
        }

        if let Some(caps) = HEADING_RE.captures(trimmed) {
            flush(&mut paragraph, b);
            let depth = caps[1].len() as u32;
            let text = &caps[2];
            if depth == 1 {
                b.add_title(text, None);
            } else {
                b.add_heading(text, depth - 1, None);
            }
            i += 1;
            continue;
        }

        if let Some(caps) = LIST_RE.captures(line) {
            flush(&mut paragraph, b);
            let ordered = caps[1].starts_with('.');
            b.add_list_item(&caps[2], ordered, None);
            i += 1;
            continue;
        }

        // `.Title` (no space) is a block title for the next block.
        if let Some(title) = trimmed.strip_prefix('.') {
            if !title.starts_with(' ') && !title.starts_with('.') && paragraph.is_empty() {
                block_title = Some(title.to_string());
                i += 1;
                continue;
            }
        }

        paragraph.push(trimmed);
        i += 1;
    }
    flush(&mut paragraph, b);
}

fn flush(paragraph: &mut Vec<&str>, b: &mut DocumentBuilder) {
    if !paragraph.is_empty() {
        b.add_text(DocItemLabel::Text, &paragraph.join(" "), None);
        paragraph.clear();
    }
}

/// Cells are `|`-separated; a row ends at a blank line or once it holds as
/// many cells as the first row. The first row is the header when followed by
/// a blank line or when `[options="header"]` was given.
fn parse_table(lines: &[&str], header_option: bool) -> TableData {
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut num_cols = 0usize;
    let mut header = header_option;

    for (idx, line) in lines.iter().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            if !current.is_empty() {
                if rows.is_empty() && idx > 0 {
                    header = true;
                }
                num_cols = num_cols.max(current.len());
                rows.push(std::mem::take(&mut current));
            }
            continue;
        }
        let mut added = 0;
        match trimmed.strip_prefix('|') {
            Some(rest) => {
                let before = current.len();
                current.extend(rest.split('|').map(|c| c.trim().to_string()));
                added = current.len() - before;
            }
            // Continuation of the previous cell.
            None => {
                if let Some(last) = current.last_mut() {
                    last.push(' ');
                    last.push_str(trimmed);
                }
            }
        }
        if num_cols > 0 && current.len() >= num_cols {
            rows.push(std::mem::take(&mut current));
        } else if num_cols == 0 && rows.is_empty() && added > 1 {
            // A first row written on one line defines the column count.
            num_cols = current.len();
            rows.push(std::mem::take(&mut current));
            if lines.get(idx + 1).is_some_and(|l| l.trim().is_empty()) {
                header = true;
            }
        }
    }
    if !current.is_empty() {
        rows.push(current);
    }

    TableData::from_rows(&rows, header)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::test_support::{convert_bytes, origin};

    const DOC: &str = r#"= Release Notes
:toc:

// internal comment
Version 2 brings
faster imports.

== Changes

* parser rewrite
* new exporter
. first step

[source,rust]
----
let x = 1;

let y = 2;
----

.Benchmarks
|===
|Case |Before |After

|small |10 |4
|large |90 |31
|===

.Architecture
image::arch.png[Diagram]
"#;

    #[test]
    fn blocks_in_order() {
        let doc = convert_bytes(&AsciiDocBackend, "notes.adoc", DOC.as_bytes()).unwrap();
        let labels: Vec<DocItemLabel> = doc.iterate_items().map(|i| i.label()).collect();
        assert_eq!(
            labels,
            vec![
                DocItemLabel::Title,
                DocItemLabel::Text,
                DocItemLabel::SectionHeader,
                DocItemLabel::ListItem,
                DocItemLabel::ListItem,
                DocItemLabel::ListItem,
                DocItemLabel::Code,
                DocItemLabel::Table,
                DocItemLabel::Picture,
            ]
        );
        assert_eq!(doc.texts[0].text, "Release Notes");
        assert_eq!(doc.texts[1].text, "Version 2 brings faster imports.");
        assert_eq!(doc.texts[5].enumerated, Some(true));
        assert_eq!(doc.texts[6].text, "let x = 1;\n\nlet y = 2;");
        assert_eq!(doc.texts[6].code_language.as_deref(), Some("rust"));
    }

    #[test]
    fn table_with_header_and_caption() {
        let doc = convert_bytes(&AsciiDocBackend, "notes.adoc", DOC.as_bytes()).unwrap();
        let table = &doc.tables[0];
        assert_eq!(doc.caption_text(&table.captions), "Benchmarks");
        let df = table.data.export_to_dataframe();
        assert_eq!(df.columns, vec!["Case", "Before", "After"]);
        assert_eq!(df.rows.len(), 2);
        assert_eq!(df.rows[1], vec!["large", "90", "31"]);
        assert_eq!(doc.caption_text(&doc.pictures[0].captions), "Architecture");
    }

    #[test]
    fn one_cell_per_line_rows() {
        let mut b = DocumentBuilder::new("t", origin("t.adoc"));
        parse_asciidoc("[options=\"header\"]\n|===\n|A\n|B\n\n|1\n|2\n|===\n", &mut b);
        let df = b.build().tables[0].data.export_to_dataframe();
        assert_eq!(df.columns, vec!["A", "B"]);
        assert_eq!(df.rows, vec![vec!["1", "2"]]);
    }
}
