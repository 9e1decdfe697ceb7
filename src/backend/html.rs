//! HTML backend: walks `<body>` with scraper in document order.
//!
//! Block elements map to items (`h1` title, `h2`–`h6` sections, `p`, `li`,
//! `pre`, `table`, `img`/`figure`); container elements are descended into and
//! loose inline text between blocks becomes a paragraph.

use super::{BackendInput, DocumentBackend};
use crate::document::{DocItemLabel, DoclingDocument, DocumentBuilder, ImageRef, TableCell, TableData};
use crate::error::DocServeError;
use crate::format::InputFormat;
use scraper::{ElementRef, Html, Selector};

pub struct HtmlBackend;

impl DocumentBackend for HtmlBackend {
    fn format(&self) -> InputFormat {
        InputFormat::Html
    }

    fn convert(&self, input: &BackendInput<'_>) -> Result<DoclingDocument, DocServeError> {
        let text = input.read_to_string()?;
        let mut builder = input.builder();
        parse_html(&text, &mut builder);
        Ok(builder.build())
    }
}

/// Append the items of `html` to `b`.
pub fn parse_html(html: &str, b: &mut DocumentBuilder) {
    let doc = Html::parse_document(html);
    let mut walker = Walker {
        b,
        pending: String::new(),
    };
    match Selector::parse("body")
        .ok()
        .and_then(|sel| doc.select(&sel).next())
    {
        Some(body) => walker.walk(body),
        None => walker.walk(doc.root_element()),
    }
    walker.flush();
}

struct Walker<'b> {
    b: &'b mut DocumentBuilder,
    /// Inline text seen outside any block element.
    pending: String,
}

impl Walker<'_> {
    fn flush(&mut self) {
        let text = normalize(&std::mem::take(&mut self.pending));
        self.b.add_text(DocItemLabel::Text, &text, None);
    }

    fn walk(&mut self, el: ElementRef<'_>) {
        for child in el.children() {
            if let Some(text) = child.value().as_text() {
                self.pending.push_str(text);
                continue;
            }
            let Some(e) = ElementRef::wrap(child) else {
                continue;
            };
            let name = e.value().name();
            match name {
                "script" | "style" | "noscript" | "template" | "head" => {}
                "h1" => {
                    self.flush();
                    self.b.add_title(&text_of(e), None);
                }
                "h2" | "h3" | "h4" | "h5" | "h6" => {
                    self.flush();
                    let level = name[1..].parse::<u32>().unwrap_or(2) - 1;
                    self.b.add_heading(&text_of(e), level, None);
                }
                "p" => {
                    self.flush();
                    self.b.add_text(DocItemLabel::Paragraph, &text_of(e), None);
                    self.images_in(e);
                }
                "ul" | "ol" => {
                    self.flush();
                    self.list(e, name == "ol");
                }
                "pre" => {
                    self.flush();
                    let lang = code_language(e);
                    let code: String = e.text().collect();
                    self.b.add_code(&code, lang.as_deref(), None);
                }
                "table" => {
                    self.flush();
                    let caption = child_named(e, "caption").map(text_of);
                    self.b.add_table(parse_table(e), None, caption.as_deref());
                }
                "figure" => {
                    self.flush();
                    let caption = child_named(e, "figcaption").map(text_of);
                    let img = Selector::parse("img")
                        .ok()
                        .and_then(|sel| e.select(&sel).next());
                    match img {
                        Some(img) => self.picture(img, caption.as_deref()),
                        None => self.walk(e),
                    }
                }
                "img" => {
                    self.flush();
                    self.picture(e, None);
                }
                "br" => self.pending.push('\n'),
                "hr" => self.flush(),
                "a" | "span" | "strong" | "b" | "em" | "i" | "u" | "code" | "small" | "sub"
                | "sup" | "mark" | "abbr" | "cite" | "q" | "label" => {
                    self.pending.push_str(&e.text().collect::<String>());
                }
                // div, section, article, main, blockquote, …
                _ => {
                    self.flush();
                    self.walk(e);
                    self.flush();
                }
            }
        }
    }

    fn list(&mut self, list: ElementRef<'_>, ordered: bool) {
        for child in list.children().filter_map(ElementRef::wrap) {
            if child.value().name() != "li" {
                continue;
            }
            // Item text excludes nested lists, which follow as their own items.
            let mut text = String::new();
            let mut nested = Vec::new();
            for grand in child.children() {
                if let Some(t) = grand.value().as_text() {
                    text.push_str(t);
                } else if let Some(ge) = ElementRef::wrap(grand) {
                    match ge.value().name() {
                        "ul" | "ol" => nested.push(ge),
                        _ => text.push_str(&ge.text().collect::<String>()),
                    }
                }
            }
            self.b.add_list_item(&normalize(&text), ordered, None);
            for n in nested {
                self.list(n, n.value().name() == "ol");
            }
        }
    }

    fn images_in(&mut self, el: ElementRef<'_>) {
        if let Ok(sel) = Selector::parse("img") {
            for img in el.select(&sel) {
                self.picture(img, None);
            }
        }
    }

    fn picture(&mut self, img: ElementRef<'_>, caption: Option<&str>) {
        let image = img
            .value()
            .attr("src")
            .and_then(|src| ImageRef::from_data_uri(src, 72));
        let caption = caption
            .map(str::to_string)
            .or_else(|| img.value().attr("alt").map(normalize));
        self.b.add_picture(image, None, caption.as_deref());
    }
}

fn text_of(e: ElementRef<'_>) -> String {
    normalize(&e.text().collect::<String>())
}

fn normalize(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn child_named<'a>(e: ElementRef<'a>, name: &str) -> Option<ElementRef<'a>> {
    e.children()
        .filter_map(ElementRef::wrap)
        .find(|c| c.value().name() == name)
}

/// `language-x` / `lang-x` class on the `pre` or its inner `code`.
fn code_language(pre: ElementRef<'_>) -> Option<String> {
    let from = |e: ElementRef<'_>| {
        e.value().classes().find_map(|c| {
            c.strip_prefix("language-")
                .or_else(|| c.strip_prefix("lang-"))
                .map(str::to_string)
        })
    };
    from(pre).or_else(|| child_named(pre, "code").and_then(from))
}

/// Direct rows of a table (not rows of nested tables).
fn direct_rows<'a>(table: ElementRef<'a>) -> Vec<ElementRef<'a>> {
    let mut rows = Vec::new();
    for child in table.children().filter_map(ElementRef::wrap) {
        match child.value().name() {
            "tr" => rows.push(child),
            "thead" | "tbody" | "tfoot" => rows.extend(
                child
                    .children()
                    .filter_map(ElementRef::wrap)
                    .filter(|r| r.value().name() == "tr"),
            ),
            _ => {}
        }
    }
    rows
}

fn parse_table(table: ElementRef<'_>) -> TableData {
    // Occupancy of positions already covered by a rowspan from above.
    let mut taken: Vec<Vec<bool>> = Vec::new();
    let mut cells = Vec::new();

    for (r, row) in direct_rows(table).into_iter().enumerate() {
        let mut c = 0usize;
        for cell in row.children().filter_map(ElementRef::wrap) {
            let name = cell.value().name();
            if name != "td" && name != "th" {
                continue;
            }
            while taken.get(r).and_then(|row| row.get(c)).copied().unwrap_or(false) {
                c += 1;
            }
            let span = |attr: &str| {
                cell.value()
                    .attr(attr)
                    .and_then(|v| v.trim().parse::<usize>().ok())
                    .unwrap_or(1)
                    .max(1)
            };
            let (rs, cs) = (span("rowspan"), span("colspan"));
            for rr in r..r + rs {
                if taken.len() <= rr {
                    taken.resize(rr + 1, Vec::new());
                }
                if taken[rr].len() < c + cs {
                    taken[rr].resize(c + cs, false);
                }
                for slot in &mut taken[rr][c..c + cs] {
                    *slot = true;
                }
            }
            cells.push(TableCell::spanning(text_of(cell), r, c, rs, cs).with_column_header(name == "th"));
            c += cs;
        }
    }
    TableData::from_cells(cells)
}
