//! Markdown backend: pulldown-cmark event walk.
//!
//! `#` headings become the title (first level) or section headers, GFM tables
//! become tables with the head row marked as column header, and images become
//! pictures captioned by their alt text. Only `data:` images carry a raster;
//! linked files are not fetched.

use super::{BackendInput, DocumentBackend};
use crate::document::{DocItemLabel, DocumentBuilder, ImageRef, TableCell, TableData};
use crate::error::DocServeError;
use crate::format::InputFormat;
use pulldown_cmark::{CodeBlockKind, Event, HeadingLevel, Options, Parser, Tag, TagEnd};

pub struct MarkdownBackend;

impl DocumentBackend for MarkdownBackend {
    fn format(&self) -> InputFormat {
        InputFormat::Md
    }

    fn convert(
        &self,
        input: &BackendInput<'_>,
    ) -> Result<crate::document::DoclingDocument, DocServeError> {
        let text = input.read_to_string()?;
        let mut builder = input.builder();
        parse_markdown(&text, &mut builder);
        Ok(builder.build())
    }
}

#[derive(Default)]
struct TableState {
    rows: Vec<Vec<String>>,
    head_rows: usize,
}

#[derive(Default)]
struct State {
    text: String,
    heading: Option<HeadingLevel>,
    /// One entry per open list: `true` when ordered.
    lists: Vec<bool>,
    in_item: bool,
    code: Option<(String, String)>,
    table: Option<TableState>,
    image: Option<(String, String)>,
}

impl State {
    fn flush_text(&mut self, b: &mut DocumentBuilder) {
        let text = std::mem::take(&mut self.text);
        if self.in_item {
            let ordered = self.lists.last().copied().unwrap_or(false);
            b.add_list_item(&text, ordered, None);
        } else {
            b.add_text(DocItemLabel::Text, &text, None);
        }
    }
}

/// Append the items of `markdown` to `b`.
pub fn parse_markdown(markdown: &str, b: &mut DocumentBuilder) {
    let mut options = Options::empty();
    options.insert(Options::ENABLE_TABLES);
    options.insert(Options::ENABLE_STRIKETHROUGH);
    options.insert(Options::ENABLE_TASKLISTS);

    let mut s = State::default();

    for event in Parser::new_ext(markdown, options) {
        match event {
            Event::Start(Tag::Heading { level, .. }) => {
                s.flush_text(b);
                s.heading = Some(level);
            }
            Event::End(TagEnd::Heading(_)) => {
                let text = std::mem::take(&mut s.text);
                match s.heading.take() {
                    Some(HeadingLevel::H1) => b.add_title(&text, None),
                    Some(level) => b.add_heading(&text, level as u32 - 1, None),
                    None => b.add_text(DocItemLabel::Text, &text, None),
                };
            }

            Event::Start(Tag::Paragraph) => {}
            Event::End(TagEnd::Paragraph) => {
                if s.table.is_none() {
                    s.flush_text(b);
                }
            }

            Event::Start(Tag::List(first)) => {
                // Text of the parent item comes before its nested list.
                s.flush_text(b);
                s.lists.push(first.is_some());
            }
            Event::End(TagEnd::List(_)) => {
                s.lists.pop();
            }
            Event::Start(Tag::Item) => {
                s.in_item = true;
            }
            Event::End(TagEnd::Item) => {
                s.flush_text(b);
                // Still inside the parent item while a nested list is open.
                s.in_item = s.lists.len() > 1;
            }
            Event::TaskListMarker(done) => {
                s.text.push_str(if done { "[x] " } else { "[ ] " });
            }

            Event::Start(Tag::CodeBlock(kind)) => {
                s.flush_text(b);
                let lang = match kind {
                    CodeBlockKind::Fenced(info) => {
                        info.split_whitespace().next().unwrap_or("").to_string()
                    }
                    CodeBlockKind::Indented => String::new(),
                };
                s.code = Some((lang, String::new()));
            }
            Event::End(TagEnd::CodeBlock) => {
                if let Some((lang, code)) = s.code.take() {
                    b.add_code(&code, Some(&lang), None);
                }
            }

            Event::Start(Tag::Table(_)) => {
                s.flush_text(b);
                s.table = Some(TableState::default());
            }
            Event::End(TagEnd::Table) => {
                if let Some(t) = s.table.take() {
                    b.add_table(table_data(&t), None, None);
                }
            }
            Event::Start(Tag::TableHead) => {
                if let Some(t) = s.table.as_mut() {
                    t.rows.push(Vec::new());
                }
            }
            Event::End(TagEnd::TableHead) => {
                if let Some(t) = s.table.as_mut() {
                    t.head_rows = t.rows.len();
                }
            }
            Event::Start(Tag::TableRow) => {
                if let Some(t) = s.table.as_mut() {
                    t.rows.push(Vec::new());
                }
            }
            Event::Start(Tag::TableCell) => {
                s.text.clear();
            }
            Event::End(TagEnd::TableCell) => {
                let cell = std::mem::take(&mut s.text);
                if let Some(row) = s.table.as_mut().and_then(|t| t.rows.last_mut()) {
                    row.push(cell.trim().to_string());
                }
            }

            Event::Start(Tag::Image { dest_url, .. }) => {
                if s.table.is_none() {
                    s.flush_text(b);
                }
                s.image = Some((dest_url.to_string(), String::new()));
            }
            Event::End(TagEnd::Image) => {
                if let Some((url, alt)) = s.image.take() {
                    let image = ImageRef::from_data_uri(&url, 72);
                    b.add_picture(image, None, Some(&alt));
                }
            }

            Event::Text(t) | Event::Code(t) => {
                if let Some((_, code)) = s.code.as_mut() {
                    code.push_str(&t);
                } else if let Some((_, alt)) = s.image.as_mut() {
                    alt.push_str(&t);
                } else {
                    s.text.push_str(&t);
                }
            }
            Event::SoftBreak => s.text.push(' '),
            Event::HardBreak => s.text.push('\n'),
            _ => {}
        }
    }
    s.flush_text(b);
}

fn table_data(t: &TableState) -> TableData {
    let cells = t
        .rows
        .iter()
        .enumerate()
        .flat_map(|(r, row)| {
            row.iter().enumerate().map(move |(c, text)| {
                TableCell::new(text.as_str(), r, c).with_column_header(r < t.head_rows)
            })
        })
        .collect();
    TableData::from_cells(cells)
}
