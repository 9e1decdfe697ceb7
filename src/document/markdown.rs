//! Markdown and plain-text serialisation of a [`DoclingDocument`].

use super::{DocItemLabel, DoclingDocument, ImageRefMode, NodeItem, PictureItem, TextItem};

/// Marker written where a picture has no usable image.
pub const IMAGE_PLACEHOLDER: &str = "<!-- image -->";

impl DoclingDocument {
    /// Markdown rendering of the whole document.
    ///
    /// `mode` decides how pictures appear: an inline `data:` URI
    /// (`Embedded`), a link to the image's `uri` (`Referenced`, after
    /// [`DoclingDocument::with_referenced_images`]) or [`IMAGE_PLACEHOLDER`].
    /// Pictures without an image always fall back to the placeholder.
    pub fn export_to_markdown(&self, mode: ImageRefMode) -> String {
        self.serialize_markdown(mode, false)
    }

    /// Plain text: Markdown without heading markers, emphasis or images.
    pub fn export_to_text(&self) -> String {
        self.serialize_markdown(ImageRefMode::Placeholder, true)
    }

    fn serialize_markdown(&self, mode: ImageRefMode, strict_text: bool) -> String {
        let mut blocks: Vec<String> = Vec::new();
        let mut in_list = false;

        for item in self.iterate_items() {
            let block = match item {
                NodeItem::Text(t) => text_block(t, strict_text),
                NodeItem::Picture(p) => {
                    let caption = self.caption_text(&p.captions);
                    picture_block(p, &caption, mode, strict_text)
                }
                NodeItem::Table(t) => {
                    let caption = self.caption_text(&t.captions);
                    let table = if strict_text {
                        table_as_text(&t.data)
                    } else {
                        t.data.export_to_markdown()
                    };
                    join_nonempty(&[caption, table], "\n\n")
                }
            };
            if block.is_empty() {
                continue;
            }

            // Consecutive list items form one block.
            let is_list = matches!(item, NodeItem::Text(t) if t.label == DocItemLabel::ListItem);
            match blocks.last_mut() {
                Some(last) if is_list && in_list => {
                    last.push('\n');
                    last.push_str(&block);
                }
                _ => blocks.push(block),
            }
            in_list = is_list;
        }

        let mut out = blocks.join("\n\n");
        if !out.is_empty() {
            out.push('\n');
        }
        out
    }
}

fn text_block(t: &TextItem, strict_text: bool) -> String {
    match t.label {
        DocItemLabel::Title if !strict_text => format!("# {}", t.text),
        DocItemLabel::SectionHeader if !strict_text => {
            let depth = (t.level.unwrap_or(1) + 1).min(6) as usize;
            format!("{} {}", "#".repeat(depth), t.text)
        }
        DocItemLabel::ListItem => {
            let marker = if t.enumerated == Some(true) { "1." } else { "-" };
            format!("{marker} {}", t.text)
        }
        DocItemLabel::Code if !strict_text => format!(
            "```{}\n{}\n```",
            t.code_language.as_deref().unwrap_or(""),
            t.text
        ),
        DocItemLabel::Formula if !strict_text => format!("$${}$$", t.text),
        // Page furniture is not body content.
        DocItemLabel::PageHeader | DocItemLabel::PageFooter => String::new(),
        _ => t.text.clone(),
    }
}

fn picture_block(p: &PictureItem, caption: &str, mode: ImageRefMode, strict_text: bool) -> String {
    if strict_text {
        return caption.to_string();
    }
    let image = match (mode, p.image.as_ref()) {
        (ImageRefMode::Embedded, Some(img)) if img.is_embedded() => {
            format!("![Image]({})", img.uri)
        }
        (ImageRefMode::Referenced, Some(img)) if !img.is_embedded() => {
            format!("![Image]({})", img.uri)
        }
        _ => IMAGE_PLACEHOLDER.to_string(),
    };
    join_nonempty(&[caption.to_string(), image], "\n\n")
}

fn table_as_text(data: &super::TableData) -> String {
    data.grid()
        .iter()
        .map(|row| {
            row.iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join("\t")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn join_nonempty(parts: &[String], sep: &str) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .cloned()
        .collect::<Vec<_>>()
        .join(sep)
}
