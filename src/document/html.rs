//! Standalone HTML serialisation of a [`DoclingDocument`].

use super::markdown::IMAGE_PLACEHOLDER;
use super::{
    DocItemLabel, DoclingDocument, ImageRefMode, NodeItem, PictureItem, TableItem, TextItem,
};

const STYLE: &str = "body{font-family:sans-serif;max-width:60em;margin:2em auto;line-height:1.5}\
table{border-collapse:collapse;margin:1em 0}\
th,td{border:1px solid #ccc;padding:.25em .5em}\
figure{margin:1em 0}img{max-width:100%}\
pre{background:#f6f8fa;padding:.5em;overflow-x:auto}";

impl DoclingDocument {
    /// HTML page with the document body. Pictures follow `mode` the same way
    /// as [`DoclingDocument::export_to_markdown`].
    /// `<table>` fragment for one table, with its caption inside the table
    /// element.
    pub fn table_html(&self, table: &TableItem) -> String {
        let caption = self.caption_text(&table.captions);
        let html = table.data.export_to_html();
        if caption.is_empty() {
            html
        } else {
            html.replacen(
                "<table>",
                &format!("<table><caption>{}</caption>", escape(&caption)),
                1,
            )
        }
    }

    pub fn export_to_html(&self, mode: ImageRefMode) -> String {
        let mut body = String::new();
        // Open list tag, if any: "ul" or "ol".
        let mut open_list: Option<&'static str> = None;

        for item in self.iterate_items() {
            let list_tag = match item {
                NodeItem::Text(t) if t.label == DocItemLabel::ListItem => {
                    Some(if t.enumerated == Some(true) { "ol" } else { "ul" })
                }
                _ => None,
            };
            if open_list != list_tag {
                if let Some(tag) = open_list {
                    body.push_str(&format!("</{tag}>\n"));
                }
                if let Some(tag) = list_tag {
                    body.push_str(&format!("<{tag}>\n"));
                }
                open_list = list_tag;
            }

            let html = match item {
                NodeItem::Text(t) => text_html(t),
                NodeItem::Picture(p) => picture_html(p, &self.caption_text(&p.captions), mode),
                NodeItem::Table(t) => self.table_html(t),
            };
            if !html.is_empty() {
                body.push_str(&html);
                body.push('\n');
            }
        }
        if let Some(tag) = open_list {
            body.push_str(&format!("</{tag}>\n"));
        }

        format!(
            "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>{}</title>\n\
             <style>{STYLE}</style>\n</head>\n<body>\n<div class=\"page\">\n{body}</div>\n</body>\n</html>\n",
            escape(&self.name)
        )
    }
}

fn text_html(t: &TextItem) -> String {
    let text = escape(&t.text);
    match t.label {
        DocItemLabel::Title => format!("<h1>{text}</h1>"),
        DocItemLabel::SectionHeader => {
            let n = (t.level.unwrap_or(1) + 1).min(6);
            format!("<h{n}>{text}</h{n}>")
        }
        DocItemLabel::ListItem => format!("<li>{text}</li>"),
        DocItemLabel::Code => match &t.code_language {
            Some(lang) => format!(
                "<pre><code class=\"language-{}\">{text}</code></pre>",
                escape(lang)
            ),
            None => format!("<pre><code>{text}</code></pre>"),
        },
        DocItemLabel::Formula => format!("<div class=\"formula\">{text}</div>"),
        DocItemLabel::PageHeader | DocItemLabel::PageFooter => String::new(),
        _ => format!("<p>{text}</p>"),
    }
}

fn picture_html(p: &PictureItem, caption: &str, mode: ImageRefMode) -> String {
    let img = match (mode, p.image.as_ref()) {
        (ImageRefMode::Embedded, Some(img)) if img.is_embedded() => {
            format!("<img src=\"{}\" alt=\"{}\">", img.uri, escape(caption))
        }
        (ImageRefMode::Referenced, Some(img)) if !img.is_embedded() => {
            format!("<img src=\"{}\" alt=\"{}\">", escape(&img.uri), escape(caption))
        }
        _ => IMAGE_PLACEHOLDER.to_string(),
    };
    if caption.is_empty() {
        format!("<figure>{img}</figure>")
    } else {
        format!("<figure>{img}<figcaption>{}</figcaption></figure>", escape(caption))
    }
}

/// Escape text for HTML element content and attribute values.
pub fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{DocumentBuilder, Origin, TableData};

    fn doc() -> DoclingDocument {
        let mut b = DocumentBuilder::new(
            "a<b",
            Origin {
                mimetype: "text/html".into(),
                binary_hash: String::new(),
                filename: "a.html".into(),
            },
        );
        b.add_heading("Intro & scope", 2, None);
        b.add_list_item("one", true, None);
        b.add_list_item("two", true, None);
        b.add_text(DocItemLabel::Text, "after", None);
        b.add_picture(None, None, Some("Chart"));
        b.add_table(TableData::from_rows(&[vec!["h"], vec!["v"]], true), None, Some("T1"));
        b.build()
    }

    #[test]
    fn body_structure() {
        let html = doc().export_to_html(ImageRefMode::Embedded);
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<title>a&lt;b</title>"));
        assert!(html.contains("<h3>Intro &amp; scope</h3>"));
        assert!(html.contains("<ol>\n<li>one</li>\n<li>two</li>\n</ol>\n<p>after</p>"));
        assert!(html.contains("<figure><!-- image --><figcaption>Chart</figcaption></figure>"));
        assert!(html.contains("<table><caption>T1</caption><tbody><tr><th>h</th></tr>"));
    }

    #[test]
    fn escape_covers_quotes() {
        assert_eq!(escape(r#"<a href="x">'"#), "&lt;a href=&quot;x&quot;&gt;&#39;");
    }
}
