//! Shared helpers for the zip + XML Office formats (DOCX, PPTX).

use crate::error::DocServeError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use zip::ZipArchive;

/// Open Office package.
pub(crate) struct Package {
    archive: ZipArchive<File>,
}

impl Package {
    pub fn open(path: &Path) -> Result<Self, DocServeError> {
        let file = File::open(path).map_err(|_| DocServeError::FileNotFound {
            path: path.to_path_buf(),
        })?;
        let archive = ZipArchive::new(file).map_err(|e| DocServeError::CorruptDocument {
            path: path.to_path_buf(),
            detail: format!("not a zip container: {e}"),
        })?;
        Ok(Self { archive })
    }

    pub fn names(&self) -> Vec<String> {
        self.archive.file_names().map(str::to_string).collect()
    }

    pub fn read_bytes(&mut self, name: &str) -> Option<Vec<u8>> {
        let mut entry = self.archive.by_name(name).ok()?;
        let mut buf = Vec::with_capacity(entry.size() as usize);
        entry.read_to_end(&mut buf).ok()?;
        Some(buf)
    }

    pub fn read_string(&mut self, name: &str) -> Option<String> {
        self.read_bytes(name)
            .map(|b| String::from_utf8_lossy(&b).into_owned())
    }

    /// Relationship id → package path for the part `part` (e.g.
    /// `word/document.xml`). Targets are resolved against the part's folder.
    pub fn relationships(&mut self, part: &str) -> HashMap<String, String> {
        let (dir, file) = match part.rsplit_once('/') {
            Some((d, f)) => (d, f),
            None => ("", part),
        };
        let rels_name = if dir.is_empty() {
            format!("_rels/{file}.rels")
        } else {
            format!("{dir}/_rels/{file}.rels")
        };
        let Some(xml) = self.read_string(&rels_name) else {
            return HashMap::new();
        };

        let mut rels = HashMap::new();
        let mut reader = Reader::from_str(&xml);
        reader.trim_text(true);
        let mut buf = Vec::new();
        loop {
            match reader.read_event_into(&mut buf) {
                Ok(Event::Empty(e)) | Ok(Event::Start(e))
                    if e.local_name().as_ref() == b"Relationship" =>
                {
                    if let (Some(id), Some(target)) = (get_attr(&e, b"Id"), get_attr(&e, b"Target"))
                    {
                        if get_attr(&e, b"TargetMode").as_deref() != Some("External") {
                            rels.insert(id, resolve_target(dir, &target));
                        }
                    }
                }
                Ok(Event::Eof) | Err(_) => break,
                _ => {}
            }
            buf.clear();
        }
        rels
    }
}

/// Extract an attribute value by its qualified key.
pub(crate) fn get_attr(e: &BytesStart, key: &[u8]) -> Option<String> {
    e.attributes()
        .find(|a| a.as_ref().ok().map(|x| x.key.as_ref()) == Some(key))
        .and_then(Result::ok)
        .map(|attr| String::from_utf8_lossy(&attr.value).to_string())
}

/// Join a relationship target onto the source part's directory, folding `..`.
fn resolve_target(base_dir: &str, target: &str) -> String {
    if let Some(abs) = target.strip_prefix('/') {
        return abs.to_string();
    }
    let mut parts: Vec<&str> = base_dir.split('/').filter(|p| !p.is_empty()).collect();
    for seg in target.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    parts.join("/")
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_resolve_relative_to_part() {
        assert_eq!(resolve_target("word", "media/image1.png"), "word/media/image1.png");
        assert_eq!(
            resolve_target("ppt/slides", "../media/image2.jpeg"),
            "ppt/media/image2.jpeg"
        );
        assert_eq!(resolve_target("word", "/word/media/a.png"), "word/media/a.png");
    }

    #[test]
    fn relationships_are_read_from_rels_part() {
        let rels = br#"<?xml version="1.0"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">
  <Relationship Id="rId1" Type="image" Target="media/image1.png"/>
  <Relationship Id="rId2" Type="hyperlink" Target="https://x" TargetMode="External"/>
</Relationships>"#;
        let bytes = test_support::zip_bytes(&[
            ("word/document.xml", b"<w:document/>"),
            ("word/_rels/document.xml.rels", rels),
        ]);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.docx");
        std::fs::write(&path, bytes).unwrap();

        let mut pkg = Package::open(&path).unwrap();
        let map = pkg.relationships("word/document.xml");
        assert_eq!(map.get("rId1").map(String::as_str), Some("word/media/image1.png"));
        assert!(!map.contains_key("rId2"));
        assert!(pkg.names().contains(&"word/document.xml".to_string()));
    }
}
