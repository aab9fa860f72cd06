//! Embedded metadata readers for downloaded e-books.
//!
//! MOBI/AZW files carry an EXTH header whose record 104 holds the ISBN.
//! EPUB files are zip archives; the title comes from the first `dc:title` of
//! the package document named in `META-INF/container.xml`.

use std::io::{Cursor, Read};
use std::path::Path;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use thiserror::Error;

/// EXTH record type holding the ISBN.
const EXTH_ISBN: u32 = 104;
const EXTH_FLAG: u32 = 0x40;

#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("Not a MOBI file: {0}")]
    InvalidMobi(&'static str),

    #[error("Invalid EPUB: {0}")]
    InvalidEpub(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// E-book container formats with embedded metadata we can check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookFormat {
    Mobi,
    Epub,
}

impl BookFormat {
    /// Format of a file by extension; `None` for formats without a check.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "mobi" | "azw" | "azw3" => Some(BookFormat::Mobi),
            "epub" => Some(BookFormat::Epub),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BookFormat::Mobi => "mobi",
            BookFormat::Epub => "epub",
        }
    }
}

fn read_u16(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

fn read_u32(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset + 4)?;
    Some(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// ISBN from the EXTH header of a MOBI/AZW file, if present.
///
/// Hyphens and whitespace are stripped from the stored value.
pub fn mobi_isbn(data: &[u8]) -> Result<Option<String>, MetadataError> {
    let records = read_u16(data, 76).ok_or(MetadataError::InvalidMobi("truncated header"))?;
    if records == 0 {
        return Err(MetadataError::InvalidMobi("no records"));
    }
    let record0 =
        read_u32(data, 78).ok_or(MetadataError::InvalidMobi("truncated record list"))? as usize;

    let mobi = record0 + 16;
    if data.get(mobi..mobi + 4) != Some(b"MOBI".as_slice()) {
        return Err(MetadataError::InvalidMobi("missing MOBI header"));
    }
    let header_len =
        read_u32(data, mobi + 4).ok_or(MetadataError::InvalidMobi("truncated MOBI header"))?;
    let flags = read_u32(data, record0 + 0x80).unwrap_or(0);
    if flags & EXTH_FLAG == 0 {
        return Ok(None);
    }

    let exth = mobi + header_len as usize;
    if data.get(exth..exth + 4) != Some(b"EXTH".as_slice()) {
        return Err(MetadataError::InvalidMobi("missing EXTH header"));
    }
    let count = read_u32(data, exth + 8).ok_or(MetadataError::InvalidMobi("truncated EXTH"))?;

    let mut pos = exth + 12;
    for _ in 0..count {
        let kind = read_u32(data, pos).ok_or(MetadataError::InvalidMobi("truncated EXTH record"))?;
        let len =
            read_u32(data, pos + 4).ok_or(MetadataError::InvalidMobi("truncated EXTH record"))?
                as usize;
        if len < 8 {
            return Err(MetadataError::InvalidMobi("bad EXTH record length"));
        }
        if kind == EXTH_ISBN {
            let value = data
                .get(pos + 8..pos + len)
                .ok_or(MetadataError::InvalidMobi("truncated EXTH record"))?;
            let isbn: String = String::from_utf8_lossy(value)
                .chars()
                .filter(|c| !c.is_whitespace() && *c != '-')
                .collect();
            return Ok((!isbn.is_empty()).then_some(isbn));
        }
        pos += len;
    }
    Ok(None)
}

static ROOTFILE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"<rootfile\b[^>]*\bfull-path\s*=\s*["']([^"']+)["']"#).unwrap());

static DC_TITLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)<dc:title(?:\s[^>]*)?>(.*?)</dc:title>").unwrap());

fn read_entry<R: Read + std::io::Seek>(
    archive: &mut zip::ZipArchive<R>,
    name: &str,
) -> Result<String, MetadataError> {
    let mut entry = archive
        .by_name(name)
        .map_err(|e| MetadataError::InvalidEpub(format!("{}: {}", name, e)))?;
    let mut content = String::new();
    entry.read_to_string(&mut content)?;
    Ok(content)
}

/// Title from an EPUB's package document, if present.
pub fn epub_title(data: &[u8]) -> Result<Option<String>, MetadataError> {
    let mut archive = zip::ZipArchive::new(Cursor::new(data))
        .map_err(|e| MetadataError::InvalidEpub(e.to_string()))?;

    let container = read_entry(&mut archive, "META-INF/container.xml")?;
    let opf_path = ROOTFILE
        .captures(&container)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
        .ok_or_else(|| MetadataError::InvalidEpub("container has no rootfile".to_string()))?;

    let opf = read_entry(&mut archive, &opf_path)?;
    Ok(DC_TITLE
        .captures(&opf)
        .and_then(|c| c.get(1))
        .map(|m| decode_entities(strip_cdata(m.as_str()).trim()))
        .filter(|t| !t.is_empty()))
}

fn strip_cdata(text: &str) -> &str {
    text.trim()
        .strip_prefix("<![CDATA[")
        .and_then(|t| t.strip_suffix("]]>"))
        .unwrap_or(text)
}

fn decode_entities(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find('&') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let Some(end) = tail.find(';') else {
            out.push_str(tail);
            return out;
        };
        let entity = &tail[1..end];
        let decoded = match entity {
            "amp" => Some('&'),
            "lt" => Some('<'),
            "gt" => Some('>'),
            "quot" => Some('"'),
            "apos" => Some('\''),
            _ => entity
                .strip_prefix("#x")
                .or_else(|| entity.strip_prefix("#X"))
                .and_then(|hex| u32::from_str_radix(hex, 16).ok())
                .or_else(|| entity.strip_prefix('#').and_then(|dec| dec.parse().ok()))
                .and_then(char::from_u32),
        };
        match decoded {
            Some(c) => {
                out.push(c);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('&');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fixtures;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(BookFormat::from_path(Path::new("a/Dune.AZW3")), Some(BookFormat::Mobi));
        assert_eq!(BookFormat::from_path(Path::new("Dune.epub")), Some(BookFormat::Epub));
        assert_eq!(BookFormat::from_path(Path::new("Dune.pdf")), None);
        assert_eq!(BookFormat::from_path(Path::new("Dune")), None);
    }

    #[test]
    fn test_mobi_isbn() {
        let data = fixtures::mobi_bytes(Some("978-0-441-17271-9"));
        assert_eq!(mobi_isbn(&data).unwrap(), Some("9780441172719".to_string()));
    }

    #[test]
    fn test_mobi_without_exth() {
        let data = fixtures::mobi_bytes(None);
        assert_eq!(mobi_isbn(&data).unwrap(), None);
    }

    #[test]
    fn test_garbage_is_not_mobi() {
        assert!(mobi_isbn(b"definitely not a palm database").is_err());
        let mut data = fixtures::mobi_bytes(Some("123"));
        data.truncate(100);
        assert!(mobi_isbn(&data).is_err());
    }

    #[test]
    fn test_epub_title() {
        let data = fixtures::epub_bytes(Some("Dune &amp; Sons"));
        assert_eq!(epub_title(&data).unwrap(), Some("Dune & Sons".to_string()));
    }

    #[test]
    fn test_epub_without_title() {
        let data = fixtures::epub_bytes(None);
        assert_eq!(epub_title(&data).unwrap(), None);
    }

    #[test]
    fn test_epub_not_a_zip() {
        assert!(matches!(
            epub_title(b"plain text"),
            Err(MetadataError::InvalidEpub(_))
        ));
    }

    #[test]
    fn test_decode_entities() {
        assert_eq!(decode_entities("A &lt;B&gt; &#233;t&#xE9;"), "A <B> été");
        assert_eq!(decode_entities("Fish & Chips"), "Fish & Chips");
        assert_eq!(decode_entities("&bogus; x"), "&bogus; x");
    }
}
