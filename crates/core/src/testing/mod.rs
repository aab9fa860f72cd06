//! Testing utilities and mock implementations for E2E tests.
//!
//! This module provides mock implementations of both external service traits,
//! allowing full acquisition runs without a library or file-sharing service.
//!
//! # Example
//!
//! ```rust,ignore
//! use bookhound_core::testing::{fixtures, MockFileShare, MockLibrary};
//!
//! let library = MockLibrary::new();
//! library.set_wanted(WantedSource::Missing, vec![fixtures::wanted_item(1, "Dune", 1)]).await;
//!
//! let share = MockFileShare::new();
//! share.set_search_results("Frank Herbert - Dune", vec![response]).await;
//! share.set_initial_state(TransferState::Succeeded).await;
//! ```

mod mock_fileshare;
mod mock_library;

pub use mock_fileshare::{MockFileShare, RecordedEnqueue};
pub use mock_library::{MockLibrary, RecordedWantedQuery};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::io::{Cursor, Write};

    use zip::write::SimpleFileOptions;

    use crate::library::{Author, DownloadTarget, QualityProfile, QualityProfileItem, WantedItem};

    /// A monitored wanted item.
    pub fn wanted_item(id: i64, title: &str, author_id: i64) -> WantedItem {
        WantedItem {
            id,
            title: title.to_string(),
            author_id,
            monitored: true,
        }
    }

    pub fn author(id: i64, name: &str, quality_profile_id: i64) -> Author {
        Author {
            id,
            author_name: name.to_string(),
            quality_profile_id,
        }
    }

    /// Profile allowing PDF, MOBI and EPUB, listed lowest priority first.
    pub fn ebook_profile(id: i64) -> QualityProfile {
        QualityProfile {
            id,
            name: "eBook".to_string(),
            items: ["PDF", "MOBI", "EPUB"]
                .iter()
                .map(|name| QualityProfileItem {
                    filetype_name: name.to_string(),
                    allowed: true,
                })
                .collect(),
        }
    }

    /// Item 1 by author 1, with a profile allowing only EPUB.
    pub fn target(title: &str, author_name: &str) -> DownloadTarget {
        DownloadTarget {
            item: wanted_item(1, title, 1),
            author: author(1, author_name, 1),
            profile: QualityProfile {
                id: 1,
                name: "EPUB only".to_string(),
                items: vec![QualityProfileItem {
                    filetype_name: "EPUB".to_string(),
                    allowed: true,
                }],
            },
        }
    }

    /// A minimal EPUB archive. `title` goes into the package document
    /// verbatim, so entities must already be escaped.
    pub fn epub_bytes(title: Option<&str>) -> Vec<u8> {
        let container = r#"<?xml version="1.0"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>"#;
        let title_element = title
            .map(|t| format!("<dc:title id=\"title\">{}</dc:title>", t))
            .unwrap_or_default();
        let opf = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    {}
    <dc:language>en</dc:language>
  </metadata>
</package>"#,
            title_element
        );

        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, content) in [
            ("mimetype", "application/epub+zip".to_string()),
            ("META-INF/container.xml", container.to_string()),
            ("OEBPS/content.opf", opf),
        ] {
            writer.start_file(name, options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.finish().unwrap().into_inner()
    }

    /// A single-record MOBI file. An EXTH header with an ISBN record is
    /// present only when `isbn` is given.
    pub fn mobi_bytes(isbn: Option<&str>) -> Vec<u8> {
        const RECORD0: usize = 88;
        const MOBI_HEADER_LEN: u32 = 0xE8;

        let mut data = vec![0u8; RECORD0];
        data[..4].copy_from_slice(b"Dune");
        data[60..68].copy_from_slice(b"BOOKMOBI");
        data[76..78].copy_from_slice(&1u16.to_be_bytes());
        data[78..82].copy_from_slice(&(RECORD0 as u32).to_be_bytes());

        // PalmDOC header
        data.extend_from_slice(&[0u8; 16]);

        let mut mobi = vec![0u8; MOBI_HEADER_LEN as usize];
        mobi[..4].copy_from_slice(b"MOBI");
        mobi[4..8].copy_from_slice(&MOBI_HEADER_LEN.to_be_bytes());
        if isbn.is_some() {
            mobi[0x70..0x74].copy_from_slice(&0x40u32.to_be_bytes());
        }
        data.extend_from_slice(&mobi);

        if let Some(isbn) = isbn {
            let value = isbn.as_bytes();
            let record_len = 8 + value.len() as u32;
            data.extend_from_slice(b"EXTH");
            data.extend_from_slice(&(12 + record_len).to_be_bytes());
            data.extend_from_slice(&1u32.to_be_bytes());
            data.extend_from_slice(&104u32.to_be_bytes());
            data.extend_from_slice(&record_len.to_be_bytes());
            data.extend_from_slice(value);
        }
        data
    }
}
