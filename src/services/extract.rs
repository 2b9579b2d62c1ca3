// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Local text extraction for PDF, DOCX and spreadsheet files

use async_trait::async_trait;
use quick_xml::events::Event;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use super::DocumentExtractor;
use crate::{Result, TaxisError};

/// Extraction stops once this much text is collected; callers only need a
/// short excerpt
const MAX_EXTRACT_CHARS: usize = 4000;

/// Rows read from the first sheet of a spreadsheet
const MAX_SHEET_ROWS: usize = 20;

#[derive(Default)]
pub struct LocalExtractor;

impl LocalExtractor {
    pub fn new() -> Self {
        Self
    }

    fn extension(path: &Path) -> String {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default()
    }

    fn extract_blocking(path: &Path) -> Result<String> {
        match Self::extension(path).as_str() {
            "pdf" => extract_pdf(path),
            "docx" => extract_docx(path),
            "xlsx" | "xls" | "xlsm" | "ods" => extract_spreadsheet(path),
            other => Err(TaxisError::Analysis(format!(
                "no text extractor for '.{}' files",
                other
            ))),
        }
    }
}

#[async_trait]
impl DocumentExtractor for LocalExtractor {
    fn supports(&self, path: &Path) -> bool {
        matches!(
            Self::extension(path).as_str(),
            "pdf" | "docx" | "xlsx" | "xls" | "xlsm" | "ods"
        )
    }

    async fn extract_document_text(&self, path: &Path) -> Result<String> {
        let path: PathBuf = path.to_path_buf();
        tokio::task::spawn_blocking(move || Self::extract_blocking(&path))
            .await
            .map_err(|e| TaxisError::Analysis(format!("extraction task failed: {}", e)))?
    }
}

/// Page-by-page with lopdf, whole-document pdf-extract as the fallback
fn extract_pdf(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)?;

    match extract_pdf_pages(&bytes) {
        Ok(text) if !text.trim().is_empty() => return Ok(text),
        Ok(_) => debug!("No text layer found page by page in {:?}", path),
        Err(e) => debug!("Page-by-page extraction failed for {:?}: {}", path, e),
    }

    // pdf-extract can panic on malformed fonts
    match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        pdf_extract::extract_text_from_mem(&bytes)
    })) {
        Ok(Ok(text)) => Ok(text),
        Ok(Err(e)) => Err(TaxisError::Pdf(format!("Text extraction failed: {}", e))),
        Err(_) => {
            warn!("PDF extraction panicked for {:?}", path);
            Err(TaxisError::Pdf("Text extraction panicked".to_string()))
        }
    }
}

fn extract_pdf_pages(bytes: &[u8]) -> Result<String> {
    let doc = lopdf::Document::load_mem(bytes)
        .map_err(|e| TaxisError::Pdf(format!("Failed to load PDF: {}", e)))?;

    let mut text = String::new();
    for page in doc.get_pages().keys() {
        match doc.extract_text(&[*page]) {
            Ok(page_text) => text.push_str(&page_text),
            Err(e) => debug!("Skipping page {}: {}", page, e),
        }
        if text.len() >= MAX_EXTRACT_CHARS {
            break;
        }
    }

    Ok(text)
}

/// Text runs (`w:t`) of `word/document.xml`, one line per paragraph
fn extract_docx(path: &Path) -> Result<String> {
    let file = std::fs::File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| TaxisError::Analysis(format!("Failed to open DOCX: {}", e)))?;

    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .map_err(|_| TaxisError::Analysis("No document.xml found".to_string()))?
        .read_to_string(&mut xml)?;

    docx_text(&xml)
}

fn docx_text(xml: &str) -> Result<String> {
    let mut reader = quick_xml::Reader::from_str(xml);
    let mut text = String::new();
    let mut in_run = false;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| TaxisError::Analysis(format!("Malformed DOCX XML: {}", e)))?;

        match event {
            Event::Start(e) if e.name().as_ref() == b"w:t" => in_run = true,
            Event::End(e) if e.name().as_ref() == b"w:t" => in_run = false,
            Event::End(e) if e.name().as_ref() == b"w:p" => text.push('\n'),
            Event::Text(t) if in_run => {
                let chunk = t
                    .unescape()
                    .map_err(|e| TaxisError::Analysis(format!("Malformed DOCX text: {}", e)))?;
                text.push_str(&chunk);
            }
            Event::Eof => break,
            _ => {}
        }

        if text.len() >= MAX_EXTRACT_CHARS {
            break;
        }
    }

    Ok(text)
}

fn extract_spreadsheet(path: &Path) -> Result<String> {
    use calamine::{open_workbook_auto, Reader};

    let mut workbook = open_workbook_auto(path)
        .map_err(|e| TaxisError::Analysis(format!("Failed to open spreadsheet: {}", e)))?;

    let sheet_names: Vec<String> = workbook.sheet_names().to_vec();
    let mut text = String::new();

    if let Some(sheet_name) = sheet_names.first() {
        let range = workbook
            .worksheet_range(sheet_name)
            .map_err(|e| TaxisError::Analysis(format!("Failed to read sheet: {}", e)))?;

        for row in range.rows().take(MAX_SHEET_ROWS) {
            let cells: Vec<String> = row
                .iter()
                .map(|c| c.to_string())
                .filter(|c| !c.is_empty())
                .collect();
            if !cells.is_empty() {
                text.push_str(&cells.join(" "));
                text.push('\n');
            }
        }
    }

    Ok(text)
}
