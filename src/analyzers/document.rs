// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Document analyzer for office documents and text files

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use super::{ContentAnalyzer, ContentSignal};
use crate::services::{bounded, DocumentExtractor};
use crate::Result;

/// Only the head of a plain-text file feeds the excerpt
const TEXT_PREFIX_BYTES: u64 = 64 * 1024;

/// Analyzer for document files
pub struct DocumentAnalyzer {
    extractor: Arc<dyn DocumentExtractor>,
    timeout: Duration,
}

impl DocumentAnalyzer {
    pub fn new(extractor: Arc<dyn DocumentExtractor>, timeout: Duration) -> Self {
        Self { extractor, timeout }
    }

    /// Read the head of the file as UTF-8, dropping undecodable bytes
    async fn read_text_lossy(path: &Path) -> Result<String> {
        let file = tokio::fs::File::open(path).await?;
        let mut bytes = Vec::new();
        file.take(TEXT_PREFIX_BYTES).read_to_end(&mut bytes).await?;
        Ok(String::from_utf8_lossy(&bytes).replace(char::REPLACEMENT_CHARACTER, ""))
    }
}

#[async_trait]
impl ContentAnalyzer for DocumentAnalyzer {
    fn name(&self) -> &'static str {
        "document"
    }

    async fn extract(&self, path: &Path) -> Result<ContentSignal> {
        info!("Analyzing document: {:?}", path);

        let text = if self.extractor.supports(path) {
            bounded(
                "document text extraction",
                self.timeout,
                self.extractor.extract_document_text(path),
            )
            .await?
        } else {
            Self::read_text_lossy(path).await?
        };

        debug!("Extracted {} chars from {:?}", text.len(), path);
        Ok(ContentSignal::excerpt(&text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzers::testing::{Broken, Extracted};

    #[tokio::test]
    async fn test_extractable_format_uses_the_extractor() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lease.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let analyzer = DocumentAnalyzer::new(
            Arc::new(Extracted("Residential lease agreement")),
            Duration::from_secs(5),
        );
        assert_eq!(analyzer.analyze(&path).await.as_slice(), ["Residential lease agreement"]);
    }

    #[tokio::test]
    async fn test_plain_text_ignores_decode_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, b"grocery \xff\xfelist: eggs").unwrap();

        let analyzer = DocumentAnalyzer::new(Arc::new(Extracted("unused")), Duration::from_secs(5));
        assert_eq!(analyzer.analyze(&path).await.as_slice(), ["grocery list: eggs"]);
    }

    #[tokio::test]
    async fn test_large_text_reads_only_the_head() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.log");
        let mut body = b"boot ok".to_vec();
        body.resize(TEXT_PREFIX_BYTES as usize, b' ');
        body.extend_from_slice(b"tail marker");
        std::fs::write(&path, &body).unwrap();

        let text = DocumentAnalyzer::read_text_lossy(&path).await.unwrap();
        assert_eq!(text.len(), TEXT_PREFIX_BYTES as usize);
        assert!(text.starts_with("boot ok"));
        assert!(!text.contains("tail marker"));
    }

    #[tokio::test]
    async fn test_extractor_failure_yields_unknown() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scan.pdf");
        std::fs::write(&path, b"%PDF").unwrap();

        let analyzer = DocumentAnalyzer::new(Arc::new(Broken), Duration::from_secs(5));
        assert!(analyzer.analyze(&path).await.is_unknown());
    }

    #[tokio::test]
    async fn test_missing_file_yields_unknown() {
        let analyzer = DocumentAnalyzer::new(Arc::new(Extracted("x")), Duration::from_secs(5));
        assert!(analyzer.analyze(Path::new("/nonexistent/notes.txt")).await.is_unknown());
    }
}
