// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! Subfolder negotiation: content signal plus existing folders in, folder name out
//!
//! The directory listing under the category is the only record of which
//! names exist. It is re-read for every decision and never cached, so two
//! workers racing on a brand-new name may both create it; both results are
//! valid.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::analyzers::ContentSignal;
use crate::category::Category;
use crate::services::{bounded, TextGenerator};

/// Longest subfolder name produced
pub const MAX_SUBFOLDER_LEN: usize = 20;

/// Name used whenever generation fails or normalizes to nothing
pub const FALLBACK_SUBFOLDER: &str = "misc";

pub struct SubfolderNegotiator {
    root: PathBuf,
    generator: Arc<dyn TextGenerator>,
    template: String,
    timeout: Duration,
}

impl SubfolderNegotiator {
    pub fn new(
        root: PathBuf,
        generator: Arc<dyn TextGenerator>,
        template: &str,
        timeout: Duration,
    ) -> Self {
        Self {
            root,
            generator,
            template: template.to_string(),
            timeout,
        }
    }

    /// Immediate subdirectories of `{root}/{category}`, sorted
    pub fn existing_subfolders(&self, category: Category) -> Vec<String> {
        let dir = self.root.join(category.as_str());
        let entries = match std::fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut names: Vec<String> = entries
            .flatten()
            .filter(|e| e.file_type().map(|t| t.is_dir()).unwrap_or(false))
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub fn build_prompt(&self, content: &ContentSignal, existing: &[String]) -> String {
        let existing = if existing.is_empty() {
            "(none)".to_string()
        } else {
            existing.join(", ")
        };

        self.template
            .replace("{content}", &content.to_string())
            .replace("{existing}", &existing)
    }

    /// Pick a subfolder for `content`; always returns a valid name
    pub async fn suggest(&self, category: Category, content: &ContentSignal) -> String {
        let existing = self.existing_subfolders(category);
        let prompt = self.build_prompt(content, &existing);
        debug!("Negotiating subfolder under {} ({} existing)", category, existing.len());

        match bounded("subfolder generation", self.timeout, self.generator.generate(&prompt)).await
        {
            Ok(response) => {
                let name = normalize_subfolder_name(&response);
                if name == FALLBACK_SUBFOLDER && !response.trim().eq_ignore_ascii_case("misc") {
                    warn!("Unusable subfolder suggestion {:?}, using '{}'", response, name);
                }
                name
            }
            Err(e) => {
                warn!("Subfolder generation failed for {} content: {}", category, e);
                FALLBACK_SUBFOLDER.to_string()
            }
        }
    }
}

/// Lowercase, spaces to underscores, ASCII alphanumerics and underscores
/// only, at most 20 characters; `"misc"` if nothing is left.
pub fn normalize_subfolder_name(raw: &str) -> String {
    let name: String = raw
        .trim()
        .to_lowercase()
        .replace(' ', "_")
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(MAX_SUBFOLDER_LEN)
        .collect();

    if name.is_empty() {
        FALLBACK_SUBFOLDER.to_string()
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PromptConfig;
    use crate::{Result, TaxisError};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct Reply(&'static str);

    #[async_trait]
    impl TextGenerator for Reply {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    #[async_trait]
    impl TextGenerator for Failing {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Err(TaxisError::Generation("rate limited".to_string()))
        }
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<String>>);

    #[async_trait]
    impl TextGenerator for Recording {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.0.lock().unwrap().push(prompt.to_string());
            Ok("receipts".to_string())
        }
    }

    fn negotiator(root: PathBuf, generator: Arc<dyn TextGenerator>) -> SubfolderNegotiator {
        SubfolderNegotiator::new(
            root,
            generator,
            &PromptConfig::default().subfolder,
            Duration::from_secs(5),
        )
    }

    fn assert_valid(name: &str) {
        assert!(!name.is_empty());
        assert!(name.len() <= MAX_SUBFOLDER_LEN);
        assert!(name
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_subfolder_name("Beach Trip"), "beach_trip");
        assert_eq!(normalize_subfolder_name("  \"Tax-Returns 2024!\"\n"), "taxreturns_2024");
        assert_eq!(
            normalize_subfolder_name("An Extremely Long Folder Name Indeed"),
            "an_extremely_long_fo"
        );
        assert_eq!(normalize_subfolder_name("Café Menus"), "caf_menus");
    }

    #[cfg(unix)]
    #[test]
    fn test_listing_keeps_non_utf8_folders() {
        use std::os::unix::ffi::OsStrExt;

        let dir = tempfile::tempdir().unwrap();
        let images = dir.path().join("Images");
        std::fs::create_dir_all(images.join("beach")).unwrap();
        std::fs::create_dir(images.join(std::ffi::OsStr::from_bytes(b"caf\xe9"))).unwrap();

        let listed = negotiator(dir.path().to_path_buf(), Arc::new(Reply("x")))
            .existing_subfolders(Category::Images);
        assert_eq!(listed, ["beach", "caf\u{fffd}"]);
    }

    #[test]
    fn test_normalize_falls_back_to_misc() {
        assert_eq!(normalize_subfolder_name(""), "misc");
        assert_eq!(normalize_subfolder_name("   \n\t"), "misc");
        assert_eq!(normalize_subfolder_name("?!.-"), "misc");
        assert_eq!(normalize_subfolder_name("日本"), "misc");
    }

    #[test]
    fn test_normalized_names_are_always_valid() {
        for raw in ["Beach Trip", "", "___", "A".repeat(50).as_str(), "ÀÉÎ õ", "a\tb c"] {
            assert_valid(&normalize_subfolder_name(raw));
        }
    }

    #[tokio::test]
    async fn test_generation_error_yields_misc() {
        let dir = tempfile::tempdir().unwrap();
        let n = negotiator(dir.path().to_path_buf(), Arc::new(Failing));
        let name = n.suggest(Category::Documents, &ContentSignal::excerpt("notes")).await;
        assert_eq!(name, "misc");
    }

    #[tokio::test]
    async fn test_punctuation_reply_yields_misc() {
        let dir = tempfile::tempdir().unwrap();
        let n = negotiator(dir.path().to_path_buf(), Arc::new(Reply("  ...  ")));
        let name = n.suggest(Category::Images, &ContentSignal::unknown()).await;
        assert_eq!(name, "misc");
    }

    #[tokio::test]
    async fn test_prompt_carries_content_and_fresh_listing() {
        let dir = tempfile::tempdir().unwrap();
        let docs = dir.path().join("Documents");
        std::fs::create_dir_all(docs.join("invoices")).unwrap();
        std::fs::create_dir_all(docs.join("contracts")).unwrap();
        std::fs::write(docs.join("stray.txt"), b"not a folder").unwrap();

        let recorder = Arc::new(Recording::default());
        let n = negotiator(dir.path().to_path_buf(), recorder.clone());
        let signal = ContentSignal::excerpt("Invoice #42 from ACME");

        assert_eq!(n.suggest(Category::Documents, &signal).await, "receipts");

        std::fs::create_dir_all(docs.join("receipts")).unwrap();
        n.suggest(Category::Documents, &signal).await;

        let prompts = recorder.0.lock().unwrap();
        assert!(prompts[0].contains("Invoice #42 from ACME"));
        assert!(prompts[0].contains("contracts, invoices"));
        assert!(!prompts[0].contains("stray.txt"));
        assert!(prompts[1].contains("contracts, invoices, receipts"));
    }

    #[test]
    fn test_missing_category_dir_lists_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let n = negotiator(dir.path().to_path_buf(), Arc::new(Reply("x")));
        assert!(n.existing_subfolders(Category::Videos).is_empty());
        assert!(n
            .build_prompt(&ContentSignal::unknown(), &[])
            .contains("Existing subfolders: (none)"));
    }
}
