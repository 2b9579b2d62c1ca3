// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

//! File categories and the extension table that assigns them

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Top-level bucket a file is filed under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    Documents,
    Images,
    Videos,
    Audio,
    Archives,
    Code,
    Others,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Documents,
        Category::Images,
        Category::Videos,
        Category::Audio,
        Category::Archives,
        Category::Code,
        Category::Others,
    ];

    /// Directory name under the destination root
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Documents => "Documents",
            Category::Images => "Images",
            Category::Videos => "Videos",
            Category::Audio => "Audio",
            Category::Archives => "Archives",
            Category::Code => "Code",
            Category::Others => "Others",
        }
    }

    /// Whether files in this category get content analysis and a subfolder
    pub fn is_analyzed(&self) -> bool {
        matches!(
            self,
            Category::Documents | Category::Images | Category::Videos | Category::Audio
        )
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown category '{}'", s))
    }
}

const DEFAULT_TABLE: &[(Category, &[&str])] = &[
    (
        Category::Documents,
        &[
            "pdf", "doc", "docx", "txt", "rtf", "odt", "md", "markdown", "rst", "adoc",
            "xls", "xlsx", "ods", "csv", "ppt", "pptx", "odp", "epub",
        ],
    ),
    (
        Category::Images,
        &[
            "jpg", "jpeg", "png", "gif", "bmp", "tiff", "tif", "webp", "svg", "heic", "heif",
            "avif", "ico",
        ],
    ),
    (
        Category::Videos,
        &["mp4", "avi", "mkv", "mov", "wmv", "flv", "webm", "m4v", "mpeg", "mpg", "3gp"],
    ),
    (
        Category::Audio,
        &["mp3", "wav", "flac", "aac", "ogg", "oga", "m4a", "wma", "opus", "aiff"],
    ),
    (
        Category::Archives,
        &["zip", "rar", "7z", "tar", "gz", "tgz", "bz2", "xz", "zst", "iso"],
    ),
    (
        Category::Code,
        &[
            "py", "js", "ts", "jsx", "tsx", "html", "htm", "css", "java", "c", "h", "cpp",
            "hpp", "cs", "rs", "go", "rb", "php", "sh", "swift", "kt", "json", "xml", "yaml",
            "yml", "toml", "sql", "ipynb",
        ],
    ),
];

/// Maps file extensions to categories.
///
/// Built once at startup from the built-in table plus configured overrides
/// and never mutated afterwards, so classification is a pure function of
/// the path.
#[derive(Debug, Clone)]
pub struct Categorizer {
    table: HashMap<String, Category>,
}

impl Categorizer {
    /// Built-in table with `overrides` merged on top
    pub fn with_overrides(overrides: &BTreeMap<String, Category>) -> Self {
        let mut categorizer = Self::default();
        for (ext, category) in overrides {
            let ext = ext.trim_start_matches('.').to_lowercase();
            categorizer.table.insert(ext, *category);
        }
        categorizer
    }

    /// Category for a path, `Others` when the extension is unknown or absent
    pub fn classify(&self, path: &Path) -> Category {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(|ext| self.table.get(&ext.to_lowercase()))
            .copied()
            .unwrap_or(Category::Others)
    }

    /// Extensions mapped to `category`, sorted
    pub fn extensions_for(&self, category: Category) -> Vec<&str> {
        let mut exts: Vec<&str> = self
            .table
            .iter()
            .filter(|(_, c)| **c == category)
            .map(|(e, _)| e.as_str())
            .collect();
        exts.sort_unstable();
        exts
    }
}

impl Default for Categorizer {
    fn default() -> Self {
        let table = DEFAULT_TABLE
            .iter()
            .flat_map(|(category, exts)| exts.iter().map(move |e| (e.to_string(), *category)))
            .collect();
        Self { table }
    }
}
