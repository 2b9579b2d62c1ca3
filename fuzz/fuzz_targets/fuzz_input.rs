// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025 Jonathan D. A. Jewell <hyperpolymath>

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::path::Path;

use taxis::negotiator::{normalize_subfolder_name, MAX_SUBFOLDER_LEN};
use taxis::Categorizer;

#[derive(Debug, Arbitrary)]
struct Input<'a> {
    reply: &'a str,
    file_name: &'a str,
}

fuzz_target!(|input: Input<'_>| {
    let name = normalize_subfolder_name(input.reply);
    assert!(!name.is_empty());
    assert!(name.len() <= MAX_SUBFOLDER_LEN);
    assert!(name
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));

    let categorizer = Categorizer::default();
    let category = categorizer.classify(Path::new(input.file_name));
    assert_eq!(category, categorizer.classify(Path::new(input.file_name)));
});
