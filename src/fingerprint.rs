// SPDX-FileCopyrightText: 2025 Hyperpolymath
// SPDX-License-Identifier: PMPL-1.0-or-later

//! Content normalization and fingerprint hashing for near-duplicate detection.
//!
//! Normalization steps, in order:
//! 1. Lowercase
//! 2. Collapse whitespace runs to a single space
//! 3. Strip every character that is neither a word character nor whitespace
//! 4. Trim

use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;

fn whitespace_runs() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").expect("static regex"))
}

fn non_word_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^\w\s]").expect("static regex"))
}

/// Normalize content before hashing.
pub fn normalize(content: &str) -> String {
    let lowered = content.to_lowercase();
    let collapsed = whitespace_runs().replace_all(&lowered, " ");
    let stripped = non_word_chars().replace_all(&collapsed, "");
    stripped.trim().to_string()
}

/// Hex-encoded SHA-256 of the normalized content.
pub fn content_hash(content: &str) -> String {
    let digest = Sha256::digest(normalize(content).as_bytes());
    hex::encode(digest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("Hello   World!!"), "hello world");
        assert_eq!(normalize("  \tBitcoin\n\nis  money. "), "bitcoin is money");
        assert_eq!(normalize("snake_case stays"), "snake_case stays");
    }

    #[test]
    fn test_near_duplicates_share_a_hash() {
        assert_eq!(content_hash("hello world"), content_hash("Hello   World!!"));
        assert_ne!(content_hash("hello world"), content_hash("hello there"));
    }

    #[test]
    fn test_hash_is_sha256_hex() {
        // sha256("abc")
        assert_eq!(
            content_hash("ABC"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_punctuation_between_words_leaves_double_space() {
        // whitespace is collapsed before punctuation is stripped
        assert_eq!(normalize("a - b"), "a  b");
    }
}
