//! Network-free dedup keys derived from candidate image URLs.
//!
//! Most stock-photo providers embed a stable per-asset token somewhere in the
//! URL, so two URLs for the same asset (different size or query params)
//! collapse to the same identifier without fetching anything. Collisions
//! between distinct providers are accepted.

use url::Url;

/// Providers whose URLs carry a numeric photo id right after a fixed prefix.
const NUMERIC_ID_PROVIDERS: &[&str] = &["pixabay.com/photo/", "pexels.com/photos/"];

const MIN_HEX_RUN: usize = 8;

/// Derive the dedup identifier for `url`. Never fails: anything that cannot
/// be parsed is its own identifier.
pub fn extract_image_identifier(url: &str) -> String {
    for prefix in NUMERIC_ID_PROVIDERS {
        if let Some(id) = token_after(url, prefix, |b| b.is_ascii_digit()) {
            return id.to_string();
        }
    }

    if let Some(tok) = token_after(url, "get/", is_lower_hex) {
        return tok.to_string();
    }

    let Ok(parsed) = Url::parse(url) else {
        return url.to_string();
    };
    let parts: Vec<&str> = parsed
        .path_segments()
        .map(|segs| segs.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();

    let Some(filename) = parts.last() else {
        return url.to_string();
    };
    if let Some(run) = first_hex_run(filename, MIN_HEX_RUN) {
        return run.to_string();
    }

    let tail = parts.len().saturating_sub(2);
    parts[tail..].join("/")
}

fn is_lower_hex(b: u8) -> bool {
    b.is_ascii_digit() || (b'a'..=b'f').contains(&b)
}

/// First occurrence of `needle` that is immediately followed by at least one
/// byte accepted by `accept`; returns the maximal accepted run.
fn token_after<'a>(haystack: &'a str, needle: &str, accept: impl Fn(u8) -> bool) -> Option<&'a str> {
    for (idx, _) in haystack.match_indices(needle) {
        let start = idx + needle.len();
        let len = haystack.as_bytes()[start..].iter().take_while(|b| accept(**b)).count();
        if len > 0 {
            return Some(&haystack[start..start + len]);
        }
    }
    None
}

fn first_hex_run(s: &str, min_len: usize) -> Option<&str> {
    let bytes = s.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if !is_lower_hex(bytes[i]) {
            i += 1;
            continue;
        }
        let start = i;
        while i < bytes.len() && is_lower_hex(bytes[i]) {
            i += 1;
        }
        if i - start >= min_len {
            return Some(&s[start..i]);
        }
    }
    None
}
