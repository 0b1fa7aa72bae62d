use std::collections::HashSet;

use crate::batch::HashResult;
use crate::identifier::extract_image_identifier;

/// Seen identifiers and seen colour hashes for one selection session.
///
/// Append-only: there is no removal. A fresh session gets a fresh registry.
#[derive(Debug, Default, Clone)]
pub struct DedupRegistry {
    seen_identifiers: HashSet<String>,
    seen_hashes: HashSet<String>,
}

impl DedupRegistry {
    pub fn new() -> Self { Self::default() }

    pub fn has_identifier(&self, id: &str) -> bool { self.seen_identifiers.contains(id) }
    pub fn has_hash(&self, hash: &str) -> bool { self.seen_hashes.contains(hash) }

    /// Returns true if `id` was not seen before.
    pub fn insert_identifier(&mut self, id: String) -> bool { self.seen_identifiers.insert(id) }
    /// Returns true if `hash` was not seen before.
    pub fn insert_hash(&mut self, hash: String) -> bool { self.seen_hashes.insert(hash) }

    pub fn identifier_count(&self) -> usize { self.seen_identifiers.len() }
    pub fn hash_count(&self) -> usize { self.seen_hashes.len() }
}

/// Stage 1: drop URLs whose identifier is already known, including repeats
/// inside `urls` itself.
pub fn stage_one(registry: &mut DedupRegistry, urls: Vec<String>) -> Vec<String> {
    let before = urls.len();
    let kept: Vec<String> = urls
        .into_iter()
        .filter(|u| registry.insert_identifier(extract_image_identifier(u)))
        .collect();
    tracing::debug!(before, after = kept.len(), "identifier filter");
    kept
}

/// Stage 2: drop candidates whose hash is already known. A missing hash
/// can't prove anything, so those candidates always pass.
pub fn stage_two(registry: &mut DedupRegistry, results: Vec<HashResult>) -> Vec<String> {
    let before = results.len();
    let kept: Vec<String> = results
        .into_iter()
        .filter_map(|r| match r.hash {
            Some(h) => registry.insert_hash(h).then_some(r.url),
            None => Some(r.url),
        })
        .collect();
    tracing::debug!(before, after = kept.len(), "hash filter");
    kept
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(v: &[&str]) -> Vec<String> { v.iter().map(|x| x.to_string()).collect() }

    #[test]
    fn same_identifier_different_query_survives_once() {
        let mut reg = DedupRegistry::new();
        let out = stage_one(&mut reg, s(&["https://x/get/abcd1234", "https://x/get/abcd1234?w=100"]));
        assert_eq!(out, s(&["https://x/get/abcd1234"]));
        assert!(reg.has_identifier("abcd1234"));
    }

    #[test]
    fn identifiers_persist_across_pages() {
        let mut reg = DedupRegistry::new();
        stage_one(&mut reg, s(&["https://x/get/aaaa1111"]));
        let out = stage_one(&mut reg, s(&["https://x/get/aaaa1111?page=2", "https://x/get/bbbb2222"]));
        assert_eq!(out, s(&["https://x/get/bbbb2222"]));
        assert_eq!(reg.identifier_count(), 2);
    }

    #[test]
    fn null_hashes_never_collide() {
        let mut reg = DedupRegistry::new();
        let out = stage_two(
            &mut reg,
            vec![HashResult::new("u1".into(), None), HashResult::new("u2".into(), None)],
        );
        assert_eq!(out, s(&["u1", "u2"]));
        assert_eq!(reg.hash_count(), 0);
    }

    #[test]
    fn repeated_hash_is_rejected_and_order_kept() {
        let mut reg = DedupRegistry::new();
        let h = "0123456789abcdef".to_string();
        let out = stage_two(
            &mut reg,
            vec![
                HashResult::new("first".into(), Some(h.clone())),
                HashResult::new("nohash".into(), None),
                HashResult::new("copy".into(), Some(h.clone())),
                HashResult::new("other".into(), Some("ffffffffffffffff".into())),
            ],
        );
        assert_eq!(out, s(&["first", "nohash", "other"]));
        assert!(reg.has_hash(&h));
    }
}
