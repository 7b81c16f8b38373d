//! Content signature cache.
//!
//! Stores one signature per identity, plus an optional derived payload (the
//! transformed bytes the dev server responds with). Only signatures are ever
//! persisted; payloads are reproducible by re-running the transform.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::util::hash::sha256_hex;

/// How a signature is derived from content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signer {
  /// The content itself when it is valid UTF-8, otherwise a `sha256:` prefixed digest.
  #[default]
  Raw,
  /// Lowercase hex SHA-256 of the content.
  Sha256,
}

impl Signer {
  pub fn sign(self, content: &[u8]) -> String {
    match self {
      Signer::Raw => match std::str::from_utf8(content) {
        Ok(text) => text.to_string(),
        Err(_) => format!("sha256:{}", sha256_hex(content)),
      },
      Signer::Sha256 => sha256_hex(content),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
  pub signature: String,
  pub payload: Option<Vec<u8>>,
}

/// Serialized form: identity -> signature.
pub type SerializedCache = BTreeMap<String, String>;

#[derive(Debug, Default)]
pub struct ContentCache {
  signer: Signer,
  entries: HashMap<String, CacheEntry>,
}

impl ContentCache {
  pub fn new(signer: Signer) -> Self {
    Self {
      signer,
      entries: HashMap::new(),
    }
  }

  /// Store the signature of `content` for `id`, replacing any previous entry.
  pub fn register(&mut self, id: &str, content: &[u8], payload: Option<Vec<u8>>) {
    let signature = self.signer.sign(content);
    self.entries.insert(id.to_string(), CacheEntry { signature, payload });
  }

  /// True iff an entry exists and its signature equals the signature of `content`.
  pub fn test(&self, id: &str, content: &[u8]) -> bool {
    self
      .entries
      .get(id)
      .is_some_and(|entry| entry.signature == self.signer.sign(content))
  }

  pub fn clear(&mut self, id: &str) {
    self.entries.remove(id);
  }

  /// The payload stored by the last `register` of `id`.
  pub fn get(&self, id: &str) -> Option<&[u8]> {
    self.entries.get(id).and_then(|entry| entry.payload.as_deref())
  }

  pub fn contains(&self, id: &str) -> bool {
    self.entries.contains_key(id)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }

  pub fn serialize(&self) -> SerializedCache {
    self
      .entries
      .iter()
      .map(|(id, entry)| (id.clone(), entry.signature.clone()))
      .collect()
  }

  /// Replace all entries with persisted signatures. Payloads start empty.
  pub fn deserialize(&mut self, signatures: SerializedCache) {
    self.entries = signatures
      .into_iter()
      .map(|(id, signature)| (id, CacheEntry { signature, payload: None }))
      .collect();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_matches_registered_content() {
    let mut cache = ContentCache::default();
    cache.register("/foo.txt", b"abc", None);

    assert!(cache.test("/foo.txt", b"abc"));
    assert!(!cache.test("/foo.txt", b"abd"));
    assert!(!cache.test("/bar.txt", b"abc"));
  }

  #[test]
  fn hashed_signatures_are_compared() {
    let mut cache = ContentCache::new(Signer::Sha256);
    cache.register("/foo.txt", b"abc", None);

    assert!(cache.test("/foo.txt", b"abc"));
    assert!(!cache.test("/foo.txt", b"ABC"));
    assert_eq!(cache.serialize()["/foo.txt"].len(), 64);
  }

  #[test]
  fn binary_content_is_signed_losslessly() {
    let mut cache = ContentCache::default();
    cache.register("/logo.png", &[0x89, 0xff, 0x00], None);

    assert!(cache.test("/logo.png", &[0x89, 0xff, 0x00]));
    assert!(!cache.test("/logo.png", &[0x89, 0xfe, 0x00]));
    assert!(cache.serialize()["/logo.png"].starts_with("sha256:"));
  }

  #[test]
  fn clear_removes_entry_and_payload() {
    let mut cache = ContentCache::default();
    cache.register("/foo.txt", b"abc", Some(b"transformed".to_vec()));
    assert_eq!(cache.get("/foo.txt"), Some(&b"transformed"[..]));

    cache.clear("/foo.txt");
    assert!(cache.get("/foo.txt").is_none());
    assert!(!cache.test("/foo.txt", b"abc"));
  }

  #[test]
  fn serialization_drops_payloads() {
    let mut cache = ContentCache::default();
    cache.register("/foo.txt", b"abc", Some(b"payload".to_vec()));
    cache.register("/bar.txt", b"def", None);

    let serialized = cache.serialize();
    assert_eq!(serialized.len(), 2);
    assert_eq!(serialized["/foo.txt"], "abc");

    let mut restored = ContentCache::default();
    restored.deserialize(serialized);
    assert!(restored.test("/foo.txt", b"abc"));
    assert!(restored.get("/foo.txt").is_none());
  }
}
