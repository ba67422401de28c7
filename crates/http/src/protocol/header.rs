//! Multi-valued header map shared by requests, responses and multipart parts.
//!
//! Keys are stored exactly as they were parsed or set (case-sensitive), each key
//! maps to the ordered list of its values. No order is kept across keys.

use std::collections::HashMap;
use std::collections::hash_map;

/// A mapping from field name to the ordered values received or set for it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Header {
    inner: HashMap<String, Vec<String>>,
}

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the first value of `key`, if any.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).and_then(|values| values.first()).map(String::as_str)
    }

    /// Returns every value of `key` in insertion order.
    pub fn get_all(&self, key: &str) -> &[String] {
        self.inner.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Like [`Header::get`] but matches the key ignoring ASCII case.
    ///
    /// Only used for the fields that decide message framing, where peers are
    /// not consistent about capitalisation.
    pub fn get_ignore_ascii_case(&self, key: &str) -> Option<&str> {
        self.get(key).or_else(|| {
            self.inner
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(key))
                .and_then(|(_, values)| values.first())
                .map(String::as_str)
        })
    }

    /// Replaces all values of `key` with `value`.
    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.inner.insert(key.into(), vec![value.into()]);
    }

    /// Appends `value` to the values of `key`.
    pub fn add<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.inner.entry(key.into()).or_default().push(value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.inner.remove(key)
    }

    /// Keeps only the keys for which `f` returns true.
    pub fn retain<F: FnMut(&str) -> bool>(&mut self, mut f: F) {
        self.inner.retain(|name, _| f(name));
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.contains_key(key)
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> hash_map::Iter<'_, String, Vec<String>> {
        self.inner.iter()
    }
}

impl<'a> IntoIterator for &'a Header {
    type Item = (&'a String, &'a Vec<String>);
    type IntoIter = hash_map::Iter<'a, String, Vec<String>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
