use indexmap::IndexMap;

/// Insertion-ordered header store, keyed by lowercased name for lookup/dedup
/// while the name as originally supplied is kept alongside the value for
/// assembly (§6.1: "Headers are stored lowercased for lookup; original case
/// is preserved in assembly").
#[derive(Default, Clone, Debug)]
pub struct HeaderMap {
    entries: IndexMap<String, (String, String)>,
}

impl HeaderMap {
    pub fn new() -> HeaderMap {
        HeaderMap {
            entries: IndexMap::new(),
        }
    }

    /// Insert `name: value`. If the (lowercased) key already exists and
    /// `allow_update` is false, the existing entry is kept and `false` is
    /// returned. Otherwise the entry is set/replaced — original-case `name`
    /// included — and `true` is returned.
    pub fn insert(&mut self, name: &str, value: impl Into<String>, allow_update: bool) -> bool {
        let key = name.to_ascii_lowercase();

        if self.entries.contains_key(&key) && !allow_update {
            return false;
        }

        self.entries.insert(key, (name.to_string(), value.into()));
        true
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(&name.to_ascii_lowercase()).map(|(_, v)| v.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        self.entries.shift_remove(&name.to_ascii_lowercase()).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear()
    }

    /// Iterate headers in insertion order, original-case name first, as
    /// assembled on the wire.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.values().map(|(name, v)| (name.as_str(), v.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lowercases_key() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "text/plain", false);

        assert_eq!(headers.get("content-type"), Some("text/plain"));
        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
    }

    #[test]
    fn test_duplicate_without_update_keeps_original() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Id", "1", false);

        let added = headers.insert("x-id", "2", false);

        assert!(!added);
        assert_eq!(headers.get("x-id"), Some("1"));
    }

    #[test]
    fn test_duplicate_with_update_replaces() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Id", "1", false);

        let added = headers.insert("x-id", "2", true);

        assert!(added);
        assert_eq!(headers.get("x-id"), Some("2"));
    }

    #[test]
    fn test_iteration_preserves_insertion_order() {
        let mut headers = HeaderMap::new();
        headers.insert("Host", "x", false);
        headers.insert("Accept", "*/*", false);
        headers.insert("Content-Length", "0", false);

        let keys: Vec<_> = headers.iter().map(|(k, _)| k).collect();
        assert_eq!(keys, vec!["Host", "Accept", "Content-Length"]);
    }

    #[test]
    fn test_iteration_preserves_original_case() {
        let mut headers = HeaderMap::new();
        headers.insert("Content-Type", "text/plain", false);

        assert_eq!(headers.get("CONTENT-TYPE"), Some("text/plain"));
        let (name, value) = headers.iter().next().unwrap();
        assert_eq!(name, "Content-Type");
        assert_eq!(value, "text/plain");
    }
}
