//! Header sets exchanged with the transport and exposed to applications.
//!
//! A [`HeaderSet`] is an ordered map from field name to one or more string
//! values. Names are stored exactly as received so that the
//! [`validator`](crate::http::validator) can reject malformed ones; the
//! outgoing side lower-cases names before they get here.
//!
//! Pseudo-headers (`:method`, `:scheme`, `:authority`, `:path`, `:status`)
//! live in the same map as regular fields and are told apart by the leading
//! [`PSEUDO_MARKER`]. [`HeaderSet::regular`] skips them.

use indexmap::IndexMap;

pub const PSEUDO_MARKER: char = ':';

pub const METHOD: &str = ":method";
pub const SCHEME: &str = ":scheme";
pub const AUTHORITY: &str = ":authority";
pub const PATH: &str = ":path";
pub const STATUS: &str = ":status";

pub const HOST: &str = "host";
pub const DATE: &str = "date";

/// Connection-specific fields that have no meaning on a multiplexed stream.
pub const DEPRECATED_HEADERS: [&str; 7] = [
    "connection",
    "host",
    "keep-alive",
    "proxy-connection",
    "te",
    "transfer-encoding",
    "upgrade",
];

pub fn is_deprecated(name: &str) -> bool {
    DEPRECATED_HEADERS.contains(&name)
}

pub fn is_pseudo(name: &str) -> bool {
    name.starts_with(PSEUDO_MARKER)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderSet {
    fields: IndexMap<String, Vec<String>>,
}

impl HeaderSet {
    pub fn new() -> Self {
        Self {
            fields: IndexMap::new(),
        }
    }

    /// Replaces every value of `name` with `value`.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), vec![value.into()]);
    }

    /// Adds `value` after any existing values of `name`.
    pub fn append(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.entry(name.into()).or_default().push(value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.fields.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Vec<String>> {
        self.fields.shift_remove(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Every `(name, value)` pair, one per value, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields
            .iter()
            .flat_map(|(name, values)| values.iter().map(move |v| (name.as_str(), v.as_str())))
    }

    /// Pairs whose name is not a pseudo-header.
    pub fn regular(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter().filter(|(name, _)| !is_pseudo(name))
    }

    /// Copies every field of `other` into `self`, replacing existing names.
    pub fn merge(&mut self, other: &HeaderSet) {
        for (name, values) in &other.fields {
            self.fields.insert(name.clone(), values.clone());
        }
    }
}

impl<K, V> FromIterator<(K, V)> for HeaderSet
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = HeaderSet::new();
        for (name, value) in iter {
            set.append(name, value);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_skips_pseudo_headers() {
        let set: HeaderSet = [(":method", "GET"), ("accept", "*/*"), (":path", "/")]
            .into_iter()
            .collect();

        let regular: Vec<_> = set.regular().collect();
        assert_eq!(regular, vec![("accept", "*/*")]);
        assert_eq!(set.get(METHOD), Some("GET"));
    }

    #[test]
    fn append_keeps_every_value() {
        let mut set = HeaderSet::new();
        set.append("set-cookie", "a=1");
        set.append("set-cookie", "b=2");

        assert_eq!(set.get("set-cookie"), Some("a=1"));
        assert_eq!(set.get_all("set-cookie").len(), 2);
        assert_eq!(set.iter().count(), 2);

        set.insert("set-cookie", "c=3");
        assert_eq!(set.get_all("set-cookie"), ["c=3".to_string()]);
    }

    #[test]
    fn merge_overrides_existing_names() {
        let mut base: HeaderSet = [("server", "h2serve"), ("x-a", "1")].into_iter().collect();
        let extra: HeaderSet = [("x-a", "2")].into_iter().collect();
        base.merge(&extra);

        assert_eq!(base.get("x-a"), Some("2"));
        assert_eq!(base.get("server"), Some("h2serve"));
    }

    #[test]
    fn deprecated_names() {
        assert!(is_deprecated("transfer-encoding"));
        assert!(!is_deprecated("content-type"));
    }
}
