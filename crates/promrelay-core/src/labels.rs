//! Label sets and the per-exporter fragment resolver.
//!
//! Fragments are formatted once at listener setup and shared read-only by
//! every request. Values are emitted verbatim: quotes and backslashes are not
//! escaped.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::de::{Deserialize, Deserializer, MapAccess, Visitor};

/// Ordered `key -> value` pairs, kept in declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSet(Vec<(String, String)>);

impl LabelSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Append a pair. Returns false (and keeps the first value) on a duplicate key.
    pub fn push(&mut self, key: impl Into<String>, value: impl Into<String>) -> bool {
        let key = key.into();
        if self.0.iter().any(|(k, _)| *k == key) {
            return false;
        }
        self.0.push((key, value.into()));
        true
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for LabelSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut set = LabelSet::new();
        for (k, v) in iter {
            set.push(k, v);
        }
        set
    }
}

impl<'de> Deserialize<'de> for LabelSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        struct LabelSetVisitor;

        impl<'de> Visitor<'de> for LabelSetVisitor {
            type Value = LabelSet;

            fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
                f.write_str("a mapping of label name to label value")
            }

            fn visit_unit<E: serde::de::Error>(self) -> std::result::Result<LabelSet, E> {
                Ok(LabelSet::new())
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> std::result::Result<LabelSet, A::Error> {
                let mut set = LabelSet::new();
                while let Some((k, v)) = map.next_entry::<String, String>()? {
                    if !set.push(k.clone(), v) {
                        return Err(serde::de::Error::custom(format!("duplicate label: {k}")));
                    }
                }
                Ok(set)
            }
        }

        deserializer.deserialize_any(LabelSetVisitor)
    }
}

/// Format a single pair as an injectable fragment.
pub fn fragment(key: &str, value: &str) -> String {
    format!("{key}=\"{value}\"")
}

/// Ordered fragments for one exporter: exporter-specific first, then common.
pub fn resolve(exporter: &LabelSet, common: &LabelSet) -> Vec<String> {
    exporter
        .iter()
        .chain(common.iter())
        .map(|(k, v)| fragment(k, v))
        .collect()
}

/// Resolved fragments plus their pre-joined injection text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelFragments {
    fragments: Vec<String>,
    joined: String,
}

impl LabelFragments {
    pub fn new(fragments: Vec<String>) -> Self {
        let joined = fragments.join(",");
        Self { fragments, joined }
    }

    pub fn fragments(&self) -> &[String] {
        &self.fragments
    }

    /// `frag1,frag2,...` (no braces).
    pub fn joined(&self) -> &str {
        &self.joined
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

/// Per-exporter fragments for one listener. Built once, never mutated.
#[derive(Debug, Default)]
pub struct ResolvedLabels {
    by_exporter: HashMap<String, Arc<LabelFragments>>,
    empty: Arc<LabelFragments>,
}

impl ResolvedLabels {
    /// Resolve every `(exporter name, exporter labels)` against the common set.
    pub fn build<'a, I>(exporters: I, common: &LabelSet) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a LabelSet)>,
    {
        let by_exporter = exporters
            .into_iter()
            .map(|(name, labels)| {
                let frags = LabelFragments::new(resolve(labels, common));
                tracing::debug!(exporter = %name, labels = %frags.joined(), "resolved labels");
                (name.to_string(), Arc::new(frags))
            })
            .collect();
        Self {
            by_exporter,
            empty: Arc::new(LabelFragments::default()),
        }
    }

    /// Fragments for `exporter`; unknown names get an empty list.
    pub fn for_exporter(&self, exporter: &str) -> Arc<LabelFragments> {
        self.by_exporter
            .get(exporter)
            .cloned()
            .unwrap_or_else(|| Arc::clone(&self.empty))
    }

    pub fn len(&self) -> usize {
        self.by_exporter.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_exporter.is_empty()
    }
}
