//! Key paths: routes from the document root to a mutation target.
//!
//! A [`KeyPath`] is an ordered list of `(key, type)` segments. Map and root keys
//! are strings; array elements are addressed by zid so that a path keeps
//! pointing at the same element when earlier elements are removed.
//!
//! Paths are recomputed on demand from parent links and only persist inside
//! serialized events, where they travel as UTF-8 JSON:
//!
//! ```
//! use zdoc::path::{KeyPath, KeyType};
//!
//! let mut path = KeyPath::new();
//! path.push("root", KeyType::Map);
//! path.push(7u32, KeyType::ElementValue);
//! assert_eq!(path.to_json().unwrap(), r#"[["root","m"],[7,"ev"]]"#);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::binding::Zid;

/// Type tag of one key path segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    #[serde(rename = "m")]
    Map,
    #[serde(rename = "a")]
    Array,
    #[serde(rename = "v")]
    Value,
    #[serde(rename = "ea")]
    ElementArray,
    #[serde(rename = "em")]
    ElementMap,
    #[serde(rename = "ev")]
    ElementValue,
}

impl KeyType {
    /// The `element-*` counterpart used for array members.
    pub fn element(self) -> Self {
        match self {
            KeyType::Map | KeyType::ElementMap => KeyType::ElementMap,
            KeyType::Array | KeyType::ElementArray => KeyType::ElementArray,
            KeyType::Value | KeyType::ElementValue => KeyType::ElementValue,
        }
    }

    /// True when the key is a zid rather than a map key.
    pub fn is_element(self) -> bool {
        matches!(
            self,
            KeyType::ElementArray | KeyType::ElementMap | KeyType::ElementValue
        )
    }
}

/// Key of one segment: a map key or an array zid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathKey {
    Id(Zid),
    Name(String),
}

impl PathKey {
    pub fn as_zid(&self) -> Option<Zid> {
        match self {
            PathKey::Id(zid) => Some(*zid),
            PathKey::Name(_) => None,
        }
    }

    pub fn as_name(&self) -> Option<&str> {
        match self {
            PathKey::Name(name) => Some(name),
            PathKey::Id(_) => None,
        }
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathKey::Id(zid) => write!(f, "#{zid}"),
            PathKey::Name(name) => write!(f, "{name}"),
        }
    }
}

impl From<&str> for PathKey {
    fn from(value: &str) -> Self {
        PathKey::Name(value.to_string())
    }
}

impl From<String> for PathKey {
    fn from(value: String) -> Self {
        PathKey::Name(value)
    }
}

impl From<Zid> for PathKey {
    fn from(value: Zid) -> Self {
        PathKey::Id(value)
    }
}

/// One `(key, type)` hop.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathSegment(pub PathKey, pub KeyType);

impl PathSegment {
    pub fn key(&self) -> &PathKey {
        &self.0
    }

    pub fn key_type(&self) -> KeyType {
        self.1
    }
}

/// Route from the document root to a target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyPath(Vec<PathSegment>);

impl KeyPath {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn push(&mut self, key: impl Into<PathKey>, key_type: KeyType) {
        self.0.push(PathSegment(key.into(), key_type));
    }

    /// Builder form of [`KeyPath::push`].
    pub fn with(mut self, key: impl Into<PathKey>, key_type: KeyType) -> Self {
        self.push(key, key_type);
        self
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn last(&self) -> Option<&PathSegment> {
        self.0.last()
    }

    /// Zid of the final segment, when it addresses an array element.
    pub fn last_zid(&self) -> Option<Zid> {
        self.last().and_then(|s| s.key().as_zid())
    }

    /// Everything but the final segment: the path of the mutated container.
    pub fn parent(&self) -> KeyPath {
        match self.0.split_last() {
            Some((_, head)) => KeyPath(head.to_vec()),
            None => KeyPath::new(),
        }
    }

    /// Same length and same keys. Type tags are ignored.
    pub fn same_keys(&self, other: &KeyPath) -> bool {
        self.0.len() == other.0.len() && self.keys_match(other)
    }

    /// Strictly shorter and a key-wise prefix of `other`. Type tags are ignored.
    pub fn is_proper_prefix_of(&self, other: &KeyPath) -> bool {
        self.0.len() < other.0.len() && self.keys_match(other)
    }

    fn keys_match(&self, other: &KeyPath) -> bool {
        self.0.iter().zip(&other.0).all(|(a, b)| a.0 == b.0)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.0.iter().map(|s| s.0.to_string()).collect();
        write!(f, "/{}", parts.join("/"))
    }
}

impl FromIterator<PathSegment> for KeyPath {
    fn from_iter<I: IntoIterator<Item = PathSegment>>(iter: I) -> Self {
        KeyPath(iter.into_iter().collect())
    }
}
