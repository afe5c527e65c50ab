//! Override addressing: where in a template each variation value lands.
//!
//! A [`FieldPath`] names one field inside a template document. Paths are
//! written either as JSON pointers (`/81/inputs/noise_seed`) or in dotted
//! form (`81.inputs.noise_seed`). [`OverridePaths`] maps each
//! [`OverrideKind`] to the fields it overwrites.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// FieldPath
// ---------------------------------------------------------------------------

/// Location of a single field inside a template document.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FieldPath {
    segments: Vec<String>,
}

impl FieldPath {
    /// Parse a JSON pointer or a dotted path.
    ///
    /// Empty paths and empty segments are rejected.
    pub fn parse(raw: &str) -> Result<Self, CoreError> {
        let raw = raw.trim();
        let segments: Vec<String> = if let Some(pointer) = raw.strip_prefix('/') {
            pointer
                .split('/')
                .map(|s| s.replace("~1", "/").replace("~0", "~"))
                .collect()
        } else {
            raw.split('.').map(str::to_string).collect()
        };

        if raw.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(CoreError::Validation(format!(
                "Invalid field path '{raw}': segments must not be empty"
            )));
        }

        Ok(Self { segments })
    }

    /// Path to a ComfyUI node input: `/{node_id}/inputs/{input}`.
    pub fn node_input(node_id: &str, input: &str) -> Self {
        Self {
            segments: vec![node_id.to_string(), "inputs".to_string(), input.to_string()],
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Render as an RFC 6901 JSON pointer.
    pub fn to_pointer(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push('/');
            out.push_str(&segment.replace('~', "~0").replace('/', "~1"));
        }
        out
    }

    /// Look up the addressed value, if every segment exists.
    pub fn lookup<'a>(&self, root: &'a serde_json::Value) -> Option<&'a serde_json::Value> {
        self.segments
            .iter()
            .try_fold(root, |node, segment| match node {
                serde_json::Value::Object(map) => map.get(segment),
                serde_json::Value::Array(items) => {
                    segment.parse::<usize>().ok().and_then(|i| items.get(i))
                }
                _ => None,
            })
    }

    /// Mutable lookup. Never creates intermediate nodes.
    pub fn lookup_mut<'a>(
        &self,
        root: &'a mut serde_json::Value,
    ) -> Option<&'a mut serde_json::Value> {
        self.segments
            .iter()
            .try_fold(root, |node, segment| match node {
                serde_json::Value::Object(map) => map.get_mut(segment),
                serde_json::Value::Array(items) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(move |i| items.get_mut(i)),
                _ => None,
            })
    }
}

impl FromStr for FieldPath {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_pointer())
    }
}

// ---------------------------------------------------------------------------
// ValueKind
// ---------------------------------------------------------------------------

/// The shape of value an override is allowed to write.
///
/// `Any` is the explicit wildcard: it accepts every JSON value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Any,
    Text,
    Integer,
    Number,
    Bool,
}

impl ValueKind {
    pub fn accepts(self, value: &serde_json::Value) -> bool {
        match self {
            Self::Any => true,
            Self::Text => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Number => value.is_number(),
            Self::Bool => value.is_boolean(),
        }
    }
}

// ---------------------------------------------------------------------------
// OverrideKind
// ---------------------------------------------------------------------------

/// What a variation value means, independent of where it is written.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrideKind {
    /// Positive prompt text.
    Text,
    /// Sampler noise seed.
    Seed,
    /// Checkpoint / model filename.
    Model,
    /// Input image asset name.
    Image,
    /// Free-form key, typically produced by a sweep.
    Named(String),
}

impl OverrideKind {
    /// Value shape this kind may write into a template.
    pub fn value_kind(&self) -> ValueKind {
        match self {
            Self::Text | Self::Model | Self::Image => ValueKind::Text,
            Self::Seed => ValueKind::Integer,
            Self::Named(_) => ValueKind::Any,
        }
    }
}

impl fmt::Display for OverrideKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text => f.write_str("text"),
            Self::Seed => f.write_str("seed"),
            Self::Model => f.write_str("model"),
            Self::Image => f.write_str("image"),
            Self::Named(key) => write!(f, "named:{key}"),
        }
    }
}

// ---------------------------------------------------------------------------
// OverridePaths
// ---------------------------------------------------------------------------

/// Mapping from override kind to the template fields it targets.
///
/// One kind may target several fields (e.g. the same seed written into
/// two sampler nodes).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverridePaths {
    paths: BTreeMap<OverrideKind, Vec<FieldPath>>,
}

impl OverridePaths {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, kind: OverrideKind, path: FieldPath) -> Self {
        self.insert(kind, path);
        self
    }

    /// Add a target field for `kind`. Duplicate paths are ignored.
    pub fn insert(&mut self, kind: OverrideKind, path: FieldPath) {
        let targets = self.paths.entry(kind).or_default();
        if !targets.contains(&path) {
            targets.push(path);
        }
    }

    /// Add every path from `other` that is not already present.
    pub fn merge(&mut self, other: OverridePaths) {
        for (kind, targets) in other.paths {
            for path in targets {
                self.insert(kind.clone(), path);
            }
        }
    }

    /// Target fields for `kind`.
    ///
    /// A [`OverrideKind::Named`] key with no configured target is read as
    /// a field path itself, so sweep keys like `3.inputs.cfg` address the
    /// template directly.
    pub fn targets(&self, kind: &OverrideKind) -> Vec<FieldPath> {
        match self.paths.get(kind) {
            Some(targets) => targets.clone(),
            None => match kind {
                OverrideKind::Named(key) => FieldPath::parse(key).into_iter().collect(),
                _ => Vec::new(),
            },
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OverrideKind, &[FieldPath])> {
        self.paths.iter().map(|(k, v)| (k, v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
