//! Variations: one parameter set applied to a cloned template.
//!
//! Also hosts the comma-separated list parsers used to turn user input
//! (`"10, 20, 30"`) into an ordered sequence of variations.

use std::collections::{BTreeMap, BTreeSet};

use crate::paths::OverrideKind;

/// One parameter set for a single job.
///
/// Order of variations in a batch determines output slot order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Variation {
    overrides: BTreeMap<OverrideKind, serde_json::Value>,
    auxiliary_refs: BTreeSet<String>,
}

impl Variation {
    pub fn new() -> Self {
        Self::default()
    }

    /// A variation carrying only a noise seed.
    pub fn seed(seed: u64) -> Self {
        Self::new().with_value(OverrideKind::Seed, serde_json::Value::from(seed))
    }

    pub fn with_text(self, text: impl Into<String>) -> Self {
        self.with_value(OverrideKind::Text, serde_json::Value::String(text.into()))
    }

    pub fn with_model(self, model: impl Into<String>) -> Self {
        self.with_value(OverrideKind::Model, serde_json::Value::String(model.into()))
    }

    /// Set the input image and record it as an asset needing upload.
    pub fn with_image(self, image: impl Into<String>) -> Self {
        let image = image.into();
        self.with_value(OverrideKind::Image, serde_json::Value::String(image.clone()))
            .with_auxiliary_ref(image)
    }

    /// Set an arbitrary override. A later value for the same kind wins.
    pub fn with_value(mut self, kind: OverrideKind, value: serde_json::Value) -> Self {
        self.overrides.insert(kind, value);
        self
    }

    pub fn with_auxiliary_ref(mut self, asset: impl Into<String>) -> Self {
        self.auxiliary_refs.insert(asset.into());
        self
    }

    pub fn overrides(&self) -> impl Iterator<Item = (&OverrideKind, &serde_json::Value)> {
        self.overrides.iter()
    }

    pub fn get(&self, kind: &OverrideKind) -> Option<&serde_json::Value> {
        self.overrides.get(kind)
    }

    pub fn auxiliary_refs(&self) -> &BTreeSet<String> {
        &self.auxiliary_refs
    }
}

// ---------------------------------------------------------------------------
// List parsing
// ---------------------------------------------------------------------------

/// Split comma-separated text into trimmed, non-empty items.
pub fn split_list(text: &str) -> Vec<String> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Parse a comma-separated seed list.
///
/// Only entries made entirely of ASCII digits that fit in a `u64` are
/// kept; anything else (signs, decimals, words) is skipped.
pub fn parse_seed_list(text: &str) -> Vec<u64> {
    text.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .filter_map(|s| s.parse::<u64>().ok())
        .collect()
}

/// One seed variation per seed, each also carrying `text` when given.
pub fn seed_variations(seeds: &[u64], text: Option<&str>) -> Vec<Variation> {
    seeds
        .iter()
        .map(|&seed| {
            let variation = Variation::seed(seed);
            match text {
                Some(text) => variation.with_text(text),
                None => variation,
            }
        })
        .collect()
}
