//! Job templates and the override engine.
//!
//! A [`JobTemplate`] is a ComfyUI-style workflow document: a JSON object
//! keyed by node id, each node carrying `class_type` and `inputs`. It is
//! read-only once loaded. [`JobTemplate::apply`] produces an independent
//! copy with one variation's values written into it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::TemplateError;
use crate::paths::{FieldPath, OverrideKind, OverridePaths};
use crate::variation::Variation;

/// Maximum template JSON size in bytes (10 MB).
pub const MAX_TEMPLATE_JSON_SIZE: usize = 10_000_000;

/// An immutable, validated job template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "serde_json::Value", into = "serde_json::Value")]
pub struct JobTemplate {
    document: serde_json::Value,
}

/// Why an override was not written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The target path does not exist in the template.
    MissingPath,
    /// The value does not fit the override kind (e.g. text for a seed).
    KindMismatch,
}

/// An override that [`JobTemplate::apply_report`] did not write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedOverride {
    pub kind: OverrideKind,
    pub path: Option<FieldPath>,
    pub reason: SkipReason,
}

impl JobTemplate {
    /// Wrap a parsed document. It must be a non-empty JSON object.
    pub fn from_value(document: serde_json::Value) -> Result<Self, TemplateError> {
        let obj = document
            .as_object()
            .ok_or_else(|| TemplateError::Invalid("Template JSON must be an object".into()))?;
        if obj.is_empty() {
            return Err(TemplateError::Invalid(
                "Template JSON must contain at least one node".into(),
            ));
        }
        Ok(Self { document })
    }

    /// Parse a template from JSON text.
    pub fn from_json_str(text: &str) -> Result<Self, TemplateError> {
        if text.len() > MAX_TEMPLATE_JSON_SIZE {
            return Err(TemplateError::Invalid(format!(
                "Template JSON exceeds maximum size of {MAX_TEMPLATE_JSON_SIZE} bytes (got {} bytes)",
                text.len()
            )));
        }
        Self::from_value(serde_json::from_str(text)?)
    }

    /// Read and parse a template file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, TemplateError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| TemplateError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    /// Check that every node is an object with a string `class_type`.
    pub fn validate_nodes(&self) -> Result<(), TemplateError> {
        for (node_id, node) in self.nodes() {
            let has_class = node
                .get("class_type")
                .map(|v| v.is_string())
                .unwrap_or(false);
            if !has_class {
                return Err(TemplateError::Invalid(format!(
                    "Node '{node_id}' is missing required 'class_type' field"
                )));
            }
        }
        Ok(())
    }

    pub fn as_value(&self) -> &serde_json::Value {
        &self.document
    }

    pub fn into_value(self) -> serde_json::Value {
        self.document
    }

    /// Iterate over `(node_id, node)` pairs.
    pub fn nodes(&self) -> impl Iterator<Item = (&str, &serde_json::Value)> {
        self.document
            .as_object()
            .into_iter()
            .flat_map(|obj| obj.iter().map(|(k, v)| (k.as_str(), v)))
    }

    pub fn get(&self, path: &FieldPath) -> Option<&serde_json::Value> {
        path.lookup(&self.document)
    }

    /// Produce a copy of this template with `variation` applied.
    ///
    /// Each override is written to every target path that already exists
    /// in the template; absent paths are skipped. `self` is never
    /// modified.
    pub fn apply(&self, variation: &Variation, paths: &OverridePaths) -> JobTemplate {
        self.apply_report(variation, paths).0
    }

    /// Like [`apply`](Self::apply), also returning the overrides that were
    /// not written.
    pub fn apply_report(
        &self,
        variation: &Variation,
        paths: &OverridePaths,
    ) -> (JobTemplate, Vec<SkippedOverride>) {
        let mut document = self.document.clone();
        let mut skipped = Vec::new();

        for (kind, value) in variation.overrides() {
            let targets = paths.targets(kind);
            if targets.is_empty() {
                skipped.push(SkippedOverride {
                    kind: kind.clone(),
                    path: None,
                    reason: SkipReason::MissingPath,
                });
                continue;
            }

            if !kind.value_kind().accepts(value) {
                skipped.extend(targets.into_iter().map(|path| SkippedOverride {
                    kind: kind.clone(),
                    path: Some(path),
                    reason: SkipReason::KindMismatch,
                }));
                continue;
            }

            for path in targets {
                match path.lookup_mut(&mut document) {
                    Some(slot) => *slot = value.clone(),
                    None => skipped.push(SkippedOverride {
                        kind: kind.clone(),
                        path: Some(path),
                        reason: SkipReason::MissingPath,
                    }),
                }
            }
        }

        (JobTemplate { document }, skipped)
    }
}

impl TryFrom<serde_json::Value> for JobTemplate {
    type Error = TemplateError;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        Self::from_value(value)
    }
}

impl From<JobTemplate> for serde_json::Value {
    fn from(template: JobTemplate) -> Self {
        template.document
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn preview_template() -> JobTemplate {
        JobTemplate::from_value(json!({
            "530": {"class_type": "CLIPTextEncode", "inputs": {"text": "", "clip": ["4", 1]}},
            "81": {"class_type": "RandomNoise", "inputs": {"noise_seed": 0}},
        }))
        .unwrap()
    }

    fn preview_paths() -> OverridePaths {
        OverridePaths::new()
            .with(OverrideKind::Text, FieldPath::node_input("530", "text"))
            .with(OverrideKind::Seed, FieldPath::node_input("81", "noise_seed"))
    }

    #[test]
    fn rejects_non_object_and_empty_documents() {
        assert_matches!(JobTemplate::from_value(json!([1, 2])), Err(TemplateError::Invalid(_)));
        assert_matches!(JobTemplate::from_value(json!({})), Err(TemplateError::Invalid(_)));
        assert_matches!(JobTemplate::from_json_str("{not json"), Err(TemplateError::Parse(_)));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = JobTemplate::load("/nonexistent/space_preview.json").unwrap_err();
        assert_matches!(err, TemplateError::Io { .. });
    }

    #[test]
    fn load_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("template.json");
        std::fs::write(&path, r#"{"1": {"class_type": "SaveImage", "inputs": {}}}"#).unwrap();
        let template = JobTemplate::load(&path).unwrap();
        assert_eq!(template.nodes().count(), 1);
    }

    #[test]
    fn validate_nodes_requires_class_type() {
        let template = JobTemplate::from_value(json!({"1": {"inputs": {}}})).unwrap();
        assert_matches!(template.validate_nodes(), Err(TemplateError::Invalid(msg)) if msg.contains("'1'"));
        assert!(preview_template().validate_nodes().is_ok());
    }

    #[test]
    fn apply_writes_existing_paths_only() {
        let template = preview_template();
        let variation = Variation::seed(10).with_text("a red fox");
        let applied = template.apply(&variation, &preview_paths());

        assert_eq!(applied.as_value()["81"]["inputs"]["noise_seed"], 10);
        assert_eq!(applied.as_value()["530"]["inputs"]["text"], "a red fox");
        // Connection inputs are untouched.
        assert_eq!(applied.as_value()["530"]["inputs"]["clip"], json!(["4", 1]));
    }

    #[test]
    fn apply_never_mutates_the_source() {
        let template = preview_template();
        let before = template.clone();
        let first = template.apply(&Variation::seed(10), &preview_paths());
        let second = template.apply(&Variation::seed(20), &preview_paths());

        assert_eq!(template, before);
        assert_eq!(first.as_value()["81"]["inputs"]["noise_seed"], 10);
        assert_eq!(second.as_value()["81"]["inputs"]["noise_seed"], 20);
    }

    #[test]
    fn absent_paths_are_skipped_silently() {
        let template = preview_template();
        let paths = preview_paths().with(OverrideKind::Model, FieldPath::node_input("4", "ckpt_name"));
        let variation = Variation::seed(7).with_model("sdxl.safetensors");

        let (applied, skipped) = template.apply_report(&variation, &paths);
        assert_eq!(applied.as_value()["81"]["inputs"]["noise_seed"], 7);
        assert!(applied.as_value().get("4").is_none());
        assert_eq!(skipped.len(), 1);
        assert_eq!(skipped[0].reason, SkipReason::MissingPath);
    }

    #[test]
    fn kind_mismatch_is_skipped() {
        let template = preview_template();
        let variation = Variation::new().with_value(OverrideKind::Seed, json!("ten"));
        let (applied, skipped) = template.apply_report(&variation, &preview_paths());

        assert_eq!(applied.as_value()["81"]["inputs"]["noise_seed"], 0);
        assert_eq!(skipped[0].reason, SkipReason::KindMismatch);
    }

    #[test]
    fn named_override_uses_key_as_path() {
        let template = preview_template();
        let variation = Variation::new().with_value(OverrideKind::Named("530.inputs.text".into()), json!("swept"));
        let applied = template.apply(&variation, &OverridePaths::new());
        assert_eq!(applied.as_value()["530"]["inputs"]["text"], "swept");
    }

    #[test]
    fn deserialize_validates_shape() {
        let ok: Result<JobTemplate, _> = serde_json::from_value(json!({"1": {}}));
        assert!(ok.is_ok());
        let bad: Result<JobTemplate, _> = serde_json::from_value(json!("text"));
        assert!(bad.is_err());
    }
}
