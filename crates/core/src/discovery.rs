//! Heuristic discovery of override targets in ComfyUI-style templates.
//!
//! Used when the caller has not configured paths explicitly. Only literal
//! inputs are considered; connection references (`["node_id", slot]`) are
//! never treated as overridable.

use crate::paths::{FieldPath, OverrideKind, OverridePaths};
use crate::template::JobTemplate;

// ---------------------------------------------------------------------------
// ComfyUI node class types used for heuristic detection
// ---------------------------------------------------------------------------

const KSAMPLER_CLASS: &str = "KSampler";
const KSAMPLER_ADVANCED_CLASS: &str = "KSamplerAdvanced";
const RANDOM_NOISE_CLASS: &str = "RandomNoise";
const CLIP_TEXT_ENCODE_CLASS: &str = "CLIPTextEncode";
const LOAD_CHECKPOINT_CLASS: &str = "CheckpointLoaderSimple";
const LOAD_IMAGE_CLASS: &str = "LoadImage";

/// Seed input names, in lookup order.
const SEED_INPUTS: &[&str] = &["seed", "noise_seed"];

/// Discover seed, prompt, model and image targets.
///
/// - `KSampler` / `KSamplerAdvanced` / `RandomNoise`: `seed`, `noise_seed`
/// - `CLIPTextEncode`: `text`, unless the node id looks negative
/// - `CheckpointLoaderSimple`: `ckpt_name`
/// - `LoadImage`: `image`
pub fn discover_override_paths(template: &JobTemplate) -> OverridePaths {
    let mut paths = OverridePaths::new();

    let mut nodes: Vec<_> = template.nodes().collect();
    nodes.sort_by(|a, b| a.0.cmp(b.0));

    for (node_id, node) in nodes {
        let class_type = node.get("class_type").and_then(|v| v.as_str()).unwrap_or("");
        let Some(inputs) = node.get("inputs").and_then(|v| v.as_object()) else {
            continue;
        };
        let literal = |name: &str| inputs.get(name).is_some_and(|v| !is_connection(v));

        match class_type {
            KSAMPLER_CLASS | KSAMPLER_ADVANCED_CLASS | RANDOM_NOISE_CLASS => {
                for &input in SEED_INPUTS {
                    if literal(input) {
                        paths.insert(OverrideKind::Seed, FieldPath::node_input(node_id, input));
                    }
                }
            }
            CLIP_TEXT_ENCODE_CLASS => {
                if literal("text") && !looks_negative(node_id, node) {
                    paths.insert(OverrideKind::Text, FieldPath::node_input(node_id, "text"));
                }
            }
            LOAD_CHECKPOINT_CLASS => {
                if literal("ckpt_name") {
                    paths.insert(OverrideKind::Model, FieldPath::node_input(node_id, "ckpt_name"));
                }
            }
            LOAD_IMAGE_CLASS => {
                if literal("image") {
                    paths.insert(OverrideKind::Image, FieldPath::node_input(node_id, "image"));
                }
            }
            _ => {}
        }
    }

    paths
}

/// ComfyUI encodes links as two-element arrays `[source_node_id, output_index]`.
fn is_connection(value: &serde_json::Value) -> bool {
    value.as_array().is_some_and(|arr| arr.len() == 2)
}

/// Heuristic: node id or `_meta.title` mentions "neg".
fn looks_negative(node_id: &str, node: &serde_json::Value) -> bool {
    let title = node
        .get("_meta")
        .and_then(|m| m.get("title"))
        .and_then(|t| t.as_str())
        .unwrap_or("");
    node_id.to_lowercase().contains("neg") || title.to_lowercase().contains("neg")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn workflow() -> JobTemplate {
        JobTemplate::from_value(json!({
            "4": {"class_type": "CheckpointLoaderSimple", "inputs": {"ckpt_name": "sdxl.safetensors"}},
            "6": {"class_type": "CLIPTextEncode", "inputs": {"text": "a castle", "clip": ["4", 1]}},
            "7": {"class_type": "CLIPTextEncode", "inputs": {"text": "blurry", "clip": ["4", 1]},
                  "_meta": {"title": "Negative Prompt"}},
            "3": {"class_type": "KSampler", "inputs": {"seed": 42, "model": ["4", 0]}},
            "81": {"class_type": "RandomNoise", "inputs": {"noise_seed": 5}},
            "10": {"class_type": "LoadImage", "inputs": {"image": "mask.png"}},
            "9": {"class_type": "SaveImage", "inputs": {"images": ["8", 0]}},
        }))
        .unwrap()
    }

    #[test]
    fn discovers_all_kinds() {
        let paths = discover_override_paths(&workflow());
        assert_eq!(
            paths.targets(&OverrideKind::Seed),
            vec![FieldPath::node_input("3", "seed"), FieldPath::node_input("81", "noise_seed")]
        );
        assert_eq!(paths.targets(&OverrideKind::Text), vec![FieldPath::node_input("6", "text")]);
        assert_eq!(paths.targets(&OverrideKind::Model), vec![FieldPath::node_input("4", "ckpt_name")]);
        assert_eq!(paths.targets(&OverrideKind::Image), vec![FieldPath::node_input("10", "image")]);
    }

    #[test]
    fn connection_inputs_are_not_targets() {
        let template = JobTemplate::from_value(json!({
            "3": {"class_type": "KSampler", "inputs": {"seed": ["12", 0]}},
        }))
        .unwrap();
        assert!(discover_override_paths(&template).is_empty());
    }

    #[test]
    fn nodes_without_inputs_are_ignored() {
        let template = JobTemplate::from_value(json!({"1": {"class_type": "KSampler"}})).unwrap();
        assert!(discover_override_paths(&template).is_empty());
    }
}
