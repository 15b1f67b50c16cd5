//! Topology descriptor handling.
//!
//! The uploaded `model.json` carries the layer graph plus a `weightsManifest`:
//! a list of groups, each naming the file(s) that hold its raw tensor bytes.
//! The browser exports those paths relative to wherever it saved the shards,
//! so before the loader runs we rewrite every group to point at the single
//! co-located `weights.bin` blob.

use crate::ConvertError;
use serde_json::{json, Value};

/// File name every manifest group is rewritten to reference.
pub const WEIGHTS_FILE: &str = "weights.bin";

/// Summary of a parsed topology descriptor, for the load log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopologySummary {
    /// Value of the `format` field, if present.
    pub format: Option<String>,
    /// Top-level keys of `modelTopology`, when it is an object.
    pub topology_keys: Vec<String>,
    /// Number of weight manifest groups that were rewritten.
    pub manifest_groups: usize,
}

/// Parse `model.json` and rewrite all `weightsManifest` path lists to
/// `["weights.bin"]`.
///
/// Returns the re-serialized document plus a summary for logging. A document
/// without a `weightsManifest` array passes through unmodified; manifest
/// entries that are not objects are left as-is.
pub fn patch_weights_manifest(raw: &[u8]) -> Result<(Vec<u8>, TopologySummary), ConvertError> {
    let mut doc: Value = serde_json::from_slice(raw)
        .map_err(|e| ConvertError::InvalidTopology(e.to_string()))?;

    let mut groups = 0;
    if let Some(manifest) = doc.get_mut("weightsManifest").and_then(Value::as_array_mut) {
        for entry in manifest.iter_mut() {
            if let Some(obj) = entry.as_object_mut() {
                obj.insert("paths".to_string(), json!([WEIGHTS_FILE]));
                groups += 1;
            }
        }
    }

    let summary = TopologySummary {
        format: doc.get("format").and_then(Value::as_str).map(String::from),
        topology_keys: doc
            .get("modelTopology")
            .and_then(Value::as_object)
            .map(|o| o.keys().cloned().collect())
            .unwrap_or_default(),
        manifest_groups: groups,
    };

    let patched = serde_json::to_vec(&doc)
        .map_err(|e| ConvertError::InvalidTopology(e.to_string()))?;
    Ok((patched, summary))
}

/// Parse the optional free-form metadata string (class labels, input shape).
///
/// Malformed metadata is silently replaced by an empty object; it is accepted
/// for forward compatibility but does not affect the conversion output.
pub fn parse_metadata(raw: &str) -> Value {
    match serde_json::from_str(raw) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Malformed metadata JSON ignored: {}", e);
            json!({})
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_model_json() -> Vec<u8> {
        serde_json::to_vec(&json!({
            "format": "layers-model",
            "modelTopology": {
                "class_name": "Sequential",
                "config": {"layers": []},
                "keras_version": "tfjs-layers 4.17.0"
            },
            "weightsManifest": [
                {
                    "paths": ["group1-shard1of2.bin", "group1-shard2of2.bin"],
                    "weights": [{"name": "dense/kernel", "shape": [4, 2], "dtype": "float32"}]
                },
                {
                    "paths": ["group2-shard1of1.bin"],
                    "weights": [{"name": "dense/bias", "shape": [2], "dtype": "float32"}]
                }
            ]
        }))
        .unwrap()
    }

    #[test]
    fn patch_rewrites_all_group_paths() {
        let (patched, summary) = patch_weights_manifest(&sample_model_json()).unwrap();
        let doc: Value = serde_json::from_slice(&patched).unwrap();
        let manifest = doc["weightsManifest"].as_array().unwrap();
        assert_eq!(manifest.len(), 2);
        for entry in manifest {
            assert_eq!(entry["paths"], json!([WEIGHTS_FILE]));
        }
        assert_eq!(summary.manifest_groups, 2);
    }

    #[test]
    fn patch_preserves_topology_and_weights() {
        let (patched, summary) = patch_weights_manifest(&sample_model_json()).unwrap();
        let doc: Value = serde_json::from_slice(&patched).unwrap();
        assert_eq!(doc["modelTopology"]["class_name"], "Sequential");
        assert_eq!(
            doc["weightsManifest"][0]["weights"][0]["name"],
            "dense/kernel"
        );
        assert_eq!(summary.format.as_deref(), Some("layers-model"));
        assert!(summary.topology_keys.contains(&"class_name".to_string()));
    }

    #[test]
    fn document_without_manifest_passes_through() {
        let raw = serde_json::to_vec(&json!({"modelTopology": {"class_name": "Sequential"}}))
            .unwrap();
        let (patched, summary) = patch_weights_manifest(&raw).unwrap();
        let doc: Value = serde_json::from_slice(&patched).unwrap();
        assert!(doc.get("weightsManifest").is_none());
        assert_eq!(summary.manifest_groups, 0);
    }

    #[test]
    fn non_object_manifest_entries_left_alone() {
        let raw = serde_json::to_vec(&json!({
            "weightsManifest": [
                "not-a-group",
                {"paths": ["shard.bin"], "weights": []}
            ]
        }))
        .unwrap();
        let (patched, summary) = patch_weights_manifest(&raw).unwrap();
        let doc: Value = serde_json::from_slice(&patched).unwrap();
        assert_eq!(doc["weightsManifest"][0], json!("not-a-group"));
        assert_eq!(doc["weightsManifest"][1]["paths"], json!([WEIGHTS_FILE]));
        assert_eq!(summary.manifest_groups, 1);
    }

    #[test]
    fn invalid_json_is_a_client_error() {
        let err = patch_weights_manifest(b"{not json").unwrap_err();
        assert!(matches!(err, ConvertError::InvalidTopology(_)));
    }

    #[test]
    fn metadata_parses_valid_json() {
        let value = parse_metadata(r#"{"classes": ["cat", "dog"], "input_shape": [96, 96, 3]}"#);
        assert_eq!(value["classes"][1], "dog");
    }

    #[test]
    fn malformed_metadata_defaults_to_empty_object() {
        let value = parse_metadata("{classes: oops");
        assert_eq!(value, json!({}));
    }
}
